//! The contract between the core and a code emitter.
//!
//! The core hands the back end a fully annotated IR (every node and variable
//! carrying its allocated register) plus the tables an encoder needs. Back
//! ends are otherwise opaque: the driver picks one by profile version and
//! never looks at the bytes it returns.

use shade_ir::{BlockId, BufferId, Context, VarId};

/// Everything an emitter needs besides the context itself.
#[derive(Debug)]
pub struct BackendInput {
    pub entry_point: String,
    pub body: BlockId,
    /// Input-semantic halves, in declaration order.
    pub inputs: Vec<VarId>,
    /// Output-semantic halves, in declaration order.
    pub outputs: Vec<VarId>,
    /// Uniform halves (legacy const registers or buffer members).
    pub uniforms: Vec<VarId>,
    /// Constant buffers with at least one read member.
    pub buffers: Vec<BufferId>,
    pub temp_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// The program uses a construct this emitter does not handle. Emitters
    /// must surface this instead of crashing.
    #[error("invalid shader: {0}")]
    InvalidShader(String),
}

/// A target-specific code emitter.
pub trait Backend {
    fn emit(&self, ctx: &Context, input: &BackendInput) -> Result<Vec<u8>, EmitError>;
}
