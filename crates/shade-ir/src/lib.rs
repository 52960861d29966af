//! Typed intermediate representation for the shadec compiler core.
//!
//! The IR is a flat arena of instruction nodes referenced by stable indices.
//! Blocks are ordered lists of node ids; nested control flow (`if`, `loop`)
//! owns nested blocks. Every node-to-node reference goes through a typed
//! source slot mirrored by a use list on the target, and all of that
//! bookkeeping funnels through [`Context`] so the bijection cannot drift.

pub mod builder;
pub mod ctx;
pub mod dump;
pub mod node;
pub mod swizzle;

pub use builder::invert_swizzle;
pub use ctx::{Buffer, BufferKind, Context, Function, FunctionDecl, Scope, ScopeId, Var};
pub use node::{
    Block, BlockId, BufferId, ConstantValue, Deref, ExprOp, JumpKind, Node, NodeId, NodeKind,
    Register, ResourceLoadKind, SrcSlot, VarId,
};
pub use swizzle::{Swizzle, Writemask};
