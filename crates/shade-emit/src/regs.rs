//! Register-file mapping shared by the emitters.
//!
//! Source operands resolve through value-preserving nodes: a swizzle reads
//! its source with the permutation composed in, and a load from a variable
//! that is only written at function entry (inputs, uniforms) reads the
//! variable's register directly. Only loads from mutable temps need their
//! own MOV.

use shade_codegen::EmitError;
use shade_ir::{Context, NodeId, NodeKind};

/// `.xyzw` in two-bits-per-component form.
pub const IDENTITY_SWIZZLE: u8 = 0xE4;

/// The register files the emitters speak about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFile {
    Temp,
    Input,
    Const,
    /// `oPos`/`oFog`/`oPts` rasterizer registers.
    RasterOut,
    /// Generic interpolator outputs.
    Output,
    /// `oC<n>` color outputs.
    ColorOut,
    /// `oDepth`.
    DepthOut,
    Sampler,
}

impl RegisterFile {
    /// The legacy token-stream register type code.
    pub fn legacy_code(&self) -> u32 {
        match self {
            RegisterFile::Temp => 0,
            RegisterFile::Input => 1,
            RegisterFile::Const => 2,
            RegisterFile::RasterOut => 4,
            RegisterFile::Output => 6,
            RegisterFile::ColorOut => 8,
            RegisterFile::DepthOut => 9,
            RegisterFile::Sampler => 10,
        }
    }
}

/// Compose two swizzles: the result selects through `inner` first.
pub fn compose_swizzles(inner: u8, outer: u8) -> u8 {
    let mut out = 0u8;
    for i in 0..4 {
        let o = (outer >> (2 * i)) & 3;
        let s = (inner >> (2 * o)) & 3;
        out |= s << (2 * i);
    }
    out
}

/// True when the variable is only written by the synthetic entry point, so
/// reads can alias its register directly.
pub fn var_is_read_only(ctx: &Context, var: shade_ir::VarId) -> bool {
    let v = ctx.var(var);
    v.is_uniform || v.is_input_semantic
}

/// The register file a variable belongs to.
pub fn var_file(ctx: &Context, var: shade_ir::VarId) -> RegisterFile {
    let v = ctx.var(var);
    if v.is_uniform {
        RegisterFile::Const
    } else if v.is_input_semantic {
        RegisterFile::Input
    } else if v.is_output_semantic {
        RegisterFile::Output
    } else {
        RegisterFile::Temp
    }
}

/// The register file and index a variable was allocated to.
pub fn var_register(ctx: &Context, var: shade_ir::VarId) -> Result<(RegisterFile, u32), EmitError> {
    let v = ctx.var(var);
    if !v.reg.allocated {
        return Err(EmitError::InvalidShader(format!(
            "variable '{}' has no register",
            v.name
        )));
    }
    Ok((var_file(ctx, var), v.reg.id))
}

/// Where a node's value can be read from, as `(file, index, swizzle)`.
pub fn node_source(ctx: &Context, node: NodeId) -> Result<(RegisterFile, u32, u8), EmitError> {
    let n = ctx.node(node);
    match &n.kind {
        NodeKind::Constant(_) => {
            if !n.reg.allocated {
                return Err(EmitError::InvalidShader(
                    "constant without a register".to_string(),
                ));
            }
            Ok((RegisterFile::Const, n.reg.id, IDENTITY_SWIZZLE))
        }
        NodeKind::Swizzle { swizzle, src } => {
            let src = src.expect("swizzle without a source");
            let (file, index, inner) = node_source(ctx, src)?;
            Ok((file, index, compose_swizzles(inner, (swizzle.0 & 0xFF) as u8)))
        }
        NodeKind::Load(deref) => {
            if var_is_read_only(ctx, deref.var) {
                let (file, index) = var_register(ctx, deref.var)?;
                let offset = ctx.offset_from_deref(deref).ok_or_else(|| {
                    EmitError::InvalidShader("unhandled relative addressing".to_string())
                })?;
                Ok((file, index + offset, IDENTITY_SWIZZLE))
            } else if n.reg.allocated {
                Ok((RegisterFile::Temp, n.reg.id, IDENTITY_SWIZZLE))
            } else {
                Err(EmitError::InvalidShader(
                    "load without a register".to_string(),
                ))
            }
        }
        _ => {
            if !n.reg.allocated {
                return Err(EmitError::InvalidShader(format!(
                    "value '{}' has no register",
                    n.kind.kind_name()
                )));
            }
            Ok((RegisterFile::Temp, n.reg.id, IDENTITY_SWIZZLE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swizzle_composition() {
        // inner .yxwz then outer .zx reads components w, y of the original.
        let inner = 0b10_11_00_01u8;
        let outer = 0b00_00_00_10u8; // .zx plus padding
        let composed = compose_swizzles(inner, outer);
        assert_eq!(composed & 3, 3); // position 0 reads w
        assert_eq!((composed >> 2) & 3, 1); // position 1 reads y
    }

    #[test]
    fn identity_composes_to_identity() {
        assert_eq!(
            compose_swizzles(IDENTITY_SWIZZLE, IDENTITY_SWIZZLE),
            IDENTITY_SWIZZLE
        );
    }
}
