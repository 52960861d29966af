//! Experimental GLSL text emitter.
//!
//! Consumes the same annotated IR as the binary emitters but handles only
//! register-to-register moves; every other construct is rejected with
//! `InvalidShader` rather than a panic. Kept for diagnosing the middle end
//! against a readable output.

use crate::regs::{RegisterFile, node_source, var_is_read_only, var_register};
use shade_codegen::{Backend, BackendInput, EmitError};
use shade_ir::{BlockId, Context, NodeKind, Writemask};
use shade_types::ShaderStage;
use std::fmt::Write as _;

fn stage_prefix(stage: ShaderStage) -> Result<&'static str, EmitError> {
    Ok(match stage {
        ShaderStage::Vertex => "vs",
        ShaderStage::Hull => "hs",
        ShaderStage::Domain => "ds",
        ShaderStage::Geometry => "gs",
        ShaderStage::Pixel => "ps",
        ShaderStage::Compute => "cs",
        other => {
            return Err(EmitError::InvalidShader(format!(
                "no GLSL prefix for {} shaders",
                other.name()
            )));
        }
    })
}

struct GlslGenerator<'a> {
    ctx: &'a Context,
    prefix: &'static str,
    buffer: String,
    indent: usize,
}

impl GlslGenerator<'_> {
    fn print_indent(&mut self) {
        let _ = write!(self.buffer, "{:width$}", "", width = 4 * self.indent);
    }

    fn register_name(&self, file: RegisterFile, index: u32) -> Result<String, EmitError> {
        Ok(match file {
            RegisterFile::Temp => format!("r[{index}]"),
            RegisterFile::Input => format!("{}_in[{index}]", self.prefix),
            RegisterFile::Const => format!("{}_c[{index}]", self.prefix),
            RegisterFile::Output | RegisterFile::ColorOut | RegisterFile::RasterOut => {
                format!("{}_out[{index}]", self.prefix)
            }
            other => {
                return Err(EmitError::InvalidShader(format!(
                    "unhandled register file {other:?}"
                )));
            }
        })
    }

    fn swizzle_suffix(swizzle: u8, width: u32) -> String {
        const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];
        let mut out = String::from(".");
        for i in 0..width {
            out.push(COMPONENTS[((swizzle >> (2 * i)) & 3) as usize]);
        }
        out
    }

    fn mask_suffix(mask: Writemask) -> String {
        mask.to_string()
    }

    fn emit_block(&mut self, block: BlockId) -> Result<(), EmitError> {
        for instr in self.ctx.block_instrs(block) {
            let node = self.ctx.node(instr);
            match &node.kind {
                NodeKind::Constant(_) | NodeKind::Swizzle { .. } => {}

                NodeKind::Load(deref) => {
                    if var_is_read_only(self.ctx, deref.var) {
                        continue;
                    }
                    let (file, index) = var_register(self.ctx, deref.var)?;
                    let src = self.register_name(file, index)?;
                    let dst = self.register_name(RegisterFile::Temp, node.reg.id)?;
                    let mask = Self::mask_suffix(node.reg.writemask);
                    self.print_indent();
                    let _ = writeln!(self.buffer, "{dst}{mask} = {src};");
                }

                NodeKind::Store {
                    lhs,
                    rhs,
                    writemask,
                } => {
                    let rhs = rhs.expect("store without a right-hand side");
                    let (src_file, src_index, swizzle) = node_source(self.ctx, rhs)?;
                    let (dst_file, dst_index) = var_register(self.ctx, lhs.var)
                        .or_else(|_| self.builtin_output(lhs.var))?;
                    let src = self.register_name(src_file, src_index)?;
                    let dst = self.register_name(dst_file, dst_index)?;
                    let width = writemask.component_count();
                    self.print_indent();
                    let _ = writeln!(
                        self.buffer,
                        "{dst}{} = {src}{};",
                        Self::mask_suffix(*writemask),
                        Self::swizzle_suffix(swizzle, width),
                    );
                }

                other => {
                    return Err(EmitError::InvalidShader(format!(
                        "unhandled instruction '{}'",
                        other.kind_name()
                    )));
                }
            }
        }
        Ok(())
    }

    fn builtin_output(&self, var: shade_ir::VarId) -> Result<(RegisterFile, u32), EmitError> {
        let v = self.ctx.var(var);
        if v.is_output_semantic {
            Ok((RegisterFile::Output, 0))
        } else {
            Err(EmitError::InvalidShader(format!(
                "variable '{}' has no register",
                v.name
            )))
        }
    }
}

/// The experimental text back end.
#[derive(Debug, Default)]
pub struct GlslBackend;

impl Backend for GlslBackend {
    fn emit(&self, ctx: &Context, input: &BackendInput) -> Result<Vec<u8>, EmitError> {
        let prefix = stage_prefix(ctx.profile.stage)?;
        let mut generator = GlslGenerator {
            ctx,
            prefix,
            buffer: String::new(),
            indent: 1,
        };
        let _ = writeln!(generator.buffer, "void {}_main()", prefix);
        let _ = writeln!(generator.buffer, "{{");
        generator.emit_block(input.body)?;
        let _ = writeln!(generator.buffer, "}}");
        Ok(generator.buffer.into_bytes())
    }
}
