//! Legacy token-stream emitter.
//!
//! Produces the classic D3D shader byte code layout: a version token,
//! `dcl`/`def` declarations, a small arithmetic/mov instruction set with
//! destination writemasks and source swizzles, and the end token. The
//! instruction length (in tokens, including the opcode token) lives in bits
//! 24..27 of the opcode token. Anything outside the supported subset
//! surfaces `InvalidShader`.

use crate::regs::{
    IDENTITY_SWIZZLE, RegisterFile, node_source, var_is_read_only, var_register,
};
use shade_codegen::semantics::{self, BuiltinRegister};
use shade_codegen::{Backend, BackendInput, EmitError};
use shade_ir::{BlockId, Context, ExprOp, NodeId, NodeKind, Writemask};
use shade_types::ShaderStage;

const OP_MOV: u16 = 1;
const OP_ADD: u16 = 2;
const OP_SUB: u16 = 3;
const OP_MUL: u16 = 5;
const OP_RCP: u16 = 6;
const OP_RSQ: u16 = 7;
const OP_DP3: u16 = 8;
const OP_DP4: u16 = 9;
const OP_MIN: u16 = 10;
const OP_MAX: u16 = 11;
const OP_FRC: u16 = 19;
const OP_DCL: u16 = 31;
const OP_DEF: u16 = 81;
const END_TOKEN: u32 = 0x0000_FFFF;

fn version_token(stage: ShaderStage, major: u32, minor: u32) -> Result<u32, EmitError> {
    let prefix = match stage {
        ShaderStage::Vertex => 0xFFFE_0000,
        ShaderStage::Pixel => 0xFFFF_0000,
        other => {
            return Err(EmitError::InvalidShader(format!(
                "legacy targets cannot encode {} shaders",
                other.name()
            )));
        }
    };
    Ok(prefix | (major << 8) | minor)
}

fn opcode_token(op: u16, operand_tokens: u32) -> u32 {
    (op as u32) | ((operand_tokens + 1) << 24)
}

fn reg_token(file: RegisterFile, index: u32) -> u32 {
    let regtype = file.legacy_code();
    let low3 = regtype & 0x7;
    let high2 = regtype & 0x18;
    0x8000_0000 | (low3 << 28) | (high2 << 8) | (index & 0x7FF)
}

fn dst_token(file: RegisterFile, index: u32, mask: Writemask) -> u32 {
    reg_token(file, index) | ((mask.bits() as u32) << 16)
}

fn src_token(file: RegisterFile, index: u32, swizzle: u8) -> u32 {
    reg_token(file, index) | ((swizzle as u32) << 16)
}

fn usage_code(usage: semantics::LegacyUsage) -> u32 {
    use semantics::LegacyUsage::*;
    match usage {
        Position => 0,
        BlendWeight => 1,
        BlendIndices => 2,
        Normal => 3,
        PointSize => 4,
        Texcoord => 5,
        Tangent => 6,
        Binormal => 7,
        TessFactor => 8,
        PositionT => 9,
        Color => 10,
        Fog => 11,
        Depth => 12,
        Sample => 13,
    }
}

/// Legacy back end for profile versions below 4.
#[derive(Debug, Default)]
pub struct LegacyBackend;

struct Emitter<'a> {
    ctx: &'a Context,
    tokens: Vec<u32>,
}

impl Emitter<'_> {
    fn source_for(&self, node: NodeId) -> Result<u32, EmitError> {
        let (file, index, swizzle) = node_source(self.ctx, node)?;
        Ok(src_token(file, index, swizzle))
    }

    fn emit_expr(
        &mut self,
        instr: NodeId,
        op: ExprOp,
        operands: &[NodeId],
    ) -> Result<(), EmitError> {
        let node = self.ctx.node(instr);
        let opcode = match op {
            ExprOp::Add => OP_ADD,
            ExprOp::Sub => OP_SUB,
            ExprOp::Mul => OP_MUL,
            ExprOp::Rcp => OP_RCP,
            ExprOp::Rsq => OP_RSQ,
            ExprOp::Min => OP_MIN,
            ExprOp::Max => OP_MAX,
            ExprOp::Fract => OP_FRC,
            ExprOp::Dot => {
                let width = self.ctx.types.get(self.ctx.node(operands[0]).ty).dimx;
                if width == 3 { OP_DP3 } else { OP_DP4 }
            }
            other => {
                return Err(EmitError::InvalidShader(format!(
                    "unhandled operation '{}'",
                    other.name()
                )));
            }
        };
        let mut words = vec![dst_token(
            RegisterFile::Temp,
            node.reg.id,
            node.reg.writemask,
        )];
        for operand in operands {
            words.push(self.source_for(*operand)?);
        }
        self.tokens.push(opcode_token(opcode, words.len() as u32));
        self.tokens.extend(words);
        Ok(())
    }

    fn emit_block(&mut self, block: BlockId) -> Result<(), EmitError> {
        for instr in self.ctx.block_instrs(block) {
            let node = self.ctx.node(instr);
            match &node.kind {
                // Constants live in def'd registers, swizzles fold into
                // their readers: neither emits code.
                NodeKind::Constant(_) | NodeKind::Swizzle { .. } => {}

                NodeKind::Load(deref) => {
                    // Reads of entry-written variables alias the register;
                    // only mutable temps need a copy into the node's
                    // register.
                    if var_is_read_only(self.ctx, deref.var) {
                        continue;
                    }
                    let (file, index) = var_register(self.ctx, deref.var)?;
                    let offset = self.ctx.offset_from_deref(deref).ok_or_else(|| {
                        EmitError::InvalidShader("unhandled relative addressing".to_string())
                    })?;
                    let dst = dst_token(RegisterFile::Temp, node.reg.id, node.reg.writemask);
                    self.tokens.push(opcode_token(OP_MOV, 2));
                    self.tokens.push(dst);
                    self.tokens
                        .push(src_token(file, index + offset, IDENTITY_SWIZZLE));
                }

                NodeKind::Expr { op, operands } => {
                    let operands: Vec<NodeId> = operands.iter().copied().flatten().collect();
                    self.emit_expr(instr, *op, &operands)?;
                }

                NodeKind::Store {
                    lhs,
                    rhs,
                    writemask,
                } => {
                    let rhs = rhs.expect("store without a right-hand side");
                    let var = self.ctx.var(lhs.var);
                    let (file, index) = if var.is_output_semantic {
                        output_register(self.ctx, lhs.var)?
                    } else {
                        var_register(self.ctx, lhs.var)?
                    };
                    let offset = self.ctx.offset_from_deref(lhs).ok_or_else(|| {
                        EmitError::InvalidShader("unhandled relative addressing".to_string())
                    })?;
                    self.tokens.push(opcode_token(OP_MOV, 2));
                    self.tokens.push(dst_token(file, index + offset, *writemask));
                    self.tokens.push(self.source_for(rhs)?);
                }

                NodeKind::Jump(shade_ir::JumpKind::Return) => {}

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
}

fn output_register(ctx: &Context, var: shade_ir::VarId) -> Result<(RegisterFile, u32), EmitError> {
    let v = ctx.var(var);
    let semantic = v.semantic.as_ref().expect("output without a semantic");
    match semantics::legacy_register_from_semantic(ctx.profile.stage, true, semantic) {
        Some(BuiltinRegister::VsPosition) => Ok((RegisterFile::RasterOut, 0)),
        Some(BuiltinRegister::VsFog) => Ok((RegisterFile::RasterOut, 1)),
        Some(BuiltinRegister::VsPointSize) => Ok((RegisterFile::RasterOut, 2)),
        Some(BuiltinRegister::PsColorOut(index)) => Ok((RegisterFile::ColorOut, index)),
        Some(BuiltinRegister::PsDepthOut) => Ok((RegisterFile::DepthOut, 0)),
        Some(_) | None => {
            if v.reg.allocated {
                Ok((RegisterFile::Output, v.reg.id))
            } else {
                Err(EmitError::InvalidShader(format!(
                    "output '{semantic}' has no register"
                )))
            }
        }
    }
}

impl Backend for LegacyBackend {
    fn emit(&self, ctx: &Context, input: &BackendInput) -> Result<Vec<u8>, EmitError> {
        let mut emitter = Emitter {
            ctx,
            tokens: Vec::new(),
        };
        let version = version_token(ctx.profile.stage, ctx.profile.major, ctx.profile.minor)?;
        emitter.tokens.push(version);

        // Input declarations.
        for var in &input.inputs {
            let v = ctx.var(*var);
            if !v.reg.allocated {
                continue;
            }
            let semantic = v.semantic.as_ref().expect("input without a semantic");
            let (usage, usage_index) =
                semantics::legacy_usage_from_semantic(semantic).ok_or_else(|| {
                    EmitError::InvalidShader(format!("invalid semantic '{}'", semantic.name))
                })?;
            emitter
                .tokens
                .push(opcode_token(OP_DCL, 1) | (usage_code(usage) << 16) | (usage_index << 20));
            emitter
                .tokens
                .push(dst_token(RegisterFile::Input, v.reg.id, v.reg.writemask));
        }

        // Constant definitions.
        for (index, values) in ctx.constant_defs.iter().enumerate() {
            emitter.tokens.push(opcode_token(OP_DEF, 5));
            emitter.tokens.push(dst_token(
                RegisterFile::Const,
                index as u32,
                Writemask::ALL,
            ));
            for value in values {
                emitter.tokens.push(value.to_bits());
            }
        }

        emitter.emit_block(input.body)?;
        emitter.tokens.push(END_TOKEN);

        tracing::debug!(
            target: "emit.d3dbc",
            tokens = emitter.tokens.len(),
            temp_count = input.temp_count,
            "emitted legacy byte code"
        );

        let mut bytes = Vec::with_capacity(emitter.tokens.len() * 4);
        for token in &emitter.tokens {
            bytes.extend_from_slice(&token.to_le_bytes());
        }
        Ok(bytes)
    }
}
