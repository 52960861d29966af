//! Container emitter for version 4+ profiles.
//!
//! Writes the four-character-code container layout: `DXBC` magic, a zeroed
//! checksum, the chunk offset table, and three chunks: input signature
//! (`ISGN`), output signature (`OSGN`) and the instruction stream (`SHDR`).
//! The instruction chunk uses the same restricted subset as the legacy
//! emitter; unhandled constructs surface `InvalidShader`.

use crate::regs::{RegisterFile, node_source, var_is_read_only, var_register};
use shade_codegen::{Backend, BackendInput, EmitError};
use shade_ir::{BlockId, Context, ExprOp, NodeId, NodeKind, VarId, Writemask};
use shade_types::ShaderStage;

const OP_ADD: u32 = 0;
const OP_DP3: u32 = 16;
const OP_DP4: u32 = 17;
const OP_FRC: u32 = 26;
const OP_MAX: u32 = 51;
const OP_MIN: u32 = 52;
const OP_MOV: u32 = 54;
const OP_MUL: u32 = 56;
const OP_RET: u32 = 62;
const OP_DCL_TEMPS: u32 = 104;
const OP_DCL_CONSTANT_BUFFER: u32 = 88;

fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

fn program_type(stage: ShaderStage) -> Result<u32, EmitError> {
    Ok(match stage {
        ShaderStage::Pixel => 0,
        ShaderStage::Vertex => 1,
        ShaderStage::Geometry => 2,
        ShaderStage::Hull => 3,
        ShaderStage::Domain => 4,
        ShaderStage::Compute => 5,
        other => {
            return Err(EmitError::InvalidShader(format!(
                "no program type for {} shaders",
                other.name()
            )));
        }
    })
}

/// Build a signature chunk: element table with name offsets, then the name
/// strings.
fn signature_chunk(ctx: &Context, vars: &[VarId]) -> Vec<u8> {
    const HEADER: usize = 8;
    const ELEMENT_SIZE: usize = 24;
    let mut out = Vec::new();
    out.extend_from_slice(&(vars.len() as u32).to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());

    let names_base = HEADER + vars.len() * ELEMENT_SIZE;
    let mut names: Vec<u8> = Vec::new();
    for var in vars {
        let v = ctx.var(*var);
        let semantic = v.semantic.as_ref().expect("signature var without a semantic");
        let name_offset = names_base + names.len();
        names.extend_from_slice(semantic.name.as_bytes());
        names.push(0);

        out.extend_from_slice(&(name_offset as u32).to_le_bytes());
        out.extend_from_slice(&semantic.index.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // system value type
        out.extend_from_slice(&3u32.to_le_bytes()); // float components
        out.extend_from_slice(&v.reg.id.to_le_bytes());
        let dimx = ctx.types.get(v.ty).dimx;
        let mask = Writemask::from_width(dimx).bits();
        out.push(mask);
        out.push(mask);
        out.extend_from_slice(&[0u8; 2]);
    }
    out.extend_from_slice(&names);
    out
}

/// Marker operand code for an immediate 4-component literal.
const IMMEDIATE_OPERAND: u32 = 0xFF;

fn constant_bits(value: &shade_ir::ConstantValue) -> Result<[u32; 4], EmitError> {
    use shade_ir::ConstantValue;
    Ok(match value {
        ConstantValue::Float(v) => [
            v[0].to_bits(),
            v[1].to_bits(),
            v[2].to_bits(),
            v[3].to_bits(),
        ],
        ConstantValue::Uint(v) => *v,
        ConstantValue::Int(v) => [v[0] as u32, v[1] as u32, v[2] as u32, v[3] as u32],
        ConstantValue::Bool(v) => [v[0] as u32, v[1] as u32, v[2] as u32, v[3] as u32],
        ConstantValue::Double(_) => {
            return Err(EmitError::InvalidShader(
                "double-precision constants are not emitted".to_string(),
            ));
        }
    })
}

struct ShaderChunk<'a> {
    ctx: &'a Context,
    tokens: Vec<u32>,
}

impl ShaderChunk<'_> {
    fn operand(&self, file: RegisterFile, index: u32, selector: u32) -> Vec<u32> {
        // Compact operand form: file code, register index, swizzle/mask
        // selector.
        vec![file.legacy_code(), index, selector]
    }

    fn push_instr(&mut self, opcode: u32, operands: &[Vec<u32>]) {
        let length = 1 + operands.iter().map(|o| o.len() as u32).sum::<u32>();
        self.tokens.push(opcode | (length << 24));
        for operand in operands {
            self.tokens.extend_from_slice(operand);
        }
    }

    fn source_for(&self, node: NodeId) -> Result<Vec<u32>, EmitError> {
        // Literals (possibly behind swizzles) become immediate operands.
        let mut swizzle = crate::regs::IDENTITY_SWIZZLE;
        let mut cursor = node;
        loop {
            match &self.ctx.node(cursor).kind {
                NodeKind::Swizzle { swizzle: s, src } => {
                    swizzle = crate::regs::compose_swizzles((s.0 & 0xFF) as u8, swizzle);
                    cursor = src.expect("swizzle without a source");
                }
                NodeKind::Constant(value) => {
                    let bits = constant_bits(value)?;
                    let mut out = vec![IMMEDIATE_OPERAND];
                    for i in 0..4 {
                        out.push(bits[((swizzle >> (2 * i)) & 3) as usize]);
                    }
                    return Ok(out);
                }
                _ => break,
            }
        }
        let (file, index, swizzle) = node_source(self.ctx, node)?;
        Ok(self.operand(file, index, swizzle as u32))
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
                    let offset = self.ctx.offset_from_deref(deref).ok_or_else(|| {
                        EmitError::InvalidShader("unhandled relative addressing".to_string())
                    })?;
                    let dst = self.operand(
                        RegisterFile::Temp,
                        node.reg.id,
                        node.reg.writemask.bits() as u32,
                    );
                    let src = self.operand(file, index + offset, crate::regs::IDENTITY_SWIZZLE as u32);
                    self.push_instr(OP_MOV, &[dst, src]);
                }

                NodeKind::Expr { op, operands } => {
                    let opcode = match op {
                        ExprOp::Add => OP_ADD,
                        ExprOp::Mul => OP_MUL,
                        ExprOp::Min => OP_MIN,
                        ExprOp::Max => OP_MAX,
                        ExprOp::Fract => OP_FRC,
                        ExprOp::Dot => {
                            let first = operands[0].expect("dot without operands");
                            if self.ctx.types.get(self.ctx.node(first).ty).dimx == 3 {
                                OP_DP3
                            } else {
                                OP_DP4
                            }
                        }
                        other => {
                            return Err(EmitError::InvalidShader(format!(
                                "unhandled operation '{}'",
                                other.name()
                            )));
                        }
                    };
                    let dst = self.operand(
                        RegisterFile::Temp,
                        node.reg.id,
                        node.reg.writemask.bits() as u32,
                    );
                    let mut words = vec![dst];
                    for operand in operands.iter().flatten() {
                        words.push(self.source_for(*operand)?);
                    }
                    self.push_instr(opcode, &words);
                }

                NodeKind::Store {
                    lhs,
                    rhs,
                    writemask,
                } => {
                    let rhs = rhs.expect("store without a right-hand side");
                    let (file, index) = if self.ctx.var(lhs.var).is_output_semantic {
                        output_register(self.ctx, lhs.var)?
                    } else {
                        var_register(self.ctx, lhs.var)?
                    };
                    let offset = self.ctx.offset_from_deref(lhs).ok_or_else(|| {
                        EmitError::InvalidShader("unhandled relative addressing".to_string())
                    })?;
                    let dst = self.operand(file, index + offset, writemask.bits() as u32);
                    let src = self.source_for(rhs)?;
                    self.push_instr(OP_MOV, &[dst, src]);
                }

                NodeKind::Jump(shade_ir::JumpKind::Return) => {
                    self.push_instr(OP_RET, &[]);
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
}

fn output_register(ctx: &Context, var: VarId) -> Result<(RegisterFile, u32), EmitError> {
    use shade_codegen::semantics::{BuiltinRegister, sm4_register_from_semantic};
    let v = ctx.var(var);
    let semantic = v.semantic.as_ref().expect("output without a semantic");
    match sm4_register_from_semantic(ctx.profile.stage, true, semantic) {
        Ok(Some((BuiltinRegister::SvTarget(index), _))) => Ok((RegisterFile::ColorOut, index)),
        Ok(Some((BuiltinRegister::SvDepth, _))) => Ok((RegisterFile::DepthOut, 0)),
        _ if v.reg.allocated => Ok((RegisterFile::Output, v.reg.id)),
        _ => Err(EmitError::InvalidShader(format!(
            "output '{semantic}' has no register"
        ))),
    }
}

/// Modern back end for profile versions 4 and up.
#[derive(Debug, Default)]
pub struct ModernBackend;

impl Backend for ModernBackend {
    fn emit(&self, ctx: &Context, input: &BackendInput) -> Result<Vec<u8>, EmitError> {
        let isgn = signature_chunk(ctx, &input.inputs);
        let osgn = signature_chunk(ctx, &input.outputs);

        let mut shader = ShaderChunk {
            ctx,
            tokens: Vec::new(),
        };
        let version = (program_type(ctx.profile.stage)? << 16)
            | (ctx.profile.major << 4)
            | ctx.profile.minor;
        shader.tokens.push(version);
        shader.tokens.push(0); // length, patched below

        for buffer in &input.buffers {
            let b = ctx.buffer(*buffer);
            let register = b.reg.id;
            let size_in_regs = b.used_size.div_ceil(4);
            shader.tokens.push(OP_DCL_CONSTANT_BUFFER | (3 << 24));
            shader.tokens.push(register);
            shader.tokens.push(size_in_regs);
        }
        if input.temp_count > 0 {
            shader.tokens.push(OP_DCL_TEMPS | (2 << 24));
            shader.tokens.push(input.temp_count);
        }

        shader.emit_block(input.body)?;
        shader.push_instr(OP_RET, &[]);
        let len = shader.tokens.len() as u32;
        shader.tokens[1] = len;

        let mut shdr = Vec::with_capacity(shader.tokens.len() * 4);
        for token in &shader.tokens {
            shdr.extend_from_slice(&token.to_le_bytes());
        }

        tracing::debug!(
            target: "emit.dxbc",
            tokens = len,
            inputs = input.inputs.len(),
            outputs = input.outputs.len(),
            "emitted container"
        );

        Ok(build_container(&[
            (*b"ISGN", &isgn),
            (*b"OSGN", &osgn),
            (*b"SHDR", &shdr),
        ]))
    }
}

/// Assemble the container: magic, zeroed checksum, reserved word, total
/// size, chunk count, offset table, then the chunks.
pub fn build_container(chunks: &[([u8; 4], &[u8])]) -> Vec<u8> {
    let header_size = 4 + 16 + 4 + 4 + 4 + 4 * chunks.len();
    let chunk_bytes: usize = chunks.iter().map(|(_, data)| 8 + data.len()).sum();

    let mut out = Vec::with_capacity(header_size + chunk_bytes);
    out.extend_from_slice(b"DXBC");
    out.extend_from_slice(&[0u8; 16]); // checksum unset
    out.extend_from_slice(&1u32.to_le_bytes());
    let total_size_pos = out.len();
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());

    let offsets_pos = out.len();
    out.resize(out.len() + 4 * chunks.len(), 0);

    for (i, (tag, data)) in chunks.iter().enumerate() {
        let offset = out.len() as u32;
        out[offsets_pos + 4 * i..offsets_pos + 4 * i + 4].copy_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&fourcc(tag).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }

    let total = out.len() as u32;
    out[total_size_pos..total_size_pos + 4].copy_from_slice(&total.to_le_bytes());
    out
}
