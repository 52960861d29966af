//! Constant folding.
//!
//! Folds expressions whose operands are all constants. The supported set is
//! deliberately small: casts between the integer bases and to float, and
//! unsigned neg/add/mul. Anything else bails without touching the IR, so
//! the pass can run to a fixed point alongside copy propagation.

use shade_ir::{BlockId, ConstantValue, Context, ExprOp, NodeId, NodeKind};
use shade_types::BaseType;

fn constant_of(ctx: &Context, id: NodeId) -> Option<ConstantValue> {
    match &ctx.node(id).kind {
        NodeKind::Constant(value) => Some(*value),
        _ => None,
    }
}

/// Fold one expression node; reports progress.
pub fn fold_constants(ctx: &mut Context, block: BlockId, instr: NodeId) -> bool {
    let NodeKind::Expr { op, operands } = ctx.node(instr).kind.clone() else {
        return false;
    };
    for operand in operands.iter().flatten() {
        if !matches!(ctx.node(*operand).kind, NodeKind::Constant(_)) {
            return false;
        }
    }
    let arg1 = operands[0].and_then(|n| constant_of(ctx, n)).expect("expr operand");
    let arg2 = operands[1].and_then(|n| constant_of(ctx, n));
    let ty = ctx.node(instr).ty;
    let loc = ctx.node(instr).loc;
    let arg1_ty = ctx.node(operands[0].unwrap()).ty;
    let dimx = ctx.types.get(ty).dimx as usize;

    let result_base = ctx.types.get(ty).base;
    let value = match result_base {
        BaseType::Float | BaseType::Half => match op {
            ExprOp::Cast => {
                let (src, dst) = (ctx.types.get(arg1_ty), ctx.types.get(ty));
                if (src.dimx, src.dimy) != (dst.dimx, dst.dimy) {
                    tracing::debug!(target: "codegen.fold", "unsupported shape-changing cast");
                    return false;
                }
                let mut out = [0.0f32; 4];
                match arg1 {
                    ConstantValue::Int(v) => {
                        for i in 0..dimx {
                            out[i] = v[i] as f32;
                        }
                    }
                    ConstantValue::Uint(v) => {
                        for i in 0..dimx {
                            out[i] = v[i] as f32;
                        }
                    }
                    _ => {
                        tracing::debug!(target: "codegen.fold", "unsupported cast source");
                        return false;
                    }
                }
                ConstantValue::Float(out)
            }
            _ => {
                tracing::debug!(target: "codegen.fold", op = op.name(), "unsupported float fold");
                return false;
            }
        },

        BaseType::Uint => {
            let uint_components = |value: ConstantValue| -> Option<[u32; 4]> {
                match value {
                    ConstantValue::Uint(v) => Some(v),
                    _ => None,
                }
            };
            match op {
                ExprOp::Cast => {
                    let (src, dst) = (ctx.types.get(arg1_ty), ctx.types.get(ty));
                    if (src.dimx, src.dimy) != (dst.dimx, dst.dimy) {
                        tracing::debug!(target: "codegen.fold", "unsupported shape-changing cast");
                        return false;
                    }
                    let mut out = [0u32; 4];
                    match arg1 {
                        ConstantValue::Int(v) => {
                            for i in 0..dimx {
                                out[i] = v[i] as u32;
                            }
                        }
                        _ => {
                            tracing::debug!(target: "codegen.fold", "unsupported cast source");
                            return false;
                        }
                    }
                    ConstantValue::Uint(out)
                }
                ExprOp::Neg => {
                    let Some(a) = uint_components(arg1) else {
                        return false;
                    };
                    let mut out = [0u32; 4];
                    for i in 0..dimx {
                        out[i] = a[i].wrapping_neg();
                    }
                    ConstantValue::Uint(out)
                }
                ExprOp::Add | ExprOp::Mul => {
                    let (Some(a), Some(b)) = (
                        uint_components(arg1),
                        arg2.and_then(uint_components),
                    ) else {
                        return false;
                    };
                    let mut out = [0u32; 4];
                    for i in 0..dimx {
                        out[i] = if op == ExprOp::Add {
                            a[i].wrapping_add(b[i])
                        } else {
                            a[i].wrapping_mul(b[i])
                        };
                    }
                    ConstantValue::Uint(out)
                }
                _ => {
                    tracing::debug!(target: "codegen.fold", op = op.name(), "unsupported uint fold");
                    return false;
                }
            }
        }

        BaseType::Double => {
            // Double-precision constant arithmetic is not emitted.
            ctx.diags.fixme(loc, "fold double constant");
            return false;
        }

        _ => {
            tracing::debug!(
                target: "codegen.fold",
                base = result_base.name(),
                op = op.name(),
                "unsupported fold"
            );
            return false;
        }
    };

    let res = ctx.new_constant(value, ty, loc);
    ctx.block_insert_before(block, instr, res);
    ctx.replace_node(instr, res);
    true
}
