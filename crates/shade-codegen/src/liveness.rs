//! Liveness analysis.
//!
//! Every instruction gets a unique pre-order index starting at 2 (0 means
//! "not in the program", 1 is the synthetic entry point). Variables then get
//! `[first_write, last_read]` intervals. Accesses inside a loop are widened
//! to the loop's full extent; anonymous nodes are not, since no node value
//! can flow from one loop iteration to the next. Conditionals don't widen.

use shade_ir::{BlockId, Context, NodeKind};

/// Assign ordered indices to every instruction of `block`, starting at
/// `index`. Loop nodes record the index just past their body.
pub fn index_instructions(ctx: &mut Context, block: BlockId, mut index: u32) -> u32 {
    for instr in ctx.block_instrs(block) {
        ctx.node_mut(instr).index = index;
        index += 1;

        match ctx.node(instr).kind {
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => {
                index = index_instructions(ctx, then_block, index);
                index = index_instructions(ctx, else_block, index);
            }
            NodeKind::Loop { body, .. } => {
                index = index_instructions(ctx, body, index);
                if let NodeKind::Loop { next_index, .. } = &mut ctx.node_mut(instr).kind {
                    *next_index = index;
                }
            }
            _ => {}
        }
    }
    index
}

fn compute_liveness_recurse(ctx: &mut Context, block: BlockId, loop_first: u32, loop_last: u32) {
    for instr in ctx.block_instrs(block) {
        let index = ctx.node(instr).index;
        // A variable access inside a loop stays live until the loop ends.
        let var_last_read = if loop_last != 0 {
            index.max(loop_last)
        } else {
            index
        };

        match ctx.node(instr).kind.clone() {
            NodeKind::Store { lhs, rhs, .. } => {
                let var = ctx.var_mut(lhs.var);
                if var.first_write == 0 {
                    var.first_write = if loop_first != 0 {
                        index.min(loop_first)
                    } else {
                        index
                    };
                }
                if let Some(rhs) = rhs {
                    ctx.node_mut(rhs).last_read = index;
                }
                if let Some(offset) = lhs.offset {
                    ctx.node_mut(offset).last_read = index;
                }
            }
            NodeKind::Expr { operands, .. } => {
                for operand in operands.iter().flatten() {
                    ctx.node_mut(*operand).last_read = index;
                }
            }
            NodeKind::If {
                condition,
                then_block,
                else_block,
            } => {
                compute_liveness_recurse(ctx, then_block, loop_first, loop_last);
                compute_liveness_recurse(ctx, else_block, loop_first, loop_last);
                if let Some(condition) = condition {
                    ctx.node_mut(condition).last_read = index;
                }
            }
            NodeKind::Load(deref) => {
                let var = ctx.var_mut(deref.var);
                var.last_read = var.last_read.max(var_last_read);
                if let Some(offset) = deref.offset {
                    ctx.node_mut(offset).last_read = index;
                }
            }
            NodeKind::Loop { body, next_index } => {
                compute_liveness_recurse(
                    ctx,
                    body,
                    if loop_first != 0 { loop_first } else { index },
                    if loop_last != 0 { loop_last } else { next_index },
                );
            }
            NodeKind::ResourceLoad {
                resource,
                sampler,
                coords,
                ..
            } => {
                let var = ctx.var_mut(resource.var);
                var.last_read = var.last_read.max(var_last_read);
                if let Some(offset) = resource.offset {
                    ctx.node_mut(offset).last_read = index;
                }
                if let Some(sampler) = sampler {
                    let var = ctx.var_mut(sampler.var);
                    var.last_read = var.last_read.max(var_last_read);
                    if let Some(offset) = sampler.offset {
                        ctx.node_mut(offset).last_read = index;
                    }
                }
                if let Some(coords) = coords {
                    ctx.node_mut(coords).last_read = index;
                }
            }
            NodeKind::Swizzle { src, .. } => {
                if let Some(src) = src {
                    ctx.node_mut(src).last_read = index;
                }
            }
            NodeKind::Constant(_) | NodeKind::Jump(_) => {}
        }
    }
}

/// Recompute indices and liveness intervals for the whole program.
pub fn compute_liveness(ctx: &mut Context, body: BlockId) {
    // Index 0 means unused; index 1 means function entry, so start at 2.
    index_instructions(ctx, body, 2);

    for node in ctx.node_ids().collect::<Vec<_>>() {
        ctx.node_mut(node).last_read = 0;
    }

    for var in ctx.var_ids().collect::<Vec<_>>() {
        let var = ctx.var_mut(var);
        var.first_write = 0;
        var.last_read = 0;
    }

    for var in ctx.extern_vars.clone() {
        let var = ctx.var_mut(var);
        if var.is_uniform || var.is_input_semantic {
            var.first_write = 1;
        } else if var.is_output_semantic {
            var.last_read = u32::MAX;
        }
    }

    compute_liveness_recurse(ctx, body, 0, 0);
}
