//! The generic block walker and the structural rewrite passes.
//!
//! Every pass is a function over `(ctx, block, node)` returning a progress
//! bit; the walker recurses into conditional and loop bodies before visiting
//! each node. Rewrites that replace a node go through `Context::replace_node`
//! so the src/use bijection survives every pass.

use shade_ir::{BlockId, Context, ExprOp, NodeId, NodeKind, SrcSlot, Swizzle, Writemask};
use shade_types::{TypeClass, TypeId};

pub type PassFn = fn(&mut Context, BlockId, NodeId) -> bool;

/// Apply `func` to every node of `block`, recursing into nested blocks
/// first. Returns whether any application reported progress.
pub fn transform_ir(ctx: &mut Context, func: PassFn, block: BlockId) -> bool {
    let mut progress = false;
    for instr in ctx.block_instrs(block) {
        if ctx.node(instr).dead {
            continue;
        }
        let nested: Vec<BlockId> = match &ctx.node(instr).kind {
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            NodeKind::Loop { body, .. } => vec![*body],
            _ => Vec::new(),
        };
        for inner in nested {
            progress |= transform_ir(ctx, func, inner);
        }
        progress |= func(ctx, block, instr);
    }
    progress
}

fn cast_parts(ctx: &Context, instr: NodeId) -> Option<(NodeId, TypeId, TypeId)> {
    let NodeKind::Expr {
        op: ExprOp::Cast,
        operands,
    } = &ctx.node(instr).kind
    else {
        return None;
    };
    let src = operands[0]?;
    Some((src, ctx.node(src).ty, ctx.node(instr).ty))
}

/// Lower casts from vec1 to vecN to a scalar cast plus an `.x` fan-out
/// swizzle.
pub fn lower_broadcasts(ctx: &mut Context, block: BlockId, instr: NodeId) -> bool {
    let Some((src, src_ty, dst_ty)) = cast_parts(ctx, instr) else {
        return false;
    };
    let (src_type, dst_type) = (ctx.types.get(src_ty), ctx.types.get(dst_ty));
    if !src_type.is_single_reg() || !dst_type.is_single_reg() || src_type.dimx != 1 {
        return false;
    }
    let (dst_base, dst_dimx) = (dst_type.base, dst_type.dimx);
    let loc = ctx.node(instr).loc;

    // Keep the cast: it might be doing more than widening.
    let dst_scalar = ctx.types.scalar(dst_base);
    let new_cast = ctx.new_cast(src, dst_scalar, loc);
    ctx.block_insert_after(block, instr, new_cast);
    let swizzle = ctx.new_swizzle(Swizzle::SPLAT_X, dst_dimx, new_cast, loc);
    ctx.block_insert_after(block, new_cast, swizzle);

    ctx.replace_node(instr, swizzle);
    true
}

/// Drop casts that don't change the type, or that only rename one-wide
/// shapes of the same base.
pub fn fold_redundant_casts(ctx: &mut Context, _block: BlockId, instr: NodeId) -> bool {
    let Some((src, src_ty, dst_ty)) = cast_parts(ctx, instr) else {
        return false;
    };
    let (src_type, dst_type) = (ctx.types.get(src_ty), ctx.types.get(dst_ty));
    if ctx.types.equal(src_ty, dst_ty)
        || (src_type.base == dst_type.base && src_type.is_vec1() && dst_type.is_vec1())
    {
        ctx.replace_node(instr, src);
        return true;
    }
    false
}

/// Shared helper for the aggregate-splitting passes: synthesize one
/// element/field copy right before `store`.
fn split_copy(
    ctx: &mut Context,
    block: BlockId,
    store: NodeId,
    rhs_load: NodeId,
    offset: u32,
    ty: TypeId,
) {
    let loc = ctx.node(store).loc;
    let c = ctx.new_uint_constant(offset, loc);
    ctx.block_insert_before(block, store, c);

    let NodeKind::Load(load_deref) = ctx.node(rhs_load).kind.clone() else {
        unreachable!("split_copy rhs is a load");
    };
    let mut offset_instr = c;
    if let Some(load_offset) = load_deref.offset {
        let add = ctx.new_binary_expr(ExprOp::Add, load_offset, c);
        ctx.block_insert_before(block, store, add);
        offset_instr = add;
    }
    let split_load = ctx.new_load(load_deref.var, Some(offset_instr), ty, loc);
    ctx.block_insert_before(block, store, split_load);

    let NodeKind::Store { lhs, .. } = ctx.node(store).kind.clone() else {
        unreachable!("split_copy target is a store");
    };
    let mut offset_instr = c;
    if let Some(store_offset) = lhs.offset {
        let add = ctx.new_binary_expr(ExprOp::Add, store_offset, c);
        ctx.block_insert_before(block, store, add);
        offset_instr = add;
    }
    let split_store = ctx.new_store(
        lhs.var,
        Some(offset_instr),
        split_load,
        Writemask::empty(),
        loc,
    );
    ctx.block_insert_before(block, store, split_store);
}

fn store_rhs_load(ctx: &Context, instr: NodeId) -> Option<NodeId> {
    let NodeKind::Store { rhs, .. } = &ctx.node(instr).kind else {
        return None;
    };
    let rhs = (*rhs)?;
    matches!(ctx.node(rhs).kind, NodeKind::Load(_)).then_some(rhs)
}

/// Replace a whole-array store by per-element copies at computed offsets.
pub fn split_array_copies(ctx: &mut Context, block: BlockId, instr: NodeId) -> bool {
    let Some(rhs) = store_rhs_load(ctx, instr) else {
        return false;
    };
    let rhs_ty = ctx.node(rhs).ty;
    let shade_types::TypeExtra::Array { element, count } = ctx.types.get(rhs_ty).extra.clone()
    else {
        return false;
    };
    let element_size = ctx.types.get(element).reg_size;

    for i in 0..count {
        split_copy(ctx, block, instr, rhs, i * element_size, element);
    }

    // Remove the store so that nested aggregates keep splitting; stores
    // produce no value so no use can dangle.
    ctx.remove_and_free(instr);
    true
}

/// Replace a whole-struct store by per-field copies at field offsets.
pub fn split_struct_copies(ctx: &mut Context, block: BlockId, instr: NodeId) -> bool {
    let Some(rhs) = store_rhs_load(ctx, instr) else {
        return false;
    };
    let rhs_ty = ctx.node(rhs).ty;
    let shade_types::TypeExtra::Record { fields } = ctx.types.get(rhs_ty).extra.clone() else {
        return false;
    };

    for field in &fields {
        split_copy(ctx, block, instr, rhs, field.reg_offset, field.ty);
    }

    ctx.remove_and_free(instr);
    true
}

/// Lower width-reducing casts to a same-width cast plus a truncating
/// swizzle.
pub fn lower_narrowing_casts(ctx: &mut Context, block: BlockId, instr: NodeId) -> bool {
    let Some((src, src_ty, dst_ty)) = cast_parts(ctx, instr) else {
        return false;
    };
    let (src_type, dst_type) = (ctx.types.get(src_ty), ctx.types.get(dst_ty));
    if !src_type.is_single_reg() || !dst_type.is_single_reg() || dst_type.dimx >= src_type.dimx {
        return false;
    }
    let (dst_base, dst_dimx, src_dimx) = (dst_type.base, dst_type.dimx, src_type.dimx);
    let loc = ctx.node(instr).loc;

    // Keep the cast: it might be doing more than narrowing.
    let dst_vector = ctx.types.vector(dst_base, src_dimx);
    let new_cast = ctx.new_cast(src, dst_vector, loc);
    ctx.block_insert_after(block, instr, new_cast);
    let swizzle = ctx.new_swizzle(Swizzle::IDENTITY, dst_dimx, new_cast, loc);
    ctx.block_insert_after(block, new_cast, swizzle);

    ctx.replace_node(instr, swizzle);
    true
}

/// Remove identity swizzles by rerouting their uses to the source.
pub fn remove_trivial_swizzles(ctx: &mut Context, _block: BlockId, instr: NodeId) -> bool {
    let NodeKind::Swizzle { swizzle, src } = ctx.node(instr).kind.clone() else {
        return false;
    };
    let src = src.expect("swizzle without a source");
    let width = ctx.types.get(ctx.node(instr).ty).dimx;
    if width != ctx.types.get(ctx.node(src).ty).dimx || !swizzle.is_identity(width) {
        return false;
    }
    ctx.replace_node(instr, src);
    true
}

/// Lower `a / b` to `a * rcp(b)` for legacy targets.
pub fn lower_division(ctx: &mut Context, block: BlockId, instr: NodeId) -> bool {
    let NodeKind::Expr {
        op: ExprOp::Div,
        operands,
    } = ctx.node(instr).kind.clone()
    else {
        return false;
    };
    let divisor = operands[1].expect("division without a divisor");
    let loc = ctx.node(instr).loc;
    let rcp = ctx.new_unary_expr(ExprOp::Rcp, divisor, loc);
    ctx.block_insert_before(block, instr, rcp);
    if let NodeKind::Expr { op, .. } = &mut ctx.node_mut(instr).kind {
        *op = ExprOp::Mul;
    }
    ctx.set_src(instr, SrcSlot::Operand(1), Some(rcp));
    true
}

/// Dead-code elimination. Value-producing nodes with no uses are removed;
/// stores to variables with no later read are removed. Requires fresh
/// liveness indices.
pub fn dce(ctx: &mut Context, _block: BlockId, instr: NodeId) -> bool {
    enum Disposition {
        Value,
        Store(shade_ir::VarId),
        Keep,
    }
    let disposition = match &ctx.node(instr).kind {
        NodeKind::Constant(_)
        | NodeKind::Expr { .. }
        | NodeKind::Load(_)
        | NodeKind::ResourceLoad { .. }
        | NodeKind::Swizzle { .. } => Disposition::Value,
        NodeKind::Store { lhs, .. } => Disposition::Store(lhs.var),
        NodeKind::If { .. } | NodeKind::Jump(_) | NodeKind::Loop { .. } => Disposition::Keep,
    };
    match disposition {
        Disposition::Value => {
            if ctx.node(instr).uses.is_empty() {
                ctx.remove_and_free(instr);
                return true;
            }
        }
        Disposition::Store(var) => {
            if ctx.var(var).last_read < ctx.node(instr).index {
                ctx.remove_and_free(instr);
                return true;
            }
        }
        Disposition::Keep => {}
    }
    false
}

/// Object-typed loads keep their deref; everything else is fair game for
/// propagation.
pub fn type_is_object(ctx: &Context, ty: TypeId) -> bool {
    ctx.types.get(ty).class == TypeClass::Object
}
