//! Node constructors and the expression/assignment building API used by the
//! parser frontend and the lowering passes.
//!
//! Plain `new_*` constructors create detached nodes; the caller links them
//! into a block. The `add_*` helpers append to a block and perform the
//! type-driven work: common-type computation, implicit casts with truncation
//! warnings, and assignment decomposition with swizzle inversion.

use crate::ctx::Context;
use crate::node::{
    BlockId, ConstantValue, Deref, ExprOp, JumpKind, NodeId, NodeKind, ResourceLoadKind, SrcSlot,
    VarId,
};
use crate::swizzle::{Swizzle, Writemask};
use shade_types::{CommonTypeError, ErrorCode, SourceLocation, TypeClass, TypeId};

/// Invert a swizzled store: from the declared swizzle and the writemask of
/// the underlying assignment, compute the writemask on the variable and the
/// swizzle to apply to the right-hand side. Fails when the swizzle writes a
/// component twice. Returns the width of the rewritten right-hand side.
pub fn invert_swizzle(swizzle: &mut Swizzle, writemask: &mut Writemask) -> Option<u32> {
    // Apply the writemask to the swizzle to get a new writemask and swizzle.
    let mut new_swizzle = 0u32;
    let mut new_writemask = 0u8;
    let mut bit = 0u32;
    for i in 0..4 {
        if writemask.bits() & (1 << i) != 0 {
            let s = swizzle.component(i);
            new_swizzle |= s << (bit * 2);
            bit += 1;
            if new_writemask & (1 << s) != 0 {
                return None;
            }
            new_writemask |= 1 << s;
        }
    }
    let width = bit;

    // Invert the swizzle.
    let mut inverted = 0u32;
    let mut bit = 0u32;
    for i in 0..4 {
        for j in 0..width {
            let s = (new_swizzle >> (j * 2)) & 3;
            if s == i {
                inverted |= j << (bit * 2);
                bit += 1;
            }
        }
    }

    *swizzle = Swizzle(inverted);
    *writemask = Writemask::from_bits_truncate(new_writemask);
    Some(width)
}

impl Context {
    pub fn new_constant(
        &mut self,
        value: ConstantValue,
        ty: TypeId,
        loc: SourceLocation,
    ) -> NodeId {
        self.add_node(NodeKind::Constant(value), ty, loc)
    }

    pub fn new_uint_constant(&mut self, value: u32, loc: SourceLocation) -> NodeId {
        let ty = self.types.scalar(shade_types::BaseType::Uint);
        self.new_constant(ConstantValue::Uint([value, 0, 0, 0]), ty, loc)
    }

    pub fn new_int_constant(&mut self, value: i32, loc: SourceLocation) -> NodeId {
        let ty = self.types.scalar(shade_types::BaseType::Int);
        self.new_constant(ConstantValue::Int([value, 0, 0, 0]), ty, loc)
    }

    pub fn new_float_constant(&mut self, value: f32, loc: SourceLocation) -> NodeId {
        let ty = self.types.scalar(shade_types::BaseType::Float);
        self.new_constant(ConstantValue::Float([value, 0.0, 0.0, 0.0]), ty, loc)
    }

    pub fn new_bool_constant(&mut self, value: bool, loc: SourceLocation) -> NodeId {
        let ty = self.types.scalar(shade_types::BaseType::Bool);
        self.new_constant(ConstantValue::Bool([value, false, false, false]), ty, loc)
    }

    pub fn new_expr(
        &mut self,
        op: ExprOp,
        operands: [Option<NodeId>; 3],
        ty: TypeId,
        loc: SourceLocation,
    ) -> NodeId {
        self.add_node(NodeKind::Expr { op, operands }, ty, loc)
    }

    /// Unary expression typed after its argument.
    pub fn new_unary_expr(&mut self, op: ExprOp, arg: NodeId, loc: SourceLocation) -> NodeId {
        let ty = self.node(arg).ty;
        self.new_expr(op, [Some(arg), None, None], ty, loc)
    }

    /// Binary expression typed after its first argument.
    pub fn new_binary_expr(&mut self, op: ExprOp, arg1: NodeId, arg2: NodeId) -> NodeId {
        let (ty, loc) = (self.node(arg1).ty, self.node(arg1).loc);
        self.new_expr(op, [Some(arg1), Some(arg2), None], ty, loc)
    }

    pub fn new_cast(&mut self, node: NodeId, ty: TypeId, loc: SourceLocation) -> NodeId {
        self.new_expr(ExprOp::Cast, [Some(node), None, None], ty, loc)
    }

    /// A swizzle of the given output width over `src`.
    pub fn new_swizzle(
        &mut self,
        swizzle: Swizzle,
        width: u32,
        src: NodeId,
        loc: SourceLocation,
    ) -> NodeId {
        let base = self.types.get(self.node(src).ty).base;
        let ty = self.types.vector(base, width);
        self.add_node(
            NodeKind::Swizzle {
                swizzle,
                src: Some(src),
            },
            ty,
            loc,
        )
    }

    pub fn new_var_load(&mut self, var: VarId, loc: SourceLocation) -> NodeId {
        let ty = self.var(var).ty;
        self.new_load(var, None, ty, loc)
    }

    pub fn new_load(
        &mut self,
        var: VarId,
        offset: Option<NodeId>,
        ty: TypeId,
        loc: SourceLocation,
    ) -> NodeId {
        self.add_node(NodeKind::Load(Deref { var, offset }), ty, loc)
    }

    /// A store to `var` at `offset`. An empty writemask is widened to cover
    /// the right-hand side when it is scalar/vector shaped.
    pub fn new_store(
        &mut self,
        var: VarId,
        offset: Option<NodeId>,
        rhs: NodeId,
        mut writemask: Writemask,
        loc: SourceLocation,
    ) -> NodeId {
        let rhs_ty = self.node(rhs).ty;
        let rhs_type = self.types.get(rhs_ty);
        if writemask.is_empty() && rhs_type.is_single_reg() {
            writemask = Writemask::from_width(rhs_type.dimx);
        }
        self.add_node(
            NodeKind::Store {
                lhs: Deref { var, offset },
                rhs: Some(rhs),
                writemask,
            },
            rhs_ty,
            loc,
        )
    }

    pub fn new_simple_store(&mut self, var: VarId, rhs: NodeId) -> NodeId {
        let loc = self.node(rhs).loc;
        self.new_store(var, None, rhs, Writemask::empty(), loc)
    }

    pub fn new_if(&mut self, condition: NodeId, loc: SourceLocation) -> NodeId {
        let then_block = self.new_block();
        let else_block = self.new_block();
        let ty = self.node(condition).ty;
        self.add_node(
            NodeKind::If {
                condition: Some(condition),
                then_block,
                else_block,
            },
            ty,
            loc,
        )
    }

    pub fn new_loop(&mut self, loc: SourceLocation) -> NodeId {
        let body = self.new_block();
        let ty = self.types.scalar(shade_types::BaseType::Float);
        self.add_node(NodeKind::Loop { body, next_index: 0 }, ty, loc)
    }

    pub fn new_jump(&mut self, kind: JumpKind, loc: SourceLocation) -> NodeId {
        let ty = self.types.scalar(shade_types::BaseType::Float);
        self.add_node(NodeKind::Jump(kind), ty, loc)
    }

    pub fn new_resource_load(
        &mut self,
        kind: ResourceLoadKind,
        resource: Deref,
        sampler: Option<Deref>,
        coords: NodeId,
        ty: TypeId,
        loc: SourceLocation,
    ) -> NodeId {
        self.add_node(
            NodeKind::ResourceLoad {
                kind,
                resource,
                sampler,
                coords: Some(coords),
            },
            ty,
            loc,
        )
    }

    /// Convert `node` to `dst_ty`, appending a cast to `block` when one is
    /// needed. Reports incompatibility and warns on truncation.
    pub fn add_implicit_conversion(
        &mut self,
        block: BlockId,
        node: NodeId,
        dst_ty: TypeId,
        loc: SourceLocation,
    ) -> Option<NodeId> {
        let src_ty = self.node(node).ty;
        if self.types.equal(src_ty, dst_ty) {
            return Some(node);
        }
        if !self.types.implicit_compatible(src_ty, dst_ty) {
            let (from, to) = (self.types.name(src_ty), self.types.name(dst_ty));
            self.diags.error(
                loc,
                ErrorCode::IncompatibleTypes,
                format!("can't implicitly convert {from} to {to}"),
            );
            return None;
        }
        let (src, dst) = (self.types.get(src_ty), self.types.get(dst_ty));
        if dst.dimx * dst.dimy < src.dimx * src.dimy {
            self.diags
                .warning(loc, "implicit truncation of vector type");
        }
        tracing::trace!(
            target: "ir.builder",
            from = %self.types.name(src_ty),
            to = %self.types.name(dst_ty),
            "implicit conversion"
        );
        let cast = self.new_cast(node, dst_ty, loc);
        self.block_push_tail(block, cast);
        Some(cast)
    }

    /// Build an expression over already-linked operands: compute the common
    /// type, cast mismatched operands (warning about truncation), and append
    /// the expression. Relational operators produce a bool-shaped result.
    pub fn add_expr(
        &mut self,
        block: BlockId,
        op: ExprOp,
        operands: [Option<NodeId>; 3],
        loc: SourceLocation,
    ) -> Option<NodeId> {
        let mut common = self.node(operands[0].expect("expression without operands")).ty;
        for operand in operands.iter().skip(1).flatten() {
            let operand_ty = self.node(*operand).ty;
            common = match self.types.expr_common_type(common, operand_ty) {
                Ok(ty) => ty,
                Err(CommonTypeError::NonNumeric) => {
                    self.diags.error(
                        loc,
                        ErrorCode::TypeMismatch,
                        "non scalar/vector/matrix data type in expression",
                    );
                    return None;
                }
                Err(CommonTypeError::Incompatible) => {
                    self.diags.error(
                        loc,
                        ErrorCode::IncompatibleTypes,
                        "expression data types are incompatible",
                    );
                    return None;
                }
            };
        }

        let mut converted = operands;
        for slot in converted.iter_mut() {
            let Some(operand) = *slot else { continue };
            let operand_ty = self.node(operand).ty;
            if self.types.equal(operand_ty, common) {
                continue;
            }
            let (src, dst) = (self.types.get(operand_ty), self.types.get(common));
            if src.dimx * src.dimy != 1 && src.dimx * src.dimy != dst.dimx * dst.dimy {
                let operand_loc = self.node(operand).loc;
                self.diags
                    .warning(operand_loc, "implicit truncation of vector/matrix type");
            }
            let operand_loc = self.node(operand).loc;
            let cast = self.new_cast(operand, common, operand_loc);
            self.block_push_tail(block, cast);
            *slot = Some(cast);
        }

        let result_ty = if op.is_comparison() {
            let shape = self.types.get(common).clone();
            match shape.class {
                TypeClass::Scalar => self.types.scalar(shade_types::BaseType::Bool),
                TypeClass::Vector => self.types.vector(shade_types::BaseType::Bool, shape.dimx),
                _ => self.types.matrix(
                    shade_types::BaseType::Bool,
                    shape.dimx,
                    shape.dimy,
                    shade_types::Modifiers::empty(),
                ),
            }
        } else {
            common
        };

        let expr = self.new_expr(op, converted, result_ty, loc);
        self.block_push_tail(block, expr);
        Some(expr)
    }

    /// Decompose an assignment into a store, converting a swizzled left-hand
    /// side by swizzle inversion. `compound_op` carries the `+=`-family
    /// operator, if any. Returns the store node.
    pub fn add_assignment(
        &mut self,
        block: BlockId,
        lhs: NodeId,
        compound_op: Option<ExprOp>,
        rhs: NodeId,
    ) -> Option<NodeId> {
        let lhs_type = self.node(lhs).ty;
        let mut writemask = Writemask::empty();
        let mut rhs = rhs;
        if self.types.get(lhs_type).class.is_numeric() {
            writemask = Writemask::from_width(self.types.get(lhs_type).dimx);
            let rhs_loc = self.node(rhs).loc;
            rhs = self.add_implicit_conversion(block, rhs, lhs_type, rhs_loc)?;
        }

        let mut lhs = lhs;
        loop {
            match self.node(lhs).kind.clone() {
                NodeKind::Load(_) => break,
                NodeKind::Expr {
                    op: ExprOp::Cast, ..
                } => {
                    let loc = self.node(lhs).loc;
                    self.diags.fixme(loc, "cast on the lhs");
                    return None;
                }
                NodeKind::Swizzle { mut swizzle, src } => {
                    let swizzle_node = lhs;
                    let loc = self.node(swizzle_node).loc;
                    let swizzle_ty = self.node(swizzle_node).ty;
                    if self.types.get(lhs_type).class == TypeClass::Matrix {
                        self.diags
                            .fixme(loc, "writemask assignments with a matrix lhs");
                    }

                    let lhs_inner = src.expect("swizzle without a source");
                    self.set_src(swizzle_node, SrcSlot::SwizzleSrc, None);
                    let swizzle_block = self
                        .node(swizzle_node)
                        .block
                        .expect("assignment lhs outside a block");
                    self.block_remove(swizzle_block, swizzle_node);

                    let rhs_block = self.node(rhs).block.expect("assignment rhs outside a block");
                    self.block_insert_after(rhs_block, rhs, swizzle_node);
                    self.set_src(swizzle_node, SrcSlot::SwizzleSrc, Some(rhs));

                    let Some(width) = invert_swizzle(&mut swizzle, &mut writemask) else {
                        self.diags
                            .error(loc, ErrorCode::InvalidWriteMask, "invalid writemask");
                        return None;
                    };
                    debug_assert_eq!(self.types.get(swizzle_ty).class, TypeClass::Vector);
                    let base = self.types.get(swizzle_ty).base;
                    if self.types.get(swizzle_ty).dimx != width {
                        self.node_mut(swizzle_node).ty = self.types.vector(base, width);
                    }
                    if let NodeKind::Swizzle { swizzle: s, .. } =
                        &mut self.node_mut(swizzle_node).kind
                    {
                        *s = swizzle;
                    }
                    rhs = swizzle_node;
                    lhs = lhs_inner;
                }
                _ => {
                    let loc = self.node(lhs).loc;
                    self.diags
                        .error(loc, ErrorCode::InvalidLValue, "invalid lvalue");
                    return None;
                }
            }
        }

        let NodeKind::Load(deref) = self.node(lhs).kind.clone() else {
            unreachable!("loop exits on a load");
        };
        if let Some(op) = compound_op {
            let expr = self.new_binary_expr(op, lhs, rhs);
            let rhs_block = self.node(rhs).block.expect("assignment rhs outside a block");
            self.block_insert_after(rhs_block, rhs, expr);
            rhs = expr;
        }
        let loc = self.node(lhs).loc;
        let store = self.new_store(deref.var, deref.offset, rhs, writemask, loc);
        self.node_mut(store).ty = lhs_type;
        self.block_push_tail(block, store);
        Some(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::Var;
    use shade_types::{BaseType, CompileOptions, find_profile};

    fn ctx() -> Context {
        Context::new(find_profile("ps_2_0").unwrap(), CompileOptions::default())
    }

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    #[test]
    fn invert_simple_swizzle() {
        // v.zx = e: writing .zx means e.x lands in z and e.y in x. The
        // variable writemask becomes .xz and the rhs swizzle .yx.
        let mut swizzle = Swizzle::from_components(&[2, 0]);
        let mut writemask = Writemask::from_width(2);
        let width = invert_swizzle(&mut swizzle, &mut writemask).unwrap();
        assert_eq!(width, 2);
        assert_eq!(writemask, Writemask::X | Writemask::Z);
        assert_eq!(swizzle.display(2), ".yx");
    }

    #[test]
    fn invert_rejects_duplicate_component() {
        let mut swizzle = Swizzle::from_components(&[1, 1]);
        let mut writemask = Writemask::from_width(2);
        assert!(invert_swizzle(&mut swizzle, &mut writemask).is_none());
    }

    #[test]
    fn add_expr_casts_mismatched_operands() {
        let mut ctx = ctx();
        let block = ctx.new_block();
        let a = ctx.new_float_constant(1.0, loc());
        ctx.block_push_tail(block, a);
        let b = ctx.new_int_constant(2, loc());
        ctx.block_push_tail(block, b);
        let sum = ctx
            .add_expr(block, ExprOp::Add, [Some(a), Some(b), None], loc())
            .unwrap();
        // The int operand is cast to float; the result is float.
        let f = ctx.types.scalar(BaseType::Float);
        assert!(ctx.types.equal(ctx.node(sum).ty, f));
        let NodeKind::Expr { operands, .. } = &ctx.node(sum).kind else {
            panic!("expected expr");
        };
        let casted = operands[1].unwrap();
        assert!(matches!(
            ctx.node(casted).kind,
            NodeKind::Expr {
                op: ExprOp::Cast,
                ..
            }
        ));
        assert_ne!(casted, b);
    }

    #[test]
    fn add_expr_comparison_is_bool_shaped() {
        let mut ctx = ctx();
        let block = ctx.new_block();
        let a = ctx.new_float_constant(1.0, loc());
        ctx.block_push_tail(block, a);
        let b = ctx.new_float_constant(2.0, loc());
        ctx.block_push_tail(block, b);
        let cmp = ctx
            .add_expr(block, ExprOp::Less, [Some(a), Some(b), None], loc())
            .unwrap();
        assert_eq!(ctx.types.get(ctx.node(cmp).ty).base, BaseType::Bool);
    }

    #[test]
    fn use_lists_mirror_src_slots() {
        let mut ctx = ctx();
        let a = ctx.new_float_constant(1.0, loc());
        let e = ctx.new_unary_expr(ExprOp::Neg, a, loc());
        assert_eq!(ctx.node(a).uses, vec![(e, SrcSlot::Operand(0))]);
        let e2 = ctx.new_unary_expr(ExprOp::Abs, a, loc());
        assert_eq!(ctx.node(a).uses.len(), 2);
        // Replacing reroutes all uses.
        let b = ctx.new_float_constant(2.0, loc());
        ctx.replace_node(a, b);
        assert!(ctx.node(a).dead);
        assert_eq!(ctx.node(b).uses.len(), 2);
        assert_eq!(ctx.src(e, SrcSlot::Operand(0)), Some(b));
        assert_eq!(ctx.src(e2, SrcSlot::Operand(0)), Some(b));
    }

    #[test]
    fn swizzled_assignment_inverts_onto_store() {
        let mut ctx = ctx();
        let block = ctx.new_block();
        let f4 = ctx.types.vector(BaseType::Float, 4);
        let f2 = ctx.types.vector(BaseType::Float, 2);
        let v = ctx.add_var(Var::new("v", f4, loc()));

        // lhs: v.zx (as a load + swizzle), rhs: a float2 constant.
        let load = ctx.new_var_load(v, loc());
        ctx.block_push_tail(block, load);
        let lhs = ctx.new_swizzle(Swizzle::from_components(&[2, 0]), 2, load, loc());
        ctx.block_push_tail(block, lhs);
        let rhs = ctx.new_constant(ConstantValue::Float([9.0, 7.0, 0.0, 0.0]), f2, loc());
        ctx.block_push_tail(block, rhs);

        let store = ctx.add_assignment(block, lhs, None, rhs).unwrap();
        let NodeKind::Store {
            lhs: deref,
            rhs: stored,
            writemask,
        } = &ctx.node(store).kind
        else {
            panic!("expected store");
        };
        assert_eq!(deref.var, v);
        assert_eq!(*writemask, Writemask::X | Writemask::Z);
        // The rhs is now the inverted swizzle of the original rhs.
        let stored = stored.unwrap();
        let NodeKind::Swizzle { swizzle, src } = &ctx.node(stored).kind else {
            panic!("expected swizzle rhs");
        };
        assert_eq!(src.unwrap(), rhs);
        assert_eq!(swizzle.display(2), ".yx");
        assert!(!ctx.diags.failed());
    }

    #[test]
    fn assignment_to_non_lvalue_reports() {
        let mut ctx = ctx();
        let block = ctx.new_block();
        let a = ctx.new_float_constant(1.0, loc());
        ctx.block_push_tail(block, a);
        let b = ctx.new_float_constant(2.0, loc());
        ctx.block_push_tail(block, b);
        assert!(ctx.add_assignment(block, a, None, b).is_none());
        assert_eq!(ctx.diags.result(), Some(ErrorCode::InvalidLValue));
    }
}
