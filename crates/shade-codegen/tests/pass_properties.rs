//! Property tests over the transformation passes: algebraic folding laws,
//! pass idempotence, and structural invariants of the rewritten IR.

mod common;

use common::*;
use proptest::prelude::*;
use shade_codegen::{copyprop, driver, fold, liveness, xform};
use shade_ir::{ConstantValue, Context, ExprOp, NodeKind, Swizzle, Var, Writemask, dump};
use shade_types::{BaseType, Semantic};

/// Build `((a op1 b) op2 c)` out of uint constants, fold to a fixed point,
/// and return the bits of the surviving constant.
fn fold_uint_expr(a: u32, b: u32, c: u32, op1: ExprOp, op2: ExprOp) -> u32 {
    let mut ctx = ctx_for("ps_2_0");
    let uint1 = ctx.types.scalar(BaseType::Uint);
    let mut out = Var::new("<output-color0>", uint1, loc());
    out.is_output_semantic = true;
    out.semantic = Some(Semantic::new("color", 0));
    let out = ctx.add_var(out);
    ctx.extern_vars.push(out);

    let body = ctx.new_block();
    let ca = ctx.new_uint_constant(a, loc());
    ctx.block_push_tail(body, ca);
    let cb = ctx.new_uint_constant(b, loc());
    ctx.block_push_tail(body, cb);
    let e1 = ctx.new_binary_expr(op1, ca, cb);
    ctx.block_push_tail(body, e1);
    let cc = ctx.new_uint_constant(c, loc());
    ctx.block_push_tail(body, cc);
    let e2 = ctx.new_binary_expr(op2, e1, cc);
    ctx.block_push_tail(body, e2);
    let store = ctx.new_simple_store(out, e2);
    ctx.block_push_tail(body, store);

    while xform::transform_ir(&mut ctx, fold::fold_constants, body) {}
    driver::verify_use_lists(&ctx).unwrap();

    let store_rhs = ctx
        .src(store, shade_ir::SrcSlot::StoreRhs)
        .expect("store keeps a rhs");
    let NodeKind::Constant(ConstantValue::Uint(v)) = &ctx.node(store_rhs).kind else {
        panic!("folding did not produce a constant");
    };
    v[0]
}

/// A two-variable straight-line program exercising partial writemasks and
/// swizzled loads; `seed` perturbs masks and component orders.
fn copyprop_program(seed: u8) -> (Context, shade_ir::BlockId) {
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let v = ctx.add_var(Var::new("v", f4, loc()));
    let w = ctx.add_var(Var::new("w", f4, loc()));
    let mut out = Var::new("<output-color0>", f4, loc());
    out.is_output_semantic = true;
    out.semantic = Some(Semantic::new("color", 0));
    let out = ctx.add_var(out);
    ctx.extern_vars.push(out);

    let body = ctx.new_block();
    let c1 = ctx.new_constant(ConstantValue::Float([1.0, 2.0, 3.0, 4.0]), f4, loc());
    ctx.block_push_tail(body, c1);
    let s1 = ctx.new_simple_store(v, c1);
    ctx.block_push_tail(body, s1);

    let mask = Writemask::from_bits_truncate((seed % 15) + 1);
    let width = mask.component_count();
    let f_narrow = ctx.types.vector(BaseType::Float, width);
    let c2 = ctx.new_constant(ConstantValue::Float([9.0, 8.0, 7.0, 6.0]), f_narrow, loc());
    ctx.block_push_tail(body, c2);
    let s2 = ctx.new_store(v, None, c2, mask, loc());
    ctx.block_push_tail(body, s2);

    let l1 = ctx.new_var_load(v, loc());
    ctx.block_push_tail(body, l1);
    let order = [
        (seed % 4) as u32,
        (seed.wrapping_add(1) % 4) as u32,
        (seed.wrapping_add(2) % 4) as u32,
        (seed.wrapping_add(3) % 4) as u32,
    ];
    let sw = ctx.new_swizzle(Swizzle::from_components(&order), 4, l1, loc());
    ctx.block_push_tail(body, sw);
    let s3 = ctx.new_simple_store(w, sw);
    ctx.block_push_tail(body, s3);

    let l2 = ctx.new_var_load(w, loc());
    ctx.block_push_tail(body, l2);
    let s4 = ctx.new_simple_store(out, l2);
    ctx.block_push_tail(body, s4);

    (ctx, body)
}

proptest! {
    // (a + b) * c folds to the same bits as a*c + b*c, wrapping.
    #[test]
    fn fold_distributes_over_uint_add(a: u32, b: u32, c: u32) {
        let lhs = fold_uint_expr(a, b, c, ExprOp::Add, ExprOp::Mul);

        // a*c + b*c, built as (a*c) + (b*c) via two folds.
        let partial = fold_uint_expr(a, c, b.wrapping_mul(c), ExprOp::Mul, ExprOp::Add);
        prop_assert_eq!(lhs, partial);
        prop_assert_eq!(lhs, a.wrapping_add(b).wrapping_mul(c));
    }

    // Casting a uint constant to float folds to the rounded f32 value.
    #[test]
    fn fold_uint_to_float_cast(x: u32) {
        let mut ctx = ctx_for("ps_2_0");
        let float1 = ctx.types.scalar(BaseType::Float);
        let mut out = Var::new("<output-color0>", float1, loc());
        out.is_output_semantic = true;
        out.semantic = Some(Semantic::new("color", 0));
        let out = ctx.add_var(out);
        ctx.extern_vars.push(out);

        let body = ctx.new_block();
        let c = ctx.new_uint_constant(x, loc());
        ctx.block_push_tail(body, c);
        let cast = ctx.new_cast(c, float1, loc());
        ctx.block_push_tail(body, cast);
        let store = ctx.new_simple_store(out, cast);
        ctx.block_push_tail(body, store);

        while xform::transform_ir(&mut ctx, fold::fold_constants, body) {}

        let rhs = ctx.src(store, shade_ir::SrcSlot::StoreRhs).unwrap();
        let NodeKind::Constant(ConstantValue::Float(v)) = &ctx.node(rhs).kind else {
            panic!("cast did not fold");
        };
        prop_assert_eq!(v[0].to_bits(), (x as f32).to_bits());
    }

    // Running copy propagation twice produces the same IR as running it
    // once.
    #[test]
    fn copy_propagation_is_idempotent(seed in 0u8..=255) {
        let (mut ctx, body) = copyprop_program(seed);
        copyprop::copy_propagation_execute(&mut ctx, body);
        driver::verify_use_lists(&ctx).unwrap();
        let after_first = dump::dump_block(&ctx, body);
        let progress = copyprop::copy_propagation_execute(&mut ctx, body);
        prop_assert!(!progress, "second run reported progress");
        prop_assert_eq!(after_first, dump::dump_block(&ctx, body));
    }

    // After DCE reaches a fixed point, another sweep is a no-op.
    #[test]
    fn dce_fixed_point_is_stable(seed in 0u8..=255) {
        let (mut ctx, body) = copyprop_program(seed);
        shade_codegen::run_passes(&mut ctx, body);
        driver::verify_use_lists(&ctx).unwrap();
        liveness::compute_liveness(&mut ctx, body);
        let progress = xform::transform_ir(&mut ctx, xform::dce, body);
        prop_assert!(!progress, "DCE after fixed point reported progress");
    }

    // The src/use bijection survives every pass in the standard sequence.
    #[test]
    fn use_lists_stay_bijective_through_passes(seed in 0u8..=255) {
        let (mut ctx, body) = copyprop_program(seed);
        xform::transform_ir(&mut ctx, xform::lower_broadcasts, body);
        driver::verify_use_lists(&ctx).unwrap();
        while xform::transform_ir(&mut ctx, xform::fold_redundant_casts, body) {}
        driver::verify_use_lists(&ctx).unwrap();
        loop {
            let mut p = xform::transform_ir(&mut ctx, xform::split_array_copies, body);
            p |= xform::transform_ir(&mut ctx, xform::split_struct_copies, body);
            if !p {
                break;
            }
        }
        driver::verify_use_lists(&ctx).unwrap();
        xform::transform_ir(&mut ctx, xform::lower_narrowing_casts, body);
        driver::verify_use_lists(&ctx).unwrap();
        loop {
            let mut p = xform::transform_ir(&mut ctx, fold::fold_constants, body);
            p |= copyprop::copy_propagation_execute(&mut ctx, body);
            if !p {
                break;
            }
        }
        driver::verify_use_lists(&ctx).unwrap();
        xform::transform_ir(&mut ctx, xform::remove_trivial_swizzles, body);
        driver::verify_use_lists(&ctx).unwrap();
        loop {
            liveness::compute_liveness(&mut ctx, body);
            if !xform::transform_ir(&mut ctx, xform::dce, body) {
                break;
            }
        }
        driver::verify_use_lists(&ctx).unwrap();
    }

    // Liveness intervals are ordered, and allocated temps never collide.
    #[test]
    fn allocation_respects_liveness(seed in 0u8..=255) {
        let (mut ctx, body) = copyprop_program(seed);
        shade_codegen::run_passes(&mut ctx, body);
        for var in ctx.var_ids().collect::<Vec<_>>() {
            let v = ctx.var(var);
            if v.last_read > 0 && v.first_write > 0 {
                prop_assert!(v.first_write <= v.last_read);
            }
        }
        shade_codegen::alloc::allocate_temp_registers(&mut ctx, body);
        let lifetimes = temp_lifetimes(&ctx, body);
        assert_no_register_overlap(&lifetimes);
    }
}
