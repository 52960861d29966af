//! End-to-end middle-end scenarios, driving hand-built IR through the full
//! pass pipeline the way a parser frontend would.

mod common;

use common::*;
use shade_codegen::{alloc, compile_function, driver, liveness, run_passes};
use shade_ir::{
    Buffer, BufferKind, ConstantValue, NodeKind, Swizzle, Var, Writemask,
};
use shade_types::{BaseType, ErrorCode, Modifiers, RegReservation, Semantic, Severity};

#[test]
fn colour_passthrough_compiles_to_single_constant_store() {
    // PS returns float4(0.25, 0.5, 0.75, 1.0).
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let ret = return_var(&mut ctx, f4, "color", 0);
    let body = ctx.new_block();

    let c = ctx.new_constant(
        ConstantValue::Float([0.25, 0.5, 0.75, 1.0]),
        f4,
        loc(),
    );
    ctx.block_push_tail(body, c);
    let store = ctx.new_simple_store(ret, c);
    ctx.block_push_tail(body, store);
    install_entry(&mut ctx, body, Vec::new(), f4, Some(ret));

    let input = compile_function(&mut ctx, "main").unwrap();
    assert_eq!(input.outputs.len(), 1);
    assert_eq!(input.inputs.len(), 0);

    // The constant keeps its exact value in the literal table.
    let c_node = find_node(&ctx, body, &|n| {
        matches!(n.kind, NodeKind::Constant(_)) && n.reg.allocated
    })
    .expect("constant should be const-register allocated");
    let reg = ctx.node(c_node).reg;
    assert_eq!(ctx.constant_defs[reg.id as usize], [0.25, 0.5, 0.75, 1.0]);

    driver::verify_use_lists(&ctx).unwrap();
}

#[test]
fn copy_propagation_across_swizzle_leaves_no_temp() {
    // float4 t = in; return t.yxwz; -- the temp disappears entirely.
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let p = input_param(&mut ctx, "v_in", f4, "texcoord", 0);
    let t = ctx.add_var(Var::new("t", f4, loc()));
    let ret = return_var(&mut ctx, f4, "color", 0);
    let body = ctx.new_block();

    let l1 = ctx.new_var_load(p, loc());
    ctx.block_push_tail(body, l1);
    let s1 = ctx.new_simple_store(t, l1);
    ctx.block_push_tail(body, s1);
    let l2 = ctx.new_var_load(t, loc());
    ctx.block_push_tail(body, l2);
    let sw = ctx.new_swizzle(Swizzle::from_components(&[1, 0, 3, 2]), 4, l2, loc());
    ctx.block_push_tail(body, sw);
    let s2 = ctx.new_simple_store(ret, sw);
    ctx.block_push_tail(body, s2);
    install_entry(&mut ctx, body, vec![p], f4, Some(ret));

    compile_function(&mut ctx, "main").unwrap();

    // One load (of the input half), one swizzle, one store (to the output
    // half): a single MOV with no intermediate temp.
    assert_eq!(
        count_nodes(&ctx, body, &|n| matches!(n.kind, NodeKind::Load(_))),
        1
    );
    assert_eq!(
        count_nodes(&ctx, body, &|n| matches!(n.kind, NodeKind::Swizzle { .. })),
        1
    );
    assert_eq!(
        count_nodes(&ctx, body, &|n| matches!(n.kind, NodeKind::Store { .. })),
        1
    );

    let load = find_node(&ctx, body, &|n| matches!(n.kind, NodeKind::Load(_))).unwrap();
    let NodeKind::Load(deref) = &ctx.node(load).kind else {
        unreachable!();
    };
    assert!(ctx.var(deref.var).is_input_semantic);

    let store = find_node(&ctx, body, &|n| matches!(n.kind, NodeKind::Store { .. })).unwrap();
    let NodeKind::Store { lhs, .. } = &ctx.node(store).kind else {
        unreachable!();
    };
    assert!(ctx.var(lhs.var).is_output_semantic);

    driver::verify_use_lists(&ctx).unwrap();
}

#[test]
fn unsigned_wraparound_folds_to_single_constant() {
    // (0u - 1u) + 1u folds to exactly one zero constant.
    let mut ctx = ctx_for("ps_2_0");
    let uint1 = ctx.types.scalar(BaseType::Uint);
    let mut out = Var::new("<output-color0>", uint1, loc());
    out.is_output_semantic = true;
    out.semantic = Some(Semantic::new("color", 0));
    let out = ctx.add_var(out);
    ctx.extern_vars.push(out);

    let body = ctx.new_block();
    let one = ctx.new_uint_constant(1, loc());
    ctx.block_push_tail(body, one);
    let neg = ctx.new_unary_expr(shade_ir::ExprOp::Neg, one, loc());
    ctx.block_push_tail(body, neg);
    let one_again = ctx.new_uint_constant(1, loc());
    ctx.block_push_tail(body, one_again);
    let sum = ctx.new_binary_expr(shade_ir::ExprOp::Add, neg, one_again);
    ctx.block_push_tail(body, sum);
    let store = ctx.new_simple_store(out, sum);
    ctx.block_push_tail(body, store);

    run_passes(&mut ctx, body);

    assert_eq!(
        count_nodes(&ctx, body, &|n| matches!(n.kind, NodeKind::Expr { .. })),
        0
    );
    assert_eq!(
        count_nodes(&ctx, body, &|n| matches!(n.kind, NodeKind::Constant(_))),
        1
    );
    let c = find_node(&ctx, body, &|n| matches!(n.kind, NodeKind::Constant(_))).unwrap();
    let NodeKind::Constant(ConstantValue::Uint(v)) = &ctx.node(c).kind else {
        panic!("expected a uint constant");
    };
    assert_eq!(v[0], 0);
    driver::verify_use_lists(&ctx).unwrap();
}

#[test]
fn swizzled_assignment_stores_through_inverted_writemask() {
    // float4 v; v.zx = float2(9, 7); return v;
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let f2 = ctx.types.vector(BaseType::Float, 2);
    let v = ctx.add_var(Var::new("v", f4, loc()));
    let ret = return_var(&mut ctx, f4, "color", 0);
    let body = ctx.new_block();

    let l = ctx.new_var_load(v, loc());
    ctx.block_push_tail(body, l);
    let lhs = ctx.new_swizzle(Swizzle::from_components(&[2, 0]), 2, l, loc());
    ctx.block_push_tail(body, lhs);
    let rhs = ctx.new_constant(ConstantValue::Float([9.0, 7.0, 0.0, 0.0]), f2, loc());
    ctx.block_push_tail(body, rhs);
    ctx.add_assignment(body, lhs, None, rhs).unwrap();

    let l2 = ctx.new_var_load(v, loc());
    ctx.block_push_tail(body, l2);
    let s = ctx.new_simple_store(ret, l2);
    ctx.block_push_tail(body, s);
    install_entry(&mut ctx, body, Vec::new(), f4, Some(ret));

    compile_function(&mut ctx, "main").unwrap();

    // The store to v writes exactly .xz; the partially-defined v cannot be
    // propagated away, so its load survives.
    let store = find_node(&ctx, body, &|n| {
        matches!(n.kind, NodeKind::Store { writemask, .. }
            if writemask == (Writemask::X | Writemask::Z))
    });
    assert!(store.is_some(), "store with inverted writemask survives");
    assert_eq!(
        count_nodes(&ctx, body, &|n| matches!(n.kind, NodeKind::Load(_))),
        1
    );

    // The literal lands in the const table as (9, 7).
    let c = find_node(&ctx, body, &|n| matches!(n.kind, NodeKind::Constant(_))).unwrap();
    let reg = ctx.node(c).reg;
    assert!(reg.allocated);
    assert_eq!(ctx.constant_defs[reg.id as usize][0], 9.0);
    assert_eq!(ctx.constant_defs[reg.id as usize][1], 7.0);

    let lifetimes = temp_lifetimes(&ctx, body);
    assert_no_register_overlap(&lifetimes);
}

#[test]
fn uniform_splits_into_extern_and_temp_halves() {
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let mut g = Var::new("global_tint", f4, loc());
    g.modifiers |= Modifiers::UNIFORM;
    let globals = ctx.globals_scope;
    let g = ctx.declare(globals, g, false).unwrap();

    let ret = return_var(&mut ctx, f4, "color", 0);
    let body = ctx.new_block();
    let l = ctx.new_var_load(g, loc());
    ctx.block_push_tail(body, l);
    let s = ctx.new_simple_store(ret, l);
    ctx.block_push_tail(body, s);
    install_entry(&mut ctx, body, Vec::new(), f4, Some(ret));

    let input = compile_function(&mut ctx, "main").unwrap();

    // The external half keeps the original name and owns a const register;
    // the temp half was renamed.
    assert_eq!(input.uniforms.len(), 1);
    let uniform = ctx.var(input.uniforms[0]);
    assert_eq!(uniform.name, "global_tint");
    assert!(uniform.is_uniform);
    assert!(uniform.reg.allocated);
    assert_eq!(ctx.var(g).name, "<temp-global_tint>");
}

#[test]
fn struct_field_without_semantic_is_reported() {
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let field = shade_types::StructField {
        name: "value".to_string(),
        ty: f4,
        semantic: None,
        modifiers: Modifiers::empty(),
        reg_offset: 0,
        loc: loc(),
    };
    let record = ctx.types.record(Some("ps_input".to_string()), vec![field]);
    let mut p = Var::new("input", record, loc());
    p.modifiers |= Modifiers::IN;
    p.is_param = true;
    let p = ctx.add_var(p);

    let ret = return_var(&mut ctx, f4, "color", 0);
    let body = ctx.new_block();
    let c = ctx.new_constant(ConstantValue::Float([0.0; 4]), f4, loc());
    ctx.block_push_tail(body, c);
    let s = ctx.new_simple_store(ret, c);
    ctx.block_push_tail(body, s);
    install_entry(&mut ctx, body, vec![p], f4, Some(ret));

    let err = compile_function(&mut ctx, "main").unwrap_err();
    assert_eq!(err, ErrorCode::MissingSemantic);
}

#[test]
fn buffer_layout_packs_and_avoids_straddle() {
    let mut ctx = ctx_for("ps_4_0");
    let f1 = ctx.types.scalar(BaseType::Float);
    let f3 = ctx.types.vector(BaseType::Float, 3);
    let f2 = ctx.types.vector(BaseType::Float, 2);

    let mk_uniform = |ctx: &mut shade_ir::Context, name: &str, ty| {
        let mut var = Var::new(name, ty, loc());
        var.is_uniform = true;
        var.last_read = 7;
        let id = ctx.add_var(var);
        ctx.extern_vars.push(id);
        id
    };
    let a = mk_uniform(&mut ctx, "a", f1);
    let b = mk_uniform(&mut ctx, "b", f3);
    let c = mk_uniform(&mut ctx, "c", f3);
    let d = mk_uniform(&mut ctx, "d", f2);

    alloc::allocate_buffers(&mut ctx);

    // a and b pack into one register; c starts the next; d would straddle
    // after c and is pushed to the register after that.
    assert_eq!(ctx.var(a).buffer_offset, 0);
    assert_eq!(ctx.var(b).buffer_offset, 1);
    assert_eq!(ctx.var(c).buffer_offset, 4);
    assert_eq!(ctx.var(d).buffer_offset, 8);

    let buffer = ctx.buffer(ctx.var(a).buffer.unwrap());
    assert!(buffer.reg.allocated);
    assert_eq!(buffer.reg.id, 0);
}

#[test]
fn overlapping_buffer_reservations_are_diagnosed_with_note() {
    let mut ctx = ctx_for("ps_4_0");
    let f4 = float4(&mut ctx);

    let first_loc = shade_types::SourceLocation::new(3, 1);
    let second_loc = shade_types::SourceLocation::new(9, 1);
    let buf_a = ctx.add_buffer(Buffer {
        name: "per_frame".to_string(),
        kind: BufferKind::Constant,
        reservation: Some(RegReservation::new('b', 2)),
        loc: first_loc,
        size: 0,
        used_size: 0,
        reg: Default::default(),
    });
    let buf_b = ctx.add_buffer(Buffer {
        name: "per_object".to_string(),
        kind: BufferKind::Constant,
        reservation: Some(RegReservation::new('b', 2)),
        loc: second_loc,
        size: 0,
        used_size: 0,
        reg: Default::default(),
    });

    for (name, buf) in [("u1", buf_a), ("u2", buf_b)] {
        let mut var = Var::new(name, f4, loc());
        var.is_uniform = true;
        var.buffer = Some(buf);
        var.last_read = 5;
        let id = ctx.add_var(var);
        ctx.extern_vars.push(id);
    }

    alloc::allocate_buffers(&mut ctx);

    assert_eq!(ctx.diags.result(), Some(ErrorCode::OverlappingReservations));
    let note = ctx
        .diags
        .diagnostics()
        .iter()
        .find(|d| d.severity == Severity::Note)
        .expect("a note pointing at the first binding");
    assert_eq!(note.loc, first_loc);
    assert!(note.message.contains("already bound to cb2"));
}

#[test]
fn non_b_buffer_reservation_is_invalid() {
    let mut ctx = ctx_for("ps_4_0");
    let f4 = float4(&mut ctx);
    let buf = ctx.add_buffer(Buffer {
        name: "wrong".to_string(),
        kind: BufferKind::Constant,
        reservation: Some(RegReservation::new('c', 1)),
        loc: loc(),
        size: 0,
        used_size: 0,
        reg: Default::default(),
    });
    let mut var = Var::new("u", f4, loc());
    var.is_uniform = true;
    var.buffer = Some(buf);
    var.last_read = 3;
    let id = ctx.add_var(var);
    ctx.extern_vars.push(id);

    alloc::allocate_buffers(&mut ctx);
    assert_eq!(ctx.diags.result(), Some(ErrorCode::InvalidReservation));
}

#[test]
fn resource_loads_reach_object_registers() {
    // texld-style sampling: the texture and sampler travel through the
    // object allocators and stay live across the whole program.
    let mut ctx = ctx_for("ps_4_0");
    let f4 = float4(&mut ctx);
    let f2 = ctx.types.vector(BaseType::Float, 2);
    let tex_ty = ctx
        .types
        .object(BaseType::Texture, shade_types::SamplerDim::Dim2D);
    let samp_ty = ctx
        .types
        .object(BaseType::Sampler, shade_types::SamplerDim::Dim2D);

    let mk_object = |ctx: &mut shade_ir::Context, name: &str, ty| {
        let mut var = Var::new(name, ty, loc());
        var.is_uniform = true;
        let id = ctx.add_var(var);
        ctx.extern_vars.push(id);
        id
    };
    let tex = mk_object(&mut ctx, "diffuse_map", tex_ty);
    let samp = mk_object(&mut ctx, "diffuse_sampler", samp_ty);
    let ret = return_var(&mut ctx, f4, "sv_target", 0);

    let body = ctx.new_block();
    let coords = ctx.new_constant(ConstantValue::Float([0.5, 0.5, 0.0, 0.0]), f2, loc());
    ctx.block_push_tail(body, coords);
    let sample = ctx.new_resource_load(
        shade_ir::ResourceLoadKind::Sample,
        shade_ir::Deref::direct(tex),
        Some(shade_ir::Deref::direct(samp)),
        coords,
        f4,
        loc(),
    );
    ctx.block_push_tail(body, sample);
    let s = ctx.new_simple_store(ret, sample);
    ctx.block_push_tail(body, s);
    install_entry(&mut ctx, body, Vec::new(), f4, Some(ret));

    compile_function(&mut ctx, "main").unwrap();

    assert!(ctx.var(tex).last_read > 0);
    assert!(ctx.var(samp).last_read > 0);
    assert!(ctx.var(tex).reg.allocated);
    assert_eq!(ctx.var(tex).reg.id, 0);
    assert!(ctx.var(samp).reg.allocated);
    assert_eq!(ctx.var(samp).reg.id, 0);
    driver::verify_use_lists(&ctx).unwrap();
}

#[test]
fn overlapping_object_reservations_are_diagnosed() {
    let mut ctx = ctx_for("ps_2_0");
    let samp_ty = ctx
        .types
        .object(BaseType::Sampler, shade_types::SamplerDim::Dim2D);
    for name in ["first", "second"] {
        let mut var = Var::new(name, samp_ty, loc());
        var.is_uniform = true;
        var.reservation = Some(RegReservation::new('s', 0));
        var.last_read = 9;
        let id = ctx.add_var(var);
        ctx.extern_vars.push(id);
    }
    alloc::allocate_objects(&mut ctx, BaseType::Sampler);
    assert_eq!(ctx.diags.result(), Some(ErrorCode::OverlappingReservations));
}

#[test]
fn liveness_widens_variable_intervals_inside_loops() {
    let mut ctx = ctx_for("ps_2_0");
    let f4 = float4(&mut ctx);
    let v = ctx.add_var(Var::new("acc", f4, loc()));
    let mut out = Var::new("<output-color0>", f4, loc());
    out.is_output_semantic = true;
    out.semantic = Some(Semantic::new("color", 0));
    let out = ctx.add_var(out);
    ctx.extern_vars.push(out);

    let body = ctx.new_block();
    let c = ctx.new_constant(ConstantValue::Float([1.0; 4]), f4, loc());
    ctx.block_push_tail(body, c);
    let looped = ctx.new_loop(loc());
    ctx.block_push_tail(body, looped);
    let NodeKind::Loop { body: loop_body, .. } = ctx.node(looped).kind.clone() else {
        unreachable!();
    };
    let s_in_loop = ctx.new_simple_store(v, c);
    ctx.block_push_tail(loop_body, s_in_loop);
    let brk = ctx.new_jump(shade_ir::JumpKind::Break, loc());
    ctx.block_push_tail(loop_body, brk);
    let l = ctx.new_var_load(v, loc());
    ctx.block_push_tail(body, l);
    let s = ctx.new_simple_store(out, l);
    ctx.block_push_tail(body, s);

    liveness::compute_liveness(&mut ctx, body);

    let loop_index = ctx.node(looped).index;
    let NodeKind::Loop { next_index, .. } = ctx.node(looped).kind.clone() else {
        unreachable!();
    };
    // The store inside the loop is pulled back to the loop header.
    assert!(ctx.var(v).first_write <= loop_index);
    assert!(ctx.var(v).last_read >= next_index);
    // Sanity: intervals are ordered for every live variable.
    for var in ctx.var_ids() {
        let v = ctx.var(var);
        if v.last_read > 0 && v.first_write > 0 {
            assert!(v.first_write <= v.last_read);
        }
    }
}
