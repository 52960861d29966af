//! Shared helpers for the middle-end tests: tiny programs built straight
//! through the IR builder, standing in for the external parser frontend.
#![allow(dead_code)] // each test binary uses its own subset

use shade_ir::{BlockId, Context, NodeId, NodeKind, Register, Var, VarId};
use shade_types::{
    BaseType, CompileOptions, Modifiers, Semantic, SourceLocation, TypeId, find_profile,
};

pub fn ctx_for(profile: &str) -> Context {
    Context::new(find_profile(profile).unwrap(), CompileOptions::default())
}

pub fn loc() -> SourceLocation {
    SourceLocation::new(1, 1)
}

/// Register `body` as the entry function `main` with the given parameters
/// and return variable.
pub fn install_entry(
    ctx: &mut Context,
    body: BlockId,
    parameters: Vec<VarId>,
    return_type: TypeId,
    return_var: Option<VarId>,
) {
    let decl = shade_ir::FunctionDecl {
        return_type,
        return_var,
        parameters,
        semantic: None,
        body: Some(body),
        loc: loc(),
    };
    ctx.add_function_decl("main", decl, false);
}

/// An `in` parameter bound to a semantic.
pub fn input_param(ctx: &mut Context, name: &str, ty: TypeId, semantic: &str, index: u32) -> VarId {
    let mut var = Var::new(name, ty, loc());
    var.modifiers |= Modifiers::IN;
    var.semantic = Some(Semantic::new(semantic, index));
    var.is_param = true;
    ctx.add_var(var)
}

/// A return variable bound to a semantic.
pub fn return_var(ctx: &mut Context, ty: TypeId, semantic: &str, index: u32) -> VarId {
    let mut var = Var::new("<retval>", ty, loc());
    var.semantic = Some(Semantic::new(semantic, index));
    ctx.add_var(var)
}

pub fn float4(ctx: &mut Context) -> TypeId {
    ctx.types.vector(BaseType::Float, 4)
}

/// Count live nodes of the body (recursively) matching `pred`.
pub fn count_nodes(ctx: &Context, block: BlockId, pred: &dyn Fn(&shade_ir::Node) -> bool) -> usize {
    let mut count = 0;
    for id in ctx.block_instrs(block) {
        let node = ctx.node(id);
        match &node.kind {
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => {
                count += count_nodes(ctx, *then_block, pred);
                count += count_nodes(ctx, *else_block, pred);
            }
            NodeKind::Loop { body, .. } => count += count_nodes(ctx, *body, pred),
            _ => {}
        }
        if pred(node) {
            count += 1;
        }
    }
    count
}

/// One allocated lifetime, for overlap checking.
pub struct Lifetime {
    pub what: String,
    pub reg: Register,
    pub reg_size: u32,
    pub first_write: u32,
    pub last_read: u32,
}

fn collect_block_lifetimes(ctx: &Context, block: BlockId, out: &mut Vec<Lifetime>) {
    for id in ctx.block_instrs(block) {
        let node = ctx.node(id);
        match &node.kind {
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => {
                collect_block_lifetimes(ctx, *then_block, out);
                collect_block_lifetimes(ctx, *else_block, out);
            }
            NodeKind::Loop { body, .. } => collect_block_lifetimes(ctx, *body, out),
            // Constants end up in the const register file, not the temps.
            NodeKind::Constant(_) => continue,
            _ => {}
        }
        if node.reg.allocated {
            out.push(Lifetime {
                what: format!("node @{}", node.index),
                reg: node.reg,
                reg_size: ctx.types.get(node.ty).reg_size,
                first_write: node.index,
                last_read: node.last_read,
            });
        }
    }
}

/// Every allocated temp lifetime in the program: anonymous nodes plus temp
/// variables.
pub fn temp_lifetimes(ctx: &Context, body: BlockId) -> Vec<Lifetime> {
    let mut out = Vec::new();
    collect_block_lifetimes(ctx, body, &mut out);
    for var in ctx.var_ids() {
        let v = ctx.var(var);
        if v.is_temp() && v.reg.allocated {
            out.push(Lifetime {
                what: format!("var {}", v.name),
                reg: v.reg,
                reg_size: ctx.types.get(v.ty).reg_size,
                first_write: v.first_write,
                last_read: v.last_read,
            });
        }
    }
    out
}

/// Assert that no two overlapping lifetimes share a register component.
pub fn assert_no_register_overlap(lifetimes: &[Lifetime]) {
    for (i, a) in lifetimes.iter().enumerate() {
        for b in &lifetimes[i + 1..] {
            // Exclusive at the endpoints, like the allocator's
            // `last_read <= first_write` availability rule.
            let time_overlap = a.first_write < b.last_read && b.first_write < a.last_read;
            if !time_overlap {
                continue;
            }
            let a_regs = a.reg.id..a.reg.id + a.reg_size.max(1);
            let b_regs = b.reg.id..b.reg.id + b.reg_size.max(1);
            let reg_overlap = a_regs.start < b_regs.end && b_regs.start < a_regs.end;
            if !reg_overlap {
                continue;
            }
            // Same register: single-register allocations may still be packed
            // into disjoint components.
            if a.reg_size <= 1 && b.reg_size <= 1 && a.reg.id == b.reg.id {
                assert!(
                    (a.reg.writemask & b.reg.writemask).is_empty(),
                    "{} and {} share components of r{}",
                    a.what,
                    b.what,
                    a.reg.id
                );
            } else {
                panic!("{} and {} overlap in r{}..", a.what, b.what, a.reg.id.max(b.reg.id));
            }
        }
    }
}

/// Fetch the single node satisfying `pred`.
pub fn find_node(
    ctx: &Context,
    block: BlockId,
    pred: &dyn Fn(&shade_ir::Node) -> bool,
) -> Option<NodeId> {
    let mut found = None;
    for id in ctx.block_instrs(block) {
        if pred(ctx.node(id)) {
            assert!(found.is_none(), "more than one matching node");
            found = Some(id);
        }
    }
    found
}
