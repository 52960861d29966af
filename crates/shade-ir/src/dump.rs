//! Textual IR dump, for trace logs and tests.

use crate::ctx::{Context, FunctionDecl};
use crate::node::{BlockId, ConstantValue, Deref, NodeId, NodeKind};
use crate::swizzle::Writemask;
use std::fmt::Write as _;

fn write_src(ctx: &Context, out: &mut String, src: Option<NodeId>) {
    match src {
        Some(id) if ctx.node(id).index != 0 => {
            let _ = write!(out, "@{}", ctx.node(id).index);
        }
        Some(id) => {
            let _ = write!(out, "%{}", id.0);
        }
        None => out.push_str("<none>"),
    }
}

fn write_deref(ctx: &Context, out: &mut String, deref: &Deref) {
    let var = ctx.var(deref.var);
    if deref.offset.is_some() {
        // Print the variable's type for convenience.
        let _ = write!(out, "({} {})", ctx.types.name(var.ty), var.name);
        out.push('[');
        write_src(ctx, out, deref.offset);
        out.push(']');
    } else {
        out.push_str(&var.name);
    }
}

fn write_constant(ctx: &Context, out: &mut String, id: NodeId, value: &ConstantValue) {
    let ty = ctx.types.get(ctx.node(id).ty);
    if ty.dimx != 1 {
        out.push('{');
    }
    for x in 0..ty.dimx as usize {
        match value {
            ConstantValue::Bool(v) => {
                let _ = write!(out, "{} ", if v[x] { "true" } else { "false" });
            }
            ConstantValue::Float(v) => {
                let _ = write!(out, "{:.8e} ", v[x]);
            }
            ConstantValue::Double(v) => {
                let _ = write!(out, "{:.16e} ", v[x]);
            }
            ConstantValue::Int(v) => {
                let _ = write!(out, "{} ", v[x]);
            }
            ConstantValue::Uint(v) => {
                let _ = write!(out, "{} ", v[x]);
            }
        }
    }
    if ty.dimx != 1 {
        out.push('}');
    }
}

fn write_instr(ctx: &Context, out: &mut String, id: NodeId) {
    let node = ctx.node(id);
    if node.index != 0 {
        let _ = write!(out, "{:4}: ", node.index);
    } else {
        let _ = write!(out, "  %{}: ", id.0);
    }
    let _ = write!(out, "{:>10} | ", ctx.types.name(node.ty));

    match &node.kind {
        NodeKind::Constant(value) => write_constant(ctx, out, id, value),
        NodeKind::Expr { op, operands } => {
            let name = if *op == crate::node::ExprOp::Cast {
                ctx.types.name(node.ty)
            } else {
                op.name().to_string()
            };
            let _ = write!(out, "{name} (");
            for operand in operands.iter().flatten() {
                write_src(ctx, out, Some(*operand));
                out.push(' ');
            }
            out.push(')');
        }
        NodeKind::Load(deref) => write_deref(ctx, out, deref),
        NodeKind::Store {
            lhs,
            rhs,
            writemask,
        } => {
            out.push_str("= (");
            write_deref(ctx, out, lhs);
            if *writemask != Writemask::ALL {
                let _ = write!(out, "{writemask}");
            }
            out.push(' ');
            write_src(ctx, out, *rhs);
            out.push(')');
        }
        NodeKind::Swizzle { swizzle, src } => {
            write_src(ctx, out, *src);
            let width = ctx.types.get(node.ty).dimx;
            out.push_str(&swizzle.display(width));
        }
        NodeKind::If {
            condition,
            then_block,
            else_block,
        } => {
            out.push_str("if (");
            write_src(ctx, out, *condition);
            out.push_str(")\n{\n");
            write_block(ctx, out, *then_block);
            out.push_str("}\nelse\n{\n");
            write_block(ctx, out, *else_block);
            out.push_str("}\n");
        }
        NodeKind::Jump(kind) => {
            let name = match kind {
                crate::node::JumpKind::Break => "break",
                crate::node::JumpKind::Continue => "continue",
                crate::node::JumpKind::Discard => "discard",
                crate::node::JumpKind::Return => "return",
            };
            out.push_str(name);
        }
        NodeKind::Loop { body, .. } => {
            out.push_str("for (;;)\n{\n");
            write_block(ctx, out, *body);
            out.push_str("}\n");
        }
        NodeKind::ResourceLoad {
            kind,
            resource,
            sampler,
            coords,
        } => {
            let name = match kind {
                crate::node::ResourceLoadKind::Load => "load_resource",
                crate::node::ResourceLoadKind::Sample => "sample",
            };
            let _ = write!(out, "{name} (");
            write_deref(ctx, out, resource);
            if let Some(sampler) = sampler {
                out.push_str(", ");
                write_deref(ctx, out, sampler);
            }
            out.push_str(", ");
            write_src(ctx, out, *coords);
            out.push(')');
        }
    }
}

fn write_block(ctx: &Context, out: &mut String, block: BlockId) {
    for id in &ctx.block(block).instrs {
        write_instr(ctx, out, *id);
        out.push('\n');
    }
}

/// Dump one instruction block.
pub fn dump_block(ctx: &Context, block: BlockId) -> String {
    let mut out = String::new();
    write_block(ctx, &mut out, block);
    out
}

/// Dump a function: parameters, semantic and body.
pub fn dump_function(ctx: &Context, name: &str, decl: &FunctionDecl) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dumping function {name}.");
    let _ = writeln!(out, "Function parameters:");
    for param in &decl.parameters {
        let var = ctx.var(*param);
        if !var.modifiers.is_empty() {
            let _ = write!(out, "{} ", var.modifiers.display());
        }
        let _ = write!(out, "{} {}", ctx.types.name(var.ty), var.name);
        if let Some(semantic) = &var.semantic {
            let _ = write!(out, " : {semantic}");
        }
        out.push('\n');
    }
    if let Some(semantic) = &decl.semantic {
        let _ = writeln!(out, "Function semantic: {semantic}");
    }
    if let Some(body) = decl.body {
        write_block(ctx, &mut out, body);
    }
    out
}
