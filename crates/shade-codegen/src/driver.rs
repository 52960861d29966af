//! The compile driver: semantic lowering, the fixed-point pass sequence,
//! liveness, allocation, and hand-off to a back end.

use crate::backend::{Backend, BackendInput, EmitError};
use crate::{alloc, copyprop, fold, liveness, lower, xform};
use shade_ir::{BlockId, Context, VarId, dump};
use shade_types::{ErrorCode, Modifiers, TypeClass};

/// The external parser collaborator: builds typed IR into the context from
/// source text.
pub trait Frontend {
    fn parse(&mut self, ctx: &mut Context, source: &str, entry_point: &str)
    -> Result<(), ErrorCode>;
}

impl<F> Frontend for F
where
    F: FnMut(&mut Context, &str, &str) -> Result<(), ErrorCode>,
{
    fn parse(
        &mut self,
        ctx: &mut Context,
        source: &str,
        entry_point: &str,
    ) -> Result<(), ErrorCode> {
        self(ctx, source, entry_point)
    }
}

fn entry_parts(ctx: &Context, entry_point: &str) -> Option<(BlockId, Vec<VarId>, Option<VarId>)> {
    let func = ctx.get_function(entry_point)?;
    let decl = func.overloads.iter().find(|o| o.body.is_some())?;
    Some((decl.body.unwrap(), decl.parameters.clone(), decl.return_var))
}

/// Run the full middle end over the entry function. On success the IR is
/// fully annotated and ready for emission.
pub fn compile_function(ctx: &mut Context, entry_point: &str) -> Result<BackendInput, ErrorCode> {
    let Some((body, parameters, return_var)) = entry_parts(ctx, entry_point) else {
        return Err(ErrorCode::InvalidShader);
    };

    ctx.block_move_head(body, ctx.static_initializers);

    for var in ctx.scope(ctx.globals_scope).vars.clone() {
        if ctx.var(var).modifiers.contains(Modifiers::UNIFORM) {
            lower::prepend_uniform_copy(ctx, body, var);
        }
    }

    for param in &parameters {
        let v = ctx.var(*param);
        let class = ctx.types.get(v.ty).class;
        if class == TypeClass::Object || v.modifiers.contains(Modifiers::UNIFORM) {
            // Object parameters are always uniform.
            lower::prepend_uniform_copy(ctx, body, *param);
        } else {
            if class != TypeClass::Struct && v.semantic.is_none() {
                let (loc, name) = (v.loc, v.name.clone());
                ctx.diags.error(
                    loc,
                    ErrorCode::MissingSemantic,
                    format!("Parameter \"{name}\" is missing a semantic."),
                );
            }
            let modifiers = ctx.var(*param).modifiers;
            if modifiers.contains(Modifiers::IN) {
                lower::prepend_input_var_copy(ctx, body, *param);
            }
            if modifiers.contains(Modifiers::OUT) {
                lower::append_output_var_copy(ctx, body, *param);
            }
        }
    }

    if let Some(ret) = return_var {
        let v = ctx.var(ret);
        if ctx.types.get(v.ty).class != TypeClass::Struct && v.semantic.is_none() {
            let loc = v.loc;
            ctx.diags.error(
                loc,
                ErrorCode::MissingSemantic,
                format!("Entry point \"{entry_point}\" is missing a return value semantic."),
            );
        }
        lower::append_output_var_copy(ctx, body, ret);
    }

    run_passes(ctx, body);

    alloc::allocate_temp_registers(ctx, body);
    if ctx.profile.is_legacy() {
        alloc::allocate_const_registers(ctx, body);
    } else {
        alloc::allocate_buffers(ctx);
        alloc::allocate_objects(ctx, shade_types::BaseType::Texture);
    }
    alloc::allocate_semantic_registers(ctx);
    alloc::allocate_objects(ctx, shade_types::BaseType::Sampler);

    if let Some(code) = ctx.diags.result() {
        return Err(code);
    }

    Ok(backend_input(ctx, entry_point, body))
}

/// The fixed-point transformation sequence of the middle end, followed by
/// liveness-driven dead-code elimination.
pub fn run_passes(ctx: &mut Context, body: BlockId) {
    xform::transform_ir(ctx, xform::lower_broadcasts, body);
    while xform::transform_ir(ctx, xform::fold_redundant_casts, body) {}
    loop {
        let mut progress = xform::transform_ir(ctx, xform::split_array_copies, body);
        progress |= xform::transform_ir(ctx, xform::split_struct_copies, body);
        if !progress {
            break;
        }
    }
    xform::transform_ir(ctx, xform::lower_narrowing_casts, body);
    loop {
        let mut progress = xform::transform_ir(ctx, fold::fold_constants, body);
        progress |= copyprop::copy_propagation_execute(ctx, body);
        if !progress {
            break;
        }
    }
    xform::transform_ir(ctx, xform::remove_trivial_swizzles, body);

    if ctx.profile.is_legacy() {
        xform::transform_ir(ctx, xform::lower_division, body);
    }

    loop {
        liveness::compute_liveness(ctx, body);
        if !xform::transform_ir(ctx, xform::dce, body) {
            break;
        }
    }

    liveness::compute_liveness(ctx, body);

    tracing::trace!(target: "codegen.driver", ir = %dump::dump_block(ctx, body), "final IR");
}

fn backend_input(ctx: &Context, entry_point: &str, body: BlockId) -> BackendInput {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut uniforms = Vec::new();
    for var in &ctx.extern_vars {
        let v = ctx.var(*var);
        if v.is_input_semantic {
            inputs.push(*var);
        }
        if v.is_output_semantic {
            outputs.push(*var);
        }
        if v.is_uniform {
            uniforms.push(*var);
        }
    }
    let buffers = ctx
        .buffer_ids()
        .filter(|b| ctx.buffer(*b).used_size != 0)
        .collect();
    BackendInput {
        entry_point: entry_point.to_string(),
        body,
        inputs,
        outputs,
        uniforms,
        buffers,
        temp_count: ctx.temp_count,
    }
}

/// Compile and emit through the given back end.
pub fn compile_with_backend(
    ctx: &mut Context,
    entry_point: &str,
    backend: &dyn Backend,
) -> Result<Vec<u8>, CompileError> {
    let input = compile_function(ctx, entry_point).map_err(CompileError::Codegen)?;
    backend.emit(ctx, &input).map_err(CompileError::Emit)
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed: {0}")]
    Codegen(ErrorCode),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Sanity checks over the final IR, used by tests and debug builds: every
/// use list entry must name a live node whose slot points back.
pub fn verify_use_lists(ctx: &Context) -> Result<(), String> {
    for id in ctx.node_ids() {
        let node = ctx.node(id);
        if node.dead {
            continue;
        }
        for slot in node.kind.slots() {
            if let Some(target) = ctx.src(id, slot) {
                if ctx.node(target).dead {
                    return Err(format!("node {id:?} slot {slot:?} points at a dead node"));
                }
                let back = ctx
                    .node(target)
                    .uses
                    .iter()
                    .filter(|u| **u == (id, slot))
                    .count();
                if back != 1 {
                    return Err(format!(
                        "node {id:?} slot {slot:?}: {back} matching use entries"
                    ));
                }
            }
        }
        for (user, slot) in &node.uses {
            if ctx.node(*user).dead {
                return Err(format!("node {id:?} used by dead node {user:?}"));
            }
            if ctx.src(*user, *slot) != Some(id) {
                return Err(format!(
                    "node {id:?} use entry ({user:?}, {slot:?}) does not point back"
                ));
            }
        }
    }
    Ok(())
}
