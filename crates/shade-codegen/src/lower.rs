//! Semantic lowering: split externally-visible variables in two.
//!
//! Uniforms, inputs and outputs each become a pair of variables: the
//! external half (bound to a const register, input semantic or output
//! semantic) and a mutable temp half the function body keeps using. Copies
//! between the halves are prepended/appended to the entry block, recursing
//! into struct fields with precise register offsets.

use shade_ir::{BlockId, Context, Var, VarId};
use shade_types::{ErrorCode, Semantic, TypeClass, TypeExtra, TypeId};

/// Split a uniform into constant-register and temp halves, copying the
/// former into the latter at function entry so that writes to the uniform
/// work. The external half keeps the original name so reflection data stays
/// meaningful; the temp is renamed.
pub fn prepend_uniform_copy(ctx: &mut Context, instrs: BlockId, temp: VarId) {
    let temp_var = ctx.var(temp).clone();
    let mut uniform = Var::new(temp_var.name.clone(), temp_var.ty, temp_var.loc);
    uniform.reservation = temp_var.reservation;
    uniform.is_uniform = true;
    uniform.is_param = temp_var.is_param;
    uniform.buffer = temp_var.buffer;
    let uniform = ctx.add_var(uniform);
    ctx.extern_vars.push(uniform);

    ctx.var_mut(temp).name = format!("<temp-{}>", temp_var.name);

    let load = ctx.new_var_load(uniform, temp_var.loc);
    ctx.block_push_head(instrs, load);
    let store = ctx.new_simple_store(temp, load);
    ctx.block_insert_after(instrs, load, store);
}

fn prepend_input_copy(
    ctx: &mut Context,
    instrs: BlockId,
    var: VarId,
    ty: TypeId,
    field_offset: u32,
    semantic: &Semantic,
) {
    let loc = ctx.var(var).loc;
    let mut input = Var::new(format!("<input-{semantic}>"), ty, loc);
    input.semantic = Some(semantic.clone());
    input.is_input_semantic = true;
    input.is_param = ctx.var(var).is_param;
    let input = ctx.add_var(input);
    ctx.extern_vars.push(input);

    let load = ctx.new_var_load(input, loc);
    ctx.block_push_head(instrs, load);
    let offset = ctx.new_uint_constant(field_offset, loc);
    ctx.block_insert_after(instrs, load, offset);
    let store = ctx.new_store(var, Some(offset), load, shade_ir::Writemask::empty(), loc);
    ctx.block_insert_after(instrs, offset, store);
}

fn prepend_input_struct_copy(
    ctx: &mut Context,
    instrs: BlockId,
    var: VarId,
    ty: TypeId,
    field_offset: u32,
) {
    let TypeExtra::Record { fields } = ctx.types.get(ty).extra.clone() else {
        return;
    };
    for field in fields {
        if ctx.types.get(field.ty).class == TypeClass::Struct {
            prepend_input_struct_copy(ctx, instrs, var, field.ty, field_offset + field.reg_offset);
        } else if let Some(semantic) = field.semantic.clone() {
            prepend_input_copy(
                ctx,
                instrs,
                var,
                field.ty,
                field_offset + field.reg_offset,
                &semantic,
            );
        } else {
            ctx.diags.error(
                field.loc,
                ErrorCode::MissingSemantic,
                format!("Field '{}' is missing a semantic.", field.name),
            );
        }
    }
}

/// Split an input into semantic and temp halves so that writes to input
/// variables work.
pub fn prepend_input_var_copy(ctx: &mut Context, instrs: BlockId, var: VarId) {
    let ty = ctx.var(var).ty;
    if ctx.types.get(ty).class == TypeClass::Struct {
        prepend_input_struct_copy(ctx, instrs, var, ty, 0);
    } else if let Some(semantic) = ctx.var(var).semantic.clone() {
        prepend_input_copy(ctx, instrs, var, ty, 0, &semantic);
    }
}

fn append_output_copy(
    ctx: &mut Context,
    instrs: BlockId,
    var: VarId,
    ty: TypeId,
    field_offset: u32,
    semantic: &Semantic,
) {
    let loc = ctx.var(var).loc;
    let mut output = Var::new(format!("<output-{semantic}>"), ty, loc);
    output.semantic = Some(semantic.clone());
    output.is_output_semantic = true;
    output.is_param = ctx.var(var).is_param;
    let output = ctx.add_var(output);
    ctx.extern_vars.push(output);

    let offset = ctx.new_uint_constant(field_offset, loc);
    ctx.block_push_tail(instrs, offset);
    let load = ctx.new_load(var, Some(offset), ty, loc);
    ctx.block_insert_after(instrs, offset, load);
    let store = ctx.new_store(output, None, load, shade_ir::Writemask::empty(), loc);
    ctx.block_insert_after(instrs, load, store);
}

fn append_output_struct_copy(
    ctx: &mut Context,
    instrs: BlockId,
    var: VarId,
    ty: TypeId,
    field_offset: u32,
) {
    let TypeExtra::Record { fields } = ctx.types.get(ty).extra.clone() else {
        return;
    };
    for field in fields {
        if ctx.types.get(field.ty).class == TypeClass::Struct {
            append_output_struct_copy(ctx, instrs, var, field.ty, field_offset + field.reg_offset);
        } else if let Some(semantic) = field.semantic.clone() {
            append_output_copy(
                ctx,
                instrs,
                var,
                field.ty,
                field_offset + field.reg_offset,
                &semantic,
            );
        } else {
            ctx.diags.error(
                field.loc,
                ErrorCode::MissingSemantic,
                format!("Field '{}' is missing a semantic.", field.name),
            );
        }
    }
}

/// Split an output into temp and semantic halves so that reads from output
/// variables work.
pub fn append_output_var_copy(ctx: &mut Context, instrs: BlockId, var: VarId) {
    let ty = ctx.var(var).ty;
    if ctx.types.get(ty).class == TypeClass::Struct {
        append_output_struct_copy(ctx, instrs, var, ty, 0);
    } else if let Some(semantic) = ctx.var(var).semantic.clone() {
        append_output_copy(ctx, instrs, var, ty, 0, &semantic);
    }
}
