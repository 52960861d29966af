//! Register allocation.
//!
//! Two allocators share the liveness map: a writemask-packing allocator for
//! values that fit a single 4-component register, and a range allocator for
//! larger aggregates. On top of them sit the per-class passes: temps, legacy
//! const registers (with the literal table), semantic registers, constant
//! buffers and objects. Reservations always win; colliding live reservations
//! are diagnosed with a note at the first binding.

use crate::semantics;
use shade_ir::{
    BlockId, BufferId, BufferKind, ConstantValue, Context, Deref, NodeKind, Register, VarId,
    Writemask,
};
use shade_types::{BaseType, ErrorCode, TypeClass};

/// A growable array of per-component slots, each recording the time its
/// current occupant was last read. A slot is available at time `t` for a
/// lifetime `[w, r]` iff its last read is at most `w`.
#[derive(Debug, Default)]
pub struct LivenessMap {
    regs: Vec<u32>,
    pub reg_count: u32,
}

impl LivenessMap {
    /// The lowest-numbered writemask of `component_count` slots available in
    /// the register at `component_idx`, or empty if there aren't enough.
    fn available_writemask(
        &self,
        first_write: u32,
        component_idx: usize,
        component_count: u32,
    ) -> Writemask {
        let mut writemask = Writemask::empty();
        let mut count = 0;
        for i in 0..4 {
            if self.regs[component_idx + i] <= first_write {
                writemask |= Writemask::from_bits_truncate(1 << i);
                count += 1;
                if count == component_count {
                    return writemask;
                }
            }
        }
        Writemask::empty()
    }

    /// Writemask-packing allocation for `component_count <= 4`.
    pub fn allocate_register(
        &mut self,
        first_write: u32,
        last_read: u32,
        component_count: u32,
    ) -> Register {
        debug_assert!(component_count <= 4);
        let mut component_idx = 0;
        let mut writemask = Writemask::empty();
        while component_idx < self.regs.len() {
            writemask = self.available_writemask(first_write, component_idx, component_count);
            if !writemask.is_empty() {
                break;
            }
            component_idx += 4;
        }
        if component_idx >= self.regs.len() {
            self.regs.resize(component_idx + 4, 0);
            writemask = Writemask::from_width(component_count);
        }
        for i in writemask.components() {
            self.regs[component_idx + i as usize] = last_read;
        }
        let id = (component_idx / 4) as u32;
        self.reg_count = self.reg_count.max(id + 1);
        Register {
            id,
            writemask,
            allocated: true,
        }
    }

    fn is_range_available(
        &self,
        first_write: u32,
        component_idx: usize,
        component_count: usize,
    ) -> bool {
        let mut i = 0;
        while i < component_count {
            if self
                .available_writemask(first_write, component_idx + i, 4)
                .is_empty()
            {
                return false;
            }
            i += 4;
        }
        true
    }

    /// Contiguous whole-register allocation for `component_count > 4`.
    pub fn allocate_range(
        &mut self,
        first_write: u32,
        last_read: u32,
        component_count: u32,
    ) -> Register {
        let count = component_count as usize;
        let mut component_idx = 0;
        while component_idx < self.regs.len() {
            if self.is_range_available(
                first_write,
                component_idx,
                count.min(self.regs.len() - component_idx),
            ) {
                break;
            }
            component_idx += 4;
        }
        if self.regs.len() < component_idx + count {
            let new_len = (component_idx + count).next_multiple_of(4);
            self.regs.resize(new_len, 0);
        }
        for i in 0..count {
            self.regs[component_idx + i] = last_read;
        }
        let id = (component_idx / 4) as u32;
        self.reg_count = self.reg_count.max(id + component_count.div_ceil(4));
        Register {
            id,
            writemask: Writemask::empty(),
            allocated: true,
        }
    }
}

fn allocate_by_size(
    map: &mut LivenessMap,
    first_write: u32,
    last_read: u32,
    reg_size: u32,
    dimx: u32,
) -> Register {
    if reg_size > 1 {
        map.allocate_range(first_write, last_read, reg_size * 4)
    } else {
        map.allocate_register(first_write, last_read, dimx)
    }
}

fn allocate_variable_temp_register(ctx: &mut Context, var: VarId, map: &mut LivenessMap) {
    let v = ctx.var(var);
    if !v.is_temp() {
        return;
    }
    if !v.reg.allocated && v.last_read != 0 {
        let ty = ctx.types.get(v.ty);
        let reg = allocate_by_size(map, v.first_write, v.last_read, ty.reg_size, ty.dimx);
        let (first_write, last_read, name) = (v.first_write, v.last_read, v.name.clone());
        ctx.var_mut(var).reg = reg;
        tracing::trace!(
            target: "codegen.alloc",
            %name,
            reg = reg.id,
            first_write,
            last_read,
            "allocated temp variable"
        );
    }
}

fn allocate_temp_registers_recurse(ctx: &mut Context, block: BlockId, map: &mut LivenessMap) {
    for instr in ctx.block_instrs(block) {
        let node = ctx.node(instr);
        if !node.reg.allocated && node.last_read != 0 {
            let ty = ctx.types.get(node.ty);
            let reg = allocate_by_size(map, node.index, node.last_read, ty.reg_size, ty.dimx);
            let index = node.index;
            ctx.node_mut(instr).reg = reg;
            tracing::trace!(
                target: "codegen.alloc",
                index,
                reg = reg.id,
                "allocated anonymous expression"
            );
        }

        match ctx.node(instr).kind.clone() {
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => {
                allocate_temp_registers_recurse(ctx, then_block, map);
                allocate_temp_registers_recurse(ctx, else_block, map);
            }
            NodeKind::Loop { body, .. } => {
                allocate_temp_registers_recurse(ctx, body, map);
            }
            // Variables touched by loads and stores need registers even when
            // they are only ever read (undefined values still occupy one).
            NodeKind::Load(deref) => {
                allocate_variable_temp_register(ctx, deref.var, map);
            }
            NodeKind::Store { lhs, .. } => {
                allocate_variable_temp_register(ctx, lhs.var, map);
            }
            _ => {}
        }
    }
}

/// Greedy temp allocation over the whole program; leaves the required
/// register count in the context.
pub fn allocate_temp_registers(ctx: &mut Context, body: BlockId) {
    let mut map = LivenessMap::default();
    allocate_temp_registers_recurse(ctx, body, &mut map);
    ctx.temp_count = map.reg_count;
}

fn constant_component(ctx: &mut Context, value: &ConstantValue, base: BaseType, i: usize) -> f32 {
    match (base, value) {
        (BaseType::Bool, ConstantValue::Bool(v)) => {
            if v[i] {
                1.0
            } else {
                0.0
            }
        }
        (BaseType::Float | BaseType::Half, ConstantValue::Float(v)) => v[i],
        (BaseType::Int, ConstantValue::Int(v)) => v[i] as f32,
        (BaseType::Uint, ConstantValue::Uint(v)) => v[i] as f32,
        _ => {
            tracing::error!(target: "codegen.alloc", ?base, "constant value/base mismatch");
            ctx.diags.error(
                shade_types::SourceLocation::default(),
                ErrorCode::InternalCompilerError,
                "constant value does not match its type",
            );
            0.0
        }
    }
}

fn allocate_const_registers_recurse(ctx: &mut Context, block: BlockId, map: &mut LivenessMap) {
    for instr in ctx.block_instrs(block) {
        match ctx.node(instr).kind.clone() {
            NodeKind::Constant(value) => {
                let ty = ctx.types.get(ctx.node(instr).ty).clone();
                let reg = allocate_by_size(map, 1, u32::MAX, ty.reg_size, ty.dimx);
                ctx.node_mut(instr).reg = reg;
                tracing::trace!(
                    target: "codegen.alloc",
                    index = ctx.node(instr).index,
                    reg = reg.id,
                    "allocated constant"
                );

                if ty.base == BaseType::Double {
                    let loc = ctx.node(instr).loc;
                    ctx.diags.fixme(loc, "double constant");
                    return;
                }
                debug_assert!(ty.class.is_numeric());

                let end_reg = (reg.id + ty.reg_size) as usize;
                if ctx.constant_defs.len() < end_reg {
                    ctx.constant_defs.resize(end_reg, [0.0; 4]);
                }

                let writemask = if reg.writemask.is_empty() {
                    Writemask::from_width(ty.dimx)
                } else {
                    reg.writemask
                };
                for y in 0..ty.dimy {
                    let mut i = 0;
                    for x in writemask.components() {
                        let f = constant_component(ctx, &value, ty.base, i);
                        i += 1;
                        ctx.constant_defs[(reg.id + y) as usize][x as usize] = f;
                    }
                }
            }
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => {
                allocate_const_registers_recurse(ctx, then_block, map);
                allocate_const_registers_recurse(ctx, else_block, map);
            }
            NodeKind::Loop { body, .. } => {
                allocate_const_registers_recurse(ctx, body, map);
            }
            _ => {}
        }
    }
}

/// Legacy const-register allocation: every constant and every read uniform
/// is pinned for the whole program (`[1, +inf]`), with a parallel table of
/// literal values.
pub fn allocate_const_registers(ctx: &mut Context, body: BlockId) {
    let mut map = LivenessMap::default();
    allocate_const_registers_recurse(ctx, body, &mut map);

    for var in ctx.extern_vars.clone() {
        let v = ctx.var(var);
        if v.is_uniform && v.last_read != 0 {
            let ty = ctx.types.get(v.ty);
            let reg = if ty.reg_size > 1 {
                map.allocate_range(1, u32::MAX, ty.reg_size * 4)
            } else {
                let mut reg = map.allocate_register(1, u32::MAX, 4);
                reg.writemask = Writemask::from_width(ty.dimx);
                reg
            };
            let name = v.name.clone();
            ctx.var_mut(var).reg = reg;
            tracing::trace!(target: "codegen.alloc", %name, reg = reg.id, "allocated uniform");
        }
    }
}

fn allocate_semantic_register(ctx: &mut Context, var: VarId, counter: &mut u32, output: bool) {
    let v = ctx.var(var).clone();
    let semantic = v.semantic.as_ref().expect("semantic variable");

    let builtin = if ctx.profile.is_legacy() {
        if semantics::legacy_usage_from_semantic(semantic).is_none() {
            ctx.diags.error(
                v.loc,
                ErrorCode::InvalidSemantic,
                format!("Invalid semantic '{}'.", semantic.name),
            );
            return;
        }
        if (!output && v.last_read == 0) || (output && v.first_write == 0) {
            return;
        }
        semantics::legacy_register_from_semantic(ctx.profile.stage, output, semantic).is_some()
    } else {
        match semantics::sm4_register_from_semantic(ctx.profile.stage, output, semantic) {
            Err(()) => {
                ctx.diags.error(
                    v.loc,
                    ErrorCode::InvalidSemantic,
                    format!("Invalid semantic '{}'.", semantic.name),
                );
                return;
            }
            Ok(builtin) => builtin.is_some(),
        }
    };

    if builtin {
        tracing::trace!(
            target: "codegen.alloc",
            stage = ctx.profile.stage.name(),
            semantic = %semantic,
            output,
            "semantic matches a predefined register"
        );
    } else {
        let dimx = ctx.types.get(v.ty).dimx;
        let reg = Register {
            id: *counter,
            writemask: Writemask::from_width(dimx),
            allocated: true,
        };
        *counter += 1;
        ctx.var_mut(var).reg = reg;
        tracing::trace!(
            target: "codegen.alloc",
            name = %ctx.var(var).name,
            reg = reg.id,
            output,
            "allocated semantic register"
        );
    }
}

/// Map every input/output semantic variable to a predefined register or an
/// auto-assigned index.
pub fn allocate_semantic_registers(ctx: &mut Context) {
    let mut input_counter = 0;
    let mut output_counter = 0;
    for var in ctx.extern_vars.clone() {
        if ctx.var(var).is_input_semantic {
            allocate_semantic_register(ctx, var, &mut input_counter, false);
        }
        if ctx.var(var).is_output_semantic {
            allocate_semantic_register(ctx, var, &mut output_counter, true);
        }
    }
}

/// The 4-component-aligned offset of a value in a constant buffer, avoiding
/// register straddle: aggregates and anything that would cross a register
/// boundary are pushed to the next one. Offsets are in components.
fn sm4_buffer_offset(ctx: &Context, ty: shade_types::TypeId, offset: u32) -> u32 {
    let t = ctx.types.get(ty);
    if !t.is_single_reg() || (offset % 4) + t.dimx > 4 {
        offset.next_multiple_of(4)
    } else {
        offset
    }
}

fn buffer_component_size(ctx: &Context, ty: shade_types::TypeId) -> u32 {
    let t = ctx.types.get(ty);
    if t.is_single_reg() {
        t.dimx
    } else {
        t.reg_size * 4
    }
}

fn calculate_buffer_offset(ctx: &mut Context, var: VarId) {
    let buffer_id = ctx.var(var).buffer.unwrap_or(ctx.globals_buffer);
    let ty = ctx.var(var).ty;
    let offset = sm4_buffer_offset(ctx, ty, ctx.buffer(buffer_id).size);
    let size = buffer_component_size(ctx, ty);

    ctx.var_mut(var).buffer = Some(buffer_id);
    ctx.var_mut(var).buffer_offset = offset;
    tracing::trace!(
        target: "codegen.alloc",
        name = %ctx.var(var).name,
        offset,
        "allocated buffer offset"
    );
    let last_read = ctx.var(var).last_read;
    let buffer = ctx.buffer_mut(buffer_id);
    buffer.size = offset + size;
    if last_read != 0 {
        buffer.used_size = buffer.size;
    }
}

fn reserved_buffer(ctx: &Context, index: u32) -> Option<BufferId> {
    ctx.buffer_ids().find(|b| {
        let buffer = ctx.buffer(*b);
        buffer.used_size != 0
            && buffer.reservation.map(|r| (r.kind, r.index)) == Some(('b', index))
    })
}

/// Lay uniforms into their constant buffers and assign each used buffer a
/// `cb` register, honoring reservations.
pub fn allocate_buffers(ctx: &mut Context) {
    for var in ctx.extern_vars.clone() {
        let v = ctx.var(var);
        if v.is_uniform && ctx.types.get(v.ty).class != TypeClass::Object {
            if v.is_param {
                ctx.var_mut(var).buffer = Some(ctx.params_buffer);
            }
            calculate_buffer_offset(ctx, var);
        }
    }

    let mut index = 0;
    for buffer_id in ctx.buffer_ids().collect::<Vec<_>>() {
        let buffer = ctx.buffer(buffer_id);
        if buffer.used_size == 0 {
            continue;
        }
        if buffer.kind != BufferKind::Constant {
            let loc = buffer.loc;
            ctx.diags.fixme(loc, "texture buffer registers");
            continue;
        }
        match buffer.reservation {
            Some(r) if r.kind == 'b' => {
                if let Some(reserved) = reserved_buffer(ctx, r.index) {
                    if reserved != buffer_id {
                        let loc = ctx.buffer(buffer_id).loc;
                        let (prior_name, prior_loc) =
                            (ctx.buffer(reserved).name.clone(), ctx.buffer(reserved).loc);
                        ctx.diags.error(
                            loc,
                            ErrorCode::OverlappingReservations,
                            format!("Multiple buffers bound to cb{}.", r.index),
                        );
                        ctx.diags.note(
                            prior_loc,
                            format!("Buffer {} is already bound to cb{}.", prior_name, r.index),
                        );
                    }
                }
                let buffer = ctx.buffer_mut(buffer_id);
                buffer.reg = Register {
                    id: r.index,
                    writemask: Writemask::empty(),
                    allocated: true,
                };
            }
            None => {
                while reserved_buffer(ctx, index).is_some() {
                    index += 1;
                }
                let buffer = ctx.buffer_mut(buffer_id);
                buffer.reg = Register {
                    id: index,
                    writemask: Writemask::empty(),
                    allocated: true,
                };
                tracing::trace!(
                    target: "codegen.alloc",
                    name = %buffer.name,
                    reg = index,
                    "allocated buffer"
                );
                index += 1;
            }
            Some(_) => {
                let loc = ctx.buffer(buffer_id).loc;
                ctx.diags.error(
                    loc,
                    ErrorCode::InvalidReservation,
                    "Constant buffers must be allocated to register type 'b'.",
                );
            }
        }
    }
}

fn object_register_letter(base: BaseType) -> Option<char> {
    match base {
        BaseType::Sampler => Some('s'),
        BaseType::Texture => Some('t'),
        _ => None,
    }
}

fn reserved_object(ctx: &Context, letter: char, index: u32) -> Option<VarId> {
    ctx.var_ids().find(|v| {
        let var = ctx.var(*v);
        var.last_read != 0
            && var.reservation.map(|r| (r.kind, r.index)) == Some((letter, index))
    })
}

/// Assign object registers for one letter class (`s` samplers, `t`
/// textures), honoring reservations.
pub fn allocate_objects(ctx: &mut Context, base: BaseType) {
    let Some(letter) = object_register_letter(base) else {
        tracing::warn!(target: "codegen.alloc", ?base, "no register class for object type");
        return;
    };
    let mut index = 0;
    for var in ctx.extern_vars.clone() {
        let v = ctx.var(var);
        if v.last_read == 0
            || ctx.types.get(v.ty).class != TypeClass::Object
            || ctx.types.get(v.ty).base != base
        {
            continue;
        }
        match v.reservation {
            Some(r) if r.kind == letter => {
                if let Some(reserved) = reserved_object(ctx, letter, r.index) {
                    if reserved != var {
                        let loc = ctx.var(var).loc;
                        let (prior_name, prior_loc) =
                            (ctx.var(reserved).name.clone(), ctx.var(reserved).loc);
                        ctx.diags.error(
                            loc,
                            ErrorCode::OverlappingReservations,
                            format!("Multiple objects bound to {letter}{}.", r.index),
                        );
                        ctx.diags.note(
                            prior_loc,
                            format!(
                                "Object '{prior_name}' is already bound to {letter}{}.",
                                r.index
                            ),
                        );
                    }
                }
                ctx.var_mut(var).reg = Register {
                    id: r.index,
                    writemask: Writemask::empty(),
                    allocated: true,
                };
            }
            None => {
                while reserved_object(ctx, letter, index).is_some() {
                    index += 1;
                }
                ctx.var_mut(var).reg = Register {
                    id: index,
                    writemask: Writemask::empty(),
                    allocated: true,
                };
                tracing::trace!(target: "codegen.alloc", reg = index, %letter, "allocated object");
                index += 1;
            }
            Some(r) => {
                let loc = ctx.var(var).loc;
                let type_name = ctx.types.name(ctx.var(var).ty);
                ctx.diags.error(
                    loc,
                    ErrorCode::InvalidReservation,
                    format!(
                        "Object of type '{type_name}' must be bound to register type \
                         '{letter}', not '{}'.",
                        r.kind
                    ),
                );
            }
        }
    }
}

/// The concrete register a deref lands in after allocation: the variable's
/// register advanced by the resolved offset, with the writemask shifted for
/// sub-register accesses.
pub fn reg_from_deref(ctx: &Context, deref: &Deref, ty: shade_types::TypeId) -> Register {
    let var = ctx.var(deref.var);
    let mut reg = var.reg;
    let offset = ctx.offset_from_deref(deref).unwrap_or_else(|| {
        tracing::error!(target: "codegen.alloc", "deref with non-constant offset");
        0
    });

    reg.id += offset;

    if ctx.types.get(var.ty).is_single_reg() {
        debug_assert_eq!(offset, 0);
        reg.writemask = var.reg.writemask;
    } else {
        debug_assert!(ctx.types.get(ty).is_single_reg());
        reg.writemask = Writemask::from_width(ctx.types.get(ty).dimx);
    }
    reg
}
