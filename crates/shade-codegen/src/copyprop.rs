//! Copy propagation over structured data with per-component tracking.
//!
//! Within a straight-line block, every store records which node defined each
//! component of the target variable. A later load whose offset resolves to a
//! constant is replaced by a swizzle of the defining node when a single node
//! defines every requested component. Any store through an unresolved offset
//! invalidates the whole variable, and the pass bails conservatively at the
//! first conditional or loop.

use crate::xform::type_is_object;
use ahash::AHashMap;
use shade_ir::{BlockId, Context, Deref, NodeId, NodeKind, Swizzle, VarId, Writemask};
use shade_types::TypeClass;

/// Per-component definition: the defining node and the component of that
/// node's value that landed here.
type ComponentDef = Option<(NodeId, u32)>;

struct VarDefs {
    values: Vec<ComponentDef>,
}

#[derive(Default)]
struct CopyPropState {
    var_defs: AHashMap<VarId, VarDefs>,
}

impl CopyPropState {
    fn var_def_mut(&mut self, ctx: &Context, var: VarId) -> &mut VarDefs {
        let reg_size = ctx.types.get(ctx.var(var).ty).reg_size;
        self.var_defs.entry(var).or_insert_with(|| VarDefs {
            // Component-granular storage: one slot per component of each
            // register the variable occupies.
            values: vec![None; (reg_size * 4) as usize],
        })
    }
}

fn invalidate_whole_variable(ctx: &Context, defs: &mut VarDefs, var: VarId) {
    tracing::trace!(target: "codegen.copyprop", var = %ctx.var(var).name, "invalidate variable");
    defs.values.fill(None);
}

fn set_value(defs: &mut VarDefs, offset: u32, writemask: Writemask, node: NodeId) {
    let mut j = 0;
    for i in writemask.components() {
        let slot = (offset * 4 + i) as usize;
        if let Some(value) = defs.values.get_mut(slot) {
            *value = Some((node, j));
        }
        j += 1;
    }
}

/// The single defining node and per-component swizzle covering `count`
/// components of `deref`, or `None` when no such node exists.
fn compute_replacement(
    ctx: &Context,
    state: &CopyPropState,
    deref: &Deref,
    count: u32,
) -> Option<(NodeId, Swizzle)> {
    let offset = ctx.offset_from_deref(deref)?;
    let defs = state.var_defs.get(&deref.var)?;

    let mut node = None;
    let mut swizzle = 0u32;
    for i in 0..count {
        let slot = (offset * 4 + i) as usize;
        let (def_node, component) = (*defs.values.get(slot)?)?;
        match node {
            None => node = Some(def_node),
            Some(n) if n != def_node => {
                tracing::trace!(
                    target: "codegen.copyprop",
                    var = %ctx.var(deref.var).name,
                    "no single source for load"
                );
                return None;
            }
            Some(_) => {}
        }
        swizzle |= component << (2 * i);
    }
    node.map(|n| (n, Swizzle(swizzle)))
}

fn analyze_load(ctx: &mut Context, block: BlockId, load: NodeId, state: &CopyPropState) -> bool {
    let NodeKind::Load(deref) = ctx.node(load).kind.clone() else {
        return false;
    };
    let ty = ctx.node(load).ty;
    let dimx = match ctx.types.get(ty).class {
        TypeClass::Scalar | TypeClass::Vector => ctx.types.get(ty).dimx,
        TypeClass::Object => 1,
        // Matrices aren't split yet; aggregates wait for the split passes.
        TypeClass::Matrix | TypeClass::Array | TypeClass::Struct => return false,
    };

    let Some((new_node, swizzle)) = compute_replacement(ctx, state, &deref, dimx) else {
        return false;
    };

    tracing::trace!(
        target: "codegen.copyprop",
        var = %ctx.var(deref.var).name,
        "load propagated"
    );
    if type_is_object(ctx, ty) {
        ctx.replace_node(load, new_node);
    } else {
        let loc = ctx.node(load).loc;
        let swizzle_node = ctx.new_swizzle(swizzle, dimx, new_node, loc);
        ctx.block_insert_before(block, load, swizzle_node);
        ctx.replace_node(load, swizzle_node);
    }
    true
}

fn record_store(ctx: &mut Context, store: NodeId, state: &mut CopyPropState) {
    let NodeKind::Store {
        lhs,
        rhs,
        writemask,
    } = ctx.node(store).kind.clone()
    else {
        return;
    };
    let var = lhs.var;
    // Touch the entry so unresolved offsets still invalidate.
    state.var_def_mut(ctx, var);
    match ctx.offset_from_deref(&lhs) {
        Some(offset) => {
            let rhs = rhs.expect("store without a right-hand side");
            let mut writemask = writemask;
            if type_is_object(ctx, ctx.node(rhs).ty) {
                writemask = Writemask::X;
            }
            let defs = state.var_defs.get_mut(&var).expect("just created");
            set_value(defs, offset, writemask, rhs);
        }
        None => {
            let defs = state.var_defs.get_mut(&var).expect("just created");
            invalidate_whole_variable(ctx, defs, var);
        }
    }
}

fn transform_block(ctx: &mut Context, block: BlockId, state: &mut CopyPropState) -> bool {
    enum Tag {
        Load,
        Store,
        If,
        Loop,
        Other,
    }
    let mut progress = false;
    for instr in ctx.block_instrs(block) {
        if ctx.node(instr).dead {
            continue;
        }
        let tag = match &ctx.node(instr).kind {
            NodeKind::Load(_) => Tag::Load,
            NodeKind::Store { .. } => Tag::Store,
            NodeKind::If { .. } => Tag::If,
            NodeKind::Loop { .. } => Tag::Loop,
            _ => Tag::Other,
        };
        match tag {
            Tag::Load => progress |= analyze_load(ctx, block, instr, state),
            Tag::Store => record_store(ctx, instr, state),
            Tag::If => {
                tracing::debug!(
                    target: "codegen.copyprop",
                    "conditionals not supported yet, leaving"
                );
                return progress;
            }
            Tag::Loop => {
                tracing::debug!(target: "codegen.copyprop", "loops not supported yet, leaving");
                return progress;
            }
            Tag::Other => {}
        }
    }
    progress
}

/// Run copy propagation over one block; reports progress.
pub fn copy_propagation_execute(ctx: &mut Context, block: BlockId) -> bool {
    let mut state = CopyPropState::default();
    transform_block(ctx, block, &mut state)
}
