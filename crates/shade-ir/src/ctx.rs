//! The compilation context.
//!
//! One `Context` exists per compile invocation and owns every arena: types,
//! nodes, blocks, variables, scopes, functions and constant buffers, plus the
//! diagnostic sink. Cross-references between IR entities are arena indices;
//! all src-slot/use-list bookkeeping goes through the context so the two
//! sides never drift apart.
//!
//! Invariants:
//! * For every filled src slot `(user, slot) -> target`, `target.uses`
//!   contains exactly one `(user, slot)` entry, and vice versa.
//! * A node is a member of at most one block, named by `node.block`.
//! * Removing a node first detaches all of its src slots; nodes with live
//!   uses are only removed through `replace_node`.

use crate::node::{
    Block, BlockId, BufferId, Deref, Node, NodeId, NodeKind, Register, SrcSlot, VarId,
};
use shade_types::{
    CompileOptions, DiagnosticSink, Modifiers, ProfileInfo, RegReservation, Semantic,
    SourceLocation, TypeId, TypeTable,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// A declared variable. Synthetic halves created by semantic lowering look
/// like ordinary variables with a role flag set.
#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub ty: TypeId,
    pub loc: SourceLocation,
    pub modifiers: Modifiers,
    pub semantic: Option<Semantic>,
    pub reservation: Option<RegReservation>,
    pub buffer: Option<BufferId>,
    /// Offset within the owning constant buffer, in components.
    pub buffer_offset: u32,
    pub is_input_semantic: bool,
    pub is_output_semantic: bool,
    pub is_uniform: bool,
    pub is_param: bool,
    pub first_write: u32,
    pub last_read: u32,
    pub reg: Register,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: TypeId, loc: SourceLocation) -> Self {
        Self {
            name: name.into(),
            ty,
            loc,
            modifiers: Modifiers::empty(),
            semantic: None,
            reservation: None,
            buffer: None,
            buffer_offset: 0,
            is_input_semantic: false,
            is_output_semantic: false,
            is_uniform: false,
            is_param: false,
            first_write: 0,
            last_read: 0,
            reg: Register::default(),
        }
    }

    /// Not bound externally; eligible for a temp register.
    pub fn is_temp(&self) -> bool {
        !self.is_uniform && !self.is_input_semantic && !self.is_output_semantic
    }
}

#[derive(Debug)]
pub struct Scope {
    pub vars: Vec<VarId>,
    pub types: HashMap<String, TypeId>,
    pub parent: Option<ScopeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Constant,
    Texture,
}

/// A named grouping of uniforms bound as a unit to a `b` register.
#[derive(Debug)]
pub struct Buffer {
    pub name: String,
    pub kind: BufferKind,
    pub reservation: Option<RegReservation>,
    pub loc: SourceLocation,
    /// Layout cursor, in components.
    pub size: u32,
    /// Size up to and including the last actually-read uniform.
    pub used_size: u32,
    pub reg: Register,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub return_type: TypeId,
    pub return_var: Option<VarId>,
    pub parameters: Vec<VarId>,
    pub semantic: Option<Semantic>,
    pub body: Option<BlockId>,
    pub loc: SourceLocation,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub intrinsic: bool,
    pub overloads: Vec<FunctionDecl>,
}

#[derive(Debug)]
pub struct Context {
    pub profile: &'static ProfileInfo,
    pub options: CompileOptions,
    pub types: TypeTable,
    pub diags: DiagnosticSink,

    nodes: Vec<Node>,
    blocks: Vec<Block>,
    vars: Vec<Var>,
    scopes: Vec<Scope>,
    pub cur_scope: ScopeId,
    pub globals_scope: ScopeId,

    functions: BTreeMap<String, Function>,

    buffers: Vec<Buffer>,
    pub globals_buffer: BufferId,
    pub params_buffer: BufferId,
    pub cur_buffer: BufferId,

    /// Variables visible to the outside: uniforms and semantic-bound halves.
    pub extern_vars: Vec<VarId>,
    /// Instructions initializing statics, moved to the entry block head
    /// before lowering.
    pub static_initializers: BlockId,

    /// Literal values backing legacy const registers, filled by allocation.
    pub constant_defs: Vec<[f32; 4]>,
    pub temp_count: u32,
}

impl Context {
    pub fn new(profile: &'static ProfileInfo, options: CompileOptions) -> Self {
        let globals_scope = ScopeId(0);
        let mut ctx = Self {
            profile,
            options,
            types: TypeTable::new(),
            diags: DiagnosticSink::new(),
            nodes: Vec::new(),
            blocks: vec![Block::default()],
            vars: Vec::new(),
            scopes: vec![Scope {
                vars: Vec::new(),
                types: HashMap::new(),
                parent: None,
            }],
            cur_scope: globals_scope,
            globals_scope,
            functions: BTreeMap::new(),
            buffers: Vec::new(),
            globals_buffer: BufferId(0),
            params_buffer: BufferId(1),
            cur_buffer: BufferId(0),
            extern_vars: Vec::new(),
            static_initializers: BlockId(0),
            constant_defs: Vec::new(),
            temp_count: 0,
        };
        ctx.globals_buffer = ctx.add_buffer(Buffer {
            name: "$Globals".to_string(),
            kind: BufferKind::Constant,
            reservation: None,
            loc: SourceLocation::default(),
            size: 0,
            used_size: 0,
            reg: Register::default(),
        });
        ctx.params_buffer = ctx.add_buffer(Buffer {
            name: "$Params".to_string(),
            kind: BufferKind::Constant,
            reservation: None,
            loc: SourceLocation::default(),
            size: 0,
            used_size: 0,
            reg: Register::default(),
        });
        ctx.cur_buffer = ctx.globals_buffer;
        ctx
    }

    // ---------------------------------------------------------------------
    // Nodes and src/use bookkeeping
    // ---------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    fn slot_mut(kind: &mut NodeKind, slot: SrcSlot) -> Option<&mut Option<NodeId>> {
        match (kind, slot) {
            (NodeKind::Expr { operands, .. }, SrcSlot::Operand(i)) => {
                operands.get_mut(i as usize)
            }
            (NodeKind::Load(deref), SrcSlot::LoadOffset) => Some(&mut deref.offset),
            (NodeKind::Store { rhs, .. }, SrcSlot::StoreRhs) => Some(rhs),
            (NodeKind::Store { lhs, .. }, SrcSlot::StoreOffset) => Some(&mut lhs.offset),
            (NodeKind::Swizzle { src, .. }, SrcSlot::SwizzleSrc) => Some(src),
            (NodeKind::If { condition, .. }, SrcSlot::Condition) => Some(condition),
            (NodeKind::ResourceLoad { coords, .. }, SrcSlot::Coords) => Some(coords),
            (NodeKind::ResourceLoad { resource, .. }, SrcSlot::ResourceOffset) => {
                Some(&mut resource.offset)
            }
            (NodeKind::ResourceLoad { sampler, .. }, SrcSlot::SamplerOffset) => {
                sampler.as_mut().map(|d| &mut d.offset)
            }
            _ => None,
        }
    }

    /// The node currently referenced by `(user, slot)`, if any.
    pub fn src(&self, user: NodeId, slot: SrcSlot) -> Option<NodeId> {
        let kind = &self.nodes[user.0 as usize].kind;
        match (kind, slot) {
            (NodeKind::Expr { operands, .. }, SrcSlot::Operand(i)) => {
                operands.get(i as usize).copied().flatten()
            }
            (NodeKind::Load(deref), SrcSlot::LoadOffset) => deref.offset,
            (NodeKind::Store { rhs, .. }, SrcSlot::StoreRhs) => *rhs,
            (NodeKind::Store { lhs, .. }, SrcSlot::StoreOffset) => lhs.offset,
            (NodeKind::Swizzle { src, .. }, SrcSlot::SwizzleSrc) => *src,
            (NodeKind::If { condition, .. }, SrcSlot::Condition) => *condition,
            (NodeKind::ResourceLoad { coords, .. }, SrcSlot::Coords) => *coords,
            (NodeKind::ResourceLoad { resource, .. }, SrcSlot::ResourceOffset) => {
                resource.offset
            }
            (NodeKind::ResourceLoad { sampler, .. }, SrcSlot::SamplerOffset) => {
                sampler.as_ref().and_then(|d| d.offset)
            }
            _ => None,
        }
    }

    /// Point `(user, slot)` at `target`, maintaining both use lists.
    pub fn set_src(&mut self, user: NodeId, slot: SrcSlot, target: Option<NodeId>) {
        let old = self.src(user, slot);
        if old == target {
            return;
        }
        if let Some(old_id) = old {
            self.nodes[old_id.0 as usize]
                .uses
                .retain(|u| *u != (user, slot));
        }
        if let Some(s) = Self::slot_mut(&mut self.nodes[user.0 as usize].kind, slot) {
            *s = target;
        } else {
            debug_assert!(target.is_none(), "slot {slot:?} missing on node");
            return;
        }
        if let Some(new_id) = target {
            self.nodes[new_id.0 as usize].uses.push((user, slot));
        }
    }

    /// Create a node. Any src slots already filled in `kind` are registered
    /// in the corresponding use lists. The node is not linked to a block.
    pub fn add_node(&mut self, kind: NodeKind, ty: TypeId, loc: SourceLocation) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let slots = kind.slots();
        self.nodes.push(Node {
            kind,
            ty,
            loc,
            index: 0,
            last_read: 0,
            reg: Register::default(),
            uses: Vec::new(),
            block: None,
            dead: false,
        });
        for slot in slots {
            if let Some(target) = self.src(id, slot) {
                self.nodes[target.0 as usize].uses.push((id, slot));
            }
        }
        id
    }

    /// Reroute every use of `old` to `new`, then remove and free `old`.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) {
        debug_assert_ne!(old, new);
        let uses = std::mem::take(&mut self.nodes[old.0 as usize].uses);
        for (user, slot) in uses {
            let s = Self::slot_mut(&mut self.nodes[user.0 as usize].kind, slot)
                .expect("use list names a missing slot");
            *s = Some(new);
            self.nodes[new.0 as usize].uses.push((user, slot));
        }
        self.remove_and_free(old);
    }

    /// Unlink a node from its block, detach its src slots, free any nested
    /// blocks, and mark it dead. The node must have no remaining uses.
    pub fn remove_and_free(&mut self, id: NodeId) {
        if let Some(block) = self.nodes[id.0 as usize].block {
            self.block_remove(block, id);
        }
        for slot in self.nodes[id.0 as usize].kind.slots() {
            self.set_src(id, slot, None);
        }
        let nested: Vec<BlockId> = match &self.nodes[id.0 as usize].kind {
            NodeKind::If {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            NodeKind::Loop { body, .. } => vec![*body],
            _ => Vec::new(),
        };
        for block in nested {
            self.free_block(block);
        }
        debug_assert!(
            self.nodes[id.0 as usize].uses.is_empty(),
            "freeing a node that still has uses"
        );
        self.nodes[id.0 as usize].dead = true;
    }

    /// Free every instruction of a block, in reverse so users go before
    /// their sources.
    pub fn free_block(&mut self, block: BlockId) {
        let instrs: Vec<NodeId> = self.blocks[block.0 as usize].instrs.clone();
        for id in instrs.into_iter().rev() {
            self.remove_and_free(id);
        }
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_instrs(&self, id: BlockId) -> Vec<NodeId> {
        self.blocks[id.0 as usize].instrs.clone()
    }

    fn link(&mut self, block: BlockId, node: NodeId) {
        debug_assert!(self.nodes[node.0 as usize].block.is_none());
        self.nodes[node.0 as usize].block = Some(block);
    }

    pub fn block_push_tail(&mut self, block: BlockId, node: NodeId) {
        self.link(block, node);
        self.blocks[block.0 as usize].instrs.push(node);
    }

    pub fn block_push_head(&mut self, block: BlockId, node: NodeId) {
        self.link(block, node);
        self.blocks[block.0 as usize].instrs.insert(0, node);
    }

    pub fn block_insert_before(&mut self, block: BlockId, anchor: NodeId, node: NodeId) {
        self.link(block, node);
        let pos = self.position(block, anchor);
        self.blocks[block.0 as usize].instrs.insert(pos, node);
    }

    pub fn block_insert_after(&mut self, block: BlockId, anchor: NodeId, node: NodeId) {
        self.link(block, node);
        let pos = self.position(block, anchor);
        self.blocks[block.0 as usize].instrs.insert(pos + 1, node);
    }

    fn position(&self, block: BlockId, node: NodeId) -> usize {
        self.blocks[block.0 as usize]
            .instrs
            .iter()
            .position(|n| *n == node)
            .expect("anchor not in block")
    }

    pub fn block_remove(&mut self, block: BlockId, node: NodeId) {
        let pos = self.position(block, node);
        self.blocks[block.0 as usize].instrs.remove(pos);
        self.nodes[node.0 as usize].block = None;
    }

    /// Move all instructions of `from` to the head of `to`, preserving order.
    pub fn block_move_head(&mut self, to: BlockId, from: BlockId) {
        let moved = std::mem::take(&mut self.blocks[from.0 as usize].instrs);
        for id in &moved {
            self.nodes[id.0 as usize].block = Some(to);
        }
        let rest = std::mem::take(&mut self.blocks[to.0 as usize].instrs);
        let dst = &mut self.blocks[to.0 as usize].instrs;
        dst.extend(moved);
        dst.extend(rest);
    }

    // ---------------------------------------------------------------------
    // Variables and scopes
    // ---------------------------------------------------------------------

    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0 as usize]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        &mut self.vars[id.0 as usize]
    }

    pub fn var_ids(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.vars.len() as u32).map(VarId)
    }

    /// Add a variable without declaring it in any scope (synthetic halves).
    pub fn add_var(&mut self, var: Var) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    pub fn push_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            vars: Vec::new(),
            types: HashMap::new(),
            parent: Some(self.cur_scope),
        });
        self.cur_scope = id;
        id
    }

    pub fn pop_scope(&mut self) -> bool {
        match self.scopes[self.cur_scope.0 as usize].parent {
            Some(parent) => {
                self.cur_scope = parent;
                true
            }
            None => false,
        }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> + '_ {
        (0..self.scopes.len() as u32).map(ScopeId)
    }

    /// Declare `var` in `scope`. Fails on a redeclaration, including a local
    /// that shadows a function parameter.
    pub fn declare(&mut self, scope: ScopeId, var: Var, local_var: bool) -> Option<VarId> {
        let clashes = |ctx: &Self, scope: ScopeId, name: &str| {
            ctx.scopes[scope.0 as usize]
                .vars
                .iter()
                .any(|v| ctx.var(*v).name == name)
        };
        if clashes(self, scope, &var.name) {
            return None;
        }
        if local_var {
            // A local in a function-body scope must not redefine a parameter.
            if let Some(upper) = self.scopes[scope.0 as usize].parent {
                if self.scopes[upper.0 as usize].parent == Some(self.globals_scope)
                    && clashes(self, upper, &var.name)
                {
                    return None;
                }
            }
        }
        let id = self.add_var(var);
        self.scopes[scope.0 as usize].vars.push(id);
        Some(id)
    }

    /// Look a variable up by name, walking enclosing scopes.
    pub fn lookup_var(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        let s = &self.scopes[scope.0 as usize];
        for v in &s.vars {
            if self.var(*v).name == name {
                return Some(*v);
            }
        }
        s.parent.and_then(|p| self.lookup_var(p, name))
    }

    pub fn add_type_name(&mut self, scope: ScopeId, name: String, ty: TypeId) {
        self.scopes[scope.0 as usize].types.insert(name, ty);
    }

    /// Look a named type up; walks enclosing scopes only when `recursive`.
    pub fn lookup_type(&self, scope: ScopeId, name: &str, recursive: bool) -> Option<TypeId> {
        let s = &self.scopes[scope.0 as usize];
        if let Some(ty) = s.types.get(name) {
            return Some(*ty);
        }
        if recursive {
            return s.parent.and_then(|p| self.lookup_type(p, name, true));
        }
        None
    }

    // ---------------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------------

    /// Parameter-type ordering used to key overloads. Scalars and one-wide
    /// vectors compare equal.
    fn param_type_cmp(&self, a: TypeId, b: TypeId) -> Ordering {
        use shade_types::{TypeClass, TypeExtra};
        let (t1, t2) = (self.types.get(a), self.types.get(b));
        if t1.class != t2.class {
            let relaxed = (t1.class == TypeClass::Scalar && t2.class == TypeClass::Vector)
                || (t1.class == TypeClass::Vector && t2.class == TypeClass::Scalar);
            if !relaxed {
                return t1.class.cmp(&t2.class);
            }
        }
        if t1.base != t2.base {
            return t1.base.cmp(&t2.base);
        }
        if t1.base == shade_types::BaseType::Sampler && t1.sampler_dim != t2.sampler_dim {
            return t1.sampler_dim.cmp(&t2.sampler_dim);
        }
        if t1.dimx != t2.dimx {
            return t1.dimx.cmp(&t2.dimx);
        }
        if t1.dimy != t2.dimy {
            return t1.dimy.cmp(&t2.dimy);
        }
        match (&t1.extra, &t2.extra) {
            (TypeExtra::Record { fields: f1 }, TypeExtra::Record { fields: f2 }) => {
                for (a, b) in f1.iter().zip(f2.iter()) {
                    let c = self.param_type_cmp(a.ty, b.ty);
                    if c != Ordering::Equal {
                        return c;
                    }
                    let c = a.name.cmp(&b.name);
                    if c != Ordering::Equal {
                        return c;
                    }
                }
                f1.len().cmp(&f2.len())
            }
            (
                TypeExtra::Array {
                    element: e1,
                    count: c1,
                },
                TypeExtra::Array {
                    element: e2,
                    count: c2,
                },
            ) => {
                if c1 != c2 {
                    return c1.cmp(c2);
                }
                self.param_type_cmp(*e1, *e2)
            }
            _ => Ordering::Equal,
        }
    }

    fn param_list_cmp(&self, a: &[VarId], b: &[VarId]) -> Ordering {
        if a.len() != b.len() {
            return a.len().cmp(&b.len());
        }
        for (p1, p2) in a.iter().zip(b) {
            let c = self.param_type_cmp(self.var(*p1).ty, self.var(*p2).ty);
            if c != Ordering::Equal {
                return c;
            }
        }
        Ordering::Equal
    }

    /// Register a function overload. Redeclaring a user function as an
    /// intrinsic is rejected; the other direction silently replaces the
    /// intrinsic's overload set. Redefining an overload with a body replaces
    /// the prior declaration; a bodiless redeclaration is dropped.
    pub fn add_function_decl(&mut self, name: &str, decl: FunctionDecl, intrinsic: bool) {
        if let Some(func) = self.functions.get_mut(name) {
            if intrinsic != func.intrinsic {
                if intrinsic {
                    tracing::error!(
                        target: "ir.func",
                        name,
                        "redeclaring a user defined function as an intrinsic"
                    );
                    return;
                }
                tracing::debug!(target: "ir.func", name, "redeclared as a user defined function");
                func.intrinsic = false;
                func.overloads.clear();
            }
        } else {
            self.functions.insert(
                name.to_string(),
                Function {
                    name: name.to_string(),
                    intrinsic,
                    overloads: Vec::new(),
                },
            );
        }
        let param_lists: Vec<Vec<VarId>> = self.functions[name]
            .overloads
            .iter()
            .map(|o| o.parameters.clone())
            .collect();
        let existing = param_lists
            .iter()
            .position(|p| self.param_list_cmp(p, &decl.parameters) == Ordering::Equal);
        let func = self.functions.get_mut(name).expect("just inserted");
        match existing {
            Some(i) => {
                if decl.body.is_none() {
                    return;
                }
                func.overloads[i] = decl;
            }
            None => func.overloads.push(decl),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    // ---------------------------------------------------------------------
    // Buffers
    // ---------------------------------------------------------------------

    pub fn add_buffer(&mut self, buffer: Buffer) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(buffer);
        id
    }

    pub fn buffer(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.0 as usize]
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> &mut Buffer {
        &mut self.buffers[id.0 as usize]
    }

    pub fn buffer_ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        (0..self.buffers.len() as u32).map(BufferId)
    }

    // ---------------------------------------------------------------------
    // Derefs
    // ---------------------------------------------------------------------

    /// Statically resolve a deref offset. `None` when the offset is not a
    /// constant.
    pub fn offset_from_deref(&self, deref: &Deref) -> Option<u32> {
        use crate::node::ConstantValue;
        let Some(offset) = deref.offset else {
            return Some(0);
        };
        match &self.node(offset).kind {
            NodeKind::Constant(ConstantValue::Uint(v)) => Some(v[0]),
            NodeKind::Constant(_) => {
                tracing::error!(target: "ir", "deref offset constant is not a uint");
                None
            }
            _ => None,
        }
    }
}
