//! Instruction nodes.
//!
//! Nodes live in a per-context arena and reference each other through typed
//! source slots. Every filled slot is mirrored by an entry in the target
//! node's use list; `Context` keeps the two sides in sync. Blocks are arena
//! entries of their own holding an ordered list of node ids.

use crate::swizzle::{Swizzle, Writemask};
use shade_types::{SourceLocation, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// An allocated target register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Register {
    pub id: u32,
    pub writemask: Writemask,
    pub allocated: bool,
}

/// Identifies one source slot of a node; `(NodeId, SrcSlot)` pairs form the
/// use lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcSlot {
    /// Expression operand 0..=2.
    Operand(u8),
    LoadOffset,
    StoreRhs,
    StoreOffset,
    SwizzleSrc,
    Condition,
    Coords,
    ResourceOffset,
    SamplerOffset,
}

/// A variable dereference with an optional scalar uint offset, measured in
/// register slots.
#[derive(Debug, Clone)]
pub struct Deref {
    pub var: VarId,
    pub offset: Option<NodeId>,
}

impl Deref {
    pub fn direct(var: VarId) -> Self {
        Self { var, offset: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    // Unary.
    BitNot,
    LogNot,
    Neg,
    Abs,
    Sign,
    Rcp,
    Rsq,
    Sqrt,
    Nrm,
    Exp2,
    Log2,
    Cast,
    Fract,
    Sin,
    Cos,
    SinReduced,
    CosReduced,
    Dsx,
    Dsy,
    Sat,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    // Binary.
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    LogAnd,
    LogOr,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Dot,
    Cross,
    Min,
    Max,
    Pow,
    Seq,
    // Ternary.
    Lerp,
}

impl ExprOp {
    /// Relational operators produce a bool-shaped result.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            ExprOp::Less
                | ExprOp::Greater
                | ExprOp::LessEqual
                | ExprOp::GreaterEqual
                | ExprOp::Equal
                | ExprOp::NotEqual
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExprOp::BitNot => "~",
            ExprOp::LogNot => "!",
            ExprOp::Neg => "-",
            ExprOp::Abs => "abs",
            ExprOp::Sign => "sign",
            ExprOp::Rcp => "rcp",
            ExprOp::Rsq => "rsq",
            ExprOp::Sqrt => "sqrt",
            ExprOp::Nrm => "nrm",
            ExprOp::Exp2 => "exp2",
            ExprOp::Log2 => "log2",
            ExprOp::Cast => "cast",
            ExprOp::Fract => "fract",
            ExprOp::Sin => "sin",
            ExprOp::Cos => "cos",
            ExprOp::SinReduced => "sin_reduced",
            ExprOp::CosReduced => "cos_reduced",
            ExprOp::Dsx => "dsx",
            ExprOp::Dsy => "dsy",
            ExprOp::Sat => "sat",
            ExprOp::PreInc => "pre++",
            ExprOp::PreDec => "pre--",
            ExprOp::PostInc => "post++",
            ExprOp::PostDec => "post--",
            ExprOp::Add => "+",
            ExprOp::Sub => "-",
            ExprOp::Mul => "*",
            ExprOp::Div => "/",
            ExprOp::Mod => "%",
            ExprOp::Less => "<",
            ExprOp::Greater => ">",
            ExprOp::LessEqual => "<=",
            ExprOp::GreaterEqual => ">=",
            ExprOp::Equal => "==",
            ExprOp::NotEqual => "!=",
            ExprOp::LogAnd => "&&",
            ExprOp::LogOr => "||",
            ExprOp::Shl => "<<",
            ExprOp::Shr => ">>",
            ExprOp::BitAnd => "&",
            ExprOp::BitOr => "|",
            ExprOp::BitXor => "^",
            ExprOp::Dot => "dot",
            ExprOp::Cross => "crs",
            ExprOp::Min => "min",
            ExprOp::Max => "max",
            ExprOp::Pow => "pow",
            ExprOp::Seq => ",",
            ExprOp::Lerp => "lerp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
    Discard,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLoadKind {
    Load,
    Sample,
}

/// Per-component constant payload. Components beyond the type's width are
/// zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Bool([bool; 4]),
    /// Also used for half.
    Float([f32; 4]),
    Double([f64; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Constant(ConstantValue),
    Expr {
        op: ExprOp,
        operands: [Option<NodeId>; 3],
    },
    Load(Deref),
    Store {
        lhs: Deref,
        rhs: Option<NodeId>,
        writemask: Writemask,
    },
    Swizzle {
        swizzle: Swizzle,
        src: Option<NodeId>,
    },
    If {
        condition: Option<NodeId>,
        then_block: BlockId,
        else_block: BlockId,
    },
    Loop {
        body: BlockId,
        /// Instruction index just past the loop; set during liveness
        /// indexing.
        next_index: u32,
    },
    Jump(JumpKind),
    ResourceLoad {
        kind: ResourceLoadKind,
        resource: Deref,
        sampler: Option<Deref>,
        coords: Option<NodeId>,
    },
}

impl NodeKind {
    /// The source slots this kind can carry, in a fixed order.
    pub fn slots(&self) -> Vec<SrcSlot> {
        match self {
            NodeKind::Constant(_) | NodeKind::Jump(_) => Vec::new(),
            NodeKind::Expr { .. } => vec![
                SrcSlot::Operand(0),
                SrcSlot::Operand(1),
                SrcSlot::Operand(2),
            ],
            NodeKind::Load(_) => vec![SrcSlot::LoadOffset],
            NodeKind::Store { .. } => vec![SrcSlot::StoreRhs, SrcSlot::StoreOffset],
            NodeKind::Swizzle { .. } => vec![SrcSlot::SwizzleSrc],
            NodeKind::If { .. } => vec![SrcSlot::Condition],
            NodeKind::Loop { .. } => Vec::new(),
            NodeKind::ResourceLoad { .. } => vec![
                SrcSlot::Coords,
                SrcSlot::ResourceOffset,
                SrcSlot::SamplerOffset,
            ],
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Constant(_) => "constant",
            NodeKind::Expr { .. } => "expr",
            NodeKind::Load(_) => "load",
            NodeKind::Store { .. } => "store",
            NodeKind::Swizzle { .. } => "swizzle",
            NodeKind::If { .. } => "if",
            NodeKind::Loop { .. } => "loop",
            NodeKind::Jump(_) => "jump",
            NodeKind::ResourceLoad { .. } => "resource-load",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: TypeId,
    pub loc: SourceLocation,
    /// Unique pre-order index; 0 means not indexed yet.
    pub index: u32,
    pub last_read: u32,
    pub reg: Register,
    /// Back-references from the source slots of other nodes.
    pub uses: Vec<(NodeId, SrcSlot)>,
    /// The block currently holding the node, if linked.
    pub block: Option<BlockId>,
    pub dead: bool,
}

/// An ordered instruction list.
#[derive(Debug, Default, Clone)]
pub struct Block {
    pub instrs: Vec<NodeId>,
}
