//! The canonical tree the CFG builder consumes.
//!
//! Compared to [`crate::ast`], the HIR has no statement-position `if`, no
//! implicit `else`, no short-circuit operators, a single loop form and no
//! compound assignment. Locals are numbered densely per function. Every node
//! keeps the [`NodeId`] and span of the syntax it came from.

pub mod desugar;
pub mod stamp;

pub use desugar::desugar;

use crate::ast::{TypeId, UnaryOp};

use kiln_entity::{entity_impl, EntityRef};
use kiln_sourcemap::SourceSpan;
use kiln_ssa::NodeId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Local(u32);
entity_impl!(Local, "_");

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalDecl {
    pub name: String,
    pub ty: TypeId,
    pub mutable: bool,
    /// The address of the local escapes; it must stay in memory.
    pub captured: bool,
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Body {
    pub name: String,
    pub params: Vec<Local>,
    pub ret: TypeId,
    /// Indexed by [`Local`].
    pub locals: Vec<LocalDecl>,
    pub block: Block,
    pub span: SourceSpan,
    pub node: NodeId,
}

impl Body {
    pub fn local(&self, local: Local) -> &LocalDecl {
        &self.locals[local.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
    pub span: SourceSpan,
    pub node: NodeId,
}

impl Block {
    /// A block with no statements and no value.
    pub fn empty(span: SourceSpan, node: NodeId) -> Self {
        Self {
            stmts: Vec::new(),
            tail: None,
            span,
            node,
        }
    }

    /// A block whose only content is its value.
    pub fn wrap(expr: Expr) -> Self {
        Self {
            span: expr.span,
            node: expr.node,
            stmts: Vec::new(),
            tail: Some(Box::new(expr)),
        }
    }
}

// ---------------------------------------------------------------------------
// Stmt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StmtKind {
    Let {
        local: Local,
        init: Option<Expr>,
    },
    Assign {
        place: Place,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    Break,
    Continue,
    /// The only loop form. `continue` jumps to `step` when present, to the
    /// condition otherwise.
    Loop {
        cond: Option<Expr>,
        body: Block,
        step: Option<Block>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Place {
    Local(Local),
    Global(String),
    Field { base: Box<Expr>, index: u32 },
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: SourceSpan,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal(Literal),
    Local(Local),
    Global(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Cast(Box<Expr>),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Field {
        base: Box<Expr>,
        index: u32,
    },
    /// Field initializers in source order, each with its declared index.
    DataInit {
        fields: Vec<(u32, Expr)>,
    },
    Ok(Box<Expr>),
    Err(Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Block,
        otherwise: Block,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<Arm>,
    },
    Block(Block),
    Try(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    /// IEEE-754 bit pattern.
    Float(u64),
    Bool(bool),
    Str(String),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arm {
    pub pattern: Pattern,
    pub body: Expr,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    Wildcard,
    Bind(Local),
    Int(i64),
    Bool(bool),
    Ok(Option<Local>),
    Err(Option<Local>),
}

impl Pattern {
    pub fn is_irrefutable(&self) -> bool {
        matches!(self, Pattern::Wildcard | Pattern::Bind(_))
    }
}
