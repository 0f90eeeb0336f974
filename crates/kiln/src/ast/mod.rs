//! The typed syntax tree handed over by the type checker.
//!
//! Every node carries a stable [`NodeId`] and a span; expressions also carry
//! their resolved static type, and identifiers their resolved binding.

#[cfg(test)]
pub(crate) mod fixture;
pub mod tree;
pub mod ty;

pub use ty::{DataDef, DataId, Type, TypeId, TypeTable};

use kiln_entity::{entity_impl, PrimaryMap};
use kiln_sourcemap::SourceSpan;
use kiln_ssa::NodeId;
use string_interner::{DefaultStringInterner, DefaultSymbol};

pub type Symbol = DefaultSymbol;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemRef(u32);
entity_impl!(ItemRef, "item");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprRef(u32);
entity_impl!(ExprRef, "expr");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtRef(u32);
entity_impl!(StmtRef, "stmt");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "block");

/// A local binding as numbered by the name resolver. Unique per function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u32);

// ---------------------------------------------------------------------------
// Ast
// ---------------------------------------------------------------------------

pub struct Ast {
    pub interner: DefaultStringInterner,
    pub types: TypeTable,
    pub items: PrimaryMap<ItemRef, Item>,
    pub exprs: PrimaryMap<ExprRef, Expr>,
    pub stmts: PrimaryMap<StmtRef, Stmt>,
    pub blocks: PrimaryMap<BlockRef, Block>,
    next_node: u32,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    pub fn new() -> Self {
        Self {
            interner: DefaultStringInterner::new(),
            types: TypeTable::new(),
            items: PrimaryMap::new(),
            exprs: PrimaryMap::new(),
            stmts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            next_node: 0,
        }
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.interner.get_or_intern(name)
    }

    pub fn resolve(&self, symbol: Symbol) -> Option<&str> {
        self.interner.resolve(symbol)
    }

    pub fn next_node(&mut self) -> NodeId {
        let node = NodeId(self.next_node);
        self.next_node += 1;
        node
    }

    pub fn add_expr(&mut self, kind: ExprKind, ty: TypeId, span: SourceSpan) -> ExprRef {
        let node = self.next_node();
        self.exprs.push(Expr {
            kind,
            ty,
            span,
            node,
        })
    }

    pub fn add_stmt(&mut self, kind: StmtKind, span: SourceSpan) -> StmtRef {
        let node = self.next_node();
        self.stmts.push(Stmt { kind, span, node })
    }

    pub fn add_block(
        &mut self,
        stmts: Vec<StmtRef>,
        tail: Option<ExprRef>,
        span: SourceSpan,
    ) -> BlockRef {
        let node = self.next_node();
        self.blocks.push(Block {
            stmts,
            tail,
            span,
            node,
        })
    }

    pub fn add_item(&mut self, name: Symbol, kind: ItemKind, span: SourceSpan) -> ItemRef {
        let node = self.next_node();
        self.items.push(Item {
            name,
            kind,
            span,
            node,
        })
    }

    /// Looks up a top-level item by name.
    pub fn item(&self, name: &str) -> Option<ItemRef> {
        let symbol = self.interner.get(name)?;
        self.items
            .iter()
            .find(|(_, item)| item.name == symbol)
            .map(|(item, _)| item)
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: Symbol,
    pub kind: ItemKind,
    pub span: SourceSpan,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// A function. Extern functions have no body.
    Function {
        params: Vec<Param>,
        ret: TypeId,
        body: Option<BlockRef>,
    },
    /// A module-level variable.
    Global {
        ty: TypeId,
        mutable: bool,
        init: Option<ExprRef>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub binding: BindingId,
    pub name: Symbol,
    pub ty: TypeId,
    pub mutable: bool,
    pub span: SourceSpan,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<StmtRef>,
    /// The trailing expression that gives the block its value.
    pub tail: Option<ExprRef>,
    pub span: SourceSpan,
    pub node: NodeId,
}

// ---------------------------------------------------------------------------
// Stmt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A let binding. `captured` bindings have their address taken by a
    /// closure or an await point and must stay in memory.
    Let {
        binding: BindingId,
        name: Symbol,
        mutable: bool,
        captured: bool,
        ty: TypeId,
        init: Option<ExprRef>,
    },
    /// An assignment, `op` is set for compound assignments like `+=`.
    Assign {
        target: ExprRef,
        op: Option<BinaryOp>,
        value: ExprRef,
    },
    /// An expression statement.
    Expr(ExprRef),
    /// A return statement.
    Return(Option<ExprRef>),
    /// An if statement, possibly without an else branch.
    If {
        cond: ExprRef,
        then: BlockRef,
        otherwise: Option<Else>,
    },
    /// A while loop.
    While { cond: ExprRef, body: BlockRef },
    /// An infinite loop.
    Loop { body: BlockRef },
    /// A loop over an integer range, `start..end` or `start..=end`.
    For {
        binding: BindingId,
        name: Symbol,
        start: ExprRef,
        end: ExprRef,
        inclusive: bool,
        body: BlockRef,
    },
    /// A break statement.
    Break,
    /// A continue statement.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Else {
    Block(BlockRef),
    /// An `else if` chain; the statement is always an `If`.
    If(StmtRef),
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: SourceSpan,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A literal value.
    Literal(Literal),
    /// A resolved identifier.
    Ident { name: Symbol, res: Resolution },
    /// A binary expression.
    Binary {
        op: BinaryOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    /// A unary expression.
    Unary { op: UnaryOp, operand: ExprRef },
    /// A conversion to the expression's own type.
    Cast(ExprRef),
    /// A direct call.
    Call { callee: Symbol, args: Vec<ExprRef> },
    /// A field read on a `data` instance.
    Field { base: ExprRef, field: Symbol },
    /// A `data` instance construction.
    DataInit { fields: Vec<(Symbol, ExprRef)> },
    /// `Ok(value)`.
    Ok(ExprRef),
    /// `Err(value)`.
    Err(ExprRef),
    /// An if expression. `otherwise` is a block or another `If` expression.
    If {
        cond: ExprRef,
        then: BlockRef,
        otherwise: Option<ExprRef>,
    },
    /// A match expression.
    Match {
        scrutinee: ExprRef,
        arms: Vec<MatchArm>,
    },
    /// A block expression.
    Block(BlockRef),
    /// The `?` operator.
    Try(ExprRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Symbol),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local(BindingId),
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: ExprRef,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Wildcard,
    Bind(PatBinding),
    Int(i64),
    Bool(bool),
    Ok(Option<PatBinding>),
    Err(Option<PatBinding>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatBinding {
    pub binding: BindingId,
    pub name: Symbol,
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
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
    /// Short-circuit `&&`.
    And,
    /// Short-circuit `||`.
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical NOT on booleans, bitwise NOT on integers.
    Not,
}
