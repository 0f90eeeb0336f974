//! JSON interchange format for the typed syntax tree.
//!
//! The type checker serializes its output as a [`ModuleTree`]; [`load`] turns
//! it into the arena-based [`Ast`]. Every expression carries its static type.
//! Spans are optional `[start, end]` byte offsets.

use super::{
    Ast, BinaryOp, BindingId, BlockRef, Else, ExprKind, ExprRef, ItemKind, Literal, MatchArm,
    Param, PatBinding, Pattern, Resolution, StmtKind, StmtRef, Type, TypeId, UnaryOp,
};

use kiln_sourcemap::SourceSpan;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::path::Path;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed syntax tree: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown data type `{0}`")]
    UnknownData(String),
    #[error("data type `{0}` is defined twice")]
    DuplicateData(String),
    #[error("item `{0}` is defined twice")]
    DuplicateItem(String),
    #[error("invalid span {0}..{1}")]
    InvalidSpan(u32, u32),
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleTree {
    pub name: String,
    #[serde(default)]
    pub data: Vec<DataTree>,
    pub items: Vec<ItemTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTree {
    pub name: String,
    pub fields: Vec<FieldTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTree {
    pub name: String,
    pub ty: TypeTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTree {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Never,
    Data(String),
    Result { ok: Box<TypeTree>, err: Box<TypeTree> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemTree {
    Function {
        name: String,
        #[serde(default)]
        params: Vec<ParamTree>,
        ret: TypeTree,
        #[serde(default)]
        body: Option<BlockTree>,
        #[serde(default)]
        span: Option<[u32; 2]>,
    },
    Global {
        name: String,
        ty: TypeTree,
        #[serde(default)]
        mutable: bool,
        #[serde(default)]
        init: Option<ExprTree>,
        #[serde(default)]
        span: Option<[u32; 2]>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTree {
    pub binding: u32,
    pub name: String,
    pub ty: TypeTree,
    #[serde(default)]
    pub mutable: bool,
    #[serde(default)]
    pub span: Option<[u32; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockTree {
    #[serde(default)]
    pub stmts: Vec<StmtTree>,
    #[serde(default)]
    pub tail: Option<Box<ExprTree>>,
    #[serde(default)]
    pub span: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StmtTree {
    pub kind: StmtKindTree,
    #[serde(default)]
    pub span: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKindTree {
    Let {
        binding: u32,
        name: String,
        #[serde(default)]
        mutable: bool,
        #[serde(default)]
        captured: bool,
        ty: TypeTree,
        #[serde(default)]
        init: Option<ExprTree>,
    },
    Assign {
        target: ExprTree,
        #[serde(default)]
        op: Option<BinaryOpTree>,
        value: ExprTree,
    },
    Expr(ExprTree),
    Return(Option<ExprTree>),
    If {
        cond: ExprTree,
        then: BlockTree,
        #[serde(default)]
        otherwise: Option<ElseTree>,
    },
    While {
        cond: ExprTree,
        body: BlockTree,
    },
    Loop {
        body: BlockTree,
    },
    For {
        binding: u32,
        name: String,
        start: ExprTree,
        end: ExprTree,
        #[serde(default)]
        inclusive: bool,
        body: BlockTree,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElseTree {
    Block(BlockTree),
    If(Box<StmtTree>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprTree {
    pub kind: ExprKindTree,
    pub ty: TypeTree,
    #[serde(default)]
    pub span: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKindTree {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
    Local {
        binding: u32,
        name: String,
    },
    Global(String),
    Binary {
        op: BinaryOpTree,
        lhs: Box<ExprTree>,
        rhs: Box<ExprTree>,
    },
    Unary {
        op: UnaryOpTree,
        operand: Box<ExprTree>,
    },
    Cast(Box<ExprTree>),
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<ExprTree>,
    },
    Field {
        base: Box<ExprTree>,
        field: String,
    },
    Data(Vec<FieldInitTree>),
    Ok(Box<ExprTree>),
    Err(Box<ExprTree>),
    If {
        cond: Box<ExprTree>,
        then: BlockTree,
        #[serde(default)]
        otherwise: Option<Box<ExprTree>>,
    },
    Match {
        scrutinee: Box<ExprTree>,
        arms: Vec<ArmTree>,
    },
    Block(BlockTree),
    Try(Box<ExprTree>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInitTree {
    pub name: String,
    pub value: ExprTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmTree {
    pub pattern: PatternTree,
    pub body: ExprTree,
    #[serde(default)]
    pub span: Option<[u32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternTree {
    Wildcard,
    Bind(PatBindingTree),
    Int(i64),
    Bool(bool),
    Ok(Option<PatBindingTree>),
    Err(Option<PatBindingTree>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatBindingTree {
    pub binding: u32,
    pub name: String,
    #[serde(default)]
    pub mutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOpTree {
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
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOpTree {
    Neg,
    Not,
}

impl From<BinaryOpTree> for BinaryOp {
    fn from(op: BinaryOpTree) -> Self {
        match op {
            BinaryOpTree::Add => BinaryOp::Add,
            BinaryOpTree::Sub => BinaryOp::Sub,
            BinaryOpTree::Mul => BinaryOp::Mul,
            BinaryOpTree::Div => BinaryOp::Div,
            BinaryOpTree::Rem => BinaryOp::Rem,
            BinaryOpTree::BitAnd => BinaryOp::BitAnd,
            BinaryOpTree::BitOr => BinaryOp::BitOr,
            BinaryOpTree::BitXor => BinaryOp::BitXor,
            BinaryOpTree::Shl => BinaryOp::Shl,
            BinaryOpTree::Shr => BinaryOp::Shr,
            BinaryOpTree::Eq => BinaryOp::Eq,
            BinaryOpTree::Ne => BinaryOp::Ne,
            BinaryOpTree::Lt => BinaryOp::Lt,
            BinaryOpTree::Le => BinaryOp::Le,
            BinaryOpTree::Gt => BinaryOp::Gt,
            BinaryOpTree::Ge => BinaryOp::Ge,
            BinaryOpTree::And => BinaryOp::And,
            BinaryOpTree::Or => BinaryOp::Or,
        }
    }
}

impl From<UnaryOpTree> for UnaryOp {
    fn from(op: UnaryOpTree) -> Self {
        match op {
            UnaryOpTree::Neg => UnaryOp::Neg,
            UnaryOpTree::Not => UnaryOp::Not,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn load_file(path: impl AsRef<Path>) -> Result<(String, Ast), LoadError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&text)
}

/// Parses and loads a JSON module. Returns the module name and its tree.
pub fn load_str(text: &str) -> Result<(String, Ast), LoadError> {
    let tree: ModuleTree = serde_json::from_str(text)?;
    let ast = load(&tree)?;
    Ok((tree.name, ast))
}

pub fn load(tree: &ModuleTree) -> Result<Ast, LoadError> {
    let mut loader = Loader {
        ast: Ast::new(),
        datas: FxHashMap::default(),
    };
    loader.load_module(tree)?;
    Ok(loader.ast)
}

struct Loader {
    ast: Ast,
    datas: FxHashMap<String, TypeId>,
}

impl Loader {
    fn load_module(&mut self, tree: &ModuleTree) -> Result<(), LoadError> {
        for data in &tree.data {
            if self.datas.contains_key(&data.name) {
                return Err(LoadError::DuplicateData(data.name.clone()));
            }
            let name = self.ast.intern(&data.name);
            let id = self.ast.types.declare_data(name);
            self.datas.insert(data.name.clone(), id);
        }
        for data in &tree.data {
            let Type::Data(id) = self.ast.types[self.datas[&data.name]] else {
                continue;
            };
            let fields = data
                .fields
                .iter()
                .map(|field| Ok((self.ast.intern(&field.name), self.ty(&field.ty)?)))
                .collect::<Result<Vec<_>, LoadError>>()?;
            self.ast.types.define_data(id, fields);
        }

        let mut seen = FxHashSet::default();
        for item in &tree.items {
            let (name, span) = match item {
                ItemTree::Function { name, span, .. } | ItemTree::Global { name, span, .. } => {
                    (name, span)
                }
            };
            if !seen.insert(name.as_str()) {
                return Err(LoadError::DuplicateItem(name.clone()));
            }
            let kind = match item {
                ItemTree::Function {
                    params, ret, body, ..
                } => ItemKind::Function {
                    params: params
                        .iter()
                        .map(|param| self.param(param))
                        .collect::<Result<_, _>>()?,
                    ret: self.ty(ret)?,
                    body: body.as_ref().map(|body| self.block(body)).transpose()?,
                },
                ItemTree::Global {
                    ty, mutable, init, ..
                } => ItemKind::Global {
                    ty: self.ty(ty)?,
                    mutable: *mutable,
                    init: init.as_ref().map(|init| self.expr(init)).transpose()?,
                },
            };
            let symbol = self.ast.intern(name);
            let span = span_of(span)?;
            self.ast.add_item(symbol, kind, span);
        }
        Ok(())
    }

    fn ty(&mut self, tree: &TypeTree) -> Result<TypeId, LoadError> {
        Ok(match tree {
            TypeTree::Unit => TypeId::UNIT,
            TypeTree::Bool => TypeId::BOOL,
            TypeTree::Int => TypeId::INT,
            TypeTree::Float => TypeId::FLOAT,
            TypeTree::Str => TypeId::STR,
            TypeTree::Never => TypeId::NEVER,
            TypeTree::Data(name) => *self
                .datas
                .get(name)
                .ok_or_else(|| LoadError::UnknownData(name.clone()))?,
            TypeTree::Result { ok, err } => {
                let ok = self.ty(ok)?;
                let err = self.ty(err)?;
                self.ast.types.result(ok, err)
            }
        })
    }

    fn param(&mut self, tree: &ParamTree) -> Result<Param, LoadError> {
        Ok(Param {
            binding: BindingId(tree.binding),
            name: self.ast.intern(&tree.name),
            ty: self.ty(&tree.ty)?,
            mutable: tree.mutable,
            span: span_of(&tree.span)?,
        })
    }

    fn block(&mut self, tree: &BlockTree) -> Result<BlockRef, LoadError> {
        let stmts = tree
            .stmts
            .iter()
            .map(|stmt| self.stmt(stmt))
            .collect::<Result<_, _>>()?;
        let tail = tree.tail.as_deref().map(|tail| self.expr(tail)).transpose()?;
        let span = span_of(&tree.span)?;
        Ok(self.ast.add_block(stmts, tail, span))
    }

    fn binding(&mut self, tree: &PatBindingTree) -> PatBinding {
        PatBinding {
            binding: BindingId(tree.binding),
            name: self.ast.intern(&tree.name),
            mutable: tree.mutable,
        }
    }

    fn stmt(&mut self, tree: &StmtTree) -> Result<StmtRef, LoadError> {
        let kind = match &tree.kind {
            StmtKindTree::Let {
                binding,
                name,
                mutable,
                captured,
                ty,
                init,
            } => StmtKind::Let {
                binding: BindingId(*binding),
                name: self.ast.intern(name),
                mutable: *mutable,
                captured: *captured,
                ty: self.ty(ty)?,
                init: init.as_ref().map(|init| self.expr(init)).transpose()?,
            },
            StmtKindTree::Assign { target, op, value } => StmtKind::Assign {
                target: self.expr(target)?,
                op: op.map(Into::into),
                value: self.expr(value)?,
            },
            StmtKindTree::Expr(expr) => StmtKind::Expr(self.expr(expr)?),
            StmtKindTree::Return(value) => {
                StmtKind::Return(value.as_ref().map(|value| self.expr(value)).transpose()?)
            }
            StmtKindTree::If {
                cond,
                then,
                otherwise,
            } => StmtKind::If {
                cond: self.expr(cond)?,
                then: self.block(then)?,
                otherwise: match otherwise {
                    None => None,
                    Some(ElseTree::Block(block)) => Some(Else::Block(self.block(block)?)),
                    Some(ElseTree::If(stmt)) => Some(Else::If(self.stmt(stmt)?)),
                },
            },
            StmtKindTree::While { cond, body } => StmtKind::While {
                cond: self.expr(cond)?,
                body: self.block(body)?,
            },
            StmtKindTree::Loop { body } => StmtKind::Loop {
                body: self.block(body)?,
            },
            StmtKindTree::For {
                binding,
                name,
                start,
                end,
                inclusive,
                body,
            } => StmtKind::For {
                binding: BindingId(*binding),
                name: self.ast.intern(name),
                start: self.expr(start)?,
                end: self.expr(end)?,
                inclusive: *inclusive,
                body: self.block(body)?,
            },
            StmtKindTree::Break => StmtKind::Break,
            StmtKindTree::Continue => StmtKind::Continue,
        };
        let span = span_of(&tree.span)?;
        Ok(self.ast.add_stmt(kind, span))
    }

    fn expr(&mut self, tree: &ExprTree) -> Result<ExprRef, LoadError> {
        let kind = match &tree.kind {
            ExprKindTree::Int(value) => ExprKind::Literal(Literal::Int(*value)),
            ExprKindTree::Float(value) => ExprKind::Literal(Literal::Float(*value)),
            ExprKindTree::Bool(value) => ExprKind::Literal(Literal::Bool(*value)),
            ExprKindTree::Str(value) => ExprKind::Literal(Literal::Str(self.ast.intern(value))),
            ExprKindTree::Unit => ExprKind::Literal(Literal::Unit),
            ExprKindTree::Local { binding, name } => ExprKind::Ident {
                name: self.ast.intern(name),
                res: Resolution::Local(BindingId(*binding)),
            },
            ExprKindTree::Global(name) => ExprKind::Ident {
                name: self.ast.intern(name),
                res: Resolution::Global,
            },
            ExprKindTree::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: (*op).into(),
                lhs: self.expr(lhs)?,
                rhs: self.expr(rhs)?,
            },
            ExprKindTree::Unary { op, operand } => ExprKind::Unary {
                op: (*op).into(),
                operand: self.expr(operand)?,
            },
            ExprKindTree::Cast(value) => ExprKind::Cast(self.expr(value)?),
            ExprKindTree::Call { callee, args } => ExprKind::Call {
                callee: self.ast.intern(callee),
                args: args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<_, _>>()?,
            },
            ExprKindTree::Field { base, field } => ExprKind::Field {
                base: self.expr(base)?,
                field: self.ast.intern(field),
            },
            ExprKindTree::Data(fields) => ExprKind::DataInit {
                fields: fields
                    .iter()
                    .map(|field| Ok((self.ast.intern(&field.name), self.expr(&field.value)?)))
                    .collect::<Result<_, LoadError>>()?,
            },
            ExprKindTree::Ok(value) => ExprKind::Ok(self.expr(value)?),
            ExprKindTree::Err(value) => ExprKind::Err(self.expr(value)?),
            ExprKindTree::If {
                cond,
                then,
                otherwise,
            } => ExprKind::If {
                cond: self.expr(cond)?,
                then: self.block(then)?,
                otherwise: otherwise
                    .as_deref()
                    .map(|otherwise| self.expr(otherwise))
                    .transpose()?,
            },
            ExprKindTree::Match { scrutinee, arms } => ExprKind::Match {
                scrutinee: self.expr(scrutinee)?,
                arms: arms
                    .iter()
                    .map(|arm| self.arm(arm))
                    .collect::<Result<_, _>>()?,
            },
            ExprKindTree::Block(block) => ExprKind::Block(self.block(block)?),
            ExprKindTree::Try(value) => ExprKind::Try(self.expr(value)?),
        };
        let ty = self.ty(&tree.ty)?;
        let span = span_of(&tree.span)?;
        Ok(self.ast.add_expr(kind, ty, span))
    }

    fn arm(&mut self, tree: &ArmTree) -> Result<MatchArm, LoadError> {
        let pattern = match &tree.pattern {
            PatternTree::Wildcard => Pattern::Wildcard,
            PatternTree::Bind(binding) => Pattern::Bind(self.binding(binding)),
            PatternTree::Int(value) => Pattern::Int(*value),
            PatternTree::Bool(value) => Pattern::Bool(*value),
            PatternTree::Ok(binding) => Pattern::Ok(binding.as_ref().map(|b| self.binding(b))),
            PatternTree::Err(binding) => Pattern::Err(binding.as_ref().map(|b| self.binding(b))),
        };
        Ok(MatchArm {
            pattern,
            body: self.expr(&tree.body)?,
            span: span_of(&tree.span)?,
        })
    }
}

fn span_of(span: &Option<[u32; 2]>) -> Result<SourceSpan, LoadError> {
    match span {
        None => Ok(SourceSpan::default()),
        Some([start, end]) => {
            SourceSpan::new(*start..*end).ok_or(LoadError::InvalidSpan(*start, *end))
        }
    }
}
