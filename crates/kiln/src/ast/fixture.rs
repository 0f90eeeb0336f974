//! Shorthands for writing syntax trees in tests.

use super::tree::*;

pub fn module(items: Vec<ItemTree>) -> ModuleTree {
    ModuleTree {
        name: "test".to_string(),
        data: Vec::new(),
        items,
    }
}

pub fn result_ty(ok: TypeTree, err: TypeTree) -> TypeTree {
    TypeTree::Result {
        ok: Box::new(ok),
        err: Box::new(err),
    }
}

pub fn param(binding: u32, name: &str, ty: TypeTree) -> ParamTree {
    ParamTree {
        binding,
        name: name.to_string(),
        ty,
        mutable: false,
        span: None,
    }
}

pub fn function(name: &str, params: Vec<ParamTree>, ret: TypeTree, body: BlockTree) -> ItemTree {
    ItemTree::Function {
        name: name.to_string(),
        params,
        ret,
        body: Some(body),
        span: None,
    }
}

pub fn extern_fn(name: &str, params: Vec<ParamTree>, ret: TypeTree) -> ItemTree {
    ItemTree::Function {
        name: name.to_string(),
        params,
        ret,
        body: None,
        span: None,
    }
}

pub fn block(stmts: Vec<StmtTree>, tail: Option<ExprTree>) -> BlockTree {
    BlockTree {
        stmts,
        tail: tail.map(Box::new),
        span: None,
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

pub fn stmt(kind: StmtKindTree) -> StmtTree {
    StmtTree { kind, span: None }
}

pub fn let_(binding: u32, name: &str, ty: TypeTree, mutable: bool, init: Option<ExprTree>) -> StmtTree {
    stmt(StmtKindTree::Let {
        binding,
        name: name.to_string(),
        mutable,
        captured: false,
        ty,
        init,
    })
}

pub fn assign(target: ExprTree, op: Option<BinaryOpTree>, value: ExprTree) -> StmtTree {
    stmt(StmtKindTree::Assign { target, op, value })
}

pub fn ret(value: Option<ExprTree>) -> StmtTree {
    stmt(StmtKindTree::Return(value))
}

pub fn expr_stmt(expr: ExprTree) -> StmtTree {
    stmt(StmtKindTree::Expr(expr))
}

pub fn if_stmt(cond: ExprTree, then: BlockTree, otherwise: Option<BlockTree>) -> StmtTree {
    stmt(StmtKindTree::If {
        cond,
        then,
        otherwise: otherwise.map(ElseTree::Block),
    })
}

pub fn while_stmt(cond: ExprTree, body: BlockTree) -> StmtTree {
    stmt(StmtKindTree::While { cond, body })
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

pub fn expr(kind: ExprKindTree, ty: TypeTree) -> ExprTree {
    ExprTree {
        kind,
        ty,
        span: None,
    }
}

pub fn spanned(mut expr: ExprTree, start: u32, end: u32) -> ExprTree {
    expr.span = Some([start, end]);
    expr
}

pub fn int(value: i64) -> ExprTree {
    expr(ExprKindTree::Int(value), TypeTree::Int)
}

pub fn boolean(value: bool) -> ExprTree {
    expr(ExprKindTree::Bool(value), TypeTree::Bool)
}

pub fn local(binding: u32, name: &str, ty: TypeTree) -> ExprTree {
    expr(
        ExprKindTree::Local {
            binding,
            name: name.to_string(),
        },
        ty,
    )
}

pub fn binary(op: BinaryOpTree, lhs: ExprTree, rhs: ExprTree, ty: TypeTree) -> ExprTree {
    expr(
        ExprKindTree::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

pub fn call(callee: &str, args: Vec<ExprTree>, ty: TypeTree) -> ExprTree {
    expr(
        ExprKindTree::Call {
            callee: callee.to_string(),
            args,
        },
        ty,
    )
}
