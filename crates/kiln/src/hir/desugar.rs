//! Rewrites one function item of the [`Ast`] into a [`Body`].

use super::{Arm, BinOp, Block, Body, Expr, ExprKind, Literal, Local, LocalDecl, Pattern, Place, Stmt, StmtKind};
use crate::{
    ast::{self, Ast, BindingId, Else, ItemKind, ItemRef, Resolution, Symbol, Type, TypeId},
    ice, LowerError,
};

use kiln_entity::EntityRef;
use kiln_sourcemap::SourceSpan;
use kiln_ssa::NodeId;
use rustc_hash::FxHashMap;

/// Desugars the function `item`. Extern functions and globals have no body
/// and yield `None`.
pub fn desugar(ast: &Ast, item: ItemRef) -> Result<Option<Body>, LowerError> {
    let item = &ast.items[item];
    let ItemKind::Function {
        params,
        ret,
        body: Some(block),
    } = &item.kind
    else {
        return Ok(None);
    };

    let mut desugarer = Desugarer {
        ast,
        locals: Vec::new(),
        bindings: FxHashMap::default(),
    };

    let params = params
        .iter()
        .map(|param| {
            desugarer.bind(param.binding, param.name, param.ty, param.mutable, false)
        })
        .collect();
    let block = desugarer.block(*block)?;

    Ok(Some(Body {
        params,
        block,
        ret: *ret,
        name: desugarer.name(item.name).to_string(),
        locals: desugarer.locals,
        span: item.span,
        node: item.node,
    }))
}

struct Desugarer<'a> {
    ast: &'a Ast,
    locals: Vec<LocalDecl>,
    bindings: FxHashMap<BindingId, Local>,
}

impl<'a> Desugarer<'a> {
    fn name(&self, symbol: Symbol) -> &'a str {
        self.ast.resolve(symbol).unwrap_or("<unknown>")
    }

    /// The local for `binding`, allocated on first appearance.
    fn bind(
        &mut self,
        binding: BindingId,
        name: Symbol,
        ty: TypeId,
        mutable: bool,
        captured: bool,
    ) -> Local {
        if let Some(local) = self.bindings.get(&binding) {
            let decl = &mut self.locals[local.index()];
            decl.mutable |= mutable;
            decl.captured |= captured;
            return *local;
        }
        let local = self.fresh(self.name(name).to_string(), ty, mutable);
        self.locals[local.index()].captured = captured;
        self.bindings.insert(binding, local);
        local
    }

    /// A local with no counterpart in the source.
    fn fresh(&mut self, name: String, ty: TypeId, mutable: bool) -> Local {
        let local = Local::new(self.locals.len());
        self.locals.push(LocalDecl {
            name,
            ty,
            mutable,
            captured: false,
        });
        local
    }

    // -----------------------------------------------------------------------
    // Blocks and statements
    // -----------------------------------------------------------------------

    fn block(&mut self, block: ast::BlockRef) -> Result<Block, LowerError> {
        let ast = self.ast;
        let block = &ast.blocks[block];
        let mut stmts = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            self.stmt(*stmt, &mut stmts)?;
        }
        let tail = match block.tail {
            Some(tail) => Some(Box::new(self.expr(tail)?)),
            None => None,
        };
        Ok(Block {
            stmts,
            tail,
            span: block.span,
            node: block.node,
        })
    }

    fn stmt(&mut self, stmt_ref: ast::StmtRef, out: &mut Vec<Stmt>) -> Result<(), LowerError> {
        let ast = self.ast;
        let stmt = &ast.stmts[stmt_ref];
        let (span, node) = (stmt.span, stmt.node);
        let kind = match &stmt.kind {
            ast::StmtKind::Let {
                binding,
                name,
                mutable,
                captured,
                ty,
                init,
            } => {
                let init = init.map(|init| self.expr(init)).transpose()?;
                let local = self.bind(*binding, *name, *ty, *mutable, *captured);
                StmtKind::Let { local, init }
            }
            ast::StmtKind::Assign { target, op, value } => {
                return self.assign(*target, *op, *value, span, node, out);
            }
            ast::StmtKind::Expr(expr) => StmtKind::Expr(self.expr(*expr)?),
            ast::StmtKind::Return(value) => {
                StmtKind::Return(value.map(|value| self.expr(value)).transpose()?)
            }
            ast::StmtKind::If { .. } => StmtKind::Expr(self.if_stmt(stmt_ref)?),
            ast::StmtKind::While { cond, body } => StmtKind::Loop {
                cond: Some(self.expr(*cond)?),
                body: self.block(*body)?,
                step: None,
            },
            ast::StmtKind::Loop { body } => StmtKind::Loop {
                cond: None,
                body: self.block(*body)?,
                step: None,
            },
            ast::StmtKind::For {
                binding,
                name,
                start,
                end,
                inclusive,
                body,
            } => StmtKind::Expr(self.for_loop(
                *binding, *name, *start, *end, *inclusive, *body, span, node,
            )?),
            ast::StmtKind::Break => StmtKind::Break,
            ast::StmtKind::Continue => StmtKind::Continue,
        };
        out.push(Stmt { kind, span, node });
        Ok(())
    }

    /// `if` in statement position becomes a unit `if` expression with an
    /// explicit `else`. `else if` chains nest in the `else` block.
    fn if_stmt(&mut self, stmt_ref: ast::StmtRef) -> Result<Expr, LowerError> {
        let ast = self.ast;
        let stmt = &ast.stmts[stmt_ref];
        let ast::StmtKind::If {
            cond,
            then,
            otherwise,
        } = &stmt.kind
        else {
            return Err(ice(stmt.span, "`else if` does not continue with an `if`"));
        };

        let cond = self.expr(*cond)?;
        let then = self.block(*then)?;
        let otherwise = match otherwise {
            None => Block::empty(stmt.span, stmt.node),
            Some(Else::Block(block)) => self.block(*block)?,
            Some(Else::If(nested)) => Block::wrap(self.if_stmt(*nested)?),
        };
        Ok(Expr {
            kind: ExprKind::If {
                cond: Box::new(cond),
                then,
                otherwise,
            },
            ty: TypeId::UNIT,
            span: stmt.span,
            node: stmt.node,
        })
    }

    /// `for i in a..b { body }` becomes
    /// `{ let mut i = a; let end = b; loop while i < end { body } step { i = i + 1 } }`.
    #[allow(clippy::too_many_arguments)]
    fn for_loop(
        &mut self,
        binding: BindingId,
        name: Symbol,
        start: ast::ExprRef,
        end: ast::ExprRef,
        inclusive: bool,
        body: ast::BlockRef,
        span: SourceSpan,
        node: NodeId,
    ) -> Result<Expr, LowerError> {
        let start = self.expr(start)?;
        let end = self.expr(end)?;
        let index = self.bind(binding, name, start.ty, true, false);
        let bound = self.fresh(format!("{}.end", self.name(name)), end.ty, false);
        let body = self.block(body)?;

        let at = |kind, ty| Expr {
            kind,
            ty,
            span,
            node,
        };
        let stmt = |kind| Stmt { kind, span, node };
        let read = |local| at(ExprKind::Local(local), TypeId::INT);

        let cond = at(
            ExprKind::Binary {
                op: if inclusive { BinOp::Le } else { BinOp::Lt },
                lhs: Box::new(read(index)),
                rhs: Box::new(read(bound)),
            },
            TypeId::BOOL,
        );
        let next = at(
            ExprKind::Binary {
                op: BinOp::Add,
                lhs: Box::new(read(index)),
                rhs: Box::new(at(ExprKind::Literal(Literal::Int(1)), TypeId::INT)),
            },
            TypeId::INT,
        );
        let step = Block {
            stmts: vec![stmt(StmtKind::Assign {
                place: Place::Local(index),
                value: next,
            })],
            tail: None,
            span,
            node,
        };

        Ok(at(
            ExprKind::Block(Block {
                stmts: vec![
                    stmt(StmtKind::Let {
                        local: index,
                        init: Some(start),
                    }),
                    stmt(StmtKind::Let {
                        local: bound,
                        init: Some(end),
                    }),
                    stmt(StmtKind::Loop {
                        cond: Some(cond),
                        body,
                        step: Some(step),
                    }),
                ],
                tail: None,
                span,
                node,
            }),
            TypeId::UNIT,
        ))
    }

    /// Plain and compound assignment. `p op= e` becomes `p = p op e`; a field
    /// base is evaluated once into a fresh local first.
    fn assign(
        &mut self,
        target: ast::ExprRef,
        op: Option<ast::BinaryOp>,
        value: ast::ExprRef,
        span: SourceSpan,
        node: NodeId,
        out: &mut Vec<Stmt>,
    ) -> Result<(), LowerError> {
        let ast = self.ast;
        let target_expr = &ast.exprs[target];
        let ty = target_expr.ty;
        let place = match &target_expr.kind {
            ast::ExprKind::Ident {
                name,
                res: Resolution::Local(binding),
            } => Place::Local(self.bind(*binding, *name, ty, false, false)),
            ast::ExprKind::Ident {
                name,
                res: Resolution::Global,
            } => Place::Global(self.name(*name).to_string()),
            ast::ExprKind::Field { base, field } => {
                let mut base = self.expr(*base)?;
                let index = self.field_index(&base, *field, target_expr.span)?;
                if op.is_some() {
                    let temp = self.fresh("field.base".to_string(), base.ty, false);
                    let (base_span, base_node, base_ty) = (base.span, base.node, base.ty);
                    out.push(Stmt {
                        kind: StmtKind::Let {
                            local: temp,
                            init: Some(base),
                        },
                        span: base_span,
                        node: base_node,
                    });
                    base = Expr {
                        kind: ExprKind::Local(temp),
                        ty: base_ty,
                        span: base_span,
                        node: base_node,
                    };
                }
                Place::Field {
                    base: Box::new(base),
                    index,
                }
            }
            _ => return Err(ice(target_expr.span, "assignment to a non-place expression")),
        };

        let rhs = self.expr(value)?;
        let value = match op {
            None => rhs,
            Some(op) => {
                let op = self.bin_op(op, span)?;
                let current = Expr {
                    kind: match &place {
                        Place::Local(local) => ExprKind::Local(*local),
                        Place::Global(name) => ExprKind::Global(name.clone()),
                        Place::Field { base, index } => ExprKind::Field {
                            base: base.clone(),
                            index: *index,
                        },
                    },
                    ty,
                    span: target_expr.span,
                    node: target_expr.node,
                };
                Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(current),
                        rhs: Box::new(rhs),
                    },
                    ty,
                    span,
                    node,
                }
            }
        };

        out.push(Stmt {
            kind: StmtKind::Assign { place, value },
            span,
            node,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expr(&mut self, expr_ref: ast::ExprRef) -> Result<Expr, LowerError> {
        let ast = self.ast;
        let expr = &ast.exprs[expr_ref];
        let (ty, span, node) = (expr.ty, expr.span, expr.node);
        let kind = match &expr.kind {
            ast::ExprKind::Literal(literal) => ExprKind::Literal(match literal {
                ast::Literal::Int(value) => Literal::Int(*value),
                ast::Literal::Float(value) => Literal::Float(value.to_bits()),
                ast::Literal::Bool(value) => Literal::Bool(*value),
                ast::Literal::Str(value) => Literal::Str(self.name(*value).to_string()),
                ast::Literal::Unit => Literal::Unit,
            }),
            ast::ExprKind::Ident {
                name,
                res: Resolution::Local(binding),
            } => ExprKind::Local(self.bind(*binding, *name, ty, false, false)),
            ast::ExprKind::Ident {
                name,
                res: Resolution::Global,
            } => ExprKind::Global(self.name(*name).to_string()),
            ast::ExprKind::Binary {
                op: ast::BinaryOp::And,
                lhs,
                rhs,
            } => {
                // a && b => if a { b } else { false }
                let lhs = self.expr(*lhs)?;
                let rhs = self.expr(*rhs)?;
                let no = Expr {
                    kind: ExprKind::Literal(Literal::Bool(false)),
                    ty: TypeId::BOOL,
                    span,
                    node,
                };
                ExprKind::If {
                    cond: Box::new(lhs),
                    then: Block::wrap(rhs),
                    otherwise: Block::wrap(no),
                }
            }
            ast::ExprKind::Binary {
                op: ast::BinaryOp::Or,
                lhs,
                rhs,
            } => {
                // a || b => if a { true } else { b }
                let lhs = self.expr(*lhs)?;
                let rhs = self.expr(*rhs)?;
                let yes = Expr {
                    kind: ExprKind::Literal(Literal::Bool(true)),
                    ty: TypeId::BOOL,
                    span,
                    node,
                };
                ExprKind::If {
                    cond: Box::new(lhs),
                    then: Block::wrap(yes),
                    otherwise: Block::wrap(rhs),
                }
            }
            ast::ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: self.bin_op(*op, span)?,
                lhs: Box::new(self.expr(*lhs)?),
                rhs: Box::new(self.expr(*rhs)?),
            },
            ast::ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Box::new(self.expr(*operand)?),
            },
            ast::ExprKind::Cast(value) => ExprKind::Cast(Box::new(self.expr(*value)?)),
            ast::ExprKind::Call { callee, args } => ExprKind::Call {
                callee: self.name(*callee).to_string(),
                args: args
                    .iter()
                    .map(|arg| self.expr(*arg))
                    .collect::<Result<_, _>>()?,
            },
            ast::ExprKind::Field { base, field } => {
                let base = self.expr(*base)?;
                let index = self.field_index(&base, *field, span)?;
                ExprKind::Field {
                    base: Box::new(base),
                    index,
                }
            }
            ast::ExprKind::DataInit { fields } => {
                let Type::Data(data) = ast.types[ty] else {
                    return Err(ice(span, "data initializer of a non-data type"));
                };
                let def = ast.types.data(data);
                if fields.len() != def.fields.len() {
                    return Err(ice(span, "data initializer does not cover every field"));
                }
                let mut lowered = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    let Some((index, _)) = def.field(*name) else {
                        return Err(ice(
                            span,
                            format!("unknown field `{}`", self.name(*name)),
                        ));
                    };
                    if lowered.iter().any(|(seen, _)| *seen == index) {
                        return Err(ice(span, "field initialized twice"));
                    }
                    lowered.push((index, self.expr(*value)?));
                }
                ExprKind::DataInit { fields: lowered }
            }
            ast::ExprKind::Ok(value) => ExprKind::Ok(Box::new(self.expr(*value)?)),
            ast::ExprKind::Err(value) => ExprKind::Err(Box::new(self.expr(*value)?)),
            ast::ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.expr(*cond)?;
                let then = self.block(*then)?;
                let otherwise = match otherwise {
                    None => Block::empty(span, node),
                    Some(otherwise) => match &ast.exprs[*otherwise].kind {
                        ast::ExprKind::Block(block) => self.block(*block)?,
                        _ => Block::wrap(self.expr(*otherwise)?),
                    },
                };
                ExprKind::If {
                    cond: Box::new(cond),
                    then,
                    otherwise,
                }
            }
            ast::ExprKind::Match { scrutinee, arms } => {
                let scrutinee = self.expr(*scrutinee)?;
                let arms = arms
                    .iter()
                    .map(|arm| self.arm(arm, scrutinee.ty))
                    .collect::<Result<_, _>>()?;
                ExprKind::Match {
                    scrutinee: Box::new(scrutinee),
                    arms,
                }
            }
            ast::ExprKind::Block(block) => ExprKind::Block(self.block(*block)?),
            ast::ExprKind::Try(value) => ExprKind::Try(Box::new(self.expr(*value)?)),
        };
        Ok(Expr {
            kind,
            ty,
            span,
            node,
        })
    }

    fn arm(&mut self, arm: &ast::MatchArm, scrutinee: TypeId) -> Result<Arm, LowerError> {
        let ast = self.ast;
        let payload = |ok: bool| match ast.types[scrutinee] {
            Type::Result { ok: ty, .. } if ok => Ok(ty),
            Type::Result { err: ty, .. } => Ok(ty),
            _ => Err(ice(arm.span, "result pattern on a non-result scrutinee")),
        };
        let pattern = match &arm.pattern {
            ast::Pattern::Wildcard => Pattern::Wildcard,
            ast::Pattern::Bind(b) => {
                Pattern::Bind(self.bind(b.binding, b.name, scrutinee, b.mutable, false))
            }
            ast::Pattern::Int(value) => Pattern::Int(*value),
            ast::Pattern::Bool(value) => Pattern::Bool(*value),
            ast::Pattern::Ok(b) => {
                let ty = payload(true)?;
                Pattern::Ok(b.map(|b| self.bind(b.binding, b.name, ty, b.mutable, false)))
            }
            ast::Pattern::Err(b) => {
                let ty = payload(false)?;
                Pattern::Err(b.map(|b| self.bind(b.binding, b.name, ty, b.mutable, false)))
            }
        };
        Ok(Arm {
            pattern,
            body: self.expr(arm.body)?,
            span: arm.span,
        })
    }

    fn field_index(&self, base: &Expr, field: Symbol, span: SourceSpan) -> Result<u32, LowerError> {
        let ast = self.ast;
        let Type::Data(data) = ast.types[base.ty] else {
            return Err(ice(span, "field access on a non-data value"));
        };
        self.ast
            .types
            .data(data)
            .field(field)
            .map(|(index, _)| index)
            .ok_or_else(|| ice(span, format!("unknown field `{}`", self.name(field))))
    }

    fn bin_op(&self, op: ast::BinaryOp, span: SourceSpan) -> Result<BinOp, LowerError> {
        Ok(match op {
            ast::BinaryOp::Add => BinOp::Add,
            ast::BinaryOp::Sub => BinOp::Sub,
            ast::BinaryOp::Mul => BinOp::Mul,
            ast::BinaryOp::Div => BinOp::Div,
            ast::BinaryOp::Rem => BinOp::Rem,
            ast::BinaryOp::BitAnd => BinOp::BitAnd,
            ast::BinaryOp::BitOr => BinOp::BitOr,
            ast::BinaryOp::BitXor => BinOp::BitXor,
            ast::BinaryOp::Shl => BinOp::Shl,
            ast::BinaryOp::Shr => BinOp::Shr,
            ast::BinaryOp::Eq => BinOp::Eq,
            ast::BinaryOp::Ne => BinOp::Ne,
            ast::BinaryOp::Lt => BinOp::Lt,
            ast::BinaryOp::Le => BinOp::Le,
            ast::BinaryOp::Gt => BinOp::Gt,
            ast::BinaryOp::Ge => BinOp::Ge,
            ast::BinaryOp::And | ast::BinaryOp::Or => {
                return Err(ice(span, "short-circuit operator in compound assignment"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        fixture::*,
        tree::{load, BinaryOpTree as Op, DataTree, ExprKindTree, FieldTree, ItemTree, StmtKindTree, TypeTree},
    };

    fn desugar_first(tree: crate::ast::tree::ModuleTree) -> Result<Option<Body>, LowerError> {
        let ast = load(&tree).unwrap();
        let item = ast.items.keys().next().unwrap();
        desugar(&ast, item)
    }

    fn unit_fn(stmts: Vec<crate::ast::tree::StmtTree>) -> ItemTree {
        function(
            "f",
            vec![param(0, "n", TypeTree::Int)],
            TypeTree::Unit,
            block(stmts, None),
        )
    }

    fn point() -> DataTree {
        DataTree {
            name: "Point".to_string(),
            fields: vec![FieldTree {
                name: "x".to_string(),
                ty: TypeTree::Int,
            }],
        }
    }

    #[test]
    fn extern_functions_have_no_body() {
        let tree = module(vec![extern_fn("puts", vec![], TypeTree::Unit)]);
        assert_eq!(desugar_first(tree).unwrap(), None);
    }

    #[test]
    fn for_becomes_a_counted_loop() {
        let for_loop = stmt(StmtKindTree::For {
            binding: 1,
            name: "i".to_string(),
            start: int(0),
            end: local(0, "n", TypeTree::Int),
            inclusive: true,
            body: block(vec![], None),
        });
        let body = desugar_first(module(vec![unit_fn(vec![for_loop])]))
            .unwrap()
            .unwrap();

        let StmtKind::Expr(Expr {
            kind: ExprKind::Block(inner),
            ..
        }) = &body.block.stmts[0].kind
        else {
            panic!("expected a block statement");
        };
        let [index, bound, looped] = &inner.stmts[..] else {
            panic!("expected three statements");
        };
        let StmtKind::Let { local: index, .. } = index.kind else {
            panic!("expected the counter");
        };
        let StmtKind::Let { local: bound, .. } = bound.kind else {
            panic!("expected the bound");
        };
        assert!(body.local(index).mutable);
        assert!(!body.local(bound).mutable);
        assert_eq!(body.local(bound).name, "i.end");

        let StmtKind::Loop {
            cond: Some(cond),
            step: Some(step),
            ..
        } = &looped.kind
        else {
            panic!("expected a loop with a step");
        };
        assert!(matches!(cond.kind, ExprKind::Binary { op: BinOp::Le, .. }));
        assert!(matches!(
            step.stmts[0].kind,
            StmtKind::Assign { place: Place::Local(local), .. } if local == index
        ));
    }

    #[test]
    fn short_circuit_or_becomes_an_if() {
        let either = binary(
            Op::Or,
            local(0, "a", TypeTree::Bool),
            local(1, "b", TypeTree::Bool),
            TypeTree::Bool,
        );
        let tree = module(vec![function(
            "either",
            vec![param(0, "a", TypeTree::Bool), param(1, "b", TypeTree::Bool)],
            TypeTree::Bool,
            block(vec![], Some(either)),
        )]);
        let body = desugar_first(tree).unwrap().unwrap();

        let tail = body.block.tail.as_deref().unwrap();
        assert_eq!(tail.ty, TypeId::BOOL);
        let ExprKind::If {
            then, otherwise, ..
        } = &tail.kind
        else {
            panic!("expected an if");
        };
        assert!(matches!(
            then.tail.as_deref().map(|e| &e.kind),
            Some(ExprKind::Literal(Literal::Bool(true)))
        ));
        assert!(matches!(
            otherwise.tail.as_deref().map(|e| &e.kind),
            Some(ExprKind::Local(_))
        ));
    }

    #[test]
    fn if_statement_gets_an_empty_else() {
        let stmt = if_stmt(boolean(true), block(vec![], None), None);
        let body = desugar_first(module(vec![unit_fn(vec![stmt])]))
            .unwrap()
            .unwrap();

        let StmtKind::Expr(expr) = &body.block.stmts[0].kind else {
            panic!("expected an expression statement");
        };
        assert_eq!(expr.ty, TypeId::UNIT);
        let ExprKind::If { otherwise, .. } = &expr.kind else {
            panic!("expected an if");
        };
        assert!(otherwise.stmts.is_empty() && otherwise.tail.is_none());
    }

    #[test]
    fn compound_field_assignment_reads_the_base_once() {
        let point_ty = TypeTree::Data("Point".to_string());
        let target = expr(
            ExprKindTree::Field {
                base: Box::new(local(0, "p", point_ty.clone())),
                field: "x".to_string(),
            },
            TypeTree::Int,
        );
        let mut tree = module(vec![function(
            "shift",
            vec![param(0, "p", point_ty)],
            TypeTree::Unit,
            block(vec![assign(target, Some(Op::Add), int(1))], None),
        )]);
        tree.data.push(point());
        let body = desugar_first(tree).unwrap().unwrap();

        let [base, update] = &body.block.stmts[..] else {
            panic!("expected the base and the update");
        };
        let StmtKind::Let { local: temp, .. } = base.kind else {
            panic!("expected the base to be bound");
        };
        assert_eq!(body.local(temp).name, "field.base");

        let StmtKind::Assign {
            place: Place::Field { base, index: 0 },
            value,
        } = &update.kind
        else {
            panic!("expected a field assignment");
        };
        assert_eq!(base.kind, ExprKind::Local(temp));
        let ExprKind::Binary { op: BinOp::Add, lhs, .. } = &value.kind else {
            panic!("expected the compound operator");
        };
        assert!(matches!(
            &lhs.kind,
            ExprKind::Field { base, index: 0 } if base.kind == ExprKind::Local(temp)
        ));
    }

    #[test]
    fn unknown_fields_are_internal_errors() {
        let point_ty = TypeTree::Data("Point".to_string());
        let read = expr(
            ExprKindTree::Field {
                base: Box::new(local(0, "p", point_ty.clone())),
                field: "z".to_string(),
            },
            TypeTree::Int,
        );
        let mut tree = module(vec![function(
            "read",
            vec![param(0, "p", point_ty)],
            TypeTree::Int,
            block(vec![], Some(read)),
        )]);
        tree.data.push(point());

        let Err(LowerError::Internal(error)) = desugar_first(tree) else {
            panic!("expected an internal error");
        };
        assert!(error.message.contains("`z`"));
    }
}
