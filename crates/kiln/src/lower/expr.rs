//! Instruction selection for expressions.

use super::{
    convert::convert,
    ctx::{Binding, FuncCtx},
};
use crate::{
    ast::{Type, TypeId, UnaryOp},
    diag::LowerDiagnosticKind,
    hir::{BinOp, Block as HirBlock, Expr, ExprKind, Literal, Pattern},
    ice, LowerError,
};

use kiln_sourcemap::SourceSpan;
use kiln_ssa::{
    AggData, BinaryOp, Block, FCmpPred, ICmpPred, Inst, Ty, UnaryOp as IrUnaryOp, Value,
};

/// Runtime helpers that implement string operators.
const STR_CONCAT: &str = "rt.str_concat";
const STR_EQ: &str = "rt.str_eq";

/// An arm of an `if` or `match` whose end falls through to the merge point.
#[derive(Debug, Clone, Copy)]
struct PendingArm {
    block: Block,
    value: Option<Value>,
}

impl FuncCtx<'_> {
    /// Lowers `expr` at the cursor. Returns `None` for expressions without a
    /// runtime value: unit, never, or code after control diverged.
    pub fn lower_expr(&mut self, expr: &Expr) -> Result<Option<Value>, LowerError> {
        let value = match &expr.kind {
            ExprKind::Literal(literal) => {
                self.at(expr.span, expr.node);
                match literal {
                    Literal::Int(value) => Some(self.ins(Inst::IConst(*value))),
                    Literal::Float(bits) => Some(self.ins(Inst::FConst(*bits))),
                    Literal::Bool(value) => Some(self.ins(Inst::BConst(*value))),
                    Literal::Str(value) => Some(self.ins(Inst::SConst(value.as_str().into()))),
                    Literal::Unit => None,
                }
            }
            ExprKind::Local(local) => {
                self.at(expr.span, expr.node);
                match self.scopes.lookup(*local) {
                    Some(Binding::Value(value)) => Some(value),
                    Some(Binding::Slot { ptr, ty }) => Some(self.ins(Inst::load(ty, ptr))),
                    Some(Binding::Unit) => None,
                    None => {
                        let message = format!(
                            "`{}` is not bound at this point",
                            self.body.local(*local).name
                        );
                        self.report(LowerDiagnosticKind::UnboundIdentifier, expr.span, &message);
                        self.undef_of(expr.ty)
                    }
                }
            }
            ExprKind::Global(name) => {
                self.at(expr.span, expr.node);
                match self.env.global(name) {
                    Some(ty) => match self.env.ty(ty) {
                        Ty::Void => None,
                        ty => {
                            let addr = self.ins(Inst::GlobalAddr(name.as_str().into()));
                            Some(self.ins(Inst::load(ty, addr)))
                        }
                    },
                    None => {
                        let message = format!("no global named `{}`", name);
                        self.report(LowerDiagnosticKind::UnboundIdentifier, expr.span, &message);
                        self.undef_of(expr.ty)
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_value = self.lower_value(lhs)?;
                let rhs_value = self.lower_value(rhs)?;
                self.at(expr.span, expr.node);
                Some(self.binary(*op, lhs.ty, lhs_value, rhs_value, expr.span)?)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.lower_value(operand)?;
                self.at(expr.span, expr.node);
                let inst = match (self.env.kind(operand.ty), op) {
                    (Type::Int, UnaryOp::Neg) => Inst::unary(IrUnaryOp::Neg, Ty::I64, value),
                    (Type::Float, UnaryOp::Neg) => Inst::unary(IrUnaryOp::FNeg, Ty::F64, value),
                    (Type::Int, UnaryOp::Not) => Inst::unary(IrUnaryOp::Not, Ty::I64, value),
                    (Type::Bool, UnaryOp::Not) => Inst::unary(IrUnaryOp::Not, Ty::I1, value),
                    _ => {
                        return Err(ice(
                            expr.span,
                            format!(
                                "operator {:?} is not defined on `{}`",
                                op,
                                self.env.display(operand.ty)
                            ),
                        ))
                    }
                };
                Some(self.ins(inst))
            }
            ExprKind::Cast(value) => {
                let inner = self.lower_value(value)?;
                self.at(expr.span, expr.node);
                Some(convert(self, inner, value.ty, expr.ty, expr.span)?)
            }
            ExprKind::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                // Unit arguments are erased along with unit params.
                for arg in args {
                    let value = self.lower_expr(arg)?;
                    values.extend(value.or_else(|| self.undef_of(arg.ty)));
                }
                self.at(expr.span, expr.node);
                let ty = self.env.ty(expr.ty);
                let call = self.ins(Inst::call(ty, callee.as_str(), values));
                if expr.ty == TypeId::NEVER {
                    self.builder.unreachable();
                    self.enter_dead_block();
                    None
                } else if ty == Ty::Void {
                    None
                } else {
                    Some(call)
                }
            }
            ExprKind::Field { base, index } => {
                let ptr = self.lower_value(base)?;
                self.at(expr.span, expr.node);
                let agg = self.agg_of(base.ty, expr.span)?;
                match self.env.ty(expr.ty) {
                    Ty::Void => None,
                    ty => {
                        let field = self.ins(Inst::GetFieldPtr {
                            agg,
                            ptr,
                            index: *index,
                        });
                        Some(self.ins(Inst::load(ty, field)))
                    }
                }
            }
            ExprKind::DataInit { fields } => {
                self.at(expr.span, expr.node);
                let agg = self.agg_of(expr.ty, expr.span)?;
                let ptr = self.ins(Inst::New(agg));
                for (index, field) in fields {
                    let Some(value) = self.lower_expr(field)? else {
                        continue;
                    };
                    self.at(expr.span, expr.node);
                    let field = self.ins(Inst::GetFieldPtr {
                        agg,
                        ptr,
                        index: *index,
                    });
                    self.ins(Inst::store(field, value));
                }
                Some(ptr)
            }
            ExprKind::Ok(payload) => Some(self.make_result(expr, payload, false)?),
            ExprKind::Err(payload) => Some(self.make_result(expr, payload, true)?),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => self.lower_if(expr, cond, then, otherwise)?,
            ExprKind::Match { scrutinee, arms } => self.lower_match(expr, scrutinee, arms)?,
            ExprKind::Block(block) => self.lower_block(block)?,
            ExprKind::Try(value) => self.lower_try(expr, value)?,
        };
        Ok(value)
    }

    /// Lowers an expression whose value is needed as an operand.
    pub fn lower_value(&mut self, expr: &Expr) -> Result<Value, LowerError> {
        match self.lower_expr(expr)? {
            Some(value) => Ok(value),
            // Operands of code that is never reached only need a placeholder.
            None if !self.builder.is_reachable() => {
                let ty = self.env.ty(expr.ty);
                Ok(self.undef(ty))
            }
            None => Err(ice(
                expr.span,
                format!(
                    "expression of type `{}` used as a value",
                    self.env.display(expr.ty)
                ),
            )),
        }
    }

    pub fn lower_block(&mut self, block: &HirBlock) -> Result<Option<Value>, LowerError> {
        self.scopes.push();
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        let value = match &block.tail {
            Some(tail) => self.lower_expr(tail)?,
            None => None,
        };
        self.scopes.pop();
        Ok(value)
    }

    fn undef_of(&mut self, ty: TypeId) -> Option<Value> {
        match self.env.ty(ty) {
            Ty::Void => None,
            ty => Some(self.undef(ty)),
        }
    }

    fn agg_of(&self, ty: TypeId, span: SourceSpan) -> Result<kiln_ssa::AggId, LowerError> {
        self.env.agg(ty).ok_or_else(|| {
            ice(
                span,
                format!("`{}` has no aggregate layout", self.env.display(ty)),
            )
        })
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    fn binary(
        &mut self,
        op: BinOp,
        operand: TypeId,
        lhs: Value,
        rhs: Value,
        span: SourceSpan,
    ) -> Result<Value, LowerError> {
        let int = |op| Inst::binary(op, Ty::I64, lhs, rhs);
        let float = |op| Inst::binary(op, Ty::F64, lhs, rhs);
        let bool = |op| Inst::binary(op, Ty::I1, lhs, rhs);
        let icmp = |pred| Inst::icmp(pred, lhs, rhs);
        let fcmp = |pred| Inst::fcmp(pred, lhs, rhs);

        let inst = match (self.env.kind(operand), op) {
            (Type::Int, BinOp::Add) => int(BinaryOp::Add),
            (Type::Int, BinOp::Sub) => int(BinaryOp::Sub),
            (Type::Int, BinOp::Mul) => int(BinaryOp::Mul),
            (Type::Int, BinOp::Div) => int(BinaryOp::SDiv),
            (Type::Int, BinOp::Rem) => int(BinaryOp::SRem),
            (Type::Int, BinOp::BitAnd) => int(BinaryOp::And),
            (Type::Int, BinOp::BitOr) => int(BinaryOp::Or),
            (Type::Int, BinOp::BitXor) => int(BinaryOp::Xor),
            (Type::Int, BinOp::Shl) => int(BinaryOp::Shl),
            (Type::Int, BinOp::Shr) => int(BinaryOp::AShr),
            (Type::Int, BinOp::Eq) => icmp(ICmpPred::Eq),
            (Type::Int, BinOp::Ne) => icmp(ICmpPred::Ne),
            (Type::Int, BinOp::Lt) => icmp(ICmpPred::Slt),
            (Type::Int, BinOp::Le) => icmp(ICmpPred::Sle),
            (Type::Int, BinOp::Gt) => icmp(ICmpPred::Sgt),
            (Type::Int, BinOp::Ge) => icmp(ICmpPred::Sge),

            (Type::Float, BinOp::Add) => float(BinaryOp::FAdd),
            (Type::Float, BinOp::Sub) => float(BinaryOp::FSub),
            (Type::Float, BinOp::Mul) => float(BinaryOp::FMul),
            (Type::Float, BinOp::Div) => float(BinaryOp::FDiv),
            (Type::Float, BinOp::Rem) => float(BinaryOp::FRem),
            (Type::Float, BinOp::Eq) => fcmp(FCmpPred::Oeq),
            (Type::Float, BinOp::Ne) => fcmp(FCmpPred::One),
            (Type::Float, BinOp::Lt) => fcmp(FCmpPred::Olt),
            (Type::Float, BinOp::Le) => fcmp(FCmpPred::Ole),
            (Type::Float, BinOp::Gt) => fcmp(FCmpPred::Ogt),
            (Type::Float, BinOp::Ge) => fcmp(FCmpPred::Oge),

            (Type::Bool, BinOp::Eq) => icmp(ICmpPred::Eq),
            (Type::Bool, BinOp::Ne) => icmp(ICmpPred::Ne),
            (Type::Bool, BinOp::BitAnd) => bool(BinaryOp::And),
            (Type::Bool, BinOp::BitOr) => bool(BinaryOp::Or),
            (Type::Bool, BinOp::BitXor) => bool(BinaryOp::Xor),

            (Type::Str, BinOp::Add) => Inst::call(Ty::Ptr, STR_CONCAT, vec![lhs, rhs]),
            (Type::Str, BinOp::Eq) => Inst::call(Ty::I1, STR_EQ, vec![lhs, rhs]),
            (Type::Str, BinOp::Ne) => {
                let eq = self.ins(Inst::call(Ty::I1, STR_EQ, vec![lhs, rhs]));
                Inst::unary(IrUnaryOp::Not, Ty::I1, eq)
            }

            _ => {
                return Err(ice(
                    span,
                    format!(
                        "operator {:?} is not defined on `{}`",
                        op,
                        self.env.display(operand)
                    ),
                ))
            }
        };
        Ok(self.ins(inst))
    }

    /// Builds `Ok(payload)` or `Err(payload)` as a by-value aggregate.
    fn make_result(
        &mut self,
        expr: &Expr,
        payload: &Expr,
        is_err: bool,
    ) -> Result<Value, LowerError> {
        let value = self.lower_expr(payload)?;
        self.at(expr.span, expr.node);
        let Type::Result { ok, err } = self.env.kind(expr.ty) else {
            return Err(ice(expr.span, "result constructor of a non-result type"));
        };
        let agg = self.agg_of(expr.ty, expr.span)?;

        let (filled, empty) = if is_err { (err, ok) } else { (ok, err) };
        let tag = self.ins(Inst::BConst(is_err));
        let value = value.or_else(|| self.undef_of(filled));
        let other = self.undef_of(empty);

        let (ok_value, err_value) = if is_err { (other, value) } else { (value, other) };
        let fields = std::iter::once(tag).chain(ok_value).chain(err_value).collect();
        Ok(self.ins(Inst::MakeAgg { agg, fields }))
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    fn lower_if(
        &mut self,
        expr: &Expr,
        cond: &Expr,
        then: &HirBlock,
        otherwise: &HirBlock,
    ) -> Result<Option<Value>, LowerError> {
        let cond = self.lower_value(cond)?;
        self.at(expr.span, expr.node);
        let then_block = self.builder.create_block("if.then");
        let else_block = self.builder.create_block("if.else");
        self.builder.cond_br(cond, then_block, else_block);

        let mut arms = Vec::with_capacity(2);
        for (block, body) in [(then_block, then), (else_block, otherwise)] {
            self.builder.switch_to_block(block);
            let value = self.lower_block(body)?;
            self.finish_arm(&mut arms, value);
        }
        Ok(self.merge(expr, arms, "if.merge"))
    }

    fn lower_match(
        &mut self,
        expr: &Expr,
        scrutinee: &Expr,
        arms: &[crate::hir::Arm],
    ) -> Result<Option<Value>, LowerError> {
        let subject = self.lower_expr(scrutinee)?;
        let subject_value = |span| {
            subject.ok_or_else(|| ice(span, "refutable pattern on a value-less scrutinee"))
        };

        let mut pending = Vec::with_capacity(arms.len());
        let mut exhaustive = false;
        for arm in arms {
            self.at(arm.span, arm.body.node);
            self.scopes.push();

            let test = match &arm.pattern {
                Pattern::Wildcard => None,
                Pattern::Bind(local) => {
                    self.bind_local(*local, subject);
                    None
                }
                Pattern::Int(value) => {
                    let subject = subject_value(arm.span)?;
                    let expected = self.ins(Inst::IConst(*value));
                    Some(self.ins(Inst::icmp(ICmpPred::Eq, subject, expected)))
                }
                Pattern::Bool(value) => {
                    let subject = subject_value(arm.span)?;
                    let expected = self.ins(Inst::BConst(*value));
                    Some(self.ins(Inst::icmp(ICmpPred::Eq, subject, expected)))
                }
                Pattern::Ok(_) | Pattern::Err(_) => {
                    let subject = subject_value(arm.span)?;
                    let is_err = self.ins(Inst::ExtractField {
                        ty: Ty::I1,
                        value: subject,
                        index: AggData::RESULT_TAG,
                    });
                    Some(match arm.pattern {
                        Pattern::Ok(_) => self.ins(Inst::unary(IrUnaryOp::Not, Ty::I1, is_err)),
                        _ => is_err,
                    })
                }
            };

            let next = match test {
                None => None,
                Some(test) => {
                    let arm_block = self.builder.create_block("match.arm");
                    let next = self.builder.create_block("match.next");
                    self.builder.cond_br(test, arm_block, next);
                    self.builder.switch_to_block(arm_block);
                    Some(next)
                }
            };

            if let Pattern::Ok(Some(local)) | Pattern::Err(Some(local)) = &arm.pattern {
                let index = match arm.pattern {
                    Pattern::Ok(_) => AggData::RESULT_OK,
                    _ => AggData::RESULT_ERR,
                };
                let ty = self.env.ty(self.body.local(*local).ty);
                let payload = match (ty, subject) {
                    (Ty::Void, _) | (_, None) => None,
                    (ty, Some(subject)) => Some(self.ins(Inst::ExtractField {
                        ty,
                        index,
                        value: subject,
                    })),
                };
                self.bind_local(*local, payload);
            }

            let value = self.lower_expr(&arm.body)?;
            self.scopes.pop();
            self.finish_arm(&mut pending, value);

            match next {
                Some(next) => self.builder.switch_to_block(next),
                None => {
                    exhaustive = true;
                    break;
                }
            }
        }

        if !exhaustive {
            // Every pattern was refutable; the checker proved they cover all
            // values, so the last test never fails.
            self.at(expr.span, expr.node);
            self.builder.unreachable();
        }
        Ok(self.merge(expr, pending, "match.merge"))
    }

    /// Records where an arm ends, or closes it if control cannot get there.
    fn finish_arm(&mut self, arms: &mut Vec<PendingArm>, value: Option<Value>) {
        if self.builder.is_reachable() {
            arms.push(PendingArm {
                block: self.builder.current_block(),
                value,
            });
        } else {
            self.seal_dead_block();
        }
    }

    /// Joins the arms that fall through. No arm means the whole expression
    /// diverges; a single arm continues in place without a merge block.
    fn merge(&mut self, expr: &Expr, arms: Vec<PendingArm>, name: &'static str) -> Option<Value> {
        let ty = self.env.ty(expr.ty);
        match arms.as_slice() {
            [] => {
                self.enter_dead_block();
                None
            }
            [arm] => {
                self.builder.switch_to_block(arm.block);
                arm.value.filter(|_| ty != Ty::Void)
            }
            arms => {
                let merge = self.builder.create_block(name);
                let mut values = Vec::with_capacity(arms.len());
                for arm in arms {
                    self.builder.switch_to_block(arm.block);
                    self.at(expr.span, expr.node);
                    if ty != Ty::Void {
                        let value = match arm.value {
                            Some(value) => value,
                            None => self.undef(ty),
                        };
                        values.push(value);
                    }
                    self.builder.br(merge);
                }
                self.builder.switch_to_block(merge);
                if ty == Ty::Void {
                    None
                } else {
                    Some(self.builder.phi(merge, ty, values))
                }
            }
        }
    }
}
