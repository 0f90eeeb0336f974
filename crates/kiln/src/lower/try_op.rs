//! Lowering of the error propagation operator.
//!
//! `e?` becomes an explicit two-way branch on the tag of `e`:
//!
//! ```text
//!     %tag = extractfield i1 %e, 0
//!     condbr %tag, try.propagate, try.continue
//! try.propagate:
//!     %err = extractfield E %e, 2
//!     ret makeagg Result<T, E> [true, undef, %err]
//! try.continue:
//!     %ok = extractfield T %e, 1
//! ```

use super::{convert::convert, ctx::FuncCtx};
use crate::{ast::Type, hir::Expr, ice, LowerError};

use kiln_ssa::{AggData, Inst, Ty, Value};

impl FuncCtx<'_> {
    pub fn lower_try(&mut self, expr: &Expr, operand: &Expr) -> Result<Option<Value>, LowerError> {
        let result = self.lower_value(operand)?;
        self.at(expr.span, expr.node);

        let Type::Result { ok, err } = self.env.kind(operand.ty) else {
            return Err(ice(
                expr.span,
                format!("`?` applied to `{}`", self.env.display(operand.ty)),
            ));
        };
        let ret = self.body.ret;
        let Type::Result {
            ok: ret_ok,
            err: ret_err,
        } = self.env.kind(ret)
        else {
            return Err(ice(
                expr.span,
                format!("`?` in a function returning `{}`", self.env.display(ret)),
            ));
        };
        let ret_agg = self
            .env
            .agg(ret)
            .ok_or_else(|| ice(expr.span, "result type without a layout"))?;

        let tag = self.ins(Inst::ExtractField {
            ty: Ty::I1,
            value: result,
            index: AggData::RESULT_TAG,
        });
        let propagate = self.builder.create_block("try.propagate");
        let resume = self.builder.create_block("try.continue");
        self.builder.cond_br(tag, propagate, resume);

        self.builder.switch_to_block(propagate);
        let err_value = match (self.env.ty(err), self.env.ty(ret_err)) {
            (Ty::Void, Ty::Void) => None,
            (Ty::Void, _) => {
                return Err(ice(
                    expr.span,
                    format!(
                        "cannot propagate `{}` as `{}`",
                        self.env.display(err),
                        self.env.display(ret_err)
                    ),
                ))
            }
            (ty, _) => {
                let value = self.ins(Inst::ExtractField {
                    ty,
                    value: result,
                    index: AggData::RESULT_ERR,
                });
                Some(convert(self, value, err, ret_err, expr.span)?)
            }
        };
        let is_err = self.ins(Inst::BConst(true));
        let no_ok = match self.env.ty(ret_ok) {
            Ty::Void => None,
            ty => Some(self.undef(ty)),
        };
        let residual = self.ins(Inst::MakeAgg {
            agg: ret_agg,
            fields: std::iter::once(is_err).chain(no_ok).chain(err_value).collect(),
        });
        self.builder.ret(Some(residual));

        self.builder.switch_to_block(resume);
        match self.env.ty(ok) {
            Ty::Void => Ok(None),
            ty => Ok(Some(self.ins(Inst::ExtractField {
                ty,
                value: result,
                index: AggData::RESULT_OK,
            }))),
        }
    }
}
