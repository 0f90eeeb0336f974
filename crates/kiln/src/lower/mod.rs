//! CFG construction and instruction selection.
//!
//! A function body is lowered in a single walk over its HIR. Locals that are
//! assigned after their declaration live in stack slots at this stage;
//! [`crate::ssa::construct`] promotes them afterwards. Control flow that can
//! never be reached (code after `return`, `break` or a call returning
//! `Never`) is still lowered, into blocks no edge leads to, and dropped before
//! SSA construction.

pub mod convert;
pub mod ctx;
pub mod env;

mod expr;
mod stmt;
mod try_op;


use self::{ctx::FuncCtx, env::LowerEnv};
use crate::{diag::LowerDiagnostic, diag::LowerDiagnosticKind, hir, LowerError};

use kiln_ssa::{Function, Ty};

/// A function in slot form, with the diagnostics reported while building it.
#[derive(Debug)]
pub struct Lowered {
    pub func: Function,
    pub diagnostics: Vec<LowerDiagnostic>,
}

/// Builds the control-flow graph of `body`.
pub fn lower_body(env: &LowerEnv<'_>, body: &hir::Body) -> Result<Lowered, LowerError> {
    let mut ctx = FuncCtx::new(env, body);
    ctx.scopes.push();
    // Params go first: the slots of mutable params follow them.
    let params: Vec<_> = body
        .params
        .iter()
        .map(|local| match env.ty(body.local(*local).ty) {
            Ty::Void => None,
            ty => Some(ctx.builder.param(ty)),
        })
        .collect();
    for (local, param) in body.params.iter().zip(params) {
        ctx.bind_local(*local, param);
    }

    let tail = ctx.lower_block(&body.block)?;

    ctx.at(body.span, body.node);
    if ctx.builder.is_reachable() {
        let ret = ctx.builder.func().ret;
        match tail {
            _ if ret == Ty::Void => {
                ctx.builder.ret(None);
            }
            Some(value) => {
                ctx.builder.ret(Some(value));
            }
            None => {
                let message = format!(
                    "`{}` can reach its end without producing a `{}`",
                    body.name,
                    env.display(body.ret)
                );
                ctx.report(LowerDiagnosticKind::MissingReturn, body.span, &message);
                ctx.emit_return(None);
            }
        }
    } else {
        ctx.seal_dead_block();
    }
    ctx.scopes.pop();

    let FuncCtx {
        builder,
        diagnostics,
        ..
    } = ctx;
    Ok(Lowered {
        func: builder.finish(),
        diagnostics,
    })
}
