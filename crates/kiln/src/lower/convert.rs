//! The conversion matrix for explicit casts between primitive types.
//!
//! | from \ to | Int      | Float           | Bool          |
//! |-----------|----------|-----------------|---------------|
//! | Int       | identity | `sitofp`        | `icmp ne 0`   |
//! | Float     | `fptosi` | identity        | `fcmp one 0.0`|
//! | Bool      | `zext`   | `zext`+`sitofp` | identity      |

use super::ctx::FuncCtx;
use crate::{ast::{Type, TypeId}, ice, LowerError};

use kiln_sourcemap::SourceSpan;
use kiln_ssa::{CastOp, FCmpPred, ICmpPred, Inst, Ty, Value};

/// Converts `value` of static type `from` into type `to`.
pub fn convert(
    ctx: &mut FuncCtx,
    value: Value,
    from: TypeId,
    to: TypeId,
    span: SourceSpan,
) -> Result<Value, LowerError> {
    if from == to {
        return Ok(value);
    }
    let value = match (ctx.env.kind(from), ctx.env.kind(to)) {
        (Type::Int, Type::Int) | (Type::Float, Type::Float) | (Type::Bool, Type::Bool) => value,
        (Type::Int, Type::Float) => ctx.ins(Inst::cast(CastOp::SiToFp, Ty::F64, value)),
        (Type::Int, Type::Bool) => {
            let zero = ctx.ins(Inst::IConst(0));
            ctx.ins(Inst::icmp(ICmpPred::Ne, value, zero))
        }
        (Type::Float, Type::Int) => ctx.ins(Inst::cast(CastOp::FpToSi, Ty::I64, value)),
        (Type::Float, Type::Bool) => {
            let zero = ctx.ins(Inst::fconst(0.0));
            ctx.ins(Inst::fcmp(FCmpPred::One, value, zero))
        }
        (Type::Bool, Type::Int) => ctx.ins(Inst::cast(CastOp::Zext, Ty::I64, value)),
        (Type::Bool, Type::Float) => {
            let wide = ctx.ins(Inst::cast(CastOp::Zext, Ty::I64, value));
            ctx.ins(Inst::cast(CastOp::SiToFp, Ty::F64, wide))
        }
        _ => {
            return Err(ice(
                span,
                format!(
                    "no conversion from `{}` to `{}`",
                    ctx.env.display(from),
                    ctx.env.display(to)
                ),
            ))
        }
    };
    Ok(value)
}
