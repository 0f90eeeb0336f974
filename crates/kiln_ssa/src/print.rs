use crate::{
    function::Function,
    inst::Inst,
    module::{Const, Module},
    ty::AggKind,
    Block, Value,
};

use std::fmt::{self, Display, Formatter};

struct CommaSep<'a, T>(&'a [T]);

impl<T: Display> Display for CommaSep<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (index, item) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl Display for Const {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Const::Zero => write!(f, "zeroinit"),
            Const::Int(value) => write!(f, "{}", value),
            Const::Float(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            Const::Bool(value) => write!(f, "{}", value),
            Const::Str(value) => write!(f, "{:?}", value),
        }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (agg, data) in self.types.iter() {
            let kind = match data.kind {
                AggKind::Data => "data",
                AggKind::Result => "result",
            };
            writeln!(
                f,
                "type {} = {} {} {{ {} }}",
                agg,
                kind,
                data.name,
                CommaSep(&data.fields)
            )?;
        }
        for global in self.globals.values() {
            writeln!(f, "@{} = global {} {}", global.name, global.ty, global.init)?;
        }
        for func in self.functions.values() {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_declaration() {
            let params: Vec<_> = self.params.iter().map(|p| self.ty(*p)).collect();
            return writeln!(f, "declare {} @{}({})", self.ret, self.name, CommaSep(&params));
        }

        let params: Vec<_> = self
            .params
            .iter()
            .map(|p| format!("{} {}", self.ty(*p), p))
            .collect();
        writeln!(f, "define {} @{}({}) {{", self.ret, self.name, CommaSep(&params))?;

        for block in &self.layout {
            let data = &self.blocks[*block];
            write!(f, "{}:", block)?;
            if data.preds.is_empty() {
                writeln!(f, " ; {}", data.name)?;
            } else {
                writeln!(f, " ; {}, preds: {}", data.name, CommaSep(&data.preds))?;
            }
            for value in &data.insts {
                if matches!(self.inst(*value), Inst::Param { .. }) {
                    continue;
                }
                write!(f, "  ")?;
                self.fmt_value(f, *block, *value)?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl Function {
    fn fmt_value(&self, f: &mut Formatter<'_>, block: Block, value: Value) -> fmt::Result {
        let inst = self.inst(value);
        if inst.ty() != crate::Ty::Void {
            write!(f, "{} = ", value)?;
        }

        match inst {
            Inst::IConst(v) => write!(f, "iconst i64 {}", v)?,
            Inst::FConst(bits) => write!(f, "fconst f64 {:?}", f64::from_bits(*bits))?,
            Inst::BConst(v) => write!(f, "bconst {}", v)?,
            Inst::SConst(s) => write!(f, "sconst {:?}", s)?,
            Inst::Undef(ty) => write!(f, "undef {}", ty)?,
            Inst::Param { ty, index } => write!(f, "param {} {}", ty, index)?,
            Inst::Binary { op, ty, lhs, rhs } => write!(f, "{} {} {}, {}", op, ty, lhs, rhs)?,
            Inst::Unary { op, ty, value } => write!(f, "{} {} {}", op, ty, value)?,
            Inst::ICmp { pred, lhs, rhs } => write!(f, "icmp {} {}, {}", pred, lhs, rhs)?,
            Inst::FCmp { pred, lhs, rhs } => write!(f, "fcmp {} {}, {}", pred, lhs, rhs)?,
            Inst::Cast { op, to, value } => write!(f, "{} {} to {}", op, value, to)?,
            Inst::Alloca { ty, pinned: false } => write!(f, "alloca {}", ty)?,
            Inst::Alloca { ty, pinned: true } => write!(f, "alloca pinned {}", ty)?,
            Inst::Load { ty, ptr } => write!(f, "load {}, {}", ty, ptr)?,
            Inst::Store { ptr, value } => write!(f, "store {}, {}", value, ptr)?,
            Inst::GetFieldPtr { agg, ptr, index } => {
                write!(f, "getfieldptr {}, {}, {}", agg, ptr, index)?
            }
            Inst::New(agg) => write!(f, "new {}", agg)?,
            Inst::GlobalAddr(name) => write!(f, "globaladdr @{}", name)?,
            Inst::MakeAgg { agg, fields } => write!(f, "makeagg {} [{}]", agg, CommaSep(fields))?,
            Inst::ExtractField { ty, value, index } => {
                write!(f, "extractfield {} {}, {}", ty, value, index)?
            }
            Inst::Call { ty, callee, args } => {
                write!(f, "call {} @{}({})", ty, callee, CommaSep(args))?
            }
            Inst::Phi { ty, args } => {
                write!(f, "phi {}", ty)?;
                let preds = &self.blocks[block].preds;
                for (index, arg) in args.iter().enumerate() {
                    let sep = if index == 0 { " " } else { ", " };
                    match preds.get(index) {
                        Some(pred) => write!(f, "{}[{}, {}]", sep, arg, pred)?,
                        None => write!(f, "{}[{}, ?]", sep, arg)?,
                    }
                }
            }
            Inst::Br(target) => write!(f, "br {}", target)?,
            Inst::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(f, "br_cond {}, {}, {}", cond, then_block, else_block)?,
            Inst::Ret(Some(value)) => write!(f, "ret {} {}", self.ty(*value), value)?,
            Inst::Ret(None) => write!(f, "ret void")?,
            Inst::Unreachable => write!(f, "unreachable")?,
        }

        if let Some(tags) = self.tags.get(&value) {
            for tag in tags {
                write!(f, " !{}={:?}", tag.key, tag.value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{builder::FunctionBuilder, BinaryOp, Inst, NodeId, SemanticTag, Ty};
    use kiln_sourcemap::SourceSpan;

    #[test]
    fn prints_straight_line_function() {
        let mut b = FunctionBuilder::new("add", Ty::I64, SourceSpan::default(), NodeId(0));
        let x = b.param(Ty::I64);
        let y = b.param(Ty::I64);
        let sum = b.ins(Inst::binary(BinaryOp::Add, Ty::I64, x, y));
        b.ret(Some(sum));

        let mut func = b.finish();
        func.attach_tag(sum, SemanticTag::new("origin", "user"));

        assert_eq!(
            func.to_string(),
            "define i64 @add(i64 %0, i64 %1) {\n\
             bb0: ; entry\n\
             \x20 %2 = add i64 %0, %1 !origin=\"user\"\n\
             \x20 ret i64 %2\n\
             }\n"
        );
    }

    #[test]
    fn prints_phi_with_incoming_blocks() {
        let mut b = FunctionBuilder::new("pick", Ty::I64, SourceSpan::default(), NodeId(0));
        let cond = b.param(Ty::I1);
        let left = b.create_block("if.then");
        let right = b.create_block("if.else");
        let merge = b.create_block("if.merge");
        b.cond_br(cond, left, right);
        b.switch_to_block(left);
        let one = b.ins(Inst::IConst(1));
        b.br(merge);
        b.switch_to_block(right);
        let two = b.ins(Inst::IConst(2));
        b.br(merge);
        b.switch_to_block(merge);
        let phi = b.phi(merge, Ty::I64, vec![one, two]);
        b.ret(Some(phi));

        let text = b.finish().to_string();
        assert!(text.contains("bb3: ; if.merge, preds: bb1, bb2\n"));
        assert!(text.contains("%6 = phi i64 [%2, bb1], [%4, bb2]\n"));
        assert!(text.contains("br_cond %0, bb1, bb2\n"));
    }
}
