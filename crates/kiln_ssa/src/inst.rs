use crate::{ty::Ty, AggId, Block, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    // Signed division
    SDiv,
    // Signed remainder
    SRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    // Bitwise, also used for i1 logic
    And,
    Or,
    Xor,
    Shl,
    // Arithmetic shift right (sign extension)
    AShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Integer negation.
    Neg,
    /// Float negation.
    FNeg,
    /// Bitwise NOT (logical NOT on `i1`).
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ICmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// Ordered float comparisons: false if either operand is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FCmpPred {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// Zero-extend `i1` to `i64`.
    Zext,
    /// Signed integer to float.
    SiToFp,
    /// Float to signed integer, truncating toward zero.
    FpToSi,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Inst {
    /// 64-bit integer constant.
    IConst(i64),

    /// Float constant, stored as its IEEE-754 bit pattern.
    FConst(u64),

    /// Boolean constant.
    BConst(bool),

    /// Pointer to an immutable string literal.
    SConst(Box<str>),

    /// An unspecified value of the given type.
    Undef(Ty),

    /// Function parameter definition. Only valid at the head of the entry block.
    Param { ty: Ty, index: u32 },

    Binary {
        op: BinaryOp,
        ty: Ty,
        lhs: Value,
        rhs: Value,
    },

    Unary { op: UnaryOp, ty: Ty, value: Value },

    ICmp {
        pred: ICmpPred,
        lhs: Value,
        rhs: Value,
    },

    FCmp {
        pred: FCmpPred,
        lhs: Value,
        rhs: Value,
    },

    Cast { op: CastOp, to: Ty, value: Value },

    /// Stack slot in the entry block. Pinned slots are never promoted to
    /// registers because their address may escape.
    Alloca { ty: Ty, pinned: bool },

    Load { ty: Ty, ptr: Value },

    Store { ptr: Value, value: Value },

    /// Address of field `index` of the data record behind `ptr`.
    GetFieldPtr { agg: AggId, ptr: Value, index: u32 },

    /// Heap-allocates an uninitialized data record.
    New(AggId),

    /// Address of a module global.
    GlobalAddr(Box<str>),

    /// Builds a by-value aggregate from one value per non-void field, in
    /// layout order. Void fields take no operand.
    MakeAgg { agg: AggId, fields: Vec<Value> },

    /// Reads field `index` out of a by-value aggregate.
    ExtractField { ty: Ty, value: Value, index: u32 },

    /// Direct call by symbol name.
    Call {
        ty: Ty,
        callee: Box<str>,
        args: Vec<Value>,
    },

    /// Merge point. `args[i]` flows in from the i-th predecessor of the
    /// enclosing block.
    Phi { ty: Ty, args: Vec<Value> },

    /// Terminator: unconditional branch.
    Br(Block),

    /// Terminator: branch on an `i1`.
    CondBr {
        cond: Value,
        then_block: Block,
        else_block: Block,
    },

    /// Terminator: return from the function.
    Ret(Option<Value>),

    /// Terminator: control never reaches this point.
    Unreachable,
}

impl Inst {
    pub fn fconst(value: f64) -> Self {
        Self::FConst(value.to_bits())
    }

    pub fn binary(op: BinaryOp, ty: Ty, lhs: Value, rhs: Value) -> Self {
        Self::Binary { op, ty, lhs, rhs }
    }

    pub fn unary(op: UnaryOp, ty: Ty, value: Value) -> Self {
        Self::Unary { op, ty, value }
    }

    pub fn icmp(pred: ICmpPred, lhs: Value, rhs: Value) -> Self {
        Self::ICmp { pred, lhs, rhs }
    }

    pub fn fcmp(pred: FCmpPred, lhs: Value, rhs: Value) -> Self {
        Self::FCmp { pred, lhs, rhs }
    }

    pub fn cast(op: CastOp, to: Ty, value: Value) -> Self {
        Self::Cast { op, to, value }
    }

    pub fn load(ty: Ty, ptr: Value) -> Self {
        Self::Load { ty, ptr }
    }

    pub fn store(ptr: Value, value: Value) -> Self {
        Self::Store { ptr, value }
    }

    pub fn call(ty: Ty, callee: impl Into<Box<str>>, args: Vec<Value>) -> Self {
        Self::Call {
            ty,
            callee: callee.into(),
            args,
        }
    }

    pub fn ty(&self) -> Ty {
        match self {
            Inst::Store { .. }
            | Inst::Br(_)
            | Inst::CondBr { .. }
            | Inst::Ret(_)
            | Inst::Unreachable => Ty::Void,

            Inst::IConst(_) => Ty::I64,
            Inst::FConst(_) => Ty::F64,
            Inst::BConst(_) | Inst::ICmp { .. } | Inst::FCmp { .. } => Ty::I1,

            Inst::SConst(_)
            | Inst::Alloca { .. }
            | Inst::GetFieldPtr { .. }
            | Inst::New(_)
            | Inst::GlobalAddr(_) => Ty::Ptr,

            Inst::MakeAgg { agg, .. } => Ty::Agg(*agg),

            Inst::Undef(ty)
            | Inst::Param { ty, .. }
            | Inst::Binary { ty, .. }
            | Inst::Unary { ty, .. }
            | Inst::Cast { to: ty, .. }
            | Inst::Load { ty, .. }
            | Inst::ExtractField { ty, .. }
            | Inst::Call { ty, .. }
            | Inst::Phi { ty, .. } => *ty,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Br(_) | Inst::CondBr { .. } | Inst::Ret(_) | Inst::Unreachable
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Inst::Phi { .. })
    }

    /// Successor blocks, in edge order. Empty for non-terminators.
    pub fn successors(&self) -> Vec<Block> {
        match self {
            Inst::Br(target) => vec![*target],
            Inst::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }

    /// Appends every value operand, in operand order.
    pub fn operands(&self, out: &mut Vec<Value>) {
        match self {
            Inst::IConst(_)
            | Inst::FConst(_)
            | Inst::BConst(_)
            | Inst::SConst(_)
            | Inst::Undef(_)
            | Inst::Param { .. }
            | Inst::Alloca { .. }
            | Inst::New(_)
            | Inst::GlobalAddr(_)
            | Inst::Br(_)
            | Inst::Ret(None)
            | Inst::Unreachable => {}

            Inst::Binary { lhs, rhs, .. }
            | Inst::ICmp { lhs, rhs, .. }
            | Inst::FCmp { lhs, rhs, .. } => out.extend([*lhs, *rhs]),

            Inst::Store { ptr, value } => out.extend([*ptr, *value]),

            Inst::Unary { value, .. }
            | Inst::Cast { value, .. }
            | Inst::Load { ptr: value, .. }
            | Inst::GetFieldPtr { ptr: value, .. }
            | Inst::ExtractField { value, .. }
            | Inst::CondBr { cond: value, .. }
            | Inst::Ret(Some(value)) => out.push(*value),

            Inst::MakeAgg { fields: values, .. }
            | Inst::Call { args: values, .. }
            | Inst::Phi { args: values, .. } => out.extend(values.iter().copied()),
        }
    }

    /// Rewrites every value operand through `f`.
    pub fn map_operands(&mut self, mut f: impl FnMut(Value) -> Value) {
        match self {
            Inst::IConst(_)
            | Inst::FConst(_)
            | Inst::BConst(_)
            | Inst::SConst(_)
            | Inst::Undef(_)
            | Inst::Param { .. }
            | Inst::Alloca { .. }
            | Inst::New(_)
            | Inst::GlobalAddr(_)
            | Inst::Br(_)
            | Inst::Ret(None)
            | Inst::Unreachable => {}

            Inst::Binary { lhs, rhs, .. }
            | Inst::ICmp { lhs, rhs, .. }
            | Inst::FCmp { lhs, rhs, .. }
            | Inst::Store {
                ptr: lhs,
                value: rhs,
            } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }

            Inst::Unary { value, .. }
            | Inst::Cast { value, .. }
            | Inst::Load { ptr: value, .. }
            | Inst::GetFieldPtr { ptr: value, .. }
            | Inst::ExtractField { value, .. }
            | Inst::CondBr { cond: value, .. }
            | Inst::Ret(Some(value)) => *value = f(*value),

            Inst::MakeAgg { fields: values, .. }
            | Inst::Call { args: values, .. }
            | Inst::Phi { args: values, .. } => {
                values.iter_mut().for_each(|value| *value = f(*value))
            }
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::SRem => "srem",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::FRem => "frem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::AShr => "ashr",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "neg"),
            UnaryOp::FNeg => write!(f, "fneg"),
            UnaryOp::Not => write!(f, "not"),
        }
    }
}

impl std::fmt::Display for ICmpPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ICmpPred::Eq => "eq",
            ICmpPred::Ne => "ne",
            ICmpPred::Slt => "slt",
            ICmpPred::Sle => "sle",
            ICmpPred::Sgt => "sgt",
            ICmpPred::Sge => "sge",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for FCmpPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FCmpPred::Oeq => "oeq",
            FCmpPred::One => "one",
            FCmpPred::Olt => "olt",
            FCmpPred::Ole => "ole",
            FCmpPred::Ogt => "ogt",
            FCmpPred::Oge => "oge",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for CastOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CastOp::Zext => write!(f, "zext"),
            CastOp::SiToFp => write!(f, "sitofp"),
            CastOp::FpToSi => write!(f, "fptosi"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operands_follow_operand_order() {
        let mut out = Vec::new();
        Inst::store(Value::from_u32(3), Value::from_u32(1)).operands(&mut out);
        assert_eq!(out, vec![Value::from_u32(3), Value::from_u32(1)]);

        out.clear();
        Inst::Ret(None).operands(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn map_operands_rewrites_every_use() {
        let mut inst = Inst::Phi {
            ty: Ty::I64,
            args: vec![Value::from_u32(1), Value::from_u32(2), Value::from_u32(1)],
        };
        inst.map_operands(|v| if v == Value::from_u32(1) { Value::from_u32(9) } else { v });
        assert_eq!(
            inst,
            Inst::Phi {
                ty: Ty::I64,
                args: vec![Value::from_u32(9), Value::from_u32(2), Value::from_u32(9)],
            }
        );
    }

    #[test]
    fn terminators_report_successors() {
        let inst = Inst::CondBr {
            cond: Value::from_u32(0),
            then_block: Block::from_u32(1),
            else_block: Block::from_u32(2),
        };
        assert!(inst.is_terminator());
        assert_eq!(inst.ty(), Ty::Void);
        assert_eq!(inst.successors(), vec![Block::from_u32(1), Block::from_u32(2)]);
        assert!(Inst::IConst(1).successors().is_empty());
        assert_eq!(Inst::fconst(1.5).ty(), Ty::F64);
    }
}
