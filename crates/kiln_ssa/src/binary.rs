//! Compact binary serialization of a [`Module`].
//!
//! Layout: the magic `KILNIR\0\0`, a little-endian `u16` version, then the
//! module. Integers are little-endian fixed width, strings are a `u32` byte
//! length followed by UTF-8, sequences are a `u32` count followed by their
//! elements. Optional blocks are written as `index + 1` with `0` for none.
//! Encoding the same module twice yields identical bytes.

use crate::{
    function::{BlockData, Function, SemanticTag, ValueData},
    inst::{BinaryOp, CastOp, FCmpPred, ICmpPred, Inst, UnaryOp},
    module::{Const, GlobalData, Module},
    ty::{AggData, AggKind, Ty, TypeTable},
    AggId, Block, NodeId, Value,
};

use kiln_entity::PrimaryMap;
use kiln_sourcemap::SourceSpan;
use thiserror::Error;

use std::{collections::BTreeMap, sync::Arc};

pub const MAGIC: &[u8; 8] = b"KILNIR\0\0";
pub const VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("not a kiln IR file")]
    BadMagic,
    #[error("unsupported IR version {0}, expected {VERSION}")]
    UnsupportedVersion(u16),
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("invalid {what} tag {tag} at byte {offset}")]
    InvalidTag {
        what: &'static str,
        tag: u8,
        offset: usize,
    },
    #[error("invalid UTF-8 string at byte {0}")]
    InvalidUtf8(usize),
    #[error("invalid span {start}..{end}")]
    InvalidSpan { start: u32, end: u32 },
    #[error("function `{function}` refers to a {what} that does not exist")]
    DanglingReference {
        function: Box<str>,
        what: &'static str,
    },
    #[error("{0} trailing bytes after the module")]
    TrailingBytes(usize),
}

pub fn encode(module: &Module) -> Vec<u8> {
    let mut w = Writer::default();
    w.bytes.extend_from_slice(MAGIC);
    w.u16(VERSION);
    w.module(module);
    w.bytes
}

pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut r = Reader { bytes, pos: 0 };
    if r.take(MAGIC.len())? != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let module = r.module()?;
    match bytes.len() - r.pos {
        0 => Ok(module),
        n => Err(DecodeError::TrailingBytes(n)),
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn len(&mut self, len: usize) {
        self.u32(len as u32);
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn value(&mut self, v: Value) {
        self.u32(v.as_u32());
    }

    fn values(&mut self, values: &[Value]) {
        self.len(values.len());
        values.iter().for_each(|v| self.value(*v));
    }

    fn block(&mut self, b: Block) {
        self.u32(b.as_u32());
    }

    fn span(&mut self, span: SourceSpan) {
        self.u32(span.start());
        self.u32(span.end());
    }

    fn ty(&mut self, ty: Ty) {
        match ty {
            Ty::Void => self.u8(0),
            Ty::I1 => self.u8(1),
            Ty::I64 => self.u8(2),
            Ty::F64 => self.u8(3),
            Ty::Ptr => self.u8(4),
            Ty::Agg(agg) => {
                self.u8(5);
                self.u32(agg.as_u32());
            }
        }
    }

    fn module(&mut self, module: &Module) {
        self.str(&module.name);

        self.len(module.types.len());
        for (_, agg) in module.types.iter() {
            self.str(&agg.name);
            self.u8(match agg.kind {
                AggKind::Data => 0,
                AggKind::Result => 1,
            });
            self.len(agg.fields.len());
            agg.fields.iter().for_each(|ty| self.ty(*ty));
        }

        self.len(module.globals.len());
        for global in module.globals.values() {
            self.str(&global.name);
            self.ty(global.ty);
            match &global.init {
                Const::Zero => self.u8(0),
                Const::Int(v) => {
                    self.u8(1);
                    self.u64(*v as u64);
                }
                Const::Float(bits) => {
                    self.u8(2);
                    self.u64(*bits);
                }
                Const::Bool(v) => {
                    self.u8(3);
                    self.u8(*v as u8);
                }
                Const::Str(s) => {
                    self.u8(4);
                    self.str(s);
                }
            }
        }

        self.len(module.functions.len());
        for func in module.functions.values() {
            self.function(func);
        }
    }

    fn function(&mut self, func: &Function) {
        self.str(&func.name);
        self.ty(func.ret);
        self.span(func.span);
        self.u32(func.node.0);

        self.len(func.values.len());
        for data in func.values.values() {
            self.inst(&data.inst);
            self.u32(data.block.map(|b| b.as_u32() + 1).unwrap_or(0));
            self.span(data.span);
            self.u32(data.node.0);
        }

        self.len(func.blocks.len());
        for data in func.blocks.values() {
            self.str(&data.name);
            self.len(data.preds.len());
            data.preds.iter().for_each(|b| self.block(*b));
            self.values(&data.insts);
        }

        self.values(&func.params);
        self.len(func.layout.len());
        func.layout.iter().for_each(|b| self.block(*b));

        self.len(func.tags.len());
        for (value, tags) in &func.tags {
            self.value(*value);
            self.len(tags.len());
            for tag in tags {
                self.str(&tag.key);
                self.str(&tag.value);
            }
        }
    }

    fn inst(&mut self, inst: &Inst) {
        match inst {
            Inst::IConst(v) => {
                self.u8(0);
                self.u64(*v as u64);
            }
            Inst::FConst(bits) => {
                self.u8(1);
                self.u64(*bits);
            }
            Inst::BConst(v) => {
                self.u8(2);
                self.u8(*v as u8);
            }
            Inst::SConst(s) => {
                self.u8(3);
                self.str(s);
            }
            Inst::Undef(ty) => {
                self.u8(4);
                self.ty(*ty);
            }
            Inst::Param { ty, index } => {
                self.u8(5);
                self.ty(*ty);
                self.u32(*index);
            }
            Inst::Binary { op, ty, lhs, rhs } => {
                self.u8(6);
                self.u8(*op as u8);
                self.ty(*ty);
                self.value(*lhs);
                self.value(*rhs);
            }
            Inst::Unary { op, ty, value } => {
                self.u8(7);
                self.u8(*op as u8);
                self.ty(*ty);
                self.value(*value);
            }
            Inst::ICmp { pred, lhs, rhs } => {
                self.u8(8);
                self.u8(*pred as u8);
                self.value(*lhs);
                self.value(*rhs);
            }
            Inst::FCmp { pred, lhs, rhs } => {
                self.u8(9);
                self.u8(*pred as u8);
                self.value(*lhs);
                self.value(*rhs);
            }
            Inst::Cast { op, to, value } => {
                self.u8(10);
                self.u8(*op as u8);
                self.ty(*to);
                self.value(*value);
            }
            Inst::Alloca { ty, pinned } => {
                self.u8(11);
                self.ty(*ty);
                self.u8(*pinned as u8);
            }
            Inst::Load { ty, ptr } => {
                self.u8(12);
                self.ty(*ty);
                self.value(*ptr);
            }
            Inst::Store { ptr, value } => {
                self.u8(13);
                self.value(*ptr);
                self.value(*value);
            }
            Inst::GetFieldPtr { agg, ptr, index } => {
                self.u8(14);
                self.u32(agg.as_u32());
                self.value(*ptr);
                self.u32(*index);
            }
            Inst::New(agg) => {
                self.u8(15);
                self.u32(agg.as_u32());
            }
            Inst::GlobalAddr(name) => {
                self.u8(16);
                self.str(name);
            }
            Inst::MakeAgg { agg, fields } => {
                self.u8(17);
                self.u32(agg.as_u32());
                self.values(fields);
            }
            Inst::ExtractField { ty, value, index } => {
                self.u8(18);
                self.ty(*ty);
                self.value(*value);
                self.u32(*index);
            }
            Inst::Call { ty, callee, args } => {
                self.u8(19);
                self.ty(*ty);
                self.str(callee);
                self.values(args);
            }
            Inst::Phi { ty, args } => {
                self.u8(20);
                self.ty(*ty);
                self.values(args);
            }
            Inst::Br(target) => {
                self.u8(21);
                self.block(*target);
            }
            Inst::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                self.u8(22);
                self.value(*cond);
                self.block(*then_block);
                self.block(*else_block);
            }
            Inst::Ret(value) => {
                self.u8(23);
                match value {
                    Some(value) => {
                        self.u8(1);
                        self.value(*value);
                    }
                    None => self.u8(0),
                }
            }
            Inst::Unreachable => self.u8(24),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

const BINARY_OPS: [BinaryOp; 15] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::SDiv,
    BinaryOp::SRem,
    BinaryOp::FAdd,
    BinaryOp::FSub,
    BinaryOp::FMul,
    BinaryOp::FDiv,
    BinaryOp::FRem,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::Xor,
    BinaryOp::Shl,
    BinaryOp::AShr,
];
const UNARY_OPS: [UnaryOp; 3] = [UnaryOp::Neg, UnaryOp::FNeg, UnaryOp::Not];
const ICMP_PREDS: [ICmpPred; 6] = [
    ICmpPred::Eq,
    ICmpPred::Ne,
    ICmpPred::Slt,
    ICmpPred::Sle,
    ICmpPred::Sgt,
    ICmpPred::Sge,
];
const FCMP_PREDS: [FCmpPred; 6] = [
    FCmpPred::Oeq,
    FCmpPred::One,
    FCmpPred::Olt,
    FCmpPred::Ole,
    FCmpPred::Ogt,
    FCmpPred::Oge,
];
const CAST_OPS: [CastOp; 3] = [CastOp::Zext, CastOp::SiToFp, CastOp::FpToSi];

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }

    fn bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(DecodeError::InvalidTag {
                what: "bool",
                tag,
                offset,
            }),
        }
    }

    fn len(&mut self) -> Result<usize, DecodeError> {
        self.u32().map(|n| n as usize)
    }

    fn str(&mut self) -> Result<Box<str>, DecodeError> {
        let len = self.len()?;
        let offset = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(Into::into)
            .map_err(|_| DecodeError::InvalidUtf8(offset))
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        self.u32().map(Value::from_u32)
    }

    fn values(&mut self) -> Result<Vec<Value>, DecodeError> {
        let len = self.len()?;
        (0..len).map(|_| self.value()).collect()
    }

    fn block(&mut self) -> Result<Block, DecodeError> {
        self.u32().map(Block::from_u32)
    }

    fn span(&mut self) -> Result<SourceSpan, DecodeError> {
        let start = self.u32()?;
        let end = self.u32()?;
        SourceSpan::new(start..end).ok_or(DecodeError::InvalidSpan { start, end })
    }

    fn tagged<T: Copy>(&mut self, what: &'static str, table: &[T]) -> Result<T, DecodeError> {
        let offset = self.pos;
        let tag = self.u8()?;
        table
            .get(tag as usize)
            .copied()
            .ok_or(DecodeError::InvalidTag { what, tag, offset })
    }

    fn ty(&mut self) -> Result<Ty, DecodeError> {
        let offset = self.pos;
        match self.u8()? {
            0 => Ok(Ty::Void),
            1 => Ok(Ty::I1),
            2 => Ok(Ty::I64),
            3 => Ok(Ty::F64),
            4 => Ok(Ty::Ptr),
            5 => self.u32().map(|agg| Ty::Agg(AggId::from_u32(agg))),
            tag => Err(DecodeError::InvalidTag {
                what: "type",
                tag,
                offset,
            }),
        }
    }

    fn module(&mut self) -> Result<Module, DecodeError> {
        let name = self.str()?;

        let mut types = TypeTable::new();
        for _ in 0..self.len()? {
            let name = self.str()?;
            let kind = self.tagged("aggregate kind", &[AggKind::Data, AggKind::Result])?;
            let len = self.len()?;
            let fields = (0..len).map(|_| self.ty()).collect::<Result<_, _>>()?;
            types.intern(AggData { name, kind, fields });
        }

        let mut globals = PrimaryMap::new();
        for _ in 0..self.len()? {
            let name = self.str()?;
            let ty = self.ty()?;
            let offset = self.pos;
            let init = match self.u8()? {
                0 => Const::Zero,
                1 => Const::Int(self.u64()? as i64),
                2 => Const::Float(self.u64()?),
                3 => Const::Bool(self.bool()?),
                4 => Const::Str(self.str()?),
                tag => {
                    return Err(DecodeError::InvalidTag {
                        what: "constant",
                        tag,
                        offset,
                    })
                }
            };
            globals.push(GlobalData { name, ty, init });
        }

        let mut functions = PrimaryMap::new();
        for _ in 0..self.len()? {
            functions.push(Arc::new(self.function()?));
        }

        Ok(Module {
            name,
            types,
            globals,
            functions,
        })
    }

    fn function(&mut self) -> Result<Function, DecodeError> {
        let name = self.str()?;
        let ret = self.ty()?;
        let span = self.span()?;
        let node = NodeId(self.u32()?);
        let mut func = Function::new(name, ret, span, node);

        for _ in 0..self.len()? {
            let inst = self.inst()?;
            let block = self.u32()?.checked_sub(1).map(Block::from_u32);
            let span = self.span()?;
            let node = NodeId(self.u32()?);
            func.values.push(ValueData {
                inst,
                block,
                span,
                node,
            });
        }

        for _ in 0..self.len()? {
            let mut data = BlockData::new(String::from(self.str()?));
            let len = self.len()?;
            data.preds = (0..len).map(|_| self.block()).collect::<Result<_, _>>()?;
            data.insts = self.values()?;
            func.blocks.push(data);
        }

        func.params = self.values()?;
        let len = self.len()?;
        func.layout = (0..len).map(|_| self.block()).collect::<Result<_, _>>()?;

        let mut tags = BTreeMap::new();
        for _ in 0..self.len()? {
            let value = self.value()?;
            let len = self.len()?;
            let list = (0..len)
                .map(|_| Ok(SemanticTag::new(self.str()?, self.str()?)))
                .collect::<Result<Vec<_>, DecodeError>>()?;
            tags.insert(value, list);
        }
        func.tags = tags;

        check_references(&func)?;
        Ok(func)
    }

    fn inst(&mut self) -> Result<Inst, DecodeError> {
        let offset = self.pos;
        let inst = match self.u8()? {
            0 => Inst::IConst(self.u64()? as i64),
            1 => Inst::FConst(self.u64()?),
            2 => Inst::BConst(self.bool()?),
            3 => Inst::SConst(self.str()?),
            4 => Inst::Undef(self.ty()?),
            5 => Inst::Param {
                ty: self.ty()?,
                index: self.u32()?,
            },
            6 => Inst::Binary {
                op: self.tagged("binary op", &BINARY_OPS)?,
                ty: self.ty()?,
                lhs: self.value()?,
                rhs: self.value()?,
            },
            7 => Inst::Unary {
                op: self.tagged("unary op", &UNARY_OPS)?,
                ty: self.ty()?,
                value: self.value()?,
            },
            8 => Inst::ICmp {
                pred: self.tagged("icmp predicate", &ICMP_PREDS)?,
                lhs: self.value()?,
                rhs: self.value()?,
            },
            9 => Inst::FCmp {
                pred: self.tagged("fcmp predicate", &FCMP_PREDS)?,
                lhs: self.value()?,
                rhs: self.value()?,
            },
            10 => Inst::Cast {
                op: self.tagged("cast op", &CAST_OPS)?,
                to: self.ty()?,
                value: self.value()?,
            },
            11 => Inst::Alloca {
                ty: self.ty()?,
                pinned: self.bool()?,
            },
            12 => Inst::Load {
                ty: self.ty()?,
                ptr: self.value()?,
            },
            13 => Inst::Store {
                ptr: self.value()?,
                value: self.value()?,
            },
            14 => Inst::GetFieldPtr {
                agg: AggId::from_u32(self.u32()?),
                ptr: self.value()?,
                index: self.u32()?,
            },
            15 => Inst::New(AggId::from_u32(self.u32()?)),
            16 => Inst::GlobalAddr(self.str()?),
            17 => Inst::MakeAgg {
                agg: AggId::from_u32(self.u32()?),
                fields: self.values()?,
            },
            18 => Inst::ExtractField {
                ty: self.ty()?,
                value: self.value()?,
                index: self.u32()?,
            },
            19 => Inst::Call {
                ty: self.ty()?,
                callee: self.str()?,
                args: self.values()?,
            },
            20 => Inst::Phi {
                ty: self.ty()?,
                args: self.values()?,
            },
            21 => Inst::Br(self.block()?),
            22 => Inst::CondBr {
                cond: self.value()?,
                then_block: self.block()?,
                else_block: self.block()?,
            },
            23 => Inst::Ret(if self.bool()? {
                Some(self.value()?)
            } else {
                None
            }),
            24 => Inst::Unreachable,
            tag => {
                return Err(DecodeError::InvalidTag {
                    what: "instruction",
                    tag,
                    offset,
                })
            }
        };
        Ok(inst)
    }
}

/// Rejects functions whose indices point outside their own arenas, so that
/// indexing a decoded function can never panic.
fn check_references(func: &Function) -> Result<(), DecodeError> {
    let dangling = |what| DecodeError::DanglingReference {
        function: func.name.clone(),
        what,
    };
    let value_ok = |v: &Value| func.values.is_valid(*v);
    let block_ok = |b: &Block| func.blocks.is_valid(*b);

    let mut operands = Vec::new();
    for data in func.values.values() {
        operands.clear();
        data.inst.operands(&mut operands);
        if !operands.iter().all(value_ok) {
            return Err(dangling("value"));
        }
        if !data.inst.successors().iter().all(block_ok) || !data.block.iter().all(block_ok) {
            return Err(dangling("block"));
        }
    }
    for data in func.blocks.values() {
        if !data.preds.iter().all(block_ok) {
            return Err(dangling("block"));
        }
        if !data.insts.iter().all(value_ok) {
            return Err(dangling("value"));
        }
    }
    if !func.params.iter().all(value_ok) || !func.tags.keys().all(value_ok) {
        return Err(dangling("value"));
    }
    if !func.layout.iter().all(block_ok) {
        return Err(dangling("block"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::FunctionBuilder, verify::verify_module};

    fn sample() -> Module {
        let mut types = TypeTable::new();
        let result = types.intern(AggData::result("Result<i64, i64>", Ty::I64, Ty::I64));
        let mut module = Module::new("sample", types);
        module.globals.push(GlobalData {
            name: "limit".into(),
            ty: Ty::F64,
            init: Const::Float(2.5f64.to_bits()),
        });

        let mut b = FunctionBuilder::new("wrap", Ty::Agg(result), SourceSpan::default(), NodeId(4));
        let x = b.param(Ty::I64);
        let slot = b.alloca(Ty::I64, true);
        b.ins(Inst::store(slot, x));
        let is_err = b.ins(Inst::BConst(false));
        let undef = b.ins(Inst::Undef(Ty::I64));
        let agg = b.ins(Inst::MakeAgg {
            agg: result,
            fields: vec![is_err, x, undef],
        });
        b.ret(Some(agg));
        let mut func = b.finish();
        func.attach_tag(agg, SemanticTag::new("hint", "cold"));

        module.functions.push(Arc::new(func));
        module.functions.push(Arc::new(Function::declaration(
            "puts",
            &[Ty::Ptr],
            Ty::Void,
            SourceSpan::default(),
            NodeId(9),
        )));
        module
    }

    #[test]
    fn decode_restores_the_module() {
        let module = sample();
        let bytes = encode(&module);
        assert_eq!(&bytes[..8], MAGIC);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(verify_module(&decoded), Ok(()));
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn rejects_bad_headers() {
        assert_eq!(decode(b"NOTKILN!\x01\x00"), Err(DecodeError::BadMagic));

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&7u16.to_le_bytes());
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(7)));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = encode(&sample());
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(decode(cut), Err(DecodeError::UnexpectedEof(_))));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }
}
