//! Structural checks run on every lowered function.
//!
//! A failure here means the producer of the IR is broken, never that the
//! input program is wrong.

use crate::{
    dom::DominatorTree,
    function::Function,
    inst::Inst,
    module::Module,
    ty::{AggData, Ty, TypeTable},
    AggId, Block, Value,
};

use kiln_entity::SecondaryMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("function has no entry block")]
    NoEntry,
    #[error("entry block {0} has predecessors")]
    EntryHasPreds(Block),
    #[error("block {0} is not reachable from the entry block")]
    Unreachable(Block),
    #[error("block {0} does not end with a terminator")]
    MissingTerminator(Block),
    #[error("terminator {value} is not the last instruction of {block}")]
    TerminatorNotLast { block: Block, value: Value },
    #[error("{value} is defined more than once")]
    DuplicateDefinition { value: Value },
    #[error("{value} is placed in {actual} but records {recorded:?}")]
    WrongBlock {
        value: Value,
        actual: Block,
        recorded: Option<Block>,
    },
    #[error("predecessors of {block} are {recorded:?}, edges say {computed:?}")]
    PredMismatch {
        block: Block,
        recorded: Vec<Block>,
        computed: Vec<Block>,
    },
    #[error("phi {value} is not at the head of {block}")]
    PhiNotAtHead { block: Block, value: Value },
    #[error("phi {value} in {block} has {args} arguments for {preds} predecessors")]
    PhiArity {
        block: Block,
        value: Value,
        args: usize,
        preds: usize,
    },
    #[error("param {value} is not at the head of the entry block")]
    MisplacedParam { value: Value },
    #[error("{value} uses {operand}, which is not defined in the function body")]
    UndefinedOperand { value: Value, operand: Value },
    #[error("{value} uses {operand}, whose definition does not dominate the use")]
    NotDominated { value: Value, operand: Value },
    #[error("{value} expects an operand of type {expected}, {operand} has type {found}")]
    TypeMismatch {
        value: Value,
        operand: Value,
        expected: Ty,
        found: Ty,
    },
    #[error("return {value} does not match the declared return type {expected}")]
    ReturnType { value: Value, expected: Ty },
    #[error("{value} uses {operand}, which has no value")]
    VoidOperand { value: Value, operand: Value },
    #[error("{value} refers to {agg}, which is not in the type table")]
    UnknownAgg { value: Value, agg: AggId },
    #[error("{value} builds {agg} from {found} values, its layout has {expected} non-void fields")]
    AggArity {
        value: Value,
        agg: AggId,
        expected: usize,
        found: usize,
    },
    #[error("{value} reads field {index} of {operand}, which has no such field of type {ty}")]
    BadField {
        value: Value,
        operand: Value,
        index: u32,
        ty: Ty,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("in function `{function}`: {error}")]
pub struct ModuleVerifyError {
    pub function: Box<str>,
    #[source]
    pub error: VerifyError,
}

/// Verifies every function with a body against the module's type table.
pub fn verify_module(module: &Module) -> Result<(), ModuleVerifyError> {
    module
        .functions
        .values()
        .filter(|func| !func.is_declaration())
        .try_for_each(|func| {
            verify_function(func, &module.types).map_err(|error| ModuleVerifyError {
                function: func.name.clone(),
                error,
            })
        })
}

/// `types` resolves the aggregates the function builds and reads.
pub fn verify_function(func: &Function, types: &TypeTable) -> Result<(), VerifyError> {
    FunctionVerifier::new(func, types)?.run()
}

struct FunctionVerifier<'a> {
    func: &'a Function,
    types: &'a TypeTable,
    dom: DominatorTree,
    /// Where each placed value actually sits.
    position: SecondaryMap<Value, Option<(Block, usize)>>,
}

impl<'a> FunctionVerifier<'a> {
    fn new(func: &'a Function, types: &'a TypeTable) -> Result<Self, VerifyError> {
        let mut position: SecondaryMap<Value, Option<(Block, usize)>> = SecondaryMap::new();
        for block in &func.layout {
            for (index, value) in func.blocks[*block].insts.iter().enumerate() {
                if position[*value].is_some() {
                    return Err(VerifyError::DuplicateDefinition { value: *value });
                }
                let recorded = func.values[*value].block;
                if recorded != Some(*block) {
                    return Err(VerifyError::WrongBlock {
                        value: *value,
                        actual: *block,
                        recorded,
                    });
                }
                position[*value] = Some((*block, index));
            }
        }
        Ok(Self {
            func,
            types,
            position,
            dom: DominatorTree::compute(func),
        })
    }

    fn run(&self) -> Result<(), VerifyError> {
        let entry = self.func.entry().ok_or(VerifyError::NoEntry)?;
        if !self.func.blocks[entry].preds.is_empty() {
            return Err(VerifyError::EntryHasPreds(entry));
        }

        let mut computed: SecondaryMap<Block, Vec<Block>> = SecondaryMap::new();
        for block in &self.func.layout {
            if !self.dom.is_reachable(*block) {
                return Err(VerifyError::Unreachable(*block));
            }
            self.check_shape(*block, *block == entry)?;
            for succ in self.func.successors(*block) {
                computed[succ].push(*block);
            }
        }

        for block in &self.func.layout {
            let mut recorded = self.func.blocks[*block].preds.clone();
            let mut computed = computed[*block].clone();
            recorded.sort();
            computed.sort();
            if recorded != computed {
                return Err(VerifyError::PredMismatch {
                    block: *block,
                    recorded,
                    computed,
                });
            }
        }

        for block in &self.func.layout {
            for value in &self.func.blocks[*block].insts {
                self.check_operands(*block, *value)?;
                self.check_types(*value)?;
            }
        }
        Ok(())
    }

    /// Phis first, params only at the entry head, exactly one terminator last.
    fn check_shape(&self, block: Block, is_entry: bool) -> Result<(), VerifyError> {
        let data = &self.func.blocks[block];
        let Some(last) = data.insts.last() else {
            return Err(VerifyError::MissingTerminator(block));
        };
        if !self.func.inst(*last).is_terminator() {
            return Err(VerifyError::MissingTerminator(block));
        }

        let mut in_phis = true;
        let mut in_params = is_entry;
        for (index, value) in data.insts.iter().enumerate() {
            let inst = self.func.inst(*value);
            if inst.is_terminator() && index + 1 != data.insts.len() {
                return Err(VerifyError::TerminatorNotLast {
                    block,
                    value: *value,
                });
            }
            match inst {
                Inst::Phi { args, .. } => {
                    if !in_phis {
                        return Err(VerifyError::PhiNotAtHead {
                            block,
                            value: *value,
                        });
                    }
                    if args.len() != data.preds.len() {
                        return Err(VerifyError::PhiArity {
                            block,
                            value: *value,
                            args: args.len(),
                            preds: data.preds.len(),
                        });
                    }
                }
                Inst::Param { .. } => {
                    if !in_params {
                        return Err(VerifyError::MisplacedParam { value: *value });
                    }
                    in_phis = false;
                }
                _ => {
                    in_phis = false;
                    in_params = false;
                }
            }
        }
        Ok(())
    }

    fn check_operands(&self, block: Block, value: Value) -> Result<(), VerifyError> {
        let inst = self.func.inst(value);
        let mut operands = Vec::new();
        inst.operands(&mut operands);

        for (slot, operand) in operands.into_iter().enumerate() {
            let Some((def_block, def_index)) = *self.position.get(operand) else {
                return Err(VerifyError::UndefinedOperand { value, operand });
            };
            if self.func.ty(operand) == Ty::Void {
                return Err(VerifyError::VoidOperand { value, operand });
            }

            let dominated = match inst {
                // A phi operand is used at the end of its incoming edge.
                Inst::Phi { .. } => {
                    let pred = self.func.blocks[block].preds[slot];
                    self.dom.dominates(def_block, pred)
                }
                _ if def_block == block => self.position[value]
                    .map(|(_, use_index)| def_index < use_index)
                    .unwrap_or(false),
                _ => self.dom.dominates(def_block, block),
            };
            if !dominated {
                return Err(VerifyError::NotDominated { value, operand });
            }
        }
        Ok(())
    }

    fn check_types(&self, value: Value) -> Result<(), VerifyError> {
        let expect = |operand: Value, expected: Ty| {
            let found = self.func.ty(operand);
            if found == expected {
                Ok(())
            } else {
                Err(VerifyError::TypeMismatch {
                    value,
                    operand,
                    expected,
                    found,
                })
            }
        };

        match self.func.inst(value) {
            Inst::Phi { ty, args } => args.iter().try_for_each(|arg| expect(*arg, *ty)),
            Inst::Binary { ty, lhs, rhs, .. } => {
                expect(*lhs, *ty)?;
                expect(*rhs, *ty)
            }
            Inst::Unary { ty, value, .. } => expect(*value, *ty),
            Inst::ICmp { lhs, rhs, .. } => expect(*rhs, self.func.ty(*lhs)),
            Inst::FCmp { lhs, rhs, .. } => {
                expect(*lhs, Ty::F64)?;
                expect(*rhs, Ty::F64)
            }
            Inst::Load { ptr, .. } | Inst::GetFieldPtr { ptr, .. } => expect(*ptr, Ty::Ptr),
            Inst::Store { ptr, .. } => expect(*ptr, Ty::Ptr),
            Inst::CondBr { cond, .. } => expect(*cond, Ty::I1),
            Inst::New(agg) | Inst::GetFieldPtr { agg, .. } => self.layout(value, *agg).map(|_| ()),
            Inst::MakeAgg { agg, fields } => {
                let layout = self.layout(value, *agg)?;
                let expected = layout.value_fields().count();
                if fields.len() != expected {
                    return Err(VerifyError::AggArity {
                        value,
                        agg: *agg,
                        expected,
                        found: fields.len(),
                    });
                }
                fields
                    .iter()
                    .zip(layout.value_fields())
                    .try_for_each(|(field, ty)| expect(*field, ty))
            }
            Inst::ExtractField {
                ty,
                value: operand,
                index,
            } => {
                let field = match self.func.ty(*operand) {
                    Ty::Agg(agg) => self.layout(value, agg)?.fields.get(*index as usize).copied(),
                    _ => None,
                };
                match field {
                    Some(field) if field == *ty && field != Ty::Void => Ok(()),
                    _ => Err(VerifyError::BadField {
                        value,
                        operand: *operand,
                        index: *index,
                        ty: *ty,
                    }),
                }
            }
            Inst::Ret(Some(ret)) => {
                if self.func.ty(*ret) == self.func.ret {
                    Ok(())
                } else {
                    Err(VerifyError::ReturnType {
                        value,
                        expected: self.func.ret,
                    })
                }
            }
            Inst::Ret(None) if self.func.ret != Ty::Void => Err(VerifyError::ReturnType {
                value,
                expected: self.func.ret,
            }),
            _ => Ok(()),
        }
    }

    fn layout(&self, value: Value, agg: AggId) -> Result<&'a AggData, VerifyError> {
        self.types
            .get(agg)
            .ok_or(VerifyError::UnknownAgg { value, agg })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::FunctionBuilder, BinaryOp, NodeId};
    use kiln_sourcemap::SourceSpan;

    fn builder(ret: Ty) -> FunctionBuilder {
        FunctionBuilder::new("f", ret, SourceSpan::default(), NodeId(0))
    }

    #[test]
    fn accepts_a_merge_with_phi() {
        let mut b = builder(Ty::I64);
        let cond = b.param(Ty::I1);
        let then_block = b.create_block("if.then");
        let else_block = b.create_block("if.else");
        let merge = b.create_block("if.merge");
        b.cond_br(cond, then_block, else_block);

        b.switch_to_block(then_block);
        let one = b.ins(Inst::IConst(1));
        b.br(merge);
        b.switch_to_block(else_block);
        let two = b.ins(Inst::IConst(2));
        b.br(merge);

        b.switch_to_block(merge);
        let phi = b.phi(merge, Ty::I64, vec![one, two]);
        b.ret(Some(phi));

        assert_eq!(verify_function(&b.finish(), &TypeTable::new()), Ok(()));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut b = builder(Ty::Void);
        b.ins(Inst::IConst(1));
        let func = b.finish();
        let entry = func.entry().unwrap();
        assert_eq!(
            verify_function(&func, &TypeTable::new()),
            Err(VerifyError::MissingTerminator(entry))
        );
    }

    #[test]
    fn rejects_phi_arity_mismatch() {
        let mut b = builder(Ty::I64);
        let merge = b.create_block("merge");
        let one = b.ins(Inst::IConst(1));
        b.br(merge);
        b.switch_to_block(merge);
        let phi = b.phi(merge, Ty::I64, vec![one, one]);
        b.ret(Some(phi));

        assert!(matches!(
            verify_function(&b.finish(), &TypeTable::new()),
            Err(VerifyError::PhiArity { args: 2, preds: 1, .. })
        ));
    }

    #[test]
    fn rejects_use_not_dominated_by_def() {
        let mut b = builder(Ty::I64);
        let cond = b.param(Ty::I1);
        let then_block = b.create_block("if.then");
        let merge = b.create_block("if.merge");
        b.cond_br(cond, then_block, merge);

        b.switch_to_block(then_block);
        let one = b.ins(Inst::IConst(1));
        b.br(merge);

        b.switch_to_block(merge);
        let sum = b.ins(Inst::binary(BinaryOp::Add, Ty::I64, one, one));
        b.ret(Some(sum));

        assert_eq!(
            verify_function(&b.finish(), &TypeTable::new()),
            Err(VerifyError::NotDominated {
                value: sum,
                operand: one
            })
        );
    }

    #[test]
    fn rejects_unreachable_layout_block() {
        let mut b = builder(Ty::Void);
        b.ret(None);
        let dead = b.create_block("dead");
        b.switch_to_block(dead);
        b.unreachable();

        assert_eq!(
            verify_function(&b.finish(), &TypeTable::new()),
            Err(VerifyError::Unreachable(dead))
        );
    }

    #[test]
    fn rejects_wrong_return_type() {
        let mut b = builder(Ty::I64);
        let flag = b.ins(Inst::BConst(true));
        let ret = b.ret(Some(flag));
        assert_eq!(
            verify_function(&b.finish(), &TypeTable::new()),
            Err(VerifyError::ReturnType {
                value: ret,
                expected: Ty::I64
            })
        );
    }

    #[test]
    fn rejects_void_operands() {
        let mut b = builder(Ty::Void);
        let nothing = b.ins(Inst::call(Ty::Void, "produce", vec![]));
        let call = b.ins(Inst::call(Ty::Void, "consume", vec![nothing]));
        b.ret(None);
        assert_eq!(
            verify_function(&b.finish(), &TypeTable::new()),
            Err(VerifyError::VoidOperand {
                value: call,
                operand: nothing
            })
        );
    }

    #[test]
    fn makeagg_takes_only_the_non_void_fields() {
        let mut types = TypeTable::new();
        let agg = types.intern(AggData::result("Result<i64, ()>", Ty::I64, Ty::Void));

        let mut b = builder(Ty::Agg(agg));
        let x = b.param(Ty::I64);
        let tag = b.ins(Inst::BConst(false));
        let built = b.ins(Inst::MakeAgg {
            agg,
            fields: vec![tag, x],
        });
        b.ret(Some(built));
        assert_eq!(verify_function(&b.finish(), &types), Ok(()));

        let mut b = builder(Ty::Agg(agg));
        let tag = b.ins(Inst::BConst(true));
        let built = b.ins(Inst::MakeAgg {
            agg,
            fields: vec![tag],
        });
        b.ret(Some(built));
        assert_eq!(
            verify_function(&b.finish(), &types),
            Err(VerifyError::AggArity {
                value: built,
                agg,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn makeagg_fields_follow_the_layout_types() {
        let mut types = TypeTable::new();
        let agg = types.intern(AggData::result("Result<i64, f64>", Ty::I64, Ty::F64));

        let mut b = builder(Ty::Agg(agg));
        let tag = b.ins(Inst::BConst(false));
        let wrong = b.ins(Inst::BConst(true));
        let undef = b.ins(Inst::Undef(Ty::F64));
        let built = b.ins(Inst::MakeAgg {
            agg,
            fields: vec![tag, wrong, undef],
        });
        b.ret(Some(built));
        assert_eq!(
            verify_function(&b.finish(), &types),
            Err(VerifyError::TypeMismatch {
                value: built,
                operand: wrong,
                expected: Ty::I64,
                found: Ty::I1
            })
        );
    }

    #[test]
    fn rejects_reading_a_void_field() {
        let mut types = TypeTable::new();
        let agg = types.intern(AggData::result("Result<i64, ()>", Ty::I64, Ty::Void));

        let mut b = builder(Ty::Void);
        let result = b.param(Ty::Agg(agg));
        let read = b.ins(Inst::ExtractField {
            ty: Ty::Void,
            value: result,
            index: AggData::RESULT_ERR,
        });
        b.ret(None);
        assert_eq!(
            verify_function(&b.finish(), &types),
            Err(VerifyError::BadField {
                value: read,
                operand: result,
                index: AggData::RESULT_ERR,
                ty: Ty::Void
            })
        );
    }

    #[test]
    fn rejects_aggregates_missing_from_the_table() {
        let mut types = TypeTable::new();
        let agg = types.intern(AggData::data("Point", vec![Ty::I64, Ty::I64]));

        let mut b = builder(Ty::Void);
        let record = b.ins(Inst::New(agg));
        b.ret(None);
        assert_eq!(
            verify_function(&b.finish(), &TypeTable::new()),
            Err(VerifyError::UnknownAgg { value: record, agg })
        );
    }
}
