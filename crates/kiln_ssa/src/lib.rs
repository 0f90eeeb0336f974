//! The SSA intermediate representation produced by the lowering engine.
//!
//! Every instruction is a [`Value`]; instructions that produce nothing have
//! type [`Ty::Void`]. Blocks, values and aggregate types live in flat arenas
//! and are referred to by index.

pub mod binary;
pub mod builder;
pub mod dom;
pub mod verify;

mod function;
mod inst;
mod module;
mod print;
mod ty;

pub use function::{BlockData, Function, SemanticTag, ValueData};
pub use inst::{BinaryOp, CastOp, FCmpPred, ICmpPred, Inst, UnaryOp};
pub use module::{Const, GlobalData, Module};
pub use ty::{AggData, AggKind, Ty, TypeTable};

use kiln_entity::entity_impl;

/// An SSA value, defined by exactly one instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "%");

/// A basic block within one function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "bb");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(u32);
entity_impl!(FuncId, "fn");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(u32);
entity_impl!(GlobalId, "g");

/// An aggregate type in the module's [`TypeTable`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggId(u32);
entity_impl!(AggId, "agg");

/// Identity of the upstream syntax node an IR entity was produced from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
