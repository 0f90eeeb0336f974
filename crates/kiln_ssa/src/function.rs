use crate::{inst::Inst, ty::Ty, Block, NodeId, Value};

use kiln_entity::PrimaryMap;
use kiln_sourcemap::SourceSpan;

use std::{borrow::Cow, collections::BTreeMap};

// ---------------------------------------------------------------------------
// ValueData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub inst: Inst,
    /// Enclosing block, `None` once the instruction has been removed.
    pub block: Option<Block>,
    pub span: SourceSpan,
    /// The syntax node this instruction was lowered from.
    pub node: NodeId,
}

impl ValueData {
    pub fn ty(&self) -> Ty {
        self.inst.ty()
    }
}

// ---------------------------------------------------------------------------
// BlockData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    pub name: Cow<'static, str>,
    /// Predecessors in the order their edges were created. Phi arguments
    /// follow this order.
    pub preds: Vec<Block>,
    pub insts: Vec<Value>,
}

impl BlockData {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            preds: Vec::new(),
            insts: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SemanticTag
// ---------------------------------------------------------------------------

/// Free-form metadata attached to a value after lowering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticTag {
    pub key: Box<str>,
    pub value: Box<str>,
}

impl SemanticTag {
    pub fn new(key: impl Into<Box<str>>, value: impl Into<Box<str>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Box<str>,
    pub params: Vec<Value>,
    pub ret: Ty,
    pub values: PrimaryMap<Value, ValueData>,
    pub blocks: PrimaryMap<Block, BlockData>,
    /// Blocks in emission order. The first one is the entry block. An empty
    /// layout marks a declaration.
    pub layout: Vec<Block>,
    pub span: SourceSpan,
    pub node: NodeId,
    pub tags: BTreeMap<Value, Vec<SemanticTag>>,
}

impl Function {
    pub fn new(name: impl Into<Box<str>>, ret: Ty, span: SourceSpan, node: NodeId) -> Self {
        Self {
            ret,
            span,
            node,
            name: name.into(),
            params: Vec::new(),
            values: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            layout: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// A bodiless function, implemented outside the module.
    pub fn declaration(
        name: impl Into<Box<str>>,
        params: &[Ty],
        ret: Ty,
        span: SourceSpan,
        node: NodeId,
    ) -> Self {
        let mut func = Self::new(name, ret, span, node);
        func.params = params
            .iter()
            .enumerate()
            .map(|(index, ty)| {
                func.values.push(ValueData {
                    inst: Inst::Param {
                        ty: *ty,
                        index: index as u32,
                    },
                    block: None,
                    span,
                    node,
                })
            })
            .collect();
        func
    }

    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn entry(&self) -> Option<Block> {
        self.layout.first().copied()
    }

    #[inline]
    pub fn inst(&self, value: Value) -> &Inst {
        &self.values[value].inst
    }

    #[inline]
    pub fn ty(&self, value: Value) -> Ty {
        self.values[value].inst.ty()
    }

    /// The terminator of `block`, if it has one.
    pub fn terminator(&self, block: Block) -> Option<Value> {
        self.blocks[block]
            .insts
            .last()
            .copied()
            .filter(|v| self.values[*v].inst.is_terminator())
    }

    pub fn successors(&self, block: Block) -> Vec<Block> {
        self.terminator(block)
            .map(|term| self.values[term].inst.successors())
            .unwrap_or_default()
    }

    /// Instructions of `block` that are phis. Phis always come first.
    pub fn phis(&self, block: Block) -> impl Iterator<Item = Value> + '_ {
        self.blocks[block]
            .insts
            .iter()
            .copied()
            .take_while(|v| self.values[*v].inst.is_phi())
    }

    /// Every value still placed in a block, in layout order.
    pub fn placed_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.layout
            .iter()
            .flat_map(|block| self.blocks[*block].insts.iter().copied())
    }

    pub fn attach_tag(&mut self, value: Value, tag: SemanticTag) {
        self.tags.entry(value).or_default().push(tag);
    }

    /// Values lowered from the syntax node `node`, in layout order.
    pub fn values_for_node(&self, node: NodeId) -> Vec<Value> {
        self.placed_values()
            .filter(|v| self.values[*v].node == node)
            .collect()
    }

    pub fn count_phis(&self) -> usize {
        self.placed_values()
            .filter(|v| self.values[*v].inst.is_phi())
            .count()
    }

    pub fn count_returns(&self) -> usize {
        self.placed_values()
            .filter(|v| matches!(self.values[*v].inst, Inst::Ret(_)))
            .count()
    }
}
