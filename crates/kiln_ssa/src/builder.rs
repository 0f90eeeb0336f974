use crate::{
    function::{BlockData, Function, ValueData},
    inst::Inst,
    ty::Ty,
    Block, NodeId, Value,
};

use kiln_entity::SecondaryMap;
use kiln_sourcemap::SourceSpan;

/// Appends instructions to one function under construction.
///
/// The builder keeps a cursor on the current block and records predecessor
/// edges as terminators are emitted. It also tracks which blocks are live,
/// i.e. reachable from the entry block through the edges emitted so far;
/// a block entered only after a `ret` stays dead.
pub struct FunctionBuilder {
    func: Function,
    current: Block,
    live: SecondaryMap<Block, bool>,
    /// Number of params and allocas at the head of the entry block.
    entry_prefix: usize,
    span: SourceSpan,
    node: NodeId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<Box<str>>, ret: Ty, span: SourceSpan, node: NodeId) -> Self {
        let mut func = Function::new(name, ret, span, node);
        let entry = func.blocks.push(BlockData::new("entry"));
        func.layout.push(entry);

        let mut live = SecondaryMap::new();
        live[entry] = true;

        Self {
            func,
            live,
            span,
            node,
            current: entry,
            entry_prefix: 0,
        }
    }

    /// Sets the span and node attached to subsequently created values.
    pub fn set_location(&mut self, span: SourceSpan, node: NodeId) {
        self.span = span;
        self.node = node;
    }

    pub fn location(&self) -> (SourceSpan, NodeId) {
        (self.span, self.node)
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn entry(&self) -> Block {
        self.func.layout[0]
    }

    pub fn current_block(&self) -> Block {
        self.current
    }

    pub fn create_block(&mut self, name: &'static str) -> Block {
        let block = self.func.blocks.push(BlockData::new(name));
        self.func.layout.push(block);
        block
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.current = block;
    }

    pub fn is_live(&self, block: Block) -> bool {
        self.live[block]
    }

    /// Returns `true` if control can reach the cursor.
    pub fn is_reachable(&self) -> bool {
        self.live[self.current]
    }

    pub fn is_terminated(&self) -> bool {
        self.func.terminator(self.current).is_some()
    }

    /// Declares the next parameter.
    pub fn param(&mut self, ty: Ty) -> Value {
        let index = self.func.params.len() as u32;
        let value = self.insert_in_entry(Inst::Param { ty, index });
        self.func.params.push(value);
        value
    }

    /// Creates a stack slot at the head of the entry block.
    pub fn alloca(&mut self, ty: Ty, pinned: bool) -> Value {
        self.insert_in_entry(Inst::Alloca { ty, pinned })
    }

    /// Inserts a phi at the head of `block`, after any existing phis.
    pub fn phi(&mut self, block: Block, ty: Ty, args: Vec<Value>) -> Value {
        let at = self.func.phis(block).count();
        let value = self.make_value(Inst::Phi { ty, args }, block);
        self.func.blocks[block].insts.insert(at, value);
        value
    }

    /// Appends `inst` to the current block.
    pub fn ins(&mut self, inst: Inst) -> Value {
        debug_assert!(!self.is_terminated(), "append to terminated block");

        let block = self.current;
        let successors = inst.successors();
        let value = self.make_value(inst, block);
        self.func.blocks[block].insts.push(value);

        let live = self.live[block];
        for succ in successors {
            self.func.blocks[succ].preds.push(block);
            if live {
                self.live[succ] = true;
            }
        }
        value
    }

    pub fn br(&mut self, target: Block) -> Value {
        self.ins(Inst::Br(target))
    }

    pub fn cond_br(&mut self, cond: Value, then_block: Block, else_block: Block) -> Value {
        self.ins(Inst::CondBr {
            cond,
            then_block,
            else_block,
        })
    }

    pub fn ret(&mut self, value: Option<Value>) -> Value {
        self.ins(Inst::Ret(value))
    }

    pub fn unreachable(&mut self) -> Value {
        self.ins(Inst::Unreachable)
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn insert_in_entry(&mut self, inst: Inst) -> Value {
        let entry = self.entry();
        let value = self.make_value(inst, entry);
        self.func.blocks[entry].insts.insert(self.entry_prefix, value);
        self.entry_prefix += 1;
        value
    }

    fn make_value(&mut self, inst: Inst, block: Block) -> Value {
        self.func.values.push(ValueData {
            inst,
            block: Some(block),
            span: self.span,
            node: self.node,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FunctionBuilder {
        FunctionBuilder::new("f", Ty::I64, SourceSpan::default(), NodeId(0))
    }

    #[test]
    fn params_and_allocas_stay_at_entry_head() {
        let mut b = builder();
        let x = b.param(Ty::I64);
        let one = b.ins(Inst::IConst(1));
        let slot = b.alloca(Ty::I64, false);

        let func = b.finish();
        let entry = func.entry().unwrap();
        assert_eq!(func.blocks[entry].insts, vec![x, slot, one]);
        assert_eq!(func.params, vec![x]);
    }

    #[test]
    fn terminators_record_predecessors_and_liveness() {
        let mut b = builder();
        let cond = b.ins(Inst::BConst(true));
        let then_block = b.create_block("if.then");
        let else_block = b.create_block("if.else");
        b.cond_br(cond, then_block, else_block);

        b.switch_to_block(then_block);
        let zero = b.ins(Inst::IConst(0));
        b.ret(Some(zero));
        assert!(b.is_terminated());

        let dead = b.create_block("dead");
        let orphan = b.create_block("orphan");
        b.switch_to_block(dead);
        assert!(!b.is_reachable());
        b.br(orphan);

        let func = b.finish();
        let entry = func.entry().unwrap();
        assert_eq!(func.blocks[then_block].preds, vec![entry]);
        assert_eq!(func.blocks[else_block].preds, vec![entry]);
        assert_eq!(func.blocks[orphan].preds, vec![dead]);
        assert_eq!(func.successors(entry), vec![then_block, else_block]);
    }

    #[test]
    fn dead_blocks_do_not_make_successors_live() {
        let mut b = builder();
        b.ret(None);
        let dead = b.create_block("dead");
        let next = b.create_block("next");
        b.switch_to_block(dead);
        b.br(next);
        assert!(!b.is_live(next));
        assert!(b.is_live(b.entry()));
    }

    #[test]
    fn phis_are_inserted_before_other_instructions() {
        let mut b = builder();
        let merge = b.create_block("merge");
        b.br(merge);
        b.switch_to_block(merge);
        let one = b.ins(Inst::IConst(1));
        let phi = b.phi(merge, Ty::I64, vec![one]);

        let func = b.finish();
        assert_eq!(func.blocks[merge].insts, vec![phi, one]);
        assert_eq!(func.phis(merge).collect::<Vec<_>>(), vec![phi]);
    }
}
