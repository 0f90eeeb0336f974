//! Pruned SSA construction.
//!
//! Stack slots whose address never escapes are promoted to SSA values:
//! phis are placed on the iterated dominance frontier of the blocks that
//! store to the slot, restricted to blocks where the slot is live on entry,
//! then loads and stores are renamed away in a walk over the dominator tree.
//! Blocks that cannot be reached from the entry are deleted first.

use kiln_entity::SecondaryMap;
use kiln_ssa::{dom::DominatorTree, Block, Function, Inst, Ty, Value, ValueData};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SsaStats {
    pub pruned_blocks: usize,
    pub promoted_slots: usize,
    pub phis: usize,
}

/// Rewrites `func` from slot form into pruned SSA form.
pub fn construct(func: &mut Function) -> SsaStats {
    let mut stats = SsaStats::default();
    let Some(entry) = func.entry() else {
        return stats;
    };

    stats.pruned_blocks = prune_unreachable(func);
    let dom = DominatorTree::compute(func);
    let slots = promotable_slots(func);
    stats.promoted_slots = slots.len();

    if !slots.is_empty() {
        let mut promoter = Promoter::new(func, entry, &dom, slots);
        promoter.place_phis();
        promoter.rename();
        stats.phis = promoter.phis.len();
        promoter.rewrite();
    }

    log::debug!(
        "ssa `{}`: pruned {} blocks, promoted {} slots, placed {} phis",
        func.name,
        stats.pruned_blocks,
        stats.promoted_slots,
        stats.phis
    );
    stats
}

// ---------------------------------------------------------------------------
// Unreachable code
// ---------------------------------------------------------------------------

/// Removes blocks not reachable from the entry, together with their edges
/// into reachable blocks. Returns the number of removed blocks.
fn prune_unreachable(func: &mut Function) -> usize {
    let dom = DominatorTree::compute(func);
    let (live, dead): (Vec<Block>, Vec<Block>) = func
        .layout
        .iter()
        .copied()
        .partition(|block| dom.is_reachable(*block));
    if dead.is_empty() {
        return 0;
    }

    for block in &dead {
        for value in std::mem::take(&mut func.blocks[*block].insts) {
            func.values[value].block = None;
        }
        func.blocks[*block].preds.clear();
    }

    for block in &live {
        let preds = std::mem::take(&mut func.blocks[*block].preds);
        let keep: Vec<bool> = preds.iter().map(|pred| dom.is_reachable(*pred)).collect();
        if keep.iter().all(|keep| *keep) {
            func.blocks[*block].preds = preds;
            continue;
        }

        let phis: Vec<Value> = func.phis(*block).collect();
        for phi in phis {
            if let Inst::Phi { args, .. } = &mut func.values[phi].inst {
                let mut index = 0;
                args.retain(|_| {
                    index += 1;
                    keep[index - 1]
                });
            }
        }
        func.blocks[*block].preds = preds
            .into_iter()
            .zip(keep)
            .filter_map(|(pred, keep)| keep.then_some(pred))
            .collect();
    }

    func.layout = live;
    dead.len()
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Slot {
    alloca: Value,
    ty: Ty,
}

/// Unpinned allocas used only as the address operand of loads and stores.
fn promotable_slots(func: &Function) -> Vec<Slot> {
    let mut candidates = Vec::new();
    for value in func.placed_values() {
        if let Inst::Alloca { ty, pinned: false } = func.inst(value) {
            candidates.push(Slot {
                alloca: value,
                ty: *ty,
            });
        }
    }
    if candidates.is_empty() {
        return candidates;
    }

    let mut escaped = FxHashSet::default();
    let mut operands = Vec::new();
    for value in func.placed_values() {
        match func.inst(value) {
            Inst::Load { .. } => {}
            Inst::Store { value: stored, .. } => {
                escaped.insert(*stored);
            }
            inst => {
                operands.clear();
                inst.operands(&mut operands);
                escaped.extend(operands.iter().copied());
            }
        }
    }

    candidates.retain(|slot| !escaped.contains(&slot.alloca));
    candidates
}

// ---------------------------------------------------------------------------
// Promoter
// ---------------------------------------------------------------------------

enum Visit {
    Enter(Block),
    /// Pops what the block pushed onto the definition stacks.
    Exit(usize),
}

struct Promoter<'a> {
    func: &'a mut Function,
    entry: Block,
    dom: &'a DominatorTree,
    slots: Vec<Slot>,
    index: FxHashMap<Value, usize>,
    /// Phi placed for a slot, and which slot it stands for.
    phis: FxHashMap<Value, usize>,
    /// What each promoted load reads.
    replacements: FxHashMap<Value, Value>,
    undefs: Vec<(Ty, Value)>,
}

impl<'a> Promoter<'a> {
    fn new(func: &'a mut Function, entry: Block, dom: &'a DominatorTree, slots: Vec<Slot>) -> Self {
        let index = slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (slot.alloca, index))
            .collect();
        Self {
            func,
            entry,
            dom,
            slots,
            index,
            phis: FxHashMap::default(),
            replacements: FxHashMap::default(),
            undefs: Vec::new(),
        }
    }

    /// The slot a load or store accesses, if it is being promoted.
    fn slot_of(&self, value: Value) -> Option<usize> {
        match self.func.inst(value) {
            Inst::Load { ptr, .. } | Inst::Store { ptr, .. } => self.index.get(ptr).copied(),
            _ => None,
        }
    }

    fn place_phis(&mut self) {
        let count = self.slots.len();
        let mut upward_uses: Vec<Vec<Block>> = vec![Vec::new(); count];
        let mut defs: Vec<Vec<Block>> = vec![Vec::new(); count];
        let mut defines: Vec<FxHashSet<Block>> = vec![FxHashSet::default(); count];

        for block in self.dom.rpo() {
            let mut stored = FxHashSet::default();
            let mut loaded = FxHashSet::default();
            for value in &self.func.blocks[*block].insts {
                let Some(slot) = self.slot_of(*value) else {
                    continue;
                };
                match self.func.inst(*value) {
                    Inst::Load { .. } => {
                        if !stored.contains(&slot) && loaded.insert(slot) {
                            upward_uses[slot].push(*block);
                        }
                    }
                    _ => {
                        if stored.insert(slot) {
                            defs[slot].push(*block);
                            defines[slot].insert(*block);
                        }
                    }
                }
            }
        }

        let frontiers = self.dom.frontiers(self.func);
        for slot in 0..count {
            let live_in = self.live_in(&upward_uses[slot], &defines[slot]);
            let mut has_phi = FxHashSet::default();
            let mut queued: FxHashSet<Block> = defs[slot].iter().copied().collect();
            let mut worklist = defs[slot].clone();

            while let Some(block) = worklist.pop() {
                for frontier in frontiers.get(block) {
                    if !live_in.contains(frontier) || !has_phi.insert(*frontier) {
                        continue;
                    }
                    let phi = self.insert_phi(*frontier, slot);
                    self.phis.insert(phi, slot);
                    if queued.insert(*frontier) {
                        worklist.push(*frontier);
                    }
                }
            }
        }
    }

    /// Blocks on entry to which the slot may still be read before being
    /// written.
    fn live_in(&self, upward_uses: &[Block], defines: &FxHashSet<Block>) -> FxHashSet<Block> {
        let mut live: FxHashSet<Block> = upward_uses.iter().copied().collect();
        let mut worklist = upward_uses.to_vec();
        while let Some(block) = worklist.pop() {
            for pred in &self.func.blocks[block].preds {
                if !defines.contains(pred) && live.insert(*pred) {
                    worklist.push(*pred);
                }
            }
        }
        live
    }

    fn insert_phi(&mut self, block: Block, slot: usize) -> Value {
        let Slot { alloca, ty } = self.slots[slot];
        let arity = self.func.blocks[block].preds.len();
        let (span, node) = {
            let data = &self.func.values[alloca];
            (data.span, data.node)
        };
        let phi = self.func.values.push(ValueData {
            inst: Inst::Phi {
                ty,
                args: vec![alloca; arity],
            },
            block: Some(block),
            span,
            node,
        });
        let at = self.func.phis(block).count();
        self.func.blocks[block].insts.insert(at, phi);
        phi
    }

    fn rename(&mut self) {
        let mut stacks: Vec<Vec<Value>> = vec![Vec::new(); self.slots.len()];
        let mut pushed: Vec<usize> = Vec::new();
        let mut visits = vec![Visit::Enter(self.entry)];

        while let Some(visit) = visits.pop() {
            let block = match visit {
                Visit::Enter(block) => block,
                Visit::Exit(mark) => {
                    for slot in pushed.drain(mark..).rev() {
                        stacks[slot].pop();
                    }
                    continue;
                }
            };
            visits.push(Visit::Exit(pushed.len()));

            let insts = self.func.blocks[block].insts.clone();
            for value in insts {
                if let Some(slot) = self.phis.get(&value).copied() {
                    stacks[slot].push(value);
                    pushed.push(slot);
                    continue;
                }
                let Some(slot) = self.slot_of(value) else {
                    continue;
                };
                let stored = match self.func.inst(value) {
                    Inst::Store { value: stored, .. } => Some(*stored),
                    _ => None,
                };
                match stored {
                    Some(stored) => {
                        let stored = self.replacements.get(&stored).copied().unwrap_or(stored);
                        stacks[slot].push(stored);
                        pushed.push(slot);
                    }
                    None => {
                        let current = self.current(&stacks, slot);
                        self.replacements.insert(value, current);
                    }
                }
            }

            for succ in self.func.successors(block) {
                let positions: Vec<usize> = self.func.blocks[succ]
                    .preds
                    .iter()
                    .enumerate()
                    .filter_map(|(index, pred)| (*pred == block).then_some(index))
                    .collect();
                let phis: Vec<Value> = self.func.phis(succ).collect();
                for phi in phis {
                    let Some(slot) = self.phis.get(&phi).copied() else {
                        continue;
                    };
                    let incoming = self.current(&stacks, slot);
                    if let Inst::Phi { args, .. } = &mut self.func.values[phi].inst {
                        for position in &positions {
                            args[*position] = incoming;
                        }
                    }
                }
            }

            for child in self.dom.children(block).iter().rev() {
                visits.push(Visit::Enter(*child));
            }
        }
    }

    /// The reaching definition of `slot`, `undef` if there is none.
    fn current(&mut self, stacks: &[Vec<Value>], slot: usize) -> Value {
        match stacks[slot].last() {
            Some(value) => *value,
            None => self.undef(self.slots[slot].ty),
        }
    }

    /// A shared `undef` of type `ty`, placed right after the params.
    fn undef(&mut self, ty: Ty) -> Value {
        if let Some((_, value)) = self.undefs.iter().find(|(t, _)| *t == ty) {
            return *value;
        }
        let entry = self.entry;
        let value = self.func.values.push(ValueData {
            inst: Inst::Undef(ty),
            block: Some(entry),
            span: self.func.span,
            node: self.func.node,
        });
        let at = self.func.params.len();
        self.func.blocks[entry].insts.insert(at, value);
        self.undefs.push((ty, value));
        value
    }

    /// Replaces every use of a promoted load and drops the slot accesses.
    fn rewrite(&mut self) {
        let mut removed: SecondaryMap<Value, bool> = SecondaryMap::new();
        for slot in &self.slots {
            removed[slot.alloca] = true;
        }
        let accesses: Vec<Value> = self
            .func
            .placed_values()
            .filter(|value| self.slot_of(*value).is_some())
            .collect();
        for value in accesses {
            removed[value] = true;
        }

        let resolve = |mut value: Value| {
            while let Some(next) = self.replacements.get(&value) {
                value = *next;
            }
            value
        };
        let replacements: FxHashMap<Value, Value> = self
            .replacements
            .keys()
            .map(|load| (*load, resolve(*load)))
            .collect();

        for block in self.func.layout.clone() {
            let insts = std::mem::take(&mut self.func.blocks[block].insts);
            let mut kept = Vec::with_capacity(insts.len());
            for value in insts {
                if *removed.get(value) {
                    self.func.values[value].block = None;
                    continue;
                }
                self.func.values[value]
                    .inst
                    .map_operands(|operand| replacements.get(&operand).copied().unwrap_or(operand));
                kept.push(value);
            }
            self.func.blocks[block].insts = kept;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_sourcemap::SourceSpan;
    use kiln_ssa::{builder::FunctionBuilder, verify::verify_function, BinaryOp, ICmpPred, NodeId, TypeTable};

    fn builder(ret: Ty) -> FunctionBuilder {
        FunctionBuilder::new("f", ret, SourceSpan::default(), NodeId(0))
    }

    fn count(func: &Function, pred: impl Fn(&Inst) -> bool) -> usize {
        func.placed_values().filter(|v| pred(func.inst(*v))).count()
    }

    #[test]
    fn promotes_a_straight_line_slot() {
        let mut b = builder(Ty::I64);
        let x = b.param(Ty::I64);
        let slot = b.alloca(Ty::I64, false);
        b.ins(Inst::store(slot, x));
        let one = b.ins(Inst::IConst(1));
        let read = b.ins(Inst::load(Ty::I64, slot));
        let sum = b.ins(Inst::binary(BinaryOp::Add, Ty::I64, read, one));
        b.ins(Inst::store(slot, sum));
        let result = b.ins(Inst::load(Ty::I64, slot));
        b.ret(Some(result));

        let mut func = b.finish();
        let stats = construct(&mut func);
        assert_eq!(stats.promoted_slots, 1);
        assert_eq!(stats.phis, 0);
        assert_eq!(count(&func, |i| matches!(i, Inst::Load { .. } | Inst::Store { .. })), 0);
        assert_eq!(func.inst(sum), &Inst::binary(BinaryOp::Add, Ty::I64, x, one));

        let entry = func.entry().unwrap();
        let ret = func.terminator(entry).unwrap();
        assert_eq!(func.inst(ret), &Inst::Ret(Some(sum)));
        assert_eq!(verify_function(&func, &TypeTable::new()), Ok(()));
    }

    #[test]
    fn places_a_phi_only_where_the_slot_is_live() {
        // if c { x = 1 } else { x = 2 }; return x
        // plus a second slot `y` that is dead after the branch.
        let mut b = builder(Ty::I64);
        let cond = b.param(Ty::I1);
        let x = b.alloca(Ty::I64, false);
        let y = b.alloca(Ty::I64, false);
        let then_block = b.create_block("if.then");
        let else_block = b.create_block("if.else");
        let merge = b.create_block("if.merge");
        b.cond_br(cond, then_block, else_block);

        b.switch_to_block(then_block);
        let one = b.ins(Inst::IConst(1));
        b.ins(Inst::store(x, one));
        b.ins(Inst::store(y, one));
        b.br(merge);

        b.switch_to_block(else_block);
        let two = b.ins(Inst::IConst(2));
        b.ins(Inst::store(x, two));
        b.ins(Inst::store(y, two));
        b.br(merge);

        b.switch_to_block(merge);
        let read = b.ins(Inst::load(Ty::I64, x));
        b.ret(Some(read));

        let mut func = b.finish();
        let stats = construct(&mut func);
        assert_eq!(stats.promoted_slots, 2);
        assert_eq!(stats.phis, 1);

        let phi = func.phis(merge).next().unwrap();
        assert_eq!(
            func.inst(phi),
            &Inst::Phi {
                ty: Ty::I64,
                args: vec![one, two]
            }
        );
        assert_eq!(func.inst(func.terminator(merge).unwrap()), &Inst::Ret(Some(phi)));
        assert_eq!(verify_function(&func, &TypeTable::new()), Ok(()));
    }

    #[test]
    fn loop_carried_slot_gets_a_header_phi() {
        // i = 0; while i < n { i = i + 1 }; return i
        let mut b = builder(Ty::I64);
        let n = b.param(Ty::I64);
        let i = b.alloca(Ty::I64, false);
        let zero = b.ins(Inst::IConst(0));
        b.ins(Inst::store(i, zero));
        let header = b.create_block("loop.cond");
        let body = b.create_block("loop.body");
        let exit = b.create_block("loop.exit");
        b.br(header);

        b.switch_to_block(header);
        let current = b.ins(Inst::load(Ty::I64, i));
        let cond = b.ins(Inst::icmp(ICmpPred::Slt, current, n));
        b.cond_br(cond, body, exit);

        b.switch_to_block(body);
        let current = b.ins(Inst::load(Ty::I64, i));
        let one = b.ins(Inst::IConst(1));
        let next = b.ins(Inst::binary(BinaryOp::Add, Ty::I64, current, one));
        b.ins(Inst::store(i, next));
        b.br(header);

        b.switch_to_block(exit);
        let result = b.ins(Inst::load(Ty::I64, i));
        b.ret(Some(result));

        let mut func = b.finish();
        let stats = construct(&mut func);
        assert_eq!(stats.phis, 1);
        let phi = func.phis(header).next().unwrap();
        assert_eq!(
            func.inst(phi),
            &Inst::Phi {
                ty: Ty::I64,
                args: vec![zero, next]
            }
        );
        assert_eq!(func.inst(func.terminator(exit).unwrap()), &Inst::Ret(Some(phi)));
        assert_eq!(verify_function(&func, &TypeTable::new()), Ok(()));
    }

    #[test]
    fn pinned_and_escaping_slots_stay_in_memory() {
        let mut b = builder(Ty::Void);
        let pinned = b.alloca(Ty::I64, true);
        let escaping = b.alloca(Ty::I64, false);
        let zero = b.ins(Inst::IConst(0));
        b.ins(Inst::store(pinned, zero));
        b.ins(Inst::call(Ty::Void, "observe", vec![escaping]));
        b.ret(None);

        let mut func = b.finish();
        assert_eq!(construct(&mut func).promoted_slots, 0);
        assert_eq!(count(&func, |i| matches!(i, Inst::Alloca { .. })), 2);
        assert_eq!(verify_function(&func, &TypeTable::new()), Ok(()));
    }

    #[test]
    fn reads_before_any_write_become_undef() {
        let mut b = builder(Ty::I64);
        let slot = b.alloca(Ty::I64, false);
        let read = b.ins(Inst::load(Ty::I64, slot));
        b.ret(Some(read));

        let mut func = b.finish();
        construct(&mut func);
        let entry = func.entry().unwrap();
        let ret = func.terminator(entry).unwrap();
        let Inst::Ret(Some(value)) = func.inst(ret) else {
            panic!("expected a return value");
        };
        assert_eq!(func.inst(*value), &Inst::Undef(Ty::I64));
        assert_eq!(verify_function(&func, &TypeTable::new()), Ok(()));
    }

    #[test]
    fn prunes_unreachable_blocks_and_their_edges() {
        let mut b = builder(Ty::I64);
        let merge = b.create_block("merge");
        let one = b.ins(Inst::IConst(1));
        b.br(merge);

        let dead = b.create_block("dead");
        b.switch_to_block(dead);
        let two = b.ins(Inst::IConst(2));
        b.br(merge);

        b.switch_to_block(merge);
        let phi = b.phi(merge, Ty::I64, vec![one, two]);
        b.ret(Some(phi));

        let mut func = b.finish();
        let stats = construct(&mut func);
        assert_eq!(stats.pruned_blocks, 1);
        assert!(!func.layout.contains(&dead));
        assert_eq!(func.blocks[merge].preds, vec![func.entry().unwrap()]);
        assert_eq!(
            func.inst(phi),
            &Inst::Phi {
                ty: Ty::I64,
                args: vec![one]
            }
        );
        assert_eq!(func.values[two].block, None);
        assert_eq!(verify_function(&func, &TypeTable::new()), Ok(()));
    }
}
