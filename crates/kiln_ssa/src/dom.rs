//! Dominator tree and dominance frontiers.
//!
//! Uses the iterative algorithm from Cooper, Harvey and Kennedy, "A Simple,
//! Fast Dominance Algorithm", over a reverse post-order of the blocks
//! reachable from the entry.

use crate::{function::Function, Block};

use kiln_entity::{EntityRef, SecondaryMap};

const UNDEF: usize = usize::MAX;

pub struct DominatorTree {
    rpo: Vec<Block>,
    /// Position of each block in `rpo`, `UNDEF` if unreachable.
    order: SecondaryMap<Block, usize>,
    idom: SecondaryMap<Block, Option<Block>>,
    children: SecondaryMap<Block, Vec<Block>>,
}

impl DominatorTree {
    pub fn compute(func: &Function) -> Self {
        let rpo = reverse_post_order(func);
        let mut order = SecondaryMap::with_default(UNDEF);
        for (index, block) in rpo.iter().enumerate() {
            order[*block] = index;
        }

        // idoms[i] is the rpo position of the immediate dominator of rpo[i].
        let mut idoms = vec![UNDEF; rpo.len()];
        if !rpo.is_empty() {
            idoms[0] = 0;
        }

        let mut changed = true;
        while changed {
            changed = false;
            for index in 1..rpo.len() {
                let mut new_idom = UNDEF;
                for pred in &func.blocks[rpo[index]].preds {
                    let pred = *order.get(*pred);
                    if pred == UNDEF || idoms[pred] == UNDEF {
                        continue;
                    }
                    new_idom = if new_idom == UNDEF {
                        pred
                    } else {
                        intersect(&idoms, pred, new_idom)
                    };
                }
                if idoms[index] != new_idom {
                    idoms[index] = new_idom;
                    changed = true;
                }
            }
        }

        let mut idom = SecondaryMap::new();
        let mut children: SecondaryMap<Block, Vec<Block>> = SecondaryMap::new();
        for (index, block) in rpo.iter().enumerate().skip(1) {
            let parent = rpo[idoms[index]];
            idom[*block] = Some(parent);
            children[parent].push(*block);
        }

        Self {
            rpo,
            order,
            idom,
            children,
        }
    }

    /// Reachable blocks in reverse post-order. The entry comes first.
    pub fn rpo(&self) -> &[Block] {
        &self.rpo
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        *self.order.get(block) != UNDEF
    }

    /// Immediate dominator. `None` for the entry and unreachable blocks.
    pub fn idom(&self, block: Block) -> Option<Block> {
        *self.idom.get(block)
    }

    /// Blocks immediately dominated by `block`, in reverse post-order.
    pub fn children(&self, block: Block) -> &[Block] {
        self.children.get(block)
    }

    /// Returns `true` if every path from the entry to `b` passes through `a`.
    /// Every block dominates itself.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut runner = Some(b);
        while let Some(block) = runner {
            if block == a {
                return true;
            }
            if self.order[block] < self.order[a] {
                return false;
            }
            runner = self.idom(block);
        }
        false
    }

    /// Computes the dominance frontier of every reachable block.
    pub fn frontiers(&self, func: &Function) -> SecondaryMap<Block, Vec<Block>> {
        let mut frontiers: SecondaryMap<Block, Vec<Block>> = SecondaryMap::new();
        for block in &self.rpo {
            let preds = &func.blocks[*block].preds;
            if preds.len() < 2 {
                continue;
            }
            let Some(idom) = self.idom(*block) else {
                continue;
            };
            for pred in preds {
                let mut runner = *pred;
                while self.is_reachable(runner) && runner != idom {
                    if !frontiers[runner].contains(block) {
                        frontiers[runner].push(*block);
                    }
                    match self.idom(runner) {
                        Some(next) => runner = next,
                        None => break,
                    }
                }
            }
        }
        frontiers
    }
}

fn intersect(idoms: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idoms[a];
        }
        while b > a {
            b = idoms[b];
        }
    }
    a
}

fn reverse_post_order(func: &Function) -> Vec<Block> {
    let Some(entry) = func.entry() else {
        return Vec::new();
    };

    let mut visited = vec![false; func.blocks.len()];
    let mut post = Vec::with_capacity(func.layout.len());
    let mut stack = vec![(entry, func.successors(entry), 0usize)];
    visited[entry.index()] = true;

    while let Some((block, succs, next)) = stack.last_mut() {
        if let Some(succ) = succs.get(*next).copied() {
            *next += 1;
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                let succs = func.successors(succ);
                stack.push((succ, succs, 0));
            }
        } else {
            post.push(*block);
            stack.pop();
        }
    }

    post.reverse();
    post
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::FunctionBuilder, inst::Inst, ty::Ty, NodeId};
    use kiln_sourcemap::SourceSpan;

    /// entry -> (a | b) -> merge, plus an orphan block.
    fn diamond() -> (Function, [Block; 5]) {
        let mut b = FunctionBuilder::new("f", Ty::Void, SourceSpan::default(), NodeId(0));
        let entry = b.entry();
        let left = b.create_block("a");
        let right = b.create_block("b");
        let merge = b.create_block("merge");
        let orphan = b.create_block("orphan");

        let cond = b.ins(Inst::BConst(true));
        b.cond_br(cond, left, right);
        b.switch_to_block(left);
        b.br(merge);
        b.switch_to_block(right);
        b.br(merge);
        b.switch_to_block(merge);
        b.ret(None);
        b.switch_to_block(orphan);
        b.br(merge);

        (b.finish(), [entry, left, right, merge, orphan])
    }

    #[test]
    fn diamond_idoms() {
        let (func, [entry, left, right, merge, orphan]) = diamond();
        let dom = DominatorTree::compute(&func);

        assert_eq!(dom.rpo()[0], entry);
        assert_eq!(dom.rpo().len(), 4);
        assert_eq!(dom.idom(entry), None);
        assert_eq!(dom.idom(left), Some(entry));
        assert_eq!(dom.idom(right), Some(entry));
        assert_eq!(dom.idom(merge), Some(entry));
        assert!(!dom.is_reachable(orphan));

        assert!(dom.dominates(entry, merge));
        assert!(dom.dominates(merge, merge));
        assert!(!dom.dominates(left, merge));
        assert!(!dom.dominates(orphan, merge));
    }

    #[test]
    fn diamond_frontiers() {
        let (func, [entry, left, right, merge, _]) = diamond();
        let dom = DominatorTree::compute(&func);
        let df = dom.frontiers(&func);

        assert_eq!(df[left], vec![merge]);
        assert_eq!(df[right], vec![merge]);
        assert!(df[entry].is_empty());
        assert!(df[merge].is_empty());
    }

    #[test]
    fn loop_header_is_in_its_own_frontier() {
        let mut b = FunctionBuilder::new("f", Ty::Void, SourceSpan::default(), NodeId(0));
        let header = b.create_block("loop.cond");
        let body = b.create_block("loop.body");
        let exit = b.create_block("loop.exit");

        b.br(header);
        b.switch_to_block(header);
        let cond = b.ins(Inst::BConst(false));
        b.cond_br(cond, body, exit);
        b.switch_to_block(body);
        b.br(header);
        b.switch_to_block(exit);
        b.ret(None);

        let func = b.finish();
        let dom = DominatorTree::compute(&func);
        let df = dom.frontiers(&func);

        assert_eq!(dom.idom(body), Some(header));
        assert_eq!(dom.idom(exit), Some(header));
        assert_eq!(df[body], vec![header]);
        assert_eq!(df[header], vec![header]);
        assert_eq!(dom.children(header), &[exit, body]);
    }
}
