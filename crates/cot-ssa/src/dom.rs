//! Dominator tree, computed with the standard iterative reverse-postorder
//! algorithm (Cooper, Harvey & Kennedy). Cranelift's equivalent lives in
//! `dominator_tree/simple.rs` and recomputes lazily the same way; this port
//! keeps the same "simple" fixed-point approach rather than the fancier
//! semi-NCA variant, since function sizes here are small (property-test
//! seeds cap at 20 blocks, spec.md §8).

use std::collections::HashMap;

use crate::entities::Block;
use crate::function::Function;

pub struct DominatorTree {
    rpo: Vec<Block>,
    idom: HashMap<Block, Block>,
}

impl DominatorTree {
    pub fn compute(func: &Function) -> Self {
        let entry = func.entry.expect("function must have an entry block");
        let rpo = reverse_postorder(func, entry);
        let rpo_index: HashMap<Block, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<Block, Block> = HashMap::new();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<Block> = None;
                for &(pred, _) in func.preds(b) {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(cur) => intersect(&idom, &rpo_index, cur, pred),
                    });
                }
                if let Some(ni) = new_idom {
                    if idom.get(&b) != Some(&ni) {
                        idom.insert(b, ni);
                        changed = true;
                    }
                }
            }
        }

        DominatorTree { rpo, idom }
    }

    pub fn idom(&self, b: Block) -> Option<Block> {
        self.idom.get(&b).copied()
    }

    pub fn reverse_postorder(&self) -> &[Block] {
        &self.rpo
    }

    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&next) if next != cur => cur = next,
                _ => return cur == a,
            }
        }
    }

    /// `true` if `header` dominates `latch` and `latch -> header` is an
    /// edge, i.e. a natural loop with a single back edge (spec.md §4.2
    /// step 6, "Finds natural loops (single back-edge dominators)").
    pub fn is_loop_back_edge(&self, func: &Function, latch: Block, header: Block) -> bool {
        self.dominates(header, latch)
            && func.succs(latch).iter().any(|&(s, _)| s == header)
    }
}

fn intersect(
    idom: &HashMap<Block, Block>,
    rpo_index: &HashMap<Block, usize>,
    mut a: Block,
    mut b: Block,
) -> Block {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

fn reverse_postorder(func: &Function, entry: Block) -> Vec<Block> {
    let mut visited = std::collections::HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, false)];
    while let Some((b, expanded)) = stack.pop() {
        if expanded {
            postorder.push(b);
            continue;
        }
        if !visited.insert(b) {
            continue;
        }
        stack.push((b, true));
        for &(s, _) in func.succs(b) {
            if !visited.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::BlockKind;
    use crate::op::{BlockCall, Op};
    use crate::function::SourcePos;
    use crate::types::TypeIndex;

    #[test]
    fn diamond_cfg_idom_is_entry() {
        let mut f = Function::new("f");
        let entry = f.create_block(BlockKind::If);
        let left = f.create_block(BlockKind::Plain);
        let right = f.create_block(BlockKind::Plain);
        let join = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();
        let c = f.append(entry, Op::BoolConst(true), TypeIndex::BOOL, pos);
        f.append(
            entry,
            Op::Brif {
                cond: c,
                then: BlockCall { block: left, args: vec![] },
                else_: BlockCall { block: right, args: vec![] },
            },
            TypeIndex::VOID,
            pos,
        );
        f.append(left, Op::Jump(BlockCall { block: join, args: vec![] }), TypeIndex::VOID, pos);
        f.append(right, Op::Jump(BlockCall { block: join, args: vec![] }), TypeIndex::VOID, pos);
        f.append(join, Op::Return(vec![]), TypeIndex::VOID, pos);

        let dt = DominatorTree::compute(&f);
        assert_eq!(dt.idom(join), Some(entry));
        assert_eq!(dt.idom(left), Some(entry));
        assert!(dt.dominates(entry, join));
        assert!(!dt.dominates(left, right));
    }
}
