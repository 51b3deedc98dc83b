//! `preprocess`: walks a [`cot_opt::layout::Region`] tree and the per-block
//! [`GenBlock`]s produced by [`crate::gen::FuncGen`] and flattens them into a
//! single branch-resolved [`WasmInstr`] stream ready for [`crate::assemble`].
//!
//! Every `Region::Loop` is wrapped in the classic double-nesting a relooper
//! needs: an outer `block` whose label is the loop's exit (reached by `br`
//! when an arm of the header's `brif` leaves the loop) around an inner `loop`
//! whose label is the header itself (reached by the back edge). `Region::If`
//! lowers directly to `if ... else ... end`, since both arms structurally
//! fall back out to the same join point. A `Jump` terminator that already
//! targets the block reached by simply falling out of its enclosing region
//! emits nothing — real Wasm control flow, not an explicit `br`.

use std::collections::HashMap;

use cot_opt::layout::Region;
use cot_ssa::Block;

use crate::gen::{GenBlock, GenTerm};
use crate::instr::{BlockType, WasmInstr};

struct Label {
    target: Block,
}

pub fn preprocess(regions: &[Region], blocks: &HashMap<Block, GenBlock>) -> Vec<WasmInstr> {
    let mut out = Vec::new();
    let mut labels: Vec<Label> = Vec::new();
    emit_regions(regions, None, blocks, &mut labels, &mut out);
    out
}

fn first_block(region: &Region) -> Block {
    match region {
        Region::Leaf(b) => *b,
        Region::Block(inner) => inner.first().map(first_block).expect("empty block region"),
        Region::Loop(header, _) => *header,
        Region::If { head, .. } => *head,
    }
}

fn find_depth(labels: &[Label], target: Block) -> Option<u32> {
    labels.iter().rev().position(|l| l.target == target).map(|i| i as u32)
}

fn emit_regions(
    regions: &[Region],
    cont: Option<Block>,
    blocks: &HashMap<Block, GenBlock>,
    labels: &mut Vec<Label>,
    out: &mut Vec<WasmInstr>,
) {
    for (i, region) in regions.iter().enumerate() {
        let local_cont = match regions.get(i + 1) {
            Some(next) => Some(first_block(next)),
            None => cont,
        };
        match region {
            Region::Leaf(b) => emit_leaf(*b, local_cont, blocks, labels, out),
            Region::Block(inner) => {
                // Not currently constructed by `layout::run`, but handled here
                // so a future region shape degrades to a plain inline splice
                // rather than a silent gap.
                emit_regions(inner, local_cont, blocks, labels, out);
            }
            Region::Loop(header, body) => {
                let exit = local_cont.unwrap_or(*header);
                labels.push(Label { target: exit });
                out.push(WasmInstr::Block(BlockType::Empty));
                labels.push(Label { target: *header });
                out.push(WasmInstr::Loop(BlockType::Empty));
                emit_regions(body, local_cont, blocks, labels, out);
                out.push(WasmInstr::End);
                labels.pop();
                out.push(WasmInstr::End);
                labels.pop();
            }
            Region::If { head, then, else_ } => {
                let term = &blocks.get(head).expect("head block must have been generated").term;
                match term {
                    GenTerm::Brif { .. } => {}
                    other => unreachable!("if-region head must end in brif, found {other:?}"),
                }
                out.push(WasmInstr::If(BlockType::Empty));
                emit_regions(then, local_cont, blocks, labels, out);
                out.push(WasmInstr::Else);
                emit_regions(else_, local_cont, blocks, labels, out);
                out.push(WasmInstr::End);
            }
        }
    }
}

fn emit_leaf(
    b: Block,
    local_cont: Option<Block>,
    blocks: &HashMap<Block, GenBlock>,
    labels: &[Label],
    out: &mut Vec<WasmInstr>,
) {
    let gb = blocks.get(&b).expect("every block must have been generated");
    out.extend(gb.instrs.iter().cloned());
    match &gb.term {
        GenTerm::Jump(target) => {
            if Some(*target) == local_cont {
                // Falls straight through to the next emitted region.
            } else if let Some(depth) = find_depth(labels, *target) {
                out.push(WasmInstr::Br(depth));
            } else {
                out.push(WasmInstr::Unreachable);
            }
        }
        GenTerm::Brif { then, else_ } => {
            // Only reached for a loop header's own exit test; an `if`-region
            // head is matched and handled by `emit_regions` instead, which
            // never calls back into this arm for that block.
            if Some(*then) == local_cont {
                if let Some(depth) = find_depth(labels, *else_) {
                    out.push(WasmInstr::I32Eqz);
                    out.push(WasmInstr::BrIf(depth));
                }
            } else if Some(*else_) == local_cont {
                if let Some(depth) = find_depth(labels, *then) {
                    out.push(WasmInstr::BrIf(depth));
                }
            } else {
                if let Some(depth) = find_depth(labels, *then) {
                    out.push(WasmInstr::BrIf(depth));
                }
                if let Some(depth) = find_depth(labels, *else_) {
                    out.push(WasmInstr::Br(depth));
                }
            }
        }
        GenTerm::Switch { cases, default } => {
            let targets: Vec<u32> = cases
                .iter()
                .map(|(_, blk)| find_depth(labels, *blk).unwrap_or_else(|| panic!("unresolved switch arm")))
                .collect();
            let default_depth = find_depth(labels, *default).unwrap_or_else(|| panic!("unresolved switch default"));
            out.push(WasmInstr::BrTable { targets, default: default_depth });
        }
        GenTerm::Return => out.push(WasmInstr::Return),
        GenTerm::Unreachable => out.push(WasmInstr::Unreachable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::FuncGen;
    use cot_ssa::{BlockCall, BlockKind, Function, Op, SourcePos, TypeIndex};

    fn link() -> crate::gen::LinkContext {
        crate::gen::LinkContext::default()
    }

    #[test]
    fn straight_line_jump_falls_through_without_a_branch() {
        let mut f = Function::new("f");
        let entry = f.create_block(BlockKind::Plain);
        let exit = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();
        f.append(entry, Op::Jump(BlockCall { block: exit, args: vec![] }), TypeIndex::VOID, pos);
        f.append(exit, Op::Return(vec![]), TypeIndex::VOID, pos);

        let link = link();
        let mut gen = FuncGen::new(&f, &link);
        let blocks = gen.gen_function();
        let regions = cot_opt::layout::run(&f);
        let instrs = preprocess(&regions, &blocks);
        assert!(!instrs.iter().any(|i| matches!(i, WasmInstr::Br(_))));
        assert!(matches!(instrs.last(), Some(WasmInstr::Return)));
    }

    #[test]
    fn diamond_lowers_to_if_else_end() {
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

        let link = link();
        let mut gen = FuncGen::new(&f, &link);
        let blocks = gen.gen_function();
        let regions = cot_opt::layout::run(&f);
        let instrs = preprocess(&regions, &blocks);
        assert!(instrs.iter().any(|i| matches!(i, WasmInstr::If(_))));
        assert!(instrs.iter().any(|i| matches!(i, WasmInstr::Else)));
    }
}
