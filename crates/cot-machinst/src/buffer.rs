//! `MachBuffer`: accumulates emitted machine code bytes plus the labels
//! and relocations within them, resolving branch offsets and relocation
//! addends only once the whole function is laid out (spec.md §4.5.5's
//! "defer fixups to finish()"). Modelled on
//! `cranelift-codegen/src/machinst/buffer.rs`, simplified to the subset
//! Cot's single-pass, no-veneer code layout needs — no island insertion,
//! no branch-shortening relaxation.

use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachLabel(u32);

impl MachLabel {
    pub fn new(n: u32) -> MachLabel {
        MachLabel(n)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelocKind {
    /// A PC-relative call/branch target, resolved once both ends of the
    /// reloc are known (both are `MachLabel`s inside this same buffer).
    PcRelCall,
    /// An absolute address pointing outside this function — a global
    /// value, imported symbol, or jump-table base — left for `cot-objgen`
    /// to turn into a platform relocation record.
    Abs8,
}

#[derive(Clone, Debug)]
pub struct MachReloc {
    pub offset: u32,
    pub kind: RelocKind,
    pub target_label: Option<MachLabel>,
    pub target_symbol: Option<String>,
    pub addend: i64,
}

struct PendingLabelUse {
    /// Byte offset of the 4-byte relative-offset field to patch.
    offset: u32,
    label: MachLabel,
}

#[derive(Default)]
pub struct MachBuffer {
    data: Vec<u8>,
    label_offsets: HashMap<MachLabel, u32>,
    pending_label_uses: Vec<PendingLabelUse>,
    relocs: Vec<MachReloc>,
    next_label: u32,
}

impl MachBuffer {
    pub fn new() -> MachBuffer {
        MachBuffer::default()
    }

    pub fn create_label(&mut self) -> MachLabel {
        let l = MachLabel::new(self.next_label);
        self.next_label += 1;
        l
    }

    pub fn bind_label(&mut self, label: MachLabel) {
        self.label_offsets.insert(label, self.data.len() as u32);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn cur_offset(&self) -> u32 {
        self.data.len() as u32
    }

    /// Reserves a 4-byte PC-relative displacement at the current offset,
    /// to be resolved against `label` once every label is bound.
    pub fn use_label_at_offset(&mut self, label: MachLabel) {
        let offset = self.data.len() as u32;
        self.pending_label_uses.push(PendingLabelUse { offset, label });
        self.data.extend_from_slice(&[0, 0, 0, 0]);
    }

    pub fn add_reloc(&mut self, kind: RelocKind, target_symbol: impl Into<String>, addend: i64) {
        self.relocs.push(MachReloc {
            offset: self.data.len() as u32,
            kind,
            target_label: None,
            target_symbol: Some(target_symbol.into()),
            addend,
        });
    }

    /// Patches every deferred label reference now that all labels are
    /// bound, and returns the finished code plus any relocations that
    /// still point outside this buffer (for `cot-objgen` to translate).
    pub fn finish(mut self) -> (Vec<u8>, Vec<MachReloc>) {
        for pending in &self.pending_label_uses {
            let target = self.label_offsets[&pending.label];
            let rel = target as i64 - pending.offset as i64;
            let rel = rel as i32;
            self.data[pending.offset as usize..pending.offset as usize + 4].copy_from_slice(&rel.to_le_bytes());
        }
        (self.data, self.relocs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_forward_branch_is_patched_once_the_label_is_bound() {
        let mut buf = MachBuffer::new();
        let target = buf.create_label();
        buf.put_bytes(&[0x90]); // 1 nop byte before the branch
        buf.use_label_at_offset(target);
        buf.put_bytes(&[0x90, 0x90]); // 2 more bytes after
        buf.bind_label(target);
        buf.put_bytes(&[0xc3]); // target: ret

        let (code, relocs) = buf.finish();
        assert!(relocs.is_empty());
        let rel = i32::from_le_bytes(code[1..5].try_into().unwrap());
        assert_eq!(rel, 6); // placeholder at offset 1, label bound at offset 7: 7 - 1 = 6
    }
}
