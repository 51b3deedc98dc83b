//! The Wasm ARC runtime (spec.md §4.4.3): `cot_alloc`, `cot_dealloc`,
//! `cot_retain`, `cot_release`, `cot_string_concat`, `cot_string_eq`,
//! hand-written directly as [`WasmInstr`] sequences and compiled into every
//! module [`crate::link`] produces.
//!
//! Object header layout, 16 bytes, immediately before the pointer every Cot
//! value of heap type actually carries:
//!
//! ```text
//! ptr-16: metadata_ptr : i64
//! ptr-8:  ref_count     : i64
//! ptr:    <payload>
//! ```
//!
//! `FullMetadata.destructor_table_index` lives at a fixed offset inside the
//! metadata record (see [`cot_arc::FullMetadata`]); `cot_release` reads it
//! through `metadata_ptr` rather than caching it in the header, so a type's
//! destructor can be looked up generically without per-type codegen.

use crate::instr::{MemArg, ValType, WasmInstr};
use crate::link::FuncDef;

const HEAP_PTR_GLOBAL: u32 = 0;

/// Byte offset of `destructor_table_index` inside a `FullMetadata` record:
/// `type_id: u32, size: u32, destructor_table_index: u32` (spec.md §3.4).
const DESTRUCTOR_TABLE_INDEX_OFFSET: i32 = 8;

fn local(i: u32) -> WasmInstr {
    WasmInstr::LocalGet(i)
}

fn memarg(offset: i32) -> MemArg {
    MemArg { align: 0, offset: offset as u32 }
}

/// `cot_alloc(size: i32) -> i32`: bump-allocates `size + 16` bytes against
/// `heap_ptr`, writes a zeroed/ref_count=1 header, and returns the payload
/// pointer (header base + 16).
fn cot_alloc() -> FuncDef {
    use WasmInstr::*;
    let body = vec![
        // local 1 = base = heap_ptr
        GlobalGet(HEAP_PTR_GLOBAL),
        LocalSet(1),
        // heap_ptr += size + 16
        GlobalGet(HEAP_PTR_GLOBAL),
        local(0),
        I32Add,
        I32Const(16),
        I32Add,
        GlobalSet(HEAP_PTR_GLOBAL),
        // *(base) = 0  (metadata_ptr, i64)
        local(1),
        I64Const(0),
        I64Store(memarg(0)),
        // *(base+8) = 1  (ref_count, i64)
        local(1),
        I64Const(1),
        I64Store(memarg(8)),
        // return base + 16
        local(1),
        I32Const(16),
        I32Add,
    ];
    FuncDef {
        name: "cot_alloc".into(),
        params: vec![ValType::I32],
        result: Some(ValType::I32),
        locals: vec![ValType::I32],
        body,
        exported: false,
    }
}

/// `cot_dealloc(ptr: i32)`: no-op free-list management for v1 — fragmentation
/// is accepted, memory is reclaimed only when the module instance is torn
/// down (spec.md §4.4.3 "simple policy").
fn cot_dealloc() -> FuncDef {
    FuncDef {
        name: "cot_dealloc".into(),
        params: vec![ValType::I32],
        result: None,
        locals: vec![],
        body: vec![],
        exported: false,
    }
}

/// `cot_retain(ptr: i32)`: null-check, then increment the header's refcount.
fn cot_retain() -> FuncDef {
    use WasmInstr::*;
    let body = vec![
        local(0),
        I32Eqz,
        If(crate::instr::BlockType::Empty),
        Return,
        End,
        // *(ptr-8) += 1
        local(0),
        local(0),
        I64Load(memarg(-8)),
        I64Const(1),
        I64Add,
        I64Store(memarg(-8)),
    ];
    FuncDef {
        name: "cot_retain".into(),
        params: vec![ValType::I32],
        result: None,
        locals: vec![],
        body,
        exported: false,
    }
}

/// `cot_release(ptr: i32)`: null-check, decrement the refcount; at zero,
/// dispatch through the destructor table (if any) then free.
fn cot_release(destructor_call_func_index: u32) -> FuncDef {
    use WasmInstr::*;
    let body = vec![
        local(0),
        I32Eqz,
        If(crate::instr::BlockType::Empty),
        Return,
        End,
        // local 1 = new ref_count = *(ptr-8) - 1
        local(0),
        I64Load(memarg(-8)),
        I64Const(1),
        I64Sub,
        LocalTee(1),
        // *(ptr-8) = local 1
        local(0),
        LocalGet(1),
        I64Store(memarg(-8)),
        // if new ref_count != 0, done
        LocalGet(1),
        I64Const(0),
        I64Ne,
        If(crate::instr::BlockType::Empty),
        Return,
        End,
        // local 2 = metadata_ptr = *(ptr-16)  (truncated to i32 — module
        // addresses fit in 32 bits on the wasm32 target)
        local(0),
        I64Load(memarg(-16)),
        I32WrapI64,
        LocalTee(2),
        // if metadata_ptr == 0, skip straight to dealloc (no destructor registered)
        I32Eqz,
        If(crate::instr::BlockType::Empty),
        local(0),
        Call(destructor_call_func_index),
        Return,
        End,
        // local 3 = destructor_table_index = *(metadata_ptr + 8) : i32
        LocalGet(2),
        I32Load(memarg(DESTRUCTOR_TABLE_INDEX_OFFSET)),
        LocalTee(3),
        If(crate::instr::BlockType::Empty),
        // args first, call target (table index) last — matches the stack
        // convention `gen::emit_op`'s `Op::CallIndirect` case uses.
        local(0),
        LocalGet(3),
        CallIndirect { type_index: 0, table_index: 0 },
        End,
        local(0),
        Call(destructor_call_func_index),
    ];
    FuncDef {
        name: "cot_release".into(),
        params: vec![ValType::I32],
        result: None,
        locals: vec![ValType::I64, ValType::I32, ValType::I32],
        body,
        exported: false,
    }
}

/// `cot_string_concat(ptr1,len1,ptr2,len2: i32) -> i32`: allocates
/// `len1+len2` bytes and copies both halves in.
fn cot_string_concat(alloc_func_index: u32) -> FuncDef {
    use WasmInstr::*;
    let body = vec![
        // local 4 = result = cot_alloc(len1+len2)
        local(1),
        local(3),
        I32Add,
        Call(alloc_func_index),
        LocalTee(4),
        // memory.copy(result, ptr1, len1)
        local(0),
        local(1),
        MemoryCopy,
        // memory.copy(result+len1, ptr2, len2)
        LocalGet(4),
        local(1),
        I32Add,
        local(2),
        local(3),
        MemoryCopy,
        LocalGet(4),
    ];
    FuncDef {
        name: "cot_string_concat".into(),
        params: vec![ValType::I32, ValType::I32, ValType::I32, ValType::I32],
        result: Some(ValType::I32),
        locals: vec![ValType::I32],
        body,
        exported: false,
    }
}

/// `cot_string_eq(ptr1,len1,ptr2,len2: i32) -> i32`: length short-circuit,
/// then a byte-by-byte comparison loop.
fn cot_string_eq() -> FuncDef {
    use WasmInstr::*;
    let body = vec![
        local(1),
        local(3),
        I32Ne,
        If(crate::instr::BlockType::Empty),
        I32Const(0),
        Return,
        End,
        // local 4 = i = 0
        I32Const(0),
        LocalSet(4),
        Block(crate::instr::BlockType::Empty),
        Loop(crate::instr::BlockType::Empty),
        // if i >= len1, break out with "equal"
        LocalGet(4),
        local(1),
        I32GeU,
        BrIf(1),
        // if byte at ptr1+i != byte at ptr2+i, return 0
        local(0),
        LocalGet(4),
        I32Add,
        I32Load8U(memarg(0)),
        local(2),
        LocalGet(4),
        I32Add,
        I32Load8U(memarg(0)),
        I32Ne,
        If(crate::instr::BlockType::Empty),
        I32Const(0),
        Return,
        End,
        LocalGet(4),
        I32Const(1),
        I32Add,
        LocalSet(4),
        Br(0),
        End,
        End,
        I32Const(1),
    ];
    FuncDef {
        name: "cot_string_eq".into(),
        params: vec![ValType::I32, ValType::I32, ValType::I32, ValType::I32],
        result: Some(ValType::I32),
        locals: vec![ValType::I32],
        body,
        exported: false,
    }
}

/// Builds every runtime function. `destructor_call_func_index` is
/// `cot_dealloc`'s eventual index, resolved by the caller once it knows the
/// full function layout (the runtime functions are mutually referential:
/// `cot_release` calls `cot_dealloc`, `cot_string_concat` calls
/// `cot_alloc`), so this takes the already-assigned indices rather than
/// computing them itself.
pub fn build_runtime_funcs(alloc_idx: u32, dealloc_idx: u32) -> Vec<FuncDef> {
    vec![
        cot_alloc(),
        cot_dealloc(),
        cot_retain(),
        cot_release(dealloc_idx),
        cot_string_concat(alloc_idx),
        cot_string_eq(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_funcs_are_named_per_spec() {
        let funcs = build_runtime_funcs(0, 1);
        let names: Vec<&str> = funcs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cot_alloc", "cot_dealloc", "cot_retain", "cot_release", "cot_string_concat", "cot_string_eq"]
        );
    }

    #[test]
    fn cot_alloc_returns_base_plus_header_size() {
        let f = cot_alloc();
        assert!(matches!(f.body.last(), Some(WasmInstr::I32Add)));
        assert!(f.body.iter().any(|i| matches!(i, WasmInstr::I32Const(16))));
    }
}
