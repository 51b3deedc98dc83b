//! `link`: assembles compiled function bodies, imports, globals, the
//! destructor/indirect-call table, and the data section into a single Wasm
//! module, in the section order spec.md §4.4.2 requires: Type, Import,
//! Function, Table, Memory, Global, Export, Element, Code, Data.
//!
//! Function indices are assigned imports-first (`0..num_imports-1`), then
//! every locally defined function in declaration order — runtime (ARC)
//! functions are expected to appear before user functions in `functions`,
//! since [`crate::runtime`] builds its defs ahead of the driver's user-code
//! defs. The resulting map is what [`crate::gen::LinkContext::func_indices`]
//! is built from.

use std::collections::HashMap;

use crate::assemble::{assemble, write_sleb128, write_uleb128};
use crate::instr::{ValType, WasmInstr};

pub struct ImportDecl {
    pub module: String,
    pub name: String,
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

pub struct FuncDef {
    pub name: String,
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
    pub locals: Vec<ValType>,
    pub body: Vec<WasmInstr>,
    pub exported: bool,
}

#[derive(Clone)]
pub struct DataSegment {
    pub offset: i32,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct ModulePlan {
    pub imports: Vec<ImportDecl>,
    pub functions: Vec<FuncDef>,
    /// `(type, mutable, initial value)` — Cot only ever needs scalar
    /// globals (the `heap_ptr` bump pointer, plus whatever the driver
    /// assigns fixed slots to via `global_addr`).
    pub globals: Vec<(ValType, bool, i64)>,
    pub data: Vec<DataSegment>,
    /// Function indices placed in table 0, starting at element offset 0 —
    /// slot 0 is the ARC null-destructor sentinel (spec.md §3.4) and is
    /// never itself called, so callers should leave it as a dummy entry.
    pub elements: Vec<u32>,
    pub memory_min_pages: u32,
    /// Opaque bytes for the `"cot-sourcemap"` custom section (SPEC_FULL.md
    /// §6.2): one record per instruction boundary the driver wants to map
    /// back to a source position. Emitted verbatim; building the records is
    /// the driver's job, not `link`'s.
    pub sourcemap: Vec<u8>,
}

/// Imports first, then every `functions` entry in order.
pub fn assign_func_indices(imports: &[ImportDecl], functions: &[FuncDef]) -> HashMap<String, u32> {
    let mut map = HashMap::new();
    let mut idx = 0u32;
    for imp in imports {
        map.insert(imp.name.clone(), idx);
        idx += 1;
    }
    for f in functions {
        map.insert(f.name.clone(), idx);
        idx += 1;
    }
    map
}

struct TypeTable {
    sigs: Vec<(Vec<ValType>, Option<ValType>)>,
}

impl TypeTable {
    fn new() -> Self {
        TypeTable { sigs: Vec::new() }
    }

    fn index_of(&mut self, params: &[ValType], result: Option<ValType>) -> u32 {
        let key = (params.to_vec(), result);
        if let Some(pos) = self.sigs.iter().position(|s| *s == key) {
            return pos as u32;
        }
        self.sigs.push(key);
        (self.sigs.len() - 1) as u32
    }
}

fn write_name(out: &mut Vec<u8>, s: &str) {
    write_uleb128(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn write_section(out: &mut Vec<u8>, id: u8, body: Vec<u8>) {
    if body.is_empty() && id != 0 {
        return;
    }
    out.push(id);
    write_uleb128(out, body.len() as u64);
    out.extend_from_slice(&body);
}

fn write_limits_min_only(out: &mut Vec<u8>, min: u32) {
    out.push(0x00);
    write_uleb128(out, min as u64);
}

fn write_const_i32_expr(out: &mut Vec<u8>, value: i32) {
    out.push(0x41); // i32.const
    write_sleb128(out, value as i64);
    out.push(0x0B); // end
}

fn write_init_expr(out: &mut Vec<u8>, ty: ValType, value: i64) {
    match ty {
        ValType::I32 => {
            out.push(0x41);
            write_sleb128(out, value);
        }
        ValType::I64 => {
            out.push(0x42);
            write_sleb128(out, value);
        }
        ValType::F32 => {
            out.push(0x43);
            out.extend_from_slice(&(value as f32).to_le_bytes());
        }
        ValType::F64 => {
            out.push(0x44);
            out.extend_from_slice(&(value as f64).to_le_bytes());
        }
    }
    out.push(0x0B);
}

/// Builds the full binary module. `func_indices` must be the map returned
/// by [`assign_func_indices`] for the same `plan`.
pub fn link(plan: &ModulePlan, func_indices: &HashMap<String, u32>) -> Vec<u8> {
    let mut types = TypeTable::new();
    let mut out = Vec::new();
    out.extend_from_slice(b"\0asm");
    out.extend_from_slice(&1u32.to_le_bytes());

    // --- Type ---
    // Every destructor has signature `(i32) -> ()`; `cot_release`'s
    // `call_indirect` is emitted once, ahead of link, with a hardcoded type
    // index of 0, so that signature must land in slot 0 regardless of what
    // else the module declares (see `runtime::cot_release`).
    types.index_of(&[ValType::I32], None);
    let import_type_idx: Vec<u32> =
        plan.imports.iter().map(|i| types.index_of(&i.params, i.result)).collect();
    let func_type_idx: Vec<u32> =
        plan.functions.iter().map(|f| types.index_of(&f.params, f.result)).collect();
    let mut type_body = Vec::new();
    write_uleb128(&mut type_body, types.sigs.len() as u64);
    for (params, result) in &types.sigs {
        type_body.push(0x60);
        write_uleb128(&mut type_body, params.len() as u64);
        for p in params {
            type_body.push(p.byte());
        }
        write_uleb128(&mut type_body, result.is_some() as u64);
        if let Some(r) = result {
            type_body.push(r.byte());
        }
    }
    write_section(&mut out, 1, type_body);

    // --- Import ---
    let mut import_body = Vec::new();
    write_uleb128(&mut import_body, plan.imports.len() as u64);
    for (imp, &tidx) in plan.imports.iter().zip(&import_type_idx) {
        write_name(&mut import_body, &imp.module);
        write_name(&mut import_body, &imp.name);
        import_body.push(0x00); // func import
        write_uleb128(&mut import_body, tidx as u64);
    }
    write_section(&mut out, 2, import_body);

    // --- Function ---
    let mut func_body = Vec::new();
    write_uleb128(&mut func_body, plan.functions.len() as u64);
    for &tidx in &func_type_idx {
        write_uleb128(&mut func_body, tidx as u64);
    }
    write_section(&mut out, 3, func_body);

    // --- Table --- (funcref, enough room for every element plus slot 0)
    let table_len = plan.elements.len().max(1) as u32;
    let mut table_body = Vec::new();
    write_uleb128(&mut table_body, 1u64);
    table_body.push(0x70);
    write_limits_min_only(&mut table_body, table_len);
    write_section(&mut out, 4, table_body);

    // --- Memory ---
    let mut mem_body = Vec::new();
    write_uleb128(&mut mem_body, 1u64);
    write_limits_min_only(&mut mem_body, plan.memory_min_pages.max(1));
    write_section(&mut out, 5, mem_body);

    // --- Global ---
    let mut global_body = Vec::new();
    write_uleb128(&mut global_body, plan.globals.len() as u64);
    for &(ty, mutable, init) in &plan.globals {
        global_body.push(ty.byte());
        global_body.push(mutable as u8);
        write_init_expr(&mut global_body, ty, init);
    }
    write_section(&mut out, 6, global_body);

    // --- Export --- (memory, plus every function marked exported)
    let exported: Vec<&FuncDef> = plan.functions.iter().filter(|f| f.exported).collect();
    let mut export_body = Vec::new();
    write_uleb128(&mut export_body, (exported.len() + 1) as u64);
    write_name(&mut export_body, "memory");
    export_body.push(0x02);
    write_uleb128(&mut export_body, 0);
    for f in &exported {
        write_name(&mut export_body, &f.name);
        export_body.push(0x00);
        write_uleb128(&mut export_body, func_indices[&f.name] as u64);
    }
    write_section(&mut out, 7, export_body);

    // --- Element ---
    let mut elem_body = Vec::new();
    if !plan.elements.is_empty() {
        write_uleb128(&mut elem_body, 1u64);
        write_uleb128(&mut elem_body, 0); // flag: active, table 0
        write_const_i32_expr(&mut elem_body, 0);
        write_uleb128(&mut elem_body, plan.elements.len() as u64);
        for &idx in &plan.elements {
            write_uleb128(&mut elem_body, idx as u64);
        }
    } else {
        write_uleb128(&mut elem_body, 0);
    }
    write_section(&mut out, 9, elem_body);

    // --- Code ---
    let mut code_body = Vec::new();
    write_uleb128(&mut code_body, plan.functions.len() as u64);
    for f in &plan.functions {
        let mut fn_bytes = Vec::new();
        write_local_decls(&mut fn_bytes, &f.locals);
        fn_bytes.extend(assemble(&f.body));
        fn_bytes.push(0x0B); // end
        write_uleb128(&mut code_body, fn_bytes.len() as u64);
        code_body.extend(fn_bytes);
    }
    write_section(&mut out, 10, code_body);

    // --- Data ---
    let mut data_body = Vec::new();
    write_uleb128(&mut data_body, plan.data.len() as u64);
    for seg in &plan.data {
        write_uleb128(&mut data_body, 0); // flag: active, memory 0
        write_const_i32_expr(&mut data_body, seg.offset);
        write_uleb128(&mut data_body, seg.bytes.len() as u64);
        data_body.extend_from_slice(&seg.bytes);
    }
    write_section(&mut out, 11, data_body);

    // --- Custom: cot-sourcemap ---
    if !plan.sourcemap.is_empty() {
        let mut custom_body = Vec::new();
        write_name(&mut custom_body, "cot-sourcemap");
        custom_body.extend_from_slice(&plan.sourcemap);
        write_section(&mut out, 0, custom_body);
    }

    out
}

/// Compresses consecutive locals of the same type into `(count, type)` runs,
/// the way the binary format wants them.
fn write_local_decls(out: &mut Vec<u8>, locals: &[ValType]) {
    let mut runs: Vec<(u32, ValType)> = Vec::new();
    for &ty in locals {
        match runs.last_mut() {
            Some((count, last_ty)) if *last_ty == ty => *count += 1,
            _ => runs.push((1, ty)),
        }
    }
    write_uleb128(out, runs.len() as u64);
    for (count, ty) in runs {
        write_uleb128(out, count as u64);
        out.push(ty.byte());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_func(name: &str, body: Vec<WasmInstr>) -> FuncDef {
        FuncDef {
            name: name.to_string(),
            params: vec![],
            result: Some(ValType::I32),
            locals: vec![],
            body,
            exported: true,
        }
    }

    #[test]
    fn assigns_imports_before_user_functions() {
        let imports = vec![ImportDecl {
            module: "env".into(),
            name: "trap".into(),
            params: vec![],
            result: None,
        }];
        let functions = vec![leaf_func("main", vec![WasmInstr::I32Const(0)])];
        let map = assign_func_indices(&imports, &functions);
        assert_eq!(map["trap"], 0);
        assert_eq!(map["main"], 1);
    }

    #[test]
    fn produces_a_well_formed_header_and_sections() {
        let functions = vec![leaf_func("answer", vec![WasmInstr::I32Const(42)])];
        let map = assign_func_indices(&[], &functions);
        let plan = ModulePlan { functions, memory_min_pages: 1, ..ModulePlan::default() };
        let bytes = link(&plan, &map);
        assert_eq!(&bytes[0..4], b"\0asm");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert!(bytes.len() > 8);
    }

    #[test]
    fn wasmparser_accepts_the_assembled_module() {
        let functions = vec![leaf_func("answer", vec![WasmInstr::I32Const(42)])];
        let map = assign_func_indices(&[], &functions);
        let plan = ModulePlan { functions, memory_min_pages: 1, ..ModulePlan::default() };
        let bytes = link(&plan, &map);
        let mut validator = wasmparser::Validator::new();
        validator.validate_all(&bytes).expect("assembled module must be valid wasm");
    }
}
