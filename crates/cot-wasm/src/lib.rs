//! Wasm backend: turns already-optimized [`cot_ssa::Function`]s into a
//! finished `.wasm` module (spec.md §4.4).
//!
//! Pipeline, per function: [`gen::FuncGen::gen_function`] (SSA values →
//! per-block instruction fragments) → [`preprocess::preprocess`]
//! (flattens [`cot_opt::layout::Region`] into structured `block/loop/if`
//! with resolved branch depths) → [`assemble::assemble`] (LEB128 + opcode
//! bytes). [`link::link`] then stitches every function body together with
//! the [`runtime`] module, imports, the destructor/indirect-call table, and
//! the data section into one binary.

pub mod assemble;
pub mod gen;
pub mod instr;
pub mod link;
pub mod preprocess;
pub mod runtime;

use std::collections::HashMap;

use cot_ssa::Function;

use gen::{wasm_valtype, FuncGen, LinkContext};
use instr::ValType;
use link::{FuncDef, ImportDecl, ModulePlan};

/// An `extern fn` declaration the driver wants imported from `"env"`.
pub struct ExternImport {
    pub name: String,
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

/// Everything [`compile_module`] needs beyond the optimized functions
/// themselves: link-time addresses the driver computed while laying out
/// globals, metadata, and string literals.
#[derive(Default)]
pub struct ModuleInputs {
    pub externs: Vec<ExternImport>,
    pub metadata_offsets: HashMap<String, i64>,
    pub global_offsets: HashMap<String, i64>,
    pub local_slot_sizes_by_func: HashMap<String, Vec<u32>>,
    pub data: Vec<link::DataSegment>,
    /// Table entries beyond slot 0 (the null sentinel), in
    /// `DestructorTable` order — function names, resolved to indices once
    /// the full function list is known.
    pub destructor_table: Vec<String>,
    pub memory_min_pages: u32,
    pub sourcemap: Vec<u8>,
}

/// Compiles every function in `functions` (already run through `cot-opt`'s
/// full Wasm pipeline, including `layout`) plus the ARC runtime into one
/// Wasm module.
pub fn compile_module(functions: &[Function], inputs: &ModuleInputs, public_fn_names: &[String]) -> Vec<u8> {
    let imports: Vec<ImportDecl> = inputs
        .externs
        .iter()
        .map(|e| ImportDecl { module: "env".into(), name: e.name.clone(), params: e.params.clone(), result: e.result })
        .collect();

    // Runtime functions occupy the indices right after imports; user
    // functions follow. Index assignment has to happen before codegen,
    // since `LocalAddr`/`Call`/`MetadataAddr` resolution inside `gen` reads
    // straight from `LinkContext`.
    let runtime_names = ["cot_alloc", "cot_dealloc", "cot_retain", "cot_release", "cot_string_concat", "cot_string_eq"];
    let mut func_indices = HashMap::new();
    let mut idx = imports.len() as u32;
    for name in runtime_names {
        func_indices.insert(name.to_string(), idx);
        idx += 1;
    }
    for f in functions {
        func_indices.insert(f.name.clone(), idx);
        idx += 1;
    }

    let alloc_idx = func_indices["cot_alloc"];
    let dealloc_idx = func_indices["cot_dealloc"];
    let runtime_funcs = runtime::build_runtime_funcs(alloc_idx, dealloc_idx);

    let mut user_funcs = Vec::new();
    for f in functions {
        let link_ctx = LinkContext {
            metadata_offsets: inputs.metadata_offsets.clone(),
            global_offsets: inputs.global_offsets.clone(),
            func_indices: func_indices.clone(),
            local_slot_sizes: inputs.local_slot_sizes_by_func.get(&f.name).cloned().unwrap_or_default(),
        };
        let mut fg = FuncGen::new(f, &link_ctx);
        let blocks = fg.gen_function();
        let regions = cot_opt::layout::run(f);
        let body = preprocess::preprocess(&regions, &blocks);
        let params: Vec<ValType> = f.param_types.iter().map(|&t| wasm_valtype(&f.types, t)).collect();
        let result =
            if f.ret_type == cot_ssa::TypeIndex::VOID { None } else { Some(wasm_valtype(&f.types, f.ret_type)) };
        user_funcs.push(FuncDef {
            name: f.name.clone(),
            params,
            result,
            locals: fg.declared_locals().to_vec(),
            body,
            exported: public_fn_names.iter().any(|n| n == &f.name),
        });
    }

    let elements: Vec<u32> = std::iter::once(0) // slot 0: null sentinel, never called
        .chain(inputs.destructor_table.iter().map(|name| func_indices[name]))
        .collect();

    let mut all_funcs = runtime_funcs;
    all_funcs.extend(user_funcs);

    let plan = ModulePlan {
        imports,
        functions: all_funcs,
        globals: vec![(ValType::I32, true, 0)], // global 0: heap_ptr
        data: inputs.data.clone(),
        elements,
        memory_min_pages: inputs.memory_min_pages.max(1),
        sourcemap: inputs.sourcemap.clone(),
    };
    link::link(&plan, &func_indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::{BlockKind, Op, SourcePos, TypeIndex};

    #[test]
    fn compiles_a_trivial_function_into_a_valid_module() {
        let mut f = Function::new("main");
        let entry = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();
        let c = f.append(entry, Op::IConst(0), TypeIndex::I64, pos);
        f.append(entry, Op::Return(vec![c]), TypeIndex::VOID, pos);
        f.ret_type = TypeIndex::I64;

        let inputs = ModuleInputs { memory_min_pages: 1, ..ModuleInputs::default() };
        let bytes = compile_module(&[f], &inputs, &["main".to_string()]);

        let mut validator = wasmparser::Validator::new();
        validator.validate_all(&bytes).expect("compiled module must be valid wasm");
    }
}
