//! Native object-file backend (spec.md §4.5/§4.6). Cot's AOT path doesn't
//! translate SSA straight to CLIF: it reuses the Wasm backend's bytecode
//! as a shared linear IR (`cot_wasm::compile_module`, exactly as
//! [`crate::wasm_target`] uses it), then re-parses that bytecode with
//! `wasmparser` and hands each function body to `cot-wasm2clif`. This
//! mirrors how `wasmtime` itself treats a `.wasm` module as the one input
//! both its interpreter and its Cranelift AOT path compile from — here
//! Wasm plays that same role as Cot's own universal bytecode, never
//! exposed to users but always present between `cot-opt` and codegen.
//! See `DESIGN.md` for why this isn't a direct SSA→CLIF translator yet.

use cot_ast::Module;
use cot_clif::{CallConv, Type as ClifType};
use cot_machinst::isa::x64;
use cot_objgen::EmitUnit;
use cot_ssa::{BasicType, Type as SsaType, TypeIndex, TypeRegistry};
use cot_wasm2clif::FuncSig;
use regalloc2::{Function as RegallocFunction, Inst as RInst};
use target_lexicon::Triple;
use wasmparser::Payload;

use crate::error::CompileError;
use crate::wasm_target::compile_to_wasm_module;

const RUNTIME_FUNC_NAMES: [&str; 6] =
    ["cot_alloc", "cot_dealloc", "cot_retain", "cot_release", "cot_string_concat", "cot_string_eq"];

/// Maps a basic scalar `cot_ssa` type to its CLIF representative. Every
/// composite type has already been decomposed away by `cot-opt`'s
/// `decompose` pass by the time a value reaches this boundary, so the
/// only thing left to reject here is `Void` (never a parameter or a
/// return's own type, only the absence of one) and anything that's
/// still a composite because `decompose` didn't touch it (a `cot-opt`
/// bug, not something this function should paper over).
fn clif_type_of(types: &TypeRegistry, idx: TypeIndex) -> Result<ClifType, CompileError> {
    match types.lookup(idx) {
        SsaType::Basic(BasicType::I64) | SsaType::Basic(BasicType::U64) => Ok(ClifType::I64),
        SsaType::Basic(BasicType::I32) | SsaType::Basic(BasicType::U32) => Ok(ClifType::I32),
        SsaType::Basic(BasicType::I16) | SsaType::Basic(BasicType::U16) => Ok(ClifType::I16),
        SsaType::Basic(BasicType::I8) | SsaType::Basic(BasicType::U8) | SsaType::Basic(BasicType::Bool) => Ok(ClifType::I8),
        SsaType::Basic(BasicType::F32) => Ok(ClifType::F32),
        SsaType::Basic(BasicType::F64) => Ok(ClifType::F64),
        other => Err(CompileError::user(format!("type {other:?} isn't native-codegen-ready (decompose should have removed it)"))),
    }
}

/// Compiles `module` straight to a relocatable object file for `triple`.
pub fn compile_to_object(module: &Module, triple: &Triple, comp_dir: &str, comp_name: &str) -> Result<Vec<u8>, CompileError> {
    let (lowered, wasm_bytes) = compile_to_wasm_module(module)?;
    let call_conv = CallConv::for_target(triple);

    // `wasmparser`'s code section only covers the runtime + user
    // functions (imports carry no body), in exactly the order
    // `compile_module` assigned them: the six fixed runtime entries
    // first, then user functions in `lowered.functions` order. Skip the
    // runtime bodies; everything from index `RUNTIME_FUNC_NAMES.len()`
    // onward lines up 1:1 with `lowered.functions`.
    let mut code_bodies = Vec::new();
    for payload in wasmparser::Parser::new(0).parse_all(&wasm_bytes) {
        if let Payload::CodeSectionEntry(body) = payload.map_err(|e| CompileError::user(format!("malformed intermediate wasm module: {e}")))? {
            code_bodies.push(body);
        }
    }
    let user_bodies = &code_bodies[RUNTIME_FUNC_NAMES.len()..];
    if user_bodies.len() != lowered.functions.len() {
        return Err(CompileError::user("intermediate wasm module's function count doesn't match the source module"));
    }

    let module_funcs = build_module_funcs(module, &lowered);

    let mut units = Vec::with_capacity(lowered.functions.len());
    for (func, body) in lowered.functions.iter().zip(user_bodies.iter()) {
        let param_types: Vec<ClifType> = func.param_types.iter().map(|&t| clif_type_of(&lowered.types, t)).collect::<Result<_, _>>()?;
        let result_type =
            if func.ret_type == TypeIndex::VOID { None } else { Some(clif_type_of(&lowered.types, func.ret_type)?) };

        let clif_func = cot_wasm2clif::translate_function(&func.name, body, &param_types, result_type, call_conv, &module_funcs)
            .map_err(CompileError::from)?;
        let mut vcode = crate::isel::select_function(&clif_func).map_err(CompileError::from)?;

        let env = x64::machine_env();
        let output = vcode.allocate(&env).map_err(CompileError::from)?;
        let num_insts = vcode.num_insts();
        let allocs: Vec<&[regalloc2::Allocation]> = (0..num_insts).map(|i| output.inst_allocs(RInst::new(i))).collect();
        cot_machinst::apply_allocations(&mut vcode, &allocs);

        let mut buf = cot_machinst::MachBuffer::new();
        for i in 0..num_insts {
            vcode.inst(RInst::new(i)).emit(&mut buf);
        }
        let (code, relocs) = buf.finish();

        units.push(EmitUnit { name: func.name.clone(), code, relocs, lines: vec![], source_file: comp_name.to_string() });
    }

    let (object_bytes, _debug_line) = cot_objgen::emit_object(&units, triple, comp_dir, comp_name);
    Ok(object_bytes)
}

/// Builds the `module_funcs` table `cot-wasm2clif` indexes `call`
/// instructions against: imports, then the six runtime entries, then
/// user functions, in the exact order `cot_wasm::compile_module` assigns
/// indices. Accurate even though `isel` currently refuses every `call`
/// it sees, since getting this wrong would silently corrupt the next
/// call site `isel` does learn to handle.
fn build_module_funcs(module: &Module, lowered: &cot_lower::LoweredModule) -> Vec<FuncSig> {
    let mut sigs = Vec::new();
    for f in module.functions.iter().filter(|f| f.is_extern) {
        let result = if f.ret == TypeIndex::VOID { None } else { clif_type_of(&lowered.types, f.ret).ok() };
        sigs.push(FuncSig { param_count: f.params.len(), result });
    }
    // The six runtime entries all take/return plain i32 addresses or
    // nothing; `isel` never selects a `call`, so only the arity matters
    // here, not the exact types.
    for _ in RUNTIME_FUNC_NAMES {
        sigs.push(FuncSig { param_count: 1, result: Some(ClifType::I32) });
    }
    for f in &lowered.functions {
        let result = if f.ret_type == TypeIndex::VOID { None } else { clif_type_of(&lowered.types, f.ret_type).ok() };
        sigs.push(FuncSig { param_count: f.param_types.len(), result });
    }
    sigs
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ast::{Expr, FuncDecl, Stmt};

    #[test]
    fn a_single_function_module_emits_a_nonempty_elf_object() {
        let module = Module {
            structs: vec![],
            functions: vec![FuncDecl {
                name: "main".into(),
                params: vec![],
                ret: TypeIndex::I64,
                body: vec![Stmt::Return(Some(Expr::IntLit(42, TypeIndex::I64)))],
                is_extern: false,
                is_public: true,
                test_name: None,
            }],
        };
        let triple: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        let object_bytes = compile_to_object(&module, &triple, "/tmp/proj", "main.arc").unwrap();
        assert!(!object_bytes.is_empty());
    }

    #[test]
    fn rejecting_the_intermediate_wasm_body_surfaces_as_a_compile_error() {
        // A function whose body needs control flow (an `if`) isn't
        // selectable by the current `isel` scope; the error should
        // propagate rather than panicking partway through codegen.
        let module = Module {
            structs: vec![],
            functions: vec![FuncDecl {
                name: "main".into(),
                params: vec![],
                ret: TypeIndex::I64,
                body: vec![Stmt::If {
                    cond: Expr::BoolLit(true),
                    then: vec![Stmt::Return(Some(Expr::IntLit(1, TypeIndex::I64)))],
                    else_: Some(vec![Stmt::Return(Some(Expr::IntLit(0, TypeIndex::I64)))]),
                }],
                is_extern: false,
                is_public: true,
                test_name: None,
            }],
        };
        let triple: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        assert!(compile_to_object(&module, &triple, "/tmp/proj", "main.arc").is_err());
    }
}
