//! Wasm backend driving (spec.md §4.4/§4.6): lower every function, run
//! `cot-opt`'s full Wasm pipeline, read `extern fn` declarations for the
//! import table, and hand the result to [`cot_wasm::compile_module`].

use cot_ast::Module;
use cot_wasm::{ExternImport, ModuleInputs};

use crate::error::CompileError;

fn wasm_valtype(ty: cot_ssa::TypeIndex, types: &cot_ssa::TypeRegistry) -> cot_wasm::instr::ValType {
    cot_wasm::gen::wasm_valtype(types, ty)
}

/// Lowers `module`, runs every function through `cot-opt`'s full Wasm
/// pipeline, and compiles the result to a `.wasm` binary, handing back
/// the lowered module alongside it — [`crate::native_target`] needs the
/// same lowered functions and type registry to re-derive CLIF from this
/// binary's code section, so both backends share this one entry point
/// rather than lowering twice.
pub fn compile_to_wasm_module(module: &Module) -> Result<(cot_lower::LoweredModule, Vec<u8>), CompileError> {
    let mut lowered = cot_lower::lower_module(module);

    for f in &mut lowered.functions {
        cot_opt::run_wasm_pipeline(f)?;
    }

    let externs: Vec<ExternImport> = module
        .functions
        .iter()
        .filter(|f| f.is_extern)
        .map(|f| ExternImport {
            name: f.name.clone(),
            params: f.params.iter().map(|(_, ty)| wasm_valtype(*ty, &lowered.types)).collect(),
            result: if f.ret == cot_ssa::TypeIndex::VOID { None } else { Some(wasm_valtype(f.ret, &lowered.types)) },
        })
        .collect();

    let mut public_fn_names: Vec<String> =
        module.functions.iter().filter(|f| !f.is_extern && (f.is_public || f.name == "main")).map(|f| f.name.clone()).collect();
    public_fn_names.sort();
    public_fn_names.dedup();

    let inputs = ModuleInputs { externs, memory_min_pages: 1, ..ModuleInputs::default() };
    let bytes = cot_wasm::compile_module(&lowered.functions, &inputs, &public_fn_names);
    Ok((lowered, bytes))
}

/// Compiles `module` into a finished `.wasm` binary. Every non-`extern`
/// function is lowered, run through the full optimization/layout
/// pipeline, and exported if `cot_ast::FuncDecl::is_public` — `main`
/// (conventionally present) is always exported regardless, matching the
/// Wasm ABI's entry-point requirement (spec.md §6.2).
pub fn compile_to_wasm(module: &Module) -> Result<Vec<u8>, CompileError> {
    compile_to_wasm_module(module).map(|(_, bytes)| bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ast::{Expr, FuncDecl, Stmt};
    use cot_ssa::TypeIndex;

    #[test]
    fn a_single_function_module_compiles_to_a_valid_wasm_binary() {
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
        let bytes = compile_to_wasm(&module).unwrap();
        let mut validator = wasmparser::Validator::new();
        validator.validate_all(&bytes).expect("driver output must be a valid wasm module");
    }
}
