//! Pipeline orchestration (spec.md §4.6): ties module ordering, the two
//! backends, and inline-test synthesis together behind one
//! [`compile`] entry point, the way `wasmtime-cli`'s `compile` command
//! wires frontend parsing through to object emission without the
//! library crates needing to know about each other.

pub mod error;
pub mod isel;
pub mod native_target;
pub mod order;
pub mod testgen;
pub mod wasm_target;

pub use error::CompileError;
pub use order::{resolve_order, CompilationUnit};

use target_lexicon::Triple;

/// Which backend a build targets (spec.md §6.1's `--target` flag).
#[derive(Clone, Debug)]
pub enum CompileTarget {
    Wasm,
    Native(NativeOutput),
}

#[derive(Clone, Debug)]
pub struct NativeOutput {
    pub triple: Triple,
    pub comp_dir: String,
    pub comp_name: String,
}

/// The finished artifact of one build: either a `.wasm` binary or a
/// relocatable object file ready for the system linker.
pub enum Artifact {
    Wasm(Vec<u8>),
    Object(Vec<u8>),
}

/// Resolves every unit's imports into a compile order, merges them into
/// one `cot_ast::Module` (Cot has no cross-module namespacing yet — see
/// spec.md's Open Questions — so "resolved order" today just means
/// "concatenated in dependency order"), and compiles the result for
/// `target`.
pub fn compile(units: Vec<CompilationUnit>, target: CompileTarget) -> Result<Artifact, CompileError> {
    let ordered = resolve_order(units)?;
    let mut module = cot_ast::Module { functions: Vec::new(), structs: Vec::new() };
    for unit in ordered {
        module.functions.extend(unit.module.functions);
        module.structs.extend(unit.module.structs);
    }

    match target {
        CompileTarget::Wasm => wasm_target::compile_to_wasm(&module).map(Artifact::Wasm),
        CompileTarget::Native(out) => {
            native_target::compile_to_object(&module, &out.triple, &out.comp_dir, &out.comp_name).map(Artifact::Object)
        }
    }
}

/// `cot test`'s entry point (spec.md §6.4): rewrites `module` to replace
/// any existing `main` with a synthesized one that calls every `test`
/// block, then compiles it exactly like [`compile`].
pub fn compile_tests(units: Vec<CompilationUnit>, target: CompileTarget) -> Result<Artifact, CompileError> {
    let ordered = resolve_order(units)?;
    let mut module = cot_ast::Module { functions: Vec::new(), structs: Vec::new() };
    for unit in ordered {
        module.functions.extend(unit.module.functions);
        module.structs.extend(unit.module.structs);
    }
    let module = testgen::build_test_module(module)?;

    match target {
        CompileTarget::Wasm => wasm_target::compile_to_wasm(&module).map(Artifact::Wasm),
        CompileTarget::Native(out) => {
            native_target::compile_to_object(&module, &out.triple, &out.comp_dir, &out.comp_name).map(Artifact::Object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ast::{Expr, FuncDecl, Module, Stmt};
    use cot_ssa::TypeIndex;

    fn unit(name: &str, module: Module) -> CompilationUnit {
        CompilationUnit { name: name.to_string(), imports: vec![], module }
    }

    fn main_returning_42() -> Module {
        Module {
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
        }
    }

    #[test]
    fn compiling_to_wasm_produces_a_valid_module() {
        let artifact = compile(vec![unit("main", main_returning_42())], CompileTarget::Wasm).unwrap();
        let Artifact::Wasm(bytes) = artifact else { panic!("expected a wasm artifact") };
        wasmparser::Validator::new().validate_all(&bytes).unwrap();
    }

    #[test]
    fn compiling_to_native_produces_a_nonempty_object() {
        let triple: Triple = "x86_64-unknown-linux-gnu".parse().unwrap();
        let out = NativeOutput { triple, comp_dir: "/tmp/proj".into(), comp_name: "main.arc".into() };
        let artifact = compile(vec![unit("main", main_returning_42())], CompileTarget::Native(out)).unwrap();
        let Artifact::Object(bytes) = artifact else { panic!("expected an object artifact") };
        assert!(!bytes.is_empty());
    }

    #[test]
    fn a_project_with_no_tests_cannot_build_a_test_binary() {
        let result = compile_tests(vec![unit("main", main_returning_42())], CompileTarget::Wasm);
        assert!(result.is_err());
    }
}
