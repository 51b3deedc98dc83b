//! SSA optimization & lowering passes (spec.md §4.2), run in this fixed
//! order for the Wasm path:
//!
//! `rewritegeneric -> decompose -> lower_wasm -> rewritedec -> schedule -> layout`
//!
//! The native path (`cot-wasm2clif` onward) only needs `rewritegeneric`,
//! `decompose`, and `rewritedec` — it never goes through Wasm bytecode
//! directly for ops, `lower_wasm`/`layout` are Wasm-specific.

pub mod decompose;
pub mod layout;
pub mod lower_wasm;
pub mod rewritedec;
pub mod rewritegeneric;
pub mod schedule;

use cot_ssa::{verify, CoreResult, Function};

/// Runs the full Wasm-path pipeline, verifying invariants between every
/// stage when `debug_assertions` is enabled (spec.md §7 "Verification
/// mode").
pub fn run_wasm_pipeline(func: &mut Function) -> CoreResult<Vec<layout::Region>> {
    rewritegeneric::run(func);
    verify_if_debug(func, "rewritegeneric")?;

    decompose::run(func);
    verify_if_debug(func, "decompose")?;
    if cfg!(debug_assertions) {
        verify::verify_no_compound_phis(func, "decompose")?;
    }

    lower_wasm::run(func);
    verify_if_debug(func, "lower_wasm")?;

    rewritedec::run(func);
    verify_if_debug(func, "rewritedec")?;

    schedule::run(func);
    verify_if_debug(func, "schedule")?;

    Ok(layout::run(func))
}

/// Runs the subset of passes shared with the native path (everything up to
/// and including `rewritedec`; `cot-wasm2clif` takes over from there).
pub fn run_native_prepasses(func: &mut Function) -> CoreResult<()> {
    rewritegeneric::run(func);
    verify_if_debug(func, "rewritegeneric")?;
    decompose::run(func);
    verify_if_debug(func, "decompose")?;
    rewritedec::run(func);
    verify_if_debug(func, "rewritedec")
}

fn verify_if_debug(func: &Function, pass_name: &'static str) -> CoreResult<()> {
    if cfg!(debug_assertions) {
        verify::verify_function(func, pass_name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::{BlockKind, Op, SourcePos, TypeIndex};

    #[test]
    fn native_prepasses_run_cleanly_on_a_trivial_function() {
        let mut f = Function::new("answer");
        let entry = f.create_block(BlockKind::Ret);
        let pos = SourcePos::default();
        let c = f.append(entry, Op::IConst(42), TypeIndex::I64, pos);
        f.append(entry, Op::Return(vec![c]), TypeIndex::VOID, pos);
        f.ret_type = TypeIndex::I64;

        run_native_prepasses(&mut f).expect("prepasses must succeed on already-valid IR");
    }
}
