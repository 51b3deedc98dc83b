//! Scope-exit cleanup emission: releases and `defer` bodies, in the LIFO
//! order `cot_arc::CleanupStack` hands back (spec.md §4.3).
//!
//! `defer` bodies are duplicated inline at every exit path that runs them
//! rather than outlined into one shared lowered block (the strategy
//! `cot_arc::Cleanup::Defer`'s doc comment describes for a future pass):
//! the block handle it carries is used here purely as a lookup key into
//! `LowerCtx::defer_bodies`, never as a real jump target.

use cot_arc::Cleanup;

use crate::LowerCtx;

impl LowerCtx {
    pub(crate) fn register_defer(&mut self, body: cot_ast::Block) {
        let handle = self.f.create_block(cot_ssa::BlockKind::Plain);
        self.defer_bodies.insert(handle, body);
        self.cleanup.push_defer(handle);
    }

    /// Emits releases and re-lowers defer bodies for a list of pending
    /// cleanups, most-recent-first as returned by `CleanupStack`.
    pub(crate) fn emit_cleanups(&mut self, cleanups: &[Cleanup]) {
        for c in cleanups {
            if self.is_terminated() {
                return;
            }
            match c {
                Cleanup::Release(v) => {
                    self.append(cot_ssa::Op::Release(*v), cot_ssa::TypeIndex::VOID);
                }
                Cleanup::Defer(handle) => {
                    if let Some(body) = self.defer_bodies.get(handle).cloned() {
                        self.lower_block(&body);
                    }
                }
            }
        }
    }
}
