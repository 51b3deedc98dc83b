//! ARC insertion: the `CleanupStack` (spec.md §4.3) and the destructor
//! metadata built once per module after lowering.
//!
//! Modelled on Swift's SILGen cleanup stack: each lexical scope pushes
//! cleanups; scope exit — normal or via `return`/`break`/`continue` —
//! pops them in LIFO order. `defer` and ARC release share the same stack
//! so their ordering is unified for free.

use std::collections::HashMap;

use cot_ssa::{Block, Value};

#[derive(Clone, Debug)]
pub enum Cleanup {
    /// Release a temporary or a named binding going out of scope.
    Release(Value),
    /// A `defer { .. }` block, already lowered to its own SSA block; run
    /// by jumping to it (and falling through to the next cleanup) at
    /// scope exit.
    Defer(Block),
}

/// A LIFO stack of pending cleanups, partitioned into lexical scopes by
/// `scope_marks`. `push_scope`/`pop_scope` bracket a `{ .. }`; early exits
/// (`return`, `break`, `continue`) call [`CleanupStack::pending_from_top`]
/// to read off everything that must run without popping past the enclosing
/// loop/function scope, since normal control flow still has to run the
/// same cleanups again at the textual end of the scope.
#[derive(Default)]
pub struct CleanupStack {
    stack: Vec<Cleanup>,
    scope_marks: Vec<usize>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scope_marks.push(self.stack.len());
    }

    pub fn push_release(&mut self, v: Value) {
        self.stack.push(Cleanup::Release(v));
    }

    pub fn push_defer(&mut self, block: Block) {
        self.stack.push(Cleanup::Defer(block));
    }

    /// All cleanups registered in the current scope, most-recent first —
    /// the order in which they must be emitted (LIFO).
    pub fn pending_in_scope(&self) -> &[Cleanup] {
        let mark = *self.scope_marks.last().unwrap_or(&0);
        &self.stack[mark..]
    }

    /// Every cleanup pushed since entering scope `depth` (0 = outermost),
    /// most-recent first. Used for `return`/`break`/`continue`, which must
    /// run all cleanups up through the target scope without unwinding the
    /// stack itself (normal fallthrough still needs to run them later).
    pub fn pending_through(&self, depth: usize) -> Vec<&Cleanup> {
        let mark = self.scope_marks.get(depth).copied().unwrap_or(0);
        self.stack[mark..].iter().rev().collect()
    }

    pub fn current_depth(&self) -> usize {
        self.scope_marks.len()
    }

    /// Ends the current scope, returning its cleanups (most-recent first)
    /// for the caller to emit as releases/defer-jumps before falling
    /// through.
    pub fn pop_scope(&mut self) -> Vec<Cleanup> {
        let mark = self.scope_marks.pop().unwrap_or(0);
        self.stack.split_off(mark).into_iter().rev().collect()
    }

    /// Retargets a pending `Release(old)` cleanup to `Release(new)`, for
    /// `x = y` reassignment: the old value is released immediately at the
    /// assignment site, so the scope-exit cleanup must forward to the new
    /// value instead of releasing `old` a second time. Finds the innermost
    /// (most recent) matching entry, which is always the binding's own
    /// cleanup since shadowing pushes a fresh one per declaration.
    pub fn forward_release(&mut self, old: Value, new: Value) {
        if let Some(slot) = self.stack.iter_mut().rev().find(
            |c| matches!(c, Cleanup::Release(v) if *v == old),
        ) {
            *slot = Cleanup::Release(new);
        }
    }
}

/// Reassignment order for `x = y` (spec.md §4.3): retain the new value
/// before releasing the old one, so a self-assignment (`x === y`) never
/// drops the refcount to zero between the retain and the release.
pub const REASSIGN_ORDER: [ReassignStep; 3] =
    [ReassignStep::RetainNew, ReassignStep::ReleaseOld, ReassignStep::Store];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReassignStep {
    RetainNew,
    ReleaseOld,
    Store,
}

/// Table slot 0 is a reserved null sentinel (`destructor_table_index == 0`
/// means "no destructor", spec.md §3.4). Real destructors occupy slots
/// `1..N`, appended to the Wasm `element` table (or native dispatch table)
/// in the order they're discovered.
#[derive(Default)]
pub struct DestructorTable {
    entries: Vec<String>,
}

impl DestructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, deinit_fn_name: impl Into<String>) -> u32 {
        let name = deinit_fn_name.into();
        if let Some(pos) = self.entries.iter().position(|e| *e == name) {
            return (pos + 1) as u32;
        }
        self.entries.push(name);
        self.entries.len() as u32
    }

    pub fn slot_for(&self, name: &str) -> Option<u32> {
        self.entries.iter().position(|e| e == name).map(|i| (i + 1) as u32)
    }

    /// Slots `1..=len()`, in table order; slot 0 (the null sentinel) is
    /// implicit and not included here.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// `<TypeName>_deinit` is the driver-recognized destructor naming
/// convention (spec.md §4.3). Scans every lowered function name, builds
/// the dispatch table, and returns the per-type destructor name found (if
/// any) so the caller can populate `FullMetadata.destructor_table_index`.
pub fn build_destructor_table<'a>(
    function_names: impl Iterator<Item = &'a str>,
) -> (DestructorTable, HashMap<String, String>) {
    let mut table = DestructorTable::new();
    let mut type_to_deinit = HashMap::new();
    for name in function_names {
        if let Some(type_name) = name.strip_suffix("_deinit") {
            table.register(name);
            type_to_deinit.insert(type_name.to_string(), name.to_string());
        }
    }
    (table, type_to_deinit)
}

/// The per-type record stored in the module's data section (spec.md §3.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FullMetadata {
    pub type_id: u32,
    pub size: u32,
    pub destructor_table_index: u32,
}

pub fn build_full_metadata(
    types: impl Iterator<Item = (u32, String, u32)>, // (type_id, type_name, size)
    type_to_deinit: &HashMap<String, String>,
    table: &DestructorTable,
) -> HashMap<String, FullMetadata> {
    types
        .map(|(type_id, name, size)| {
            let destructor_table_index = type_to_deinit
                .get(&name)
                .and_then(|deinit| table.slot_for(deinit))
                .unwrap_or(0);
            (name, FullMetadata { type_id, size, destructor_table_index })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ssa::entities::Value as SsaValue;
    use cranelift_entity::EntityRef;

    fn v(i: u32) -> SsaValue {
        SsaValue::new(i as usize)
    }

    #[test]
    fn lifo_order_within_a_scope() {
        let mut stack = CleanupStack::new();
        stack.push_scope();
        stack.push_release(v(0));
        stack.push_release(v(1));
        let popped = stack.pop_scope();
        assert!(matches!(popped[0], Cleanup::Release(x) if x == v(1)));
        assert!(matches!(popped[1], Cleanup::Release(x) if x == v(0)));
    }

    #[test]
    fn destructor_table_reserves_slot_zero() {
        let names = ["main", "Point_deinit", "List_deinit"];
        let (table, map) = build_destructor_table(names.into_iter());
        assert_eq!(table.slot_for("Point_deinit"), Some(1));
        assert_eq!(table.slot_for("List_deinit"), Some(2));
        assert_eq!(map.get("Point"), Some(&"Point_deinit".to_string()));

        let meta = build_full_metadata(
            vec![(1, "Point".to_string(), 16), (2, "Other".to_string(), 8)].into_iter(),
            &map,
            &table,
        );
        assert_eq!(meta["Point"].destructor_table_index, 1);
        assert_eq!(meta["Other"].destructor_table_index, 0);
    }
}
