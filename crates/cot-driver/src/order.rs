//! Multi-file compilation ordering (spec.md §5): functions are compiled
//! in dependency order, imports resolved first, with cycles rejected via
//! a visited-set rather than silently accepted as mutual recursion.
//! Grounded on the same depth-first "visiting/visited" coloring
//! `cranelift`'s own frontends use to reject cyclic module imports, kept
//! here as plain graph code rather than folded into `cot-lower` since it
//! operates over whole compilation units, not one function body.

use std::collections::HashMap;

use crate::error::CompileError;

/// One source file's worth of declarations plus the names of other units
/// it imports from. `cot-ast` has no file-boundary concept of its own —
/// this is the driver's own bookkeeping layered on top of however many
/// [`cot_ast::Module`]s a build brings together.
pub struct CompilationUnit {
    pub name: String,
    pub imports: Vec<String>,
    pub module: cot_ast::Module,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Topologically orders `units` so every unit appears after everything it
/// imports. Rejects a cycle (including self-import) as a
/// [`CompileError`] rather than picking an arbitrary order, since a
/// cyclic import can't be resolved into "compile this one first."
pub fn resolve_order(units: Vec<CompilationUnit>) -> Result<Vec<CompilationUnit>, CompileError> {
    let by_name: HashMap<String, usize> = units.iter().enumerate().map(|(i, u)| (u.name.clone(), i)).collect();
    let mut marks: HashMap<usize, Mark> = HashMap::new();
    let mut order = Vec::new();

    for i in 0..units.len() {
        visit(i, &units, &by_name, &mut marks, &mut order)?;
    }

    let mut units = units.into_iter().map(Some).collect::<Vec<_>>();
    Ok(order.into_iter().map(|i| units[i].take().expect("each unit index appears once in topological order")).collect())
}

fn visit(
    i: usize,
    units: &[CompilationUnit],
    by_name: &HashMap<String, usize>,
    marks: &mut HashMap<usize, Mark>,
    order: &mut Vec<usize>,
) -> Result<(), CompileError> {
    match marks.get(&i) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(CompileError::user(format!("recursive import involving `{}`", units[i].name)));
        }
        None => {}
    }
    marks.insert(i, Mark::Visiting);
    for dep_name in &units[i].imports {
        let &dep = by_name
            .get(dep_name)
            .ok_or_else(|| CompileError::user(format!("`{}` imports unknown unit `{dep_name}`", units[i].name)))?;
        visit(dep, units, by_name, marks, order)?;
    }
    marks.insert(i, Mark::Done);
    order.push(i);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, imports: &[&str]) -> CompilationUnit {
        CompilationUnit {
            name: name.to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            module: cot_ast::Module { functions: vec![], structs: vec![] },
        }
    }

    #[test]
    fn a_unit_is_ordered_after_everything_it_imports() {
        let units = vec![unit("main", &["lib"]), unit("lib", &[])];
        let ordered = resolve_order(units).unwrap();
        let names: Vec<&str> = ordered.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["lib", "main"]);
    }

    #[test]
    fn a_cycle_is_rejected() {
        let units = vec![unit("a", &["b"]), unit("b", &["a"])];
        assert!(resolve_order(units).is_err());
    }

    #[test]
    fn a_self_import_is_rejected() {
        let units = vec![unit("a", &["a"])];
        assert!(resolve_order(units).is_err());
    }
}
