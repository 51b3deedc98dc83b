//! Statement lowering: scopes, bindings, control flow, and the cleanup
//! emission that closes each one (spec.md §4.1, §4.3).

use std::collections::{HashMap, HashSet};

use cot_ast::{Expr, Stmt};
use cot_ssa::{BlockCall, BlockKind, Op, TypeIndex, Value};

use crate::LowerCtx;

impl LowerCtx {
    /// Lowers a `{ .. }` body as its own lexical scope: pushes before the
    /// first statement, pops (emitting releases/defers) once control falls
    /// off the end — skipped if some statement already terminated the
    /// block (`return`, or both arms of every nested `if` returning).
    pub(crate) fn lower_block(&mut self, stmts: &[Stmt]) {
        self.cleanup.push_scope();
        for stmt in stmts {
            if self.is_terminated() {
                break;
            }
            self.lower_stmt(stmt);
        }
        let pending = self.cleanup.pop_scope();
        if !self.is_terminated() {
            self.emit_cleanups(&pending);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, ty, init } => {
                let v = self.lower_consumed(init);
                if self.f.types.is_arc_managed(*ty) {
                    self.cleanup.push_release(v);
                }
                self.vars.insert(name.clone(), v);
            }
            Stmt::Assign { name, value } => self.lower_assign(name, value),
            Stmt::Return(expr) => self.lower_return(expr.as_ref()),
            Stmt::If { cond, then, else_ } => self.lower_if(cond, then, else_.as_deref()),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::Expr(e) => {
                self.lower_expr(e);
            }
            Stmt::Defer(body) => self.register_defer(body.clone()),
            Stmt::Assert(e) => self.lower_assert(e),
        }
    }

    /// `x = y`: retain-new, release-old, store, in that order (spec.md
    /// §4.3) so a self-assignment never drops the refcount to zero between
    /// the retain and the release. The cleanup stack's entry for `x` is
    /// forwarded to the new value rather than re-pushed, so scope exit
    /// releases the current binding exactly once.
    fn lower_assign(&mut self, name: &str, value: &Expr) {
        let old = *self
            .vars
            .get(name)
            .unwrap_or_else(|| panic!("assignment to unbound variable `{name}`"));
        let ty = self.f.value_type(old);
        let new_v = self.lower_consumed(value);
        if self.f.types.is_arc_managed(ty) {
            self.append(Op::Release(old), TypeIndex::VOID);
            self.cleanup.forward_release(old, new_v);
        }
        self.vars.insert(name.to_string(), new_v);
    }

    /// Runs every cleanup pending back through the function's outermost
    /// scope (not just the innermost one) before returning, since normal
    /// fallthrough would otherwise re-run them after a path that already
    /// exited (spec.md §4.3).
    fn lower_return(&mut self, expr: Option<&Expr>) {
        let vals = match expr {
            Some(e) => vec![self.lower_consumed(e)],
            None => vec![],
        };
        let pending: Vec<cot_arc::Cleanup> =
            self.cleanup.pending_through(0).into_iter().cloned().collect();
        self.emit_cleanups(&pending);
        self.f.set_block_kind(self.cur, BlockKind::Ret);
        self.append_term(Op::Return(vals));
    }

    fn lower_assert(&mut self, e: &Expr) {
        let cond = self.lower_expr(e);
        let ok = self.f.create_block(BlockKind::Plain);
        let trap = self.f.create_block(BlockKind::Plain);
        self.f.set_block_kind(self.cur, BlockKind::If);
        self.append_term(Op::Brif {
            cond,
            then: BlockCall { block: ok, args: vec![] },
            else_: BlockCall { block: trap, args: vec![] },
        });
        self.cur = trap;
        self.append_term(Op::Unreachable);
        self.cur = ok;
    }

    /// Lowers `if cond { then } else { else_ }`, merging variables the two
    /// arms assign differently with a phi in the live join block. A branch
    /// that unconditionally returns contributes no value and no
    /// predecessor edge to the join, exactly like Cranelift's builder
    /// handles a `return`-terminated arm of a diamond.
    fn lower_if(&mut self, cond: &Expr, then: &[Stmt], else_: Option<&[Stmt]>) {
        let cond_val = self.lower_expr(cond);
        let then_blk = self.f.create_block(BlockKind::Plain);
        let else_blk = self.f.create_block(BlockKind::Plain);
        let join_blk = self.f.create_block(BlockKind::Plain);

        self.f.set_block_kind(self.cur, BlockKind::If);
        self.append_term(Op::Brif {
            cond: cond_val,
            then: BlockCall { block: then_blk, args: vec![] },
            else_: BlockCall { block: else_blk, args: vec![] },
        });

        let vars_before = self.vars.clone();

        self.cur = then_blk;
        self.lower_block(then);
        let then_terminated = self.is_terminated();
        let then_vars = self.vars.clone();
        if !then_terminated {
            self.append_term(Op::Jump(BlockCall { block: join_blk, args: vec![] }));
        }

        self.vars = vars_before.clone();
        self.cur = else_blk;
        if let Some(else_stmts) = else_ {
            self.lower_block(else_stmts);
        }
        let else_terminated = self.is_terminated();
        let else_vars = self.vars.clone();
        if !else_terminated {
            self.append_term(Op::Jump(BlockCall { block: join_blk, args: vec![] }));
        }

        self.cur = join_blk;
        if then_terminated && else_terminated {
            return;
        }

        // `then`'s jump to `join` is wired before `else`'s (lowered first
        // above), so a two-arg phi's operands are [then_value, else_value].
        let mut merged = vars_before.clone();
        let names: HashSet<String> = then_vars.keys().chain(else_vars.keys()).cloned().collect();
        for name in names {
            let before = vars_before.get(&name).copied();
            let then_v = then_vars.get(&name).copied().or(before);
            let else_v = else_vars.get(&name).copied().or(before);
            let merged_v = match (then_terminated, else_terminated) {
                (true, false) => else_v,
                (false, true) => then_v,
                (false, false) => match (then_v, else_v) {
                    (Some(tv), Some(ev)) if tv == ev => Some(tv),
                    (Some(tv), Some(ev)) => {
                        let ty = self.f.value_type(tv);
                        Some(self.append(Op::Phi(vec![tv, ev]), ty))
                    }
                    _ => None,
                },
                (true, true) => unreachable!(),
            };
            if let Some(v) = merged_v {
                merged.insert(name, v);
            }
        }
        self.vars = merged;
    }

    /// Lowers `while cond { body }` with a single-back-edge loop header
    /// (spec.md §4.2's natural-loop shape): every name the body assigns
    /// becomes a phi in the header, seeded with a placeholder second
    /// operand that's patched once the body's final value for that name
    /// is known (mirroring `cranelift_frontend`'s incomplete-block phis,
    /// specialized to the one join Cot's structured `while` ever needs).
    fn lower_while(&mut self, cond: &Expr, body: &[Stmt]) {
        let carried = collect_assigned_names(body);

        let header = self.f.create_block(BlockKind::Loop);
        self.append_term(Op::Jump(BlockCall { block: header, args: vec![] }));

        self.cur = header;
        let mut phis: HashMap<String, (Value, Value)> = HashMap::new();
        for name in &carried {
            if let Some(&entry_v) = self.vars.get(name) {
                let ty = self.f.value_type(entry_v);
                let phi = self.append(Op::Phi(vec![entry_v, entry_v]), ty);
                phis.insert(name.clone(), (phi, entry_v));
                self.vars.insert(name.clone(), phi);
            }
        }

        let cond_val = self.lower_expr(cond);
        let body_blk = self.f.create_block(BlockKind::Plain);
        let after_blk = self.f.create_block(BlockKind::Plain);
        self.append_term(Op::Brif {
            cond: cond_val,
            then: BlockCall { block: body_blk, args: vec![] },
            else_: BlockCall { block: after_blk, args: vec![] },
        });

        self.cur = body_blk;
        self.lower_block(body);
        if !self.is_terminated() {
            let latch: Vec<(Value, Value, Value)> = phis
                .iter()
                .filter_map(|(name, &(phi, entry_v))| {
                    self.vars.get(name).map(|&lv| (phi, entry_v, lv))
                })
                .collect();
            for (phi, entry_v, lv) in latch {
                self.f.set_op(phi, Op::Phi(vec![entry_v, lv]));
            }
            self.append_term(Op::Jump(BlockCall { block: header, args: vec![] }));
        }

        self.cur = after_blk;
        for (name, &(phi, _)) in &phis {
            self.vars.insert(name.clone(), phi);
        }
    }
}

fn collect_assigned_names(stmts: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    fn walk(stmts: &[Stmt], names: &mut Vec<String>) {
        for s in stmts {
            match s {
                Stmt::Assign { name, .. } => {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                Stmt::If { then, else_, .. } => {
                    walk(then, names);
                    if let Some(e) = else_ {
                        walk(e, names);
                    }
                }
                Stmt::While { body, .. } => walk(body, names),
                Stmt::Defer(b) => walk(b, names),
                _ => {}
            }
        }
    }
    walk(stmts, &mut names);
    names
}
