//! The IR lowerer: typed AST (`cot-ast`) to the SSA [`cot_ssa::Function`]
//! representation, with ARC cleanups inserted as each scope is closed
//! (spec.md §4.1, §4.3).
//!
//! Modelled on `cranelift_frontend::FunctionBuilder`'s `use_var`/`def_var`:
//! a plain per-block map from source name to current SSA value stands in
//! for its "incomplete block" bookkeeping. Cot's frontend only ever lowers
//! structured control flow (no `goto`), so every join point's predecessor
//! set is known before the join block is sealed — there's no need for
//! `cranelift_frontend`'s deferred "ambiguous" phi patching for blocks
//! whose predecessors aren't known yet, except in the one place a back
//! edge genuinely isn't known up front: loop headers (see `lower_while`).
//!
//! Every composite-typed ([`cot_ssa::Type::Struct`] or
//! [`cot_ssa::Type::TaggedUnion`]) SSA value is, by convention, the address
//! of its storage. `new T{..}` allocates that storage and returns its
//! address; reading a composite-typed field loads the address that was
//! stored there. Scalars are loaded and stored by value as usual.

mod cleanup;
mod expr;
mod stmt;
mod types;

use std::collections::HashMap;

use cot_ast::{FuncDecl, Module};
use cot_arc::CleanupStack;
use cot_ssa::{Block, Function, TypeIndex, TypeRegistry, Value};

pub use types::build_type_registry;

/// Everything produced by lowering one [`Module`].
pub struct LoweredModule {
    pub types: TypeRegistry,
    pub struct_types: HashMap<String, TypeIndex>,
    pub functions: Vec<Function>,
}

/// Lowers every non-`extern` function in `module`. `extern fn` declarations
/// have no body to lower; the driver reads their signatures directly from
/// the AST to emit Wasm imports (spec.md §4.6, §6.2).
pub fn lower_module(module: &Module) -> LoweredModule {
    let (types, struct_types) = build_type_registry(module);
    let functions = module
        .functions
        .iter()
        .filter(|f| !f.is_extern)
        .map(|f| lower_function(f, &types))
        .collect();
    LoweredModule { types, struct_types, functions }
}

pub fn lower_function(decl: &FuncDecl, types: &TypeRegistry) -> Function {
    let mut f = Function::new(decl.name.clone());
    f.types = types.clone();
    f.param_types = decl.params.iter().map(|(_, ty)| *ty).collect();
    f.ret_type = decl.ret;

    let entry = f.create_block(cot_ssa::BlockKind::First);
    let mut ctx = LowerCtx {
        f,
        cur: entry,
        vars: HashMap::new(),
        cleanup: CleanupStack::new(),
        fresh: Default::default(),
        ptr_cache: HashMap::new(),
        defer_bodies: HashMap::new(),
    };

    for (i, (name, ty)) in decl.params.iter().enumerate() {
        let pos = cot_ssa::SourcePos::default();
        let v = ctx.f.append(ctx.cur, cot_ssa::Op::Param(i as u32), *ty, pos);
        ctx.vars.insert(name.clone(), v);
    }

    // `lower_block` brackets its own scope; the function body is the
    // outermost one, so no separate push/pop is needed here.
    ctx.lower_block(&decl.body);
    if !ctx.is_terminated() {
        ctx.f.set_block_kind(ctx.cur, cot_ssa::BlockKind::Ret);
        ctx.append_term(cot_ssa::Op::Return(vec![]));
    }

    ctx.f
}

/// Mutable lowering state for a single function.
struct LowerCtx {
    f: Function,
    cur: Block,
    /// Current SSA value bound to each source-level name.
    vars: HashMap<String, Value>,
    cleanup: CleanupStack,
    /// Values that are freshly-owned ARC references (just allocated or
    /// just returned from a call) and so don't need a `retain` before
    /// being stored into a binding or field — the opposite of a `Var`
    /// read, which aliases an existing owner and must be retained on copy.
    fresh: std::collections::HashSet<Value>,
    ptr_cache: HashMap<TypeIndex, TypeIndex>,
    /// `defer { .. }` bodies, keyed by the otherwise-unused `Block` handle
    /// minted to stand in for them on the cleanup stack (see `cleanup.rs`).
    defer_bodies: HashMap<Block, cot_ast::Block>,
}

impl LowerCtx {
    fn is_terminated(&self) -> bool {
        self.f.terminator(self.cur).is_some()
    }

    fn pos(&self) -> cot_ssa::SourcePos {
        cot_ssa::SourcePos::default()
    }

    fn append(&mut self, op: cot_ssa::Op, ty: TypeIndex) -> Value {
        let pos = self.pos();
        self.f.append(self.cur, op, ty, pos)
    }

    fn append_term(&mut self, op: cot_ssa::Op) {
        let pos = self.pos();
        self.f.append(self.cur, op, TypeIndex::VOID, pos);
    }

    /// Address-of-field-N pointer type, interned once per pointee.
    fn ptr_type(&mut self, pointee: TypeIndex) -> TypeIndex {
        if let Some(&t) = self.ptr_cache.get(&pointee) {
            return t;
        }
        let t = self.f.types.intern(cot_ssa::Type::Pointer { pointee });
        self.ptr_cache.insert(pointee, t);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_ast::{BinOp, Expr, FuncDecl, Stmt, StructDecl};
    use cot_ssa::Op;

    fn func(name: &str, params: Vec<(&str, TypeIndex)>, ret: TypeIndex, body: Vec<Stmt>) -> FuncDecl {
        FuncDecl {
            name: name.to_string(),
            params: params.into_iter().map(|(n, t)| (n.to_string(), t)).collect(),
            ret,
            body,
            is_extern: false,
            is_public: true,
            test_name: None,
        }
    }

    /// S1: a literal return lowers to one `iconst` and a `return`.
    #[test]
    fn literal_return() {
        let decl = func("answer", vec![], TypeIndex::I64, vec![Stmt::Return(Some(Expr::IntLit(42, TypeIndex::I64)))]);
        let types = TypeRegistry::new();
        let f = lower_function(&decl, &types);
        let entry = f.entry.unwrap();
        assert!(matches!(f.value_op(f.block_values(entry)[0]), Op::IConst(42)));
        assert!(matches!(f.value_op(*f.block_values(entry).last().unwrap()), Op::Return(_)));
    }

    /// S2: `let` binds the initializer's value; reading the binding reuses it.
    #[test]
    fn let_binding_and_read() {
        let decl = func(
            "twice",
            vec![("x", TypeIndex::I64)],
            TypeIndex::I64,
            vec![
                Stmt::Let {
                    name: "y".into(),
                    ty: TypeIndex::I64,
                    init: Expr::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Expr::Var("x".into(), TypeIndex::I64)),
                        rhs: Box::new(Expr::Var("x".into(), TypeIndex::I64)),
                        ty: TypeIndex::I64,
                    },
                },
                Stmt::Return(Some(Expr::Var("y".into(), TypeIndex::I64))),
            ],
        );
        let types = TypeRegistry::new();
        let f = lower_function(&decl, &types);
        let entry = f.entry.unwrap();
        let values = f.block_values(entry);
        assert!(matches!(f.value_op(values[0]), Op::Param(0)));
        assert!(matches!(f.value_op(values[1]), Op::IAdd(_, _)));
        assert!(matches!(f.value_op(values[2]), Op::Return(_)));
    }

    /// S3: a plain call.
    #[test]
    fn function_call() {
        let decl = func(
            "call_it",
            vec![],
            TypeIndex::I64,
            vec![Stmt::Return(Some(Expr::Call { callee: "helper".into(), args: vec![], ty: TypeIndex::I64 }))],
        );
        let types = TypeRegistry::new();
        let f = lower_function(&decl, &types);
        let entry = f.entry.unwrap();
        assert!(matches!(f.value_op(f.block_values(entry)[0]), Op::Call { .. }));
    }

    /// S4: string length reads through `Len`.
    #[test]
    fn string_length() {
        let decl = func(
            "string_len",
            vec![("s", TypeIndex::STRING)],
            TypeIndex::I64,
            vec![Stmt::Return(Some(Expr::Len(Box::new(Expr::Var("s".into(), TypeIndex::STRING)))))],
        );
        let types = TypeRegistry::new();
        let f = lower_function(&decl, &types);
        let entry = f.entry.unwrap();
        assert!(matches!(f.value_op(f.block_values(entry)[1]), Op::StringLen(_)));
    }

    /// S5: `new T{..}` allocates, stores fields, and releases at scope exit.
    #[test]
    fn new_struct_allocates_and_releases() {
        let module = Module {
            structs: vec![StructDecl { name: "Point".into(), fields: vec![("x".into(), TypeIndex::I64)] }],
            functions: vec![],
        };
        let (types, struct_types) = build_type_registry(&module);
        let point_ty = struct_types["Point"];
        let decl = func(
            "make_point",
            vec![],
            TypeIndex::VOID,
            vec![
                Stmt::Let {
                    name: "p".into(),
                    ty: point_ty,
                    init: Expr::New {
                        ty: point_ty,
                        fields: vec![("x".into(), Expr::IntLit(1, TypeIndex::I64))],
                    },
                },
                Stmt::Return(None),
            ],
        );
        let f = lower_function(&decl, &types);
        let entry = f.entry.unwrap();
        let ops: Vec<&Op> = f.block_values(entry).iter().map(|&v| f.value_op(v)).collect();
        assert!(ops.iter().any(|op| matches!(op, Op::Alloc { .. })));
        assert!(ops.iter().any(|op| matches!(op, Op::Store { .. })));
        assert!(ops.iter().any(|op| matches!(op, Op::Release(_))));
    }

    /// A reassigned ARC binding retains the new value and releases the old
    /// one before the scope-exit release runs (spec.md §4.3 reassignment
    /// order); the old binding's scope-exit cleanup must not fire too,
    /// which would double-release.
    #[test]
    fn reassignment_retains_new_releases_old_once() {
        let module = Module {
            structs: vec![StructDecl { name: "Box".into(), fields: vec![("v".into(), TypeIndex::I64)] }],
            functions: vec![],
        };
        let (types, struct_types) = build_type_registry(&module);
        let box_ty = struct_types["Box"];
        let decl = func(
            "rebind",
            vec![("a", box_ty), ("b", box_ty)],
            TypeIndex::VOID,
            vec![
                Stmt::Let { name: "cur".into(), ty: box_ty, init: Expr::Var("a".into(), box_ty) },
                Stmt::Assign { name: "cur".into(), value: Expr::Var("b".into(), box_ty) },
                Stmt::Return(None),
            ],
        );
        let f = lower_function(&decl, &types);
        let entry = f.entry.unwrap();
        let ops: Vec<&Op> = f.block_values(entry).iter().map(|&v| f.value_op(v)).collect();
        let retains = ops.iter().filter(|op| matches!(op, Op::Retain(_))).count();
        let releases = ops.iter().filter(|op| matches!(op, Op::Release(_))).count();
        // retain `a` into `cur`, retain `b` on reassignment = 2; release old
        // `cur` (== a) at reassignment, release `cur` (== b) at scope exit = 2.
        assert_eq!(retains, 2);
        assert_eq!(releases, 2);
    }

    /// `if`/`else` assigning a variable differently on each arm merges
    /// through a phi at the join block.
    #[test]
    fn if_else_merges_with_a_phi() {
        let decl = func(
            "abs",
            vec![("x", TypeIndex::I64)],
            TypeIndex::I64,
            vec![
                Stmt::Let { name: "r".into(), ty: TypeIndex::I64, init: Expr::Var("x".into(), TypeIndex::I64) },
                Stmt::If {
                    cond: Expr::Binary {
                        op: BinOp::Lt,
                        lhs: Box::new(Expr::Var("x".into(), TypeIndex::I64)),
                        rhs: Box::new(Expr::IntLit(0, TypeIndex::I64)),
                        ty: TypeIndex::BOOL,
                    },
                    then: vec![Stmt::Assign {
                        name: "r".into(),
                        value: Expr::Unary {
                            op: cot_ast::UnOp::Neg,
                            operand: Box::new(Expr::Var("x".into(), TypeIndex::I64)),
                            ty: TypeIndex::I64,
                        },
                    }],
                    else_: None,
                },
                Stmt::Return(Some(Expr::Var("r".into(), TypeIndex::I64))),
            ],
        );
        let types = TypeRegistry::new();
        let f = lower_function(&decl, &types);
        let join = f.entry.unwrap();
        let has_phi = f.blocks().any(|b| {
            f.block_values(b).iter().any(|&v| matches!(f.value_op(v), Op::Phi(args) if args.len() == 2))
        });
        assert!(has_phi);
        let _ = join;
    }

    /// `while` carries the loop variable through a header phi and patches
    /// its back-edge operand once the body's final value is known.
    #[test]
    fn while_loop_phi_has_both_operands_patched() {
        let decl = func(
            "sum_to",
            vec![("n", TypeIndex::I64)],
            TypeIndex::I64,
            vec![
                Stmt::Let { name: "i".into(), ty: TypeIndex::I64, init: Expr::IntLit(0, TypeIndex::I64) },
                Stmt::Let { name: "acc".into(), ty: TypeIndex::I64, init: Expr::IntLit(0, TypeIndex::I64) },
                Stmt::While {
                    cond: Expr::Binary {
                        op: BinOp::Lt,
                        lhs: Box::new(Expr::Var("i".into(), TypeIndex::I64)),
                        rhs: Box::new(Expr::Var("n".into(), TypeIndex::I64)),
                        ty: TypeIndex::BOOL,
                    },
                    body: vec![
                        Stmt::Assign {
                            name: "acc".into(),
                            value: Expr::Binary {
                                op: BinOp::Add,
                                lhs: Box::new(Expr::Var("acc".into(), TypeIndex::I64)),
                                rhs: Box::new(Expr::Var("i".into(), TypeIndex::I64)),
                                ty: TypeIndex::I64,
                            },
                        },
                        Stmt::Assign {
                            name: "i".into(),
                            value: Expr::Binary {
                                op: BinOp::Add,
                                lhs: Box::new(Expr::Var("i".into(), TypeIndex::I64)),
                                rhs: Box::new(Expr::IntLit(1, TypeIndex::I64)),
                                ty: TypeIndex::I64,
                            },
                        },
                    ],
                },
                Stmt::Return(Some(Expr::Var("acc".into(), TypeIndex::I64))),
            ],
        );
        let types = TypeRegistry::new();
        let f = lower_function(&decl, &types);
        let header = f
            .blocks()
            .find(|&b| matches!(f.block_kind(b), cot_ssa::BlockKind::Loop))
            .expect("loop header present");
        let phis: Vec<&Op> = f
            .block_values(header)
            .iter()
            .map(|&v| f.value_op(v))
            .filter(|op| op.is_phi())
            .collect();
        assert_eq!(phis.len(), 2); // `i` and `acc` are both loop-carried
        for phi in phis {
            if let Op::Phi(args) = phi {
                assert_eq!(args.len(), 2);
                assert_ne!(args[0], args[1], "back-edge operand must be patched, not left as the placeholder");
            }
        }
    }

    /// `switch` over a tagged union dispatches on the tag and loads a
    /// binding arm's payload from just past it.
    #[test]
    fn switch_dispatches_and_binds_payload() {
        let mut types = TypeRegistry::new();
        let union_ty = types.intern(cot_ssa::Type::TaggedUnion(cot_ssa::TaggedUnionType {
            name: "Result".into(),
            variants: vec![("Ok".into(), Some(TypeIndex::I64)), ("Err".into(), None)],
            tag_size: 4,
            max_payload_size: 8,
        }));
        let decl = func(
            "unwrap_or_zero",
            vec![("r", union_ty)],
            TypeIndex::I64,
            vec![Stmt::Return(Some(Expr::Switch {
                scrutinee: Box::new(Expr::Var("r".into(), union_ty)),
                arms: vec![
                    cot_ast::SwitchArm {
                        variant: "Ok".into(),
                        binding: Some("v".into()),
                        body: Expr::Var("v".into(), TypeIndex::I64),
                    },
                    cot_ast::SwitchArm {
                        variant: "Err".into(),
                        binding: None,
                        body: Expr::IntLit(0, TypeIndex::I64),
                    },
                ],
                ty: TypeIndex::I64,
            }))],
        );
        let f = lower_function(&decl, &types);
        let has_switch = f.blocks().any(|b| {
            f.block_values(b).iter().any(|&v| matches!(f.value_op(v), Op::Switch { .. }))
        });
        assert!(has_switch);
        let has_payload_load = f.blocks().any(|b| {
            f.block_values(b)
                .iter()
                .any(|&v| matches!(f.value_op(v), Op::FieldAddr { offset: 4, .. }))
        });
        assert!(has_payload_load);
    }
}
