//! A minimal typed-AST surface.
//!
//! The scanner, parser, and type checker are external collaborators
//! (spec.md §1): this crate doesn't specify Cot's grammar or its
//! type-checking rules. It exists only so `cot-lower` has a concrete typed
//! tree to lower, enough to drive the end-to-end scenarios in spec.md §8
//! (S1–S6) and to exercise `cot-arc`'s cleanup-stack insertion. A real
//! frontend would hand the lowerer something structurally similar, already
//! type-checked, with every expression's `TypeIndex` resolved.

use cot_ssa::TypeIndex;

#[derive(Clone, Debug)]
pub struct Module {
    pub functions: Vec<FuncDecl>,
    pub structs: Vec<StructDecl>,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<(String, TypeIndex)>,
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<(String, TypeIndex)>,
    pub ret: TypeIndex,
    pub body: Block,
    /// `extern fn` declarations have no body and become Wasm imports
    /// (spec.md §6.2).
    pub is_extern: bool,
    pub is_public: bool,
    /// Populated for inline `test "name" { .. }` blocks (spec.md §6.4).
    pub test_name: Option<String>,
}

pub type Block = Vec<Stmt>;

#[derive(Clone, Debug)]
pub enum Stmt {
    Let { name: String, ty: TypeIndex, init: Expr },
    Assign { name: String, value: Expr },
    Return(Option<Expr>),
    If { cond: Expr, then: Block, else_: Option<Block> },
    While { cond: Expr, body: Block },
    Expr(Expr),
    /// Pushed onto the cleanup stack in declaration order, run LIFO at
    /// scope exit alongside ARC releases (spec.md §4.3, §9).
    Defer(Block),
    /// `@assert` inside a `test` block (spec.md §6.4).
    Assert(Expr),
}

#[derive(Clone, Debug)]
pub enum Expr {
    IntLit(i64, TypeIndex),
    FloatLit(f64, TypeIndex),
    BoolLit(bool),
    StringLit(String),
    Var(String, TypeIndex),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, ty: TypeIndex },
    Unary { op: UnOp, operand: Box<Expr>, ty: TypeIndex },
    Call { callee: String, args: Vec<Expr>, ty: TypeIndex },
    Field { base: Box<Expr>, field: String, ty: TypeIndex },
    /// `new T{ field: expr, .. }` — heap-allocates and ARC-manages `ty`.
    New { ty: TypeIndex, fields: Vec<(String, Expr)> },
    StructLit { ty: TypeIndex, fields: Vec<(String, Expr)> },
    Switch { scrutinee: Box<Expr>, arms: Vec<SwitchArm>, ty: TypeIndex },
    Len(Box<Expr>),
}

#[derive(Clone, Debug)]
pub struct SwitchArm {
    pub variant: String,
    pub binding: Option<String>,
    pub body: Expr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}
