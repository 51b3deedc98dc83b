//! Expression lowering.

use cot_ast::{BinOp, Expr, UnOp};
use cot_ssa::{BlockCall, BlockKind, FloatCC, IntCC, Op, Type, TypeIndex, Value};

use crate::LowerCtx;

impl LowerCtx {
    pub(crate) fn expr_type(&self, e: &Expr) -> TypeIndex {
        match e {
            Expr::IntLit(_, ty) | Expr::Var(_, ty) => *ty,
            Expr::FloatLit(..) => TypeIndex::F64,
            Expr::BoolLit(_) => TypeIndex::BOOL,
            Expr::StringLit(_) => TypeIndex::STRING,
            Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Field { ty, .. }
            | Expr::Switch { ty, .. }
            | Expr::New { ty, .. }
            | Expr::StructLit { ty, .. } => *ty,
            Expr::Len(_) => TypeIndex::I64,
        }
    }

    pub(crate) fn lower_expr(&mut self, e: &Expr) -> Value {
        match e {
            Expr::IntLit(v, ty) => self.append(Op::IConst(*v), *ty),
            Expr::FloatLit(v, ty) => self.append(Op::FConst(v.to_bits()), *ty),
            Expr::BoolLit(v) => self.append(Op::BoolConst(*v), TypeIndex::BOOL),
            Expr::StringLit(s) => {
                let lit = self.f.intern_string(s.clone());
                self.append(Op::ConstString(lit), TypeIndex::STRING)
            }
            Expr::Var(name, _) => *self
                .vars
                .get(name)
                .unwrap_or_else(|| panic!("unbound variable `{name}`")),
            Expr::Binary { op, lhs, rhs, ty } => self.lower_binary(*op, lhs, rhs, *ty),
            Expr::Unary { op, operand, ty } => self.lower_unary(*op, operand, *ty),
            Expr::Call { callee, args, ty } => {
                let args: Vec<Value> = args.iter().map(|a| self.lower_consumed(a)).collect();
                let v = self.append(Op::Call { callee: callee.clone(), args }, *ty);
                // A callee hands back an owned reference under Cot's calling
                // convention; the caller doesn't retain what it didn't copy.
                if self.f.types.is_arc_managed(*ty) {
                    self.fresh.insert(v);
                }
                v
            }
            Expr::Field { base, field, ty } => self.lower_field(base, field, *ty),
            Expr::New { ty, fields } => self.lower_new(*ty, fields),
            Expr::StructLit { ty, fields } => self.lower_new(*ty, fields),
            Expr::Switch { scrutinee, arms, ty } => self.lower_switch(scrutinee, arms, *ty),
            Expr::Len(inner) => {
                let v = self.lower_expr(inner);
                self.append(Op::StringLen(v), TypeIndex::I64)
            }
        }
    }

    /// Lowers `e` for a context that takes ownership of the result (a
    /// binding, a struct field, a call argument): retains it first unless
    /// it's already a fresh, uniquely-owned value (spec.md §4.3).
    pub(crate) fn lower_consumed(&mut self, e: &Expr) -> Value {
        let ty = self.expr_type(e);
        let v = self.lower_expr(e);
        self.retain_if_aliased(v, ty);
        v
    }

    pub(crate) fn retain_if_aliased(&mut self, v: Value, ty: TypeIndex) {
        if self.f.types.is_arc_managed(ty) {
            if self.fresh.remove(&v) {
                return;
            }
            self.append(Op::Retain(v), TypeIndex::VOID);
        }
    }

    fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, ty: TypeIndex) -> Value {
        let lty = self.expr_type(lhs);
        let a = self.lower_expr(lhs);
        let b = self.lower_expr(rhs);
        let is_float = matches!(self.f.types.lookup(lty), Type::Basic(b) if b.is_float());
        let is_signed = matches!(self.f.types.lookup(lty), Type::Basic(b) if b.is_signed());
        use BinOp::*;
        match op {
            Add if is_float => self.append(Op::FAdd(a, b), ty),
            Add => self.append(Op::IAdd(a, b), ty),
            Sub if is_float => self.append(Op::FSub(a, b), ty),
            Sub => self.append(Op::ISub(a, b), ty),
            Mul if is_float => self.append(Op::FMul(a, b), ty),
            Mul => self.append(Op::IMul(a, b), ty),
            Div if is_float => self.append(Op::FDiv(a, b), ty),
            Div if is_signed => self.append(Op::SDiv(a, b), ty),
            Div => self.append(Op::UDiv(a, b), ty),
            Eq if is_float => self.append(Op::FCmp(FloatCC::Eq, a, b), TypeIndex::BOOL),
            Eq => self.append(Op::ICmp(IntCC::Eq, a, b), TypeIndex::BOOL),
            Ne if is_float => self.append(Op::FCmp(FloatCC::Ne, a, b), TypeIndex::BOOL),
            Ne => self.append(Op::ICmp(IntCC::Ne, a, b), TypeIndex::BOOL),
            Lt if is_float => self.append(Op::FCmp(FloatCC::Lt, a, b), TypeIndex::BOOL),
            Lt if is_signed => self.append(Op::ICmp(IntCC::SignedLt, a, b), TypeIndex::BOOL),
            Lt => self.append(Op::ICmp(IntCC::UnsignedLt, a, b), TypeIndex::BOOL),
            Le if is_float => self.append(Op::FCmp(FloatCC::Le, a, b), TypeIndex::BOOL),
            Le if is_signed => self.append(Op::ICmp(IntCC::SignedLe, a, b), TypeIndex::BOOL),
            Le => self.append(Op::ICmp(IntCC::UnsignedLe, a, b), TypeIndex::BOOL),
            Gt if is_float => self.append(Op::FCmp(FloatCC::Gt, a, b), TypeIndex::BOOL),
            Gt if is_signed => self.append(Op::ICmp(IntCC::SignedGt, a, b), TypeIndex::BOOL),
            Gt => self.append(Op::ICmp(IntCC::UnsignedGt, a, b), TypeIndex::BOOL),
            Ge if is_float => self.append(Op::FCmp(FloatCC::Ge, a, b), TypeIndex::BOOL),
            Ge if is_signed => self.append(Op::ICmp(IntCC::SignedGe, a, b), TypeIndex::BOOL),
            Ge => self.append(Op::ICmp(IntCC::UnsignedGe, a, b), TypeIndex::BOOL),
        }
    }

    fn lower_unary(&mut self, op: UnOp, operand: &Expr, ty: TypeIndex) -> Value {
        let oty = self.expr_type(operand);
        let v = self.lower_expr(operand);
        let is_float = matches!(self.f.types.lookup(oty), Type::Basic(b) if b.is_float());
        match op {
            UnOp::Neg if is_float => self.append(Op::FNeg(v), ty),
            UnOp::Neg => self.append(Op::INeg(v), ty),
            UnOp::Not => {
                let t = self.append(Op::BoolConst(true), TypeIndex::BOOL);
                self.append(Op::Xor(v, t), TypeIndex::BOOL)
            }
        }
    }

    fn lower_field(&mut self, base: &Expr, field: &str, ty: TypeIndex) -> Value {
        let base_ty = self.expr_type(base);
        let addr = self.lower_expr(base);
        let offset = self.field_offset(base_ty, field);
        let ptr_ty = self.ptr_type(ty);
        let field_addr = self.append(Op::FieldAddr { base: addr, offset }, ptr_ty);
        self.append(Op::Load { ty, addr: field_addr }, ty)
    }

    fn field_offset(&self, struct_ty: TypeIndex, field: &str) -> u32 {
        match self.f.types.lookup(struct_ty) {
            Type::Struct(s) => s
                .fields
                .iter()
                .find(|f| f.name == field)
                .map(|f| f.offset)
                .unwrap_or_else(|| panic!("unknown field `{field}`")),
            _ => panic!("field access on a non-struct type"),
        }
    }

    fn field_type(&self, struct_ty: TypeIndex, field: &str) -> TypeIndex {
        match self.f.types.lookup(struct_ty) {
            Type::Struct(s) => s
                .fields
                .iter()
                .find(|f| f.name == field)
                .map(|f| f.ty)
                .unwrap_or_else(|| panic!("unknown field `{field}`")),
            _ => panic!("field access on a non-struct type"),
        }
    }

    /// `new T{..}` and the plain `T{..}` struct-literal form both heap
    /// allocate and return the struct's address with a fresh, unique
    /// reference (spec.md §4.3): every nominal struct in this type system
    /// is ARC-managed, so there's no separate by-value struct path.
    fn lower_new(&mut self, ty: TypeIndex, fields: &[(String, Expr)]) -> Value {
        let size = self.f.types.size_of(ty);
        let type_name = match self.f.types.lookup(ty) {
            Type::Struct(s) => s.name.clone(),
            _ => panic!("`new`/struct literal on a non-struct type"),
        };
        let size_val = self.append(Op::IConst(size as i64), TypeIndex::I64);
        let addr = self.append(Op::Alloc { type_name, size: size_val }, ty);
        self.fresh.insert(addr);

        for (name, expr) in fields {
            let field_ty = self.field_type(ty, name);
            let offset = self.field_offset(ty, name);
            let fv = self.lower_consumed(expr);
            let ptr_ty = self.ptr_type(field_ty);
            let field_addr = self.append(Op::FieldAddr { base: addr, offset }, ptr_ty);
            self.append(Op::Store { addr: field_addr, value: fv }, TypeIndex::VOID);
        }
        addr
    }

    /// `switch` over a tagged union: loads the discriminant, dispatches on
    /// it, and for a binding arm loads the payload stored just past the
    /// tag (spec.md §3.3's tagged-union layout). Every value-producing arm
    /// joins through a phi, in the order its block's `jump` was wired
    /// (matching `join`'s predecessor order).
    fn lower_switch(
        &mut self,
        scrutinee: &Expr,
        arms: &[cot_ast::SwitchArm],
        result_ty: TypeIndex,
    ) -> Value {
        let union_ty = self.expr_type(scrutinee);
        let addr = self.lower_expr(scrutinee);
        let (tag_size, variants) = match self.f.types.lookup(union_ty) {
            Type::TaggedUnion(u) => (u.tag_size, u.variants.clone()),
            _ => panic!("switch on a non-tagged-union type"),
        };

        let tag_ptr_ty = self.ptr_type(TypeIndex::I32);
        let tag_addr = self.append(Op::FieldAddr { base: addr, offset: 0 }, tag_ptr_ty);
        let tag_val = self.append(Op::Load { ty: TypeIndex::I32, addr: tag_addr }, TypeIndex::I32);

        let join = self.f.create_block(BlockKind::Plain);
        let mut cases = Vec::with_capacity(arms.len());
        let mut arm_blocks = Vec::with_capacity(arms.len());
        for arm in arms {
            let blk = self.f.create_block(BlockKind::Plain);
            let variant_idx = variants
                .iter()
                .position(|(n, _)| n == &arm.variant)
                .unwrap_or_else(|| panic!("unknown switch variant `{}`", arm.variant))
                as i64;
            cases.push((variant_idx, BlockCall { block: blk, args: vec![] }));
            arm_blocks.push(blk);
        }
        let default_blk = self.f.create_block(BlockKind::Plain);
        self.append_term(Op::Switch {
            value: tag_val,
            cases,
            default: BlockCall { block: default_blk, args: vec![] },
        });

        self.cur = default_blk;
        self.append_term(Op::Unreachable);

        let mut arm_results = Vec::new();
        for (arm, &blk) in arms.iter().zip(arm_blocks.iter()) {
            self.cur = blk;
            if let Some(binding) = &arm.binding {
                let payload_ty = variants
                    .iter()
                    .find(|(n, _)| n == &arm.variant)
                    .and_then(|(_, t)| *t)
                    .unwrap_or_else(|| panic!("variant `{}` carries no payload", arm.variant));
                let payload_ptr_ty = self.ptr_type(payload_ty);
                let payload_addr =
                    self.append(Op::FieldAddr { base: addr, offset: tag_size }, payload_ptr_ty);
                let payload_val = self.append(Op::Load { ty: payload_ty, addr: payload_addr }, payload_ty);
                self.vars.insert(binding.clone(), payload_val);
            }
            let v = self.lower_expr(&arm.body);
            if !self.is_terminated() {
                self.append_term(Op::Jump(BlockCall { block: join, args: vec![] }));
                arm_results.push(v);
            }
        }

        self.cur = join;
        self.append(Op::Phi(arm_results), result_ty)
    }
}
