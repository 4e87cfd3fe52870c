//! Expression actions: constants, designators, operators and calls.
//!
//! All type checking for expressions lives here, including the numeric
//! promotion ladder (integer -> real -> double precision -> complex, widest
//! kind wins) and the insertion of implicit casts around the narrower
//! operand. The parser never inserts casts; precedence and associativity
//! stay independent of the type rules.

use num_bigint::BigInt;

use crate::decl::{DeclId, DeclKind, VarAttr};
use crate::errors::Level;
use crate::expr::{BinaryOp, BozKind, ConstantValue, Expr, ExprId, ExprKind, UnaryOp};
use crate::fold;
use crate::intrinsics::{ArgCount, IntrinsicKind};
use crate::source::SourceLocation;
use crate::types::{ArraySpec, BuiltinType, TypeId, TypeKind};

use super::Sema;

impl Sema {
    // Constants.

    pub fn act_on_int_constant(
        &mut self,
        loc: SourceLocation,
        end_loc: SourceLocation,
        text: &str,
        kind: Option<ExprId>,
    ) -> Option<ExprId> {
        let Some(value) = BigInt::parse_bytes(text.as_bytes(), 10) else {
            self.diags
                .report(Level::Error, loc, format!("invalid integer constant `{}`", text));
            return None;
        };
        let ty = self.constant_type(BuiltinType::Integer, kind);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Integer(value),
                kind,
                end_loc,
            },
            ty,
            loc,
        }))
    }

    pub fn act_on_real_constant(
        &mut self,
        loc: SourceLocation,
        end_loc: SourceLocation,
        text: &str,
        kind: Option<ExprId>,
    ) -> Option<ExprId> {
        // A `d` exponent selects double precision.
        let is_double = text.chars().any(|c| c == 'd' || c == 'D');
        let normalized: String = text
            .chars()
            .map(|c| match c {
                'd' | 'D' => 'e',
                c => c,
            })
            .collect();
        let Ok(value) = normalized.parse::<f64>() else {
            self.diags
                .report(Level::Error, loc, format!("invalid real constant `{}`", text));
            return None;
        };
        let base = if is_double {
            BuiltinType::DoublePrecision
        } else {
            BuiltinType::Real
        };
        let ty = self.constant_type(base, kind);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Real {
                    text: text.to_string(),
                    value,
                },
                kind,
                end_loc,
            },
            ty,
            loc,
        }))
    }

    /// `(re, im)` — both parts must be integer or real constant
    /// expressions; the element kind is the wider of the two real parts.
    pub fn act_on_complex_constant(
        &mut self,
        loc: SourceLocation,
        end_loc: SourceLocation,
        re: ExprId,
        im: ExprId,
    ) -> Option<ExprId> {
        let re_val = self.complex_part(re);
        let im_val = self.complex_part(im);
        let (re_val, im_val) = (re_val?, im_val?);

        let re_ty = self.ctx.expr(re).ty;
        let im_ty = self.ctx.expr(im).ty;
        let element = if self.ctx.is_real_type(re_ty) && self.ctx.is_real_type(im_ty) {
            if self.ctx.kind_bit_width(im_ty) > self.ctx.kind_bit_width(re_ty) {
                im_ty
            } else {
                re_ty
            }
        } else if self.ctx.is_real_type(im_ty) {
            im_ty
        } else if self.ctx.is_real_type(re_ty) {
            re_ty
        } else {
            self.ctx.real_ty
        };
        let ty = self.ctx.type_with_kind_of(BuiltinType::Complex, element);

        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Complex {
                    re: re_val,
                    im: im_val,
                },
                kind: None,
                end_loc,
            },
            ty,
            loc,
        }))
    }

    fn complex_part(&mut self, part: ExprId) -> Option<f64> {
        match fold::evaluate_as_real(&self.ctx, part) {
            Some(value) => Some(value),
            None => {
                let loc = self.ctx.expr(part).loc;
                self.diags.report(
                    Level::Error,
                    loc,
                    "expected an integer or real constant expression",
                );
                None
            }
        }
    }

    pub fn act_on_char_constant(
        &mut self,
        loc: SourceLocation,
        end_loc: SourceLocation,
        text: &str,
    ) -> Option<ExprId> {
        let len = self.ctx.int_constant_expr(text.len() as i64, loc);
        let ty = self.ctx.character_type(Some(len), None);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Character(text.to_string()),
                kind: None,
                end_loc,
            },
            ty,
            loc,
        }))
    }

    pub fn act_on_logical_constant(
        &mut self,
        loc: SourceLocation,
        end_loc: SourceLocation,
        value: bool,
        kind: Option<ExprId>,
    ) -> Option<ExprId> {
        let ty = self.constant_type(BuiltinType::Logical, kind);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Logical(value),
                kind,
                end_loc,
            },
            ty,
            loc,
        }))
    }

    /// A BOZ bit-pattern literal; typed as default integer until context
    /// gives it another meaning.
    pub fn act_on_boz_constant(
        &mut self,
        loc: SourceLocation,
        end_loc: SourceLocation,
        digits: &str,
        boz: BozKind,
    ) -> Option<ExprId> {
        let radix = match boz {
            BozKind::Binary => 2,
            BozKind::Octal => 8,
            BozKind::Hexadecimal => 16,
        };
        let Some(value) = BigInt::parse_bytes(digits.as_bytes(), radix) else {
            self.diags.report(
                Level::Error,
                loc,
                format!("invalid digit in BOZ constant `{}`", digits),
            );
            return None;
        };
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Boz { value, kind: boz },
                kind: None,
                end_loc,
            },
            ty: self.ctx.integer_ty,
            loc,
        }))
    }

    /// The type of a constant carrying an optional kind selector.
    fn constant_type(&mut self, base: BuiltinType, kind: Option<ExprId>) -> TypeId {
        match kind {
            Some(kind_expr) => match self.check_kind_selector_value(kind_expr, base) {
                Some(value) => self.ctx.type_with_kind(base, value),
                None => self.ctx.builtin_type(base),
            },
            None => self.ctx.builtin_type(base),
        }
    }

    /// Validates a constant's kind selector, returning the evaluated kind.
    fn check_kind_selector_value(&mut self, kind_expr: ExprId, base: BuiltinType) -> Option<i64> {
        let loc = self.ctx.expr(kind_expr).loc;
        let Some(value) = fold::evaluate_as_int(&self.ctx, kind_expr) else {
            self.diags.report(
                Level::Error,
                loc,
                "kind selector must be a constant integer expression",
            );
            return None;
        };
        if TypeKind::from_selector(base, value).is_none() {
            self.diags.report(
                Level::Error,
                loc,
                format!("invalid {} kind {}", base.name(), value),
            );
            return None;
        }
        Some(value)
    }

    // Designators.

    /// A bare identifier used as a primary.
    pub fn act_on_var_ref(&mut self, loc: SourceLocation, name: &str) -> Option<ExprId> {
        let name_id = self.ctx.idents.intern(name);
        match self.lookup(name_id) {
            Some(decl) => self.designate(loc, decl),
            None => {
                let decl = self.act_on_implicit_entity_decl(loc, name)?;
                self.designate(loc, decl)
            }
        }
    }

    fn designate(&mut self, loc: SourceLocation, decl: DeclId) -> Option<ExprId> {
        enum Target {
            Variable(TypeId),
            // The function name denotes the return slot inside its own
            // body, with the function's declared result type.
            ReturnSlot(TypeId),
            Function,
            Other,
        }
        let target = match &self.ctx.decl(decl).kind {
            DeclKind::Variable(vd) => Target::Variable(vd.ty),
            DeclKind::Function { result, .. } => {
                if self.current_subprogram() == Some(decl) {
                    Target::ReturnSlot(*result)
                } else {
                    Target::Function
                }
            }
            _ => Target::Other,
        };
        match target {
            Target::Variable(ty) => Some(self.ctx.alloc_expr(Expr {
                kind: ExprKind::Var(decl),
                ty,
                loc,
            })),
            Target::ReturnSlot(ty) => Some(self.ctx.alloc_expr(Expr {
                kind: ExprKind::ReturnedValue(decl),
                ty,
                loc,
            })),
            Target::Function => {
                let name = self.decl_name_text(decl);
                self.diags.report(
                    Level::Error,
                    loc,
                    format!("invalid use of function `{}`", name),
                );
                None
            }
            Target::Other => {
                let name = self.decl_name_text(decl);
                self.diags.report(
                    Level::Error,
                    loc,
                    format!("`{}` cannot be used as a variable", name),
                );
                None
            }
        }
    }

    fn decl_name_text(&self, decl: DeclId) -> String {
        self.ctx
            .decl(decl)
            .name
            .map(|n| self.ctx.idents.text(n).to_string())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    pub fn act_on_substring(
        &mut self,
        loc: SourceLocation,
        target: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
    ) -> Option<ExprId> {
        let target_ty = self.ctx.expr(target).ty;
        if !self.ctx.is_character_type(target_ty) {
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "expected a character expression, found {}",
                    self.ctx.display_type(target_ty)
                ),
            );
            return None;
        }
        let mut has_errors = false;
        for bound in [start, end].into_iter().flatten() {
            if !self.ctx.is_integer_type(self.ctx.expr(bound).ty) {
                let bound_loc = self.ctx.expr(bound).loc;
                self.diags
                    .report(Level::Error, bound_loc, "expected an integer expression");
                has_errors = true;
            }
        }
        if has_errors {
            return None;
        }

        // Omitted bounds default to 1 and the declared length; the result
        // length is known whenever both ends fold.
        let start_val = match start {
            Some(s) => fold::evaluate_as_int(&self.ctx, s),
            None => Some(1),
        };
        let end_val = match end {
            Some(e) => fold::evaluate_as_int(&self.ctx, e),
            None => self.ctx.character_length(target_ty),
        };
        let ty = match (start_val, end_val) {
            (Some(s), Some(e)) if e >= s => {
                let len = self.ctx.int_constant_expr(e - s + 1, loc);
                self.ctx.character_type(Some(len), None)
            }
            _ => self.ctx.character_ty,
        };

        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Substring { target, start, end },
            ty,
            loc,
        }))
    }

    pub fn act_on_array_element(
        &mut self,
        loc: SourceLocation,
        target: ExprId,
        subscripts: Vec<ExprId>,
    ) -> Option<ExprId> {
        let target_ty = self.ctx.expr(target).ty;
        let Some(array) = self.ctx.as_array_type(target_ty) else {
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "subscripted expression has non-array type {}",
                    self.ctx.display_type(target_ty)
                ),
            );
            return None;
        };
        let rank = array.dims.len();
        let element = array.element;
        if rank != subscripts.len() {
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "expected {} subscript{}, found {}",
                    rank,
                    if rank == 1 { "" } else { "s" },
                    subscripts.len()
                ),
            );
            return None;
        }

        // Subscripts are coerced to default integer.
        let mut coerced = Vec::with_capacity(subscripts.len());
        let mut has_errors = false;
        for sub in subscripts {
            let sub_ty = self.ctx.expr(sub).ty;
            if !self.ctx.is_integer_type(sub_ty) {
                let sub_loc = self.ctx.expr(sub).loc;
                self.diags
                    .report(Level::Error, sub_loc, "expected an integer expression");
                has_errors = true;
                coerced.push(sub);
            } else if self.ctx.arith_kind(sub_ty) != Some(TypeKind::Int4) {
                let cast = self.implicit_cast(self.ctx.integer_ty, sub);
                coerced.push(cast);
            } else {
                coerced.push(sub);
            }
        }
        if has_errors {
            return None;
        }

        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::ArrayElement {
                target,
                subscripts: coerced,
            },
            ty: element,
            loc,
        }))
    }

    // Operators.

    pub(crate) fn implicit_cast(&mut self, to: TypeId, expr: ExprId) -> ExprId {
        let loc = self.ctx.expr(expr).loc;
        self.ctx.alloc_expr(Expr {
            kind: ExprKind::ImplicitCast(expr),
            ty: to,
            loc,
        })
    }

    pub fn act_on_unary(
        &mut self,
        loc: SourceLocation,
        op: UnaryOp,
        operand: ExprId,
    ) -> Option<ExprId> {
        let operand_ty = self.ctx.expr(operand).ty;
        match op {
            UnaryOp::Plus | UnaryOp::Minus => {
                if !self.ctx.is_arithmetic_type(operand_ty) {
                    self.diags.report(
                        Level::Error,
                        loc,
                        format!(
                            "invalid operand to an arithmetic unary expression ({})",
                            self.ctx.display_type(operand_ty)
                        ),
                    );
                }
            }
            UnaryOp::Not => {
                if !self.ctx.is_logical_type(operand_ty) {
                    self.diags.report(
                        Level::Error,
                        loc,
                        format!(
                            "invalid operand to a logical unary expression ({})",
                            self.ctx.display_type(operand_ty)
                        ),
                    );
                }
            }
        }
        // The result keeps the operand's type, even after a diagnosed
        // operand mismatch.
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Unary { op, operand },
            ty: operand_ty,
            loc,
        }))
    }

    /// A user-defined unary operator `.name. expr`. Operator resolution is
    /// outside this subset, so the result type follows the operand.
    pub fn act_on_defined_unary(
        &mut self,
        loc: SourceLocation,
        name: &str,
        operand: ExprId,
    ) -> Option<ExprId> {
        let op = self.ctx.idents.intern(name);
        let ty = self.ctx.expr(operand).ty;
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::DefinedUnary { op, operand },
            ty,
            loc,
        }))
    }

    pub fn act_on_defined_binary(
        &mut self,
        loc: SourceLocation,
        name: &str,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Option<ExprId> {
        let op = self.ctx.idents.intern(name);
        let ty = self.ctx.expr(lhs).ty;
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::DefinedBinary { op, lhs, rhs },
            ty,
            loc,
        }))
    }

    pub fn act_on_binary(
        &mut self,
        loc: SourceLocation,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Option<ExprId> {
        let mut lhs = lhs;
        let mut rhs = rhs;
        let lhs_ty = self.ctx.expr(lhs).ty;
        let rhs_ty = self.ctx.expr(rhs).ty;

        let ty = if op.is_arithmetic() {
            if !self.ctx.is_arithmetic_type(lhs_ty) || !self.ctx.is_arithmetic_type(rhs_ty) {
                self.invalid_operands(loc, op, lhs_ty, rhs_ty);
                self.wider_operand_type(lhs_ty, rhs_ty)
            } else {
                self.check_double_and_complex(loc, op, lhs_ty, rhs_ty);
                self.arithmetic_result(op, &mut lhs, &mut rhs)
            }
        } else if op.is_logical() {
            if !self.ctx.is_logical_type(lhs_ty) || !self.ctx.is_logical_type(rhs_ty) {
                self.invalid_operands(loc, op, lhs_ty, rhs_ty);
            }
            self.ctx.logical_ty
        } else if op == BinaryOp::Concat {
            if !self.ctx.is_character_type(lhs_ty) || !self.ctx.is_character_type(rhs_ty) {
                self.invalid_operands(loc, op, lhs_ty, rhs_ty);
                self.ctx.character_ty
            } else {
                self.concat_result(loc, lhs_ty, rhs_ty)
            }
        } else {
            // Relational.
            self.relational_operands(loc, op, &mut lhs, &mut rhs);
            self.ctx.logical_ty
        };

        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Binary { op, lhs, rhs },
            ty,
            loc,
        }))
    }

    fn invalid_operands(&mut self, loc: SourceLocation, op: BinaryOp, lhs: TypeId, rhs: TypeId) {
        self.diags.report(
            Level::Error,
            loc,
            format!(
                "invalid operands to `{}` ({} and {})",
                op.spelling(),
                self.ctx.display_type(lhs),
                self.ctx.display_type(rhs)
            ),
        );
    }

    /// Operations mixing DOUBLE PRECISION with a single-precision COMPLEX
    /// are not permitted.
    fn check_double_and_complex(
        &mut self,
        loc: SourceLocation,
        op: BinaryOp,
        lhs_ty: TypeId,
        rhs_ty: TypeId,
    ) {
        let mixes = (self.ctx.is_double_precision_type(lhs_ty)
            && self.ctx.is_complex_type(rhs_ty)
            && !self.ctx.is_double_complex_type(rhs_ty))
            || (self.ctx.is_double_precision_type(rhs_ty)
                && self.ctx.is_complex_type(lhs_ty)
                && !self.ctx.is_double_complex_type(lhs_ty));
        if mixes {
            self.invalid_operands(loc, op, lhs_ty, rhs_ty);
        }
    }

    /// On an operand error the result falls back to the wider of the two
    /// operand types.
    fn wider_operand_type(&self, lhs_ty: TypeId, rhs_ty: TypeId) -> TypeId {
        let rank = |ty: TypeId| -> u32 {
            match self.ctx.builtin_of(ty) {
                Some(BuiltinType::Integer) => 1,
                Some(BuiltinType::Real) => 2,
                Some(BuiltinType::DoublePrecision) => 3,
                Some(BuiltinType::Complex) => 4,
                _ => 0,
            }
        };
        if rank(rhs_ty) > rank(lhs_ty) {
            rhs_ty
        } else {
            lhs_ty
        }
    }

    /// The conversion matrix for arithmetic operators: the ladder is
    /// integer -> real -> complex, the wider kind wins, and the narrower
    /// operand gets an implicit cast. For `**` an integer exponent is left
    /// uncast.
    fn arithmetic_result(&mut self, op: BinaryOp, lhs: &mut ExprId, rhs: &mut ExprId) -> TypeId {
        let lhs_ty = self.ctx.expr(*lhs).ty;
        let rhs_ty = self.ctx.expr(*rhs).ty;
        let lhs_int = self.ctx.is_integer_type(lhs_ty);
        let rhs_int = self.ctx.is_integer_type(rhs_ty);
        let lhs_complex = self.ctx.is_complex_type(lhs_ty);
        let rhs_complex = self.ctx.is_complex_type(rhs_ty);

        if lhs_int {
            if rhs_int {
                return self.select_largest_kind(lhs, rhs);
            }
            let cast = self.implicit_cast(rhs_ty, *lhs);
            *lhs = cast;
            return rhs_ty;
        }
        if rhs_int {
            if op != BinaryOp::Power {
                let cast = self.implicit_cast(lhs_ty, *rhs);
                *rhs = cast;
            }
            return lhs_ty;
        }
        if lhs_complex == rhs_complex {
            // real/real or complex/complex.
            return self.select_largest_kind(lhs, rhs);
        }
        // One side real, the other complex: the result is complex with the
        // larger kind.
        let (complex_expr, complex_ty, real_expr, real_ty) = if lhs_complex {
            (*lhs, lhs_ty, *rhs, rhs_ty)
        } else {
            (*rhs, rhs_ty, *lhs, lhs_ty)
        };
        let result = if self.ctx.kind_bit_width(complex_ty) >= self.ctx.kind_bit_width(real_ty) {
            complex_ty
        } else {
            self.ctx.type_with_kind_of(BuiltinType::Complex, real_ty)
        };
        let new_real = self.implicit_cast(result, real_expr);
        let new_complex = if result == complex_ty {
            complex_expr
        } else {
            self.implicit_cast(result, complex_expr)
        };
        if lhs_complex {
            *lhs = new_complex;
            *rhs = new_real;
        } else {
            *lhs = new_real;
            *rhs = new_complex;
        }
        result
    }

    /// For operands of the same type class: the result takes the larger
    /// kind, and the narrower operand is cast.
    fn select_largest_kind(&mut self, lhs: &mut ExprId, rhs: &mut ExprId) -> TypeId {
        let lhs_ty = self.ctx.expr(*lhs).ty;
        let rhs_ty = self.ctx.expr(*rhs).ty;
        let lhs_kind = self.ctx.arith_kind(lhs_ty);
        let rhs_kind = self.ctx.arith_kind(rhs_ty);
        if lhs_kind == rhs_kind {
            return lhs_ty;
        }
        if self.ctx.kind_bit_width(lhs_ty) >= self.ctx.kind_bit_width(rhs_ty) {
            let cast = self.implicit_cast(lhs_ty, *rhs);
            *rhs = cast;
            lhs_ty
        } else {
            let cast = self.implicit_cast(rhs_ty, *lhs);
            *lhs = cast;
            rhs_ty
        }
    }

    /// Concatenation requires character operands of the same kind; the
    /// result length is the sum of the operand lengths when both are known.
    fn concat_result(&mut self, loc: SourceLocation, lhs_ty: TypeId, rhs_ty: TypeId) -> TypeId {
        let lhs_len = self.ctx.character_length(lhs_ty);
        let rhs_len = self.ctx.character_length(rhs_ty);
        match (lhs_len, rhs_len) {
            (Some(a), Some(b)) => {
                let len = self.ctx.int_constant_expr(a + b, loc);
                self.ctx.character_type(Some(len), None)
            }
            _ => self.ctx.character_ty,
        }
    }

    fn relational_operands(
        &mut self,
        loc: SourceLocation,
        op: BinaryOp,
        lhs: &mut ExprId,
        rhs: &mut ExprId,
    ) {
        let lhs_ty = self.ctx.expr(*lhs).ty;
        let rhs_ty = self.ctx.expr(*rhs).ty;

        if self.ctx.is_character_type(lhs_ty) && self.ctx.is_character_type(rhs_ty) {
            return;
        }
        if !self.ctx.is_arithmetic_type(lhs_ty) || !self.ctx.is_arithmetic_type(rhs_ty) {
            self.invalid_operands(loc, op, lhs_ty, rhs_ty);
            return;
        }

        // A complex operand is permitted only for == and /=, and never
        // against DOUBLE PRECISION.
        if self.ctx.is_complex_type(lhs_ty) || self.ctx.is_complex_type(rhs_ty) {
            if op != BinaryOp::Equal && op != BinaryOp::NotEqual {
                self.invalid_operands(loc, op, lhs_ty, rhs_ty);
                return;
            }
            if self.ctx.is_double_precision_type(lhs_ty)
                || self.ctx.is_double_precision_type(rhs_ty)
            {
                self.invalid_operands(loc, op, lhs_ty, rhs_ty);
                return;
            }
        }

        self.arithmetic_result(op, lhs, rhs);
    }

    /// Typechecks `rhs` against an assignment target of type `lhs_ty`,
    /// inserting the numeric conversion when one is needed.
    pub(crate) fn typecheck_assignment(
        &mut self,
        lhs_ty: TypeId,
        rhs: ExprId,
        loc: SourceLocation,
    ) -> Option<ExprId> {
        let rhs_ty = self.ctx.expr(rhs).ty;
        let rhs_arith = self.ctx.is_arithmetic_type(rhs_ty);

        if self.ctx.is_integer_type(lhs_ty)
            || self.ctx.is_real_type(lhs_ty)
            || self.ctx.is_complex_type(lhs_ty)
        {
            let same_class = self.ctx.type_class(lhs_ty) == self.ctx.type_class(rhs_ty);
            if same_class && self.ctx.arith_kind(lhs_ty) == self.ctx.arith_kind(rhs_ty) {
                return Some(rhs);
            }
            if rhs_arith {
                return Some(self.implicit_cast(lhs_ty, rhs));
            }
        } else if self.ctx.is_logical_type(lhs_ty) {
            if self.ctx.is_logical_type(rhs_ty) {
                return Some(rhs);
            }
        } else if self.ctx.is_character_type(lhs_ty) {
            // Length coercion of character assignment is the backend's
            // business; the analyzer only checks the class.
            if self.ctx.is_character_type(rhs_ty) {
                return Some(rhs);
            }
        }

        self.diags.report(
            Level::Error,
            loc,
            format!(
                "assigning to {} from incompatible type {}",
                self.ctx.display_type(lhs_ty),
                self.ctx.display_type(rhs_ty)
            ),
        );
        None
    }

    // Calls.

    pub fn act_on_call_expr(
        &mut self,
        loc: SourceLocation,
        function: DeclId,
        args: Vec<ExprId>,
    ) -> Option<ExprId> {
        let (result, is_function) = match &self.ctx.decl(function).kind {
            DeclKind::Function { result, .. } => (*result, true),
            _ => (self.ctx.real_ty, false),
        };
        if !is_function {
            let name = self.decl_name_text(function);
            self.diags.report(
                Level::Error,
                loc,
                format!("`{}` cannot be called as a function", name),
            );
            return None;
        }
        let args = self.check_call_arguments(loc, function, args);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::Call { function, args },
            ty: result,
            loc,
        }))
    }

    /// Binds arguments to parameters positionally. A numeric mismatch gets
    /// an implicit conversion unless the parameter is an output; anything
    /// else incompatible is an error.
    pub(crate) fn check_call_arguments(
        &mut self,
        loc: SourceLocation,
        function: DeclId,
        args: Vec<ExprId>,
    ) -> Vec<ExprId> {
        let (params, external) = match &self.ctx.decl(function).kind {
            DeclKind::Function { args, external, .. }
            | DeclKind::Subroutine { args, external, .. } => (args.clone(), *external),
            _ => (Vec::new(), false),
        };

        // The parameters of an external procedure are inferred from the
        // first call site.
        if external && params.is_empty() && !args.is_empty() {
            let mut inferred = Vec::with_capacity(args.len());
            for &arg in &args {
                let ty = self.ctx.expr(arg).ty;
                let arg_loc = self.ctx.expr(arg).loc;
                let decl = self.ctx.alloc_decl(crate::decl::Decl {
                    kind: DeclKind::Variable(crate::decl::VarDecl {
                        ty,
                        attrs: VarAttr::Argument.into(),
                        intent: None,
                        init: None,
                        implicit: true,
                    }),
                    loc: arg_loc,
                    name: None,
                    parent: Some(function),
                });
                inferred.push(decl);
            }
            match &mut self.ctx.decl_mut(function).kind {
                DeclKind::Function { args, .. } | DeclKind::Subroutine { args, .. } => {
                    *args = inferred.clone();
                }
                _ => {}
            }
            return args;
        }

        if params.len() != args.len() {
            let name = self.decl_name_text(function);
            let how = if args.len() < params.len() {
                "few"
            } else {
                "many"
            };
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "too {} arguments to `{}`: expected {}, found {}",
                    how,
                    name,
                    params.len(),
                    args.len()
                ),
            );
            return args;
        }

        let mut bound = Vec::with_capacity(args.len());
        for (&param, arg) in params.iter().zip(args) {
            let param_decl = self.ctx.decl(param).clone();
            let Some(vd) = param_decl.as_variable() else {
                bound.push(arg);
                continue;
            };
            let param_ty = vd.ty;
            let arg_ty = self.ctx.expr(arg).ty;
            if self.ctx.same_type_and_kind(param_ty, arg_ty) {
                bound.push(arg);
                continue;
            }
            let numeric =
                self.ctx.is_arithmetic_type(param_ty) && self.ctx.is_arithmetic_type(arg_ty);
            let writable_out = matches!(vd.intent, Some(crate::types::Intent::Out));
            if numeric && !writable_out {
                bound.push(self.implicit_cast(param_ty, arg));
            } else if self.ctx.type_class(param_ty) == self.ctx.type_class(arg_ty)
                && self.ctx.type_class(param_ty).is_some()
            {
                // Same class, e.g. characters of differing length; length
                // adjustment is left to the callee.
                bound.push(arg);
            } else {
                let arg_loc = self.ctx.expr(arg).loc;
                self.diags.report(
                    Level::Error,
                    arg_loc,
                    format!(
                        "passing {} to a parameter of incompatible type {}",
                        self.ctx.display_type(arg_ty),
                        self.ctx.display_type(param_ty)
                    ),
                );
                bound.push(arg);
            }
        }
        bound
    }

    /// A call to an intrinsic with a compile-time-known identity; the
    /// result type is computed from the argument types.
    pub fn act_on_intrinsic_call(
        &mut self,
        loc: SourceLocation,
        function: IntrinsicKind,
        args: Vec<ExprId>,
    ) -> Option<ExprId> {
        if !self.check_intrinsic_arg_count(loc, function, &args) {
            return None;
        }
        let result = self.intrinsic_result_type(loc, function, &args);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::IntrinsicCall { function, args },
            ty: result,
            loc,
        }))
    }

    fn check_intrinsic_arg_count(
        &mut self,
        loc: SourceLocation,
        function: IntrinsicKind,
        args: &[ExprId],
    ) -> bool {
        let (ok, expected) = match function.arg_count() {
            ArgCount::One => (args.len() == 1, "1"),
            ArgCount::Two => (args.len() == 2, "2"),
            ArgCount::OneOrTwo => ((1..=2).contains(&args.len()), "1 or 2"),
            ArgCount::TwoOrMore => (args.len() >= 2, "at least 2"),
        };
        if !ok {
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "intrinsic `{}` expects {} argument{}, found {}",
                    function.name(),
                    expected,
                    if expected == "1" { "" } else { "s" },
                    args.len()
                ),
            );
        }
        ok
    }

    fn expect_arg(&mut self, arg: ExprId, wanted: &str, pred: bool) {
        if !pred {
            let loc = self.ctx.expr(arg).loc;
            let found = self.ctx.display_type(self.ctx.expr(arg).ty);
            self.diags.report(
                Level::Error,
                loc,
                format!("expected {} argument, found {}", wanted, found),
            );
        }
    }

    fn intrinsic_result_type(
        &mut self,
        _loc: SourceLocation,
        function: IntrinsicKind,
        args: &[ExprId],
    ) -> TypeId {
        use IntrinsicKind::*;
        let first = args[0];
        let first_ty = self.ctx.expr(first).ty;
        match function {
            // Conversions to integer; an optional second argument selects
            // the kind, e.g. INT(x, 8).
            Int | Ifix | Idint => {
                self.expect_arg(
                    first,
                    "an arithmetic",
                    self.ctx.is_arithmetic_type(first_ty),
                );
                if function == Ifix {
                    self.expect_arg(first, "a default REAL", self.ctx.is_real_type(first_ty));
                } else if function == Idint {
                    self.expect_arg(
                        first,
                        "a DOUBLE PRECISION",
                        self.ctx.is_double_precision_type(first_ty),
                    );
                }
                match args.get(1) {
                    Some(&kind_arg) => self.kind_argument_type(BuiltinType::Integer, kind_arg),
                    None => self.ctx.integer_ty,
                }
            }
            Real | Float | Sngl => {
                self.expect_arg(
                    first,
                    "an arithmetic",
                    self.ctx.is_arithmetic_type(first_ty),
                );
                if function == Float {
                    self.expect_arg(first, "an INTEGER", self.ctx.is_integer_type(first_ty));
                } else if function == Sngl {
                    self.expect_arg(
                        first,
                        "a DOUBLE PRECISION",
                        self.ctx.is_double_precision_type(first_ty),
                    );
                }
                match (function, args.get(1)) {
                    (Real, Some(&kind_arg)) => self.kind_argument_type(BuiltinType::Real, kind_arg),
                    _ => self.ctx.real_ty,
                }
            }
            Dble => {
                self.expect_arg(
                    first,
                    "an arithmetic",
                    self.ctx.is_arithmetic_type(first_ty),
                );
                self.ctx.double_precision_ty
            }
            Cmplx => {
                self.expect_arg(
                    first,
                    "an arithmetic",
                    self.ctx.is_arithmetic_type(first_ty),
                );
                if let Some(&im) = args.get(1) {
                    let im_ty = self.ctx.expr(im).ty;
                    self.expect_arg(im, "an arithmetic", self.ctx.is_arithmetic_type(im_ty));
                }
                self.ctx.complex_ty
            }
            Ichar => {
                self.expect_arg(first, "a CHARACTER", self.ctx.is_character_type(first_ty));
                self.ctx.integer_ty
            }
            Char => {
                self.expect_arg(first, "an INTEGER", self.ctx.is_integer_type(first_ty));
                self.ctx.character_ty
            }
            Aint | Anint => {
                self.expect_arg(first, "a REAL", self.ctx.is_real_type(first_ty));
                first_ty
            }
            Dint | Dnint => {
                self.expect_arg(
                    first,
                    "a DOUBLE PRECISION",
                    self.ctx.is_double_precision_type(first_ty),
                );
                first_ty
            }
            Nint => {
                self.expect_arg(first, "a REAL", self.ctx.is_real_type(first_ty));
                self.ctx.integer_ty
            }
            Idnint => {
                self.expect_arg(
                    first,
                    "a DOUBLE PRECISION",
                    self.ctx.is_double_precision_type(first_ty),
                );
                self.ctx.integer_ty
            }
            Abs => {
                self.expect_arg(
                    first,
                    "an arithmetic",
                    self.ctx.is_arithmetic_type(first_ty),
                );
                if self.ctx.is_complex_type(first_ty) {
                    self.ctx.type_with_kind_of(BuiltinType::Real, first_ty)
                } else {
                    first_ty
                }
            }
            Iabs => {
                self.expect_arg(first, "an INTEGER", self.ctx.is_integer_type(first_ty));
                first_ty
            }
            Dabs => {
                self.expect_arg(
                    first,
                    "a DOUBLE PRECISION",
                    self.ctx.is_double_precision_type(first_ty),
                );
                first_ty
            }
            Cabs => {
                self.expect_arg(first, "a COMPLEX", self.ctx.is_complex_type(first_ty));
                self.ctx.type_with_kind_of(BuiltinType::Real, first_ty)
            }
            Mod | Max | Min => {
                self.expect_arg(
                    first,
                    "an integer or real",
                    self.ctx.is_integer_type(first_ty) || self.ctx.is_real_type(first_ty),
                );
                for &other in &args[1..] {
                    let other_ty = self.ctx.expr(other).ty;
                    self.expect_arg(
                        other,
                        "a matching",
                        self.ctx.type_class(other_ty) == self.ctx.type_class(first_ty),
                    );
                }
                first_ty
            }
            Aimag => {
                self.expect_arg(first, "a COMPLEX", self.ctx.is_complex_type(first_ty));
                self.ctx.type_with_kind_of(BuiltinType::Real, first_ty)
            }
            Conjg => {
                self.expect_arg(first, "a COMPLEX", self.ctx.is_complex_type(first_ty));
                first_ty
            }
            Sqrt | Exp | Log | Sin | Cos => {
                self.expect_arg(
                    first,
                    "a real or complex",
                    self.ctx.is_real_type(first_ty) || self.ctx.is_complex_type(first_ty),
                );
                if self.ctx.is_integer_type(first_ty) {
                    self.ctx.real_ty
                } else {
                    first_ty
                }
            }
            Dsqrt => {
                self.expect_arg(
                    first,
                    "a DOUBLE PRECISION",
                    self.ctx.is_double_precision_type(first_ty),
                );
                first_ty
            }
            Alog | Alog10 => {
                self.expect_arg(
                    first,
                    "a default REAL",
                    self.ctx.is_real_type(first_ty)
                        && !self.ctx.is_double_precision_type(first_ty),
                );
                first_ty
            }
            Log10 | Tan | Asin | Acos | Atan | Sinh | Cosh | Tanh => {
                self.expect_arg(first, "a REAL", self.ctx.is_real_type(first_ty));
                first_ty
            }
            Atan2 => {
                self.expect_arg(first, "a REAL", self.ctx.is_real_type(first_ty));
                let second = args[1];
                let second_ty = self.ctx.expr(second).ty;
                self.expect_arg(second, "a REAL", self.ctx.is_real_type(second_ty));
                first_ty
            }
            Len | LenTrim => {
                self.expect_arg(first, "a CHARACTER", self.ctx.is_character_type(first_ty));
                self.ctx.integer_ty
            }
            Index => {
                self.expect_arg(first, "a CHARACTER", self.ctx.is_character_type(first_ty));
                let second = args[1];
                let second_ty = self.ctx.expr(second).ty;
                self.expect_arg(second, "a CHARACTER", self.ctx.is_character_type(second_ty));
                self.ctx.integer_ty
            }
            Lge | Lgt | Lle | Llt => {
                for &arg in &args[..2] {
                    let arg_ty = self.ctx.expr(arg).ty;
                    self.expect_arg(arg, "a CHARACTER", self.ctx.is_character_type(arg_ty));
                }
                self.ctx.logical_ty
            }
        }
    }

    /// The kind argument of a conversion intrinsic must fold to a
    /// supported kind; the fallback is the default kind.
    fn kind_argument_type(&mut self, base: BuiltinType, kind_arg: ExprId) -> TypeId {
        match self.check_kind_selector_value(kind_arg, base) {
            Some(value) => self.ctx.type_with_kind(base, value),
            None => self.ctx.builtin_type(base),
        }
    }

    /// `(/ item, ... /)` — all items must share one type class and kind;
    /// the array length is the sum of the item lengths.
    pub fn act_on_array_constructor(
        &mut self,
        loc: SourceLocation,
        items: Vec<ExprId>,
    ) -> Option<ExprId> {
        if items.is_empty() {
            self.diags
                .report(Level::Error, loc, "array constructor cannot be empty");
            return None;
        }
        let element = self.item_element_type(items[0]);
        for &item in &items[1..] {
            let item_elem = self.item_element_type(item);
            if !self.ctx.same_type_and_kind(element, item_elem) {
                let item_loc = self.ctx.expr(item).loc;
                self.diags.report(
                    Level::Error,
                    item_loc,
                    format!(
                        "array constructor item of type {} does not match {}",
                        self.ctx.display_type(item_elem),
                        self.ctx.display_type(element)
                    ),
                );
            }
        }

        let mut total: Option<i64> = Some(0);
        for &item in &items {
            total = match (total, self.item_length(item)) {
                (Some(sum), Some(len)) => Some(sum + len),
                _ => None,
            };
        }
        let spec = match total {
            Some(len) => {
                let upper = self.ctx.int_constant_expr(len, loc);
                self.ctx.alloc_array_spec(ArraySpec::ExplicitShape {
                    lower: None,
                    upper,
                })
            }
            None => self.ctx.alloc_array_spec(ArraySpec::ImpliedShape {
                lower: None,
                star_loc: loc,
            }),
        };
        let ty = self.ctx.array_type(element, vec![spec]);

        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::ArrayConstructor { items },
            ty,
            loc,
        }))
    }

    fn item_element_type(&self, item: ExprId) -> TypeId {
        self.ctx.element_type(self.ctx.expr(item).ty)
    }

    /// How many values an item contributes: an implied-do yields its trip
    /// count times its body size.
    pub(crate) fn item_length(&self, item: ExprId) -> Option<i64> {
        match &self.ctx.expr(item).kind {
            ExprKind::ImpliedDo {
                body,
                init,
                terminal,
                increment,
                ..
            } => {
                let init = fold::evaluate_as_int(&self.ctx, *init)?;
                let terminal = fold::evaluate_as_int(&self.ctx, *terminal)?;
                let step = match increment {
                    Some(inc) => fold::evaluate_as_int(&self.ctx, *inc)?,
                    None => 1,
                };
                if step == 0 {
                    return None;
                }
                let trips = if step > 0 {
                    ((terminal - init) / step + 1).max(0)
                } else {
                    ((init - terminal) / (-step) + 1).max(0)
                };
                let mut nested = 0i64;
                for &e in body {
                    nested += self.item_length(e)?;
                }
                Some(trips * nested)
            }
            ExprKind::Repeated { count, .. } => fold::evaluate_as_int(&self.ctx, *count),
            _ => Some(1),
        }
    }
}
