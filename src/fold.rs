//! Constant expression evaluation.
//!
//! Folding covers arithmetic, logical and relational operators, character
//! concatenation, kind coercions and a limited set of intrinsic calls.
//! Integer arithmetic wraps two's-complement at the width of the
//! expression's kind; real arithmetic runs in `f64`, where overflow turns
//! into a signed infinity. Nothing here panics on bad input — an expression
//! that cannot be folded simply yields `None`.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::context::Context;
use crate::decl::DeclId;
use crate::expr::{BinaryOp, ConstantValue, ExprId, ExprKind, UnaryOp};
use crate::intrinsics::IntrinsicKind;

/// Loop-variable bindings active while evaluating a DATA implied-do body.
#[derive(Debug, Default)]
pub struct EvalScope {
    bindings: Vec<(DeclId, i64)>,
}

impl EvalScope {
    pub fn new() -> EvalScope {
        EvalScope::default()
    }

    pub fn assign(&mut self, var: DeclId, value: i64) {
        for slot in self.bindings.iter_mut() {
            if slot.0 == var {
                slot.1 = value;
                return;
            }
        }
        self.bindings.push((var, value));
    }

    pub fn lookup(&self, var: DeclId) -> Option<i64> {
        self.bindings
            .iter()
            .rev()
            .find(|(decl, _)| *decl == var)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Real(f64),
    Logical(bool),
    Str(String),
}

impl Value {
    fn as_real(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }
}

pub fn evaluate_as_int(ctx: &Context, expr: ExprId) -> Option<i64> {
    match eval(ctx, expr, None)? {
        Value::Int(v) => Some(v),
        _ => None,
    }
}

pub fn evaluate_as_int_with(ctx: &Context, expr: ExprId, scope: &EvalScope) -> Option<i64> {
    match eval(ctx, expr, Some(scope))? {
        Value::Int(v) => Some(v),
        _ => None,
    }
}

pub fn evaluate_as_real(ctx: &Context, expr: ExprId) -> Option<f64> {
    eval(ctx, expr, None)?.as_real()
}

pub fn evaluate_as_logical(ctx: &Context, expr: ExprId) -> Option<bool> {
    match eval(ctx, expr, None)? {
        Value::Logical(v) => Some(v),
        _ => None,
    }
}

pub fn evaluate_as_str(ctx: &Context, expr: ExprId) -> Option<String> {
    match eval(ctx, expr, None)? {
        Value::Str(v) => Some(v),
        _ => None,
    }
}

/// True if the expression folds to a value.
pub fn is_evaluable(ctx: &Context, expr: ExprId) -> bool {
    verify(ctx, expr, &mut None)
}

/// Collects the sub-expressions that prevent folding; if the expression is
/// opaque as a whole, the expression itself is the single entry.
pub fn gather_non_evaluable(ctx: &Context, expr: ExprId, out: &mut Vec<ExprId>) {
    verify(ctx, expr, &mut Some(out));
    if out.is_empty() && !is_evaluable(ctx, expr) {
        out.push(expr);
    }
}

fn verify(ctx: &Context, expr: ExprId, sink: &mut Option<&mut Vec<ExprId>>) -> bool {
    match &ctx.expr(expr).kind {
        ExprKind::Constant { .. } => true,
        ExprKind::Unary { operand, .. } => verify(ctx, *operand, sink),
        ExprKind::Binary { lhs, rhs, .. } => {
            let l = verify(ctx, *lhs, sink);
            let r = verify(ctx, *rhs, sink);
            l && r
        }
        ExprKind::ImplicitCast(inner) => verify(ctx, *inner, sink),
        ExprKind::Var(decl) => {
            let init = ctx
                .decl(*decl)
                .as_variable()
                .filter(|vd| vd.attrs.contains(crate::decl::VarAttr::Parameter))
                .and_then(|vd| vd.init);
            let is_const_var = match init {
                Some(init) => verify(ctx, init, sink),
                None => false,
            };
            if !is_const_var && init.is_none() {
                if let Some(out) = sink.as_mut() {
                    out.push(expr);
                }
            }
            is_const_var
        }
        ExprKind::IntrinsicCall { function, args } => {
            if !folds_intrinsic(*function) {
                if let Some(out) = sink.as_mut() {
                    out.push(expr);
                }
                return false;
            }
            let mut ok = true;
            for &arg in args {
                if !verify(ctx, arg, sink) {
                    ok = false;
                }
            }
            ok
        }
        _ => {
            if let Some(out) = sink.as_mut() {
                out.push(expr);
            }
            false
        }
    }
}

fn folds_intrinsic(kind: IntrinsicKind) -> bool {
    use IntrinsicKind::*;
    matches!(
        kind,
        Int | Ifix
            | Idint
            | Nint
            | Idnint
            | Abs
            | Iabs
            | Dabs
            | Mod
            | Max
            | Min
            | Ichar
            | Char
            | Len
            | LenTrim
            | Index
    )
}

/// Sign-extending truncation to `bits`.
fn wrap_to_width(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        value
    } else {
        (value << (64 - bits)) >> (64 - bits)
    }
}

/// Wraps a BigInt into an i64 the way two's-complement storage would.
fn bigint_to_i64(value: &BigInt) -> i64 {
    let masked = value & BigInt::from(u64::MAX);
    masked.to_u64().unwrap_or(0) as i64
}

/// Wraps an evaluated integer to the storage width of the expression type.
fn wrap_to_type(ctx: &Context, expr: ExprId, value: i64) -> i64 {
    if !ctx.is_integer_type(ctx.expr(expr).ty) {
        return value;
    }
    wrap_to_width(value, ctx.kind_bit_width(ctx.expr(expr).ty))
}

fn eval(ctx: &Context, expr: ExprId, scope: Option<&EvalScope>) -> Option<Value> {
    let node = ctx.expr(expr);
    match &node.kind {
        ExprKind::Constant { value, .. } => match value {
            ConstantValue::Integer(v) => {
                Some(Value::Int(wrap_to_type(ctx, expr, bigint_to_i64(v))))
            }
            ConstantValue::Real { value, .. } => Some(Value::Real(*value)),
            ConstantValue::Logical(v) => Some(Value::Logical(*v)),
            ConstantValue::Character(v) => Some(Value::Str(v.clone())),
            ConstantValue::Boz { value, .. } => {
                Some(Value::Int(wrap_to_type(ctx, expr, bigint_to_i64(value))))
            }
            ConstantValue::Complex { .. } => None,
        },
        ExprKind::Var(decl) => {
            if let Some(scope) = scope {
                if let Some(bound) = scope.lookup(*decl) {
                    return Some(Value::Int(bound));
                }
            }
            let vd = ctx.decl(*decl).as_variable()?;
            if !vd.attrs.contains(crate::decl::VarAttr::Parameter) {
                return None;
            }
            eval(ctx, vd.init?, scope)
        }
        ExprKind::Unary { op, operand } => {
            let v = eval(ctx, *operand, scope)?;
            match (op, v) {
                (UnaryOp::Plus, v) => Some(v),
                (UnaryOp::Minus, Value::Int(v)) => {
                    Some(Value::Int(wrap_to_type(ctx, expr, v.wrapping_neg())))
                }
                (UnaryOp::Minus, Value::Real(v)) => Some(Value::Real(-v)),
                (UnaryOp::Not, Value::Logical(v)) => Some(Value::Logical(!v)),
                _ => None,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = eval(ctx, *lhs, scope)?;
            let r = eval(ctx, *rhs, scope)?;
            eval_binary(ctx, expr, *op, l, r)
        }
        ExprKind::ImplicitCast(inner) => {
            let v = eval(ctx, *inner, scope)?;
            let dest = node.ty;
            if ctx.is_integer_type(dest) {
                let as_int = match v {
                    Value::Int(v) => v,
                    Value::Real(v) if v.is_finite() => v.trunc() as i64,
                    _ => return None,
                };
                Some(Value::Int(wrap_to_type(ctx, expr, as_int)))
            } else if ctx.is_real_type(dest) {
                Some(Value::Real(v.as_real()?))
            } else {
                // Logical and character casts carry the value through;
                // complex values are not folded.
                match v {
                    Value::Logical(_) | Value::Str(_) => Some(v),
                    _ => None,
                }
            }
        }
        ExprKind::IntrinsicCall { function, args } => {
            eval_intrinsic(ctx, expr, *function, args, scope)
        }
        _ => None,
    }
}

fn eval_binary(ctx: &Context, expr: ExprId, op: BinaryOp, l: Value, r: Value) -> Option<Value> {
    use BinaryOp::*;
    match op {
        Plus | Minus | Multiply | Divide | Power => match (l, r) {
            (Value::Int(a), Value::Int(b)) => {
                let raw = match op {
                    Plus => a.wrapping_add(b),
                    Minus => a.wrapping_sub(b),
                    Multiply => a.wrapping_mul(b),
                    Divide => {
                        if b == 0 {
                            return None;
                        }
                        a.wrapping_div(b)
                    }
                    Power => int_power(a, b)?,
                    _ => unreachable!(),
                };
                Some(Value::Int(wrap_to_type(ctx, expr, raw)))
            }
            (l, r) => {
                let a = l.as_real()?;
                let b = r.as_real()?;
                let v = match op {
                    Plus => a + b,
                    Minus => a - b,
                    Multiply => a * b,
                    Divide => a / b,
                    Power => a.powf(b),
                    _ => unreachable!(),
                };
                Some(Value::Real(v))
            }
        },
        Concat => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Some(Value::Str(a + &b)),
            _ => None,
        },
        Equal | NotEqual | LessThan | LessThanEqual | GreaterThan | GreaterThanEqual => {
            let ordering = match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                (l, r) => {
                    let a = l.as_real()?;
                    let b = r.as_real()?;
                    a.partial_cmp(&b)
                }
            }?;
            let v = match op {
                Equal => ordering.is_eq(),
                NotEqual => ordering.is_ne(),
                LessThan => ordering.is_lt(),
                LessThanEqual => ordering.is_le(),
                GreaterThan => ordering.is_gt(),
                GreaterThanEqual => ordering.is_ge(),
                _ => unreachable!(),
            };
            Some(Value::Logical(v))
        }
        And | Or | Eqv | Neqv => match (l, r) {
            (Value::Logical(a), Value::Logical(b)) => {
                let v = match op {
                    And => a && b,
                    Or => a || b,
                    Eqv => a == b,
                    Neqv => a != b,
                    _ => unreachable!(),
                };
                Some(Value::Logical(v))
            }
            _ => None,
        },
    }
}

/// Integer exponentiation with wrapping products; negative exponents follow
/// the source language (`i ** -n` is 0 unless `i` is 1 or -1).
fn int_power(base: i64, exp: i64) -> Option<i64> {
    if exp < 0 {
        return match base {
            0 => None,
            1 => Some(1),
            -1 => Some(if exp % 2 == 0 { 1 } else { -1 }),
            _ => Some(0),
        };
    }
    let mut result: i64 = 1;
    let mut square = base;
    let mut exp = exp as u64;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(square);
        }
        square = square.wrapping_mul(square);
        exp >>= 1;
    }
    Some(result)
}

fn eval_intrinsic(
    ctx: &Context,
    expr: ExprId,
    function: IntrinsicKind,
    args: &[ExprId],
    scope: Option<&EvalScope>,
) -> Option<Value> {
    use IntrinsicKind::*;
    let first = eval(ctx, *args.first()?, scope)?;
    match function {
        Int | Ifix | Idint => {
            let v = match first {
                Value::Int(v) => v,
                Value::Real(v) if v.is_finite() => v.trunc() as i64,
                _ => return None,
            };
            Some(Value::Int(wrap_to_type(ctx, expr, v)))
        }
        Nint | Idnint => {
            let v = first.as_real()?;
            if !v.is_finite() {
                return None;
            }
            Some(Value::Int(wrap_to_type(ctx, expr, v.round() as i64)))
        }
        Abs | Iabs | Dabs => match first {
            Value::Int(v) => Some(Value::Int(wrap_to_type(ctx, expr, v.wrapping_abs()))),
            Value::Real(v) => Some(Value::Real(v.abs())),
            _ => None,
        },
        Mod => {
            let second = eval(ctx, args.get(1).copied()?, scope)?;
            match (first, second) {
                (Value::Int(a), Value::Int(b)) => {
                    if b == 0 {
                        return None;
                    }
                    Some(Value::Int(wrap_to_type(ctx, expr, a.wrapping_rem(b))))
                }
                (l, r) => Some(Value::Real(l.as_real()? % r.as_real()?)),
            }
        }
        Max | Min => {
            let mut best = first;
            for &arg in &args[1..] {
                let v = eval(ctx, arg, scope)?;
                let replace = match (&v, &best) {
                    (Value::Int(a), Value::Int(b)) => {
                        if function == Max {
                            a > b
                        } else {
                            a < b
                        }
                    }
                    (a, b) => {
                        let a = a.as_real()?;
                        let b = b.as_real()?;
                        if function == Max {
                            a > b
                        } else {
                            a < b
                        }
                    }
                };
                if replace {
                    best = v;
                }
            }
            Some(best)
        }
        Ichar => match first {
            Value::Str(s) => Some(Value::Int(*s.as_bytes().first()? as i64)),
            _ => None,
        },
        Char => match first {
            Value::Int(v) if (0..=255).contains(&v) => {
                Some(Value::Str((v as u8 as char).to_string()))
            }
            _ => None,
        },
        Len => match first {
            Value::Str(s) => Some(Value::Int(s.len() as i64)),
            _ => None,
        },
        LenTrim => match first {
            Value::Str(s) => Some(Value::Int(s.trim_end_matches(' ').len() as i64)),
            _ => None,
        },
        Index => {
            let second = eval(ctx, args.get(1).copied()?, scope)?;
            match (first, second) {
                (Value::Str(s), Value::Str(sub)) => Some(Value::Int(
                    s.find(&sub).map(|pos| pos as i64 + 1).unwrap_or(0),
                )),
                _ => None,
            }
        }
        _ => None,
    }
}
