//! The expression tree.
//!
//! Expressions are immutable once constructed (the single exception is the
//! in-place resolution of transient unresolved identifiers inside DATA
//! implied-do bodies). Every expression carries its kind, result type and
//! source location; constants additionally carry an optional kind-selector
//! expression and a closing location.

use num_bigint::BigInt;

use crate::arena::ArenaId;
use crate::decl::DeclId;
use crate::ident::NameId;
use crate::intrinsics::IntrinsicKind;
use crate::source::SourceLocation;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ArenaId for ExprId {
    fn from_raw(raw: u32) -> Self {
        ExprId(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eqv,
    Neqv,
    Or,
    And,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Concat,
    Plus,
    Minus,
    Multiply,
    Divide,
    Power,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Plus
                | BinaryOp::Minus
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Power
        )
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Eqv | BinaryOp::Neqv
        )
    }

    pub fn spelling(self) -> &'static str {
        match self {
            BinaryOp::Eqv => ".EQV.",
            BinaryOp::Neqv => ".NEQV.",
            BinaryOp::Or => ".OR.",
            BinaryOp::And => ".AND.",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "/=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanEqual => ">=",
            BinaryOp::Concat => "//",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "**",
        }
    }
}

/// Radix of a BOZ bit-pattern literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BozKind {
    Binary,
    Octal,
    Hexadecimal,
}

/// Payload shared by the constant expression forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Integer(BigInt),
    /// Reals keep their source digits next to the parsed value so the
    /// backend can re-round at the declared kind.
    Real {
        text: String,
        value: f64,
    },
    Complex {
        re: f64,
        im: f64,
    },
    Character(String),
    Boz {
        value: BigInt,
        kind: BozKind,
    },
    Logical(bool),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Constant {
        value: ConstantValue,
        /// Optional kind-selector expression, e.g. the `8` in `1_8`.
        kind: Option<ExprId>,
        end_loc: SourceLocation,
    },
    /// A DATA value of the form `count*value`.
    Repeated {
        count: ExprId,
        value: ExprId,
    },
    Var(DeclId),
    /// The function name used as a designator for the return slot inside
    /// the function's own body.
    ReturnedValue(DeclId),
    /// A forward name reference inside a DATA implied-do body; resolved in
    /// place when the implied-do is constructed.
    Unresolved(NameId),
    Substring {
        target: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
    },
    ArrayElement {
        target: ExprId,
        subscripts: Vec<ExprId>,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    DefinedUnary {
        op: NameId,
        operand: ExprId,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    DefinedBinary {
        op: NameId,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// Analyzer-inserted numeric conversion; the destination type is the
    /// expression's own type.
    ImplicitCast(ExprId),
    Call {
        function: DeclId,
        args: Vec<ExprId>,
    },
    IntrinsicCall {
        function: IntrinsicKind,
        args: Vec<ExprId>,
    },
    ImpliedDo {
        var: DeclId,
        body: Vec<ExprId>,
        init: ExprId,
        terminal: ExprId,
        increment: Option<ExprId>,
    },
    ArrayConstructor {
        items: Vec<ExprId>,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub loc: SourceLocation,
}

impl Expr {
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant { .. })
    }

    pub fn constant_value(&self) -> Option<&ConstantValue> {
        match &self.kind {
            ExprKind::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// True for the expression forms that denote a storage location.
    pub fn is_designator(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Var(_)
                | ExprKind::ReturnedValue(_)
                | ExprKind::ArrayElement { .. }
                | ExprKind::Substring { .. }
        )
    }

    /// Appends the direct child expressions to `out`, in source order.
    pub fn collect_children(&self, out: &mut Vec<ExprId>) {
        match &self.kind {
            ExprKind::Constant { kind, .. } => {
                if let Some(k) = kind {
                    out.push(*k);
                }
            }
            ExprKind::Repeated { count, value } => {
                out.push(*count);
                out.push(*value);
            }
            ExprKind::Var(_) | ExprKind::ReturnedValue(_) | ExprKind::Unresolved(_) => {}
            ExprKind::Substring { target, start, end } => {
                out.push(*target);
                if let Some(s) = start {
                    out.push(*s);
                }
                if let Some(e) = end {
                    out.push(*e);
                }
            }
            ExprKind::ArrayElement { target, subscripts } => {
                out.push(*target);
                out.extend_from_slice(subscripts);
            }
            ExprKind::Unary { operand, .. } | ExprKind::DefinedUnary { operand, .. } => {
                out.push(*operand);
            }
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::DefinedBinary { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            ExprKind::ImplicitCast(inner) => out.push(*inner),
            ExprKind::Call { args, .. } | ExprKind::IntrinsicCall { args, .. } => {
                out.extend_from_slice(args);
            }
            ExprKind::ImpliedDo {
                body,
                init,
                terminal,
                increment,
                ..
            } => {
                out.extend_from_slice(body);
                out.push(*init);
                out.push(*terminal);
                if let Some(inc) = increment {
                    out.push(*inc);
                }
            }
            ExprKind::ArrayConstructor { items } => out.extend_from_slice(items),
        }
    }
}
