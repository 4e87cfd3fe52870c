//! The type system: base types, qualifier bundles, kind/length selectors,
//! array and pointer wrappers, and dimension specifications.
//!
//! Types are immutable and interned; two `TypeId`s denote the same type
//! exactly when they are equal. Construction goes through the interned
//! constructors on [`crate::context::Context`].

use enumset::{EnumSet, EnumSetType};

use crate::arena::ArenaId;
use crate::decl::DeclId;
use crate::expr::ExprId;
use crate::source::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl ArenaId for TypeId {
    fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArraySpecId(u32);

impl ArenaId for ArraySpecId {
    fn from_raw(raw: u32) -> Self {
        ArraySpecId(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

/// Intrinsic base types. REAL is the default when no IMPLICIT rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Integer,
    Real,
    DoublePrecision,
    Complex,
    Character,
    Logical,
}

impl BuiltinType {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinType::Integer => "INTEGER",
            BuiltinType::Real => "REAL",
            BuiltinType::DoublePrecision => "DOUBLE PRECISION",
            BuiltinType::Complex => "COMPLEX",
            BuiltinType::Character => "CHARACTER",
            BuiltinType::Logical => "LOGICAL",
        }
    }
}

/// Attribute specifiers collected from specification statements.
#[derive(EnumSetType, Debug, Hash)]
pub enum AttrSpec {
    Parameter,
    Dimension,
    External,
    Intrinsic,
    Asynchronous,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Public,
    Private,
}

/// The full qualifier set carried by a qualified type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qualifiers {
    pub attrs: EnumSet<AttrSpec>,
    pub intent: Option<Intent>,
    pub access: Option<Access>,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.intent.is_none() && self.access.is_none()
    }

    /// Packed representation used in interning profiles.
    pub fn profile_word(&self) -> u32 {
        let intent = match self.intent {
            None => 0u32,
            Some(Intent::In) => 1,
            Some(Intent::Out) => 2,
            Some(Intent::InOut) => 3,
        };
        let access = match self.access {
            None => 0u32,
            Some(Access::Public) => 1,
            Some(Access::Private) => 2,
        };
        self.attrs.as_u32() | (intent << 16) | (access << 20)
    }
}

/// A qualifier bundle wrapping a base type. A bundle with no attributes and
/// no selectors reduces to its base type and is never allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedType {
    pub base: TypeId,
    pub quals: Qualifiers,
    /// Kind selector; must fold to an integer at the point of use.
    pub kind: Option<ExprId>,
    /// Length selector, character types only.
    pub len: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayType {
    pub element: TypeId,
    pub dims: Vec<ArraySpecId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerType {
    pub pointee: TypeId,
    pub num_dims: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Builtin(BuiltinType),
    Qualified(QualifiedType),
    Array(ArrayType),
    Pointer(PointerType),
    Record(DeclId),
}

/// A single dimension of an array type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArraySpec {
    /// `[lower :] upper`
    ExplicitShape {
        lower: Option<ExprId>,
        upper: ExprId,
    },
    /// `[lower] :` — dummy argument taking its shape from the effective
    /// argument.
    AssumedShape { lower: Option<ExprId> },
    /// `:` — allocatable or pointer target.
    DeferredShape,
    /// `[lower :] *` as the last dimension of a dummy argument.
    AssumedSize { lower: Option<ExprId> },
    /// `[lower :] *` on a named constant.
    ImpliedShape {
        lower: Option<ExprId>,
        star_loc: SourceLocation,
    },
}

/// Storage kinds for the arithmetic and logical types: the standard IEEE
/// widths. DOUBLE PRECISION is a distinct base type whose kind is `Real8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Int1,
    Int2,
    Int4,
    Int8,
    Real4,
    Real8,
    Real16,
    Logical1,
    Logical4,
}

impl TypeKind {
    pub fn bit_width(self) -> u32 {
        match self {
            TypeKind::Int1 | TypeKind::Logical1 => 8,
            TypeKind::Int2 => 16,
            TypeKind::Int4 | TypeKind::Real4 | TypeKind::Logical4 => 32,
            TypeKind::Int8 | TypeKind::Real8 => 64,
            TypeKind::Real16 => 128,
        }
    }

    pub fn byte_size(self) -> u32 {
        self.bit_width() / 8
    }

    /// Maps an evaluated kind selector to a storage kind for `base`.
    pub fn from_selector(base: BuiltinType, kind: i64) -> Option<TypeKind> {
        match base {
            BuiltinType::Integer => match kind {
                1 => Some(TypeKind::Int1),
                2 => Some(TypeKind::Int2),
                4 => Some(TypeKind::Int4),
                8 => Some(TypeKind::Int8),
                _ => None,
            },
            BuiltinType::Real | BuiltinType::Complex => match kind {
                4 => Some(TypeKind::Real4),
                8 => Some(TypeKind::Real8),
                16 => Some(TypeKind::Real16),
                _ => None,
            },
            BuiltinType::DoublePrecision => match kind {
                8 => Some(TypeKind::Real8),
                _ => None,
            },
            BuiltinType::Logical => match kind {
                1 => Some(TypeKind::Logical1),
                4 => Some(TypeKind::Logical4),
                _ => None,
            },
            BuiltinType::Character => None,
        }
    }

    /// The default kind of a base type when no selector is given.
    pub fn default_for(base: BuiltinType) -> Option<TypeKind> {
        match base {
            BuiltinType::Integer => Some(TypeKind::Int4),
            BuiltinType::Real | BuiltinType::Complex => Some(TypeKind::Real4),
            BuiltinType::DoublePrecision => Some(TypeKind::Real8),
            BuiltinType::Logical => Some(TypeKind::Logical4),
            BuiltinType::Character => None,
        }
    }

    /// The kind selector value this storage kind corresponds to.
    pub fn selector(self) -> i64 {
        match self {
            TypeKind::Int1 | TypeKind::Logical1 => 1,
            TypeKind::Int2 => 2,
            TypeKind::Int4 | TypeKind::Real4 | TypeKind::Logical4 => 4,
            TypeKind::Int8 | TypeKind::Real8 => 8,
            TypeKind::Real16 => 16,
        }
    }
}
