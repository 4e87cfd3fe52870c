//! Intrinsic functions known to the analyzer.
//!
//! The identifier of an intrinsic is resolved to an [`IntrinsicKind`] before
//! the call expression is built, and the analyzer computes the result type
//! from the argument types.

/// How many arguments an intrinsic accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCount {
    One,
    Two,
    OneOrTwo,
    TwoOrMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicKind {
    // Conversions.
    Int,
    Ifix,
    Idint,
    Real,
    Float,
    Sngl,
    Dble,
    Cmplx,
    Ichar,
    Char,

    // Truncation and rounding.
    Aint,
    Dint,
    Anint,
    Dnint,
    Nint,
    Idnint,

    // General arithmetic.
    Abs,
    Iabs,
    Dabs,
    Cabs,
    Mod,
    Max,
    Min,

    // Complex parts.
    Aimag,
    Conjg,

    // Mathematical functions.
    Sqrt,
    Dsqrt,
    Exp,
    Log,
    Alog,
    Log10,
    Alog10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,

    // Character handling.
    Len,
    LenTrim,
    Index,
    Lge,
    Lgt,
    Lle,
    Llt,
}

impl IntrinsicKind {
    pub fn name(self) -> &'static str {
        use IntrinsicKind::*;
        match self {
            Int => "int",
            Ifix => "ifix",
            Idint => "idint",
            Real => "real",
            Float => "float",
            Sngl => "sngl",
            Dble => "dble",
            Cmplx => "cmplx",
            Ichar => "ichar",
            Char => "char",
            Aint => "aint",
            Dint => "dint",
            Anint => "anint",
            Dnint => "dnint",
            Nint => "nint",
            Idnint => "idnint",
            Abs => "abs",
            Iabs => "iabs",
            Dabs => "dabs",
            Cabs => "cabs",
            Mod => "mod",
            Max => "max",
            Min => "min",
            Aimag => "aimag",
            Conjg => "conjg",
            Sqrt => "sqrt",
            Dsqrt => "dsqrt",
            Exp => "exp",
            Log => "log",
            Alog => "alog",
            Log10 => "log10",
            Alog10 => "alog10",
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
            Asin => "asin",
            Acos => "acos",
            Atan => "atan",
            Atan2 => "atan2",
            Sinh => "sinh",
            Cosh => "cosh",
            Tanh => "tanh",
            Len => "len",
            LenTrim => "len_trim",
            Index => "index",
            Lge => "lge",
            Lgt => "lgt",
            Lle => "lle",
            Llt => "llt",
        }
    }

    pub fn arg_count(self) -> ArgCount {
        use IntrinsicKind::*;
        match self {
            Int | Real | Cmplx => ArgCount::OneOrTwo,
            Mod | Atan2 | Index | Lge | Lgt | Lle | Llt => ArgCount::Two,
            Max | Min => ArgCount::TwoOrMore,
            _ => ArgCount::One,
        }
    }
}

/// Resolves a (case-insensitive) identifier to an intrinsic function.
pub fn resolve(name: &str) -> Option<IntrinsicKind> {
    use IntrinsicKind::*;
    let folded = name.to_ascii_lowercase();
    let kind = match folded.as_str() {
        "int" => Int,
        "ifix" => Ifix,
        "idint" => Idint,
        "real" => Real,
        "float" => Float,
        "sngl" => Sngl,
        "dble" => Dble,
        "cmplx" => Cmplx,
        "ichar" => Ichar,
        "char" => Char,
        "aint" => Aint,
        "dint" => Dint,
        "anint" => Anint,
        "dnint" => Dnint,
        "nint" => Nint,
        "idnint" => Idnint,
        "abs" => Abs,
        "iabs" => Iabs,
        "dabs" => Dabs,
        "cabs" => Cabs,
        "mod" => Mod,
        "max" => Max,
        "min" => Min,
        "aimag" => Aimag,
        "conjg" => Conjg,
        "sqrt" => Sqrt,
        "dsqrt" => Dsqrt,
        "exp" => Exp,
        "log" => Log,
        "alog" => Alog,
        "log10" => Log10,
        "alog10" => Alog10,
        "sin" => Sin,
        "cos" => Cos,
        "tan" => Tan,
        "asin" => Asin,
        "acos" => Acos,
        "atan" => Atan,
        "atan2" => Atan2,
        "sinh" => Sinh,
        "cosh" => Cosh,
        "tanh" => Tanh,
        "len" => Len,
        "len_trim" => LenTrim,
        "index" => Index,
        "lge" => Lge,
        "lgt" => Lgt,
        "lle" => Lle,
        "llt" => Llt,
        _ => return None,
    };
    Some(kind)
}
