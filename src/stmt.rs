//! The statement tree.
//!
//! Statements reference expressions and other statements by handle. Control
//! statements hold [`LabelRef`]s whose targets are patched in at the end of
//! the enclosing scope unit; an unresolved label at that point is fatal.

use crate::arena::ArenaId;
use crate::decl::DeclId;
use crate::expr::ExprId;
use crate::ident::NameId;
use crate::source::SourceLocation;
use crate::types::{ArraySpecId, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

impl ArenaId for StmtId {
    fn from_raw(raw: u32) -> Self {
        StmtId(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

/// A reference to a statement label. Forward references are permitted;
/// `target` is filled in when the enclosing scope unit ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRef {
    pub label: u32,
    pub loc: SourceLocation,
    pub target: Option<StmtId>,
}

impl LabelRef {
    pub fn new(label: u32, loc: SourceLocation) -> LabelRef {
        LabelRef {
            label,
            loc,
            target: None,
        }
    }
}

/// The format specifier of a PRINT statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSpec {
    /// List-directed output: `PRINT *`.
    Star,
    /// A default character expression holding the format.
    CharExpr(ExprId),
    /// A statement-label reference to a FORMAT statement.
    Label(LabelRef),
}

/// One arm of an IF construct; `condition` is `None` for the ELSE arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfBranch {
    pub condition: Option<ExprId>,
    pub body: StmtId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleNature {
    Unspecified,
    Intrinsic,
    NonIntrinsic,
}

/// A single letter or letter range in an IMPLICIT statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterRange {
    pub start: char,
    pub end: Option<char>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Program {
        name: Option<NameId>,
        name_loc: SourceLocation,
    },
    EndProgram {
        name: Option<NameId>,
        name_loc: SourceLocation,
    },
    Use {
        nature: ModuleNature,
        module: NameId,
    },
    Import {
        names: Vec<NameId>,
    },
    Asynchronous {
        names: Vec<NameId>,
    },
    /// `rules` is `None` for IMPLICIT NONE.
    Implicit {
        rules: Option<(TypeId, Vec<LetterRange>)>,
    },
    Parameter {
        pairs: Vec<(DeclId, ExprId)>,
    },
    Dimension {
        name: NameId,
        dims: Vec<ArraySpecId>,
    },
    External {
        name: NameId,
    },
    Intrinsic {
        name: NameId,
    },
    Data {
        objects: Vec<ExprId>,
        values: Vec<ExprId>,
    },
    Assignment {
        lhs: ExprId,
        rhs: ExprId,
    },
    Goto {
        target: LabelRef,
    },
    /// `GO TO var [(allowed labels)]` where `var` was set by ASSIGN.
    AssignedGoto {
        variable: ExprId,
        allowed: Vec<LabelRef>,
    },
    /// `ASSIGN label TO var`.
    Assign {
        target: LabelRef,
        variable: ExprId,
    },
    If {
        branches: Vec<IfBranch>,
    },
    Continue,
    Stop {
        code: Option<ExprId>,
    },
    Return {
        value: Option<ExprId>,
    },
    Call {
        subroutine: DeclId,
        args: Vec<ExprId>,
    },
    Print {
        format: FormatSpec,
        items: Vec<ExprId>,
    },
    Block {
        body: Vec<StmtId>,
    },
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLocation,
    /// The statement's own label, if the source labeled it.
    pub label: Option<u32>,
}
