//! Declarations and declaration contexts.
//!
//! Declaration contexts form a tree rooted at the translation unit. The
//! context-bearing variants (translation unit, program units, records) own
//! an ordered list of their member declarations; every declaration keeps a
//! parent link back to its context.

use enumset::{EnumSet, EnumSetType};

use crate::arena::ArenaId;
use crate::expr::ExprId;
use crate::ident::NameId;
use crate::intrinsics::IntrinsicKind;
use crate::source::SourceLocation;
use crate::stmt::StmtId;
use crate::types::{Intent, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

impl ArenaId for DeclId {
    fn from_raw(raw: u32) -> Self {
        DeclId(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

/// Attributes a variable accumulates from specification statements.
#[derive(EnumSetType, Debug, Hash)]
pub enum VarAttr {
    Parameter,
    Argument,
    Asynchronous,
    External,
    Intrinsic,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub ty: TypeId,
    pub attrs: EnumSet<VarAttr>,
    pub intent: Option<Intent>,
    pub init: Option<ExprId>,
    /// True when the declaration was created by the implicit typing rules
    /// rather than a specification statement.
    pub implicit: bool,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    TranslationUnit {
        decls: Vec<DeclId>,
    },
    MainProgram {
        decls: Vec<DeclId>,
        body: Vec<StmtId>,
    },
    Function {
        decls: Vec<DeclId>,
        args: Vec<DeclId>,
        result: TypeId,
        body: Vec<StmtId>,
        external: bool,
        intrinsic: Option<IntrinsicKind>,
    },
    Subroutine {
        decls: Vec<DeclId>,
        args: Vec<DeclId>,
        body: Vec<StmtId>,
        external: bool,
    },
    Variable(VarDecl),
    Field {
        ty: TypeId,
    },
    Record {
        decls: Vec<DeclId>,
    },
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub kind: DeclKind,
    pub loc: SourceLocation,
    pub name: Option<NameId>,
    pub parent: Option<DeclId>,
}

impl Decl {
    pub fn is_context(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::TranslationUnit { .. }
                | DeclKind::MainProgram { .. }
                | DeclKind::Function { .. }
                | DeclKind::Subroutine { .. }
                | DeclKind::Record { .. }
        )
    }

    /// Member declarations, for the context-bearing variants.
    pub fn context_decls(&self) -> Option<&[DeclId]> {
        match &self.kind {
            DeclKind::TranslationUnit { decls }
            | DeclKind::MainProgram { decls, .. }
            | DeclKind::Function { decls, .. }
            | DeclKind::Subroutine { decls, .. }
            | DeclKind::Record { decls } => Some(decls),
            _ => None,
        }
    }

    pub fn context_decls_mut(&mut self) -> Option<&mut Vec<DeclId>> {
        match &mut self.kind {
            DeclKind::TranslationUnit { decls }
            | DeclKind::MainProgram { decls, .. }
            | DeclKind::Function { decls, .. }
            | DeclKind::Subroutine { decls, .. }
            | DeclKind::Record { decls } => Some(decls),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VarDecl> {
        match &self.kind {
            DeclKind::Variable(vd) => Some(vd),
            _ => None,
        }
    }

    pub fn as_variable_mut(&mut self) -> Option<&mut VarDecl> {
        match &mut self.kind {
            DeclKind::Variable(vd) => Some(vd),
            _ => None,
        }
    }

    /// Declared type, for the typed variants.
    pub fn declared_type(&self) -> Option<TypeId> {
        match &self.kind {
            DeclKind::Variable(vd) => Some(vd.ty),
            DeclKind::Field { ty } => Some(*ty),
            DeclKind::Function { result, .. } => Some(*result),
            _ => None,
        }
    }
}
