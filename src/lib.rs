//! Semantic front-end for a subset of Fortran 77/90: the typed AST and the
//! analyzer that builds it from a parse stream.
//!
//! The crate owns everything between the parser and the code generator.
//! A recursive-descent parser (external to this crate) drives the
//! [`sema::Sema`] action API; every action resolves names under the
//! implicit typing rules, checks types, inserts the numeric conversions the
//! language implies, and returns a handle into the translation unit's
//! arenas. The result of a run is a [`context::Context`] from which all
//! declarations, types and statements are reachable.
//!
//! Nothing here reads source files or renders diagnostics; locations are
//! carried through to a [`errors::DiagnosticClient`], and the tokenizer,
//! parser, driver and backend are external collaborators.

pub mod arena;
pub mod context;
pub mod decl;
pub mod errors;
pub mod expr;
pub mod fold;
pub mod ident;
pub mod intrinsics;
pub mod sema;
pub mod source;
pub mod stmt;
pub mod types;

pub use context::Context;
pub use errors::{BufferClient, ConsoleClient, DiagnosticClient, DiagnosticsEngine, Level};
pub use sema::{DeclSpec, Sema, SemaOptions, TypeSpec};
pub use source::{SourceLocation, SourceRange};
