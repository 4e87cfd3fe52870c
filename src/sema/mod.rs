//! The semantic analyzer.
//!
//! The parser drives one action per production; each action resolves names
//! and types, constructs the node, registers it where needed and returns the
//! handle (or `None` after reporting a diagnostic — the parser keeps going
//! either way). The analyzer is single threaded and consumes the parse
//! stream in source order.

mod data;
mod exec;
mod expr;
mod spec;

pub use spec::{DeclSpec, TypeSpec};

use std::collections::HashMap;

use crate::context::Context;
use crate::decl::{Decl, DeclId, DeclKind, VarAttr, VarDecl};
use crate::errors::{DiagnosticClient, DiagnosticsEngine, Level};
use crate::ident::NameId;
use crate::source::SourceLocation;
use crate::stmt::{FormatSpec, Stmt, StmtId, StmtKind};
use crate::types::TypeId;

/// Analyzer configuration.
#[derive(Debug, Clone, Default)]
pub struct SemaOptions {
    /// Treat warnings as errors.
    pub werror: bool,
    /// Stop constructing new nodes once this many errors were reported.
    pub error_limit: Option<u32>,
}

/// The per-scope-unit letter map for implicit typing.
///
/// Entered fresh for every program unit: `I`..`N` default to INTEGER, all
/// other letters to REAL. IMPLICIT statements overwrite ranges; IMPLICIT
/// NONE disables the map entirely.
pub(crate) struct ImplicitTypingScope {
    none: bool,
    rules: [TypeId; 26],
    specified: [bool; 26],
}

impl ImplicitTypingScope {
    fn new(ctx: &Context) -> ImplicitTypingScope {
        let mut rules = [ctx.real_ty; 26];
        for letter in b'i'..=b'n' {
            rules[(letter - b'a') as usize] = ctx.integer_ty;
        }
        ImplicitTypingScope {
            none: false,
            rules,
            specified: [false; 26],
        }
    }

    fn resolve(&self, letter: char) -> Option<TypeId> {
        if self.none {
            return None;
        }
        let letter = letter.to_ascii_lowercase();
        if !letter.is_ascii_lowercase() {
            return None;
        }
        Some(self.rules[(letter as u8 - b'a') as usize])
    }

    /// Applies one letter range; returns the first letter that was already
    /// given an explicit rule, if any.
    fn apply(&mut self, start: char, end: char, ty: TypeId) -> Option<char> {
        let lo = start.to_ascii_lowercase() as u8;
        let hi = end.to_ascii_lowercase() as u8;
        for letter in lo..=hi {
            let idx = (letter - b'a') as usize;
            if self.specified[idx] {
                return Some(letter as char);
            }
            self.rules[idx] = ty;
            self.specified[idx] = true;
        }
        None
    }

    fn apply_none(&mut self) -> bool {
        if self.none || self.specified.iter().any(|&s| s) {
            return false;
        }
        self.none = true;
        true
    }

    pub(crate) fn is_none_in_scope(&self) -> bool {
        self.none
    }
}

/// Where a forward statement-label reference needs to be patched.
#[derive(Debug, Clone, Copy)]
enum ForwardSlot {
    GotoTarget,
    AssignTarget,
    AssignedGotoAllowed(usize),
    PrintFormat,
}

#[derive(Debug, Clone, Copy)]
struct ForwardRef {
    label: u32,
    loc: SourceLocation,
    stmt: StmtId,
    slot: ForwardSlot,
}

/// Declared statement labels and pending forward references for one scope
/// unit.
#[derive(Default)]
pub(crate) struct StmtLabelScope {
    decls: HashMap<u32, StmtId>,
    forwards: Vec<ForwardRef>,
}

impl StmtLabelScope {
    fn declare(&mut self, label: u32, stmt: StmtId) -> Option<StmtId> {
        match self.decls.get(&label) {
            Some(&prev) => Some(prev),
            None => {
                self.decls.insert(label, stmt);
                None
            }
        }
    }

    fn resolve(&self, label: u32) -> Option<StmtId> {
        self.decls.get(&label).copied()
    }
}

pub struct Sema {
    pub ctx: Context,
    pub diags: DiagnosticsEngine,

    cur_context: DeclId,
    implicit_scopes: Vec<ImplicitTypingScope>,
    label_scopes: Vec<StmtLabelScope>,
    /// Saved front-end tokens, one frame per pushed declaration context.
    front_saves: Vec<Vec<(NameId, Option<DeclId>)>>,
    /// Statement accumulation frames: one per program unit, plus one per
    /// open block.
    body_stack: Vec<Vec<StmtId>>,
    /// The body of the most recently closed program unit, parked here by
    /// `leave_program_unit` until it is moved into the declaration.
    finished_body: Option<Vec<StmtId>>,
    /// The enclosing function or subroutine declaration, if any.
    cur_subprogram: Option<DeclId>,
}

impl Sema {
    pub fn new(options: SemaOptions) -> Sema {
        let ctx = Context::new();
        let mut diags = DiagnosticsEngine::new();
        diags.werror = options.werror;
        diags.error_limit = options.error_limit;
        let root = ctx.translation_unit();
        Sema {
            ctx,
            diags,
            cur_context: root,
            implicit_scopes: Vec::new(),
            label_scopes: Vec::new(),
            front_saves: Vec::new(),
            body_stack: Vec::new(),
            finished_body: None,
            cur_subprogram: None,
        }
    }

    pub fn with_client(options: SemaOptions, client: Box<dyn DiagnosticClient>) -> Sema {
        let mut sema = Sema::new(options);
        sema.diags.set_client(client);
        sema
    }

    /// Consumes the analyzer, handing the translation unit to the caller.
    pub fn into_context(self) -> Context {
        self.ctx
    }

    pub fn had_errors(&self) -> bool {
        self.diags.had_errors()
    }

    // Translation-unit lifecycle.

    pub fn begin_unit(&mut self) {
        assert_eq!(
            self.cur_context,
            self.ctx.translation_unit(),
            "begin_unit outside the translation-unit context"
        );
        self.implicit_scopes.push(ImplicitTypingScope::new(&self.ctx));
        self.label_scopes.push(StmtLabelScope::default());
        self.front_saves.push(Vec::new());
        self.body_stack.push(Vec::new());
    }

    pub fn end_unit(&mut self) {
        assert_eq!(
            self.cur_context,
            self.ctx.translation_unit(),
            "end_unit inside an unterminated program unit"
        );
        self.body_stack.pop();
        self.restore_front_tokens();
        self.label_scopes.pop();
        self.implicit_scopes.pop();
    }

    // Program units.

    pub fn begin_main_program(
        &mut self,
        name: Option<&str>,
        loc: SourceLocation,
        name_loc: SourceLocation,
    ) -> DeclId {
        if self.cur_context != self.ctx.translation_unit() {
            self.diags.report(
                Level::Error,
                loc,
                "PROGRAM statement is only allowed at the top level",
            );
        }
        let name_id = name.map(|n| self.ctx.idents.intern(n));
        let program = self.ctx.alloc_decl(Decl {
            kind: DeclKind::MainProgram {
                decls: Vec::new(),
                body: Vec::new(),
            },
            loc,
            name: name_id,
            parent: Some(self.cur_context),
        });
        let parent = self.cur_context;
        self.ctx.add_to_context(parent, program);
        self.push_context(program);
        self.enter_program_unit_scopes();

        self.append_stmt(Stmt {
            kind: StmtKind::Program {
                name: name_id,
                name_loc,
            },
            loc,
            label: None,
        });
        program
    }

    pub fn end_main_program(
        &mut self,
        name: Option<&str>,
        loc: SourceLocation,
        name_loc: SourceLocation,
        stmt_label: Option<u32>,
    ) -> StmtId {
        let program = self.cur_context;
        let program_name = self.ctx.decl(program).name;
        let name_id = name.map(|n| self.ctx.idents.intern(n));
        if let (Some(end_name), Some(decl_name)) = (name_id, program_name) {
            if end_name != decl_name {
                self.diags.report(
                    Level::Error,
                    name_loc,
                    format!(
                        "expected program name `{}`",
                        self.ctx.idents.text(decl_name)
                    ),
                );
            }
        }

        let stmt = self.append_stmt(Stmt {
            kind: StmtKind::EndProgram {
                name: name_id,
                name_loc,
            },
            loc,
            label: stmt_label,
        });

        self.leave_program_unit(loc);
        let body = self.finished_body.take().unwrap_or_default();
        match &mut self.ctx.decl_mut(program).kind {
            DeclKind::MainProgram { body: slot, .. } => *slot = body,
            _ => unreachable!("main program context expected"),
        }
        stmt
    }

    pub fn begin_function(
        &mut self,
        loc: SourceLocation,
        name: &str,
        result_spec: Option<&DeclSpec>,
    ) -> DeclId {
        let name_id = self.ctx.idents.intern(name);
        let result = match result_spec {
            Some(ds) => self.act_on_type_name(ds),
            None => self.default_implicit_type(name_id),
        };
        self.begin_subprogram(loc, name_id, Some(result))
    }

    pub fn begin_subroutine(&mut self, loc: SourceLocation, name: &str) -> DeclId {
        let name_id = self.ctx.idents.intern(name);
        self.begin_subprogram(loc, name_id, None)
    }

    fn begin_subprogram(
        &mut self,
        loc: SourceLocation,
        name: NameId,
        result: Option<TypeId>,
    ) -> DeclId {
        if self.cur_context != self.ctx.translation_unit() {
            self.diags.report(
                Level::Error,
                loc,
                "nested program units are not supported",
            );
        }
        if let Some(prev) = self.lookup_in_context(name, self.cur_context) {
            let prev_loc = self.ctx.decl(prev).loc;
            self.redefinition_error(name, loc, prev_loc);
        }
        let kind = match result {
            Some(result) => DeclKind::Function {
                decls: Vec::new(),
                args: Vec::new(),
                result,
                body: Vec::new(),
                external: false,
                intrinsic: None,
            },
            None => DeclKind::Subroutine {
                decls: Vec::new(),
                args: Vec::new(),
                body: Vec::new(),
                external: false,
            },
        };
        let subprogram = self.ctx.alloc_decl(Decl {
            kind,
            loc,
            name: Some(name),
            parent: Some(self.cur_context),
        });
        self.declare(name, subprogram);
        self.push_context(subprogram);
        self.enter_program_unit_scopes();
        self.cur_subprogram = Some(subprogram);
        subprogram
    }

    /// Declares one dummy argument of the current subprogram. The type
    /// follows the implicit rules until a specification statement refines
    /// it.
    pub fn act_on_subprogram_argument(
        &mut self,
        loc: SourceLocation,
        name: &str,
    ) -> Option<DeclId> {
        let name_id = self.ctx.idents.intern(name);
        if self.lookup_in_context(name_id, self.cur_context).is_some() {
            self.diags.report(
                Level::Error,
                loc,
                format!("duplicate dummy argument `{}`", self.ctx.idents.text(name_id)),
            );
            return None;
        }
        let ty = self.default_implicit_type(name_id);
        let arg = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Variable(VarDecl {
                ty,
                attrs: VarAttr::Argument.into(),
                intent: None,
                init: None,
                implicit: true,
            }),
            loc,
            name: Some(name_id),
            parent: Some(self.cur_context),
        });
        self.declare(name_id, arg);
        match &mut self.ctx.decl_mut(self.cur_context).kind {
            DeclKind::Function { args, .. } | DeclKind::Subroutine { args, .. } => args.push(arg),
            _ => {
                self.diags
                    .report(Level::Error, loc, "dummy argument outside a subprogram");
            }
        }
        Some(arg)
    }

    pub fn end_subprogram(
        &mut self,
        name: Option<&str>,
        loc: SourceLocation,
        name_loc: SourceLocation,
    ) {
        let subprogram = self.cur_context;
        assert_ne!(
            subprogram,
            self.ctx.translation_unit(),
            "end_subprogram would pop the translation unit"
        );
        if let (Some(end_name), Some(decl_name)) = (name, self.ctx.decl(subprogram).name) {
            let end_id = self.ctx.idents.intern(end_name);
            if end_id != decl_name {
                self.diags.report(
                    Level::Error,
                    name_loc,
                    format!(
                        "expected subprogram name `{}`",
                        self.ctx.idents.text(decl_name)
                    ),
                );
            }
        }
        self.leave_program_unit(loc);
        let body = self.finished_body.take().unwrap_or_default();
        match &mut self.ctx.decl_mut(subprogram).kind {
            DeclKind::Function { body: slot, .. } | DeclKind::Subroutine { body: slot, .. } => {
                *slot = body;
            }
            _ => unreachable!("subprogram context expected"),
        }
        self.cur_subprogram = None;
    }

    // Scope plumbing.

    fn enter_program_unit_scopes(&mut self) {
        self.implicit_scopes.push(ImplicitTypingScope::new(&self.ctx));
        self.label_scopes.push(StmtLabelScope::default());
        self.body_stack.push(Vec::new());
    }

    /// Pops the scope state of a program unit: resolves labels, restores
    /// front tokens and stores the finished body for the caller.
    fn leave_program_unit(&mut self, loc: SourceLocation) {
        self.resolve_labels(loc);
        self.finished_body = self.body_stack.pop();
        self.label_scopes.pop();
        self.implicit_scopes.pop();
        self.pop_context();
    }

    pub(crate) fn push_context(&mut self, decl: DeclId) {
        debug_assert_eq!(self.ctx.decl(decl).parent, Some(self.cur_context));
        self.cur_context = decl;
        self.front_saves.push(Vec::new());
    }

    pub(crate) fn pop_context(&mut self) {
        let parent = self
            .ctx
            .decl(self.cur_context)
            .parent
            .expect("popped the translation-unit context");
        self.restore_front_tokens();
        self.cur_context = parent;
    }

    fn restore_front_tokens(&mut self) {
        if let Some(frame) = self.front_saves.pop() {
            for (name, saved) in frame.into_iter().rev() {
                self.ctx.idents.set_front_token(name, saved);
            }
        }
    }

    pub(crate) fn current_context(&self) -> DeclId {
        self.cur_context
    }

    pub(crate) fn current_subprogram(&self) -> Option<DeclId> {
        self.cur_subprogram
    }

    /// Registers `decl` under `name` in the current context, saving the
    /// previous front token for restoration at scope exit.
    pub(crate) fn declare(&mut self, name: NameId, decl: DeclId) {
        let saved = self.ctx.idents.front_token(name);
        if let Some(frame) = self.front_saves.last_mut() {
            frame.push((name, saved));
        }
        self.ctx.idents.set_front_token(name, Some(decl));
        self.ctx.add_to_context(self.cur_context, decl);
    }

    /// The most recent visible declaration for `name`.
    pub(crate) fn lookup(&self, name: NameId) -> Option<DeclId> {
        self.ctx.idents.front_token(name)
    }

    /// The binding for `name` if it was introduced in `context` itself.
    pub(crate) fn lookup_in_context(&self, name: NameId, context: DeclId) -> Option<DeclId> {
        let found = self.ctx.idents.front_token(name)?;
        if self.ctx.decl(found).parent == Some(context) {
            Some(found)
        } else {
            None
        }
    }

    pub(crate) fn redefinition_error(
        &mut self,
        name: NameId,
        loc: SourceLocation,
        prev_loc: SourceLocation,
    ) {
        self.diags.report_with_note(
            Level::Error,
            loc,
            format!("redefinition of `{}`", self.ctx.idents.text(name)),
            prev_loc,
            "previous definition is here",
        );
    }

    // Implicit typing.

    pub(crate) fn implicit_scope(&self) -> &ImplicitTypingScope {
        self.implicit_scopes
            .last()
            .expect("no implicit typing scope")
    }

    pub(crate) fn implicit_scope_mut(&mut self) -> &mut ImplicitTypingScope {
        self.implicit_scopes
            .last_mut()
            .expect("no implicit typing scope")
    }

    /// Resolves the implicit type of a name in the current scope; `None`
    /// under IMPLICIT NONE.
    pub(crate) fn resolve_implicit_type(&self, name: NameId) -> Option<TypeId> {
        let letter = self.ctx.idents.first_letter(name)?;
        self.implicit_scope().resolve(letter)
    }

    /// Like [`Sema::resolve_implicit_type`] but ignores IMPLICIT NONE; used
    /// where a type is needed for error recovery and for subprogram names.
    fn default_implicit_type(&mut self, name: NameId) -> TypeId {
        match self.resolve_implicit_type(name) {
            Some(ty) => ty,
            None => {
                let letter = self
                    .ctx
                    .idents
                    .first_letter(name)
                    .unwrap_or('x')
                    .to_ascii_lowercase();
                if ('i'..='n').contains(&letter) {
                    self.ctx.integer_ty
                } else {
                    self.ctx.real_ty
                }
            }
        }
    }

    // Statement labels.

    /// Allocates the statement, declares its own label if it carries one,
    /// and appends it to the current body.
    pub(crate) fn append_stmt(&mut self, stmt: Stmt) -> StmtId {
        let label = stmt.label;
        let loc = stmt.loc;
        let id = self.ctx.alloc_stmt(stmt);
        if let Some(label) = label {
            self.declare_label(label, id, loc);
        }
        if let Some(frame) = self.body_stack.last_mut() {
            frame.push(id);
        }
        id
    }

    pub(crate) fn push_body_frame(&mut self) {
        self.body_stack.push(Vec::new());
    }

    pub(crate) fn pop_body_frame(&mut self) -> Vec<StmtId> {
        self.body_stack.pop().expect("no open statement body")
    }

    fn declare_label(&mut self, label: u32, stmt: StmtId, loc: SourceLocation) {
        let scope = self.label_scopes.last_mut().expect("no statement label scope");
        if let Some(prev) = scope.declare(label, stmt) {
            let prev_loc = self.ctx.stmt(prev).loc;
            self.diags.report_with_note(
                Level::Error,
                loc,
                format!("redefinition of statement label {}", label),
                prev_loc,
                "previous definition is here",
            );
        }
    }

    /// Resolves a label use immediately when the target is already known,
    /// otherwise records a forward reference for scope-end fixup.
    fn reference_label(&mut self, label: u32, loc: SourceLocation, stmt: StmtId, slot: ForwardSlot) {
        let scope = self.label_scopes.last_mut().expect("no statement label scope");
        match scope.resolve(label) {
            Some(target) => Self::patch_label(&mut self.ctx, stmt, slot, target),
            None => scope.forwards.push(ForwardRef {
                label,
                loc,
                stmt,
                slot,
            }),
        }
    }

    fn patch_label(ctx: &mut Context, stmt: StmtId, slot: ForwardSlot, target: StmtId) {
        let stmt = ctx.stmt_mut(stmt);
        match (&mut stmt.kind, slot) {
            (StmtKind::Goto { target: lr }, ForwardSlot::GotoTarget) => lr.target = Some(target),
            (StmtKind::Assign { target: lr, .. }, ForwardSlot::AssignTarget) => {
                lr.target = Some(target)
            }
            (
                StmtKind::AssignedGoto { allowed, .. },
                ForwardSlot::AssignedGotoAllowed(index),
            ) => allowed[index].target = Some(target),
            (
                StmtKind::Print {
                    format: FormatSpec::Label(lr),
                    ..
                },
                ForwardSlot::PrintFormat,
            ) => lr.target = Some(target),
            _ => unreachable!("label slot does not match statement"),
        }
    }

    /// End-of-scope-unit label resolution; an unresolved label is fatal for
    /// the scope unit.
    fn resolve_labels(&mut self, _loc: SourceLocation) {
        let scope = self.label_scopes.last_mut().expect("no statement label scope");
        let forwards = std::mem::take(&mut scope.forwards);
        for fwd in forwards {
            let target = self
                .label_scopes
                .last()
                .and_then(|scope| scope.resolve(fwd.label));
            match target {
                Some(target) => Self::patch_label(&mut self.ctx, fwd.stmt, fwd.slot, target),
                None => {
                    self.diags.report(
                        Level::Fatal,
                        fwd.loc,
                        format!("use of undeclared statement label {}", fwd.label),
                    );
                }
            }
        }
    }

    pub(crate) fn construction_stopped(&self) -> bool {
        self.diags.error_limit_reached()
    }
}
