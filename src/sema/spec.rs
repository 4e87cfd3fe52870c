//! Specification statements: entity declarations, IMPLICIT, PARAMETER,
//! DIMENSION, EXTERNAL, INTRINSIC, ASYNCHRONOUS, USE, IMPORT and derived
//! types.

use enumset::EnumSet;

use crate::decl::{Decl, DeclId, DeclKind, VarAttr, VarDecl};
use crate::errors::Level;
use crate::expr::ExprId;
use crate::fold;
use crate::ident::NameId;
use crate::intrinsics;
use crate::source::SourceLocation;
use crate::stmt::{LetterRange, ModuleNature, Stmt, StmtId, StmtKind};
use crate::types::{Access, ArraySpec, ArraySpecId, AttrSpec, BuiltinType, Intent, Qualifiers, Type, TypeId, TypeKind};

use super::Sema;

/// The base type named by a type-spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeSpec {
    #[default]
    Unspecified,
    Integer,
    Real,
    DoublePrecision,
    Complex,
    Character,
    Logical,
    Record,
}

/// Everything the parser collects from a declaration-type-spec plus its
/// attribute list, before the analyzer lowers it to an interned type.
#[derive(Debug, Clone, Default)]
pub struct DeclSpec {
    pub type_spec: TypeSpec,
    pub kind: Option<ExprId>,
    pub len: Option<ExprId>,
    pub attrs: EnumSet<AttrSpec>,
    pub intent: Option<Intent>,
    pub access: Option<Access>,
    pub dims: Vec<ArraySpecId>,
    /// The record declaration for `TYPE(name)` specs.
    pub record: Option<DeclId>,
    pub loc: SourceLocation,
}

impl DeclSpec {
    pub fn new(type_spec: TypeSpec, loc: SourceLocation) -> DeclSpec {
        DeclSpec {
            type_spec,
            loc,
            ..DeclSpec::default()
        }
    }
}

impl Sema {
    /// Lowers a declaration-type-spec to an interned type. Bad kind and
    /// length selectors are reported and dropped; the base type survives.
    pub fn act_on_type_name(&mut self, ds: &DeclSpec) -> TypeId {
        let base_spec = match ds.type_spec {
            TypeSpec::Integer => Some(BuiltinType::Integer),
            TypeSpec::Real | TypeSpec::Unspecified => Some(BuiltinType::Real),
            TypeSpec::DoublePrecision => Some(BuiltinType::DoublePrecision),
            TypeSpec::Complex => Some(BuiltinType::Complex),
            TypeSpec::Character => Some(BuiltinType::Character),
            TypeSpec::Logical => Some(BuiltinType::Logical),
            TypeSpec::Record => None,
        };

        let base = match (base_spec, ds.record) {
            (Some(spec), _) => self.ctx.builtin_type(spec),
            (None, Some(record)) => self.ctx.record_type(record),
            (None, None) => {
                self.diags
                    .report(Level::Error, ds.loc, "use of unknown type name");
                self.ctx.real_ty
            }
        };

        let kind = match (ds.kind, base_spec) {
            (Some(kind_expr), Some(spec)) => self.check_kind_selector(kind_expr, spec),
            (Some(kind_expr), None) => {
                let loc = self.ctx.expr(kind_expr).loc;
                self.diags
                    .report(Level::Error, loc, "kind selector is not valid here");
                None
            }
            (None, _) => None,
        };

        let len = match ds.len {
            Some(len_expr) if ds.type_spec == TypeSpec::Character => {
                self.check_length_selector(len_expr)
            }
            Some(len_expr) => {
                let loc = self.ctx.expr(len_expr).loc;
                self.diags.report(
                    Level::Error,
                    loc,
                    "length selector is only valid for CHARACTER",
                );
                None
            }
            None => None,
        };

        let quals = Qualifiers {
            attrs: ds.attrs,
            intent: ds.intent,
            access: ds.access,
        };
        let ty = self.ctx.qualified_type(base, quals, kind, len);
        if ds.dims.is_empty() {
            ty
        } else {
            self.ctx.array_type(ty, ds.dims.clone())
        }
    }

    /// A kind selector must fold to an integer naming a supported width.
    fn check_kind_selector(&mut self, kind_expr: ExprId, base: BuiltinType) -> Option<ExprId> {
        let loc = self.ctx.expr(kind_expr).loc;
        if !self.ctx.is_integer_type(self.ctx.expr(kind_expr).ty) {
            self.diags
                .report(Level::Error, loc, "kind selector must be an integer expression");
            return None;
        }
        let value = match fold::evaluate_as_int(&self.ctx, kind_expr) {
            Some(value) => value,
            None => {
                self.diags.report(
                    Level::Error,
                    loc,
                    "kind selector must be a constant expression",
                );
                return None;
            }
        };
        if TypeKind::from_selector(base, value).is_none() {
            let allowed = match base {
                BuiltinType::Integer => "1, 2, 4, 8",
                BuiltinType::Real | BuiltinType::Complex => "4, 8, 16",
                BuiltinType::Logical => "1, 4",
                BuiltinType::DoublePrecision => "8",
                BuiltinType::Character => "1",
            };
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "invalid {} kind {} (allowed: {})",
                    base.name(),
                    value,
                    allowed
                ),
            );
            return None;
        }
        Some(kind_expr)
    }

    fn check_length_selector(&mut self, len_expr: ExprId) -> Option<ExprId> {
        let loc = self.ctx.expr(len_expr).loc;
        if !self.ctx.is_integer_type(self.ctx.expr(len_expr).ty) {
            self.diags.report(
                Level::Error,
                loc,
                "length selector must be an integer expression",
            );
            return None;
        }
        match fold::evaluate_as_int(&self.ctx, len_expr) {
            Some(value) if value >= 0 => Some(len_expr),
            Some(_) => {
                self.diags
                    .report(Level::Error, loc, "character length must not be negative");
                None
            }
            None => {
                self.diags.report(
                    Level::Error,
                    loc,
                    "length selector must be a constant expression",
                );
                None
            }
        }
    }

    /// Declares one entity of an entity-decl-list with the given type.
    pub fn act_on_entity_decl(
        &mut self,
        ty: TypeId,
        loc: SourceLocation,
        name: &str,
    ) -> Option<DeclId> {
        if self.construction_stopped() {
            return None;
        }
        let name_id = self.ctx.idents.intern(name);

        // A type statement naming the enclosing function declares its
        // result type.
        if let Some(subprogram) = self.current_subprogram() {
            if self.ctx.decl(subprogram).name == Some(name_id) {
                if let DeclKind::Function { result, .. } = &mut self.ctx.decl_mut(subprogram).kind {
                    *result = ty;
                    return Some(subprogram);
                }
            }
        }

        if let Some(prev) = self.lookup_in_context(name_id, self.current_context()) {
            // A dummy argument still carrying its implicit type is refined
            // by the type statement, not redeclared.
            let refinable = self
                .ctx
                .decl(prev)
                .as_variable()
                .map(|vd| vd.attrs.contains(VarAttr::Argument) && vd.implicit)
                .unwrap_or(false);
            if !refinable {
                let prev_loc = self.ctx.decl(prev).loc;
                self.redefinition_error(name_id, loc, prev_loc);
                return None;
            }
        }

        let var = self.make_variable(ty, loc, name_id, false);
        Some(var)
    }

    /// Declares an undeclared identifier using the letter map. Under
    /// IMPLICIT NONE this is an error, but a synthetic default-real
    /// declaration is still created so downstream checks can proceed.
    pub fn act_on_implicit_entity_decl(
        &mut self,
        loc: SourceLocation,
        name: &str,
    ) -> Option<DeclId> {
        let name_id = self.ctx.idents.intern(name);
        let ty = match self.resolve_implicit_type(name_id) {
            Some(ty) => ty,
            None => {
                self.diags.report(
                    Level::Error,
                    loc,
                    format!(
                        "use of undeclared variable `{}`",
                        self.ctx.idents.text(name_id)
                    ),
                );
                self.ctx.real_ty
            }
        };
        Some(self.make_variable(ty, loc, name_id, true))
    }

    fn make_variable(
        &mut self,
        ty: TypeId,
        loc: SourceLocation,
        name: NameId,
        implicit: bool,
    ) -> DeclId {
        let mut attrs = EnumSet::empty();
        let mut intent = None;
        if let Type::Qualified(q) = self.ctx.typ(self.ctx.element_type(ty)) {
            if q.quals.attrs.contains(AttrSpec::Parameter) {
                attrs |= VarAttr::Parameter;
            }
            if q.quals.attrs.contains(AttrSpec::External) {
                attrs |= VarAttr::External;
            }
            if q.quals.attrs.contains(AttrSpec::Intrinsic) {
                attrs |= VarAttr::Intrinsic;
            }
            if q.quals.attrs.contains(AttrSpec::Asynchronous) {
                attrs |= VarAttr::Asynchronous;
            }
            intent = q.quals.intent;
        }
        // A declaration of a dummy argument refines the implicit type it
        // got when the argument list was processed.
        if let Some(existing) = self.lookup(name) {
            let parent_matches = self.ctx.decl(existing).parent == Some(self.current_context());
            if parent_matches {
                if let Some(vd) = self.ctx.decl_mut(existing).as_variable_mut() {
                    if vd.attrs.contains(VarAttr::Argument) && vd.implicit {
                        vd.ty = ty;
                        vd.implicit = false;
                        vd.intent = intent.or(vd.intent);
                        return existing;
                    }
                }
            }
        }
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Variable(VarDecl {
                ty,
                attrs,
                intent,
                init: None,
                implicit,
            }),
            loc,
            name: Some(name),
            parent: Some(self.current_context()),
        });
        self.declare(name, decl);
        decl
    }

    /// IMPLICIT with letter rules, or IMPLICIT NONE when `spec` is `None`.
    pub fn act_on_implicit(
        &mut self,
        loc: SourceLocation,
        spec: Option<(&DeclSpec, &[LetterRange])>,
        stmt_label: Option<u32>,
    ) -> StmtId {
        let rules = match spec {
            None => {
                if !self.implicit_scope_mut().apply_none() {
                    self.diags.report(
                        Level::Error,
                        loc,
                        "IMPLICIT NONE conflicts with an earlier IMPLICIT statement",
                    );
                }
                None
            }
            Some((ds, ranges)) => {
                let ty = self.act_on_type_name(ds);
                if self.implicit_scope().is_none_in_scope() {
                    self.diags.report(
                        Level::Error,
                        loc,
                        "IMPLICIT statement after IMPLICIT NONE",
                    );
                } else {
                    for range in ranges {
                        let start = range.start.to_ascii_lowercase();
                        let end = range.end.unwrap_or(range.start).to_ascii_lowercase();
                        if !start.is_ascii_lowercase() || !end.is_ascii_lowercase() || start > end {
                            self.diags.report(
                                Level::Error,
                                loc,
                                format!("invalid letter range {}-{}", range.start, end),
                            );
                            continue;
                        }
                        if let Some(dup) = self.implicit_scope_mut().apply(start, end, ty) {
                            self.diags.report(
                                Level::Error,
                                loc,
                                format!("letter `{}` already has an IMPLICIT rule", dup),
                            );
                        }
                    }
                }
                Some((ty, ranges.to_vec()))
            }
        };
        self.append_stmt(Stmt {
            kind: StmtKind::Implicit { rules },
            loc,
            label: stmt_label,
        })
    }

    /// One `name = constant-expr` pair of a PARAMETER statement.
    pub fn act_on_parameter_pair(
        &mut self,
        loc: SourceLocation,
        name: &str,
        value: ExprId,
    ) -> Option<(DeclId, ExprId)> {
        let name_id = self.ctx.idents.intern(name);

        if !fold::is_evaluable(&self.ctx, value) {
            let value_loc = self.ctx.expr(value).loc;
            self.diags.report(
                Level::Error,
                value_loc,
                format!(
                    "`{}` must be initialized by a constant expression",
                    self.ctx.idents.text(name_id)
                ),
            );
            return None;
        }

        if let Some(prev) = self.lookup_in_context(name_id, self.current_context()) {
            let prev_loc = self.ctx.decl(prev).loc;
            self.redefinition_error(name_id, loc, prev_loc);
            return None;
        }

        let ty = self.ctx.expr(value).ty;
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Variable(VarDecl {
                ty,
                attrs: VarAttr::Parameter.into(),
                intent: None,
                init: Some(value),
                implicit: false,
            }),
            loc,
            name: Some(name_id),
            parent: Some(self.current_context()),
        });
        self.declare(name_id, decl);
        Some((decl, value))
    }

    pub fn act_on_parameter(
        &mut self,
        loc: SourceLocation,
        pairs: Vec<(DeclId, ExprId)>,
        stmt_label: Option<u32>,
    ) -> StmtId {
        self.append_stmt(Stmt {
            kind: StmtKind::Parameter { pairs },
            loc,
            label: stmt_label,
        })
    }

    /// DIMENSION applies an array shape to a declared or implicitly typed
    /// variable.
    pub fn act_on_dimension(
        &mut self,
        loc: SourceLocation,
        id_loc: SourceLocation,
        name: &str,
        dims: Vec<ArraySpecId>,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        let name_id = self.ctx.idents.intern(name);
        let var = self.variable_for_specification(id_loc, name_id, "DIMENSION")?;
        let var_ty = self.ctx.decl(var).as_variable()?.ty;
        if self.ctx.as_array_type(var_ty).is_some() {
            self.diags.report(
                Level::Error,
                id_loc,
                format!(
                    "`{}` already has a DIMENSION specifier",
                    self.ctx.idents.text(name_id)
                ),
            );
            return None;
        }
        let new_ty = self.ctx.array_type(var_ty, dims.clone());
        if let Some(vd) = self.ctx.decl_mut(var).as_variable_mut() {
            vd.ty = new_ty;
        }
        Some(self.append_stmt(Stmt {
            kind: StmtKind::Dimension {
                name: name_id,
                dims,
            },
            loc,
            label: stmt_label,
        }))
    }

    /// Finds the variable a specification statement applies to, creating it
    /// implicitly when the name is not yet declared.
    fn variable_for_specification(
        &mut self,
        loc: SourceLocation,
        name: NameId,
        what: &str,
    ) -> Option<DeclId> {
        match self.lookup(name) {
            Some(decl) if self.ctx.decl(decl).as_variable().is_some() => Some(decl),
            Some(_) => {
                self.diags.report(
                    Level::Error,
                    loc,
                    format!(
                        "{} specification cannot be applied to `{}`",
                        what,
                        self.ctx.idents.text(name)
                    ),
                );
                None
            }
            None => {
                let text = self.ctx.idents.text(name).to_string();
                self.act_on_implicit_entity_decl(loc, &text)
            }
        }
    }

    /// EXTERNAL marks a name as a user-supplied procedure.
    pub fn act_on_external(
        &mut self,
        loc: SourceLocation,
        id_loc: SourceLocation,
        name: &str,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        let name_id = self.ctx.idents.intern(name);
        match self.lookup_in_context(name_id, self.current_context()) {
            Some(prev) => {
                // A prior type statement supplies the result type; the
                // declaration becomes a function.
                let prev_decl = self.ctx.decl(prev).clone();
                match prev_decl.kind {
                    DeclKind::Variable(ref vd)
                        if vd.init.is_none() && !vd.attrs.contains(VarAttr::Argument) =>
                    {
                        self.ctx.decl_mut(prev).kind = DeclKind::Function {
                            decls: Vec::new(),
                            args: Vec::new(),
                            result: vd.ty,
                            body: Vec::new(),
                            external: true,
                            intrinsic: None,
                        };
                    }
                    DeclKind::Function { .. } | DeclKind::Subroutine { .. } => {
                        self.diags.report(
                            Level::Error,
                            id_loc,
                            format!(
                                "`{}` was already declared EXTERNAL",
                                self.ctx.idents.text(name_id)
                            ),
                        );
                        return None;
                    }
                    _ => {
                        self.diags.report(
                            Level::Error,
                            id_loc,
                            format!(
                                "EXTERNAL cannot be applied to `{}`",
                                self.ctx.idents.text(name_id)
                            ),
                        );
                        return None;
                    }
                }
            }
            None => {
                let result = match self.resolve_implicit_type(name_id) {
                    Some(ty) => ty,
                    None => self.ctx.real_ty,
                };
                let decl = self.ctx.alloc_decl(Decl {
                    kind: DeclKind::Function {
                        decls: Vec::new(),
                        args: Vec::new(),
                        result,
                        body: Vec::new(),
                        external: true,
                        intrinsic: None,
                    },
                    loc: id_loc,
                    name: Some(name_id),
                    parent: Some(self.current_context()),
                });
                self.declare(name_id, decl);
            }
        }
        Some(self.append_stmt(Stmt {
            kind: StmtKind::External { name: name_id },
            loc,
            label: stmt_label,
        }))
    }

    /// INTRINSIC binds a name to a known intrinsic function.
    pub fn act_on_intrinsic(
        &mut self,
        loc: SourceLocation,
        id_loc: SourceLocation,
        name: &str,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        let name_id = self.ctx.idents.intern(name);
        let Some(kind) = intrinsics::resolve(name) else {
            self.diags.report(
                Level::Error,
                id_loc,
                format!("unknown intrinsic function `{}`", self.ctx.idents.text(name_id)),
            );
            return None;
        };
        if let Some(prev) = self.lookup_in_context(name_id, self.current_context()) {
            let prev_loc = self.ctx.decl(prev).loc;
            self.redefinition_error(name_id, id_loc, prev_loc);
            return None;
        }
        let result = self.resolve_implicit_type(name_id).unwrap_or(self.ctx.real_ty);
        let decl = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Function {
                decls: Vec::new(),
                args: Vec::new(),
                result,
                body: Vec::new(),
                external: false,
                intrinsic: Some(kind),
            },
            loc: id_loc,
            name: Some(name_id),
            parent: Some(self.current_context()),
        });
        self.declare(name_id, decl);
        Some(self.append_stmt(Stmt {
            kind: StmtKind::Intrinsic { name: name_id },
            loc,
            label: stmt_label,
        }))
    }

    /// ASYNCHRONOUS marks each named variable.
    pub fn act_on_asynchronous(
        &mut self,
        loc: SourceLocation,
        names: &[(&str, SourceLocation)],
        stmt_label: Option<u32>,
    ) -> StmtId {
        let mut name_ids = Vec::with_capacity(names.len());
        for (name, id_loc) in names {
            let name_id = self.ctx.idents.intern(name);
            name_ids.push(name_id);
            if let Some(var) = self.variable_for_specification(*id_loc, name_id, "ASYNCHRONOUS") {
                let already_async = self
                    .ctx
                    .decl_mut(var)
                    .as_variable_mut()
                    .map(|vd| vd.attrs.contains(VarAttr::Asynchronous))
                    .unwrap_or(false);
                if already_async {
                    let name_text = self.ctx.idents.text(name_id).to_string();
                    self.diags.report(
                        Level::Warning,
                        *id_loc,
                        format!("`{}` is already ASYNCHRONOUS", name_text),
                    );
                }
                if let Some(vd) = self.ctx.decl_mut(var).as_variable_mut() {
                    vd.attrs |= VarAttr::Asynchronous;
                }
            }
        }
        self.append_stmt(Stmt {
            kind: StmtKind::Asynchronous { names: name_ids },
            loc,
            label: stmt_label,
        })
    }

    /// USE is recorded but otherwise inert: there is no module file format
    /// in this front-end.
    pub fn act_on_use(
        &mut self,
        loc: SourceLocation,
        nature: ModuleNature,
        module: &str,
        stmt_label: Option<u32>,
    ) -> StmtId {
        let module = self.ctx.idents.intern(module);
        self.append_stmt(Stmt {
            kind: StmtKind::Use { nature, module },
            loc,
            label: stmt_label,
        })
    }

    pub fn act_on_import(
        &mut self,
        loc: SourceLocation,
        names: &[&str],
        stmt_label: Option<u32>,
    ) -> StmtId {
        let names = names.iter().map(|n| self.ctx.idents.intern(n)).collect();
        self.append_stmt(Stmt {
            kind: StmtKind::Import { names },
            loc,
            label: stmt_label,
        })
    }

    // Derived types.

    /// Begins a derived-type definition; only field declarations are
    /// accepted until the matching end action.
    pub fn act_on_derived_type_decl(
        &mut self,
        loc: SourceLocation,
        name_loc: SourceLocation,
        name: &str,
    ) -> DeclId {
        let name_id = self.ctx.idents.intern(name);
        let duplicate = self.lookup_in_context(name_id, self.current_context());
        let record = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Record { decls: Vec::new() },
            loc,
            name: Some(name_id),
            parent: Some(self.current_context()),
        });
        match duplicate {
            Some(prev) => {
                let prev_loc = self.ctx.decl(prev).loc;
                self.redefinition_error(name_id, name_loc, prev_loc);
            }
            None => self.declare(name_id, record),
        }
        self.push_context(record);
        record
    }

    pub fn act_on_derived_type_field(
        &mut self,
        ds: &DeclSpec,
        id_loc: SourceLocation,
        name: &str,
    ) -> Option<DeclId> {
        let ty = self.act_on_type_name(ds);
        if let Some(at) = self.ctx.as_array_type(ty) {
            let dims = at.dims.clone();
            for dim in dims {
                if !matches!(self.ctx.array_spec(dim), ArraySpec::ExplicitShape { .. }) {
                    self.diags.report(
                        Level::Error,
                        id_loc,
                        "array fields must have an explicit shape",
                    );
                    break;
                }
            }
        }
        let name_id = self.ctx.idents.intern(name);
        if let Some(prev) = self.lookup_in_context(name_id, self.current_context()) {
            let prev_loc = self.ctx.decl(prev).loc;
            self.diags.report_with_note(
                Level::Error,
                id_loc,
                format!("duplicate member `{}`", self.ctx.idents.text(name_id)),
                prev_loc,
                "previous declaration is here",
            );
            return None;
        }
        let field = self.ctx.alloc_decl(Decl {
            kind: DeclKind::Field { ty },
            loc: id_loc,
            name: Some(name_id),
            parent: Some(self.current_context()),
        });
        self.declare(name_id, field);
        Some(field)
    }

    pub fn act_on_end_derived_type(&mut self) {
        self.pop_context();
    }
}
