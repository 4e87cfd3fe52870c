//! DATA statement construction: repeat-expanding value iteration, per-object
//! initializer assignment, implied-do evaluation, and the resolution of
//! identifiers that were referenced before their implied-do variable
//! existed.

use std::collections::HashMap;

use crate::decl::{Decl, DeclId, DeclKind, VarAttr, VarDecl};
use crate::errors::Level;
use crate::expr::{ConstantValue, Expr, ExprId, ExprKind};
use crate::fold::{self, EvalScope};
use crate::ident::NameId;
use crate::source::SourceLocation;
use crate::stmt::{Stmt, StmtId, StmtKind};
use crate::types::TypeId;

use super::Sema;

/// Walks the value list of a DATA statement, expanding `count*value`
/// repetitions, and accumulates the per-variable element slots.
struct DataState {
    values: Vec<ExprId>,
    value_offset: usize,
    repeat_left: i64,
    current: Option<ExprId>,
    /// Set once the object list ran out of values; stops further visits.
    exhausted: bool,
    /// Partially filled array initializers, keyed by variable.
    partial: HashMap<DeclId, Vec<Option<ExprId>>>,
    scope: EvalScope,
}

impl DataState {
    fn new(values: Vec<ExprId>) -> DataState {
        DataState {
            values,
            value_offset: 0,
            repeat_left: 0,
            current: None,
            exhausted: false,
            partial: HashMap::new(),
            scope: EvalScope::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.value_offset >= self.values.len() && self.repeat_left == 0
    }
}

impl Sema {
    /// A DATA value, possibly of the `count*value` form. The count must be
    /// a positive integer constant and the value a constant expression.
    pub fn act_on_data_constant(
        &mut self,
        repeat_loc: SourceLocation,
        repeat: Option<ExprId>,
        value: ExprId,
    ) -> Option<ExprId> {
        let mut has_errors = false;

        if let Some(count) = repeat {
            let is_int_const = matches!(
                self.ctx.expr(count).constant_value(),
                Some(ConstantValue::Integer(_))
            );
            let positive = fold::evaluate_as_int(&self.ctx, count).map_or(false, |v| v > 0);
            if !is_int_const || !positive {
                let count_loc = self.ctx.expr(count).loc;
                self.diags.report(
                    Level::Error,
                    count_loc,
                    "expected an integer constant greater than zero",
                );
                has_errors = true;
            }
        }

        if !fold::is_evaluable(&self.ctx, value) {
            let mut blockers = Vec::new();
            fold::gather_non_evaluable(&self.ctx, value, &mut blockers);
            let value_loc = self.ctx.expr(value).loc;
            self.diags
                .report(Level::Error, value_loc, "expected a constant expression");
            for blocker in blockers {
                let loc = self.ctx.expr(blocker).loc;
                self.diags
                    .report(Level::Note, loc, "this expression is not constant");
            }
            has_errors = true;
        }

        if has_errors {
            return None;
        }
        match repeat {
            Some(count) => {
                let ty = self.ctx.expr(value).ty;
                Some(self.ctx.alloc_expr(Expr {
                    kind: ExprKind::Repeated { count, value },
                    ty,
                    loc: repeat_loc,
                }))
            }
            None => Some(value),
        }
    }

    /// A name inside a DATA object that may refer to an implied-do
    /// variable bound later; unresolved names become placeholder
    /// expressions fixed up when the implied-do is built.
    pub fn act_on_data_reference(&mut self, loc: SourceLocation, name: &str) -> Option<ExprId> {
        let name_id = self.ctx.idents.intern(name);
        match self.lookup(name_id) {
            Some(_) => self.act_on_var_ref(loc, name),
            None => Some(self.ctx.alloc_expr(Expr {
                kind: ExprKind::Unresolved(name_id),
                // Implied-do variables are integers; the placeholder type
                // keeps subscript checking quiet until resolution.
                ty: self.ctx.integer_ty,
                loc,
            })),
        }
    }

    /// `(items, var = init, terminal [, increment])` in a DATA statement.
    pub fn act_on_data_implied_do(
        &mut self,
        loc: SourceLocation,
        id_loc: SourceLocation,
        var_name: &str,
        body: Vec<ExprId>,
        init: ExprId,
        terminal: ExprId,
        increment: Option<ExprId>,
    ) -> Option<ExprId> {
        let name_id = self.ctx.idents.intern(var_name);
        let do_var = match self.lookup(name_id) {
            Some(decl) if self.ctx.decl(decl).as_variable().is_some() => {
                let ty = self.ctx.decl(decl).as_variable().unwrap().ty;
                if !self.ctx.is_integer_type(ty) {
                    self.diags
                        .report(Level::Error, id_loc, "expected an integer variable");
                    return None;
                }
                decl
            }
            Some(_) => {
                self.diags
                    .report(Level::Error, id_loc, "expected an integer variable");
                return None;
            }
            None => {
                let integer_ty = self.ctx.integer_ty;
                let decl = self.ctx.alloc_decl(Decl {
                    kind: DeclKind::Variable(VarDecl {
                        ty: integer_ty,
                        attrs: Default::default(),
                        intent: None,
                        init: None,
                        implicit: true,
                    }),
                    loc: id_loc,
                    name: Some(name_id),
                    parent: Some(self.current_context()),
                });
                self.declare(name_id, decl);
                decl
            }
        };

        let mut has_errors = false;
        for bound in [Some(init), Some(terminal), increment].into_iter().flatten() {
            self.resolve_unresolved(bound, name_id, do_var);
            if !self.ctx.is_integer_type(self.ctx.expr(bound).ty) {
                let bound_loc = self.ctx.expr(bound).loc;
                self.diags
                    .report(Level::Error, bound_loc, "expected an integer expression");
                has_errors = true;
            }
        }
        for &item in &body {
            self.resolve_unresolved(item, name_id, do_var);
        }
        if has_errors {
            return None;
        }

        let ty = body
            .first()
            .map(|&e| self.ctx.expr(e).ty)
            .unwrap_or(self.ctx.integer_ty);
        Some(self.ctx.alloc_expr(Expr {
            kind: ExprKind::ImpliedDo {
                var: do_var,
                body,
                init,
                terminal,
                increment,
            },
            ty,
            loc,
        }))
    }

    /// Rewrites placeholder references in place: the implied-do variable
    /// name binds to the loop variable, anything else resolves through the
    /// normal rules.
    fn resolve_unresolved(&mut self, expr: ExprId, do_var_name: NameId, do_var: DeclId) {
        if let ExprKind::Unresolved(name) = &self.ctx.expr(expr).kind {
            let name = *name;
            let (decl, ty) = if name == do_var_name {
                let ty = self
                    .ctx
                    .decl(do_var)
                    .as_variable()
                    .map(|vd| vd.ty)
                    .unwrap_or(self.ctx.integer_ty);
                (Some(do_var), ty)
            } else {
                let loc = self.ctx.expr(expr).loc;
                let text = self.ctx.idents.text(name).to_string();
                match self.act_on_implicit_entity_decl(loc, &text) {
                    Some(decl) => {
                        let ty = self
                            .ctx
                            .decl(decl)
                            .as_variable()
                            .map(|vd| vd.ty)
                            .unwrap_or(self.ctx.real_ty);
                        (Some(decl), ty)
                    }
                    None => (None, self.ctx.real_ty),
                }
            };
            if let Some(decl) = decl {
                let node = self.ctx.expr_mut(expr);
                node.kind = ExprKind::Var(decl);
                node.ty = ty;
            }
            return;
        }
        let mut children = Vec::new();
        self.ctx.expr(expr).collect_children(&mut children);
        for child in children {
            self.resolve_unresolved(child, do_var_name, do_var);
        }
    }

    /// The DATA statement proper: walks the object list against the value
    /// list and records initializers on the variables.
    pub fn act_on_data(
        &mut self,
        loc: SourceLocation,
        objects: Vec<ExprId>,
        values: Vec<ExprId>,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        let mut state = DataState::new(values.clone());
        self.data_load_value(&mut state);

        for &object in &objects {
            self.data_visit(&mut state, object);
            if state.exhausted {
                break;
            }
        }

        if !state.is_empty() && !state.exhausted {
            let first = state.values[state.value_offset];
            let first_loc = self.ctx.expr(first).loc;
            self.diags.report(
                Level::Error,
                first_loc,
                "excess values in DATA statement",
            );
        }

        // Materialize the element-wise array initializers collected above.
        let partial = std::mem::take(&mut state.partial);
        for (var, slots) in partial {
            let (var_ty, elem_ty) = {
                let ty = self.ctx.decl(var).as_variable().map(|vd| vd.ty);
                let ty = match ty {
                    Some(ty) => ty,
                    None => continue,
                };
                (ty, self.ctx.element_type(ty))
            };
            let items: Vec<ExprId> = slots
                .into_iter()
                .map(|slot| match slot {
                    Some(value) => value,
                    None => self.zero_constant(elem_ty, loc),
                })
                .collect();
            let first_loc = items
                .first()
                .map(|&e| self.ctx.expr(e).loc)
                .unwrap_or(loc);
            let init = self.ctx.alloc_expr(Expr {
                kind: ExprKind::ArrayConstructor { items },
                ty: var_ty,
                loc: first_loc,
            });
            if let Some(vd) = self.ctx.decl_mut(var).as_variable_mut() {
                vd.init = Some(init);
            }
        }

        Some(self.append_stmt(Stmt {
            kind: StmtKind::Data { objects, values },
            loc,
            label: stmt_label,
        }))
    }

    /// A neutral element value for array slots the DATA statement did not
    /// reach.
    fn zero_constant(&mut self, ty: TypeId, loc: SourceLocation) -> ExprId {
        let value = if self.ctx.is_integer_type(ty) {
            ConstantValue::Integer(0.into())
        } else if self.ctx.is_real_type(ty) {
            ConstantValue::Real {
                text: "0.0".to_string(),
                value: 0.0,
            }
        } else if self.ctx.is_complex_type(ty) {
            ConstantValue::Complex { re: 0.0, im: 0.0 }
        } else if self.ctx.is_logical_type(ty) {
            ConstantValue::Logical(false)
        } else {
            ConstantValue::Character(" ".to_string())
        };
        self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value,
                kind: None,
                end_loc: loc,
            },
            ty,
            loc,
        })
    }

    fn data_load_value(&mut self, state: &mut DataState) {
        while state.value_offset < state.values.len() {
            let value = state.values[state.value_offset];
            match &self.ctx.expr(value).kind {
                ExprKind::Repeated { count, value } => {
                    let count = fold::evaluate_as_int(&self.ctx, *count).unwrap_or(1);
                    if count <= 0 {
                        state.value_offset += 1;
                        continue;
                    }
                    state.repeat_left = count;
                    state.current = Some(*value);
                    return;
                }
                _ => {
                    state.repeat_left = 1;
                    state.current = Some(value);
                    return;
                }
            }
        }
        state.repeat_left = 0;
        state.current = None;
    }

    /// Takes the next value, checked against the object's type.
    fn data_next_value(
        &mut self,
        state: &mut DataState,
        object_ty: TypeId,
        object_loc: SourceLocation,
    ) -> Option<ExprId> {
        let Some(value) = state.current else {
            self.diags.report(
                Level::Error,
                object_loc,
                "not enough values in DATA statement",
            );
            state.exhausted = true;
            return None;
        };
        state.repeat_left -= 1;
        if state.repeat_left == 0 {
            state.value_offset += 1;
            self.data_load_value(state);
        }
        let value_loc = self.ctx.expr(value).loc;
        self.typecheck_assignment(object_ty, value, value_loc)
    }

    fn data_visit(&mut self, state: &mut DataState, object: ExprId) {
        match self.ctx.expr(object).kind.clone() {
            ExprKind::Var(decl) => self.data_visit_var(state, object, decl),
            ExprKind::ArrayElement { target, subscripts } => {
                self.data_visit_element(state, object, target, &subscripts)
            }
            ExprKind::Substring { target, start, end } => {
                self.data_visit_substring(state, object, target, start, end)
            }
            ExprKind::ImpliedDo {
                var,
                body,
                init,
                terminal,
                increment,
            } => self.data_visit_implied_do(state, var, &body, init, terminal, increment),
            _ => self.data_invalid_item(object),
        }
    }

    fn data_invalid_item(&mut self, object: ExprId) {
        let loc = self.ctx.expr(object).loc;
        self.diags
            .report(Level::Error, loc, "invalid item in DATA statement");
    }

    /// Named constants and dummy arguments cannot appear as DATA objects.
    fn data_check_var(&mut self, object: ExprId, decl: DeclId) -> bool {
        let Some(vd) = self.ctx.decl(decl).as_variable() else {
            self.data_invalid_item(object);
            return false;
        };
        if vd.attrs.contains(VarAttr::Parameter) || vd.attrs.contains(VarAttr::Argument) {
            self.data_invalid_item(object);
            return false;
        }
        true
    }

    fn data_visit_var(&mut self, state: &mut DataState, object: ExprId, decl: DeclId) {
        if !self.data_check_var(object, decl) {
            return;
        }
        let ty = self.ctx.decl(decl).as_variable().unwrap().ty;
        let object_loc = self.ctx.expr(object).loc;

        if self.ctx.as_array_type(ty).is_some() {
            // A whole-array object consumes one value per element.
            let Some(size) = self.ctx.array_size(ty) else {
                self.data_invalid_item(object);
                return;
            };
            let elem_ty = self.ctx.element_type(ty);
            let slots = state
                .partial
                .entry(decl)
                .or_insert_with(|| vec![None; size as usize]);
            debug_assert_eq!(slots.len(), size as usize);
            for index in 0..size as usize {
                let Some(value) = self.data_next_value(state, elem_ty, object_loc) else {
                    return;
                };
                state
                    .partial
                    .get_mut(&decl)
                    .expect("array slots registered above")[index] = Some(value);
            }
            return;
        }

        if let Some(value) = self.data_next_value(state, ty, object_loc) {
            if let Some(vd) = self.ctx.decl_mut(decl).as_variable_mut() {
                vd.init = Some(value);
            }
        }
    }

    fn data_visit_element(
        &mut self,
        state: &mut DataState,
        object: ExprId,
        target: ExprId,
        subscripts: &[ExprId],
    ) {
        let ExprKind::Var(decl) = &self.ctx.expr(target).kind else {
            self.data_invalid_item(object);
            return;
        };
        let decl = *decl;
        if !self.data_check_var(object, decl) {
            return;
        }
        let ty = self.ctx.decl(decl).as_variable().unwrap().ty;
        let Some(size) = self.ctx.array_size(ty) else {
            self.data_invalid_item(object);
            return;
        };
        let elem_ty = self.ctx.element_type(ty);
        let object_loc = self.ctx.expr(object).loc;

        let Some(offset) = self.data_element_offset(state, ty, subscripts) else {
            self.data_invalid_item(object);
            return;
        };
        let Some(value) = self.data_next_value(state, elem_ty, object_loc) else {
            return;
        };
        let slots = state
            .partial
            .entry(decl)
            .or_insert_with(|| vec![None; size as usize]);
        if (offset as usize) < slots.len() {
            slots[offset as usize] = Some(value);
        } else {
            self.diags.report(
                Level::Error,
                object_loc,
                "array subscript is out of bounds",
            );
        }
    }

    /// Column-major linear offset of an element, with implied-do bindings
    /// in scope.
    fn data_element_offset(
        &mut self,
        state: &DataState,
        array_ty: TypeId,
        subscripts: &[ExprId],
    ) -> Option<u64> {
        let dims = self.ctx.as_array_type(array_ty)?.dims.clone();
        if dims.len() != subscripts.len() {
            return None;
        }
        let mut offset: i64 = 0;
        let mut stride: i64 = 1;
        for (&dim, &sub) in dims.iter().zip(subscripts) {
            let (lb, ub) = self.ctx.spec_bounds(dim)?;
            let value = fold::evaluate_as_int_with(&self.ctx, sub, &state.scope)?;
            if value < lb || value > ub {
                return None;
            }
            offset += (value - lb) * stride;
            stride *= ub - lb + 1;
        }
        Some(offset as u64)
    }

    fn data_visit_substring(
        &mut self,
        state: &mut DataState,
        object: ExprId,
        target: ExprId,
        start: Option<ExprId>,
        end: Option<ExprId>,
    ) {
        let ExprKind::Var(decl) = &self.ctx.expr(target).kind else {
            self.data_invalid_item(object);
            return;
        };
        let decl = *decl;
        if !self.data_check_var(object, decl) {
            return;
        }
        let ty = self.ctx.decl(decl).as_variable().unwrap().ty;
        let len = self.ctx.character_length(ty).unwrap_or(1).max(0) as usize;
        let object_loc = self.ctx.expr(object).loc;

        let begin = match start {
            Some(s) => fold::evaluate_as_int_with(&self.ctx, s, &state.scope),
            None => Some(1),
        };
        let finish = match end {
            Some(e) => fold::evaluate_as_int_with(&self.ctx, e, &state.scope),
            None => Some(len as i64),
        };
        let (Some(begin), Some(finish)) = (begin, finish) else {
            self.data_invalid_item(object);
            return;
        };
        if begin < 1 || finish > len as i64 || begin > finish {
            self.data_invalid_item(object);
            return;
        }

        let object_ty = self.ctx.expr(object).ty;
        let Some(value) = self.data_next_value(state, object_ty, object_loc) else {
            return;
        };
        let Some(text) = fold::evaluate_as_str(&self.ctx, value) else {
            self.data_invalid_item(object);
            return;
        };

        // Build the full-length initializer: blanks outside the range,
        // the (blank-padded) value inside it.
        let prior = self
            .ctx
            .decl(decl)
            .as_variable()
            .and_then(|vd| vd.init)
            .and_then(|init| fold::evaluate_as_str(&self.ctx, init));
        let mut storage: Vec<u8> = match prior {
            Some(existing) => {
                let mut bytes = existing.into_bytes();
                bytes.resize(len, b' ');
                bytes
            }
            None => vec![b' '; len],
        };
        let value_bytes = text.as_bytes();
        for index in begin..=finish {
            let slot = (index - 1) as usize;
            let source = (index - begin) as usize;
            storage[slot] = value_bytes.get(source).copied().unwrap_or(b' ');
        }
        let storage = String::from_utf8_lossy(&storage).into_owned();
        let init = self.ctx.alloc_expr(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Character(storage),
                kind: None,
                end_loc: object_loc,
            },
            ty,
            loc: object_loc,
        });
        if let Some(vd) = self.ctx.decl_mut(decl).as_variable_mut() {
            vd.init = Some(init);
        }
    }

    fn data_visit_implied_do(
        &mut self,
        state: &mut DataState,
        var: DeclId,
        body: &[ExprId],
        init: ExprId,
        terminal: ExprId,
        increment: Option<ExprId>,
    ) {
        let start = fold::evaluate_as_int_with(&self.ctx, init, &state.scope);
        let end = fold::evaluate_as_int_with(&self.ctx, terminal, &state.scope);
        let step = match increment {
            Some(inc) => fold::evaluate_as_int_with(&self.ctx, inc, &state.scope),
            None => Some(1),
        };
        let (Some(start), Some(end), Some(step)) = (start, end, step) else {
            let loc = self.ctx.expr(init).loc;
            self.diags.report(
                Level::Error,
                loc,
                "implied-do bounds must be constant integer expressions",
            );
            return;
        };
        if step == 0 {
            let loc = self.ctx.expr(init).loc;
            self.diags
                .report(Level::Error, loc, "implied-do increment cannot be zero");
            return;
        }

        let mut counter = start;
        while (step > 0 && counter <= end) || (step < 0 && counter >= end) {
            state.scope.assign(var, counter);
            for &item in body {
                self.data_visit(state, item);
                if state.exhausted {
                    return;
                }
            }
            counter += step;
        }
    }
}
