//! Executable statement actions: assignment, IF, GOTO and friends, STOP,
//! PRINT, CALL, RETURN and blocks.

use crate::decl::{Decl, DeclKind, VarAttr};
use crate::errors::Level;
use crate::expr::{ExprId, ExprKind};
use crate::fold;
use crate::source::SourceLocation;
use crate::stmt::{FormatSpec, IfBranch, LabelRef, Stmt, StmtId, StmtKind};
use crate::types::Intent;

use super::{ForwardSlot, Sema};

impl Sema {
    pub fn act_on_assignment(
        &mut self,
        loc: SourceLocation,
        lhs: ExprId,
        rhs: ExprId,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        if !self.ctx.expr(lhs).is_designator() {
            let lhs_loc = self.ctx.expr(lhs).loc;
            self.diags
                .report(Level::Error, lhs_loc, "expression is not assignable");
            return None;
        }
        self.check_assignable(lhs);

        let lhs_ty = self.ctx.expr(lhs).ty;
        let rhs = self.typecheck_assignment(lhs_ty, rhs, loc).unwrap_or(rhs);

        Some(self.append_stmt(Stmt {
            kind: StmtKind::Assignment { lhs, rhs },
            loc,
            label: stmt_label,
        }))
    }

    /// Named constants and INTENT(IN) dummy arguments cannot be stored to.
    fn check_assignable(&mut self, lhs: ExprId) {
        let mut target = lhs;
        loop {
            match &self.ctx.expr(target).kind {
                ExprKind::ArrayElement { target: inner, .. }
                | ExprKind::Substring { target: inner, .. } => target = *inner,
                _ => break,
            }
        }
        let ExprKind::Var(decl) = &self.ctx.expr(target).kind else {
            return;
        };
        let decl = *decl;
        let Some(vd) = self.ctx.decl(decl).as_variable() else {
            return;
        };
        let is_parameter = vd.attrs.contains(VarAttr::Parameter);
        let is_intent_in = vd.attrs.contains(VarAttr::Argument) && vd.intent == Some(Intent::In);
        if is_parameter || is_intent_in {
            let loc = self.ctx.expr(target).loc;
            let what = if is_parameter {
                "named constant"
            } else {
                "INTENT(IN) dummy argument"
            };
            let name = self
                .ctx
                .decl(decl)
                .name
                .map(|n| self.ctx.idents.text(n).to_string())
                .unwrap_or_default();
            self.diags.report(
                Level::Error,
                loc,
                format!("assignment to {} `{}`", what, name),
            );
        }
    }

    // Blocks. Branch bodies are bracketed with `begin_block`/`end_block`;
    // statements constructed in between accumulate into the block instead
    // of the surrounding body.

    pub fn begin_block(&mut self) {
        self.push_body_frame();
    }

    pub fn end_block(&mut self, loc: SourceLocation) -> StmtId {
        let body = self.pop_body_frame();
        self.ctx.alloc_stmt(Stmt {
            kind: StmtKind::Block { body },
            loc,
            label: None,
        })
    }

    /// A block statement over an explicit statement list.
    pub fn act_on_block(
        &mut self,
        loc: SourceLocation,
        body: Vec<StmtId>,
        stmt_label: Option<u32>,
    ) -> StmtId {
        self.append_stmt(Stmt {
            kind: StmtKind::Block { body },
            loc,
            label: stmt_label,
        })
    }

    /// An IF construct. Each arm pairs an optional condition with its body;
    /// the ELSE arm has no condition and must come last.
    pub fn act_on_if(
        &mut self,
        loc: SourceLocation,
        branches: Vec<(Option<ExprId>, StmtId)>,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        if branches.is_empty() {
            self.diags
                .report(Level::Error, loc, "IF construct without branches");
            return None;
        }
        for (index, (condition, _)) in branches.iter().enumerate() {
            match condition {
                Some(cond) => {
                    let cond_ty = self.ctx.expr(*cond).ty;
                    if !self.ctx.is_logical_type(cond_ty) {
                        let cond_loc = self.ctx.expr(*cond).loc;
                        self.diags.report(
                            Level::Error,
                            cond_loc,
                            format!(
                                "expected a logical expression, found {}",
                                self.ctx.display_type(cond_ty)
                            ),
                        );
                    }
                }
                None => {
                    if index + 1 != branches.len() {
                        self.diags
                            .report(Level::Error, loc, "ELSE branch must come last");
                    }
                }
            }
        }
        let branches = branches
            .into_iter()
            .map(|(condition, body)| IfBranch { condition, body })
            .collect();
        Some(self.append_stmt(Stmt {
            kind: StmtKind::If { branches },
            loc,
            label: stmt_label,
        }))
    }

    pub fn act_on_continue(&mut self, loc: SourceLocation, stmt_label: Option<u32>) -> StmtId {
        self.append_stmt(Stmt {
            kind: StmtKind::Continue,
            loc,
            label: stmt_label,
        })
    }

    pub fn act_on_stop(
        &mut self,
        loc: SourceLocation,
        code: Option<ExprId>,
        stmt_label: Option<u32>,
    ) -> StmtId {
        if let Some(code) = code {
            let code_ty = self.ctx.expr(code).ty;
            let ok = (self.ctx.is_integer_type(code_ty) || self.ctx.is_character_type(code_ty))
                && fold::is_evaluable(&self.ctx, code);
            if !ok {
                let code_loc = self.ctx.expr(code).loc;
                self.diags.report(
                    Level::Error,
                    code_loc,
                    "stop code must be an integer or character constant",
                );
            }
        }
        self.append_stmt(Stmt {
            kind: StmtKind::Stop { code },
            loc,
            label: stmt_label,
        })
    }

    pub fn act_on_goto(
        &mut self,
        loc: SourceLocation,
        target_label: u32,
        target_loc: SourceLocation,
        stmt_label: Option<u32>,
    ) -> StmtId {
        let stmt = self.append_stmt(Stmt {
            kind: StmtKind::Goto {
                target: LabelRef::new(target_label, target_loc),
            },
            loc,
            label: stmt_label,
        });
        self.reference_label(target_label, target_loc, stmt, ForwardSlot::GotoTarget);
        stmt
    }

    /// `ASSIGN label TO var` stores a label in an integer variable for a
    /// later assigned GOTO.
    pub fn act_on_assign(
        &mut self,
        loc: SourceLocation,
        target_label: u32,
        target_loc: SourceLocation,
        variable: ExprId,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        if !self.check_integer_var(variable) {
            return None;
        }
        let stmt = self.append_stmt(Stmt {
            kind: StmtKind::Assign {
                target: LabelRef::new(target_label, target_loc),
                variable,
            },
            loc,
            label: stmt_label,
        });
        self.reference_label(target_label, target_loc, stmt, ForwardSlot::AssignTarget);
        Some(stmt)
    }

    pub fn act_on_assigned_goto(
        &mut self,
        loc: SourceLocation,
        variable: ExprId,
        allowed: Vec<(u32, SourceLocation)>,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        if !self.check_integer_var(variable) {
            return None;
        }
        let refs: Vec<LabelRef> = allowed
            .iter()
            .map(|&(label, label_loc)| LabelRef::new(label, label_loc))
            .collect();
        let stmt = self.append_stmt(Stmt {
            kind: StmtKind::AssignedGoto {
                variable,
                allowed: refs,
            },
            loc,
            label: stmt_label,
        });
        for (index, (label, label_loc)) in allowed.into_iter().enumerate() {
            self.reference_label(label, label_loc, stmt, ForwardSlot::AssignedGotoAllowed(index));
        }
        Some(stmt)
    }

    fn check_integer_var(&mut self, variable: ExprId) -> bool {
        let expr = self.ctx.expr(variable);
        let loc = expr.loc;
        let is_var = matches!(expr.kind, ExprKind::Var(_));
        let is_integer = self.ctx.is_integer_type(expr.ty);
        if !is_var || !is_integer {
            self.diags
                .report(Level::Error, loc, "expected an integer variable");
            return false;
        }
        true
    }

    // Format specifiers for PRINT.

    pub fn act_on_star_format_spec(&mut self, _loc: SourceLocation) -> FormatSpec {
        FormatSpec::Star
    }

    pub fn act_on_char_expr_format_spec(
        &mut self,
        loc: SourceLocation,
        format: ExprId,
    ) -> FormatSpec {
        let ty = self.ctx.expr(format).ty;
        if !self.ctx.is_character_type(ty) {
            self.diags.report(
                Level::Error,
                loc,
                format!(
                    "expected a character format expression, found {}",
                    self.ctx.display_type(ty)
                ),
            );
        }
        FormatSpec::CharExpr(format)
    }

    pub fn act_on_label_format_spec(&mut self, loc: SourceLocation, label: u32) -> FormatSpec {
        FormatSpec::Label(LabelRef::new(label, loc))
    }

    pub fn act_on_print(
        &mut self,
        loc: SourceLocation,
        format: FormatSpec,
        items: Vec<ExprId>,
        stmt_label: Option<u32>,
    ) -> StmtId {
        for &item in &items {
            let item_ty = self.ctx.element_type(self.ctx.expr(item).ty);
            if self.ctx.builtin_of(item_ty).is_none() {
                let item_loc = self.ctx.expr(item).loc;
                self.diags.report(
                    Level::Error,
                    item_loc,
                    format!(
                        "output item of type {} cannot be printed",
                        self.ctx.display_type(item_ty)
                    ),
                );
            }
        }
        let label_ref = match &format {
            FormatSpec::Label(lr) => Some((lr.label, lr.loc)),
            _ => None,
        };
        let stmt = self.append_stmt(Stmt {
            kind: StmtKind::Print { format, items },
            loc,
            label: stmt_label,
        });
        if let Some((label, label_loc)) = label_ref {
            self.reference_label(label, label_loc, stmt, ForwardSlot::PrintFormat);
        }
        stmt
    }

    /// CALL resolves the subroutine, creating an implicit external
    /// declaration on first use of an unknown name.
    pub fn act_on_call(
        &mut self,
        loc: SourceLocation,
        id_loc: SourceLocation,
        name: &str,
        args: Vec<ExprId>,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        let name_id = self.ctx.idents.intern(name);
        let subroutine = match self.lookup(name_id) {
            Some(decl) => match &self.ctx.decl(decl).kind {
                DeclKind::Subroutine { .. } => decl,
                _ => {
                    self.diags.report(
                        Level::Error,
                        id_loc,
                        format!("`{}` is not a subroutine", self.ctx.idents.text(name_id)),
                    );
                    return None;
                }
            },
            None => {
                let decl = self.ctx.alloc_decl(Decl {
                    kind: DeclKind::Subroutine {
                        decls: Vec::new(),
                        args: Vec::new(),
                        body: Vec::new(),
                        external: true,
                    },
                    loc: id_loc,
                    name: Some(name_id),
                    parent: Some(self.current_context()),
                });
                self.declare(name_id, decl);
                decl
            }
        };
        let args = self.check_call_arguments(loc, subroutine, args);
        Some(self.append_stmt(Stmt {
            kind: StmtKind::Call { subroutine, args },
            loc,
            label: stmt_label,
        }))
    }

    pub fn act_on_return(
        &mut self,
        loc: SourceLocation,
        value: Option<ExprId>,
        stmt_label: Option<u32>,
    ) -> Option<StmtId> {
        let subprogram = self.current_subprogram();
        let value = match (subprogram, value) {
            (None, _) => {
                self.diags
                    .report(Level::Error, loc, "RETURN outside a subprogram");
                value
            }
            (Some(decl), Some(v)) => match &self.ctx.decl(decl).kind {
                DeclKind::Function { result, .. } => {
                    let result = *result;
                    Some(self.typecheck_assignment(result, v, loc).unwrap_or(v))
                }
                _ => {
                    // Alternate-return selector in a subroutine.
                    let v_ty = self.ctx.expr(v).ty;
                    if !self.ctx.is_integer_type(v_ty) {
                        let v_loc = self.ctx.expr(v).loc;
                        self.diags
                            .report(Level::Error, v_loc, "expected an integer expression");
                    }
                    Some(v)
                }
            },
            (_, None) => None,
        };
        Some(self.append_stmt(Stmt {
            kind: StmtKind::Return { value },
            loc,
            label: stmt_label,
        }))
    }
}
