//! End-to-end tests that drive the analyzer's action API the way the
//! parser would, then assert on the typed tree.

use f77front::decl::{DeclId, DeclKind, VarAttr};
use f77front::expr::{BinaryOp, ConstantValue, ExprId, ExprKind, UnaryOp};
use f77front::fold;
use f77front::intrinsics::IntrinsicKind;
use f77front::stmt::{LetterRange, StmtKind};
use f77front::types::{ArraySpec, TypeId};
use f77front::{DeclSpec, Level, Sema, SemaOptions, SourceLocation, TypeSpec};

fn loc(offset: usize) -> SourceLocation {
    SourceLocation::new(offset)
}

/// A fresh analyzer with an open translation unit and main program.
fn program(name: &str) -> Sema {
    let mut sema = Sema::new(SemaOptions::default());
    sema.begin_unit();
    sema.begin_main_program(Some(name), loc(0), loc(8));
    sema
}

fn finish(sema: &mut Sema, name: &str) {
    sema.end_main_program(Some(name), loc(900), loc(904), None);
    sema.end_unit();
}

fn int_const(sema: &mut Sema, text: &str) -> ExprId {
    sema.act_on_int_constant(loc(50), loc(51), text, None)
        .expect("integer constant")
}

fn real_const(sema: &mut Sema, text: &str) -> ExprId {
    sema.act_on_real_constant(loc(50), loc(53), text, None)
        .expect("real constant")
}

fn var_decl_of(sema: &Sema, expr: ExprId) -> DeclId {
    match &sema.ctx.expr(expr).kind {
        ExprKind::Var(decl) => *decl,
        other => panic!("expected a variable reference, found {:?}", other),
    }
}

fn declare_scalar(sema: &mut Sema, spec: TypeSpec, name: &str) -> DeclId {
    let ds = DeclSpec::new(spec, loc(10));
    let ty = sema.act_on_type_name(&ds);
    sema.act_on_entity_decl(ty, loc(12), name)
        .expect("entity declaration")
}

fn declare_array(sema: &mut Sema, spec: TypeSpec, name: &str, extent: &str) -> DeclId {
    let upper = int_const(sema, extent);
    let dim = sema
        .ctx
        .alloc_array_spec(ArraySpec::ExplicitShape { lower: None, upper });
    let mut ds = DeclSpec::new(spec, loc(10));
    ds.dims.push(dim);
    let ty = sema.act_on_type_name(&ds);
    sema.act_on_entity_decl(ty, loc(12), name)
        .expect("array declaration")
}

fn errors_of(sema: &Sema) -> Vec<String> {
    sema.diags
        .diagnostics()
        .iter()
        .filter(|d| d.level >= Level::Error)
        .map(|d| d.message.clone())
        .collect()
}

// Scenario: implicit typing. `i = 1` and `x = 1.0` auto-create an INTEGER
// and a REAL variable with no diagnostics.
#[test]
fn implicit_typing_creates_default_typed_variables() {
    let mut sema = program("p");

    let i = sema.act_on_var_ref(loc(12), "i").unwrap();
    let one = int_const(&mut sema, "1");
    sema.act_on_assignment(loc(12), i, one, None).unwrap();

    let x = sema.act_on_var_ref(loc(20), "x").unwrap();
    let one_f = real_const(&mut sema, "1.0");
    sema.act_on_assignment(loc(20), x, one_f, None).unwrap();

    finish(&mut sema, "p");

    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
    let i_decl = var_decl_of(&sema, i);
    let x_decl = var_decl_of(&sema, x);
    let i_var = sema.ctx.decl(i_decl).as_variable().unwrap();
    let x_var = sema.ctx.decl(x_decl).as_variable().unwrap();
    assert_eq!(i_var.ty, sema.ctx.integer_ty);
    assert_eq!(x_var.ty, sema.ctx.real_ty);
    assert!(i_var.implicit && x_var.implicit);

    // Both assignments made it into the program body.
    let body = match &sema.ctx.decl(sema.ctx.translation_unit()).kind {
        DeclKind::TranslationUnit { decls } => match &sema.ctx.decl(decls[0]).kind {
            DeclKind::MainProgram { body, .. } => body.clone(),
            other => panic!("expected a main program, found {:?}", other),
        },
        _ => unreachable!(),
    };
    let assignments = body
        .iter()
        .filter(|&&s| matches!(sema.ctx.stmt(s).kind, StmtKind::Assignment { .. }))
        .count();
    assert_eq!(assignments, 2);
}

// Scenario: precedence comes from the parser's call nesting and is
// preserved: X = X + Y * Z.
#[test]
fn binary_nesting_is_preserved() {
    let mut sema = program("p");

    let x = sema.act_on_var_ref(loc(12), "x").unwrap();
    let y = sema.act_on_var_ref(loc(16), "y").unwrap();
    let z = sema.act_on_var_ref(loc(20), "z").unwrap();
    let mul = sema
        .act_on_binary(loc(18), BinaryOp::Multiply, y, z)
        .unwrap();
    let x2 = sema.act_on_var_ref(loc(14), "x").unwrap();
    let add = sema.act_on_binary(loc(15), BinaryOp::Plus, x2, mul).unwrap();
    let stmt = sema.act_on_assignment(loc(12), x, add, None).unwrap();

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    let StmtKind::Assignment { lhs, rhs } = &sema.ctx.stmt(stmt).kind else {
        panic!("expected an assignment");
    };
    assert!(matches!(sema.ctx.expr(*lhs).kind, ExprKind::Var(_)));
    let ExprKind::Binary { op, lhs: a, rhs: b } = &sema.ctx.expr(*rhs).kind else {
        panic!("expected a binary expression");
    };
    assert_eq!(*op, BinaryOp::Plus);
    assert!(matches!(sema.ctx.expr(*a).kind, ExprKind::Var(_)));
    let ExprKind::Binary { op: inner, .. } = &sema.ctx.expr(*b).kind else {
        panic!("expected a nested multiply");
    };
    assert_eq!(*inner, BinaryOp::Multiply);
    // All operands are default real; no conversions were inserted.
    assert_eq!(sema.ctx.expr(*rhs).ty, sema.ctx.real_ty);
}

// Scenario: implicit cast insertion on assignment. INTEGER I; REAL R;
// I = R wraps the right-hand side in a conversion to INTEGER.
#[test]
fn assignment_inserts_conversion_to_lhs_type() {
    let mut sema = program("p");

    declare_scalar(&mut sema, TypeSpec::Integer, "i");
    declare_scalar(&mut sema, TypeSpec::Real, "r");
    let i = sema.act_on_var_ref(loc(30), "i").unwrap();
    let r = sema.act_on_var_ref(loc(34), "r").unwrap();
    let stmt = sema.act_on_assignment(loc(30), i, r, None).unwrap();

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    let StmtKind::Assignment { rhs, .. } = &sema.ctx.stmt(stmt).kind else {
        panic!("expected an assignment");
    };
    let cast = sema.ctx.expr(*rhs);
    let ExprKind::ImplicitCast(inner) = cast.kind else {
        panic!("expected an implicit cast, found {:?}", cast.kind);
    };
    assert_eq!(cast.ty, sema.ctx.integer_ty);
    assert_eq!(var_decl_of(&sema, inner), var_decl_of(&sema, r));
}

// Scenario: redeclaration. The second declaration of I reports an error
// with a note at the first and creates no declaration.
#[test]
fn redeclaration_reports_and_creates_nothing() {
    let mut sema = program("p");

    let first = declare_scalar(&mut sema, TypeSpec::Integer, "i");
    let ds = DeclSpec::new(TypeSpec::Real, loc(20));
    let real_ty = sema.act_on_type_name(&ds);
    let second = sema.act_on_entity_decl(real_ty, loc(22), "i");
    assert!(second.is_none());

    let errors = errors_of(&sema);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("redefinition of `i`"), "{}", errors[0]);
    let diag = &sema.diags.diagnostics()[0];
    assert_eq!(diag.notes.len(), 1);
    assert!(diag.notes[0].message.contains("previous definition"));

    // Only the first declaration is in the program's context.
    let program_ctx = sema.ctx.decl(first).parent.unwrap();
    let members = sema.ctx.decl(program_ctx).context_decls().unwrap();
    assert_eq!(members.iter().filter(|&&d| d == first).count(), 1);
    assert_eq!(members.len(), 1);
}

// Scenario: DATA with an implied do over an array, initialized from a
// repeated constant.
#[test]
fn data_implied_do_with_repeat_count() {
    let mut sema = program("p");

    let a = declare_array(&mut sema, TypeSpec::Integer, "a", "10");

    let a_ref = sema.act_on_var_ref(loc(40), "a").unwrap();
    let i_ref = sema.act_on_data_reference(loc(42), "i").unwrap();
    assert!(matches!(
        sema.ctx.expr(i_ref).kind,
        ExprKind::Unresolved(_)
    ));
    let element = sema
        .act_on_array_element(loc(40), a_ref, vec![i_ref])
        .unwrap();

    let init = int_const(&mut sema, "1");
    let terminal = int_const(&mut sema, "10");
    let implied = sema
        .act_on_data_implied_do(loc(40), loc(42), "i", vec![element], init, terminal, None)
        .unwrap();

    let count = int_const(&mut sema, "10");
    let zero = int_const(&mut sema, "0");
    let repeated = sema.act_on_data_constant(loc(60), Some(count), zero).unwrap();

    sema.act_on_data(loc(38), vec![implied], vec![repeated], None)
        .unwrap();
    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    // The implied do carries the loop variable, body, and bounds.
    let ExprKind::ImpliedDo {
        var,
        body,
        init,
        terminal,
        increment,
    } = &sema.ctx.expr(implied).kind
    else {
        panic!("expected an implied do");
    };
    assert_eq!(body.len(), 1);
    assert!(increment.is_none());
    assert_eq!(fold::evaluate_as_int(&sema.ctx, *init), Some(1));
    assert_eq!(fold::evaluate_as_int(&sema.ctx, *terminal), Some(10));
    let loop_var = sema.ctx.decl(*var).as_variable().unwrap();
    assert_eq!(loop_var.ty, sema.ctx.integer_ty);

    // The formerly unresolved subscript now refers to the loop variable.
    match &sema.ctx.expr(i_ref).kind {
        ExprKind::Var(decl) => assert_eq!(decl, var),
        other => panic!("subscript was not resolved: {:?}", other),
    }

    // The value is a repeat pair 10 * 0.
    let ExprKind::Repeated { count, value } = &sema.ctx.expr(repeated).kind else {
        panic!("expected a repeated constant");
    };
    assert_eq!(fold::evaluate_as_int(&sema.ctx, *count), Some(10));
    assert_eq!(fold::evaluate_as_int(&sema.ctx, *value), Some(0));

    // The array got a full initializer out of the expansion.
    let init = sema.ctx.decl(a).as_variable().unwrap().init.unwrap();
    let ExprKind::ArrayConstructor { items } = &sema.ctx.expr(init).kind else {
        panic!("expected an array constructor initializer");
    };
    assert_eq!(items.len(), 10);
    for &item in items {
        assert_eq!(fold::evaluate_as_int(&sema.ctx, item), Some(0));
    }
}

// Scenario: label resolution. The GOTO's target is the labeled CONTINUE
// after END PROGRAM; without the CONTINUE the label is fatal.
#[test]
fn goto_resolves_to_labeled_continue() {
    let mut sema = program("p");

    let goto = sema.act_on_goto(loc(12), 100, loc(17), None);
    let cont = sema.act_on_continue(loc(30), Some(100));
    finish(&mut sema, "p");

    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
    let StmtKind::Goto { target } = &sema.ctx.stmt(goto).kind else {
        panic!("expected a goto");
    };
    assert_eq!(target.target, Some(cont));
}

#[test]
fn unresolved_label_is_fatal() {
    let mut sema = program("p");
    sema.act_on_goto(loc(12), 100, loc(17), None);
    finish(&mut sema, "p");

    assert!(sema.diags.had_fatal());
    let fatal: Vec<_> = sema
        .diags
        .diagnostics()
        .iter()
        .filter(|d| d.level == Level::Fatal)
        .collect();
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].message.contains("undeclared statement label 100"));
}

// Type identity: equal construction requests intern to one handle,
// differing requests to distinct handles.
#[test]
fn type_interning_is_identity() {
    let mut sema = Sema::new(SemaOptions::default());

    let int8_a = sema.ctx.type_with_kind(f77front::types::BuiltinType::Integer, 8);
    let int8_b = sema.ctx.type_with_kind(f77front::types::BuiltinType::Integer, 8);
    assert_eq!(int8_a, int8_b);
    let int2 = sema.ctx.type_with_kind(f77front::types::BuiltinType::Integer, 2);
    assert_ne!(int8_a, int2);

    let upper = sema.ctx.int_constant_expr(5, loc(0));
    let dim = sema
        .ctx
        .alloc_array_spec(ArraySpec::ExplicitShape { lower: None, upper });
    let elem = sema.ctx.integer_ty;
    let arr_a = sema.ctx.array_type(elem, vec![dim]);
    let arr_b = sema.ctx.array_type(elem, vec![dim]);
    assert_eq!(arr_a, arr_b);

    let other_dim = sema.ctx.alloc_array_spec(ArraySpec::DeferredShape);
    let arr_c = sema.ctx.array_type(elem, vec![other_dim]);
    assert_ne!(arr_a, arr_c);

    let ptr_a = sema.ctx.pointer_type(elem, 2);
    let ptr_b = sema.ctx.pointer_type(elem, 2);
    assert_eq!(ptr_a, ptr_b);
    assert_ne!(ptr_a, sema.ctx.pointer_type(elem, 1));
}

// Declaration lookup: a name bound in a program unit is restored to its
// prior binding when the unit ends.
#[test]
fn scope_exit_restores_prior_binding() {
    let mut sema = Sema::new(SemaOptions::default());
    sema.begin_unit();

    sema.begin_main_program(Some("one"), loc(0), loc(8));
    let x1 = sema.act_on_var_ref(loc(12), "x").unwrap();
    sema.end_main_program(Some("one"), loc(40), loc(44), None);

    sema.begin_main_program(Some("two"), loc(50), loc(58));
    let x2 = sema.act_on_var_ref(loc(62), "x").unwrap();
    sema.end_main_program(Some("two"), loc(90), loc(94), None);
    sema.end_unit();

    let d1 = var_decl_of(&sema, x1);
    let d2 = var_decl_of(&sema, x2);
    assert_ne!(d1, d2, "bindings must not leak across program units");
    assert_ne!(sema.ctx.decl(d1).parent, sema.ctx.decl(d2).parent);
}

// Constant folding: host arithmetic modulo the declared kind.
#[test]
fn folding_matches_host_arithmetic() {
    let mut sema = program("p");

    let three = int_const(&mut sema, "3");
    let four = int_const(&mut sema, "4");
    let two = int_const(&mut sema, "2");
    let mul = sema
        .act_on_binary(loc(50), BinaryOp::Multiply, three, four)
        .unwrap();
    let sum = sema.act_on_binary(loc(50), BinaryOp::Plus, mul, two).unwrap();
    assert_eq!(fold::evaluate_as_int(&sema.ctx, sum), Some(14));
    assert!(fold::is_evaluable(&sema.ctx, sum));

    let ten = int_const(&mut sema, "10");
    let two_b = int_const(&mut sema, "2");
    let pow = sema
        .act_on_binary(loc(50), BinaryOp::Power, two_b, ten)
        .unwrap();
    assert_eq!(fold::evaluate_as_int(&sema.ctx, pow), Some(1024));

    let five = int_const(&mut sema, "5");
    let neg = sema.act_on_unary(loc(50), UnaryOp::Minus, five).unwrap();
    assert_eq!(fold::evaluate_as_int(&sema.ctx, neg), Some(-5));

    finish(&mut sema, "p");
}

#[test]
fn integer_folding_wraps_at_the_declared_kind() {
    let mut sema = program("p");

    let kind = int_const(&mut sema, "1");
    let big = sema
        .act_on_int_constant(loc(50), loc(53), "127", Some(kind))
        .unwrap();
    let one = sema
        .act_on_int_constant(loc(56), loc(57), "1", Some(kind))
        .unwrap();
    let sum = sema.act_on_binary(loc(55), BinaryOp::Plus, big, one).unwrap();
    // 127 + 1 wraps to -128 in an 8-bit kind.
    assert_eq!(fold::evaluate_as_int(&sema.ctx, sum), Some(-128));

    finish(&mut sema, "p");
}

#[test]
fn non_evaluable_children_are_gathered() {
    let mut sema = program("p");

    let x = sema.act_on_var_ref(loc(12), "x").unwrap();
    let one = real_const(&mut sema, "1.0");
    let sum = sema.act_on_binary(loc(13), BinaryOp::Plus, x, one).unwrap();
    assert!(!fold::is_evaluable(&sema.ctx, sum));
    let mut blockers = Vec::new();
    fold::gather_non_evaluable(&sema.ctx, sum, &mut blockers);
    assert_eq!(blockers, vec![x]);

    finish(&mut sema, "p");
}

// Implicit conversion: a mixed-kind arithmetic pair gets exactly one cast,
// around the narrower operand, and the result takes the promotion.
#[test]
fn mixed_operands_promote_with_one_cast() {
    let mut sema = program("p");

    let i = sema.act_on_var_ref(loc(12), "i").unwrap(); // integer
    let x = sema.act_on_var_ref(loc(16), "x").unwrap(); // real
    let sum = sema.act_on_binary(loc(14), BinaryOp::Plus, i, x).unwrap();

    let ExprKind::Binary { lhs, rhs, .. } = &sema.ctx.expr(sum).kind else {
        panic!("expected a binary expression");
    };
    assert_eq!(sema.ctx.expr(sum).ty, sema.ctx.real_ty);
    let ExprKind::ImplicitCast(inner) = sema.ctx.expr(*lhs).kind else {
        panic!("expected the integer operand to be cast");
    };
    assert_eq!(inner, i);
    assert_eq!(sema.ctx.expr(*lhs).ty, sema.ctx.real_ty);
    assert!(matches!(sema.ctx.expr(*rhs).kind, ExprKind::Var(_)));

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn power_keeps_integer_exponent_uncast() {
    let mut sema = program("p");

    let x = sema.act_on_var_ref(loc(12), "x").unwrap(); // real
    let i = sema.act_on_var_ref(loc(16), "i").unwrap(); // integer
    let pow = sema.act_on_binary(loc(14), BinaryOp::Power, x, i).unwrap();

    let ExprKind::Binary { rhs, .. } = &sema.ctx.expr(pow).kind else {
        panic!("expected a binary expression");
    };
    assert!(matches!(sema.ctx.expr(*rhs).kind, ExprKind::Var(_)));
    assert_eq!(sema.ctx.expr(pow).ty, sema.ctx.real_ty);

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn relational_result_is_default_logical() {
    let mut sema = program("p");

    let i = sema.act_on_var_ref(loc(12), "i").unwrap();
    let x = sema.act_on_var_ref(loc(16), "x").unwrap();
    let cmp = sema
        .act_on_binary(loc(14), BinaryOp::LessThan, i, x)
        .unwrap();
    assert_eq!(sema.ctx.expr(cmp).ty, sema.ctx.logical_ty);

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn concat_sums_operand_lengths() {
    let mut sema = program("p");

    let ab = sema.act_on_char_constant(loc(12), loc(16), "ab").unwrap();
    let cde = sema.act_on_char_constant(loc(20), loc(25), "cde").unwrap();
    let cat = sema
        .act_on_binary(loc(18), BinaryOp::Concat, ab, cde)
        .unwrap();
    assert_eq!(sema.ctx.character_length(sema.ctx.expr(cat).ty), Some(5));
    assert_eq!(
        fold::evaluate_as_str(&sema.ctx, cat).as_deref(),
        Some("abcde")
    );

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn logical_assignment_from_integer_is_an_error() {
    let mut sema = program("p");

    declare_scalar(&mut sema, TypeSpec::Logical, "flag");
    let flag = sema.act_on_var_ref(loc(30), "flag").unwrap();
    let one = int_const(&mut sema, "1");
    sema.act_on_assignment(loc(30), flag, one, None);

    let errors = errors_of(&sema);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("incompatible"), "{}", errors[0]);
}

#[test]
fn assignment_to_named_constant_is_an_error() {
    let mut sema = program("p");

    let ten = int_const(&mut sema, "10");
    let pair = sema.act_on_parameter_pair(loc(12), "n", ten).unwrap();
    sema.act_on_parameter(loc(10), vec![pair], None);

    let n = sema.act_on_var_ref(loc(30), "n").unwrap();
    let two = int_const(&mut sema, "2");
    sema.act_on_assignment(loc(30), n, two, None);

    let errors = errors_of(&sema);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("named constant"), "{}", errors[0]);
}

#[test]
fn parameter_constants_participate_in_folding() {
    let mut sema = program("p");

    let ten = int_const(&mut sema, "10");
    let pair = sema.act_on_parameter_pair(loc(12), "n", ten).unwrap();
    sema.act_on_parameter(loc(10), vec![pair], None);

    let n_ref = sema.act_on_var_ref(loc(30), "n").unwrap();
    let two = int_const(&mut sema, "2");
    let double = sema
        .act_on_binary(loc(31), BinaryOp::Multiply, n_ref, two)
        .unwrap();
    assert_eq!(fold::evaluate_as_int(&sema.ctx, double), Some(20));

    // The declaration carries the parameter attribute and initializer.
    let (decl, _) = pair;
    let vd = sema.ctx.decl(decl).as_variable().unwrap();
    assert!(vd.attrs.contains(VarAttr::Parameter));
    assert!(vd.init.is_some());

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn parameter_redeclaration_notes_prior_definition() {
    let mut sema = program("p");

    let ten = int_const(&mut sema, "10");
    sema.act_on_parameter_pair(loc(12), "n", ten).unwrap();
    let twenty = int_const(&mut sema, "20");
    let second = sema.act_on_parameter_pair(loc(40), "n", twenty);
    assert!(second.is_none());

    let errors = errors_of(&sema);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("redefinition"), "{}", errors[0]);
}

// IMPLICIT statements overwrite letter ranges; IMPLICIT NONE makes
// undeclared references an error but still creates a recovery declaration.
#[test]
fn implicit_statement_overrides_letter_rules() {
    let mut sema = program("p");

    let ds = DeclSpec::new(TypeSpec::Character, loc(10));
    let ranges = [LetterRange {
        start: 'q',
        end: Some('t'),
    }];
    sema.act_on_implicit(loc(10), Some((&ds, &ranges)), None);

    let s = sema.act_on_var_ref(loc(30), "s").unwrap();
    let s_decl = var_decl_of(&sema, s);
    let ty = sema.ctx.decl(s_decl).as_variable().unwrap().ty;
    assert!(sema.ctx.is_character_type(ty));

    // Letters outside the range keep their defaults.
    let k = sema.act_on_var_ref(loc(40), "k").unwrap();
    let k_ty = sema.ctx.decl(var_decl_of(&sema, k)).as_variable().unwrap().ty;
    assert_eq!(k_ty, sema.ctx.integer_ty);

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn implicit_none_rejects_undeclared_names_with_recovery() {
    let mut sema = program("p");

    sema.act_on_implicit(loc(10), None, None);
    let x = sema.act_on_var_ref(loc(30), "x").unwrap();

    let errors = errors_of(&sema);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("undeclared variable `x`"), "{}", errors[0]);

    // The recovery declaration is default real so checking continues.
    let decl = var_decl_of(&sema, x);
    assert_eq!(
        sema.ctx.decl(decl).as_variable().unwrap().ty,
        sema.ctx.real_ty
    );

    // Subsequent uses resolve to the same declaration without piling up
    // more errors.
    let x2 = sema.act_on_var_ref(loc(40), "x").unwrap();
    assert_eq!(var_decl_of(&sema, x2), decl);
    assert_eq!(errors_of(&sema).len(), 1);
}

#[test]
fn duplicate_implicit_letter_is_an_error() {
    let mut sema = program("p");

    let ds = DeclSpec::new(TypeSpec::Integer, loc(10));
    let ranges = [LetterRange {
        start: 'a',
        end: Some('c'),
    }];
    sema.act_on_implicit(loc(10), Some((&ds, &ranges)), None);

    let ds2 = DeclSpec::new(TypeSpec::Real, loc(20));
    let overlap = [LetterRange {
        start: 'b',
        end: None,
    }];
    sema.act_on_implicit(loc(20), Some((&ds2, &overlap)), None);

    let errors = errors_of(&sema);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("already has an IMPLICIT rule"), "{}", errors[0]);
}

// DIMENSION wraps the declared type outside-in.
#[test]
fn dimension_statement_wraps_existing_type() {
    let mut sema = program("p");

    declare_scalar(&mut sema, TypeSpec::Real, "v");
    let upper = int_const(&mut sema, "4");
    let dim = sema
        .ctx
        .alloc_array_spec(ArraySpec::ExplicitShape { lower: None, upper });
    sema.act_on_dimension(loc(20), loc(22), "v", vec![dim], None)
        .unwrap();

    let v = sema.act_on_var_ref(loc(40), "v").unwrap();
    let ty = sema.ctx.expr(v).ty;
    let arr = sema.ctx.as_array_type(ty).expect("array type");
    assert_eq!(arr.dims.len(), 1);
    assert!(sema.ctx.is_real_type(arr.element));
    assert_eq!(sema.ctx.array_size(ty), Some(4));

    // A second DIMENSION for the same name is rejected.
    let upper2 = int_const(&mut sema, "2");
    let dim2 = sema.ctx.alloc_array_spec(ArraySpec::ExplicitShape {
        lower: None,
        upper: upper2,
    });
    assert!(sema
        .act_on_dimension(loc(50), loc(52), "v", vec![dim2], None)
        .is_none());
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("already has a DIMENSION")));
}

#[test]
fn array_element_rank_and_subscript_checks() {
    let mut sema = program("p");

    declare_array(&mut sema, TypeSpec::Real, "a", "10");
    let a = sema.act_on_var_ref(loc(30), "a").unwrap();
    let i = sema.act_on_var_ref(loc(32), "i").unwrap();
    let j = sema.act_on_var_ref(loc(34), "j").unwrap();

    // Wrong rank.
    assert!(sema
        .act_on_array_element(loc(30), a, vec![i, j])
        .is_none());
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("expected 1 subscript")));

    // Correct rank: the element takes the element type.
    let a2 = sema.act_on_var_ref(loc(40), "a").unwrap();
    let elem = sema.act_on_array_element(loc(40), a2, vec![i]).unwrap();
    assert!(sema.ctx.is_real_type(sema.ctx.expr(elem).ty));

    // Non-integer subscripts are rejected.
    let x = sema.act_on_var_ref(loc(50), "x").unwrap();
    let a3 = sema.act_on_var_ref(loc(50), "a").unwrap();
    assert!(sema.act_on_array_element(loc(50), a3, vec![x]).is_none());
}

#[test]
fn substring_bounds_default_and_fold() {
    let mut sema = program("p");

    let mut ds = DeclSpec::new(TypeSpec::Character, loc(10));
    let len = int_const(&mut sema, "5");
    ds.len = Some(len);
    let ty = sema.act_on_type_name(&ds);
    sema.act_on_entity_decl(ty, loc(12), "s").unwrap();

    let s = sema.act_on_var_ref(loc(30), "s").unwrap();
    let two = int_const(&mut sema, "2");
    let four = int_const(&mut sema, "4");
    let sub = sema
        .act_on_substring(loc(30), s, Some(two), Some(four))
        .unwrap();
    assert_eq!(sema.ctx.character_length(sema.ctx.expr(sub).ty), Some(3));

    // Omitted bounds default to 1 and the declared length.
    let s2 = sema.act_on_var_ref(loc(40), "s").unwrap();
    let whole = sema.act_on_substring(loc(40), s2, None, None).unwrap();
    assert_eq!(sema.ctx.character_length(sema.ctx.expr(whole).ty), Some(5));

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

// Intrinsic calls: the result type is computed from the arguments,
// including an explicit kind parameter.
#[test]
fn intrinsic_result_types() {
    let mut sema = program("p");

    let x = sema.act_on_var_ref(loc(12), "x").unwrap();
    let int_of_x = sema
        .act_on_intrinsic_call(loc(12), IntrinsicKind::Int, vec![x])
        .unwrap();
    assert_eq!(sema.ctx.expr(int_of_x).ty, sema.ctx.integer_ty);

    let x2 = sema.act_on_var_ref(loc(20), "x").unwrap();
    let eight = int_const(&mut sema, "8");
    let int8_of_x = sema
        .act_on_intrinsic_call(loc(20), IntrinsicKind::Int, vec![x2, eight])
        .unwrap();
    let expected: TypeId = sema.ctx.type_with_kind(f77front::types::BuiltinType::Integer, 8);
    assert_eq!(sema.ctx.expr(int8_of_x).ty, expected);

    let x3 = sema.act_on_var_ref(loc(30), "x").unwrap();
    let dbl = sema
        .act_on_intrinsic_call(loc(30), IntrinsicKind::Dble, vec![x3])
        .unwrap();
    assert_eq!(sema.ctx.expr(dbl).ty, sema.ctx.double_precision_ty);

    let s = sema.act_on_char_constant(loc(40), loc(45), "abc").unwrap();
    let len = sema
        .act_on_intrinsic_call(loc(40), IntrinsicKind::Len, vec![s])
        .unwrap();
    assert_eq!(sema.ctx.expr(len).ty, sema.ctx.integer_ty);
    assert_eq!(fold::evaluate_as_int(&sema.ctx, len), Some(3));

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

#[test]
fn intrinsic_argument_count_is_checked() {
    let mut sema = program("p");

    let x = sema.act_on_var_ref(loc(12), "x").unwrap();
    let y = sema.act_on_var_ref(loc(14), "y").unwrap();
    let z = sema.act_on_var_ref(loc(16), "z").unwrap();
    assert!(sema
        .act_on_intrinsic_call(loc(12), IntrinsicKind::Int, vec![x, y, z])
        .is_none());
    assert!(errors_of(&sema).iter().any(|e| e.contains("expects 1 or 2")));
}

// Calls to declared external functions bind and convert arguments.
#[test]
fn external_function_call_types_and_converts() {
    let mut sema = program("p");

    // INTEGER F; EXTERNAL F.
    declare_scalar(&mut sema, TypeSpec::Integer, "f");
    sema.act_on_external(loc(20), loc(22), "f", None).unwrap();

    let f = {
        let name = sema.ctx.idents.intern("f");
        sema.ctx.idents.front_token(name).unwrap()
    };
    assert!(matches!(
        sema.ctx.decl(f).kind,
        DeclKind::Function { external: true, .. }
    ));

    let one = int_const(&mut sema, "1");
    let call = sema.act_on_call_expr(loc(30), f, vec![one]).unwrap();
    assert_eq!(sema.ctx.expr(call).ty, sema.ctx.integer_ty);

    // The inferred parameter list now pins the arity.
    let two = int_const(&mut sema, "2");
    let three = int_const(&mut sema, "3");
    sema.act_on_call_expr(loc(40), f, vec![two, three]);
    assert!(errors_of(&sema).iter().any(|e| e.contains("too many arguments")));

    finish(&mut sema, "p");
}

// Functions: the function name designates the return slot with the
// declared result type; arguments refine their implicit types.
#[test]
fn function_returned_value_takes_result_type() {
    let mut sema = Sema::new(SemaOptions::default());
    sema.begin_unit();

    let ds = DeclSpec::new(TypeSpec::Integer, loc(0));
    let func = sema.begin_function(loc(0), "addone", Some(&ds));
    sema.act_on_subprogram_argument(loc(10), "n").unwrap();

    // INTEGER N refines the dummy argument in place.
    let n_decl = declare_scalar(&mut sema, TypeSpec::Integer, "n");
    let n_var = sema.ctx.decl(n_decl).as_variable().unwrap();
    assert!(n_var.attrs.contains(VarAttr::Argument));
    assert!(!n_var.implicit);

    let ret = sema.act_on_var_ref(loc(20), "addone").unwrap();
    assert!(matches!(
        sema.ctx.expr(ret).kind,
        ExprKind::ReturnedValue(d) if d == func
    ));
    assert_eq!(sema.ctx.expr(ret).ty, sema.ctx.integer_ty);

    let n_ref = sema.act_on_var_ref(loc(24), "n").unwrap();
    let one = int_const(&mut sema, "1");
    let sum = sema.act_on_binary(loc(25), BinaryOp::Plus, n_ref, one).unwrap();
    sema.act_on_assignment(loc(20), ret, sum, None).unwrap();
    sema.act_on_return(loc(30), None, None).unwrap();
    sema.end_subprogram(Some("addone"), loc(40), loc(44));
    sema.end_unit();

    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
    let DeclKind::Function { body, result, .. } = &sema.ctx.decl(func).kind else {
        panic!("expected a function declaration");
    };
    assert_eq!(*result, sema.ctx.integer_ty);
    assert_eq!(body.len(), 2);
}

// CALL statements resolve subroutines, creating an implicit external
// declaration for unknown names.
#[test]
fn call_statement_declares_unknown_subroutine() {
    let mut sema = program("p");

    let one = int_const(&mut sema, "1");
    let call = sema
        .act_on_call(loc(12), loc(17), "report", vec![one], None)
        .unwrap();
    let StmtKind::Call { subroutine, args } = &sema.ctx.stmt(call).kind else {
        panic!("expected a call statement");
    };
    assert!(matches!(
        sema.ctx.decl(*subroutine).kind,
        DeclKind::Subroutine { external: true, .. }
    ));
    assert_eq!(args.len(), 1);

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

// IF branch conditions must be logical; branch bodies are blocks built
// with the block bracketing API.
#[test]
fn if_construct_checks_conditions() {
    let mut sema = program("p");

    let i = sema.act_on_var_ref(loc(12), "i").unwrap();
    let ten = int_const(&mut sema, "10");
    let cond = sema
        .act_on_binary(loc(14), BinaryOp::LessThan, i, ten)
        .unwrap();

    sema.begin_block();
    let j = sema.act_on_var_ref(loc(20), "j").unwrap();
    let one = int_const(&mut sema, "1");
    sema.act_on_assignment(loc(20), j, one, None).unwrap();
    let then_block = sema.end_block(loc(20));

    sema.begin_block();
    let j2 = sema.act_on_var_ref(loc(30), "j").unwrap();
    let two = int_const(&mut sema, "2");
    sema.act_on_assignment(loc(30), j2, two, None).unwrap();
    let else_block = sema.end_block(loc(30));

    let stmt = sema
        .act_on_if(
            loc(12),
            vec![(Some(cond), then_block), (None, else_block)],
            None,
        )
        .unwrap();
    let StmtKind::If { branches } = &sema.ctx.stmt(stmt).kind else {
        panic!("expected an if statement");
    };
    assert_eq!(branches.len(), 2);
    assert!(branches[1].condition.is_none());

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    // A non-logical condition is rejected.
    let mut bad = program("q");
    let one = int_const(&mut bad, "1");
    bad.begin_block();
    let blk = bad.end_block(loc(50));
    bad.act_on_if(loc(50), vec![(Some(one), blk)], None);
    assert!(errors_of(&bad)
        .iter()
        .any(|e| e.contains("expected a logical expression")));
}

// ASSIGN/assigned GOTO resolve through the same label machinery.
#[test]
fn assign_and_assigned_goto_resolve_labels() {
    let mut sema = program("p");

    let i = sema.act_on_var_ref(loc(12), "i").unwrap();
    let assign = sema
        .act_on_assign(loc(12), 50, loc(19), i, None)
        .unwrap();
    let i2 = sema.act_on_var_ref(loc(30), "i").unwrap();
    let agoto = sema
        .act_on_assigned_goto(loc(30), i2, vec![(50, loc(38))], None)
        .unwrap();
    let target = sema.act_on_continue(loc(40), Some(50));

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    let StmtKind::Assign { target: t, .. } = &sema.ctx.stmt(assign).kind else {
        panic!("expected an assign statement");
    };
    assert_eq!(t.target, Some(target));
    let StmtKind::AssignedGoto { allowed, .. } = &sema.ctx.stmt(agoto).kind else {
        panic!("expected an assigned goto");
    };
    assert_eq!(allowed[0].target, Some(target));
}

#[test]
fn duplicate_statement_label_is_an_error() {
    let mut sema = program("p");
    sema.act_on_continue(loc(12), Some(10));
    sema.act_on_continue(loc(20), Some(10));
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("redefinition of statement label 10")));
}

// PRINT with a label format participates in label resolution.
#[test]
fn print_label_format_resolves() {
    let mut sema = program("p");

    let fs = sema.act_on_label_format_spec(loc(18), 200);
    let x = sema.act_on_var_ref(loc(22), "x").unwrap();
    let print = sema.act_on_print(loc(12), fs, vec![x], None);
    let target = sema.act_on_continue(loc(40), Some(200));

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    let StmtKind::Print { format, .. } = &sema.ctx.stmt(print).kind else {
        panic!("expected a print statement");
    };
    let f77front::stmt::FormatSpec::Label(lr) = format else {
        panic!("expected a label format");
    };
    assert_eq!(lr.target, Some(target));
}

#[test]
fn stop_code_must_be_constant() {
    let mut sema = program("p");
    let x = sema.act_on_var_ref(loc(14), "x").unwrap();
    sema.act_on_stop(loc(12), Some(x), None);
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("stop code")));
}

// BOZ constants carry their bit pattern; complex constants take the wider
// part kind.
#[test]
fn boz_and_complex_constants() {
    let mut sema = program("p");

    let boz = sema
        .act_on_boz_constant(loc(12), loc(17), "ff", f77front::expr::BozKind::Hexadecimal)
        .unwrap();
    assert_eq!(fold::evaluate_as_int(&sema.ctx, boz), Some(255));

    let re = real_const(&mut sema, "1.5");
    let im = real_const(&mut sema, "2.5");
    let z = sema
        .act_on_complex_constant(loc(20), loc(29), re, im)
        .unwrap();
    assert!(sema.ctx.is_complex_type(sema.ctx.expr(z).ty));
    match sema.ctx.expr(z).constant_value() {
        Some(ConstantValue::Complex { re, im }) => {
            assert_eq!(*re, 1.5);
            assert_eq!(*im, 2.5);
        }
        other => panic!("expected a complex constant, found {:?}", other),
    }

    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));
}

// DATA with scattered element objects fills by column-major offset.
#[test]
fn data_array_elements_fill_by_offset() {
    let mut sema = program("p");

    let a = declare_array(&mut sema, TypeSpec::Integer, "a", "3");

    let a1 = sema.act_on_var_ref(loc(30), "a").unwrap();
    let sub1 = int_const(&mut sema, "3");
    let e1 = sema.act_on_array_element(loc(30), a1, vec![sub1]).unwrap();
    let a2 = sema.act_on_var_ref(loc(36), "a").unwrap();
    let sub2 = int_const(&mut sema, "1");
    let e2 = sema.act_on_array_element(loc(36), a2, vec![sub2]).unwrap();

    let seven = int_const(&mut sema, "7");
    let v1 = sema.act_on_data_constant(loc(50), None, seven).unwrap();
    let nine = int_const(&mut sema, "9");
    let v2 = sema.act_on_data_constant(loc(53), None, nine).unwrap();

    sema.act_on_data(loc(28), vec![e1, e2], vec![v1, v2], None)
        .unwrap();
    finish(&mut sema, "p");
    assert!(!sema.had_errors(), "diagnostics: {:?}", errors_of(&sema));

    let init = sema.ctx.decl(a).as_variable().unwrap().init.unwrap();
    let ExprKind::ArrayConstructor { items } = &sema.ctx.expr(init).kind else {
        panic!("expected an array constructor initializer");
    };
    let values: Vec<Option<i64>> = items
        .iter()
        .map(|&e| fold::evaluate_as_int(&sema.ctx, e))
        .collect();
    // a(1) = 9, a(2) untouched (zero-filled), a(3) = 7.
    assert_eq!(values, vec![Some(9), Some(0), Some(7)]);
}

#[test]
fn data_value_count_mismatches_are_reported() {
    let mut sema = program("p");

    declare_array(&mut sema, TypeSpec::Integer, "a", "3");
    let a_ref = sema.act_on_var_ref(loc(30), "a").unwrap();
    let one = int_const(&mut sema, "1");
    let v = sema.act_on_data_constant(loc(40), None, one).unwrap();
    sema.act_on_data(loc(28), vec![a_ref], vec![v], None);
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("not enough values")));

    let mut sema2 = program("q");
    declare_scalar(&mut sema2, TypeSpec::Integer, "n");
    let n_ref = sema2.act_on_var_ref(loc(30), "n").unwrap();
    let one_a = int_const(&mut sema2, "1");
    let v1 = sema2.act_on_data_constant(loc(40), None, one_a).unwrap();
    let two_b = int_const(&mut sema2, "2");
    let v2 = sema2.act_on_data_constant(loc(43), None, two_b).unwrap();
    sema2.act_on_data(loc(28), vec![n_ref], vec![v1, v2], None);
    assert!(errors_of(&sema2)
        .iter()
        .any(|e| e.contains("excess values")));
}

#[test]
fn data_rejects_non_constant_values() {
    let mut sema = program("p");

    let x = sema.act_on_var_ref(loc(40), "x").unwrap();
    assert!(sema.act_on_data_constant(loc(40), None, x).is_none());
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("constant expression")));
}

// Derived types: fields live in the record context, the record type is
// usable for entities, and duplicate members are reported.
#[test]
fn derived_type_declares_fields_in_own_context() {
    let mut sema = program("p");

    let record = sema.act_on_derived_type_decl(loc(12), loc(17), "point");
    let ds = DeclSpec::new(TypeSpec::Real, loc(20));
    let fx = sema.act_on_derived_type_field(&ds, loc(22), "x").unwrap();
    sema.act_on_derived_type_field(&ds, loc(26), "y").unwrap();
    let dup = sema.act_on_derived_type_field(&ds, loc(30), "x");
    assert!(dup.is_none());
    sema.act_on_end_derived_type();

    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("duplicate member `x`")));
    assert_eq!(sema.ctx.decl(fx).parent, Some(record));

    // An entity of the record type.
    let mut ds2 = DeclSpec::new(TypeSpec::Record, loc(40));
    ds2.record = Some(record);
    let ty = sema.act_on_type_name(&ds2);
    let entity = sema.act_on_entity_decl(ty, loc(44), "origin").unwrap();
    let entity_ty = sema.ctx.decl(entity).as_variable().unwrap().ty;
    assert_eq!(sema.ctx.record_type(record), entity_ty);

    // Field names were scoped to the record: `x` in the program is a new
    // implicit real, not the field.
    let x = sema.act_on_var_ref(loc(50), "x").unwrap();
    assert_ne!(var_decl_of(&sema, x), fx);
}

#[test]
fn invalid_kind_selector_falls_back_to_base_type() {
    let mut sema = program("p");

    let mut ds = DeclSpec::new(TypeSpec::Integer, loc(10));
    let bad_kind = int_const(&mut sema, "3");
    ds.kind = Some(bad_kind);
    let ty = sema.act_on_type_name(&ds);

    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("invalid INTEGER kind 3")));
    // The selector was discarded; the base type survives.
    assert_eq!(ty, sema.ctx.integer_ty);
}

#[test]
fn unary_not_requires_logical() {
    let mut sema = program("p");

    let one = int_const(&mut sema, "1");
    let not = sema.act_on_unary(loc(12), UnaryOp::Not, one).unwrap();
    assert!(errors_of(&sema)
        .iter()
        .any(|e| e.contains("logical unary")));
    // Construction still proceeds with the operand's type.
    assert_eq!(sema.ctx.expr(not).ty, sema.ctx.integer_ty);
}

#[test]
fn error_limit_stops_construction() {
    let mut sema = Sema::new(SemaOptions {
        werror: false,
        error_limit: Some(1),
    });
    sema.begin_unit();
    sema.begin_main_program(Some("p"), loc(0), loc(8));

    declare_scalar(&mut sema, TypeSpec::Integer, "i");
    let ds = DeclSpec::new(TypeSpec::Real, loc(20));
    let ty = sema.act_on_type_name(&ds);
    assert!(sema.act_on_entity_decl(ty, loc(22), "i").is_none());
    assert!(sema.diags.error_limit_reached());
    // Further entity declarations are refused outright.
    assert!(sema.act_on_entity_decl(ty, loc(30), "j").is_none());
}

#[test]
fn array_constructor_sums_item_lengths() {
    let mut sema = program("p");

    let one = int_const(&mut sema, "1");
    let two = int_const(&mut sema, "2");
    let three = int_const(&mut sema, "3");
    let ctor = sema
        .act_on_array_constructor(loc(12), vec![one, two, three])
        .unwrap();
    let ty = sema.ctx.expr(ctor).ty;
    assert_eq!(sema.ctx.array_size(ty), Some(3));
    assert!(sema.ctx.is_integer_type(sema.ctx.element_type(ty)));

    // Mismatched element types are reported.
    let mut bad = program("q");
    let i = int_const(&mut bad, "1");
    let r = real_const(&mut bad, "2.0");
    bad.act_on_array_constructor(loc(12), vec![i, r]);
    assert!(errors_of(&bad)
        .iter()
        .any(|e| e.contains("does not match")));
}
