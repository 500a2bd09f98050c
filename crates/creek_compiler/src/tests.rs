use creek_backend::ExecValue;
use creek_session::diagnostics::{Diagnostic, Severity};

use crate::compiler::{CompileError, Compiler};

/// The entry points every script must provide.
const REQUIRED: &str = "bool init() { true } void exit() { }";

fn try_compile(source: &str) -> (Compiler<Vec<Diagnostic>>, Result<(), CompileError>) {
    let mut compiler = Compiler::new(Vec::new(), true).expect("host jit available");
    let result = compiler.compile(source);
    (compiler, result)
}

fn test_compiles(source: &str, should_compile: bool) {
    let (compiler, result) = try_compile(source);

    match (&result, should_compile) {
        (Err(err), true) => panic!(
            "failed to compile: {source:?}: {err}\ndiagnostics: {:#?}",
            compiler.session.diagnostics
        ),
        (Ok(()), false) => panic!("unexpectedly compiled: {source:?}"),
        _ => {}
    }
}

/// Compiles a bare expression alongside the required entry points and
/// returns its evaluated value.
fn eval(expr: &str) -> ExecValue {
    let source = format!("{expr} {REQUIRED}");
    let (compiler, result) = try_compile(&source);

    if let Err(err) = result {
        panic!(
            "failed to evaluate {expr:?}: {err}\ndiagnostics: {:#?}",
            compiler.session.diagnostics
        );
    }

    compiler
        .values
        .first()
        .cloned()
        .unwrap_or_else(|| panic!("no value produced by {expr:?}"))
}

fn error_messages(source: &str) -> Vec<String> {
    let (compiler, _) = try_compile(source);
    compiler
        .session
        .diagnostics
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message)
        .collect()
}

fn assert_error_contains(source: &str, needle: &str) {
    let messages = error_messages(source);
    assert!(
        messages.iter().any(|m| m.contains(needle)),
        "no error containing {needle:?} in {messages:#?}"
    );
}

#[test]
fn minimal_script() {
    test_compiles(REQUIRED, true);
}

#[test]
fn missing_exit_is_fatal() {
    let (_, result) = try_compile("bool init() { true }");
    assert!(matches!(
        result,
        Err(CompileError::MissingRequired { signature: "void exit()" })
    ));
}

#[test]
fn missing_init_is_fatal() {
    let (_, result) = try_compile("void exit() { }");
    assert!(matches!(
        result,
        Err(CompileError::MissingRequired { signature: "bool init()" })
    ));
}

#[test]
fn init_with_wrong_signature_is_fatal() {
    let (_, result) = try_compile("int init() { 0 } void exit() { }");
    assert!(matches!(result, Err(CompileError::MissingRequired { .. })));

    let (_, result) = try_compile("bool init(int x) { true } void exit() { }");
    assert!(matches!(result, Err(CompileError::MissingRequired { .. })));
}

#[test]
fn extern_declarations_satisfy_the_contract() {
    // declaration is enough to resolve; linking is the caller's problem
    test_compiles("extern bool init() extern void exit()", true);
}

#[test]
fn top_level_arithmetic() {
    assert_eq!(eval("2 + 3 * 4"), ExecValue::Int(14));
    assert_eq!(eval("1 * 2 + 3"), ExecValue::Int(5));
    assert_eq!(eval("2 - 3 - 4"), ExecValue::Int(-5));
}

#[test]
fn unary_negation() {
    assert_eq!(eval("-5"), ExecValue::Int(-5));
    assert_eq!(eval("- -5"), ExecValue::Int(5));
    assert_eq!(eval("+7"), ExecValue::Int(7));
    assert_eq!(eval("-2.5"), ExecValue::Float(-2.5));
}

#[test]
fn float_arithmetic() {
    assert_eq!(eval("0.5 * 4.0"), ExecValue::Float(2.0));
}

#[test]
fn ints_and_bools_widen_to_float() {
    assert_eq!(eval("1 + 2.5"), ExecValue::Float(3.5));
    assert_eq!(eval("2.5 + 1"), ExecValue::Float(3.5));
    assert_eq!(eval("true + 0.5"), ExecValue::Float(1.5));
}

#[test]
fn comparisons_produce_bools() {
    assert_eq!(eval("1 < 2"), ExecValue::Bool(true));
    assert_eq!(eval("2 < 1"), ExecValue::Bool(false));
    assert_eq!(eval("1.5 < 2"), ExecValue::Bool(true));
    assert_eq!(eval("2.5 < 1.5"), ExecValue::Bool(false));
}

#[test]
fn bool_literals_evaluate() {
    assert_eq!(eval("true"), ExecValue::Bool(true));
    assert_eq!(eval("false"), ExecValue::Bool(false));
}

#[test]
fn string_literals_evaluate() {
    assert_eq!(eval("\"hello\""), ExecValue::Str("hello".to_owned()));
}

#[test]
fn if_selects_a_branch() {
    assert_eq!(eval("if 1 < 2 { 3 } else { 4 }"), ExecValue::Int(3));
    assert_eq!(eval("if 2 < 1 { 3 } else { 4 }"), ExecValue::Int(4));
}

#[test]
fn numeric_conditions_compare_against_zero() {
    assert_eq!(eval("if 7 { 1 } else { 2 }"), ExecValue::Int(1));
    assert_eq!(eval("if 0 { 1 } else { 2 }"), ExecValue::Int(2));
    assert_eq!(eval("if 0.0 { 1 } else { 2 }"), ExecValue::Int(2));
    assert_eq!(eval("if 0.25 { 1 } else { 2 }"), ExecValue::Int(1));
}

#[test]
fn if_without_else_is_void() {
    assert_eq!(eval("if 1 < 2 { } "), ExecValue::Void);
}

#[test]
fn mismatched_branches_are_rejected() {
    assert_error_contains(
        "int f() { if true { 1 } else { 2.5 } } ",
        "must return the same type",
    );
    // an implicit else is a void branch, so a valued then-branch fails too
    assert_error_contains("int f() { if true { 1 } } ", "must return the same type");
}

#[test]
fn functions_and_calls() {
    assert_eq!(
        eval("int addmul(int x, int y) { x + y * 2 } addmul(3, 4)"),
        ExecValue::Int(11)
    );
}

#[test]
fn block_value_is_the_last_expression() {
    assert_eq!(eval("int f() { 1; 2; 3 } f()"), ExecValue::Int(3));
}

#[test]
fn recursion() {
    let source = "int fib(int n) { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } } fib(10)";
    assert_eq!(eval(source), ExecValue::Int(55));
}

#[test]
fn calls_across_sealed_units() {
    // executing the first expression seals its unit; `two` is then compiled
    // into a fresh unit and must still reach `one`
    let source = "int one() { 1 } one() int two() { one() + 1 } two()";
    let (compiler, result) = try_compile(&format!("{source} {REQUIRED}"));

    assert!(result.is_ok(), "{:#?}", compiler.session.diagnostics);
    assert_eq!(
        compiler.values,
        vec![ExecValue::Int(1), ExecValue::Int(2)]
    );
}

#[test]
fn forward_references_through_externs() {
    let source = "extern int late() int caller() { late() } int late() { 41 } caller() + 1";
    assert_eq!(eval(source), ExecValue::Int(42));
}

#[test]
fn extern_then_definition_is_allowed() {
    test_compiles(&format!("extern int f(int x) int f(int x) {{ x }} {REQUIRED}"), true);
}

#[test]
fn defining_twice_is_a_redefinition() {
    assert_error_contains(
        &format!("int f(int x) {{ x }} int f(int x) {{ x }} {REQUIRED}"),
        "redefinition of function `f`",
    );
}

#[test]
fn redeclaring_with_a_different_arity_fails() {
    assert_error_contains(
        &format!("extern int f(int x) int f(int x) {{ x }} extern int f(int x, int y) {REQUIRED}"),
        "different argument count",
    );
}

#[test]
fn call_arity_is_checked() {
    let def = "int two(int x, int y) { x + y }";
    assert_error_contains(&format!("{def} two(1) {REQUIRED}"), "argument count mismatch");
    assert_error_contains(
        &format!("{def} two(1, 2, 3) {REQUIRED}"),
        "argument count mismatch",
    );
}

#[test]
fn call_arguments_do_not_coerce() {
    let def = "int twice(int x) { x + x }";
    // binary `+` would widen an int into a float, calls never do
    assert_error_contains(&format!("{def} twice(1.5) {REQUIRED}"), "has type float");
    assert_error_contains(
        &format!("{def} twice(\"s\") {REQUIRED}"),
        "has type string",
    );
}

#[test]
fn strings_do_not_convert_in_binary_operators() {
    assert_error_contains(
        &format!("\"a\" + 1 {REQUIRED}"),
        "no implicit conversion",
    );
}

#[test]
fn unknown_names_are_reported() {
    assert_error_contains(&format!("int f(int x) {{ y }} {REQUIRED}"), "unknown variable `y`");
    assert_error_contains(&format!("nosuch() {REQUIRED}"), "unknown function `nosuch`");
}

#[test]
fn return_type_is_checked_exactly() {
    assert_error_contains(
        &format!("int f() {{ 2.5 }} {REQUIRED}"),
        "return type mismatch",
    );
}

#[test]
fn void_functions_warn_when_a_value_is_discarded() {
    let (compiler, result) = try_compile(&format!("void drop() {{ 1 }} {REQUIRED}"));

    assert!(result.is_ok());
    assert!(compiler
        .session
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("ignored in void function")));
}

#[test]
fn failed_definitions_leave_nothing_behind() {
    // `f` fails its body; a later definition of the same name starts fresh
    let source = format!("int f() {{ nope }} int f() {{ 7 }} f() {REQUIRED}");
    let (compiler, result) = try_compile(&source);

    // the first failure is reported, so the run fails, but the second
    // definition was accepted and executed
    assert!(matches!(result, Err(CompileError::HadErrors)));
    assert_eq!(compiler.values, vec![ExecValue::Int(7)]);
}

#[test]
fn syntax_errors_recover_at_the_next_construct() {
    let (compiler, result) = try_compile(&format!("@ {REQUIRED}"));

    assert!(matches!(result, Err(CompileError::HadErrors)));
    // the entry points after the bad token still compiled
    assert!(compiler
        .session
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error));
}

#[test]
fn invalid_tokens_are_fatal() {
    let (_, result) = try_compile("1.2.3");
    assert!(matches!(result, Err(CompileError::InvalidToken(1))));
}

#[test]
fn top_level_semicolons_are_ignored() {
    test_compiles(&format!("; ; {REQUIRED} ;"), true);
}

#[test]
fn stray_closing_braces_are_skipped() {
    let (compiler, result) = try_compile(&format!("}} {REQUIRED}"));

    assert!(matches!(result, Err(CompileError::HadErrors)));
    assert!(compiler
        .session
        .diagnostics
        .iter()
        .any(|d| d.message.contains("expected a top-level construct")));
}

#[test]
fn comments_are_ignored() {
    test_compiles(&format!("# leading comment\n{REQUIRED} # trailing"), true);
}

#[test]
fn check_mode_does_not_execute() {
    let mut compiler = Compiler::new(Vec::new(), false).expect("host jit available");
    let result = compiler.compile(&format!("1 + 2 {REQUIRED}"));

    assert!(result.is_ok(), "{:#?}", compiler.session.diagnostics);
    assert!(compiler.values.is_empty());
}

#[test]
fn evaluation_is_reported_as_a_note() {
    let (compiler, _) = try_compile(&format!("2 + 2 {REQUIRED}"));

    assert!(compiler
        .session
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Note && d.message.contains("evaluated to 4")));
}
