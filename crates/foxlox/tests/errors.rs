//! Error reporting: compile diagnostics and runtime error attribution.

use foxlox::{Vm, compile};
use pretty_assertions::assert_eq;

fn run_err(source: &str) -> foxlox::RuntimeError {
    let binary = compile(source).expect("compile failed");
    Vm::new().run(&binary).expect_err("expected a runtime error")
}

#[test]
fn compile_errors_carry_line_and_lexeme() {
    let err = compile("var x = ;").unwrap_err();
    assert_eq!(err.errors.len(), 1);
    assert!(err.errors[0].starts_with("[line 1] Error at `;'"), "got: {}", err.errors[0]);
}

#[test]
fn parser_recovers_at_statement_boundaries() {
    // both statements are broken; both must be reported
    let err = compile("var = 1;\nvar y 2;\n").unwrap_err();
    assert!(err.errors.len() >= 2, "got: {:?}", err.errors);
}

#[test]
fn number_format_errors() {
    assert!(compile("return 1.;").is_err());
    assert!(compile("return 99999999999999999999;").is_err());
}

#[test]
fn unknown_name_is_a_compile_error() {
    let err = compile("return missing;").unwrap_err();
    assert!(
        err.errors[0].contains("Can't find variable with name: `missing'"),
        "got: {}",
        err.errors[0]
    );
}

#[test]
fn redeclaration_in_same_scope() {
    assert!(compile("var a = 1; var a = 2;").is_err());
    // shadowing in an inner scope is fine
    assert!(compile("var a = 1; { var a = 2; }").is_ok());
}

#[test]
fn runtime_error_points_at_the_line() {
    let err = run_err("var a = 1;\nvar b = 2;\nreturn a + \"s\";\n");
    assert_eq!(err.line, 3);
    assert_eq!(err.source, "return a + \"s\";");
    assert!(err.message.contains("Value type error"), "got: {}", err.message);
}

#[test]
fn calling_a_non_callable() {
    let err = run_err("var x = 3; x();");
    assert!(err.message.contains("not callable"), "got: {}", err.message);
    let err = run_err("var x; x();");
    assert!(err.message.contains("NIL is not callable"), "got: {}", err.message);
}

#[test]
fn wrong_call_arity() {
    let err = run_err("fun f(a, b) { return a; } f(1);");
    assert_eq!(err.message, "Wrong number of function parameters. Expect: 2, got: 1.");
}

#[test]
fn arithmetic_type_errors() {
    let err = run_err("return 1 + nil;");
    assert!(err.message.contains("Expected: I64, F64"), "got: {}", err.message);
    let err = run_err("return -\"s\";");
    assert!(err.message.contains("Expected: I64, F64"), "got: {}", err.message);
}

#[test]
fn integer_division_by_zero() {
    let err = run_err("return 1 // 0;");
    assert!(err.message.contains("Division by zero"), "got: {}", err.message);
    // float division follows IEEE instead
    let binary = compile("return 1 / 0;").unwrap();
    assert!(Vm::new().run(&binary).is_ok());
}

#[test]
fn builtin_lib_rejects_bad_arguments() {
    let err = run_err("from fox.io import println; println();");
    assert!(err.message.contains("[print]"), "got: {}", err.message);
    let err = run_err("from fox.algorithm import max; max();");
    assert!(err.message.contains("[max]"), "got: {}", err.message);
    let err = run_err("from fox.profiler import clock; clock(1);");
    assert!(err.message.contains("[clock]"), "got: {}", err.message);
}

#[test]
fn operand_stack_overflow_is_reported() {
    // 255 arguments per call, nested deep enough to exceed the 1024-slot
    // operand stack
    let args = vec!["0"; 255].join(", ");
    let source = format!(
        "fun f(a{pad}) {{ return f({args}); }} f({args});",
        pad = (1..255).map(|i| format!(", a{i}")).collect::<String>(),
        args = args
    );
    let binary = compile(&source).unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(
        err.message.contains("Stack overflow") || err.message.contains("Call trace overflow"),
        "got: {}",
        err.message
    );
}
