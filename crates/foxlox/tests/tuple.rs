//! Tuples: literals, concatenation, and unpacking patterns.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn creation() {
    assert_eq!(run("return ();"), Object::Tuple(vec![]));
    // a parenthesized expression is not a tuple
    assert_eq!(run("return (\"a\");"), Object::Str("a".to_owned()));
    assert_eq!(run("return (\"a\",);"), Object::Tuple(vec![Object::Str("a".to_owned())]));
    assert_eq!(
        run("return (1, 2, 3);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
    // trailing comma permitted
    assert_eq!(
        run("return (1, 2, 3,);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
}

#[test]
fn concatenation() {
    assert_eq!(
        run("return (1, 2) + (3,);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
    assert_eq!(
        run("return (1, 2) + 3;"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
    assert_eq!(
        run("return 0 + (1, 2);"),
        Object::Tuple(vec![Object::Int(0), Object::Int(1), Object::Int(2)])
    );
    assert_eq!(run("return () + ();"), Object::Tuple(vec![]));
}

#[test]
fn unpacking() {
    assert_eq!(
        run("var a; var b; (a, b) = (1, 2); return (a, b);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn nested_unpacking() {
    assert_eq!(
        run("var a; var b; (a,(b,))=(\"x\",(\"y\",)); return a+b;"),
        Object::Str("xy".to_owned())
    );
}

#[test]
fn unpacking_with_placeholder() {
    assert_eq!(
        run("var a; var b; (a, _, b) = (1, 2, 3); return (a, b);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(3)])
    );
}

#[test]
fn chained_tuple_assignment_yields_the_tuple() {
    assert_eq!(
        run("var a; var b; var c; (a, b, c) = (a, _, b) = (1, 2, 3); return (a, b, c);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
}

#[test]
fn unpacking_into_fields() {
    assert_eq!(
        run("class P {} var p = P(); var x; (p.a, x) = (1, 2); return (p.a, x);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn length_mismatch_is_a_runtime_error() {
    let binary = compile("var a; var b; (a, b) = (1, 2, 3);").unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(err.message.contains("Tuple size mismatch"), "got: {}", err.message);
}

#[test]
fn unpacking_a_non_tuple_is_a_runtime_error() {
    let binary = compile("var a; var b; (a, b) = 1;").unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(err.message.contains("Value type error"), "got: {}", err.message);
}

#[test]
fn tuples_compare_by_identity() {
    assert_eq!(run("var t = (1, 2); var u = t; return t == u;"), Object::Bool(true));
    assert_eq!(run("return (1, 2) == (1, 2);"), Object::Bool(false));
}
