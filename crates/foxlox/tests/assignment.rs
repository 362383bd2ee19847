//! Assignment forms: chains, compound operators, prefix increment, and the
//! `_` placeholder.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn chain_assignment_propagates_one_value() {
    assert_eq!(
        run("var a; var b; var c; a = b = c = 7; return (a, b, c);"),
        Object::Tuple(vec![Object::Int(7), Object::Int(7), Object::Int(7)])
    );
}

#[test]
fn compound_assignment() {
    assert_eq!(run("var a = 10; a += 2; return a;"), Object::Int(12));
    assert_eq!(run("var a = 10; a -= 2; return a;"), Object::Int(8));
    assert_eq!(run("var a = 10; a *= 2; return a;"), Object::Int(20));
    assert_eq!(run("var a = 10; a /= 4; return a;"), Object::Float(2.5));
    assert_eq!(run("var a = 10; a //= 4; return a;"), Object::Int(2));
    assert_eq!(run("var s = \"a\"; s += \"b\"; return s;"), Object::Str("ab".to_owned()));
}

#[test]
fn compound_assignment_on_fields() {
    assert_eq!(
        run("class C { __init__() { this.n = 1; } bump() { this.n += 5; } } \
             var c = C(); c.bump(); return c.n;"),
        Object::Int(6)
    );
}

#[test]
fn prefix_increment_and_decrement() {
    assert_eq!(run("var i = 1; ++i; return i;"), Object::Int(2));
    assert_eq!(run("var i = 1; --i; return i;"), Object::Int(0));
    // the desugared assignment is an expression yielding the new value
    assert_eq!(run("var i = 1; return ++i;"), Object::Int(2));
}

#[test]
fn increment_needs_a_variable_or_property() {
    assert!(compile("++1;").is_err());
    assert!(compile("++(1 + 2);").is_err());
}

#[test]
fn multi_declarator_var() {
    assert_eq!(
        run("var a = 1, b = a + 1, c = b + 1; return (a, b, c);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
    assert_eq!(run("var a, b = 2; return (a, b);"), Object::Tuple(vec![Object::Nil, Object::Int(2)]));
}

#[test]
fn placeholder_discards() {
    assert_eq!(run("var s = \"string\"; _ = s; return s;"), Object::Str("string".to_owned()));
    assert_eq!(run("var s = \"string\"; var _ = s; return s;"), Object::Str("string".to_owned()));
    // `_ = e` is an expression yielding e, so chains pass through
    assert_eq!(run("var s; s = _ = \"string\"; return s;"), Object::Str("string".to_owned()));
}

#[test]
fn placeholder_cannot_be_read() {
    assert!(compile("var _ = 1; var v = _;").is_err());
    assert!(compile("(1, 2, _);").is_err());
    assert!(compile("1 + _;").is_err());
    assert!(compile("fun f(a) { return a; } f(_);").is_err());
}

#[test]
fn invalid_assignment_targets() {
    assert!(compile("1 = 2;").is_err());
    assert!(compile("(a) = 2;").is_err());
    assert!(compile("a + b = 2;").is_err());
    assert!(compile("!a = 2;").is_err());
    assert!(compile("this = 2;").is_err());
}
