//! Arithmetic, literals, and equality semantics.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn precedence() {
    assert_eq!(run("return 1+2*3;"), Object::Int(7));
    assert_eq!(run("return (1+2)*3;"), Object::Int(9));
    assert_eq!(run("return 1+2*3-4/2;"), Object::Float(5.0));
    assert_eq!(run("return -2*3;"), Object::Int(-6));
}

#[test]
fn numeric_promotion() {
    assert_eq!(run("return 1 + 2;"), Object::Int(3));
    assert_eq!(run("return 1 + 2.5;"), Object::Float(3.5));
    assert_eq!(run("return 7 / 2;"), Object::Float(3.5));
    assert_eq!(run("return 7 // 2;"), Object::Int(3));
    assert_eq!(run("return 7.5 // 2;"), Object::Int(3));
    assert_eq!(run("return -7 // 2;"), Object::Int(-3));
}

#[test]
fn comparison_operators() {
    assert_eq!(run("return 1 < 2;"), Object::Bool(true));
    assert_eq!(run("return 2 <= 2;"), Object::Bool(true));
    assert_eq!(run("return 1 > 2;"), Object::Bool(false));
    assert_eq!(run("return 2 >= 3;"), Object::Bool(false));
    assert_eq!(run("return 1 < 1.5;"), Object::Bool(true));
    assert_eq!(run("return \"a\" < \"b\";"), Object::Bool(true));
}

#[test]
fn equality_follows_value_semantics() {
    assert_eq!(run("return 1 == 1.0;"), Object::Bool(true));
    assert_eq!(run("return false == 0;"), Object::Bool(false));
    assert_eq!(run("return nil == false;"), Object::Bool(false));
    assert_eq!(run("return nil == nil;"), Object::Bool(true));
    assert_eq!(run("return \"ab\" == \"a\" + \"b\";"), Object::Bool(true));
    assert_eq!(run("return 1 != 2;"), Object::Bool(true));
}

#[test]
fn equality_with_comparison_is_non_associative() {
    // `2 < 1` binds tighter, so this is `false == false`
    assert_eq!(run("return (false == 2 < 1);"), Object::Bool(true));
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(run("return true and 2;"), Object::Int(2));
    assert_eq!(run("return false and 2;"), Object::Bool(false));
    assert_eq!(run("return false or 3;"), Object::Int(3));
    assert_eq!(run("return 1 or 3;"), Object::Int(1));
    // the short-circuited side must not run
    assert_eq!(
        run("var touched = false; fun f() { touched = true; return true; } \
             var r = false and f(); return (r, touched);"),
        Object::Tuple(vec![Object::Bool(false), Object::Bool(false)])
    );
}

#[test]
fn not_requires_bool() {
    assert_eq!(run("return !true;"), Object::Bool(false));
    assert_eq!(run("return !false;"), Object::Bool(true));
    let binary = compile("return !1;").unwrap();
    assert!(Vm::new().run(&binary).is_err());
}

#[test]
fn truthiness_in_conditions() {
    // everything but nil and false is truthy, including 0, "", and ()
    assert_eq!(run("if (0) return 1; return 2;"), Object::Int(1));
    assert_eq!(run("if (\"\") return 1; return 2;"), Object::Int(1));
    assert_eq!(run("if (()) return 1; return 2;"), Object::Int(1));
    assert_eq!(run("if (nil) return 1; return 2;"), Object::Int(2));
    assert_eq!(run("if (false) return 1; return 2;"), Object::Int(2));
}

#[test]
fn comment_only_file_returns_nil() {
    assert_eq!(run("# nothing here\n"), Object::Nil);
    assert_eq!(run("# no trailing newline"), Object::Nil);
    assert_eq!(run("return 1; # tail comment"), Object::Int(1));
}

#[test]
fn script_without_return_yields_nil() {
    assert_eq!(run("var x = 1;"), Object::Nil);
}
