//! Closures: captured locals move to the static pool and outlive their
//! scopes.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn two_escaping_closures() {
    assert_eq!(
        run("var r=(); fun f(){ var x=\"X\"; fun g(){ r+=x; } return g; } \
             var g1=f(); var g2=f(); g1(); g2(); return r;"),
        Object::Tuple(vec![Object::Str("X".to_owned()), Object::Str("X".to_owned())])
    );
}

#[test]
fn capture_retains_binding_after_block_exit() {
    assert_eq!(
        run("var get; { var captured = 21; fun g() { return captured * 2; } get = g; } return get();"),
        Object::Int(42)
    );
}

#[test]
fn captures_share_one_updated_binding() {
    assert_eq!(
        run("var n = 0; \
             fun inc() { n = n + 1; } \
             fun read() { return n; } \
             inc(); inc(); inc(); \
             return read();"),
        Object::Int(3)
    );
}

#[test]
fn captured_parameter() {
    assert_eq!(
        run("fun adder(k) { fun add(x) { return x + k; } return add; } \
             var add3 = adder(3); return add3(4);"),
        Object::Int(7)
    );
}

#[test]
fn recursion_goes_through_the_static_pool() {
    assert_eq!(
        run("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } return fib(12);"),
        Object::Int(144)
    );
}

#[test]
fn mutual_state_between_closures() {
    assert_eq!(
        run("fun make() { \
               var count = 0; \
               fun bump() { count = count + 1; return count; } \
               return bump; \
             } \
             var c = make(); c(); c(); return c();"),
        Object::Int(3)
    );
}

#[test]
fn self_reference_in_initializer_is_an_error() {
    assert!(compile("var a = a;").is_err());
    assert!(compile("var a = 1; { var a = a; }").is_err());
}

#[test]
fn capturing_this_in_nested_function_is_rejected() {
    assert!(
        compile(
            "class C { m() { fun inner() { return this; } return inner; } } \
             var c = C();"
        )
        .is_err()
    );
}
