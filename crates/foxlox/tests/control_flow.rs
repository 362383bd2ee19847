//! `if`/`else`, `while`, `for`, `break`, `continue`, and `return`.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn if_else() {
    assert_eq!(run("if (1 < 2) return \"then\"; else return \"else\";"), Object::Str("then".to_owned()));
    assert_eq!(run("if (1 > 2) return \"then\"; else return \"else\";"), Object::Str("else".to_owned()));
    assert_eq!(run("var r = 0; if (true) { r = 1; } return r;"), Object::Int(1));
}

#[test]
fn while_loop() {
    assert_eq!(
        run("var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; } return sum;"),
        Object::Int(10)
    );
}

#[test]
fn for_loop_builds_string() {
    assert_eq!(
        run("var s = \"\"; for(var i = 0; i < 3; ++i) s = s + \"x\"; return s;"),
        Object::Str("xxx".to_owned())
    );
}

#[test]
fn for_loop_with_empty_clauses() {
    // an empty condition is constant true
    assert_eq!(
        run("var i = 0; for (;;) { i = i + 1; if (i == 4) break; } return i;"),
        Object::Int(4)
    );
    assert_eq!(run("var n = 0; for (; n < 2;) n = n + 1; return n;"), Object::Int(2));
}

#[test]
fn break_terminates_innermost_loop() {
    assert_eq!(
        run("var r = (); \
             for (var i = 0; i < 3; ++i) { \
               for (var j = 0; j < 3; ++j) { \
                 if (j == 1) break; \
                 r += (j,); \
               } \
             } \
             return r;"),
        Object::Tuple(vec![Object::Int(0), Object::Int(0), Object::Int(0)])
    );
}

#[test]
fn continue_jumps_to_increment() {
    assert_eq!(
        run("var r = (); for (var i = 0; i < 5; ++i) { if (i == 2) continue; r += (i,); } return r;"),
        Object::Tuple(vec![Object::Int(0), Object::Int(1), Object::Int(3), Object::Int(4)])
    );
}

#[test]
fn continue_jumps_to_while_condition() {
    assert_eq!(
        run("var i = 0; var n = 0; \
             while (i < 5) { i = i + 1; if (i == 3) continue; n = n + 1; } \
             return (i, n);"),
        Object::Tuple(vec![Object::Int(5), Object::Int(4)])
    );
}

#[test]
fn break_pops_loop_locals() {
    // locals declared in the loop body must be gone after the break
    assert_eq!(
        run("var r = 0; while (true) { var tmp = 42; r = tmp; break; } return r;"),
        Object::Int(42)
    );
}

#[test]
fn break_and_continue_need_a_loop() {
    assert!(compile("break;").is_err());
    assert!(compile("continue;").is_err());
    assert!(compile("fun f() { break; }").is_err());
}

#[test]
fn conditioned_declarations_are_rejected() {
    assert!(compile("if (true) var x = 1;").is_err());
    assert!(compile("while (true) var x = 1;").is_err());
    assert!(compile("for (;;) var x = 1;").is_err());
}

#[test]
fn function_returns() {
    assert_eq!(run("fun f() { return 3; } return f();"), Object::Int(3));
    assert_eq!(run("fun f() { return; } return f();"), Object::Nil);
    assert_eq!(run("fun f() { } return f();"), Object::Nil);
    // return exits early
    assert_eq!(run("fun f() { return 1; return 2; } return f();"), Object::Int(1));
}

#[test]
fn call_stack_depth_is_bounded() {
    let binary = compile("fun f() { return f(); } return f();").unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(err.message.contains("Call trace overflow"), "got: {}", err.message);
}
