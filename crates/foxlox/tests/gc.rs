//! Collector soundness under allocation pressure.
//!
//! These programs allocate far past the first GC threshold (1 MiB), so
//! multiple collection cycles run mid-program; every value reachable at the
//! end must still be intact.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn garbage_tuples_are_collected_and_live_data_survives() {
    assert_eq!(
        run("fun waste() { \
               var t = (1, 2, 3, 4, 5, 6, 7, 8); \
               return (t, t, t, t); \
             } \
             var keep = (\"keep\", 42); \
             for (var i = 0; i < 200000; ++i) { \
               waste(); \
             } \
             return keep;"),
        Object::Tuple(vec![Object::Str("keep".to_owned()), Object::Int(42)])
    );
}

#[test]
fn unreachable_strings_are_purged_and_equal_content_reinterns() {
    // every iteration replaces `s` with a longer string, orphaning the old
    // one; the final equalities only hold if re-interning equal content
    // still yields one shared string
    assert_eq!(
        run("var s = \"\"; \
             for (var i = 0; i < 3000; ++i) { \
               s = s + \"ab\"; \
             } \
             return (s == \"\" + s, s + \"tail\" == s + \"tail\",);"),
        Object::Tuple(vec![Object::Bool(true), Object::Bool(true)])
    );
}

#[test]
fn instances_keep_their_fields_across_collections() {
    assert_eq!(
        run("class Node { __init__(v) { this.v = v; } } \
             var root = Node(\"root\"); \
             for (var i = 0; i < 100000; ++i) { \
               Node(i); \
             } \
             return root.v;"),
        Object::Str("root".to_owned())
    );
}

#[test]
fn statics_captured_by_live_closures_survive() {
    assert_eq!(
        run("fun make() { var secret = (\"s\", 1); fun get() { return secret; } return get; } \
             var g = make(); \
             for (var i = 0; i < 100000; ++i) { \
               (i, i, i, i, i, i); \
             } \
             return g();"),
        Object::Tuple(vec![Object::Str("s".to_owned()), Object::Int(1)])
    );
}

#[test]
fn module_dicts_survive_collections() {
    assert_eq!(
        run("import fox.algorithm; \
             for (var i = 0; i < 100000; ++i) { \
               (i, i, i, i); \
             } \
             return algorithm.max(1, 2);"),
        Object::Int(2)
    );
}
