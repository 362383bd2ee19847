//! Inheritance and multi-level `super` dispatch.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn methods_are_inherited() {
    assert_eq!(
        run("class A { greet() { return \"A\"; } } \
             class B : A {} \
             return B().greet();"),
        Object::Str("A".to_owned())
    );
}

#[test]
fn subclass_shadows_superclass_methods() {
    assert_eq!(
        run("class A { greet() { return \"A\"; } } \
             class B : A { greet() { return \"B\"; } } \
             return B().greet();"),
        Object::Str("B".to_owned())
    );
}

#[test]
fn super_reaches_the_parent() {
    assert_eq!(
        run("class A{ greet(){return \"A\";} } \
             class B:A{ greet(){return \"B\";} } \
             class C:B{ greet(){return \"C\"+super.greet();} } \
             return C().greet();"),
        Object::Str("CB".to_owned())
    );
}

#[test]
fn chained_super_climbs_level_by_level() {
    assert_eq!(
        run("class A{ greet(){return \"A\";} } \
             class B:A{ greet(){return super.greet();} } \
             class C:B{ greet(){return super.greet();} } \
             return C().greet();"),
        Object::Str("A".to_owned())
    );
}

#[test]
fn this_in_super_called_method_is_the_original_receiver() {
    assert_eq!(
        run("class A { who() { return this.name; } } \
             class B : A { \
               __init__(name) { this.name = name; } \
               who() { return \"B:\" + super.who(); } \
             } \
             return B(\"bob\").who();"),
        Object::Str("B:bob".to_owned())
    );
}

#[test]
fn super_init_builds_on_the_parent() {
    assert_eq!(
        run("class A { __init__() { this.base = 1; } } \
             class B : A { __init__() { super.__init__(); this.extra = 2; } } \
             var b = B(); return (b.base, b.extra);"),
        Object::Tuple(vec![Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn method_table_is_copied_at_inherit_time() {
    // reassigning the superclass name later must not change the subclass
    assert_eq!(
        run("class A { greet() { return \"A\"; } } \
             var Base = A; \
             class D : Base { greet() { return \"D\" + super.greet(); } } \
             Base = nil; \
             return D().greet();"),
        Object::Str("DA".to_owned())
    );
}

#[test]
fn inherited_constructor() {
    assert_eq!(
        run("class A { __init__(v) { this.v = v; } } \
             class B : A {} \
             return B(9).v;"),
        Object::Int(9)
    );
}

#[test]
fn super_outside_a_subclass_is_rejected() {
    assert!(compile("class A { m() { return super.m(); } }").is_err());
    assert!(compile("return super.m();").is_err());
}

#[test]
fn class_cannot_inherit_from_itself() {
    assert!(compile("class A : A {}").is_err());
}

#[test]
fn inheriting_from_a_non_class_fails_at_runtime() {
    let binary = compile("var notaclass = 1; class C : notaclass {}").unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(err.message.contains("not a class"), "got: {}", err.message);
}

#[test]
fn missing_super_method_is_an_error() {
    let binary = compile(
        "class A {} \
         class B : A { m() { return super.nope(); } } \
         B().m();",
    )
    .unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(err.message.contains("no method with name"), "got: {}", err.message);
}
