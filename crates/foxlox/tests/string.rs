//! String literals, escapes, interning, and line tracking across multiline
//! strings.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn literals() {
    assert_eq!(run("return \"a string\";"), Object::Str("a string".to_owned()));
    assert_eq!(run("return \"(\" + \")\";"), Object::Str("()".to_owned()));
}

#[test]
fn non_ascii() {
    assert_eq!(run("return \"你好，世界！\";"), Object::Str("你好，世界！".to_owned()));
}

#[test]
fn multiline() {
    assert_eq!(run("return \"1\n2\n3\";"), Object::Str("1\n2\n3".to_owned()));
}

#[test]
fn escapes_decode_like_c() {
    assert_eq!(
        run(r#"return "\'\"\?\\\a\b\f\r\n\t\v\0";"#),
        Object::Str("\'\"?\\\u{7}\u{8}\u{c}\r\n\t\u{b}\0".to_owned())
    );
    assert_eq!(run(r#"return "\x41\102九";"#), Object::Str("AB九".to_owned()));
    assert_eq!(run(r#"return "\U00024b62";"#), Object::Str("𤭢".to_owned()));
}

#[test]
fn unterminated_string_is_a_compile_error() {
    assert!(compile("return \"this string has no close quote\n").is_err());
}

#[test]
fn concatenation_interns() {
    assert_eq!(run("var a = \"foo\" + \"bar\"; return a == \"foobar\";"), Object::Bool(true));
    assert_eq!(
        run("var s = \"\"; for (var i = 0; i < 2; ++i) s += \"ab\"; return s == \"abab\";"),
        Object::Bool(true)
    );
}

#[test]
fn error_line_tracked_across_multiline_string() {
    let binary = compile(
        "\n# Tests that line info survives multiline strings.\nvar a = \"1\n2\n3\n\";\na(); # error\n",
    )
    .unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert_eq!(err.line, 7);
    assert_eq!(err.source, "a(); # error");
}

#[test]
fn concatenation_with_non_string_fails() {
    let binary = compile("return \"a\" + 1;").unwrap();
    assert!(Vm::new().run(&binary).is_err());
}
