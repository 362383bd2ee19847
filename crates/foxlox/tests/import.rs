//! Imports: builtin libraries, external modules, exports, and the module
//! cache.

use std::fs;

use foxlox::{Object, Vm, compile, compile_file};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Object {
    let binary = compile(source).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    vm.to_object(&value)
}

#[test]
fn builtin_import() {
    assert_eq!(
        run("import fox.algorithm; \
             return (algorithm.max(4,7,5,-3), algorithm.min(4,7,5,-3),);"),
        Object::Tuple(vec![Object::Int(7), Object::Int(-3)])
    );
}

#[test]
fn builtin_import_as() {
    assert_eq!(
        run("import fox.algorithm as algo; return algo.max(1, 3, 2);"),
        Object::Int(3)
    );
}

#[test]
fn from_import() {
    assert_eq!(
        run("from fox.algorithm import min; return min(4,7,5,-3);"),
        Object::Int(-3)
    );
    assert_eq!(
        run("from fox.algorithm import min, max; return (max(4,7), min(4,7),);"),
        Object::Tuple(vec![Object::Int(7), Object::Int(4)])
    );
    assert_eq!(
        run("from fox.math import sqrt as root; return root(16);"),
        Object::Float(4.0)
    );
}

#[test]
fn library_dict_holds_exactly_the_registered_names() {
    assert_eq!(
        run("import fox.algorithm; return (algorithm.max, algorithm.min) != ();"),
        Object::Bool(true)
    );
    // unregistered names read as nil, like missing dict keys
    assert_eq!(run("import fox.algorithm; return algorithm.sort;"), Object::Nil);
}

#[test]
fn math_and_profiler() {
    assert_eq!(run("import fox.math; return math.floor(3.7);"), Object::Float(3.0));
    assert_eq!(run("import fox.math; return math.abs(0 - 4);"), Object::Int(4));
    assert_eq!(run("import fox.math; return math.pi > 3.14 and math.pi < 3.15;"), Object::Bool(true));
    assert_eq!(run("from fox.profiler import clock; return clock() > 0.0;"), Object::Bool(true));
}

#[test]
fn exports_resolve_to_static_slots() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("shapes.fox"),
        "export var unit = 1;\nexport fun area(w, h) { return w * h; }\n",
    )
    .unwrap();
    let main = dir.path().join("main.fox");
    fs::write(
        &main,
        "from shapes import area, unit;\nreturn area(6, 7) + unit;\n",
    )
    .unwrap();

    let binary = compile_file(&main).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    assert_eq!(vm.to_object(&value), Object::Int(43));
}

#[test]
fn export_binds_the_value_the_module_computed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("m.fox"),
        "export var x = 0;\nx = 41;\nx = x + 1;\n",
    )
    .unwrap();
    let main = dir.path().join("main.fox");
    fs::write(&main, "from m import x;\nreturn x;\n").unwrap();

    let binary = compile_file(&main).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    assert_eq!(vm.to_object(&value), Object::Int(42));
}

#[test]
fn modules_are_cached_per_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("counted.fox"), "export var tag = 1;\n").unwrap();
    let main = dir.path().join("main.fox");
    fs::write(
        &main,
        "import counted;\nimport counted as again;\nreturn (counted.tag, again.tag);\n",
    )
    .unwrap();

    let binary = compile_file(&main).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    assert_eq!(
        vm.to_object(&value),
        Object::Tuple(vec![Object::Int(1), Object::Int(1)])
    );
}

#[test]
fn nested_module_paths() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
    fs::write(dir.path().join("pkg/sub/leaf.fox"), "export var v = 99;\n").unwrap();
    let main = dir.path().join("main.fox");
    fs::write(&main, "import pkg.sub.leaf;\nreturn leaf.v;\n").unwrap();

    let binary = compile_file(&main).expect("compile failed");
    let mut vm = Vm::new();
    let value = vm.run(&binary).expect("runtime error");
    assert_eq!(vm.to_object(&value), Object::Int(99));
}

#[test]
fn missing_module_is_a_runtime_error() {
    let binary = compile("import surely.missing.module;").unwrap();
    let err = Vm::new().run(&binary).unwrap_err();
    assert!(err.message.contains("Failed to find file"), "got: {}", err.message);
}

#[test]
fn custom_host_library() {
    use foxlox::{LibValue, RunError, RuntimeLib, Value, Vm};

    fn double(_vm: &mut Vm, args: &mut [Value]) -> Result<Value, RunError> {
        match args {
            [Value::Int(i)] => Ok(Value::Int(*i * 2)),
            _ => Err(RunError::lib("[double]: Requires one integer.")),
        }
    }

    let mut lib = RuntimeLib::new();
    lib.insert("double".to_owned(), LibValue::Fn(double));
    lib.insert("offset".to_owned(), LibValue::Int(4));

    let binary = compile("from host.util import double, offset; return double(19) + offset;").unwrap();
    let mut vm = Vm::new();
    vm.load_lib("host.util", lib);
    let value = vm.run(&binary).expect("runtime error");
    assert_eq!(vm.to_object(&value), Object::Int(42));
}
