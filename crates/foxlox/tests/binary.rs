//! The serialized module format and the VM's loading contract.

use foxlox::{Object, Vm, compile};
use pretty_assertions::assert_eq;

const HEADER: [u8; 8] = [0x04, 0x02, b'F', b'O', b'X', b'L', b'O', b'X'];

#[test]
fn binaries_start_with_the_magic_header() {
    let binary = compile("return 1;").unwrap();
    assert_eq!(&binary[..8], &HEADER);
}

#[test]
fn wrong_magic_is_rejected() {
    let err = Vm::new().run(b"definitely not a chunk").unwrap_err();
    assert_eq!(err.message, "Wrong binary format.");
    let err = Vm::new().run(&[]).unwrap_err();
    assert_eq!(err.message, "Wrong binary format.");
}

#[test]
fn corrupted_magic_is_rejected() {
    let mut binary = compile("return 1;").unwrap();
    binary[2] = b'G';
    let err = Vm::new().run(&binary).unwrap_err();
    assert_eq!(err.message, "Wrong binary format.");
}

#[test]
fn truncated_binary_is_rejected() {
    let binary = compile("return 1;").unwrap();
    let err = Vm::new().run(&binary[..binary.len() / 2]).unwrap_err();
    assert_eq!(err.message, "Wrong binary format.");
}

#[test]
fn a_compiled_blob_is_self_contained() {
    // compile and run in separate steps, as a build pipeline would
    let binary = compile(
        "class Greeter { \
           __init__(name) { this.name = name; } \
           greet() { return \"hi \" + this.name; } \
         } \
         return Greeter(\"fox\").greet();",
    )
    .unwrap();
    let mut vm = Vm::new();
    let value = vm.run(&binary).unwrap();
    assert_eq!(vm.to_object(&value), Object::Str("hi fox".to_owned()));
}

#[test]
fn a_vm_runs_only_one_top_level_binary() {
    let binary = compile("return 1;").unwrap();
    let mut vm = Vm::new();
    vm.run(&binary).unwrap();
    let err = vm.run(&binary).unwrap_err();
    assert!(err.message.contains("already been loaded"), "got: {}", err.message);
}
