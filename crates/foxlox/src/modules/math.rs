//! `fox.math`: numeric constants and elementary functions.

use crate::error::{RunError, RunResult};
use crate::modules::{LibValue, RuntimeLib, lib_from_pairs};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn lib() -> RuntimeLib {
    lib_from_pairs([
        ("pi", LibValue::Float(std::f64::consts::PI)),
        ("sqrt", LibValue::Fn(sqrt)),
        ("abs", LibValue::Fn(abs)),
        ("floor", LibValue::Fn(floor)),
        ("ceil", LibValue::Fn(ceil)),
    ])
}

fn one_number(name: &str, args: &[Value]) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(RunError::internal(format!(
            "Wrong number of function parameters. Expect: 1, got: {}.",
            args.len()
        )));
    }
    if !args[0].is_number() {
        return Err(RunError::lib(format!("[{name}]: Requires a number.")));
    }
    Ok(args[0])
}

fn sqrt(_vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    let v = one_number("sqrt", args)?;
    Ok(Value::Float(v.as_f64()?.sqrt()))
}

fn abs(_vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    match one_number("abs", args)? {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => unreachable!("one_number returned a non-number"),
    }
}

fn floor(_vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    match one_number("floor", args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => Ok(Value::Float(f.floor())),
        _ => unreachable!("one_number returned a non-number"),
    }
}

fn ceil(_vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    match one_number("ceil", args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => Ok(Value::Float(f.ceil())),
        _ => unreachable!("one_number returned a non-number"),
    }
}
