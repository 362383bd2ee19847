//! `fox.algorithm`: ordering helpers over argument spans.

use std::cmp::Ordering;

use crate::error::{RunError, RunResult};
use crate::modules::{LibValue, RuntimeLib, lib_from_pairs};
use crate::value::{self, Value};
use crate::vm::Vm;

pub(crate) fn lib() -> RuntimeLib {
    lib_from_pairs([("max", LibValue::Fn(max)), ("min", LibValue::Fn(min))])
}

fn extreme(name: &str, vm: &Vm, args: &[Value], keep: Ordering) -> RunResult<Value> {
    let Some((&first, rest)) = args.split_first() else {
        return Err(RunError::lib(format!("[{name}]: Requires at least one parameter.")));
    };
    let mut best = first;
    for &v in rest {
        match value::partial_cmp(v, best, &vm.strings) {
            Some(ord) if ord == keep => best = v,
            Some(_) => {}
            None => {
                return Err(RunError::lib(format!("[{name}]: Values are not comparable.")));
            }
        }
    }
    Ok(best)
}

fn max(vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    extreme("max", vm, args, Ordering::Greater)
}

fn min(vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    extreme("min", vm, args, Ordering::Less)
}
