//! `fox.profiler`: wall-clock timing.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RunError, RunResult};
use crate::modules::{LibValue, RuntimeLib, lib_from_pairs};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn lib() -> RuntimeLib {
    lib_from_pairs([("clock", LibValue::Fn(clock))])
}

/// Seconds since the Unix epoch, with millisecond granularity.
fn clock(_vm: &mut Vm, args: &mut [Value]) -> RunResult<Value> {
    if !args.is_empty() {
        return Err(RunError::lib("[clock]: This function does not need any parameters."));
    }
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    Ok(Value::Float(ms as f64 / 1000.0))
}
