//! Runtime values and their arithmetic/comparison semantics.
//!
//! [`Value`] is the 16-byte tagged representation the VM computes with.
//! Heap-allocated payloads (strings, tuples, classes, instances, dicts) are
//! referenced by arena ids rather than pointers; the ids stay valid until
//! the garbage collector proves the object unreachable.
//!
//! NOTE: it's important to keep `Value` 16 bytes; a unit test below pins it.

use std::cmp::Ordering;
use std::ptr;

use crate::bytecode::SubrRef;
use crate::error::{RunError, RunResult};
use crate::heap::{ClassId, DictId, InstanceId, TupleId};
use crate::intern::{StrId, StringPool};
use crate::vm::Vm;

/// Signature of a host function callable from foxlox code.
///
/// Arguments arrive as a contiguous span; the return value replaces the
/// arguments on the operand stack.
pub type HostFn = fn(&mut Vm, &mut [Value]) -> RunResult<Value>;

/// A bound method: receiver instance + subroutine + super-dispatch depth.
///
/// `super_level` counts how many superclass layers to skip before binding
/// `this` when the method body itself uses `super`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundMethod {
    pub(crate) instance: InstanceId,
    pub(crate) subr: SubrRef,
    pub(crate) super_level: u16,
}

/// A foxlox runtime value.
///
/// A zero-constructed (`Default`) value is `Nil`.
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A host (native) function.
    HostFn(HostFn),
    /// A compiled foxlox subroutine.
    Subr(SubrRef),
    /// A subroutine bound to an instance.
    Method(BoundMethod),
    Str(StrId),
    Tuple(TupleId),
    Class(ClassId),
    Instance(InstanceId),
    Dict(DictId),
}

impl Value {
    /// `nil` and `false` are falsy; every other value is truthy.
    pub(crate) fn is_truthy(self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// The type name used in error messages.
    pub(crate) fn type_name(self) -> &'static str {
        match self {
            Self::Nil => "NIL",
            Self::Bool(_) => "BOOL",
            Self::Int(_) => "I64",
            Self::Float(_) => "F64",
            Self::HostFn(_) => "CPP_FUNC",
            Self::Subr(_) => "FUNC",
            Self::Method(_) => "METHOD",
            Self::Str(_) => "STR",
            Self::Tuple(_) => "TUPLE",
            Self::Class(_) => "CLASS",
            Self::Instance(_) => "INSTANCE",
            Self::Dict(_) => "DICT",
        }
    }

    /// Numeric payload widened to f64; error for non-numbers.
    pub(crate) fn as_f64(self) -> RunResult<f64> {
        match self {
            Self::Int(i) => Ok(i as f64),
            Self::Float(f) => Ok(f),
            other => Err(wrong_type(other)),
        }
    }

    pub(crate) fn is_number(self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }
}

fn wrong_type(got: Value) -> RunError {
    RunError::value(format!("Value type error. Expected: I64, F64, got: {}.", got.type_name()))
}

fn wrong_type_binop(l: Value, r: Value) -> RunError {
    RunError::value(format!(
        "Value type error. Expected: I64, F64, got: {} and {}.",
        l.type_name(),
        r.type_name()
    ))
}

/// `int op int -> int`, otherwise widen to float. `+` on strings and tuples
/// is handled by the VM before reaching here.
pub(crate) fn add(l: Value, r: Value) -> RunResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        _ if l.is_number() && r.is_number() => Ok(Value::Float(l.as_f64()? + r.as_f64()?)),
        _ => Err(wrong_type_binop(l, r)),
    }
}

pub(crate) fn sub(l: Value, r: Value) -> RunResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(b))),
        _ if l.is_number() && r.is_number() => Ok(Value::Float(l.as_f64()? - r.as_f64()?)),
        _ => Err(wrong_type_binop(l, r)),
    }
}

pub(crate) fn mul(l: Value, r: Value) -> RunResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
        _ if l.is_number() && r.is_number() => Ok(Value::Float(l.as_f64()? * r.as_f64()?)),
        _ => Err(wrong_type_binop(l, r)),
    }
}

/// `/` always yields a float.
pub(crate) fn div(l: Value, r: Value) -> RunResult<Value> {
    if l.is_number() && r.is_number() {
        Ok(Value::Float(l.as_f64()? / r.as_f64()?))
    } else {
        Err(wrong_type_binop(l, r))
    }
}

/// `//` yields an int, truncating toward zero after float promotion when
/// either operand is a float.
pub(crate) fn intdiv(l: Value, r: Value) -> RunResult<Value> {
    match (l, r) {
        (Value::Int(_), Value::Int(0)) => Err(RunError::value("Division by zero.")),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(b))),
        _ if l.is_number() && r.is_number() => {
            let rf = r.as_f64()?;
            if rf == 0.0 {
                return Err(RunError::value("Division by zero."));
            }
            Ok(Value::Int((l.as_f64()? / rf) as i64))
        }
        _ => Err(wrong_type_binop(l, r)),
    }
}

pub(crate) fn neg(v: Value) -> RunResult<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(wrong_type(other)),
    }
}

/// `!` requires a bool operand; truthiness applies only to conditional jumps.
pub(crate) fn not(v: Value) -> RunResult<Value> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(RunError::value(format!(
            "Value type error. Expected: BOOL, got: {}.",
            other.type_name()
        ))),
    }
}

/// Value equality: numeric promotion between int and float, structural
/// equality for strings (via interning), reference equality for everything
/// heap-allocated, and instance+subroutine identity for methods.
pub(crate) fn value_eq(l: Value, r: Value) -> bool {
    match (l, r) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (a as f64) == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Tuple(a), Value::Tuple(b)) => a == b,
        (Value::Class(a), Value::Class(b)) => a == b,
        (Value::Instance(a), Value::Instance(b)) => a == b,
        (Value::Dict(a), Value::Dict(b)) => a == b,
        (Value::Subr(a), Value::Subr(b)) => a == b,
        (Value::HostFn(a), Value::HostFn(b)) => ptr::fn_addr_eq(a, b),
        (Value::Method(a), Value::Method(b)) => a.instance == b.instance && a.subr == b.subr,
        _ => false,
    }
}

/// Partial ordering used by the relational opcodes. Mixed or unsupported
/// operand types compare as unordered, which every relational test reads
/// as false.
pub(crate) fn partial_cmp(l: Value, r: Value, strings: &StringPool) -> Option<Ordering> {
    match (l, r) {
        (Value::Nil, Value::Nil) => Some(Ordering::Equal),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(&b)),
        _ if l.is_number() && r.is_number() => {
            let (a, b) = (l.as_f64().ok()?, r.as_f64().ok()?);
            a.partial_cmp(&b)
        }
        (Value::Str(a), Value::Str(b)) => Some(strings.get(a).cmp(strings.get(b))),
        _ => {
            if value_eq(l, r) {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
    }
}

/// A literal value known at compile time, stored in the AST and serialized
/// into a chunk's constant or string table.
#[derive(Debug, Clone)]
pub(crate) enum CompiletimeValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Box<[u8]>),
    /// Host functions can be spliced into an AST by an embedder; they never
    /// serialize into a chunk.
    #[expect(dead_code, reason = "reserved for embedder-injected natives")]
    HostFn(HostFn),
}

/// Public, self-contained view of a [`Value`], materialized with
/// [`Vm::to_object`]. Heap references are deep-copied so the object stays
/// valid independently of the VM.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// String content, lossily decoded as UTF-8.
    Str(String),
    Tuple(Vec<Object>),
    /// A foxlox function, by diagnostic name.
    Function(String),
    NativeFunction,
    /// A bound method: class name + method subroutine name.
    Method(String, String),
    Class(String),
    /// An instance, by class name.
    Instance(String),
    /// Dict entries in insertion order.
    Dict(Vec<(Object, Object)>),
}

impl std::fmt::Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for item in items {
                    if let Self::Str(s) = item {
                        write!(f, "\"{s}\", ")?;
                    } else {
                        write!(f, "{item}, ")?;
                    }
                }
                f.write_str(")")
            }
            Self::Function(name) => write!(f, "<fn {name}>"),
            Self::NativeFunction => f.write_str("<native fn>"),
            Self::Method(class, name) => write!(f, "<class {class} method {name}>"),
            Self::Class(name) => write!(f, "<class {name}>"),
            Self::Instance(class) => write!(f, "<{class} instance>"),
            Self::Dict(_) => f.write_str("<dict>"),
        }
    }
}
