//! Builtin libraries, importable as `fox.io`, `fox.math`, `fox.algorithm`,
//! and `fox.profiler`.
//!
//! A library is an insertion-ordered name-to-value table; `import`
//! materializes it into a fresh dict each time.

mod algorithm;
mod io;
mod math;
mod profiler;

use indexmap::IndexMap;

use crate::value::HostFn;

/// A value registrable in a builtin library.
#[derive(Debug, Clone)]
pub enum LibValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Fn(HostFn),
}

/// A builtin library: name-to-value table in registration order.
pub type RuntimeLib = IndexMap<String, LibValue>;

pub(crate) fn lib_from_pairs(pairs: impl IntoIterator<Item = (&'static str, LibValue)>) -> RuntimeLib {
    pairs.into_iter().map(|(name, v)| (name.to_owned(), v)).collect()
}

/// The default library set, loaded by [`crate::Vm::new`].
pub(crate) fn default_libs() -> Vec<(&'static str, RuntimeLib)> {
    vec![
        ("fox.algorithm", algorithm::lib()),
        ("fox.io", io::lib()),
        ("fox.math", math::lib()),
        ("fox.profiler", profiler::lib()),
    ]
}
