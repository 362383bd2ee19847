//! Compile-time diagnostics and the runtime error taxonomy.
//!
//! Compile-time errors are accumulated per front-end phase in a
//! [`Diagnostics`] sink and flushed to stderr by the compile entry points.
//! Runtime failures travel as [`RunError`] values through the VM and are
//! wrapped into a [`RuntimeError`] (message + line + source text) at the
//! dispatch-loop boundary.

use std::fmt::{self, Display};

use strum::{Display as StrumDisplay, IntoStaticStr};

use crate::scanner::{Token, TokenType};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// The kinds of recoverable runtime failures.
///
/// The string representation matches the variant name exactly
/// (e.g. `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, IntoStaticStr)]
pub enum ErrorKind {
    /// Wrong operand type: arithmetic on non-numbers, property access on a
    /// non-object, calling a non-callable, missing super method.
    ValueError,
    /// Invariant violations detected at a boundary: wrong call arity,
    /// tuple-unpack size mismatch, stack overflow, bad builtin arity.
    InternalRuntimeError,
    /// Features the runtime names but does not evaluate. Arrays are the
    /// only member of this class, and no expression constructs one, so the
    /// kind is reserved for embedders.
    UnimplementedError,
    /// A builtin library rejected its arguments.
    RuntimeLibError,
}

/// A recoverable runtime failure, before line/source attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// Which failure class this is.
    pub kind: ErrorKind,
    /// Human-readable failure description.
    pub message: String,
}

impl RunError {
    /// A `ValueError`: wrong operand type.
    pub fn value(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValueError,
            message: message.into(),
        }
    }

    /// An `InternalRuntimeError`: boundary invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InternalRuntimeError,
            message: message.into(),
        }
    }

    /// A `RuntimeLibError`: a builtin library rejected its arguments.
    pub fn lib(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RuntimeLibError,
            message: message.into(),
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A runtime failure attributed to a source position.
///
/// Produced by [`crate::Vm::run`]; `line` is `-1` for failures at end of
/// input and `0` for failures with no source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    /// Human-readable failure description.
    pub message: String,
    /// 1-based source line, or `-1` / `0` when no line applies.
    pub line: i32,
    /// The text of the offending source line.
    pub source: String,
}

impl RuntimeError {
    pub(crate) fn bare(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            source: String::new(),
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n[line {}] {}", self.message, self.line, self.source)
    }
}

impl std::error::Error for RuntimeError {}

/// Raised when a chunk-local table (constants, strings, subroutines,
/// classes, static slots) overflows its u16 index space. The code generator
/// converts it into a compile diagnostic at the offending token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkError(pub(crate) &'static str);

impl Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Compilation failure: the accumulated diagnostics of all phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Formatted `[line N] Error …` messages, in source order.
    pub errors: Vec<String>,
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            f.write_str(e)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Per-phase sink for compile diagnostics.
///
/// Every front-end phase (parser, resolver, code generator) owns one and
/// keeps processing after the first error so later errors still surface.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records an error at `token`, formatted the same way for every phase:
    /// `[line N] Error at `lexeme': message` (or ` at end` for EOF, nothing
    /// for scanner error tokens whose lexeme already is the message).
    pub(crate) fn error(&mut self, token: &Token, message: &str) {
        let at = match token.ttype {
            TokenType::Eof => " at end".to_string(),
            TokenType::Error => String::new(),
            _ => format!(" at `{}'", token.lexeme),
        };
        self.messages.push(format!("[line {}] Error{}: {}", token.line, at, message));
    }

    pub(crate) fn had_error(&self) -> bool {
        !self.messages.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }
}
