//! Bytecode: the instruction set, the compiled-module container, and the
//! code generator.
//!
//! - `op` — opcode enum
//! - `chunk` — `Chunk`/`Subroutine`/line tables + binary serialization
//! - `compiler` — resolved AST to `Chunk`

pub(crate) use chunk::{Chunk, Constant, Subroutine};
pub use chunk::SubrRef;
pub(crate) use compiler::r#gen;
pub(crate) use op::Op;

mod chunk;
mod compiler;
mod op;
