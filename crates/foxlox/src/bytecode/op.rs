//! The instruction set.
//!
//! One opcode byte followed by 0-2 bytes of big-endian immediate payload.

use strum::{Display, FromRepr};

/// Opcodes, in wire order. The discriminant is the encoded byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
pub(crate) enum Op {
    Nop,
    Nil,
    Return,
    ReturnV,
    Pop,
    /// u16: number of values to pop.
    PopN,
    /// u16: argument count.
    Call,
    Negate,
    Not,
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDiv,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// u16: constant table index.
    Constant,
    /// u16: const-string table index (chunk-relative).
    String,
    /// u8: 0 or 1.
    Bool,
    /// u16: element count.
    Tuple,
    /// u16: subroutine index in the current chunk.
    Func,
    /// u16: class index (chunk-relative).
    Class,
    /// u16: distance from the stack top.
    LoadStack,
    /// u16: distance from the stack top.
    StoreStack,
    /// u16: static slot (chunk-relative).
    LoadStatic,
    /// u16: static slot (chunk-relative).
    StoreStatic,
    /// i16: relative jump.
    Jump,
    JumpIfTrue,
    JumpIfFalse,
    JumpIfTrueNoPop,
    JumpIfFalseNoPop,
    /// u16: property name index in the const-string table.
    SetProperty,
    GetProperty,
    Inherit,
    /// u16: method name index in the const-string table.
    GetSuperMethod,
    /// u16: number of path components.
    Import,
    /// u16: expected tuple length.
    Unpack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Op::from_repr(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Op::from_repr(Op::Unpack as u8), Some(Op::Unpack));
        assert_eq!(Op::from_repr(Op::Unpack as u8 + 1), None);
    }
}
