//! AS32 instruction encoding.
//!
//! Every instruction is a 16-bit opcode, two 8-bit addressing-mode tags, and
//! zero, one, or two 32-bit operand words, all little-endian. The executor
//! always examines a full [`FETCH_WINDOW`] regardless of arity, so a stream
//! needs padding after its last short instruction; operand words beyond an
//! opcode's arity are padding and may overlap the next instruction.

use byteorder::{ByteOrder, LittleEndian};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Bytes the executor examines per fetch: the 4-byte header plus two words.
pub const FETCH_WINDOW: usize = 12;

/// AS32 opcodes. Discriminants are the on-wire values.
///
/// Binary arithmetic, bitwise, and compare opcodes all write their result to
/// the implicit destination: the frame word at the current stack cursor.
#[repr(u16)]
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
pub enum Opcode {
    /// Reserved encoding; executing it faults.
    Expand = 0x01,
    /// (op1, op2): move op2 to op1.
    Mov = 0x89,
    /// (op1): move op1 to the stack cursor. The value is resolved through
    /// the *second* mode tag.
    MovSp = 0xB8,
    /// (op1, op2): exchange op1 and op2.
    Xchg = 0x87,

    /// (op1, op2): op1 + op2.
    Add = 0x03,
    /// (op1, op2): op1 - op2.
    Sub = 0x2B,
    /// (op1, op2): op1 * op2.
    Mul = 0xF7,
    /// (op1, op2): op1 / op2; faults on a zero divisor.
    Div = 0xF8,
    /// (op1): increment op1 in place.
    Inc = 0x40,
    /// (op1): decrement op1 in place.
    Dec = 0x48,
    /// (op1): negate op1 in place.
    Neg = 0xF9,

    /// (op1, op2): op1 & op2.
    And = 0x23,
    /// (op1, op2): op1 | op2.
    Or = 0x0B,
    /// (op1, op2): op1 ^ op2.
    Xor = 0x33,
    /// (op1): !op1.
    Not = 0xFA,
    /// (op1, op2): shift op1 left by op2; a negative op2 shifts right.
    Shl = 0xD1,

    /// (op1): store op1 in the stack slot, then advance the cursor one word.
    Push = 0x50,
    /// (): retract the stack cursor one word.
    Pop = 0x58,
    /// (op1): jump to op1.
    Jmp = 0xE9,
    /// (op1): jump to op1 if the stack slot is zero.
    Jz = 0x74,
    /// (op1): jump to op1 if the stack slot is not zero.
    Jnz = 0x75,
    /// (op1): call the callable named by op1. Non-negative values name local
    /// functions, negative values name imports (`-1` is import 0).
    Call = 0xE8,
    /// (op1): call hostcall table entry op1.
    CallHost = 0xFF,
    /// (): return from the current activation.
    Ret = 0xC3,
    /// (): no operation.
    Nop = 0x90,
    /// (): interrupt; faults the activation unconditionally.
    Int = 0xCC,

    /// (op1, op2): op1 == op2.
    Cmp = 0x39,
    /// (op1, op2): op1 > op2.
    CmpG = 0x7D,
    /// (op1, op2): op1 >= op2.
    CmpGe = 0x7E,
}

impl Opcode {
    pub fn try_from_u16(v: u16) -> Option<Opcode> {
        Self::from_u16(v)
    }

    /// Number of operand words encoded after the 4-byte header. The program
    /// counter advances by `4 + 4 * operand_words()` past a non-jumping
    /// instruction.
    pub fn operand_words(self) -> usize {
        match self {
            Opcode::Mov
            | Opcode::Xchg
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Cmp
            | Opcode::CmpG
            | Opcode::CmpGe => 2,
            Opcode::MovSp
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Neg
            | Opcode::Not
            | Opcode::Push
            | Opcode::Jmp
            | Opcode::Jz
            | Opcode::Jnz
            | Opcode::Call
            | Opcode::CallHost => 1,
            Opcode::Expand | Opcode::Pop | Opcode::Ret | Opcode::Nop | Opcode::Int => 0,
        }
    }
}

/// Addressing-mode tags. All operands are interpreted as `i32`.
///
/// Tag 4 is reserved (the caller's cursor can be addressed through, but never
/// read or altered directly) and does not decode.
#[repr(u8)]
#[derive(Copy, Clone, Debug, FromPrimitive, PartialEq, Eq)]
pub enum AddrMode {
    /// The operand itself. Not writable.
    Immediate = 0,
    /// The frame word at the absolute operand offset.
    Absolute = 1,
    /// The address `stack cursor + operand`. Never dereferenced, not writable.
    Stack = 2,
    /// The frame word at `stack cursor + operand`.
    StackIndirect = 3,
    /// The caller-frame word at `caller's stack cursor + operand`.
    CallerIndirect = 5,
    /// The module-data word at the absolute operand offset.
    DataIndirect = 6,
}

/// One decoded fetch window.
#[derive(Copy, Clone, Debug)]
pub struct Instruction {
    pub opcode: u16,
    pub modes: [u8; 2],
    pub operands: [i32; 2],
}

impl Instruction {
    /// Decode the window at `pc`, or `None` if fewer than [`FETCH_WINDOW`]
    /// bytes remain.
    pub fn fetch(code: &[u8], pc: u32) -> Option<Instruction> {
        let at = pc as usize;
        let end = at.checked_add(FETCH_WINDOW)?;
        if end > code.len() {
            return None;
        }
        Some(Instruction {
            opcode: LittleEndian::read_u16(&code[at..]),
            modes: [code[at + 2], code[at + 3]],
            operands: [
                LittleEndian::read_i32(&code[at + 4..]),
                LittleEndian::read_i32(&code[at + 8..]),
            ],
        })
    }

    pub fn mode1(&self) -> Option<AddrMode> {
        AddrMode::from_u8(self.modes[0])
    }

    pub fn mode2(&self) -> Option<AddrMode> {
        AddrMode::from_u8(self.modes[1])
    }
}

/// Append a zero-operand instruction to `buf`.
pub fn encode_op0(buf: &mut Vec<u8>, opcode: Opcode) {
    debug_assert_eq!(opcode.operand_words(), 0);
    let mut bytes = [0; 4];
    LittleEndian::write_u16(&mut bytes, opcode as u16);
    buf.extend_from_slice(&bytes);
}

/// Append a one-operand instruction to `buf`.
///
/// `MovSp` resolves its value through the second mode slot while every other
/// unary opcode reads the first, so `mode` is written to both; no opcode
/// reads its unused slot.
pub fn encode_op1(buf: &mut Vec<u8>, opcode: Opcode, mode: AddrMode, operand: i32) {
    debug_assert_eq!(opcode.operand_words(), 1);
    let mut bytes = [0; 8];
    LittleEndian::write_u16(&mut bytes, opcode as u16);
    bytes[2] = mode as u8;
    bytes[3] = mode as u8;
    LittleEndian::write_i32(&mut bytes[4..], operand);
    buf.extend_from_slice(&bytes);
}

/// Append a two-operand instruction to `buf`.
pub fn encode_op2(
    buf: &mut Vec<u8>,
    opcode: Opcode,
    mode1: AddrMode,
    operand1: i32,
    mode2: AddrMode,
    operand2: i32,
) {
    debug_assert_eq!(opcode.operand_words(), 2);
    let mut bytes = [0; 12];
    LittleEndian::write_u16(&mut bytes, opcode as u16);
    bytes[2] = mode1 as u8;
    bytes[3] = mode2 as u8;
    LittleEndian::write_i32(&mut bytes[4..], operand1);
    LittleEndian::write_i32(&mut bytes[8..], operand2);
    buf.extend_from_slice(&bytes);
}
