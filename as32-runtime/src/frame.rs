//! Activation records and operand resolution.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use as32_module::{AddrMode, Function, Module};

use crate::error::{Error, TrapCode};

/// One activation of a [`Function`]: a private copy of its buffer plus the
/// stack cursor and program counter.
///
/// The buffer serves as code, static storage, and stack at once; operands
/// address it through [`AddrMode`]. Hostcalls receive the calling frame and
/// marshal their own arguments with the same resolver the executor uses.
pub struct Frame {
    mem: Vec<u8>,
    sp: u32,
    pc: u32,
    module: Arc<Module>,
}

/// A resolved, bounds-checked write location.
#[derive(Copy, Clone, Debug)]
pub(crate) enum WriteTarget {
    Own(u32),
    Caller(u32),
    Data(u32),
}

impl Frame {
    pub(crate) fn enter(function: &Function, module: Arc<Module>) -> Frame {
        Frame {
            mem: function.assembly().to_vec(),
            sp: 0,
            pc: function.entry_offset(),
            module,
        }
    }

    /// The stack cursor: the frame-relative base of stack addressing.
    pub fn sp(&self) -> u32 {
        self.sp
    }

    pub(crate) fn set_sp(&mut self, sp: u32) {
        self.sp = sp;
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub(crate) fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// The module this activation executes under.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn mem(&self) -> &[u8] {
        &self.mem
    }

    pub(crate) fn fault(&self, trapcode: TrapCode) -> Error {
        Error::fault(trapcode, self.pc)
    }

    fn word(&self, offset: u32) -> Result<i32, Error> {
        word_at(&self.mem, offset).ok_or_else(|| self.fault(TrapCode::OutOfBounds))
    }

    /// Confirm a full word (`offset + 4 <= len`) fits, faulting otherwise.
    fn check(&self, offset: u32, len: usize) -> Result<(), Error> {
        match (offset as usize).checked_add(4) {
            Some(end) if end <= len => Ok(()),
            _ => Err(self.fault(TrapCode::OutOfBounds)),
        }
    }

    fn put_word(&mut self, offset: u32, value: i32) -> Result<(), Error> {
        if put_word_at(&mut self.mem, offset, value) {
            Ok(())
        } else {
            Err(self.fault(TrapCode::OutOfBounds))
        }
    }

    /// The word at the current stack cursor: the implicit destination of the
    /// binary opcodes and the argument slot of the reference hostcalls.
    pub fn stack_value(&self) -> Result<i32, Error> {
        self.word(self.sp)
    }

    pub fn set_stack_value(&mut self, value: i32) -> Result<(), Error> {
        let sp = self.sp;
        self.put_word(sp, value)
    }

    /// Resolve a readable operand.
    ///
    /// Immediate yields the operand itself and Stack yields the address
    /// `sp + operand`; every other mode resolves its write location and
    /// reads through it.
    pub fn read(&self, mode: AddrMode, operand: i32, caller: Option<&Frame>) -> Result<i32, Error> {
        match mode {
            AddrMode::Immediate => Ok(operand),
            AddrMode::Stack => Ok(self.sp.wrapping_add(operand as u32) as i32),
            _ => {
                let target = self.resolve_write(mode, operand, caller)?;
                self.load(target, caller)
            }
        }
    }

    /// Resolve a writable operand and store `value` through it.
    pub fn write(
        &mut self,
        mode: AddrMode,
        operand: i32,
        value: i32,
        mut caller: Option<&mut Frame>,
    ) -> Result<(), Error> {
        let target = self.resolve_write(mode, operand, caller.as_deref())?;
        self.store(target, value, caller.as_deref_mut())
    }

    /// Resolve a mode/operand pair to a bounds-checked write location.
    /// Immediate and Stack are value-producing only and fail here.
    pub(crate) fn resolve_write(
        &self,
        mode: AddrMode,
        operand: i32,
        caller: Option<&Frame>,
    ) -> Result<WriteTarget, Error> {
        match mode {
            AddrMode::Immediate | AddrMode::Stack => Err(self.fault(TrapCode::NotWritable)),
            AddrMode::Absolute => {
                let offset = operand as u32;
                self.check(offset, self.mem.len())?;
                Ok(WriteTarget::Own(offset))
            }
            AddrMode::StackIndirect => {
                let offset = self.sp.wrapping_add(operand as u32);
                self.check(offset, self.mem.len())?;
                Ok(WriteTarget::Own(offset))
            }
            AddrMode::CallerIndirect => {
                let caller = caller.ok_or_else(|| self.fault(TrapCode::NoCallerFrame))?;
                let offset = caller.sp.wrapping_add(operand as u32);
                self.check(offset, caller.mem.len())?;
                Ok(WriteTarget::Caller(offset))
            }
            AddrMode::DataIndirect => {
                let offset = operand as u32;
                let len = self.module.data().len();
                self.check(offset, len)?;
                Ok(WriteTarget::Data(offset))
            }
        }
    }

    pub(crate) fn load(&self, target: WriteTarget, caller: Option<&Frame>) -> Result<i32, Error> {
        match target {
            WriteTarget::Own(offset) => self.word(offset),
            WriteTarget::Caller(offset) => {
                let caller = caller.ok_or_else(|| self.fault(TrapCode::NoCallerFrame))?;
                word_at(&caller.mem, offset).ok_or_else(|| self.fault(TrapCode::OutOfBounds))
            }
            WriteTarget::Data(offset) => word_at(&self.module.data(), offset)
                .ok_or_else(|| self.fault(TrapCode::OutOfBounds)),
        }
    }

    pub(crate) fn store(
        &mut self,
        target: WriteTarget,
        value: i32,
        caller: Option<&mut Frame>,
    ) -> Result<(), Error> {
        match target {
            WriteTarget::Own(offset) => self.put_word(offset, value),
            WriteTarget::Caller(offset) => {
                let caller = match caller {
                    Some(caller) => caller,
                    None => return Err(self.fault(TrapCode::NoCallerFrame)),
                };
                if put_word_at(&mut caller.mem, offset, value) {
                    Ok(())
                } else {
                    Err(self.fault(TrapCode::OutOfBounds))
                }
            }
            WriteTarget::Data(offset) => {
                let ok = put_word_at(&mut self.module.data(), offset, value);
                if ok {
                    Ok(())
                } else {
                    Err(self.fault(TrapCode::OutOfBounds))
                }
            }
        }
    }

    /// The NUL-terminated byte string at `offset` in this frame, without the
    /// terminator. A string running off the end of the frame faults.
    pub fn cstr(&self, offset: u32) -> Result<&[u8], Error> {
        let at = offset as usize;
        if at >= self.mem.len() {
            return Err(self.fault(TrapCode::OutOfBounds));
        }
        let tail = &self.mem[at..];
        match tail.iter().position(|&b| b == 0) {
            Some(end) => Ok(&tail[..end]),
            None => Err(self.fault(TrapCode::OutOfBounds)),
        }
    }
}

fn word_at(bytes: &[u8], offset: u32) -> Option<i32> {
    let at = offset as usize;
    let end = at.checked_add(4)?;
    if end > bytes.len() {
        return None;
    }
    Some(LittleEndian::read_i32(&bytes[at..end]))
}

fn put_word_at(bytes: &mut [u8], offset: u32, value: i32) -> bool {
    let at = offset as usize;
    let end = match at.checked_add(4) {
        Some(end) => end,
        None => return false,
    };
    if end > bytes.len() {
        return false;
    }
    LittleEndian::write_i32(&mut bytes[at..end], value);
    true
}
