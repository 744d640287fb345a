//! The fetch-decode-execute loop.

use std::convert::TryFrom;
use std::sync::Arc;

use as32_module::{AddrMode, Instruction, Module, Opcode};

use crate::error::{Error, TrapCode};
use crate::frame::Frame;
use crate::hostcall::HostcallTable;

/// What an executed instruction decided about control flow.
enum Flow {
    /// Fall through to the next instruction.
    Advance,
    /// The program counter was set explicitly.
    Jump(u32),
    /// Activate another function, then fall through.
    Call(Arc<Module>, usize),
    /// Terminate this activation successfully.
    Return,
}

/// An AS32 executor with its injected hostcall table.
///
/// A `Vm` holds no per-run state: `run` may be invoked repeatedly and from
/// several threads at once, each call chain getting its own activation
/// stack. The caller-relative operand mode reaches exactly one activation
/// up that stack.
pub struct Vm {
    hostcalls: HostcallTable,
    step_limit: Option<u64>,
}

impl Vm {
    pub fn new(hostcalls: HostcallTable) -> Vm {
        Vm {
            hostcalls,
            step_limit: None,
        }
    }

    /// Bound the total number of instructions a single `run` may execute,
    /// across the whole call chain.
    ///
    /// Without a limit an infinite jump loop runs forever; only a fault can
    /// stop a runaway program.
    pub fn with_step_limit(mut self, limit: u64) -> Vm {
        self.step_limit = Some(limit);
        self
    }

    /// Activate `module`'s entry function (function 0) with no caller,
    /// returning once the whole call chain has completed or faulted.
    pub fn run(&self, module: &Arc<Module>) -> Result<(), Error> {
        if module.text_len() == 0 {
            return Err(Error::NoEntryFunction);
        }
        tracing::debug!("running entry function of module {}", module.name());
        let mut frames = Vec::new();
        let mut steps = 0u64;
        let result = self.invoke(&mut frames, module.clone(), 0, &mut steps);
        if let Err(ref e) = result {
            tracing::debug!("module {} failed: {}", module.name(), e);
        }
        result
    }

    /// Run one activation of `module.text[index]` on top of `frames`.
    fn invoke(
        &self,
        frames: &mut Vec<Frame>,
        module: Arc<Module>,
        index: usize,
        steps: &mut u64,
    ) -> Result<(), Error> {
        let frame = match module.function(index) {
            Some(function) => Frame::enter(function, module.clone()),
            None => return Err(Error::fault(TrapCode::FuncNotFound, 0)),
        };
        frames.push(frame);
        let result = self.execute(frames, steps);
        frames.pop();
        result
    }

    fn execute(&self, frames: &mut Vec<Frame>, steps: &mut u64) -> Result<(), Error> {
        loop {
            let idx = frames.len() - 1;
            let pc = frames[idx].pc();

            if let Some(limit) = self.step_limit {
                if *steps >= limit {
                    return Err(Error::fault(TrapCode::StepLimitExceeded, pc));
                }
                *steps += 1;
            }

            let instr = Instruction::fetch(frames[idx].mem(), pc)
                .ok_or_else(|| Error::fault(TrapCode::TruncatedInstruction, pc))?;
            let opcode = Opcode::try_from_u16(instr.opcode)
                .ok_or_else(|| Error::fault(TrapCode::UnknownOpcode, pc))?;

            let flow = {
                let (callers, rest) = frames.split_at_mut(idx);
                self.step(&mut rest[0], callers.last_mut(), opcode, &instr)?
            };

            match flow {
                Flow::Advance => {
                    let next = pc.wrapping_add(4 + 4 * opcode.operand_words() as u32);
                    frames[idx].set_pc(next);
                }
                Flow::Jump(target) => frames[idx].set_pc(target),
                Flow::Call(callee, index) => {
                    self.invoke(frames, callee, index, steps)?;
                    let next = pc.wrapping_add(4 + 4 * opcode.operand_words() as u32);
                    frames[idx].set_pc(next);
                }
                Flow::Return => return Ok(()),
            }
        }
    }

    /// Execute one decoded instruction against the current frame.
    fn step(
        &self,
        frame: &mut Frame,
        mut caller: Option<&mut Frame>,
        opcode: Opcode,
        instr: &Instruction,
    ) -> Result<Flow, Error> {
        let [op1, op2] = instr.operands;
        match opcode {
            Opcode::Mov => {
                let m1 = mode1(frame, instr)?;
                let m2 = mode2(frame, instr)?;
                // destination resolves before the source is read
                let target = frame.resolve_write(m1, op1, caller.as_deref())?;
                let value = frame.read(m2, op2, caller.as_deref())?;
                frame.store(target, value, caller)?;
                Ok(Flow::Advance)
            }
            Opcode::MovSp => {
                // the single operand word is resolved through the second
                // mode tag
                let m2 = mode2(frame, instr)?;
                let value = frame.read(m2, op1, caller.as_deref())?;
                frame.set_sp(value as u32);
                Ok(Flow::Advance)
            }
            Opcode::Xchg => {
                let m1 = mode1(frame, instr)?;
                let m2 = mode2(frame, instr)?;
                // resolve both locations before touching either, so a bad
                // operand exchanges nothing
                let t1 = frame.resolve_write(m1, op1, caller.as_deref())?;
                let t2 = frame.resolve_write(m2, op2, caller.as_deref())?;
                let v1 = frame.load(t1, caller.as_deref())?;
                let v2 = frame.load(t2, caller.as_deref())?;
                frame.store(t1, v2, caller.as_deref_mut())?;
                frame.store(t2, v1, caller)?;
                Ok(Flow::Advance)
            }
            Opcode::Inc | Opcode::Dec | Opcode::Neg => {
                let m1 = mode1(frame, instr)?;
                let target = frame.resolve_write(m1, op1, caller.as_deref())?;
                let value = frame.load(target, caller.as_deref())?;
                let value = match opcode {
                    Opcode::Inc => value.wrapping_add(1),
                    Opcode::Dec => value.wrapping_sub(1),
                    _ => value.wrapping_neg(),
                };
                frame.store(target, value, caller)?;
                Ok(Flow::Advance)
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Cmp
            | Opcode::CmpG
            | Opcode::CmpGe => {
                let m1 = mode1(frame, instr)?;
                let m2 = mode2(frame, instr)?;
                let lhs = frame.read(m1, op1, caller.as_deref())?;
                let rhs = frame.read(m2, op2, caller.as_deref())?;
                // the implicit destination must be addressable even when the
                // op ends up writing nothing
                frame.stack_value()?;
                let result = match opcode {
                    Opcode::Add => Some(lhs.wrapping_add(rhs)),
                    Opcode::Sub => Some(lhs.wrapping_sub(rhs)),
                    Opcode::Mul => Some(lhs.wrapping_mul(rhs)),
                    Opcode::Div => {
                        if rhs == 0 {
                            return Err(frame.fault(TrapCode::IntegerDivByZero));
                        }
                        Some(lhs.wrapping_div(rhs))
                    }
                    Opcode::And => Some(lhs & rhs),
                    Opcode::Or => Some(lhs | rhs),
                    Opcode::Xor => Some(lhs ^ rhs),
                    Opcode::Shl => {
                        // positive amounts shift left, negative shift right,
                        // zero leaves the slot untouched
                        if rhs > 0 {
                            Some(lhs.wrapping_shl(rhs as u32))
                        } else if rhs < 0 {
                            Some(lhs.wrapping_shr(rhs.wrapping_neg() as u32))
                        } else {
                            None
                        }
                    }
                    Opcode::Cmp => Some((lhs == rhs) as i32),
                    Opcode::CmpG => Some((lhs > rhs) as i32),
                    _ => Some((lhs >= rhs) as i32),
                };
                if let Some(result) = result {
                    frame.set_stack_value(result)?;
                }
                Ok(Flow::Advance)
            }
            Opcode::Not => {
                let m1 = mode1(frame, instr)?;
                let value = frame.read(m1, op1, caller.as_deref())?;
                frame.set_stack_value(!value)?;
                Ok(Flow::Advance)
            }
            Opcode::Push => {
                let m1 = mode1(frame, instr)?;
                let value = frame.read(m1, op1, caller.as_deref())?;
                frame.set_stack_value(value)?;
                let sp = frame.sp().wrapping_add(4);
                frame.set_sp(sp);
                Ok(Flow::Advance)
            }
            Opcode::Pop => {
                if frame.sp() < 4 {
                    return Err(frame.fault(TrapCode::StackUnderflow));
                }
                let sp = frame.sp() - 4;
                frame.set_sp(sp);
                Ok(Flow::Advance)
            }
            Opcode::Jmp => {
                let m1 = mode1(frame, instr)?;
                let target = frame.read(m1, op1, caller.as_deref())?;
                Ok(Flow::Jump(target as u32))
            }
            Opcode::Jz | Opcode::Jnz => {
                let m1 = mode1(frame, instr)?;
                let target = frame.read(m1, op1, caller.as_deref())?;
                let top = frame.stack_value()?;
                let taken = if opcode == Opcode::Jz { top == 0 } else { top != 0 };
                if taken {
                    Ok(Flow::Jump(target as u32))
                } else {
                    Ok(Flow::Advance)
                }
            }
            Opcode::Call => {
                let m1 = mode1(frame, instr)?;
                let target = frame.read(m1, op1, caller.as_deref())?;
                let (callee, index) = self.resolve_call(frame, target)?;
                Ok(Flow::Call(callee, index))
            }
            Opcode::CallHost => {
                let m1 = mode1(frame, instr)?;
                let index = frame.read(m1, op1, caller.as_deref())?;
                // bounds are the table's entry count; negative indices are
                // rejected outright
                let entry = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.hostcalls.get(i))
                    .ok_or_else(|| frame.fault(TrapCode::HostcallNotFound))?;
                entry(frame)?;
                Ok(Flow::Advance)
            }
            Opcode::Ret => Ok(Flow::Return),
            Opcode::Nop => Ok(Flow::Advance),
            Opcode::Int => Err(frame.fault(TrapCode::Interrupt)),
            Opcode::Expand => Err(frame.fault(TrapCode::UnknownOpcode)),
        }
    }

    /// Resolve a call target: a negative value names import `-target - 1`
    /// of the active module, a non-negative value names a local function.
    /// The callee activation runs under the resolved module.
    fn resolve_call(&self, frame: &Frame, target: i32) -> Result<(Arc<Module>, usize), Error> {
        if target < 0 {
            let index = match usize::try_from(-i64::from(target) - 1) {
                Ok(index) => index,
                Err(_) => return Err(frame.fault(TrapCode::ImportNotFound)),
            };
            let import = frame
                .module()
                .import(index)
                .ok_or_else(|| frame.fault(TrapCode::ImportNotFound))?;
            let callee = import
                .module
                .ok_or_else(|| frame.fault(TrapCode::ImportUnbound))?;
            if import.func >= callee.text_len() {
                return Err(frame.fault(TrapCode::FuncNotFound));
            }
            Ok((callee, import.func))
        } else {
            let index = target as usize;
            if index >= frame.module().text_len() {
                return Err(frame.fault(TrapCode::FuncNotFound));
            }
            Ok((frame.module().clone(), index))
        }
    }
}

fn mode1(frame: &Frame, instr: &Instruction) -> Result<AddrMode, Error> {
    instr
        .mode1()
        .ok_or_else(|| frame.fault(TrapCode::BadAddressingMode))
}

fn mode2(frame: &Frame, instr: &Instruction) -> Result<AddrMode, Error> {
    instr
        .mode2()
        .ok_or_else(|| frame.fault(TrapCode::BadAddressingMode))
}
