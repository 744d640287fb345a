use std::fmt;

use anyhow::Error as AnyError;
use thiserror::Error;

/// AS32 runtime errors.
///
/// Failures are never recovered at any level: a callee's failure immediately
/// fails its caller, up to the top-level `run`. The variants and
/// [`FaultDetails`] exist for diagnostics only; externally every failure is
/// the same kind of unwound activation.
#[derive(Debug, Error)]
pub enum Error {
    /// An activation faulted.
    #[error("Runtime fault: {0}")]
    RuntimeFault(FaultDetails),

    /// `run` was invoked on a module with no functions.
    #[error("Module has no entry function")]
    NoEntryFunction,

    /// A module construction or linking error.
    #[error("Module error: {0}")]
    ModuleError(#[from] as32_module::Error),

    /// A catch-all for embedder-defined hostcall failures.
    #[error("Internal error: {0}")]
    InternalError(#[source] AnyError),
}

impl Error {
    pub(crate) fn fault(trapcode: TrapCode, pc: u32) -> Error {
        Error::RuntimeFault(FaultDetails { trapcode, pc })
    }
}

/// The type of an execution fault.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrapCode {
    /// An operand resolved to an offset outside its target buffer.
    OutOfBounds,
    /// POP with the stack cursor already below one word.
    StackUnderflow,
    /// A write through a mode that only yields values (Immediate, Stack).
    NotWritable,
    /// An addressing-mode tag that does not decode.
    BadAddressingMode,
    /// Caller-relative addressing in an activation with no caller.
    NoCallerFrame,
    /// Fewer than a full fetch window of bytes left at the program counter.
    TruncatedInstruction,
    IntegerDivByZero,
    UnknownOpcode,
    /// The INT opcode.
    Interrupt,
    /// A local call target outside the module's function list.
    FuncNotFound,
    /// An import index outside the module's import table.
    ImportNotFound,
    /// A call through an import whose dependency was never bound.
    ImportUnbound,
    /// A native-call index outside the hostcall table.
    HostcallNotFound,
    /// The configured step limit was exhausted.
    StepLimitExceeded,
}

/// Details about an execution fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaultDetails {
    /// Information about the type of fault that occurred.
    pub trapcode: TrapCode,
    /// The program counter of the faulting instruction.
    pub pc: u32,
}

impl fmt::Display for FaultDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {:?} at pc {:#010x}", self.trapcode, self.pc)
    }
}
