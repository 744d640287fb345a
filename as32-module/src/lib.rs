//! Common types for representing AS32 modules.
//!
//! A module bundles a data segment, an ordered list of [`Function`]s, and the
//! dependency/import tables the linker binds at run time. There is no on-disk
//! module format; a host loader builds modules programmatically with
//! [`ModuleBuilder`] and the instruction producers in [`bytecode`], then hands
//! them to `as32-runtime` for execution.

#![deny(bare_trait_objects)]

pub mod bytecode;
mod error;
mod function;
mod module;
mod name;

pub use crate::bytecode::{
    encode_op0, encode_op1, encode_op2, AddrMode, Instruction, Opcode, FETCH_WINDOW,
};
pub use crate::error::Error;
pub use crate::function::Function;
pub use crate::module::{Dependency, Import, Module, ModuleBuilder};
pub use crate::name::{ModuleName, MODULE_NAME_LEN};
