//! `as32-runtime` is a library for linking and executing AS32 modules:
//! named units of code and data whose functions run against flat
//! byte-addressable buffers under a small fetch-decode-execute loop, with
//! cross-module calls, caller-frame addressing, and host-provided native
//! functions.
//!
//! Modules are built with [`as32_module`]; a [`Vm`] carries the injected
//! [`HostcallTable`] and activates a module's entry function:
//!
//! ```no_run
//! use as32_module::{Function, Module, ModuleName};
//! use as32_runtime::{HostcallTable, Vm};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let (assembly, entry_offset) = (vec![0xC3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 0);
//! let module = Module::builder(ModuleName::new("main")?)
//!     .with_function(Function::new(assembly, entry_offset))
//!     .build();
//! let vm = Vm::new(HostcallTable::stdio());
//! vm.run(&module)?;
//! # Ok(())
//! # }
//! ```

#![deny(bare_trait_objects)]

pub mod error;
pub mod frame;
pub mod hostcall;
pub mod vm;

pub use crate::error::{Error, FaultDetails, TrapCode};
pub use crate::frame::Frame;
pub use crate::hostcall::{Hostcall, HostcallTable};
pub use crate::vm::Vm;
