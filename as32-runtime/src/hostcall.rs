//! Host-provided native functions reachable from bytecode.
//!
//! An entry receives the calling frame and marshals its own arguments
//! through the frame's addressing methods, the same resolver guest code
//! goes through. The table is injected into a [`Vm`](crate::vm::Vm) at
//! construction; there is no process-wide registry, so independent VMs can
//! carry different tables and tests can substitute doubles.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::frame::Frame;

/// A host-implemented function reachable by index from bytecode.
///
/// The whole contract: take the calling frame, return success or failure.
/// A failure faults the calling activation and unwinds the chain.
pub type Hostcall = Box<dyn Fn(&mut Frame) -> Result<(), Error> + Send + Sync>;

/// An ordered table of hostcalls, fixed once execution starts.
#[derive(Default)]
pub struct HostcallTable {
    entries: Vec<Hostcall>,
}

impl HostcallTable {
    pub fn new() -> HostcallTable {
        HostcallTable { entries: vec![] }
    }

    /// Append an entry, returning the index bytecode uses to reach it.
    pub fn register<F>(&mut self, entry: F) -> usize
    where
        F: Fn(&mut Frame) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.entries.push(Box::new(entry));
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Hostcall> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The two reference entries, printing to standard output.
    ///
    /// Index 0 reads the stack slot as a frame offset and emits the
    /// NUL-terminated bytes found there; index 1 reads the stack slot and
    /// emits its decimal form.
    pub fn stdio() -> HostcallTable {
        Self::with_output(io::stdout())
    }

    /// The reference entries retargeted at `writer`. Both entries share the
    /// sink, so a test can hand in a buffer and inspect the combined output.
    pub fn with_output<W: Write + Send + 'static>(writer: W) -> HostcallTable {
        let writer = Arc::new(Mutex::new(writer));
        let mut table = HostcallTable::new();
        let sink = writer.clone();
        table.register(move |frame| {
            let offset = frame.stack_value()?;
            let bytes = frame.cstr(offset as u32)?;
            sink.lock()
                .unwrap()
                .write_all(bytes)
                .map_err(|e| Error::InternalError(e.into()))
        });
        table.register(move |frame| {
            let value = frame.stack_value()?;
            write!(writer.lock().unwrap(), "{}", value)
                .map_err(|e| Error::InternalError(e.into()))
        });
        table
    }
}
