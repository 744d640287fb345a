#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use as32_runtime::HostcallTable;

/// An `io::Write` handle a test can keep after handing the hostcall table
/// to a `Vm`.
#[derive(Clone)]
pub struct Sink(Arc<Mutex<Vec<u8>>>);

impl Sink {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The reference hostcall table over a captured buffer.
pub fn capture_table() -> (HostcallTable, Sink) {
    let sink = Sink(Arc::new(Mutex::new(Vec::new())));
    (HostcallTable::with_output(sink.clone()), sink)
}

/// Pad a stream so its last instruction still has a full fetch window.
pub fn pad_window(assembly: &mut Vec<u8>) {
    assembly.extend_from_slice(&[0; 8]);
}
