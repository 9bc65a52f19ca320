// src/sink.rs

//! Shared, write-only output sinks.
//!
//! Every task and every watchdog writes into the same pair of sinks. A
//! [`Sink`] is a cheap-to-clone handle around a mutex-protected writer, so a
//! single `write_line` call is never torn by a concurrent writer. Ordering
//! *between* writers is whatever order they take the lock in.
//!
//! - [`Sink::stdout`] / [`Sink::stderr`] are what the binary uses.
//! - [`Sink::memory`] returns a sink plus a [`MemoryBuffer`] handle so tests
//!   (and embedding callers) can inspect what was written.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone)]
pub struct Sink {
    label: &'static str,
    writer: SharedWriter,
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Sink {
    /// Wrap an arbitrary writer.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self::labelled("custom", writer)
    }

    fn labelled<W: Write + Send + 'static>(label: &'static str, writer: W) -> Self {
        Self {
            label,
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::labelled("stdout", io::stdout())
    }

    pub fn stderr() -> Self {
        Self::labelled("stderr", io::stderr())
    }

    /// A sink that discards everything.
    pub fn null() -> Self {
        Self::labelled("null", io::sink())
    }

    /// In-memory sink plus a handle for reading back what was written.
    pub fn memory() -> (Self, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        (Self::labelled("memory", buffer.clone()), buffer)
    }

    /// Write one line (a trailing newline is appended) and flush.
    ///
    /// Sinks are best-effort: a failing writer is logged and otherwise
    /// ignored so that output problems never change task outcomes.
    pub fn write_line(&self, line: &str) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let res = writeln!(writer, "{line}").and_then(|()| writer.flush());
        if let Err(e) = res {
            warn!(sink = self.label, error = %e, "failed to write to sink");
        }
    }
}

/// Readable side of [`Sink::memory`].
#[derive(Clone, Default, Debug)]
pub struct MemoryBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Number of lines containing `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
