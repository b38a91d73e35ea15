//! tracing integration for the rotating writer
//!
//! Formatted records go to the rotating log file. When the file cannot be
//! written, records are sent to stderr instead so nothing is silently lost.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;

use crate::config::friendly_io_error_message;
use crate::rotate::RotatingWriter;

/// A writer that appends to the rotating file and falls back to stderr
pub struct FallbackWriter {
    writer: Arc<RotatingWriter>,
    failing: Arc<AtomicBool>,
}

impl Write for FallbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.write_record(buf) {
            Ok(n) => {
                if self.failing.swap(false, Ordering::Relaxed) {
                    eprintln!(
                        "rotalog: writing to {} again",
                        self.writer.path().display()
                    );
                }
                Ok(n)
            }
            Err(e) => {
                let e = io::Error::from(e);
                if !self.failing.swap(true, Ordering::Relaxed) {
                    eprintln!(
                        "rotalog: {}; logging to stderr",
                        friendly_io_error_message(&e, "Failed to write log file")
                    );
                }
                io::stderr().write_all(buf)?;
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.writer).flush()
    }
}

/// Writer factory for tracing-subscriber
#[derive(Clone)]
pub struct RotatingMakeWriter {
    writer: Arc<RotatingWriter>,
    failing: Arc<AtomicBool>,
}

impl RotatingMakeWriter {
    /// Wrap a shared rotating writer
    pub fn new(writer: Arc<RotatingWriter>) -> Self {
        Self {
            writer,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the last write went to stderr instead of the file
    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::Relaxed)
    }
}

impl<'a> MakeWriter<'a> for RotatingMakeWriter {
    type Writer = FallbackWriter;

    fn make_writer(&'a self) -> Self::Writer {
        FallbackWriter {
            writer: Arc::clone(&self.writer),
            failing: Arc::clone(&self.failing),
        }
    }
}
