//! JSON lines on stdout.

use std::io::{self, Write};

use async_trait::async_trait;

use super::{Sink, SinkError};
use crate::event::EventRecord;

/// Writes each event as one JSON object per line.
///
/// Generic over the writer so output can be captured; the default is the
/// process stdout.
#[derive(Debug)]
pub struct StdoutSink<W: Write + Send = io::Stdout> {
    writer: W,
}

impl StdoutSink {
    /// Create a sink writing to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> StdoutSink<W> {
    /// Create a sink writing to an arbitrary writer.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// The underlying writer.
    #[must_use]
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

#[async_trait]
impl<W: Write + Send> Sink for StdoutSink<W> {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn log(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}
