//! Output sinks.
//!
//! Every completed event is handed to each configured sink through the
//! [`Sink`] trait. [`OutputSink`] is the closed set of sinks a configuration
//! can name.

mod redis;
mod stdout;

use async_trait::async_trait;

use crate::config::OutputConfig;
use crate::event::EventRecord;

pub use self::redis::RedisSink;
pub use self::stdout::StdoutSink;

/// Errors raised while delivering an event.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// The record could not be serialized.
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing the record failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis command or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Destination for completed events.
#[async_trait]
pub trait Sink: Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be delivered; the caller
    /// logs it and moves on.
    async fn log(&mut self, record: &EventRecord) -> Result<(), SinkError>;
}

/// A sink built from configuration.
#[derive(Debug)]
pub enum OutputSink {
    /// JSON lines on stdout.
    Stdout(StdoutSink),
    /// `RPUSH` onto a Redis list.
    Redis(RedisSink),
}

impl OutputSink {
    /// Build the sink an output entry describes.
    ///
    /// # Errors
    ///
    /// Returns an error if a Redis server cannot be reached.
    pub async fn from_config(config: &OutputConfig) -> Result<Self, SinkError> {
        match config {
            OutputConfig::Stdout => Ok(Self::Stdout(StdoutSink::new())),
            OutputConfig::Redis { host, port, key } => {
                Ok(Self::Redis(RedisSink::connect(host, *port, key).await?))
            }
        }
    }
}

#[async_trait]
impl Sink for OutputSink {
    fn name(&self) -> &str {
        match self {
            Self::Stdout(sink) => sink.name(),
            Self::Redis(sink) => sink.name(),
        }
    }

    async fn log(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        match self {
            Self::Stdout(sink) => sink.log(record).await,
            Self::Redis(sink) => sink.log(record).await,
        }
    }
}

/// Build every configured sink, skipping the ones that fail.
///
/// Failures are logged; the caller decides whether an empty result is fatal.
pub async fn build_sinks(outputs: &[OutputConfig]) -> Vec<OutputSink> {
    let mut sinks = Vec::with_capacity(outputs.len());
    for output in outputs {
        match OutputSink::from_config(output).await {
            Ok(sink) => {
                tracing::info!(sink = sink.name(), "Output ready");
                sinks.push(sink);
            }
            Err(e) => {
                tracing::error!(output = ?output, error = %e, "Skipping unusable output");
            }
        }
    }
    sinks
}
