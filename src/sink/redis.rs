//! Redis list sink.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use ::redis::{aio::ConnectionManager, AsyncCommands, RedisError};
use async_trait::async_trait;

use super::{Sink, SinkError};
use crate::event::EventRecord;

/// Time allowed for the initial connection and PING.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes each event as a JSON string onto a Redis list.
pub struct RedisSink {
    host: String,
    port: u16,
    key: String,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSink")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("key", &self.key)
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisSink {
    /// Connect to `host:port` (database 0) and verify the server answers PING.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached in time.
    pub async fn connect(host: &str, port: u16, key: &str) -> Result<Self, SinkError> {
        let url = redis_url(host, port);
        tracing::info!(url = %url, key = %key, "Connecting to Redis");

        let client = ::redis::Client::open(url.as_str())?;
        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| SinkError::Io(timed_out(&url)))??;

        tokio::time::timeout(
            CONNECT_TIMEOUT,
            ::redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| SinkError::Io(timed_out(&url)))??;

        Ok(Self {
            host: host.to_string(),
            port,
            key: key.to_string(),
            conn,
        })
    }

    /// The list key events are pushed onto.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn push(&self, payload: &str) -> impl Future<Output = Result<(), RedisError>> {
        let mut conn = self.conn.clone();
        let key = self.key.clone();
        let payload = payload.to_string();
        async move { conn.rpush::<_, _, ()>(key, payload).await }
    }
}

#[async_trait]
impl Sink for RedisSink {
    fn name(&self) -> &str {
        "redis"
    }

    async fn log(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_string(record)?;
        let server = format!("{}:{}", self.host, self.port);
        retry_once(&server, || self.push(&payload)).await?;
        Ok(())
    }
}

/// Run `op`, running it a second time if the first attempt lost the
/// connection. The connection manager reconnects in between.
async fn retry_once<F, Fut>(server: &str, mut op: F) -> Result<(), RedisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), RedisError>>,
{
    match op().await {
        Ok(()) => Ok(()),
        Err(e) if is_connection_error(&e) => {
            tracing::warn!(server = %server, error = %e, "Redis push failed, retrying after reconnect");
            op().await?;
            tracing::info!(server = %server, "Redis: reconnected to server");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn redis_url(host: &str, port: u16) -> String {
    format!("redis://{host}:{port}/0")
}

fn timed_out(url: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("timed out connecting to {url}"),
    )
}

fn is_connection_error(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url() {
        assert_eq!(redis_url("logs.internal", 6380), "redis://logs.internal:6380/0");
    }

    #[test]
    fn test_timed_out_error() {
        let err = timed_out("redis://localhost:6379/0");
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert!(err.to_string().contains("redis://localhost:6379/0"));
    }

    fn connection_reset() -> RedisError {
        RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ))
    }

    #[tokio::test]
    async fn test_push_retried_once_after_connection_loss() {
        let mut attempts = 0;
        let result = retry_once("localhost:6379", || {
            attempts += 1;
            let outcome = if attempts == 1 {
                Err(connection_reset())
            } else {
                Ok(())
            };
            async move { outcome }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_second_connection_loss_is_reported() {
        let mut attempts = 0;
        let result = retry_once("localhost:6379", || {
            attempts += 1;
            async { Err(connection_reset()) }
        })
        .await;

        assert!(result.unwrap_err().is_io_error());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_successful_push_is_not_retried() {
        let mut attempts = 0;
        let result = retry_once("localhost:6379", || {
            attempts += 1;
            async { Ok(()) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let result = RedisSink::connect("127.0.0.1", 1, "logs").await;
        assert!(result.is_err());
    }
}
