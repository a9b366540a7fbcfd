//! Outbound integration ports
//!
//! The session layer calls out of the server at two points: publish
//! authorization before a stream is accepted, and transcoder lifecycle
//! around a stream's media flow. Both are traits so deployments plug in
//! HTTP backends, static policies, or test doubles without the protocol
//! code knowing.

use std::future::Future;
use std::time::Duration;

use crate::error::PortError;

/// Decides whether a publish attempt may go ahead
///
/// Implementations are called once per publish with the connect-time
/// application name and the publishing key. Errors are retried a fixed
/// number of times and then treated as a denial.
pub trait AuthorizationPort: Send + Sync + 'static {
    /// Check whether `stream_key` may publish under `app`
    fn authorize(
        &self,
        app: &str,
        stream_key: &str,
    ) -> impl Future<Output = Result<bool, PortError>> + Send;
}

/// Transcoder lifecycle notifications
pub trait TranscodePort: Send + Sync + 'static {
    /// Media has started flowing on a stream
    fn start(&self, job: &TranscodeJob) -> impl Future<Output = Result<(), PortError>> + Send;

    /// The stream has ended
    fn stop(&self, job: &TranscodeJob) -> impl Future<Output = Result<(), PortError>> + Send;
}

/// Identifies a stream to the transcoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    /// Application name the stream is published under
    pub app: String,
    /// Secret from the publish command
    pub stream_key: String,
}

impl TranscodeJob {
    /// Build a job for a published stream
    pub fn new(app: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            stream_key: stream_key.into(),
        }
    }
}

/// Authorization policy that admits every stream
///
/// The default when no backend is wired up, and handy in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationPort for AllowAll {
    async fn authorize(&self, _app: &str, _stream_key: &str) -> Result<bool, PortError> {
        Ok(true)
    }
}

/// Transcode port that ignores all notifications
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranscode;

impl TranscodePort for NoTranscode {
    async fn start(&self, _job: &TranscodeJob) -> Result<(), PortError> {
        Ok(())
    }

    async fn stop(&self, _job: &TranscodeJob) -> Result<(), PortError> {
        Ok(())
    }
}

/// Retry an async operation a fixed number of times with a fixed delay
///
/// Returns the first success, or the last error once attempts are
/// exhausted. The delay is applied between attempts, not after the last.
pub async fn retry_fixed<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut operation: F,
) -> Result<T, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
{
    let mut last_error = PortError::new("no attempts made");
    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(attempt = attempt, error = %e, "Port call failed");
                last_error = e;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_error)
}
