//! Per-operation context: correlation id, deadline, cancellation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Travels with one apply (or one standalone report) and into every remote
/// call it makes.
///
/// The deadline bounds the sum of all calls made under this context; each
/// individual call is additionally bounded by the backoff policy's max
/// elapsed time.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub correlation_id: String,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl CallContext {
    /// No deadline, fresh correlation id, never cancelled.
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        let id = correlation_id.into();
        if !id.is_empty() {
            self.correlation_id = id;
        }
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
