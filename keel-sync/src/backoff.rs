//! Bounded exponential backoff around remote calls.
//!
//! [`retry`] re-invokes an operation until it succeeds, the classifier calls
//! its error terminal, the per-call budget (`max_elapsed_time`) or the
//! caller's deadline runs out, or the caller cancels.
//!
//! Sleep between attempts: `interval × (1 ± randomization_factor)`, where
//! `interval` starts at `initial_interval` and grows by `multiplier` up to
//! `max_interval`.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use keel_core::CommonSettings;

use crate::context::CallContext;
use crate::error::TransferError;

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retryable,
    Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
}

impl From<&CommonSettings> for BackoffPolicy {
    fn from(common: &CommonSettings) -> Self {
        Self {
            initial_interval: common.initial_interval,
            max_interval: common.max_interval,
            max_elapsed_time: common.max_elapsed_time,
            multiplier: common.multiplier,
            randomization_factor: common.randomization_factor,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&CommonSettings::default())
    }
}

impl BackoffPolicy {
    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max_interval)
    }

    fn randomize(&self, interval: Duration) -> Duration {
        let factor = self.randomization_factor.clamp(0.0, 1.0);
        if factor == 0.0 || interval.is_zero() {
            return interval;
        }
        let secs = interval.as_secs_f64();
        let low = secs * (1.0 - factor);
        let high = secs * (1.0 + factor);
        Duration::from_secs_f64(low + fastrand::f64() * (high - low))
    }
}

/// Run `attempt` under `policy`, classifying each failure with `classify`.
///
/// Each attempt is itself bounded by the effective deadline so a hung call
/// cannot outlive the budget. The effective deadline is the earlier of
/// `start + max_elapsed_time` and `ctx.deadline`; running out of the former
/// yields [`TransferError::RetryExhausted`], of the latter
/// [`TransferError::Timeout`].
pub async fn retry<T, F, Fut, C>(
    operation: &'static str,
    policy: &BackoffPolicy,
    ctx: &CallContext,
    classify: C,
    mut attempt: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, tonic::Status>>,
    C: Fn(&tonic::Status) -> Disposition,
{
    let budget_end = Instant::now() + policy.max_elapsed_time;
    let (deadline, caller_bound) = match ctx.deadline {
        Some(caller) if caller <= budget_end => (caller, true),
        _ => (budget_end, false),
    };

    let mut interval = policy.initial_interval;
    let mut attempts: u32 = 0;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(TransferError::Cancelled { operation });
        }
        if Instant::now() >= deadline {
            return Err(expired(operation, attempts, None, caller_bound));
        }

        attempts = attempts.saturating_add(1);
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TransferError::Cancelled { operation }),
            _ = tokio::time::sleep_until(deadline) => Err(tonic::Status::deadline_exceeded(
                format!("{operation} attempt exceeded its deadline"),
            )),
            result = attempt() => result,
        };

        let status = match result {
            Ok(value) => return Ok(value),
            Err(status) => status,
        };

        if classify(&status) == Disposition::Terminal {
            tracing::error!("{operation} rejected: {status}");
            return Err(TransferError::Rejected { operation, status });
        }

        let delay = policy.randomize(interval);
        if Instant::now() + delay >= deadline {
            tracing::error!("{operation} giving up after {attempts} attempt(s): {status}");
            return Err(expired(operation, attempts, Some(status), caller_bound));
        }

        tracing::warn!(
            "{operation} attempt {attempts} failed, retrying in {}ms: {status}",
            delay.as_millis()
        );
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TransferError::Cancelled { operation }),
            _ = tokio::time::sleep(delay) => {}
        }
        interval = policy.next_interval(interval);
    }
}

fn expired(
    operation: &'static str,
    attempts: u32,
    last: Option<tonic::Status>,
    caller_bound: bool,
) -> TransferError {
    if caller_bound {
        return TransferError::Timeout { operation };
    }
    TransferError::RetryExhausted {
        operation,
        attempts,
        last: last.unwrap_or_else(|| {
            tonic::Status::deadline_exceeded(format!("{operation} retry budget exhausted"))
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn policy(max_elapsed: Duration) -> BackoffPolicy {
        BackoffPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            max_elapsed_time: max_elapsed,
            multiplier: 2.0,
            randomization_factor: 0.0,
        }
    }

    fn always_retry(_: &tonic::Status) -> Disposition {
        Disposition::Retryable
    }

    #[test]
    fn interval_grows_and_caps() {
        let p = policy(Duration::from_secs(10));
        let mut interval = p.initial_interval;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(interval);
            interval = p.next_interval(interval);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(400),
                Duration::from_millis(400),
            ]
        );
    }

    #[test]
    fn randomized_interval_stays_within_factor() {
        let mut p = policy(Duration::from_secs(10));
        p.randomization_factor = 0.5;
        for _ in 0..200 {
            let d = p.randomize(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let ctx = CallContext::new();

        let value = retry("GetFile", &policy(Duration::from_secs(10)), &ctx, always_retry, || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(tonic::Status::unavailable("connection refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .expect("eventually succeeds");

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_exhausts_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let ctx = CallContext::new();
        let started = Instant::now();

        let err = retry::<(), _, _, _>(
            "UpdateOverview",
            &policy(Duration::from_secs(2)),
            &ctx,
            always_retry,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(tonic::Status::unavailable("down")) }
            },
        )
        .await
        .unwrap_err();

        match err {
            TransferError::RetryExhausted { attempts, .. } => {
                assert!(attempts > 1, "expected retries, got {attempts}");
                assert_eq!(attempts, calls.load(Ordering::SeqCst));
            }
            other => panic!("expected retry exhausted, got {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let ctx = CallContext::new();

        let err = retry::<(), _, _, _>(
            "UpdateFile",
            &policy(Duration::from_secs(10)),
            &ctx,
            |_| Disposition::Terminal,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(tonic::Status::invalid_argument("bad request")) }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Rejected { .. }), "got: {err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_is_bounded_by_budget() {
        let ctx = CallContext::new();
        let err = retry::<(), _, _, _>(
            "GetFile",
            &policy(Duration::from_secs(1)),
            &ctx,
            always_retry,
            || std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::RetryExhausted { .. }), "got: {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_wins_over_budget() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(250));
        let err = retry::<(), _, _, _>(
            "GetFile",
            &policy(Duration::from_secs(30)),
            &ctx,
            always_retry,
            || async { Err(tonic::Status::unavailable("down")) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Timeout { .. }), "got: {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let token = CancellationToken::new();
        let ctx = CallContext::new().with_cancel(token.clone());
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let err = retry::<(), _, _, _>(
            "GetFile",
            &policy(Duration::from_secs(30)),
            &ctx,
            always_retry,
            || async { Err(tonic::Status::unavailable("down")) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Cancelled { .. }), "got: {err:?}");
    }
}
