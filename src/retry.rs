//! Bounded exponential backoff with jitter, plus transient-error classification.

use std::error::Error as StdError;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::generator::GeneratorError;

/// Message fragments that mark an error as worth retrying.
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "throttl",
    "rate limit",
    "rate-limit",
    "service unavailable",
    "internal server error",
    "temporar",
];

/// HTTP 5xx codes matched as whole tokens in error messages.
const TRANSIENT_STATUS_CODES: &[&str] = &["500", "502", "503", "504"];

/// Retry configuration for a single unit of work.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first call; total calls = `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_base: f64,
    /// Perturb each delay by up to ±25%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps; handy for tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_base: 1.0,
            jitter: false,
        }
    }

    /// Un-jittered delay for a 0-indexed attempt:
    /// `min(base_delay * backoff_base^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_nanos() as f64 * self.backoff_base.powi(exp);
        let capped = delay.min(self.max_delay.as_nanos() as f64);
        if capped.is_finite() && capped > 0.0 {
            Duration::from_nanos(capped as u64)
        } else {
            Duration::ZERO
        }
    }

    fn sleep_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let nanos = delay.as_nanos() as f64;
        let spread = nanos * 0.25;
        let jittered = nanos + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_nanos(jittered.max(0.0) as u64)
    }

    /// Runs `operation` until it succeeds or every attempt is spent,
    /// returning the last error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_while(label, operation, |_| true).await
    }

    /// Like [`run`](Self::run), but a non-transient error is returned
    /// immediately instead of being retried.
    pub async fn run_transient<T, E, F, Fut>(&self, label: &str, operation: F) -> Result<T, E>
    where
        E: StdError + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_while(label, operation, |e: &E| is_transient(e)).await
    }

    async fn run_while<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt == self.max_retries {
                        error!(
                            operation = label,
                            attempts = attempt + 1,
                            error = %e,
                            "operation failed after {} retries",
                            self.max_retries
                        );
                        return Err(e);
                    }
                    if !should_retry(&e) {
                        warn!(operation = label, error = %e, "non-transient error, not retrying");
                        return Err(e);
                    }

                    let delay = self.sleep_for_attempt(attempt);
                    warn!(
                        operation = label,
                        error = %e,
                        "attempt {}/{} failed, retrying in {:?}",
                        attempt + 1,
                        self.max_retries + 1,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Classifies an error (and its source chain) as transient.
///
/// Typed categories are checked first: I/O timeouts, resets, broken pipes
/// and truncated reads, plus retryable generator failures. Otherwise the
/// rendered message is matched against a fixed list of patterns.
pub fn is_transient(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if is_transient_io_kind(io_err.kind()) {
                return true;
            }
        }
        if let Some(gen_err) = err.downcast_ref::<GeneratorError>() {
            if gen_err.is_transient() {
                return true;
            }
        }
        if message_is_transient(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

fn is_transient_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

fn message_is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| TRANSIENT_STATUS_CODES.contains(&token))
}
