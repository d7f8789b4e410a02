//! Transient-failure classification and retry with capped exponential
//! backoff.

mod classify;
mod data_store;

pub use classify::{is_transient, is_transient_sqlx, ErrorClass, Transience};
pub use data_store::RetryingDataStore;

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::warn;

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5_000);

/// Extra delay added on top of each backoff step, as a fraction of the step.
const JITTER_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// No retries at all; every error surfaces after one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `min(base * 2^attempt, max)` without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// The delays slept between attempts, jitter included.
    fn delays(&self) -> impl Iterator<Item = Duration> {
        let config = *self;
        (0..config.max_retries as u32).map(move |attempt| with_jitter(config.backoff(attempt)))
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let max_extra = delay.mul_f64(JITTER_RATIO);
    if max_extra.is_zero() {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(Duration::ZERO..=max_extra);
    delay + extra
}

/// An error together with how it was classified.
#[derive(Debug)]
pub struct ClassifiedError<E> {
    pub class: ErrorClass,
    pub error: E,
}

impl<E: Transience> ClassifiedError<E> {
    pub fn new(error: E) -> Self {
        Self {
            class: ErrorClass::of(&error),
            error,
        }
    }
}

impl<E> ClassifiedError<E> {
    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ClassifiedError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.class)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ClassifiedError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Run `operation`, retrying transient failures.
///
/// Permanent errors return after the first attempt. When retries run out the
/// last error is returned unchanged, tagged with its class.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, ClassifiedError<E>>
where
    E: Transience + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0usize;
    let max_retries = config.max_retries;

    RetryIf::start(
        config.delays(),
        || operation(),
        |error: &E| {
            attempt += 1;
            let transient = error.is_transient();
            if transient && attempt <= max_retries {
                warn!(attempt, max_retries, error = %error, "Transient failure, retrying");
            }
            transient
        },
    )
    .await
    .map_err(ClassifiedError::new)
}
