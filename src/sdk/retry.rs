//! Retry logic with exponential backoff and fixed delay schedules.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DataverseConfig;
use crate::error::Error;

/// Parameters for exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffParams {
    /// Initial delay in milliseconds
    pub initial_ms: u64,
    /// Multiplier for each retry
    pub mult: f64,
    /// Maximum delay in milliseconds
    pub max_ms: u64,
    /// Maximum number of tries (None = unlimited)
    pub max_tries: Option<u32>,
    /// Maximum total time in milliseconds (None = unlimited)
    pub max_total_ms: Option<u64>,
}

impl Default for BackoffParams {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            mult: 2.0,
            max_ms: 30_000,
            max_tries: Some(4),
            max_total_ms: None,
        }
    }
}

impl BackoffParams {
    /// Derive backoff from client configuration.
    pub fn from_config(config: &DataverseConfig) -> Self {
        Self {
            initial_ms: config.http_backoff_ms,
            max_tries: Some(config.http_retries.saturating_add(1)),
            ..Self::default()
        }
    }
}

/// Retry a function with exponential backoff.
///
/// # Arguments
///
/// * `f` - The async function to retry
/// * `can_retry` - Function to check if an error is retriable
/// * `params` - Backoff parameters
///
/// # Returns
///
/// The result of the function, or the last error if all retries failed.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    mut f: F,
    can_retry: R,
    params: &BackoffParams,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Debug,
{
    let start_time = std::time::Instant::now();
    let mut backoff_ms = 0u64;
    let mut tries = 0u32;

    loop {
        match f().await {
            Ok(result) => {
                if tries > 0 {
                    debug!("Operation succeeded after {} transient failures", tries);
                }
                return Ok(result);
            }
            Err(e) => {
                tries += 1;

                if let Some(max) = params.max_tries {
                    if tries >= max {
                        return Err(e);
                    }
                }

                if !can_retry(&e) {
                    return Err(e);
                }

                backoff_ms = if backoff_ms == 0 {
                    params.initial_ms
                } else {
                    ((backoff_ms as f64) * params.mult).min(params.max_ms as f64) as u64
                };

                if let Some(max_total) = params.max_total_ms {
                    let elapsed = start_time.elapsed().as_millis() as u64;
                    if elapsed + backoff_ms > max_total {
                        return Err(e);
                    }
                }

                debug!(
                    "Operation failed with error {:?}, retrying in {} ms; retries = {}",
                    e, backoff_ms, tries
                );

                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }
}

/// Retry with the default retriable error check.
pub async fn retry_api<F, Fut, T>(f: F, params: &BackoffParams) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    retry_with_backoff(f, |e: &Error| e.is_retriable(), params).await
}

/// Run `f` on a fixed delay schedule.
///
/// One attempt is made per entry in `delays`; a non-zero delay is slept
/// before its attempt. Errors rejected by `should_retry` are returned
/// immediately, otherwise the last error is returned once the schedule runs
/// out.
pub async fn retry_with_delays<F, Fut, T, E, R>(
    delays: &[Duration],
    mut f: F,
    should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut last_err = None;

    for delay in delays {
        if !delay.is_zero() {
            sleep(*delay).await;
        }
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!("Request failed: {}", e);
                let retry = should_retry(&e);
                last_err = Some(e);
                if !retry {
                    break;
                }
            }
        }
    }

    match last_err {
        Some(e) => Err(e),
        // Empty schedule: make a single attempt.
        None => f().await,
    }
}

/// Convert whole seconds into a delay schedule.
pub fn delays_from_secs(secs: &[u64]) -> Vec<Duration> {
    secs.iter().map(|s| Duration::from_secs(*s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> BackoffParams {
        BackoffParams {
            initial_ms: 1,
            max_ms: 2,
            ..BackoffParams::default()
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_api(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::api(503, "Service Unavailable", ""))
                } else {
                    Ok(7)
                }
            },
            &fast(),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let calls = AtomicU32::new(0);
        let result: crate::Result<()> = retry_api(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::api(400, "Bad Request", ""))
            },
            &fast(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_at_max_tries() {
        let calls = AtomicU32::new(0);
        let params = BackoffParams {
            max_tries: Some(3),
            ..fast()
        };
        let result: crate::Result<()> = retry_api(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::api(500, "Internal Server Error", ""))
            },
            &params,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_from_config() {
        let config = DataverseConfig {
            http_retries: 2,
            http_backoff_ms: 250,
            ..DataverseConfig::default()
        };
        let params = BackoffParams::from_config(&config);
        assert_eq!(params.max_tries, Some(3));
        assert_eq!(params.initial_ms, 250);
    }

    #[tokio::test]
    async fn test_delays_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let delays = vec![Duration::ZERO; 3];
        let result: Result<(), String> = retry_with_delays(
            &delays,
            || async { Err(format!("attempt {}", calls.fetch_add(1, Ordering::SeqCst))) },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "attempt 2");
    }

    #[tokio::test]
    async fn test_delays_stop_on_rejected_error() {
        let calls = AtomicU32::new(0);
        let delays = vec![Duration::ZERO; 5];
        let result: Result<(), String> = retry_with_delays(
            &delays,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            },
            |e| e != "fatal",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delays_from_secs() {
        assert_eq!(
            delays_from_secs(&[0, 2]),
            vec![Duration::ZERO, Duration::from_secs(2)]
        );
    }
}
