// ABOUTME: Utility functions for credentials, retries and log-safe output
// ABOUTME: Provides environment lookup, retry logic and conninfo masking

use anyhow::{bail, Result};
use std::time::Duration;

/// Environment variable holding the database password
pub const PASSWORD_ENV: &str = "PG_PASSWORD";

/// Read a required environment variable
///
/// # Errors
///
/// Returns an error naming the variable if it is unset or blank.
///
/// # Examples
///
/// ```
/// # use pg_replica_orchestrator::utils::required_env;
/// assert!(required_env("PG_REPLICA_ORCHESTRATOR_SURELY_UNSET").is_err());
/// ```
pub fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{} is not set (export it or put it in .env)", key),
    }
}

/// Retry a function with exponential backoff
///
/// Executes an async operation with automatic retry on failure. Each retry doubles
/// the delay (exponential backoff) to handle transient failures gracefully.
///
/// # Arguments
///
/// * `operation` - Async function to retry (FnMut returning Future\<Output = Result\<T\>\>)
/// * `max_retries` - Maximum number of retry attempts (0 = no retries, just initial attempt)
/// * `initial_delay` - Delay before first retry (doubles each subsequent retry)
///
/// # Returns
///
/// Returns the successful result or the last error after all retries exhausted.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use std::time::Duration;
/// # use pg_replica_orchestrator::utils::retry_with_backoff;
/// # async fn example() -> Result<()> {
/// let result = retry_with_backoff(
///     || async { Ok("success") },
///     3,  // Try up to 3 times
///     Duration::from_secs(1)  // Start with 1s delay
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);

                if attempt < max_retries {
                    tracing::warn!(
                        "Operation failed (attempt {}/{}), retrying in {:?}...",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Operation failed after retries")))
}

/// Hide the password in a libpq key/value conninfo string for display
///
/// # Examples
///
/// ```
/// # use pg_replica_orchestrator::utils::mask_conninfo;
/// assert_eq!(
///     mask_conninfo("host=pg-primary user=postgres password=secret"),
///     "host=pg-primary user=postgres password=***"
/// );
/// ```
pub fn mask_conninfo(conninfo: &str) -> String {
    // Only a key at the start of the string or after whitespace counts.
    let Some(start) = conninfo
        .match_indices("password=")
        .map(|(i, _)| i)
        .find(|&i| i == 0 || conninfo[..i].ends_with(char::is_whitespace))
    else {
        return conninfo.to_string();
    };
    let value_start = start + "password=".len();
    let rest = &conninfo[value_start..];

    // Quoted values may contain spaces and escaped quotes.
    let value_len = if let Some(quoted) = rest.strip_prefix('\'') {
        let mut escaped = false;
        let mut end = quoted.len();
        for (i, c) in quoted.char_indices() {
            match c {
                '\\' if !escaped => escaped = true,
                '\'' if !escaped => {
                    end = i + 1;
                    break;
                }
                _ => escaped = false,
            }
        }
        1 + end
    } else {
        rest.find(char::is_whitespace).unwrap_or(rest.len())
    };

    format!(
        "{}***{}",
        &conninfo[..value_start],
        &conninfo[value_start + value_len..]
    )
}
