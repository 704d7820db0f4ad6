use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Outcome of racing a future against a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bounded<T> {
    Completed(T),
    TimedOut,
}

/// Runs `fut` for at most `limit`. Whichever settles first wins; a future that
/// loses the race is dropped and its eventual result discarded.
pub async fn bounded<F>(limit: Duration, fut: F) -> Bounded<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Bounded::Completed(value),
        Err(_) => Bounded::TimedOut,
    }
}

/// Converts epoch milliseconds as reported by provider APIs.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
