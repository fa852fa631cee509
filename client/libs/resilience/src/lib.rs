/// Resilience policies for the realtime sync client
///
/// This library provides the two policies every network edge of the client relies on:
/// - **Backoff**: Exponential reconnect schedule with cap, jitter and an attempt budget
/// - **Timeout**: Time limits on token acquisition, transport handshakes and fetches
///
/// # Example: Reconnect schedule
///
/// ```rust
/// use resilience::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy {
///     initial_backoff: Duration::from_secs(1),
///     jitter: false,
///     ..Default::default()
/// };
///
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(4));
/// ```
///
/// # Example: Fetch with timeout
///
/// ```rust,no_run
/// use resilience::timeout::with_timeout_result;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_timeout_result(Duration::from_secs(10), async {
///         // Your fetch here
///         Ok::<_, String>(())
///     })
///     .await;
/// }
/// ```

pub mod backoff;
pub mod timeout;

// Re-export main types for convenience
pub use backoff::BackoffPolicy;
pub use timeout::{with_timeout, with_timeout_result, TimeoutError};
