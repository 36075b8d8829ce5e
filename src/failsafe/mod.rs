//! Failsafe mechanisms: request throttling and retry with backoff

mod rate_limiter;
mod retry;

pub use rate_limiter::RequestThrottle;
pub use retry::{RetryPolicy, with_retry};
