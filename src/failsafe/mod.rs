//! Failsafe mechanisms: call deadlines and caller-side retry

mod retry;
mod timeout;

pub use retry::{RetryPolicy, with_retry};
pub use timeout::with_timeout;
