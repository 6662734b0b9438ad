//! Utility helpers

pub mod retry;
pub mod slug;

pub use retry::{retry_on_lock, retry_with_backoff, RetryExhausted, RetryPolicy};
pub use slug::slugify;
