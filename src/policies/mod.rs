//! Retry and failure policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization to avoid synchronized retries
//! - [`FailurePolicy`] what a claim loop does when the handler fails
//!
//! ## Where they are used
//! ```text
//! ProducerConfig.factory_backoff ──► ProducerPool::borrow (handle construction retries)
//! ConsumerConfig.on_failure      ──► ConsumerSession::consume_claim
//!                                     ├─ backoff between handler retries
//!                                     └─ Exhausted::{Skip, DeadLetter, Halt}
//! ```

mod backoff;
mod failure;
mod jitter;

pub use backoff::BackoffPolicy;
pub use failure::{Exhausted, FailurePolicy};
pub use jitter::JitterPolicy;
