//! # What a claim loop does when the message handler fails.
//!
//! Offsets are only marked after the handler succeeded, unless the policy
//! explicitly decides to move past the message:
//!
//! ```text
//! handler(msg) ── Ok ───────────────────────────────────────────► mark
//!      │
//!      └─ Err(Fail)  ─► retry up to `retries` times (backoff between tries)
//!      └─ Err(Fatal) ─► no retries
//!                          │
//!                          ▼ still failing
//!                     Exhausted::Skip        ─► mark (message dropped)
//!                     Exhausted::DeadLetter  ─► publish to topic, then mark
//!                     Exhausted::Halt        ─► stop the claim loop, no mark
//! ```

use std::time::Duration;

use crate::policies::backoff::BackoffPolicy;

/// Final action once handler retries are used up.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Exhausted {
    /// Mark the message anyway and continue with the next one.
    #[default]
    Skip,
    /// Publish the message to `topic` through the group's dead-letter pool, then mark it.
    ///
    /// If the dead-letter publish fails the claim loop halts instead.
    DeadLetter {
        /// Dead-letter topic.
        topic: String,
    },
    /// Leave the message unmarked and end the claim loop with an error.
    ///
    /// The message is redelivered to whoever owns the partition next generation.
    Halt,
}

/// Handler failure policy of a consumer group.
#[derive(Clone, Debug, PartialEq)]
pub struct FailurePolicy {
    /// Extra handler invocations after the first failure (`0` = no retries).
    pub retries: u32,
    /// Delay between handler retries.
    pub backoff: BackoffPolicy,
    /// What happens when retries are exhausted.
    pub then: Exhausted,
}

impl Default for FailurePolicy {
    /// Two retries 100ms apart, then skip.
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: BackoffPolicy::constant(Duration::from_millis(100)),
            then: Exhausted::Skip,
        }
    }
}

impl FailurePolicy {
    /// Mark every message no matter what the handler returned.
    pub fn skip() -> Self {
        Self {
            retries: 0,
            backoff: BackoffPolicy::constant(Duration::ZERO),
            then: Exhausted::Skip,
        }
    }

    /// Retry `retries` times, then stop the claim without marking.
    pub fn halt_after(retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            retries,
            backoff,
            then: Exhausted::Halt,
        }
    }

    /// Retry `retries` times, then route the message to `topic`.
    pub fn dead_letter(topic: impl Into<String>, retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            retries,
            backoff,
            then: Exhausted::DeadLetter {
                topic: topic.into(),
            },
        }
    }
}
