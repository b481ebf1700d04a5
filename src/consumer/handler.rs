//! # Message handlers.
//!
//! [`MessageHandler`] processes one delivered message. The claim loop marks the
//! message only after the handler returned `Ok` (or the failure policy decided
//! to skip or dead-letter it).
//!
//! [`HandlerFn`] wraps a closure `Fn(ConsumerMessage) -> Fut`, building a fresh
//! future per message.
//!
//! ## Example
//! ```rust
//! use txvisor::{ConsumerMessage, HandlerError, HandlerFn, MessageHandler};
//! use std::sync::Arc;
//!
//! let h: Arc<dyn MessageHandler> = HandlerFn::arc(|msg: ConsumerMessage| async move {
//!     if msg.value.is_empty() {
//!         return Err(HandlerError::fatal("empty payload"));
//!     }
//!     Ok(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::transport::ConsumerMessage;

/// Processes delivered messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError>;
}

/// Closure-backed handler.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(ConsumerMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        (self.f)(message.clone()).await
    }
}
