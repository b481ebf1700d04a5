//! Entry point: [`Client`] and its builder, plus signal handling for
//! [`ConsumerGroup::serve`](crate::ConsumerGroup::serve).

mod builder;
mod client;
pub(crate) mod shutdown;

pub use builder::ClientBuilder;
pub use client::Client;
