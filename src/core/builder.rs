use std::sync::Arc;

use crate::config::Config;
use crate::core::Client;
use crate::subscribers::Subscribe;
use crate::transport::Transport;

/// Builder for [`Client`].
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ClientBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cfg: Config::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers.
    ///
    /// Each one gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the client and starts the event listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Client {
        Client::new_internal(self.transport, self.cfg, self.subscribers)
    }
}
