//! Producer handle: one transport session plus its transaction state.

use std::fmt;
use std::sync::Arc;

use crate::error::TransportError;
use crate::transport::{Message, ProducerSession, TxnStatus};

/// Per-handle transaction state machine.
///
/// ```text
/// Idle ─► InTransaction ─► Committing ─► Idle
///                              │
///                              ├─► Aborting ─► Idle
///                              └─► Fatal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    InTransaction,
    Committing,
    Aborting,
    /// The session can never be used again.
    Fatal,
}

impl TxnState {
    pub fn as_str(self) -> &'static str {
        match self {
            TxnState::Idle => "idle",
            TxnState::InTransaction => "in_transaction",
            TxnState::Committing => "committing",
            TxnState::Aborting => "aborting",
            TxnState::Fatal => "fatal",
        }
    }
}

/// A producer session bound to a unique transactional id.
///
/// Moved out of the pool by [`borrow`](crate::ProducerPool::borrow) and back
/// in by [`release`](crate::ProducerPool::release); only one task can drive it.
pub struct ProducerHandle {
    id: u64,
    label: Arc<str>,
    transactional_id: Option<Arc<str>>,
    session: Box<dyn ProducerSession>,
    state: TxnState,
}

impl ProducerHandle {
    pub(crate) fn new(
        id: u64,
        transactional_id: Option<String>,
        session: Box<dyn ProducerSession>,
    ) -> Self {
        let transactional_id: Option<Arc<str>> = transactional_id.map(Arc::from);
        let label = transactional_id
            .clone()
            .unwrap_or_else(|| Arc::from(format!("producer-{id}")));
        Self {
            id,
            label,
            transactional_id,
            session,
            state: TxnState::Idle,
        }
    }

    /// Pool-local sequence number of the handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transactional_id(&self) -> Option<&str> {
        self.transactional_id.as_deref()
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Flags reported by the underlying session.
    pub fn txn_status(&self) -> TxnStatus {
        self.session.txn_status()
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional_id.is_some()
    }

    /// Name used in events: the transactional id, or `producer-<id>`.
    pub(crate) fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub(crate) fn set_state(&mut self, state: TxnState) {
        self.state = state;
    }

    /// Why the handle must not return to the pool, if it must not.
    pub(crate) fn discard_reason(&self) -> Option<String> {
        if self.state != TxnState::Idle {
            return Some(format!("state {}", self.state.as_str()));
        }
        let status = self.session.txn_status();
        if status.is_in_error() || status.is_fatal() {
            return Some(format!("txn status {status:?}"));
        }
        None
    }

    pub(crate) async fn begin_txn(&mut self) -> Result<(), TransportError> {
        self.session.begin_txn().await
    }

    pub(crate) async fn commit_txn(&mut self) -> Result<(), TransportError> {
        self.session.commit_txn().await
    }

    pub(crate) async fn abort_txn(&mut self) -> Result<(), TransportError> {
        self.session.abort_txn().await
    }

    pub(crate) fn enqueue(&mut self, message: Message) -> Result<(), TransportError> {
        self.session.send(message)
    }

    pub(crate) async fn close(&mut self) -> Result<(), TransportError> {
        self.session.close().await
    }
}

impl fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("id", &self.id)
            .field("transactional_id", &self.transactional_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
