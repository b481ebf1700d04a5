//! In-memory producer session: stages records until commit.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Partitioner;
use crate::error::TransportError;
use crate::transport::{Message, ProducerSession, TxnStatus};

use super::Shared;
use super::faults::Counters;

pub(crate) struct MemoryProducer {
    shared: Arc<Shared>,
    transactional_id: Option<String>,
    partitioner: Partitioner,
    in_txn: bool,
    staged: Vec<Message>,
    status: TxnStatus,
    closed: bool,
}

impl MemoryProducer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        transactional_id: Option<String>,
        partitioner: Partitioner,
    ) -> Self {
        Self {
            shared,
            transactional_id,
            partitioner,
            in_txn: false,
            staged: Vec::new(),
            status: TxnStatus::READY,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ProducerSession for MemoryProducer {
    async fn begin_txn(&mut self) -> Result<(), TransportError> {
        Counters::bump(&self.shared.counters.begins);
        self.ensure_open()?;
        if self.transactional_id.is_none() {
            return Err(TransportError::txn("transactional id not configured"));
        }
        if self.status.is_fatal() {
            return Err(TransportError::txn("producer is fenced"));
        }
        if let Some(err) = self.shared.faults.take_begin() {
            return Err(err);
        }
        if self.in_txn {
            return Err(TransportError::txn("transaction already in progress"));
        }
        self.in_txn = true;
        Ok(())
    }

    async fn commit_txn(&mut self) -> Result<(), TransportError> {
        Counters::bump(&self.shared.counters.commits);
        self.ensure_open()?;
        if !self.in_txn {
            return Err(TransportError::txn("no transaction in progress"));
        }
        if self.status.is_fatal() {
            return Err(TransportError::txn("producer is fenced"));
        }
        if let Some((status, err)) = self.shared.faults.take_commit() {
            self.status = status;
            return Err(err);
        }
        self.shared
            .append(std::mem::take(&mut self.staged), self.partitioner);
        self.in_txn = false;
        self.status = TxnStatus::READY;
        Ok(())
    }

    async fn abort_txn(&mut self) -> Result<(), TransportError> {
        Counters::bump(&self.shared.counters.aborts);
        self.ensure_open()?;
        if let Some(err) = self.shared.faults.take_abort() {
            return Err(err);
        }
        if self.status.is_fatal() {
            return Err(TransportError::txn("producer is fenced"));
        }
        self.staged.clear();
        self.in_txn = false;
        self.status = TxnStatus::READY;
        Ok(())
    }

    fn txn_status(&self) -> TxnStatus {
        self.status
    }

    fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.ensure_open()?;
        if let Some(err) = self.shared.faults.take_enqueue() {
            return Err(err);
        }
        match (&self.transactional_id, self.in_txn) {
            (None, _) => {
                self.shared.append(vec![message], self.partitioner);
                Ok(())
            }
            (Some(_), true) => {
                self.staged.push(message);
                Ok(())
            }
            (Some(_), false) => Err(TransportError::enqueue("no transaction in progress")),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.staged.clear();
            Counters::bump(&self.shared.counters.producers_closed);
        }
        Ok(())
    }
}
