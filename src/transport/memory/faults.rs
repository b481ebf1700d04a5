//! Scripted failures and call counters of the in-memory broker.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TransportError;
use crate::transport::TxnStatus;

/// One scripted commit failure: the error returned and the flags left on the session.
#[derive(Clone, Debug)]
struct CommitFault {
    status: TxnStatus,
    error: String,
}

#[derive(Default)]
struct Queues {
    connect: VecDeque<String>,
    begin: VecDeque<String>,
    enqueue: VecDeque<String>,
    commit: VecDeque<CommitFault>,
    abort: VecDeque<String>,
    consume: VecDeque<String>,
}

/// FIFO of failures injected into the next matching broker calls.
///
/// Each `fail_*` call queues failures; every queued failure is consumed by
/// exactly one call, after which the operation behaves normally again.
#[derive(Default)]
pub struct FaultScript {
    queues: Mutex<Queues>,
}

impl FaultScript {
    fn with<R>(&self, f: impl FnOnce(&mut Queues) -> R) -> R {
        let mut q = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut q)
    }

    /// The next `times` producer constructions fail.
    pub fn fail_connect(&self, times: usize) {
        self.with(|q| q.connect.extend((0..times).map(|i| format!("connection refused (#{i})"))));
    }

    /// The next `times` `begin_txn` calls fail.
    pub fn fail_begin(&self, times: usize) {
        self.with(|q| q.begin.extend((0..times).map(|_| "coordinator not available".to_string())));
    }

    /// The next `times` enqueues fail.
    pub fn fail_enqueue(&self, times: usize) {
        self.with(|q| q.enqueue.extend((0..times).map(|_| "input channel full".to_string())));
    }

    /// The next `commit_txn` fails and leaves `IN_ERROR | status` on the session.
    ///
    /// Pass [`TxnStatus::READY`] for a plain retryable commit failure.
    pub fn fail_commit(&self, status: TxnStatus) {
        let error = if status.is_fatal() {
            "producer fenced"
        } else if status.is_abortable() {
            "transaction aborted by coordinator"
        } else {
            "commit request timed out"
        }
        .to_string();
        self.with(|q| q.commit.push_back(CommitFault { status, error }));
    }

    /// The next `times` `abort_txn` calls fail.
    pub fn fail_abort(&self, times: usize) {
        self.with(|q| q.abort.extend((0..times).map(|_| "abort request timed out".to_string())));
    }

    /// The next `times` `consume` calls fail before joining.
    pub fn fail_consume(&self, times: usize) {
        self.with(|q| q.consume.extend((0..times).map(|_| "group coordinator unreachable".to_string())));
    }

    pub(crate) fn take_connect(&self) -> Option<TransportError> {
        self.with(|q| q.connect.pop_front()).map(TransportError::connect)
    }

    pub(crate) fn take_begin(&self) -> Option<TransportError> {
        self.with(|q| q.begin.pop_front()).map(TransportError::txn)
    }

    pub(crate) fn take_enqueue(&self) -> Option<TransportError> {
        self.with(|q| q.enqueue.pop_front()).map(TransportError::enqueue)
    }

    pub(crate) fn take_commit(&self) -> Option<(TxnStatus, TransportError)> {
        self.with(|q| q.commit.pop_front())
            .map(|f| (TxnStatus::IN_ERROR | f.status, TransportError::txn(f.error)))
    }

    pub(crate) fn take_abort(&self) -> Option<TransportError> {
        self.with(|q| q.abort.pop_front()).map(TransportError::txn)
    }

    pub(crate) fn take_consume(&self) -> Option<TransportError> {
        self.with(|q| q.consume.pop_front()).map(TransportError::group)
    }
}

/// Running call counters.
#[derive(Default)]
pub(crate) struct Counters {
    pub connects: AtomicU64,
    pub producers_closed: AtomicU64,
    pub begins: AtomicU64,
    pub commits: AtomicU64,
    pub aborts: AtomicU64,
    pub consumes: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, transactional_ids: Vec<String>) -> Stats {
        Stats {
            connects: self.connects.load(Ordering::Relaxed),
            producers_closed: self.producers_closed.load(Ordering::Relaxed),
            begins: self.begins.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            consumes: self.consumes.load(Ordering::Relaxed),
            transactional_ids,
        }
    }
}

/// Snapshot of broker call counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Producer construction attempts (failed ones included).
    pub connects: u64,
    pub producers_closed: u64,
    pub begins: u64,
    pub commits: u64,
    pub aborts: u64,
    /// `consume` calls, one per generation joined.
    pub consumes: u64,
    /// Transactional ids of successfully opened producers, in creation order.
    pub transactional_ids: Vec<String>,
}
