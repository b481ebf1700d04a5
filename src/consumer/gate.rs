//! Single-use readiness latch between `subscribe` and the first `setup`.
//!
//! The gate is consumed by [`ReadyGate::fire`], so it can fire at most once.
//! Dropping it unfired wakes the waiter with `false`.

use tokio::sync::watch;

/// Firing side, owned by one generation's session.
#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<bool>,
}

/// Waiting side.
#[derive(Debug)]
pub struct ReadyWaiter {
    rx: watch::Receiver<bool>,
}

/// Creates a connected gate/waiter pair.
pub fn ready_gate() -> (ReadyGate, ReadyWaiter) {
    let (tx, rx) = watch::channel(false);
    (ReadyGate { tx }, ReadyWaiter { rx })
}

impl ReadyGate {
    /// A gate nobody waits for.
    pub fn detached() -> Self {
        ready_gate().0
    }

    pub fn fire(self) {
        self.tx.send_replace(true);
    }
}

impl ReadyWaiter {
    /// Resolves `true` once the gate fired, `false` if it was dropped unfired.
    pub async fn ready(&mut self) -> bool {
        self.rx.wait_for(|fired| *fired).await.is_ok()
    }
}
