//! In-memory consumer group client: one `consume` call per generation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ConsumerConfig;
use crate::error::TransportError;
use crate::transport::{Claim, ConsumerMessage, GroupClient, GroupHandler, GroupSession};

use super::Shared;
use super::faults::Counters;

pub(crate) struct MemoryGroupClient {
    shared: Arc<Shared>,
    cfg: ConsumerConfig,
    member_id: String,
    closed: CancellationToken,
}

impl MemoryGroupClient {
    pub(crate) fn new(shared: Arc<Shared>, cfg: ConsumerConfig, member_id: String) -> Self {
        Self {
            shared,
            cfg,
            member_id,
            closed: CancellationToken::new(),
        }
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    group_id: String,
    member_id: String,
    generation: i32,
    claims: Vec<(String, i32)>,
    token: CancellationToken,
}

impl GroupSession for MemorySession {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn generation_id(&self) -> i32 {
        self.generation
    }

    fn claims(&self) -> &[(String, i32)] {
        &self.claims
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn mark_message(&self, message: &ConsumerMessage) {
        self.shared.mark(&self.group_id, message);
    }
}

#[async_trait]
impl GroupClient for MemoryGroupClient {
    async fn consume(
        &self,
        token: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        Counters::bump(&self.shared.counters.consumes);
        if let Some(err) = self.shared.faults.take_consume() {
            return Err(err);
        }

        let generation_token = CancellationToken::new();
        let link = tokio::spawn({
            let parent = token.clone();
            let closed = self.closed.clone();
            let generation = generation_token.clone();
            async move {
                tokio::select! {
                    _ = parent.cancelled() => {}
                    _ = closed.cancelled() => {}
                    _ = generation.cancelled() => {}
                }
                generation.cancel();
            }
        });

        let (generation, claims) = self.shared.join(
            &self.cfg.group_id,
            &self.member_id,
            topics,
            generation_token.clone(),
        );
        let session = Arc::new(MemorySession {
            shared: Arc::clone(&self.shared),
            group_id: self.cfg.group_id.clone(),
            member_id: self.member_id.clone(),
            generation,
            claims,
            token: generation_token.clone(),
        });

        let delay = self.shared.setup_delay();
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = generation_token.cancelled() => {}
            }
        }

        let result = match handler.setup(session.as_ref()).await {
            Ok(()) => {
                run_claims(&self.shared, &self.cfg, &session, &handler).await;
                handler.cleanup(session.as_ref()).await
            }
            Err(err) => Err(err),
        };

        generation_token.cancel();
        link.abort();
        if self.closed.is_cancelled() {
            self.shared.leave(&self.cfg.group_id, &self.member_id);
        }
        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.closed.cancel();
        self.shared.leave(&self.cfg.group_id, &self.member_id);
        Ok(())
    }
}

/// Feeds every claim of the generation and waits for all claim loops.
///
/// A claim loop returning an error ends the generation for every other claim.
async fn run_claims(
    shared: &Arc<Shared>,
    cfg: &ConsumerConfig,
    session: &Arc<MemorySession>,
    handler: &Arc<dyn GroupHandler>,
) {
    if session.claims.is_empty() {
        session.token.cancelled().await;
        return;
    }

    let mut loops = FuturesUnordered::new();
    for (topic, partition) in session.claims.iter().cloned() {
        let start = shared.start_offset(&cfg.group_id, &topic, partition, cfg.initial_offset);
        let (tx, rx) = mpsc::channel(cfg.channel_capacity_clamped());
        tokio::spawn(feed(
            Arc::clone(shared),
            topic.clone(),
            partition,
            start,
            tx,
            session.token.clone(),
        ));

        let claim = Claim::new(topic, partition, start, rx);
        let handler = Arc::clone(handler);
        let session = Arc::clone(session);
        loops.push(async move { handler.consume_claim(session.as_ref(), claim).await });
    }

    while let Some(res) = loops.next().await {
        if let Err(err) = res {
            tracing::debug!(member = %session.member_id, error = %err, "claim loop failed; ending generation");
            session.token.cancel();
        }
    }
}

/// Pushes committed records of one partition into the claim channel until the generation ends.
async fn feed(
    shared: Arc<Shared>,
    topic: String,
    partition: i32,
    mut next: i64,
    tx: mpsc::Sender<ConsumerMessage>,
    token: CancellationToken,
) {
    loop {
        let appended = shared.appended.notified();
        tokio::pin!(appended);
        appended.as_mut().enable();

        let batch = shared.read(&topic, partition, next);
        if batch.is_empty() {
            tokio::select! {
                _ = &mut appended => continue,
                _ = token.cancelled() => return,
            }
        }
        for msg in batch {
            next = msg.offset + 1;
            tokio::select! {
                sent = tx.send(msg) => {
                    if sent.is_err() {
                        return;
                    }
                }
                _ = token.cancelled() => return,
            }
        }
    }
}
