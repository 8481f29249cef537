//! Activity loop
//!
//! The node's only source of outbound activity. Each iteration sleeps a
//! random interval, then either records an internal event or sends the
//! current clock to one randomly chosen peer. Randomness comes from the
//! injected generator so runs can be replayed from a seed.

use lamport_protocol::{LogicalClock, Message, NodeId, NodeIdentity, NodeSettings, PeerTable};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::client::PeerClient;
use crate::event_log::EventLog;
use crate::shutdown::ShutdownSignal;

/// What one iteration decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Internal,
    Send,
}

/// Result of one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Internal { clock: u64 },
    Sent { peer: NodeId, clock: u64 },
    SendFailed { peer: NodeId, clock: u64, reason: String },
    /// Send chosen with an empty peer table; nothing happened
    NoPeers,
}

pub struct ActivityLoop<R> {
    node_id: NodeId,
    peers: PeerTable,
    clock: Arc<LogicalClock>,
    log: Arc<EventLog>,
    client: PeerClient,
    min_interval_ms: u64,
    max_interval_ms: u64,
    rng: R,
}

impl<R: Rng + Send> ActivityLoop<R> {
    pub fn new(
        identity: &NodeIdentity,
        peers: PeerTable,
        clock: Arc<LogicalClock>,
        log: Arc<EventLog>,
        settings: &NodeSettings,
        rng: R,
    ) -> Self {
        Self {
            node_id: identity.id,
            peers,
            clock,
            log,
            client: PeerClient::new(settings.connect_timeout()),
            min_interval_ms: settings.min_interval_ms,
            max_interval_ms: settings.max_interval_ms.max(settings.min_interval_ms),
            rng,
        }
    }

    /// Draw the next pause, uniform within the configured bounds
    pub fn next_interval(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(self.min_interval_ms..=self.max_interval_ms))
    }

    /// Pick internal or send with equal probability
    pub fn choose_action(&mut self) -> Action {
        if self.rng.gen_bool(0.5) {
            Action::Internal
        } else {
            Action::Send
        }
    }

    /// Run one iteration's action (without the sleep)
    pub async fn step(&mut self) -> StepOutcome {
        match self.choose_action() {
            Action::Internal => self.internal_event().await,
            Action::Send => self.send_to_random_peer().await,
        }
    }

    pub async fn internal_event(&mut self) -> StepOutcome {
        let clock = self.clock.increment();
        self.log.record(clock, "INTERNAL EVENT").await;
        StepOutcome::Internal { clock }
    }

    /// Send to a random peer. The send counts as an event, so the clock is
    /// incremented before the message is built and the message carries the
    /// new value. A failed send keeps the increment and is not retried.
    pub async fn send_to_random_peer(&mut self) -> StepOutcome {
        let Some(peer) = self.peers.choose(&mut self.rng).cloned() else {
            debug!(node = self.node_id, "no peers configured, skipping send");
            return StepOutcome::NoPeers;
        };

        let clock = self.clock.increment();
        let message = Message::new(self.node_id, clock);

        match self.client.send(&peer.address, &message).await {
            Ok(()) => {
                self.log
                    .record(self.clock.peek(), format!("SENT to Node {}", peer.id))
                    .await;
                StepOutcome::Sent {
                    peer: peer.id,
                    clock,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                self.log
                    .record(
                        self.clock.peek(),
                        format!("FAILED to send to Node {}: {}", peer.id, reason),
                    )
                    .await;
                StepOutcome::SendFailed {
                    peer: peer.id,
                    clock,
                    reason,
                }
            }
        }
    }

    /// Loop until `shutdown` is triggered
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        while !shutdown.is_triggered() {
            let pause = self.next_interval();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.triggered() => break,
            }

            let outcome = self.step().await;
            debug!(node = self.node_id, ?outcome, "activity step");
        }
    }
}
