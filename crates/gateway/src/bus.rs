//! Message bus and the serial consumer loop.
//!
//! Channel adapters publish [`InboundMessage`]s; a single [`AgentLoop`]
//! drains them one at a time and publishes the replies. Turns never run
//! concurrently, so session state needs no locking beyond the store's own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mn_domain::envelope::{InboundMessage, OutboundMessage};
use mn_domain::error::{Error, Result};
use mn_sessions::resolve_route;

use crate::runtime::AgentRuntime;

/// How long the consumer waits for a message before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sending half of the outbound queue. Cloned into everything that talks
/// to the user mid-turn (progress notices, the `message` tool).
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<OutboundMessage>,
}

impl Outbox {
    pub async fn send(&self, msg: OutboundMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| Error::Other("outbound queue closed".into()))
    }
}

/// Producer handles for both queues.
#[derive(Clone)]
pub struct MessageBus {
    inbound: mpsc::Sender<InboundMessage>,
    outbox: Outbox,
}

/// Consumer halves, handed to the loop and to whatever delivers replies.
pub struct BusReceivers {
    pub inbound: mpsc::Receiver<InboundMessage>,
    pub outbound: mpsc::Receiver<OutboundMessage>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> (Self, BusReceivers) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (
            Self {
                inbound: in_tx,
                outbox: Outbox { tx: out_tx },
            },
            BusReceivers {
                inbound: in_rx,
                outbound: out_rx,
            },
        )
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound
            .send(msg)
            .await
            .map_err(|_| Error::Other("inbound queue closed".into()))
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serial consumer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentLoop {
    runtime: Arc<AgentRuntime>,
    inbound: mpsc::Receiver<InboundMessage>,
    outbox: Outbox,
}

impl AgentLoop {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        inbound: mpsc::Receiver<InboundMessage>,
        outbox: Outbox,
    ) -> Self {
        Self {
            runtime,
            inbound,
            outbox,
        }
    }

    /// Process inbound messages one at a time until `shutdown` fires or
    /// every inbound producer has been dropped.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("agent loop started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let msg = match tokio::time::timeout(POLL_INTERVAL, self.inbound.recv()).await {
                Err(_) => continue,
                Ok(None) => break,
                Ok(Some(msg)) => msg,
            };

            if let Some(reply) = self.handle(&msg).await {
                if let Err(e) = self.outbox.send(reply).await {
                    tracing::warn!(error = %e, "dropping reply");
                }
            }
        }
        tracing::info!("agent loop stopped");
    }

    /// Run one turn, turning a propagated error into an apology on the
    /// origin channel.
    pub async fn handle(&self, msg: &InboundMessage) -> Option<OutboundMessage> {
        match self.runtime.process(msg).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    channel = %msg.channel,
                    chat_id = %msg.chat_id,
                    error = %e,
                    "turn failed"
                );
                let route = resolve_route(msg, self.runtime.default_channel());
                Some(OutboundMessage::new(
                    route.channel,
                    route.chat_id,
                    format!("Sorry, I encountered an error: {e}"),
                ))
            }
        }
    }
}
