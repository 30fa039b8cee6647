//! Fire-and-forget anchoring of block commitments to an external chain
//!
//! The ledger never waits on the anchor: `notify` is a non-blocking
//! `try_send` into a bounded mailbox, and sink failures are only logged.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Ledger::append (exclusive section)         │
//! │       block persisted + indexed, lock released        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ AnchorHandle::notify (try_send)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              mpsc::channel (bounded)                  │
//! └─────────────────────┬────────────────────────────────┘
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │             AnchorActor (single task)                 │
//! │         AnchorSink::submit(&AnchorRequest)            │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::config::AnchorConfig;
use crate::types::Block;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

/// Commitment of one block handed to the external chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorRequest {
    /// Block height
    pub height: u64,
    /// Block merkle root
    pub merkle_root: String,
    /// Block digest
    pub block_digest: String,
    /// When the request was created
    pub requested_at: DateTime<Utc>,
}

impl AnchorRequest {
    /// Build a request for `block`
    pub fn from_block(block: &Block) -> Self {
        Self {
            height: block.height,
            merkle_root: block.merkle_root.clone(),
            block_digest: block.digest.clone(),
            requested_at: Utc::now(),
        }
    }

    /// `aurum/MsgAnchor` message body
    pub fn to_message(&self) -> serde_json::Value {
        json!({
            "type": "aurum/MsgAnchor",
            "value": {
                "height": self.height.to_string(),
                "merkle_root": self.merkle_root,
                "block_hash": self.block_digest,
                "timestamp": self.requested_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            }
        })
    }
}

/// Destination of anchor requests
///
/// Runs on the actor task; implementations should not block for long.
pub trait AnchorSink: Send + 'static {
    /// Submit one request to the external chain
    fn submit(&mut self, request: &AnchorRequest) -> Result<()>;
}

/// Sink that logs the message it would broadcast
#[derive(Debug, Clone)]
pub struct LogAnchorSink {
    chain_id: String,
    rpc_endpoint: String,
}

impl LogAnchorSink {
    /// Create from configuration
    pub fn new(config: &AnchorConfig) -> Self {
        Self {
            chain_id: config.chain_id.clone(),
            rpc_endpoint: config.rpc_endpoint.clone(),
        }
    }
}

impl AnchorSink for LogAnchorSink {
    fn submit(&mut self, request: &AnchorRequest) -> Result<()> {
        let message = serde_json::to_string(&request.to_message())?;
        tracing::info!(
            chain_id = %self.chain_id,
            endpoint = %self.rpc_endpoint,
            height = request.height,
            %message,
            "Anchor broadcast"
        );
        Ok(())
    }
}

/// Message sent to the anchor actor
#[derive(Debug)]
pub enum AnchorMessage {
    /// Anchor a block commitment
    Anchor(AnchorRequest),

    /// Reply once every earlier request has been handled
    Flush {
        /// Completion signal
        response: oneshot::Sender<()>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that forwards requests to a sink
#[derive(Debug)]
pub struct AnchorActor<S> {
    sink: S,
    mailbox: mpsc::Receiver<AnchorMessage>,
}

impl<S: AnchorSink> AnchorActor<S> {
    /// Create new actor
    pub fn new(sink: S, mailbox: mpsc::Receiver<AnchorMessage>) -> Self {
        Self { sink, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                AnchorMessage::Anchor(request) => {
                    if let Err(e) = self.sink.submit(&request) {
                        tracing::warn!(height = request.height, error = %e, "Anchor failed");
                    }
                }
                AnchorMessage::Flush { response } => {
                    let _ = response.send(());
                }
                AnchorMessage::Shutdown => break,
            }
        }

        tracing::debug!("Anchor actor stopped");
    }
}

/// Handle for sending requests to the actor
#[derive(Debug, Clone)]
pub struct AnchorHandle {
    sender: mpsc::Sender<AnchorMessage>,
    interval_blocks: u64,
}

impl AnchorHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<AnchorMessage>, interval_blocks: u64) -> Self {
        Self {
            sender,
            interval_blocks,
        }
    }

    /// Whether `height` is due for anchoring
    pub fn is_due(&self, height: u64) -> bool {
        self.interval_blocks != 0 && height % self.interval_blocks == 0
    }

    /// Queue `block` for anchoring if due. Never blocks; returns whether it was queued.
    pub fn notify(&self, block: &Block) -> bool {
        if !self.is_due(block.height) {
            return false;
        }

        match self
            .sender
            .try_send(AnchorMessage::Anchor(AnchorRequest::from_block(block)))
        {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(height = block.height, "Anchor mailbox full, request dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(height = block.height, "Anchor actor stopped, request dropped");
                false
            }
        }
    }

    /// Wait until every queued request has been handled
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AnchorMessage::Flush { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Anchor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AnchorMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Anchor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the anchor actor on the current Tokio runtime
pub fn spawn_anchor_actor<S: AnchorSink>(sink: S, config: &AnchorConfig) -> AnchorHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
    let actor = AnchorActor::new(sink, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    AnchorHandle::new(tx, config.interval_blocks)
}
