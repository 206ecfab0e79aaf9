//! Transport seam between contexts.
//!
//! Contexts share no memory: envelopes cross as JSON frames and the receiver
//! re-validates every frame against the envelope shape before acting on it.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::envelope::{ContextTag, Envelope};
use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `envelope` without waiting for the receiver to act on it.
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Outbound half of an in-process link.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelTransport {
    /// Push an arbitrary frame, bypassing envelope encoding. This is what a
    /// hostile page can do on a shared message channel.
    pub fn send_raw(&self, frame: Value) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let frame = serde_json::to_value(&envelope).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.send_raw(frame)
    }
}

/// Inbound half of a link; yields only well-formed envelopes addressed to its owner.
#[derive(Debug)]
pub struct Inbox {
    owner: ContextTag,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Inbox {
    pub fn owner(&self) -> ContextTag {
        self.owner
    }

    /// Next envelope for this context, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            let frame = self.rx.recv().await?;
            match Envelope::decode(frame) {
                Some(envelope) if envelope.to == self.owner => return Some(envelope),
                Some(envelope) => {
                    trace!("{:?} ignoring frame addressed to {:?}", self.owner, envelope.to);
                }
                None => {}
            }
        }
    }

    /// Like [`Inbox::recv`] but returns `None` as soon as nothing is queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        while let Ok(frame) = self.rx.try_recv() {
            match Envelope::decode(frame) {
                Some(envelope) if envelope.to == self.owner => return Some(envelope),
                _ => continue,
            }
        }
        None
    }
}

/// One side of a duplex link.
#[derive(Debug)]
pub struct Endpoint {
    pub transport: ChannelTransport,
    pub inbox: Inbox,
}

/// Create a duplex link between two contexts.
pub fn link(near: ContextTag, far: ContextTag) -> (Endpoint, Endpoint) {
    let (near_tx, far_rx) = mpsc::unbounded_channel();
    let (far_tx, near_rx) = mpsc::unbounded_channel();

    let near_end = Endpoint {
        transport: ChannelTransport { tx: near_tx },
        inbox: Inbox { owner: near, rx: near_rx },
    };
    let far_end = Endpoint {
        transport: ChannelTransport { tx: far_tx },
        inbox: Inbox { owner: far, rx: far_rx },
    };
    (near_end, far_end)
}
