//! Panel side of the relay link: the event feed and the log ledger that
//! reconciles pending rows with their completed updates.

use tracing::debug;

use crate::envelope::{Envelope, MessageType, PageInit};
use crate::error::TransportError;
use crate::model::RequestLog;
use crate::transport::{ChannelTransport, Endpoint, Inbox, Transport};

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    Log(RequestLog),
    Init(PageInit),
}

impl PanelEvent {
    fn from_envelope(envelope: Envelope) -> Option<Self> {
        match envelope.kind {
            MessageType::Log => envelope.payload().map(PanelEvent::Log),
            MessageType::Init => envelope.payload().map(PanelEvent::Init),
            other => {
                debug!("Panel ignoring {:?}", other);
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct PanelHandle {
    transport: ChannelTransport,
    inbox: Inbox,
}

impl PanelHandle {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            transport: endpoint.transport,
            inbox: endpoint.inbox,
        }
    }

    /// Tell the relay the persisted rule store changed.
    pub async fn update_store(&self) -> Result<(), TransportError> {
        self.transport.send(Envelope::update_store()).await
    }

    /// Next recognised event; `None` once the relay is gone.
    pub async fn next_event(&mut self) -> Option<PanelEvent> {
        loop {
            let envelope = self.inbox.recv().await?;
            if let Some(event) = PanelEvent::from_envelope(envelope) {
                return Some(event);
            }
        }
    }

    /// Every event already queued, without waiting.
    pub fn drain(&mut self) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        while let Some(envelope) = self.inbox.try_recv() {
            events.extend(PanelEvent::from_envelope(envelope));
        }
        events
    }
}

/// Log rows as the panel shows them.
#[derive(Debug, Default)]
pub struct LogLedger {
    host: Option<String>,
    entries: Vec<RequestLog>,
}

impl LogLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending entries append; an entry with a response replaces the row with
    /// the same id, or appends when no such row exists.
    pub fn apply(&mut self, event: PanelEvent) {
        match event {
            PanelEvent::Init(init) => self.host = Some(init.host),
            PanelEvent::Log(entry) if entry.is_complete() => {
                let existing = entry
                    .id
                    .and_then(|id| self.entries.iter_mut().find(|row| row.id == Some(id)));
                match existing {
                    Some(row) => *row = entry,
                    None => self.entries.push(entry),
                }
            }
            PanelEvent::Log(entry) => self.entries.push(entry),
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn entries(&self) -> &[RequestLog] {
        &self.entries
    }

    pub fn get(&self, id: u64) -> Option<&RequestLog> {
        self.entries.iter().find(|row| row.id == Some(id))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_replaces_pending_row() {
        let mut ledger = LogLedger::new();
        ledger.apply(PanelEvent::Log(RequestLog::pending(1, "GET", "/a", None)));
        ledger.apply(PanelEvent::Log(RequestLog::pending(2, "GET", "/b", None)));
        ledger.apply(PanelEvent::Log(
            RequestLog::pending(1, "GET", "/a", None).with_response(204, None),
        ));

        assert_eq!(ledger.entries().len(), 2);
        assert_eq!(ledger.get(1).unwrap().response.as_ref().unwrap().status, 204);
        assert!(ledger.get(2).unwrap().response.is_none());
        assert_eq!(ledger.entries()[0].request.url, "/a");
    }

    #[test]
    fn test_completion_without_pending_row_appends() {
        let mut ledger = LogLedger::new();
        ledger.apply(PanelEvent::Log(
            RequestLog::pending(9, "GET", "/late", None).with_response(200, None),
        ));
        assert_eq!(ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_skips_unknown_kinds() {
        use crate::envelope::ContextTag;
        use crate::transport::link;

        let (panel, relay) = link(ContextTag::Panel, ContextTag::Relay);
        let mut handle = PanelHandle::new(panel);
        relay.transport.send(Envelope::init("localhost:3000")).await.unwrap();
        relay
            .transport
            .send(Envelope::new(MessageType::Query, ContextTag::Relay, ContextTag::Panel, serde_json::json!({})))
            .await
            .unwrap();
        let entry = RequestLog::pending(1, "GET", "/a", None);
        relay
            .transport
            .send(Envelope::log(ContextTag::Relay, ContextTag::Panel, &entry))
            .await
            .unwrap();

        let events = handle.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PanelEvent::Init(_)));
        assert_eq!(events[1], PanelEvent::Log(entry));
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn test_init_records_host() {
        let mut ledger = LogLedger::new();
        ledger.apply(PanelEvent::Init(PageInit {
            host: "localhost:3000".into(),
        }));
        assert_eq!(ledger.host(), Some("localhost:3000"));
    }
}
