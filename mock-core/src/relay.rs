//! Privileged relay between the page agent and the panel.
//!
//! Owns the cached rule store and its URL index, answers mock queries, and
//! forwards request logs to the panel.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::envelope::{ContextTag, Envelope, MessageType, QueryReply};
use crate::error::StoreError;
use crate::index::{Locator, UrlIndex};
use crate::model::{MockRule, RequestLog, RuleStore};
use crate::store::RuleStoreBackend;
use crate::transport::{Inbox, Transport};

/// Snapshot of the rule store plus the index derived from it.
#[derive(Debug, Clone, Default)]
pub struct RelayCache {
    store: RuleStore,
    index: UrlIndex,
}

impl RelayCache {
    pub fn new(store: RuleStore) -> Self {
        let index = UrlIndex::build(&store);
        Self { store, index }
    }

    /// Re-read the backend and rebuild the index. The previous snapshot stays
    /// in place when the read fails.
    pub async fn refresh(&mut self, backend: &dyn RuleStoreBackend) -> Result<(), StoreError> {
        *self = Self::new(backend.load().await?);
        Ok(())
    }

    pub fn lookup(&self, url: &str, method: &str) -> Option<(&Locator, &MockRule)> {
        let locator = self.index.lookup(url, method)?;
        let rule = self.store.resolve(locator)?;
        Some((locator, rule))
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn index(&self) -> &UrlIndex {
        &self.index
    }
}

pub struct Relay {
    backend: Arc<dyn RuleStoreBackend>,
    cache: RelayCache,
    to_agent: Arc<dyn Transport>,
    to_panel: Arc<dyn Transport>,
    /// Log id -> rule found at query time, kept until the completion log arrives
    query_hits: BTreeMap<u64, Locator>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(
        backend: Arc<dyn RuleStoreBackend>,
        to_agent: Arc<dyn Transport>,
        to_panel: Arc<dyn Transport>,
        config: RelayConfig,
    ) -> Self {
        Self {
            backend,
            cache: RelayCache::default(),
            to_agent,
            to_panel,
            query_hits: BTreeMap::new(),
            config,
        }
    }

    /// Load the rule store once and index it.
    pub async fn activate(&mut self) -> Result<(), StoreError> {
        self.cache.refresh(&*self.backend).await?;
        info!(
            "Relay active with {} rules over {} url/method pairs",
            self.cache.store().rule_count(),
            self.cache.index().len()
        );
        Ok(())
    }

    pub fn cache(&self) -> &RelayCache {
        &self.cache
    }

    /// Process one envelope that arrived on the page channel.
    pub async fn on_agent_message(&mut self, envelope: Envelope) {
        match envelope.kind {
            MessageType::Log => self.forward_log(envelope).await,
            MessageType::Query => self.answer_query(envelope).await,
            other => debug!("Relay ignoring {:?} from page", other),
        }
    }

    /// Process one envelope that arrived from the panel.
    pub async fn on_panel_message(&mut self, envelope: Envelope) {
        match envelope.kind {
            MessageType::UpdateStore => self.reload().await,
            other => debug!("Relay ignoring {:?} from panel", other),
        }
    }

    /// Serve both channels, one message at a time, until the page goes away.
    pub async fn run(mut self, mut from_agent: Inbox, mut from_panel: Inbox) {
        let mut panel_open = true;
        loop {
            tokio::select! {
                biased;
                message = from_panel.recv(), if panel_open => match message {
                    Some(envelope) => self.on_panel_message(envelope).await,
                    None => panel_open = false,
                },
                message = from_agent.recv() => match message {
                    Some(envelope) => self.on_agent_message(envelope).await,
                    None => break,
                },
            }
        }
        debug!("Relay stopped: page channel closed");
    }

    async fn reload(&mut self) {
        match self.cache.refresh(&*self.backend).await {
            Ok(()) => {
                // Locators point into the old snapshot; completions look up again.
                self.query_hits.clear();
                info!(
                    "Rule store reloaded: {} rules over {} url/method pairs",
                    self.cache.store().rule_count(),
                    self.cache.index().len()
                )
            }
            Err(e) => warn!("Rule store reload failed, keeping previous snapshot: {}", e),
        }
    }

    async fn forward_log(&mut self, envelope: Envelope) {
        let Some(mut entry) = envelope.payload::<RequestLog>() else {
            return;
        };

        // Annotations are the relay's to make.
        entry.is_mocked = None;
        entry.mock_path = None;
        if entry.is_complete() {
            self.annotate_completion(&mut entry);
        }

        self.to_panel_log(&entry).await;
    }

    fn annotate_completion(&mut self, entry: &mut RequestLog) {
        let remembered = entry.id.and_then(|id| self.query_hits.remove(&id));
        let locator = remembered.or_else(|| {
            self.cache
                .lookup(&entry.request.url, &entry.request.method)
                .map(|(locator, _)| locator.clone())
        });

        if let Some(locator) = locator {
            if self.cache.store().resolve(&locator).is_some() {
                entry.mock_path = Some(locator);
                entry.is_mocked = Some(false);
            }
        }
    }

    async fn answer_query(&mut self, envelope: Envelope) {
        let Some(id) = envelope.id else {
            debug!("Dropping query without correlation id");
            return;
        };

        let entry = envelope.payload::<RequestLog>();
        let hit = entry.as_ref().and_then(|entry| {
            self.cache
                .lookup(&entry.request.url, &entry.request.method)
                .map(|(locator, rule)| (locator.clone(), rule.clone()))
        });

        let reply = QueryReply {
            mock_response: hit.as_ref().map(|(_, rule)| rule.clone()),
        };
        if let Err(e) = self.to_agent.send(Envelope::reply(id, &reply)).await {
            warn!("Failed to answer query {}: {}", id, e);
            return;
        }

        let (Some(entry), Some((locator, rule))) = (entry, hit) else {
            return;
        };
        let Some(log_id) = entry.id else {
            return;
        };

        if rule.active {
            debug!("Query {} served by {}", id, locator);
            let mut served = entry.with_response(rule.status, Some(rule.response.clone()));
            served.is_mocked = Some(true);
            served.mock_path = Some(locator);
            self.to_panel_log(&served).await;
        } else {
            self.remember(log_id, locator);
        }
    }

    fn remember(&mut self, log_id: u64, locator: Locator) {
        self.query_hits.insert(log_id, locator);
        while self.query_hits.len() > self.config.max_tracked_queries {
            self.query_hits.pop_first();
        }
    }

    async fn to_panel_log(&self, entry: &RequestLog) {
        let envelope = Envelope::log(ContextTag::Relay, ContextTag::Panel, entry);
        if let Err(e) = self.to_panel.send(envelope).await {
            debug!("Panel unavailable, dropping log: {}", e);
        }
    }
}
