//! One page load: decides whether to intercept, then wires agent and relay.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::activation::{page_host, should_intercept};
use crate::agent::{InterceptAgent, MetricsSnapshot};
use crate::config::InterceptConfig;
use crate::envelope::{ContextTag, Envelope};
use crate::error::NetworkError;
use crate::network::{HttpRequest, HttpResponse, Network};
use crate::relay::Relay;
use crate::store::RuleStoreBackend;
use crate::transport::{link, Endpoint, Transport};

pub struct PageSession {
    host: String,
    network: Arc<dyn Network>,
    agent: Option<InterceptAgent>,
    tasks: Vec<JoinHandle<()>>,
}

impl PageSession {
    /// Attach to a page at `page_url`. `panel` is the relay's end of the
    /// panel link; the panel always receives `INIT` with the page host, even
    /// when interception stays off.
    pub async fn attach(
        page_url: &str,
        backend: Arc<dyn RuleStoreBackend>,
        network: Arc<dyn Network>,
        panel: Endpoint,
        config: InterceptConfig,
    ) -> Self {
        let host = page_host(page_url).unwrap_or_default();
        if let Err(e) = panel.transport.send(Envelope::init(&host)).await {
            warn!("Panel unavailable for {}: {}", host, e);
        }

        if !should_intercept(&*backend, page_url).await {
            info!("Interception off for {}", host);
            return Self {
                host,
                network,
                agent: None,
                tasks: Vec::new(),
            };
        }

        let (agent_end, relay_end) = link(ContextTag::Agent, ContextTag::Relay);
        let mut relay = Relay::new(
            backend,
            Arc::new(relay_end.transport),
            Arc::new(panel.transport),
            config.relay.clone(),
        );
        if let Err(e) = relay.activate().await {
            warn!("Could not load rule store for {}, starting empty: {}", host, e);
        }

        let agent = InterceptAgent::new(network.clone(), Arc::new(agent_end.transport), config);
        let tasks = vec![
            tokio::spawn(relay.run(relay_end.inbox, panel.inbox)),
            tokio::spawn(agent.clone().listen(agent_end.inbox)),
        ];

        info!("Interception on for {}", host);
        Self {
            host,
            network,
            agent: Some(agent),
            tasks,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_intercepting(&self) -> bool {
        self.agent.is_some()
    }

    /// The page's own request call, intercepted when active.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        match &self.agent {
            Some(agent) => agent.fetch(request).await,
            None => self.network.send(request).await,
        }
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.agent.as_ref().map(InterceptAgent::metrics)
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
