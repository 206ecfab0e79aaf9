//! In-page interception agent.
//!
//! Every outgoing request goes through [`InterceptAgent::fetch`]:
//!
//! `STARTED -> QUERY_SENT -> QUERY_ANSWERED -> {MOCKED | PASSED_THROUGH} -> COMPLETED`
//!
//! A mocked request never touches the network and skips the completion log.
//! A passed-through response is returned as soon as its head arrives; the
//! completion log is sent once the caller has read the body.
//! Anything that goes wrong inside the agent degrades to pass-through; only the
//! network's own error ever reaches the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::body::ResponseBody;
use crate::bus::MessageBus;
use crate::config::InterceptConfig;
use crate::envelope::{ContextTag, Envelope, QueryReply};
use crate::error::NetworkError;
use crate::id::IdFactory;
use crate::model::{MockRule, RequestLog};
use crate::network::{HttpRequest, HttpResponse, Network};
use crate::transport::{Inbox, Transport};

pub const MOCK_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Counters for intercepted traffic
#[derive(Debug, Default)]
pub struct AgentMetrics {
    pub total_requests: AtomicU64,
    pub mocked_requests: AtomicU64,
    pub passed_through: AtomicU64,
    pub query_timeouts: AtomicU64,
    pub body_capture_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub mocked_requests: u64,
    pub passed_through: u64,
    pub query_timeouts: u64,
    pub body_capture_failures: u64,
}

impl AgentMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            mocked_requests: self.mocked_requests.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            query_timeouts: self.query_timeouts.load(Ordering::Relaxed),
            body_capture_failures: self.body_capture_failures.load(Ordering::Relaxed),
        }
    }
}

enum Decision {
    Mock(MockRule),
    PassThrough,
}

#[derive(Clone)]
pub struct InterceptAgent {
    network: Arc<dyn Network>,
    transport: Arc<dyn Transport>,
    bus: MessageBus,
    message_ids: Arc<IdFactory>,
    log_ids: Arc<IdFactory>,
    config: InterceptConfig,
    metrics: Arc<AgentMetrics>,
}

impl InterceptAgent {
    pub fn new(network: Arc<dyn Network>, transport: Arc<dyn Transport>, config: InterceptConfig) -> Self {
        Self {
            network,
            transport,
            bus: MessageBus::new(),
            message_ids: Arc::new(IdFactory::new()),
            log_ids: Arc::new(IdFactory::new()),
            config,
            metrics: Arc::new(AgentMetrics::default()),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Queries still waiting for the relay
    pub fn pending_queries(&self) -> usize {
        self.bus.pending_count()
    }

    /// Route an inbound envelope to the query waiting on its id.
    pub fn dispatch(&self, envelope: Envelope) {
        if envelope.to != ContextTag::Agent {
            return;
        }
        match envelope.id {
            Some(id) => {
                self.bus.resolve(id, envelope.message);
            }
            None => debug!("Agent ignoring uncorrelated {:?} frame", envelope.kind),
        }
    }

    /// Drain `inbox` until the relay side goes away.
    pub async fn listen(self, mut inbox: Inbox) {
        while let Some(envelope) = inbox.recv().await {
            self.dispatch(envelope);
        }
        debug!("Agent inbox closed");
    }

    /// Issue `request` through the interception layer.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let log_id = self.log_ids.next_id();
        let method = request.method.to_ascii_uppercase();
        let entry = RequestLog::pending(log_id, &method, &request.url, request.body.clone());
        info!("Request [{}] {} {}", log_id, method, request.url);

        self.post(Envelope::log(ContextTag::Agent, ContextTag::Relay, &entry)).await;

        let asked_at = Instant::now();
        if let Decision::Mock(rule) = self.ask_relay(&entry).await {
            self.metrics.mocked_requests.fetch_add(1, Ordering::Relaxed);
            if rule.delay > 0 {
                debug!("Request [{}] holding mock for {} ms", log_id, rule.delay);
                sleep_until(asked_at + Duration::from_millis(rule.delay)).await;
            }
            info!("Request [{}] answered by mock with status {}", log_id, rule.status);
            return Ok(mock_response(&rule));
        }

        self.metrics.passed_through.fetch_add(1, Ordering::Relaxed);
        let mut response = self.network.send(request).await?;
        self.complete(entry, &mut response);
        Ok(response)
    }

    async fn ask_relay(&self, entry: &RequestLog) -> Decision {
        let id = self.message_ids.next_id();
        let answer = self.bus.register(id);

        if let Err(e) = self.transport.send(Envelope::query(id, entry)).await {
            warn!("Could not send mock query {}: {}", id, e);
            self.bus.abandon(id);
            return Decision::PassThrough;
        }

        let payload = match self.config.query_timeout() {
            Some(limit) => match timeout(limit, answer).await {
                Ok(payload) => payload,
                Err(_) => {
                    self.bus.abandon(id);
                    self.metrics.query_timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!("Mock query {} unanswered after {:?}, passing through", id, limit);
                    return Decision::PassThrough;
                }
            },
            None => answer.await,
        };

        let Ok(payload) = payload else {
            debug!("Mock query {} was dropped, passing through", id);
            return Decision::PassThrough;
        };

        match serde_json::from_value::<QueryReply>(payload) {
            Ok(QueryReply {
                mock_response: Some(rule),
            }) if rule.active => Decision::Mock(rule),
            Ok(QueryReply {
                mock_response: Some(rule),
            }) => {
                debug!("Rule {} matched but is inactive", rule.id);
                Decision::PassThrough
            }
            Ok(_) => Decision::PassThrough,
            Err(e) => {
                debug!("Malformed answer to mock query {}: {}", id, e);
                Decision::PassThrough
            }
        }
    }

    /// Send the completion log once the body has been read. The response goes
    /// back to the caller untouched and at once; the log follows from a
    /// background task.
    fn complete(&self, entry: RequestLog, response: &mut HttpResponse) {
        let log_id = entry.id.unwrap_or_default();
        let status = response.status;
        info!("Response [{}] status: {}", log_id, status);

        let capture_config = self.config.body_capture.clone();
        let capture = capture_config
            .enabled
            .then(|| response.body.tee(capture_config.max_body_size));

        let agent = self.clone();
        tokio::spawn(async move {
            let entry = match capture {
                Some(capture) => match capture.finish(capture_config.read_timeout()).await {
                    Ok(body) => entry.with_response(status, body),
                    Err(e) => {
                        agent.metrics.body_capture_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("Failed to capture response body for [{}]: {}", log_id, e);
                        entry.with_response(0, None)
                    }
                },
                None => entry.with_response(status, None),
            };
            agent.post(Envelope::log(ContextTag::Agent, ContextTag::Relay, &entry)).await;
        });
    }

    /// Fire-and-forget delivery to the relay.
    async fn post(&self, envelope: Envelope) {
        if let Err(e) = self.transport.send(envelope).await {
            warn!("Failed to deliver log to relay: {}", e);
        }
    }
}

/// The response a matching rule stands in for.
pub fn mock_response(rule: &MockRule) -> HttpResponse {
    HttpResponse {
        status: rule.status,
        headers: vec![("content-type".to_string(), MOCK_CONTENT_TYPE.to_string())],
        body: ResponseBody::Text(rule.response.clone()),
    }
}
