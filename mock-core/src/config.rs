//! Configuration types and utilities

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interception configuration shared by the agent and the relay of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// How long a request waits for the relay's mock answer before passing
    /// through. `None` waits forever.
    pub query_timeout_ms: Option<u64>,
    /// Response body capture for completion logs
    pub body_capture: BodyCaptureConfig,
    /// Relay bookkeeping limits
    pub relay: RelayConfig,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: Some(5_000),
            body_capture: BodyCaptureConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl InterceptConfig {
    /// Query timeout as a `Duration`, `None` meaning unbounded
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Configuration for response body capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyCaptureConfig {
    /// When disabled, completion logs carry no body and the response is untouched
    pub enabled: bool,
    /// Bytes of body copied into a log entry; the caller always gets the full body
    pub max_body_size: usize,
    /// How long the completion log waits for the caller to finish reading a
    /// streamed body before logging the part seen so far
    pub read_timeout_secs: u64,
}

impl Default for BodyCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_size: 10 * 1024 * 1024,
            read_timeout_secs: 30,
        }
    }
}

impl BodyCaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upper bound on query hits remembered while waiting for completion logs
    pub max_tracked_queries: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_tracked_queries: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: InterceptConfig =
            serde_json::from_str(r#"{ "body_capture": { "enabled": false } }"#).unwrap();

        assert_eq!(config.query_timeout_ms, Some(5_000));
        assert!(!config.body_capture.enabled);
        assert_eq!(config.body_capture.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.relay.max_tracked_queries, 1024);
    }

    #[test]
    fn test_null_timeout_waits_forever() {
        let config: InterceptConfig =
            serde_json::from_str(r#"{ "query_timeout_ms": null }"#).unwrap();
        assert_eq!(config.query_timeout(), None);
    }
}
