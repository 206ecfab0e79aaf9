//! Log entries, mock rules and the persisted rule store document.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::index::Locator;

/// One observed network call, first sent without a response and later updated
/// in place (same `id`) once the response is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub request: LoggedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<LoggedResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_path: Option<Locator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedRequest {
    /// URL with the query string stripped
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// JSON-encoded query parameters, present only when the URL had a `?`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl RequestLog {
    /// Pending entry for a request that has not produced a response yet.
    pub fn pending(id: u64, method: &str, raw_url: &str, body: Option<String>) -> Self {
        let (url, query_params) = split_url(raw_url);
        Self {
            id: Some(id),
            request: LoggedRequest {
                url,
                method: method.to_string(),
                body,
                query_params,
            },
            response: None,
            is_mocked: None,
            mock_path: None,
        }
    }

    pub fn with_response(mut self, status: u16, body: Option<String>) -> Self {
        self.response = Some(LoggedResponse {
            status,
            response: body,
        });
        self
    }

    pub fn is_complete(&self) -> bool {
        self.response.is_some()
    }
}

/// Split `raw` at the first `?` into the lookup URL and the JSON-encoded
/// query parameters.
pub fn split_url(raw: &str) -> (String, Option<String>) {
    match raw.split_once('?') {
        Some((url, query)) => {
            let params = parse_query(query);
            // A map of strings, nulls and arrays always serialises.
            let encoded = serde_json::to_string(&params).unwrap_or_else(|_| "{}".to_string());
            (url.to_string(), Some(encoded))
        }
        None => (raw.to_string(), None),
    }
}

/// Decode a query string into sorted parameters. Repeated keys collect into an
/// array and a key with no `=` maps to `null`.
pub fn parse_query(query: &str) -> BTreeMap<String, Value> {
    let query = query.trim_start_matches('?');
    let query = query.split('#').next().unwrap_or_default();

    let mut params: BTreeMap<String, Value> = BTreeMap::new();
    for segment in query.split('&').filter(|s| !s.is_empty()) {
        let Some((key, value)) = url::form_urlencoded::parse(segment.as_bytes()).next() else {
            continue;
        };
        let value = if segment.contains('=') {
            Value::String(value.into_owned())
        } else {
            Value::Null
        };

        match params.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    params
}

/// One substitution directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRule {
    pub id: u64,
    pub url: String,
    pub method: String,
    pub status: u16,
    /// Literal body text
    #[serde(default)]
    pub response: String,
    /// Milliseconds to wait before delivering the substituted response
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_on: Option<DateTime<Utc>>,
}

/// Named group of rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub mocks: Vec<MockRule>,
}

/// Root persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStore {
    /// Next rule id to hand out
    pub id: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub mocks: Vec<MockRule>,
    /// Kept in document order; later collections win on duplicate pairs.
    #[serde(default)]
    pub collections: IndexMap<String, Collection>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self {
            id: 1,
            active: false,
            mocks: Vec::new(),
            collections: IndexMap::new(),
        }
    }
}

impl RuleStore {
    /// Dereference a locator produced by the index builder.
    pub fn resolve(&self, locator: &Locator) -> Option<&MockRule> {
        match locator {
            Locator::Root { index } => self.mocks.get(*index),
            Locator::Collection { name, index } => self
                .collections
                .get(name)
                .and_then(|collection| collection.mocks.get(*index)),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.mocks.len()
            + self
                .collections
                .values()
                .map(|collection| collection.mocks.len())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_url_without_query() {
        assert_eq!(split_url("/api/users"), ("/api/users".to_string(), None));
    }

    #[test]
    fn test_split_url_encodes_sorted_params() {
        let (url, params) = split_url("https://example.com/api/users?z=1&a=two%20words");
        assert_eq!(url, "https://example.com/api/users");
        assert_eq!(params.as_deref(), Some(r#"{"a":"two words","z":"1"}"#));
    }

    #[test]
    fn test_parse_query_repeated_and_bare_keys() {
        let params = parse_query("?tag=a&tag=b&tag=c&flag&q=x+y#section");
        assert_eq!(params["tag"], json!(["a", "b", "c"]));
        assert_eq!(params["flag"], Value::Null);
        assert_eq!(params["q"], json!("x y"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_query_still_reports_params() {
        let (url, params) = split_url("/a?");
        assert_eq!(url, "/a");
        assert_eq!(params.as_deref(), Some("{}"));
    }

    #[test]
    fn test_log_wire_shape() {
        let log = RequestLog::pending(4, "GET", "/api/users?x=1", None).with_response(200, Some("[]".into()));
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 4,
                "request": { "url": "/api/users", "method": "GET", "queryParams": "{\"x\":\"1\"}" },
                "response": { "status": 200, "response": "[]" }
            })
        );
    }

    #[test]
    fn test_store_document_defaults() {
        let store: RuleStore = serde_json::from_str(r#"{ "id": 3 }"#).unwrap();
        assert_eq!(store.id, 3);
        assert!(store.mocks.is_empty());
        assert!(store.collections.is_empty());
        assert_eq!(RuleStore::default().id, 1);
    }

    #[test]
    fn test_collections_keep_document_order() {
        let text = r#"{ "id": 1, "collections": { "zeta": {}, "alpha": {}, "mid": {} } }"#;
        let store: RuleStore = serde_json::from_str(text).unwrap();
        assert_eq!(store.collections.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);

        let saved = serde_json::to_string(&store).unwrap();
        let reloaded: RuleStore = serde_json::from_str(&saved).unwrap();
        assert_eq!(reloaded.collections.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_rule_parses_persisted_document() {
        let rule: MockRule = serde_json::from_value(json!({
            "id": 2,
            "url": "/api/users",
            "method": "GET",
            "status": 200,
            "response": "[]",
            "delay": 0,
            "active": true,
            "createdOn": 1_600_000_000_000i64
        }))
        .unwrap();
        assert!(rule.active);
        assert_eq!(rule.created_on.map(|t| t.timestamp()), Some(1_600_000_000));
    }
}
