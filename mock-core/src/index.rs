//! URL index: maps `url -> method -> locator` over a rule store snapshot.
//!
//! The index is derived and disposable. It is rebuilt from scratch whenever
//! the store changes and is never persisted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{MockRule, RuleStore};

/// Position of a rule inside a [`RuleStore`], written as `mocks[3]` or
/// `<collection>.mocks[3]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Root { index: usize },
    Collection { name: String, index: usize },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Root { index } => write!(f, "mocks[{}]", index),
            Locator::Collection { name, index } => write!(f, "{}.mocks[{}]", name, index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid rule locator `{0}`")]
pub struct LocatorParseError(String);

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LocatorParseError(s.to_string());

        let (prefix, index) = s
            .strip_suffix(']')
            .and_then(|rest| rest.rsplit_once("mocks["))
            .ok_or_else(invalid)?;
        let index: usize = index.parse().map_err(|_| invalid())?;

        if prefix.is_empty() {
            return Ok(Locator::Root { index });
        }
        // Any collection name is valid, including the empty one.
        match prefix.strip_suffix('.') {
            Some(name) => Ok(Locator::Collection {
                name: name.to_string(),
                index,
            }),
            None => Err(invalid()),
        }
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `url -> method -> locator`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UrlIndex {
    urls: HashMap<String, HashMap<String, Locator>>,
}

impl UrlIndex {
    /// Index every rule of `store`, top-level list first, then each collection
    /// in the order it was stored. A later rule with the same `(url, method)` replaces the
    /// earlier one.
    pub fn build(store: &RuleStore) -> Self {
        let mut index = UrlIndex::default();

        for (position, rule) in store.mocks.iter().enumerate() {
            index.insert(rule, Locator::Root { index: position });
        }

        for (name, collection) in &store.collections {
            for (position, rule) in collection.mocks.iter().enumerate() {
                index.insert(
                    rule,
                    Locator::Collection {
                        name: name.clone(),
                        index: position,
                    },
                );
            }
        }

        index
    }

    fn insert(&mut self, rule: &MockRule, locator: Locator) {
        self.urls
            .entry(rule.url.clone())
            .or_default()
            .insert(rule.method.clone(), locator);
    }

    pub fn lookup(&self, url: &str, method: &str) -> Option<&Locator> {
        self.urls.get(url).and_then(|methods| methods.get(method))
    }

    /// Number of distinct `(url, method)` pairs
    pub fn len(&self) -> usize {
        self.urls.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
