use tracing::{debug, warn};
use url::Url;

use crate::store::RuleStoreBackend;

/// Host (with port) that activation flags are keyed by, e.g. `localhost:3000`.
pub fn page_host(page_url: &str) -> Option<String> {
    let parsed = Url::parse(page_url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Whether interception should be installed for a page load.
///
/// The persisted per-host flag wins. Without one, pages served from
/// `http://localhost` are intercepted and everything else is not. A store
/// that cannot be read leaves the page alone.
pub async fn should_intercept(backend: &dyn RuleStoreBackend, page_url: &str) -> bool {
    let host = page_host(page_url).unwrap_or_default();
    let flag = match backend.is_active(&host).await {
        Ok(flag) => flag,
        Err(e) => {
            warn!("Could not read activation flag for {}: {}", host, e);
            return false;
        }
    };

    let active = flag.unwrap_or_else(|| page_url.starts_with("http://localhost"));
    debug!("Interception for {} is {}", host, if active { "on" } else { "off" });
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_page_host_keeps_port() {
        assert_eq!(page_host("http://localhost:3000/app").as_deref(), Some("localhost:3000"));
        assert_eq!(page_host("https://example.com/").as_deref(), Some("example.com"));
        assert_eq!(page_host("not a url"), None);
    }

    #[tokio::test]
    async fn test_localhost_defaults_on() {
        let backend = MemoryStore::new();
        assert!(should_intercept(&backend, "http://localhost:8080/").await);
        assert!(!should_intercept(&backend, "https://example.com/").await);
    }

    #[tokio::test]
    async fn test_persisted_flag_wins() {
        let backend = MemoryStore::new();
        backend.set_active("localhost:8080", false).await.unwrap();
        backend.set_active("example.com", true).await.unwrap();

        assert!(!should_intercept(&backend, "http://localhost:8080/").await);
        assert!(should_intercept(&backend, "https://example.com/page").await);
    }
}
