//! Mock Agent CLI
//!
//! Drives a page session against the real network using a JSON rule-store
//! file, and edits that file's activation flags.

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use mock_core::{
    link, page_host, ContextTag, HttpRequest, HttpResponse, InterceptConfig, JsonFileStore, MockError, Network,
    NetworkError, PageSession, PanelEvent, PanelHandle, ReqwestNetwork, RuleStoreBackend, UrlIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod logging;

#[cfg(test)]
mod config_test;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON rule-store file
    #[arg(long, default_value = "mockwire-store.json")]
    pub store: PathBuf,

    /// Path to an interception config file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Milliseconds to wait for a mock answer; 0 waits forever
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Enable or disable response body capture
    #[arg(long)]
    pub enable_body_capture: Option<bool>,

    /// Maximum captured body size in bytes
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Body read timeout in seconds
    #[arg(long)]
    pub read_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one request through a page session and print what the panel saw
    Fetch {
        /// Request URL, absolute or relative to the page
        url: String,

        #[arg(long, short = 'X', default_value = "GET")]
        method: String,

        /// Request body
        #[arg(long, short = 'd')]
        data: Option<String>,

        /// Extra header as `Name: value`; may repeat
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// Page URL the request is issued from; defaults to the URL's origin
        #[arg(long)]
        page: Option<String>,
    },
    /// Print the URL index built from the rule store
    Index,
    /// Set the interception flag for an origin
    Toggle { origin: String, state: Switch },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

/// Resolve the interception config. Precedence: CLI flag > environment
/// variable > config file > defaults.
pub fn load_intercept_config(args: &Args) -> Result<InterceptConfig, MockError> {
    load_intercept_config_with(args, |key| std::env::var(key).ok())
}

pub(crate) fn load_intercept_config_with<F>(args: &Args, env: F) -> Result<InterceptConfig, MockError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw).map_err(|e| {
                MockError::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
            })?
        }
        None => InterceptConfig::default(),
    };

    if let Some(value) = env("MOCKWIRE_QUERY_TIMEOUT_MS") {
        config.query_timeout_ms = timeout_setting(parse_env("MOCKWIRE_QUERY_TIMEOUT_MS", &value)?);
    }
    if let Some(value) = env("MOCKWIRE_BODY_CAPTURE_ENABLED") {
        config.body_capture.enabled = parse_env("MOCKWIRE_BODY_CAPTURE_ENABLED", &value)?;
    }
    if let Some(value) = env("MOCKWIRE_MAX_BODY_SIZE") {
        config.body_capture.max_body_size = parse_env("MOCKWIRE_MAX_BODY_SIZE", &value)?;
    }
    if let Some(value) = env("MOCKWIRE_READ_TIMEOUT") {
        config.body_capture.read_timeout_secs = parse_env("MOCKWIRE_READ_TIMEOUT", &value)?;
    }

    if let Some(ms) = args.query_timeout_ms {
        config.query_timeout_ms = timeout_setting(ms);
    }
    if let Some(enabled) = args.enable_body_capture {
        config.body_capture.enabled = enabled;
    }
    if let Some(size) = args.max_body_size {
        config.body_capture.max_body_size = size;
    }
    if let Some(secs) = args.read_timeout {
        config.body_capture.read_timeout_secs = secs;
    }

    if config.body_capture.max_body_size == 0 {
        return Err(MockError::Configuration("max_body_size must be greater than 0".into()));
    }
    Ok(config)
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, MockError> {
    value
        .trim()
        .parse()
        .map_err(|_| MockError::Configuration(format!("Invalid value for {}: '{}'", key, value)))
}

fn timeout_setting(ms: u64) -> Option<u64> {
    (ms > 0).then_some(ms)
}

/// Resolves page-relative URLs against the page before hitting the network,
/// the way a browser does.
pub struct PageNetwork<N> {
    base: Url,
    inner: N,
}

impl<N> PageNetwork<N> {
    pub fn new(base: Url, inner: N) -> Self {
        Self { base, inner }
    }
}

#[async_trait]
impl<N: Network> Network for PageNetwork<N> {
    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        request.url = self
            .base
            .join(&request.url)
            .map_err(|e| NetworkError::InvalidRequest(format!("{}: {}", request.url, e)))?
            .to_string();
        self.inner.send(request).await
    }
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let backend = Arc::new(JsonFileStore::new(&args.store));

    match &args.command {
        Command::Index => {
            let store = backend.load().await?;
            let index = UrlIndex::build(&store);
            println!("{}", serde_json::to_string_pretty(&index)?);
        }
        Command::Toggle { origin, state } => {
            let host = page_host(origin).unwrap_or_else(|| origin.clone());
            backend.set_active(&host, *state == Switch::On).await?;
            tracing::info!("Interception for {} set {:?}", host, state);
        }
        Command::Fetch {
            url,
            method,
            data,
            headers,
            page,
        } => {
            let config = load_intercept_config(&args)?;
            let page = page_url(url, page.as_deref())?;
            let mut request = HttpRequest::new(method.clone(), url.clone());
            for header in headers {
                let (name, value) = header
                    .split_once(':')
                    .with_context(|| format!("header '{}' is not `Name: value`", header))?;
                request = request.with_header(name.trim(), value.trim());
            }
            if let Some(body) = data {
                request = request.with_body(body.clone());
            }
            fetch(backend, page, request, config).await?;
        }
    }
    Ok(())
}

fn page_url(url: &str, page: Option<&str>) -> anyhow::Result<Url> {
    match page {
        Some(page) => Url::parse(page).with_context(|| format!("invalid page URL '{}'", page)),
        None => {
            let target = Url::parse(url).with_context(|| format!("'{}' is relative, pass --page", url))?;
            target.join("/").context("URL has no origin")
        }
    }
}

async fn fetch(
    backend: Arc<JsonFileStore>,
    page: Url,
    request: HttpRequest,
    config: InterceptConfig,
) -> anyhow::Result<()> {
    let network = Arc::new(PageNetwork::new(page.clone(), ReqwestNetwork::default()));
    let (panel_end, relay_end) = link(ContextTag::Panel, ContextTag::Relay);
    let mut panel = PanelHandle::new(panel_end);

    let session = PageSession::attach(page.as_str(), backend, network, relay_end, config).await;
    let response = session.fetch(request).await?;

    println!("HTTP {}", response.status);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    println!();
    println!("{}", response.body.into_text().await?);

    // The relay may still be forwarding the completion log.
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), panel.next_event()).await {
        events.push(event);
    }
    if let Some(metrics) = session.metrics() {
        tracing::info!("Agent metrics: {:?}", metrics);
    }
    drop(session);

    println!();
    for event in events {
        match event {
            PanelEvent::Init(init) => println!("INIT {}", serde_json::to_string(&init)?),
            PanelEvent::Log(entry) => println!("LOG  {}", serde_json::to_string(&entry)?),
        }
    }
    Ok(())
}
