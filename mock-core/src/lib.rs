//! Mock Core Library
//!
//! Request interception for a page: an in-page agent that consults a
//! privileged relay for mock rules before each request, and a panel feed
//! that shows every request with its eventual response.

pub mod activation;
pub mod agent;
pub mod body;
pub mod bus;
pub mod envelope;
pub mod id;
pub mod index;
pub mod model;
pub mod network;
pub mod page;
pub mod panel;
pub mod relay;
pub mod store;
pub mod transport;

/// Configuration types and utilities
pub mod config;

/// Error types for interception operations
pub mod error;

pub use activation::{page_host, should_intercept};
pub use agent::{mock_response, AgentMetrics, InterceptAgent, MetricsSnapshot, MOCK_CONTENT_TYPE};
pub use body::ResponseBody;
pub use bus::MessageBus;
pub use config::{BodyCaptureConfig, InterceptConfig, RelayConfig};
pub use envelope::{ContextTag, Envelope, MessageType, PageInit, QueryReply};
pub use error::{BodyCaptureError, MockError, NetworkError, StoreError, TransportError};
pub use id::IdFactory;
pub use index::{Locator, UrlIndex};
pub use model::{Collection, LoggedRequest, LoggedResponse, MockRule, RequestLog, RuleStore};
pub use network::{HttpRequest, HttpResponse, Network, ReqwestNetwork};
pub use page::PageSession;
pub use panel::{LogLedger, PanelEvent, PanelHandle};
pub use relay::{Relay, RelayCache};
pub use store::{JsonFileStore, MemoryStore, RuleStoreBackend, StorageDocument};
pub use transport::{link, ChannelTransport, Endpoint, Inbox, Transport};

/// Result type alias for interception operations
pub type Result<T> = std::result::Result<T, MockError>;
