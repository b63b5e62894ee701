//! TOML file configuration structures.
//!
//! These structs directly map to the `bskyfeed.toml` file format.

use bskyfeed_core::feed::{DEFAULT_LIMIT, MAX_LIMIT};
use bskyfeed_core::processors::consumer::DEFAULT_JETSTREAM_ENDPOINT;
use bskyfeed_core::processors::event_handler::DEFAULT_SUBSCRIBE_MARKER;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub firehose: FirehoseConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Feed generator identity and paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Public host name the service is reachable at, without scheme.
    pub host: String,
    /// DID that publishes the feed generator records. Defaults to
    /// `did:web:<host>`.
    #[serde(default)]
    pub did_base: Option<String>,
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "max_limit")]
    pub max_limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

fn max_limit() -> i64 {
    MAX_LIMIT
}

/// Jetstream ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_marker")]
    pub subscribe_marker: String,
    /// DIDs allowed to subscribe and unsubscribe. Absent or `["*"]` means
    /// anyone.
    #[serde(default)]
    pub allowed_subscribers: Option<Vec<String>>,
    /// How far back the first connection starts reading, in seconds.
    #[serde(default = "default_cursor_margin_secs")]
    pub cursor_margin_secs: u64,
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            subscribe_marker: default_marker(),
            allowed_subscribers: None,
            cursor_margin_secs: default_cursor_margin_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    DEFAULT_JETSTREAM_ENDPOINT.to_string()
}

fn default_marker() -> String {
    DEFAULT_SUBSCRIBE_MARKER.to_string()
}

fn default_cursor_margin_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `database.db`. Created if missing.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
