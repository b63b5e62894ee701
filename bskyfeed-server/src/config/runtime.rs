//! Validated configuration the server runs with.

use bskyfeed_core::feed::{FeedKind, FeedLimits};
use bskyfeed_core::processors::{ConsumerConfig, HandlerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub server: ServerConfig,
    pub feed: FeedConfig,
    /// `None` when ingestion is disabled.
    pub firehose: Option<FirehoseConfig>,
    pub store: StoreConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub host: String,
    pub did_base: String,
    pub limits: FeedLimits,
}

impl FeedConfig {
    /// `did:web` identity of this service.
    pub fn service_did(&self) -> String {
        format!("did:web:{}", self.host)
    }

    /// AT-URI of a feed generator record.
    pub fn feed_uri(&self, kind: FeedKind) -> String {
        format!(
            "at://{}/app.bsky.feed.generator/{}",
            self.did_base,
            kind.rkey()
        )
    }
}

#[derive(Debug, Clone)]
pub struct FirehoseConfig {
    pub endpoint: Url,
    pub handler: HandlerConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}
