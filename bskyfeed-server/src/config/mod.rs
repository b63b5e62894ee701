//! Configuration module for bskyfeed-server.
//!
//! Handles loading configuration from the TOML file and applying CLI and
//! environment overrides.

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, FirehoseConfig as FileFirehoseConfig};
use crate::config::runtime::{FeedConfig, FirehoseConfig, RuntimeConfig, ServerConfig, StoreConfig};
use bskyfeed_core::feed::FeedLimits;
use bskyfeed_core::processors::{AllowList, ConsumerConfig, HandlerConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid firehose endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
    data_dir_override: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        data_dir_override: Option<PathBuf>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            data_dir_override,
        }
    }

    /// Read the TOML file, apply overrides, validate and build.
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<RuntimeConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(data_dir) = &self.data_dir_override {
            file_config.store.data_dir = data_dir.clone();
        }

        validate(&file_config)?;
        build_runtime_config(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let host = config.feed.host.trim();
    if host.is_empty() || host.contains("://") || host.contains('/') {
        return Err(ConfigError::ValidationError(format!(
            "feed.host must be a bare host name, got {:?}",
            config.feed.host
        )));
    }
    if let Some(did_base) = config
        .feed
        .did_base
        .as_ref()
        .filter(|did| !did.starts_with("did:"))
    {
        return Err(ConfigError::ValidationError(format!(
            "feed.did_base must be a DID, got {did_base:?}"
        )));
    }
    if config.feed.max_limit < 1 {
        return Err(ConfigError::ValidationError(
            "feed.max_limit must be at least 1".to_string(),
        ));
    }
    if !(1..=config.feed.max_limit).contains(&config.feed.default_limit) {
        return Err(ConfigError::ValidationError(format!(
            "feed.default_limit must be between 1 and {}",
            config.feed.max_limit
        )));
    }
    if config.firehose.subscribe_marker.is_empty() {
        return Err(ConfigError::ValidationError(
            "firehose.subscribe_marker must not be empty".to_string(),
        ));
    }
    for entry in config.firehose.allowed_subscribers.iter().flatten() {
        if entry != "*" && !entry.starts_with("did:") {
            return Err(ConfigError::ValidationError(format!(
                "firehose.allowed_subscribers entry {entry:?} is not a DID"
            )));
        }
    }
    Ok(())
}

fn build_runtime_config(file_config: FileConfig) -> Result<RuntimeConfig, ConfigError> {
    let host = file_config.feed.host.trim().to_string();
    let did_base = file_config
        .feed
        .did_base
        .unwrap_or_else(|| format!("did:web:{host}"));

    let firehose = if file_config.firehose.enabled {
        Some(convert_firehose(file_config.firehose)?)
    } else {
        None
    };

    Ok(RuntimeConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        feed: FeedConfig {
            host,
            did_base,
            limits: FeedLimits {
                default_limit: file_config.feed.default_limit,
                max_limit: file_config.feed.max_limit,
            },
        },
        firehose,
        store: StoreConfig {
            data_dir: file_config.store.data_dir,
        },
    })
}

fn convert_firehose(f: FileFirehoseConfig) -> Result<FirehoseConfig, ConfigError> {
    let allow_list = match f.allowed_subscribers {
        Some(entries) => AllowList::from_entries(entries),
        None => AllowList::Anyone,
    };
    Ok(FirehoseConfig {
        endpoint: Url::parse(&f.endpoint)?,
        handler: HandlerConfig {
            allow_list,
            subscribe_marker: f.subscribe_marker,
        },
        consumer: ConsumerConfig {
            cursor_margin: Duration::from_secs(f.cursor_margin_secs),
            ..ConsumerConfig::default()
        },
    })
}
