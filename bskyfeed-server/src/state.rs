//! Application state shared across all request handlers.

use crate::config::runtime::FeedConfig;
use bskyfeed_core::feed::FeedReader;
use bskyfeed_core::framework::DatabaseProcessor;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (the pool and the config are
/// reference counted).
#[derive(Clone)]
pub struct AppState {
    pub store: DatabaseProcessor,
    pub feed: Arc<FeedConfig>,
    pub reader: FeedReader,
}

impl AppState {
    pub fn new(store: DatabaseProcessor, feed: FeedConfig) -> Self {
        let reader = FeedReader::new(feed.limits);
        Self {
            store,
            feed: Arc::new(feed),
            reader,
        }
    }
}
