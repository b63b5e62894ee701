//! Subscription and bookmark API request and response types.

use serde::{Deserialize, Serialize};

/// A subscription owned by the calling user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: i64,
    pub subscribed_post_uri: String,
    pub subscription_post_rkey: String,
}

/// A bookmark owned by the calling user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkResponse {
    pub id: i64,
    pub post_rkey: String,
    pub post_uri: String,
    pub author_did: String,
    pub content: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Body of `POST /api/bookmarks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBookmark {
    /// AT-URI of the post, or its `bsky.app` web URL.
    pub uri: String,
    /// Preview text shown in listings.
    #[serde(default)]
    pub content: Option<String>,
}
