//! Feed generator XRPC request and response types.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// app.bsky.feed.getFeedSkeleton
// ---------------------------------------------------------------------------

/// Query parameters of `app.bsky.feed.getFeedSkeleton`.
///
/// `limit` and `cursor` are kept as raw strings: invalid values are not a
/// request error, they fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedSkeletonQuery {
    pub feed: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

/// Response of `app.bsky.feed.getFeedSkeleton`.
///
/// An empty `cursor` means there are no further pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSkeletonResponse {
    pub cursor: String,
    pub feed: Vec<SkeletonFeedPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonFeedPost {
    pub post: String,
    pub feed_context: String,
}

// ---------------------------------------------------------------------------
// app.bsky.feed.describeFeedGenerator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeFeedGeneratorResponse {
    pub did: String,
    pub feeds: Vec<FeedDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescription {
    pub uri: String,
}

// ---------------------------------------------------------------------------
// /.well-known/did.json
// ---------------------------------------------------------------------------

/// The `did:web` document advertising the feed generator service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub service: Vec<DidService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidService {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
}

impl DidDocument {
    /// Build the document for a feed generator hosted at `host`.
    pub fn feed_generator(host: &str) -> Self {
        Self {
            context: vec!["https://www.w3.org/ns/did/v1".to_string()],
            id: format!("did:web:{host}"),
            service: vec![DidService {
                id: "#bsky_fg".to_string(),
                service_type: "BskyFeedGenerator".to_string(),
                service_endpoint: format!("https://{host}"),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_serializes_camel_case() {
        let response = FeedSkeletonResponse {
            cursor: String::new(),
            feed: vec![SkeletonFeedPost {
                post: "at://did:plc:r/app.bsky.feed.post/k2".to_string(),
                feed_context: "at://did:plc:a/app.bsky.feed.post/p".to_string(),
            }],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["cursor"], "");
        assert_eq!(json["feed"][0]["post"], "at://did:plc:r/app.bsky.feed.post/k2");
        assert_eq!(
            json["feed"][0]["feedContext"],
            "at://did:plc:a/app.bsky.feed.post/p"
        );
    }

    #[test]
    fn test_did_document() {
        let json = serde_json::to_value(DidDocument::feed_generator("feeds.example.com")).unwrap();
        assert_eq!(json["@context"][0], "https://www.w3.org/ns/did/v1");
        assert_eq!(json["id"], "did:web:feeds.example.com");
        assert_eq!(json["service"][0]["type"], "BskyFeedGenerator");
        assert_eq!(
            json["service"][0]["serviceEndpoint"],
            "https://feeds.example.com"
        );
    }
}
