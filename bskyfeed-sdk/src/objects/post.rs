//! The subset of `app.bsky.feed.post` records the feed generator reads.

use serde::{Deserialize, Serialize};

/// Collection NSID of Bluesky posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// A post record. Unknown fields (embeds, facets, langs, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    /// Client-supplied creation time, RFC3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<StrongRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<StrongRef>,
}

/// `com.atproto.repo.strongRef`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}

impl PostRecord {
    /// URI of the post this record replies to, if it is a reply with a
    /// non-empty parent.
    pub fn parent_uri(&self) -> Option<&str> {
        self.reply
            .as_ref()
            .and_then(|reply| reply.parent.as_ref())
            .map(|parent| parent.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_uri() {
        let post: PostRecord = serde_json::from_value(serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": "/subscribe",
            "createdAt": "2025-01-02T10:00:00Z",
            "langs": ["en"],
            "reply": {
                "root": { "uri": "at://did:plc:a/app.bsky.feed.post/root", "cid": "c1" },
                "parent": { "uri": "at://did:plc:a/app.bsky.feed.post/parent", "cid": "c2" }
            }
        }))
        .unwrap();

        assert_eq!(
            post.parent_uri(),
            Some("at://did:plc:a/app.bsky.feed.post/parent")
        );
        assert_eq!(post.created_at.as_deref(), Some("2025-01-02T10:00:00Z"));
    }

    #[test]
    fn test_not_a_reply() {
        let post: PostRecord = serde_json::from_str(r#"{"text":"top level"}"#).unwrap();
        assert_eq!(post.parent_uri(), None);

        let empty_parent: PostRecord =
            serde_json::from_str(r#"{"text":"x","reply":{"parent":{"uri":""}}}"#).unwrap();
        assert_eq!(empty_parent.parent_uri(), None);
    }
}
