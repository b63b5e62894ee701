//! AT-URI helpers for post records.

use crate::objects::POST_COLLECTION;
use std::fmt;
use std::str::FromStr;

const AT_SCHEME: &str = "at://";
const BSKY_APP_PROFILE: &str = "https://bsky.app/profile/";

/// Build the AT-URI of a post from its author DID and record key.
pub fn post_uri(did: &str, rkey: &str) -> String {
    format!("{AT_SCHEME}{did}/{POST_COLLECTION}/{rkey}")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtUriError {
    #[error("not an at:// or bsky.app post URI")]
    UnsupportedScheme,
    #[error("expected <did>/<collection>/<rkey>")]
    MalformedPath,
    #[error("authority must be a DID, handles are not resolved")]
    NotADid,
    #[error("URI does not point at a post record")]
    NotAPost,
}

/// A reference to a single post: `at://<did>/app.bsky.feed.post/<rkey>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostUri {
    pub did: String,
    pub rkey: String,
}

impl PostUri {
    /// Parse either an AT-URI or a `https://bsky.app/profile/<did>/post/<rkey>`
    /// web URL. Trailing slashes are tolerated.
    pub fn parse(input: &str) -> Result<Self, AtUriError> {
        let input = input.trim().trim_end_matches('/');

        let (rest, collection) = if let Some(rest) = input.strip_prefix(AT_SCHEME) {
            (rest, POST_COLLECTION)
        } else if let Some(rest) = input.strip_prefix(BSKY_APP_PROFILE) {
            (rest, "post")
        } else {
            return Err(AtUriError::UnsupportedScheme);
        };

        let mut parts = rest.split('/');
        let (Some(did), Some(kind), Some(rkey), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AtUriError::MalformedPath);
        };

        if !did.starts_with("did:") {
            return Err(AtUriError::NotADid);
        }
        if kind != collection {
            return Err(AtUriError::NotAPost);
        }
        if rkey.is_empty() {
            return Err(AtUriError::MalformedPath);
        }

        Ok(Self {
            did: did.to_string(),
            rkey: rkey.to_string(),
        })
    }
}

impl FromStr for PostUri {
    type Err = AtUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PostUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{AT_SCHEME}{}/{POST_COLLECTION}/{}", self.did, self.rkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_uri() {
        assert_eq!(
            post_uri("did:plc:r", "k2"),
            "at://did:plc:r/app.bsky.feed.post/k2"
        );
    }

    #[test]
    fn test_parse_at_uri() {
        let uri = PostUri::parse("at://did:plc:abc/app.bsky.feed.post/3kabc").unwrap();
        assert_eq!(uri.did, "did:plc:abc");
        assert_eq!(uri.rkey, "3kabc");
        assert_eq!(uri.to_string(), "at://did:plc:abc/app.bsky.feed.post/3kabc");
    }

    #[test]
    fn test_parse_web_url() {
        let uri: PostUri = "https://bsky.app/profile/did:plc:abc/post/3kabc/"
            .parse()
            .unwrap();
        assert_eq!(uri.to_string(), "at://did:plc:abc/app.bsky.feed.post/3kabc");
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(
            PostUri::parse("https://example.com/x"),
            Err(AtUriError::UnsupportedScheme)
        );
        assert_eq!(
            PostUri::parse("https://bsky.app/profile/alice.bsky.social/post/3kabc"),
            Err(AtUriError::NotADid)
        );
        assert_eq!(
            PostUri::parse("at://did:plc:abc/app.bsky.feed.like/3kabc"),
            Err(AtUriError::NotAPost)
        );
        assert_eq!(
            PostUri::parse("at://did:plc:abc/app.bsky.feed.post"),
            Err(AtUriError::MalformedPath)
        );
    }
}
