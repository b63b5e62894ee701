//! Read side: turns stored rows into cursor-paginated feed skeletons.
//!
//! The cursor is the `created_at` (unix milliseconds) of the last item of the
//! previous page and is used as an exclusive upper bound. A page only carries
//! a cursor when it is full, so a feed whose length is an exact multiple of
//! the limit ends with one extra, empty page.

use crate::store::{BookmarkStore, StoreError, SubscriptionStore};
use bskyfeed_sdk::objects::{FeedSkeletonResponse, SkeletonFeedPost};
use thiserror::Error;

/// Upper bound used when the client sends no usable cursor.
pub const CURSOR_SENTINEL: i64 = 9_999_999_999_999;
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Replies to posts the user subscribed to.
    Replies,
    Bookmarks,
    /// Replies to posts the user bookmarked.
    BookmarkReplies,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [
        FeedKind::Replies,
        FeedKind::Bookmarks,
        FeedKind::BookmarkReplies,
    ];

    /// Record key of the feed generator record.
    pub fn rkey(self) -> &'static str {
        match self {
            FeedKind::Replies => "reply-subscriptions",
            FeedKind::Bookmarks => "bookmarks",
            FeedKind::BookmarkReplies => "bookmark-replies",
        }
    }

    /// Select a feed by the last path segment of its AT-URI.
    pub fn from_feed_uri(feed_uri: &str) -> Option<Self> {
        let name = feed_uri.rsplit('/').next()?;
        Self::ALL.into_iter().find(|kind| kind.rkey() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl FeedLimits {
    /// Absent or unparseable gives the default; anything else is clamped to
    /// `1..=max_limit`.
    pub fn parse_limit(&self, raw: Option<&str>) -> i64 {
        match raw.and_then(|raw| raw.trim().parse::<i64>().ok()) {
            Some(limit) => limit.clamp(1, self.max_limit),
            None => self.default_limit,
        }
    }
}

/// Empty, unparseable and non-positive cursors start from the top.
pub fn parse_cursor(raw: Option<&str>) -> i64 {
    raw.and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|cursor| *cursor > 0)
        .unwrap_or(CURSOR_SENTINEL)
}

fn page_cursor(last_created_at: Option<i64>, page_len: usize, limit: i64) -> String {
    match last_created_at {
        Some(created_at) if limit > 0 && i64::try_from(page_len) == Ok(limit) => {
            created_at.to_string()
        }
        _ => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown feed: {0}")]
    UnknownFeed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedReader {
    limits: FeedLimits,
}

impl FeedReader {
    pub fn new(limits: FeedLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> FeedLimits {
        self.limits
    }

    /// One page of `feed_uri` for `user_did`.
    pub async fn skeleton<S>(
        &self,
        store: &S,
        user_did: &str,
        feed_uri: &str,
        cursor: Option<&str>,
        limit: Option<&str>,
    ) -> Result<FeedSkeletonResponse, FeedError>
    where
        S: SubscriptionStore + BookmarkStore + ?Sized,
    {
        let kind = FeedKind::from_feed_uri(feed_uri)
            .ok_or_else(|| FeedError::UnknownFeed(feed_uri.to_string()))?;
        let limit = self.limits.parse_limit(limit);
        let cursor = parse_cursor(cursor);

        let (items, last_created_at) = match kind {
            FeedKind::Replies => {
                let rows = store.get_user_feed(user_did, cursor, limit).await?;
                let last = rows.last().map(|row| row.created_at);
                let items: Vec<_> = rows
                    .into_iter()
                    .map(|row| SkeletonFeedPost {
                        post: row.reply_uri,
                        feed_context: row.subscribed_post_uri,
                    })
                    .collect();
                (items, last)
            }
            FeedKind::Bookmarks => {
                let rows = store.get_bookmarks_page(user_did, cursor, limit).await?;
                let last = rows.last().map(|row| row.created_at);
                let items: Vec<_> = rows
                    .into_iter()
                    .map(|row| SkeletonFeedPost {
                        post: row.post_uri,
                        feed_context: String::new(),
                    })
                    .collect();
                (items, last)
            }
            FeedKind::BookmarkReplies => {
                let rows = store.get_bookmark_replies(user_did, cursor, limit).await?;
                let last = rows.last().map(|row| row.created_at);
                let items: Vec<_> = rows
                    .into_iter()
                    .map(|row| SkeletonFeedPost {
                        post: row.reply_uri,
                        feed_context: row.bookmarked_post_uri,
                    })
                    .collect();
                (items, last)
            }
        };

        Ok(FeedSkeletonResponse {
            cursor: page_cursor(last_created_at, items.len(), limit),
            feed: items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BookmarkInsert, BookmarkReplyInsert, FeedPostInsert};
    use crate::framework::DatabaseProcessor;

    const REPLIES: &str = "at://did:plc:gen/app.bsky.feed.generator/reply-subscriptions";
    const BOOKMARKS: &str = "at://did:plc:gen/app.bsky.feed.generator/bookmarks";
    const BOOKMARK_REPLIES: &str = "at://did:plc:gen/app.bsky.feed.generator/bookmark-replies";

    async fn seeded(rows: i64) -> DatabaseProcessor {
        let db = DatabaseProcessor::open_in_memory().await.unwrap();
        for i in 1..=rows {
            db.add_feed_post(FeedPostInsert {
                reply_uri: format!("at://did:R/app.bsky.feed.post/r{i}"),
                user_did: "did:U".to_string(),
                subscribed_post_uri: "uri:P".to_string(),
                created_at: i * 1000,
            })
            .await
            .unwrap();
        }
        db
    }

    #[test]
    fn test_parse_limit() {
        let limits = FeedLimits::default();
        assert_eq!(limits.parse_limit(None), 50);
        assert_eq!(limits.parse_limit(Some("")), 50);
        assert_eq!(limits.parse_limit(Some("ten")), 50);
        assert_eq!(limits.parse_limit(Some("5")), 5);
        assert_eq!(limits.parse_limit(Some("0")), 1);
        assert_eq!(limits.parse_limit(Some("-3")), 1);
        assert_eq!(limits.parse_limit(Some("1000")), 100);
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor(None), CURSOR_SENTINEL);
        assert_eq!(parse_cursor(Some("")), CURSOR_SENTINEL);
        assert_eq!(parse_cursor(Some("abc")), CURSOR_SENTINEL);
        assert_eq!(parse_cursor(Some("0")), CURSOR_SENTINEL);
        assert_eq!(parse_cursor(Some("-5")), CURSOR_SENTINEL);
        assert_eq!(parse_cursor(Some("1700000000000")), 1_700_000_000_000);
    }

    #[test]
    fn test_feed_kind() {
        assert_eq!(FeedKind::from_feed_uri(REPLIES), Some(FeedKind::Replies));
        assert_eq!(FeedKind::from_feed_uri(BOOKMARKS), Some(FeedKind::Bookmarks));
        assert_eq!(FeedKind::from_feed_uri("bookmarks"), Some(FeedKind::Bookmarks));
        assert_eq!(
            FeedKind::from_feed_uri(BOOKMARK_REPLIES),
            Some(FeedKind::BookmarkReplies)
        );
        assert_eq!(
            FeedKind::from_feed_uri("at://did:plc:gen/app.bsky.feed.generator/other"),
            None
        );
    }

    #[test]
    fn test_page_cursor() {
        assert_eq!(page_cursor(Some(42), 5, 5), "42");
        assert_eq!(page_cursor(Some(42), 4, 5), "");
        assert_eq!(page_cursor(None, 0, 5), "");
    }

    #[tokio::test]
    async fn test_full_page_has_cursor() {
        let db = seeded(5).await;
        let reader = FeedReader::default();

        let page = reader
            .skeleton(&db, "did:U", REPLIES, None, Some("5"))
            .await
            .unwrap();
        assert_eq!(page.feed.len(), 5);
        assert_eq!(page.cursor, "1000");
        assert_eq!(page.feed[0].post, "at://did:R/app.bsky.feed.post/r5");
        assert_eq!(page.feed[0].feed_context, "uri:P");

        // the extra page the heuristic implies
        let next = reader
            .skeleton(&db, "did:U", REPLIES, Some(&page.cursor), Some("5"))
            .await
            .unwrap();
        assert!(next.feed.is_empty());
        assert_eq!(next.cursor, "");
    }

    #[tokio::test]
    async fn test_paging_walks_the_feed() {
        let db = seeded(7).await;
        let reader = FeedReader::default();

        let first = reader
            .skeleton(&db, "did:U", REPLIES, Some(""), Some("3"))
            .await
            .unwrap();
        assert_eq!(first.cursor, "5000");
        let second = reader
            .skeleton(&db, "did:U", REPLIES, Some(&first.cursor), Some("3"))
            .await
            .unwrap();
        assert_eq!(second.cursor, "2000");
        let third = reader
            .skeleton(&db, "did:U", REPLIES, Some(&second.cursor), Some("3"))
            .await
            .unwrap();
        assert_eq!(third.feed.len(), 1);
        assert_eq!(third.cursor, "");
    }

    #[tokio::test]
    async fn test_bookmark_feed() {
        let db = seeded(0).await;
        db.create_bookmark(BookmarkInsert {
            post_rkey: "3kabc".to_string(),
            post_uri: "at://did:plc:a/app.bsky.feed.post/3kabc".to_string(),
            author_did: "did:plc:a".to_string(),
            user_did: "did:U".to_string(),
            content: String::new(),
            created_at: 1,
        })
        .await
        .unwrap();

        let page = FeedReader::default()
            .skeleton(&db, "did:U", BOOKMARKS, None, None)
            .await
            .unwrap();
        assert_eq!(page.feed.len(), 1);
        assert_eq!(page.feed[0].post, "at://did:plc:a/app.bsky.feed.post/3kabc");
        assert_eq!(page.feed[0].feed_context, "");
        assert_eq!(page.cursor, "");
    }

    #[tokio::test]
    async fn test_bookmark_replies_feed() {
        let db = seeded(2).await;
        for i in 1..=3 {
            db.add_bookmark_reply(BookmarkReplyInsert {
                reply_uri: format!("at://did:R/app.bsky.feed.post/b{i}"),
                user_did: "did:U".to_string(),
                bookmarked_post_uri: "uri:B".to_string(),
                created_at: i * 10,
            })
            .await
            .unwrap();
        }
        let reader = FeedReader::default();

        let page = reader
            .skeleton(&db, "did:U", BOOKMARK_REPLIES, None, Some("2"))
            .await
            .unwrap();
        assert_eq!(page.feed.len(), 2);
        assert_eq!(page.feed[0].post, "at://did:R/app.bsky.feed.post/b3");
        assert_eq!(page.feed[0].feed_context, "uri:B");
        assert_eq!(page.cursor, "20");

        let next = reader
            .skeleton(&db, "did:U", BOOKMARK_REPLIES, Some(&page.cursor), Some("2"))
            .await
            .unwrap();
        assert_eq!(next.feed.len(), 1);
        assert_eq!(next.cursor, "");
    }

    #[tokio::test]
    async fn test_unknown_feed() {
        let db = seeded(0).await;
        let err = FeedReader::default()
            .skeleton(&db, "did:U", "at://x/app.bsky.feed.generator/nope", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::UnknownFeed(_)));
    }
}
