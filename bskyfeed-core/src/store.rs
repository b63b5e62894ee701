//! Store contract used by the event handler, the feed reader and the HTTP layer.
//!
//! The traits are the seam where tests substitute failing stores; the only
//! production implementation is [`DatabaseProcessor`], which dispatches each
//! call to the matching command in [`crate::entities`].

use crate::entities::bookmark::{
    DeleteBookmark, GetBookmarkByRkey, GetBookmarkHolders, GetBookmarksPage, InsertBookmark,
    ListBookmarksForUser,
};
use crate::entities::bookmark_reply::{
    DeleteBookmarkReplies, GetBookmarkReplies, InsertBookmarkReply,
};
use crate::entities::feed_post::{DeleteFeedPostsForSubscription, GetUserFeed, InsertFeedPost};
use crate::entities::subscription::{
    DeleteSubscription, FindSubscribedPostUri, GetSubscriberDids, GetSubscriptionForUser,
    InsertSubscription, ListSubscriptionsForUser,
};
use crate::entities::{
    Bookmark, BookmarkInsert, BookmarkReply, BookmarkReplyInsert, FeedPost, FeedPostInsert,
    Subscription,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use thiserror::Error;

/// A failed store call, tagged with the operation that was attempted.
#[derive(Debug, Error)]
#[error("{operation}: {source}")]
pub struct StoreError {
    operation: &'static str,
    #[source]
    source: sqlx::Error,
}

impl StoreError {
    pub fn new(operation: &'static str, source: sqlx::Error) -> Self {
        Self { operation, source }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Whether the database itself is unreachable, as opposed to a single
    /// query failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.source,
            sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
        )
    }
}

fn context(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |source| StoreError::new(operation, source)
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Idempotent: an existing (post, user) pair is left untouched.
    async fn add_subscription(
        &self,
        subscribed_post_uri: &str,
        user_did: &str,
        subscription_post_rkey: &str,
    ) -> Result<(), StoreError>;

    async fn get_subscribers_of(&self, subscribed_post_uri: &str)
    -> Result<Vec<String>, StoreError>;

    /// The post a subscription points at, looked up by the record key of the
    /// post that created it.
    async fn find_subscription(
        &self,
        user_did: &str,
        subscription_post_rkey: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn delete_subscription(
        &self,
        user_did: &str,
        subscribed_post_uri: &str,
    ) -> Result<(), StoreError>;

    /// Idempotent on (reply_uri, user_did).
    async fn add_feed_post(&self, post: FeedPostInsert) -> Result<(), StoreError>;

    async fn get_user_feed(
        &self,
        user_did: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<FeedPost>, StoreError>;

    /// Returns how many rows were removed.
    async fn delete_feed_posts_for(
        &self,
        subscribed_post_uri: &str,
        user_did: &str,
    ) -> Result<u64, StoreError>;

    async fn list_subscriptions_for_user(
        &self,
        user_did: &str,
    ) -> Result<Vec<Subscription>, StoreError>;

    async fn get_subscription_for_user(
        &self,
        user_did: &str,
        id: i64,
    ) -> Result<Option<Subscription>, StoreError>;
}

#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Returns `false` when the user already bookmarked this record key.
    async fn create_bookmark(&self, bookmark: BookmarkInsert) -> Result<bool, StoreError>;

    async fn list_bookmarks_for_user(&self, user_did: &str) -> Result<Vec<Bookmark>, StoreError>;

    async fn get_bookmarks_page(
        &self,
        user_did: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<Bookmark>, StoreError>;

    async fn get_bookmark_by_rkey(
        &self,
        user_did: &str,
        post_rkey: &str,
    ) -> Result<Option<Bookmark>, StoreError>;

    /// Returns `false` when there was nothing to delete. Leaves the replies
    /// collected for the bookmark in place; see [`remove_bookmark`].
    async fn delete_bookmark(&self, user_did: &str, post_rkey: &str) -> Result<bool, StoreError>;

    async fn get_bookmark_holders_of(&self, post_uri: &str) -> Result<Vec<String>, StoreError>;

    /// Idempotent on (reply_uri, user_did).
    async fn add_bookmark_reply(&self, reply: BookmarkReplyInsert) -> Result<(), StoreError>;

    async fn get_bookmark_replies(
        &self,
        user_did: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<BookmarkReply>, StoreError>;

    /// Returns how many rows were removed.
    async fn delete_bookmark_replies_for(
        &self,
        bookmarked_post_uri: &str,
        user_did: &str,
    ) -> Result<u64, StoreError>;
}

/// Remove a user's bookmark and every reply collected for it.
///
/// Replies go first: if the second step fails the bookmark is still listed
/// and the removal can be repeated. Returns `false` when the user has no
/// bookmark with that record key.
pub async fn remove_bookmark<S>(
    store: &S,
    user_did: &str,
    post_rkey: &str,
) -> Result<bool, StoreError>
where
    S: BookmarkStore + ?Sized,
{
    let Some(bookmark) = store.get_bookmark_by_rkey(user_did, post_rkey).await? else {
        return Ok(false);
    };
    store
        .delete_bookmark_replies_for(&bookmark.post_uri, user_did)
        .await?;
    store.delete_bookmark(user_did, post_rkey).await
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SubscriptionStore for DatabaseProcessor {
    async fn add_subscription(
        &self,
        subscribed_post_uri: &str,
        user_did: &str,
        subscription_post_rkey: &str,
    ) -> Result<(), StoreError> {
        self.process(InsertSubscription {
            subscribed_post_uri: subscribed_post_uri.to_string(),
            user_did: user_did.to_string(),
            subscription_post_rkey: subscription_post_rkey.to_string(),
        })
        .await
        .map(|_| ())
        .map_err(context("add subscription"))
    }

    async fn get_subscribers_of(
        &self,
        subscribed_post_uri: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.process(GetSubscriberDids {
            subscribed_post_uri: subscribed_post_uri.to_string(),
        })
        .await
        .map_err(context("get subscribers"))
    }

    async fn find_subscription(
        &self,
        user_did: &str,
        subscription_post_rkey: &str,
    ) -> Result<Option<String>, StoreError> {
        self.process(FindSubscribedPostUri {
            user_did: user_did.to_string(),
            subscription_post_rkey: subscription_post_rkey.to_string(),
        })
        .await
        .map_err(context("find subscription"))
    }

    async fn delete_subscription(
        &self,
        user_did: &str,
        subscribed_post_uri: &str,
    ) -> Result<(), StoreError> {
        self.process(DeleteSubscription {
            user_did: user_did.to_string(),
            subscribed_post_uri: subscribed_post_uri.to_string(),
        })
        .await
        .map(|_| ())
        .map_err(context("delete subscription"))
    }

    async fn add_feed_post(&self, post: FeedPostInsert) -> Result<(), StoreError> {
        self.process(InsertFeedPost { post })
            .await
            .map(|_| ())
            .map_err(context("add feed post"))
    }

    async fn get_user_feed(
        &self,
        user_did: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<FeedPost>, StoreError> {
        self.process(GetUserFeed {
            user_did: user_did.to_string(),
            cursor,
            limit,
        })
        .await
        .map_err(context("get user feed"))
    }

    async fn delete_feed_posts_for(
        &self,
        subscribed_post_uri: &str,
        user_did: &str,
    ) -> Result<u64, StoreError> {
        self.process(DeleteFeedPostsForSubscription {
            subscribed_post_uri: subscribed_post_uri.to_string(),
            user_did: user_did.to_string(),
        })
        .await
        .map_err(context("delete feed posts"))
    }

    async fn list_subscriptions_for_user(
        &self,
        user_did: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        self.process(ListSubscriptionsForUser {
            user_did: user_did.to_string(),
        })
        .await
        .map_err(context("list subscriptions"))
    }

    async fn get_subscription_for_user(
        &self,
        user_did: &str,
        id: i64,
    ) -> Result<Option<Subscription>, StoreError> {
        self.process(GetSubscriptionForUser {
            user_did: user_did.to_string(),
            id,
        })
        .await
        .map_err(context("get subscription"))
    }
}

#[async_trait]
impl BookmarkStore for DatabaseProcessor {
    async fn create_bookmark(&self, bookmark: BookmarkInsert) -> Result<bool, StoreError> {
        self.process(InsertBookmark { bookmark })
            .await
            .map_err(context("create bookmark"))
    }

    async fn list_bookmarks_for_user(&self, user_did: &str) -> Result<Vec<Bookmark>, StoreError> {
        self.process(ListBookmarksForUser {
            user_did: user_did.to_string(),
        })
        .await
        .map_err(context("list bookmarks"))
    }

    async fn get_bookmarks_page(
        &self,
        user_did: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<Bookmark>, StoreError> {
        self.process(GetBookmarksPage {
            user_did: user_did.to_string(),
            cursor,
            limit,
        })
        .await
        .map_err(context("get bookmarks page"))
    }

    async fn get_bookmark_by_rkey(
        &self,
        user_did: &str,
        post_rkey: &str,
    ) -> Result<Option<Bookmark>, StoreError> {
        self.process(GetBookmarkByRkey {
            user_did: user_did.to_string(),
            post_rkey: post_rkey.to_string(),
        })
        .await
        .map_err(context("get bookmark"))
    }

    async fn delete_bookmark(&self, user_did: &str, post_rkey: &str) -> Result<bool, StoreError> {
        self.process(DeleteBookmark {
            user_did: user_did.to_string(),
            post_rkey: post_rkey.to_string(),
        })
        .await
        .map(|removed| removed > 0)
        .map_err(context("delete bookmark"))
    }

    async fn get_bookmark_holders_of(&self, post_uri: &str) -> Result<Vec<String>, StoreError> {
        self.process(GetBookmarkHolders {
            post_uri: post_uri.to_string(),
        })
        .await
        .map_err(context("get bookmark holders"))
    }

    async fn add_bookmark_reply(&self, reply: BookmarkReplyInsert) -> Result<(), StoreError> {
        self.process(InsertBookmarkReply { reply })
            .await
            .map(|_| ())
            .map_err(context("add bookmark reply"))
    }

    async fn get_bookmark_replies(
        &self,
        user_did: &str,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<BookmarkReply>, StoreError> {
        self.process(GetBookmarkReplies {
            user_did: user_did.to_string(),
            cursor,
            limit,
        })
        .await
        .map_err(context("get bookmark replies"))
    }

    async fn delete_bookmark_replies_for(
        &self,
        bookmarked_post_uri: &str,
        user_did: &str,
    ) -> Result<u64, StoreError> {
        self.process(DeleteBookmarkReplies {
            bookmarked_post_uri: bookmarked_post_uri.to_string(),
            user_did: user_did.to_string(),
        })
        .await
        .map_err(context("delete bookmark replies"))
    }
}
