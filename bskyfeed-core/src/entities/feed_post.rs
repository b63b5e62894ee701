use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A reply materialized into one subscriber's feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedPost {
    pub id: i64,
    pub reply_uri: String,
    pub user_did: String,
    pub subscribed_post_uri: String,
    /// Unix milliseconds. Sort and pagination key.
    pub created_at: i64,
}

/// Data for inserting a new feed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPostInsert {
    pub reply_uri: String,
    pub user_did: String,
    pub subscribed_post_uri: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
/// Insert a feed row.
///
/// Uses ON CONFLICT DO NOTHING on (reply_uri, user_did) so redelivered
/// events do not duplicate rows. Returns the number of rows inserted.
pub struct InsertFeedPost {
    pub post: FeedPostInsert,
}

impl Processor<InsertFeedPost> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertFeedPost")]
    async fn process(&self, insert: InsertFeedPost) -> Result<u64, sqlx::Error> {
        let FeedPostInsert {
            reply_uri,
            user_did,
            subscribed_post_uri,
            created_at,
        } = insert.post;
        let result = sqlx::query(
            r#"
            INSERT INTO feed_posts (reply_uri, user_did, subscribed_post_uri, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (reply_uri, user_did) DO NOTHING
            "#,
        )
        .bind(reply_uri)
        .bind(user_did)
        .bind(subscribed_post_uri)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// One page of a user's feed: rows strictly older than `cursor`, newest first.
pub struct GetUserFeed {
    pub user_did: String,
    pub cursor: i64,
    pub limit: i64,
}

impl Processor<GetUserFeed> for DatabaseProcessor {
    type Output = Vec<FeedPost>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUserFeed")]
    async fn process(&self, query: GetUserFeed) -> Result<Vec<FeedPost>, sqlx::Error> {
        sqlx::query_as::<_, FeedPost>(
            r#"
            SELECT id, reply_uri, user_did, subscribed_post_uri, created_at
            FROM feed_posts
            WHERE user_did = ? AND created_at < ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(query.user_did)
        .bind(query.cursor)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Delete every feed row a subscription produced for one user.
///
/// Returns the number of rows removed.
pub struct DeleteFeedPostsForSubscription {
    pub subscribed_post_uri: String,
    pub user_did: String,
}

impl Processor<DeleteFeedPostsForSubscription> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteFeedPostsForSubscription")]
    async fn process(&self, cmd: DeleteFeedPostsForSubscription) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM feed_posts WHERE subscribed_post_uri = ? AND user_did = ?",
        )
        .bind(cmd.subscribed_post_uri)
        .bind(cmd.user_did)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
