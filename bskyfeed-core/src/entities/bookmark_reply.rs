use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A reply to a bookmarked post, copied into the bookmark holder's
/// `bookmark-replies` feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BookmarkReply {
    pub id: i64,
    pub reply_uri: String,
    pub user_did: String,
    pub bookmarked_post_uri: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkReplyInsert {
    pub reply_uri: String,
    pub user_did: String,
    pub bookmarked_post_uri: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
/// Insert a reply row, ignoring a duplicate (reply_uri, user_did).
pub struct InsertBookmarkReply {
    pub reply: BookmarkReplyInsert,
}

impl Processor<InsertBookmarkReply> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertBookmarkReply")]
    async fn process(&self, insert: InsertBookmarkReply) -> Result<u64, sqlx::Error> {
        let BookmarkReplyInsert {
            reply_uri,
            user_did,
            bookmarked_post_uri,
            created_at,
        } = insert.reply;
        let result = sqlx::query(
            r#"
            INSERT INTO bookmark_replies (reply_uri, user_did, bookmarked_post_uri, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (reply_uri, user_did) DO NOTHING
            "#,
        )
        .bind(reply_uri)
        .bind(user_did)
        .bind(bookmarked_post_uri)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct GetBookmarkReplies {
    pub user_did: String,
    pub cursor: i64,
    pub limit: i64,
}

impl Processor<GetBookmarkReplies> for DatabaseProcessor {
    type Output = Vec<BookmarkReply>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBookmarkReplies")]
    async fn process(&self, query: GetBookmarkReplies) -> Result<Vec<BookmarkReply>, sqlx::Error> {
        sqlx::query_as::<_, BookmarkReply>(
            r#"
            SELECT id, reply_uri, user_did, bookmarked_post_uri, created_at
            FROM bookmark_replies
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
/// Delete the replies collected for one user's bookmark of a post.
pub struct DeleteBookmarkReplies {
    pub bookmarked_post_uri: String,
    pub user_did: String,
}

impl Processor<DeleteBookmarkReplies> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteBookmarkReplies")]
    async fn process(&self, cmd: DeleteBookmarkReplies) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM bookmark_replies WHERE bookmarked_post_uri = ? AND user_did = ?",
        )
        .bind(cmd.bookmarked_post_uri)
        .bind(cmd.user_did)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
