use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Bookmark {
    pub id: i64,
    pub post_rkey: String,
    pub post_uri: String,
    pub author_did: String,
    pub user_did: String,
    pub content: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Data for inserting a new bookmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkInsert {
    pub post_rkey: String,
    pub post_uri: String,
    pub author_did: String,
    pub user_did: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
/// Insert a bookmark unless the user already bookmarked the same record key.
///
/// Returns `true` when a row was inserted.
pub struct InsertBookmark {
    pub bookmark: BookmarkInsert,
}

impl Processor<InsertBookmark> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertBookmark")]
    async fn process(&self, insert: InsertBookmark) -> Result<bool, sqlx::Error> {
        let b = insert.bookmark;
        let result = sqlx::query(
            r#"
            INSERT INTO bookmarks (post_rkey, post_uri, author_did, user_did, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (post_rkey, user_did) DO NOTHING
            "#,
        )
        .bind(b.post_rkey)
        .bind(b.post_uri)
        .bind(b.author_did)
        .bind(b.user_did)
        .bind(b.content)
        .bind(b.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct ListBookmarksForUser {
    pub user_did: String,
}

impl Processor<ListBookmarksForUser> for DatabaseProcessor {
    type Output = Vec<Bookmark>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListBookmarksForUser")]
    async fn process(&self, query: ListBookmarksForUser) -> Result<Vec<Bookmark>, sqlx::Error> {
        sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, post_rkey, post_uri, author_did, user_did, content, created_at
            FROM bookmarks
            WHERE user_did = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(query.user_did)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// One page of a user's bookmarks older than `cursor`, newest first.
pub struct GetBookmarksPage {
    pub user_did: String,
    pub cursor: i64,
    pub limit: i64,
}

impl Processor<GetBookmarksPage> for DatabaseProcessor {
    type Output = Vec<Bookmark>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBookmarksPage")]
    async fn process(&self, query: GetBookmarksPage) -> Result<Vec<Bookmark>, sqlx::Error> {
        sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, post_rkey, post_uri, author_did, user_did, content, created_at
            FROM bookmarks
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
/// Users who bookmarked the post at `post_uri`.
pub struct GetBookmarkHolders {
    pub post_uri: String,
}

impl Processor<GetBookmarkHolders> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBookmarkHolders")]
    async fn process(&self, query: GetBookmarkHolders) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT user_did FROM bookmarks WHERE post_uri = ?",
        )
        .bind(query.post_uri)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetBookmarkByRkey {
    pub user_did: String,
    pub post_rkey: String,
}

impl Processor<GetBookmarkByRkey> for DatabaseProcessor {
    type Output = Option<Bookmark>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetBookmarkByRkey")]
    async fn process(&self, query: GetBookmarkByRkey) -> Result<Option<Bookmark>, sqlx::Error> {
        sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, post_rkey, post_uri, author_did, user_did, content, created_at
            FROM bookmarks
            WHERE post_rkey = ? AND user_did = ?
            "#,
        )
        .bind(query.post_rkey)
        .bind(query.user_did)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Returns the number of rows removed.
pub struct DeleteBookmark {
    pub user_did: String,
    pub post_rkey: String,
}

impl Processor<DeleteBookmark> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteBookmark")]
    async fn process(&self, cmd: DeleteBookmark) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE post_rkey = ? AND user_did = ?")
            .bind(cmd.post_rkey)
            .bind(cmd.user_did)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
