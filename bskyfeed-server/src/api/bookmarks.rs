//! Bookmark endpoints.
//!
//! Bookmarked posts make up the `bookmarks` feed, and replies to them the
//! `bookmark-replies` feed.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use bskyfeed_core::entities::{Bookmark, BookmarkInsert};
use bskyfeed_core::store::{BookmarkStore, StoreError, remove_bookmark};
use bskyfeed_sdk::aturi::{AtUriError, PostUri};
use bskyfeed_sdk::objects::{BookmarkResponse, CreateBookmark};
use time::OffsetDateTime;

use crate::api::extractors::AuthenticatedDid;
use crate::state::AppState;

/// Preview text longer than this many characters is cut and suffixed with `...`.
const PREVIEW_CHARS: usize = 75;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookmarks", get(list_bookmarks).post(create_bookmark))
        .route("/bookmarks/{rkey}", delete(delete_bookmark))
}

fn to_response(bookmark: Bookmark) -> BookmarkResponse {
    BookmarkResponse {
        id: bookmark.id,
        post_rkey: bookmark.post_rkey,
        post_uri: bookmark.post_uri,
        author_did: bookmark.author_did,
        content: bookmark.content,
        created_at: bookmark.created_at,
    }
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

fn now_millis() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// `GET /api/bookmarks`: the caller's bookmarks, newest first.
async fn list_bookmarks(
    state: State<AppState>,
    AuthenticatedDid(did): AuthenticatedDid,
) -> Result<Json<Vec<BookmarkResponse>>, BookmarkApiError> {
    let bookmarks = state.store.list_bookmarks_for_user(&did).await?;
    Ok(Json(bookmarks.into_iter().map(to_response).collect()))
}

/// `POST /api/bookmarks`: bookmark a post by AT-URI or bsky.app URL.
///
/// Answers `201` with the new bookmark, or an empty `200` when the post was
/// already bookmarked.
async fn create_bookmark(
    state: State<AppState>,
    AuthenticatedDid(did): AuthenticatedDid,
    Json(body): Json<CreateBookmark>,
) -> Result<Response, BookmarkApiError> {
    let post = PostUri::parse(&body.uri).map_err(BookmarkApiError::InvalidUri)?;

    let created = state
        .store
        .create_bookmark(BookmarkInsert {
            post_rkey: post.rkey.clone(),
            post_uri: post.to_string(),
            author_did: post.did.clone(),
            user_did: did.clone(),
            content: preview(body.content.as_deref().unwrap_or_default()),
            created_at: now_millis(),
        })
        .await?;
    if !created {
        return Ok(StatusCode::OK.into_response());
    }

    let bookmark = state
        .store
        .get_bookmark_by_rkey(&did, &post.rkey)
        .await?
        .ok_or(BookmarkApiError::NotFound)?;
    tracing::info!(did = %did, post = %bookmark.post_uri, "Bookmark created");
    Ok((StatusCode::CREATED, Json(to_response(bookmark))).into_response())
}

/// `DELETE /api/bookmarks/{rkey}`: also drops the replies collected for it.
async fn delete_bookmark(
    state: State<AppState>,
    AuthenticatedDid(did): AuthenticatedDid,
    Path(rkey): Path<String>,
) -> Result<Response, BookmarkApiError> {
    if !remove_bookmark(&state.store, &did, &rkey).await? {
        return Err(BookmarkApiError::NotFound);
    }
    tracing::info!(did = %did, rkey = %rkey, "Bookmark removed");
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({}))).into_response())
}

#[derive(Debug)]
enum BookmarkApiError {
    Store(StoreError),
    InvalidUri(AtUriError),
    NotFound,
}

impl From<StoreError> for BookmarkApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for BookmarkApiError {
    fn into_response(self) -> Response {
        match self {
            BookmarkApiError::Store(e) => {
                tracing::error!(error = %e, "Bookmark API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            BookmarkApiError::InvalidUri(e) => {
                (StatusCode::BAD_REQUEST, format!("invalid post URI: {e}")).into_response()
            }
            BookmarkApiError::NotFound => {
                (StatusCode::NOT_FOUND, "bookmark not found").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::preview;
    use crate::api::test_support::{request, send, send_json, test_app};
    use axum::http::StatusCode;
    use bskyfeed_core::entities::BookmarkReplyInsert;
    use bskyfeed_core::store::BookmarkStore;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short"), "short");
        let exact = "a".repeat(75);
        assert_eq!(preview(&exact), exact);
        let long = "é".repeat(80);
        assert_eq!(preview(&long), format!("{}...", "é".repeat(75)));
    }

    #[tokio::test]
    async fn test_bookmark_lifecycle() {
        let (app, _) = test_app().await;
        let body = r#"{"uri":"https://bsky.app/profile/did:plc:a/post/3kabc","content":"hello"}"#;

        let (status, created) =
            send_json(&app, request("POST", "/api/bookmarks", Some("did:U"), Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["postUri"], "at://did:plc:a/app.bsky.feed.post/3kabc");
        assert_eq!(created["authorDid"], "did:plc:a");
        assert_eq!(created["content"], "hello");

        let (status, again) =
            send(&app, request("POST", "/api/bookmarks", Some("did:U"), Some(body))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(again.is_empty());

        let (_, list) = send_json(&app, request("GET", "/api/bookmarks", Some("did:U"), None)).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let feed = "/xrpc/app.bsky.feed.getFeedSkeleton?feed=at://did:plc:owner/app.bsky.feed.generator/bookmarks";
        let (_, page) = send_json(&app, request("GET", feed, Some("did:U"), None)).await;
        assert_eq!(page["feed"][0]["post"], "at://did:plc:a/app.bsky.feed.post/3kabc");

        let (status, deleted) =
            send_json(&app, request("DELETE", "/api/bookmarks/3kabc", Some("did:U"), None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(deleted, serde_json::json!({}));

        let (status, _) =
            send(&app, request("DELETE", "/api/bookmarks/3kabc", Some("did:U"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_removes_collected_replies() {
        let (app, store) = test_app().await;
        let body = r#"{"uri":"at://did:plc:a/app.bsky.feed.post/3kabc"}"#;
        let (status, _) =
            send(&app, request("POST", "/api/bookmarks", Some("did:U"), Some(body))).await;
        assert_eq!(status, StatusCode::CREATED);
        store
            .add_bookmark_reply(BookmarkReplyInsert {
                reply_uri: "at://did:R/app.bsky.feed.post/r1".to_string(),
                user_did: "did:U".to_string(),
                bookmarked_post_uri: "at://did:plc:a/app.bsky.feed.post/3kabc".to_string(),
                created_at: 5,
            })
            .await
            .unwrap();

        let feed = "/xrpc/app.bsky.feed.getFeedSkeleton?feed=at://did:plc:owner/app.bsky.feed.generator/bookmark-replies";
        let (_, page) = send_json(&app, request("GET", feed, Some("did:U"), None)).await;
        assert_eq!(page["feed"][0]["post"], "at://did:R/app.bsky.feed.post/r1");

        let (status, _) =
            send(&app, request("DELETE", "/api/bookmarks/3kabc", Some("did:U"), None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (_, page) = send_json(&app, request("GET", feed, Some("did:U"), None)).await;
        assert!(page["feed"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unsupported_uri() {
        let (app, _) = test_app().await;
        let body = r#"{"uri":"https://bsky.app/profile/alice.bsky.social/post/3kabc"}"#;
        let (status, _) =
            send(&app, request("POST", "/api/bookmarks", Some("did:U"), Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
