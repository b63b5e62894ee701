//! Feed generator XRPC endpoints and service discovery.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use bskyfeed_core::feed::{FeedError, FeedKind};
use bskyfeed_sdk::objects::{
    DescribeFeedGeneratorResponse, DidDocument, FeedDescription, FeedSkeletonQuery,
    FeedSkeletonResponse,
};

use crate::api::extractors::AuthenticatedDid;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/xrpc/app.bsky.feed.getFeedSkeleton",
            get(get_feed_skeleton),
        )
        .route(
            "/xrpc/app.bsky.feed.describeFeedGenerator",
            get(describe_feed_generator),
        )
        .route("/.well-known/did.json", get(did_document))
}

/// `GET /xrpc/app.bsky.feed.getFeedSkeleton`: one page of the caller's feed.
///
/// Bad `cursor` and `limit` values fall back to defaults instead of failing.
async fn get_feed_skeleton(
    state: State<AppState>,
    AuthenticatedDid(did): AuthenticatedDid,
    Query(query): Query<FeedSkeletonQuery>,
) -> Result<Json<FeedSkeletonResponse>, FeedApiError> {
    let feed = query
        .feed
        .as_deref()
        .filter(|feed| !feed.is_empty())
        .ok_or(FeedApiError::MissingFeed)?;

    let page = state
        .reader
        .skeleton(
            &state.store,
            &did,
            feed,
            query.cursor.as_deref(),
            query.limit.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

async fn describe_feed_generator(state: State<AppState>) -> Json<DescribeFeedGeneratorResponse> {
    let feeds = FeedKind::ALL
        .into_iter()
        .map(|kind| FeedDescription {
            uri: state.feed.feed_uri(kind),
        })
        .collect();
    Json(DescribeFeedGeneratorResponse {
        did: state.feed.service_did(),
        feeds,
    })
}

async fn did_document(state: State<AppState>) -> Json<DidDocument> {
    Json(DidDocument::feed_generator(&state.feed.host))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum FeedApiError {
    MissingFeed,
    Feed(FeedError),
}

impl From<FeedError> for FeedApiError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e)
    }
}

impl IntoResponse for FeedApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            FeedApiError::MissingFeed => {
                (StatusCode::BAD_REQUEST, "missing feed parameter").into_response()
            }
            FeedApiError::Feed(FeedError::UnknownFeed(_)) => {
                (StatusCode::BAD_REQUEST, "unknown feed").into_response()
            }
            FeedApiError::Feed(FeedError::Store(e)) => {
                tracing::error!(error = %e, "Feed API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
