//! HTTP API handlers.
//!
//! # Endpoints
//!
//! - `GET    /xrpc/app.bsky.feed.getFeedSkeleton`     – feed page (authenticated)
//! - `GET    /xrpc/app.bsky.feed.describeFeedGenerator` – feeds served here
//! - `GET    /.well-known/did.json`                   – `did:web` document
//! - `GET    /api/subscriptions`                      – list own subscriptions
//! - `DELETE /api/subscriptions/{id}`                 – remove a subscription
//! - `GET    /api/bookmarks`                          – list own bookmarks
//! - `POST   /api/bookmarks`                          – bookmark a post
//! - `DELETE /api/bookmarks/{rkey}`                   – remove a bookmark

use axum::Router;

use crate::state::AppState;

pub mod bookmarks;
pub mod extractors;
pub mod feed;
pub mod subscriptions;

/// Routes acting on the calling user's own data, mounted under `/api`.
pub fn user_router() -> Router<AppState> {
    Router::new()
        .merge(subscriptions::router())
        .merge(bookmarks::router())
}
