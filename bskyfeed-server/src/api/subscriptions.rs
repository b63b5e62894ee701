use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use bskyfeed_core::entities::Subscription;
use bskyfeed_core::processors::unsubscribe;
use bskyfeed_core::store::{StoreError, SubscriptionStore};
use bskyfeed_sdk::objects::SubscriptionResponse;

use crate::api::extractors::AuthenticatedDid;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/{id}", delete(delete_subscription))
}

fn to_response(subscription: Subscription) -> SubscriptionResponse {
    SubscriptionResponse {
        id: subscription.id,
        subscribed_post_uri: subscription.subscribed_post_uri,
        subscription_post_rkey: subscription.subscription_post_rkey,
    }
}

/// `GET /api/subscriptions`: the caller's subscriptions, newest first.
async fn list_subscriptions(
    state: State<AppState>,
    AuthenticatedDid(did): AuthenticatedDid,
) -> Result<Json<Vec<SubscriptionResponse>>, SubscriptionApiError> {
    let subscriptions = state.store.list_subscriptions_for_user(&did).await?;
    Ok(Json(subscriptions.into_iter().map(to_response).collect()))
}

/// `DELETE /api/subscriptions/{id}`: stop following replies to a post.
///
/// Removes the feed rows the subscription produced before the subscription
/// itself, the same order the firehose delete path uses.
async fn delete_subscription(
    state: State<AppState>,
    AuthenticatedDid(did): AuthenticatedDid,
    Path(id): Path<i64>,
) -> Result<StatusCode, SubscriptionApiError> {
    let subscription = state
        .store
        .get_subscription_for_user(&did, id)
        .await?
        .ok_or(SubscriptionApiError::NotFound)?;

    let removed = unsubscribe(&state.store, &did, &subscription.subscribed_post_uri).await?;
    tracing::info!(
        did = %did,
        post = %subscription.subscribed_post_uri,
        removed_feed_posts = removed,
        "Subscription removed via API"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug)]
enum SubscriptionApiError {
    Store(StoreError),
    NotFound,
}

impl From<StoreError> for SubscriptionApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for SubscriptionApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SubscriptionApiError::Store(e) => {
                tracing::error!(error = %e, "Subscription API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            SubscriptionApiError::NotFound => {
                (StatusCode::NOT_FOUND, "subscription not found").into_response()
            }
        }
    }
}
