//! EventHandler processor.
//!
//! Turns each firehose event into at most one change of the subscription
//! registry:
//!
//! - a reply containing the subscribe marker subscribes its author to the
//!   parent post
//! - any other reply is copied into the feed of every subscriber of its parent
//!   and into the `bookmark-replies` feed of everyone who bookmarked it
//! - deleting the post that created a subscription removes the subscription
//!   together with the feed rows it produced
//!
//! The handler keeps no state besides its configuration. Redelivered events
//! are absorbed by the store's uniqueness constraints.

use crate::entities::{BookmarkReplyInsert, FeedPostInsert};
use crate::events::{FirehoseEvent, Operation};
use crate::store::{BookmarkStore, StoreError, SubscriptionStore};
use bskyfeed_sdk::aturi::post_uri;
use bskyfeed_sdk::objects::POST_COLLECTION;
use futures_util::future::{join, join_all};
use kanau::processor::Processor;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info};

pub const DEFAULT_SUBSCRIBE_MARKER: &str = "/subscribe";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Who may create and remove subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    Anyone,
    Only(HashSet<String>),
}

impl AllowList {
    /// Build from configured entries. A `"*"` entry allows anyone.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dids = HashSet::new();
        for entry in entries {
            let entry = entry.into();
            if entry == "*" {
                return Self::Anyone;
            }
            dids.insert(entry);
        }
        Self::Only(dids)
    }

    pub fn allows(&self, did: &str) -> bool {
        match self {
            Self::Anyone => true,
            Self::Only(dids) => dids.contains(did),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub allow_list: AllowList,
    /// Substring that turns a reply into a subscribe request.
    pub subscribe_marker: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            allow_list: AllowList::Anyone,
            subscribe_marker: DEFAULT_SUBSCRIBE_MARKER.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// The transition applied for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ignored,
    Subscribed,
    /// Counts rows across the subscription and bookmark-replies feeds.
    FannedOut { delivered: usize, failed: usize },
    Unsubscribed { removed_feed_posts: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Subscribe,
    FanOut,
    Unsubscribe,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Subscribe => write!(f, "subscribe"),
            Action::FanOut => write!(f, "fan-out"),
            Action::Unsubscribe => write!(f, "unsubscribe"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{action} failed: {source}")]
pub struct HandleError {
    action: Action,
    #[source]
    source: StoreError,
}

impl HandleError {
    pub(crate) fn new(action: Action, source: StoreError) -> Self {
        Self { action, source }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Whether retrying the next event is pointless until the store recovers.
    pub fn is_store_unavailable(&self) -> bool {
        self.source.is_unavailable()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

pub struct EventHandler<S> {
    store: S,
    config: HandlerConfig,
}

impl<S: SubscriptionStore + BookmarkStore> EventHandler<S> {
    pub fn new(store: S, config: HandlerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn handle(&self, event: &FirehoseEvent) -> Result<Transition, HandleError> {
        if event.record_kind != POST_COLLECTION {
            return Ok(Transition::Ignored);
        }
        match event.operation {
            Operation::Create => self.handle_create(event).await,
            Operation::Delete => self.handle_delete(event).await,
            Operation::Update | Operation::Other => Ok(Transition::Ignored),
        }
    }

    async fn handle_create(&self, event: &FirehoseEvent) -> Result<Transition, HandleError> {
        let Some(post) = event.decode_post() else {
            return Ok(Transition::Ignored);
        };
        let Some(parent_uri) = post.parent_uri() else {
            return Ok(Transition::Ignored);
        };

        if post.text.contains(&self.config.subscribe_marker) {
            if !self.config.allow_list.allows(&event.author_id) {
                debug!(did = %event.author_id, "Ignoring subscribe from non-allowed author");
                return Ok(Transition::Ignored);
            }
            self.store
                .add_subscription(parent_uri, &event.author_id, &event.record_key)
                .await
                .map_err(|e| HandleError::new(Action::Subscribe, e))?;
            info!(
                did = %event.author_id,
                post = %parent_uri,
                rkey = %event.record_key,
                "Subscribed to replies"
            );
            return Ok(Transition::Subscribed);
        }

        let created_at = resolve_created_at(post.created_at.as_deref(), event.timestamp.as_deref());
        self.fan_out(event, parent_uri, created_at).await
    }

    async fn fan_out(
        &self,
        event: &FirehoseEvent,
        parent_uri: &str,
        created_at: i64,
    ) -> Result<Transition, HandleError> {
        let subscribers = match self.store.get_subscribers_of(parent_uri).await {
            Ok(subscribers) => subscribers,
            Err(e) if e.is_unavailable() => return Err(HandleError::new(Action::FanOut, e)),
            Err(e) => {
                error!(error = %e, post = %parent_uri, "Failed to look up subscribers");
                Vec::new()
            }
        };
        let holders = match self.store.get_bookmark_holders_of(parent_uri).await {
            Ok(holders) => holders,
            Err(e) if e.is_unavailable() => return Err(HandleError::new(Action::FanOut, e)),
            Err(e) => {
                error!(error = %e, post = %parent_uri, "Failed to look up bookmark holders");
                Vec::new()
            }
        };
        if subscribers.is_empty() && holders.is_empty() {
            return Ok(Transition::FannedOut {
                delivered: 0,
                failed: 0,
            });
        }

        let reply_uri = post_uri(&event.author_id, &event.record_key);
        let feed_inserts = subscribers.iter().map(|user_did| {
            let post = FeedPostInsert {
                reply_uri: reply_uri.clone(),
                user_did: user_did.clone(),
                subscribed_post_uri: parent_uri.to_string(),
                created_at,
            };
            async move {
                self.store
                    .add_feed_post(post)
                    .await
                    .map_err(|e| (user_did, e))
            }
        });
        let reply_inserts = holders.iter().map(|user_did| {
            let reply = BookmarkReplyInsert {
                reply_uri: reply_uri.clone(),
                user_did: user_did.clone(),
                bookmarked_post_uri: parent_uri.to_string(),
                created_at,
            };
            async move {
                self.store
                    .add_bookmark_reply(reply)
                    .await
                    .map_err(|e| (user_did, e))
            }
        });

        let (feed_results, reply_results) =
            join(join_all(feed_inserts), join_all(reply_inserts)).await;

        let mut delivered = 0;
        let mut failed = 0;
        for result in feed_results.into_iter().chain(reply_results) {
            match result {
                Ok(()) => delivered += 1,
                Err((user_did, e)) => {
                    failed += 1;
                    error!(
                        error = %e,
                        did = %user_did,
                        reply = %reply_uri,
                        "Failed to add reply to feed"
                    );
                }
            }
        }
        debug!(reply = %reply_uri, delivered, failed, "Fanned out reply");
        Ok(Transition::FannedOut { delivered, failed })
    }

    async fn handle_delete(&self, event: &FirehoseEvent) -> Result<Transition, HandleError> {
        if !self.config.allow_list.allows(&event.author_id) {
            return Ok(Transition::Ignored);
        }

        let subscribed_post_uri = self
            .store
            .find_subscription(&event.author_id, &event.record_key)
            .await
            .map_err(|e| HandleError::new(Action::Unsubscribe, e))?;
        let Some(subscribed_post_uri) = subscribed_post_uri else {
            return Ok(Transition::Ignored);
        };

        let removed_feed_posts = unsubscribe(&self.store, &event.author_id, &subscribed_post_uri)
            .await
            .map_err(|e| HandleError::new(Action::Unsubscribe, e))?;
        info!(
            did = %event.author_id,
            post = %subscribed_post_uri,
            removed_feed_posts,
            "Unsubscribed from replies"
        );
        Ok(Transition::Unsubscribed { removed_feed_posts })
    }
}

impl<S: SubscriptionStore + BookmarkStore> Processor<FirehoseEvent> for EventHandler<S> {
    type Output = Transition;
    type Error = HandleError;

    async fn process(&self, event: FirehoseEvent) -> Result<Transition, HandleError> {
        self.handle(&event).await
    }
}

/// Remove a user's subscription and every feed row it produced.
///
/// Feed rows go first: if the second step fails the subscription is still
/// visible and the removal can be repeated.
pub async fn unsubscribe<S>(
    store: &S,
    user_did: &str,
    subscribed_post_uri: &str,
) -> Result<u64, StoreError>
where
    S: SubscriptionStore + ?Sized,
{
    let removed = store
        .delete_feed_posts_for(subscribed_post_uri, user_did)
        .await?;
    store
        .delete_subscription(user_did, subscribed_post_uri)
        .await?;
    Ok(removed)
}

/// Millisecond sort key for a reply: the post's own `createdAt`, else the
/// event timestamp, else now.
fn resolve_created_at(post_created_at: Option<&str>, event_timestamp: Option<&str>) -> i64 {
    post_created_at
        .and_then(parse_rfc3339_millis)
        .or_else(|| event_timestamp.and_then(parse_rfc3339_millis))
        .unwrap_or_else(|| unix_millis(OffsetDateTime::now_utc()))
}

fn parse_rfc3339_millis(value: &str) -> Option<i64> {
    OffsetDateTime::parse(value, &Rfc3339).ok().map(unix_millis)
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
