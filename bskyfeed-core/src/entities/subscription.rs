use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// A user's standing request to see replies to a post.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub subscribed_post_uri: String,
    pub user_did: String,
    /// Record key of the post that created the subscription.
    pub subscription_post_rkey: String,
}

#[derive(Debug, Clone)]
/// Insert a subscription.
///
/// Uses ON CONFLICT DO NOTHING on (subscribed_post_uri, user_did), so
/// subscribing twice keeps the first row. Returns the number of rows inserted.
pub struct InsertSubscription {
    pub subscribed_post_uri: String,
    pub user_did: String,
    pub subscription_post_rkey: String,
}

impl Processor<InsertSubscription> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertSubscription")]
    async fn process(&self, insert: InsertSubscription) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (subscribed_post_uri, user_did, subscription_post_rkey)
            VALUES (?, ?, ?)
            ON CONFLICT (subscribed_post_uri, user_did) DO NOTHING
            "#,
        )
        .bind(insert.subscribed_post_uri)
        .bind(insert.user_did)
        .bind(insert.subscription_post_rkey)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// DIDs of every user subscribed to a post.
pub struct GetSubscriberDids {
    pub subscribed_post_uri: String,
}

impl Processor<GetSubscriberDids> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSubscriberDids")]
    async fn process(&self, query: GetSubscriberDids) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT user_did FROM subscriptions WHERE subscribed_post_uri = ?",
        )
        .bind(query.subscribed_post_uri)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Resolve the post a subscription points at from the record key of the post
/// that created it.
pub struct FindSubscribedPostUri {
    pub user_did: String,
    pub subscription_post_rkey: String,
}

impl Processor<FindSubscribedPostUri> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FindSubscribedPostUri")]
    async fn process(&self, query: FindSubscribedPostUri) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT subscribed_post_uri
            FROM subscriptions
            WHERE user_did = ? AND subscription_post_rkey = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(query.user_did)
        .bind(query.subscription_post_rkey)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Delete one user's subscription to a post. Returns the number of rows removed.
pub struct DeleteSubscription {
    pub user_did: String,
    pub subscribed_post_uri: String,
}

impl Processor<DeleteSubscription> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteSubscription")]
    async fn process(&self, cmd: DeleteSubscription) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM subscriptions WHERE subscribed_post_uri = ? AND user_did = ?",
        )
        .bind(cmd.subscribed_post_uri)
        .bind(cmd.user_did)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct ListSubscriptionsForUser {
    pub user_did: String,
}

impl Processor<ListSubscriptionsForUser> for DatabaseProcessor {
    type Output = Vec<Subscription>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListSubscriptionsForUser")]
    async fn process(
        &self,
        query: ListSubscriptionsForUser,
    ) -> Result<Vec<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, subscribed_post_uri, user_did, subscription_post_rkey
            FROM subscriptions
            WHERE user_did = ?
            ORDER BY id DESC
            "#,
        )
        .bind(query.user_did)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Fetch a subscription by id, only if it belongs to `user_did`.
pub struct GetSubscriptionForUser {
    pub user_did: String,
    pub id: i64,
}

impl Processor<GetSubscriptionForUser> for DatabaseProcessor {
    type Output = Option<Subscription>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSubscriptionForUser")]
    async fn process(
        &self,
        query: GetSubscriptionForUser,
    ) -> Result<Option<Subscription>, sqlx::Error> {
        sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, subscribed_post_uri, user_did, subscription_post_rkey
            FROM subscriptions
            WHERE id = ? AND user_did = ?
            "#,
        )
        .bind(query.id)
        .bind(query.user_did)
        .fetch_optional(&self.pool)
        .await
    }
}
