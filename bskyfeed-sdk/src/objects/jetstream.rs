//! Jetstream frame types.
//!
//! Jetstream is the JSON re-encoding of the atproto firehose. Every text
//! frame on the WebSocket is one [`JetstreamEvent`].

use serde::{Deserialize, Serialize};

/// A single frame received from a Jetstream subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JetstreamEvent {
    /// DID of the repository the event belongs to.
    pub did: String,
    /// Server-side timestamp in unix microseconds. Used as the resume cursor.
    pub time_us: i64,
    pub kind: EventKind,
    /// Present when `kind` is [`EventKind::Commit`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Commit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Commit,
    Identity,
    Account,
    #[serde(other)]
    Unknown,
}

/// A repository commit touching a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub rev: String,
    pub operation: CommitOperation,
    pub collection: String,
    pub rkey: String,
    /// The record body. Only present for creates and updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOperation {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}
