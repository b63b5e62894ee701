use bskyfeed_sdk::objects::{CommitOperation, EventKind, JetstreamEvent, PostRecord};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// What happened to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Identity, account and unrecognized frames.
    Other,
}

/// One record change, independent of the wire format it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct FirehoseEvent {
    /// DID of the repository that changed.
    pub author_id: String,
    pub operation: Operation,
    /// Collection NSID, empty for non-commit frames.
    pub record_kind: String,
    pub record_key: String,
    /// Raw record body. Only creates carry one.
    pub record: Option<serde_json::Value>,
    /// RFC3339 time the source observed the event.
    pub timestamp: Option<String>,
    /// Source watermark in unix microseconds.
    pub time_us: i64,
}

impl FirehoseEvent {
    /// Decode the payload as a post. `None` when there is no payload or it
    /// is not shaped like a post.
    pub fn decode_post(&self) -> Option<PostRecord> {
        let record = self.record.as_ref()?;
        serde_json::from_value(record.clone()).ok()
    }
}

impl From<JetstreamEvent> for FirehoseEvent {
    fn from(event: JetstreamEvent) -> Self {
        let timestamp = micros_to_rfc3339(event.time_us);

        match (event.kind, event.commit) {
            (EventKind::Commit, Some(commit)) => {
                let operation = match commit.operation {
                    CommitOperation::Create => Operation::Create,
                    CommitOperation::Update => Operation::Update,
                    CommitOperation::Delete => Operation::Delete,
                    CommitOperation::Unknown => Operation::Other,
                };
                let record = match operation {
                    Operation::Create => commit.record,
                    _ => None,
                };
                Self {
                    author_id: event.did,
                    operation,
                    record_kind: commit.collection,
                    record_key: commit.rkey,
                    record,
                    timestamp,
                    time_us: event.time_us,
                }
            }
            _ => Self {
                author_id: event.did,
                operation: Operation::Other,
                record_kind: String::new(),
                record_key: String::new(),
                record: None,
                timestamp,
                time_us: event.time_us,
            },
        }
    }
}

fn micros_to_rfc3339(time_us: i64) -> Option<String> {
    if time_us <= 0 {
        return None;
    }
    let nanos = i128::from(time_us) * 1_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> FirehoseEvent {
        serde_json::from_str::<JetstreamEvent>(json).unwrap().into()
    }

    #[test]
    fn test_create_commit_keeps_record() {
        let event = frame(
            r#"{"did":"did:plc:a","time_us":1725911162329308,"kind":"commit",
                "commit":{"rev":"r","operation":"create","collection":"app.bsky.feed.post",
                "rkey":"k1","record":{"text":"hi"}}}"#,
        );
        assert_eq!(event.author_id, "did:plc:a");
        assert_eq!(event.operation, Operation::Create);
        assert_eq!(event.record_kind, "app.bsky.feed.post");
        assert_eq!(event.record_key, "k1");
        assert_eq!(event.decode_post().unwrap().text, "hi");
        assert!(
            event
                .timestamp
                .as_deref()
                .is_some_and(|ts| ts.starts_with("2024-09-09T19:46:02"))
        );
    }

    #[test]
    fn test_delete_commit_has_no_record() {
        let event = frame(
            r#"{"did":"did:plc:a","time_us":1,"kind":"commit",
                "commit":{"rev":"r","operation":"delete","collection":"app.bsky.feed.post","rkey":"k1"}}"#,
        );
        assert_eq!(event.operation, Operation::Delete);
        assert!(event.record.is_none());
        assert!(event.decode_post().is_none());
    }

    #[test]
    fn test_identity_frame_is_other() {
        let event = frame(
            r#"{"did":"did:plc:a","time_us":42,"kind":"identity","identity":{"handle":"a.test"}}"#,
        );
        assert_eq!(event.operation, Operation::Other);
        assert_eq!(event.time_us, 42);
        assert!(event.record_kind.is_empty());
    }

    #[test]
    fn test_undecodable_record() {
        let event = frame(
            r#"{"did":"did:plc:a","time_us":1,"kind":"commit",
                "commit":{"rev":"r","operation":"create","collection":"app.bsky.feed.post",
                "rkey":"k1","record":{"text":7}}}"#,
        );
        assert!(event.decode_post().is_none());
    }
}
