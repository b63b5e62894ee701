//! FirehoseConsumer processor.
//!
//! Keeps one Jetstream session open at a time and feeds its events to the
//! event handler strictly in arrival order. When a session ends it
//! reconnects from the last processed `time_us` after an exponential
//! backoff. The backoff resets once a session has handled an event without
//! hitting an unavailable store.

use crate::events::FirehoseEvent;
use crate::processors::event_handler::{HandleError, Transition};
use crate::utils::calculate_reconnect_delay;
use async_trait::async_trait;
use bskyfeed_sdk::objects::{JetstreamEvent, POST_COLLECTION};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use kanau::processor::Processor;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_JETSTREAM_ENDPOINT: &str = "wss://jetstream.atproto.tools/subscribe";

// ---------------------------------------------------------------------------
// Event source
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to connect: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("connection lost: {0}")]
    Transport(#[source] tungstenite::Error),
}

pub type EventStream = BoxStream<'static, Result<FirehoseEvent, SourceError>>;

/// Something that can open a stream of firehose events starting at a cursor.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// `cursor_us` is a unix timestamp in microseconds.
    async fn connect(&self, cursor_us: i64) -> Result<EventStream, SourceError>;
}

/// Jetstream over WebSocket, restricted to post records.
#[derive(Debug, Clone)]
pub struct JetstreamSource {
    endpoint: Url,
}

impl JetstreamSource {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    pub fn subscribe_url(&self, cursor_us: i64) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("wantedCollections", POST_COLLECTION)
            .append_pair("cursor", &cursor_us.to_string());
        url
    }
}

#[async_trait]
impl EventSource for JetstreamSource {
    async fn connect(&self, cursor_us: i64) -> Result<EventStream, SourceError> {
        let url = self.subscribe_url(cursor_us);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(SourceError::Connect)?;
        info!(endpoint = %self.endpoint, cursor_us, "Connected to Jetstream");

        let events = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<JetstreamEvent>(&text) {
                    Ok(event) => Some(Ok(FirehoseEvent::from(event))),
                    Err(e) => {
                        warn!(error = %e, "Skipping undecodable Jetstream frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(SourceError::Transport(e))),
            }
        });
        Ok(events.boxed())
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Why a session ended.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] HandleError),
    #[error("stream closed by server")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// How far before "now" the first connection starts reading.
    pub cursor_margin: Duration,
    /// Consecutive failures after which every failure is logged as an error.
    pub escalate_after: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            cursor_margin: Duration::from_secs(60),
            escalate_after: 10,
        }
    }
}

enum SessionEnd {
    Shutdown,
    Ended {
        delivered: usize,
        cause: ConsumeError,
    },
}

pub struct FirehoseConsumer<E, H> {
    source: E,
    handler: H,
    config: ConsumerConfig,
    shutdown_rx: watch::Receiver<bool>,
    /// `time_us` of the last event handed to the handler.
    watermark: Option<i64>,
}

impl<E, H> FirehoseConsumer<E, H>
where
    E: EventSource,
    H: Processor<FirehoseEvent, Output = Transition, Error = HandleError>,
{
    /// # Arguments
    ///
    /// * `source` - Where events come from
    /// * `handler` - Applies each event to the store
    /// * `config` - Backoff and cursor settings
    /// * `shutdown_rx` - Receiver for shutdown signal
    pub fn new(
        source: E,
        handler: H,
        config: ConsumerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            handler,
            config,
            shutdown_rx,
            watermark: None,
        }
    }

    /// Run until shutdown. Transport failures never end the loop.
    pub async fn run(mut self) {
        info!("FirehoseConsumer started");
        let mut failures: u32 = 0;

        loop {
            let cursor = self.resume_cursor();
            match self.run_session(cursor).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Ended { delivered, cause } => {
                    if delivered > 0 {
                        failures = 0;
                    }
                    let delay = calculate_reconnect_delay(
                        self.config.base_delay,
                        failures,
                        self.config.max_delay,
                    );
                    failures = failures.saturating_add(1);

                    if failures >= self.config.escalate_after {
                        error!(
                            error = %cause,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            "Firehose is not recovering"
                        );
                    } else {
                        warn!(
                            error = %cause,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            "Firehose session ended, reconnecting"
                        );
                    }

                    if self.wait_for_shutdown(delay).await {
                        break;
                    }
                }
            }
        }

        info!("FirehoseConsumer shutdown complete");
    }

    fn resume_cursor(&self) -> i64 {
        self.watermark.unwrap_or_else(|| {
            let now_us = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
            let margin_us = self.config.cursor_margin.as_micros() as i128;
            i64::try_from(now_us - margin_us).unwrap_or(0)
        })
    }

    async fn run_session(&mut self, cursor: i64) -> SessionEnd {
        let connected = tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown_rx) => return SessionEnd::Shutdown,
            connected = self.source.connect(cursor) => connected,
        };
        let mut stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                return SessionEnd::Ended {
                    delivered: 0,
                    cause: e.into(),
                };
            }
        };

        let mut delivered = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown_rx) => return SessionEnd::Shutdown,
                next = stream.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    return SessionEnd::Ended {
                        delivered,
                        cause: e.into(),
                    };
                }
                None => {
                    return SessionEnd::Ended {
                        delivered,
                        cause: ConsumeError::Closed,
                    };
                }
            };

            let time_us = event.time_us;
            match self.handler.process(event).await {
                Ok(transition) => debug!(?transition, time_us, "Handled event"),
                Err(e) if e.is_store_unavailable() => {
                    // not counted and not watermarked: the event is replayed
                    return SessionEnd::Ended {
                        delivered,
                        cause: ConsumeError::StoreUnavailable(e),
                    };
                }
                Err(e) => error!(error = %e, time_us, "Failed to handle event"),
            }
            delivered += 1;
            self.watermark = Some(time_us);
        }
    }

    /// Sleep for `delay`. Returns `true` if shutdown was requested meanwhile.
    async fn wait_for_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown_rx) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}

/// Resolves once the flag is set or the sender is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            info!("FirehoseConsumer received shutdown signal");
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Operation;
    use crate::processors::event_handler::Action;
    use crate::store::StoreError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    type Session = Result<Vec<Result<FirehoseEvent, SourceError>>, SourceError>;

    /// Plays back canned sessions, then hangs on an empty stream.
    struct ScriptedSource {
        sessions: Mutex<VecDeque<Session>>,
        cursors: Arc<Mutex<Vec<i64>>>,
        exhausted: Arc<Notify>,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn connect(&self, cursor_us: i64) -> Result<EventStream, SourceError> {
            self.cursors.lock().unwrap().push(cursor_us);
            let next = self.sessions.lock().unwrap().pop_front();
            match next {
                Some(Ok(events)) => Ok(futures_util::stream::iter(events).boxed()),
                Some(Err(e)) => Err(e),
                None => {
                    self.exhausted.notify_one();
                    Ok(futures_util::stream::pending().boxed())
                }
            }
        }
    }

    /// Records record keys. Fails on the listed keys, flagging the store as
    /// unavailable when the paired bool is set.
    struct RecordingHandler {
        seen: Arc<Mutex<Vec<String>>>,
        fail_on: Vec<(&'static str, bool)>,
    }

    impl Processor<FirehoseEvent> for RecordingHandler {
        type Output = Transition;
        type Error = HandleError;

        async fn process(&self, event: FirehoseEvent) -> Result<Transition, HandleError> {
            self.seen.lock().unwrap().push(event.record_key.clone());
            for &(rkey, unavailable) in &self.fail_on {
                if rkey == event.record_key {
                    let source = if unavailable {
                        sqlx::Error::PoolClosed
                    } else {
                        sqlx::Error::RowNotFound
                    };
                    return Err(HandleError::new(
                        Action::Subscribe,
                        StoreError::new("add subscription", source),
                    ));
                }
            }
            Ok(Transition::Ignored)
        }
    }

    fn event(rkey: &str, time_us: i64) -> Result<FirehoseEvent, SourceError> {
        Ok(FirehoseEvent {
            author_id: "did:plc:a".to_string(),
            operation: Operation::Create,
            record_kind: POST_COLLECTION.to_string(),
            record_key: rkey.to_string(),
            record: None,
            timestamp: None,
            time_us,
        })
    }

    fn fast_config() -> ConsumerConfig {
        ConsumerConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            ..ConsumerConfig::default()
        }
    }

    struct Harness {
        seen: Arc<Mutex<Vec<String>>>,
        cursors: Arc<Mutex<Vec<i64>>>,
        exhausted: Arc<Notify>,
        shutdown_tx: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn start(
            sessions: Vec<Session>,
            fail_on: Vec<(&'static str, bool)>,
            config: ConsumerConfig,
        ) -> Self {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let cursors = Arc::new(Mutex::new(Vec::new()));
            let exhausted = Arc::new(Notify::new());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let consumer = FirehoseConsumer::new(
                ScriptedSource {
                    sessions: Mutex::new(sessions.into()),
                    cursors: cursors.clone(),
                    exhausted: exhausted.clone(),
                },
                RecordingHandler {
                    seen: seen.clone(),
                    fail_on,
                },
                config,
                shutdown_rx,
            );
            let task = tokio::spawn(consumer.run());
            Self {
                seen,
                cursors,
                exhausted,
                shutdown_tx,
                task,
            }
        }

        async fn finish(self) -> (Vec<String>, Vec<i64>) {
            tokio::time::timeout(Duration::from_secs(5), self.exhausted.notified())
                .await
                .unwrap();
            self.shutdown_tx.send(true).unwrap();
            tokio::time::timeout(Duration::from_secs(5), self.task)
                .await
                .unwrap()
                .unwrap();
            let seen = self.seen.lock().unwrap().clone();
            let cursors = self.cursors.lock().unwrap().clone();
            (seen, cursors)
        }
    }

    #[test]
    fn test_subscribe_url() {
        let source = JetstreamSource::new(Url::parse(DEFAULT_JETSTREAM_ENDPOINT).unwrap());
        assert_eq!(
            source.subscribe_url(1_700_000_000_000_000).as_str(),
            "wss://jetstream.atproto.tools/subscribe?wantedCollections=app.bsky.feed.post&cursor=1700000000000000"
        );
    }

    #[tokio::test]
    async fn test_reconnects_from_watermark() {
        let harness = Harness::start(
            vec![
                Ok(vec![
                    event("k1", 100),
                    event("k2", 200),
                    Err(SourceError::Transport(tungstenite::Error::ConnectionClosed)),
                    event("never", 250),
                ]),
                Ok(vec![event("k3", 300)]),
            ],
            Vec::new(),
            fast_config(),
        );
        let started_us = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
        let (seen, cursors) = harness.finish().await;

        assert_eq!(seen, ["k1", "k2", "k3"]);
        assert_eq!(cursors.len(), 3);
        // first connect starts one margin before now
        let margin_us = 60_000_000;
        assert!(i128::from(cursors[0]) <= started_us - margin_us + 1_000_000);
        assert!(i128::from(cursors[0]) >= started_us - margin_us - 5_000_000);
        assert_eq!(cursors[1], 200);
        assert_eq!(cursors[2], 300);
    }

    #[tokio::test]
    async fn test_continues_after_handler_error() {
        let harness = Harness::start(
            vec![Ok(vec![event("k1", 10), event("k2", 20), event("k3", 30)])],
            vec![("k2", false)],
            fast_config(),
        );
        let (seen, cursors) = harness.finish().await;

        assert_eq!(seen, ["k1", "k2", "k3"]);
        assert_eq!(cursors[1], 30);
    }

    #[tokio::test]
    async fn test_store_unavailable_ends_session() {
        let harness = Harness::start(
            vec![
                Ok(vec![event("k1", 10), event("k2", 20), event("k3", 30)]),
                Ok(vec![event("k2", 20), event("k3", 30)]),
            ],
            vec![("k2", true)],
            fast_config(),
        );
        let (seen, cursors) = harness.finish().await;

        // k2 fails both times and is replayed from the watermark before it
        assert_eq!(seen, ["k1", "k2", "k2"]);
        assert_eq!(cursors[1], 10);
        assert_eq!(cursors[2], 10);
    }

    /// Serves the same single event on every connect.
    struct EndlessSource {
        connects: Arc<Mutex<Vec<tokio::time::Instant>>>,
        target: usize,
        reached: Arc<Notify>,
    }

    #[async_trait]
    impl EventSource for EndlessSource {
        async fn connect(&self, _cursor_us: i64) -> Result<EventStream, SourceError> {
            let count = {
                let mut connects = self.connects.lock().unwrap();
                connects.push(tokio::time::Instant::now());
                connects.len()
            };
            if count == self.target {
                self.reached.notify_one();
            }
            Ok(futures_util::stream::iter(vec![event("k1", 10)])
                .chain(futures_util::stream::pending())
                .boxed())
        }
    }

    #[tokio::test]
    async fn test_backoff_grows_while_store_is_down() {
        let connects = Arc::new(Mutex::new(Vec::new()));
        let reached = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = FirehoseConsumer::new(
            EndlessSource {
                connects: connects.clone(),
                target: 6,
                reached: reached.clone(),
            },
            RecordingHandler {
                seen: Arc::new(Mutex::new(Vec::new())),
                fail_on: vec![("k1", true)],
            },
            ConsumerConfig {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(640),
                ..ConsumerConfig::default()
            },
            shutdown_rx,
        );
        let task = tokio::spawn(consumer.run());

        tokio::time::timeout(Duration::from_secs(5), reached.notified())
            .await
            .unwrap();
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        let connects = connects.lock().unwrap().clone();
        let gaps: Vec<Duration> = connects.windows(2).map(|w| w[1] - w[0]).collect();
        // 10, 20, 40, 80, 160 ms
        assert!(gaps[0] >= Duration::from_millis(10), "{gaps:?}");
        assert!(gaps[3] >= Duration::from_millis(80), "{gaps:?}");
        assert!(gaps[4] >= Duration::from_millis(160), "{gaps:?}");
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let consumer = FirehoseConsumer::new(
            ScriptedSource {
                sessions: Mutex::new(
                    vec![Err(SourceError::Connect(
                        tungstenite::Error::ConnectionClosed,
                    ))]
                    .into(),
                ),
                cursors: cursors.clone(),
                exhausted: Arc::new(Notify::new()),
            },
            RecordingHandler {
                seen: Arc::new(Mutex::new(Vec::new())),
                fail_on: Vec::new(),
            },
            ConsumerConfig {
                base_delay: Duration::from_secs(3600),
                max_delay: Duration::from_secs(3600),
                ..ConsumerConfig::default()
            },
            shutdown_rx,
        );
        let task = tokio::spawn(consumer.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cursors.lock().unwrap().len(), 1);
    }
}
