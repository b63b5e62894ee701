//! Long-running processors of the ingestion pipeline.
//!
//! - `FirehoseConsumer`: reads Jetstream, hands each event to the handler
//! - `EventHandler`: applies one event to the subscription store

pub mod consumer;
pub mod event_handler;

pub use consumer::{
    ConsumeError, ConsumerConfig, EventSource, EventStream, FirehoseConsumer, JetstreamSource,
    SourceError,
};
pub use event_handler::{
    AllowList, EventHandler, HandleError, HandlerConfig, Transition, unsubscribe,
};
