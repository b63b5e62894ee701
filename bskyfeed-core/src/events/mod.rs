//! Normalized firehose events.
//!
//! The consumer turns every Jetstream frame into a [`FirehoseEvent`] before
//! it reaches the event handler, so the handler never sees transport types.

pub mod types;

pub use types::{FirehoseEvent, Operation};
