//! Shared wire types for bskyfeed.
//!
//! Everything that crosses a process boundary lives here: Jetstream frames
//! and post records coming in from the firehose, and the JSON objects served
//! by the HTTP API.

pub mod aturi;
pub mod objects;
