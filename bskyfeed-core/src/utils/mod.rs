pub mod backoff;

pub use backoff::calculate_reconnect_delay;
