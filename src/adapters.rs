//! Built-in adapters.
//!
//! - `JsonLinesSource`: reads newline-delimited JSON files in fixed-size blobs
//! - `HttpSink`: delivers each event as a JSON POST request
//!
//! Warehouse readers and advertising-platform senders plug in through the
//! [`HookRegistry`](crate::HookRegistry) under custom tags.

mod http_sink;
mod jsonl_source;

pub use http_sink::HttpSink;
pub use jsonl_source::JsonLinesSource;
