//! Translation of agent stdout into supervisor events.

mod stream_json;

pub use stream_json::StreamJsonParser;
