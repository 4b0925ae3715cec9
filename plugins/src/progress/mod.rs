//! Progress sinks that print engine events for a human or a machine.

mod jsonl;
mod text;

pub use jsonl::JsonlProgress;
pub use text::TextProgress;
