mod repo_key;
mod ring_bytes;
mod slug;

pub use repo_key::repo_key;
pub use ring_bytes::RingBytes;
pub use slug::slugify;
