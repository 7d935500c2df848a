//! Cache Codecs
//!
//! How entity values become stored payloads. Payloads travel as strings
//! because the remote store's wire format is string-valued.

mod json;
pub use json::JsonCodec;
