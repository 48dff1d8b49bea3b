//! Decode safety limits.

use serde::{Deserialize, Serialize};

/// Upper bounds enforced while decoding a value stream.
///
/// Encoded payloads come from a trusted producer in the common case, but a
/// corrupted or truncated stream must never be able to allocate unbounded
/// memory or recurse without limit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Longest accepted text item, in bytes.
    pub max_text_len: usize,
    /// Longest accepted byte-block item, in bytes.
    pub max_bytes_len: usize,
    /// Most entries accepted in one encoded sequence.
    pub max_sequence_entries: usize,
    /// Deepest accepted nesting of values during decode.
    pub max_decode_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_text_len: 1024 * 1024,
            max_bytes_len: 16 * 1024 * 1024,
            max_sequence_entries: 1_000_000,
            max_decode_depth: 128,
        }
    }
}
