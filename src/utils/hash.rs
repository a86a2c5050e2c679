//! Stable short identifiers.
//!
//! Page and element ids are truncated BLAKE3 digests: 64 bits rendered as
//! 16 lowercase hex characters. They must be stable across runs, so nothing
//! process-specific (seeds, addresses) may feed into them.

/// Hex characters kept from the digest (64 bits).
const ID_LEN: usize = 16;

/// Hash `input` into a 16-character hex id.
pub fn short_id(input: &[u8]) -> String {
    let hex = blake3::hash(input).to_hex();
    hex.as_str()[..ID_LEN].to_owned()
}
