//! Cache-key derivation for (term, context) pairs.
//!
//! The key is `{term}::{suffix}` where the suffix is an 8-hex-digit rolling
//! hash of the context sentence, or `noctx` when no context exists. The hash
//! is the classic 31x string hash (`h = (h << 5) - h + byte`) over the UTF-8
//! bytes with 32-bit two's-complement wraparound, so the same sentence always
//! lands on the same key no matter which page produced it.

/// Suffix used when the selection has no surrounding sentence.
pub const NO_CONTEXT_SUFFIX: &str = "noctx";

/// Build the storage key for a term looked up within `context`.
pub fn cache_key(term: &str, context: &str) -> String {
    if context.is_empty() {
        format!("{term}::{NO_CONTEXT_SUFFIX}")
    } else {
        format!("{term}::{}", context_hash(context))
    }
}

/// Rolling hash of the context, rendered as 8 lowercase hex digits.
fn context_hash(context: &str) -> String {
    let mut hash: i32 = 0;
    for &byte in context.as_bytes() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(byte as i32);
    }
    format!("{:08x}", hash as u32)
}
