//! Content-addressed cache keys.
//!
//! Keys are SHA-256 digests over a `|`-joined description of the request and
//! the dataset signature. Unset optional parameters are encoded as `-1`.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::signature::DbSignature;

/// Lowercase hexadecimal SHA-256 of `text`.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sorted, de-duplicated, comma-joined form of an author ID set.
///
/// ```
/// use coauthors::cache::key::canonical_ids;
///
/// assert_eq!(canonical_ids(&[30, 4, 30, 12]), "4,12,30");
/// ```
#[must_use]
pub fn canonical_ids(ids: &[i64]) -> String {
    ids.iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Key of an author-resolution entry.
#[must_use]
pub fn author_key(
    sig: &DbSignature,
    query: &str,
    exact_base_match: bool,
    limit: Option<u32>,
) -> String {
    sha256_hex(&format!(
        "author_ids|{}|{}|{}|{}|{}",
        sig.size,
        sig.mtime_ns,
        u8::from(exact_base_match),
        encode_optional(limit),
        query
    ))
}

/// Key of a pair-publication entry.
///
/// The two canonical ID strings are ordered before hashing, so the key does
/// not depend on which side an ID set was submitted on.
#[must_use]
pub fn pair_key(
    sig: &DbSignature,
    left_ids: &[i64],
    right_ids: &[i64],
    limit_per_pair: Option<u32>,
    year_min: Option<i32>,
) -> String {
    let left = canonical_ids(left_ids);
    let right = canonical_ids(right_ids);
    let (a, b) = if left <= right {
        (left, right)
    } else {
        (right, left)
    };
    sha256_hex(&format!(
        "pair_items|{}|{}|{}|{}|{}|{}",
        sig.size,
        sig.mtime_ns,
        encode_optional(limit_per_pair),
        encode_optional(year_min),
        a,
        b
    ))
}

fn encode_optional<T: Into<i64>>(value: Option<T>) -> i64 {
    value.map_or(-1, Into::into)
}
