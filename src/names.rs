//! Author name normalization.
//!
//! User-supplied author entries are often pasted from spreadsheets or
//! program-committee lists and carry extra material: affiliations after a
//! separator, parenthetical tags, irregular whitespace. These helpers reduce an
//! entry to the display name stored in the dataset.
//!
//! DBLP disambiguates homonymous authors with a 4-digit suffix
//! (`"Jane Doe 0001"`). The *base name* drops that suffix so that all
//! variants of a person can be matched together.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Separators that end the name part of an entry, in priority order.
pub const ENTRY_SEPARATORS: [&str; 4] = ["||", "|", "::", "\t"];

static BASE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)(?:\s+[0-9]{4})?$").unwrap_or_else(|e| panic!("invalid base name regex: {e}"))
});

/// Collapse whitespace runs to single spaces and trim both ends.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip a trailing 4-digit disambiguation suffix.
///
/// ```
/// use coauthors::names::base_name;
///
/// assert_eq!(base_name("Jane Doe 0001"), "Jane Doe");
/// assert_eq!(base_name("Jane Doe"), "Jane Doe");
/// assert_eq!(base_name("Jane Doe 12345"), "Jane Doe 12345");
/// ```
#[must_use]
pub fn base_name(name: &str) -> &str {
    BASE_NAME_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map_or(name, |m| m.as_str())
}

/// Check whether `name` is `base` itself or `base` plus a 4-digit suffix.
#[must_use]
pub fn is_base_variant(name: &str, base: &str) -> bool {
    if name == base {
        return true;
    }
    match name.strip_prefix(base).and_then(|rest| rest.strip_prefix(' ')) {
        Some(suffix) => suffix.len() == 4 && suffix.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Reduce a raw entry to a normalized author name.
///
/// The entry is normalized, cut at the first separator of
/// [`ENTRY_SEPARATORS`] it still contains, and then stripped of trailing
/// `" (...)"` groups until none with non-blank content remains. A TAB
/// turns into a space during normalization and so never separates.
///
/// ```
/// use coauthors::names::parse_author_entry;
///
/// assert_eq!(parse_author_entry("  Jane   Doe || MIT "), "Jane Doe");
/// assert_eq!(parse_author_entry("Jane Doe (MIT) (PC chair)"), "Jane Doe");
/// ```
#[must_use]
pub fn parse_author_entry(entry: &str) -> String {
    let mut text = normalize(entry);
    if let Some(head) = ENTRY_SEPARATORS
        .iter()
        .find_map(|sep| text.split_once(sep).map(|(left, _)| left))
    {
        text = normalize(head);
    }

    while text.ends_with(')') {
        let Some(idx) = text.rfind(" (") else {
            break;
        };
        let inner = &text[idx + 2..text.len() - 1];
        if inner.trim().is_empty() {
            break;
        }
        text = normalize(&text[..idx]);
    }

    text
}

/// Parse every entry, drop empties and de-duplicate preserving first occurrence.
#[must_use]
pub fn sanitize_entries<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for entry in entries {
        let name = parse_author_entry(entry.as_ref());
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        cleaned.push(name);
    }
    cleaned
}
