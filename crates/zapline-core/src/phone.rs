// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone canonicalization.
//!
//! Payload identifiers go through [`normalize`]. Providers disagree on the
//! mobile `9` (the 9th subscriber digit added to Brazilian mobiles), so
//! lookups always go through [`variants`] and never compare raw keys
//! directly, while rows are written under [`storage_key`].

/// Country code prepended to bare area-code numbers.
pub const COUNTRY_CODE: &str = "55";

/// Digit inserted after the area code in 13-digit mobile keys.
pub const MOBILE_DIGIT: char = '9';

/// Prefix reserved for group identifiers.
pub const GROUP_PREFIX: &str = "120363";

const OPAQUE_DOMAINS: [&str; 3] = ["lid", "broadcast", "newsletter"];

/// Canonicalize a raw phone, JID, or group identifier.
///
/// Returns an empty string when the input carries no usable key. The
/// function never guesses: opaque ids, timestamps, and short codes all
/// collapse to `""`, and legacy group ids are only recognized with their
/// `@g.us` or `-group` marker.
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, false)
}

/// Canonicalize an identifier the caller already knows to be a group.
///
/// Accepts bare legacy group digits that [`normalize`] rejects. Returns
/// `""` when the input has no group shape.
pub fn normalize_group(raw: &str) -> String {
    normalize_with(raw, true)
}

fn normalize_with(raw: &str, known_group: bool) -> String {
    let raw = raw.trim();
    let (user, domain) = match raw.split_once('@') {
        Some((user, domain)) => (user, Some(domain.trim().to_ascii_lowercase())),
        None => (raw, None),
    };

    if let Some(domain) = domain.as_deref() {
        if OPAQUE_DOMAINS.contains(&domain) {
            return String::new();
        }
    }

    let group_marker = known_group
        || domain.as_deref() == Some("g.us")
        || user.to_ascii_lowercase().ends_with("-group");

    let user = user.split(':').next().unwrap_or_default();
    let digits: String = user.chars().filter(char::is_ascii_digit).collect();

    if is_modern_group(&digits) || (group_marker && is_legacy_group(&digits)) {
        return digits;
    }
    if group_marker {
        return String::new();
    }

    match digits.len() {
        12 | 13 if digits.starts_with(COUNTRY_CODE) => digits,
        10 | 11 if !digits.starts_with('0') => format!("{COUNTRY_CODE}{digits}"),
        _ => String::new(),
    }
}

/// Whether a canonical key identifies a group.
///
/// Individual keys never exceed 13 digits, so a canonical key in the
/// legacy group range can only have come from a marked group id.
pub fn is_group_key(key: &str) -> bool {
    key.chars().all(|c| c.is_ascii_digit()) && (is_modern_group(key) || is_legacy_group(key))
}

fn is_modern_group(digits: &str) -> bool {
    digits.starts_with(GROUP_PREFIX) && (15..=22).contains(&digits.len())
}

/// Creator phone followed by a creation timestamp.
fn is_legacy_group(digits: &str) -> bool {
    (23..=30).contains(&digits.len())
}

/// Re-canonicalize a key that may already be canonical.
fn canonical(key: &str) -> String {
    let key = key.trim();
    if is_group_key(key) {
        key.to_string()
    } else {
        normalize(key)
    }
}

/// Every stored form the same physical contact may have, canonical key first.
pub fn variants(key: &str) -> Vec<String> {
    let key = canonical(key);
    if key.is_empty() {
        return Vec::new();
    }
    if is_group_key(&key) {
        return vec![key];
    }

    let mut out = vec![key.clone()];
    match key.len() {
        13 if key.as_bytes()[4] == MOBILE_DIGIT as u8 => {
            out.push(format!("{}{}", &key[..4], &key[5..]));
        }
        12 => {
            out.push(format!("{}{MOBILE_DIGIT}{}", &key[..4], &key[4..]));
        }
        _ => {}
    }
    out
}

/// Equality form: the canonical key with the mobile `9` removed.
///
/// Only used to compare and group keys, never stored.
pub fn dedupe_key(raw: &str) -> String {
    let key = canonical(raw);
    if key.len() == 13 && !is_group_key(&key) && key.as_bytes()[4] == MOBILE_DIGIT as u8 {
        format!("{}{}", &key[..4], &key[5..])
    } else {
        key
    }
}

/// The one form stored for every variant of a contact: the mobile `9`
/// present.
///
/// Every variant of a key maps to the same storage key, which lets the
/// unique index on open conversations serialize creates that arrive under
/// different variants. Subscriber numbers starting with 2-5 are landlines
/// and keep 12 digits.
pub fn storage_key(key: &str) -> String {
    let key = dedupe_key(key);
    with_mobile_digit(key)
}

/// Form handed to a provider when sending: the mobile `9` present.
///
/// Group keys pass through. A 12-digit key whose subscriber number starts
/// with 2-5 is a landline and keeps its 12 digits.
pub fn to_send_format(key: &str) -> String {
    with_mobile_digit(canonical(key))
}

fn with_mobile_digit(key: String) -> String {
    if key.len() != 12 || is_group_key(&key) {
        return key;
    }
    match key.as_bytes()[4] {
        b'6'..=b'9' => format!("{}{MOBILE_DIGIT}{}", &key[..4], &key[4..]),
        _ => key,
    }
}
