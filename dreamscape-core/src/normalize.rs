//! Entity name normalization.
//!
//! Every entity that enters the graph passes through here first, whichever
//! extraction strategy produced it.

use serde_json::Value;
use std::collections::HashSet;

/// Normalize raw entity candidates.
///
/// Each candidate is trimmed, its whitespace collapsed and every word
/// capitalized. Empty results are dropped and duplicates removed, keeping
/// the first occurrence.
pub fn normalize<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for item in items {
        let Some(name) = normalize_one(item.as_ref()) else {
            continue;
        };
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }

    out
}

/// Normalize untyped candidates, ignoring anything that is not a string.
pub fn normalize_values<'a, I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Value>,
{
    normalize(items.into_iter().filter_map(Value::as_str))
}

/// Normalize a single candidate, or `None` if nothing is left after trimming.
pub fn normalize_one(raw: &str) -> Option<String> {
    let words: Vec<String> = raw.split_whitespace().map(capitalize).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// First character uppercased, the rest lowercased.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
