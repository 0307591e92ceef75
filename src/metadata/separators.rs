//! Multi-value splitting and joining.
//!
//! Taggers store multiple artists or genres in one string using all kinds of
//! delimiters. A [`Separators`] set holds the delimiters recognised when
//! splitting, plus the separator used when joining values back for display.

/// Delimiters always recognised, in priority order.
const BUILTIN_DELIMITERS: &[&str] = &[
    " feat. ", " ft. ", " Feat. ", " Ft. ", ";", ":", "|", "#", "/", " with ", "&",
];

/// A custom item separator containing any of these is only used for joining.
const SPLIT_CHARS: &[char] = &[';', '/', ',', '&', '|', '#'];

/// Join separator when none is configured.
pub const DEFAULT_ITEM_SEPARATOR: &str = " / ";

/// Resolved delimiter set. Built once from configuration and passed around
/// read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separators {
    delimiters: Vec<String>,
    join_with: String,
}

impl Default for Separators {
    fn default() -> Self {
        Self::with_custom(DEFAULT_ITEM_SEPARATOR)
    }
}

impl Separators {
    /// Built-in delimiters plus the user's item separator.
    ///
    /// The item separator always becomes the join separator. It is added to
    /// the split set only when it contains none of `;/,&|#`.
    pub fn with_custom(item_separator: &str) -> Self {
        let mut delimiters: Vec<String> = BUILTIN_DELIMITERS.iter().map(|d| d.to_string()).collect();

        if !item_separator.is_empty()
            && !item_separator.contains(SPLIT_CHARS)
            && !delimiters.iter().any(|d| d == item_separator)
        {
            delimiters.push(item_separator.to_string());
        }

        let join_with = if item_separator.is_empty() {
            DEFAULT_ITEM_SEPARATOR.to_string()
        } else {
            item_separator.to_string()
        };

        Self {
            delimiters,
            join_with,
        }
    }

    pub fn delimiters(&self) -> &[String] {
        &self.delimiters
    }

    pub fn join_with(&self) -> &str {
        &self.join_with
    }

    /// Split `value` on every delimiter in the set.
    ///
    /// Pieces are trimmed and empty pieces are dropped.
    pub fn split(&self, value: &str) -> Vec<String> {
        self.split_with(value, &[])
    }

    /// Split on the set plus `extra` delimiters for this call only.
    pub fn split_with(&self, value: &str, extra: &[&str]) -> Vec<String> {
        let candidates: Vec<&str> = self
            .delimiters
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
            .filter(|d| !d.is_empty())
            .collect();

        let mut parts = Vec::new();
        let mut rest = value;
        while let Some((at, len)) = earliest_match(rest, &candidates) {
            push_trimmed(&mut parts, &rest[..at]);
            rest = &rest[at + len..];
        }
        push_trimmed(&mut parts, rest);
        parts
    }

    /// Join values with the configured separator.
    pub fn join(&self, values: &[String]) -> String {
        values.join(&self.join_with)
    }

    /// Split then join, giving one consistently delimited string.
    pub fn rejoin(&self, value: &str) -> String {
        self.join(&self.split(value))
    }
}

/// Position and length of the first delimiter in `haystack`. On a tie the
/// longest delimiter wins.
fn earliest_match(haystack: &str, delimiters: &[&str]) -> Option<(usize, usize)> {
    delimiters
        .iter()
        .filter_map(|d| haystack.find(d).map(|at| (at, d.len())))
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
}

fn push_trimmed(parts: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        parts.push(piece.to_string());
    }
}

/// Uppercase the first letter of every word, leaving the rest untouched.
pub fn capitalize_words(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.push(c);
        }
    }
    out
}
