//! Community-wide compiled word pattern
//!
//! The pattern is an opaque value to the filter: it is built from the guild's
//! word list whenever that list changes and handed to the match worker as-is.

use crate::automod::normalize::{glyphs_for, is_word_char, leet_glyphs, normalize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Regex source shared by every message scanned in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompiledPattern(Arc<str>);

impl CompiledPattern {
    /// Wrap an existing regex source.
    pub fn from_source(source: impl Into<Arc<str>>) -> Self {
        Self(source.into())
    }

    /// Build a pattern matching any of `words`, tolerant to leetspeak,
    /// letter case and punctuation between letters.
    ///
    /// Every substring the pattern matches normalizes to one of the words.
    /// Returns `None` when no word survives normalization.
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let canonical: BTreeSet<String> = words
            .into_iter()
            .map(normalize)
            .filter(|w| !w.is_empty())
            .collect();
        if canonical.is_empty() {
            return None;
        }

        // Longest first so the alternation prefers the most specific entry.
        let mut ordered: Vec<&String> = canonical.iter().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let separator = separator_class();
        let alternatives: Vec<String> = ordered
            .into_iter()
            .map(|word| {
                word.chars()
                    .map(letter_class)
                    .collect::<Vec<_>>()
                    .join(&separator)
            })
            .collect();

        Some(Self::from_source(format!("(?:{})", alternatives.join("|"))))
    }

    /// The regex source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Character class for one canonical letter: the letter, its uppercase form
/// and every glyph that folds to it.
fn letter_class(letter: char) -> String {
    let mut members = String::new();
    members.push(letter);
    if letter.is_ascii_lowercase() {
        members.push(letter.to_ascii_uppercase());
    }
    for glyph in glyphs_for(letter) {
        members.push(glyph);
    }

    if members.chars().count() == 1 {
        regex::escape(&members)
    } else {
        let mut class = String::from("[");
        for c in members.chars() {
            let _ = write!(class, "{}", regex::escape(&c.to_string()));
        }
        class.push(']');
        class
    }
}

/// Run of characters the normalizer strips. Non-word leet glyphs are
/// excluded, since they fold to letters instead of being removed.
fn separator_class() -> String {
    let mut class = String::from("[^0-9A-Za-z_");
    for glyph in leet_glyphs().filter(|g| !is_word_char(*g)) {
        class.push_str(&regex::escape(&glyph.to_string()));
    }
    class.push_str("]*");
    class
}
