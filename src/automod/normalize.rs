//! Text canonicalization
//!
//! Folds leetspeak glyphs to letters, strips every non-word character and
//! lowercases the result. The word filter uses this to map a raw matched
//! substring back to the configured word entry.

/// Glyph folds in evaluation order.
///
/// `7` appears twice. The table is read as a map where the later rule
/// replaces the earlier one, so `7` always folds to `t` and `l` is not
/// reachable through it.
const LEET_FOLDS: &[(char, char)] = &[
    ('@', 'a'),
    ('4', 'a'),
    ('8', 'b'),
    ('3', 'e'),
    ('6', 'g'),
    ('1', 'i'),
    ('7', 'l'),
    ('0', 'o'),
    ('5', 's'),
    ('7', 't'),
];

/// Fold a single glyph using the last matching rule in [`LEET_FOLDS`].
#[must_use]
pub fn fold_glyph(c: char) -> char {
    LEET_FOLDS
        .iter()
        .rev()
        .find(|(glyph, _)| *glyph == c)
        .map_or(c, |(_, letter)| *letter)
}

/// ASCII word character, the same class a `\w` matches without Unicode.
#[must_use]
pub const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Every glyph with a fold rule, in table order (duplicates included).
pub fn leet_glyphs() -> impl Iterator<Item = char> {
    LEET_FOLDS.iter().map(|(glyph, _)| *glyph)
}

/// Every glyph that folds to `letter`, excluding the letter itself.
pub fn glyphs_for(letter: char) -> impl Iterator<Item = char> {
    let mut seen = Vec::with_capacity(2);
    LEET_FOLDS.iter().filter_map(move |(glyph, _)| {
        if fold_glyph(*glyph) == letter && !seen.contains(glyph) {
            seen.push(*glyph);
            Some(*glyph)
        } else {
            None
        }
    })
}

/// Canonicalize `text`.
///
/// Total and idempotent: `normalize(&normalize(s)) == normalize(s)` for any
/// input, and input with no word characters maps to the empty string.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(fold_glyph)
        .filter(|c| is_word_char(*c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_folds_leetspeak() {
        assert_eq!(normalize("b4dw0rd"), "badword");
        assert_eq!(normalize("@ss"), "ass");
        assert_eq!(normalize("8l3ss"), "bless");
        assert_eq!(normalize("61ft"), "gift");
        assert_eq!(normalize("5h0ut"), "shout");
    }

    #[test]
    fn test_seven_folds_to_t() {
        assert_eq!(fold_glyph('7'), 't');
        assert_eq!(normalize("7e57"), "test");
        assert_eq!(normalize("7"), "t");
    }

    #[test]
    fn test_strips_and_lowercases() {
        assert_eq!(normalize("B.A.D w-o_r!d"), "badwo_rd");
        assert_eq!(normalize("  HeLLo  "), "hello");
        assert_eq!(normalize("naïve"), "nave");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!?#%^&*()"), "");
        assert_eq!(normalize("🙂🙃"), "");
    }

    #[test]
    fn test_unmapped_digits_survive() {
        assert_eq!(normalize("2929"), "2929");
    }

    #[test]
    fn test_glyphs_for() {
        assert_eq!(glyphs_for('a').collect::<Vec<_>>(), vec!['@', '4']);
        assert_eq!(glyphs_for('t').collect::<Vec<_>>(), vec!['7']);
        assert_eq!(glyphs_for('l').count(), 0);
        assert_eq!(glyphs_for('z').count(), 0);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(s in any::<String>()) {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_output_is_ascii_word(s in any::<String>()) {
            let out = normalize(&s);
            prop_assert!(out.chars().all(|c| is_word_char(c) && !c.is_ascii_uppercase()));
        }
    }
}
