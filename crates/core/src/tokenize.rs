use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn punctuation() -> &'static Regex {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    PUNCTUATION.get_or_init(|| Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"))
}

/// Lowercase word set of `text` with punctuation removed.
pub fn tokenize(text: &str) -> HashSet<String> {
    if text.is_empty() {
        return HashSet::new();
    }

    punctuation()
        .replace_all(text, "")
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Number of distinct tokens shared by `left` and `right`.
pub fn count_matches(left: &str, right: &str) -> usize {
    let left = tokenize(left);
    let right = tokenize(right);
    left.intersection(&right).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_punctuation_and_lowercases() {
        let tokens = tokenize("What is the MAXIMUM fuel-capacity?");
        let expected: HashSet<String> = ["what", "is", "the", "maximum", "fuelcapacity"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn empty_and_punctuation_only_text_have_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ?!. ").is_empty());
    }

    #[test]
    fn duplicate_words_count_once() {
        assert_eq!(count_matches("fuel fuel fuel", "Fuel system"), 1);
    }

    #[test]
    fn fuel_capacity_title_matches_query() {
        let matches = count_matches("What is the maximum fuel capacity?", "Fuel Capacity Limits");
        assert!(matches >= 2);
    }

    #[test]
    fn count_matches_is_symmetric() {
        let pairs = [
            ("Engine start procedure", "Starting the engine: procedure"),
            ("hydraulic pressure", ""),
            ("APU bleed air", "apu BLEED, air!"),
        ];
        for (left, right) in pairs {
            assert_eq!(count_matches(left, right), count_matches(right, left));
        }
    }

    #[test]
    fn underscores_and_digits_are_word_characters() {
        assert_eq!(count_matches("flap_setting 15", "FLAP_SETTING 15 degrees"), 2);
    }
}
