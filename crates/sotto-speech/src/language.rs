//! Language detection collaborator: pure, infallible text → language code.

/// A detected language with a human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageGuess {
    pub code: String,
    pub display_name: String,
}

/// Refines the inference engine's language hint against the actual text.
pub trait LanguageDetector: Send + Sync {
    /// Detect the dominant language of `text`. `hint` is the inference
    /// engine's guess and wins whenever the text itself is inconclusive.
    fn detect(&self, text: &str, hint: Option<&str>) -> LanguageGuess;
}

/// Stop-word frequency detector.
///
/// Counts hits against small per-language function-word sets and picks the
/// language with the most. The hint gets a head start so short or ambiguous
/// texts resolve toward the model's opinion; with no hits at all the hint
/// (or English) wins outright.
#[derive(Debug, Clone, Default)]
pub struct HeuristicLanguageDetector;

/// (code, display name, function words)
const PROFILES: &[(&str, &str, &[&str])] = &[
    (
        "en",
        "English",
        &[
            "the", "and", "is", "of", "to", "in", "that", "it", "was", "for", "with", "you",
        ],
    ),
    (
        "de",
        "German",
        &[
            "der", "die", "das", "und", "ist", "nicht", "ich", "ein", "mit", "für", "auf", "sie",
        ],
    ),
    (
        "fr",
        "French",
        &[
            "le", "la", "les", "et", "est", "une", "je", "pas", "vous", "dans", "que", "pour",
        ],
    ),
    (
        "es",
        "Spanish",
        &[
            "el", "la", "los", "y", "es", "una", "yo", "no", "con", "para", "que", "por",
        ],
    ),
    (
        "it",
        "Italian",
        &[
            "il", "la", "di", "e", "che", "non", "una", "per", "sono", "con", "del", "come",
        ],
    ),
];

/// Score bonus the hinted language starts with, in word-hits.
const HINT_WEIGHT: usize = 2;

impl HeuristicLanguageDetector {
    pub fn new() -> Self {
        Self
    }

    fn display_name(code: &str) -> String {
        PROFILES
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, name, _)| name.to_string())
            .unwrap_or_else(|| code.to_uppercase())
    }
}

impl LanguageDetector for HeuristicLanguageDetector {
    fn detect(&self, text: &str, hint: Option<&str>) -> LanguageGuess {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let mut best_code = hint.unwrap_or("en");
        let mut best_score = 0usize;

        for &(code, _, stop_words) in PROFILES {
            let mut score = words
                .iter()
                .filter(|w| stop_words.contains(&w.as_str()))
                .count();
            if hint == Some(code) {
                score += HINT_WEIGHT;
            }
            if score > best_score {
                best_score = score;
                best_code = code;
            }
        }

        LanguageGuess {
            code: best_code.to_string(),
            display_name: Self::display_name(best_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect("the dog is in the garden and it was raining", None);
        assert_eq!(guess.code, "en");
        assert_eq!(guess.display_name, "English");
    }

    #[test]
    fn test_detects_german() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect("der hund ist nicht mit der katze", None);
        assert_eq!(guess.code, "de");
    }

    #[test]
    fn test_hint_wins_on_inconclusive_text() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect("zzz qqq xxx", Some("fr"));
        assert_eq!(guess.code, "fr");
        assert_eq!(guess.display_name, "French");
    }

    #[test]
    fn test_no_hint_no_hits_defaults_to_english() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect("zzz qqq", None);
        assert_eq!(guess.code, "en");
    }

    #[test]
    fn test_strong_text_evidence_overrides_hint() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect(
            "the dog and the cat was in the house for the winter with you",
            Some("de"),
        );
        assert_eq!(guess.code, "en");
    }

    #[test]
    fn test_unknown_hint_display_name_uppercases() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect("", Some("nl"));
        assert_eq!(guess.code, "nl");
        assert_eq!(guess.display_name, "NL");
    }

    #[test]
    fn test_punctuation_stripped_before_matching() {
        let detector = HeuristicLanguageDetector::new();
        let guess = detector.detect("The, and. is! of?", None);
        assert_eq!(guess.code, "en");
    }
}
