//! Grammar cleanup collaborator: pure, infallible text → text.

use std::sync::OnceLock;

use regex::Regex;

/// Best-effort text cleanup. Never fails; on any internal problem the input
/// comes back unchanged.
pub trait GrammarCorrector: Send + Sync {
    fn correct(&self, text: &str, language: &str) -> String;
}

/// Sentence-level punctuation and capitalization fixer.
///
/// Language-independent cleanup applied to raw dictation output:
/// - trims surrounding whitespace
/// - capitalizes the first letter
/// - capitalizes after `.` `!` `?`
/// - appends a period when the text ends without terminal punctuation
#[derive(Debug, Clone, Default)]
pub struct PunctuationCorrector;

fn sentence_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([.!?]\s+)(\p{Ll})").expect("static regex"))
}

impl PunctuationCorrector {
    pub fn new() -> Self {
        Self
    }
}

impl GrammarCorrector for PunctuationCorrector {
    fn correct(&self, text: &str, _language: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        // Capitalize the first letter.
        let mut chars = trimmed.chars();
        let first = chars.next().expect("non-empty after trim");
        let mut result: String = first.to_uppercase().chain(chars).collect();

        // Capitalize after sentence terminators.
        result = sentence_start_re()
            .replace_all(&result, |caps: &regex::Captures<'_>| {
                format!("{}{}", &caps[1], caps[2].to_uppercase())
            })
            .into_owned();

        // Terminal punctuation.
        if let Some(last) = result.chars().last() {
            if !".!?\"')".contains(last) {
                result.push('.');
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalizes_and_terminates() {
        let grammar = PunctuationCorrector::new();
        assert_eq!(grammar.correct("helo wrld", "en"), "Helo wrld.");
    }

    #[test]
    fn test_trims_whitespace() {
        let grammar = PunctuationCorrector::new();
        assert_eq!(grammar.correct("  hello there  ", "en"), "Hello there.");
    }

    #[test]
    fn test_capitalizes_after_sentence_end() {
        let grammar = PunctuationCorrector::new();
        assert_eq!(
            grammar.correct("first thing. second thing! third?", "en"),
            "First thing. Second thing! Third?"
        );
    }

    #[test]
    fn test_keeps_existing_terminator() {
        let grammar = PunctuationCorrector::new();
        assert_eq!(grammar.correct("done!", "en"), "Done!");
        assert_eq!(grammar.correct("\"quoted\"", "en"), "\"quoted\"");
    }

    #[test]
    fn test_empty_input() {
        let grammar = PunctuationCorrector::new();
        assert_eq!(grammar.correct("   ", "en"), "");
    }

    #[test]
    fn test_already_clean_text_is_stable() {
        let grammar = PunctuationCorrector::new();
        let clean = "This is fine. So is this.";
        assert_eq!(grammar.correct(clean, "en"), clean);
    }
}
