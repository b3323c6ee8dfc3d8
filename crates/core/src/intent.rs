use crate::models::{Intent, IntentResult, Language};
use crate::tables::SANITATION_KEYWORDS;

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Keyword intent detection over the five supported languages.
///
/// Matching is plain substring containment on the lower-cased text, with no
/// word-boundary checks, so a keyword embedded in an unrelated word still
/// matches (e.g. "wastewater" or "trashy"). The first language in declared
/// order with any hit wins, regardless of where in the text the hit is.
pub fn detect_intent(text: &str, default_language: Language) -> IntentResult {
    let lower = text.to_lowercase();

    for (language, keywords) in SANITATION_KEYWORDS.iter() {
        if let Some(keyword) = first_contained(&lower, keywords) {
            return IntentResult {
                intent: Intent::FileComplaint,
                language: *language,
                keyword: Some(keyword.to_string()),
            };
        }
    }

    IntentResult {
        intent: Intent::Unknown,
        language: default_language,
        keyword: None,
    }
}

fn first_contained<'a>(input: &str, needles: &[&'a str]) -> Option<&'a str> {
    needles.iter().copied().find(|needle| input.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_complaint() {
        let result = detect_intent("there is a lot of garbage here", Language::En);
        assert_eq!(result.intent, Intent::FileComplaint);
        assert_eq!(result.language, Language::En);
        assert_eq!(result.keyword.as_deref(), Some("garbage"));
    }

    #[test]
    fn detects_hindi_complaint() {
        let result = detect_intent("कचरा की समस्या है", Language::En);
        assert_eq!(result.intent, Intent::FileComplaint);
        assert_eq!(result.language, Language::Hi);
    }

    #[test]
    fn detects_remaining_languages() {
        assert_eq!(
            detect_intent("தெருவில் குப்பை", Language::En).language,
            Language::Ta
        );
        assert_eq!(
            detect_intent("রাস্তায় আবর্জনা", Language::En).language,
            Language::Bn
        );
        assert_eq!(
            detect_intent("گلی میں کوڑا", Language::En).language,
            Language::Ur
        );
    }

    #[test]
    fn no_keyword_returns_unknown_with_default() {
        let result = detect_intent("hello world", Language::En);
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.language, Language::En);
        assert!(result.keyword.is_none());

        let result = detect_intent("hello world", Language::Ur);
        assert_eq!(result.language, Language::Ur);
    }

    #[test]
    fn empty_text_is_unknown() {
        assert_eq!(detect_intent("", Language::En).intent, Intent::Unknown);
    }

    #[test]
    fn declared_language_order_breaks_ties() {
        let result = detect_intent("नाली overflowing with sewage", Language::Hi);
        assert_eq!(result.language, Language::En);
    }

    #[test]
    fn uppercase_input_is_lowered() {
        let result = detect_intent("TRASH everywhere", Language::Hi);
        assert_eq!(result.language, Language::En);
    }

    #[test]
    fn substring_matches_are_accepted() {
        let result = detect_intent("the trashy novel", Language::En);
        assert_eq!(result.intent, Intent::FileComplaint);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  a   b \n c "), "a b c");
    }
}
