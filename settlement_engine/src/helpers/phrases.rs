//! Cancellation-phrase detection in trade chat.
//!
//! A phrase hit is evidence, not proof: counterparties quote old messages, ask questions, or change their minds.
//! Callers must re-verify against the live order status before committing a cancellation.
use std::sync::OnceLock;

use regex::RegexSet;

const CANCELLATION_PATTERNS: &[&str] = &[
    r"(?i)отмен(а|ите|яю|ил|ена)",
    r"(?i)сделка\s+отменена",
    r"(?i)не\s+буду\s+оплачивать",
    r"(?i)cancel(led|ling)?\s+(the\s+)?(order|deal|trade)",
    r"(?i)order\s+(is\s+)?cancel(led)?",
    r"(?i)i\s+cancel",
    r"(?i)bekor\s+qilindi", // uz
    r"(?i)iptal",           // tr
];

fn pattern_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(CANCELLATION_PATTERNS).expect("cancellation patterns must compile"))
}

/// True when the message body contains any known cancellation phrase.
pub fn contains_cancellation_phrase(body: &str) -> bool {
    pattern_set().is_match(body)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_russian_and_english_phrases() {
        assert!(contains_cancellation_phrase("Отмена сделки, передумал"));
        assert!(contains_cancellation_phrase("я отменил заказ"));
        assert!(contains_cancellation_phrase("please cancel the order"));
        assert!(contains_cancellation_phrase("Order is cancelled"));
    }

    #[test]
    fn ignores_ordinary_chat() {
        assert!(!contains_cancellation_phrase("перевёл, проверяйте"));
        assert!(!contains_cancellation_phrase("payment sent, releasing soon?"));
        assert!(!contains_cancellation_phrase(""));
    }
}
