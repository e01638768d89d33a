//! Bank-name reconciliation.
//!
//! The settlement platform, the trading platform and the receipt PDFs all spell bank names differently (brand
//! renames, transliteration, abbreviations), so bank comparison goes through a per-bank alias table with
//! case-insensitive substring semantics.

/// Known aliases per bank. The first entry of each row is the canonical name.
const BANK_ALIASES: &[&[&str]] = &[
    &["tbank", "t-bank", "т-банк", "тбанк", "tinkoff", "тинькофф", "тинькоф"],
    &["sberbank", "sber", "сбербанк", "сбер"],
    &["alfabank", "alfa-bank", "alfa", "альфа-банк", "альфа", "альфабанк"],
    &["vtb", "втб"],
    &["raiffeisen", "райффайзен", "райффайзенбанк"],
    &["gazprombank", "газпромбанк"],
    &["ozon", "озон", "ozon bank", "озон банк"],
    &["yandex", "яндекс", "yandex bank", "яндекс банк"],
];

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Returns the alias row that `name` belongs to, if any.
fn alias_row(name: &str) -> Option<&'static [&'static str]> {
    let name = normalize(name);
    BANK_ALIASES.iter().copied().find(|row| row.iter().any(|alias| name.contains(alias)))
}

/// True when the two bank descriptors resolve to the same bank via the alias table.
///
/// Unknown banks fall back to a direct case-insensitive substring comparison in either direction, so two novel
/// spellings of the same bank still have a chance to match.
pub fn bank_alias_match(receipt_bank: &str, payout_bank: &str) -> bool {
    let a = normalize(receipt_bank);
    let b = normalize(payout_bank);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    match (alias_row(&a), alias_row(&b)) {
        (Some(ra), Some(rb)) => std::ptr::eq(ra, rb),
        _ => a.contains(&b) || b.contains(&a),
    }
}

/// Whether the descriptor names the platform's own bank brand (T-Bank, formerly Tinkoff).
pub fn is_tbank_brand(bank: &str) -> bool {
    alias_row(bank).map(|row| row[0] == "tbank").unwrap_or(false)
}
