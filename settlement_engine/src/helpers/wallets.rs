//! Wallet identifier comparison.
//!
//! Payout wallets and receipt recipients arrive in wildly different formats ("+7 999 123-45-67",
//! "79991234567", "*1234"), so comparisons work on digit suffixes only.

/// Number of trailing digits compared for phone-routed transfers. Russian numbers differ only in their last 10
/// digits (the 7/8 country prefix varies by source).
pub const PHONE_SUFFIX_LEN: usize = 10;

/// Number of trailing digits compared for card-routed transfers. Receipts only disclose the last 4 digits.
pub const CARD_SUFFIX_LEN: usize = 4;

/// The last `n` decimal digits of `value`, ignoring any other characters.
pub fn last_digits(value: &str, n: usize) -> String {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(n);
    digits[start..].iter().collect()
}

/// True when both numbers have at least [`PHONE_SUFFIX_LEN`] digits and those suffixes are equal.
pub fn phone_suffix_match(wallet: &str, phone: &str) -> bool {
    let a = last_digits(wallet, PHONE_SUFFIX_LEN);
    let b = last_digits(phone, PHONE_SUFFIX_LEN);
    a.len() == PHONE_SUFFIX_LEN && a == b
}

/// Rough wallet classification: Russian phone numbers carry 11 digits (or 10 without the country prefix), cards
/// carry 16-19. Used only to pick the preferred payment method for a new advertisement.
pub fn looks_like_phone(wallet: &str) -> bool {
    let digits = last_digits(wallet, 32);
    wallet.trim_start().starts_with('+') || matches!(digits.len(), 10 | 11)
}

/// True when the card suffixes ([`CARD_SUFFIX_LEN`] digits) are equal.
pub fn card_suffix_match(wallet: &str, card: &str) -> bool {
    let a = last_digits(wallet, CARD_SUFFIX_LEN);
    let b = last_digits(card, CARD_SUFFIX_LEN);
    a.len() == CARD_SUFFIX_LEN && a == b
}
