//! Small free-function helpers for the matching heuristics: bank-alias resolution, wallet digit suffixes,
//! cancellation-phrase detection and receipt date normalization.
mod banks;
mod phrases;
mod time;
mod wallets;

pub use banks::{bank_alias_match, is_tbank_brand};
pub use phrases::contains_cancellation_phrase;
pub use time::{platform_date, PLATFORM_UTC_OFFSET_SECS};
pub use wallets::{
    card_suffix_match,
    last_digits,
    looks_like_phone,
    phone_suffix_match,
    CARD_SUFFIX_LEN,
    PHONE_SUFFIX_LEN,
};
