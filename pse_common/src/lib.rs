mod rub;

pub mod op;

pub use rub::{Rub, RubConversionError, RUB_CURRENCY_CODE};
