use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const RUB_CURRENCY_CODE: &str = "RUB";

//--------------------------------------        Rub        -----------------------------------------------------------
/// A fiat rouble amount, stored as whole kopecks (1/100 RUB) in an i64.
///
/// Receipts and payouts are compared in kopeck space, so "exact amount match" means equality down to the kopeck.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rub(i64);

op!(binary Rub, Add, add);
op!(binary Rub, Sub, sub);
op!(inplace Rub, SubAssign, sub_assign);
op!(unary Rub, Neg, neg);

impl Mul<i64> for Rub {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Rub {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in kopecks: {0}")]
pub struct RubConversionError(String);

impl From<i64> for Rub {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Rub {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Rub {}

impl TryFrom<u64> for Rub {
    type Error = RubConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(RubConversionError(format!("Value {} is too large to convert to Rub", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Rub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 100;
        let cents = (self.0 % 100).abs();
        write!(f, "{whole}.{cents:02}₽")
    }
}

impl Rub {
    /// The raw amount in kopecks.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_rubles(rub: i64) -> Self {
        Self(rub * 100)
    }

    /// Kopeck-exact absolute difference between two amounts.
    pub fn abs_diff(&self, other: Rub) -> Rub {
        Self((self.0 - other.0).abs())
    }
}
