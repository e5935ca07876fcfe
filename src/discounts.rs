//! Discounts
//!
//! Fixed and percentage discount primitives shared by sales and vouchers.

use std::fmt;

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rusty_money::{Money, MoneyError, iso::Currency};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    money::{Amount, floor_at_zero},
    store::StoreError,
};

pub mod resolver;
pub mod sales;
pub mod vouchers;

/// A sale, voucher or gift card cannot be used under the current conditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct NotApplicable {
    /// Human readable reason
    pub message: String,
}

impl NotApplicable {
    /// Create a new error with the given reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors specific to discount calculations.
#[derive(Debug, Error, PartialEq)]
pub enum DiscountError {
    /// The discount does not apply.
    #[error(transparent)]
    NotApplicable(#[from] NotApplicable),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Voucher bookkeeping could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountValueType {
    /// A fixed amount in the channel currency
    Fixed,

    /// A percentage of the price, `0..=100`
    Percentage,
}

/// A resolved discount function.
#[derive(Clone, Copy, PartialEq)]
pub enum Discount {
    /// Subtract a fixed amount, never going below zero.
    Fixed(Amount),

    /// Take a percentage off the price.
    Percentage(Percentage),
}

impl fmt::Debug for Discount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discount::Fixed(amount) => f.debug_tuple("Fixed").field(amount).finish(),
            Discount::Percentage(percentage) => f
                .debug_tuple("Percentage")
                .field(&(*percentage * Decimal::ONE_HUNDRED))
                .finish(),
        }
    }
}

impl Discount {
    /// Build a discount from a stored value, where percentages are expressed
    /// in points (`25` meaning 25%).
    pub fn from_value(
        value_type: DiscountValueType,
        value: Decimal,
        currency: &'static Currency,
    ) -> Self {
        match value_type {
            DiscountValueType::Fixed => Discount::Fixed(Money::from_decimal(value, currency)),
            DiscountValueType::Percentage => {
                Discount::Percentage(Percentage::from(value / Decimal::ONE_HUNDRED))
            }
        }
    }

    /// Apply the discount to a price.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] if a fixed discount is in another currency.
    pub fn apply(&self, price: Amount) -> Result<Amount, MoneyError> {
        match self {
            Discount::Fixed(discount) => fixed_discount(price, *discount),
            Discount::Percentage(percentage) => Ok(percentage_discount(price, *percentage)),
        }
    }
}

/// Subtract `discount` from `base`, floored at zero.
///
/// # Errors
///
/// Returns [`MoneyError`] on currency mismatch.
pub fn fixed_discount(base: Amount, discount: Amount) -> Result<Amount, MoneyError> {
    Ok(floor_at_zero(base.sub(discount)?))
}

/// Take `percentage` off `base`. The result is not rounded.
pub fn percentage_discount(base: Amount, percentage: Percentage) -> Amount {
    let amount = *base.amount();
    let discounted = amount - percentage * amount;

    floor_at_zero(Money::from_decimal(discounted, base.currency()))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{EUR, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn fixed_discount_floors_at_zero() -> TestResult {
        let price = Money::from_minor(500, USD);

        assert_eq!(
            fixed_discount(price, Money::from_minor(200, USD))?,
            Money::from_minor(300, USD)
        );
        assert_eq!(
            fixed_discount(price, Money::from_minor(900, USD))?,
            Money::from_minor(0, USD)
        );

        Ok(())
    }

    #[test]
    fn fixed_discount_rejects_other_currency() {
        let result = fixed_discount(Money::from_minor(500, USD), Money::from_minor(100, EUR));

        assert!(matches!(result, Err(MoneyError::CurrencyMismatch { .. })));
    }

    #[test]
    fn percentage_discount_keeps_precision() {
        let price = Money::from_minor(999, USD);
        let discounted = percentage_discount(price, Percentage::from(Decimal::new(5, 1)));

        assert_eq!(*discounted.amount(), Decimal::new(4995, 3));
    }

    #[test]
    fn from_value_reads_percentage_points() -> TestResult {
        let discount = Discount::from_value(DiscountValueType::Percentage, Decimal::from(25), USD);

        assert_eq!(
            discount.apply(Money::from_minor(1000, USD))?,
            Money::from_minor(750, USD)
        );

        Ok(())
    }

    #[test]
    fn from_value_reads_fixed_amounts() -> TestResult {
        let discount = Discount::from_value(DiscountValueType::Fixed, Decimal::from(3), USD);

        assert_eq!(discount, Discount::Fixed(Money::from_minor(300, USD)));
        assert_eq!(
            discount.apply(Money::from_minor(1000, USD))?,
            Money::from_minor(700, USD)
        );

        Ok(())
    }

    #[test]
    fn debug_shows_percentage_points() {
        let discount = Discount::from_value(DiscountValueType::Percentage, Decimal::from(50), USD);

        assert!(format!("{discount:?}").contains("Percentage"));
    }
}
