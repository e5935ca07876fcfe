//! Money
//!
//! Money arithmetic shared by every pricing step. Amounts keep full decimal
//! precision until [`quantize`] rounds them to the currency's minor units.

use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{Money, MoneyError, iso::Currency};

/// A monetary amount in one of the ISO currencies.
pub type Amount = Money<'static, Currency>;

/// Zero in the given currency.
pub fn zero_money(currency: &'static Currency) -> Amount {
    Money::from_minor(0, currency)
}

/// Round an amount to the minor-unit precision of its currency, half away
/// from zero.
pub fn quantize(price: Amount) -> Amount {
    let exponent = price.currency().exponent;
    let rounded = price
        .amount()
        .round_dp_with_strategy(exponent, RoundingStrategy::MidpointAwayFromZero);

    Money::from_decimal(rounded, price.currency())
}

/// Clamp negative amounts to zero.
pub fn floor_at_zero(price: Amount) -> Amount {
    if price.amount().is_sign_negative() {
        zero_money(price.currency())
    } else {
        price
    }
}

/// Multiply an amount by a decimal factor, keeping full precision.
pub fn multiply(price: Amount, factor: Decimal) -> Amount {
    Money::from_decimal(*price.amount() * factor, price.currency())
}

/// Multiply an amount by an item quantity.
pub fn times(price: Amount, quantity: u32) -> Amount {
    multiply(price, Decimal::from(quantity))
}

/// Split an amount evenly over an item quantity, keeping full precision. A
/// zero quantity leaves the amount unchanged.
pub fn divide(price: Amount, quantity: u32) -> Amount {
    if quantity == 0 {
        return price;
    }

    Money::from_decimal(*price.amount() / Decimal::from(quantity), price.currency())
}

/// Return the smaller of two amounts; `a` wins ties.
pub fn min_amount(a: Amount, b: Amount) -> Amount {
    if b.amount() < a.amount() { b } else { a }
}

/// Return the larger of two amounts; `a` wins ties.
pub fn max_amount(a: Amount, b: Amount) -> Amount {
    if b.amount() > a.amount() { b } else { a }
}

/// Sum amounts that share a currency.
///
/// # Errors
///
/// Returns [`MoneyError`] if any amount is in a different currency.
pub fn sum_amounts(
    amounts: impl IntoIterator<Item = Amount>,
    currency: &'static Currency,
) -> Result<Amount, MoneyError> {
    amounts
        .into_iter()
        .try_fold(zero_money(currency), |acc, amount| acc.add(amount))
}

/// A net/gross pair produced by the tax chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxedMoney {
    /// Amount before tax
    pub net: Amount,

    /// Amount including tax
    pub gross: Amount,
}

impl TaxedMoney {
    /// Build a taxed pair.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::CurrencyMismatch`] if `net` and `gross` differ in currency.
    pub fn new(net: Amount, gross: Amount) -> Result<Self, MoneyError> {
        if net.currency() != gross.currency() {
            return Err(MoneyError::CurrencyMismatch {
                expected: net.currency().iso_alpha_code,
                actual: gross.currency().iso_alpha_code,
            });
        }

        Ok(Self { net, gross })
    }

    /// A pair where no tax has been applied yet.
    pub fn untaxed(amount: Amount) -> Self {
        Self {
            net: amount,
            gross: amount,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: &'static Currency) -> Self {
        Self::untaxed(zero_money(currency))
    }

    /// Currency of the pair.
    pub fn currency(&self) -> &'static Currency {
        self.net.currency()
    }

    /// Tax portion (`gross - net`).
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] on currency mismatch.
    pub fn tax(&self) -> Result<Amount, MoneyError> {
        self.gross.sub(self.net)
    }

    /// Whether a tax provider has already produced a definitive value.
    pub fn is_taxed(&self) -> bool {
        self.net != self.gross
    }

    /// Whether both components are zero.
    pub fn is_zero(&self) -> bool {
        self.net.amount().is_zero() && self.gross.amount().is_zero()
    }

    /// Component-wise addition.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] on currency mismatch.
    pub fn add(self, other: Self) -> Result<Self, MoneyError> {
        Ok(Self {
            net: self.net.add(other.net)?,
            gross: self.gross.add(other.gross)?,
        })
    }

    /// Component-wise subtraction.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] on currency mismatch.
    pub fn sub(self, other: Self) -> Result<Self, MoneyError> {
        Ok(Self {
            net: self.net.sub(other.net)?,
            gross: self.gross.sub(other.gross)?,
        })
    }

    /// Add the same amount to net and gross.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] on currency mismatch.
    pub fn add_amount(self, amount: Amount) -> Result<Self, MoneyError> {
        self.add(Self::untaxed(amount))
    }

    /// Subtract the same amount from net and gross.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError`] on currency mismatch.
    pub fn sub_amount(self, amount: Amount) -> Result<Self, MoneyError> {
        self.sub(Self::untaxed(amount))
    }

    /// Multiply both components by a quantity.
    pub fn times(self, quantity: u32) -> Self {
        Self {
            net: times(self.net, quantity),
            gross: times(self.gross, quantity),
        }
    }

    /// Split both components evenly over a quantity.
    pub fn divide(self, quantity: u32) -> Self {
        Self {
            net: divide(self.net, quantity),
            gross: divide(self.gross, quantity),
        }
    }

    /// Round both components to minor units.
    pub fn quantize(self) -> Self {
        Self {
            net: quantize(self.net),
            gross: quantize(self.gross),
        }
    }

    /// Clamp negative components to zero.
    pub fn floor_at_zero(self) -> Self {
        Self {
            net: floor_at_zero(self.net),
            gross: floor_at_zero(self.gross),
        }
    }
}
