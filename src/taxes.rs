//! Taxes
//!
//! Tax providers are plugged in as an ordered [`TaxChain`]. Each plugin gets
//! the value produced by its predecessor and either returns it unchanged or a
//! taxed one. Once a value is taxed (net and gross differ) the remaining
//! plugins are skipped, so a price is never taxed twice.

use std::{fmt, sync::Arc};

use mockall::automock;
use rust_decimal::Decimal;
use rusty_money::{Money, MoneyError};
use thiserror::Error;

use crate::{
    checkout::fetch::{CheckoutInfo, CheckoutLineInfo},
    discounts::sales::DiscountInfo,
    money::{Amount, TaxedMoney, multiply, quantize},
    orders::{Order, OrderLine},
    settings::CheckoutSettings,
};

pub mod flat_rate;

pub use flat_rate::{FlatRateTaxPlugin, FlatRateTaxSettings};

/// A tax provider failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unable to calculate taxes - {message}")]
pub struct TaxError {
    /// Provider message
    pub message: String,
}

impl TaxError {
    /// Create a new error with the given provider message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<MoneyError> for TaxError {
    fn from(error: MoneyError) -> Self {
        Self::new(error.to_string())
    }
}

/// Errors raised while pricing a checkout or order.
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// A tax plugin failed.
    #[error(transparent)]
    Tax(#[from] TaxError),
}

/// A tax provider.
///
/// Every method receives the value computed so far as `previous_value`. The
/// default implementations pass it through unchanged.
#[automock]
#[expect(
    clippy::missing_errors_doc,
    reason = "every method fails only with TaxError, documented on the trait"
)]
pub trait TaxPlugin: Send + Sync {
    /// Checkout total.
    fn calculate_checkout_total(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Checkout subtotal.
    fn calculate_checkout_subtotal(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Checkout shipping price.
    fn calculate_checkout_shipping(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Total of one checkout line.
    fn calculate_checkout_line_total(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _line: &CheckoutLineInfo,
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Unit price of one checkout line.
    fn calculate_checkout_line_unit_price(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _line: &CheckoutLineInfo,
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Tax rate of one checkout line.
    fn get_checkout_line_tax_rate(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _line: &CheckoutLineInfo,
        _discounts: &[DiscountInfo],
        previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(previous_value)
    }

    /// Tax rate of the checkout shipping price.
    fn get_checkout_shipping_tax_rate(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(previous_value)
    }

    /// Unit price of one order line.
    fn calculate_order_line_unit(
        &self,
        _order: &Order,
        _line: &OrderLine,
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Total of one order line.
    fn calculate_order_line_total(
        &self,
        _order: &Order,
        _line: &OrderLine,
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Order shipping price.
    fn calculate_order_shipping(
        &self,
        _order: &Order,
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(previous_value)
    }

    /// Tax rate of one order line.
    fn get_order_line_tax_rate(
        &self,
        _order: &Order,
        _line: &OrderLine,
        previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(previous_value)
    }

    /// Tax rate of the order shipping price.
    fn get_order_shipping_tax_rate(
        &self,
        _order: &Order,
        previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(previous_value)
    }

    /// Last chance to reject a checkout before the order is created, for
    /// example because the provider cannot tax the address.
    fn preprocess_order_creation(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
    ) -> Result<(), TaxError> {
        Ok(())
    }
}

/// Ordered tax plugins.
#[derive(Clone, Default)]
pub struct TaxChain {
    plugins: Vec<Arc<dyn TaxPlugin>>,
}

impl fmt::Debug for TaxChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaxChain")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl TaxChain {
    /// A chain running `plugins` in order.
    pub fn new(plugins: Vec<Arc<dyn TaxPlugin>>) -> Self {
        Self { plugins }
    }

    /// The chain configured by `settings`: the flat-rate plugin when tax
    /// rates are configured, no plugins otherwise.
    pub fn from_settings(settings: &CheckoutSettings) -> Self {
        match &settings.taxes {
            Some(taxes) => Self::new(vec![Arc::new(FlatRateTaxPlugin::new(
                taxes.clone(),
                settings.include_taxes_in_prices,
            ))]),
            None => Self::default(),
        }
    }

    fn fold(
        &self,
        initial: TaxedMoney,
        step: impl Fn(&dyn TaxPlugin, TaxedMoney) -> Result<TaxedMoney, TaxError>,
    ) -> Result<TaxedMoney, TaxError> {
        let mut value = initial;

        for plugin in &self.plugins {
            if value.is_taxed() {
                break;
            }

            value = step(plugin.as_ref(), value)?;
        }

        Ok(value.quantize())
    }

    fn fold_rate(
        &self,
        initial: Decimal,
        step: impl Fn(&dyn TaxPlugin, Decimal) -> Result<Decimal, TaxError>,
    ) -> Result<Decimal, TaxError> {
        self.plugins
            .iter()
            .try_fold(initial, |rate, plugin| step(plugin.as_ref(), rate))
    }

    /// Run [`TaxPlugin::calculate_checkout_total`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_checkout_total(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        discounts: &[DiscountInfo],
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_checkout_total(info, lines, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_checkout_subtotal`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_checkout_subtotal(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        discounts: &[DiscountInfo],
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_checkout_subtotal(info, lines, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_checkout_shipping`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_checkout_shipping(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        discounts: &[DiscountInfo],
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_checkout_shipping(info, lines, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_checkout_line_total`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_checkout_line_total(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        line: &CheckoutLineInfo,
        discounts: &[DiscountInfo],
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_checkout_line_total(info, lines, line, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_checkout_line_unit_price`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_checkout_line_unit_price(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        line: &CheckoutLineInfo,
        discounts: &[DiscountInfo],
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_checkout_line_unit_price(info, lines, line, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::get_checkout_line_tax_rate`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn get_checkout_line_tax_rate(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        line: &CheckoutLineInfo,
        discounts: &[DiscountInfo],
        base: Decimal,
    ) -> Result<Decimal, TaxError> {
        self.fold_rate(base, |plugin, previous| {
            plugin.get_checkout_line_tax_rate(info, lines, line, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::get_checkout_shipping_tax_rate`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn get_checkout_shipping_tax_rate(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        discounts: &[DiscountInfo],
        base: Decimal,
    ) -> Result<Decimal, TaxError> {
        self.fold_rate(base, |plugin, previous| {
            plugin.get_checkout_shipping_tax_rate(info, lines, discounts, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_order_line_unit`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_order_line_unit(
        &self,
        order: &Order,
        line: &OrderLine,
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_order_line_unit(order, line, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_order_line_total`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_order_line_total(
        &self,
        order: &Order,
        line: &OrderLine,
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_order_line_total(order, line, previous)
        })
    }

    /// Run [`TaxPlugin::calculate_order_shipping`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn calculate_order_shipping(
        &self,
        order: &Order,
        base: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        self.fold(base, |plugin, previous| {
            plugin.calculate_order_shipping(order, previous)
        })
    }

    /// Run [`TaxPlugin::get_order_line_tax_rate`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn get_order_line_tax_rate(
        &self,
        order: &Order,
        line: &OrderLine,
        base: Decimal,
    ) -> Result<Decimal, TaxError> {
        self.fold_rate(base, |plugin, previous| {
            plugin.get_order_line_tax_rate(order, line, previous)
        })
    }

    /// Run [`TaxPlugin::get_order_shipping_tax_rate`] through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn get_order_shipping_tax_rate(
        &self,
        order: &Order,
        base: Decimal,
    ) -> Result<Decimal, TaxError> {
        self.fold_rate(base, |plugin, previous| {
            plugin.get_order_shipping_tax_rate(order, previous)
        })
    }

    /// Give every plugin a chance to reject the order.
    ///
    /// # Errors
    ///
    /// Returns the first [`TaxError`] raised by a plugin.
    pub fn preprocess_order_creation(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        discounts: &[DiscountInfo],
    ) -> Result<(), TaxError> {
        self.plugins
            .iter()
            .try_for_each(|plugin| plugin.preprocess_order_creation(info, lines, discounts))
    }
}

/// Tax rate implied by a taxed price: `gross / net - 1`, rounded to four
/// places. Zero when the net amount is zero.
pub fn calculate_tax_rate(price: TaxedMoney) -> Decimal {
    let net = *price.net.amount();

    if net.is_zero() {
        return Decimal::ZERO;
    }

    (*price.gross.amount() / net - Decimal::ONE).round_dp(4)
}

/// Tax `price` at `rate`.
///
/// When prices are entered with tax, `price` is the gross amount and the net
/// amount is derived from it; otherwise `price` is net.
pub fn apply_tax_rate(price: Amount, rate: Decimal, prices_entered_with_tax: bool) -> TaxedMoney {
    let factor = Decimal::ONE + rate;

    if prices_entered_with_tax {
        let net = if factor.is_zero() {
            price
        } else {
            Money::from_decimal(*price.amount() / factor, price.currency())
        };

        TaxedMoney {
            net: quantize(net),
            gross: quantize(price),
        }
    } else {
        TaxedMoney {
            net: quantize(price),
            gross: quantize(multiply(price, factor)),
        }
    }
}
