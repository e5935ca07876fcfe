//! Untaxed checkout prices
//!
//! Line, shipping and total prices before any tax plugin runs. Every price
//! exists in three flavours: undiscounted, with the best sale applied, and with
//! the sale and a line-level voucher applied.

use rusty_money::{MoneyError, iso::Currency};

use crate::{
    channels::Channel,
    checkout::fetch::{CheckoutInfo, CheckoutLineInfo},
    discounts::{
        DiscountError,
        resolver::{best_discount, calculate_discounted_price},
        sales::{DiscountInfo, SaleId},
        vouchers::Voucher,
    },
    money::{Amount, floor_at_zero, quantize, sum_amounts, times, zero_money},
};

/// The three base prices of a line or checkout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckoutPricesData {
    /// No sale, no voucher
    pub undiscounted_price: Amount,

    /// Best sale applied
    pub price_with_sale: Amount,

    /// Best sale and the line voucher applied
    pub price_with_discounts: Amount,
}

impl CheckoutPricesData {
    fn quantize(self) -> Self {
        Self {
            undiscounted_price: quantize(self.undiscounted_price),
            price_with_sale: quantize(self.price_with_sale),
            price_with_discounts: quantize(self.price_with_discounts),
        }
    }
}

/// The sale giving the line's variant its lowest price, and that price.
///
/// # Errors
///
/// Returns [`MoneyError`] if a sale is in another currency.
pub fn line_sale_price(
    line: &CheckoutLineInfo,
    channel: &Channel,
    discounts: &[DiscountInfo],
) -> Result<(Option<SaleId>, Amount), MoneyError> {
    best_discount(
        &line.product,
        line.price,
        &line.product.collection_ids,
        discounts,
        channel,
        Some(line.variant.id),
    )
}

/// Amount a voucher takes off one unit. A voucher that is not listed in the
/// channel takes nothing off.
fn voucher_unit_discount(
    voucher: &Voucher,
    price: Amount,
    channel: &Channel,
) -> Result<Amount, MoneyError> {
    match voucher.get_discount_amount_for(price, channel.id) {
        Ok(discount) => Ok(discount),
        Err(DiscountError::Money(error)) => Err(error),
        Err(DiscountError::NotApplicable(_) | DiscountError::Store(_)) => {
            Ok(zero_money(price.currency()))
        }
    }
}

fn apply_voucher(
    voucher: &Voucher,
    price: Amount,
    channel: &Channel,
) -> Result<Amount, MoneyError> {
    let discount = voucher_unit_discount(voucher, price, channel)?;

    Ok(floor_at_zero(price.sub(discount)?))
}

fn unit_prices(
    line: &CheckoutLineInfo,
    channel: &Channel,
    discounts: &[DiscountInfo],
) -> Result<CheckoutPricesData, MoneyError> {
    let undiscounted_price = calculate_discounted_price(
        &line.product,
        line.price,
        &line.product.collection_ids,
        &[],
        channel,
        Some(line.variant.id),
    )?;

    let (_, price_with_sale) = line_sale_price(line, channel, discounts)?;

    let price_with_discounts = match &line.voucher {
        Some(voucher) if !voucher.apply_once_per_order => {
            apply_voucher(voucher, price_with_sale, channel)?
        }
        _ => price_with_sale,
    };

    Ok(CheckoutPricesData {
        undiscounted_price,
        price_with_sale,
        price_with_discounts,
    })
}

/// Unit prices of a line.
///
/// An apply-once-per-order voucher never changes the unit price; it only
/// discounts one unit of the line total.
///
/// # Errors
///
/// Returns [`MoneyError`] if a sale or voucher is in another currency.
pub fn base_checkout_line_unit_price(
    line: &CheckoutLineInfo,
    channel: &Channel,
    discounts: &[DiscountInfo],
) -> Result<CheckoutPricesData, MoneyError> {
    Ok(unit_prices(line, channel, discounts)?.quantize())
}

/// Total prices of a line.
///
/// Under an apply-once-per-order voucher `quantity - 1` units keep the sale
/// price and exactly one unit gets the voucher price.
///
/// # Errors
///
/// Returns [`MoneyError`] if a sale or voucher is in another currency.
pub fn base_checkout_line_total(
    line: &CheckoutLineInfo,
    channel: &Channel,
    discounts: &[DiscountInfo],
) -> Result<CheckoutPricesData, MoneyError> {
    let unit = unit_prices(line, channel, discounts)?;
    let quantity = line.line.quantity;

    let price_with_discounts = match &line.voucher {
        Some(voucher) if voucher.apply_once_per_order && quantity > 0 => {
            let discounted_unit = apply_voucher(voucher, unit.price_with_sale, channel)?;

            times(unit.price_with_sale, quantity - 1).add(discounted_unit)?
        }
        _ => times(unit.price_with_discounts, quantity),
    };

    Ok(CheckoutPricesData {
        undiscounted_price: times(unit.undiscounted_price, quantity),
        price_with_sale: times(unit.price_with_sale, quantity),
        price_with_discounts,
    }
    .quantize())
}

/// Sum of the discounted line totals.
///
/// # Errors
///
/// Returns [`MoneyError`] if a price is in another currency.
pub fn base_checkout_subtotal(
    lines: &[CheckoutLineInfo],
    channel: &Channel,
    discounts: &[DiscountInfo],
    currency: &'static Currency,
) -> Result<Amount, MoneyError> {
    let totals = lines
        .iter()
        .map(|line| base_checkout_line_total(line, channel, discounts))
        .map(|total| total.map(|prices| prices.price_with_discounts))
        .collect::<Result<Vec<_>, _>>()?;

    sum_amounts(totals, currency)
}

/// Sum of the undiscounted line totals.
///
/// # Errors
///
/// Returns [`MoneyError`] if a price is in another currency.
pub fn base_checkout_undiscounted_subtotal(
    lines: &[CheckoutLineInfo],
    channel: &Channel,
    currency: &'static Currency,
) -> Result<Amount, MoneyError> {
    let totals = lines
        .iter()
        .map(|line| base_checkout_line_total(line, channel, &[]))
        .map(|total| total.map(|prices| prices.undiscounted_price))
        .collect::<Result<Vec<_>, _>>()?;

    sum_amounts(totals, currency)
}

/// Whether any line has to be shipped.
pub fn is_shipping_required(lines: &[CheckoutLineInfo]) -> bool {
    lines.iter().any(|line| line.variant.is_shipping_required)
}

/// Untaxed delivery price: zero without a method or when nothing ships.
pub fn base_checkout_delivery_price(info: &CheckoutInfo, lines: &[CheckoutLineInfo]) -> Amount {
    let zero = zero_money(info.checkout.currency);

    if !is_shipping_required(lines) {
        return zero;
    }

    info.delivery_method_info().price().map_or(zero, quantize)
}

/// Voucher discount taken off the checkout total. Line-level vouchers are
/// already part of the line prices and take nothing off here.
pub fn base_checkout_discount(info: &CheckoutInfo) -> Amount {
    match &info.voucher {
        Some(voucher) if voucher.is_line_level() => zero_money(info.checkout.currency),
        _ => info.checkout.discount,
    }
}

/// `subtotal + shipping - discount`, never below zero.
///
/// # Errors
///
/// Returns [`MoneyError`] on currency mismatch.
pub fn base_checkout_total(
    subtotal: Amount,
    shipping_price: Amount,
    discount: Amount,
) -> Result<Amount, MoneyError> {
    Ok(floor_at_zero(subtotal.add(shipping_price)?.sub(discount)?))
}
