//! Taxed checkout prices
//!
//! Base prices run through the [`TaxChain`].

use rust_decimal::Decimal;

use crate::{
    checkout::{
        base_calculations::{
            base_checkout_delivery_price, base_checkout_discount, base_checkout_line_total,
            base_checkout_line_unit_price, base_checkout_subtotal, base_checkout_total,
        },
        fetch::{CheckoutInfo, CheckoutLineInfo},
    },
    discounts::sales::DiscountInfo,
    money::{Amount, TaxedMoney},
    taxes::{CalculationError, TaxChain, calculate_tax_rate},
};

/// Taxed total of one line.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn checkout_line_total(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    line: &CheckoutLineInfo,
    discounts: &[DiscountInfo],
) -> Result<TaxedMoney, CalculationError> {
    let base = base_checkout_line_total(line, &info.channel, discounts)?.price_with_discounts;

    Ok(chain.calculate_checkout_line_total(
        info,
        lines,
        line,
        discounts,
        TaxedMoney::untaxed(base),
    )?)
}

/// Taxed unit price of one line.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn checkout_line_unit_price(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    line: &CheckoutLineInfo,
    discounts: &[DiscountInfo],
) -> Result<TaxedMoney, CalculationError> {
    let base = base_checkout_line_unit_price(line, &info.channel, discounts)?.price_with_discounts;

    Ok(chain.calculate_checkout_line_unit_price(
        info,
        lines,
        line,
        discounts,
        TaxedMoney::untaxed(base),
    )?)
}

/// Tax rate of one line.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn checkout_line_tax_rate(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    line: &CheckoutLineInfo,
    discounts: &[DiscountInfo],
) -> Result<Decimal, CalculationError> {
    let total = checkout_line_total(chain, info, lines, line, discounts)?;

    Ok(chain.get_checkout_line_tax_rate(
        info,
        lines,
        line,
        discounts,
        calculate_tax_rate(total),
    )?)
}

/// Sum of the taxed line totals.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn checkout_subtotal(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<TaxedMoney, CalculationError> {
    let mut subtotal = TaxedMoney::zero(info.checkout.currency);

    for line in lines {
        subtotal = subtotal.add(checkout_line_total(chain, info, lines, line, discounts)?)?;
    }

    Ok(chain.calculate_checkout_subtotal(info, lines, discounts, subtotal)?)
}

/// Taxed delivery price.
///
/// # Errors
///
/// Returns [`CalculationError`] when a tax plugin fails.
pub fn checkout_shipping_price(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<TaxedMoney, CalculationError> {
    let base = base_checkout_delivery_price(info, lines);

    Ok(chain.calculate_checkout_shipping(info, lines, discounts, TaxedMoney::untaxed(base))?)
}

/// Tax rate of the delivery price.
///
/// # Errors
///
/// Returns [`CalculationError`] when a tax plugin fails.
pub fn checkout_shipping_tax_rate(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<Decimal, CalculationError> {
    let shipping = checkout_shipping_price(chain, info, lines, discounts)?;

    Ok(chain.get_checkout_shipping_tax_rate(
        info,
        lines,
        discounts,
        calculate_tax_rate(shipping),
    )?)
}

/// Taxed checkout total: `subtotal + shipping - discount`, never negative.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn checkout_total(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<TaxedMoney, CalculationError> {
    let subtotal = base_checkout_subtotal(lines, &info.channel, discounts, info.checkout.currency)?;
    let shipping = base_checkout_delivery_price(info, lines);
    let base = base_checkout_total(subtotal, shipping, base_checkout_discount(info))?;

    let total =
        chain.calculate_checkout_total(info, lines, discounts, TaxedMoney::untaxed(base))?;

    Ok(total.floor_at_zero())
}

/// Checkout total left to pay once `gift_cards_balance` is used up, never
/// negative.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn calculate_checkout_total_with_gift_cards(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
    gift_cards_balance: Amount,
) -> Result<TaxedMoney, CalculationError> {
    let total = checkout_total(chain, info, lines, discounts)?;

    Ok(total.sub_amount(gift_cards_balance)?.floor_at_zero())
}
