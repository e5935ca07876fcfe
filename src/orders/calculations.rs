//! Order prices
//!
//! Recomputes the taxed prices of an existing order from the untaxed base
//! prices frozen on its lines. Line totals are frozen too, so a voucher that
//! discounted a single unit keeps doing so.

use rusty_money::MoneyError;
use tracing::debug;

use crate::{
    discounts::{
        DiscountError,
        vouchers::{Voucher, VoucherType},
    },
    money::{Amount, TaxedMoney, min_amount, sum_amounts, zero_money},
    orders::{Order, OrderDiscountType, OrderLine},
    taxes::{CalculationError, TaxChain, calculate_tax_rate},
};

/// Untaxed sum of the discounted line totals.
///
/// # Errors
///
/// Returns [`MoneyError`] if a line is in another currency.
pub fn base_order_subtotal(order: &Order, lines: &[OrderLine]) -> Result<Amount, MoneyError> {
    sum_amounts(lines.iter().map(|line| line.base_total_price), order.currency())
}

/// Amount `voucher` takes off the order total.
///
/// Line-level vouchers are already part of the line prices and take nothing
/// off the total.
///
/// # Errors
///
/// Returns [`DiscountError::NotApplicable`] if the order no longer meets the
/// voucher's minimum spend or quantity.
pub fn get_voucher_discount_for_order(
    order: &Order,
    lines: &[OrderLine],
    voucher: &Voucher,
) -> Result<Amount, DiscountError> {
    let subtotal = base_order_subtotal(order, lines)?;
    let quantity = lines.iter().map(|line| line.quantity).sum();

    voucher.validate_min_spent(subtotal, order.channel_id)?;
    voucher.validate_min_checkout_items_quantity(quantity)?;

    if voucher.is_line_level() {
        return Ok(zero_money(order.currency()));
    }

    match voucher.voucher_type {
        VoucherType::EntireOrder => voucher.get_discount_amount_for(subtotal, order.channel_id),
        VoucherType::Shipping => {
            voucher.get_discount_amount_for(order.base_shipping_price, order.channel_id)
        }
        VoucherType::SpecificProduct => Ok(zero_money(order.currency())),
    }
}

/// Recompute line, shipping and total prices of an order.
///
/// `voucher_discount` is taken off the total as computed by
/// [`get_voucher_discount_for_order`] and recorded on the order's voucher
/// discount.
///
/// # Errors
///
/// Returns [`CalculationError`] on currency mismatch or when a tax plugin fails.
pub fn recalculate_order_prices(
    order: &mut Order,
    lines: &mut [OrderLine],
    voucher_discount: Amount,
    chain: &TaxChain,
) -> Result<(), CalculationError> {
    let currency = order.currency();
    let mut subtotal = TaxedMoney::zero(currency);
    let mut undiscounted_subtotal = TaxedMoney::zero(currency);

    for line in lines.iter_mut() {
        update_line_prices(order, line, chain)?;

        subtotal = subtotal.add(line.total_price)?;
        undiscounted_subtotal = undiscounted_subtotal.add(line.undiscounted_total_price)?;
    }

    let shipping_base = TaxedMoney::untaxed(order.base_shipping_price);
    order.shipping_price = chain.calculate_order_shipping(order, shipping_base)?;
    order.shipping_tax_rate =
        chain.get_order_shipping_tax_rate(order, calculate_tax_rate(order.shipping_price))?;

    let with_shipping = subtotal.add(order.shipping_price)?;
    let discount = min_amount(voucher_discount, with_shipping.gross);

    order.total = with_shipping.sub_amount(discount)?.floor_at_zero();
    order.undiscounted_total = undiscounted_subtotal.add(order.shipping_price)?;

    for order_discount in &mut order.discounts {
        if order_discount.discount_type == OrderDiscountType::Voucher {
            order_discount.amount = discount;
        }
    }

    debug!(order = %order.id, total = %order.total.gross, "order prices recalculated");

    Ok(())
}

fn update_line_prices(
    order: &Order,
    line: &mut OrderLine,
    chain: &TaxChain,
) -> Result<(), CalculationError> {
    let unit = TaxedMoney::untaxed(line.base_unit_price);
    let undiscounted_unit = TaxedMoney::untaxed(line.undiscounted_base_unit_price);
    let total = TaxedMoney::untaxed(line.base_total_price);
    let undiscounted_total = TaxedMoney::untaxed(line.undiscounted_base_total_price);

    line.unit_price = chain.calculate_order_line_unit(order, line, unit)?;
    line.undiscounted_unit_price = chain.calculate_order_line_unit(order, line, undiscounted_unit)?;
    line.total_price = chain.calculate_order_line_total(order, line, total)?;
    line.undiscounted_total_price =
        chain.calculate_order_line_total(order, line, undiscounted_total)?;
    line.tax_rate =
        chain.get_order_line_tax_rate(order, line, calculate_tax_rate(line.total_price))?;

    Ok(())
}
