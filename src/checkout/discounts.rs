//! Checkout vouchers
//!
//! Resolving, validating and applying the voucher entered on a checkout.

use jiff::Timestamp;
use tracing::{debug, instrument};

use crate::{
    checkout::{
        base_calculations::{
            base_checkout_delivery_price, base_checkout_line_total, base_checkout_line_unit_price,
        },
        errors::CheckoutError,
        fetch::{CheckoutInfo, CheckoutLineInfo},
        models::Checkout,
    },
    discounts::{
        DiscountError, NotApplicable,
        sales::DiscountInfo,
        vouchers::{
            Voucher, VoucherType, VoucherValidation, get_products_voucher_discount,
            validate_voucher,
        },
    },
    money::{Amount, min_amount, sum_amounts, zero_money},
    store::{StoreError, StoreTransaction},
};

/// The checkout's voucher, if its code still resolves to a voucher active in
/// the checkout channel.
///
/// With `with_lock` the voucher row stays locked until the transaction ends.
///
/// # Errors
///
/// Returns a [`StoreError`] if the voucher cannot be read.
pub fn get_voucher_for_checkout<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    checkout: &Checkout,
    with_lock: bool,
    point_in_time: Timestamp,
) -> Result<Option<Voucher>, StoreError> {
    let Some(code) = checkout.voucher_code.as_deref() else {
        return Ok(None);
    };

    Ok(tx
        .voucher_by_code(code, with_lock)?
        .filter(|voucher| voucher.is_active_in_channel(checkout.channel_id, point_in_time)))
}

/// Lines a specific-product voucher discounts. An empty allow-list matches
/// every line.
pub fn get_discounted_lines<'a>(
    lines: &'a [CheckoutLineInfo],
    voucher: &Voucher,
) -> Vec<&'a CheckoutLineInfo> {
    lines
        .iter()
        .filter(|line| {
            voucher.applies_to(&line.product, &line.product.collection_ids, line.variant.id)
        })
        .collect()
}

fn subtotal_with_sales(
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<Amount, DiscountError> {
    let totals = lines
        .iter()
        .map(|line| base_checkout_line_total(line, &info.channel, discounts))
        .map(|total| total.map(|prices| prices.price_with_sale))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sum_amounts(totals, info.checkout.currency)?)
}

fn unit_prices_with_sales(
    info: &CheckoutInfo,
    lines: &[&CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<Vec<Amount>, DiscountError> {
    let mut prices = Vec::new();

    for line in lines {
        let unit = base_checkout_line_unit_price(line, &info.channel, discounts)?;

        prices.extend((0..line.line.quantity).map(|_| unit.price_with_sale));
    }

    Ok(prices)
}

/// Amount the voucher takes off the checkout.
///
/// # Errors
///
/// Returns [`DiscountError::NotApplicable`] if the voucher fails validation or
/// does not fit the checkout.
pub fn get_voucher_discount_for_checkout<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<Amount, DiscountError> {
    let subtotal = subtotal_with_sales(info, lines, discounts)?;
    let channel_id = info.channel.id;

    validate_voucher(
        tx,
        voucher,
        &VoucherValidation {
            total_price: subtotal,
            quantity: info.checkout.quantity(),
            customer_email: info.customer_email(),
            channel_id,
            user: info.user.as_ref(),
        },
    )?;

    match voucher.voucher_type {
        VoucherType::EntireOrder => {
            if !voucher.apply_once_per_order {
                return voucher.get_discount_amount_for(subtotal, channel_id);
            }

            let all_lines: Vec<&CheckoutLineInfo> = lines.iter().collect();
            let prices = unit_prices_with_sales(info, &all_lines, discounts)?;

            get_products_voucher_discount(voucher, &prices, channel_id, info.checkout.currency)
        }
        VoucherType::Shipping => {
            if !info.shipping_required {
                return Err(NotApplicable::new("Your order does not require shipping.").into());
            }

            if info.delivery_method_info().price().is_none() {
                return Err(NotApplicable::new("Please select a delivery method first.").into());
            }

            let country = info
                .shipping_address
                .as_ref()
                .map(|address| address.country.as_str());

            if !voucher.countries.is_empty()
                && !country.is_some_and(|country| voucher.countries.iter().any(|c| c == country))
            {
                return Err(NotApplicable::new("This offer is not valid in your country.").into());
            }

            let shipping_price = base_checkout_delivery_price(info, lines);

            voucher.get_discount_amount_for(shipping_price, channel_id)
        }
        VoucherType::SpecificProduct => {
            let discounted = get_discounted_lines(lines, voucher);
            let prices = unit_prices_with_sales(info, &discounted, discounts)?;

            get_products_voucher_discount(voucher, &prices, channel_id, info.checkout.currency)
        }
    }
}

/// Apply `voucher` to the checkout and store the discount it grants.
///
/// # Errors
///
/// Returns [`CheckoutError`] with code `VOUCHER_NOT_APPLICABLE` if the voucher
/// does not fit the checkout.
#[instrument(skip_all, fields(checkout = %info.checkout.token, voucher = %voucher.code))]
pub fn add_voucher_to_checkout<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    info: &mut CheckoutInfo,
    lines: &[CheckoutLineInfo],
    voucher: &Voucher,
    discounts: &[DiscountInfo],
) -> Result<(), CheckoutError> {
    let discount = get_voucher_discount_for_checkout(tx, voucher, info, lines, discounts)?;

    info.checkout.voucher_code = Some(voucher.code.clone());
    info.checkout.discount_name.clone_from(&voucher.name);
    info.checkout.discount = discount;
    info.voucher = Some(voucher.clone());

    tx.save_checkout(info.checkout.clone())?;

    debug!(discount = %discount, "voucher added");

    Ok(())
}

/// Drop the checkout's voucher and its discount.
///
/// # Errors
///
/// Returns a [`StoreError`] if the checkout cannot be saved.
pub fn remove_voucher_from_checkout<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    info: &mut CheckoutInfo,
) -> Result<(), StoreError> {
    info.checkout.voucher_code = None;
    info.checkout.discount_name = None;
    info.checkout.discount = zero_money(info.checkout.currency);
    info.voucher = None;

    tx.save_checkout(info.checkout.clone())
}

/// Recompute the voucher discount after the checkout changed.
///
/// A voucher that no longer applies is removed. The discount never exceeds
/// the subtotal, except for shipping vouchers which are bounded by the
/// shipping price.
///
/// # Errors
///
/// Returns [`CheckoutError`] if prices are in another currency or the store
/// fails.
pub fn recalculate_checkout_discount<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    info: &mut CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<(), CheckoutError> {
    let Some(voucher) = info.voucher.clone() else {
        info.checkout.discount = zero_money(info.checkout.currency);
        info.checkout.discount_name = None;
        tx.save_checkout(info.checkout.clone())?;

        return Ok(());
    };

    let discount = match get_voucher_discount_for_checkout(tx, &voucher, info, lines, discounts) {
        Ok(discount) => discount,
        Err(DiscountError::NotApplicable(reason)) => {
            debug!(voucher = %voucher.code, %reason, "voucher no longer applies");

            remove_voucher_from_checkout(tx, info)?;

            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    info.checkout.discount = if voucher.voucher_type == VoucherType::Shipping {
        discount
    } else {
        min_amount(discount, subtotal_with_sales(info, lines, discounts)?)
    };
    info.checkout.discount_name.clone_from(&voucher.name);

    tx.save_checkout(info.checkout.clone())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rusty_money::{Money, iso::USD};
    use testresult::TestResult;

    use crate::{
        channels::Channel,
        checkout::{
            delivery::NoExternalShippingMethods,
            fetch::{
                fetch_checkout_info,
                tests::{channel, line_info, voucher},
            },
        },
        discounts::DiscountValueType,
        store::{MemoryStore, Store},
    };

    use super::*;

    fn info_for<T: StoreTransaction>(
        tx: &mut T,
        channel: &Channel,
        lines: &[CheckoutLineInfo],
        voucher: &Voucher,
    ) -> Result<CheckoutInfo, CheckoutError> {
        let mut checkout = Checkout::new(channel, Timestamp::UNIX_EPOCH);
        for line in lines {
            checkout.add_variant(line.variant.id, line.line.quantity);
        }

        let mut info = fetch_checkout_info(
            tx,
            checkout,
            channel.clone(),
            lines,
            &[],
            Arc::new(NoExternalShippingMethods),
            Timestamp::now(),
        )?;
        info.voucher = Some(voucher.clone());
        info.checkout.voucher_code = Some(voucher.code.clone());

        Ok(info)
    }

    #[test]
    fn entire_order_voucher_discounts_the_subtotal() -> TestResult {
        let channel = channel();
        let store = MemoryStore::new();
        let lines = vec![line_info(&channel, 1000, 3)];
        let five_off = voucher(&channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 5);

        let mut tx = store.begin()?;
        let info = info_for(&mut tx, &channel, &lines, &five_off)?;

        let discount = get_voucher_discount_for_checkout(&mut tx, &five_off, &info, &lines, &[])?;

        assert_eq!(discount, Money::from_minor(500, USD));

        Ok(())
    }

    #[test]
    fn once_per_order_uses_the_cheapest_unit() -> TestResult {
        let channel = channel();
        let store = MemoryStore::new();
        let lines = vec![line_info(&channel, 1000, 3), line_info(&channel, 400, 1)];
        let mut half_off = voucher(
            &channel,
            VoucherType::EntireOrder,
            DiscountValueType::Percentage,
            50,
        );
        half_off.apply_once_per_order = true;

        let mut tx = store.begin()?;
        let info = info_for(&mut tx, &channel, &lines, &half_off)?;

        let discount = get_voucher_discount_for_checkout(&mut tx, &half_off, &info, &lines, &[])?;

        assert_eq!(discount, Money::from_minor(200, USD));

        Ok(())
    }

    #[test]
    fn specific_product_voucher_only_counts_listed_products() -> TestResult {
        let channel = channel();
        let store = MemoryStore::new();
        let lines = vec![line_info(&channel, 1000, 2), line_info(&channel, 3000, 1)];
        let mut specific = voucher(
            &channel,
            VoucherType::SpecificProduct,
            DiscountValueType::Percentage,
            10,
        );
        specific.product_ids = lines.iter().take(1).map(|line| line.product.id).collect();

        let mut tx = store.begin()?;
        let info = info_for(&mut tx, &channel, &lines, &specific)?;

        let discount = get_voucher_discount_for_checkout(&mut tx, &specific, &info, &lines, &[])?;

        assert_eq!(discount, Money::from_minor(200, USD));

        Ok(())
    }

    #[test]
    fn shipping_voucher_needs_a_delivery_method() -> TestResult {
        let channel = channel();
        let store = MemoryStore::new();
        let lines = vec![line_info(&channel, 1000, 1)];
        let free_shipping = voucher(
            &channel,
            VoucherType::Shipping,
            DiscountValueType::Percentage,
            100,
        );

        let mut tx = store.begin()?;
        let info = info_for(&mut tx, &channel, &lines, &free_shipping)?;

        let result = get_voucher_discount_for_checkout(&mut tx, &free_shipping, &info, &lines, &[]);

        assert_eq!(
            result,
            Err(NotApplicable::new("Please select a delivery method first.").into())
        );

        Ok(())
    }

    #[test]
    fn inapplicable_voucher_is_removed_on_recalculation() -> TestResult {
        let channel = channel();
        let store = MemoryStore::new();
        let lines = vec![line_info(&channel, 1000, 1)];
        let mut big_spender =
            voucher(&channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 5);
        if let Some(listing) = big_spender.channel_listings.first_mut() {
            listing.min_spent = Some(Money::from_decimal(Decimal::from(100), USD));
        }

        let mut tx = store.begin()?;
        let mut info = info_for(&mut tx, &channel, &lines, &big_spender)?;
        info.checkout.discount = Money::from_minor(500, USD);

        recalculate_checkout_discount(&mut tx, &mut info, &lines, &[])?;

        let saved = tx.checkout(info.checkout.token)?.ok_or("checkout not saved")?;
        assert!(saved.voucher_code.is_none());
        assert_eq!(saved.discount, Money::from_minor(0, USD));
        assert!(info.voucher.is_none());

        Ok(())
    }

    #[test]
    fn adding_a_voucher_stores_its_discount() -> TestResult {
        let channel = channel();
        let store = MemoryStore::new();
        let lines = vec![line_info(&channel, 1000, 2)];
        let five_off = voucher(&channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 5);

        let mut tx = store.begin()?;
        let mut info = info_for(&mut tx, &channel, &lines, &five_off)?;
        remove_voucher_from_checkout(&mut tx, &mut info)?;

        add_voucher_to_checkout(&mut tx, &mut info, &lines, &five_off, &[])?;

        let saved = tx.checkout(info.checkout.token)?.ok_or("checkout not saved")?;
        assert_eq!(saved.voucher_code.as_deref(), Some("SAVE"));
        assert_eq!(saved.discount_name.as_deref(), Some("Save"));
        assert_eq!(saved.discount, Money::from_minor(500, USD));

        Ok(())
    }
}
