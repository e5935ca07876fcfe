//! Catalogue discount resolution
//!
//! Finds the sales that apply to a product and picks the one yielding the
//! lowest price.

use rusty_money::MoneyError;

use crate::{
    channels::Channel,
    discounts::{
        Discount, NotApplicable,
        sales::{DiscountInfo, SaleId},
    },
    money::Amount,
    products::{CollectionId, Product, VariantId},
};

/// Resolve the discount a sale grants a product.
///
/// A product is on sale when the product, its category, one of its
/// collections or (when given) the variant is listed by the sale.
///
/// # Errors
///
/// Returns [`NotApplicable`] when the sale does not cover the product or is
/// not listed in the channel.
pub fn is_on_sale(
    product: &Product,
    collections: &[CollectionId],
    discount: &DiscountInfo,
    channel: &Channel,
    variant_id: Option<VariantId>,
) -> Result<(SaleId, Discount), NotApplicable> {
    let is_product_on_sale = discount.product_ids.contains(&product.id)
        || product
            .category_id
            .is_some_and(|category| discount.category_ids.contains(&category))
        || collections
            .iter()
            .any(|collection| discount.collection_ids.contains(collection));

    let is_variant_on_sale =
        variant_id.is_some_and(|variant| discount.variants_ids.contains(&variant));

    if !(is_product_on_sale || is_variant_on_sale) {
        return Err(NotApplicable::new(
            "Discount not applicable for this product",
        ));
    }

    Ok((discount.sale_id, discount.discount_for(channel.id)?))
}

/// Apply every matching sale to `price` and keep the cheapest outcome.
///
/// The first sale producing the minimum wins ties. Returns `(None, price)`
/// when nothing matches.
///
/// # Errors
///
/// Returns [`MoneyError`] if a fixed sale amount is in another currency.
pub fn best_discount(
    product: &Product,
    price: Amount,
    collections: &[CollectionId],
    discounts: &[DiscountInfo],
    channel: &Channel,
    variant_id: Option<VariantId>,
) -> Result<(Option<SaleId>, Amount), MoneyError> {
    let mut best: Option<(SaleId, Amount)> = None;

    for discount in discounts {
        let on_sale = is_on_sale(product, collections, discount, channel, variant_id);
        let Ok((sale_id, discount)) = on_sale else {
            continue;
        };

        let discounted = discount.apply(price)?;

        let improves = best
            .as_ref()
            .is_none_or(|(_, current)| discounted.amount() < current.amount());

        if improves {
            best = Some((sale_id, discounted));
        }
    }

    Ok(match best {
        Some((sale_id, discounted)) => (Some(sale_id), discounted),
        None => (None, price),
    })
}

/// The lowest price `product` can be sold at under `discounts`.
///
/// # Errors
///
/// Returns [`MoneyError`] if a fixed sale amount is in another currency.
pub fn calculate_discounted_price(
    product: &Product,
    price: Amount,
    collections: &[CollectionId],
    discounts: &[DiscountInfo],
    channel: &Channel,
    variant_id: Option<VariantId>,
) -> Result<Amount, MoneyError> {
    best_discount(product, price, collections, discounts, channel, variant_id)
        .map(|(_, discounted)| discounted)
}
