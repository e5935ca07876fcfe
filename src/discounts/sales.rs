//! Sales
//!
//! Catalog-wide automatic discounts and the per-request [`DiscountInfo`]
//! snapshots built from them.

use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};
use rusty_money::iso::Currency;

use crate::{
    channels::ChannelId,
    discounts::{Discount, DiscountValueType, NotApplicable},
    products::{CategoryId, CollectionId, ProductId, VariantId},
    store::{StoreError, StoreTransaction},
    uuids::TypedUuid,
};

/// Sale id
pub type SaleId = TypedUuid<Sale>;

/// Discount value of a sale in one channel.
#[derive(Debug, Clone)]
pub struct SaleChannelListing {
    /// Channel id
    pub channel_id: ChannelId,

    /// Amount or percentage points, depending on the sale type
    pub discount_value: Decimal,

    /// Channel currency
    pub currency: &'static Currency,
}

/// Sale
#[derive(Debug, Clone)]
pub struct Sale {
    /// Sale id
    pub id: SaleId,

    /// Sale name
    pub name: String,

    /// Fixed or percentage
    pub value_type: DiscountValueType,

    /// Start of the sale
    pub start_date: Timestamp,

    /// End of the sale, open-ended when unset
    pub end_date: Option<Timestamp>,

    /// Per-channel discount values
    pub channel_listings: Vec<SaleChannelListing>,

    /// Discounted products
    pub product_ids: Vec<ProductId>,

    /// Discounted categories
    pub category_ids: Vec<CategoryId>,

    /// Discounted collections
    pub collection_ids: Vec<CollectionId>,

    /// Discounted variants
    pub variant_ids: Vec<VariantId>,
}

impl Sale {
    /// Whether the sale runs at the given moment.
    pub fn is_active(&self, point_in_time: Timestamp) -> bool {
        self.start_date <= point_in_time && self.end_date.is_none_or(|end| point_in_time <= end)
    }
}

/// Snapshot of one active sale and the flattened set of ids it applies to.
#[derive(Debug, Clone)]
pub struct DiscountInfo {
    /// Sale id
    pub sale_id: SaleId,

    /// Sale name
    pub name: String,

    /// Fixed or percentage
    pub value_type: DiscountValueType,

    /// Listings keyed by channel
    pub channel_listings: FxHashMap<ChannelId, SaleChannelListing>,

    /// Discounted products
    pub product_ids: FxHashSet<ProductId>,

    /// Discounted categories
    pub category_ids: FxHashSet<CategoryId>,

    /// Discounted collections
    pub collection_ids: FxHashSet<CollectionId>,

    /// Discounted variants
    pub variants_ids: FxHashSet<VariantId>,
}

impl DiscountInfo {
    /// Resolve the discount function for a channel.
    ///
    /// # Errors
    ///
    /// Returns [`NotApplicable`] if the sale is not listed in the channel.
    pub fn discount_for(&self, channel_id: ChannelId) -> Result<Discount, NotApplicable> {
        let listing = self
            .channel_listings
            .get(&channel_id)
            .ok_or_else(|| NotApplicable::new("This sale is not assigned to this channel."))?;

        Ok(Discount::from_value(
            self.value_type,
            listing.discount_value,
            listing.currency,
        ))
    }
}

impl From<Sale> for DiscountInfo {
    fn from(sale: Sale) -> Self {
        Self {
            sale_id: sale.id,
            name: sale.name,
            value_type: sale.value_type,
            channel_listings: sale
                .channel_listings
                .into_iter()
                .map(|listing| (listing.channel_id, listing))
                .collect(),
            product_ids: sale.product_ids.into_iter().collect(),
            category_ids: sale.category_ids.into_iter().collect(),
            collection_ids: sale.collection_ids.into_iter().collect(),
            variants_ids: sale.variant_ids.into_iter().collect(),
        }
    }
}

/// Build the discount snapshots for every sale active at `point_in_time`.
pub fn active_discounts(
    sales: impl IntoIterator<Item = Sale>,
    point_in_time: Timestamp,
) -> Vec<DiscountInfo> {
    sales
        .into_iter()
        .filter(|sale| sale.is_active(point_in_time))
        .map(DiscountInfo::from)
        .collect()
}

/// Load the sales from the store and snapshot the active ones.
///
/// # Errors
///
/// Returns a [`StoreError`] if the sales cannot be read.
pub fn fetch_active_discounts<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    point_in_time: Timestamp,
) -> Result<Vec<DiscountInfo>, StoreError> {
    Ok(active_discounts(tx.sales()?, point_in_time))
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use rusty_money::{Money, iso::USD};
    use testresult::TestResult;

    use super::*;

    fn sale(start_date: Timestamp, end_date: Option<Timestamp>, channel_id: ChannelId) -> Sale {
        Sale {
            id: SaleId::new(),
            name: "Summer".to_string(),
            value_type: DiscountValueType::Fixed,
            start_date,
            end_date,
            channel_listings: vec![SaleChannelListing {
                channel_id,
                discount_value: Decimal::from(2),
                currency: USD,
            }],
            product_ids: vec![ProductId::new()],
            category_ids: Vec::new(),
            collection_ids: Vec::new(),
            variant_ids: Vec::new(),
        }
    }

    #[test]
    fn active_discounts_filters_by_date_window() -> TestResult {
        let now = Timestamp::now();
        let channel = ChannelId::new();

        let running = sale(now.checked_sub(1.hour())?, None, channel);
        let finished = sale(
            now.checked_sub(2.hours())?,
            Some(now.checked_sub(1.hour())?),
            channel,
        );
        let upcoming = sale(now.checked_add(1.hour())?, None, channel);
        let running_id = running.id;

        let discounts = active_discounts([running, finished, upcoming], now);

        assert_eq!(discounts.len(), 1);
        assert_eq!(discounts.first().map(|info| info.sale_id), Some(running_id));

        Ok(())
    }

    #[test]
    fn discount_for_requires_channel_listing() -> TestResult {
        let now = Timestamp::now();
        let channel = ChannelId::new();
        let info = DiscountInfo::from(sale(now, None, channel));

        assert_eq!(
            info.discount_for(channel)?,
            Discount::Fixed(Money::from_minor(200, USD))
        );
        assert!(info.discount_for(ChannelId::new()).is_err());

        Ok(())
    }
}
