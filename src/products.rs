//! Products
//!
//! Catalog records the checkout reads while pricing and validating lines.

use jiff::Timestamp;
use smallvec::SmallVec;

use crate::{channels::ChannelId, money::Amount, uuids::TypedUuid};

/// Product id
pub type ProductId = TypedUuid<Product>;

/// Product variant id
pub type VariantId = TypedUuid<ProductVariant>;

/// Variant channel listing id
pub type VariantChannelListingId = TypedUuid<VariantChannelListing>;

/// Marker for category ids.
#[derive(Debug)]
pub enum Category {}

/// Category id
pub type CategoryId = TypedUuid<Category>;

/// Marker for collection ids.
#[derive(Debug)]
pub enum Collection {}

/// Collection id
pub type CollectionId = TypedUuid<Collection>;

/// Product
#[derive(Debug, Clone)]
pub struct Product {
    /// Product id
    pub id: ProductId,

    /// Product name
    pub name: String,

    /// Category the product belongs to
    pub category_id: Option<CategoryId>,

    /// Collections the product is part of
    pub collection_ids: SmallVec<[CollectionId; 4]>,
}

/// Per-channel publication state of a product.
#[derive(Debug, Clone)]
pub struct ProductChannelListing {
    /// Product id
    pub product_id: ProductId,

    /// Channel id
    pub channel_id: ChannelId,

    /// Whether the product is published in the channel
    pub is_published: bool,

    /// Whether the product shows up in listings
    pub visible_in_listings: bool,

    /// Moment from which the product can be bought
    pub available_for_purchase_at: Option<Timestamp>,
}

impl ProductChannelListing {
    /// A product is purchasable once its availability date has passed.
    pub fn is_available_for_purchase(&self, point_in_time: Timestamp) -> bool {
        self.available_for_purchase_at
            .is_some_and(|available_at| available_at <= point_in_time)
    }
}

/// Product variant
#[derive(Debug, Clone)]
pub struct ProductVariant {
    /// Variant id
    pub id: VariantId,

    /// Product id
    pub product_id: ProductId,

    /// Stock keeping unit
    pub sku: Option<String>,

    /// Variant name
    pub name: String,

    /// Whether stock levels are enforced for the variant
    pub track_inventory: bool,

    /// Whether the variant needs to be shipped
    pub is_shipping_required: bool,

    /// Whether the variant is a gift card
    pub is_gift_card: bool,

    /// Whether the variant is sold as a preorder
    pub is_preorder: bool,

    /// End of the preorder period
    pub preorder_end_date: Option<Timestamp>,

    /// Maximum preorders across all channels
    pub preorder_global_threshold: Option<u32>,
}

impl ProductVariant {
    /// A preorder is active until its end date passes.
    pub fn is_preorder_active(&self, point_in_time: Timestamp) -> bool {
        self.is_preorder
            && self
                .preorder_end_date
                .is_none_or(|end_date| point_in_time <= end_date)
    }
}

/// Per-channel price of a variant.
#[derive(Debug, Clone)]
pub struct VariantChannelListing {
    /// Listing id
    pub id: VariantChannelListingId,

    /// Variant id
    pub variant_id: VariantId,

    /// Channel id
    pub channel_id: ChannelId,

    /// Price in the channel currency; unpriced variants cannot be sold
    pub price: Option<Amount>,

    /// Purchase cost
    pub cost_price: Option<Amount>,

    /// Maximum preorders in this channel
    pub preorder_quantity_threshold: Option<u32>,
}
