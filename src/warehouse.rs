//! Warehouses and stock
//!
//! Stock levels per warehouse, the allocations order lines hold against them
//! and the errors raised when demand cannot be met.

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    channels::{Address, ChannelId},
    orders::OrderLineId,
    products::{ProductVariant, VariantChannelListing, VariantChannelListingId, VariantId},
    store::{StoreError, StoreTransaction},
    uuids::TypedUuid,
};

pub mod availability;
pub mod management;

/// Warehouse id
pub type WarehouseId = TypedUuid<Warehouse>;

/// Stock id
pub type StockId = TypedUuid<Stock>;

/// Allocation id
pub type AllocationId = TypedUuid<Allocation>;

/// Preorder allocation id
pub type PreorderAllocationId = TypedUuid<PreorderAllocation>;

/// Whether and how customers can pick orders up from a warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickAndCollectOption {
    /// No pick-up
    #[default]
    Disabled,

    /// Pick-up of items stocked in this warehouse only
    Local,

    /// Pick-up of items stocked anywhere in the channel
    AllWarehouses,
}

/// Warehouse
#[derive(Debug, Clone, PartialEq)]
pub struct Warehouse {
    /// Warehouse id
    pub id: WarehouseId,

    /// Name
    pub name: String,

    /// Pick-up address
    pub address: Address,

    /// Pick-up mode
    pub click_and_collect_option: ClickAndCollectOption,

    /// Private warehouses are hidden from customers
    pub is_private: bool,

    /// Channels served by the warehouse
    pub channel_ids: Vec<ChannelId>,

    /// Countries the warehouse ships to
    pub countries: SmallVec<[String; 4]>,

    /// Position in the channels' warehouse order
    pub sort_order: u32,
}

impl Warehouse {
    /// Whether the warehouse ships to `country_code`.
    pub fn ships_to(&self, country_code: &str) -> bool {
        self.countries.iter().any(|country| country == country_code)
    }
}

/// Quantity of one variant held in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stock {
    /// Stock id
    pub id: StockId,

    /// Warehouse id
    pub warehouse_id: WarehouseId,

    /// Variant id
    pub variant_id: VariantId,

    /// Units on hand
    pub quantity: u32,

    /// Units promised to order lines
    pub quantity_allocated: u32,
}

impl Stock {
    /// Units not yet allocated.
    pub fn available_quantity(&self) -> u32 {
        self.quantity.saturating_sub(self.quantity_allocated)
    }
}

/// Units of a stock promised to an order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Allocation id
    pub id: AllocationId,

    /// Order line id
    pub order_line_id: OrderLineId,

    /// Stock id
    pub stock_id: StockId,

    /// Allocated units
    pub quantity_allocated: u32,
}

/// Preordered units of a variant in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreorderAllocation {
    /// Allocation id
    pub id: PreorderAllocationId,

    /// Order line id
    pub order_line_id: OrderLineId,

    /// Variant channel listing the units count against
    pub variant_channel_listing_id: VariantChannelListingId,

    /// Preordered units
    pub quantity: u32,
}

/// One variant that cannot be supplied in the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientStockData {
    /// Variant id
    pub variant_id: VariantId,

    /// Order line the shortage was found on
    pub order_line_id: Option<OrderLineId>,

    /// Warehouse the shortage was found in
    pub warehouse_id: Option<WarehouseId>,

    /// Units that could be supplied
    pub available_quantity: Option<u32>,
}

/// Demand exceeds supply for one or more variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Insufficient stock for {}", describe(.items))]
pub struct InsufficientStock {
    /// Every variant that fell short
    pub items: Vec<InsufficientStockData>,
}

impl InsufficientStock {
    /// Ids of the variants that fell short.
    pub fn variant_ids(&self) -> Vec<VariantId> {
        self.items.iter().map(|item| item.variant_id).collect()
    }
}

fn describe(items: &[InsufficientStockData]) -> String {
    items
        .iter()
        .map(|item| item.variant_id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while checking or allocating stock.
#[derive(Debug, Error)]
pub enum StockError {
    /// Not enough stock.
    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),

    /// Stock could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A quantity of a variant requested by a checkout or order line.
#[derive(Debug, Clone, Copy)]
pub struct LineQuantity<'a> {
    /// Order line, once created
    pub order_line_id: Option<OrderLineId>,

    /// Requested variant
    pub variant: &'a ProductVariant,

    /// Listing of the variant in the channel
    pub channel_listing: &'a VariantChannelListing,

    /// Requested units
    pub quantity: u32,
}

/// Warehouses of a channel that may supply lines shipping to `country_code`,
/// in sorting order. A warehouse filter restricts the result to that warehouse.
///
/// # Errors
///
/// Returns a [`StoreError`] if the warehouses cannot be read.
pub fn warehouses_for_country<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    channel_id: ChannelId,
    country_code: &str,
    warehouse_filter: Option<WarehouseId>,
) -> Result<Vec<Warehouse>, StoreError> {
    let warehouses = tx.warehouses(channel_id)?;

    Ok(warehouses
        .into_iter()
        .filter(|warehouse| match warehouse_filter {
            Some(id) => warehouse.id == id,
            None => warehouse.ships_to(country_code),
        })
        .collect())
}
