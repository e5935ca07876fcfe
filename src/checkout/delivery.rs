//! Delivery methods
//!
//! Built-in shipping methods, externally provided ones and click-and-collect
//! warehouses, and the resolved [`DeliveryMethodInfo`] a checkout prices and
//! validates against.

use mockall::automock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    channels::{Address, ChannelId},
    checkout::{fetch::CheckoutLineInfo, models::Checkout},
    money::Amount,
    products::VariantId,
    store::{StoreError, StoreTransaction},
    uuids::TypedUuid,
    warehouse::{ClickAndCollectOption, Warehouse, WarehouseId},
};

/// Shipping method id
pub type ShippingMethodId = TypedUuid<ShippingMethod>;

/// A built-in shipping method.
#[derive(Debug, Clone)]
pub struct ShippingMethod {
    /// Method id
    pub id: ShippingMethodId,

    /// Display name
    pub name: String,

    /// Countries the method ships to
    pub countries: SmallVec<[String; 4]>,

    /// Inactive methods are never offered
    pub active: bool,
}

/// Price and order value window of a shipping method in one channel.
#[derive(Debug, Clone)]
pub struct ShippingMethodChannelListing {
    /// Method id
    pub shipping_method_id: ShippingMethodId,

    /// Channel id
    pub channel_id: ChannelId,

    /// Shipping price
    pub price: Amount,

    /// Lowest order subtotal the method is offered for
    pub minimum_order_price: Option<Amount>,

    /// Highest order subtotal the method is offered for
    pub maximum_order_price: Option<Amount>,
}

/// Key of a shipping method, built-in or provided by an external app.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShippingMethodKey {
    /// Built-in method
    BuiltIn(ShippingMethodId),

    /// Method identified by an external provider
    External(String),
}

/// A shipping method offered to a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingMethodData {
    /// Method key
    pub key: ShippingMethodKey,

    /// Display name
    pub name: String,

    /// Shipping price
    pub price: Amount,

    /// Lowest order subtotal the method is offered for
    pub minimum_order_price: Option<Amount>,

    /// Highest order subtotal the method is offered for
    pub maximum_order_price: Option<Amount>,

    /// Whether the method may be selected
    pub active: bool,

    /// Why an inactive method cannot be selected
    pub message: Option<String>,
}

impl ShippingMethodData {
    /// Built-in method priced by its channel listing.
    pub fn from_listing(method: &ShippingMethod, listing: &ShippingMethodChannelListing) -> Self {
        Self {
            key: ShippingMethodKey::BuiltIn(method.id),
            name: method.name.clone(),
            price: listing.price,
            minimum_order_price: listing.minimum_order_price,
            maximum_order_price: listing.maximum_order_price,
            active: method.active,
            message: None,
        }
    }

    /// Whether `subtotal` falls inside the method's order value window.
    pub fn accepts_order_price(&self, subtotal: Amount) -> bool {
        let above_minimum = self
            .minimum_order_price
            .is_none_or(|minimum| subtotal.amount() >= minimum.amount());
        let below_maximum = self
            .maximum_order_price
            .is_none_or(|maximum| subtotal.amount() <= maximum.amount());

        above_minimum && below_maximum
    }
}

/// Delivery method stored on a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeliveryMethodRef {
    /// Nothing selected
    #[default]
    None,

    /// Built-in shipping method
    Shipping(ShippingMethodId),

    /// Shipping method offered by an external provider, resolved on demand
    External(String),

    /// Click-and-collect warehouse
    CollectionPoint(WarehouseId),
}

/// The checkout's delivery method, resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryMethodInfo {
    /// Nothing selected, or the selection no longer exists
    None,

    /// Shipping to an address
    Shipping {
        /// Selected method
        method: ShippingMethodData,

        /// Address to ship to
        address: Option<Address>,
    },

    /// Pick-up from a warehouse
    CollectionPoint {
        /// Selected warehouse
        warehouse: Warehouse,

        /// Address on the checkout, which must be the warehouse address
        address: Option<Address>,
    },
}

impl DeliveryMethodInfo {
    /// Whether a method is selected.
    pub fn is_selected(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the selection is complete: shipping needs an address and a
    /// collection point needs the checkout address to be its own.
    pub fn is_valid_delivery_method(&self) -> bool {
        match self {
            Self::None => false,
            Self::Shipping { address, .. } => address.is_some(),
            Self::CollectionPoint { warehouse, address } => {
                address.as_ref() == Some(&warehouse.address)
            }
        }
    }

    /// Whether the selection is a warehouse that only hands out its own stock.
    pub fn is_local_collection_point(&self) -> bool {
        matches!(
            self,
            Self::CollectionPoint { warehouse, .. }
                if warehouse.click_and_collect_option == ClickAndCollectOption::Local
        )
    }

    /// Warehouse stock must come from, if restricted.
    pub fn warehouse_filter(&self) -> Option<WarehouseId> {
        match self {
            Self::CollectionPoint { warehouse, .. } if self.is_local_collection_point() => {
                Some(warehouse.id)
            }
            _ => None,
        }
    }

    /// Display name of the selection.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Shipping { method, .. } => Some(&method.name),
            Self::CollectionPoint { warehouse, .. } => Some(&warehouse.name),
        }
    }

    /// Address the order is delivered to or picked up from.
    pub fn shipping_address(&self) -> Option<&Address> {
        match self {
            Self::None => None,
            Self::Shipping { address, .. } => address.as_ref(),
            Self::CollectionPoint { warehouse, .. } => Some(&warehouse.address),
        }
    }

    /// Undiscounted, untaxed delivery price. Pick-up is free.
    pub fn price(&self) -> Option<Amount> {
        match self {
            Self::Shipping { method, .. } => Some(method.price),
            Self::None | Self::CollectionPoint { .. } => None,
        }
    }

    /// Fields copied to the order.
    pub fn order_fields(&self) -> OrderDeliveryFields {
        match self {
            Self::None => OrderDeliveryFields::default(),
            Self::Shipping { method, .. } => OrderDeliveryFields {
                shipping_method: Some(method.key.clone()),
                shipping_method_name: Some(method.name.clone()),
                ..OrderDeliveryFields::default()
            },
            Self::CollectionPoint { warehouse, .. } => OrderDeliveryFields {
                collection_point_id: Some(warehouse.id),
                collection_point_name: Some(warehouse.name.clone()),
                ..OrderDeliveryFields::default()
            },
        }
    }
}

/// Delivery details frozen on an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderDeliveryFields {
    /// Shipping method key
    pub shipping_method: Option<ShippingMethodKey>,

    /// Shipping method name
    pub shipping_method_name: Option<String>,

    /// Pick-up warehouse
    pub collection_point_id: Option<WarehouseId>,

    /// Pick-up warehouse name
    pub collection_point_name: Option<String>,
}

/// Shipping methods offered by an external app (for example through a
/// webhook).
#[automock]
pub trait ShippingMethodsProvider: Send + Sync {
    /// Methods available to the checkout. Providers that cannot be reached
    /// offer nothing.
    fn list_shipping_methods(&self, checkout: &Checkout) -> Vec<ShippingMethodData>;
}

/// [`ShippingMethodsProvider`] offering nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalShippingMethods;

impl ShippingMethodsProvider for NoExternalShippingMethods {
    fn list_shipping_methods(&self, _checkout: &Checkout) -> Vec<ShippingMethodData> {
        Vec::new()
    }
}

/// Built-in methods that ship to `country_code` and accept `subtotal`.
pub fn get_valid_internal_shipping_methods(
    methods: &[(ShippingMethod, ShippingMethodChannelListing)],
    subtotal: Amount,
    country_code: &str,
) -> Vec<ShippingMethodData> {
    methods
        .iter()
        .filter(|(method, _)| method.countries.iter().any(|country| country == country_code))
        .map(|(method, listing)| ShippingMethodData::from_listing(method, listing))
        .filter(|method| method.accepts_order_price(subtotal))
        .collect()
}

/// Warehouses of a channel the checkout lines can be picked up from.
///
/// A warehouse with [`ClickAndCollectOption::Local`] must stock every line
/// itself; one with [`ClickAndCollectOption::AllWarehouses`] may draw on the
/// stock of every warehouse in the channel.
///
/// # Errors
///
/// Returns a [`StoreError`] if stock cannot be read.
pub fn valid_collection_points<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    channel_warehouses: &[Warehouse],
    lines: &[CheckoutLineInfo],
) -> Result<Vec<Warehouse>, StoreError> {
    if !lines.iter().any(|line| line.variant.is_shipping_required) {
        return Ok(Vec::new());
    }

    let variant_ids: Vec<VariantId> = lines.iter().map(|line| line.variant.id).collect();
    let stocks = tx.stocks_for_update(&variant_ids)?;

    let mut channel_available: FxHashMap<VariantId, u32> = FxHashMap::default();
    for stock in &stocks {
        if channel_warehouses
            .iter()
            .any(|warehouse| warehouse.id == stock.warehouse_id)
        {
            let sum = channel_available.entry(stock.variant_id).or_default();
            *sum = sum.saturating_add(stock.available_quantity());
        }
    }

    let covers = |available: &dyn Fn(VariantId) -> u32| {
        lines
            .iter()
            .all(|line| available(line.variant.id) >= line.line.quantity)
    };

    Ok(channel_warehouses
        .iter()
        .filter(|warehouse| match warehouse.click_and_collect_option {
            ClickAndCollectOption::Disabled => false,
            ClickAndCollectOption::AllWarehouses => {
                covers(&|variant_id| channel_available.get(&variant_id).copied().unwrap_or(0))
            }
            ClickAndCollectOption::Local => covers(&|variant_id| {
                stocks
                    .iter()
                    .filter(|stock| {
                        stock.warehouse_id == warehouse.id && stock.variant_id == variant_id
                    })
                    .map(|stock| stock.available_quantity())
                    .sum()
            }),
        })
        .cloned()
        .collect())
}
