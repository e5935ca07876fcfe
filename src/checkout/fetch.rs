//! Checkout snapshots
//!
//! Assemble the per-request [`CheckoutInfo`] and [`CheckoutLineInfo`] graph a
//! pricing pass works on. Fields that may call out to external providers are
//! computed on first read and cached for the lifetime of the snapshot.

use std::{fmt, sync::Arc};

use jiff::Timestamp;
use once_cell::unsync::OnceCell;
use tracing::debug;

use crate::{
    accounts::User,
    channels::{Address, Channel},
    checkout::{
        base_calculations::{base_checkout_subtotal, is_shipping_required, line_sale_price},
        delivery::{
            DeliveryMethodInfo, DeliveryMethodRef, ShippingMethod, ShippingMethodChannelListing,
            ShippingMethodData, ShippingMethodKey, ShippingMethodsProvider,
            get_valid_internal_shipping_methods, valid_collection_points,
        },
        discounts::get_voucher_for_checkout,
        errors::CheckoutError,
        models::{Checkout, CheckoutLine},
    },
    discounts::{
        sales::DiscountInfo,
        vouchers::{Voucher, VoucherType},
    },
    money::Amount,
    products::{Product, ProductVariant, VariantChannelListing, VariantId},
    store::{StoreError, StoreTransaction},
    warehouse::{LineQuantity, Warehouse},
};

/// A checkout line with the catalog data needed to price it.
#[derive(Debug, Clone)]
pub struct CheckoutLineInfo {
    /// The line
    pub line: CheckoutLine,

    /// Variant
    pub variant: ProductVariant,

    /// Listing of the variant in the checkout channel
    pub channel_listing: VariantChannelListing,

    /// Product
    pub product: Product,

    /// Channel price of the variant
    pub price: Amount,

    /// Voucher discounting this line
    pub voucher: Option<Voucher>,
}

impl CheckoutLineInfo {
    /// Requested quantity, for stock checks.
    pub fn line_quantity(&self) -> LineQuantity<'_> {
        LineQuantity {
            order_line_id: None,
            variant: &self.variant,
            channel_listing: &self.channel_listing,
            quantity: self.line.quantity,
        }
    }
}

/// A checkout with everything needed to price and validate it.
#[derive(Clone)]
pub struct CheckoutInfo {
    /// The checkout
    pub checkout: Checkout,

    /// Customer account
    pub user: Option<User>,

    /// Checkout channel
    pub channel: Channel,

    /// Billing address
    pub billing_address: Option<Address>,

    /// Shipping address
    pub shipping_address: Option<Address>,

    /// Active voucher of the checkout
    pub voucher: Option<Voucher>,

    /// Whether any line has to be shipped
    pub shipping_required: bool,

    /// Untaxed subtotal shipping methods are matched against
    pub base_subtotal: Amount,

    shipping_channel_listings: Vec<(ShippingMethod, ShippingMethodChannelListing)>,
    channel_warehouses: Vec<Warehouse>,
    shipping_methods_provider: Arc<dyn ShippingMethodsProvider>,
    all_shipping_methods: OnceCell<Vec<ShippingMethodData>>,
    delivery_method_info: OnceCell<DeliveryMethodInfo>,
    valid_pick_up_points: OnceCell<Vec<Warehouse>>,
}

impl fmt::Debug for CheckoutInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutInfo")
            .field("checkout", &self.checkout)
            .field("channel", &self.channel.slug)
            .field("voucher", &self.voucher.as_ref().map(|voucher| &voucher.code))
            .field("base_subtotal", &self.base_subtotal)
            .field("delivery_method_info", &self.delivery_method_info.get())
            .finish_non_exhaustive()
    }
}

impl CheckoutInfo {
    /// Country used for stock and taxes: the shipping country, then the
    /// billing country, then the channel default.
    pub fn country(&self) -> &str {
        [&self.shipping_address, &self.billing_address]
            .into_iter()
            .flatten()
            .map(|address| address.country.as_str())
            .find(|country| !country.is_empty())
            .unwrap_or(&self.channel.default_country)
    }

    /// Email of the signed-in customer, or the one entered on the checkout.
    pub fn customer_email(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|user| user.email.as_str())
            .or(self.checkout.email.as_deref())
    }

    /// Built-in and external shipping methods for the shipping address.
    ///
    /// External providers are only asked on first read.
    pub fn all_shipping_methods(&self) -> &[ShippingMethodData] {
        self.all_shipping_methods.get_or_init(|| {
            let Some(address) = self.shipping_address.as_ref() else {
                return Vec::new();
            };

            if !self.shipping_required {
                return Vec::new();
            }

            let mut methods = get_valid_internal_shipping_methods(
                &self.shipping_channel_listings,
                self.base_subtotal,
                &address.country,
            );

            let external = self
                .shipping_methods_provider
                .list_shipping_methods(&self.checkout);

            debug!(
                internal = methods.len(),
                external = external.len(),
                "shipping methods listed"
            );

            methods.extend(external);
            methods
        })
    }

    /// Shipping methods that may be selected.
    pub fn valid_shipping_methods(&self) -> impl Iterator<Item = &ShippingMethodData> {
        self.all_shipping_methods()
            .iter()
            .filter(|method| method.active)
    }

    /// The selected delivery method, resolved on first read.
    pub fn delivery_method_info(&self) -> &DeliveryMethodInfo {
        self.delivery_method_info
            .get_or_init(|| match &self.checkout.delivery_method {
                DeliveryMethodRef::None => DeliveryMethodInfo::None,
                DeliveryMethodRef::Shipping(id) => self
                    .shipping_channel_listings
                    .iter()
                    .find(|(method, _)| method.id == *id)
                    .map_or(DeliveryMethodInfo::None, |(method, listing)| {
                        DeliveryMethodInfo::Shipping {
                            method: ShippingMethodData::from_listing(method, listing),
                            address: self.shipping_address.clone(),
                        }
                    }),
                DeliveryMethodRef::External(id) => {
                    let key = ShippingMethodKey::External(id.clone());

                    self.all_shipping_methods()
                        .iter()
                        .find(|method| method.key == key)
                        .map_or(DeliveryMethodInfo::None, |method| {
                            DeliveryMethodInfo::Shipping {
                                method: method.clone(),
                                address: self.shipping_address.clone(),
                            }
                        })
                }
                DeliveryMethodRef::CollectionPoint(id) => self
                    .channel_warehouses
                    .iter()
                    .find(|warehouse| warehouse.id == *id)
                    .map_or(DeliveryMethodInfo::None, |warehouse| {
                        DeliveryMethodInfo::CollectionPoint {
                            warehouse: warehouse.clone(),
                            address: self.shipping_address.clone(),
                        }
                    }),
            })
    }

    /// Warehouses the lines can be picked up from, computed on first read.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if stock cannot be read.
    pub fn valid_pick_up_points<T: StoreTransaction + ?Sized>(
        &self,
        tx: &mut T,
        lines: &[CheckoutLineInfo],
    ) -> Result<&[Warehouse], StoreError> {
        self.valid_pick_up_points
            .get_or_try_init(|| valid_collection_points(tx, &self.channel_warehouses, lines))
            .map(Vec::as_slice)
    }

    /// Whether the selected delivery method is among the valid ones.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if pick-up stock cannot be read.
    pub fn is_delivery_method_available<T: StoreTransaction + ?Sized>(
        &self,
        tx: &mut T,
        lines: &[CheckoutLineInfo],
    ) -> Result<bool, StoreError> {
        Ok(match self.delivery_method_info() {
            DeliveryMethodInfo::None => false,
            DeliveryMethodInfo::Shipping { method, .. } => self
                .valid_shipping_methods()
                .any(|valid| valid.key == method.key),
            DeliveryMethodInfo::CollectionPoint { warehouse, .. } => self
                .valid_pick_up_points(tx, lines)?
                .iter()
                .any(|valid| valid.id == warehouse.id),
        })
    }
}

/// Load the checkout lines that can still be sold in `channel`.
///
/// A line is unavailable when its variant is gone, is not listed or priced in
/// the channel, or its product is not purchasable there. Unavailable variant
/// ids are returned instead of failing. A line-level voucher is attached to
/// the lines it discounts.
///
/// # Errors
///
/// Returns a [`CheckoutError`] if the store fails or prices are in another
/// currency.
pub fn fetch_checkout_lines<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    checkout: &Checkout,
    channel: &Channel,
    discounts: &[DiscountInfo],
    point_in_time: Timestamp,
) -> Result<(Vec<CheckoutLineInfo>, Vec<VariantId>), CheckoutError> {
    let mut lines = Vec::with_capacity(checkout.lines.len());
    let mut unavailable = Vec::new();

    for line in &checkout.lines {
        match fetch_line(tx, line, channel, point_in_time)? {
            Some(info) => lines.push(info),
            None => unavailable.push(line.variant_id),
        }
    }

    if let Some(voucher) = get_voucher_for_checkout(tx, checkout, false, point_in_time)? {
        apply_voucher_to_checkout_lines(&voucher, &mut lines, channel, discounts)?;
    }

    if !unavailable.is_empty() {
        debug!(
            checkout = %checkout.token,
            unavailable = unavailable.len(),
            "checkout has unavailable lines"
        );
    }

    Ok((lines, unavailable))
}

fn fetch_line<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    line: &CheckoutLine,
    channel: &Channel,
    point_in_time: Timestamp,
) -> Result<Option<CheckoutLineInfo>, StoreError> {
    let Some(variant) = tx.variant(line.variant_id)? else {
        return Ok(None);
    };

    let Some(channel_listing) = tx
        .variant_channel_listings(variant.id)?
        .into_iter()
        .find(|listing| listing.channel_id == channel.id)
    else {
        return Ok(None);
    };

    let Some(price) = channel_listing.price else {
        return Ok(None);
    };

    let Some(product) = tx.product(variant.product_id)? else {
        return Ok(None);
    };

    let purchasable = tx
        .product_channel_listing(product.id, channel.id)?
        .is_some_and(|listing| listing.is_available_for_purchase(point_in_time));

    if !purchasable {
        return Ok(None);
    }

    Ok(Some(CheckoutLineInfo {
        line: line.clone(),
        variant,
        channel_listing,
        product,
        price,
        voucher: None,
    }))
}

/// Attach a line-level voucher to the lines it discounts.
///
/// Under apply-once-per-order only the eligible line with the cheapest sale
/// price gets the voucher; the first such line wins ties.
///
/// # Errors
///
/// Returns [`rusty_money::MoneyError`] if a sale is in another currency.
pub fn apply_voucher_to_checkout_lines(
    voucher: &Voucher,
    lines: &mut [CheckoutLineInfo],
    channel: &Channel,
    discounts: &[DiscountInfo],
) -> Result<(), rusty_money::MoneyError> {
    if !voucher.is_line_level() {
        return Ok(());
    }

    let eligible = |line: &CheckoutLineInfo| {
        voucher.voucher_type != VoucherType::SpecificProduct
            || voucher.applies_to(&line.product, &line.product.collection_ids, line.variant.id)
    };

    if !voucher.apply_once_per_order {
        for line in lines.iter_mut().filter(|line| eligible(line)) {
            line.voucher = Some(voucher.clone());
        }

        return Ok(());
    }

    let mut cheapest: Option<(usize, Amount)> = None;

    for (index, line) in lines.iter().enumerate() {
        if !eligible(line) {
            continue;
        }

        let (_, price) = line_sale_price(line, channel, discounts)?;

        if cheapest
            .as_ref()
            .is_none_or(|(_, current)| price.amount() < current.amount())
        {
            cheapest = Some((index, price));
        }
    }

    if let Some((index, _)) = cheapest
        && let Some(line) = lines.get_mut(index)
    {
        line.voucher = Some(voucher.clone());
    }

    Ok(())
}

/// Build the [`CheckoutInfo`] for a checkout and its available lines.
///
/// # Errors
///
/// Returns a [`CheckoutError`] if the store fails or prices are in another
/// currency.
pub fn fetch_checkout_info<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    checkout: Checkout,
    channel: Channel,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
    shipping_methods_provider: Arc<dyn ShippingMethodsProvider>,
    point_in_time: Timestamp,
) -> Result<CheckoutInfo, CheckoutError> {
    let user = match checkout.user_id {
        Some(user_id) => tx.user(user_id)?,
        None => None,
    };

    let voucher = get_voucher_for_checkout(tx, &checkout, false, point_in_time)?;
    let shipping_channel_listings = tx.shipping_methods(channel.id)?;
    let channel_warehouses = tx.warehouses(channel.id)?;
    let base_subtotal = base_checkout_subtotal(lines, &channel, discounts, checkout.currency)?;

    Ok(CheckoutInfo {
        user,
        billing_address: checkout.billing_address.clone(),
        shipping_address: checkout.shipping_address.clone(),
        voucher,
        shipping_required: is_shipping_required(lines),
        base_subtotal,
        shipping_channel_listings,
        channel_warehouses,
        shipping_methods_provider,
        all_shipping_methods: OnceCell::new(),
        delivery_method_info: OnceCell::new(),
        valid_pick_up_points: OnceCell::new(),
        checkout,
        channel,
    })
}
