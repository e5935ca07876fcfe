//! Vouchers
//!
//! Customer-entered discount codes, their validation rules and usage
//! bookkeeping.

use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::iso::Currency;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    accounts::User,
    channels::ChannelId,
    discounts::{Discount, DiscountError, DiscountValueType, NotApplicable},
    money::{Amount, floor_at_zero, min_amount, sum_amounts},
    products::{CategoryId, CollectionId, Product, ProductId, VariantId},
    store::StoreTransaction,
    uuids::TypedUuid,
};

/// Voucher id
pub type VoucherId = TypedUuid<Voucher>;

/// What a voucher discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherType {
    /// The whole order subtotal
    EntireOrder,

    /// The shipping price
    Shipping,

    /// Lines matching the voucher's allow-list
    SpecificProduct,
}

/// Discount value and minimum spend of a voucher in one channel.
#[derive(Debug, Clone)]
pub struct VoucherChannelListing {
    /// Channel id
    pub channel_id: ChannelId,

    /// Amount or percentage points, depending on the voucher's value type
    pub discount_value: Decimal,

    /// Channel currency
    pub currency: &'static Currency,

    /// Minimum subtotal required to use the voucher
    pub min_spent: Option<Amount>,
}

/// Voucher
#[derive(Debug, Clone)]
pub struct Voucher {
    /// Voucher id
    pub id: VoucherId,

    /// Code customers enter
    pub code: String,

    /// Display name
    pub name: Option<String>,

    /// What the voucher discounts
    pub voucher_type: VoucherType,

    /// Fixed or percentage
    pub discount_value_type: DiscountValueType,

    /// Maximum number of uses
    pub usage_limit: Option<u32>,

    /// Number of uses so far
    pub used: u32,

    /// Discount a single unit of the cheapest eligible line
    pub apply_once_per_order: bool,

    /// Each customer may use the voucher once
    pub apply_once_per_customer: bool,

    /// Only staff members may use the voucher
    pub only_for_staff: bool,

    /// Minimum number of items in the checkout
    pub min_checkout_items_quantity: Option<u32>,

    /// Countries a shipping voucher is valid in, empty meaning all
    pub countries: SmallVec<[String; 4]>,

    /// Start of validity
    pub start_date: Timestamp,

    /// End of validity, open-ended when unset
    pub end_date: Option<Timestamp>,

    /// Eligible products
    pub product_ids: Vec<ProductId>,

    /// Eligible variants
    pub variant_ids: Vec<VariantId>,

    /// Eligible categories
    pub category_ids: Vec<CategoryId>,

    /// Eligible collections
    pub collection_ids: Vec<CollectionId>,

    /// Per-channel values
    pub channel_listings: Vec<VoucherChannelListing>,
}

/// A customer's use of a once-per-customer voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherCustomer {
    /// Voucher id
    pub voucher_id: VoucherId,

    /// Customer email
    pub customer_email: String,
}

impl Voucher {
    /// Listing of the voucher in a channel.
    pub fn channel_listing(&self, channel_id: ChannelId) -> Option<&VoucherChannelListing> {
        self.channel_listings
            .iter()
            .find(|listing| listing.channel_id == channel_id)
    }

    /// Whether the voucher is inside its validity window and not used up.
    pub fn is_active(&self, point_in_time: Timestamp) -> bool {
        self.start_date <= point_in_time
            && self.end_date.is_none_or(|end| point_in_time <= end)
            && self.usage_limit.is_none_or(|limit| self.used < limit)
    }

    /// Whether the voucher can be used in a channel right now.
    pub fn is_active_in_channel(&self, channel_id: ChannelId, point_in_time: Timestamp) -> bool {
        self.is_active(point_in_time) && self.channel_listing(channel_id).is_some()
    }

    /// Vouchers that discount individual lines rather than the checkout total.
    pub fn is_line_level(&self) -> bool {
        self.voucher_type == VoucherType::SpecificProduct || self.apply_once_per_order
    }

    /// Whether the voucher restricts the lines it applies to.
    pub fn has_allow_list(&self) -> bool {
        !(self.product_ids.is_empty()
            && self.variant_ids.is_empty()
            && self.category_ids.is_empty()
            && self.collection_ids.is_empty())
    }

    /// Whether a line of `product` / `variant_id` is eligible. Every line is
    /// eligible when the allow-list is empty.
    pub fn applies_to(
        &self,
        product: &Product,
        collections: &[CollectionId],
        variant_id: VariantId,
    ) -> bool {
        if !self.has_allow_list() {
            return true;
        }

        self.product_ids.contains(&product.id)
            || self.variant_ids.contains(&variant_id)
            || product
                .category_id
                .is_some_and(|category| self.category_ids.contains(&category))
            || collections
                .iter()
                .any(|collection| self.collection_ids.contains(collection))
    }

    /// Resolve the discount function for a channel.
    ///
    /// # Errors
    ///
    /// Returns [`NotApplicable`] if the voucher is not listed in the channel.
    pub fn discount_for(&self, channel_id: ChannelId) -> Result<Discount, NotApplicable> {
        let listing = self
            .channel_listing(channel_id)
            .ok_or_else(|| NotApplicable::new("This voucher is not assigned to this channel."))?;

        Ok(Discount::from_value(
            self.discount_value_type,
            listing.discount_value,
            listing.currency,
        ))
    }

    /// Amount the voucher takes off `price`, never more than `price` itself.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError`] if the voucher is not listed in the channel or
    /// the currencies differ.
    pub fn get_discount_amount_for(
        &self,
        price: Amount,
        channel_id: ChannelId,
    ) -> Result<Amount, DiscountError> {
        let discounted = self.discount_for(channel_id)?.apply(price)?;
        let after_discount = price.sub(discounted)?;

        if after_discount.amount().is_sign_negative() {
            return Ok(price);
        }

        Ok(after_discount)
    }

    /// # Errors
    ///
    /// Returns [`NotApplicable`] if `value` is below the channel's minimum spend.
    pub fn validate_min_spent(
        &self,
        value: Amount,
        channel_id: ChannelId,
    ) -> Result<(), NotApplicable> {
        let Some(min_spent) = self
            .channel_listing(channel_id)
            .and_then(|listing| listing.min_spent)
        else {
            return Ok(());
        };

        if value.currency() == min_spent.currency() && value.amount() < min_spent.amount() {
            return Err(NotApplicable::new(format!(
                "This offer is only valid for orders over {min_spent}."
            )));
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`NotApplicable`] if the checkout holds too few items.
    pub fn validate_min_checkout_items_quantity(&self, quantity: u32) -> Result<(), NotApplicable> {
        match self.min_checkout_items_quantity {
            Some(min) if quantity < min => Err(NotApplicable::new(format!(
                "This offer is only valid for orders with a minimum of {min} quantity."
            ))),
            _ => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns [`NotApplicable`] for staff-only vouchers used by anyone else.
    pub fn validate_only_for_staff(&self, user: Option<&User>) -> Result<(), NotApplicable> {
        if self.only_for_staff && !user.is_some_and(|user| user.is_staff) {
            return Err(NotApplicable::new(
                "This offer is valid only for staff customers.",
            ));
        }

        Ok(())
    }
}

/// Discount a specific-product voucher grants over eligible unit prices.
///
/// Under apply-once-per-order only the cheapest unit is discounted.
///
/// # Errors
///
/// Returns [`DiscountError`] if no unit is eligible or the voucher is not
/// listed in the channel.
pub fn get_products_voucher_discount(
    voucher: &Voucher,
    prices: &[Amount],
    channel_id: ChannelId,
    currency: &'static Currency,
) -> Result<Amount, DiscountError> {
    let Some(first) = prices.first() else {
        return Err(NotApplicable::new("This offer is only valid for selected items.").into());
    };

    if voucher.apply_once_per_order {
        let cheapest = prices.iter().copied().fold(*first, min_amount);

        return voucher.get_discount_amount_for(cheapest, channel_id);
    }

    let discounts = prices
        .iter()
        .map(|price| voucher.get_discount_amount_for(*price, channel_id))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(floor_at_zero(sum_amounts(discounts, currency)?))
}

/// Inputs for [`validate_voucher`].
#[derive(Debug, Clone, Copy)]
pub struct VoucherValidation<'a> {
    /// Subtotal the minimum spend is compared against
    pub total_price: Amount,

    /// Number of items in the checkout
    pub quantity: u32,

    /// Email of the customer using the voucher
    pub customer_email: Option<&'a str>,

    /// Channel of the checkout
    pub channel_id: ChannelId,

    /// Customer account, if signed in
    pub user: Option<&'a User>,
}

/// Check every usage rule of a voucher.
///
/// # Errors
///
/// Returns [`DiscountError::NotApplicable`] naming the first failed rule.
pub fn validate_voucher<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
    validation: &VoucherValidation<'_>,
) -> Result<(), DiscountError> {
    voucher.validate_min_spent(validation.total_price, validation.channel_id)?;
    voucher.validate_min_checkout_items_quantity(validation.quantity)?;

    if voucher.apply_once_per_customer
        && let Some(email) = validation.customer_email
    {
        validate_voucher_once_per_customer(tx, voucher, email)?;
    }

    voucher.validate_only_for_staff(validation.user)?;

    Ok(())
}

/// # Errors
///
/// Returns [`DiscountError::NotApplicable`] if the customer already used the
/// voucher.
pub fn validate_voucher_once_per_customer<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
    customer_email: &str,
) -> Result<(), DiscountError> {
    if tx.voucher_customer_exists(voucher.id, customer_email)? {
        return Err(NotApplicable::new("This offer is valid only once per customer.").into());
    }

    Ok(())
}

/// Take one use of the voucher.
///
/// # Errors
///
/// Returns [`DiscountError::NotApplicable`] if the usage limit is reached.
pub fn increase_voucher_usage<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
) -> Result<(), DiscountError> {
    if !tx.increase_voucher_usage(voucher.id)? {
        return Err(NotApplicable::new("Voucher usage limit has been reached.").into());
    }

    debug!(voucher = %voucher.code, "voucher usage increased");

    Ok(())
}

/// Give back one use of the voucher.
///
/// # Errors
///
/// Returns [`DiscountError::Store`] if the voucher cannot be updated.
pub fn decrease_voucher_usage<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
) -> Result<(), DiscountError> {
    tx.decrease_voucher_usage(voucher.id)?;

    debug!(voucher = %voucher.code, "voucher usage decreased");

    Ok(())
}

/// Record that a customer used the voucher.
///
/// # Errors
///
/// Returns [`DiscountError::NotApplicable`] if they already did.
pub fn add_voucher_usage_by_customer<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
    customer_email: &str,
) -> Result<(), DiscountError> {
    validate_voucher_once_per_customer(tx, voucher, customer_email)?;

    tx.add_voucher_customer(VoucherCustomer {
        voucher_id: voucher.id,
        customer_email: customer_email.to_string(),
    })?;

    Ok(())
}

/// Forget a customer's use of the voucher.
///
/// # Errors
///
/// Returns [`DiscountError::Store`] if the usage cannot be removed.
pub fn remove_voucher_usage_by_customer<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    voucher: &Voucher,
    customer_email: &str,
) -> Result<(), DiscountError> {
    tx.remove_voucher_customer(voucher.id, customer_email)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use rusty_money::{Money, iso::USD};
    use smallvec::smallvec;
    use testresult::TestResult;

    use crate::store::{MemoryStore, Store};

    use super::*;

    fn voucher(
        channel_id: ChannelId,
        voucher_type: VoucherType,
        value_type: DiscountValueType,
        value: i64,
    ) -> Voucher {
        Voucher {
            id: VoucherId::new(),
            code: "SAVE".to_string(),
            name: Some("Save".to_string()),
            voucher_type,
            discount_value_type: value_type,
            usage_limit: None,
            used: 0,
            apply_once_per_order: false,
            apply_once_per_customer: false,
            only_for_staff: false,
            min_checkout_items_quantity: None,
            countries: SmallVec::new(),
            start_date: Timestamp::UNIX_EPOCH,
            end_date: None,
            product_ids: Vec::new(),
            variant_ids: Vec::new(),
            category_ids: Vec::new(),
            collection_ids: Vec::new(),
            channel_listings: vec![VoucherChannelListing {
                channel_id,
                discount_value: Decimal::from(value),
                currency: USD,
                min_spent: None,
            }],
        }
    }

    #[test]
    fn discount_amount_never_exceeds_price() -> TestResult {
        let channel = ChannelId::new();
        let voucher = voucher(channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 50);

        assert_eq!(
            voucher.get_discount_amount_for(Money::from_minor(3000, USD), channel)?,
            Money::from_minor(3000, USD)
        );
        assert_eq!(
            voucher.get_discount_amount_for(Money::from_minor(8000, USD), channel)?,
            Money::from_minor(5000, USD)
        );

        Ok(())
    }

    #[test]
    fn percentage_discount_amount() -> TestResult {
        let channel = ChannelId::new();
        let voucher = voucher(
            channel,
            VoucherType::EntireOrder,
            DiscountValueType::Percentage,
            10,
        );

        assert_eq!(
            voucher.get_discount_amount_for(Money::from_minor(2500, USD), channel)?,
            Money::from_minor(250, USD)
        );

        Ok(())
    }

    #[test]
    fn unlisted_channel_is_not_applicable() {
        let voucher = voucher(
            ChannelId::new(),
            VoucherType::EntireOrder,
            DiscountValueType::Fixed,
            5,
        );

        let result =
            voucher.get_discount_amount_for(Money::from_minor(1000, USD), ChannelId::new());

        assert!(matches!(result, Err(DiscountError::NotApplicable(_))));
    }

    #[test]
    fn activity_follows_window_usage_and_channel() -> TestResult {
        let now = Timestamp::now();
        let channel = ChannelId::new();
        let mut voucher = voucher(channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 5);

        assert!(voucher.is_active_in_channel(channel, now));
        assert!(!voucher.is_active_in_channel(ChannelId::new(), now));

        voucher.usage_limit = Some(1);
        voucher.used = 1;
        assert!(!voucher.is_active(now));

        voucher.used = 0;
        voucher.end_date = Some(now.checked_sub(1.second())?);
        assert!(!voucher.is_active(now));

        voucher.end_date = None;
        voucher.start_date = now.checked_add(24.hours())?;
        assert!(!voucher.is_active(now));

        Ok(())
    }

    #[test]
    fn min_spent_and_quantity_rules() {
        let channel = ChannelId::new();
        let mut voucher = voucher(channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 5);
        voucher.min_checkout_items_quantity = Some(3);
        if let Some(listing) = voucher.channel_listings.first_mut() {
            listing.min_spent = Some(Money::from_minor(5000, USD));
        }

        let below = voucher.validate_min_spent(Money::from_minor(4999, USD), channel);
        assert!(
            below.is_err_and(|error| {
                error.message.starts_with("This offer is only valid for orders over")
            }),
            "subtotal below minimum spend must be rejected"
        );
        assert!(voucher.validate_min_spent(Money::from_minor(5000, USD), channel).is_ok());

        assert!(voucher.validate_min_checkout_items_quantity(2).is_err());
        assert!(voucher.validate_min_checkout_items_quantity(3).is_ok());
    }

    #[test]
    fn staff_only_vouchers_need_staff_user() {
        let mut voucher = voucher(
            ChannelId::new(),
            VoucherType::EntireOrder,
            DiscountValueType::Fixed,
            5,
        );
        voucher.only_for_staff = true;

        let mut staff = User::new("staff@example.com");
        staff.is_staff = true;
        let customer = User::new("ada@example.com");

        assert!(voucher.validate_only_for_staff(None).is_err());
        assert!(voucher.validate_only_for_staff(Some(&customer)).is_err());
        assert!(voucher.validate_only_for_staff(Some(&staff)).is_ok());
    }

    #[test]
    fn empty_allow_list_applies_to_every_line() {
        let channel = ChannelId::new();
        let mut voucher = voucher(
            channel,
            VoucherType::SpecificProduct,
            DiscountValueType::Fixed,
            5,
        );
        let collection = CollectionId::new();
        let product = Product {
            id: ProductId::new(),
            name: "Mug".to_string(),
            category_id: None,
            collection_ids: smallvec![collection],
        };

        assert!(voucher.applies_to(&product, &[collection], VariantId::new()));

        voucher.product_ids.push(ProductId::new());
        assert!(!voucher.applies_to(&product, &[collection], VariantId::new()));

        voucher.collection_ids.push(collection);
        assert!(voucher.applies_to(&product, &[collection], VariantId::new()));
    }

    #[test]
    fn products_discount_sums_or_takes_cheapest() -> TestResult {
        let channel = ChannelId::new();
        let mut voucher = voucher(
            channel,
            VoucherType::SpecificProduct,
            DiscountValueType::Fixed,
            3,
        );
        let prices = [
            Money::from_minor(1000, USD),
            Money::from_minor(200, USD),
            Money::from_minor(1000, USD),
        ];

        assert_eq!(
            get_products_voucher_discount(&voucher, &prices, channel, USD)?,
            Money::from_minor(800, USD)
        );

        voucher.apply_once_per_order = true;

        assert_eq!(
            get_products_voucher_discount(&voucher, &prices, channel, USD)?,
            Money::from_minor(200, USD)
        );

        assert!(get_products_voucher_discount(&voucher, &[], channel, USD).is_err());

        Ok(())
    }

    #[test]
    fn once_per_customer_usage_bookkeeping() -> TestResult {
        let store = MemoryStore::new();
        let channel = ChannelId::new();
        let mut voucher = voucher(channel, VoucherType::EntireOrder, DiscountValueType::Fixed, 5);
        voucher.apply_once_per_customer = true;
        voucher.usage_limit = Some(1);
        let seeded = voucher.clone();
        store.seed(|tables| {
            tables.vouchers.insert(seeded.id, seeded);
        });

        let mut tx = store.begin()?;
        let validation = VoucherValidation {
            total_price: Money::from_minor(1000, USD),
            quantity: 1,
            customer_email: Some("ada@example.com"),
            channel_id: channel,
            user: None,
        };

        validate_voucher(&mut tx, &voucher, &validation)?;

        increase_voucher_usage(&mut tx, &voucher)?;
        add_voucher_usage_by_customer(&mut tx, &voucher, "ada@example.com")?;

        assert!(validate_voucher(&mut tx, &voucher, &validation).is_err());
        assert!(increase_voucher_usage(&mut tx, &voucher).is_err());
        assert!(add_voucher_usage_by_customer(&mut tx, &voucher, "ada@example.com").is_err());

        decrease_voucher_usage(&mut tx, &voucher)?;
        remove_voucher_usage_by_customer(&mut tx, &voucher, "ada@example.com")?;

        validate_voucher(&mut tx, &voucher, &validation)?;
        increase_voucher_usage(&mut tx, &voucher)?;

        Ok(())
    }
}
