//! Orders
//!
//! Immutable records of completed checkouts. Order lines keep a frozen copy
//! of names, prices and discount attribution so later catalog changes never
//! touch historical orders.

use std::collections::BTreeMap;

use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::{MoneyError, iso::Currency};
use serde::Serialize;

use crate::{
    accounts::UserId,
    channels::{Address, ChannelId},
    checkout::{delivery::ShippingMethodKey, models::CheckoutToken},
    discounts::{DiscountValueType, sales::SaleId, vouchers::VoucherId},
    giftcards::GiftCardId,
    money::{Amount, TaxedMoney},
    payments::{Payment, total_captured},
    products::VariantId,
    uuids::TypedUuid,
    warehouse::WarehouseId,
};

pub mod calculations;
pub mod events;

/// Order id
pub type OrderId = TypedUuid<Order>;

/// Order line id
pub type OrderLineId = TypedUuid<OrderLine>;

/// Order discount id
pub type OrderDiscountId = TypedUuid<OrderDiscount>;

/// Initial order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for staff confirmation
    Unconfirmed,

    /// Confirmed and waiting to be fulfilled
    Unfulfilled,
}

/// Where an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Completed checkout
    Checkout,
}

/// How much of the order total has been captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderChargeStatus {
    /// Nothing captured
    #[default]
    None,

    /// Less than the total captured
    Partial,

    /// Exactly the total captured
    Full,

    /// More than the total captured
    Overcharged,
}

/// Source of an order-level discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDiscountType {
    /// Checkout voucher
    Voucher,
}

/// A discount applied to the whole order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDiscount {
    /// Discount id
    pub id: OrderDiscountId,

    /// Discount source
    pub discount_type: OrderDiscountType,

    /// Fixed or percentage
    pub value_type: DiscountValueType,

    /// Discount value
    pub value: Decimal,

    /// Amount taken off the order
    pub amount: Amount,

    /// Display name
    pub name: Option<String>,
}

/// An order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Order id
    pub id: OrderId,

    /// Checkout the order was created from
    pub checkout_token: Option<CheckoutToken>,

    /// Channel id
    pub channel_id: ChannelId,

    /// Status
    pub status: OrderStatus,

    /// Origin
    pub origin: OrderOrigin,

    /// Creation time
    pub created_at: Timestamp,

    /// Customer account
    pub user_id: Option<UserId>,

    /// Customer email
    pub user_email: Option<String>,

    /// Billing address
    pub billing_address: Option<Address>,

    /// Shipping or pick-up address
    pub shipping_address: Option<Address>,

    /// Selected shipping method
    pub shipping_method: Option<ShippingMethodKey>,

    /// Shipping method name at the time of purchase
    pub shipping_method_name: Option<String>,

    /// Selected pick-up warehouse
    pub collection_point_id: Option<WarehouseId>,

    /// Pick-up warehouse name at the time of purchase
    pub collection_point_name: Option<String>,

    /// Shipping price before taxes
    pub base_shipping_price: Amount,

    /// Taxed shipping price
    pub shipping_price: TaxedMoney,

    /// Shipping tax rate
    pub shipping_tax_rate: Decimal,

    /// Amount to be paid
    pub total: TaxedMoney,

    /// Total before discounts
    pub undiscounted_total: TaxedMoney,

    /// Captured amount
    pub total_charged: Amount,

    /// Capture state
    pub charge_status: OrderChargeStatus,

    /// Voucher used
    pub voucher_id: Option<VoucherId>,

    /// Order-level discounts
    pub discounts: Vec<OrderDiscount>,

    /// Gift cards charged
    pub gift_card_ids: Vec<GiftCardId>,

    /// Note left by the customer
    pub customer_note: String,

    /// Analytics client id
    pub tracking_client_id: String,

    /// Storefront URL the customer is sent to
    pub redirect_url: Option<String>,

    /// Public metadata
    pub metadata: BTreeMap<String, String>,

    /// Private metadata
    pub private_metadata: BTreeMap<String, String>,

    /// Lowercased text indexed by order search
    pub search_document: String,

    /// Whether prices are displayed with taxes
    pub display_gross_prices: bool,
}

impl Order {
    /// Order currency.
    pub fn currency(&self) -> &'static Currency {
        self.total.currency()
    }

    /// Whether the captured amount covers the total.
    pub fn is_fully_paid(&self) -> bool {
        self.total_charged.amount() >= self.total.gross.amount()
    }
}

/// A line of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    /// Line id
    pub id: OrderLineId,

    /// Order id
    pub order_id: OrderId,

    /// Variant sold, unset once the variant is deleted
    pub variant_id: Option<VariantId>,

    /// Product name at the time of purchase
    pub product_name: String,

    /// Variant name at the time of purchase
    pub variant_name: String,

    /// SKU at the time of purchase
    pub product_sku: Option<String>,

    /// Whether the line needs shipping
    pub is_shipping_required: bool,

    /// Whether the line is a gift card
    pub is_gift_card: bool,

    /// Ordered units
    pub quantity: u32,

    /// Fulfilled units
    pub quantity_fulfilled: u32,

    /// Taxed unit price after discounts
    pub unit_price: TaxedMoney,

    /// Taxed unit price before discounts
    pub undiscounted_unit_price: TaxedMoney,

    /// Taxed line total after discounts
    pub total_price: TaxedMoney,

    /// Taxed line total before discounts
    pub undiscounted_total_price: TaxedMoney,

    /// Unit price after discounts, before taxes
    pub base_unit_price: Amount,

    /// Unit price before discounts and taxes
    pub undiscounted_base_unit_price: Amount,

    /// Line total after discounts, before taxes
    pub base_total_price: Amount,

    /// Line total before discounts and taxes
    pub undiscounted_base_total_price: Amount,

    /// Discount per unit
    pub unit_discount: Amount,

    /// Discount per unit as a plain value
    pub unit_discount_value: Decimal,

    /// How the unit discount is expressed
    pub unit_discount_type: Option<DiscountValueType>,

    /// Human readable discount attribution
    pub unit_discount_reason: Option<String>,

    /// Sale that discounted the line
    pub sale_id: Option<SaleId>,

    /// Voucher that discounted the line
    pub voucher_code: Option<String>,

    /// Tax rate applied to the line
    pub tax_rate: Decimal,
}

/// Charge status of `total` given the `charged` amount.
pub fn charge_status(charged: Amount, total: Amount) -> OrderChargeStatus {
    if charged.amount().is_zero() && !total.amount().is_zero() {
        return OrderChargeStatus::None;
    }

    match charged.amount().cmp(total.amount()) {
        std::cmp::Ordering::Less => OrderChargeStatus::Partial,
        std::cmp::Ordering::Equal => OrderChargeStatus::Full,
        std::cmp::Ordering::Greater => OrderChargeStatus::Overcharged,
    }
}

/// Recompute the captured amount and charge status from the order's payments.
///
/// # Errors
///
/// Returns [`MoneyError`] if a payment is in another currency.
pub fn update_order_charge_data(order: &mut Order, payments: &[Payment]) -> Result<(), MoneyError> {
    order.total_charged = total_captured(payments, order.currency())?;
    order.charge_status = charge_status(order.total_charged, order.total.gross);

    Ok(())
}

/// Treat the whole total as captured. Used for orders with nothing left to pay.
pub fn mark_order_as_paid(order: &mut Order) {
    order.total_charged = order.total.gross;
    order.charge_status = charge_status(order.total_charged, order.total.gross);
}

/// Text indexed by order search: id, email, addresses and line details, one
/// value per line, lowercased.
pub fn prepare_order_search_document_value(order: &Order, lines: &[OrderLine]) -> String {
    let id = order.id.to_string();

    let mut values: Vec<&str> = vec![id.as_str()];
    values.extend(order.user_email.as_deref());

    for address in [&order.billing_address, &order.shipping_address]
        .into_iter()
        .flatten()
    {
        values.extend(address.search_values());
    }

    for line in lines {
        values.extend(line.product_sku.as_deref());
        values.push(line.product_name.as_str());
        values.push(line.variant_name.as_str());
    }

    values
        .into_iter()
        .filter(|value| !value.is_empty())
        .map(|value| format!("{value}\n"))
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use rusty_money::{Money, iso::USD};
    use testresult::TestResult;

    use crate::{
        money::{times, zero_money},
        payments::ChargeStatus,
    };

    use super::*;

    pub(crate) fn order(total: i64) -> Order {
        let total = TaxedMoney::untaxed(Money::from_minor(total, USD));

        Order {
            id: OrderId::new(),
            checkout_token: Some(CheckoutToken::new()),
            channel_id: ChannelId::new(),
            status: OrderStatus::Unfulfilled,
            origin: OrderOrigin::Checkout,
            created_at: Timestamp::UNIX_EPOCH,
            user_id: None,
            user_email: Some("Ada@Example.com".to_string()),
            billing_address: None,
            shipping_address: None,
            shipping_method: None,
            shipping_method_name: None,
            collection_point_id: None,
            collection_point_name: None,
            base_shipping_price: zero_money(USD),
            shipping_price: TaxedMoney::zero(USD),
            shipping_tax_rate: Decimal::ZERO,
            total,
            undiscounted_total: total,
            total_charged: zero_money(USD),
            charge_status: OrderChargeStatus::None,
            voucher_id: None,
            discounts: Vec::new(),
            gift_card_ids: Vec::new(),
            customer_note: String::new(),
            tracking_client_id: String::new(),
            redirect_url: None,
            metadata: BTreeMap::new(),
            private_metadata: BTreeMap::new(),
            search_document: String::new(),
            display_gross_prices: true,
        }
    }

    pub(crate) fn order_line(order: &Order, unit_price: i64, quantity: u32) -> OrderLine {
        let unit = Money::from_minor(unit_price, USD);
        let unit_taxed = TaxedMoney::untaxed(unit);

        OrderLine {
            id: OrderLineId::new(),
            order_id: order.id,
            variant_id: Some(VariantId::new()),
            product_name: "T-Shirt".to_string(),
            variant_name: "XL".to_string(),
            product_sku: Some("TSHIRT-XL".to_string()),
            is_shipping_required: true,
            is_gift_card: false,
            quantity,
            quantity_fulfilled: 0,
            unit_price: unit_taxed,
            undiscounted_unit_price: unit_taxed,
            total_price: unit_taxed.times(quantity),
            undiscounted_total_price: unit_taxed.times(quantity),
            base_unit_price: unit,
            undiscounted_base_unit_price: unit,
            base_total_price: times(unit, quantity),
            undiscounted_base_total_price: times(unit, quantity),
            unit_discount: zero_money(USD),
            unit_discount_value: Decimal::ZERO,
            unit_discount_type: None,
            unit_discount_reason: None,
            sale_id: None,
            voucher_code: None,
            tax_rate: Decimal::ZERO,
        }
    }

    #[test]
    fn charge_status_compares_captured_with_total() {
        let total = Money::from_minor(1000, USD);

        assert_eq!(charge_status(zero_money(USD), total), OrderChargeStatus::None);
        assert_eq!(
            charge_status(Money::from_minor(400, USD), total),
            OrderChargeStatus::Partial
        );
        assert_eq!(charge_status(total, total), OrderChargeStatus::Full);
        assert_eq!(
            charge_status(Money::from_minor(1200, USD), total),
            OrderChargeStatus::Overcharged
        );
        assert_eq!(
            charge_status(zero_money(USD), zero_money(USD)),
            OrderChargeStatus::Full
        );
    }

    #[test]
    fn charge_data_sums_captured_payments() -> TestResult {
        let mut order = order(1000);
        let payment = Payment {
            id: crate::payments::PaymentId::new(),
            gateway: "dummy".to_string(),
            token: "tok".to_string(),
            total: Money::from_minor(1000, USD),
            captured_amount: Money::from_minor(1000, USD),
            charge_status: ChargeStatus::FullyCharged,
            is_active: true,
            to_confirm: false,
            checkout_token: None,
            order_id: Some(order.id),
            psp_reference: None,
        };

        update_order_charge_data(&mut order, &[payment])?;

        assert_eq!(order.charge_status, OrderChargeStatus::Full);
        assert!(order.is_fully_paid());

        Ok(())
    }

    #[test]
    fn zero_total_orders_are_marked_paid() {
        let mut order = order(0);

        mark_order_as_paid(&mut order);

        assert_eq!(order.charge_status, OrderChargeStatus::Full);
        assert!(order.is_fully_paid());
    }

    #[test]
    fn search_document_is_lowercase_and_newline_separated() {
        let mut order = order(1000);
        order.shipping_address = Some(Address {
            first_name: "Ada".to_string(),
            city: "London".to_string(),
            ..Address::default()
        });
        let line = order_line(&order, 1000, 1);

        let document = prepare_order_search_document_value(&order, &[line]);

        assert_eq!(
            document,
            format!("{}\nada@example.com\nada\nlondon\ntshirt-xl\nt-shirt\nxl\n", order.id)
        );
    }
}
