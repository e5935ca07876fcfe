//! Order events
//!
//! Side effects scheduled after an order-creating transaction commits.

use mockall::automock;
use tracing::info;

use crate::{
    channels::Channel,
    orders::{Order, OrderLine},
    payments::Payment,
    warehouse::Stock,
};

/// Snapshot handed to order event consumers.
#[derive(Debug, Clone)]
pub struct OrderInfo {
    /// The order
    pub order: Order,

    /// Customer email
    pub customer_email: Option<String>,

    /// Order channel
    pub channel: Channel,

    /// Payment that paid for the order
    pub payment: Option<Payment>,

    /// Order lines
    pub lines: Vec<OrderLine>,
}

/// Consumer of order side effects (webhooks, emails).
///
/// Implementations are called after commit and must not fail the order.
#[automock]
pub trait OrderEvents: Send + Sync {
    /// An order was created.
    fn order_created(&self, info: &OrderInfo);

    /// Send the customer their order confirmation.
    fn send_order_confirmation(&self, info: &OrderInfo);

    /// The order is fully paid.
    fn order_fully_paid(&self, order: &Order);

    /// A stock ran out while allocating order lines.
    fn product_variant_out_of_stock(&self, stock: &Stock);
}

/// [`OrderEvents`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOrderEvents;

impl OrderEvents for TracingOrderEvents {
    fn order_created(&self, info: &OrderInfo) {
        info!(
            order_id = %info.order.id,
            channel = %info.channel.slug,
            lines = info.lines.len(),
            "order created"
        );
    }

    fn send_order_confirmation(&self, info: &OrderInfo) {
        info!(
            order_id = %info.order.id,
            email = info.customer_email.as_deref().unwrap_or_default(),
            "order confirmation requested"
        );
    }

    fn order_fully_paid(&self, order: &Order) {
        info!(order_id = %order.id, "order fully paid");
    }

    fn product_variant_out_of_stock(&self, stock: &Stock) {
        info!(
            variant_id = %stock.variant_id,
            warehouse_id = %stock.warehouse_id,
            "product variant out of stock"
        );
    }
}
