//! Persistence
//!
//! The pipeline talks to storage through [`Store`] and the transactions it
//! begins. A transaction sees a consistent snapshot, holds the locks it asked
//! for until it ends, and is rolled back when dropped without [`commit`].
//!
//! [`commit`]: StoreTransaction::commit

use std::any::type_name;

use thiserror::Error;

use crate::{
    accounts::{User, UserId},
    channels::{Channel, ChannelId},
    checkout::{
        delivery::{ShippingMethod, ShippingMethodChannelListing},
        models::{Checkout, CheckoutToken},
    },
    discounts::{
        sales::Sale,
        vouchers::{Voucher, VoucherCustomer, VoucherId},
    },
    giftcards::{GiftCard, GiftCardId},
    orders::{Order, OrderId, OrderLine},
    payments::Payment,
    products::{
        Product, ProductChannelListing, ProductId, ProductVariant, VariantChannelListing,
        VariantChannelListingId, VariantId,
    },
    warehouse::{Allocation, PreorderAllocation, Stock, Warehouse, WarehouseId},
};

pub mod memory;

pub use memory::{MemoryStore, MemoryTransaction, Tables};

/// Errors raised by a storage backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A row that must exist is missing.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name
        entity: &'static str,

        /// Key that was looked up
        id: String,
    },

    /// A unique key is already taken.
    #[error("{entity} {id} already exists")]
    Conflict {
        /// Entity name
        entity: &'static str,

        /// Conflicting key
        id: String,
    },

    /// The backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// A missing row of type `T`.
    pub fn not_found<T>(id: impl ToString) -> Self {
        Self::NotFound {
            entity: short_type_name::<T>(),
            id: id.to_string(),
        }
    }

    /// A unique key conflict on type `T`.
    pub fn conflict<T>(id: impl ToString) -> Self {
        Self::Conflict {
            entity: short_type_name::<T>(),
            id: id.to_string(),
        }
    }
}

fn short_type_name<T>() -> &'static str {
    let name = type_name::<T>();

    name.rsplit("::").next().unwrap_or(name)
}

/// Hook run once a transaction has committed.
pub type CommitHook = Box<dyn FnOnce() + Send>;

/// A storage backend.
pub trait Store: Send + Sync {
    /// Transaction type handed out by [`Store::begin`].
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backend cannot start one.
    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;
}

/// Reads and writes available inside one transaction.
///
/// Every operation may fail with a [`StoreError`].
#[expect(
    clippy::missing_errors_doc,
    reason = "every method fails only with StoreError, documented on the trait"
)]
pub trait StoreTransaction {
    /// Channel by id.
    fn channel(&mut self, id: ChannelId) -> Result<Channel, StoreError>;

    /// User by id.
    fn user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Insert or replace a user.
    fn save_user(&mut self, user: User) -> Result<(), StoreError>;

    /// Product by id.
    fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Publication state of a product in a channel.
    fn product_channel_listing(
        &mut self,
        product_id: ProductId,
        channel_id: ChannelId,
    ) -> Result<Option<ProductChannelListing>, StoreError>;

    /// Variant by id.
    fn variant(&mut self, id: VariantId) -> Result<Option<ProductVariant>, StoreError>;

    /// Every channel listing of a variant.
    fn variant_channel_listings(
        &mut self,
        variant_id: VariantId,
    ) -> Result<Vec<VariantChannelListing>, StoreError>;

    /// All sales, active or not.
    fn sales(&mut self) -> Result<Vec<Sale>, StoreError>;

    /// Voucher by code. With `with_lock` the row stays locked until the
    /// transaction ends.
    fn voucher_by_code(&mut self, code: &str, with_lock: bool)
    -> Result<Option<Voucher>, StoreError>;

    /// Increment `used` unless the usage limit is reached. Returns whether the
    /// counter moved.
    fn increase_voucher_usage(&mut self, id: VoucherId) -> Result<bool, StoreError>;

    /// Decrement `used`, never below zero.
    fn decrease_voucher_usage(&mut self, id: VoucherId) -> Result<(), StoreError>;

    /// Whether the customer already used the voucher.
    fn voucher_customer_exists(&mut self, id: VoucherId, email: &str) -> Result<bool, StoreError>;

    /// Record that a customer used a voucher.
    fn add_voucher_customer(&mut self, usage: VoucherCustomer) -> Result<(), StoreError>;

    /// Forget a customer's voucher usage.
    fn remove_voucher_customer(&mut self, id: VoucherId, email: &str) -> Result<(), StoreError>;

    /// Shipping methods priced in a channel.
    fn shipping_methods(
        &mut self,
        channel_id: ChannelId,
    ) -> Result<Vec<(ShippingMethod, ShippingMethodChannelListing)>, StoreError>;

    /// Warehouses serving a channel, in the channel's sorting order.
    fn warehouses(&mut self, channel_id: ChannelId) -> Result<Vec<Warehouse>, StoreError>;

    /// Warehouse by id.
    fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError>;

    /// Stocks of the given variants, locked for update.
    fn stocks_for_update(&mut self, variant_ids: &[VariantId]) -> Result<Vec<Stock>, StoreError>;

    /// Replace a stock row.
    fn save_stock(&mut self, stock: Stock) -> Result<(), StoreError>;

    /// Insert stock allocations.
    fn insert_allocations(&mut self, allocations: Vec<Allocation>) -> Result<(), StoreError>;

    /// Preorder allocations against the given channel listings.
    fn preorder_allocations(
        &mut self,
        listing_ids: &[VariantChannelListingId],
    ) -> Result<Vec<PreorderAllocation>, StoreError>;

    /// Insert preorder allocations.
    fn insert_preorder_allocations(
        &mut self,
        allocations: Vec<PreorderAllocation>,
    ) -> Result<(), StoreError>;

    /// Gift cards by id, in the order requested. With `with_lock` the rows stay
    /// locked until the transaction ends.
    fn gift_cards(&mut self, ids: &[GiftCardId], with_lock: bool)
    -> Result<Vec<GiftCard>, StoreError>;

    /// Replace a gift card row.
    fn save_gift_card(&mut self, card: GiftCard) -> Result<(), StoreError>;

    /// Checkout by token, locked for update.
    fn checkout(&mut self, token: CheckoutToken) -> Result<Option<Checkout>, StoreError>;

    /// Insert or replace a checkout.
    fn save_checkout(&mut self, checkout: Checkout) -> Result<(), StoreError>;

    /// Delete a checkout and its lines.
    fn delete_checkout(&mut self, token: CheckoutToken) -> Result<(), StoreError>;

    /// Payments attached to a checkout, oldest first.
    fn checkout_payments(&mut self, token: CheckoutToken) -> Result<Vec<Payment>, StoreError>;

    /// Insert or replace a payment.
    fn save_payment(&mut self, payment: Payment) -> Result<(), StoreError>;

    /// Order created from a checkout token.
    fn order_by_checkout_token(&mut self, token: CheckoutToken)
    -> Result<Option<Order>, StoreError>;

    /// Insert an order. Fails with [`StoreError::Conflict`] if an order
    /// already exists for its checkout token.
    fn insert_order(&mut self, order: Order) -> Result<(), StoreError>;

    /// Replace an order row.
    fn save_order(&mut self, order: Order) -> Result<(), StoreError>;

    /// Insert order lines.
    fn insert_order_lines(&mut self, lines: Vec<OrderLine>) -> Result<(), StoreError>;

    /// Lines of an order.
    fn order_lines(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError>;

    /// Run `hook` after a successful commit. Dropped with the transaction
    /// otherwise.
    fn on_commit(&mut self, hook: CommitHook);

    /// Make every write visible and run the commit hooks.
    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use crate::products::Product;

    use super::*;

    #[test]
    fn errors_name_the_entity() {
        let error = StoreError::not_found::<Product>("42");

        assert_eq!(error.to_string(), "Product 42 not found");
    }
}
