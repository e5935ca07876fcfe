//! In-memory store
//!
//! Transactions hold the table lock for their whole lifetime, so concurrent
//! transactions run one after another. Writes go to a working copy that
//! replaces the committed tables on commit.

use std::fmt;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use tracing::debug;

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
    store::{CommitHook, Store, StoreError, StoreTransaction},
    warehouse::{Allocation, PreorderAllocation, Stock, Warehouse, WarehouseId},
};

/// Every table of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    /// Channels
    pub channels: FxHashMap<ChannelId, Channel>,

    /// Users
    pub users: FxHashMap<UserId, User>,

    /// Products
    pub products: FxHashMap<ProductId, Product>,

    /// Product channel listings
    pub product_channel_listings: Vec<ProductChannelListing>,

    /// Variants
    pub variants: FxHashMap<VariantId, ProductVariant>,

    /// Variant channel listings
    pub variant_channel_listings: Vec<VariantChannelListing>,

    /// Sales
    pub sales: Vec<Sale>,

    /// Vouchers
    pub vouchers: FxHashMap<VoucherId, Voucher>,

    /// Per-customer voucher usage
    pub voucher_customers: Vec<VoucherCustomer>,

    /// Shipping methods
    pub shipping_methods: Vec<ShippingMethod>,

    /// Shipping method prices per channel
    pub shipping_method_channel_listings: Vec<ShippingMethodChannelListing>,

    /// Warehouses, in sorting order
    pub warehouses: Vec<Warehouse>,

    /// Stocks
    pub stocks: Vec<Stock>,

    /// Stock allocations
    pub allocations: Vec<Allocation>,

    /// Preorder allocations
    pub preorder_allocations: Vec<PreorderAllocation>,

    /// Gift cards
    pub gift_cards: FxHashMap<GiftCardId, GiftCard>,

    /// Checkouts
    pub checkouts: FxHashMap<CheckoutToken, Checkout>,

    /// Payments
    pub payments: Vec<Payment>,

    /// Orders
    pub orders: Vec<Order>,

    /// Order lines
    pub order_lines: Vec<OrderLine>,
}

/// A [`Store`] keeping every table in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `tables`.
    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Write directly to the committed tables.
    pub fn seed(&self, seed: impl FnOnce(&mut Tables)) {
        seed(&mut self.tables.lock());
    }

    /// Copy of the committed tables.
    pub fn snapshot(&self) -> Tables {
        self.tables.lock().clone()
    }
}

impl Store for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>, StoreError> {
        let guard = self.tables.lock();
        let working = guard.clone();

        Ok(MemoryTransaction {
            guard,
            working,
            hooks: Vec::new(),
        })
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    working: Tables,
    hooks: Vec<CommitHook>,
}

impl fmt::Debug for MemoryTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("working", &self.working)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn channel(&mut self, id: ChannelId) -> Result<Channel, StoreError> {
        self.working
            .channels
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found::<Channel>(id))
    }

    fn user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    fn save_user(&mut self, user: User) -> Result<(), StoreError> {
        self.working.users.insert(user.id, user);

        Ok(())
    }

    fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.get(&id).cloned())
    }

    fn product_channel_listing(
        &mut self,
        product_id: ProductId,
        channel_id: ChannelId,
    ) -> Result<Option<ProductChannelListing>, StoreError> {
        Ok(self
            .working
            .product_channel_listings
            .iter()
            .find(|listing| listing.product_id == product_id && listing.channel_id == channel_id)
            .cloned())
    }

    fn variant(&mut self, id: VariantId) -> Result<Option<ProductVariant>, StoreError> {
        Ok(self.working.variants.get(&id).cloned())
    }

    fn variant_channel_listings(
        &mut self,
        variant_id: VariantId,
    ) -> Result<Vec<VariantChannelListing>, StoreError> {
        Ok(self
            .working
            .variant_channel_listings
            .iter()
            .filter(|listing| listing.variant_id == variant_id)
            .cloned()
            .collect())
    }

    fn sales(&mut self) -> Result<Vec<Sale>, StoreError> {
        Ok(self.working.sales.clone())
    }

    fn voucher_by_code(
        &mut self,
        code: &str,
        _with_lock: bool,
    ) -> Result<Option<Voucher>, StoreError> {
        Ok(self
            .working
            .vouchers
            .values()
            .find(|voucher| voucher.code == code)
            .cloned())
    }

    fn increase_voucher_usage(&mut self, id: VoucherId) -> Result<bool, StoreError> {
        let voucher = self
            .working
            .vouchers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found::<Voucher>(id))?;

        if voucher.usage_limit.is_some_and(|limit| voucher.used >= limit) {
            return Ok(false);
        }

        voucher.used += 1;

        Ok(true)
    }

    fn decrease_voucher_usage(&mut self, id: VoucherId) -> Result<(), StoreError> {
        let voucher = self
            .working
            .vouchers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found::<Voucher>(id))?;

        voucher.used = voucher.used.saturating_sub(1);

        Ok(())
    }

    fn voucher_customer_exists(&mut self, id: VoucherId, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .working
            .voucher_customers
            .iter()
            .any(|usage| usage.voucher_id == id && usage.customer_email == email))
    }

    fn add_voucher_customer(&mut self, usage: VoucherCustomer) -> Result<(), StoreError> {
        let exists = self.working.voucher_customers.iter().any(|existing| {
            existing.voucher_id == usage.voucher_id
                && existing.customer_email == usage.customer_email
        });

        if exists {
            return Err(StoreError::conflict::<VoucherCustomer>(
                &usage.customer_email,
            ));
        }

        self.working.voucher_customers.push(usage);

        Ok(())
    }

    fn remove_voucher_customer(&mut self, id: VoucherId, email: &str) -> Result<(), StoreError> {
        self.working
            .voucher_customers
            .retain(|usage| !(usage.voucher_id == id && usage.customer_email == email));

        Ok(())
    }

    fn shipping_methods(
        &mut self,
        channel_id: ChannelId,
    ) -> Result<Vec<(ShippingMethod, ShippingMethodChannelListing)>, StoreError> {
        let tables = &self.working;

        Ok(tables
            .shipping_method_channel_listings
            .iter()
            .filter(|listing| listing.channel_id == channel_id)
            .filter_map(|listing| {
                tables
                    .shipping_methods
                    .iter()
                    .find(|method| method.id == listing.shipping_method_id)
                    .map(|method| (method.clone(), listing.clone()))
            })
            .collect())
    }

    fn warehouses(&mut self, channel_id: ChannelId) -> Result<Vec<Warehouse>, StoreError> {
        let mut warehouses: Vec<Warehouse> = self
            .working
            .warehouses
            .iter()
            .filter(|warehouse| warehouse.channel_ids.contains(&channel_id))
            .cloned()
            .collect();

        warehouses.sort_by_key(|warehouse| warehouse.sort_order);

        Ok(warehouses)
    }

    fn warehouse(&mut self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        Ok(self
            .working
            .warehouses
            .iter()
            .find(|warehouse| warehouse.id == id)
            .cloned())
    }

    fn stocks_for_update(&mut self, variant_ids: &[VariantId]) -> Result<Vec<Stock>, StoreError> {
        Ok(self
            .working
            .stocks
            .iter()
            .filter(|stock| variant_ids.contains(&stock.variant_id))
            .cloned()
            .collect())
    }

    fn save_stock(&mut self, stock: Stock) -> Result<(), StoreError> {
        let existing = self
            .working
            .stocks
            .iter_mut()
            .find(|existing| existing.id == stock.id)
            .ok_or_else(|| StoreError::not_found::<Stock>(stock.id))?;

        *existing = stock;

        Ok(())
    }

    fn insert_allocations(&mut self, allocations: Vec<Allocation>) -> Result<(), StoreError> {
        self.working.allocations.extend(allocations);

        Ok(())
    }

    fn preorder_allocations(
        &mut self,
        listing_ids: &[VariantChannelListingId],
    ) -> Result<Vec<PreorderAllocation>, StoreError> {
        Ok(self
            .working
            .preorder_allocations
            .iter()
            .filter(|allocation| listing_ids.contains(&allocation.variant_channel_listing_id))
            .cloned()
            .collect())
    }

    fn insert_preorder_allocations(
        &mut self,
        allocations: Vec<PreorderAllocation>,
    ) -> Result<(), StoreError> {
        self.working.preorder_allocations.extend(allocations);

        Ok(())
    }

    fn gift_cards(
        &mut self,
        ids: &[GiftCardId],
        _with_lock: bool,
    ) -> Result<Vec<GiftCard>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.gift_cards.get(id).cloned())
            .collect())
    }

    fn save_gift_card(&mut self, card: GiftCard) -> Result<(), StoreError> {
        self.working.gift_cards.insert(card.id, card);

        Ok(())
    }

    fn checkout(&mut self, token: CheckoutToken) -> Result<Option<Checkout>, StoreError> {
        Ok(self.working.checkouts.get(&token).cloned())
    }

    fn save_checkout(&mut self, checkout: Checkout) -> Result<(), StoreError> {
        self.working.checkouts.insert(checkout.token, checkout);

        Ok(())
    }

    fn delete_checkout(&mut self, token: CheckoutToken) -> Result<(), StoreError> {
        self.working.checkouts.remove(&token);

        for payment in &mut self.working.payments {
            if payment.checkout_token == Some(token) {
                payment.checkout_token = None;
            }
        }

        Ok(())
    }

    fn checkout_payments(&mut self, token: CheckoutToken) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|payment| payment.checkout_token == Some(token))
            .cloned()
            .collect())
    }

    fn save_payment(&mut self, payment: Payment) -> Result<(), StoreError> {
        match self
            .working
            .payments
            .iter_mut()
            .find(|existing| existing.id == payment.id)
        {
            Some(existing) => *existing = payment,
            None => self.working.payments.push(payment),
        }

        Ok(())
    }

    fn order_by_checkout_token(
        &mut self,
        token: CheckoutToken,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .working
            .orders
            .iter()
            .find(|order| order.checkout_token == Some(token))
            .cloned())
    }

    fn insert_order(&mut self, order: Order) -> Result<(), StoreError> {
        if let Some(token) = order.checkout_token
            && self
                .working
                .orders
                .iter()
                .any(|existing| existing.checkout_token == Some(token))
        {
            return Err(StoreError::conflict::<Order>(token));
        }

        self.working.orders.push(order);

        Ok(())
    }

    fn save_order(&mut self, order: Order) -> Result<(), StoreError> {
        let existing = self
            .working
            .orders
            .iter_mut()
            .find(|existing| existing.id == order.id)
            .ok_or_else(|| StoreError::not_found::<Order>(order.id))?;

        *existing = order;

        Ok(())
    }

    fn insert_order_lines(&mut self, lines: Vec<OrderLine>) -> Result<(), StoreError> {
        self.working.order_lines.extend(lines);

        Ok(())
    }

    fn order_lines(&mut self, order_id: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self
            .working
            .order_lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect())
    }

    fn on_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    fn commit(self) -> Result<(), StoreError> {
        let MemoryTransaction {
            mut guard,
            working,
            hooks,
        } = self;

        *guard = working;
        drop(guard);

        debug!(hooks = hooks.len(), "transaction committed");

        for hook in hooks {
            hook();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use jiff::Timestamp;
    use smallvec::SmallVec;
    use testresult::TestResult;

    use crate::discounts::{DiscountValueType, vouchers::VoucherType};

    use super::*;

    fn voucher(usage_limit: Option<u32>) -> Voucher {
        Voucher {
            id: VoucherId::new(),
            code: "SAVE".to_string(),
            name: None,
            voucher_type: VoucherType::EntireOrder,
            discount_value_type: DiscountValueType::Fixed,
            usage_limit,
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
            channel_listings: Vec::new(),
        }
    }

    #[test]
    fn dropped_transaction_rolls_back() -> TestResult {
        let store = MemoryStore::new();
        let voucher = voucher(None);
        let id = voucher.id;
        store.seed(|tables| {
            tables.vouchers.insert(id, voucher);
        });

        {
            let mut tx = store.begin()?;
            assert!(tx.increase_voucher_usage(id)?);
        }

        assert_eq!(store.snapshot().vouchers.get(&id).map(|v| v.used), Some(0));

        let mut tx = store.begin()?;
        assert!(tx.increase_voucher_usage(id)?);
        tx.commit()?;

        assert_eq!(store.snapshot().vouchers.get(&id).map(|v| v.used), Some(1));

        Ok(())
    }

    #[test]
    fn usage_increment_respects_limit() -> TestResult {
        let store = MemoryStore::new();
        let voucher = voucher(Some(1));
        let id = voucher.id;
        store.seed(|tables| {
            tables.vouchers.insert(id, voucher);
        });

        let mut tx = store.begin()?;

        assert!(tx.increase_voucher_usage(id)?);
        assert!(!tx.increase_voucher_usage(id)?);

        tx.decrease_voucher_usage(id)?;
        tx.decrease_voucher_usage(id)?;

        assert!(tx.increase_voucher_usage(id)?);

        Ok(())
    }

    #[test]
    fn hooks_run_only_after_commit() -> TestResult {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let mut tx = store.begin()?;
            let calls = Arc::clone(&calls);
            tx.on_commit(Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut tx = store.begin()?;
        let hook_calls = Arc::clone(&calls);
        tx.on_commit(Box::new(move || {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        }));
        tx.commit()?;

        assert_eq!(calls.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[test]
    fn voucher_customers_are_unique() -> TestResult {
        let store = MemoryStore::new();
        let id = VoucherId::new();
        let mut tx = store.begin()?;

        tx.add_voucher_customer(VoucherCustomer {
            voucher_id: id,
            customer_email: "ada@example.com".to_string(),
        })?;

        let duplicate = tx.add_voucher_customer(VoucherCustomer {
            voucher_id: id,
            customer_email: "ada@example.com".to_string(),
        });

        assert!(matches!(duplicate, Err(StoreError::Conflict { .. })));
        assert!(tx.voucher_customer_exists(id, "ada@example.com")?);

        tx.remove_voucher_customer(id, "ada@example.com")?;

        assert!(!tx.voucher_customer_exists(id, "ada@example.com")?);

        Ok(())
    }

    #[test]
    fn missing_channel_is_not_found() -> TestResult {
        let store = MemoryStore::new();
        let mut tx = store.begin()?;

        let result = tx.channel(ChannelId::new());

        assert!(matches!(result, Err(StoreError::NotFound { entity: "Channel", .. })));

        Ok(())
    }
}
