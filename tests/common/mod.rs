//! Shared seeding helpers for the integration tests.

#![expect(dead_code, reason = "each test binary uses a different subset")]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::{Money, iso::USD};
use smallvec::{SmallVec, smallvec};
use testresult::TestResult;

use lattice_checkout::{
    checkout::{
        delivery::{
            DeliveryMethodRef, ShippingMethod, ShippingMethodChannelListing, ShippingMethodId,
        },
        discounts::add_voucher_to_checkout,
        fetch::{CheckoutInfo, fetch_checkout_info, fetch_checkout_lines},
    },
    discounts::{
        sales::{DiscountInfo, Sale, SaleChannelListing, SaleId, fetch_active_discounts},
        vouchers::{Voucher, VoucherChannelListing, VoucherId, VoucherType},
    },
    giftcards::{GiftCard, GiftCardId},
    payments::{ChargeStatus, PaymentId, TransactionKind},
    prelude::*,
    products::{
        Product, ProductChannelListing, ProductId, ProductVariant, VariantChannelListing,
        VariantChannelListingId, VariantId,
    },
    taxes::TaxError,
    warehouse::{ClickAndCollectOption, Stock, StockId, Warehouse, WarehouseId},
};

/// A store seeded with one channel, one warehouse and one shipping method.
pub struct Shop {
    pub store: MemoryStore,
    pub channel: Channel,
    pub warehouse_id: WarehouseId,
    pub shipping_method_id: ShippingMethodId,
}

/// A variant seeded in the shop.
#[derive(Clone)]
pub struct SeededVariant {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

impl Shop {
    /// A shop in USD shipping to the US for `shipping_price` cents.
    pub fn new(shipping_price: i64) -> Self {
        let channel = Channel {
            id: ChannelId::new(),
            slug: "default-channel".to_string(),
            name: "Default channel".to_string(),
            currency: USD,
            default_country: "US".to_string(),
            is_active: true,
            allocation_strategy: AllocationStrategy::default(),
        };

        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: "Main".to_string(),
            address: address(),
            click_and_collect_option: ClickAndCollectOption::Disabled,
            is_private: false,
            channel_ids: vec![channel.id],
            countries: smallvec!["US".to_string()],
            sort_order: 0,
        };

        let method = ShippingMethod {
            id: ShippingMethodId::new(),
            name: "Courier".to_string(),
            countries: smallvec!["US".to_string()],
            active: true,
        };

        let store = MemoryStore::new();
        let shop = Self {
            warehouse_id: warehouse.id,
            shipping_method_id: method.id,
            channel: channel.clone(),
            store,
        };

        shop.store.seed(|tables| {
            tables
                .shipping_method_channel_listings
                .push(ShippingMethodChannelListing {
                    shipping_method_id: method.id,
                    channel_id: channel.id,
                    price: Money::from_minor(shipping_price, USD),
                    minimum_order_price: None,
                    maximum_order_price: None,
                });
            tables.shipping_methods.push(method);
            tables.warehouses.push(warehouse);
            tables.channels.insert(channel.id, channel);
        });

        shop
    }

    /// A published, purchasable variant priced at `price` cents with `stock`
    /// units in the warehouse.
    pub fn variant(&self, price: i64, stock: u32) -> SeededVariant {
        let product = Product {
            id: ProductId::new(),
            name: "Cotton T-Shirt".to_string(),
            category_id: None,
            collection_ids: SmallVec::new(),
        };
        let variant = ProductVariant {
            id: VariantId::new(),
            product_id: product.id,
            sku: Some(format!("TSHIRT-{price}")),
            name: "M".to_string(),
            track_inventory: true,
            is_shipping_required: true,
            is_gift_card: false,
            is_preorder: false,
            preorder_end_date: None,
            preorder_global_threshold: None,
        };
        let seeded = SeededVariant {
            product_id: product.id,
            variant_id: variant.id,
        };
        let channel_id = self.channel.id;
        let warehouse_id = self.warehouse_id;

        self.store.seed(|tables| {
            tables.product_channel_listings.push(ProductChannelListing {
                product_id: product.id,
                channel_id,
                is_published: true,
                visible_in_listings: true,
                available_for_purchase_at: Some(Timestamp::UNIX_EPOCH),
            });
            tables.variant_channel_listings.push(VariantChannelListing {
                id: VariantChannelListingId::new(),
                variant_id: variant.id,
                channel_id,
                price: Some(Money::from_minor(price, USD)),
                cost_price: None,
                preorder_quantity_threshold: None,
            });
            tables.stocks.push(Stock {
                id: StockId::new(),
                warehouse_id,
                variant_id: variant.id,
                quantity: stock,
                quantity_allocated: 0,
            });
            tables.products.insert(product.id, product);
            tables.variants.insert(variant.id, variant);
        });

        seeded
    }

    /// A percentage sale on `product_id`.
    pub fn sale(&self, product_id: ProductId, percent: i64) -> SaleId {
        let sale = Sale {
            id: SaleId::new(),
            name: "Summer sale".to_string(),
            value_type: DiscountValueType::Percentage,
            start_date: Timestamp::UNIX_EPOCH,
            end_date: None,
            channel_listings: vec![SaleChannelListing {
                channel_id: self.channel.id,
                discount_value: Decimal::from(percent),
                currency: USD,
            }],
            product_ids: vec![product_id],
            category_ids: Vec::new(),
            collection_ids: Vec::new(),
            variant_ids: Vec::new(),
        };
        let id = sale.id;

        self.store.seed(|tables| tables.sales.push(sale));

        id
    }

    /// A voucher `code` worth `value` in the channel.
    pub fn voucher(
        &self,
        code: &str,
        voucher_type: VoucherType,
        value_type: DiscountValueType,
        value: i64,
        configure: impl FnOnce(&mut Voucher),
    ) -> Voucher {
        let mut voucher = Voucher {
            id: VoucherId::new(),
            code: code.to_string(),
            name: Some(code.to_string()),
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
                channel_id: self.channel.id,
                discount_value: Decimal::from(value),
                currency: USD,
                min_spent: None,
            }],
        };
        configure(&mut voucher);

        let seeded = voucher.clone();
        self.store.seed(|tables| {
            tables.vouchers.insert(seeded.id, seeded);
        });

        voucher
    }

    /// A gift card with `balance` cents left.
    pub fn gift_card(&self, balance: i64) -> GiftCardId {
        let card = GiftCard {
            id: GiftCardId::new(),
            code: "GIFT-0001".to_string(),
            initial_balance: Money::from_minor(balance, USD),
            current_balance: Money::from_minor(balance, USD),
            is_active: true,
            expiry_date: None,
            used_by: None,
            used_by_email: None,
            last_used_on: None,
        };
        let id = card.id;

        self.store.seed(|tables| {
            tables.gift_cards.insert(card.id, card);
        });

        id
    }

    /// A ready-to-complete checkout buying `quantity` of each variant, shipped
    /// by courier to the US.
    pub fn checkout(&self, lines: &[(&SeededVariant, u32)]) -> Checkout {
        let mut checkout = Checkout::new(&self.channel, Timestamp::UNIX_EPOCH);
        checkout.email = Some("customer@example.com".to_string());
        checkout.billing_address = Some(address());
        checkout.shipping_address = Some(address());
        checkout.delivery_method = DeliveryMethodRef::Shipping(self.shipping_method_id);

        for (variant, quantity) in lines {
            checkout.add_variant(variant.variant_id, *quantity);
        }

        self.save_checkout(&checkout);

        checkout
    }

    /// Write `checkout` to the committed tables.
    pub fn save_checkout(&self, checkout: &Checkout) {
        let checkout = checkout.clone();

        self.store.seed(|tables| {
            tables.checkouts.insert(checkout.token, checkout);
        });
    }

    /// An active payment of `total` cents attached to the checkout.
    pub fn payment(&self, checkout: &Checkout, total: i64) -> PaymentId {
        let payment = Payment {
            id: PaymentId::new(),
            gateway: "mirumee.payments.dummy".to_string(),
            token: "charged".to_string(),
            total: Money::from_minor(total, USD),
            captured_amount: Money::from_minor(0, USD),
            charge_status: ChargeStatus::NotCharged,
            is_active: true,
            to_confirm: false,
            checkout_token: Some(checkout.token),
            order_id: None,
            psp_reference: None,
        };
        let id = payment.id;

        self.store.seed(|tables| tables.payments.push(payment));

        id
    }

    /// Price the stored checkout `token` the way completion does.
    pub fn priced(
        &self,
        token: CheckoutToken,
    ) -> TestResult<(CheckoutInfo, Vec<CheckoutLineInfo>, Vec<DiscountInfo>)> {
        let point_in_time = Timestamp::now();
        let mut tx = self.store.begin()?;

        let checkout = tx.checkout(token)?.ok_or("checkout")?;
        let discounts = fetch_active_discounts(&mut tx, point_in_time)?;
        let (lines, _) =
            fetch_checkout_lines(&mut tx, &checkout, &self.channel, &discounts, point_in_time)?;
        let info = fetch_checkout_info(
            &mut tx,
            checkout,
            self.channel.clone(),
            &lines,
            &discounts,
            Arc::new(NoExternalShippingMethods),
            point_in_time,
        )?;

        Ok((info, lines, discounts))
    }

    /// Enter `voucher` on the checkout and store the discount it grants.
    pub fn apply_voucher(&self, checkout: &Checkout, voucher: &Voucher) -> TestResult<Checkout> {
        let mut checkout = checkout.clone();
        checkout.voucher_code = Some(voucher.code.clone());
        self.save_checkout(&checkout);

        let (mut info, lines, discounts) = self.priced(checkout.token)?;
        let mut tx = self.store.begin()?;
        add_voucher_to_checkout(&mut tx, &mut info, &lines, voucher, &discounts)?;
        tx.commit()?;

        Ok(info.checkout)
    }

    /// Complete the checkout with default settings.
    pub fn complete(
        &self,
        services: &CheckoutServices,
        token: CheckoutToken,
    ) -> Result<CheckoutCompletion, CheckoutError> {
        complete_checkout(
            &self.store,
            services,
            &CheckoutSettings::default(),
            token,
            &CompleteCheckoutRequest::new(Timestamp::now()),
        )
    }

    /// Units allocated from the variant's stock.
    pub fn allocated(&self, variant: &SeededVariant) -> u32 {
        self.store
            .snapshot()
            .stocks
            .iter()
            .filter(|stock| stock.variant_id == variant.variant_id)
            .map(|stock| stock.quantity_allocated)
            .sum()
    }

    /// Current usage counter of a voucher.
    pub fn voucher_used(&self, id: VoucherId) -> u32 {
        self.store
            .snapshot()
            .vouchers
            .get(&id)
            .map_or(0, |voucher| voucher.used)
    }
}

pub fn address() -> Address {
    Address {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        street_address_1: "1 Main Street".to_string(),
        city: "Springfield".to_string(),
        postal_code: "12345".to_string(),
        country: "US".to_string(),
        ..Address::default()
    }
}

/// Services with no taxes, no external shipping and events that only log.
pub fn services(gateway: Arc<dyn PaymentGateway>) -> CheckoutServices {
    CheckoutServices {
        gateway,
        taxes: TaxChain::default(),
        shipping_methods: Arc::new(NoExternalShippingMethods),
        events: Arc::new(TracingOrderEvents),
    }
}

/// Gateway that captures every payment in full and counts refunds.
#[derive(Debug, Default)]
pub struct CapturingGateway {
    pub processed: AtomicUsize,
    pub refunded: AtomicUsize,
}

impl CapturingGateway {
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn refunded(&self) -> usize {
        self.refunded.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for CapturingGateway {
    fn process_payment(
        &self,
        payment: &Payment,
        _context: &PaymentContext,
    ) -> Result<GatewayResponse, PaymentError> {
        self.processed.fetch_add(1, Ordering::SeqCst);

        Ok(captured(payment))
    }

    fn confirm_payment(
        &self,
        payment: &Payment,
        _context: &PaymentContext,
    ) -> Result<GatewayResponse, PaymentError> {
        Ok(captured(payment))
    }

    fn refund_or_void(&self, _payment: &Payment, _channel_slug: &str) -> Result<(), PaymentError> {
        self.refunded.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Successful capture of the whole payment.
pub fn captured(payment: &Payment) -> GatewayResponse {
    GatewayResponse {
        is_success: true,
        action_required: false,
        action_required_data: None,
        customer_id: None,
        error: None,
        kind: TransactionKind::Capture,
        amount: payment.total,
        psp_reference: Some("psp-123".to_string()),
    }
}

/// Tax plugin whose provider is down.
#[derive(Debug)]
pub struct UnreachableTaxProvider;

impl TaxPlugin for UnreachableTaxProvider {
    fn preprocess_order_creation(
        &self,
        _info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
    ) -> Result<(), TaxError> {
        Err(TaxError::new("Unable to calculate taxes"))
    }
}
