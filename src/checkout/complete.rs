//! Checkout completion
//!
//! Turns a paid checkout into an order. Completion runs in two transactions
//! with the payment gateway called between them:
//!
//! 1. validate the checkout, price it, check stock and gift cards and take one
//!    use of the voucher;
//! 2. after the payment went through, create the order and its lines,
//!    allocate stock, charge gift cards, move payments to the order and delete
//!    the checkout.
//!
//! The voucher use taken in the first transaction is given back explicitly
//! whenever a later step fails, since the gateway call in between cannot be
//! rolled back.

use std::{collections::BTreeMap, fmt, sync::Arc};

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    accounts::UserId,
    channels::{Address, ChannelId},
    checkout::{
        base_calculations::{
            base_checkout_delivery_price, base_checkout_line_total, base_checkout_line_unit_price,
            line_sale_price,
        },
        calculations::{checkout_line_total, checkout_shipping_price, checkout_total},
        delivery::{OrderDeliveryFields, ShippingMethodsProvider},
        discounts::get_voucher_for_checkout,
        errors::{CheckoutError, CheckoutErrorCode},
        fetch::{CheckoutInfo, CheckoutLineInfo, fetch_checkout_info, fetch_checkout_lines},
        models::CheckoutToken,
        validation::validate_checkout,
    },
    discounts::{
        DiscountError, DiscountValueType, NotApplicable,
        sales::{DiscountInfo, SaleId, fetch_active_discounts},
        vouchers::{
            Voucher, add_voucher_usage_by_customer, decrease_voucher_usage,
            increase_voucher_usage, remove_voucher_usage_by_customer,
        },
    },
    giftcards::{GiftCardError, add_gift_cards_to_order, total_balance, validate_gift_cards},
    money::{Amount, TaxedMoney, divide, floor_at_zero, quantize, zero_money},
    orders::{
        Order, OrderChargeStatus, OrderDiscount, OrderDiscountId, OrderDiscountType, OrderId,
        OrderLine, OrderLineId, OrderOrigin, OrderStatus,
        events::{OrderEvents, OrderInfo},
        mark_order_as_paid, prepare_order_search_document_value, update_order_charge_data,
    },
    payments::{
        GatewayResponse, Payment, PaymentContext, PaymentError, PaymentGateway,
        apply_gateway_response, is_fully_paid, last_active_payment,
    },
    settings::CheckoutSettings,
    store::{Store, StoreTransaction},
    taxes::{TaxChain, calculate_tax_rate},
    warehouse::{
        LineQuantity, availability::check_stock_and_preorder_quantity_bulk,
        management::{allocate_preorders, allocate_stocks},
    },
};

/// External collaborators of checkout completion.
#[derive(Clone)]
pub struct CheckoutServices {
    /// Payment service provider
    pub gateway: Arc<dyn PaymentGateway>,

    /// Tax plugins
    pub taxes: TaxChain,

    /// External shipping methods
    pub shipping_methods: Arc<dyn ShippingMethodsProvider>,

    /// Post-commit order side effects
    pub events: Arc<dyn OrderEvents>,
}

impl fmt::Debug for CheckoutServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutServices")
            .field("taxes", &self.taxes)
            .finish_non_exhaustive()
    }
}

/// Storefront input of a completion attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteCheckoutRequest {
    /// Store the payment method with the gateway for later use
    pub store_source: bool,

    /// Gateway-specific data, passed through to the gateway
    pub additional_data: Value,

    /// Where to send the customer afterwards; overrides the checkout's own
    pub redirect_url: Option<String>,

    /// Metadata added to the order on top of the checkout's
    pub metadata: BTreeMap<String, String>,

    /// Time the request is evaluated at
    pub point_in_time: Timestamp,
}

impl CompleteCheckoutRequest {
    /// A request evaluated at `point_in_time`.
    pub fn new(point_in_time: Timestamp) -> Self {
        Self {
            store_source: false,
            additional_data: Value::Null,
            redirect_url: None,
            metadata: BTreeMap::new(),
            point_in_time,
        }
    }
}

impl Default for CompleteCheckoutRequest {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}

/// Outcome of a completion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutCompletion {
    /// The order was created, or had already been created from this checkout.
    Completed(Box<Order>),

    /// The gateway needs the customer to act before the payment can be
    /// confirmed. The checkout is kept so completion can be retried.
    ActionRequired(Option<Value>),
}

/// An order line ready to be created, with the checkout line it comes from.
#[derive(Debug, Clone)]
pub struct OrderLineData {
    /// The order line
    pub line: OrderLine,

    /// Checkout line it was priced from
    pub info: CheckoutLineInfo,
}

impl OrderLineData {
    fn line_quantity(&self) -> LineQuantity<'_> {
        LineQuantity {
            order_line_id: Some(self.line.id),
            ..self.info.line_quantity()
        }
    }
}

/// Everything computed for an order before the payment is processed.
#[derive(Debug, Clone)]
pub struct OrderData {
    /// Id the order will be created with
    pub order_id: OrderId,

    /// Checkout the order comes from
    pub checkout_token: CheckoutToken,

    /// Order channel
    pub channel_id: ChannelId,

    /// Customer account
    pub user_id: Option<UserId>,

    /// Customer email
    pub user_email: Option<String>,

    /// Billing address
    pub billing_address: Option<Address>,

    /// Shipping address, or the pick-up address
    pub shipping_address: Option<Address>,

    /// Delivery method details
    pub delivery: OrderDeliveryFields,

    /// Shipping price before taxes
    pub base_shipping_price: Amount,

    /// Taxed shipping price
    pub shipping_price: TaxedMoney,

    /// Shipping tax rate
    pub shipping_tax_rate: Decimal,

    /// Amount left to pay once gift cards are used up
    pub total: TaxedMoney,

    /// Total before discounts
    pub undiscounted_total: TaxedMoney,

    /// Gross total gift cards are charged against
    pub total_price_left: Amount,

    /// Lines to create
    pub lines: Vec<OrderLineData>,

    /// Voucher whose use was taken
    pub voucher: Option<Voucher>,

    /// Order-level discounts
    pub discounts: Vec<OrderDiscount>,
}

/// Complete the checkout identified by `token`.
///
/// Completing a checkout that was already turned into an order returns that
/// order.
///
/// # Errors
///
/// Returns a [`CheckoutError`] if the checkout is invalid, not fully paid, out
/// of stock, the voucher or a gift card no longer applies, taxes cannot be
/// calculated or the payment fails. Nothing is created in that case and the
/// voucher use is given back.
#[instrument(skip_all, fields(checkout = %token))]
pub fn complete_checkout<S: Store>(
    store: &S,
    services: &CheckoutServices,
    settings: &CheckoutSettings,
    token: CheckoutToken,
    request: &CompleteCheckoutRequest,
) -> Result<CheckoutCompletion, CheckoutError> {
    let point_in_time = request.point_in_time;
    let mut tx = store.begin()?;

    let Some(checkout) = tx.checkout(token)? else {
        return match tx.order_by_checkout_token(token)? {
            Some(order) => {
                debug!(order = %order.id, "checkout already completed");
                Ok(CheckoutCompletion::Completed(Box::new(order)))
            }
            None => Err(CheckoutError::new(
                CheckoutErrorCode::NotFound,
                format!("Couldn't resolve checkout: {token}"),
            )
            .with_field("token")),
        };
    };

    let channel = tx.channel(checkout.channel_id)?;
    let discounts = fetch_active_discounts(&mut tx, point_in_time)?;
    let (lines, unavailable) =
        fetch_checkout_lines(&mut tx, &checkout, &channel, &discounts, point_in_time)?;

    if !unavailable.is_empty() {
        return Err(CheckoutError::new(
            CheckoutErrorCode::UnavailableVariantInChannel,
            "Some of the checkout lines variants are unavailable.",
        )
        .with_field("lines")
        .with_variants(unavailable));
    }

    if lines.is_empty() {
        return Err(CheckoutError::new(
            CheckoutErrorCode::NoLines,
            "Cannot complete checkout without lines.",
        )
        .with_field("lines"));
    }

    let info = fetch_checkout_info(
        &mut tx,
        checkout,
        channel,
        &lines,
        &discounts,
        Arc::clone(&services.shipping_methods),
        point_in_time,
    )?;

    let redirect_url = request
        .redirect_url
        .clone()
        .or_else(|| info.checkout.redirect_url.clone());

    validate_checkout(
        &mut tx,
        &info,
        &lines,
        redirect_url.as_deref(),
        &settings.allowed_client_hosts,
    )?;

    let payment = validate_payments(&mut tx, services, &info, &lines, &discounts)?;
    let order_data =
        prepare_order_data(&mut tx, &services.taxes, &info, &lines, &discounts, point_in_time)?;

    tx.commit()?;

    let processed = match payment {
        Some(payment) => match process_payment(services, &info, payment, request) {
            Ok(PaymentOutcome::Processed {
                payment,
                customer_id,
            }) => Some((payment, customer_id)),
            Ok(PaymentOutcome::ActionRequired { payment, data }) => {
                debug!(payment = %payment.id, "payment requires customer action");
                give_back_voucher_usage(store, &order_data, Some(payment))?;
                return Ok(CheckoutCompletion::ActionRequired(data));
            }
            Err(error) => {
                give_back_voucher_usage(store, &order_data, None)?;
                return Err(error);
            }
        },
        None => None,
    };

    let order = create_order(
        store,
        services,
        settings,
        &info,
        &order_data,
        processed.as_ref(),
        redirect_url,
        request,
    );

    match order {
        Ok(order) => Ok(CheckoutCompletion::Completed(Box::new(order))),
        Err(error) => {
            warn!(%error, "order creation failed");

            if let Some((payment, _)) = &processed {
                refund_or_void(services.gateway.as_ref(), payment, &info.channel.slug);
            }
            give_back_voucher_usage(store, &order_data, None)?;

            Err(error)
        }
    }
}

/// Give back the voucher use taken for `order_data`.
///
/// # Errors
///
/// Returns [`DiscountError::Store`] if the usage cannot be updated.
pub fn release_voucher_usage<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    order_data: &OrderData,
) -> Result<(), DiscountError> {
    let Some(voucher) = &order_data.voucher else {
        return Ok(());
    };

    decrease_voucher_usage(tx, voucher)?;

    if voucher.apply_once_per_customer
        && let Some(email) = order_data.user_email.as_deref()
    {
        remove_voucher_usage_by_customer(tx, voucher, email)?;
    }

    Ok(())
}

fn give_back_voucher_usage<S: Store>(
    store: &S,
    order_data: &OrderData,
    payment: Option<Payment>,
) -> Result<(), CheckoutError> {
    let mut tx = store.begin()?;

    release_voucher_usage(&mut tx, order_data)?;

    if let Some(payment) = payment {
        tx.save_payment(payment)?;
    }

    tx.commit()?;

    Ok(())
}

/// Check the active payments cover what is left after gift cards. Returns
/// the payment to process, if any.
fn validate_payments<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    services: &CheckoutServices,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
) -> Result<Option<Payment>, CheckoutError> {
    let total = checkout_total(&services.taxes, info, lines, discounts)?;
    let gift_cards = tx.gift_cards(&info.checkout.gift_card_ids, false)?;
    let gift_cards_balance = total_balance(&gift_cards, info.checkout.currency)?;

    let payments = tx.checkout_payments(info.checkout.token)?;
    let payment = last_active_payment(&payments).cloned();

    if !is_fully_paid(&payments, total.gross, gift_cards_balance)? {
        if let Some(payment) = &payment {
            refund_or_void(services.gateway.as_ref(), payment, &info.channel.slug);
        }

        return Err(CheckoutError::new(
            CheckoutErrorCode::CheckoutNotFullyPaid,
            "Provided payment methods can not cover the checkout's total amount",
        )
        .with_field("payment"));
    }

    Ok(payment)
}

/// Price the order, check stock and gift cards and take one use of the
/// voucher.
fn prepare_order_data<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    discounts: &[DiscountInfo],
    point_in_time: Timestamp,
) -> Result<OrderData, CheckoutError> {
    let currency = info.checkout.currency;
    let order_id = OrderId::new();

    let total = checkout_total(chain, info, lines, discounts)?;
    let gift_cards = tx.gift_cards(&info.checkout.gift_card_ids, false)?;
    let gift_cards_balance = total_balance(&gift_cards, currency)?;
    let total_with_gift_cards = total.sub_amount(gift_cards_balance)?.floor_at_zero();

    let base_shipping_price = base_checkout_delivery_price(info, lines);
    let shipping_price = checkout_shipping_price(chain, info, lines, discounts)?;
    let shipping_tax_rate = chain.get_checkout_shipping_tax_rate(
        info,
        lines,
        discounts,
        calculate_tax_rate(shipping_price),
    )?;

    let order_lines = lines
        .iter()
        .map(|line| create_line_for_order(chain, info, lines, line, discounts, order_id))
        .collect::<Result<Vec<_>, _>>()?;

    let mut undiscounted_total = shipping_price;
    for line in &order_lines {
        undiscounted_total = undiscounted_total.add(line.line.undiscounted_total_price)?;
    }

    let quantities: Vec<LineQuantity<'_>> =
        lines.iter().map(CheckoutLineInfo::line_quantity).collect();
    check_stock_and_preorder_quantity_bulk(
        tx,
        &quantities,
        info.country(),
        &info.channel,
        info.delivery_method_info().warehouse_filter(),
        point_in_time,
    )?;

    validate_gift_cards(&gift_cards, point_in_time).map_err(GiftCardError::from)?;

    let voucher = take_voucher_usage(tx, info, point_in_time)?;
    let order_discounts = voucher
        .as_ref()
        .filter(|voucher| !voucher.is_line_level())
        .map(|voucher| OrderDiscount {
            id: OrderDiscountId::new(),
            discount_type: OrderDiscountType::Voucher,
            value_type: DiscountValueType::Fixed,
            value: *info.checkout.discount.amount(),
            amount: info.checkout.discount,
            name: info
                .checkout
                .discount_name
                .clone()
                .or_else(|| voucher.name.clone()),
        })
        .into_iter()
        .collect();

    let delivery = info.delivery_method_info();
    let order_data = OrderData {
        order_id,
        checkout_token: info.checkout.token,
        channel_id: info.channel.id,
        user_id: info.user.as_ref().map(|user| user.id),
        user_email: info.customer_email().map(ToString::to_string),
        billing_address: info.billing_address.clone(),
        shipping_address: delivery
            .shipping_address()
            .cloned()
            .or_else(|| info.shipping_address.clone()),
        delivery: delivery.order_fields(),
        base_shipping_price,
        shipping_price,
        shipping_tax_rate,
        total: total_with_gift_cards,
        undiscounted_total,
        total_price_left: total.gross,
        lines: order_lines,
        voucher,
        discounts: order_discounts,
    };

    if let Err(error) = chain.preprocess_order_creation(info, lines, discounts) {
        warn!(%error, "tax preprocessing failed");
        release_voucher_usage(tx, &order_data)?;

        return Err(error.into());
    }

    Ok(order_data)
}

fn take_voucher_usage<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    info: &CheckoutInfo,
    point_in_time: Timestamp,
) -> Result<Option<Voucher>, CheckoutError> {
    let voucher = get_voucher_for_checkout(tx, &info.checkout, true, point_in_time)?;

    let Some(voucher) = voucher else {
        if info.checkout.voucher_code.is_some() {
            return Err(DiscountError::from(NotApplicable::new(
                "Voucher expired in meantime. Order placement aborted.",
            ))
            .into());
        }

        return Ok(None);
    };

    increase_voucher_usage(tx, &voucher)?;

    if voucher.apply_once_per_customer
        && let Some(email) = info.customer_email()
    {
        add_voucher_usage_by_customer(tx, &voucher, email)?;
    }

    Ok(Some(voucher))
}

fn create_line_for_order(
    chain: &TaxChain,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    line: &CheckoutLineInfo,
    discounts: &[DiscountInfo],
    order_id: OrderId,
) -> Result<OrderLineData, CheckoutError> {
    let channel = &info.channel;
    let quantity = line.line.quantity;

    let base_unit = base_checkout_line_unit_price(line, channel, discounts)?;
    let base_total = base_checkout_line_total(line, channel, discounts)?;
    let (sale_id, _) = line_sale_price(line, channel, discounts)?;

    let total_price = checkout_line_total(chain, info, lines, line, discounts)?;
    let unit_price = total_price.divide(quantity).quantize();
    let undiscounted_unit_price = chain.calculate_checkout_line_unit_price(
        info,
        lines,
        line,
        discounts,
        TaxedMoney::untaxed(base_unit.undiscounted_price),
    )?;
    let tax_rate = chain.get_checkout_line_tax_rate(
        info,
        lines,
        line,
        discounts,
        calculate_tax_rate(total_price),
    )?;

    let base_unit_price = quantize(divide(base_total.price_with_discounts, quantity));
    let undiscounted_base_unit_price = base_unit.undiscounted_price;
    let unit_discount = floor_at_zero(undiscounted_base_unit_price.sub(base_unit_price)?);

    let voucher_code = line.voucher.as_ref().map(|voucher| voucher.code.clone());
    let unit_discount_reason = discount_reason(sale_id, voucher_code.as_deref());

    let order_line = OrderLine {
        id: OrderLineId::new(),
        order_id,
        variant_id: Some(line.variant.id),
        product_name: line.product.name.clone(),
        variant_name: line.variant.name.clone(),
        product_sku: line.variant.sku.clone(),
        is_shipping_required: line.variant.is_shipping_required,
        is_gift_card: line.variant.is_gift_card,
        quantity,
        quantity_fulfilled: 0,
        unit_price,
        undiscounted_unit_price,
        total_price,
        undiscounted_total_price: undiscounted_unit_price.times(quantity).quantize(),
        base_unit_price,
        undiscounted_base_unit_price,
        base_total_price: base_total.price_with_discounts,
        undiscounted_base_total_price: base_total.undiscounted_price,
        unit_discount,
        unit_discount_value: *unit_discount.amount(),
        unit_discount_type: (!unit_discount.amount().is_zero())
            .then_some(DiscountValueType::Fixed),
        unit_discount_reason,
        sale_id,
        voucher_code,
        tax_rate,
    };

    Ok(OrderLineData {
        line: order_line,
        info: line.clone(),
    })
}

fn discount_reason(sale_id: Option<SaleId>, voucher_code: Option<&str>) -> Option<String> {
    let sale = sale_id.map(|id| format!("Sale: {id}"));
    let voucher = voucher_code.map(|code| format!("Voucher code: {code}"));

    match (sale, voucher) {
        (Some(sale), Some(voucher)) => Some(format!("{sale} & {voucher}")),
        (sale, voucher) => sale.or(voucher),
    }
}

enum PaymentOutcome {
    Processed {
        payment: Payment,
        customer_id: Option<String>,
    },
    ActionRequired {
        payment: Payment,
        data: Option<Value>,
    },
}

fn process_payment(
    services: &CheckoutServices,
    info: &CheckoutInfo,
    mut payment: Payment,
    request: &CompleteCheckoutRequest,
) -> Result<PaymentOutcome, CheckoutError> {
    let gateway = services.gateway.as_ref();
    let channel_slug = info.channel.slug.as_str();

    let context = PaymentContext {
        customer_id: info
            .user
            .as_ref()
            .and_then(|user| user.gateway_customer_id(&payment.gateway))
            .map(ToString::to_string),
        store_source: request.store_source,
        additional_data: request.additional_data.clone(),
        channel_slug: channel_slug.to_string(),
    };

    let response = if payment.to_confirm {
        gateway.confirm_payment(&payment, &context)
    } else {
        gateway.process_payment(&payment, &context)
    };

    let response = match response {
        Ok(GatewayResponse {
            is_success: false,
            error,
            ..
        }) => Err(PaymentError::new(
            error.unwrap_or_else(|| "Payment was not processed".to_string()),
        )),
        other => other,
    };

    let response = match response {
        Ok(response) => response,
        Err(error) => {
            warn!(payment = %payment.id, %error, "payment failed");
            refund_or_void(gateway, &payment, channel_slug);

            return Err(error.into());
        }
    };

    apply_gateway_response(&mut payment, &response)?;

    if response.action_required {
        return Ok(PaymentOutcome::ActionRequired {
            payment,
            data: response.action_required_data,
        });
    }

    Ok(PaymentOutcome::Processed {
        payment,
        customer_id: response.customer_id,
    })
}

fn refund_or_void(gateway: &dyn PaymentGateway, payment: &Payment, channel_slug: &str) {
    if let Err(error) = gateway.refund_or_void(payment, channel_slug) {
        warn!(payment = %payment.id, %error, "refund or void failed");
    }
}

#[expect(
    clippy::too_many_arguments,
    reason = "every argument is a distinct input of order creation"
)]
fn create_order<S: Store>(
    store: &S,
    services: &CheckoutServices,
    settings: &CheckoutSettings,
    info: &CheckoutInfo,
    order_data: &OrderData,
    processed: Option<&(Payment, Option<String>)>,
    redirect_url: Option<String>,
    request: &CompleteCheckoutRequest,
) -> Result<Order, CheckoutError> {
    let point_in_time = request.point_in_time;
    let token = order_data.checkout_token;
    let mut tx = store.begin()?;

    if let Some(existing) = tx.order_by_checkout_token(token)? {
        debug!(order = %existing.id, "order already created for checkout");
        release_voucher_usage(&mut tx, order_data)?;
        tx.commit()?;

        return Ok(existing);
    }

    let mut order = build_order(settings, info, order_data, redirect_url, request);
    tx.insert_order(order.clone())?;

    let order_lines: Vec<OrderLine> = order_data
        .lines
        .iter()
        .map(|line| line.line.clone())
        .collect();
    tx.insert_order_lines(order_lines.clone())?;

    let quantities: Vec<LineQuantity<'_>> = order_data
        .lines
        .iter()
        .map(OrderLineData::line_quantity)
        .collect();
    allocate_stocks(
        &mut tx,
        &quantities,
        info.country(),
        &info.channel,
        info.delivery_method_info().warehouse_filter(),
        point_in_time,
        &services.events,
    )?;
    allocate_preorders(&mut tx, &quantities, point_in_time)?;

    order.gift_card_ids = add_gift_cards_to_order(
        &mut tx,
        &info.checkout.gift_card_ids,
        &order,
        order_data.total_price_left,
        point_in_time,
    )?;

    let mut payments = tx.checkout_payments(token)?;
    if let Some((processed, _)) = processed {
        match payments.iter_mut().find(|payment| payment.id == processed.id) {
            Some(payment) => *payment = processed.clone(),
            None => payments.push(processed.clone()),
        }
    }
    for payment in &mut payments {
        payment.order_id = Some(order.id);
        tx.save_payment(payment.clone())?;
    }

    if let Some((payment, Some(customer_id))) = processed
        && let Some(mut user) = info.user.clone()
    {
        user.store_gateway_customer_id(&payment.gateway, customer_id);
        tx.save_user(user)?;
    }

    update_order_charge_data(&mut order, &payments)?;
    if order.total.is_zero() {
        mark_order_as_paid(&mut order);
    }
    order.search_document = prepare_order_search_document_value(&order, &order_lines);

    tx.save_order(order.clone())?;
    tx.delete_checkout(token)?;

    let order_info = OrderInfo {
        order: order.clone(),
        customer_email: order.user_email.clone(),
        channel: info.channel.clone(),
        payment: processed.map(|(payment, _)| payment.clone()),
        lines: order_lines,
    };
    let events = Arc::clone(&services.events);
    tx.on_commit(Box::new(move || {
        events.order_created(&order_info);

        if order_info.customer_email.is_some() {
            events.send_order_confirmation(&order_info);
        }

        if order_info.order.is_fully_paid() {
            events.order_fully_paid(&order_info.order);
        }
    }));

    tx.commit()?;

    info!(order = %order.id, total = %order.total.gross, "checkout completed");

    Ok(order)
}

fn build_order(
    settings: &CheckoutSettings,
    info: &CheckoutInfo,
    order_data: &OrderData,
    redirect_url: Option<String>,
    request: &CompleteCheckoutRequest,
) -> Order {
    let checkout = &info.checkout;

    let status = if settings.automatically_confirm_all_new_orders {
        OrderStatus::Unfulfilled
    } else {
        OrderStatus::Unconfirmed
    };

    let mut metadata = checkout.metadata.clone();
    metadata.extend(request.metadata.clone());

    Order {
        id: order_data.order_id,
        checkout_token: Some(order_data.checkout_token),
        channel_id: order_data.channel_id,
        status,
        origin: OrderOrigin::Checkout,
        created_at: request.point_in_time,
        user_id: order_data.user_id,
        user_email: order_data.user_email.clone(),
        billing_address: order_data.billing_address.clone(),
        shipping_address: order_data.shipping_address.clone(),
        shipping_method: order_data.delivery.shipping_method.clone(),
        shipping_method_name: order_data.delivery.shipping_method_name.clone(),
        collection_point_id: order_data.delivery.collection_point_id,
        collection_point_name: order_data.delivery.collection_point_name.clone(),
        base_shipping_price: order_data.base_shipping_price,
        shipping_price: order_data.shipping_price,
        shipping_tax_rate: order_data.shipping_tax_rate,
        total: order_data.total,
        undiscounted_total: order_data.undiscounted_total,
        total_charged: zero_money(checkout.currency),
        charge_status: OrderChargeStatus::None,
        voucher_id: order_data.voucher.as_ref().map(|voucher| voucher.id),
        discounts: order_data.discounts.clone(),
        gift_card_ids: Vec::new(),
        customer_note: checkout.note.clone(),
        tracking_client_id: checkout.tracking_code.clone().unwrap_or_default(),
        redirect_url,
        metadata,
        private_metadata: checkout.private_metadata.clone(),
        search_document: String::new(),
        display_gross_prices: settings.include_taxes_in_prices,
    }
}
