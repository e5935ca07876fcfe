//! Payments
//!
//! Payment records attached to a checkout and the gateway interface used to
//! charge them.

use mockall::automock;
use rusty_money::{MoneyError, iso::Currency};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    checkout::models::CheckoutToken,
    money::{Amount, floor_at_zero, sum_amounts},
    orders::OrderId,
    uuids::TypedUuid,
};

/// Payment id
pub type PaymentId = TypedUuid<Payment>;

/// The gateway could not process a payment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PaymentError {
    /// Gateway message
    pub message: String,
}

impl PaymentError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// How much of a payment has been captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargeStatus {
    /// Nothing captured yet
    #[default]
    NotCharged,

    /// Waiting for the gateway
    Pending,

    /// Part of the total captured
    PartiallyCharged,

    /// The whole total captured
    FullyCharged,

    /// Refunded in full
    FullyRefunded,

    /// Voided or refused
    Cancelled,
}

/// Kind of gateway transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds reserved
    Auth,

    /// Funds captured
    Capture,

    /// Customer action required before the payment can be confirmed
    ActionToConfirm,

    /// Funds returned
    Refund,

    /// Authorization released
    Void,
}

/// A payment attached to a checkout or order.
#[derive(Debug, Clone)]
pub struct Payment {
    /// Payment id
    pub id: PaymentId,

    /// Gateway name
    pub gateway: String,

    /// Gateway token for the payment method
    pub token: String,

    /// Amount to charge
    pub total: Amount,

    /// Amount already captured
    pub captured_amount: Amount,

    /// Capture state
    pub charge_status: ChargeStatus,

    /// Only the active payment of a checkout is processed
    pub is_active: bool,

    /// The payment waits for confirmation after a customer action
    pub to_confirm: bool,

    /// Checkout the payment belongs to
    pub checkout_token: Option<CheckoutToken>,

    /// Order the payment was moved to
    pub order_id: Option<OrderId>,

    /// Reference assigned by the payment service provider
    pub psp_reference: Option<String>,
}

/// Result of a gateway call.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    /// Whether the call succeeded
    pub is_success: bool,

    /// The customer must act (for example 3-D Secure) before confirmation
    pub action_required: bool,

    /// Data the storefront needs to perform the action
    pub action_required_data: Option<Value>,

    /// Customer id the gateway assigned
    pub customer_id: Option<String>,

    /// Error message when the call failed
    pub error: Option<String>,

    /// Transaction kind
    pub kind: TransactionKind,

    /// Amount the transaction covers
    pub amount: Amount,

    /// Provider reference
    pub psp_reference: Option<String>,
}

/// Context passed to the gateway with each call.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentContext {
    /// Customer id previously issued by the gateway
    pub customer_id: Option<String>,

    /// Whether the payment method should be stored for reuse
    pub store_source: bool,

    /// Extra gateway-specific data sent by the storefront
    pub additional_data: Value,

    /// Slug of the checkout channel
    pub channel_slug: String,
}

/// A payment service provider.
#[automock]
pub trait PaymentGateway: Send + Sync {
    /// Authorize or capture a payment.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the gateway cannot be reached.
    fn process_payment(
        &self,
        payment: &Payment,
        context: &PaymentContext,
    ) -> Result<GatewayResponse, PaymentError>;

    /// Confirm a payment after a customer action.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the gateway cannot be reached.
    fn confirm_payment(
        &self,
        payment: &Payment,
        context: &PaymentContext,
    ) -> Result<GatewayResponse, PaymentError>;

    /// Refund captured funds or void an authorization.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the gateway refuses.
    fn refund_or_void(&self, payment: &Payment, channel_slug: &str) -> Result<(), PaymentError>;
}

/// Most recently created active payment.
pub fn last_active_payment(payments: &[Payment]) -> Option<&Payment> {
    payments.iter().rev().find(|payment| payment.is_active)
}

/// Whether the active payments cover `total` minus the gift card balance.
///
/// # Errors
///
/// Returns [`MoneyError`] if a payment is in another currency.
pub fn is_fully_paid(
    payments: &[Payment],
    total: Amount,
    gift_cards_balance: Amount,
) -> Result<bool, MoneyError> {
    let currency = total.currency();
    let total_paid = sum_amounts(
        payments
            .iter()
            .filter(|payment| payment.is_active)
            .map(|payment| payment.total),
        currency,
    )?;
    let to_pay = floor_at_zero(total.sub(gift_cards_balance)?);

    Ok(total_paid.amount() >= to_pay.amount())
}

/// Record a successful gateway transaction on the payment.
///
/// # Errors
///
/// Returns [`MoneyError`] if the transaction is in another currency.
pub fn apply_gateway_response(
    payment: &mut Payment,
    response: &GatewayResponse,
) -> Result<(), MoneyError> {
    if !response.is_success {
        return Ok(());
    }

    if response.psp_reference.is_some() {
        payment.psp_reference.clone_from(&response.psp_reference);
    }

    match response.kind {
        TransactionKind::Capture => {
            payment.captured_amount = payment.captured_amount.add(response.amount)?;
            payment.charge_status = if payment.captured_amount.amount() >= payment.total.amount()
            {
                ChargeStatus::FullyCharged
            } else {
                ChargeStatus::PartiallyCharged
            };
            payment.to_confirm = false;
        }
        TransactionKind::ActionToConfirm => {
            payment.to_confirm = true;
            payment.charge_status = ChargeStatus::Pending;
        }
        TransactionKind::Auth => payment.to_confirm = false,
        TransactionKind::Refund => {
            payment.charge_status = ChargeStatus::FullyRefunded;
            payment.is_active = false;
        }
        TransactionKind::Void => {
            payment.charge_status = ChargeStatus::Cancelled;
            payment.is_active = false;
        }
    }

    Ok(())
}

/// Sum of captured amounts.
///
/// # Errors
///
/// Returns [`MoneyError`] if a payment is in another currency.
pub fn total_captured(
    payments: &[Payment],
    currency: &'static Currency,
) -> Result<Amount, MoneyError> {
    sum_amounts(payments.iter().map(|payment| payment.captured_amount), currency)
}
