//! Checkout errors
//!
//! Every failure of the completion pipeline surfaces as a [`CheckoutError`]:
//! an API error code, the input field at fault and a message for the customer.

use rusty_money::MoneyError;
use serde::Serialize;
use thiserror::Error;

use crate::{
    discounts::DiscountError,
    giftcards::GiftCardError,
    payments::PaymentError,
    products::VariantId,
    store::StoreError,
    taxes::{CalculationError, TaxError},
    warehouse::StockError,
};

/// API error codes of checkout operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutErrorCode {
    /// Billing address missing
    BillingAddressNotSet,

    /// Channel no longer active
    ChannelInactive,

    /// Payments do not cover the total
    CheckoutNotFullyPaid,

    /// A gift card can no longer be used
    GiftCardNotApplicable,

    /// Unexpected failure
    GraphqlError,

    /// The last payment was deactivated
    InactivePayment,

    /// Not enough stock
    InsufficientStock,

    /// Invalid input
    Invalid,

    /// The selected shipping method is not available
    InvalidShippingMethod,

    /// The checkout has no lines
    NoLines,

    /// Checkout not found
    NotFound,

    /// The gateway rejected the payment
    PaymentError,

    /// Shipping address missing
    ShippingAddressNotSet,

    /// Shipping method missing
    ShippingMethodNotSet,

    /// Taxes could not be calculated
    TaxError,

    /// Lines whose variants are no longer sold in the channel
    UnavailableVariantInChannel,

    /// The voucher cannot be used
    VoucherNotApplicable,
}

/// A user-facing checkout failure.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct CheckoutError {
    /// Error code
    pub code: CheckoutErrorCode,

    /// Input field at fault
    pub field: Option<String>,

    /// Message shown to the customer
    pub message: String,

    /// Variants involved in the failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantId>,
}

impl CheckoutError {
    /// An error without a field.
    pub fn new(code: CheckoutErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            field: None,
            message: message.into(),
            variants: Vec::new(),
        }
    }

    /// Point the error at an input field.
    #[must_use]
    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    /// Attach the variants involved.
    #[must_use]
    pub fn with_variants(mut self, variants: Vec<VariantId>) -> Self {
        self.variants = variants;
        self
    }
}

impl From<StoreError> for CheckoutError {
    fn from(error: StoreError) -> Self {
        let code = match error {
            StoreError::NotFound { .. } => CheckoutErrorCode::NotFound,
            StoreError::Conflict { .. } | StoreError::Unavailable(_) => {
                CheckoutErrorCode::GraphqlError
            }
        };

        Self::new(code, error.to_string())
    }
}

impl From<MoneyError> for CheckoutError {
    fn from(error: MoneyError) -> Self {
        Self::new(CheckoutErrorCode::Invalid, error.to_string())
    }
}

impl From<DiscountError> for CheckoutError {
    fn from(error: DiscountError) -> Self {
        match error {
            DiscountError::NotApplicable(error) => {
                Self::new(CheckoutErrorCode::VoucherNotApplicable, error.message)
                    .with_field("voucher_code")
            }
            DiscountError::Money(error) => error.into(),
            DiscountError::Store(error) => error.into(),
        }
    }
}

impl From<StockError> for CheckoutError {
    fn from(error: StockError) -> Self {
        match error {
            StockError::InsufficientStock(error) => {
                let variants = error.variant_ids();
                let ids = variants
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");

                Self::new(
                    CheckoutErrorCode::InsufficientStock,
                    format!("Insufficient product stock: {ids}"),
                )
                .with_field("lines")
                .with_variants(variants)
            }
            StockError::Store(error) => error.into(),
        }
    }
}

impl From<GiftCardError> for CheckoutError {
    fn from(error: GiftCardError) -> Self {
        match error {
            GiftCardError::NotApplicable(error) => {
                Self::new(CheckoutErrorCode::GiftCardNotApplicable, error.message)
                    .with_field("gift_cards")
            }
            GiftCardError::Money(error) => error.into(),
            GiftCardError::Store(error) => error.into(),
        }
    }
}

impl From<TaxError> for CheckoutError {
    fn from(error: TaxError) -> Self {
        Self::new(CheckoutErrorCode::TaxError, error.to_string())
    }
}

impl From<PaymentError> for CheckoutError {
    fn from(error: PaymentError) -> Self {
        Self::new(CheckoutErrorCode::PaymentError, error.message)
    }
}

impl From<CalculationError> for CheckoutError {
    fn from(error: CalculationError) -> Self {
        match error {
            CalculationError::Money(error) => error.into(),
            CalculationError::Tax(error) => error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{
        discounts::NotApplicable,
        warehouse::{InsufficientStock, InsufficientStockData},
    };

    use super::*;

    #[test]
    fn codes_serialize_as_api_constants() -> TestResult {
        let error = CheckoutError::new(CheckoutErrorCode::UnavailableVariantInChannel, "gone")
            .with_field("lines");

        let json = serde_json::to_value(&error)?;

        assert_eq!(
            json.get("code").and_then(|code| code.as_str()),
            Some("UNAVAILABLE_VARIANT_IN_CHANNEL")
        );
        assert_eq!(json.get("field").and_then(|field| field.as_str()), Some("lines"));
        assert!(json.get("variants").is_none());

        Ok(())
    }

    #[test]
    fn voucher_errors_point_at_the_code() {
        let error: CheckoutError =
            DiscountError::from(NotApplicable::new("Voucher usage limit has been reached.")).into();

        assert_eq!(error.code, CheckoutErrorCode::VoucherNotApplicable);
        assert_eq!(error.field.as_deref(), Some("voucher_code"));
        assert_eq!(error.message, "Voucher usage limit has been reached.");
    }

    #[test]
    fn stock_errors_list_the_variants() {
        let variant_id = VariantId::new();
        let error: CheckoutError = StockError::from(InsufficientStock {
            items: vec![InsufficientStockData {
                variant_id,
                order_line_id: None,
                warehouse_id: None,
                available_quantity: Some(2),
            }],
        })
        .into();

        assert_eq!(error.code, CheckoutErrorCode::InsufficientStock);
        assert_eq!(error.variants, vec![variant_id]);
        assert_eq!(error.message, format!("Insufficient product stock: {variant_id}"));
    }

    #[test]
    fn missing_rows_map_to_not_found() {
        let error: CheckoutError = StoreError::not_found::<VariantId>("42").into();

        assert_eq!(error.code, CheckoutErrorCode::NotFound);
    }
}
