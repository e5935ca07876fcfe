//! Checkout
//!
//! Shopping carts, their prices and their conversion into orders.
//!
//! Prices are built in two stages. [`base_calculations`] derives untaxed
//! prices from channel listings, sales and the voucher; [`calculations`] runs
//! them through the configured tax plugins. [`complete`] validates a checkout,
//! charges its payment and turns it into an order.

pub mod base_calculations;
pub mod calculations;
pub mod complete;
pub mod delivery;
pub mod discounts;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod validation;

pub use complete::{
    CheckoutCompletion, CheckoutServices, CompleteCheckoutRequest, complete_checkout,
};
pub use errors::{CheckoutError, CheckoutErrorCode};
pub use fetch::{CheckoutInfo, CheckoutLineInfo};
pub use models::{Checkout, CheckoutLine, CheckoutToken};
