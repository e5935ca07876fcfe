//! Lattice Checkout
//!
//! Checkout pricing and order materialization: prices a shopping cart with
//! sales, vouchers, shipping, taxes and gift cards, then turns a paid
//! checkout into an order while allocating stock and recording voucher and
//! gift card usage.
//!
//! Storage sits behind the [`store::Store`] trait, payments behind
//! [`payments::PaymentGateway`] and tax calculation behind
//! [`taxes::TaxPlugin`]. [`store::MemoryStore`] serves tests and embedding.

pub mod accounts;
pub mod channels;
pub mod checkout;
pub mod discounts;
pub mod giftcards;
pub mod money;
pub mod observability;
pub mod orders;
pub mod payments;
pub mod prelude;
pub mod products;
pub mod settings;
pub mod store;
pub mod taxes;
pub mod uuids;
pub mod warehouse;
