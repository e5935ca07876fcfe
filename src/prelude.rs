//! Lattice Checkout prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    accounts::{User, UserId},
    channels::{Address, AllocationStrategy, Channel, ChannelId},
    checkout::{
        Checkout, CheckoutCompletion, CheckoutError, CheckoutErrorCode, CheckoutInfo,
        CheckoutLine, CheckoutLineInfo, CheckoutServices, CheckoutToken,
        CompleteCheckoutRequest, complete_checkout,
        delivery::{NoExternalShippingMethods, ShippingMethodsProvider},
    },
    discounts::{DiscountError, DiscountValueType, NotApplicable},
    giftcards::{GiftCard, GiftCardId},
    money::{Amount, TaxedMoney},
    observability::init_logging,
    orders::{
        Order, OrderId, OrderLine, OrderStatus,
        events::{OrderEvents, TracingOrderEvents},
    },
    payments::{GatewayResponse, Payment, PaymentContext, PaymentError, PaymentGateway},
    settings::CheckoutSettings,
    store::{MemoryStore, Store, StoreError, StoreTransaction},
    taxes::{FlatRateTaxPlugin, TaxChain, TaxPlugin},
};
