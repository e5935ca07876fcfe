//! Checkout records

use std::collections::BTreeMap;

use jiff::Timestamp;
use rusty_money::iso::Currency;

use crate::{
    accounts::UserId,
    channels::{Address, Channel, ChannelId},
    checkout::delivery::DeliveryMethodRef,
    giftcards::GiftCardId,
    money::{Amount, zero_money},
    products::VariantId,
    uuids::TypedUuid,
};

/// Checkout token
pub type CheckoutToken = TypedUuid<Checkout>;

/// Checkout line id
pub type CheckoutLineId = TypedUuid<CheckoutLine>;

/// A variant and quantity in a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    /// Line id
    pub id: CheckoutLineId,

    /// Variant id
    pub variant_id: VariantId,

    /// Requested units
    pub quantity: u32,
}

impl CheckoutLine {
    /// A new line for `quantity` units of a variant.
    pub fn new(variant_id: VariantId, quantity: u32) -> Self {
        Self {
            id: CheckoutLineId::new(),
            variant_id,
            quantity,
        }
    }
}

/// A shopping cart.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    /// Token identifying the checkout
    pub token: CheckoutToken,

    /// Channel id
    pub channel_id: ChannelId,

    /// Customer account
    pub user_id: Option<UserId>,

    /// Customer email
    pub email: Option<String>,

    /// Channel currency
    pub currency: &'static Currency,

    /// Shipping address, or the pick-up address for collection points
    pub shipping_address: Option<Address>,

    /// Billing address
    pub billing_address: Option<Address>,

    /// Selected delivery method
    pub delivery_method: DeliveryMethodRef,

    /// Code of the applied voucher
    pub voucher_code: Option<String>,

    /// Voucher discount
    pub discount: Amount,

    /// Voucher display name
    pub discount_name: Option<String>,

    /// Gift cards, in the order they were added
    pub gift_card_ids: Vec<GiftCardId>,

    /// Note left by the customer
    pub note: String,

    /// Public metadata
    pub metadata: BTreeMap<String, String>,

    /// Private metadata
    pub private_metadata: BTreeMap<String, String>,

    /// Analytics client id
    pub tracking_code: Option<String>,

    /// Storefront URL the customer is sent to
    pub redirect_url: Option<String>,

    /// Lines
    pub lines: Vec<CheckoutLine>,

    /// Creation time
    pub created_at: Timestamp,

    /// Time of the last mutation
    pub last_change: Timestamp,
}

impl Checkout {
    /// An empty checkout in `channel`.
    pub fn new(channel: &Channel, point_in_time: Timestamp) -> Self {
        Self {
            token: CheckoutToken::new(),
            channel_id: channel.id,
            user_id: None,
            email: None,
            currency: channel.currency,
            shipping_address: None,
            billing_address: None,
            delivery_method: DeliveryMethodRef::None,
            voucher_code: None,
            discount: zero_money(channel.currency),
            discount_name: None,
            gift_card_ids: Vec::new(),
            note: String::new(),
            metadata: BTreeMap::new(),
            private_metadata: BTreeMap::new(),
            tracking_code: None,
            redirect_url: None,
            lines: Vec::new(),
            created_at: point_in_time,
            last_change: point_in_time,
        }
    }

    /// Total number of units across lines.
    pub fn quantity(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Add units of a variant, merging with an existing line. Lines whose
    /// quantity drops to zero are removed.
    pub fn add_variant(&mut self, variant_id: VariantId, quantity: u32) {
        match self
            .lines
            .iter_mut()
            .find(|line| line.variant_id == variant_id)
        {
            Some(line) => line.quantity += quantity,
            None => self.lines.push(CheckoutLine::new(variant_id, quantity)),
        }

        self.lines.retain(|line| line.quantity > 0);
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::USD;

    use crate::channels::AllocationStrategy;

    use super::*;

    #[test]
    fn adding_a_variant_merges_lines() {
        let channel = Channel {
            id: ChannelId::new(),
            slug: "default".to_string(),
            name: "Default".to_string(),
            currency: USD,
            default_country: "US".to_string(),
            is_active: true,
            allocation_strategy: AllocationStrategy::default(),
        };
        let mut checkout = Checkout::new(&channel, Timestamp::UNIX_EPOCH);
        let variant = VariantId::new();

        checkout.add_variant(variant, 2);
        checkout.add_variant(variant, 1);
        checkout.add_variant(VariantId::new(), 0);

        assert_eq!(checkout.lines.len(), 1);
        assert_eq!(checkout.quantity(), 3);
    }
}
