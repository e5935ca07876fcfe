//! Gift cards
//!
//! Store-of-value cards customers attach to a checkout. Their balance is
//! drawn down, in the order they were added, when an order is placed.

use jiff::{Timestamp, civil::Date, tz::TimeZone};
use rust_decimal::Decimal;
use rusty_money::{MoneyError, iso::Currency};
use thiserror::Error;
use tracing::debug;

use crate::{
    accounts::UserId,
    money::{Amount, min_amount, sum_amounts},
    orders::Order,
    store::{StoreError, StoreTransaction},
    uuids::TypedUuid,
};

/// Gift card id
pub type GiftCardId = TypedUuid<GiftCard>;

/// A gift card cannot be used for the order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GiftCardNotApplicable {
    /// Human readable reason
    pub message: String,
}

/// Errors raised while charging gift cards.
#[derive(Debug, Error)]
pub enum GiftCardError {
    /// A card is no longer usable.
    #[error(transparent)]
    NotApplicable(#[from] GiftCardNotApplicable),

    /// Balances are in another currency.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Cards could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gift card
#[derive(Debug, Clone)]
pub struct GiftCard {
    /// Gift card id
    pub id: GiftCardId,

    /// Code printed on the card
    pub code: String,

    /// Balance when issued
    pub initial_balance: Amount,

    /// Remaining balance
    pub current_balance: Amount,

    /// Deactivated cards cannot be used
    pub is_active: bool,

    /// Last day the card can be used
    pub expiry_date: Option<Date>,

    /// First customer account to use the card
    pub used_by: Option<UserId>,

    /// First customer email to use the card
    pub used_by_email: Option<String>,

    /// Last time the card paid for an order
    pub last_used_on: Option<Timestamp>,
}

impl GiftCard {
    /// Whether the card is active and not expired on `today`.
    pub fn is_usable(&self, today: Date) -> bool {
        self.is_active && self.expiry_date.is_none_or(|expiry| today <= expiry)
    }
}

/// Calendar date of `point_in_time` in UTC.
pub fn today(point_in_time: Timestamp) -> Date {
    point_in_time.to_zoned(TimeZone::UTC).date()
}

/// Combined balance of `cards`.
///
/// # Errors
///
/// Returns [`MoneyError`] if a card is in another currency.
pub fn total_balance(
    cards: &[GiftCard],
    currency: &'static Currency,
) -> Result<Amount, MoneyError> {
    sum_amounts(cards.iter().map(|card| card.current_balance), currency)
}

/// Check every card attached to a checkout is still usable.
///
/// # Errors
///
/// Returns [`GiftCardNotApplicable`] if any card is inactive or expired.
pub fn validate_gift_cards(
    cards: &[GiftCard],
    point_in_time: Timestamp,
) -> Result<(), GiftCardNotApplicable> {
    let today = today(point_in_time);

    if cards.iter().all(|card| card.is_usable(today)) {
        return Ok(());
    }

    Err(GiftCardNotApplicable {
        message: "Gift card has expired. Order placement cancelled.".to_string(),
    })
}

/// Charge the checkout's gift cards for `total_price_left`, in the order they
/// were added, and attach them to `order`.
///
/// Returns the ids of the cards that were charged.
///
/// # Errors
///
/// Returns [`GiftCardError`] if a card is no longer usable, balances are in
/// another currency or the store fails.
pub fn add_gift_cards_to_order<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    gift_card_ids: &[GiftCardId],
    order: &Order,
    total_price_left: Amount,
    point_in_time: Timestamp,
) -> Result<Vec<GiftCardId>, GiftCardError> {
    let cards = tx.gift_cards(gift_card_ids, true)?;
    validate_gift_cards(&cards, point_in_time)?;

    let mut price_left = total_price_left;
    let mut used = Vec::with_capacity(cards.len());

    for mut card in cards {
        if *price_left.amount() <= Decimal::ZERO {
            break;
        }

        let charged = min_amount(card.current_balance, price_left);

        card.current_balance = card.current_balance.sub(charged)?;
        price_left = price_left.sub(charged)?;

        if card.used_by_email.is_none() {
            card.used_by = order.user_id;
            card.used_by_email.clone_from(&order.user_email);
        }

        card.last_used_on = Some(point_in_time);

        debug!(gift_card = %card.id, charged = %charged, "gift card charged");

        used.push(card.id);
        tx.save_gift_card(card)?;
    }

    Ok(used)
}
