//! Channels and addresses

use rusty_money::iso::Currency;

use crate::uuids::TypedUuid;

/// Channel id
pub type ChannelId = TypedUuid<Channel>;

/// How stock is drawn from a channel's warehouses when allocating order lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStrategy {
    /// Use warehouses in the order they are attached to the channel.
    #[default]
    PrioritizeSortingOrder,

    /// Use the warehouses with the most available stock first.
    PrioritizeHighStock,
}

/// A sales context: currency, default country and catalog visibility.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel id
    pub id: ChannelId,

    /// Unique slug
    pub slug: String,

    /// Display name
    pub name: String,

    /// Currency every price in the channel is expressed in
    pub currency: &'static Currency,

    /// Country used when the checkout has no address
    pub default_country: String,

    /// Inactive channels cannot complete checkouts
    pub is_active: bool,

    /// Stock allocation order
    pub allocation_strategy: AllocationStrategy,
}

/// Postal address
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// First name
    pub first_name: String,

    /// Last name
    pub last_name: String,

    /// Company
    pub company_name: String,

    /// Street, first line
    pub street_address_1: String,

    /// Street, second line
    pub street_address_2: String,

    /// City
    pub city: String,

    /// Postal code
    pub postal_code: String,

    /// ISO 3166-1 alpha-2 country code
    pub country: String,

    /// Phone number
    pub phone: String,
}

impl Address {
    /// Values indexed by order search.
    pub fn search_values(&self) -> impl Iterator<Item = &str> {
        [
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.street_address_1.as_str(),
            self.street_address_2.as_str(),
            self.city.as_str(),
            self.postal_code.as_str(),
            self.country.as_str(),
            self.phone.as_str(),
        ]
        .into_iter()
        .filter(|value| !value.is_empty())
    }
}
