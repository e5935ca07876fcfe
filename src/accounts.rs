//! Customer accounts

use std::collections::BTreeMap;

use crate::uuids::TypedUuid;

/// User id
pub type UserId = TypedUuid<User>;

/// A registered customer or staff member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User id
    pub id: UserId,

    /// Email address
    pub email: String,

    /// Whether the user belongs to the store staff
    pub is_staff: bool,

    /// Whether the account is active
    pub is_active: bool,

    /// Customer ids issued by payment gateways, keyed by gateway name
    pub gateway_customer_ids: BTreeMap<String, String>,
}

impl User {
    /// Create an active, non-staff user.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            is_staff: false,
            is_active: true,
            gateway_customer_ids: BTreeMap::new(),
        }
    }

    /// Customer id the gateway issued for this user, if any.
    pub fn gateway_customer_id(&self, gateway: &str) -> Option<&str> {
        self.gateway_customer_ids.get(gateway).map(String::as_str)
    }

    /// Remember the customer id a gateway returned.
    pub fn store_gateway_customer_id(&mut self, gateway: &str, customer_id: &str) {
        self.gateway_customer_ids
            .insert(gateway.to_string(), customer_id.to_string());
    }
}
