//! Checkout validation
//!
//! Checks run before completion touches any data.

use url::Url;

use crate::{
    checkout::{
        errors::{CheckoutError, CheckoutErrorCode},
        fetch::{CheckoutInfo, CheckoutLineInfo},
    },
    store::StoreTransaction,
};

/// Check the checkout can be turned into an order: the channel is active,
/// delivery and billing are set and the redirect URL is allowed.
///
/// # Errors
///
/// Returns the first failed check as a [`CheckoutError`].
pub fn validate_checkout<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
    redirect_url: Option<&str>,
    allowed_client_hosts: &[String],
) -> Result<(), CheckoutError> {
    if !info.channel.is_active {
        return Err(CheckoutError::new(
            CheckoutErrorCode::ChannelInactive,
            "Cannot complete checkout with inactive channel.",
        )
        .with_field("channel"));
    }

    clean_checkout_shipping(tx, info, lines)?;
    clean_billing_address(info)?;

    if let Some(url) = redirect_url {
        validate_storefront_url(url, allowed_client_hosts)?;
    }

    Ok(())
}

/// # Errors
///
/// Returns a [`CheckoutError`] when shipping is required but the method or
/// address is missing, or the method does not serve the address.
pub fn clean_checkout_shipping<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    info: &CheckoutInfo,
    lines: &[CheckoutLineInfo],
) -> Result<(), CheckoutError> {
    if !info.shipping_required {
        return Ok(());
    }

    let delivery = info.delivery_method_info();

    if !delivery.is_selected() {
        return Err(CheckoutError::new(
            CheckoutErrorCode::ShippingMethodNotSet,
            "Shipping method is not set",
        )
        .with_field("shipping_method"));
    }

    if !delivery.is_valid_delivery_method() {
        return Err(CheckoutError::new(
            CheckoutErrorCode::ShippingAddressNotSet,
            "Shipping address is not set",
        )
        .with_field("shipping_address"));
    }

    if !info.is_delivery_method_available(tx, lines)? {
        return Err(CheckoutError::new(
            CheckoutErrorCode::InvalidShippingMethod,
            "Shipping method is not valid for your shipping address",
        )
        .with_field("shipping_method"));
    }

    Ok(())
}

/// # Errors
///
/// Returns a [`CheckoutError`] if the billing address is missing.
pub fn clean_billing_address(info: &CheckoutInfo) -> Result<(), CheckoutError> {
    if info.billing_address.is_none() {
        return Err(CheckoutError::new(
            CheckoutErrorCode::BillingAddressNotSet,
            "Billing address is not set",
        )
        .with_field("billing_address"));
    }

    Ok(())
}

/// Check a storefront URL points at an allowed host.
///
/// `*` allows every host; a pattern with a leading dot allows the domain and
/// all of its subdomains. Patterns match the host alone or `host:port`.
///
/// # Errors
///
/// Returns a [`CheckoutError`] on the `redirect_url` field if the URL is
/// malformed or its host is not allowed.
pub fn validate_storefront_url(
    url: &str,
    allowed_client_hosts: &[String],
) -> Result<(), CheckoutError> {
    let invalid = |message: String| {
        CheckoutError::new(CheckoutErrorCode::Invalid, message).with_field("redirect_url")
    };

    let parsed = Url::parse(url).map_err(|error| {
        invalid(format!(
            "Invalid URL. Please check if URL is in RFC 1808 format: {error}"
        ))
    })?;

    let Some(host) = parsed.host_str() else {
        return Err(invalid(format!("{url} has no host.")));
    };

    let with_port = parsed.port().map(|port| format!("{host}:{port}"));

    let allowed = allowed_client_hosts.iter().any(|pattern| {
        host_matches(pattern, host)
            || with_port
                .as_deref()
                .is_some_and(|host| host_matches(pattern, host))
    });

    if !allowed {
        return Err(invalid(format!(
            "{host} is not allowed. Please check `allowed_client_hosts` configuration."
        )));
    }

    Ok(())
}

fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    if pattern == "*" {
        return true;
    }

    match pattern.strip_prefix('.') {
        Some(domain) => host == domain || host.ends_with(&pattern),
        None => host == pattern,
    }
}
