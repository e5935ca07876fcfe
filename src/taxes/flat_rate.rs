//! Flat-rate taxes
//!
//! A [`TaxPlugin`] charging one rate per country, configured from settings.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    checkout::{
        base_calculations::{
            base_checkout_delivery_price, base_checkout_discount, base_checkout_subtotal,
        },
        fetch::{CheckoutInfo, CheckoutLineInfo},
    },
    discounts::{sales::DiscountInfo, vouchers::VoucherType},
    money::{TaxedMoney, floor_at_zero},
    orders::{Order, OrderLine},
    taxes::{TaxError, TaxPlugin, apply_tax_rate},
};

/// Tax rates in percentage points (`23` meaning 23%).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlatRateTaxSettings {
    /// Rate for countries without their own entry
    pub default_rate: Decimal,

    /// Rates keyed by ISO country code
    pub country_rates: BTreeMap<String, Decimal>,

    /// Whether shipping is taxed
    pub charge_taxes_on_shipping: bool,
}

impl FlatRateTaxSettings {
    /// Rate for `country` as a fraction.
    pub fn rate_for(&self, country: Option<&str>) -> Decimal {
        let points = country
            .and_then(|country| self.country_rates.get(country))
            .copied()
            .unwrap_or(self.default_rate);

        points / Decimal::ONE_HUNDRED
    }
}

/// Charges a fixed rate per country.
#[derive(Debug, Clone)]
pub struct FlatRateTaxPlugin {
    settings: FlatRateTaxSettings,
    prices_entered_with_tax: bool,
}

impl FlatRateTaxPlugin {
    /// A plugin charging the configured rates. Catalog prices are gross when
    /// `prices_entered_with_tax` is set.
    pub fn new(settings: FlatRateTaxSettings, prices_entered_with_tax: bool) -> Self {
        Self {
            settings,
            prices_entered_with_tax,
        }
    }

    fn tax(&self, value: TaxedMoney, rate: Decimal) -> TaxedMoney {
        apply_tax_rate(value.gross, rate, self.prices_entered_with_tax)
    }

    fn checkout_rate(&self, info: &CheckoutInfo) -> Decimal {
        self.settings.rate_for(Some(info.country()))
    }

    fn checkout_shipping_rate(&self, info: &CheckoutInfo) -> Decimal {
        if self.settings.charge_taxes_on_shipping {
            self.checkout_rate(info)
        } else {
            Decimal::ZERO
        }
    }

    fn order_rate(&self, order: &Order) -> Decimal {
        let country = order
            .shipping_address
            .as_ref()
            .or(order.billing_address.as_ref())
            .map(|address| address.country.as_str());

        self.settings.rate_for(country)
    }

    fn order_shipping_rate(&self, order: &Order) -> Decimal {
        if self.settings.charge_taxes_on_shipping {
            self.order_rate(order)
        } else {
            Decimal::ZERO
        }
    }
}

impl TaxPlugin for FlatRateTaxPlugin {
    fn calculate_checkout_total(
        &self,
        info: &CheckoutInfo,
        lines: &[CheckoutLineInfo],
        discounts: &[DiscountInfo],
        _previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        let mut subtotal =
            base_checkout_subtotal(lines, &info.channel, discounts, info.checkout.currency)?;
        let mut shipping = base_checkout_delivery_price(info, lines);
        let discount = base_checkout_discount(info);

        let discounts_shipping = info
            .voucher
            .as_ref()
            .is_some_and(|voucher| voucher.voucher_type == VoucherType::Shipping);

        if discounts_shipping {
            shipping = floor_at_zero(shipping.sub(discount)?);
        } else {
            subtotal = floor_at_zero(subtotal.sub(discount)?);
        }

        let taxed_subtotal = apply_tax_rate(
            subtotal,
            self.checkout_rate(info),
            self.prices_entered_with_tax,
        );
        let taxed_shipping = apply_tax_rate(
            shipping,
            self.checkout_shipping_rate(info),
            self.prices_entered_with_tax,
        );

        Ok(taxed_subtotal.add(taxed_shipping)?)
    }

    fn calculate_checkout_subtotal(
        &self,
        info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.checkout_rate(info)))
    }

    fn calculate_checkout_shipping(
        &self,
        info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.checkout_shipping_rate(info)))
    }

    fn calculate_checkout_line_total(
        &self,
        info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _line: &CheckoutLineInfo,
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.checkout_rate(info)))
    }

    fn calculate_checkout_line_unit_price(
        &self,
        info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _line: &CheckoutLineInfo,
        _discounts: &[DiscountInfo],
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.checkout_rate(info)))
    }

    fn get_checkout_line_tax_rate(
        &self,
        info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _line: &CheckoutLineInfo,
        _discounts: &[DiscountInfo],
        _previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(self.checkout_rate(info))
    }

    fn get_checkout_shipping_tax_rate(
        &self,
        info: &CheckoutInfo,
        _lines: &[CheckoutLineInfo],
        _discounts: &[DiscountInfo],
        _previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(self.checkout_shipping_rate(info))
    }

    fn calculate_order_line_unit(
        &self,
        order: &Order,
        _line: &OrderLine,
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.order_rate(order)))
    }

    fn calculate_order_line_total(
        &self,
        order: &Order,
        _line: &OrderLine,
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.order_rate(order)))
    }

    fn calculate_order_shipping(
        &self,
        order: &Order,
        previous_value: TaxedMoney,
    ) -> Result<TaxedMoney, TaxError> {
        Ok(self.tax(previous_value, self.order_shipping_rate(order)))
    }

    fn get_order_line_tax_rate(
        &self,
        order: &Order,
        _line: &OrderLine,
        _previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(self.order_rate(order))
    }

    fn get_order_shipping_tax_rate(
        &self,
        order: &Order,
        _previous_value: Decimal,
    ) -> Result<Decimal, TaxError> {
        Ok(self.order_shipping_rate(order))
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::{Money, iso::USD};
    use testresult::TestResult;

    use crate::{
        channels::Address,
        orders::tests::{order, order_line},
    };

    use super::*;

    fn settings() -> FlatRateTaxSettings {
        FlatRateTaxSettings {
            default_rate: Decimal::from(10),
            country_rates: BTreeMap::from([("PL".to_string(), Decimal::from(23))]),
            charge_taxes_on_shipping: false,
        }
    }

    #[test]
    fn settings_parse_from_yaml() -> TestResult {
        let parsed: FlatRateTaxSettings = serde_norway::from_str(
            "default_rate: 10\ncountry_rates:\n  PL: 23\ncharge_taxes_on_shipping: false\n",
        )?;

        assert_eq!(parsed, settings());

        Ok(())
    }

    #[test]
    fn country_rate_overrides_default() {
        let settings = settings();

        assert_eq!(settings.rate_for(Some("PL")), Decimal::new(23, 2));
        assert_eq!(settings.rate_for(Some("US")), Decimal::new(10, 2));
        assert_eq!(settings.rate_for(None), Decimal::new(10, 2));
    }

    #[test]
    fn order_prices_use_the_shipping_country() -> TestResult {
        let plugin = FlatRateTaxPlugin::new(settings(), false);
        let mut order = order(1000);
        order.shipping_address = Some(Address {
            country: "PL".to_string(),
            ..Address::default()
        });
        let line = order_line(&order, 1000, 1);

        let unit_base = TaxedMoney::untaxed(Money::from_minor(1000, USD));
        let shipping_base = TaxedMoney::untaxed(Money::from_minor(500, USD));

        let unit = plugin.calculate_order_line_unit(&order, &line, unit_base)?;
        let shipping = plugin.calculate_order_shipping(&order, shipping_base)?;

        assert_eq!(unit.gross, Money::from_minor(1230, USD));
        assert_eq!(shipping.gross, Money::from_minor(500, USD));

        Ok(())
    }
}
