//! Treatment credit packages and their prices.
//!
//! Prices are kept in the smallest currency unit (cents), which is what the
//! payment processor charges in; [`Price::amount`] gives the decimal form for
//! display.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Price {
    /// Amount in cents.
    pub cents: i64,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a price from cents.
    #[must_use]
    pub const fn from_cents(cents: i64, currency_code: CurrencyCode) -> Self {
        Self {
            cents,
            currency_code,
        }
    }

    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    #[must_use]
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.cents, 2)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount(), self.currency_code.as_str())
    }
}

/// ISO 4217 currency codes accepted by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Eur,
    Gbp,
}

impl CurrencyCode {
    /// Lowercase code, as sent to the processor.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

/// A purchasable bundle of treatment credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    /// Identifier clients send when purchasing.
    pub id: &'static str,
    /// Human-readable name recorded on the purchase.
    pub name: &'static str,
    /// Credits granted on a successful charge.
    pub credits: i64,
    /// Price in cents.
    pub price_cents: i64,
}

/// The fixed package table.
pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        id: "starter",
        name: "Starter Package",
        credits: 50,
        price_cents: 9_900,
    },
    CreditPackage {
        id: "standard",
        name: "Standard Package",
        credits: 100,
        price_cents: 17_900,
    },
    CreditPackage {
        id: "professional",
        name: "Professional Package",
        credits: 200,
        price_cents: 32_900,
    },
    CreditPackage {
        id: "enterprise",
        name: "Enterprise Package",
        credits: 500,
        price_cents: 74_900,
    },
];

impl CreditPackage {
    /// Look up a package by id.
    #[must_use]
    pub fn find(id: &str) -> Option<&'static Self> {
        CREDIT_PACKAGES.iter().find(|p| p.id == id)
    }

    /// Price of this package in the given currency.
    #[must_use]
    pub const fn price(&self, currency_code: CurrencyCode) -> Price {
        Price::from_cents(self.price_cents, currency_code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_packages() {
        let starter = CreditPackage::find("starter").unwrap();
        assert_eq!(starter.credits, 50);
        assert_eq!(starter.price_cents, 9_900);

        let enterprise = CreditPackage::find("enterprise").unwrap();
        assert_eq!(enterprise.credits, 500);
        assert_eq!(enterprise.name, "Enterprise Package");
    }

    #[test]
    fn test_find_unknown_package() {
        assert!(CreditPackage::find("platinum").is_none());
        assert!(CreditPackage::find("Starter").is_none());
    }

    #[test]
    fn test_price_display() {
        let price = CreditPackage::find("standard")
            .unwrap()
            .price(CurrencyCode::Usd);
        assert_eq!(price.amount(), Decimal::new(17_900, 2));
        assert_eq!(price.to_string(), "179.00 usd");
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("USD".parse::<CurrencyCode>().unwrap(), CurrencyCode::Usd);
        assert!("jpy".parse::<CurrencyCode>().is_err());
    }
}
