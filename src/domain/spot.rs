//! Currency pair and spot quote types.

use super::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A base/quote pair plus the base amount the user wants priced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
    pub amount: Decimal,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().trim().to_uppercase(),
            quote: quote.into().trim().to_uppercase(),
            amount: Decimal::one(),
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    /// Exchange ticker symbol, e.g. `ETHUSD`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Per-entity key, e.g. `ETH-USD-1`.
    pub fn entity_key(&self) -> String {
        format!("{}-{}-{}", self.base, self.quote, self.amount)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Parses `BASE/QUOTE` with an optional `:amount` suffix.
impl FromStr for CurrencyPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pair, amount) = match s.split_once(':') {
            Some((pair, amount)) => (pair, Some(amount)),
            None => (s, None),
        };
        let (base, quote) = pair
            .split_once('/')
            .ok_or_else(|| format!("expected BASE/QUOTE, got {}", s))?;
        if base.trim().is_empty() || quote.trim().is_empty() {
            return Err(format!("expected BASE/QUOTE, got {}", s));
        }
        let mut parsed = CurrencyPair::new(base, quote);
        if let Some(amount) = amount {
            let amount = Decimal::from_str_canonical(amount)
                .map_err(|e| format!("invalid amount {}: {}", amount, e))?;
            if !amount.is_positive() {
                return Err(format!("amount must be positive, got {}", amount));
            }
            parsed = parsed.with_amount(amount);
        }
        Ok(parsed)
    }
}

/// Last traded price for one pair at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotQuote {
    pub pair: CurrencyPair,
    pub price: Decimal,
    pub at: DateTime<Utc>,
}

impl SpotQuote {
    /// Value of the configured base amount in the quote currency, `None`
    /// when the product overflows.
    pub fn total(&self) -> Option<Decimal> {
        self.price.checked_mul(self.pair.amount)
    }
}
