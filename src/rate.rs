//! Consumption rate configuration.
//!
//! A rate arrives either as a literal such as `"0.0001 EOS/s"` or as a
//! structured `{amount, interval, unit}` triple. Both are validated and
//! normalized once, at configuration time, into a per-second [`Rate`].

use crate::error::{MeterError, Result};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a structured rate interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Seconds,
    Minutes,
    Hours,
}

impl RateUnit {
    /// Seconds in one unit.
    pub fn seconds(self) -> Decimal {
        match self {
            RateUnit::Seconds => Decimal::ONE,
            RateUnit::Minutes => Decimal::from(60),
            RateUnit::Hours => Decimal::from(3600),
        }
    }
}

/// Rate as configured by the caller, before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateSpec {
    /// `"<number> <TICKER>/s"`.
    Literal(String),

    /// `amount` units every `interval` `unit`s.
    Structured {
        amount: Decimal,
        interval: Decimal,
        unit: RateUnit,
    },
}

impl RateSpec {
    pub fn literal(text: impl Into<String>) -> Self {
        RateSpec::Literal(text.into())
    }

    pub fn structured(amount: Decimal, interval: Decimal, unit: RateUnit) -> Self {
        RateSpec::Structured {
            amount,
            interval,
            unit,
        }
    }

    /// Validate and normalize to a per-second rate.
    ///
    /// `ticker` is the token symbol literals must be quoted in.
    pub fn normalize(&self, ticker: &str) -> Result<Rate> {
        match self {
            RateSpec::Literal(text) => parse_rate_literal(text, ticker),
            RateSpec::Structured {
                amount,
                interval,
                unit,
            } => {
                if amount.is_sign_negative() || interval.is_sign_negative() {
                    return Err(MeterError::InvalidRateSpec(format!(
                        "amount and interval must not be negative, got {} per {} {:?}",
                        amount, interval, unit
                    )));
                }
                let per_second = (*interval)
                    .checked_mul(unit.seconds())
                    .and_then(|seconds| amount.checked_div(seconds))
                    .ok_or_else(|| {
                        MeterError::InvalidRateSpec(format!(
                            "{} per {} {:?}",
                            amount, interval, unit
                        ))
                    })?;
                Rate::per_second(per_second)
            }
        }
    }
}

impl From<&str> for RateSpec {
    fn from(text: &str) -> Self {
        RateSpec::Literal(text.to_string())
    }
}

impl From<String> for RateSpec {
    fn from(text: String) -> Self {
        RateSpec::Literal(text)
    }
}

/// Strictly positive consumption rate, in units per second.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(Decimal);

impl Rate {
    /// Rate of `amount` units per second. Fails unless `amount > 0`.
    pub fn per_second(amount: Decimal) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(MeterError::InvalidRateSpec(format!(
                "rate must be positive, got {}",
                amount
            )));
        }
        Ok(Rate(amount))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rate({}/s)", self.0)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/s", self.0)
    }
}

/// Parse `"<number> <TICKER>/s"`. The ticker match is case-insensitive and
/// whitespace around the number, ticker and slash is tolerated.
fn parse_rate_literal(text: &str, ticker: &str) -> Result<Rate> {
    let pattern = format!(
        r"(?i)^\s*(\d+(?:\.\d+)?)\s*{}\s*/\s*s\s*$",
        regex::escape(ticker)
    );
    let re = Regex::new(&pattern)?;

    let captures = re.captures(text).ok_or_else(|| {
        MeterError::InvalidRateSpec(format!(
            "rate should have the form \"n.nnnn {}/s\", got {:?}",
            ticker, text
        ))
    })?;

    let amount: Decimal = captures[1]
        .parse()
        .map_err(|_| MeterError::InvalidRateSpec(text.to_string()))?;

    Rate::per_second(amount)
}

/// Structured payment terms, as published alongside a priced resource.
///
/// Carries the rate triple plus the optional look-ahead (`minSeconds`) and
/// confirmation delay (`paymentDelay`, milliseconds) in one object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCard {
    pub amount: Decimal,
    pub interval: Decimal,
    pub unit: RateUnit,
    #[serde(default)]
    pub min_seconds: Option<u64>,
    #[serde(default)]
    pub payment_delay: Option<u64>,
}

impl PaymentCard {
    pub fn rate_spec(&self) -> RateSpec {
        RateSpec::structured(self.amount, self.interval, self.unit)
    }
}
