//! Narrowing the raw action feed down to deposits for one subscription.

use crate::error::{MeterError, Result};
use crate::subscriptions::SubscriptionConfig;
use crate::types::{ActionRecord, Deposit};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Action name of a token transfer.
pub const TRANSFER_ACTION: &str = "transfer";

/// Format of ledger block timestamps (no zone designator, UTC implied).
const BLOCK_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Longest accepted confirmation delay: one day, in milliseconds.
pub const MAX_CONFIRMATION_DELAY_MS: u64 = 86_400_000;

/// What to do with a matching transfer whose quantity text is malformed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityPolicy {
    /// Credit the transfer as a zero-amount deposit.
    #[default]
    ZeroAmount,
    /// Skip the transfer and report it.
    Reject,
}

/// Result of running one record through the filter.
#[derive(Debug)]
pub enum FilterOutcome {
    /// The record is a deposit for this subscription.
    Accepted(Deposit),
    /// The record is not addressed to this subscription.
    Ignored,
    /// The record matched but could not be turned into a deposit.
    Rejected(MeterError),
}

/// Strict parser for `"<integer>.<4 digits> <TICKER>"` quantities.
#[derive(Clone, Debug)]
pub struct QuantityParser {
    ticker: String,
    pattern: Regex,
}

impl QuantityParser {
    pub fn new(ticker: &str) -> Result<Self> {
        if ticker.trim().is_empty() {
            return Err(MeterError::MissingRequiredField("symbol"));
        }
        let pattern = Regex::new(&format!(r"^(\d+\.\d{{4}}) {}$", regex::escape(ticker)))?;
        Ok(Self {
            ticker: ticker.to_string(),
            pattern,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn parse(&self, text: &str) -> Result<Decimal> {
        let captures = self
            .pattern
            .captures(text)
            .ok_or_else(|| MeterError::UnparsableQuantity(text.to_string()))?;
        captures[1]
            .parse()
            .map_err(|_| MeterError::UnparsableQuantity(text.to_string()))
    }
}

/// Parse a quantity such as `"0.1000 EOS"` against `ticker`.
pub fn parse_quantity(text: &str, ticker: &str) -> Result<Decimal> {
    QuantityParser::new(ticker)?.parse(text)
}

/// Parse a ledger block timestamp.
///
/// Ledger timestamps come without a zone designator and are UTC. Timestamps
/// carrying an explicit RFC 3339 offset are accepted as well.
pub fn parse_block_time(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, BLOCK_TIME_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| MeterError::UnparsableTimestamp(text.to_string()))
}

/// Per-subscription deposit filter.
#[derive(Clone, Debug)]
pub struct EventFilter {
    filter_tag: String,
    recipient: String,
    contract: String,
    confirmation_delay: Duration,
    quantity_policy: QuantityPolicy,
    quantities: QuantityParser,
}

impl EventFilter {
    /// Build the filter for a subscription; `ticker` is the deployment's token symbol.
    pub fn new(config: &SubscriptionConfig, ticker: &str) -> Result<Self> {
        if config.recipient.is_empty() {
            return Err(MeterError::MissingRequiredField("recipient"));
        }
        if config.contract.is_empty() {
            return Err(MeterError::MissingRequiredField("contract"));
        }

        let delay_ms = config.confirmation_delay.unwrap_or(0);
        if delay_ms > MAX_CONFIRMATION_DELAY_MS {
            return Err(MeterError::InvalidConfig(format!(
                "confirmation delay must be at most {}ms, got {}ms",
                MAX_CONFIRMATION_DELAY_MS, delay_ms
            )));
        }
        let delay_ms = i64::try_from(delay_ms).map_err(|_| {
            MeterError::InvalidConfig(format!("confirmation delay too large: {}ms", delay_ms))
        })?;

        Ok(Self {
            filter_tag: config.filter_tag.clone(),
            recipient: config.recipient.clone(),
            contract: config.contract.clone(),
            confirmation_delay: Duration::milliseconds(delay_ms),
            quantity_policy: config.quantity_policy,
            quantities: QuantityParser::new(ticker)?,
        })
    }

    /// Whether the record is a transfer addressed to this subscription.
    pub fn matches(&self, record: &ActionRecord) -> bool {
        record.action_name == TRANSFER_ACTION
            && record.contract == self.contract
            && record.recipient == self.recipient
            && record.memo == self.filter_tag
    }

    /// Turn a record into a deposit if it belongs to this subscription.
    pub fn apply(&self, record: &ActionRecord) -> FilterOutcome {
        if !self.matches(record) {
            return FilterOutcome::Ignored;
        }

        let block_time = match parse_block_time(&record.block_time) {
            Ok(t) => t,
            Err(e) => {
                warn!(position = record.position, block_time = %record.block_time, "Rejecting transfer with unparsable block time");
                return FilterOutcome::Rejected(e);
            }
        };

        let amount = match self.quantities.parse(&record.quantity) {
            Ok(amount) => amount,
            Err(e) => match self.quantity_policy {
                QuantityPolicy::ZeroAmount => {
                    warn!(position = record.position, quantity = %record.quantity, "Crediting unparsable quantity as zero");
                    Decimal::ZERO
                }
                QuantityPolicy::Reject => {
                    warn!(position = record.position, quantity = %record.quantity, "Rejecting transfer with unparsable quantity");
                    return FilterOutcome::Rejected(e);
                }
            },
        };

        match self.effective_time(block_time) {
            Some(effective_time) => FilterOutcome::Accepted(Deposit::new(amount, effective_time)),
            None => {
                warn!(position = record.position, block_time = %record.block_time, "Rejecting transfer whose effective time is out of range");
                FilterOutcome::Rejected(MeterError::UnparsableTimestamp(record.block_time.clone()))
            }
        }
    }

    /// Block time plus the confirmation delay, `None` past the representable range.
    fn effective_time(&self, block_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        block_time.checked_add_signed(self.confirmation_delay)
    }
}
