//! Outgoing transfers.
//!
//! Signing and broadcasting are left to a [`PaymentSubmitter`] supplied by
//! the caller; this module only builds the transfer.

use crate::error::{MeterError, Result};
use crate::filter::{QuantityParser, TRANSFER_ACTION};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Blocks behind head the transaction references.
pub const BLOCKS_BEHIND: u32 = 3;

/// Seconds until an unconfirmed transaction expires.
pub const EXPIRE_SECONDS: u32 = 30;

/// Amount to pay, either a number or an already formatted quantity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentAmount {
    Value(Decimal),
    Quantity(String),
}

impl From<Decimal> for PaymentAmount {
    fn from(value: Decimal) -> Self {
        PaymentAmount::Value(value)
    }
}

impl From<&str> for PaymentAmount {
    fn from(text: &str) -> Self {
        PaymentAmount::Quantity(text.to_string())
    }
}

impl From<String> for PaymentAmount {
    fn from(text: String) -> Self {
        PaymentAmount::Quantity(text)
    }
}

/// Format `amount` as a ledger quantity, e.g. `"0.1000 EOS"`.
pub fn format_quantity(amount: Decimal, ticker: &str) -> Result<String> {
    if amount.is_sign_negative() {
        return Err(MeterError::PaymentRejected(format!(
            "negative amount {}",
            amount
        )));
    }
    let rounded = amount.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    Ok(format!("{:.4} {}", rounded, ticker))
}

/// A single token transfer action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Token contract executing the transfer.
    pub contract: String,
    pub action: String,
    pub from: String,
    pub to: String,
    pub quantity: String,
    pub memo: String,
    /// Permission of `from` authorizing the action.
    pub permission: String,
}

impl Transfer {
    /// Build a transfer, normalizing `amount` against `quantities`' ticker.
    pub fn new(
        quantities: &QuantityParser,
        contract: &str,
        from: &str,
        permission: &str,
        to: &str,
        amount: PaymentAmount,
        memo: &str,
    ) -> Result<Self> {
        let quantity = match amount {
            PaymentAmount::Value(value) => format_quantity(value, quantities.ticker())?,
            PaymentAmount::Quantity(text) => {
                quantities.parse(&text)?;
                text
            }
        };

        Ok(Self {
            contract: contract.to_string(),
            action: TRANSFER_ACTION.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            quantity,
            memo: memo.to_string(),
            permission: permission.to_string(),
        })
    }
}

/// Submission parameters handed to the submitter with every transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    pub chain_id: String,
    pub blocks_behind: u32,
    pub expire_seconds: u32,
}

impl SubmitOptions {
    pub fn for_chain(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            blocks_behind: BLOCKS_BEHIND,
            expire_seconds: EXPIRE_SECONDS,
        }
    }
}

/// Signs and broadcasts transfers.
///
/// Implementations report failures as [`MeterError::PaymentRejected`] or
/// [`MeterError::TransportFailure`]. Retrying is the caller's decision.
pub trait PaymentSubmitter: Send + Sync {
    fn submit(&self, transfer: &Transfer, options: &SubmitOptions) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(dec("20"), "EOS").unwrap(), "20.0000 EOS");
        assert_eq!(format_quantity(dec("0.1"), "EOS").unwrap(), "0.1000 EOS");
        assert_eq!(format_quantity(dec("0.00005"), "EOS").unwrap(), "0.0001 EOS");
        assert_eq!(format_quantity(dec("1.23454"), "XYZ").unwrap(), "1.2345 XYZ");
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(matches!(
            format_quantity(dec("-1"), "EOS"),
            Err(MeterError::PaymentRejected(_))
        ));
    }

    #[test]
    fn test_transfer_from_value_and_text() {
        let quantities = QuantityParser::new("EOS").unwrap();

        let transfer = Transfer::new(
            &quantities,
            "eosio.token",
            "bob",
            "active",
            "alice",
            dec("0.5").into(),
            "sub-1",
        )
        .unwrap();
        assert_eq!(transfer.quantity, "0.5000 EOS");
        assert_eq!(transfer.action, "transfer");

        let transfer = Transfer::new(
            &quantities,
            "eosio.token",
            "bob",
            "active",
            "alice",
            "2.0000 EOS".into(),
            "sub-1",
        )
        .unwrap();
        assert_eq!(transfer.quantity, "2.0000 EOS");

        let result = Transfer::new(
            &quantities,
            "eosio.token",
            "bob",
            "active",
            "alice",
            "2 EOS".into(),
            "sub-1",
        );
        assert!(matches!(result, Err(MeterError::UnparsableQuantity(_))));
    }

    #[test]
    fn test_submit_options() {
        let options = SubmitOptions::for_chain("abc");
        assert_eq!(options.blocks_behind, 3);
        assert_eq!(options.expire_seconds, 30);
    }
}
