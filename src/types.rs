//! Core types for the meter.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger block number.
///
/// Block numbers only grow along the history, so they double as the
/// finality marker: everything at or beyond the last irreversible block
/// may still be reorganized.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct BlockNum(pub u64);

impl fmt::Debug for BlockNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", self.0)
    }
}

impl fmt::Display for BlockNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single action observed in the ledger history.
///
/// Produced by the history source, immutable afterwards. Text fields are
/// kept exactly as the ledger returned them; interpretation happens in the
/// event filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Index into the account's action history.
    pub position: u64,

    /// Block that included the action.
    pub block: BlockNum,

    /// Block timestamp as supplied by the ledger (usually without a zone).
    pub block_time: String,

    /// Action name (e.g. "transfer").
    pub action_name: String,

    /// Contract account that executed the action (e.g. "eosio.token").
    pub contract: String,

    pub sender: String,
    pub recipient: String,

    /// Raw quantity text, e.g. "0.1000 EOS".
    pub quantity: String,

    pub memo: String,
}

impl ActionRecord {
    /// Build a transfer record. Mostly useful for tests and in-memory sources.
    pub fn transfer(
        contract: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        quantity: impl Into<String>,
        memo: impl Into<String>,
    ) -> Self {
        Self {
            position: 0,
            block: BlockNum::default(),
            block_time: String::new(),
            action_name: "transfer".to_string(),
            contract: contract.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            quantity: quantity.into(),
            memo: memo.into(),
        }
    }

    /// Set the block and block time.
    pub fn in_block(mut self, block: BlockNum, block_time: impl Into<String>) -> Self {
        self.block = block;
        self.block_time = block_time.into();
        self
    }
}

/// A credited transfer on the depletion timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Non-negative amount credited.
    pub amount: Decimal,

    /// When the deposit starts being consumed (block time plus any
    /// confirmation delay).
    pub effective_time: DateTime<Utc>,
}

impl Deposit {
    pub fn new(amount: Decimal, effective_time: DateTime<Utc>) -> Self {
        Self {
            amount,
            effective_time,
        }
    }
}

/// Polling position of a feed.
///
/// Mutated only by the feed; `next_position` never decreases and
/// `has_synced` flips to true at most once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Next history position to request.
    pub next_position: u64,

    /// Block of the last record consumed from the history.
    pub last_seen_block: Option<BlockNum>,

    /// Last irreversible block reported by the most recent page.
    pub last_irreversible_block: BlockNum,

    /// Whether the feed has caught up to the head at least once.
    pub has_synced: bool,
}

impl Cursor {
    /// Cursor starting at the given history position.
    pub fn starting_at(position: u64) -> Self {
        Self {
            next_position: position,
            ..Default::default()
        }
    }
}
