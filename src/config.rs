//! Meter and feed configuration.

use crate::error::{MeterError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chain id of the main network.
pub const MAINNET_CHAIN_ID: &str =
    "aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906";

/// Chain id of the public test network.
pub const TESTNET_CHAIN_ID: &str =
    "5fff1dae8dc8e2fc4d5b23b2c7665c97f9e9d8edf2b6485a86ba311c25639191";

/// Meter configuration.
///
/// Deserializable from JSON; every field except `account` has a default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Account whose history is watched (and which receives payments).
    pub account: String,

    /// Token contract transfers must come from.
    /// Default: "eosio.token"
    pub contract: String,

    /// Token symbol quantities and rates are quoted in.
    /// Default: "EOS"
    pub symbol: String,

    /// Only act on records in irreversible blocks.
    /// Default: false
    pub irreversible: bool,

    /// Actions requested per history query.
    /// Default: 30
    pub page_size: u32,

    /// Delay before polling again once caught up, in milliseconds.
    /// Default: 5000
    pub poll_interval_ms: u64,

    /// Max buffered events per consumer.
    /// Default: 1000
    pub event_buffer: usize,

    /// Chain the account lives on, used when building transfers.
    pub chain_id: String,

    /// Permission transfers are authorized with.
    /// Default: "active"
    pub permission: String,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            contract: "eosio.token".to_string(),
            symbol: "EOS".to_string(),
            irreversible: false,
            page_size: 30,
            poll_interval_ms: 5000,
            event_buffer: 1000,
            chain_id: MAINNET_CHAIN_ID.to_string(),
            permission: "active".to_string(),
        }
    }
}

impl MeterConfig {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Default::default()
        }
    }

    /// Check required fields and bounds.
    pub fn validate(&self) -> Result<()> {
        if self.account.is_empty() {
            return Err(MeterError::MissingRequiredField("account"));
        }
        if self.contract.is_empty() {
            return Err(MeterError::MissingRequiredField("contract"));
        }
        if self.symbol.trim().is_empty() {
            return Err(MeterError::MissingRequiredField("symbol"));
        }
        if self.page_size == 0 {
            return Err(MeterError::InvalidConfig("page_size must be positive".into()));
        }
        if self.event_buffer == 0 {
            return Err(MeterError::InvalidConfig("event_buffer must be positive".into()));
        }
        Ok(())
    }

    /// Feed settings for watching this account's history.
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            account: self.account.clone(),
            contract: self.contract.clone(),
            irreversible: self.irreversible,
            page_size: self.page_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            start_position: 0,
            buffer_size: self.event_buffer,
        }
    }
}

/// Settings of a single polling feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedConfig {
    pub account: String,

    /// Feed-level action filter: only transfers from this contract are emitted.
    pub contract: String,

    /// Defer records until their block is irreversible.
    pub irreversible: bool,

    pub page_size: u32,

    /// Backoff once caught up.
    pub poll_interval: Duration,

    /// History position to start from.
    pub start_position: u64,

    /// Max buffered raw events.
    pub buffer_size: usize,
}

impl FeedConfig {
    pub fn with_start_position(mut self, position: u64) -> Self {
        self.start_position = position;
        self
    }
}
