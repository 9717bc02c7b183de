//! # Paymeter
//!
//! Pay-per-second access control driven by on-chain token transfers.
//!
//! ## Core Concepts
//!
//! - **Feed**: Cursor-based polling over an account's action history
//! - **Filter**: Turns matching transfers into time-stamped deposits
//! - **Ledger**: Streaming funds accounting at a fixed per-second rate
//! - **Subscriptions**: Feed, filter and ledger wired together behind a handle
//!
//! ## Example
//!
//! ```ignore
//! use paymeter::{Meter, MeterConfig, SubscriptionEvent};
//!
//! let meter = Meter::new(MeterConfig::new("alice"), source)?;
//! let sub = meter.subscription("order-1234", "0.0001 EOS/s")?;
//!
//! while let Ok(event) = sub.recv() {
//!     if let SubscriptionEvent::Synced = event {
//!         println!("funded for {} ms", sub.remaining_time_ms());
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod ledger;
pub mod meter;
pub mod payment;
pub mod rate;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use config::{FeedConfig, MeterConfig, MAINNET_CHAIN_ID, TESTNET_CHAIN_ID};
pub use error::{MeterError, Result};
pub use feed::{
    ActionPage, FeedEvent, HistorySource, MemorySource, NextPoll, PollOutcome, PollingFeed,
    TransactionFeed,
};
pub use filter::{parse_block_time, parse_quantity, EventFilter, FilterOutcome, QuantityPolicy};
pub use ledger::FundsLedger;
pub use meter::Meter;
pub use payment::{format_quantity, PaymentAmount, PaymentSubmitter, SubmitOptions, Transfer};
pub use rate::{PaymentCard, Rate, RateSpec, RateUnit};
pub use subscriptions::{Subscription, SubscriptionConfig, SubscriptionEvent};
pub use types::*;
