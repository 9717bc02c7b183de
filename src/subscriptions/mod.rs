//! Metered subscriptions.
//!
//! A subscription watches an account's history for transfers carrying its
//! memo tag, credits them to a funds ledger, and answers whether the
//! subscriber is still funded. Lifecycle changes are delivered as typed
//! events on a bounded channel:
//! - `Synced` once history has been caught up
//! - `Update` for every credited deposit
//! - `Rejected` for matching transfers that could not be credited
//! - `Failed` when the feed dies
//!
//! # Example
//!
//! ```ignore
//! let sub = meter.subscription("order-1234", "0.0001 EOS/s")?;
//!
//! loop {
//!     match sub.recv() {
//!         Ok(SubscriptionEvent::Synced) => println!("active: {}", sub.active()),
//!         Ok(SubscriptionEvent::Update { deposit }) => println!("+{}", deposit.amount),
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod subscription;
mod types;

pub use subscription::Subscription;
pub use types::{SubscriptionConfig, SubscriptionEvent};
