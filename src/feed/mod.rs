//! Cursor-based polling over ledger history.
//!
//! The feed repeatedly queries a [`HistorySource`] at an advancing cursor
//! and turns the raw pages into an ordered stream of transfer records:
//! - Records of a block split across page boundaries are delivered once
//! - With finality enforcement, records are held back until their block
//!   is irreversible
//! - The first empty page marks the feed as synced
//! - Once caught up the feed backs off before polling again
//!
//! # Example
//!
//! ```ignore
//! let feed = TransactionFeed::spawn(source, config.feed_config())?;
//!
//! loop {
//!     match feed.recv() {
//!         Ok(FeedEvent::Action(record)) => println!("transfer at {}", record.position),
//!         Ok(FeedEvent::Synced) => println!("Now live!"),
//!         Ok(FeedEvent::Failed { reason }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod poller;
mod source;
mod worker;

pub use poller::{NextPoll, PollOutcome, PollingFeed};
pub use source::{ActionPage, HistorySource, MemorySource};
pub use worker::{FeedSink, FeedWorker, StopSignal};

use crate::config::FeedConfig;
use crate::error::{MeterError, Result};
use crate::types::{ActionRecord, Cursor};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Events delivered by a raw transaction feed.
///
/// The channel disconnects once the feed stops, whether destroyed or failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A transfer on the configured token contract.
    Action(ActionRecord),

    /// Caught up with the history head for the first time.
    Synced,

    /// The history query failed; the feed is gone.
    Failed { reason: String },
}

/// Delivers feed events into a bounded channel.
///
/// Blocks while the channel is full, so nothing is lost to a slow
/// consumer, but gives up as soon as the feed is destroyed.
struct ChannelSink {
    sender: Sender<FeedEvent>,
    stop: StopSignal,
}

impl ChannelSink {
    fn deliver(&self, event: FeedEvent) -> bool {
        select! {
            send(self.sender, event) -> res => res.is_ok(),
            recv(self.stop.receiver()) -> _ => false,
        }
    }
}

impl FeedSink for ChannelSink {
    fn on_action(&mut self, record: ActionRecord) -> bool {
        self.deliver(FeedEvent::Action(record))
    }

    fn on_synced(&mut self) -> bool {
        self.deliver(FeedEvent::Synced)
    }

    fn on_failed(&mut self, error: MeterError) {
        self.deliver(FeedEvent::Failed {
            reason: error.to_string(),
        });
    }
}

/// Unfiltered stream of transfer records for one account.
pub struct TransactionFeed {
    worker: FeedWorker,
    receiver: Receiver<FeedEvent>,
}

impl TransactionFeed {
    /// Start polling in the background.
    pub fn spawn(source: Arc<dyn HistorySource>, config: FeedConfig) -> Result<Self> {
        if config.account.is_empty() {
            return Err(MeterError::MissingRequiredField("account"));
        }
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        let feed = PollingFeed::new(source, config);
        let worker = FeedWorker::spawn(feed, |stop| ChannelSink { sender, stop })?;

        Ok(Self { worker, receiver })
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// The underlying channel, for use in `select!`.
    pub fn receiver(&self) -> &Receiver<FeedEvent> {
        &self.receiver
    }

    pub fn cursor(&self) -> Cursor {
        self.worker.cursor()
    }

    pub fn is_destroyed(&self) -> bool {
        self.worker.is_destroyed()
    }

    /// Stop polling. Idempotent; events already buffered stay readable.
    pub fn destroy(&self) {
        self.worker.destroy();
    }
}
