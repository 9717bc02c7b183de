//! Single-step history polling.

use super::source::HistorySource;
use crate::config::FeedConfig;
use crate::error::Result;
use crate::filter::TRANSFER_ACTION;
use crate::types::{ActionRecord, Cursor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// When to query again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextPoll {
    /// The cursor moved; more history may be waiting.
    Immediately,
    /// Caught up (or waiting on finality); back off.
    After(Duration),
}

/// What one query produced.
#[derive(Clone, Debug)]
pub struct PollOutcome {
    /// Transfers to deliver, in increasing position order.
    pub emitted: Vec<ActionRecord>,

    pub next: NextPoll,

    /// This poll completed the first catch-up.
    pub synced_now: bool,

    /// Records left in the page because their block is not yet irreversible.
    pub deferred: usize,
}

/// Cursor-driven reader over a [`HistorySource`].
///
/// Turns raw history pages into a deduplicated, finality-aware sequence of
/// transfer records. Not thread-safe by itself: a feed is driven by exactly
/// one worker and never has two queries outstanding.
pub struct PollingFeed {
    source: Arc<dyn HistorySource>,
    config: FeedConfig,
    cursor: Cursor,
}

impl PollingFeed {
    pub fn new(source: Arc<dyn HistorySource>, config: FeedConfig) -> Self {
        let cursor = Cursor::starting_at(config.start_position);
        Self {
            source,
            config,
            cursor,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Issue one history query and advance the cursor over its page.
    ///
    /// A transport error leaves the cursor untouched.
    pub fn poll_once(&mut self) -> Result<PollOutcome> {
        let start = self.cursor.next_position;
        let page = self
            .source
            .get_actions(&self.config.account, start, self.config.page_size)?;

        let page_len = page.actions.len();
        let marker = page.last_irreversible_block;
        self.cursor.last_irreversible_block = marker;

        let mut emitted = Vec::new();
        let mut consumed = 0;

        for mut record in page.actions {
            if self.config.irreversible && record.block >= marker {
                break;
            }

            consumed += 1;
            record.position = self.cursor.next_position;
            self.cursor.next_position += 1;

            // The same block can be split across page boundaries.
            match self.cursor.last_seen_block {
                Some(seen) if record.block == seen => {
                    trace!(position = record.position, block = %record.block, "Skipping repeated block");
                    continue;
                }
                Some(seen) if record.block < seen => {
                    warn!(position = record.position, block = %record.block, last_seen = %seen, "Block number went backwards");
                }
                _ => {}
            }
            self.cursor.last_seen_block = Some(record.block);

            if self.is_transaction(&record) {
                emitted.push(record);
            }
        }

        let deferred = page_len - consumed;
        if deferred > 0 {
            debug!(deferred, last_irreversible = %marker, "Waiting for finality");
        }

        let advanced = self.cursor.next_position > start;
        let mut synced_now = false;

        let next = if advanced {
            NextPoll::Immediately
        } else {
            if page_len == 0 && !self.cursor.has_synced {
                self.cursor.has_synced = true;
                synced_now = true;
                info!(position = self.cursor.next_position, account = %self.config.account, "History synced");
            }
            NextPoll::After(self.config.poll_interval)
        };

        trace!(
            start,
            next_position = self.cursor.next_position,
            fetched = page_len,
            emitted = emitted.len(),
            "Polled history"
        );

        Ok(PollOutcome {
            emitted,
            next,
            synced_now,
            deferred,
        })
    }

    fn is_transaction(&self, record: &ActionRecord) -> bool {
        record.action_name == TRANSFER_ACTION && record.contract == self.config.contract
    }
}
