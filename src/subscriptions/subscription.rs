//! A metered subscription: feed, filter and funds ledger wired together.

use super::types::{SubscriptionConfig, SubscriptionEvent};
use crate::config::FeedConfig;
use crate::error::{MeterError, Result};
use crate::feed::{FeedSink, FeedWorker, HistorySource, PollingFeed};
use crate::filter::{EventFilter, FilterOutcome};
use crate::ledger::FundsLedger;
use crate::rate::Rate;
use crate::types::{ActionRecord, Cursor};
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared between the subscription handle and its feed worker.
struct Shared {
    /// Detached (None) once the subscription is destroyed.
    ledger: RwLock<Option<FundsLedger>>,
    /// Held for reading while notifying, for writing while destroying.
    destroyed: RwLock<bool>,
    synced: AtomicBool,
    dropped_notifications: AtomicU64,
    last_evaluation: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    fn is_destroyed(&self) -> bool {
        *self.destroyed.read()
    }
}

/// Feed consumer that credits matching transfers to the ledger.
struct SubscriptionSink {
    filter: EventFilter,
    shared: Arc<Shared>,
    sender: Sender<SubscriptionEvent>,
}

impl SubscriptionSink {
    /// Best-effort notification; the ledger is already up to date.
    fn notify(&self, event: SubscriptionEvent) {
        let destroyed = self.shared.destroyed.read();
        if *destroyed {
            return;
        }

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.shared
                    .dropped_notifications
                    .fetch_add(1, Ordering::SeqCst);
                warn!(?event, "Subscription buffer full, dropping notification");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl FeedSink for SubscriptionSink {
    fn on_action(&mut self, record: ActionRecord) -> bool {
        if self.shared.is_destroyed() {
            return false;
        }

        match self.filter.apply(&record) {
            FilterOutcome::Accepted(deposit) => {
                match self.shared.ledger.write().as_mut() {
                    Some(ledger) => ledger.add_deposit(deposit),
                    None => return false,
                }
                debug!(
                    position = record.position,
                    amount = %deposit.amount,
                    effective_time = %deposit.effective_time,
                    "Deposit accepted"
                );
                self.notify(SubscriptionEvent::Update { deposit });
            }
            FilterOutcome::Ignored => {}
            FilterOutcome::Rejected(e) => {
                self.notify(SubscriptionEvent::Rejected {
                    position: record.position,
                    reason: e.to_string(),
                });
            }
        }
        true
    }

    fn on_synced(&mut self) -> bool {
        if !self.shared.synced.swap(true, Ordering::SeqCst) {
            self.notify(SubscriptionEvent::Synced);
        }
        !self.shared.is_destroyed()
    }

    fn on_failed(&mut self, error: MeterError) {
        self.notify(SubscriptionEvent::Failed {
            reason: error.to_string(),
        });
    }
}

/// Pay-per-second subscription.
///
/// Watches the ledger for deposits tagged for this subscription and answers
/// how much funding is left. Queries are answered from memory and never
/// wait on the feed.
///
/// Until the feed has caught up with history the subscription reports
/// itself inactive, even if deposits were already credited.
///
/// Dropping the subscription destroys it.
pub struct Subscription {
    shared: Arc<Shared>,
    worker: FeedWorker,
    receiver: Receiver<SubscriptionEvent>,
    rate: Rate,
    evaluation_advance: Duration,
    filter_tag: String,
}

impl Subscription {
    /// Validate `config` and start watching history.
    ///
    /// `symbol` is the token symbol rates and quantities are quoted in.
    pub fn spawn(
        source: Arc<dyn HistorySource>,
        feed: FeedConfig,
        config: SubscriptionConfig,
        symbol: &str,
    ) -> Result<Self> {
        if config.buffer_size == 0 {
            return Err(MeterError::InvalidConfig("buffer_size must be positive".into()));
        }

        let rate = config.rate.normalize(symbol)?;
        let filter = EventFilter::new(&config, symbol)?;

        let advance = config.evaluation_advance.unwrap_or(0);
        let evaluation_advance = i64::try_from(advance)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                MeterError::InvalidConfig(format!("evaluation advance too large: {}s", advance))
            })?;

        let shared = Arc::new(Shared {
            ledger: RwLock::new(Some(FundsLedger::new(rate))),
            destroyed: RwLock::new(false),
            synced: AtomicBool::new(false),
            dropped_notifications: AtomicU64::new(0),
            last_evaluation: Mutex::new(None),
        });

        let (sender, receiver) = bounded(config.buffer_size);
        let sink = SubscriptionSink {
            filter,
            shared: Arc::clone(&shared),
            sender,
        };

        info!(tag = %config.filter_tag, recipient = %config.recipient, %rate, "Starting subscription");
        let worker = FeedWorker::spawn(PollingFeed::new(source, feed), |_| sink)?;

        Ok(Self {
            shared,
            worker,
            receiver,
            rate,
            evaluation_advance,
            filter_tag: config.filter_tag,
        })
    }

    pub fn filter_tag(&self) -> &str {
        &self.filter_tag
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    // --- Lifecycle ---

    /// Whether history has been caught up at least once.
    pub fn is_synced(&self) -> bool {
        self.shared.synced.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }

    /// Stop the feed and detach the ledger. Idempotent.
    ///
    /// No events are delivered afterwards; queries report no funds.
    pub fn destroy(&self) {
        {
            let mut destroyed = self.shared.destroyed.write();
            if *destroyed {
                return;
            }
            *destroyed = true;
        }

        self.worker.destroy();
        self.shared.ledger.write().take();
        info!(tag = %self.filter_tag, "Subscription destroyed");
    }

    /// Feed cursor as of the last completed poll.
    pub fn cursor(&self) -> Cursor {
        self.worker.cursor()
    }

    /// Notifications lost to a full event buffer.
    pub fn dropped_notifications(&self) -> u64 {
        self.shared.dropped_notifications.load(Ordering::SeqCst)
    }

    /// Deposits still held by the ledger.
    pub fn deposit_count(&self) -> usize {
        self.shared
            .ledger
            .read()
            .as_ref()
            .map_or(0, FundsLedger::len)
    }

    // --- Events ---

    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<SubscriptionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(
        &self,
    ) -> std::result::Result<SubscriptionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<SubscriptionEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// The underlying channel, for use in `select!`.
    pub fn receiver(&self) -> &Receiver<SubscriptionEvent> {
        &self.receiver
    }

    // --- Queries ---

    /// Whether the subscription is funded now (plus the evaluation advance).
    pub fn active(&self) -> bool {
        self.active_at(self.evaluation_time())
    }

    /// Remaining balance now (plus the evaluation advance).
    pub fn remaining_funds(&self) -> Decimal {
        self.remaining_funds_at(self.evaluation_time())
    }

    /// Milliseconds of funding left now (plus the evaluation advance).
    pub fn remaining_time_ms(&self) -> u64 {
        self.remaining_time_ms_at(self.evaluation_time())
    }

    /// Whether the subscription is funded at `at`. Always false before sync.
    pub fn active_at(&self, at: DateTime<Utc>) -> bool {
        self.is_synced() && self.remaining_funds_at(at) > Decimal::ZERO
    }

    /// Remaining balance at `at`.
    ///
    /// Evaluation times should not go backwards; see [`FundsLedger`].
    pub fn remaining_funds_at(&self, at: DateTime<Utc>) -> Decimal {
        self.shared
            .ledger
            .write()
            .as_mut()
            .map_or(Decimal::ZERO, |ledger| ledger.remaining_funds(at))
    }

    /// Milliseconds of funding left at `at`.
    pub fn remaining_time_ms_at(&self, at: DateTime<Utc>) -> u64 {
        self.shared
            .ledger
            .write()
            .as_mut()
            .map_or(0, |ledger| ledger.remaining_time_ms(at))
    }

    /// Remaining balance at `at` without compacting the ledger.
    pub fn peek_funds_at(&self, at: DateTime<Utc>) -> Decimal {
        self.shared
            .ledger
            .read()
            .as_ref()
            .map_or(Decimal::ZERO, |ledger| ledger.peek(at))
    }

    /// Now plus the evaluation advance, never earlier than a previous evaluation.
    fn evaluation_time(&self) -> DateTime<Utc> {
        let candidate = Utc::now()
            .checked_add_signed(self.evaluation_advance)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut last = self.shared.last_evaluation.lock();
        let at = match *last {
            Some(previous) if previous > candidate => previous,
            _ => candidate,
        };
        *last = Some(at);
        at
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.destroy();
    }
}
