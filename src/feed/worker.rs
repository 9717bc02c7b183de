//! Background worker driving a [`PollingFeed`].

use super::poller::{NextPoll, PollingFeed};
use crate::error::{MeterError, Result};
use crate::types::{ActionRecord, Cursor};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Consumer of a running feed.
///
/// Callbacks run on the worker thread, one at a time, in feed order.
/// Returning `false` stops the feed.
pub trait FeedSink: Send + 'static {
    fn on_action(&mut self, record: ActionRecord) -> bool;

    fn on_synced(&mut self) -> bool;

    /// The feed hit a terminal error. No callbacks follow.
    fn on_failed(&mut self, error: MeterError);
}

/// Cancellation signal shared by the worker and its sink.
///
/// Nothing is ever sent on the stop channel; dropping the sender makes every
/// receiver ready, which wakes blocked sleeps and sends.
#[derive(Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Ready once the feed is destroyed; for use in `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

/// Handle to a feed running on its own thread.
pub struct FeedWorker {
    stopped: Arc<AtomicBool>,
    stop: Mutex<Option<Sender<()>>>,
    cursor: Arc<Mutex<Cursor>>,
}

impl FeedWorker {
    /// Start polling `feed` on a new thread.
    ///
    /// `make_sink` receives the feed's stop signal so a sink that blocks on
    /// delivery can still be interrupted by [`FeedWorker::destroy`].
    pub fn spawn<S, F>(feed: PollingFeed, make_sink: F) -> Result<Self>
    where
        S: FeedSink,
        F: FnOnce(StopSignal) -> S,
    {
        let (stop, receiver) = bounded(0);
        let stopped = Arc::new(AtomicBool::new(false));
        let signal = StopSignal {
            stopped: Arc::clone(&stopped),
            receiver,
        };

        let sink = make_sink(signal.clone());
        let cursor = Arc::new(Mutex::new(feed.cursor()));
        let shared_cursor = Arc::clone(&cursor);

        thread::Builder::new()
            .name(format!("feed-{}", feed.config().account))
            .spawn(move || run(feed, sink, signal, shared_cursor))
            .map_err(|e| MeterError::InvalidConfig(format!("failed to spawn feed worker: {}", e)))?;

        Ok(Self {
            stopped,
            stop: Mutex::new(Some(stop)),
            cursor,
        })
    }

    /// Cursor as of the last completed poll.
    pub fn cursor(&self) -> Cursor {
        *self.cursor.lock()
    }

    pub fn is_destroyed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the feed. Idempotent, never blocks.
    ///
    /// A query already in flight is allowed to finish, but its result is
    /// discarded.
    pub fn destroy(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if self.stop.lock().take().is_some() {
            debug!("Feed destroyed");
        }
    }
}

impl Drop for FeedWorker {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn run<S: FeedSink>(
    mut feed: PollingFeed,
    mut sink: S,
    signal: StopSignal,
    cursor: Arc<Mutex<Cursor>>,
) {
    'poll: loop {
        if signal.is_stopped() {
            break;
        }

        let outcome = match feed.poll_once() {
            Ok(outcome) => outcome,
            Err(e) => {
                if !signal.is_stopped() {
                    warn!(error = %e, "Feed terminated");
                    sink.on_failed(e);
                }
                break;
            }
        };

        *cursor.lock() = feed.cursor();

        for record in outcome.emitted {
            if signal.is_stopped() || !sink.on_action(record) {
                break 'poll;
            }
        }

        if outcome.synced_now && (signal.is_stopped() || !sink.on_synced()) {
            break;
        }

        if let NextPoll::After(delay) = outcome.next {
            match signal.receiver.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    debug!(position = feed.cursor().next_position, "Feed worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeterConfig;
    use crate::feed::source::MemorySource;
    use crate::types::BlockNum;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Action(u64),
        Synced,
        Failed,
    }

    struct RecordingSink(Sender<Seen>);

    impl FeedSink for RecordingSink {
        fn on_action(&mut self, record: ActionRecord) -> bool {
            self.0.send(Seen::Action(record.position)).is_ok()
        }

        fn on_synced(&mut self) -> bool {
            self.0.send(Seen::Synced).is_ok()
        }

        fn on_failed(&mut self, _error: MeterError) {
            let _ = self.0.send(Seen::Failed);
        }
    }

    fn start(source: &Arc<MemorySource>, poll_ms: u64) -> (FeedWorker, Receiver<Seen>) {
        let mut config = MeterConfig::new("alice");
        config.poll_interval_ms = poll_ms;
        let feed = PollingFeed::new(source.clone(), config.feed_config());
        let (tx, rx) = unbounded();
        let worker = FeedWorker::spawn(feed, |_| RecordingSink(tx)).unwrap();
        (worker, rx)
    }

    fn push(source: &MemorySource, block: u64) {
        source.push(
            ActionRecord::transfer("eosio.token", "bob", "alice", "1.0000 EOS", "m")
                .in_block(BlockNum(block), "2019-05-01T12:00:00"),
        );
    }

    #[test]
    fn test_delivers_then_syncs() {
        let source = Arc::new(MemorySource::new());
        push(&source, 1);
        push(&source, 2);

        let (worker, rx) = start(&source, 10);
        let timeout = Duration::from_secs(2);

        assert_eq!(rx.recv_timeout(timeout).unwrap(), Seen::Action(0));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Seen::Action(1));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Seen::Synced);

        // Live records after sync.
        push(&source, 3);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Seen::Action(2));

        worker.destroy();
        assert_eq!(worker.cursor().next_position, 3);
    }

    #[test]
    fn test_transport_failure_is_terminal() {
        let source = Arc::new(MemorySource::new());
        source.fail_next("connection refused");

        let (worker, rx) = start(&source, 10);

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Seen::Failed);
        // Sender dropped with the worker thread.
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_err());
        assert_eq!(source.queries(), 1);
        drop(worker);
    }

    #[test]
    fn test_destroy_wakes_backoff() {
        let source = Arc::new(MemorySource::new());
        let (worker, rx) = start(&source, 60_000);

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Seen::Synced);
        worker.destroy();
        worker.destroy();
        assert!(worker.is_destroyed());

        // The worker leaves its minute-long backoff and exits right away.
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
        assert_eq!(source.queries(), 1);
    }
}
