//! Continuous-rate depletion of a queue of deposits.
//!
//! Deposits are consumed first-in first-out at a fixed rate. Each deposit
//! funds the time between its own effective time and the next deposit's;
//! whatever is left over carries into the next window. A window that runs
//! dry resets the carry to zero: funding does not go into debt.
//!
//! # Eviction
//!
//! A deposit whose window is closed by a successor and still ends up
//! negative can never contribute again, so queries drop it from the queue.
//! The balance of a closed window does not depend on the evaluation time,
//! only on deposits that already exist, which makes the eviction safe for
//! every evaluation at or after the successor's effective time.
//!
//! The tail deposit's window is open (it ends at the evaluation time), and a
//! deposit observed late may still close it earlier, so the tail is never
//! evicted even when exhausted.
//!
//! Evaluation times are expected to be non-decreasing. Asking about an
//! instant before the point the queue has already been compacted through
//! can undercount funds that were evicted.

use crate::rate::Rate;
use crate::types::Deposit;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Result of one depletion simulation.
struct Simulation {
    /// Unconsumed balance at the evaluation time.
    funds: Decimal,
    /// Queue indices of deposits proven exhausted.
    exhausted: Vec<usize>,
    /// Latest effective time of a successor that closed an exhausted window.
    closed_through: Option<DateTime<Utc>>,
}

/// FIFO funds ledger for one subscription.
#[derive(Clone, Debug)]
pub struct FundsLedger {
    rate: Rate,
    deposits: VecDeque<Deposit>,
    /// Evaluations before this instant may be missing evicted deposits.
    compacted_through: Option<DateTime<Utc>>,
}

impl FundsLedger {
    pub fn new(rate: Rate) -> Self {
        Self {
            rate,
            deposits: VecDeque::new(),
            compacted_through: None,
        }
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Number of deposits still held.
    pub fn len(&self) -> usize {
        self.deposits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
    }

    /// Deposits still held, oldest first.
    pub fn deposits(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.iter()
    }

    /// Append a deposit.
    ///
    /// Deposits are expected in non-decreasing effective-time order. An
    /// out-of-order deposit is still placed at its sorted position.
    pub fn add_deposit(&mut self, deposit: Deposit) {
        match self.deposits.back() {
            Some(last) if deposit.effective_time < last.effective_time => {
                warn!(
                    effective_time = %deposit.effective_time,
                    last = %last.effective_time,
                    "Deposit arrived out of order"
                );
                let at = self
                    .deposits
                    .partition_point(|d| d.effective_time <= deposit.effective_time);
                self.deposits.insert(at, deposit);
            }
            _ => self.deposits.push_back(deposit),
        }
    }

    /// Remaining balance at `at`, evicting exhausted deposits.
    pub fn remaining_funds(&mut self, at: DateTime<Utc>) -> Decimal {
        self.check_rewind(at);
        let simulation = self.simulate(at);
        self.evict(&simulation);
        simulation.funds
    }

    /// Remaining balance at `at` without touching the queue.
    pub fn peek(&self, at: DateTime<Utc>) -> Decimal {
        self.simulate(at).funds
    }

    /// Evict every deposit proven exhausted at `at`. Returns how many were dropped.
    pub fn compact(&mut self, at: DateTime<Utc>) -> usize {
        self.check_rewind(at);
        let simulation = self.simulate(at);
        self.evict(&simulation);
        simulation.exhausted.len()
    }

    /// Milliseconds of funding left at `at`, rounded down.
    pub fn remaining_time_ms(&mut self, at: DateTime<Utc>) -> u64 {
        let funds = self.remaining_funds(at);
        self.funds_to_millis(funds)
    }

    /// Whether any funds remain at `at`.
    pub fn active(&mut self, at: DateTime<Utc>) -> bool {
        self.remaining_funds(at) > Decimal::ZERO
    }

    fn funds_to_millis(&self, funds: Decimal) -> u64 {
        if funds <= Decimal::ZERO {
            return 0;
        }
        funds
            .checked_mul(Decimal::ONE_THOUSAND)
            .and_then(|m| m.checked_div(self.rate.as_decimal()))
            .map(|m| m.floor())
            .and_then(|m| m.to_u64())
            .unwrap_or(u64::MAX)
    }

    fn simulate(&self, at: DateTime<Utc>) -> Simulation {
        let rate = self.rate.as_decimal();
        let mut carry = Decimal::ZERO;
        let mut exhausted = Vec::new();
        let mut closed_through = None;

        for (i, deposit) in self.deposits.iter().enumerate() {
            if deposit.effective_time > at {
                break;
            }

            let successor = self
                .deposits
                .get(i + 1)
                .map(|next| next.effective_time)
                .filter(|t| *t <= at);
            let window_end = successor.unwrap_or(at);

            let consumed = rate.saturating_mul(elapsed_seconds(deposit.effective_time, window_end));
            let balance = carry + deposit.amount - consumed;

            if balance < Decimal::ZERO {
                carry = Decimal::ZERO;
                if successor.is_some() {
                    exhausted.push(i);
                    closed_through = successor;
                }
            } else {
                carry = balance;
            }
        }

        Simulation {
            funds: carry,
            exhausted,
            closed_through,
        }
    }

    fn evict(&mut self, simulation: &Simulation) {
        if simulation.exhausted.is_empty() {
            return;
        }

        let mut index = 0;
        self.deposits.retain(|_| {
            let keep = simulation.exhausted.binary_search(&index).is_err();
            index += 1;
            keep
        });

        if simulation.closed_through > self.compacted_through {
            self.compacted_through = simulation.closed_through;
        }

        debug!(
            evicted = simulation.exhausted.len(),
            remaining = self.deposits.len(),
            "Evicted exhausted deposits"
        );
    }

    fn check_rewind(&self, at: DateTime<Utc>) {
        if let Some(through) = self.compacted_through {
            if at < through {
                warn!(
                    at = %at,
                    compacted_through = %through,
                    "Evaluating before compacted point; evicted deposits are not counted"
                );
            }
        }
    }
}

/// Non-negative seconds between two instants, at millisecond precision.
fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let millis = (to - from).num_milliseconds().max(0);
    Decimal::new(millis, 3)
}
