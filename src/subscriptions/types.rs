//! Subscription types.

use crate::filter::QuantityPolicy;
use crate::rate::{PaymentCard, RateSpec};
use crate::types::Deposit;
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionConfig {
    /// Memo a transfer must carry to count toward this subscription.
    pub filter_tag: String,

    /// Account transfers must be addressed to.
    pub recipient: String,

    /// Token contract transfers must come from.
    /// Default: "eosio.token"
    pub contract: String,

    pub rate: RateSpec,

    /// Evaluate queries this many seconds ahead of now.
    pub evaluation_advance: Option<u64>,

    /// Milliseconds added to a transfer's block time before it counts.
    pub confirmation_delay: Option<u64>,

    /// Handling of transfers with malformed quantities.
    pub quantity_policy: QuantityPolicy,

    /// Max buffered events before notifications are dropped.
    /// Default: 1000
    pub buffer_size: usize,
}

impl SubscriptionConfig {
    pub fn new(filter_tag: impl Into<String>, recipient: impl Into<String>, rate: RateSpec) -> Self {
        Self {
            filter_tag: filter_tag.into(),
            recipient: recipient.into(),
            contract: "eosio.token".to_string(),
            rate,
            evaluation_advance: None,
            confirmation_delay: None,
            quantity_policy: QuantityPolicy::default(),
            buffer_size: 1000,
        }
    }

    /// Config from published payment terms, including their look-ahead and delay.
    pub fn from_card(
        filter_tag: impl Into<String>,
        recipient: impl Into<String>,
        card: &PaymentCard,
    ) -> Self {
        let mut config = Self::new(filter_tag, recipient, card.rate_spec());
        config.evaluation_advance = card.min_seconds;
        config.confirmation_delay = card.payment_delay;
        config
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = contract.into();
        self
    }

    pub fn with_evaluation_advance(mut self, seconds: u64) -> Self {
        self.evaluation_advance = Some(seconds);
        self
    }

    pub fn with_confirmation_delay(mut self, millis: u64) -> Self {
        self.confirmation_delay = Some(millis);
        self
    }

    pub fn with_quantity_policy(mut self, policy: QuantityPolicy) -> Self {
        self.quantity_policy = policy;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }
}

/// Events emitted by a subscription.
///
/// The channel disconnects once the subscription's feed stops.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    /// History caught up; activity can be trusted from now on. Sent once.
    Synced,

    /// A deposit was credited.
    Update { deposit: Deposit },

    /// A matching transfer could not be credited.
    Rejected { position: u64, reason: String },

    /// The feed failed; no further deposits will be observed.
    Failed { reason: String },
}
