//! Entry point tying configuration, history access and payments together.

use crate::config::{MeterConfig, TESTNET_CHAIN_ID};
use crate::error::{MeterError, Result};
use crate::feed::{HistorySource, TransactionFeed};
use crate::filter::QuantityParser;
use crate::payment::{PaymentAmount, PaymentSubmitter, SubmitOptions, Transfer};
use crate::rate::{PaymentCard, RateSpec};
use crate::subscriptions::{Subscription, SubscriptionConfig};
use std::sync::Arc;
use tracing::info;

/// Configured access to one account's incoming payments.
///
/// Every subscription and feed created here runs its own polling worker
/// against the shared history source.
pub struct Meter {
    config: MeterConfig,
    source: Arc<dyn HistorySource>,
    quantities: QuantityParser,
    submitter: Option<Arc<dyn PaymentSubmitter>>,
}

impl Meter {
    /// Validate `config` and bind it to a history source.
    pub fn new(config: MeterConfig, source: Arc<dyn HistorySource>) -> Result<Self> {
        config.validate()?;
        let quantities = QuantityParser::new(&config.symbol)?;

        info!(account = %config.account, contract = %config.contract, "Meter configured");
        Ok(Self {
            config,
            source,
            quantities,
            submitter: None,
        })
    }

    /// Same as [`Meter::new`] with the test network's chain id.
    pub fn testnet(mut config: MeterConfig, source: Arc<dyn HistorySource>) -> Result<Self> {
        config.chain_id = TESTNET_CHAIN_ID.to_string();
        Self::new(config, source)
    }

    /// Enable [`Meter::pay`].
    pub fn with_submitter(mut self, submitter: Arc<dyn PaymentSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Watch for transfers to the configured account tagged with `filter_tag`.
    pub fn subscription(
        &self,
        filter_tag: impl Into<String>,
        rate: impl Into<RateSpec>,
    ) -> Result<Subscription> {
        let config = SubscriptionConfig::new(filter_tag, self.config.account.clone(), rate.into())
            .with_contract(self.config.contract.clone())
            .with_buffer_size(self.config.event_buffer);
        self.subscription_with(config)
    }

    /// Subscription priced by published payment terms.
    pub fn subscription_for_card(
        &self,
        filter_tag: impl Into<String>,
        card: &PaymentCard,
    ) -> Result<Subscription> {
        let config = SubscriptionConfig::from_card(filter_tag, self.config.account.clone(), card)
            .with_contract(self.config.contract.clone())
            .with_buffer_size(self.config.event_buffer);
        self.subscription_with(config)
    }

    /// Subscription with full control over its settings.
    ///
    /// The feed watches the history of `config.recipient` on `config.contract`.
    pub fn subscription_with(&self, config: SubscriptionConfig) -> Result<Subscription> {
        let mut feed = self.config.feed_config();
        feed.account = config.recipient.clone();
        feed.contract = config.contract.clone();

        Subscription::spawn(Arc::clone(&self.source), feed, config, &self.config.symbol)
    }

    /// Raw stream of every transfer on the configured account.
    pub fn transaction_feed(&self) -> Result<TransactionFeed> {
        TransactionFeed::spawn(Arc::clone(&self.source), self.config.feed_config())
    }

    /// Send `amount` from the configured account to `destination`.
    pub fn pay(
        &self,
        destination: &str,
        amount: impl Into<PaymentAmount>,
        memo: &str,
    ) -> Result<()> {
        let submitter = self.submitter.as_ref().ok_or(MeterError::PaymentsDisabled)?;
        if destination.is_empty() {
            return Err(MeterError::MissingRequiredField("destination"));
        }

        let transfer = Transfer::new(
            &self.quantities,
            &self.config.contract,
            &self.config.account,
            &self.config.permission,
            destination,
            amount.into(),
            memo,
        )?;
        let options = SubmitOptions::for_chain(self.config.chain_id.clone());

        info!(to = %transfer.to, quantity = %transfer.quantity, memo = %transfer.memo, "Submitting payment");
        submitter.submit(&transfer, &options)
    }
}
