//! Error handling and edge case tests.

use paymeter::{
    ActionPage, BlockNum, HistorySource, MemorySource, Meter, MeterConfig, MeterError,
    PaymentCard, RateSpec, RateUnit, Result, SubscriptionConfig, SubscriptionEvent,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn meter() -> Meter {
    let mut config = MeterConfig::new("alice");
    config.poll_interval_ms = 20;
    Meter::new(config, Arc::new(MemorySource::new()) as Arc<dyn HistorySource>).unwrap()
}

/// Serves a fixed JSON body, the way an RPC-backed source would.
struct JsonSource {
    body: String,
}

impl HistorySource for JsonSource {
    fn get_actions(&self, _account: &str, position: u64, _page_size: u32) -> Result<ActionPage> {
        if position > 0 {
            return ActionPage::from_json(r#"{"last_irreversible_block": 1, "actions": []}"#);
        }
        ActionPage::from_json(&self.body)
    }
}

/// Always fails.
struct DownSource;

impl HistorySource for DownSource {
    fn get_actions(&self, _account: &str, _position: u64, _page_size: u32) -> Result<ActionPage> {
        Err(MeterError::TransportFailure("connection reset".into()))
    }
}

// --- Configuration Errors ---

#[test]
fn test_missing_account() {
    let result = Meter::new(MeterConfig::new(""), Arc::new(MemorySource::new()) as Arc<dyn HistorySource>);
    assert!(matches!(result, Err(MeterError::MissingRequiredField("account"))));
}

#[test]
fn test_zero_page_size() {
    let mut config = MeterConfig::new("alice");
    config.page_size = 0;
    let result = Meter::new(config, Arc::new(MemorySource::new()) as Arc<dyn HistorySource>);
    assert!(matches!(result, Err(MeterError::InvalidConfig(_))));
}

#[test]
fn test_config_from_json() {
    let config: MeterConfig =
        serde_json::from_str(r#"{"account": "alice", "irreversible": true}"#).unwrap();
    assert!(config.irreversible);
    assert_eq!(config.contract, "eosio.token");
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_recipient() {
    let result = meter().subscription_with(SubscriptionConfig::new(
        "tag",
        "",
        RateSpec::literal("1.0000 EOS/s"),
    ));
    assert!(matches!(result, Err(MeterError::MissingRequiredField("recipient"))));
}

#[test]
fn test_zero_buffer() {
    let result = meter().subscription_with(
        SubscriptionConfig::new("tag", "alice", "1.0000 EOS/s".into()).with_buffer_size(0),
    );
    assert!(matches!(result, Err(MeterError::InvalidConfig(_))));
}

#[test]
fn test_oversized_confirmation_delay() {
    let source = Arc::new(MemorySource::new());
    source.push(
        paymeter::ActionRecord::transfer("eosio.token", "bob", "alice", "1.0000 EOS", "tag")
            .in_block(BlockNum(1), "2019-05-01T12:00:00"),
    );
    let meter = Meter::new(MeterConfig::new("alice"), source.clone() as Arc<dyn HistorySource>).unwrap();

    let result = meter.subscription_with(
        SubscriptionConfig::new("tag", "alice", "1.0000 EOS/s".into())
            .with_confirmation_delay(9_000_000_000_000_000),
    );
    assert!(matches!(result, Err(MeterError::InvalidConfig(_))));

    let card: PaymentCard = serde_json::from_str(
        r#"{"amount": 1, "interval": 1, "unit": "seconds", "paymentDelay": 9000000000000000}"#,
    )
    .unwrap();
    assert!(matches!(
        meter.subscription_for_card("tag", &card),
        Err(MeterError::InvalidConfig(_))
    ));
    assert_eq!(source.queries(), 0);
}

// --- Rate Errors ---

#[test]
fn test_invalid_rate_literals() {
    let meter = meter();
    for literal in ["", "EOS/s", "1.0000 EOS", "1.0000 EOS/min", "1.0000 BTC/s", "-1 EOS/s", "0 EOS/s"] {
        assert!(
            matches!(meter.subscription("tag", literal), Err(MeterError::InvalidRateSpec(_))),
            "{:?} should be rejected",
            literal
        );
    }
}

#[test]
fn test_invalid_structured_rate() {
    let meter = meter();

    let zero_amount = RateSpec::structured(Decimal::ZERO, Decimal::ONE, RateUnit::Seconds);
    assert!(matches!(meter.subscription("tag", zero_amount), Err(MeterError::InvalidRateSpec(_))));

    let negative = RateSpec::structured(-Decimal::ONE, -Decimal::ONE, RateUnit::Minutes);
    assert!(matches!(meter.subscription("tag", negative), Err(MeterError::InvalidRateSpec(_))));

    let zero_interval = RateSpec::structured(Decimal::ONE, Decimal::ZERO, RateUnit::Hours);
    assert!(matches!(
        meter.subscription("tag", zero_interval),
        Err(MeterError::InvalidRateSpec(_))
    ));
}

#[test]
fn test_card_subscription() {
    let card: PaymentCard = serde_json::from_str(
        r#"{"amount": 1, "interval": 1, "unit": "hours", "minSeconds": 30, "paymentDelay": 500}"#,
    )
    .unwrap();
    let sub = meter().subscription_for_card("tag", &card).unwrap();
    assert_eq!(sub.rate().as_decimal(), Decimal::ONE / Decimal::from(3600));
}

// --- Runtime Errors ---

#[test]
fn test_transport_failure_stops_subscription() {
    let meter = Meter::new(MeterConfig::new("alice"), Arc::new(DownSource) as Arc<dyn HistorySource>).unwrap();
    let sub = meter.subscription("tag", "1.0000 EOS/s").unwrap();

    match sub.recv_timeout(TIMEOUT).unwrap() {
        SubscriptionEvent::Failed { reason } => {
            assert!(reason.contains("connection reset"));
        }
        other => panic!("Expected Failed, got {:?}", other),
    }
    // Worker is gone; the channel disconnects.
    assert!(sub.recv_timeout(TIMEOUT).is_err());
    assert!(!sub.active());
}

#[test]
fn test_undecodable_response() {
    let meter = Meter::new(
        MeterConfig::new("alice"),
        Arc::new(JsonSource { body: "<html>502</html>".into() }) as Arc<dyn HistorySource>,
    )
    .unwrap();
    let sub = meter.subscription("tag", "1.0000 EOS/s").unwrap();

    match sub.recv_timeout(TIMEOUT).unwrap() {
        SubscriptionEvent::Failed { reason } => assert!(reason.starts_with("Decode error")),
        other => panic!("Expected Failed, got {:?}", other),
    }
}

#[test]
fn test_bad_block_time_is_rejected() {
    let body = r#"{
        "last_irreversible_block": 9,
        "actions": [
            {
                "account_action_seq": 0,
                "block_num": 7,
                "block_time": "yesterday",
                "action_trace": {
                    "act": {
                        "account": "eosio.token",
                        "name": "transfer",
                        "data": {"from": "bob", "to": "alice", "quantity": "1.0000 EOS", "memo": "tag"}
                    }
                }
            }
        ]
    }"#;
    let source = JsonSource { body: body.to_string() };
    let page = source.get_actions("alice", 0, 30).unwrap();
    assert_eq!(page.actions[0].block, BlockNum(7));

    let mut config = MeterConfig::new("alice");
    config.poll_interval_ms = 20;
    let meter = Meter::new(config, Arc::new(source) as Arc<dyn HistorySource>).unwrap();
    let sub = meter.subscription("tag", "1.0000 EOS/s").unwrap();

    match sub.recv_timeout(TIMEOUT).unwrap() {
        SubscriptionEvent::Rejected { position, reason } => {
            assert_eq!(position, 0);
            assert!(reason.contains("yesterday"));
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }
    assert_eq!(sub.recv_timeout(TIMEOUT).unwrap(), SubscriptionEvent::Synced);
    assert_eq!(sub.deposit_count(), 0);
}

#[test]
fn test_full_buffer_drops_notifications_not_deposits() {
    let source = Arc::new(MemorySource::new());
    for block in 1..=5 {
        source.push(
            paymeter::ActionRecord::transfer("eosio.token", "bob", "alice", "1.0000 EOS", "tag")
                .in_block(BlockNum(block), "2019-05-01T12:00:00"),
        );
    }

    let mut config = MeterConfig::new("alice");
    config.poll_interval_ms = 20;
    let meter = Meter::new(config, source.clone() as Arc<dyn HistorySource>).unwrap();
    let sub = meter
        .subscription_with(
            SubscriptionConfig::new("tag", "alice", "1.0000 EOS/s".into()).with_buffer_size(1),
        )
        .unwrap();

    let deadline = std::time::Instant::now() + TIMEOUT;
    while sub.dropped_notifications() < 5 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(sub.is_synced());
    assert_eq!(sub.deposit_count(), 5);
    // One update fits; the other four updates and the sync notice are dropped.
    assert_eq!(sub.dropped_notifications(), 5);
    assert!(matches!(sub.try_recv(), Ok(SubscriptionEvent::Update { .. })));
}

#[test]
fn test_payment_errors() {
    let meter = meter();
    assert!(matches!(
        meter.pay("bob", Decimal::ONE, "memo"),
        Err(MeterError::PaymentsDisabled)
    ));
}
