//! History source collaborator.
//!
//! The transport behind a [`HistorySource`] is the caller's business: it
//! may be an RPC client, a fixture, or the in-process [`MemorySource`].
//! Sources are queried by position and return at most `page_size` actions
//! starting there, together with the ledger's current irreversibility marker.

use crate::error::{MeterError, Result};
use crate::types::{ActionRecord, BlockNum};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// A page of account history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionPage {
    /// Blocks at or beyond this one may still be reorganized.
    pub last_irreversible_block: BlockNum,

    /// Actions in history order. Every entry occupies one position,
    /// including entries that are not transfers.
    pub actions: Vec<ActionRecord>,
}

impl ActionPage {
    /// Decode a `history/get_actions` response body.
    ///
    /// Actions without a trace, or whose data carries no transfer fields,
    /// decode with empty text fields so they still occupy their position
    /// and are filtered out downstream.
    pub fn from_json(body: &str) -> Result<Self> {
        let raw: RawPage = serde_json::from_str(body)?;

        let actions = raw
            .actions
            .into_iter()
            .map(|action| {
                let (contract, action_name, data) = match action.action_trace {
                    Some(trace) => (trace.act.account, trace.act.name, trace.act.data),
                    None => (String::new(), String::new(), Value::Null),
                };
                let field = |name: &str| {
                    data.get(name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };

                ActionRecord {
                    position: action.account_action_seq.unwrap_or_default(),
                    block: BlockNum(action.block_num),
                    block_time: action.block_time,
                    action_name,
                    contract,
                    sender: field("from"),
                    recipient: field("to"),
                    quantity: field("quantity"),
                    memo: field("memo"),
                }
            })
            .collect();

        Ok(Self {
            last_irreversible_block: BlockNum(raw.last_irreversible_block),
            actions,
        })
    }
}

#[derive(Deserialize)]
struct RawPage {
    last_irreversible_block: u64,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(default)]
    account_action_seq: Option<u64>,
    block_num: u64,
    #[serde(default)]
    block_time: String,
    #[serde(default)]
    action_trace: Option<RawTrace>,
}

#[derive(Deserialize)]
struct RawTrace {
    act: RawAct,
}

#[derive(Deserialize)]
struct RawAct {
    account: String,
    name: String,
    #[serde(default)]
    data: Value,
}

/// Queryable account history.
pub trait HistorySource: Send + Sync {
    /// Fetch up to `page_size` actions of `account` starting at `position`.
    ///
    /// Blocking. Failures should be reported as
    /// [`MeterError::TransportFailure`]; the feed does not retry.
    fn get_actions(&self, account: &str, position: u64, page_size: u32) -> Result<ActionPage>;
}

impl<T: HistorySource + ?Sized> HistorySource for Arc<T> {
    fn get_actions(&self, account: &str, position: u64, page_size: u32) -> Result<ActionPage> {
        (**self).get_actions(account, position, page_size)
    }
}

#[derive(Default)]
struct MemoryHistory {
    actions: Vec<ActionRecord>,
    last_irreversible_block: BlockNum,
    fail_next: Option<String>,
    queries: u64,
}

/// In-process history for a single account.
///
/// Serves pages the way a remote history endpoint does; the account name
/// passed to queries is not checked.
#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<MemoryHistory>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action; returns its position.
    pub fn push(&self, mut record: ActionRecord) -> u64 {
        let mut inner = self.inner.lock();
        let position = inner.actions.len() as u64;
        record.position = position;
        inner.actions.push(record);
        position
    }

    /// Append several actions included in the same block.
    pub fn push_block(&self, block: BlockNum, block_time: &str, records: Vec<ActionRecord>) {
        for record in records {
            self.push(record.in_block(block, block_time));
        }
    }

    /// Move the irreversibility marker.
    pub fn set_last_irreversible(&self, block: BlockNum) {
        self.inner.lock().last_irreversible_block = block;
    }

    /// Make the next query fail with a transport error.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.inner.lock().fail_next = Some(reason.into());
    }

    /// Number of actions held.
    pub fn len(&self) -> usize {
        self.inner.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().actions.is_empty()
    }

    /// Number of queries served so far, failed ones included.
    pub fn queries(&self) -> u64 {
        self.inner.lock().queries
    }
}

impl HistorySource for MemorySource {
    fn get_actions(&self, _account: &str, position: u64, page_size: u32) -> Result<ActionPage> {
        let mut inner = self.inner.lock();
        inner.queries += 1;

        if let Some(reason) = inner.fail_next.take() {
            return Err(MeterError::TransportFailure(reason));
        }

        let len = inner.actions.len();
        let start = usize::try_from(position).unwrap_or(len).min(len);
        let end = start.saturating_add(page_size as usize).min(len);

        Ok(ActionPage {
            last_irreversible_block: inner.last_irreversible_block,
            actions: inner.actions[start..end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "last_irreversible_block": 1200,
        "actions": [
            {
                "global_action_seq": 9001,
                "account_action_seq": 0,
                "block_num": 1100,
                "block_time": "2019-05-01T12:00:00.500",
                "action_trace": {
                    "act": {
                        "account": "eosio.token",
                        "name": "transfer",
                        "data": {"from": "bob", "to": "alice", "quantity": "1.0000 EOS", "memo": "sub-1"}
                    }
                }
            },
            {
                "account_action_seq": 1,
                "block_num": 1101,
                "block_time": "2019-05-01T12:00:01.000",
                "action_trace": {
                    "act": {"account": "eosio", "name": "buyrambytes", "data": "0a1b2c"}
                }
            },
            {
                "account_action_seq": 2,
                "block_num": 1102,
                "block_time": "2019-05-01T12:00:01.500"
            }
        ]
    }"#;

    #[test]
    fn test_decode_history_response() {
        let page = ActionPage::from_json(RESPONSE).unwrap();

        assert_eq!(page.last_irreversible_block, BlockNum(1200));
        assert_eq!(page.actions.len(), 3);

        let transfer = &page.actions[0];
        assert_eq!(transfer.block, BlockNum(1100));
        assert_eq!(transfer.action_name, "transfer");
        assert_eq!(transfer.contract, "eosio.token");
        assert_eq!(transfer.sender, "bob");
        assert_eq!(transfer.recipient, "alice");
        assert_eq!(transfer.quantity, "1.0000 EOS");
        assert_eq!(transfer.memo, "sub-1");

        let other = &page.actions[1];
        assert_eq!(other.action_name, "buyrambytes");
        assert!(other.recipient.is_empty());

        let untraced = &page.actions[2];
        assert_eq!(untraced.position, 2);
        assert!(untraced.action_name.is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        let result = ActionPage::from_json("{\"actions\": []}");
        assert!(matches!(result, Err(MeterError::Decode(_))));
    }

    #[test]
    fn test_memory_source_pages() {
        let source = MemorySource::new();
        for i in 0..5 {
            source.push(
                ActionRecord::transfer("eosio.token", "bob", "alice", "1.0000 EOS", "x")
                    .in_block(BlockNum(i), "2019-05-01T12:00:00"),
            );
        }
        source.set_last_irreversible(BlockNum(3));

        let page = source.get_actions("alice", 1, 3).unwrap();
        assert_eq!(page.last_irreversible_block, BlockNum(3));
        let positions: Vec<_> = page.actions.iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);

        assert!(source.get_actions("alice", 5, 3).unwrap().actions.is_empty());
        assert!(source.get_actions("alice", 50, 3).unwrap().actions.is_empty());
        assert_eq!(source.queries(), 3);
    }

    #[test]
    fn test_memory_source_failure_is_one_shot() {
        let source = MemorySource::new();
        source.fail_next("connection reset");

        assert!(matches!(
            source.get_actions("alice", 0, 10),
            Err(MeterError::TransportFailure(_))
        ));
        assert!(source.get_actions("alice", 0, 10).is_ok());
    }
}
