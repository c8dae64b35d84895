//! In-memory Salesforce double shared by unit tests here and integration tests downstream.
//!
//! Enabled for dependents through the `test-support` feature.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use impltrack_core::errors::{GatewayError, GatewayResult, UpstreamError};
use serde_json::Value;

use crate::client::{CreatedRecord, QueryResult, Record, SalesforceApi};

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    Query(String),
    Get { object: String, id: String, fields: Vec<String> },
    Create { object: String, fields: Record },
    Update { object: String, id: String, fields: Record },
}

#[derive(Default)]
struct FakeState {
    query_rules: Vec<(String, Vec<Record>)>,
    records: HashMap<String, Record>,
    calls: Vec<RecordedCall>,
    create_failures: Option<(usize, GatewayError)>,
    next_id: u64,
}

/// Answers queries from substring rules and serves records from a map.
///
/// Queries matching no rule return zero rows. Unknown record ids answer 404.
#[derive(Default)]
pub struct FakeSalesforce {
    state: Mutex<FakeState>,
}

impl FakeSalesforce {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rows returned for any query containing `fragment`. Earlier rules win.
    pub fn on_query(&self, fragment: &str, rows: Vec<Value>) {
        let rows = rows.into_iter().filter_map(into_record).collect();
        self.state().query_rules.push((fragment.to_string(), rows));
    }

    pub fn with_record(&self, id: &str, fields: Value) {
        let mut record = into_record(fields).unwrap_or_default();
        record.entry("Id").or_insert_with(|| Value::String(id.to_string()));
        self.state().records.insert(id.to_string(), record);
    }

    /// Makes the next `count` creates fail with `error`.
    pub fn fail_creates(&self, count: usize, error: GatewayError) {
        self.state().create_failures = Some((count, error));
    }

    pub fn record(&self, id: &str) -> Option<Record> {
        self.state().records.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn query_count(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Query(_)))
    }

    pub fn get_count(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Get { .. }))
    }

    pub fn create_count(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Create { .. }))
    }

    pub fn update_count(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Update { .. }))
    }

    /// Create and update calls, in order.
    pub fn writes(&self) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| {
                matches!(call, RecordedCall::Create { .. } | RecordedCall::Update { .. })
            })
            .cloned()
            .collect()
    }

    fn count(&self, predicate: impl Fn(&RecordedCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }
}

fn into_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn not_found(id: &str) -> GatewayError {
    UpstreamError::status(
        404,
        format!("[{{\"errorCode\":\"NOT_FOUND\",\"message\":\"The requested resource does not exist: {id}\"}}]"),
    )
    .into()
}

#[async_trait]
impl SalesforceApi for FakeSalesforce {
    async fn query(&self, soql: &str) -> GatewayResult<QueryResult> {
        let mut state = self.state();
        state.calls.push(RecordedCall::Query(soql.to_string()));
        let records = state
            .query_rules
            .iter()
            .find(|(fragment, _)| soql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        Ok(QueryResult { total_size: records.len() as u64, done: true, records })
    }

    async fn get_record(&self, object: &str, id: &str, fields: &[&str]) -> GatewayResult<Record> {
        let mut state = self.state();
        state.calls.push(RecordedCall::Get {
            object: object.to_string(),
            id: id.to_string(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        });
        let record = state.records.get(id).ok_or_else(|| not_found(id))?;
        if fields.is_empty() {
            return Ok(record.clone());
        }
        Ok(record
            .iter()
            .filter(|(key, _)| fields.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn create_record(&self, object: &str, fields: &Record) -> GatewayResult<CreatedRecord> {
        let mut state = self.state();
        state
            .calls
            .push(RecordedCall::Create { object: object.to_string(), fields: fields.clone() });
        if let Some((remaining, error)) = state.create_failures.take() {
            if remaining > 1 {
                state.create_failures = Some((remaining - 1, error.clone()));
            }
            if remaining > 0 {
                return Err(error);
            }
        }

        state.next_id += 1;
        let id = format!("a0Hfake{:011}", state.next_id);
        let mut stored = fields.clone();
        stored.insert("Id".to_string(), Value::String(id.clone()));
        state.records.insert(id.clone(), stored);
        Ok(CreatedRecord { id })
    }

    async fn update_record(&self, object: &str, id: &str, fields: &Record) -> GatewayResult<()> {
        let mut state = self.state();
        state.calls.push(RecordedCall::Update {
            object: object.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
        });
        let record = state.records.get_mut(id).ok_or_else(|| not_found(id))?;
        for (key, value) in fields {
            record.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
