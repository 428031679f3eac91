//! In-process fakes for the backend traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::client::{ChangeEvent, ChangeFeed, DataSource, Filter, FilterOp, Query, Subscription};
use crate::errors::AppError;

/// A write the fake received.
#[derive(Debug, Clone)]
pub(crate) struct RecordedWrite {
    pub op: &'static str,
    pub resource: String,
    pub body: Value,
}

/// Table store where unknown tables behave like a missing relation.
#[derive(Default)]
pub(crate) struct FakeSource {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    writes: Mutex<Vec<RecordedWrite>>,
    failure: Mutex<Option<AppError>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), rows);
        self
    }

    /// Make every call fail with `err`.
    pub fn failing(self, err: AppError) -> Self {
        *self.failure.lock().unwrap() = Some(err);
        self
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, resource: &str) -> Result<(), AppError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        if !self.tables.lock().unwrap().contains_key(resource) {
            return Err(AppError::NotFound(format!(
                "relation \"public.{}\" does not exist",
                resource
            )));
        }
        Ok(())
    }

    fn record(&self, op: &'static str, resource: &str, body: &Value) {
        self.writes.lock().unwrap().push(RecordedWrite {
            op,
            resource: resource.to_string(),
            body: body.clone(),
        });
    }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| {
        let Some(cell) = row.get(&f.column) else {
            return false;
        };
        let text = match cell {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match f.op {
            FilterOp::Eq => text == f.value,
            FilterOp::Gte => text >= f.value,
            FilterOp::Lte => text <= f.value,
            FilterOp::Ilike => text
                .to_lowercase()
                .contains(&f.value.trim_matches('%').to_lowercase()),
        }
    })
}

#[async_trait]
impl DataSource for FakeSource {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, AppError> {
        self.check(query.resource())?;
        let mut rows: Vec<Value> = self
            .rows(query.resource())
            .into_iter()
            .filter(|row| matches(row, query.filters()))
            .collect();
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, resource: &str, rows: Value) -> Result<Vec<Value>, AppError> {
        self.record("insert", resource, &rows);
        self.check(resource)?;
        let mut row = rows;
        if let Some(obj) = row.as_object_mut() {
            obj.entry("id")
                .or_insert_with(|| json!(uuid::Uuid::new_v4().to_string()));
            obj.entry("created_at")
                .or_insert_with(|| json!("2025-03-08T12:00:00Z"));
        }
        self.tables
            .lock()
            .unwrap()
            .entry(resource.to_string())
            .or_default()
            .push(row.clone());
        Ok(vec![row])
    }

    async fn update(
        &self,
        resource: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, AppError> {
        self.record("update", resource, &patch);
        self.check(resource)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(resource.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches(row, filters)) {
            if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (k, v) in changes {
                    target.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn upsert(&self, resource: &str, rows: Value) -> Result<Vec<Value>, AppError> {
        self.record("upsert", resource, &rows);
        self.check(resource)?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(resource.to_string()).or_default();
        let id = rows.get("id").cloned();
        match table.iter_mut().find(|r| r.get("id") == id.as_ref()) {
            Some(existing) => *existing = rows.clone(),
            None => table.push(rows.clone()),
        }
        Ok(vec![rows])
    }

    async fn delete(&self, resource: &str, filters: &[Filter]) -> Result<Vec<Value>, AppError> {
        self.record("delete", resource, &Value::Null);
        self.check(resource)?;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(resource.to_string()).or_default();
        let (removed, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|row| matches(row, filters));
        *rows = kept;
        Ok(removed)
    }
}

/// Change feed driven by the test through [`FakeFeed::emit`].
#[derive(Default)]
pub(crate) struct FakeFeed {
    senders: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Subscriptions whose receiving side is still alive.
    pub fn open_subscriptions(&self) -> usize {
        self.senders
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    pub async fn emit(&self, event: ChangeEvent) {
        let senders = self.senders.lock().unwrap().clone();
        for tx in senders {
            let _ = tx.send(event.clone()).await;
        }
    }

    /// Drop every sender, ending all subscriptions.
    pub fn close(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChangeFeed for FakeFeed {
    async fn subscribe(&self, resource: &str) -> Result<Subscription, AppError> {
        let (tx, rx) = mpsc::channel(8);
        self.senders.lock().unwrap().push(tx);
        Ok(Subscription::from_receiver(resource, rx))
    }
}
