//! Persistence contract consumed by the sync jobs.
//!
//! Collections hold JSON documents. Filters are conjunctions of field
//! equalities; `aggregate` runs a small pipeline of stages over a collection.
//! Any backend that can load and save documents satisfies the contract by
//! reusing [`apply_pipeline`] and [`merge_document`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

pub type Document = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or failing; aborts the running job
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Conjunction of `field == value` conditions; empty matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| doc.get(field).is_some_and(|v| values_equal(v, value)))
    }

    /// Stable identity for a document addressed by this filter, e.g. `url_name=ash_prime_set`
    pub fn key(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(field, value)| match value {
                Value::String(s) => format!("{}={}", field, s),
                other => format!("{}={}", field, other),
            })
            .collect();
        Some(parts.join("&"))
    }

    /// `LIKE` pattern (escape `\\`) matching every key built from the same fields
    pub fn key_pattern(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|(field, _)| {
                let escaped = field.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
                format!("{}=%", escaped)
            })
            .collect();
        Some(parts.join("&"))
    }

    fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// One aggregation pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort(Sort),
    Skip(usize),
    Limit(usize),
    /// Keep only the named fields
    Project(Vec<String>),
    /// Replace documents with `{ "_id": value, "count": n }` per distinct value of `field`
    GroupCount(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError>;

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert `data` or merge it field-by-field into the document matching `filter`.
    /// Fields absent from `data` are preserved.
    async fn upsert(&self, collection: &str, filter: &Filter, data: Document) -> Result<UpsertOutcome, StoreError>;

    /// Remove matching documents, returning how many were removed
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError>;
}

/// Convert a JSON object into a document; any other value yields an empty document
pub fn into_document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Merge `data` into `existing`; filter fields are written too so lookups keep matching
pub fn merge_document(existing: &mut Document, filter: &Filter, data: Document) {
    for (field, value) in filter.conditions() {
        existing.insert(field.clone(), value.clone());
    }
    for (field, value) in data {
        existing.insert(field, value);
    }
}

pub fn apply_pipeline(mut docs: Vec<Document>, pipeline: &[Stage]) -> Vec<Document> {
    for stage in pipeline {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Sort(sort) => {
                sort_documents(&mut docs, sort);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Project(fields) => docs
                .into_iter()
                .map(|d| {
                    d.into_iter()
                        .filter(|(k, _)| fields.iter().any(|f| f == k))
                        .collect()
                })
                .collect(),
            Stage::GroupCount(field) => group_count(&docs, field),
        };
    }
    docs
}

pub fn sort_documents(docs: &mut [Document], sort: &Sort) {
    // null and missing values stay last in both directions
    let field = |d: &Document| d.get(&sort.field).filter(|v| !v.is_null()).cloned();
    docs.sort_by(|a, b| {
        let (a, b) = (field(a), field(b));
        let ordering = compare_values(a.as_ref(), b.as_ref());
        match (sort.order, &a, &b) {
            (SortOrder::Desc, Some(_), Some(_)) => ordering.reverse(),
            _ => ordering,
        }
    });
}

fn group_count(docs: &[Document], field: &str) -> Vec<Document> {
    let mut counts: BTreeMap<String, (Value, u64)> = BTreeMap::new();
    for doc in docs {
        let value = doc.get(field).cloned().unwrap_or(Value::Null);
        let entry = counts.entry(value.to_string()).or_insert((value, 0));
        entry.1 += 1;
    }

    counts
        .into_values()
        .map(|(value, count)| {
            let mut group = Document::new();
            group.insert("_id".to_string(), value);
            group.insert("count".to_string(), Value::from(count));
            group
        })
        .collect()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (x, y) => x.to_string().cmp(&y.to_string()),
        },
    }
}

/// Call counters, used to assert on write traffic
#[derive(Debug, Default)]
pub struct StoreCalls {
    pub upserts: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl StoreCalls {
    pub fn upserts(&self) -> usize {
        self.upserts.load(AtomicOrdering::Relaxed)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(AtomicOrdering::Relaxed)
    }
}

/// In-process store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    calls: StoreCalls,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &StoreCalls {
        &self.calls
    }

    fn with_collection<R>(&self, collection: &str, f: impl FnOnce(&mut Vec<Document>) -> R) -> R {
        let mut collections = self.collections.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(collections.entry(collection.to_string()).or_default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Ok(self.with_collection(collection, |docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut found: Vec<Document> =
            self.with_collection(collection, |docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect());
        if let Some(sort) = sort {
            sort_documents(&mut found, sort);
        }
        Ok(found)
    }

    async fn upsert(&self, collection: &str, filter: &Filter, data: Document) -> Result<UpsertOutcome, StoreError> {
        if filter.is_empty() {
            return Err(StoreError::InvalidDocument("upsert requires a non-empty filter".to_string()));
        }
        self.calls.upserts.fetch_add(1, AtomicOrdering::Relaxed);

        Ok(self.with_collection(collection, |docs| match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(existing) => {
                merge_document(existing, filter, data);
                UpsertOutcome::Updated
            }
            None => {
                let mut doc = Document::new();
                merge_document(&mut doc, filter, data);
                docs.push(doc);
                UpsertOutcome::Inserted
            }
        }))
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.calls.deletes.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(self.with_collection(collection, |docs| {
            let before = docs.len();
            docs.retain(|d| !filter.matches(d));
            (before - docs.len()) as u64
        }))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.with_collection(collection, |docs| docs.iter().filter(|d| filter.matches(d)).count() as u64))
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        let docs = self.with_collection(collection, |docs| docs.clone());
        Ok(apply_pipeline(docs, pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (name, plat, group) in [("a", 30, "primary"), ("b", 10, "melee"), ("c", 20, "primary")] {
            store
                .upsert("rivens", &Filter::eq("url_name", name), doc(json!({"plat": plat, "group": group})))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_merges() {
        let store = MemoryStore::new();
        let filter = Filter::eq("url_name", "ash_prime_set");

        let first = store
            .upsert("items", &filter, doc(json!({"item_name": "Ash Prime Set", "buy": 100})))
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);

        let second = store
            .upsert("items", &filter, doc(json!({"item_name": "Ash Prime Set", "enriched": true})))
            .await
            .unwrap();
        assert_eq!(second, UpsertOutcome::Updated);

        let stored = store.find_one("items", &filter).await.unwrap().unwrap();
        assert_eq!(stored["buy"], 100);
        assert_eq!(stored["enriched"], true);
        assert_eq!(stored["url_name"], "ash_prime_set");
        assert_eq!(store.count("items", &Filter::all()).await.unwrap(), 1);
        assert_eq!(store.calls().upserts(), 2);
    }

    #[tokio::test]
    async fn test_find_many_sorted_and_delete() {
        let store = seeded().await;

        let sorted = store
            .find_many("rivens", &Filter::all(), Some(&Sort::desc("plat")))
            .await
            .unwrap();
        let names: Vec<&str> = sorted.iter().map(|d| d["url_name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);

        assert_eq!(store.delete("rivens", &Filter::eq("url_name", "b")).await.unwrap(), 1);
        assert_eq!(store.count("rivens", &Filter::all()).await.unwrap(), 2);
        assert_eq!(store.delete("rivens", &Filter::eq("url_name", "zzz")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aggregate_pipeline() {
        let store = seeded().await;

        let top = store
            .aggregate(
                "rivens",
                &[
                    Stage::Match(Filter::eq("group", "primary")),
                    Stage::Sort(Sort::asc("plat")),
                    Stage::Limit(1),
                    Stage::Project(vec!["url_name".to_string()]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(top, vec![doc(json!({"url_name": "c"}))]);

        let groups = store
            .aggregate("rivens", &[Stage::GroupCount("group".to_string())])
            .await
            .unwrap();
        assert_eq!(groups.len(), 2);
        let primary = groups.iter().find(|g| g["_id"] == "primary").unwrap();
        assert_eq!(primary["count"], 2);

        let skipped = store
            .aggregate("rivens", &[Stage::Sort(Sort::asc("plat")), Stage::Skip(2)])
            .await
            .unwrap();
        assert_eq!(skipped[0]["url_name"], "a");
    }

    #[test]
    fn test_sort_keeps_missing_last() {
        let mut docs = vec![doc(json!({"n": 1})), doc(json!({})), doc(json!({"n": null})), doc(json!({"n": 5}))];
        sort_documents(&mut docs, &Sort::desc("n"));
        assert_eq!(docs[0]["n"], 5);
        assert_eq!(docs[1]["n"], 1);

        sort_documents(&mut docs, &Sort::asc("n"));
        assert_eq!(docs[0]["n"], 1);
        assert!(docs[3].get("n").map_or(true, Value::is_null));
    }

    #[test]
    fn test_filter_key_and_numeric_equality() {
        assert_eq!(Filter::eq("url_name", "x").key().as_deref(), Some("url_name=x"));
        assert_eq!(Filter::all().key(), None);
        assert_eq!(
            Filter::eq("url_name", "x").and("rank", 3).key_pattern().as_deref(),
            Some(r"url\_name=%&rank=%")
        );
        assert!(Filter::eq("n", 2.0).matches(&doc(json!({"n": 2}))));
    }

    #[tokio::test]
    async fn test_upsert_requires_filter() {
        let store = MemoryStore::new();
        let err = store.upsert("items", &Filter::all(), Document::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }
}
