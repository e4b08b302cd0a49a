use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::label::{Label, RawLabelRecord};
use crate::services::auth::Session;
use crate::services::dedup::canonical_key;
use crate::services::store::{Insertion, LabelStore};

/// Classification of one upload batch.
///
/// `new_count + duplicate_count == total_processed`. Records whose
/// persistence failed are reported in `failures` and are not part of
/// `total_processed`: they were never classified.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub new_labels: Vec<Label>,
    pub duplicate_labels: Vec<Label>,
    pub total_processed: usize,
    pub new_count: usize,
    pub duplicate_count: usize,
    pub failed_count: usize,
    pub failures: Vec<RecordFailure>,
    pub warnings: Vec<RecordWarning>,
}

/// A record that could not be stored. Not retried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordFailure {
    pub index: usize,
    pub dedup_key: String,
    pub message: String,
}

/// A field that failed validation. The record is still classified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordWarning {
    pub index: usize,
    pub field: String,
    pub message: String,
}

impl BatchResult {
    fn push_new(&mut self, label: Label) {
        self.new_labels.push(label);
        self.new_count += 1;
        self.total_processed += 1;
    }

    fn push_duplicate(&mut self, label: Label) {
        self.duplicate_labels.push(label);
        self.duplicate_count += 1;
        self.total_processed += 1;
    }

    fn push_failure(&mut self, failure: RecordFailure) {
        self.failures.push(failure);
        self.failed_count += 1;
    }
}

/// Classify and persist a batch of uploaded records, in input order.
///
/// Each record is normalized, validated (violations become warnings), keyed,
/// and handed to the store's atomic insert-if-absent. A store failure fails
/// that record only; later records are still processed.
pub async fn ingest(
    store: &dyn LabelStore,
    records: Vec<RawLabelRecord>,
    session: &Session,
) -> BatchResult {
    let mut result = BatchResult::default();
    let batch_size = records.len();

    for (index, raw) in records.into_iter().enumerate() {
        for key in raw.ignored_keys() {
            result.warnings.push(RecordWarning {
                index,
                field: key.clone(),
                message: "key uses the other naming convention and was ignored".to_string(),
            });
        }
        let canonical = raw.normalize();

        if let Err(report) = canonical.validate() {
            for (path, error) in report.iter() {
                result.warnings.push(RecordWarning {
                    index,
                    field: path.to_string(),
                    message: error.message().to_string(),
                });
            }
        }

        let key = canonical_key(&canonical);
        let new_label = canonical.into_new_label(key.clone(), Some(session.user_id));

        match store.insert_if_absent(new_label).await {
            Ok(Insertion::Created(label)) => {
                tracing::debug!(index, label_id = %label.id, dedup_key = %key, "Label created");
                metrics::counter!("labels_ingested_total", "outcome" => "new").increment(1);
                result.push_new(label);
            }
            Ok(Insertion::Existing(label)) => {
                tracing::debug!(index, label_id = %label.id, dedup_key = %key, "Duplicate label");
                metrics::counter!("labels_ingested_total", "outcome" => "duplicate").increment(1);
                result.push_duplicate(label);
            }
            Err(e) => {
                tracing::warn!(index, dedup_key = %key, error = %e, "Failed to persist label");
                metrics::counter!("labels_ingested_total", "outcome" => "failed").increment(1);
                result.push_failure(RecordFailure {
                    index,
                    dedup_key: key,
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        user_id = %session.user_id,
        batch_size,
        new = result.new_count,
        duplicate = result.duplicate_count,
        failed = result.failed_count,
        warnings = result.warnings.len(),
        "Batch ingested"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::api::LabelFilter;
    use crate::models::label::{LabelStatus, NewLabel};
    use crate::services::auth::Role;
    use crate::services::store::StoreError;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    fn operator() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            role: Role::Operator,
        }
    }

    fn records(values: serde_json::Value) -> Vec<RawLabelRecord> {
        serde_json::from_value(values).unwrap()
    }

    fn channel() -> serde_json::Value {
        json!({
            "heat": "C103262",
            "mill": "MM",
            "section": "CHANNEL 75*40*4.8",
            "grade": "IS 2062 EZSOBR",
            "bundle": "1",
            "unit": "MM"
        })
    }

    /// Fails every insert whose heat number matches.
    struct FailingStore {
        inner: MemoryStore,
        poisoned_heat: &'static str,
    }

    #[async_trait]
    impl LabelStore for FailingStore {
        async fn insert_if_absent(&self, label: NewLabel) -> Result<Insertion, StoreError> {
            if label.heat_no == self.poisoned_heat {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.insert_if_absent(label).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Label>, StoreError> {
            LabelStore::get(&self.inner, id).await
        }

        async fn list(&self, filter: &LabelFilter) -> Result<Vec<Label>, StoreError> {
            LabelStore::list(&self.inner, filter).await
        }

        async fn set_status(
            &self,
            id: Uuid,
            status: LabelStatus,
            printed_at: Option<DateTime<Utc>>,
        ) -> Result<(), StoreError> {
            self.inner.set_status(id, status, printed_at).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_channel_scenario_new_then_duplicate() {
        let store = MemoryStore::new();
        let session = operator();

        let first = ingest(&store, records(json!([channel()])), &session).await;
        assert_eq!((first.new_count, first.duplicate_count), (1, 0));
        assert_eq!(first.new_labels[0].status, LabelStatus::Pending);
        assert!(!first.new_labels[0].is_duplicate);

        let second = ingest(&store, records(json!([channel()])), &session).await;
        assert_eq!((second.new_count, second.duplicate_count), (0, 1));
        assert_eq!(second.duplicate_labels[0], first.new_labels[0]);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let store = MemoryStore::new();
        let session = operator();
        let batch = json!([
            { "HEAT_NO": "A1", "MILL": "MM", "SECTION": "S", "GRADE": "G", "BUNDLE_NOS": 1 },
            { "HEAT_NO": "A1", "MILL": "MM", "SECTION": "S", "GRADE": "G", "BUNDLE_NOS": 2 },
            { "heat_no": "B7", "mill": "WRM", "section": "S", "grade": "G", "bundle_no": "1" }
        ]);

        let first = ingest(&store, records(batch.clone()), &session).await;
        assert_eq!(first.new_count, 3);

        let second = ingest(&store, records(batch), &session).await;
        assert_eq!(second.new_count, 0);
        assert_eq!(second.duplicate_count, 3);
        assert_eq!(second.total_processed, second.new_count + second.duplicate_count);
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch_keeps_order() {
        let store = MemoryStore::new();
        let batch = json!([
            { "heat_no": "H1", "bundle_no": "1", "date": "04-MAR-24" },
            { "heat_no": "H2", "bundle_no": "1" },
            { "heat_no": "H1", "bundle_no": "1", "date": "05-MAR-24" },
            { "heat_no": "H3", "bundle_no": "1" }
        ]);

        let result = ingest(&store, records(batch), &operator()).await;

        let heats: Vec<&str> = result.new_labels.iter().map(|l| l.heat_no.as_str()).collect();
        assert_eq!(heats, vec!["H1", "H2", "H3"]);
        assert_eq!(result.duplicate_labels.len(), 1);
        assert_eq!(result.duplicate_labels[0].date, "04-MAR-24");
    }

    #[tokio::test]
    async fn test_persistence_failure_is_isolated() {
        let store = FailingStore {
            inner: MemoryStore::new(),
            poisoned_heat: "BAD",
        };
        let batch = json!([
            { "heat_no": "H1", "bundle_no": "1" },
            { "heat_no": "BAD", "bundle_no": "1" },
            { "heat_no": "H2", "bundle_no": "1" }
        ]);

        let result = ingest(&store, records(batch), &operator()).await;

        assert_eq!(result.new_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.total_processed, 2);
        assert_eq!(result.failures[0].index, 1);
        assert!(result.failures[0].message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_validation_problems_are_warnings() {
        let store = MemoryStore::new();
        let batch = json!([{ "heat_no": "H1", "length": "twelve" }]);

        let result = ingest(&store, records(batch), &operator()).await;

        assert_eq!(result.new_count, 1);
        assert!(result.warnings.iter().any(|w| w.field == "length"));
        assert!(result.warnings.iter().all(|w| w.index == 0));
    }

    #[tokio::test]
    async fn test_mixed_naming_reports_dropped_keys() {
        let store = MemoryStore::new();
        let batch = json!([{ "HEAT_NO": "H1", "mill": "MM", "bundle_no": "1" }]);

        let result = ingest(&store, records(batch), &operator()).await;

        assert_eq!(result.new_count, 1);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.index == 0 && w.field == "HEAT_NO"));
    }

    #[tokio::test]
    async fn test_uploader_recorded_on_new_labels() {
        let store = MemoryStore::new();
        let session = operator();

        let result = ingest(&store, records(json!([channel()])), &session).await;

        assert_eq!(result.new_labels[0].user_id, Some(session.user_id));
    }

    #[tokio::test]
    async fn test_concurrent_batches_create_one_label_per_key() {
        let store = Arc::new(MemoryStore::new());
        let session = operator();

        let uploads = (0..8).map(|_| {
            let store = store.clone();
            let session = session.clone();
            async move { ingest(store.as_ref(), records(json!([channel()])), &session).await }
        });
        let results = futures::future::join_all(uploads).await;

        let created: usize = results.iter().map(|r| r.new_count).sum();
        let duplicates: usize = results.iter().map(|r| r.duplicate_count).sum();
        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);

        let stored = LabelStore::list(store.as_ref(), &LabelFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }
}
