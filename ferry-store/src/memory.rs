//! In-memory durable store
//!
//! Implements all three store traits behind one mutex. Intended for tests
//! and single-process development; nothing survives a restart.
//!
//! Visibility timeouts are tracked with [`tokio::time::Instant`] so tests
//! running with a paused clock can advance past them.

use async_trait::async_trait;
use ferry_core::domain::job::JobRecord;
use ferry_core::domain::operation::Operation;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::{
    BlobStore, Delivery, ETag, JobTable, QueueDepth, Result, StoreError, Versioned, WorkQueue,
};

#[derive(Debug)]
struct StoredMessage {
    body: Vec<u8>,
    visible_at: Instant,
    dequeue_count: u32,
    receipt: Option<Uuid>,
}

#[derive(Debug, Default)]
struct Inner {
    containers: HashSet<String>,
    blobs: HashMap<(String, String), Vec<u8>>,
    records: HashMap<(Operation, Uuid), (JobRecord, ETag)>,
    next_version: i64,
    record_writes: u64,
    messages: BTreeMap<i64, StoredMessage>,
    poison: Vec<Vec<u8>>,
    next_message_id: i64,
}

impl Inner {
    fn bump_version(&mut self) -> ETag {
        self.next_version += 1;
        self.record_writes += 1;
        ETag(self.next_version)
    }

    fn take_delivered(&mut self, delivery: &Delivery) -> Result<StoredMessage> {
        let current = self
            .messages
            .get(&delivery.id)
            .is_some_and(|msg| msg.receipt == Some(delivery.receipt));

        if !current {
            return Err(StoreError::NotFound(format!(
                "message {} with receipt {}",
                delivery.id, delivery.receipt
            )));
        }

        self.messages
            .remove(&delivery.id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", delivery.id)))
    }
}

/// Process-local store backing tests and local development
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoned locks are recovered; the data is plain values.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of record writes (insert, replace, upsert) performed so far
    pub fn record_writes(&self) -> u64 {
        self.lock().record_writes
    }

    /// Bodies of the messages moved to the poison queue
    pub fn poisoned(&self) -> Vec<Vec<u8>> {
        self.lock().poison.clone()
    }
}

// =============================================================================
// Blobs
// =============================================================================

#[async_trait]
impl BlobStore for MemoryStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        self.lock().containers.insert(container.to_string());
        Ok(())
    }

    async fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if !inner.containers.contains(container) {
            return Err(StoreError::ContainerMissing(container.to_string()));
        }
        inner
            .blobs
            .insert((container.to_string(), name.to_string()), data.to_vec());
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.lock();
        Ok(inner
            .blobs
            .get(&(container.to_string(), name.to_string()))
            .cloned())
    }
}

// =============================================================================
// Queue
// =============================================================================

#[async_trait]
impl WorkQueue for MemoryStore {
    async fn ensure(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, body: &[u8]) -> Result<i64> {
        let mut inner = self.lock();
        inner.next_message_id += 1;
        let id = inner.next_message_id;
        inner.messages.insert(
            id,
            StoredMessage {
                body: body.to_vec(),
                visible_at: Instant::now(),
                dequeue_count: 0,
                receipt: None,
            },
        );
        debug!("Enqueued message {} ({} bytes)", id, body.len());
        Ok(id)
    }

    async fn receive(&self, visibility: Duration) -> Result<Option<Delivery>> {
        let now = Instant::now();
        let mut inner = self.lock();

        let Some((&id, msg)) = inner
            .messages
            .iter_mut()
            .find(|(_, msg)| msg.visible_at <= now)
        else {
            return Ok(None);
        };

        let receipt = Uuid::new_v4();
        msg.dequeue_count += 1;
        msg.visible_at = now + visibility;
        msg.receipt = Some(receipt);

        Ok(Some(Delivery {
            id,
            receipt,
            dequeue_count: msg.dequeue_count,
            body: msg.body.clone(),
        }))
    }

    async fn delete(&self, delivery: &Delivery) -> Result<()> {
        self.lock().take_delivered(delivery).map(|_| ())
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.lock();
        let msg = inner.take_delivered(delivery)?;
        inner.poison.push(msg.body);
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let now = Instant::now();
        let inner = self.lock();
        let ready = inner
            .messages
            .values()
            .filter(|msg| msg.visible_at <= now)
            .count() as u64;

        Ok(QueueDepth {
            ready,
            in_flight: inner.messages.len() as u64 - ready,
            poison: inner.poison.len() as u64,
        })
    }
}

// =============================================================================
// Job Table
// =============================================================================

#[async_trait]
impl JobTable for MemoryStore {
    async fn ensure(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, record: &JobRecord) -> Result<ETag> {
        let mut inner = self.lock();
        let key = (record.operation, record.job_id);
        if inner.records.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "job {}/{} already exists",
                record.operation, record.job_id
            )));
        }
        let etag = inner.bump_version();
        inner.records.insert(key, (record.clone(), etag));
        Ok(etag)
    }

    async fn get(&self, operation: Operation, job_id: Uuid) -> Result<Option<Versioned<JobRecord>>> {
        let inner = self.lock();
        Ok(inner
            .records
            .get(&(operation, job_id))
            .map(|(record, etag)| Versioned {
                value: record.clone(),
                etag: *etag,
            }))
    }

    async fn replace(&self, record: &JobRecord, etag: ETag) -> Result<ETag> {
        let mut inner = self.lock();
        let key = (record.operation, record.job_id);
        match inner.records.get(&key) {
            None => {
                return Err(StoreError::NotFound(format!(
                    "job {}/{}",
                    record.operation, record.job_id
                )));
            }
            Some((_, current)) if *current != etag => {
                return Err(StoreError::Conflict(format!(
                    "job {}/{} changed since it was read",
                    record.operation, record.job_id
                )));
            }
            Some(_) => {}
        }
        let next = inner.bump_version();
        inner.records.insert(key, (record.clone(), next));
        Ok(next)
    }

    async fn upsert(&self, record: &JobRecord) -> Result<ETag> {
        let mut inner = self.lock();
        let next = inner.bump_version();
        inner
            .records
            .insert((record.operation, record.job_id), (record.clone(), next));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ferry_core::domain::job::JobStatus;

    fn record() -> JobRecord {
        JobRecord::queued(Operation::Compile, Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_put_requires_container() {
        let store = MemoryStore::new();
        let err = store.put("job-input", "a.json", b"{}").await.unwrap_err();
        assert!(matches!(err, StoreError::ContainerMissing(_)));

        store.ensure_container("job-input").await.unwrap();
        store.put("job-input", "a.json", b"{}").await.unwrap();
        assert_eq!(
            BlobStore::get(&store, "job-input", "a.json").await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(
            BlobStore::get(&store, "job-input", "b.json").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_keys() {
        let store = MemoryStore::new();
        let rec = record();
        store.insert(&rec).await.unwrap();
        assert!(store.insert(&rec).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_replace_checks_version_but_upsert_does_not() {
        let store = MemoryStore::new();
        let mut rec = record();
        let first = store.insert(&rec).await.unwrap();

        rec.status = JobStatus::Running;
        let second = store.replace(&rec, first).await.unwrap();
        assert_ne!(first, second);

        // Stale etag loses.
        rec.attempts = 7;
        assert!(store.replace(&rec, first).await.unwrap_err().is_conflict());

        // Blind overwrite always wins.
        store.upsert(&rec).await.unwrap();
        let stored = JobTable::get(&store, rec.operation, rec.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value.attempts, 7);
        assert_eq!(store.record_writes(), 3);
    }

    #[tokio::test]
    async fn test_replace_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store.replace(&record(), ETag(1)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_message_is_hidden_until_visibility_lapses() {
        let store = MemoryStore::new();
        store.send(b"one").await.unwrap();

        let first = store.receive(Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(first.dequeue_count, 1);
        assert!(store.receive(Duration::from_secs(30)).await.unwrap().is_none());
        assert_eq!(store.depth().await.unwrap().in_flight, 1);

        tokio::time::advance(Duration::from_secs(31)).await;

        let second = store.receive(Duration::from_secs(30)).await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.dequeue_count, 2);

        // The first receipt went stale with the redelivery.
        assert!(store.delete(&first).await.unwrap_err().is_not_found());
        store.delete(&second).await.unwrap();
        assert_eq!(store.depth().await.unwrap(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_dead_letter_moves_message_to_poison() {
        let store = MemoryStore::new();
        store.send(b"bad").await.unwrap();
        let delivery = store.receive(Duration::from_secs(30)).await.unwrap().unwrap();

        store.dead_letter(&delivery).await.unwrap();

        assert_eq!(store.poisoned(), vec![b"bad".to_vec()]);
        let depth = store.depth().await.unwrap();
        assert_eq!((depth.ready, depth.in_flight, depth.poison), (0, 0, 1));
    }
}
