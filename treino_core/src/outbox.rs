//! Durable FIFO of finished workouts waiting for delivery.
//!
//! Records are appended as JSON lines. A drain snapshots the queue, sends in
//! order, then removes only what was delivered from the *current* file, so
//! records enqueued mid-drain survive and failures keep their relative order.

use crate::jsonl;
use crate::sync::{Backend, Connectivity};
use crate::{Error, FinalizedWorkoutLog, QueuedRecord, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Held for the duration of a drain; released on drop
#[derive(Debug)]
pub struct DrainLock {
    _file: Option<File>,
}

/// Storage behind an `Outbox`
pub trait OutboxStore {
    /// Queued records in enqueue order
    fn records(&self) -> Result<Vec<QueuedRecord>>;

    fn append(&mut self, record: &QueuedRecord) -> Result<()>;

    /// Drop the given ids, keeping everything else in order
    fn remove(&mut self, ids: &HashSet<Uuid>) -> Result<()>;

    /// Claim the right to drain; `None` when another drain holds it
    fn try_lock_drain(&self) -> Result<Option<DrainLock>>;
}

/// JSONL-backed outbox with file locking
///
/// Writers serialize on `<path>.lock`; drains additionally claim
/// `<path>.drain` so two processes never replay the same queue at once.
#[derive(Debug, Clone)]
pub struct FileOutbox {
    path: PathBuf,
}

impl FileOutbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutboxStore for FileOutbox {
    fn records(&self) -> Result<Vec<QueuedRecord>> {
        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_shared()?;
        let records = jsonl::read_lines(&self.path);
        lock.unlock()?;
        records
    }

    fn append(&mut self, record: &QueuedRecord) -> Result<()> {
        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_exclusive()?;
        let result = jsonl::append_line(&self.path, record);
        lock.unlock()?;
        result?;
        tracing::debug!("Appended record {} to outbox", record.id);
        Ok(())
    }

    fn remove(&mut self, ids: &HashSet<Uuid>) -> Result<()> {
        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_exclusive()?;

        let result = (|| -> Result<()> {
            let remaining: Vec<QueuedRecord> = jsonl::read_lines::<QueuedRecord>(&self.path)?
                .into_iter()
                .filter(|r| !ids.contains(&r.id))
                .collect();
            jsonl::rewrite(&self.path, &remaining)?;
            tracing::debug!("Outbox rewritten with {} records", remaining.len());
            Ok(())
        })();

        lock.unlock()?;
        result
    }

    fn try_lock_drain(&self) -> Result<Option<DrainLock>> {
        let file = jsonl::open_lock(&self.path, ".drain")?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(DrainLock { _file: Some(file) })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory outbox for tests and ephemeral use
#[derive(Debug, Default, Clone)]
pub struct MemoryOutbox {
    pub queue: Vec<QueuedRecord>,
    /// Make `append` fail
    pub fail_appends: bool,
    /// Report another drain as running
    pub drain_busy: bool,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutboxStore for MemoryOutbox {
    fn records(&self) -> Result<Vec<QueuedRecord>> {
        Ok(self.queue.clone())
    }

    fn append(&mut self, record: &QueuedRecord) -> Result<()> {
        if self.fail_appends {
            return Err(Error::Other("outbox storage unavailable".into()));
        }
        self.queue.push(record.clone());
        Ok(())
    }

    fn remove(&mut self, ids: &HashSet<Uuid>) -> Result<()> {
        self.queue.retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    fn try_lock_drain(&self) -> Result<Option<DrainLock>> {
        if self.drain_busy {
            Ok(None)
        } else {
            Ok(Some(DrainLock { _file: None }))
        }
    }
}

/// The outbox queue
#[derive(Debug)]
pub struct Outbox<S: OutboxStore> {
    store: S,
}

impl<S: OutboxStore> Outbox<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn enqueue(&mut self, log: &FinalizedWorkoutLog, now: DateTime<Utc>) -> Result<QueuedRecord> {
        let record = QueuedRecord {
            id: Uuid::new_v4(),
            enqueued_at: now,
            log: log.clone(),
        };
        self.store.append(&record)?;
        tracing::info!("Queued {} workout for later delivery ({})", log.workout_id, record.id);
        Ok(record)
    }

    pub fn peek_count(&self) -> Result<usize> {
        Ok(self.store.records()?.len())
    }

    pub fn records(&self) -> Result<Vec<QueuedRecord>> {
        self.store.records()
    }

    /// Try to deliver every queued record, oldest first
    ///
    /// Returns how many were delivered. Does nothing when offline or when
    /// another drain is already running. Failed records stay queued.
    pub fn drain(
        &mut self,
        identity: &str,
        backend: &mut dyn Backend,
        link: &dyn Connectivity,
    ) -> Result<usize> {
        if !link.is_online() {
            tracing::debug!("Offline; skipping outbox drain");
            return Ok(0);
        }

        let Some(_guard) = self.store.try_lock_drain()? else {
            tracing::debug!("Outbox drain already in progress");
            return Ok(0);
        };

        let pending = self.store.records()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut delivered = HashSet::new();
        for record in &pending {
            match backend.send(identity, &record.log) {
                Ok(()) => {
                    delivered.insert(record.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to deliver queued record {}: {}. Keeping it.", record.id, e);
                }
            }
        }

        if !delivered.is_empty() {
            self.store.remove(&delivered)?;
        }

        tracing::info!(
            "Outbox drain delivered {} of {} records",
            delivered.len(),
            pending.len()
        );
        Ok(delivered.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::StaticLink;
    use chrono::TimeZone;
    use std::fs::OpenOptions;
    use std::io::Write;

    /// Backend that fails for chosen workout ids and records what it got
    #[derive(Default)]
    struct ScriptedBackend {
        fail_ids: HashSet<String>,
        sent: Vec<String>,
    }

    impl Backend for ScriptedBackend {
        fn send(&mut self, _identity: &str, log: &FinalizedWorkoutLog) -> Result<()> {
            if self.fail_ids.contains(&log.workout_id) {
                return Err(Error::Send(format!("{} rejected", log.workout_id)));
            }
            self.sent.push(log.workout_id.clone());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 18, 0, 0).unwrap()
    }

    fn log(workout_id: &str) -> FinalizedWorkoutLog {
        FinalizedWorkoutLog {
            workout_id: workout_id.into(),
            workout_name: workout_id.into(),
            started_at: t0(),
            ended_at: t0(),
            duration_seconds: 60,
            core_done: false,
            body_weight: None,
            exercises: vec![],
        }
    }

    fn ids<S: OutboxStore>(outbox: &Outbox<S>) -> Vec<String> {
        outbox
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.log.workout_id)
            .collect()
    }

    fn check_partial_failure<S: OutboxStore>(mut outbox: Outbox<S>) {
        outbox.enqueue(&log("R1"), t0()).unwrap();
        outbox.enqueue(&log("R2"), t0()).unwrap();
        outbox.enqueue(&log("R3"), t0()).unwrap();

        let mut backend = ScriptedBackend::default();
        backend.fail_ids.insert("R2".into());

        let sent = outbox.drain("me", &mut backend, &StaticLink(true)).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(backend.sent, vec!["R1".to_string(), "R3".to_string()]);
        assert_eq!(ids(&outbox), vec!["R2".to_string()]);

        outbox.enqueue(&log("R4"), t0()).unwrap();
        assert_eq!(ids(&outbox), vec!["R2".to_string(), "R4".to_string()]);
        assert_eq!(outbox.peek_count().unwrap(), 2);
    }

    #[test]
    fn test_drain_keeps_failed_record_in_order_memory() {
        check_partial_failure(Outbox::new(MemoryOutbox::new()));
    }

    #[test]
    fn test_drain_keeps_failed_record_in_order_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        check_partial_failure(Outbox::new(FileOutbox::new(temp_dir.path().join("outbox.jsonl"))));
    }

    #[test]
    fn test_drain_offline_is_noop() {
        let mut outbox = Outbox::new(MemoryOutbox::new());
        outbox.enqueue(&log("R1"), t0()).unwrap();

        let mut backend = ScriptedBackend::default();
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(false)).unwrap(), 0);
        assert!(backend.sent.is_empty());
        assert_eq!(outbox.peek_count().unwrap(), 1);
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut outbox = Outbox::new(MemoryOutbox::new());
        outbox.enqueue(&log("R1"), t0()).unwrap();

        let mut backend = ScriptedBackend::default();
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(true)).unwrap(), 1);
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(true)).unwrap(), 0);
        assert_eq!(backend.sent.len(), 1);
    }

    #[test]
    fn test_concurrent_drain_is_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outbox.jsonl");
        let mut outbox = Outbox::new(FileOutbox::new(&path));
        outbox.enqueue(&log("R1"), t0()).unwrap();

        // Another handle (e.g. another process) is mid-drain
        let other = FileOutbox::new(&path);
        let held = other.try_lock_drain().unwrap();
        assert!(held.is_some());

        let mut backend = ScriptedBackend::default();
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(true)).unwrap(), 0);
        assert_eq!(outbox.peek_count().unwrap(), 1);

        drop(held);
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(true)).unwrap(), 1);
    }

    #[test]
    fn test_record_enqueued_mid_drain_survives() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outbox.jsonl");
        let mut outbox = Outbox::new(FileOutbox::new(&path));
        outbox.enqueue(&log("R1"), t0()).unwrap();

        /// Enqueues through a second handle while sending
        struct EnqueueWhileSending {
            side: Outbox<FileOutbox>,
        }

        impl Backend for EnqueueWhileSending {
            fn send(&mut self, _identity: &str, record: &FinalizedWorkoutLog) -> Result<()> {
                if record.workout_id == "R1" {
                    self.side.enqueue(&log("LATE"), t0())?;
                }
                Ok(())
            }
        }

        let mut backend = EnqueueWhileSending {
            side: Outbox::new(FileOutbox::new(&path)),
        };
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(true)).unwrap(), 1);
        assert_eq!(ids(&outbox), vec!["LATE".to_string()]);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outbox.jsonl");
        let mut outbox = Outbox::new(FileOutbox::new(&path));
        outbox.enqueue(&log("R1"), t0()).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"trunc").unwrap();

        assert_eq!(outbox.peek_count().unwrap(), 1);
    }

    #[test]
    fn test_enqueue_after_torn_line_keeps_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("outbox.jsonl");
        let mut outbox = Outbox::new(FileOutbox::new(&path));
        outbox.enqueue(&log("R1"), t0()).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"trunc").unwrap();
        drop(file);

        outbox.enqueue(&log("R2"), t0()).unwrap();
        assert_eq!(ids(&outbox), vec!["R1".to_string(), "R2".to_string()]);

        let mut backend = ScriptedBackend::default();
        assert_eq!(outbox.drain("me", &mut backend, &StaticLink(true)).unwrap(), 2);
        assert_eq!(outbox.peek_count().unwrap(), 0);
    }

    #[test]
    fn test_failed_append_surfaces() {
        let mut store = MemoryOutbox::new();
        store.fail_appends = true;
        let mut outbox = Outbox::new(store);
        assert!(outbox.enqueue(&log("R1"), t0()).is_err());
    }
}
