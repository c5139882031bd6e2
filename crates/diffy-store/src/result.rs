//! Difference result persistence
//!
//! Results are immutable once saved. Saving the same result twice is a
//! no-op; saving a different result under an existing id is a conflict.

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use diffy_model::DifferenceResult;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Store of analysis results
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a result
    async fn save(&self, result: &DifferenceResult) -> Result<(), StoreError>;

    /// Look up a result by id
    async fn find_by_id(&self, id: &str) -> Result<Option<DifferenceResult>, StoreError>;

    /// Results captured in `[start, end]`, ascending by timestamp then id
    async fn find_by_timestamp_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<DifferenceResult>, StoreError>;

    /// Results of one run, ascending by timestamp then id
    async fn find_by_run_id(&self, run_id: &str) -> Result<Vec<DifferenceResult>, StoreError>;
}

/// In-memory result store
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: DashMap<String, DifferenceResult>,
}

impl InMemoryResultStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored results
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Insert a result, returning `false` if it was already stored
    fn insert(&self, result: &DifferenceResult) -> Result<bool, StoreError> {
        match self.results.entry(result.id().to_string()) {
            Entry::Occupied(existing) if existing.get() == result => Ok(false),
            Entry::Occupied(_) => Err(StoreError::Conflict(result.id().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(result.clone());
                Ok(true)
            }
        }
    }

    /// Check whether saving `result` would store something new
    fn admits(&self, result: &DifferenceResult) -> Result<bool, StoreError> {
        match self.results.get(result.id()) {
            Some(existing) if *existing == *result => Ok(false),
            Some(_) => Err(StoreError::Conflict(result.id().to_string())),
            None => Ok(true),
        }
    }

    fn collect(&self, keep: impl Fn(&DifferenceResult) -> bool) -> Vec<DifferenceResult> {
        let mut found: Vec<DifferenceResult> = self
            .results
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| {
            a.timestamp_msec()
                .cmp(&b.timestamp_msec())
                .then_with(|| a.id().cmp(b.id()))
        });
        found
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save(&self, result: &DifferenceResult) -> Result<(), StoreError> {
        self.insert(result).map(|_| ())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DifferenceResult>, StoreError> {
        Ok(self.results.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_timestamp_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<DifferenceResult>, StoreError> {
        Ok(self.collect(|r| (start..=end).contains(&r.timestamp_msec())))
    }

    async fn find_by_run_id(&self, run_id: &str) -> Result<Vec<DifferenceResult>, StoreError> {
        Ok(self.collect(|r| r.run_id() == run_id))
    }
}

/// Append-only JSON lines result store
///
/// Existing records are loaded into memory on open; each save appends one
/// line. A truncated final line left by an interrupted write is dropped.
///
/// A failed append is cut back to the previous end of file. If that cut
/// fails too, the store refuses further appends until reopened.
#[derive(Debug)]
pub struct JsonlResultStore {
    path: PathBuf,
    index: InMemoryResultStore,
    file: Mutex<File>,
    failed: AtomicBool,
}

/// Fix-up applied to the file tail on open
enum Repair {
    None,
    Terminate,
    Truncate(u64),
}

impl JsonlResultStore {
    /// Open or create the file at `path`
    ///
    /// # Errors
    /// Returns [`StoreError`] if the file cannot be read or holds a malformed
    /// complete record
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let index = InMemoryResultStore::new();
        let mut repair = Repair::None;

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let (body, tail) = match contents.rfind('\n') {
                    Some(end) => contents.split_at(end + 1),
                    None => ("", contents.as_str()),
                };
                for (n, line) in body.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let result: DifferenceResult = serde_json::from_str(line).map_err(|err| {
                        tracing::error!(
                            path = %path.display(),
                            line = n + 1,
                            error = %err,
                            "malformed record"
                        );
                        err
                    })?;
                    index.insert(&result)?;
                }
                if !tail.trim().is_empty() {
                    match serde_json::from_str::<DifferenceResult>(tail) {
                        Ok(result) => {
                            index.insert(&result)?;
                            repair = Repair::Terminate;
                        }
                        Err(err) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %err,
                                "dropping truncated record"
                            );
                            repair = Repair::Truncate(u64::try_from(body.len()).unwrap_or(u64::MAX));
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io(&path, err)),
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        let repaired = match repair {
            Repair::None => Ok(()),
            Repair::Terminate => file.write_all(b"\n").await,
            Repair::Truncate(len) => file.set_len(len).await,
        };
        repaired.map_err(|e| StoreError::io(&path, e))?;

        tracing::debug!(path = %path.display(), records = index.len(), "result file opened");
        Ok(Self {
            path,
            index,
            file: Mutex::new(file),
            failed: AtomicBool::new(false),
        })
    }

    /// File backing the store
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored results
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    async fn append(file: &mut File, line: &[u8]) -> std::io::Result<()> {
        file.write_all(line).await?;
        file.flush().await
    }

    /// Cut the file back to `len` after a failed append
    async fn discard_from(&self, file: &mut File, len: u64) {
        match file.set_len(len).await {
            Ok(()) => tracing::warn!(path = %self.path.display(), len, "partial record discarded"),
            Err(err) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "cannot discard partial record; refusing further appends"
                );
                self.failed.store(true, Ordering::Release);
            }
        }
    }
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn save(&self, result: &DifferenceResult) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        // Check, append and index under one lock so concurrent saves of the
        // same id cannot both write
        let mut file = self.file.lock().await;
        if self.failed.load(Ordering::Acquire) {
            return Err(StoreError::unavailable(format!(
                "{} has a partial record; reopen to repair",
                self.path.display()
            )));
        }
        if !self.index.admits(result)? {
            return Ok(());
        }
        let end = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?
            .len();
        if let Err(err) = Self::append(&mut file, &line).await {
            self.discard_from(&mut file, end).await;
            return Err(StoreError::io(&self.path, err));
        }
        self.index.insert(result)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DifferenceResult>, StoreError> {
        self.index.find_by_id(id).await
    }

    async fn find_by_timestamp_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<DifferenceResult>, StoreError> {
        self.index.find_by_timestamp_range(start, end).await
    }

    async fn find_by_run_id(&self, run_id: &str) -> Result<Vec<DifferenceResult>, StoreError> {
        self.index.find_by_run_id(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffy_model::{DifferenceKind, FieldDifference};
    use pretty_assertions::assert_eq;

    fn result(id: &str, run_id: &str, ts: i64) -> DifferenceResult {
        DifferenceResult::builder(id, run_id, "t", "/e", ts).build()
    }

    fn ids(results: &[DifferenceResult]) -> Vec<&str> {
        results.iter().map(DifferenceResult::id).collect()
    }

    #[tokio::test]
    async fn test_in_memory_save_and_find() {
        let store = InMemoryResultStore::new();
        store.save(&result("a", "run", 10)).await.unwrap();

        assert_eq!(store.find_by_id("a").await.unwrap().unwrap().timestamp_msec(), 10);
        assert!(store.find_by_id("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_save_is_idempotent_but_rejects_conflicts() {
        let store = InMemoryResultStore::new();
        let original = result("a", "run", 10);
        store.save(&original).await.unwrap();
        store.save(&original).await.unwrap();
        assert_eq!(store.len(), 1);

        let changed = DifferenceResult::builder("a", "run", "t", "/e", 10)
            .differences(vec![FieldDifference::new(
                "x".parse().unwrap(),
                DifferenceKind::PrimitiveDifference,
                "1 != 2",
            )])
            .build();
        let err = store.save(&changed).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == "a"));
        assert_eq!(store.find_by_id("a").await.unwrap().unwrap(), original);
    }

    #[tokio::test]
    async fn test_timestamp_range_is_inclusive_and_ordered() {
        let store = InMemoryResultStore::new();
        for (id, ts) in [("d", 30), ("b", 20), ("a", 20), ("c", 10), ("e", 40)] {
            store.save(&result(id, "run", ts)).await.unwrap();
        }
        let found = store.find_by_timestamp_range(10, 30).await.unwrap();
        assert_eq!(ids(&found), vec!["c", "a", "b", "d"]);
        assert!(store.find_by_timestamp_range(30, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_run_id() {
        let store = InMemoryResultStore::new();
        store.save(&result("a", "run-1", 2)).await.unwrap();
        store.save(&result("b", "run-2", 1)).await.unwrap();
        store.save(&result("c", "run-1", 1)).await.unwrap();

        let found = store.find_by_run_id("run-1").await.unwrap();
        assert_eq!(ids(&found), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_jsonl_reopen_restores_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let store = JsonlResultStore::open(&path).await.unwrap();
            store.save(&result("a", "run", 1)).await.unwrap();
            store.save(&result("b", "run", 2)).await.unwrap();
            store.save(&result("a", "run", 1)).await.unwrap();
        }
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(ids(&reopened.find_by_run_id("run").await.unwrap()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_jsonl_skips_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let good = serde_json::to_string(&result("a", "run", 1)).unwrap();
        tokio::fs::write(&path, format!("{good}\n{{\"id\":\"b\",\"ru"))
            .await
            .unwrap();

        let store = JsonlResultStore::open(&path).await.unwrap();
        assert_eq!(store.len(), 1);
        store.save(&result("c", "run", 3)).await.unwrap();
        drop(store);

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        assert_eq!(ids(&reopened.find_by_run_id("run").await.unwrap()), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_jsonl_keeps_unterminated_complete_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let good = serde_json::to_string(&result("a", "run", 1)).unwrap();
        tokio::fs::write(&path, &good).await.unwrap();

        let store = JsonlResultStore::open(&path).await.unwrap();
        store.save(&result("b", "run", 2)).await.unwrap();
        drop(store);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("r1").join("results.jsonl");
        let store = JsonlResultStore::open(&path).await.unwrap();
        store.save(&result("a", "run", 1)).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_jsonl_rejects_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        tokio::fs::write(&path, "not json\n").await.unwrap();

        let err = JsonlResultStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_jsonl_discards_partial_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let store = JsonlResultStore::open(&path).await.unwrap();
        store.save(&result("a", "run", 1)).await.unwrap();

        let end = tokio::fs::metadata(&path).await.unwrap().len();
        {
            use std::io::Write;
            let mut torn = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            torn.write_all(br#"{"id":"b","run_"#).unwrap();
        }
        {
            let mut file = store.file.lock().await;
            store.discard_from(&mut file, end).await;
        }
        store.save(&result("c", "run", 3)).await.unwrap();
        drop(store);

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        assert_eq!(ids(&reopened.find_by_run_id("run").await.unwrap()), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_jsonl_refuses_appends_after_unrepaired_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let store = JsonlResultStore::open(&path).await.unwrap();
        store.save(&result("a", "run", 1)).await.unwrap();

        // A read-only handle fails both the write and the cut-back
        *store.file.lock().await = File::open(&path).await.unwrap();
        let err = store.save(&result("b", "run", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.find_by_id("b").await.unwrap(), None);

        let err = store.save(&result("c", "run", 3)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        drop(store);

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        assert_eq!(ids(&reopened.find_by_run_id("run").await.unwrap()), vec!["a"]);
    }
}
