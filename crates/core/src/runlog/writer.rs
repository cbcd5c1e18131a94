//! Consuming side of the run log channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{RunLogEntry, RunLogHandle, RunLogStore, RunRecord};

/// Background task that receives run entries and writes them to storage.
pub struct RunLogWriter {
    rx: mpsc::Receiver<RunLogEntry>,
    store: Arc<dyn RunLogStore>,
}

impl RunLogWriter {
    pub fn new(rx: mpsc::Receiver<RunLogEntry>, store: Arc<dyn RunLogStore>) -> Self {
        Self { rx, store }
    }

    /// Run the writer, consuming entries until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Run log writer started");

        while let Some(entry) = self.rx.recv().await {
            let record = RunRecord {
                id: 0, // Will be set by database
                timestamp: entry.timestamp,
                source: entry.result.source.clone(),
                status: entry.result.status.as_str().to_string(),
                found: entry.result.found,
                added: entry.result.added,
                updated: entry.result.updated,
                duration_ms: entry.result.duration_ms,
                error_message: entry.result.error_message.clone(),
                actor: entry.actor,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write run record: {}", e);
            }
        }

        tracing::info!("Run log writer shutting down");
    }
}

/// Create a complete run log system.
///
/// Returns:
/// - `RunLogHandle` - for recording runs (clone this to share across tasks)
/// - `RunLogWriter` - spawn this as a background task with `tokio::spawn(writer.run())`
///
/// # Arguments
/// * `store` - The run log store to write to
/// * `system_actor` - Configured fallback actor for unattended runs
/// * `buffer_size` - Size of the channel buffer
pub fn create_run_log_system(
    store: Arc<dyn RunLogStore>,
    system_actor: Option<String>,
    buffer_size: usize,
) -> (RunLogHandle, RunLogWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let handle = RunLogHandle::new(tx, system_actor);
    let writer = RunLogWriter::new(rx, store);
    (handle, writer)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::runlog::{RunFilter, RunLogError};
    use crate::scraper::{ScrapeResult, ScrapeStatus};

    /// Mock store that records insert calls.
    struct MockStore {
        records: Mutex<Vec<RunRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn get_records(&self) -> Vec<RunRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl RunLogStore for MockStore {
        fn insert(&self, record: &RunRecord) -> Result<i64, RunLogError> {
            if self.should_fail {
                return Err(RunLogError::Database("Mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            let mut stored = record.clone();
            stored.id = id;
            records.push(stored);
            Ok(id)
        }

        fn query(&self, _filter: &RunFilter) -> Result<Vec<RunRecord>, RunLogError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &RunFilter) -> Result<i64, RunLogError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    fn error_result() -> ScrapeResult {
        ScrapeResult {
            source: "ravelry".to_string(),
            found: 3,
            added: 1,
            updated: 1,
            duration_ms: 500,
            status: ScrapeStatus::Error,
            error_message: Some("API timeout".to_string()),
        }
    }

    #[tokio::test]
    async fn test_writer_receives_and_stores_entries() {
        let store = Arc::new(MockStore::new());
        let store_dyn: Arc<dyn RunLogStore> = Arc::clone(&store) as Arc<dyn RunLogStore>;
        let (handle, writer) = create_run_log_system(store_dyn, Some("system".to_string()), 10);

        let writer_handle = tokio::spawn(writer.run());

        handle.record(ScrapeResult::empty("github"), None).await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        drop(handle);
        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "github");
        assert_eq!(records[0].status, "success");
        assert_eq!(records[0].actor, "system");
    }

    #[tokio::test]
    async fn test_writer_preserves_error_details() {
        let store = Arc::new(MockStore::new());
        let store_dyn: Arc<dyn RunLogStore> = Arc::clone(&store) as Arc<dyn RunLogStore>;
        let (handle, writer) = create_run_log_system(store_dyn, None, 10);

        let writer_handle = tokio::spawn(writer.run());

        handle.record(error_result(), Some("admin-1")).await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        drop(handle);
        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "error");
        assert_eq!(records[0].error_message, Some("API timeout".to_string()));
        assert_eq!(records[0].actor, "admin-1");
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::failing());
        let store_dyn: Arc<dyn RunLogStore> = Arc::clone(&store) as Arc<dyn RunLogStore>;
        let (handle, writer) = create_run_log_system(store_dyn, Some("system".to_string()), 10);

        let writer_handle = tokio::spawn(writer.run());

        handle.record(ScrapeResult::empty("github"), None).await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        drop(handle);

        // Writer should complete normally
        writer_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cloned_handles_share_writer() {
        let store = Arc::new(MockStore::new());
        let store_dyn: Arc<dyn RunLogStore> = Arc::clone(&store) as Arc<dyn RunLogStore>;
        let (handle1, writer) = create_run_log_system(store_dyn, Some("system".to_string()), 10);
        let handle2 = handle1.clone();

        let writer_handle = tokio::spawn(writer.run());

        handle1.record(ScrapeResult::empty("github"), None).await;
        handle2.record(ScrapeResult::empty("ravelry"), None).await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        drop(handle1);
        drop(handle2);
        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_before_drop_are_captured() {
        let store = Arc::new(MockStore::new());
        let store_dyn: Arc<dyn RunLogStore> = Arc::clone(&store) as Arc<dyn RunLogStore>;
        let (handle, writer) = create_run_log_system(store_dyn, Some("system".to_string()), 100);

        let writer_handle = tokio::spawn(writer.run());

        handle.record(ScrapeResult::empty("github"), None).await;
        drop(handle);

        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 1);
    }
}
