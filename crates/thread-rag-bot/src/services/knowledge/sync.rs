use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::loader::DocumentLoader;
use super::store::{KnowledgeStoreClient, Operation, UploadRequest};
use crate::utils::error::BotError;

/// How long to wait between operation polls, and for how long in total.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    /// None polls until the remote side finishes, however long that takes.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub store_id: String,
    pub created_store: bool,
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
}

/// One-way reconciliation of a local folder into a remote document store.
///
/// Filenames are the dedup key: a file whose name already exists as a remote
/// display name is never uploaded again, even if its content changed.
pub struct KnowledgeBaseSync {
    client: Arc<dyn KnowledgeStoreClient>,
    poll: PollPolicy,
    pinned_store_id: Option<String>,
}

impl KnowledgeBaseSync {
    pub fn new(client: Arc<dyn KnowledgeStoreClient>, poll: PollPolicy) -> Self {
        Self {
            client,
            poll,
            pinned_store_id: None,
        }
    }

    /// Use this store identifier as-is instead of searching by display name.
    pub fn with_pinned_store(mut self, store_id: Option<String>) -> Self {
        self.pinned_store_id = store_id;
        self
    }

    /// Sync `local_folder` into the store named `store_display_name` and
    /// return the store identifier.
    pub async fn ensure_synced(
        &self,
        local_folder: &Path,
        store_display_name: &str,
    ) -> Result<String, BotError> {
        let report = self.sync(local_folder, store_display_name).await?;
        Ok(report.store_id)
    }

    pub async fn sync(
        &self,
        local_folder: &Path,
        store_display_name: &str,
    ) -> Result<SyncReport, BotError> {
        let start = Instant::now();
        let (store_id, created_store) = self.resolve_store(store_display_name).await?;

        let synced: HashSet<String> = self
            .client
            .list_documents(&store_id)
            .await?
            .into_iter()
            .filter_map(|doc| doc.display_name)
            .collect();
        debug!("Store {} already holds {} documents", store_id, synced.len());

        let mut uploaded = Vec::new();
        let mut skipped = Vec::new();

        for file in DocumentLoader::scan(local_folder).await? {
            if synced.contains(&file.file_name) {
                debug!("Skipping {} (already synced)", file.file_name);
                skipped.push(file.file_name);
                continue;
            }

            let mime_type = DocumentLoader::detect_mime_type(&file.file_name);
            let bytes = DocumentLoader::load_file(&file.path).await?;
            info!(
                "Uploading {} ({} bytes, {}) to {}",
                file.file_name,
                bytes.len(),
                mime_type,
                store_id
            );

            let operation = self
                .client
                .upload_document(
                    &store_id,
                    UploadRequest {
                        display_name: file.file_name.clone(),
                        mime_type,
                        bytes,
                    },
                )
                .await?;
            self.wait_for_operation(operation).await?;

            info!("Indexed {}", file.file_name);
            uploaded.push(file.file_name);
        }

        info!(
            "Knowledge base sync finished in {:?}: {} uploaded, {} skipped",
            start.elapsed(),
            uploaded.len(),
            skipped.len()
        );

        Ok(SyncReport {
            store_id,
            created_store,
            uploaded,
            skipped,
        })
    }

    /// Returns the store id and whether it had to be created.
    async fn resolve_store(&self, display_name: &str) -> Result<(String, bool), BotError> {
        if let Some(id) = &self.pinned_store_id {
            info!("Using pinned document store {}", id);
            return Ok((id.clone(), false));
        }

        let stores = self.client.list_stores().await?;
        let mut matches = stores
            .into_iter()
            .filter(|store| store.display_name.as_deref() == Some(display_name));

        // Display names are not unique remotely; listing order decides.
        if let Some(store) = matches.next() {
            let extra = matches.count();
            if extra > 0 {
                warn!(
                    "{} other stores share the display name '{}', using {}",
                    extra, display_name, store.name
                );
            }
            info!("Found existing document store {} ('{}')", store.name, display_name);
            return Ok((store.name, false));
        }

        let store = self.client.create_store(display_name).await?;
        info!("Created document store {} ('{}')", store.name, display_name);
        Ok((store.name, true))
    }

    async fn wait_for_operation(&self, mut operation: Operation) -> Result<(), BotError> {
        let start = Instant::now();

        loop {
            if operation.done {
                if let Some(status) = operation.error {
                    return Err(BotError::OperationFailed {
                        name: operation.name,
                        message: status.message,
                    });
                }
                debug!("Operation {} done after {:?}", operation.name, start.elapsed());
                return Ok(());
            }

            if let Some(timeout) = self.poll.timeout {
                let waited = start.elapsed();
                if waited >= timeout {
                    return Err(BotError::OperationTimeout {
                        name: operation.name,
                        waited_secs: waited.as_secs(),
                    });
                }
            }

            tokio::time::sleep(self.poll.interval).await;
            operation = self.client.get_operation(&operation.name).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::knowledge::store::{
        MockKnowledgeStoreClient, OperationStatus, RemoteDocument, StoreInfo,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeState {
        stores: Vec<StoreInfo>,
        documents: HashMap<String, Vec<RemoteDocument>>,
        uploads: Vec<(String, String, String)>,
        pending_polls: HashMap<String, usize>,
        polls: usize,
        created: usize,
    }

    /// In-memory store. Every upload needs `polls_per_upload` polls to finish.
    #[derive(Default)]
    struct FakeStore {
        state: Mutex<FakeState>,
        polls_per_upload: usize,
    }

    impl FakeStore {
        fn with_polls(polls_per_upload: usize) -> Self {
            Self {
                polls_per_upload,
                ..Default::default()
            }
        }

        fn add_store(&self, name: &str, display_name: &str) {
            self.state.lock().unwrap().stores.push(StoreInfo {
                name: name.to_string(),
                display_name: Some(display_name.to_string()),
            });
        }

        fn uploaded_names(&self) -> Vec<String> {
            let state = self.state.lock().unwrap();
            state.uploads.iter().map(|(_, name, _)| name.clone()).collect()
        }

        fn document_names(&self, store: &str) -> HashSet<String> {
            let state = self.state.lock().unwrap();
            state
                .documents
                .get(store)
                .map(|docs| docs.iter().filter_map(|d| d.display_name.clone()).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl KnowledgeStoreClient for FakeStore {
        async fn list_stores(&self) -> Result<Vec<StoreInfo>, BotError> {
            Ok(self.state.lock().unwrap().stores.clone())
        }

        async fn create_store(&self, display_name: &str) -> Result<StoreInfo, BotError> {
            let mut state = self.state.lock().unwrap();
            state.created += 1;
            let store = StoreInfo {
                name: format!("fileSearchStores/store-{}", state.created),
                display_name: Some(display_name.to_string()),
            };
            state.stores.push(store.clone());
            Ok(store)
        }

        async fn list_documents(&self, store_id: &str) -> Result<Vec<RemoteDocument>, BotError> {
            let state = self.state.lock().unwrap();
            Ok(state.documents.get(store_id).cloned().unwrap_or_default())
        }

        async fn upload_document(
            &self,
            store_id: &str,
            request: UploadRequest,
        ) -> Result<Operation, BotError> {
            let mut state = self.state.lock().unwrap();
            let op_name = format!("operations/{}", state.uploads.len() + 1);
            state.uploads.push((
                store_id.to_string(),
                request.display_name.clone(),
                request.mime_type,
            ));
            state
                .documents
                .entry(store_id.to_string())
                .or_default()
                .push(RemoteDocument {
                    name: format!("{}/documents/{}", store_id, request.display_name),
                    display_name: Some(request.display_name),
                });
            state.pending_polls.insert(op_name.clone(), self.polls_per_upload);
            Ok(Operation {
                name: op_name,
                done: self.polls_per_upload == 0,
                error: None,
            })
        }

        async fn get_operation(&self, name: &str) -> Result<Operation, BotError> {
            let mut state = self.state.lock().unwrap();
            state.polls += 1;
            let remaining = state.pending_polls.entry(name.to_string()).or_insert(0);
            *remaining = remaining.saturating_sub(1);
            Ok(Operation {
                name: name.to_string(),
                done: *remaining == 0,
                error: None,
            })
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_scenario_initial_sync_then_added_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "policy.txt", "PTO is 20 days");
        write(dir.path(), "handbook.pdf", "%PDF-1.4");

        let fake = Arc::new(FakeStore::with_polls(1));
        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy());

        let first = sync.sync(dir.path(), "kb").await.unwrap();
        assert!(first.created_store);
        assert_eq!(first.uploaded, vec!["handbook.pdf", "policy.txt"]);
        assert!(first.skipped.is_empty());

        let expected: HashSet<String> = ["policy.txt", "handbook.pdf"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(fake.document_names(&first.store_id), expected);

        write(dir.path(), "faq.md", "# FAQ");
        let second = sync.sync(dir.path(), "kb").await.unwrap();

        assert_eq!(second.store_id, first.store_id);
        assert!(!second.created_store);
        assert_eq!(second.uploaded, vec!["faq.md"]);
        assert_eq!(second.skipped.len(), 2);
        assert_eq!(
            fake.uploaded_names(),
            vec!["handbook.pdf", "policy.txt", "faq.md"]
        );
    }

    #[tokio::test]
    async fn test_second_run_uploads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b.txt", "b");

        let fake = Arc::new(FakeStore::default());
        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy());

        sync.ensure_synced(dir.path(), "kb").await.unwrap();
        let second = sync.sync(dir.path(), "kb").await.unwrap();

        assert!(second.uploaded.is_empty());
        assert_eq!(fake.uploaded_names().len(), 2);
    }

    #[tokio::test]
    async fn test_changed_content_under_same_name_is_not_resynced() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "policy.txt", "v1");

        let fake = Arc::new(FakeStore::default());
        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy());
        sync.ensure_synced(dir.path(), "kb").await.unwrap();

        write(dir.path(), "policy.txt", "v2 with more text");
        let report = sync.sync(dir.path(), "kb").await.unwrap();

        assert!(report.uploaded.is_empty());
        assert_eq!(report.skipped, vec!["policy.txt"]);
    }

    #[tokio::test]
    async fn test_existing_store_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeStore::default());
        fake.add_store("fileSearchStores/other", "something-else");
        fake.add_store("fileSearchStores/existing", "kb");

        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy());
        let first = sync.ensure_synced(dir.path(), "kb").await.unwrap();
        let second = sync.ensure_synced(dir.path(), "kb").await.unwrap();

        assert_eq!(first, "fileSearchStores/existing");
        assert_eq!(second, first);
        assert_eq!(fake.state.lock().unwrap().created, 0);
    }

    #[tokio::test]
    async fn test_first_matching_store_wins() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeStore::default());
        fake.add_store("fileSearchStores/first", "kb");
        fake.add_store("fileSearchStores/second", "kb");

        let sync = KnowledgeBaseSync::new(fake, fast_policy());
        let id = sync.ensure_synced(dir.path(), "kb").await.unwrap();

        assert_eq!(id, "fileSearchStores/first");
    }

    #[tokio::test]
    async fn test_pinned_store_skips_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");

        let fake = Arc::new(FakeStore::default());
        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy())
            .with_pinned_store(Some("fileSearchStores/pinned".to_string()));

        let report = sync.sync(dir.path(), "kb").await.unwrap();

        assert_eq!(report.store_id, "fileSearchStores/pinned");
        assert_eq!(fake.state.lock().unwrap().created, 0);
        assert_eq!(fake.state.lock().unwrap().uploads[0].0, "fileSearchStores/pinned");
    }

    #[tokio::test]
    async fn test_unknown_extension_uploaded_as_text_plain() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.qqzx", "plain notes");

        let fake = Arc::new(FakeStore::default());
        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy());
        sync.ensure_synced(dir.path(), "kb").await.unwrap();

        let state = fake.state.lock().unwrap();
        assert_eq!(state.uploads[0].1, "notes.qqzx");
        assert_eq!(state.uploads[0].2, "text/plain");
    }

    #[tokio::test]
    async fn test_waits_for_each_operation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "a");
        write(dir.path(), "b.txt", "b");

        let fake = Arc::new(FakeStore::with_polls(3));
        let sync = KnowledgeBaseSync::new(fake.clone(), fast_policy());
        sync.ensure_synced(dir.path(), "kb").await.unwrap();

        assert_eq!(fake.state.lock().unwrap().polls, 6);
    }

    #[tokio::test]
    async fn test_poll_timeout_fails_sync() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "slow.txt", "slow");

        let mut mock = MockKnowledgeStoreClient::new();
        mock.expect_list_stores().returning(|| {
            Ok(vec![StoreInfo {
                name: "fileSearchStores/kb".to_string(),
                display_name: Some("kb".to_string()),
            }])
        });
        mock.expect_list_documents().returning(|_| Ok(vec![]));
        mock.expect_upload_document().times(1).returning(|_, _| {
            Ok(Operation {
                name: "operations/stuck".to_string(),
                done: false,
                error: None,
            })
        });
        mock.expect_get_operation().returning(|name| {
            Ok(Operation {
                name: name.to_string(),
                done: false,
                error: None,
            })
        });

        let policy = PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Some(Duration::from_millis(30)),
        };
        let sync = KnowledgeBaseSync::new(Arc::new(mock), policy);
        let err = sync.ensure_synced(dir.path(), "kb").await.unwrap_err();

        match err {
            BotError::OperationTimeout { name, .. } => assert_eq!(name, "operations/stuck"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_operation_fails_sync() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.bin", "\0\0");

        let mut mock = MockKnowledgeStoreClient::new();
        mock.expect_list_stores().returning(|| Ok(vec![]));
        mock.expect_create_store().returning(|name| {
            Ok(StoreInfo {
                name: "fileSearchStores/new".to_string(),
                display_name: Some(name.to_string()),
            })
        });
        mock.expect_list_documents().returning(|_| Ok(vec![]));
        mock.expect_upload_document().returning(|_, _| {
            Ok(Operation {
                name: "operations/bad".to_string(),
                done: true,
                error: Some(OperationStatus {
                    code: 3,
                    message: "unsupported mime type".to_string(),
                }),
            })
        });

        let sync = KnowledgeBaseSync::new(Arc::new(mock), fast_policy());
        let err = sync.ensure_synced(dir.path(), "kb").await.unwrap_err();

        assert!(matches!(err, BotError::OperationFailed { .. }));
        assert!(err.to_string().contains("unsupported mime type"));
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockKnowledgeStoreClient::new();
        mock.expect_list_stores().returning(|| {
            Err(BotError::Gemini {
                status: 403,
                body: "permission denied".to_string(),
            })
        });
        mock.expect_create_store().never();

        let sync = KnowledgeBaseSync::new(Arc::new(mock), fast_policy());
        let err = sync.ensure_synced(dir.path(), "kb").await.unwrap_err();

        assert!(matches!(err, BotError::Gemini { status: 403, .. }));
    }
}
