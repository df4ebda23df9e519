use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::BotError;

/// A remote document store as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    /// Remote-assigned identifier, e.g. `fileSearchStores/abc123`.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A document already indexed in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Long-running operation handle returned by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub display_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Remote knowledge-store operations the sync engine depends on.
///
/// Listing methods return every item; implementations follow pagination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeStoreClient: Send + Sync {
    async fn list_stores(&self) -> Result<Vec<StoreInfo>, BotError>;

    async fn create_store(&self, display_name: &str) -> Result<StoreInfo, BotError>;

    async fn list_documents(&self, store_id: &str) -> Result<Vec<RemoteDocument>, BotError>;

    async fn upload_document(
        &self,
        store_id: &str,
        request: UploadRequest,
    ) -> Result<Operation, BotError>;

    async fn get_operation(&self, name: &str) -> Result<Operation, BotError>;
}
