use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::types::{
    CreateStoreRequest, GenerateContentRequest, GenerateContentResponse, ListDocumentsResponse,
    ListStoresResponse, UploadMetadata,
};
use crate::config::GeminiConfig;
use crate::services::knowledge::{
    KnowledgeStoreClient, Operation, RemoteDocument, StoreInfo, UploadRequest,
};
use crate::utils::error::BotError;

const PAGE_SIZE: &str = "20";

/// REST client for the Gemini API (File Search stores and generateContent).
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url(), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("x-goog-api-key", &self.config.api_key)
    }

    async fn check(response: Response) -> Result<Response, BotError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(BotError::Gemini { status, body })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BotError> {
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BotError::InvalidResponse(format!("Failed to parse Gemini response: {}", e)))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page_token: Option<&str>,
    ) -> Result<T, BotError> {
        let mut query = vec![("pageSize", PAGE_SIZE)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .authorized(self.client.get(self.api_url(path)))
            .query(&query)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BotError> {
        let url = self.api_url(&format!("models/{}:generateContent", model));
        debug!("generateContent on {} with {} contents", model, request.contents.len());

        let response = self
            .authorized(self.client.post(url))
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl KnowledgeStoreClient for GeminiClient {
    async fn list_stores(&self) -> Result<Vec<StoreInfo>, BotError> {
        let mut stores = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page: ListStoresResponse =
                self.get_page("fileSearchStores", token.as_deref()).await?;
            stores.extend(page.file_search_stores);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!("Listed {} file search stores", stores.len());
        Ok(stores)
    }

    async fn create_store(&self, display_name: &str) -> Result<StoreInfo, BotError> {
        let response = self
            .authorized(self.client.post(self.api_url("fileSearchStores")))
            .json(&CreateStoreRequest { display_name })
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn list_documents(&self, store_id: &str) -> Result<Vec<RemoteDocument>, BotError> {
        let path = format!("{}/documents", store_id);
        let mut documents = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page: ListDocumentsResponse = self.get_page(&path, token.as_deref()).await?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(documents)
    }

    /// Resumable upload: a `start` call returns the session URL, then the
    /// bytes are sent with `upload, finalize`.
    async fn upload_document(
        &self,
        store_id: &str,
        request: UploadRequest,
    ) -> Result<Operation, BotError> {
        let start_url = format!(
            "{}/upload/v1beta/{}:uploadToFileSearchStore",
            self.base_url(),
            store_id
        );

        let start = self
            .authorized(self.client.post(start_url))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", request.bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", &request.mime_type)
            .json(&UploadMetadata {
                display_name: &request.display_name,
                mime_type: &request.mime_type,
            })
            .send()
            .await?;
        let start = Self::check(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                BotError::InvalidResponse("upload start returned no x-goog-upload-url".to_string())
            })?;

        debug!("Upload session opened for {}", request.display_name);

        let response = self
            .authorized(self.client.post(upload_url))
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(request.bytes)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, BotError> {
        let response = self
            .authorized(self.client.get(self.api_url(name)))
            .send()
            .await?;
        Self::read_json(response).await
    }
}
