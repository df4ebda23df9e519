use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::utils::error::BotError;

pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// A sync candidate found in the local knowledge folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Filename, used as the remote display name and dedup key.
    pub file_name: String,
    pub path: PathBuf,
}

pub struct DocumentLoader;

impl DocumentLoader {
    /// List the regular files directly inside `folder`, sorted by name.
    /// Subdirectories are not descended into.
    pub async fn scan(folder: &Path) -> Result<Vec<LocalFile>, BotError> {
        let mut entries = tokio::fs::read_dir(folder).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // metadata() follows symlinks
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping unreadable entry {:?}: {}", path, e);
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(file_name) => files.push(LocalFile { file_name, path }),
                Err(raw) => {
                    warn!("Skipping file with non UTF-8 name: {:?}", raw);
                }
            }
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        debug!("Found {} candidate files in {:?}", files.len(), folder);

        Ok(files)
    }

    pub async fn load_file(path: &Path) -> Result<Vec<u8>, BotError> {
        let content = tokio::fs::read(path).await?;
        debug!("Loaded file: {:?} ({} bytes)", path, content.len());
        Ok(content)
    }

    /// MIME type from the filename extension, `text/plain` when unknown.
    pub fn detect_mime_type(file_name: &str) -> String {
        mime_guess::from_path(file_name)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
    }
}
