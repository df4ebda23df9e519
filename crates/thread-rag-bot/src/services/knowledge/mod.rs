//! Knowledge-base synchronization
//!
//! Pushes every regular file of a local folder into a remote document store,
//! skipping files whose name is already indexed there.

pub mod loader;
pub mod store;
pub mod sync;

pub use loader::{DocumentLoader, LocalFile};
pub use store::{KnowledgeStoreClient, Operation, RemoteDocument, StoreInfo, UploadRequest};
pub use sync::{KnowledgeBaseSync, PollPolicy, SyncReport};
