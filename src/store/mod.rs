use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::Record;

pub mod firestore;
pub mod memory;

pub use firestore::{Credential, FirestoreClient};
pub use memory::MemoryStore;

/// Hard cap on the number of writes a single atomic commit may carry.
pub const MAX_BATCH_OPS: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("not authenticated")]
    Unauthenticated,
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid document path {0:?}")]
    InvalidPath(String),
    #[error("batch of {len} writes exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
}

/// One operation inside an atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or overwrite the document at `path`.
    Set {
        path: String,
        data: Map<String, Value>,
    },
    Delete {
        path: String,
    },
}

impl Write {
    pub fn path(&self) -> &str {
        match self {
            Write::Set { path, .. } | Write::Delete { path } => path,
        }
    }
}

#[derive(Debug, Default)]
pub struct Page {
    pub documents: Vec<Record>,
    pub next_page_token: Option<String>,
}

/// A remote document database addressed by slash-separated paths.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one page of the collection at `collection_path`.
    async fn list_page(
        &self,
        collection_path: &str,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError>;

    async fn get(&self, document_path: &str) -> Result<Option<Record>, StoreError>;

    /// Apply every write atomically. At most `MAX_BATCH_OPS` writes.
    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;

    /// Every document of a collection, following page tokens until exhausted.
    async fn list_all(&self, collection_path: &str) -> Result<Vec<Record>, StoreError> {
        let mut documents = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = self.list_page(collection_path, token.as_deref()).await?;
            pages += 1;
            documents.extend(page.documents);
            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        tracing::debug!(
            "Listed {} documents from {} in {} page(s)",
            documents.len(),
            collection_path,
            pages
        );
        Ok(documents)
    }

    async fn count(&self, collection_path: &str) -> Result<usize, StoreError> {
        Ok(self.list_all(collection_path).await?.len())
    }

    async fn exists(&self, document_path: &str) -> Result<bool, StoreError> {
        Ok(self.get(document_path).await?.is_some())
    }

    /// Some document of the collection, or `None` when it is empty.
    async fn first(&self, collection_path: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .list_page(collection_path, None)
            .await?
            .documents
            .into_iter()
            .next())
    }

    async fn is_empty(&self, collection_path: &str) -> Result<bool, StoreError> {
        Ok(self.first(collection_path).await?.is_none())
    }
}

/// Split `a/b/c/id` into (`a/b/c`, `id`).
pub fn split_document_path(path: &str) -> Result<(&str, &str), StoreError> {
    match path.rsplit_once('/') {
        Some((parent, id)) if !parent.is_empty() && !id.is_empty() => Ok((parent, id)),
        _ => Err(StoreError::InvalidPath(path.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_document_path() {
        assert_eq!(
            split_document_path("users/u1/parts/p1").unwrap(),
            ("users/u1/parts", "p1")
        );
        assert!(split_document_path("parts").is_err());
        assert!(split_document_path("parts/").is_err());
    }
}
