// An in-process document store with the same semantics as the remote one.
// Used for dry previews and tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Mutex, MutexGuard},
};

use super::{split_document_path, DocumentStore, Page, StoreError, Write, MAX_BATCH_OPS};
use crate::Record;

type Collections = BTreeMap<String, BTreeMap<String, Map<String, Value>>>;

pub struct MemoryStore {
    collections: Mutex<Collections>,
    page_size: usize,
    commits: Mutex<Vec<usize>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(300)
    }

    /// Pages returned by `list_page` hold at most `page_size` documents.
    pub fn with_page_size(page_size: usize) -> Self {
        MemoryStore {
            collections: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            commits: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections.lock().expect("memory store poisoned")
    }

    /// Seed a collection directly, bypassing commit accounting.
    pub fn insert(&self, collection_path: &str, record: Record) {
        self.lock()
            .entry(collection_path.to_owned())
            .or_default()
            .insert(record.id, record.data);
    }

    /// Ids of a collection in listing order.
    pub fn ids(&self, collection_path: &str) -> Vec<String> {
        self.lock()
            .get(collection_path)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, collection_path: &str) -> usize {
        self.lock().get(collection_path).map_or(0, |docs| docs.len())
    }

    /// Number of writes in each commit applied so far, oldest first.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commits.lock().expect("memory store poisoned").clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_page(
        &self,
        collection_path: &str,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError> {
        let collections = self.lock();
        let Some(docs) = collections.get(collection_path) else {
            return Ok(Page::default());
        };
        // The page token is the last id handed out, like a resumable key scan.
        let lower = match page_token {
            Some(last) => Bound::Excluded(last.to_owned()),
            None => Bound::Unbounded,
        };
        let documents: Vec<Record> = docs
            .range((lower, Bound::Unbounded))
            .take(self.page_size)
            .map(|(id, data)| Record::new(id.clone(), data.clone()))
            .collect();
        let has_more = documents.last().map_or(false, |last| {
            docs.range((Bound::Excluded(last.id.clone()), Bound::Unbounded))
                .next()
                .is_some()
        });
        let next_page_token = if has_more {
            documents.last().map(|last| last.id.clone())
        } else {
            None
        };
        Ok(Page {
            documents,
            next_page_token,
        })
    }

    async fn get(&self, document_path: &str) -> Result<Option<Record>, StoreError> {
        let (parent, id) = split_document_path(document_path)?;
        Ok(self
            .lock()
            .get(parent)
            .and_then(|docs| docs.get(id))
            .map(|data| Record::new(id, data.clone())))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        if writes.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge {
                len: writes.len(),
                max: MAX_BATCH_OPS,
            });
        }
        // Validate everything first so a bad path leaves the store untouched.
        for write in &writes {
            split_document_path(write.path())?;
        }
        let len = writes.len();
        let mut collections = self.lock();
        for write in writes {
            match write {
                Write::Set { path, data } => {
                    let (parent, id) = split_document_path(&path)?;
                    collections
                        .entry(parent.to_owned())
                        .or_default()
                        .insert(id.to_owned(), data);
                }
                Write::Delete { path } => {
                    let (parent, id) = split_document_path(&path)?;
                    if let Some(docs) = collections.get_mut(parent) {
                        docs.remove(id);
                        if docs.is_empty() {
                            collections.remove(parent);
                        }
                    }
                }
            }
        }
        drop(collections);
        self.commits.lock().expect("memory store poisoned").push(len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    fn record(id: &str) -> Record {
        let data = json!({ "name": id }).as_object().cloned().unwrap();
        Record::new(id, data)
    }

    #[test(tokio::test)]
    async fn basic_ops() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        assert_eq!(store.get("parts/a").await?, None);

        store
            .commit(vec![Write::Set {
                path: "parts/a".into(),
                data: record("a").data,
            }])
            .await?;
        assert_eq!(store.get("parts/a").await?, Some(record("a")));
        assert!(store.exists("parts/a").await?);

        store
            .commit(vec![Write::Delete {
                path: "parts/a".into(),
            }])
            .await?;
        assert_eq!(store.get("parts/a").await?, None);
        assert!(store.is_empty("parts").await?);
        assert_eq!(store.commit_sizes(), vec![1, 1]);

        Ok(())
    }

    #[test(tokio::test)]
    async fn paging_resumes_after_last_id() -> Result<(), StoreError> {
        let store = MemoryStore::with_page_size(2);
        for id in ["a", "b", "c", "d", "e"] {
            store.insert("parts", record(id));
        }
        store.insert("partsArchive", record("z"));

        let first = store.list_page("parts", None).await?;
        assert_eq!(first.documents.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("b"));

        let all = store.list_all("parts").await?;
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(store.count("parts").await?, 5);

        Ok(())
    }

    #[test(tokio::test)]
    async fn oversized_or_invalid_commit_is_rejected_whole() {
        let store = MemoryStore::new();
        let writes: Vec<_> = (0..=MAX_BATCH_OPS)
            .map(|i| Write::Delete {
                path: format!("parts/{}", i),
            })
            .collect();
        assert!(matches!(
            store.commit(writes).await,
            Err(StoreError::BatchTooLarge { len: 501, max: 500 })
        ));

        let writes = vec![
            Write::Set {
                path: "parts/ok".into(),
                data: Map::new(),
            },
            Write::Set {
                path: "nope".into(),
                data: Map::new(),
            },
        ];
        assert!(store.commit(writes).await.is_err());
        assert_eq!(store.len("parts"), 0);
        assert!(store.commit_sizes().is_empty());
    }
}
