// Remove migrated data from an owner's scope. Only ever run on request, and
// only ever against `users/{owner}/...`: the global collections are not touched.

use crate::{
    document_path,
    migrate::check_batch_limit,
    store::{DocumentStore, Write},
    throttle::Throttle,
    CollectionName, MigrationError, OwnerId,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub deleted_count: usize,
    pub errors: Vec<String>,
}

/// Delete every document under `users/{owner}/{collection}` in batches of
/// at most `batch_limit`.
pub async fn rollback<S>(
    store: &S,
    collection: CollectionName,
    owner: &OwnerId,
    batch_limit: usize,
) -> Result<RollbackOutcome, MigrationError>
where
    S: DocumentStore + ?Sized,
{
    check_batch_limit(batch_limit)?;
    let destination = owner.scoped_path(collection);
    let documents = store
        .list_all(&destination)
        .await
        .map_err(|source| MigrationError::DestinationRead {
            path: destination.clone(),
            source,
        })?;
    let mut outcome = RollbackOutcome::default();
    if documents.is_empty() {
        tracing::info!("Nothing to clean up in {}", destination);
        return Ok(outcome);
    }

    tracing::info!("Cleaning up {} documents in {}", documents.len(), destination);
    for (i, chunk) in documents.chunks(batch_limit).enumerate() {
        let writes = chunk
            .iter()
            .map(|record| Write::Delete {
                path: document_path(&destination, &record.id),
            })
            .collect();
        match store.commit(writes).await {
            Ok(()) => outcome.deleted_count += chunk.len(),
            Err(source) => {
                let e = MigrationError::BatchWrite {
                    collection,
                    index: i + 1,
                    source,
                };
                tracing::error!("{}", e);
                outcome.errors.push(e.to_string());
            }
        }
    }
    tracing::info!("Cleaned up {} documents in {}", outcome.deleted_count, destination);
    Ok(outcome)
}

/// Roll back several collections for one owner, in order.
///
/// A collection that fails to roll back does not stop the others.
pub async fn rollback_owner<S>(
    store: &S,
    owner: &OwnerId,
    collections: &[CollectionName],
    batch_limit: usize,
    throttle: Throttle,
) -> Vec<(CollectionName, RollbackOutcome)>
where
    S: DocumentStore + ?Sized,
{
    let mut results = Vec::with_capacity(collections.len());
    for (i, &collection) in collections.iter().enumerate() {
        if i > 0 {
            throttle.pause().await;
        }
        let outcome = match rollback(store, collection, owner, batch_limit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Rollback of {} failed: {}", collection, e);
                RollbackOutcome {
                    deleted_count: 0,
                    errors: vec![e.to_string()],
                }
            }
        };
        results.push((collection, outcome));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, Record};
    use serde_json::Map;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_rollback_leaves_source_alone() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let id = format!("p{}", i);
            store.insert("parts", Record::new(id.clone(), Map::new()));
            store.insert("users/u1/parts", Record::new(id.clone(), Map::new()));
            store.insert("users/u2/parts", Record::new(id, Map::new()));
        }
        let owner = OwnerId::new("u1").unwrap();

        let outcome = rollback(&store, CollectionName::Parts, &owner, 2)
            .await
            .unwrap();
        assert_eq!(outcome.deleted_count, 5);
        assert!(outcome.errors.is_empty());
        assert_eq!(store.commit_sizes(), vec![2, 2, 1]);
        assert_eq!(store.len("users/u1/parts"), 0);
        assert_eq!(store.len("users/u2/parts"), 5);
        assert_eq!(store.len("parts"), 5);
    }

    #[test(tokio::test)]
    async fn test_rollback_owner_covers_each_collection() {
        let store = MemoryStore::new();
        store.insert("users/u1/parts", Record::new("p1", Map::new()));
        store.insert("users/u1/invoices", Record::new("i1", Map::new()));
        store.insert("users/u1/invoices", Record::new("i2", Map::new()));
        let owner = OwnerId::new("u1").unwrap();

        let results = rollback_owner(
            &store,
            &owner,
            &CollectionName::ALL,
            400,
            Throttle::none(),
        )
        .await;
        assert_eq!(results.len(), CollectionName::ALL.len());
        let deleted: usize = results.iter().map(|(_, o)| o.deleted_count).sum();
        assert_eq!(deleted, 3);
        assert_eq!(results[0].0, CollectionName::Parts);
        assert_eq!(results[0].1.deleted_count, 1);
        assert_eq!(store.len("users/u1/invoices"), 0);
    }
}
