use crate::{store::DocumentStore, CollectionName, MigrationError, Record};

/// Read every document of a global collection, in store order.
pub async fn export_collection<S>(
    store: &S,
    collection: CollectionName,
) -> Result<Vec<Record>, MigrationError>
where
    S: DocumentStore + ?Sized,
{
    tracing::info!("Exporting {}", collection);
    let records = store
        .list_all(&collection.source_path())
        .await
        .map_err(|source| MigrationError::SourceRead { collection, source })?;
    tracing::info!("Exported {} documents from {}", records.len(), collection);
    Ok(records)
}
