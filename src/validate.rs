use serde::Serialize;

use crate::{
    document_path,
    store::{DocumentStore, StoreError},
    CollectionName, MigrationError, OwnerId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// Destination holds exactly the expected number of documents.
    pub count_match: bool,
    /// The first exported document exists at the destination.
    pub sample_ok: bool,
    pub destination_count: usize,
}

impl Validation {
    pub fn passed(&self) -> bool {
        self.count_match && self.sample_ok
    }

    /// Describe each failed check, for the collection's error list.
    pub fn mismatches(
        &self,
        collection: CollectionName,
        expected: usize,
        sample_id: Option<&str>,
    ) -> Vec<MigrationError> {
        let mut errors = Vec::new();
        if !self.count_match {
            errors.push(MigrationError::ValidationMismatch {
                collection,
                detail: format!(
                    "expected {} documents, found {}",
                    expected, self.destination_count
                ),
            });
        }
        if !self.sample_ok {
            errors.push(MigrationError::ValidationMismatch {
                collection,
                detail: format!(
                    "sample document {} missing at destination",
                    sample_id.unwrap_or("<none>")
                ),
            });
        }
        errors
    }
}

/// Read-only check of `users/{owner}/{collection}` after a migration.
///
/// Only existence of the sample is checked, not its fields.
pub async fn validate<S>(
    store: &S,
    collection: CollectionName,
    expected_count: usize,
    sample_id: Option<&str>,
    owner: &OwnerId,
) -> Result<Validation, MigrationError>
where
    S: DocumentStore + ?Sized,
{
    if expected_count == 0 {
        return Ok(Validation {
            count_match: true,
            sample_ok: true,
            destination_count: 0,
        });
    }
    let destination = owner.scoped_path(collection);
    let read_error = |source: StoreError| MigrationError::DestinationRead {
        path: destination.clone(),
        source,
    };

    let destination_count = store.count(&destination).await.map_err(read_error)?;
    let count_match = destination_count == expected_count;
    let sample_ok = match sample_id {
        Some(id) => store
            .exists(&document_path(&destination, id))
            .await
            .map_err(read_error)?,
        None => false,
    };

    if count_match {
        tracing::info!(
            "{}: {} -> {} documents, counts match",
            collection,
            expected_count,
            destination_count
        );
    } else {
        tracing::error!(
            "{}: {} -> {} documents, counts differ",
            collection,
            expected_count,
            destination_count
        );
    }
    if !sample_ok {
        tracing::error!(
            "Sample document {:?} of {} not found at {}",
            sample_id,
            collection,
            destination
        );
    }
    Ok(Validation {
        count_match,
        sample_ok,
        destination_count,
    })
}
