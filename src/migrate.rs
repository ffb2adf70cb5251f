use crate::{
    document_path,
    store::{DocumentStore, Write, MAX_BATCH_OPS},
    CollectionName, MigrationError, OwnerId, Record,
};

/// Writes per batch by default, leaving headroom under `MAX_BATCH_OPS`.
pub const DEFAULT_BATCH_LIMIT: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOptions {
    pub batch_limit: usize,
    /// Refuse to migrate into a destination that already holds documents.
    pub guard: bool,
    /// Compute everything, write nothing.
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        MigrationOptions {
            batch_limit: DEFAULT_BATCH_LIMIT,
            guard: false,
            dry_run: false,
        }
    }
}

impl MigrationOptions {
    pub fn new(batch_limit: usize) -> Result<Self, MigrationError> {
        check_batch_limit(batch_limit)?;
        Ok(MigrationOptions {
            batch_limit,
            ..Default::default()
        })
    }

    pub fn with_guard(mut self, guard: bool) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

pub fn check_batch_limit(batch_limit: usize) -> Result<(), MigrationError> {
    if batch_limit == 0 || batch_limit > MAX_BATCH_OPS {
        return Err(MigrationError::Config(format!(
            "batch limit must be between 1 and {}, got {}",
            MAX_BATCH_OPS, batch_limit
        )));
    }
    Ok(())
}

/// Receives progress while a collection is being written.
pub trait ProgressSink: Send + Sync {
    fn collection_started(&self, _collection: CollectionName, _records: usize) {}
    fn batch_committed(&self, _collection: CollectionName, _records: usize) {}
    fn collection_finished(&self, _collection: CollectionName) {}
}

impl ProgressSink for () {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateOutcome {
    /// Documents in batches that committed (or would have, in a dry run).
    pub migrated_count: usize,
    /// One entry per failed batch.
    pub errors: Vec<String>,
    pub batches: usize,
    /// Guard mode found existing documents and nothing was written.
    pub skipped: bool,
}

/// Copy `records` to `users/{owner}/{collection}/{id}`, one atomic commit per
/// chunk of at most `options.batch_limit` records.
///
/// A failing chunk is recorded and the remaining chunks are still attempted.
pub async fn migrate_collection<S>(
    store: &S,
    collection: CollectionName,
    records: &[Record],
    owner: &OwnerId,
    options: &MigrationOptions,
    progress: &dyn ProgressSink,
) -> Result<MigrateOutcome, MigrationError>
where
    S: DocumentStore + ?Sized,
{
    if records.is_empty() {
        tracing::info!("No documents to migrate for {}", collection);
        return Ok(MigrateOutcome::default());
    }
    check_batch_limit(options.batch_limit)?;

    let destination = owner.scoped_path(collection);
    if options.guard {
        let empty = store
            .is_empty(&destination)
            .await
            .map_err(|source| MigrationError::DestinationRead {
                path: destination.clone(),
                source,
            })?;
        if !empty {
            tracing::warn!(
                "{} already has documents, skipping migration of {}",
                destination,
                collection
            );
            return Ok(MigrateOutcome {
                skipped: true,
                ..Default::default()
            });
        }
    }

    let chunks: Vec<&[Record]> = records.chunks(options.batch_limit).collect();
    let total = chunks.len();
    if options.dry_run {
        tracing::info!(
            "Dry run: would migrate {} documents from {} to {} in {} batch(es)",
            records.len(),
            collection,
            destination,
            total
        );
        return Ok(MigrateOutcome {
            migrated_count: records.len(),
            batches: total,
            ..Default::default()
        });
    }

    tracing::info!(
        "Migrating {} documents from {} to {} in {} batch(es)",
        records.len(),
        collection,
        destination,
        total
    );
    progress.collection_started(collection, records.len());
    let mut outcome = MigrateOutcome {
        batches: total,
        ..Default::default()
    };
    for (i, chunk) in chunks.into_iter().enumerate() {
        let index = i + 1;
        let writes = chunk
            .iter()
            .map(|record| Write::Set {
                path: document_path(&destination, &record.id),
                data: record.data.clone(),
            })
            .collect();
        match store.commit(writes).await {
            Ok(()) => {
                outcome.migrated_count += chunk.len();
                progress.batch_committed(collection, chunk.len());
                tracing::debug!("Batch {}/{} of {} committed", index, total, collection);
            }
            Err(source) => {
                let e = MigrationError::BatchWrite {
                    collection,
                    index,
                    source,
                };
                tracing::error!("{}", e);
                outcome.errors.push(e.to_string());
            }
        }
    }
    progress.collection_finished(collection);
    tracing::info!(
        "Migrated {}/{} documents of {}",
        outcome.migrated_count,
        records.len(),
        collection
    );
    Ok(outcome)
}
