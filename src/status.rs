// Read-only view of how far a migration has got for one owner.

use serde::Serialize;
use std::fmt;

use crate::{
    store::DocumentStore,
    throttle::Throttle,
    validate::{validate, Validation},
    CollectionName, MigrationError, OwnerId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatus {
    pub collection: CollectionName,
    pub source_count: usize,
    pub destination_count: usize,
}

impl CollectionStatus {
    pub fn migrated(&self) -> bool {
        self.destination_count > 0
    }

    pub fn needs_migration(&self) -> bool {
        self.source_count > 0 && self.destination_count == 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub owner_id: OwnerId,
    pub collections: Vec<CollectionStatus>,
}

impl StatusReport {
    pub fn migrated_collections(&self) -> usize {
        self.collections.iter().filter(|c| c.migrated()).count()
    }

    pub fn pending_collections(&self) -> usize {
        self.collections.iter().filter(|c| c.needs_migration()).count()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Owner: {}", self.owner_id)?;
        writeln!(
            f,
            "{:<16}{:>10}{:>10}  {}",
            "Collection", "Global", "Owner", "State"
        )?;
        for status in &self.collections {
            let state = if status.needs_migration() {
                "pending"
            } else if status.migrated() {
                "migrated"
            } else {
                "empty"
            };
            writeln!(
                f,
                "{:<16}{:>10}{:>10}  {}",
                status.collection.as_str(),
                status.source_count,
                status.destination_count,
                state
            )?;
        }
        write!(
            f,
            "{} migrated, {} pending, {} total",
            self.migrated_collections(),
            self.pending_collections(),
            self.collections.len()
        )
    }
}

/// Count each global collection and its scoped copy under `owner`.
pub async fn collect_status<S>(
    store: &S,
    owner: &OwnerId,
    collections: &[CollectionName],
    throttle: Throttle,
) -> Result<StatusReport, MigrationError>
where
    S: DocumentStore + ?Sized,
{
    let mut statuses = Vec::with_capacity(collections.len());
    for (i, &collection) in collections.iter().enumerate() {
        if i > 0 {
            throttle.pause().await;
        }
        let source_count = store
            .count(&collection.source_path())
            .await
            .map_err(|source| MigrationError::SourceRead { collection, source })?;
        let destination = owner.scoped_path(collection);
        let destination_count =
            store
                .count(&destination)
                .await
                .map_err(|source| MigrationError::DestinationRead {
                    path: destination.clone(),
                    source,
                })?;
        tracing::debug!(
            "{}: {} global, {} under {}",
            collection,
            source_count,
            destination_count,
            owner
        );
        statuses.push(CollectionStatus {
            collection,
            source_count,
            destination_count,
        });
    }
    Ok(StatusReport {
        owner_id: owner.clone(),
        collections: statuses,
    })
}

/// Validation of one collection against its global source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCheck {
    pub collection: CollectionName,
    pub source_count: usize,
    pub sample_id: Option<String>,
    pub validation: Validation,
}

impl CollectionCheck {
    pub fn errors(&self) -> Vec<MigrationError> {
        self.validation.mismatches(
            self.collection,
            self.source_count,
            self.sample_id.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub owner_id: OwnerId,
    pub checks: Vec<CollectionCheck>,
    pub all_valid: bool,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Owner: {}", self.owner_id)?;
        writeln!(
            f,
            "{:<16}{:>10}{:>10}  {}",
            "Collection", "Global", "Owner", "Check"
        )?;
        for check in &self.checks {
            writeln!(
                f,
                "{:<16}{:>10}{:>10}  {}",
                check.collection.as_str(),
                check.source_count,
                check.validation.destination_count,
                if check.validation.passed() { "PASS" } else { "FAIL" }
            )?;
            for error in check.errors() {
                writeln!(f, "    {}", error)?;
            }
        }
        let passed = self.checks.iter().filter(|c| c.validation.passed()).count();
        write!(f, "{}/{} collections valid", passed, self.checks.len())
    }
}

/// Re-run validation for every collection using the current global data as
/// the expectation. Writes nothing.
pub async fn check_migrations<S>(
    store: &S,
    owner: &OwnerId,
    collections: &[CollectionName],
    throttle: Throttle,
) -> Result<CheckReport, MigrationError>
where
    S: DocumentStore + ?Sized,
{
    let mut checks = Vec::with_capacity(collections.len());
    for (i, &collection) in collections.iter().enumerate() {
        if i > 0 {
            throttle.pause().await;
        }
        let source = collection.source_path();
        let source_count = store
            .count(&source)
            .await
            .map_err(|source| MigrationError::SourceRead { collection, source })?;
        let sample_id = store
            .first(&source)
            .await
            .map_err(|source| MigrationError::SourceRead { collection, source })?
            .map(|record| record.id);
        let validation =
            validate(store, collection, source_count, sample_id.as_deref(), owner).await?;
        checks.push(CollectionCheck {
            collection,
            source_count,
            sample_id,
            validation,
        });
    }
    let all_valid = checks.iter().all(|c| c.validation.passed());
    Ok(CheckReport {
        owner_id: owner.clone(),
        checks,
        all_valid,
    })
}
