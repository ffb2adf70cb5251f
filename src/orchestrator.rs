use chrono::Utc;

use crate::{
    export::export_collection,
    identity::IdentityResolver,
    migrate::{migrate_collection, MigrationOptions, ProgressSink},
    report::{MigrationResult, WorkflowReport},
    snapshot::SnapshotWriter,
    store::DocumentStore,
    throttle::Throttle,
    validate::validate,
    CollectionName, MigrationError, OwnerId,
};

/// Where a run currently is.
///
/// `Failed` is only reachable from `ResolvingIdentity`: once the owner is
/// known, per-collection failures are recorded and the run goes on to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ResolvingIdentity,
    Exporting(CollectionName),
    Migrating(CollectionName),
    Validating(CollectionName),
    Summarizing,
    Done,
    Failed,
}

/// Runs export, migrate and validate over each collection in turn.
pub struct Orchestrator<S, I> {
    store: S,
    identity: I,
    collections: Vec<CollectionName>,
    options: MigrationOptions,
    throttle: Throttle,
    snapshot: Option<SnapshotWriter>,
    progress: Box<dyn ProgressSink>,
    phase: Phase,
}

impl<S, I> Orchestrator<S, I>
where
    S: DocumentStore,
    I: IdentityResolver,
{
    pub fn new(store: S, identity: I) -> Self {
        Orchestrator {
            store,
            identity,
            collections: CollectionName::ALL.to_vec(),
            options: MigrationOptions::default(),
            throttle: Throttle::none(),
            snapshot: None,
            progress: Box::new(()),
            phase: Phase::Idle,
        }
    }

    /// Restrict the run to `collections`. They are still processed in the
    /// fixed order, whatever order they are given in.
    pub fn with_collections(mut self, collections: &[CollectionName]) -> Self {
        let mut collections = collections.to_vec();
        collections.sort();
        collections.dedup();
        self.collections = collections;
        self
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotWriter) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run the whole workflow.
    ///
    /// Only identity resolution can make this return an error. Everything
    /// after that ends up in the report.
    pub async fn run(&mut self) -> Result<WorkflowReport, MigrationError> {
        self.enter(Phase::Idle);
        let started_at = Utc::now();

        self.enter(Phase::ResolvingIdentity);
        let owner = match self.identity.resolve_owner_id().await {
            Ok(owner) => owner,
            Err(e) => {
                tracing::error!("Could not resolve the destination owner: {}", e);
                self.enter(Phase::Failed);
                return Err(e);
            }
        };
        tracing::info!(
            "Migrating {} collection(s) into {}/{}{}",
            self.collections.len(),
            crate::OWNER_ROOT,
            owner,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let mut results = Vec::with_capacity(self.collections.len());
        for (i, collection) in self.collections.clone().into_iter().enumerate() {
            if i > 0 {
                self.throttle.pause().await;
            }
            let result = self.process(collection, &owner).await;
            if !result.success {
                tracing::warn!(
                    "{} did not migrate cleanly ({} error(s))",
                    collection,
                    result.errors.len()
                );
            }
            results.push(result);
        }

        self.enter(Phase::Summarizing);
        let report = WorkflowReport::new(
            owner,
            results,
            started_at,
            Utc::now(),
            self.options.dry_run,
            self.snapshot.as_ref().map(|s| s.dir().to_path_buf()),
        );
        tracing::info!(
            "{}/{} collections passed, {} -> {} documents",
            report.passed_count(),
            report.results.len(),
            report.total_original,
            report.total_migrated
        );
        self.enter(Phase::Done);
        Ok(report)
    }

    async fn process(&mut self, collection: CollectionName, owner: &OwnerId) -> MigrationResult {
        let mut result = MigrationResult::new(collection);

        self.enter(Phase::Exporting(collection));
        let records = match export_collection(&self.store, collection).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("{}", e);
                result.errors.push(e.to_string());
                return result;
            }
        };
        result.original_count = records.len();
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.write(collection, &records) {
                tracing::warn!("{}, migrating {} without a snapshot", e, collection);
                result.warnings.push(e.to_string());
            }
        }

        self.enter(Phase::Migrating(collection));
        let outcome = match migrate_collection(
            &self.store,
            collection,
            &records,
            owner,
            &self.options,
            &*self.progress,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("{}", e);
                result.errors.push(e.to_string());
                return result;
            }
        };
        result.migrated_count = outcome.migrated_count;
        result.batches = outcome.batches;
        result.skipped = outcome.skipped;
        result.errors.extend(outcome.errors);

        if !self.options.dry_run {
            self.enter(Phase::Validating(collection));
            let sample_id = records.first().map(|r| r.id.as_str());
            match validate(&self.store, collection, records.len(), sample_id, owner).await {
                Ok(validation) => result.errors.extend(
                    validation
                        .mismatches(collection, records.len(), sample_id)
                        .into_iter()
                        .map(|e| e.to_string()),
                ),
                Err(e) => {
                    tracing::error!("{}", e);
                    result.errors.push(e.to_string());
                }
            }
        }

        result.success = result.errors.is_empty();
        result
    }
}
