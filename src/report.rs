use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{CollectionName, MigrationError, OwnerId};

/// Outcome of export, migrate and validate for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub collection: CollectionName,
    pub original_count: usize,
    pub migrated_count: usize,
    pub success: bool,
    pub errors: Vec<String>,
    /// Problems that do not affect the migrated data, such as a failed snapshot.
    pub warnings: Vec<String>,
    /// Guard mode refused to write.
    pub skipped: bool,
    pub batches: usize,
}

impl MigrationResult {
    pub fn new(collection: CollectionName) -> Self {
        MigrationResult {
            collection,
            original_count: 0,
            migrated_count: 0,
            success: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            skipped: false,
            batches: 0,
        }
    }

    fn status(&self, dry_run: bool) -> &'static str {
        match (self.success, self.skipped, dry_run) {
            (false, _, _) => "FAIL",
            (true, true, _) => "SKIP",
            (true, false, true) => "DRY",
            (true, false, false) => "PASS",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub owner_id: OwnerId,
    pub results: Vec<MigrationResult>,
    pub total_original: usize,
    pub total_migrated: usize,
    pub overall_success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub snapshot_dir: Option<PathBuf>,
}

impl WorkflowReport {
    pub fn new(
        owner_id: OwnerId,
        results: Vec<MigrationResult>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        dry_run: bool,
        snapshot_dir: Option<PathBuf>,
    ) -> Self {
        let total_original = results.iter().map(|r| r.original_count).sum();
        let total_migrated = results.iter().map(|r| r.migrated_count).sum();
        let overall_success = results.iter().all(|r| r.success);
        WorkflowReport {
            owner_id,
            results,
            total_original,
            total_migrated,
            overall_success,
            started_at,
            finished_at,
            dry_run,
            snapshot_dir,
        }
    }

    pub fn result(&self, collection: CollectionName) -> Option<&MigrationResult> {
        self.results.iter().find(|r| r.collection == collection)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Save the report as pretty JSON at `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), MigrationError> {
        let to_error = |source: std::io::Error| MigrationError::ReportWrite {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(to_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| to_error(e.into()))?;
        writer.flush().map_err(to_error)
    }
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Owner: {}", self.owner_id)?;
        if let Some(dir) = &self.snapshot_dir {
            writeln!(f, "Snapshot: {}", dir.display())?;
        }
        writeln!(
            f,
            "{:<16}{:>10}{:>10}  {}",
            "Collection", "Original", "Migrated", "Status"
        )?;
        for result in &self.results {
            writeln!(
                f,
                "{:<16}{:>10}{:>10}  {}",
                result.collection.as_str(),
                result.original_count,
                result.migrated_count,
                result.status(self.dry_run)
            )?;
            for error in &result.errors {
                writeln!(f, "    {}", error)?;
            }
            for warning in &result.warnings {
                writeln!(f, "    warning: {}", warning)?;
            }
        }
        writeln!(
            f,
            "{:<16}{:>10}{:>10}",
            "Total", self.total_original, self.total_migrated
        )?;
        write!(
            f,
            "{}/{} collections passed{}",
            self.passed_count(),
            self.results.len(),
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(collection: CollectionName, n: usize, success: bool) -> MigrationResult {
        MigrationResult {
            original_count: n,
            migrated_count: if success { n } else { 0 },
            success,
            ..MigrationResult::new(collection)
        }
    }

    #[test]
    fn test_totals_and_overall() {
        let now = Utc::now();
        let owner = OwnerId::new("u1").unwrap();
        let mut failed = result(CollectionName::Customers, 2, false);
        failed.errors.push("batch 1 of customers failed: boom".into());
        let report = WorkflowReport::new(
            owner,
            vec![result(CollectionName::Parts, 3, true), failed],
            now,
            now,
            false,
            None,
        );
        assert_eq!(report.total_original, 5);
        assert_eq!(report.total_migrated, 3);
        assert!(!report.overall_success);
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.result(CollectionName::Parts).unwrap().migrated_count, 3);

        let table = report.to_string();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "Owner: u1");
        assert_eq!(lines[2], "parts                    3         3  PASS");
        assert_eq!(lines[3], "customers                2         0  FAIL");
        assert_eq!(lines[4], "    batch 1 of customers failed: boom");
        assert_eq!(lines.last().unwrap(), &"1/2 collections passed");
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let now = Utc::now();
        let mut parts = result(CollectionName::Parts, 3, true);
        parts.warnings.push("failed to write snapshot parts.json".into());
        let report = WorkflowReport::new(
            OwnerId::new("u1").unwrap(),
            vec![parts],
            now,
            now,
            false,
            None,
        );
        assert!(report.overall_success);
        let table = report.to_string();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[2], "parts                    3         3  PASS");
        assert_eq!(lines[3], "    warning: failed to write snapshot parts.json");
    }

    #[test]
    fn test_write_json() {
        let now = Utc::now();
        let report = WorkflowReport::new(
            OwnerId::new("u1").unwrap(),
            vec![result(CollectionName::Parts, 3, true)],
            now,
            now,
            false,
            None,
        );
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.json");
        report.write_json(&path).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["results"][0]["migratedCount"], 3);

        let missing = tmp.path().join("missing").join("report.json");
        let err = report.write_json(&missing).unwrap_err();
        assert!(matches!(err, MigrationError::ReportWrite { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_empty_report_succeeds() {
        let now = Utc::now();
        let report =
            WorkflowReport::new(OwnerId::new("u1").unwrap(), vec![], now, now, true, None);
        assert!(report.overall_success);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ownerId"], "u1");
        assert_eq!(json["dryRun"], true);
    }
}
