// On-disk export of each collection, written before migration as a recovery aid.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{CollectionName, MigrationError, Record};

pub const DEFAULT_SNAPSHOT_DIR: &str = "./migration-backup";

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub bytes: u64,
}

impl SnapshotWriter {
    /// Create the snapshot directory if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| MigrationError::Snapshot {
            path: dir.clone(),
            source,
        })?;
        Ok(SnapshotWriter { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, collection: CollectionName) -> PathBuf {
        self.dir.join(format!("{}.json", collection))
    }

    /// Write `records` as a pretty JSON array to `{dir}/{collection}.json`.
    pub fn write(
        &self,
        collection: CollectionName,
        records: &[Record],
    ) -> Result<SnapshotFile, MigrationError> {
        let path = self.path_for(collection);
        let to_error = |source: std::io::Error| MigrationError::Snapshot {
            path: path.clone(),
            source,
        };
        let file = File::create(&path).map_err(to_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)
            .map_err(|e| to_error(e.into()))?;
        writer.flush().map_err(to_error)?;
        let bytes = std::fs::metadata(&path).map_err(to_error)?.len();
        tracing::info!(
            "Saved {} snapshot to {} ({})",
            collection,
            path.display(),
            humansize::format_size(bytes, humansize::BINARY)
        );
        Ok(SnapshotFile { path, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::create(tmp.path().join("backup")).unwrap();
        let records = vec![
            Record::new("p1", json!({ "sku": "A-1" }).as_object().cloned().unwrap()),
            Record::new("p2", json!({ "sku": "A-2" }).as_object().cloned().unwrap()),
        ];
        let file = writer.write(CollectionName::Parts, &records).unwrap();
        assert_eq!(file.path, tmp.path().join("backup").join("parts.json"));
        assert!(file.bytes > 0);

        let text = std::fs::read_to_string(&file.path).unwrap();
        let loaded: Vec<Record> = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, records);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&text).unwrap()[0],
            json!({ "id": "p1", "data": { "sku": "A-1" } })
        );
    }

    #[test]
    fn test_snapshot_dir_is_a_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            SnapshotWriter::create(tmp.path()),
            Err(MigrationError::Snapshot { .. })
        ));
    }
}
