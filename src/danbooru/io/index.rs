use std::collections::{BTreeMap, BTreeSet};
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, from_value, to_string_pretty};

use crate::danbooru::io::AppPaths;

/// One entry of the artifact index: an artist name and the path of its cached
/// image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct ArtifactRecord {
    pub(crate) name: String,
    pub(crate) image: String,
}

/// The persisted name → artifact-path mapping, stored as a pretty-printed
/// JSON array sorted by name.
///
/// The index is derived data: the artist list is authoritative for identity,
/// and every write path here rewrites the whole file. [`ArtifactIndex::reconcile`]
/// is the only mutation entry point outside of the end-of-run
/// [`ArtifactIndex::rebuild`], so delete-then-insert ordering always lands in a
/// single rewrite.
pub(crate) struct ArtifactIndex {
    path: PathBuf,
}

impl ArtifactIndex {
    pub(crate) fn new(paths: &AppPaths) -> Self {
        ArtifactIndex {
            path: paths.data_file(),
        }
    }

    /// Loads the current records. Fails soft: a missing or unparsable file is
    /// treated as an empty index, and malformed individual entries are skipped
    /// with a warning instead of poisoning the load.
    pub(crate) fn records(&self) -> Vec<ArtifactRecord> {
        if !self.path.exists() {
            return Vec::new();
        }

        let contents = match read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(
                    "unable to read {}: {}; treating index as empty",
                    self.path.display(),
                    err
                );
                return Vec::new();
            }
        };

        let values: Vec<Value> = match from_str(&contents) {
            Ok(values) => values,
            Err(err) => {
                warn!(
                    "unable to parse {}: {}; treating index as empty",
                    self.path.display(),
                    err
                );
                return Vec::new();
            }
        };

        values
            .into_iter()
            .filter_map(|value| match from_value::<ArtifactRecord>(value) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("skipping malformed index entry: {}", err);
                    None
                }
            })
            .collect()
    }

    /// The current records as a name → path map.
    pub(crate) fn resolved_map(&self) -> BTreeMap<String, String> {
        self.records()
            .into_iter()
            .map(|record| (record.name, record.image))
            .collect()
    }

    /// Applies a delete and/or an upsert as one whole-file rewrite: load,
    /// drop any record named `delete`, drop any record matching the upsert
    /// name before appending the new one, re-sort, write back.
    pub(crate) fn reconcile(
        &self,
        delete: Option<&str>,
        upsert: Option<ArtifactRecord>,
    ) -> Result<(), Error> {
        let mut records = self.records();

        if let Some(name) = delete {
            records.retain(|record| record.name != name);
        }
        if let Some(record) = upsert {
            records.retain(|existing| existing.name != record.name);
            records.push(record);
        }

        self.write(records)
    }

    /// Replaces the index with exactly the resolved entries whose name is
    /// still present in the artist list and whose file still exists on disk.
    /// Stale records for deleted artists disappear here.
    pub(crate) fn rebuild(
        &self,
        resolved: &BTreeMap<String, String>,
        names: &BTreeSet<String>,
    ) -> Result<(), Error> {
        let records = resolved
            .iter()
            .filter(|(name, _)| names.contains(*name))
            .filter(|(name, image)| {
                let present = Path::new(image).exists();
                if !present {
                    debug!("dropping index record for {:?}: {:?} is gone", name, image);
                }
                present
            })
            .map(|(name, image)| ArtifactRecord {
                name: name.clone(),
                image: image.clone(),
            })
            .collect();

        self.write(records)
    }

    fn write(&self, mut records: Vec<ArtifactRecord>) -> Result<(), Error> {
        records.sort_by(|a, b| a.name.cmp(&b.name));
        let json = to_string_pretty(&records)?;
        write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, image: &str) -> ArtifactRecord {
        ArtifactRecord {
            name: name.to_string(),
            image: image.to_string(),
        }
    }

    #[test]
    fn reconcile_applies_delete_then_upsert_and_sorts() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let index = ArtifactIndex::new(&paths);

        index.reconcile(None, Some(record("mid", "m.jpg"))).unwrap();
        index.reconcile(None, Some(record("zed", "z.jpg"))).unwrap();
        index.reconcile(None, Some(record("abe", "a.jpg"))).unwrap();
        // Replacing an existing name keeps the index free of duplicates.
        index.reconcile(Some("zed"), Some(record("mid", "m2.jpg"))).unwrap();

        let records = index.records();
        assert_eq!(records, vec![record("abe", "a.jpg"), record("mid", "m2.jpg")]);
    }

    #[test]
    fn parse_failure_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        std::fs::write(paths.data_file(), "not json at all").unwrap();

        let index = ArtifactIndex::new(&paths);
        assert!(index.records().is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        std::fs::write(
            paths.data_file(),
            r#"[{"name":"alice","image":"a.jpg"},{"wat":1},"loose string"]"#,
        )
        .unwrap();

        let index = ArtifactIndex::new(&paths);
        assert_eq!(index.records(), vec![record("alice", "a.jpg")]);
    }

    #[test]
    fn rebuild_prunes_names_missing_from_store() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let index = ArtifactIndex::new(&paths);

        let alice = dir.path().join("alice.jpg");
        let bob = dir.path().join("bob.jpg");
        std::fs::write(&alice, b"x").unwrap();
        std::fs::write(&bob, b"x").unwrap();

        let mut resolved = BTreeMap::new();
        resolved.insert("alice".to_string(), alice.display().to_string());
        resolved.insert("bob".to_string(), bob.display().to_string());
        resolved.insert("gone".to_string(), "nowhere.jpg".to_string());

        let names: BTreeSet<String> = ["alice", "bob"].iter().map(|s| s.to_string()).collect();
        index.rebuild(&resolved, &names).unwrap();

        let records = index.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "alice");
        assert_eq!(records[1].name, "bob");
    }

    #[test]
    fn rebuild_drops_records_whose_file_is_gone() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let index = ArtifactIndex::new(&paths);

        let mut resolved = BTreeMap::new();
        resolved.insert("alice".to_string(), "vanished.jpg".to_string());
        let names: BTreeSet<String> = ["alice".to_string()].into_iter().collect();

        index.rebuild(&resolved, &names).unwrap();
        assert!(index.records().is_empty());
    }

    #[test]
    fn index_round_trips_with_unescaped_unicode() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let index = ArtifactIndex::new(&paths);

        index
            .reconcile(None, Some(record("画師", "images/画師.jpg")))
            .unwrap();

        let raw = std::fs::read_to_string(paths.data_file()).unwrap();
        assert!(raw.contains("画師"));
        assert_eq!(index.records(), vec![record("画師", "images/画師.jpg")]);
    }
}
