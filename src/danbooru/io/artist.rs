use std::collections::BTreeSet;
use std::fs::{read_to_string, write};
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::danbooru::io::AppPaths;

lazy_static! {
    /// Delimiters accepted by batch import: comma, semicolon, newline and
    /// their full-width variants.
    pub(crate) static ref BATCH_DELIMITERS: Regex = Regex::new(r"[,;\n，；]+").unwrap();
}

/// Errors raised by the artist list.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// The target name of a rename is already taken.
    #[error("artist {0:?} already exists")]
    DuplicateName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Normalizes a raw artist name: lower-case, trim, drop every `artist:`
/// marker and comma, trim again. Blank or garbage input normalizes to an
/// empty string, which callers must discard.
pub(crate) fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = lowered.trim().replace("artist:", "").replace(',', "");
    stripped.trim().to_string()
}

/// The canonical, deduplicated set of artist names, persisted as a sorted
/// newline-delimited text file. This store is authoritative for identity;
/// the artifact index is derived from it.
pub(crate) struct NameStore {
    path: PathBuf,
    names: BTreeSet<String>,
}

impl NameStore {
    /// Loads the artist list. A missing file is created empty and treated as
    /// an empty list; every line is normalized and deduplicated on the way in.
    pub(crate) fn load(paths: &AppPaths) -> Result<Self, StoreError> {
        Self::load_from(paths.artist_file())
    }

    /// Loads the artist list from an explicit path.
    pub(crate) fn load_from(path: PathBuf) -> Result<Self, StoreError> {
        if !path.exists() {
            trace!("{}: does not exist, creating empty artist list", path.display());
            write(&path, "")?;
            return Ok(NameStore {
                path,
                names: BTreeSet::new(),
            });
        }

        let contents = read_to_string(&path)?;
        let names = contents
            .lines()
            .map(normalize)
            .filter(|name| !name.is_empty())
            .collect();

        Ok(NameStore { path, names })
    }

    /// Adds a single artist. Returns `false` without touching the file when
    /// the name normalizes to empty or already exists.
    pub(crate) fn add(&mut self, raw: &str) -> Result<bool, StoreError> {
        let name = normalize(raw);
        if name.is_empty() || !self.names.insert(name) {
            return Ok(false);
        }

        self.save()?;
        Ok(true)
    }

    /// Splits `raw` on the given delimiter pattern, normalizes every token and
    /// inserts the ones that are new. Returns the net-new count.
    pub(crate) fn add_batch(&mut self, raw: &str, delimiters: &Regex) -> Result<usize, StoreError> {
        let mut added = 0;
        for token in delimiters.split(raw) {
            let name = normalize(token);
            if !name.is_empty() && self.names.insert(name) {
                added += 1;
            }
        }

        if added > 0 {
            self.save()?;
        }
        Ok(added)
    }

    /// Renames `old` to the normalized form of `raw_new`.
    ///
    /// No-op (returning `Ok(None)`) when the new name normalizes to empty,
    /// equals `old`, or `old` is not present. Fails with
    /// [`StoreError::DuplicateName`] when the new name is already taken.
    /// On success the full sorted list is re-persisted and the normalized new
    /// name is returned; artifact and index cascades are the caller's job.
    pub(crate) fn rename(&mut self, old: &str, raw_new: &str) -> Result<Option<String>, StoreError> {
        let new = normalize(raw_new);
        if new.is_empty() || new == old {
            return Ok(None);
        }
        if self.names.contains(&new) {
            return Err(StoreError::DuplicateName(new));
        }
        if !self.names.remove(old) {
            return Ok(None);
        }

        self.names.insert(new.clone());
        self.save()?;
        Ok(Some(new))
    }

    /// Removes an artist. Returns whether it was present.
    pub(crate) fn remove(&mut self, name: &str) -> Result<bool, StoreError> {
        let removed = self.names.remove(name);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Checks whether an artist is present.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// All names, ascending.
    pub(crate) fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    /// Writes the full sorted list back, one name per line, no blanks.
    fn save(&self) -> Result<(), StoreError> {
        let mut contents = String::new();
        for name in &self.names {
            contents.push_str(name);
            contents.push('\n');
        }
        write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &std::path::Path) -> NameStore {
        NameStore::load_from(dir.join("artists.txt")).unwrap()
    }

    #[test]
    fn normalize_strips_marker_and_commas() {
        assert_eq!(normalize("  Artist:Some, Name  "), "some name");
        assert_eq!(normalize("ARTIST:foo"), "foo");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize(",,,"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["  Artist:A, B  ", "plain", "artist:artist:x", "ＡＢＣ"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn missing_file_is_created_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert_eq!(store.len(), 0);
        assert!(dir.path().join("artists.txt").exists());
    }

    #[test]
    fn add_deduplicates_and_discards_empty() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());

        assert!(store.add("Alice").unwrap());
        assert!(!store.add("artist:alice").unwrap());
        assert!(!store.add("   ").unwrap());
        assert_eq!(store.names(), vec!["alice"]);
    }

    #[test]
    fn batch_import_splits_on_all_delimiters() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add("bob").unwrap();

        let added = store
            .add_batch("alice;bob\ncarol，dave；  ,erin", &BATCH_DELIMITERS)
            .unwrap();
        assert_eq!(added, 4);
        assert_eq!(store.names(), vec!["alice", "bob", "carol", "dave", "erin"]);
    }

    #[test]
    fn rename_rejects_duplicates_and_skips_noops() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add("alice").unwrap();
        store.add("bob").unwrap();

        assert!(matches!(
            store.rename("alice", "Bob"),
            Err(StoreError::DuplicateName(_))
        ));
        assert_eq!(store.rename("alice", "alice").unwrap(), None);
        assert_eq!(store.rename("alice", "  ").unwrap(), None);
        assert_eq!(store.rename("ghost", "casper").unwrap(), None);
        assert_eq!(
            store.rename("alice", "Artist:Alicia").unwrap(),
            Some("alicia".to_string())
        );
        assert_eq!(store.names(), vec!["alicia", "bob"]);
    }

    #[test]
    fn list_round_trips_sorted_without_duplicates() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add_batch("zeta,alpha,Mid", &BATCH_DELIMITERS).unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("artists.txt")).unwrap();
        assert_eq!(on_disk, "alpha\nmid\nzeta\n");

        let reloaded = store_in(dir.path());
        assert_eq!(reloaded.names(), store.names());
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempdir().unwrap();
        let mut store = store_in(dir.path());
        store.add("alice").unwrap();

        assert!(store.remove("alice").unwrap());
        assert!(!store.remove("alice").unwrap());
        assert_eq!(store.len(), 0);
    }
}
