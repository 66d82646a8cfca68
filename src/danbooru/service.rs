use std::fs::{remove_file, rename as rename_file};
use std::path::{Path, PathBuf};

use anyhow::{Error, bail};
use flume::Receiver;

use crate::danbooru::ReconciliationEngine;
use crate::danbooru::image;
use crate::danbooru::io::artist::{BATCH_DELIMITERS, NameStore};
use crate::danbooru::io::index::{ArtifactIndex, ArtifactRecord};
use crate::danbooru::io::{AppPaths, Login};
use crate::danbooru::worker::{Progress, SyncWorker};

/// The front door of the library: owns the artist list, the artifact index
/// and the background worker, and keeps the three consistent across every
/// mutation. Front-ends talk to this type only.
pub(crate) struct LibraryService {
    paths: AppPaths,
    login: Login,
    store: NameStore,
    index: ArtifactIndex,
    worker: SyncWorker,
}

impl LibraryService {
    /// Opens the library rooted at the base directory of `paths`, loading the
    /// artist list and credentials.
    pub(crate) fn open(paths: AppPaths) -> Result<Self, Error> {
        let login = Login::load(&paths);
        let store = NameStore::load(&paths)?;
        let index = ArtifactIndex::new(&paths);

        Ok(LibraryService {
            paths,
            login,
            store,
            index,
            worker: SyncWorker::new(),
        })
    }

    /// All artist names, ascending.
    pub(crate) fn names(&self) -> Vec<String> {
        self.store.names()
    }

    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    /// Adds one artist. Returns `false` for duplicates and blank input.
    pub(crate) fn add_name(&mut self, raw: &str) -> Result<bool, Error> {
        Ok(self.store.add(raw)?)
    }

    /// Imports a delimiter-separated batch of names and returns the net-new
    /// count.
    pub(crate) fn import_names(&mut self, raw: &str) -> Result<usize, Error> {
        Ok(self.store.add_batch(raw, &BATCH_DELIMITERS)?)
    }

    /// Renames an artist, cascading to the cached artifact and the index.
    ///
    /// The list rename is applied first; if an artifact exists under the old
    /// name it is moved to the new deterministic location and the index entry
    /// follows. A failed file move degrades to dropping the index entry, so
    /// the artifact is re-fetched on the next run instead of being listed
    /// under a dead path.
    pub(crate) fn rename(&mut self, old: &str, raw_new: &str) -> Result<Option<String>, Error> {
        let Some(new) = self.store.rename(old, raw_new)? else {
            return Ok(None);
        };

        let old_artifact = self.paths.artifact_file(old);
        if old_artifact.exists() {
            let new_artifact = self.paths.artifact_file(&new);
            match rename_file(&old_artifact, &new_artifact) {
                Ok(()) => {
                    self.index.reconcile(
                        Some(old),
                        Some(ArtifactRecord {
                            name: new.clone(),
                            image: new_artifact.display().to_string(),
                        }),
                    )?;
                }
                Err(err) => {
                    warn!(
                        "failed to move {} to {}: {}; artifact will be re-fetched",
                        old_artifact.display(),
                        new_artifact.display(),
                        err
                    );
                    self.index.reconcile(Some(old), None)?;
                }
            }
        } else {
            self.index.reconcile(Some(old), None)?;
        }

        Ok(Some(new))
    }

    /// Removes an artist, its cached artifact and its index entry. Returns
    /// whether the name was present.
    pub(crate) fn remove(&mut self, name: &str) -> Result<bool, Error> {
        if !self.store.remove(name)? {
            return Ok(false);
        }

        let artifact = self.paths.artifact_file(name);
        if artifact.exists() {
            if let Err(err) = remove_file(&artifact) {
                warn!("failed to delete {}: {}", artifact.display(), err);
            }
        }
        self.index.reconcile(Some(name), None)?;
        Ok(true)
    }

    /// Replaces (or supplies) the cached image of an existing artist from a
    /// local file. The source is re-encoded into the cache format, so any
    /// decodable image works.
    pub(crate) fn replace_image(&self, name: &str, source: &Path) -> Result<PathBuf, Error> {
        if !self.store.contains(name) {
            bail!("artist {name:?} is not in the list");
        }

        let target = self.paths.artifact_file(name);
        image::ingest(source, &target)?;
        self.index.reconcile(
            None,
            Some(ArtifactRecord {
                name: name.to_string(),
                image: target.display().to_string(),
            }),
        )?;

        Ok(target)
    }

    /// Saves API credentials for future runs.
    pub(crate) fn save_login(&mut self, username: &str, api_key: &str) -> Result<(), Error> {
        let login = Login::new(username, api_key);
        login.save(&self.paths)?;
        self.login = login;
        Ok(())
    }

    /// Starts a background reconciliation run over the current artist list
    /// and returns its progress channel.
    pub(crate) fn start_sync(&self) -> Result<Receiver<Progress>, Error> {
        if self.login.is_empty() {
            bail!(
                "API credentials are not configured; run the login command with \
                 your username and API key first"
            );
        }

        let engine = ReconciliationEngine::new(self.paths.clone(), self.login.clone())?;
        Ok(self.worker.start(engine, self.store.names())?)
    }

    pub(crate) fn is_sync_running(&self) -> bool {
        self.worker.is_running()
    }

    /// The deterministic artifact location for an artist, whether or not the
    /// file exists yet.
    pub(crate) fn artifact_path(&self, name: &str) -> PathBuf {
        self.paths.artifact_file(name)
    }

    pub(crate) fn paths(&self) -> &AppPaths {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::danbooru::testutil::tiny_jpeg;
    use tempfile::tempdir;

    fn service_in(dir: &Path) -> LibraryService {
        LibraryService::open(AppPaths::new(dir)).unwrap()
    }

    fn plant_artifact(service: &LibraryService, name: &str) -> PathBuf {
        let path = service.artifact_path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, tiny_jpeg()).unwrap();
        service
            .index
            .reconcile(
                None,
                Some(ArtifactRecord {
                    name: name.to_string(),
                    image: path.display().to_string(),
                }),
            )
            .unwrap();
        path
    }

    #[test]
    fn rename_moves_artifact_and_index_entry() {
        let dir = tempdir().unwrap();
        let mut service = service_in(dir.path());
        service.add_name("alice").unwrap();
        let old_path = plant_artifact(&service, "alice");

        let new = service.rename("alice", "Artist:Alicia").unwrap();
        assert_eq!(new, Some("alicia".to_string()));
        assert!(!old_path.exists());
        assert!(service.artifact_path("alicia").exists());

        let records = service.index.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alicia");
    }

    #[test]
    fn rename_without_artifact_only_touches_the_index() {
        let dir = tempdir().unwrap();
        let mut service = service_in(dir.path());
        service.add_name("alice").unwrap();

        assert_eq!(
            service.rename("alice", "alicia").unwrap(),
            Some("alicia".to_string())
        );
        assert_eq!(service.names(), vec!["alicia"]);
        assert!(service.index.records().is_empty());
    }

    #[test]
    fn remove_deletes_artifact_and_index_entry() {
        let dir = tempdir().unwrap();
        let mut service = service_in(dir.path());
        service.add_name("alice").unwrap();
        let path = plant_artifact(&service, "alice");

        assert!(service.remove("alice").unwrap());
        assert!(!path.exists());
        assert!(service.index.records().is_empty());
        assert!(!service.remove("alice").unwrap());
    }

    #[test]
    fn replace_image_requires_a_listed_artist() {
        let dir = tempdir().unwrap();
        let service = service_in(dir.path());

        let source = dir.path().join("pic.jpg");
        std::fs::write(&source, tiny_jpeg()).unwrap();
        assert!(service.replace_image("nobody", &source).is_err());
    }

    #[test]
    fn replace_image_ingests_and_indexes() {
        let dir = tempdir().unwrap();
        let mut service = service_in(dir.path());
        service.add_name("alice").unwrap();

        let source = dir.path().join("pic.jpg");
        std::fs::write(&source, tiny_jpeg()).unwrap();
        let target = service.replace_image("alice", &source).unwrap();

        assert!(target.exists());
        assert!(image::verify_integrity(&target));
        let records = service.index.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alice");
    }

    #[test]
    fn sync_requires_credentials() {
        let dir = tempdir().unwrap();
        let service = service_in(dir.path());

        let err = service.start_sync().unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn import_counts_only_new_names() {
        let dir = tempdir().unwrap();
        let mut service = service_in(dir.path());
        service.add_name("bob").unwrap();

        assert_eq!(service.import_names("alice, bob; carol").unwrap(), 2);
        assert_eq!(service.names(), vec!["alice", "bob", "carol"]);
    }
}
