use std::collections::BTreeSet;
use std::fs::create_dir_all;
use std::thread;
use std::time::Duration;

use anyhow::Error;
use flume::Sender;

use crate::danbooru::downloader::Downloader;
use crate::danbooru::io::index::ArtifactIndex;
use crate::danbooru::io::{AppPaths, Login};
use crate::danbooru::sender::{SearchClient, SearchError};
use crate::danbooru::worker::Progress;

pub(crate) mod downloader;
pub(crate) mod gallery;
pub(crate) mod image;
pub(crate) mod io;
pub(crate) mod sender;
pub(crate) mod service;
pub(crate) mod worker;

/// Rating filter applied on the first, strict search attempt.
const STRICT_RATING: &str = "rating:general";

/// Delay after every entity that touched the remote API, to stay clear of
/// rate limiting.
const PACING_DELAY: Duration = Duration::from_secs(2);

/// Cooldown before the relaxed retry after an empty strict result.
const FALLBACK_COOLDOWN: Duration = Duration::from_secs(1);

/// Statistics of a single reconciliation run. Ephemeral: reported at run end
/// and discarded, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunStats {
    /// Number of artists the run covered.
    pub(crate) total: usize,
    /// Artists that already had a cached artifact.
    pub(crate) skipped: usize,
    /// Artists whose artifact was newly fetched.
    pub(crate) fetched: usize,
    /// Artists that could not be resolved; per-name reasons are emitted on
    /// the progress channel at failure time.
    pub(crate) failed: Vec<String>,
}

impl RunStats {
    pub(crate) fn summary(&self) -> String {
        format!(
            "total: {} | skipped: {} | new: {} | failed: {}",
            self.total,
            self.skipped,
            self.fetched,
            self.failed.len()
        )
    }
}

/// The reconciliation orchestrator: walks the artist list, fills missing
/// cache entries from the remote API one artist at a time, and rewrites the
/// artifact index at the end of the run.
///
/// Per-artist failures are logged, counted and never abort the run. There is
/// deliberately no download parallelism; sequential processing keeps the
/// request cadence inside the remote service's tolerance and keeps failure
/// attribution unambiguous.
pub(crate) struct ReconciliationEngine {
    paths: AppPaths,
    client: SearchClient,
    downloader: Downloader,
    pacing: Duration,
    fallback_cooldown: Duration,
}

impl ReconciliationEngine {
    pub(crate) fn new(paths: AppPaths, login: Login) -> Result<Self, Error> {
        let client = SearchClient::new(login)?;
        let downloader = Downloader::new(client.http_client().clone());

        Ok(ReconciliationEngine {
            paths,
            client,
            downloader,
            pacing: PACING_DELAY,
            fallback_cooldown: FALLBACK_COOLDOWN,
        })
    }

    /// Runs one full reconciliation pass over `artists`, streaming progress
    /// to `progress`. Always returns statistics, even if every entity failed.
    pub(crate) fn run(&self, artists: &[String], progress: &Sender<Progress>) -> RunStats {
        let mut stats = RunStats {
            total: artists.len(),
            ..RunStats::default()
        };

        emit(progress, "=== starting automatic update ===".to_string());
        if let Err(err) = create_dir_all(self.paths.image_dir()) {
            error!("unable to create image directory: {}", err);
            emit(progress, format!("unable to create image directory: {err}"));
            stats.failed = artists.to_vec();
            return stats;
        }

        let index = ArtifactIndex::new(&self.paths);
        let mut resolved = index.resolved_map();
        let names: BTreeSet<String> = artists.iter().cloned().collect();

        for (position, artist) in artists.iter().enumerate() {
            let number = position + 1;
            let _ = progress.send(Progress::Entity {
                index: number,
                total: stats.total,
            });

            let target = self.paths.artifact_file(artist);
            if target.exists() {
                stats.skipped += 1;
                resolved.insert(artist.clone(), target.display().to_string());
                emit(progress, format!("[{number}] {artist}: already cached"));
                continue;
            }

            emit(progress, format!("[{number}] {artist}: searching..."));
            match self.resolve_url(artist, progress) {
                Ok(url) => {
                    emit(progress, "    -> link captured, downloading...".to_string());
                    match self.downloader.fetch(&url, &target) {
                        Ok(()) => {
                            stats.fetched += 1;
                            resolved.insert(artist.clone(), target.display().to_string());
                            emit(progress, "    -> done".to_string());
                        }
                        Err(err) => {
                            stats.failed.push(artist.clone());
                            emit(progress, format!("    -> download failed: {err}"));
                        }
                    }
                }
                Err(err) => {
                    stats.failed.push(artist.clone());
                    emit(progress, format!("    -> lookup failed: {err}"));
                }
            }

            thread::sleep(self.pacing);
        }

        if let Err(err) = index.rebuild(&resolved, &names) {
            error!("failed to rewrite artifact index: {:#}", err);
            emit(progress, format!("failed to rewrite artifact index: {err:#}"));
        }

        emit(progress, "==============================".to_string());
        emit(progress, stats.summary());
        if !stats.failed.is_empty() {
            emit(
                progress,
                "failed artists (see log for per-name reasons):".to_string(),
            );
            for name in &stats.failed {
                emit(progress, format!("artist:{name}"));
            }
        }

        stats
    }

    /// Tiered query: strict rating filter first; only a true empty result
    /// triggers the single relaxed retry. Any other strict-attempt error is
    /// terminal, since relaxing the tag filter will not fix a network, auth
    /// or protocol failure.
    fn resolve_url(
        &self,
        artist: &str,
        progress: &Sender<Progress>,
    ) -> Result<String, SearchError> {
        match self.client.search(artist, STRICT_RATING) {
            Err(SearchError::NoMatch) => {
                emit(
                    progress,
                    "    -> no general-rated match, retrying without a rating filter...".to_string(),
                );
                thread::sleep(self.fallback_cooldown);
                self.client.search(artist, "")
            }
            result => result,
        }
    }
}

/// Mirrors every progress line into the application log.
fn emit(progress: &Sender<Progress>, line: String) {
    info!("{}", line);
    let _ = progress.send(Progress::Log(line));
}
