use std::fs::{read_to_string, remove_file, write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Error, bail};
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};

use crate::danbooru::image;
use crate::danbooru::io::AppPaths;

/// The two kinds of showcase entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Category {
    /// A single-artist run.
    Run,
    /// A multi-artist combination.
    Combo,
}

impl Category {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "run" => Some(Category::Run),
            "combo" => Some(Category::Combo),
            _ => None,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Category::Run => "run",
            Category::Combo => "combo",
        }
    }
}

/// One showcase entry. The id doubles as the creation timestamp (epoch
/// milliseconds), which keeps ids unique and the default ordering meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct ShowcaseEntry {
    pub(crate) id: u64,
    pub(crate) title: String,
    pub(crate) category: Category,
    /// Path of the compressed gallery copy of the image.
    pub(crate) image: String,
    /// The prompt or notes that produced the piece. May be empty.
    #[serde(default)]
    pub(crate) prompt: String,
}

/// The showcase gallery: an ordered list of entries (newest first) persisted
/// as pretty-printed JSON, with a private directory of compressed image
/// copies it owns outright. Source images are never modified.
pub(crate) struct GalleryStore {
    file: PathBuf,
    image_dir: PathBuf,
    entries: Vec<ShowcaseEntry>,
}

impl GalleryStore {
    /// Loads the gallery. A missing or unparsable file yields an empty
    /// gallery rather than an error.
    pub(crate) fn load(paths: &AppPaths) -> Self {
        let file = paths.gallery_file();
        let entries = if file.exists() {
            match read_to_string(&file) {
                Ok(contents) => match from_str(&contents) {
                    Ok(entries) => entries,
                    Err(err) => {
                        warn!(
                            "unable to parse {}: {}; starting with an empty gallery",
                            file.display(),
                            err
                        );
                        Vec::new()
                    }
                },
                Err(err) => {
                    warn!(
                        "unable to read {}: {}; starting with an empty gallery",
                        file.display(),
                        err
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        GalleryStore {
            file,
            image_dir: paths.gallery_dir(),
            entries,
        }
    }

    /// All entries, newest first.
    pub(crate) fn entries(&self) -> &[ShowcaseEntry] {
        &self.entries
    }

    pub(crate) fn get(&self, id: u64) -> Option<&ShowcaseEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Adds an entry: compresses `source` into the gallery directory, then
    /// prepends the record. The source file is left untouched.
    pub(crate) fn add(
        &mut self,
        title: &str,
        category: Category,
        source: &Path,
        prompt: &str,
    ) -> Result<u64, Error> {
        let title = title.trim();
        if title.is_empty() {
            bail!("a gallery entry needs a non-empty title");
        }

        let id = epoch_millis();
        let target = self.image_dir.join(format!("img_{id}.jpg"));
        image::compress(source, &target)
            .with_context(|| format!("failed to import {}", source.display()))?;

        self.entries.insert(
            0,
            ShowcaseEntry {
                id,
                title: title.to_string(),
                category,
                image: target.display().to_string(),
                prompt: prompt.to_string(),
            },
        );
        self.save()?;

        info!("gallery entry {} added ({:?})", id, title);
        Ok(id)
    }

    /// Updates an entry in place. `None` fields keep their current value; a
    /// replacement image is compressed before the old copy is discarded, so a
    /// failed import leaves the entry intact.
    pub(crate) fn update(
        &mut self,
        id: u64,
        title: Option<&str>,
        category: Option<Category>,
        prompt: Option<&str>,
        new_image: Option<&Path>,
    ) -> Result<(), Error> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .with_context(|| format!("no gallery entry with id {id}"))?;

        let replacement = match new_image {
            Some(source) => {
                let target = self.image_dir.join(format!("img_{}.jpg", epoch_millis()));
                image::compress(source, &target)
                    .with_context(|| format!("failed to import {}", source.display()))?;
                Some(target)
            }
            None => None,
        };

        let entry = &mut self.entries[position];
        if let Some(title) = title {
            let title = title.trim();
            if title.is_empty() {
                bail!("a gallery entry needs a non-empty title");
            }
            entry.title = title.to_string();
        }
        if let Some(category) = category {
            entry.category = category;
        }
        if let Some(prompt) = prompt {
            entry.prompt = prompt.to_string();
        }
        if let Some(target) = replacement {
            discard_image(&entry.image);
            entry.image = target.display().to_string();
        }

        self.save()
    }

    /// Removes an entry and its compressed image. Returns whether the id was
    /// present.
    pub(crate) fn remove(&mut self, id: u64) -> Result<bool, Error> {
        let Some(position) = self.entries.iter().position(|entry| entry.id == id) else {
            return Ok(false);
        };

        let entry = self.entries.remove(position);
        discard_image(&entry.image);
        self.save()?;

        info!("gallery entry {} removed", id);
        Ok(true)
    }

    fn save(&self) -> Result<(), Error> {
        let json = to_string_pretty(&self.entries)?;
        write(&self.file, json)
            .with_context(|| format!("failed to write {}", self.file.display()))?;
        Ok(())
    }
}

/// Best-effort removal of a gallery-owned image copy.
fn discard_image(path: &str) {
    let path = Path::new(path);
    if path.exists() {
        if let Err(err) = remove_file(path) {
            warn!("failed to delete {}: {}", path.display(), err);
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
