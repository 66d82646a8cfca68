use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};

pub(crate) mod artist;
pub(crate) mod index;

/// Name of the credential file.
pub(crate) const LOGIN_NAME: &str = "config.json";

/// Name of the artist list file.
pub(crate) const ARTIST_FILE_NAME: &str = "artists.txt";

/// Name of the artifact index file.
pub(crate) const DATA_FILE_NAME: &str = "artist_data.json";

/// Directory holding the cached artist images.
pub(crate) const IMAGE_DIR_NAME: &str = "images";

/// Name of the showcase gallery file.
pub(crate) const GALLERY_FILE_NAME: &str = "showcase.json";

/// Directory holding the compressed gallery images.
pub(crate) const GALLERY_DIR_NAME: &str = "gallery_images";

/// All on-disk locations the application touches, rooted at a single base
/// directory. Constructed once at startup and passed by reference; nothing in
/// the crate reads paths from process-wide state.
#[derive(Debug, Clone)]
pub(crate) struct AppPaths {
    base: PathBuf,
}

impl AppPaths {
    /// Creates the path set rooted at `base`.
    pub(crate) fn new(base: impl Into<PathBuf>) -> Self {
        AppPaths { base: base.into() }
    }

    /// The credential file (`config.json`).
    pub(crate) fn login_file(&self) -> PathBuf {
        self.base.join(LOGIN_NAME)
    }

    /// The artist list file (`artists.txt`).
    pub(crate) fn artist_file(&self) -> PathBuf {
        self.base.join(ARTIST_FILE_NAME)
    }

    /// The artifact index file (`artist_data.json`).
    pub(crate) fn data_file(&self) -> PathBuf {
        self.base.join(DATA_FILE_NAME)
    }

    /// The cached image directory.
    pub(crate) fn image_dir(&self) -> PathBuf {
        self.base.join(IMAGE_DIR_NAME)
    }

    /// The showcase gallery file.
    pub(crate) fn gallery_file(&self) -> PathBuf {
        self.base.join(GALLERY_FILE_NAME)
    }

    /// The gallery image directory.
    pub(crate) fn gallery_dir(&self) -> PathBuf {
        self.base.join(GALLERY_DIR_NAME)
    }

    /// The deterministic artifact location for an artist name.
    pub(crate) fn artifact_file(&self, name: &str) -> PathBuf {
        self.image_dir().join(format!("{}.jpg", safe_filename(name)))
    }
}

/// `Login` contains the credentials used to authenticate against the search
/// API. A missing or unreadable credential file yields empty credentials, not
/// an error.
#[derive(Serialize, Deserialize, Clone, Default)]
pub(crate) struct Login {
    /// Username of user.
    #[serde(default)]
    username: String,
    /// The API key for the user.
    #[serde(default)]
    api_key: String,
}

impl Login {
    /// Creates a login from explicit credentials.
    pub(crate) fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Login {
            username: username.into(),
            api_key: api_key.into(),
        }
    }

    /// Username of user.
    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    /// The API key for the user.
    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Checks if the login user or API key is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.username.is_empty() || self.api_key.is_empty()
    }

    /// Loads the credential file, falling back to empty credentials when the
    /// file is absent or unparsable.
    pub(crate) fn load(paths: &AppPaths) -> Self {
        let path = paths.login_file();
        if !path.exists() {
            trace!("{}: does not exist, using empty credentials", path.display());
            return Login::default();
        }

        match read_to_string(&path) {
            Ok(contents) => match from_str(&contents) {
                Ok(login) => login,
                Err(err) => {
                    warn!(
                        "unable to parse {}: {}; using empty credentials",
                        path.display(),
                        err
                    );
                    Login::default()
                }
            },
            Err(err) => {
                warn!(
                    "unable to read {}: {}; using empty credentials",
                    path.display(),
                    err
                );
                Login::default()
            }
        }
    }

    /// Persists the credentials to the credential file.
    pub(crate) fn save(&self, paths: &AppPaths) -> Result<(), Error> {
        let path = paths.login_file();
        write(&path, to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!("credentials saved to {}", path.display());
        info!("treat your API key like a password and do not share this file");
        Ok(())
    }
}

/// Replaces every character that is illegal in a path segment with an
/// underscore, so any artist name maps to a usable filename.
pub(crate) fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
