use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::config::UploadConfig;

const PHOTO_PREFIX: &str = "chore-";

/// Location of a stored photo, as saved on the chore row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    /// Public URL, e.g. `/uploads/photos/chore-3-....jpg`.
    pub url: String,
    /// Path relative to the upload root, e.g. `uploads/photos/chore-3-....jpg`.
    pub path: String,
}

/// Writes and removes chore photos under the upload root.
pub struct PhotoStore {
    root: PathBuf,
    subdir: String,
}

impl PhotoStore {
    pub fn new(root: impl Into<PathBuf>, subdir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            subdir: subdir.into().trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.root.clone(), config.photo_subdir.clone())
    }

    fn photo_dir(&self) -> PathBuf {
        self.root.join(&self.subdir)
    }

    /// Unique file name: a global counter keeps names distinct within the same millisecond.
    fn generate_name(&self, chore_id: i64, original_name: Option<&str>) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let timestamp = Utc::now().timestamp_millis();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        format!("{}{}-{}-{}{}", PHOTO_PREFIX, chore_id, timestamp, seq, extension)
    }

    pub fn store(&self, chore_id: i64, original_name: Option<&str>, bytes: &[u8]) -> io::Result<StoredPhoto> {
        let dir = self.photo_dir();
        fs::create_dir_all(&dir)?;

        let name = self.generate_name(chore_id, original_name);
        fs::write(dir.join(&name), bytes)?;

        let path = format!("{}/{}", self.subdir, name);
        Ok(StoredPhoto {
            url: format!("/{}", path),
            path,
        })
    }

    /// Map a stored `photo_path` to a file this store wrote.
    ///
    /// Only `<subdir>/chore-*` names directly inside the photo directory
    /// resolve; anything else, including other files under the root, is `None`.
    pub fn resolve(&self, photo_path: &str) -> Option<PathBuf> {
        let name = photo_path
            .strip_prefix(self.subdir.as_str())?
            .strip_prefix('/')?;
        let is_generated = name.starts_with(PHOTO_PREFIX)
            && !name.contains(['/', '\\'])
            && matches!(
                Path::new(name).components().collect::<Vec<_>>().as_slice(),
                [Component::Normal(_)]
            );
        is_generated.then(|| self.photo_dir().join(name))
    }

    /// Delete a stored photo. Returns whether a file was removed.
    pub fn remove(&self, photo_path: &str) -> io::Result<bool> {
        let path = self.resolve(photo_path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a stored photo: {}", photo_path),
            )
        })?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
