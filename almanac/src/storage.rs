//! Storage backend the store reads and writes through.
//!
//! Every path handed to a `Storage` is relative to the root directory. A store
//! with no backend attached is a pure in-memory harness; anything that needs
//! the disk reports `Error::NeedsFilesystem` there.

use crate::error::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs,
    path::{Path, PathBuf},
};
use uuid::Uuid;

pub trait Storage {
    /// Absolute location of `rel` on disk.
    fn resolve(&self, rel: &Path) -> PathBuf;

    fn exists(&self, rel: &Path) -> bool;

    /// `Ok(None)` when the file does not exist.
    fn read(&self, rel: &Path) -> Result<Option<String>>;

    /// Replace the file's content, creating parent directories as needed.
    fn write(&self, rel: &Path, contents: &str) -> Result<()>;

    fn create_dir_all(&self, rel: &Path) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove_file(&self, rel: &Path) -> Result<()>;

    fn remove_dir_all(&self, rel: &Path) -> Result<()>;
}

/// The on-disk backend rooted at the root directory.
#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
}

impl FileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Storage for FileSystem {
    fn resolve(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    fn exists(&self, rel: &Path) -> bool {
        self.resolve(rel).exists()
    }

    fn read(&self, rel: &Path) -> Result<Option<String>> {
        let abs = self.resolve(rel);
        match fs::read_to_string(&abs) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(abs)(err)),
        }
    }

    fn write(&self, rel: &Path, contents: &str) -> Result<()> {
        let abs = self.resolve(rel);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }
        // Write beside the target and rename over it so a torn write never
        // truncates the previous version.
        let file_name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = abs.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, contents.as_bytes()).map_err(Error::io(&tmp))?;
        fs::rename(&tmp, &abs).map_err(|err| {
            let _ = fs::remove_file(&tmp);
            Error::io(&abs)(err)
        })
    }

    fn create_dir_all(&self, rel: &Path) -> Result<()> {
        let abs = self.resolve(rel);
        fs::create_dir_all(&abs).map_err(Error::io(abs))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let src = self.resolve(from);
        let dst = self.resolve(to);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(Error::io(parent))?;
        }
        fs::rename(&src, &dst).map_err(Error::io(src))
    }

    fn remove_file(&self, rel: &Path) -> Result<()> {
        let abs = self.resolve(rel);
        match fs::remove_file(&abs) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(Error::io(abs)(err)),
            _ => Ok(()),
        }
    }

    fn remove_dir_all(&self, rel: &Path) -> Result<()> {
        let abs = self.resolve(rel);
        match fs::remove_dir_all(&abs) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(Error::io(abs)(err)),
            _ => Ok(()),
        }
    }
}

/* ----------------------------- JSON helpers ----------------------------- */

/// Read and parse a JSON file; `Ok(None)` when it does not exist.
pub fn read_json<T: DeserializeOwned>(storage: &dyn Storage, rel: &Path) -> Result<Option<T>> {
    match storage.read(rel)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(Error::json(storage.resolve(rel))),
        None => Ok(None),
    }
}

/// Serialize pretty-printed and overwrite.
pub fn write_json<T: Serialize>(storage: &dyn Storage, rel: &Path, value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value).map_err(Error::json(rel))?;
    text.push('\n');
    storage.write(rel, &text)
}

/// Backend-or-bust: maps an absent backend to `NeedsFilesystem`.
pub fn require(storage: Option<&dyn Storage>) -> Result<&dyn Storage> {
    storage.ok_or(Error::NeedsFilesystem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    #[test]
    fn missing_files_read_as_none() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fs = FileSystem::new(tmp.path());
        assert!(fs.read(Path::new("nope.json")).expect("read").is_none());
        let parsed: Option<Payload> = read_json(&fs, Path::new("nope.json")).expect("read json");
        assert!(parsed.is_none());
    }

    #[test]
    fn write_creates_parents_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fs = FileSystem::new(tmp.path());
        let rel = Path::new("a/b/payload.json");
        let payload = Payload {
            name: "x".into(),
            count: 3,
        };
        write_json(&fs, rel, &payload).expect("write");
        let back: Payload = read_json(&fs, rel).expect("read").expect("present");
        assert_eq!(back, payload);

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("a/b"))
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn malformed_json_reports_the_path() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fs = FileSystem::new(tmp.path());
        fs.write(Path::new("bad.json"), "{ nope").expect("write");
        let err = read_json::<Payload>(&fs, Path::new("bad.json")).unwrap_err();
        match err {
            Error::Json { path, .. } => assert!(path.ends_with("bad.json")),
            other => panic!("expected json error, got {other:?}"),
        }
    }

    #[test]
    fn missing_backend_is_reported() {
        assert!(matches!(require(None), Err(Error::NeedsFilesystem)));
    }
}
