//! The three named collection kinds and what the store needs to know about each.
//!
//! A collection is one independently persisted JSON file, located through its
//! `Descriptor`. `Collection` is the per-kind table the store dispatches on:
//! its kind tag, where a fresh instance lives, and how to flush any state that
//! lives outside its own file.

pub mod directory;
pub mod journal;
pub mod tasklist;

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::time::Time;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

pub use directory::{Directory, Note};
pub use journal::{Day, Entry, Journal};
pub use tasklist::{Importance, Status, Task, Tasklist};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Journal,
    Directory,
    Tasklist,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 3] = [
        CollectionKind::Journal,
        CollectionKind::Directory,
        CollectionKind::Tasklist,
    ];

    /// Tie-break order when a selection does not name its kind.
    pub const SEARCH_ORDER: [CollectionKind; 3] = [
        CollectionKind::Directory,
        CollectionKind::Journal,
        CollectionKind::Tasklist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Journal => "journal",
            CollectionKind::Directory => "directory",
            CollectionKind::Tasklist => "tasklist",
        }
    }

    /// Top-level directory holding every collection of this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            CollectionKind::Journal => "journals",
            CollectionKind::Directory => "directories",
            CollectionKind::Tasklist => "tasklists",
        }
    }

    /// `<kind-dir>/<name>/<kind>.json`
    pub fn default_path(self, name: &str) -> PathBuf {
        Path::new(self.dir_name())
            .join(name)
            .join(format!("{}.json", self.as_str()))
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "journal" | "j" => Ok(CollectionKind::Journal),
            "directory" | "dir" | "d" => Ok(CollectionKind::Directory),
            "tasklist" | "tasks" | "t" => Ok(CollectionKind::Tasklist),
            other => Err(Error::UnknownSelection(other.to_string())),
        }
    }
}

/* ------------------------------ Descriptor ------------------------------ */

/// Identifies one collection instance of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    /// Root-relative location of the collection's own JSON file.
    pub path: PathBuf,
    pub created: Time,
    pub modified: Time,
}

impl Descriptor {
    pub fn new(kind: CollectionKind, name: &str, now: Time) -> Self {
        Self {
            name: name.to_string(),
            path: kind.default_path(name),
            created: now,
            modified: now,
        }
    }

    /// Directory that holds the collection file and its record files.
    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/* ------------------------------ Collection ------------------------------ */

pub trait Collection: Serialize + DeserializeOwned + Default + fmt::Debug {
    const KIND: CollectionKind;

    /// Bind a freshly loaded or created payload to its descriptor, so record
    /// paths can be derived from the collection's directory.
    fn attach(&mut self, descriptor: &Descriptor);

    /// Write state that lives outside the collection's own file. Returns the
    /// number of files written.
    fn flush_staged(&mut self, _storage: &dyn Storage) -> Result<usize> {
        Ok(0)
    }

    /// Whether `flush_staged` has anything to write.
    fn has_staged(&self) -> bool {
        false
    }

    /// Rebase record paths after the collection's directory moved.
    fn relocate(&mut self, _from: &Path, _to: &Path) {}
}

/// `path` with its `from` prefix swapped for `to`; untouched when the prefix
/// does not match.
pub(crate) fn rebase(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rest) => to.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Names are used verbatim as directory and file names.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let bad = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(Error::InvalidSelection(name.to_string()));
    }
    Ok(())
}
