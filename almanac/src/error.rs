use std::path::PathBuf;

use crate::collections::CollectionKind;

/// Every failure the core can report. Lookup misses are recoverable by the
/// caller; integrity and selection errors always propagate untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /* ----------------------------- Structural ----------------------------- */
    #[error("no {kind} named '{name}'")]
    NoSuchCollection { kind: CollectionKind, name: String },
    #[error("nothing matches '{0}'")]
    NoSuchItem(String),
    #[error("no day '{0}'")]
    NoSuchDay(String),
    #[error("no entry '{0}'")]
    NoSuchEntry(String),
    #[error("no task '{0}'")]
    NoSuchTask(String),
    #[error("no note '{0}'")]
    NoSuchNote(String),
    #[error("no tag '{0}'")]
    NoSuchTag(String),
    #[error("no chain '{0}'")]
    NoSuchChain(String),
    #[error("no stack '{0}'")]
    NoSuchStack(String),

    /* ------------------------------ Integrity ------------------------------ */
    #[error("'{0}' already exists")]
    DuplicateItem(String),
    #[error("task '{0}' already exists")]
    DuplicateTask(String),
    #[error("note '{0}' already exists")]
    DuplicateNote(String),

    /* ------------------------------ Selection ------------------------------ */
    #[error("'{0}' matches more than one item")]
    AmbiguousSelection(String),
    #[error("'{0}' cannot be combined with the requested collection")]
    IncompatibleSelection(String),
    #[error("'{0}' is not a valid selection here")]
    InvalidSelection(String),
    #[error("unknown selection qualifier in '{0}'")]
    UnknownSelection(String),

    /* ----------------------------- Environment ----------------------------- */
    #[error("operation requires a filesystem backend")]
    NeedsFilesystem,

    /* ----------------------------- Referential ----------------------------- */
    #[error("tag '{0}' is not in the tag registry")]
    UnknownTag(String),

    /* -------------------------------- Other -------------------------------- */
    #[error("chain '{0}' is already completed today")]
    AlreadyCompleted(String),
    #[error("cannot understand time '{0}'")]
    InvalidTime(String),
    #[error("topology schema {found} does not match {expected}; migrate the root first")]
    SchemaVersion { expected: String, found: String },
    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Lookup misses that the fallback kind search treats as "try the next kind".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NoSuchItem(_)
                | Error::NoSuchDay(_)
                | Error::NoSuchEntry(_)
                | Error::NoSuchTask(_)
                | Error::NoSuchNote(_)
                | Error::NoSuchCollection { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| Error::Json { path, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
