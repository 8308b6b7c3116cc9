//! Where the root lives, and the configuration persisted in `topology.json`.

use crate::collections::CollectionKind;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{ffi::OsString, path::PathBuf};

/// Overrides the root directory.
pub const ROOT_ENV: &str = "ALMANAC_ROOT";
/// `tracing` filter directives for the binary.
pub const LOG_ENV: &str = "ALMANAC_LOG";
/// Root directory name under `$HOME` when no override is set.
pub const DEFAULT_ROOT_NAME: &str = ".almanac";

/// `$ALMANAC_ROOT`, else `$HOME/.almanac`.
pub fn root_dir() -> Result<PathBuf> {
    root_dir_from(std::env::var_os(ROOT_ENV), std::env::var_os("HOME"))
        .ok_or(Error::NeedsFilesystem)
}

fn root_dir_from(root: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    match root.filter(|r| !r.is_empty()) {
        Some(root) => Some(PathBuf::from(root)),
        None => home
            .filter(|h| !h.is_empty())
            .map(|h| PathBuf::from(h).join(DEFAULT_ROOT_NAME)),
    }
}

/* ------------------------------- Defaults ------------------------------- */

/// Collection searched when a selection names a kind but no collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    pub journal: String,
    pub directory: String,
    pub tasklist: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            journal: "diary".into(),
            directory: "notes".into(),
            tasklist: "todo".into(),
        }
    }
}

impl Defaults {
    pub fn name(&self, kind: CollectionKind) -> &str {
        match kind {
            CollectionKind::Journal => &self.journal,
            CollectionKind::Directory => &self.directory,
            CollectionKind::Tasklist => &self.tasklist,
        }
    }

    pub fn set(&mut self, kind: CollectionKind, name: &str) {
        let slot = match kind {
            CollectionKind::Journal => &mut self.journal,
            CollectionKind::Directory => &mut self.directory,
            CollectionKind::Tasklist => &mut self.tasklist,
        };
        *slot = name.to_string();
    }
}

/* -------------------------------- Tools -------------------------------- */

/// External commands; the core only stores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tools {
    #[serde(default)]
    pub editor: Vec<String>,
    #[serde(default)]
    pub pager: Vec<String>,
    #[serde(default)]
    pub pdf: Vec<String>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            editor: vec!["vim".into()],
            pager: vec!["less".into(), "-R".into()],
            pdf: vec!["xdg-open".into()],
        }
    }
}

/// A document converter keyed by note extension. `%i` and `%o` in `command`
/// stand for the input and output paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCompiler {
    pub name: String,
    pub extensions: Vec<String>,
    pub command: Vec<String>,
}

pub fn default_text_compilers() -> Vec<TextCompiler> {
    vec![
        TextCompiler {
            name: "markdown".into(),
            extensions: vec!["md".into()],
            command: vec!["pandoc".into(), "%i".into(), "-o".into(), "%o".into()],
        },
        TextCompiler {
            name: "latex".into(),
            extensions: vec!["tex".into()],
            command: vec!["latexmk".into(), "-pdf".into(), "%i".into()],
        },
    ]
}

/// First compiler handling `extension`.
pub fn compiler_for<'a>(compilers: &'a [TextCompiler], extension: &str) -> Option<&'a TextCompiler> {
    compilers
        .iter()
        .find(|c| c.extensions.iter().any(|e| e == extension))
}

/* ------------------------ Directory index policy ------------------------ */

/// What an index selector means inside a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectoryIndexPolicy {
    /// Indices do not address notes; the selection is incompatible.
    #[default]
    Reject,
    /// Index `n` names the note called after the date `n` days ago.
    DayOffset,
}
