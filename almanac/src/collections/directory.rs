//! Directories: named notes, each backed by a text file beside the directory file.

use super::{Collection, CollectionKind, Descriptor, rebase, validate_name};
use crate::error::{Error, Result};
use crate::storage::{self, Storage};
use crate::tags::{self, Tag};
use crate::time::Time;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub name: String,
    /// Root-relative path of the note's text file.
    pub path: PathBuf,
    pub created: Time,
    pub modified: Time,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Note {
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(skip)]
    dir: PathBuf,
}

impl Collection for Directory {
    const KIND: CollectionKind = CollectionKind::Directory;

    fn attach(&mut self, descriptor: &Descriptor) {
        self.dir = descriptor.dir();
    }

    fn relocate(&mut self, from: &Path, to: &Path) {
        for note in &mut self.notes {
            note.path = rebase(&note.path, from, to);
        }
    }
}

impl Directory {
    /// `<directory dir>/<name>.<extension>`
    pub fn note_path(&self, name: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{name}.{extension}"))
    }

    pub fn get_note(&self, name: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.name == name)
    }

    pub fn get_note_mut(&mut self, name: &str) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| n.name == name)
    }

    pub fn note(&self, name: &str) -> Result<&Note> {
        self.get_note(name)
            .ok_or_else(|| Error::NoSuchNote(name.to_string()))
    }

    /// Notes sorted by most recent modification first.
    pub fn notes_by_modified(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.iter().collect();
        notes.sort_by(|a, b| b.modified.cmp(&a.modified).then(a.name.cmp(&b.name)));
        notes
    }

    /// Register a new note. The backing file is created lazily by whoever
    /// writes its content.
    pub fn add_note(
        &mut self,
        name: &str,
        extension: Option<&str>,
        note_tags: Vec<Tag>,
        now: Time,
    ) -> Result<&mut Note> {
        validate_name(name)?;
        if self.get_note(name).is_some() {
            return Err(Error::DuplicateNote(name.to_string()));
        }
        let path = self.note_path(name, extension.unwrap_or(DEFAULT_EXTENSION));
        self.notes.push(Note {
            name: name.to_string(),
            path,
            created: now,
            modified: now,
            tags: note_tags,
        });
        let last = self.notes.len() - 1;
        Ok(&mut self.notes[last])
    }

    pub fn remove_note(&mut self, name: &str, storage: Option<&dyn Storage>) -> Result<Note> {
        let idx = self
            .notes
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| Error::NoSuchNote(name.to_string()))?;
        if let Some(storage) = storage {
            storage.remove_file(&self.notes[idx].path)?;
        }
        Ok(self.notes.remove(idx))
    }

    /// Rename a note, moving its file first.
    ///
    /// The move and the record update are not atomic: if the move succeeds and
    /// the process dies before the directory is flushed, the record still
    /// points at the old path.
    pub fn rename_note(
        &mut self,
        name: &str,
        new_name: &str,
        storage: Option<&dyn Storage>,
    ) -> Result<&Note> {
        validate_name(new_name)?;
        if self.get_note(new_name).is_some() {
            return Err(Error::DuplicateNote(new_name.to_string()));
        }
        let (old_path, ext) = {
            let note = self.note(name)?;
            (note.path.clone(), note.extension().to_string())
        };
        let new_path = self.note_path(new_name, &ext);
        if let Some(storage) = storage {
            if storage.exists(&old_path) {
                storage.rename(&old_path, &new_path)?;
            }
        }
        let note = self
            .get_note_mut(name)
            .ok_or_else(|| Error::NoSuchNote(name.to_string()))?;
        note.name = new_name.to_string();
        note.path = new_path;
        note.modified = Time::now();
        Ok(&*note)
    }

    pub fn touch_note(&mut self, name: &str, now: Time) -> Result<()> {
        let note = self
            .get_note_mut(name)
            .ok_or_else(|| Error::NoSuchNote(name.to_string()))?;
        note.modified = now;
        Ok(())
    }

    /// Unchecked against the tag registry; see `Root::tag_note`.
    pub fn tag_note(&mut self, name: &str, tag: Tag) -> Result<bool> {
        let note = self
            .get_note_mut(name)
            .ok_or_else(|| Error::NoSuchNote(name.to_string()))?;
        Ok(tags::attach(&mut note.tags, tag))
    }

    pub fn untag_note(&mut self, name: &str, tag: &str) -> Result<bool> {
        let note = self
            .get_note_mut(name)
            .ok_or_else(|| Error::NoSuchNote(name.to_string()))?;
        Ok(tags::detach(&mut note.tags, tag))
    }

    /// Text of a note; an unwritten note reads as empty.
    pub fn read_note(&self, name: &str, storage: Option<&dyn Storage>) -> Result<String> {
        let note = self.note(name)?;
        let storage = storage::require(storage)?;
        Ok(storage.read(&note.path)?.unwrap_or_default())
    }

    pub fn write_note(
        &mut self,
        name: &str,
        text: &str,
        storage: Option<&dyn Storage>,
    ) -> Result<()> {
        let storage = storage::require(storage)?;
        let path = self.note(name)?.path.clone();
        storage.write(&path, text)?;
        self.touch_note(name, Time::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystem;

    fn directory() -> Directory {
        let mut d = Directory::default();
        d.attach(&Descriptor::new(CollectionKind::Directory, "notes", Time::now()));
        d
    }

    #[test]
    fn note_paths_are_derived_from_the_directory() {
        let mut d = directory();
        let note = d.add_note("hello", None, vec![], Time::now()).expect("add");
        assert_eq!(note.path, PathBuf::from("directories/notes/hello.md"));
        let note = d
            .add_note("paper", Some("tex"), vec![], Time::now())
            .expect("add");
        assert_eq!(note.extension(), "tex");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut d = directory();
        d.add_note("hello", None, vec![], Time::now()).expect("add");
        assert!(matches!(
            d.add_note("hello", Some("txt"), vec![], Time::now()),
            Err(Error::DuplicateNote(_))
        ));
    }

    #[test]
    fn rename_moves_the_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fs = FileSystem::new(tmp.path());
        let mut d = directory();
        d.add_note("draft", None, vec![], Time::now()).expect("add");
        d.write_note("draft", "# draft\n", Some(&fs)).expect("write");

        let renamed = d.rename_note("draft", "final", Some(&fs)).expect("rename");
        assert_eq!(renamed.path, PathBuf::from("directories/notes/final.md"));
        assert!(!fs.exists(&PathBuf::from("directories/notes/draft.md")));
        assert_eq!(d.read_note("final", Some(&fs)).expect("read"), "# draft\n");
        assert!(matches!(d.note("draft"), Err(Error::NoSuchNote(_))));
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let mut d = directory();
        d.add_note("a", None, vec![], Time::now()).expect("add");
        d.add_note("b", None, vec![], Time::now()).expect("add");
        assert!(matches!(
            d.rename_note("a", "b", None),
            Err(Error::DuplicateNote(_))
        ));
    }

    #[test]
    fn remove_deletes_file_and_record() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fs = FileSystem::new(tmp.path());
        let mut d = directory();
        d.add_note("gone", None, vec![], Time::now()).expect("add");
        d.write_note("gone", "x", Some(&fs)).expect("write");
        d.remove_note("gone", Some(&fs)).expect("remove");
        assert!(!fs.exists(&PathBuf::from("directories/notes/gone.md")));
        assert!(d.get_note("gone").is_none());
    }

    #[test]
    fn note_round_trips() {
        let note = Note {
            name: "hello".into(),
            path: PathBuf::from("directories/notes/hello.md"),
            created: Time::from_millis(10).unwrap(),
            modified: Time::from_millis(20).unwrap(),
            tags: vec![Tag::new("idea", Time::from_millis(30).unwrap())],
        };
        let back: Note = serde_json::from_str(&serde_json::to_string(&note).unwrap()).unwrap();
        assert_eq!(back, note);
    }
}
