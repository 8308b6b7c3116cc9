//! Journals: date-keyed days, each holding time-stamped entries.
//!
//! The journal file only carries day metadata. Entry bodies live in one file
//! per day beside it and are staged in memory on first read; `write_days`
//! writes the staged days that changed.

use super::{Collection, CollectionKind, Descriptor, rebase};
use crate::error::{Error, Result};
use crate::storage::{self, Storage};
use crate::tags::{self, Tag};
use crate::time::{self, Time, TimeZone};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    /// Root-relative path of this day's entry file.
    pub path: PathBuf,
    /// Canonical `YYYY-MM-DD`.
    pub name: String,
    pub created: Time,
    pub modified: Time,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub text: String,
    /// Identity of the entry within its day.
    pub created: Time,
    pub modified: Time,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// On-disk shape of a day file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DayFile {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Default)]
struct Staged {
    entries: Vec<Entry>,
    pending: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Journal {
    #[serde(default)]
    pub days: Vec<Day>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(skip)]
    dir: PathBuf,
    /// Day path -> entries read so far this session.
    #[serde(skip)]
    staged: IndexMap<PathBuf, Staged>,
}

impl Collection for Journal {
    const KIND: CollectionKind = CollectionKind::Journal;

    fn attach(&mut self, descriptor: &Descriptor) {
        self.dir = descriptor.dir();
    }

    fn flush_staged(&mut self, storage: &dyn Storage) -> Result<usize> {
        self.write_days(storage)
    }

    fn has_staged(&self) -> bool {
        self.staged.values().any(|s| s.pending)
    }

    fn relocate(&mut self, from: &Path, to: &Path) {
        for day in &mut self.days {
            day.path = rebase(&day.path, from, to);
        }
        self.staged = std::mem::take(&mut self.staged)
            .into_iter()
            .map(|(path, staged)| (rebase(&path, from, to), staged))
            .collect();
    }
}

impl Journal {
    pub fn day_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /* ------------------------------- Days ------------------------------- */

    pub fn get_day(&self, name: &str) -> Option<&Day> {
        self.days.iter().find(|d| d.name == name)
    }

    pub fn get_day_mut(&mut self, name: &str) -> Option<&mut Day> {
        self.days.iter_mut().find(|d| d.name == name)
    }

    pub fn day(&self, name: &str) -> Result<&Day> {
        self.get_day(name)
            .ok_or_else(|| Error::NoSuchDay(name.to_string()))
    }

    /// Days sorted with the most recent date first.
    pub fn days_newest_first(&self) -> Vec<&Day> {
        let mut days: Vec<&Day> = self.days.iter().collect();
        days.sort_by(|a, b| b.name.cmp(&a.name));
        days
    }

    /// Create an empty day. Its (empty) entry list is staged so the day file
    /// gets written on the next flush.
    pub fn add_day(&mut self, name: &str, now: Time) -> Result<&mut Day> {
        if time::parse_date(name).is_none() {
            return Err(Error::InvalidSelection(name.to_string()));
        }
        if self.get_day(name).is_some() {
            return Err(Error::DuplicateItem(name.to_string()));
        }
        let path = self.day_path(name);
        self.staged.insert(
            path.clone(),
            Staged {
                entries: vec![],
                pending: true,
            },
        );
        self.days.push(Day {
            path,
            name: name.to_string(),
            created: now,
            modified: now,
            tags: vec![],
        });
        let last = self.days.len() - 1;
        Ok(&mut self.days[last])
    }

    pub fn remove_day(&mut self, name: &str, storage: Option<&dyn Storage>) -> Result<Day> {
        let idx = self
            .days
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| Error::NoSuchDay(name.to_string()))?;
        let day = self.days.remove(idx);
        self.staged.shift_remove(&day.path);
        if let Some(storage) = storage {
            storage.remove_file(&day.path)?;
        }
        Ok(day)
    }

    /* ------------------------------ Entries ------------------------------ */

    /// Entries of day `name`, read through the staging map.
    pub fn entries(&mut self, name: &str, storage: Option<&dyn Storage>) -> Result<&[Entry]> {
        Ok(&self.stage(name, storage)?.entries)
    }

    /// Append an entry to the day its creation time falls on (in `tz`),
    /// creating the day when needed. Nothing is written until `write_days`.
    pub fn add_entry(
        &mut self,
        text: &str,
        created: Time,
        entry_tags: Vec<Tag>,
        tz: &TimeZone,
        storage: Option<&dyn Storage>,
    ) -> Result<&Entry> {
        let name = tz.format_date(created);
        let now = Time::now();
        if self.get_day(&name).is_some() {
            let staged = self.stage(&name, storage)?;
            if staged.entries.iter().any(|e| e.created == created) {
                return Err(Error::DuplicateItem(format!(
                    "{name} {}",
                    tz.format_time(created)
                )));
            }
        } else {
            self.add_day(&name, now)?;
        }

        let staged = self.stage(&name, storage)?;
        staged.entries.push(Entry {
            text: text.to_string(),
            created,
            modified: created,
            tags: entry_tags,
        });
        staged.entries.sort_by_key(|e| e.created);
        staged.pending = true;

        if let Some(day) = self.get_day_mut(&name) {
            day.modified = now;
        }
        self.entry(&name, created)
    }

    pub fn remove_entry(
        &mut self,
        name: &str,
        created: Time,
        storage: Option<&dyn Storage>,
    ) -> Result<Entry> {
        let staged = self.stage(name, storage)?;
        let idx = staged
            .entries
            .iter()
            .position(|e| e.created == created)
            .ok_or_else(|| Error::NoSuchEntry(format!("{name} {created}")))?;
        let entry = staged.entries.remove(idx);
        staged.pending = true;
        self.touch_day(name);
        Ok(entry)
    }

    pub fn edit_entry(
        &mut self,
        name: &str,
        created: Time,
        text: &str,
        storage: Option<&dyn Storage>,
    ) -> Result<&Entry> {
        self.update_entry(name, created, storage, |entry| {
            entry.text = text.to_string();
            true
        })?;
        self.entry(name, created)
    }

    /// Unchecked against the tag registry; see `Root::tag_entry`.
    pub fn tag_entry(
        &mut self,
        name: &str,
        created: Time,
        tag: Tag,
        storage: Option<&dyn Storage>,
    ) -> Result<bool> {
        self.update_entry(name, created, storage, |entry| tags::attach(&mut entry.tags, tag))
    }

    pub fn untag_entry(
        &mut self,
        name: &str,
        created: Time,
        tag: &str,
        storage: Option<&dyn Storage>,
    ) -> Result<bool> {
        self.update_entry(name, created, storage, |entry| tags::detach(&mut entry.tags, tag))
    }

    /// The entry on day `name` whose creation time reads `literal` in `tz`.
    pub fn find_entry_by_time(
        &mut self,
        name: &str,
        literal: &str,
        tz: &TimeZone,
        storage: Option<&dyn Storage>,
    ) -> Result<&Entry> {
        self.stage(name, storage)?
            .entries
            .iter()
            .find(|e| tz.format_time(e.created) == literal)
            .ok_or_else(|| Error::NoSuchEntry(format!("{name} {literal}")))
    }

    /// Write every staged day with unsaved changes. Returns the number of
    /// day files written.
    pub fn write_days(&mut self, storage: &dyn Storage) -> Result<usize> {
        let mut written = 0;
        for (path, staged) in self.staged.iter_mut() {
            if !staged.pending {
                continue;
            }
            let file = DayFileRef {
                entries: &staged.entries,
            };
            storage::write_json(storage, path, &file)?;
            staged.pending = false;
            written += 1;
            tracing::debug!(day = %path.display(), entries = staged.entries.len(), "wrote day");
        }
        Ok(written)
    }

    /* ------------------------------ Internals ------------------------------ */

    fn entry(&self, name: &str, created: Time) -> Result<&Entry> {
        let path = self.day_path(name);
        self.staged
            .get(&path)
            .and_then(|s| s.entries.iter().find(|e| e.created == created))
            .ok_or_else(|| Error::NoSuchEntry(format!("{name} {created}")))
    }

    fn update_entry(
        &mut self,
        name: &str,
        created: Time,
        storage: Option<&dyn Storage>,
        f: impl FnOnce(&mut Entry) -> bool,
    ) -> Result<bool> {
        let staged = self.stage(name, storage)?;
        let entry = staged
            .entries
            .iter_mut()
            .find(|e| e.created == created)
            .ok_or_else(|| Error::NoSuchEntry(format!("{name} {created}")))?;
        let changed = f(entry);
        if changed {
            entry.modified = Time::now();
            staged.pending = true;
            self.touch_day(name);
        }
        Ok(changed)
    }

    fn touch_day(&mut self, name: &str) {
        if let Some(day) = self.get_day_mut(name) {
            day.modified = Time::now();
        }
    }

    fn stage(&mut self, name: &str, storage: Option<&dyn Storage>) -> Result<&mut Staged> {
        let path = self.day(name)?.path.clone();
        if !self.staged.contains_key(&path) {
            let storage = storage::require(storage)?;
            let file: DayFile = storage::read_json(storage, &path)?.unwrap_or_default();
            tracing::debug!(day = name, entries = file.entries.len(), "staged day");
            self.staged.insert(
                path.clone(),
                Staged {
                    entries: file.entries,
                    pending: false,
                },
            );
        }
        self.staged
            .get_mut(&path)
            .ok_or_else(|| Error::NoSuchDay(name.to_string()))
    }
}

#[derive(Serialize)]
struct DayFileRef<'a> {
    entries: &'a [Entry],
}
