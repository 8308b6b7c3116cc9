//! Tasklists: tasks keyed by a content hash of their outcome and action.
//!
//! Active tasks (neither done nor archived) also get a dense index in
//! canonical order so they can be referred to as `t0`, `t1`, ...

use super::{Collection, CollectionKind, Descriptor};
use crate::error::{Error, Result};
use crate::tags::{self, Tag};
use crate::time::Time;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// Number of hex digits in a full task hash.
pub const HASH_DIGITS: u8 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    #[default]
    Low,
    High,
    Urgent,
}

/// Derived state of a task. Variants are listed in increasing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    NoStatus,
    NearlyDue,
    Overdue,
    Done,
    Archived,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub outcome: String,
    pub action: Option<String>,
    pub details: Option<String>,
    #[serde(with = "hex_hash")]
    pub hash: u64,
    pub created: Time,
    pub modified: Time,
    pub due: Option<Time>,
    pub done: Option<Time>,
    pub archived: Option<Time>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Task {
    /// Stable identity of `(outcome, action)`: the leading 8 bytes of their
    /// SHA-256, big-endian.
    pub fn hash_of(outcome: &str, action: Option<&str>) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(outcome.as_bytes());
        if let Some(action) = action {
            hasher.update([0x1f]);
            hasher.update(action.as_bytes());
        }
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head)
    }

    pub fn hex_hash(&self) -> String {
        format!("{:016x}", self.hash)
    }

    pub fn is_active(&self) -> bool {
        self.done.is_none() && self.archived.is_none()
    }

    /// Archived beats done beats overdue beats nearly due (within a day).
    pub fn status(&self, now: Time) -> Status {
        if self.archived.is_some() {
            return Status::Archived;
        }
        if self.done.is_some() {
            return Status::Done;
        }
        match self.due {
            Some(due) if due < now => Status::Overdue,
            Some(due) if due < now.add_hours(24) => Status::NearlyDue,
            _ => Status::NoStatus,
        }
    }

    /// Whether the first `digits` hex digits of the hash read `prefix`.
    pub fn matches_mini_hash(&self, prefix: u64, digits: u8) -> bool {
        if digits == 0 || digits > HASH_DIGITS {
            return false;
        }
        let shift = 4 * u32::from(HASH_DIGITS - digits);
        self.hash.checked_shr(shift).unwrap_or(0) == prefix
    }
}

/// Due ascending with undated tasks last; ties by outcome, descending.
fn canonical_cmp(a: &Task, b: &Task) -> Ordering {
    let by_due = match (a.due, b.due) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_due.then_with(|| b.outcome.cmp(&a.outcome))
}

/// Fields a caller supplies for a new task; the rest are derived.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub outcome: String,
    pub action: Option<String>,
    pub details: Option<String>,
    pub due: Option<Time>,
    pub importance: Importance,
    pub tags: Vec<Tag>,
}

impl NewTask {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            ..Self::default()
        }
    }
}

/// Hash -> dense index (`None` for inactive tasks), in canonical order.
pub type IndexMapping = IndexMap<u64, Option<usize>>;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Tasklist {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(skip)]
    index: Option<IndexMapping>,
}

impl Collection for Tasklist {
    const KIND: CollectionKind = CollectionKind::Tasklist;

    fn attach(&mut self, _descriptor: &Descriptor) {
        self.index = None;
    }
}

impl Tasklist {
    /* ------------------------------ Ordering ------------------------------ */

    pub fn canonical_order(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        tasks.sort_by(|a, b| canonical_cmp(a, b));
        tasks
    }

    /// Compute the index map from scratch.
    pub fn make_index_map(&self) -> IndexMapping {
        let mut next = 0;
        self.canonical_order()
            .into_iter()
            .map(|task| {
                let idx = task.is_active().then(|| {
                    next += 1;
                    next - 1
                });
                (task.hash, idx)
            })
            .collect()
    }

    /// Cached index map; rebuilt when invalidated or when the task count
    /// no longer matches.
    pub fn index_map(&mut self) -> &IndexMapping {
        let stale = self
            .index
            .as_ref()
            .is_none_or(|map| map.len() != self.tasks.len());
        if stale {
            self.index = Some(self.make_index_map());
        }
        self.index.get_or_insert_with(IndexMapping::new)
    }

    pub fn invalidate_index(&mut self) {
        self.index = None;
    }

    pub fn index_of(&mut self, hash: u64) -> Option<usize> {
        self.index_map().get(&hash).copied().flatten()
    }

    /* ------------------------------ Lookups ------------------------------ */

    pub fn get_by_hash(&self, hash: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.hash == hash)
    }

    pub fn task(&self, hash: u64) -> Result<&Task> {
        self.get_by_hash(hash)
            .ok_or_else(|| Error::NoSuchTask(format!("{hash:016x}")))
    }

    pub fn get_by_index(&mut self, index: usize) -> Option<&Task> {
        let hash = self
            .index_map()
            .iter()
            .find(|(_, idx)| **idx == Some(index))
            .map(|(hash, _)| *hash)?;
        self.get_by_hash(hash)
    }

    /// Match a hex prefix of `digits` digits; must hit exactly one task.
    pub fn get_by_mini_hash(&self, prefix: u64, digits: u8) -> Result<&Task> {
        let label = || format!("/{:0width$x}", prefix, width = usize::from(digits));
        let mut hits = self
            .tasks
            .iter()
            .filter(|t| t.matches_mini_hash(prefix, digits));
        let first = hits.next().ok_or_else(|| Error::NoSuchTask(label()))?;
        if hits.next().is_some() {
            return Err(Error::AmbiguousSelection(label()));
        }
        Ok(first)
    }

    /// Match the exact outcome text; must hit exactly one task.
    pub fn get_by_outcome(&self, outcome: &str) -> Result<&Task> {
        let mut hits = self.tasks.iter().filter(|t| t.outcome == outcome);
        let first = hits
            .next()
            .ok_or_else(|| Error::NoSuchTask(outcome.to_string()))?;
        if hits.next().is_some() {
            return Err(Error::AmbiguousSelection(outcome.to_string()));
        }
        Ok(first)
    }

    /* ----------------------------- Mutations ----------------------------- */

    pub fn add_task(&mut self, new: NewTask, now: Time) -> Result<&Task> {
        if new.outcome.trim().is_empty() {
            return Err(Error::InvalidSelection(new.outcome));
        }
        let hash = Task::hash_of(&new.outcome, new.action.as_deref());
        if self.get_by_hash(hash).is_some() {
            return Err(Error::DuplicateTask(new.outcome));
        }
        self.tasks.push(Task {
            outcome: new.outcome,
            action: new.action,
            details: new.details,
            hash,
            created: now,
            modified: now,
            due: new.due,
            done: None,
            archived: None,
            importance: new.importance,
            tags: new.tags,
        });
        self.invalidate_index();
        Ok(&self.tasks[self.tasks.len() - 1])
    }

    pub fn remove_task(&mut self, hash: u64) -> Result<Task> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.hash == hash)
            .ok_or_else(|| Error::NoSuchTask(format!("{hash:016x}")))?;
        self.invalidate_index();
        Ok(self.tasks.remove(idx))
    }

    /// Change outcome and action. The hash follows the content, so the task
    /// gets a new identity; returns it.
    pub fn rename_task(
        &mut self,
        hash: u64,
        outcome: &str,
        action: Option<&str>,
    ) -> Result<u64> {
        let new_hash = Task::hash_of(outcome, action);
        if new_hash != hash && self.get_by_hash(new_hash).is_some() {
            return Err(Error::DuplicateTask(outcome.to_string()));
        }
        self.update(hash, |task| {
            task.outcome = outcome.to_string();
            task.action = action.map(str::to_string);
            task.hash = new_hash;
        })?;
        Ok(new_hash)
    }

    pub fn set_done(&mut self, hash: u64, done: Option<Time>) -> Result<()> {
        self.update(hash, |task| task.done = done)
    }

    pub fn set_archived(&mut self, hash: u64, archived: Option<Time>) -> Result<()> {
        self.update(hash, |task| task.archived = archived)
    }

    pub fn set_due(&mut self, hash: u64, due: Option<Time>) -> Result<()> {
        self.update(hash, |task| task.due = due)
    }

    pub fn set_importance(&mut self, hash: u64, importance: Importance) -> Result<()> {
        self.update(hash, |task| task.importance = importance)
    }

    pub fn set_details(&mut self, hash: u64, details: Option<String>) -> Result<()> {
        self.update(hash, |task| task.details = details)
    }

    /// Attach `tag` without consulting the tag registry; `Root::tag_task`
    /// is the checked path.
    pub fn tag_task(&mut self, hash: u64, tag: Tag) -> Result<bool> {
        let mut changed = false;
        self.update(hash, |task| changed = tags::attach(&mut task.tags, tag))?;
        Ok(changed)
    }

    pub fn untag_task(&mut self, hash: u64, tag: &str) -> Result<bool> {
        let mut changed = false;
        self.update(hash, |task| changed = tags::detach(&mut task.tags, tag))?;
        Ok(changed)
    }

    /// Archive every done task; returns how many were archived.
    pub fn archive_done(&mut self, now: Time) -> usize {
        let mut count = 0;
        for task in self.tasks.iter_mut() {
            if task.done.is_some() && task.archived.is_none() {
                task.archived = Some(now);
                task.modified = now;
                count += 1;
            }
        }
        if count > 0 {
            self.invalidate_index();
        }
        count
    }

    fn update(&mut self, hash: u64, f: impl FnOnce(&mut Task)) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.hash == hash)
            .ok_or_else(|| Error::NoSuchTask(format!("{hash:016x}")))?;
        f(task);
        task.modified = Time::now();
        self.invalidate_index();
        Ok(())
    }
}

mod hex_hash {
    use super::*;

    pub fn serialize<S>(hash: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{hash:016x}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Hex(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Hex(s) => u64::from_str_radix(&s, 16).map_err(serde::de::Error::custom),
        }
    }
}
