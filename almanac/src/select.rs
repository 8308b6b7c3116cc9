//! Selector parsing and resolution.
//!
//! A selector is a short string naming one record somewhere in the root:
//!
//! | form            | example        | meaning                                   |
//! |-----------------|----------------|-------------------------------------------|
//! | digits          | `3`            | index (days ago, or task index)           |
//! | letter + digits | `t3`, `j0`     | index qualified with its collection kind  |
//! | `/` + hex       | `/1a2b`        | task hash, or a prefix of one             |
//! | `YYYY-MM-DD`    | `2024-01-07`   | a day, or a note named after a date       |
//! | anything else   | `hello`        | a note name, day name or task outcome     |
//!
//! When a selection names no kind, directories are searched first, then
//! journals, then tasklists; the first hit wins.

use crate::collections::{CollectionKind, Day, Directory, Entry, Journal, Note, Task, Tasklist};
use crate::config::DirectoryIndexPolicy;
use crate::error::{Error, Result};
use crate::root::Root;
use crate::stacks::StackItem;
use crate::time::{self, Time, TimeZone};
use chrono::NaiveDate;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::{char, digit1, satisfy},
    combinator::{all_consuming, map_opt, map_res, rest},
    error::VerboseError,
    sequence::{pair, preceded},
};
use serde::Serialize;
use std::{fmt, str::FromStr};
use tracing::debug;

/* ------------------------------- Selector ------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    QualifiedIndex { qualifier: char, index: usize },
    /// `digits` hex digits were given; fewer than 16 is a prefix.
    Hash { value: u64, digits: u8 },
    Date(NaiveDate),
    Name(String),
}

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn index(i: &str) -> PResult<'_, Selector> {
    map_res(digit1, |d: &str| d.parse().map(Selector::Index))(i)
}

fn qualified_index(i: &str) -> PResult<'_, Selector> {
    map_res(
        pair(satisfy(|c| c.is_ascii_alphabetic()), digit1),
        |(qualifier, d): (char, &str)| {
            d.parse().map(|index| Selector::QualifiedIndex {
                qualifier: qualifier.to_ascii_lowercase(),
                index,
            })
        },
    )(i)
}

fn hash(i: &str) -> PResult<'_, Selector> {
    map_res(
        preceded(char('/'), take_while_m_n(1, 16, |c: char| c.is_ascii_hexdigit())),
        |hex: &str| {
            u64::from_str_radix(hex, 16).map(|value| Selector::Hash {
                value,
                digits: hex.len() as u8,
            })
        },
    )(i)
}

fn date(i: &str) -> PResult<'_, Selector> {
    map_opt(rest, |s: &str| time::parse_date(s).map(Selector::Date))(i)
}

fn classify(i: &str) -> PResult<'_, Selector> {
    alt((
        all_consuming(index),
        all_consuming(qualified_index),
        all_consuming(hash),
        all_consuming(date),
    ))(i)
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidSelection(String::new()));
        }
        match classify(s) {
            Ok((_, selector)) => Ok(selector),
            // All digits but too large for an index.
            Err(_) if s.bytes().all(|b| b.is_ascii_digit()) => {
                Err(Error::InvalidSelection(s.to_string()))
            }
            Err(_) => Ok(Selector::Name(s.to_string())),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Index(n) => write!(f, "{n}"),
            Selector::QualifiedIndex { qualifier, index } => write!(f, "{qualifier}{index}"),
            Selector::Hash { value, digits } => {
                write!(f, "/{value:0width$x}", width = usize::from(*digits))
            }
            Selector::Date(d) => f.write_str(&time::format_date(*d)),
            Selector::Name(s) => f.write_str(s),
        }
    }
}

impl Selector {
    /// Kind implied by a qualified index.
    fn qualified_kind(&self, text: &str) -> Result<Option<CollectionKind>> {
        match self {
            Selector::QualifiedIndex { qualifier: 't', .. } => Ok(Some(CollectionKind::Tasklist)),
            Selector::QualifiedIndex { qualifier: 'j', .. } => Ok(Some(CollectionKind::Journal)),
            Selector::QualifiedIndex { .. } => Err(Error::UnknownSelection(text.to_string())),
            _ => Ok(None),
        }
    }

    fn accepted_by(&self, kind: CollectionKind, policy: DirectoryIndexPolicy) -> bool {
        match (kind, self) {
            (CollectionKind::Journal, Selector::Hash { .. }) => false,
            (CollectionKind::Journal, Selector::QualifiedIndex { qualifier, .. }) => *qualifier == 'j',
            (CollectionKind::Journal, _) => true,
            (CollectionKind::Directory, Selector::Name(_) | Selector::Date(_)) => true,
            (CollectionKind::Directory, Selector::Index(_)) => {
                policy == DirectoryIndexPolicy::DayOffset
            }
            (CollectionKind::Directory, _) => false,
            (CollectionKind::Tasklist, Selector::Date(_)) => false,
            (CollectionKind::Tasklist, Selector::QualifiedIndex { qualifier, .. }) => *qualifier == 't',
            (CollectionKind::Tasklist, _) => true,
        }
    }
}

/* ------------------------------ Selection ------------------------------ */

/// A selector plus the modifiers that narrow where it is looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub selector: Option<String>,
    pub kind: Option<CollectionKind>,
    pub collection: Option<String>,
    /// `HH:MM:SS` of a journal entry on the selected day.
    pub entry_time: Option<String>,
}

impl Selection {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: CollectionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn entry_time(mut self, time: impl Into<String>) -> Self {
        self.entry_time = Some(time.into());
        self
    }
}

impl From<&StackItem> for Selection {
    fn from(item: &StackItem) -> Self {
        Self {
            selector: Some(item.selector.clone()),
            kind: item.kind,
            collection: item.collection.clone(),
            entry_time: None,
        }
    }
}

/* --------------------------------- Item --------------------------------- */

/// A resolved record: the owning collection's name and a snapshot of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "item", rename_all = "lowercase")]
pub enum Item {
    Collection {
        kind: CollectionKind,
        name: String,
    },
    Day {
        journal: String,
        day: Day,
        entries: Vec<Entry>,
    },
    Entry {
        journal: String,
        day: String,
        entry: Entry,
    },
    Note {
        directory: String,
        note: Note,
    },
    Task {
        tasklist: String,
        task: Task,
    },
}

impl Item {
    pub fn kind(&self) -> CollectionKind {
        match self {
            Item::Collection { kind, .. } => *kind,
            Item::Day { .. } | Item::Entry { .. } => CollectionKind::Journal,
            Item::Note { .. } => CollectionKind::Directory,
            Item::Task { .. } => CollectionKind::Tasklist,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Item::Collection { name, .. } => name,
            Item::Day { journal, .. } | Item::Entry { journal, .. } => journal,
            Item::Note { directory, .. } => directory,
            Item::Task { tasklist, .. } => tasklist,
        }
    }
}

/* ------------------------------- Resolver ------------------------------- */

/// Resolves selections against a root. Collections are loaded on demand but
/// nothing is ever marked dirty.
pub struct Resolver<'a> {
    root: &'a mut Root,
    tz: TimeZone,
    now: Time,
}

impl<'a> Resolver<'a> {
    pub fn new(root: &'a mut Root, tz: TimeZone) -> Self {
        Self {
            root,
            tz,
            now: Time::now(),
        }
    }

    /// Resolve relative selectors (day indices) against `now`.
    pub fn at(mut self, now: Time) -> Self {
        self.now = now;
        self
    }

    pub fn resolve(&mut self, selection: &Selection) -> Result<Item> {
        let Some(text) = selection.selector.as_deref() else {
            return self.collection_item(selection);
        };
        let selector: Selector = text.parse()?;
        let kind = explicit_kind(selection, &selector, text)?;
        debug!(selector = text, kind = ?kind, collection = ?selection.collection, "resolving");

        match kind {
            Some(kind) => {
                let name = self.collection_name(kind, selection);
                if !self.root.has_collection(kind, &name) {
                    return Err(Error::NoSuchCollection { kind, name });
                }
                let policy = self.root.directory_index();
                if !selector.accepted_by(kind, policy) {
                    return Err(match (kind, &selector) {
                        (CollectionKind::Directory, Selector::Index(_)) => {
                            Error::IncompatibleSelection(text.to_string())
                        }
                        _ => Error::InvalidSelection(text.to_string()),
                    });
                }
                self.resolve_in(kind, &name, &selector, text, selection.entry_time.as_deref())
            }
            None => self.search(selection, &selector, text),
        }
    }

    pub fn resolve_stack_item(&mut self, item: &StackItem) -> Result<Item> {
        self.resolve(&Selection::from(item))
    }

    /// Try each kind in search order, skipping kinds that cannot take the
    /// selector or lack the collection.
    fn search(&mut self, selection: &Selection, selector: &Selector, text: &str) -> Result<Item> {
        let policy = self.root.directory_index();
        for kind in CollectionKind::SEARCH_ORDER {
            if !selector.accepted_by(kind, policy) {
                continue;
            }
            let name = self.collection_name(kind, selection);
            if !self.root.has_collection(kind, &name) {
                continue;
            }
            match self.resolve_in(kind, &name, selector, text, None) {
                Ok(item) => return Ok(item),
                Err(err) if err.is_not_found() => {
                    debug!(selector = text, %kind, collection = %name, "no match, trying next kind");
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::NoSuchItem(text.to_string()))
    }

    fn collection_name(&self, kind: CollectionKind, selection: &Selection) -> String {
        selection
            .collection
            .clone()
            .unwrap_or_else(|| self.root.default_name(kind).to_string())
    }

    fn collection_item(&mut self, selection: &Selection) -> Result<Item> {
        let kind = match (selection.kind, &selection.collection) {
            (Some(kind), _) => kind,
            (None, Some(name)) => CollectionKind::SEARCH_ORDER
                .into_iter()
                .find(|k| self.root.has_collection(*k, name))
                .ok_or_else(|| Error::NoSuchItem(name.clone()))?,
            (None, None) => return Err(Error::InvalidSelection(String::new())),
        };
        let name = self.collection_name(kind, selection);
        if !self.root.has_collection(kind, &name) {
            return Err(Error::NoSuchCollection { kind, name });
        }
        Ok(Item::Collection { kind, name })
    }

    fn resolve_in(
        &mut self,
        kind: CollectionKind,
        name: &str,
        selector: &Selector,
        text: &str,
        entry_time: Option<&str>,
    ) -> Result<Item> {
        match kind {
            CollectionKind::Journal => self.in_journal(name, selector, text, entry_time),
            CollectionKind::Directory => self.in_directory(name, selector, text),
            CollectionKind::Tasklist => self.in_tasklist(name, selector, text),
        }
    }

    fn days_ago(&self, n: usize, text: &str) -> Result<String> {
        self.tz
            .days_ago(self.now, n as u64)
            .map(time::format_date)
            .ok_or_else(|| Error::NoSuchDay(text.to_string()))
    }

    fn in_journal(
        &mut self,
        journal: &str,
        selector: &Selector,
        text: &str,
        entry_time: Option<&str>,
    ) -> Result<Item> {
        let day_name = match selector {
            Selector::Index(n) | Selector::QualifiedIndex { index: n, .. } => self.days_ago(*n, text)?,
            Selector::Date(d) => time::format_date(*d),
            Selector::Name(s) => s.clone(),
            Selector::Hash { .. } => return Err(Error::InvalidSelection(text.to_string())),
        };
        let tz = self.tz;
        let owner = journal.to_string();
        self.root.inspect::<Journal, _>(journal, |j, storage| {
            let day = j.day(&day_name)?.clone();
            match entry_time {
                Some(literal) => {
                    let entry = j.find_entry_by_time(&day_name, literal, &tz, storage)?.clone();
                    Ok(Item::Entry {
                        journal: owner,
                        day: day.name,
                        entry,
                    })
                }
                None => {
                    let entries = j.entries(&day_name, storage)?.to_vec();
                    Ok(Item::Day {
                        journal: owner,
                        day,
                        entries,
                    })
                }
            }
        })
    }

    fn in_directory(&mut self, directory: &str, selector: &Selector, text: &str) -> Result<Item> {
        let note_name = match selector {
            Selector::Name(s) => s.clone(),
            Selector::Date(d) => time::format_date(*d),
            Selector::Index(n) => match self.root.directory_index() {
                DirectoryIndexPolicy::DayOffset => self.days_ago(*n, text)?,
                DirectoryIndexPolicy::Reject => {
                    return Err(Error::IncompatibleSelection(text.to_string()));
                }
            },
            _ => return Err(Error::InvalidSelection(text.to_string())),
        };
        let owner = directory.to_string();
        self.root.inspect::<Directory, _>(directory, |d, _| {
            Ok(Item::Note {
                directory: owner,
                note: d.note(&note_name)?.clone(),
            })
        })
    }

    fn in_tasklist(&mut self, tasklist: &str, selector: &Selector, text: &str) -> Result<Item> {
        let owner = tasklist.to_string();
        self.root.inspect::<Tasklist, _>(tasklist, |t, _| {
            let task = match selector {
                Selector::Name(outcome) => t.get_by_outcome(outcome)?,
                Selector::Index(n) | Selector::QualifiedIndex { index: n, .. } => t
                    .get_by_index(*n)
                    .ok_or_else(|| Error::NoSuchTask(text.to_string()))?,
                Selector::Hash { value, digits: 16 } => t.task(*value)?,
                Selector::Hash { value, digits } => t.get_by_mini_hash(*value, *digits)?,
                Selector::Date(_) => return Err(Error::InvalidSelection(text.to_string())),
            };
            Ok(Item::Task {
                tasklist: owner,
                task: task.clone(),
            })
        })
    }
}

/// The kind fixed by the flag, the qualifier or an entry time; they must agree.
fn explicit_kind(
    selection: &Selection,
    selector: &Selector,
    text: &str,
) -> Result<Option<CollectionKind>> {
    let sources = [
        selection.kind,
        selector.qualified_kind(text)?,
        selection.entry_time.as_ref().map(|_| CollectionKind::Journal),
    ];
    let mut kind = None;
    for source in sources.into_iter().flatten() {
        match kind {
            Some(k) if k != source => return Err(Error::IncompatibleSelection(text.to_string())),
            _ => kind = Some(source),
        }
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{Importance, tasklist::NewTask};
    use crate::config::Defaults;
    use crate::storage::FileSystem;
    use chrono::NaiveTime;

    fn in_memory() -> Root {
        Root::init(None, Defaults::default()).expect("init")
    }

    fn parse(s: &str) -> Selector {
        s.parse().expect("selector")
    }

    fn raw_task(outcome: &str, hash: u64) -> Task {
        let now = Time::from_millis(0).unwrap();
        Task {
            outcome: outcome.into(),
            action: None,
            details: None,
            hash,
            created: now,
            modified: now,
            due: None,
            done: None,
            archived: None,
            importance: Importance::Low,
            tags: vec![],
        }
    }

    #[test]
    fn selectors_are_classified_lexically() {
        assert_eq!(parse("123"), Selector::Index(123));
        assert_eq!(
            parse("t4"),
            Selector::QualifiedIndex {
                qualifier: 't',
                index: 4
            }
        );
        assert_eq!(
            parse("2024-01-07"),
            Selector::Date(NaiveDate::from_ymd_opt(2024, 1, 7).unwrap())
        );
        assert_eq!(
            parse("/1a2b"),
            Selector::Hash {
                value: 0x1a2b,
                digits: 4
            }
        );
        assert_eq!(parse("hello"), Selector::Name("hello".into()));
        assert_eq!(parse("/xyz"), Selector::Name("/xyz".into()));
        assert_eq!(
            parse("/00000000000000001"),
            Selector::Name("/00000000000000001".into())
        );
        assert_eq!(parse("2024-13-01"), Selector::Name("2024-13-01".into()));
        assert!(matches!("".parse::<Selector>(), Err(Error::InvalidSelection(_))));
        assert!(matches!(
            "99999999999999999999999".parse::<Selector>(),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn selectors_display_as_written() {
        for s in ["12", "t3", "/00ff", "2024-01-07", "hello"] {
            assert_eq!(parse(s).to_string(), s);
        }
    }

    #[test]
    fn directories_win_name_collisions() {
        let mut root = in_memory();
        root.add_note(None, "hello", None, vec![], None).expect("note");
        root.add_task(None, NewTask::new("hello")).expect("task");

        let item = Resolver::new(&mut root, TimeZone::utc())
            .resolve(&Selection::new("hello"))
            .expect("resolve");
        assert!(matches!(item, Item::Note { ref directory, .. } if directory == "notes"));

        let item = Resolver::new(&mut root, TimeZone::utc())
            .resolve(&Selection::new("hello").kind(CollectionKind::Tasklist))
            .expect("resolve");
        assert!(matches!(item, Item::Task { ref task, .. } if task.outcome == "hello"));

        root.modify::<Directory, _>("notes", |d, s| d.remove_note("hello", s))
            .expect("remove note");
        let item = Resolver::new(&mut root, TimeZone::utc())
            .resolve(&Selection::new("hello"))
            .expect("resolve");
        assert_eq!(item.kind(), CollectionKind::Tasklist);
    }

    #[test]
    fn misses_in_every_kind_report_the_selector() {
        let mut root = in_memory();
        let err = Resolver::new(&mut root, TimeZone::utc())
            .resolve(&Selection::new("nothing here"))
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchItem(ref s) if s == "nothing here"));
    }

    #[test]
    fn ambiguity_is_never_swallowed() {
        let mut root = in_memory();
        for action in ["phone", "email"] {
            let mut task = NewTask::new("call bank");
            task.action = Some(action.into());
            root.add_task(None, task).expect("task");
        }
        assert!(matches!(
            Resolver::new(&mut root, TimeZone::utc()).resolve(&Selection::new("call bank")),
            Err(Error::AmbiguousSelection(_))
        ));
    }

    #[test]
    fn hashes_and_prefixes() {
        let mut root = in_memory();
        {
            let todo = root
                .get_collection_mut::<Tasklist>("todo")
                .unwrap()
                .unwrap();
            todo.tasks.push(raw_task("first", 0x1a2b_ffff_0000_0000));
            todo.tasks.push(raw_task("second", 0x1a2b_0000_0000_0001));
            todo.invalidate_index();
        }
        let mut resolver = Resolver::new(&mut root, TimeZone::utc());
        assert!(matches!(
            resolver.resolve(&Selection::new("/1a2b")),
            Err(Error::AmbiguousSelection(_))
        ));
        let outcome = |item: Item| match item {
            Item::Task { task, .. } => task.outcome,
            other => panic!("expected a task, got {other:?}"),
        };
        assert_eq!(outcome(resolver.resolve(&Selection::new("/1a2bf")).unwrap()), "first");
        assert_eq!(
            outcome(resolver.resolve(&Selection::new("/1a2b000000000001")).unwrap()),
            "second"
        );
        assert!(matches!(
            resolver.resolve(&Selection::new("/ffff")),
            Err(Error::NoSuchItem(_))
        ));
    }

    #[test]
    fn indices_follow_canonical_order() {
        let mut root = in_memory();
        let now = Time::now();
        let mut soon = NewTask::new("soon");
        soon.due = Some(now.add_days(1));
        root.add_task(None, NewTask::new("someday")).expect("task");
        root.add_task(None, soon).expect("task");

        let mut resolver = Resolver::new(&mut root, TimeZone::utc()).at(now);
        let first = resolver.resolve(&Selection::new("t0")).expect("t0");
        assert!(matches!(first, Item::Task { ref task, .. } if task.outcome == "soon"));
        let second = resolver
            .resolve(&Selection::new("1").kind(CollectionKind::Tasklist))
            .expect("1");
        assert!(matches!(second, Item::Task { ref task, .. } if task.outcome == "someday"));
    }

    #[test]
    fn explicit_kinds_must_agree() {
        let mut root = in_memory();
        let mut resolver = Resolver::new(&mut root, TimeZone::utc());
        assert!(matches!(
            resolver.resolve(&Selection::new("t4").kind(CollectionKind::Journal)),
            Err(Error::IncompatibleSelection(_))
        ));
        assert!(matches!(
            resolver.resolve(
                &Selection::new("0")
                    .kind(CollectionKind::Tasklist)
                    .entry_time("09:00:00")
            ),
            Err(Error::IncompatibleSelection(_))
        ));
        assert!(matches!(
            resolver.resolve(&Selection::new("0").kind(CollectionKind::Journal).collection("nope")),
            Err(Error::NoSuchCollection { .. })
        ));
        assert!(matches!(
            resolver.resolve(&Selection::new("/1a2b").kind(CollectionKind::Journal)),
            Err(Error::InvalidSelection(_))
        ));
        assert!(matches!(
            resolver.resolve(&Selection::new("x4")),
            Err(Error::UnknownSelection(_))
        ));
    }

    #[test]
    fn directory_indices_follow_the_policy() {
        let mut root = in_memory();
        let tz = TimeZone::utc();
        let now = Time::now();
        let two_days_ago = time::format_date(tz.days_ago(now, 2).unwrap());
        root.add_note(None, &two_days_ago, None, vec![], None)
            .expect("note");

        let explicit = Selection::new("2").kind(CollectionKind::Directory);
        assert!(matches!(
            Resolver::new(&mut root, tz).at(now).resolve(&explicit),
            Err(Error::IncompatibleSelection(_))
        ));
        // Skipped in the search; nothing else answers to "2".
        assert!(matches!(
            Resolver::new(&mut root, tz).at(now).resolve(&Selection::new("2")),
            Err(Error::NoSuchItem(_))
        ));

        root.info_mut().directory_index = DirectoryIndexPolicy::DayOffset;
        let item = Resolver::new(&mut root, tz)
            .at(now)
            .resolve(&explicit)
            .expect("resolve");
        assert!(matches!(item, Item::Note { ref note, .. } if note.name == two_days_ago));
    }

    #[test]
    fn entry_time_narrows_to_one_entry() {
        let mut root = in_memory();
        let tz = TimeZone::utc();
        let day = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        for (h, m, text) in [(9, 15, "coffee"), (18, 30, "dinner")] {
            let created = tz.at(day, NaiveTime::from_hms_opt(h, m, 0).unwrap()).unwrap();
            root.add_entry(None, text, created, vec![], &tz).expect("entry");
        }

        let mut resolver = Resolver::new(&mut root, tz);
        let item = resolver
            .resolve(&Selection::new("2024-01-07").entry_time("18:30:00"))
            .expect("resolve");
        assert!(matches!(item, Item::Entry { ref entry, .. } if entry.text == "dinner"));

        let item = resolver.resolve(&Selection::new("2024-01-07")).expect("day");
        assert!(matches!(item, Item::Day { ref entries, .. } if entries.len() == 2));

        assert!(matches!(
            resolver.resolve(&Selection::new("2024-01-07").entry_time("12:00:00")),
            Err(Error::NoSuchEntry(_))
        ));
    }

    #[test]
    fn no_selector_selects_the_collection() {
        let mut root = in_memory();
        let mut resolver = Resolver::new(&mut root, TimeZone::utc());
        let item = resolver
            .resolve(&Selection {
                kind: Some(CollectionKind::Journal),
                ..Selection::default()
            })
            .expect("resolve");
        assert_eq!(
            item,
            Item::Collection {
                kind: CollectionKind::Journal,
                name: "diary".into()
            }
        );
        let item = resolver
            .resolve(&Selection {
                collection: Some("todo".into()),
                ..Selection::default()
            })
            .expect("resolve");
        assert_eq!(item.kind(), CollectionKind::Tasklist);
        assert!(resolver.resolve(&Selection::default()).is_err());
    }

    #[test]
    fn todays_diary_survives_a_reload() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tz = TimeZone::utc();
        let now = Time::now();
        let mut root = Root::init(Some(Box::new(FileSystem::new(tmp.path()))), Defaults::default())
            .expect("init");
        root.add_entry(None, "started a diary", now, vec![], &tz)
            .expect("entry");

        let before = Resolver::new(&mut root, tz)
            .at(now)
            .resolve(&Selection::new("0"))
            .expect("before flush");
        assert!(matches!(before, Item::Day { ref entries, .. } if entries.len() == 1));
        root.write_changes().expect("flush");
        assert!(!root.has_changes());

        let mut again = Root::open(tmp.path()).expect("load");
        let after = Resolver::new(&mut again, tz)
            .at(now)
            .resolve(&Selection::new("0"))
            .expect("after reload");
        assert_eq!(before, after);
        assert!(!again.has_changes());
    }

    #[test]
    fn stack_items_resolve_like_selections() {
        let mut root = in_memory();
        root.add_task(None, NewTask::new("read paper")).expect("task");
        let item = StackItem {
            selector: "read paper".into(),
            kind: Some(CollectionKind::Tasklist),
            collection: Some("todo".into()),
            note: None,
            added: Time::now(),
        };
        let resolved = Resolver::new(&mut root, TimeZone::utc())
            .resolve_stack_item(&item)
            .expect("resolve");
        assert_eq!(resolved.collection(), "todo");
    }
}
