//! Personal records library: journals, note directories and tasklists kept as
//! plain JSON under one root directory, plus root-level tag, chain and stack
//! registries. Records are addressed by short selectors (`3`, `t2`, `/1a2b`,
//! `2024-01-07`, `hello`) resolved through `select::Resolver`.

pub mod chains;
pub mod collections;
pub mod config;
pub mod error;
pub mod root;
pub mod select;
pub mod stacks;
pub mod storage;
pub mod tags;
pub mod time;

pub use collections::{
    Collection, CollectionKind, Day, Descriptor, Directory, Entry, Importance, Journal, Note,
    Status, Task, Tasklist, tasklist::NewTask,
};
pub use error::{Error, Result};
pub use root::{Root, TopologyInfo};
pub use select::{Item, Resolver, Selection, Selector};
pub use storage::{FileSystem, Storage};
pub use time::{Time, TimeZone};
