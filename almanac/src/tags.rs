//! Global tag registry (`tags.json`) and the tags attached to items.

use crate::error::{Error, Result};
use crate::time::Time;
use serde::{Deserialize, Serialize};

pub const TAGS_FILE: &str = "tags.json";

/// A tag attached to an item. Valid only while a descriptor with the same name
/// exists in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub added: Time,
}

impl Tag {
    pub fn new(name: impl Into<String>, added: Time) -> Self {
        Self {
            name: name.into(),
            added,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDescriptor {
    pub name: String,
    pub created: Time,
    /// Display color; interpreted only by the presentation layer.
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRegistry {
    #[serde(default)]
    pub tags: Vec<TagDescriptor>,
}

impl TagRegistry {
    pub fn get(&self, name: &str) -> Option<&TagDescriptor> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn add(&mut self, descriptor: TagDescriptor) -> Result<()> {
        if descriptor.name.trim().is_empty() || descriptor.name.contains(char::is_whitespace) {
            return Err(Error::InvalidSelection(descriptor.name));
        }
        if self.get(&descriptor.name).is_some() {
            return Err(Error::DuplicateItem(descriptor.name));
        }
        self.tags.push(descriptor);
        Ok(())
    }

    /// Drop a descriptor. Items already carrying the tag keep it; the
    /// registry only gates new attachments, so a dangling tag stays readable
    /// and re-registering the name makes it valid again.
    pub fn remove(&mut self, name: &str) -> Result<TagDescriptor> {
        let idx = self
            .tags
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::NoSuchTag(name.to_string()))?;
        Ok(self.tags.remove(idx))
    }

    /// Reject the first tag that has no registry entry.
    pub fn validate<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> Result<()> {
        for tag in tags {
            if self.get(&tag.name).is_none() {
                return Err(Error::UnknownTag(tag.name.clone()));
            }
        }
        Ok(())
    }
}

/// Add `tag` to `tags` unless a tag of that name is already present.
/// Returns whether anything changed.
pub fn attach(tags: &mut Vec<Tag>, tag: Tag) -> bool {
    if tags.iter().any(|t| t.name == tag.name) {
        return false;
    }
    tags.push(tag);
    true
}

/// Remove the tag called `name`; returns whether it was present.
pub fn detach(tags: &mut Vec<Tag>, name: &str) -> bool {
    let before = tags.len();
    tags.retain(|t| t.name != name);
    before != tags.len()
}
