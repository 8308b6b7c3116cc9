//! Ad-hoc item stacks (`stacks.json`).
//!
//! A stack item is a stored selection: the selector text plus whatever kind
//! and collection modifiers were in force when it was pushed. Items are
//! re-resolved when read, so they follow renames only as far as the selector
//! text still matches.

use crate::collections::CollectionKind;
use crate::error::{Error, Result};
use crate::time::Time;
use serde::{Deserialize, Serialize};

pub const STACKS_FILE: &str = "stacks.json";

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackItem {
    pub selector: String,
    pub kind: Option<CollectionKind>,
    pub collection: Option<String>,
    pub note: Option<String>,
    pub added: Time,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    pub created: Time,
    /// Head first.
    #[serde(default)]
    pub items: Vec<StackItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRegistry {
    #[serde(default)]
    pub stacks: Vec<Stack>,
}

impl StackRegistry {
    pub fn get(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.name == name)
    }

    fn stack_mut(&mut self, name: &str) -> Result<&mut Stack> {
        self.stacks
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::NoSuchStack(name.to_string()))
    }

    pub fn add_stack(&mut self, name: &str, now: Time) -> Result<&Stack> {
        if name.trim().is_empty() {
            return Err(Error::InvalidSelection(name.to_string()));
        }
        if self.get(name).is_some() {
            return Err(Error::DuplicateItem(name.to_string()));
        }
        self.stacks.push(Stack {
            name: name.to_string(),
            created: now,
            items: vec![],
        });
        Ok(&self.stacks[self.stacks.len() - 1])
    }

    pub fn remove_stack(&mut self, name: &str) -> Result<Stack> {
        let idx = self
            .stacks
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| Error::NoSuchStack(name.to_string()))?;
        Ok(self.stacks.remove(idx))
    }

    /// Insert at `position` (head when `None`); positions past the tail append.
    pub fn push(&mut self, name: &str, item: StackItem, position: Option<usize>) -> Result<()> {
        let stack = self.stack_mut(name)?;
        let at = position.unwrap_or(0).min(stack.items.len());
        stack.items.insert(at, item);
        Ok(())
    }

    /// Remove and return the item at `index`, keeping the rest in order.
    pub fn pop(&mut self, name: &str, index: usize) -> Result<StackItem> {
        let stack = self.stack_mut(name)?;
        if index >= stack.items.len() {
            return Err(Error::NoSuchItem(format!("{name}[{index}]")));
        }
        stack.items[index..].rotate_left(1);
        stack
            .items
            .pop()
            .ok_or_else(|| Error::NoSuchItem(format!("{name}[{index}]")))
    }

    /// Items head to tail.
    pub fn peek(&self, name: &str) -> Result<impl Iterator<Item = &StackItem>> {
        self.get(name)
            .map(|s| s.items.iter())
            .ok_or_else(|| Error::NoSuchStack(name.to_string()))
    }
}
