//! Habit chains (`chains.json`): one streak tracker per habit.

use crate::error::{Error, Result};
use crate::tags::Tag;
use crate::time::{Time, TimeZone};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const CHAINS_FILE: &str = "chains.json";

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    pub alias: Option<String>,
    pub details: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created: Time,
    /// Completion times, oldest first.
    #[serde(default)]
    pub completed: Vec<Time>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

fn default_active() -> bool {
    true
}

impl Chain {
    fn answers_to(&self, key: &str) -> bool {
        self.name == key || self.alias.as_deref() == Some(key)
    }

    /// Whether the most recent completion falls on today's local date.
    pub fn is_completed_today(&self, now: Time, tz: &TimeZone) -> bool {
        self.completed
            .last()
            .is_some_and(|last| tz.date(*last) == tz.date(now))
    }

    /// Consecutive local days with a completion, ending today. A streak that
    /// ended yesterday still counts until today is over.
    pub fn current_streak(&self, now: Time, tz: &TimeZone) -> usize {
        let days: BTreeSet<_> = self.completed.iter().map(|t| tz.date(*t)).collect();
        let today = tz.date(now);
        let mut cursor = if days.contains(&today) {
            today
        } else {
            today - Duration::days(1)
        };
        let mut streak = 0;
        while days.contains(&cursor) {
            streak += 1;
            cursor -= Duration::days(1);
        }
        streak
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewChain {
    pub name: String,
    pub alias: Option<String>,
    pub details: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRegistry {
    #[serde(default)]
    pub chains: Vec<Chain>,
}

impl ChainRegistry {
    /// Look a chain up by name or alias.
    pub fn get(&self, key: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.answers_to(key))
    }

    pub fn chain(&self, key: &str) -> Result<&Chain> {
        self.get(key)
            .ok_or_else(|| Error::NoSuchChain(key.to_string()))
    }

    fn chain_mut(&mut self, key: &str) -> Result<&mut Chain> {
        self.chains
            .iter_mut()
            .find(|c| c.answers_to(key))
            .ok_or_else(|| Error::NoSuchChain(key.to_string()))
    }

    /// Names and aliases share one namespace across the whole list.
    pub fn add_chain(&mut self, new: NewChain, now: Time) -> Result<&Chain> {
        if new.name.trim().is_empty() {
            return Err(Error::InvalidSelection(new.name));
        }
        if new.alias.as_deref() == Some(new.name.as_str()) {
            return Err(Error::DuplicateItem(new.name));
        }
        for existing in &self.chains {
            if existing.answers_to(&new.name) {
                return Err(Error::DuplicateItem(new.name));
            }
            if let Some(alias) = &new.alias {
                if existing.answers_to(alias) {
                    return Err(Error::DuplicateItem(alias.clone()));
                }
            }
        }
        self.chains.push(Chain {
            name: new.name,
            alias: new.alias,
            details: new.details,
            active: true,
            created: now,
            completed: vec![],
            tags: new.tags,
        });
        Ok(&self.chains[self.chains.len() - 1])
    }

    pub fn remove(&mut self, key: &str) -> Result<Chain> {
        let idx = self
            .chains
            .iter()
            .position(|c| c.answers_to(key))
            .ok_or_else(|| Error::NoSuchChain(key.to_string()))?;
        Ok(self.chains.remove(idx))
    }

    /// Mark today as done. Completing twice on one local day is rejected.
    pub fn complete(&mut self, key: &str, now: Time, tz: &TimeZone) -> Result<&Chain> {
        let chain = self.chain_mut(key)?;
        if chain.is_completed_today(now, tz) {
            return Err(Error::AlreadyCompleted(chain.name.clone()));
        }
        chain.completed.push(now);
        chain.completed.sort();
        Ok(&*chain)
    }

    pub fn set_active(&mut self, key: &str, active: bool) -> Result<()> {
        self.chain_mut(key)?.active = active;
        Ok(())
    }

    pub fn active(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter().filter(|c| c.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn at(d: u32, h: u32) -> Time {
        TimeZone::utc().at(
            NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
            NaiveTime::from_hms_opt(h, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn chain(name: &str, alias: Option<&str>) -> NewChain {
        NewChain {
            name: name.into(),
            alias: alias.map(str::to_string),
            ..NewChain::default()
        }
    }

    #[test]
    fn names_and_aliases_share_a_namespace() {
        let mut reg = ChainRegistry::default();
        reg.add_chain(chain("running", Some("run")), at(1, 8)).expect("add");

        // name vs name, name vs alias, alias vs name, alias vs alias
        for (name, alias) in [
            ("running", None),
            ("run", None),
            ("jogging", Some("running")),
            ("jogging", Some("run")),
        ] {
            assert!(
                matches!(reg.add_chain(chain(name, alias), at(1, 8)), Err(Error::DuplicateItem(_))),
                "{name}/{alias:?} should collide"
            );
        }
        reg.add_chain(chain("reading", Some("read")), at(1, 8)).expect("add");
        assert_eq!(reg.chain("read").unwrap().name, "reading");
    }

    #[test]
    fn completing_twice_in_a_day_is_rejected() {
        let tz = TimeZone::utc();
        let mut reg = ChainRegistry::default();
        reg.add_chain(chain("floss", None), at(1, 8)).expect("add");
        reg.complete("floss", at(2, 7), &tz).expect("complete");
        assert!(reg.chain("floss").unwrap().is_completed_today(at(2, 22), &tz));
        assert!(matches!(
            reg.complete("floss", at(2, 21), &tz),
            Err(Error::AlreadyCompleted(_))
        ));
        assert!(!reg.chain("floss").unwrap().is_completed_today(at(3, 1), &tz));
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let tz = TimeZone::utc();
        let mut reg = ChainRegistry::default();
        reg.add_chain(chain("walk", None), at(1, 8)).expect("add");
        for d in [1, 3, 4, 5] {
            reg.complete("walk", at(d, 9), &tz).expect("complete");
        }
        let walk = reg.chain("walk").unwrap();
        assert_eq!(walk.current_streak(at(5, 20), &tz), 3);
        // Not yet done on the 6th: yesterday's streak still stands.
        assert_eq!(walk.current_streak(at(6, 10), &tz), 3);
        assert_eq!(walk.current_streak(at(7, 10), &tz), 0);
    }

    #[test]
    fn registry_round_trips() {
        let mut reg = ChainRegistry::default();
        reg.add_chain(chain("walk", Some("w")), at(1, 8)).expect("add");
        reg.complete("w", at(1, 9), &TimeZone::utc()).expect("complete");
        reg.set_active("walk", false).expect("deactivate");
        let json = serde_json::to_string_pretty(&reg).unwrap();
        let back: ChainRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reg);
        assert_eq!(back.active().count(), 0);
    }
}
