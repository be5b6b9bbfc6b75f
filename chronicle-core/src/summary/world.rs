//! World state: setting facts, plot threads, location and story time.

use crate::error::{ChronicleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single world record of a chronicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default)]
    pub setting_facts: Vec<String>,
    #[serde(default)]
    pub active_threads: Vec<String>,
    #[serde(default)]
    pub resolved_threads: Vec<String>,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub current_time: Option<DateTime<Utc>>,
}

/// Explicit world changes carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldDelta {
    pub location: Option<String>,
    pub story_time: Option<DateTime<Utc>>,
    pub add_facts: Vec<String>,
    pub open_threads: Vec<String>,
    pub resolve_threads: Vec<String>,
}

impl WorldDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn at_time(mut self, time: DateTime<Utc>) -> Self {
        self.story_time = Some(time);
        self
    }

    pub fn with_fact(mut self, fact: impl Into<String>) -> Self {
        self.add_facts.push(fact.into());
        self
    }

    pub fn open_thread(mut self, thread: impl Into<String>) -> Self {
        self.open_threads.push(thread.into());
        self
    }

    pub fn resolve_thread(mut self, thread: impl Into<String>) -> Self {
        self.resolve_threads.push(thread.into());
        self
    }
}

impl WorldState {
    /// Check a delta against the current state without changing anything.
    pub fn validate(&self, delta: &WorldDelta) -> Result<()> {
        if let (Some(declared), Some(current)) = (delta.story_time, self.current_time) {
            if declared < current {
                return Err(ChronicleError::TemporalOrdering { declared, current });
            }
        }

        for thread in &delta.resolve_threads {
            let known = self.active_threads.contains(thread) || delta.open_threads.contains(thread);
            if !known {
                return Err(ChronicleError::not_found("plot thread", thread.clone()));
            }
        }

        Ok(())
    }

    /// Apply a validated delta.
    pub fn apply(&mut self, delta: &WorldDelta) {
        if let Some(location) = &delta.location {
            self.current_location = Some(location.clone());
        }
        if let Some(time) = delta.story_time {
            self.current_time = Some(time);
        }
        for fact in &delta.add_facts {
            if !self.setting_facts.contains(fact) {
                self.setting_facts.push(fact.clone());
            }
        }
        for thread in &delta.open_threads {
            if !self.active_threads.contains(thread) {
                self.active_threads.push(thread.clone());
            }
        }
        for thread in &delta.resolve_threads {
            self.active_threads.retain(|t| t != thread);
            if !self.resolved_threads.contains(thread) {
                self.resolved_threads.push(thread.clone());
            }
        }
    }
}
