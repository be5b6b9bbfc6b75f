//! Secondary indexes over the timeline.
//!
//! Both indexes map a key to event ids in append order. They hold no
//! information the timeline does not: [`Indexes::rebuild`] replays the
//! timeline and is the recovery path whenever they disagree.

use crate::timeline::{Event, EventId, Timeline};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup by character and by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indexes {
    #[serde(default)]
    pub by_character: BTreeMap<String, Vec<EventId>>,
    #[serde(default)]
    pub by_tag: BTreeMap<String, Vec<EventId>>,
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an appended event under each of its participants and tags.
    pub fn index_event(&mut self, event: &Event) {
        for participant in &event.participants {
            push_unique(self.by_character.entry(participant.clone()).or_default(), event.id);
        }
        for tag in &event.tags {
            push_unique(self.by_tag.entry(tag.clone()).or_default(), event.id);
        }
    }

    /// Up to `limit` events involving `character`, newest first.
    pub fn query_by_character(&self, character: &str, limit: usize) -> Vec<EventId> {
        newest_first(self.by_character.get(character), limit)
    }

    /// Up to `limit` events carrying `tag`, newest first.
    pub fn query_by_tag(&self, tag: &str, limit: usize) -> Vec<EventId> {
        newest_first(self.by_tag.get(tag), limit)
    }

    /// Indexes derived from scratch by replaying `timeline` in append order.
    pub fn rebuild(timeline: &Timeline) -> Self {
        let mut indexes = Self::new();
        for event in timeline.events_in_append_order() {
            indexes.index_event(event);
        }
        indexes
    }

    /// True if these indexes match a fresh replay of `timeline`.
    pub fn verify(&self, timeline: &Timeline) -> bool {
        *self == Self::rebuild(timeline)
    }
}

fn push_unique(ids: &mut Vec<EventId>, id: EventId) {
    if ids.last() != Some(&id) {
        ids.push(id);
    }
}

fn newest_first(ids: Option<&Vec<EventId>>, limit: usize) -> Vec<EventId> {
    ids.map(|ids| ids.iter().rev().take(limit).copied().collect())
        .unwrap_or_default()
}
