//! Entity summary tracker.
//!
//! Keeps one [`CharacterSummary`] per known character and the single
//! [`WorldState`] current as events are appended. Summaries are updated in
//! place; a summary is never replaced wholesale.

mod character;
mod world;

pub use character::{
    ChangeRecord, CharacterSummary, DevelopmentNote, RelationshipDelta, RelationshipRecord,
    RelationshipStatus, StatusChange, DEFAULT_CHANGE_LOG_LIMIT, FRIENDLY_THRESHOLD,
    HOSTILE_THRESHOLD, SCORE_MAX, SCORE_MIN,
};
pub use world::{WorldDelta, WorldState};

use crate::error::{ChronicleError, Result};
use crate::timeline::Event;
use std::collections::BTreeMap;

/// Explicit state changes an event carries besides its prose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDeltas {
    pub world: Option<WorldDelta>,
    pub relationships: Vec<RelationshipDelta>,
    pub statuses: Vec<StatusChange>,
    pub notes: Vec<DevelopmentNote>,
}

impl EventDeltas {
    /// Every free-text field the deltas carry.
    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        let world = self
            .world
            .iter()
            .flat_map(|w| w.add_facts.iter().chain(&w.open_threads));
        self.statuses
            .iter()
            .map(|s| s.status.as_str())
            .chain(self.notes.iter().map(|n| n.note.as_str()))
            .chain(world.map(String::as_str))
    }

    /// A copy with every free-text field replaced by `placeholder`.
    ///
    /// Ids, scores, location and story time are kept. Threads opened and
    /// resolved by the same deltas are dropped.
    pub fn redacted(&self, placeholder: &str) -> Self {
        let redact = |text: &String| {
            if text.is_empty() {
                String::new()
            } else {
                placeholder.to_string()
            }
        };

        let world = self.world.as_ref().map(|w| {
            let transient =
                |t: &String| w.open_threads.contains(t) && w.resolve_threads.contains(t);
            WorldDelta {
                location: w.location.clone(),
                story_time: w.story_time,
                add_facts: w.add_facts.iter().map(redact).collect(),
                open_threads: w
                    .open_threads
                    .iter()
                    .filter(|t| !transient(*t))
                    .map(redact)
                    .collect(),
                resolve_threads: w
                    .resolve_threads
                    .iter()
                    .filter(|t| !transient(*t))
                    .cloned()
                    .collect(),
            }
        });

        Self {
            world,
            relationships: self.relationships.clone(),
            statuses: self
                .statuses
                .iter()
                .map(|s| StatusChange {
                    character: s.character.clone(),
                    status: redact(&s.status),
                })
                .collect(),
            notes: self
                .notes
                .iter()
                .map(|n| DevelopmentNote {
                    character: n.character.clone(),
                    note: redact(&n.note),
                })
                .collect(),
        }
    }
}

/// Borrowed view over a document's summaries that applies event updates.
pub struct SummaryTracker<'a> {
    characters: &'a mut BTreeMap<String, CharacterSummary>,
    world: &'a mut WorldState,
    change_log_limit: usize,
}

impl<'a> SummaryTracker<'a> {
    pub fn new(
        characters: &'a mut BTreeMap<String, CharacterSummary>,
        world: &'a mut WorldState,
        change_log_limit: usize,
    ) -> Self {
        Self {
            characters,
            world,
            change_log_limit,
        }
    }

    /// Reject deltas that cannot be applied, before anything is mutated.
    pub fn validate(&self, deltas: &EventDeltas) -> Result<()> {
        if let Some(world) = &deltas.world {
            self.world.validate(world)?;
        }
        let unnamed = deltas
            .statuses
            .iter()
            .map(|s| s.character.as_str())
            .chain(deltas.notes.iter().map(|n| n.character.as_str()))
            .any(|c| c.trim().is_empty());
        if unnamed {
            return Err(ChronicleError::InvalidDraft(
                "character updates need a character id".to_string(),
            ));
        }
        Ok(())
    }

    /// Fold an appended event and its deltas into the summaries.
    pub fn apply(&mut self, event: &Event, deltas: &EventDeltas) {
        for participant in &event.participants {
            match self.characters.get_mut(participant) {
                Some(summary) => {
                    summary.touch(event.id);
                    summary.record_change(
                        ChangeRecord {
                            event_id: event.id,
                            phase_id: event.phase_id.clone(),
                            sequence: event.sequence,
                            note: event.headline(),
                        },
                        self.change_log_limit,
                    );
                }
                None => {
                    tracing::debug!(character = %participant, "tracking new character");
                    let mut summary = CharacterSummary::new(participant.clone());
                    summary.touch(event.id);
                    self.characters.insert(participant.clone(), summary);
                }
            }
        }

        for delta in &deltas.relationships {
            let record = self
                .character_mut(&delta.subject)
                .adjust_relationship(&delta.target, delta.delta);
            tracing::debug!(
                subject = %delta.subject,
                target = %delta.target,
                score = record.score,
                status = record.status.name(),
                "relationship adjusted"
            );
        }

        for change in &deltas.statuses {
            self.character_mut(&change.character).status = change.status.clone();
        }

        for note in &deltas.notes {
            self.character_mut(&note.character)
                .development_notes
                .push(note.note.clone());
        }

        if let Some(world) = &deltas.world {
            self.world.apply(world);
        }
    }

    fn character_mut(&mut self, id: &str) -> &mut CharacterSummary {
        self.characters
            .entry(id.to_string())
            .or_insert_with(|| CharacterSummary::new(id))
    }
}
