//! The chronicle document: everything remembered about one story session.
//!
//! A [`Chronicle`] is plain data. Reads are served directly from it; writes go
//! through [`Chronicler`](crate::Chronicler), which applies policy, the vault
//! and compression before touching the document.

use crate::error::{ChronicleError, Result};
use crate::index::Indexes;
use crate::persist::FORMAT_VERSION;
use crate::policy::{Policy, SEALED_PLACEHOLDER};
use crate::summary::{CharacterSummary, WorldState};
use crate::timeline::{Event, EventDetail, EventId, PhaseOverview, Prose, Timeline};
use crate::vault::VaultStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default closing prompt of a scene.
pub const DEFAULT_PROMPT: &str = "What do you do next?";

/// Snapshot of the scene the story is currently in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentScene {
    pub location: String,
    #[serde(default)]
    pub story_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub emotional_context: String,
    #[serde(default)]
    pub npcs_present: Vec<String>,
    #[serde(default)]
    pub open_choices: Vec<String>,
    #[serde(default)]
    pub last_event: Option<EventId>,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

impl Default for CurrentScene {
    fn default() -> Self {
        Self::new("")
    }
}

impl CurrentScene {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            story_time: None,
            emotional_context: String::new(),
            npcs_present: Vec::new(),
            open_choices: Vec::new(),
            last_event: None,
            prompt: default_prompt(),
        }
    }

    pub fn with_emotional_context(mut self, context: impl Into<String>) -> Self {
        self.emotional_context = context.into();
        self
    }

    pub fn with_npc(mut self, npc: impl Into<String>) -> Self {
        self.npcs_present.push(npc.into());
        self
    }

    pub fn with_choice(mut self, choice: impl Into<String>) -> Self {
        self.open_choices.push(choice.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

/// The persistent memory record for one story session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chronicle {
    pub chronicle_id: Uuid,
    pub session_id: Uuid,
    pub scenario_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
    pub timeline: Timeline,
    pub characters: BTreeMap<String, CharacterSummary>,
    pub world: WorldState,
    pub current: CurrentScene,
    pub indexes: Indexes,
    pub policy: Policy,
    /// Sealed mature content referenced from events.
    #[serde(default)]
    pub vault: VaultStore,
}

impl Chronicle {
    /// Start an empty chronicle for a scenario.
    pub fn new(scenario_id: impl Into<String>, policy: Policy) -> Self {
        let now = Utc::now();
        Self {
            chronicle_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            scenario_id: scenario_id.into(),
            created_at: now,
            updated_at: now,
            version: FORMAT_VERSION,
            timeline: Timeline::new(),
            characters: BTreeMap::new(),
            world: WorldState::default(),
            current: CurrentScene::default(),
            indexes: Indexes::new(),
            policy,
            vault: VaultStore::new(),
        }
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_scene(mut self, scene: CurrentScene) -> Self {
        self.current = scene;
        self
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // =========================================================================
    // Timeline reads
    // =========================================================================

    /// The newest `n` events of a phase, newest first.
    pub fn get_recent(&self, phase_id: &str, n: usize) -> Result<Vec<&Event>> {
        self.timeline.get_recent(phase_id, n)
    }

    pub fn get_by_id(&self, id: EventId) -> Result<&Event> {
        self.timeline.get_by_id(id)
    }

    pub fn list_phases(&self) -> Vec<PhaseOverview> {
        self.timeline.list_phases()
    }

    pub fn event_count(&self) -> usize {
        self.timeline.event_count()
    }

    pub fn search_text(&self, query: &str, limit: usize) -> Vec<EventId> {
        self.timeline.search_text(query, limit)
    }

    // =========================================================================
    // Index reads
    // =========================================================================

    /// Up to `limit` events involving `character`, newest first.
    pub fn query_by_character(&self, character: &str, limit: usize) -> Vec<EventId> {
        self.indexes.query_by_character(character, limit)
    }

    /// Up to `limit` events carrying `tag`, newest first.
    pub fn query_by_tag(&self, tag: &str, limit: usize) -> Vec<EventId> {
        self.indexes.query_by_tag(tag, limit)
    }

    /// Resolve indexed ids to events.
    pub fn resolve(&self, ids: &[EventId]) -> Result<Vec<&Event>> {
        ids.iter().map(|&id| self.get_by_id(id)).collect()
    }

    /// Check the indexes against the timeline and rebuild them on mismatch.
    ///
    /// Returns `true` if a rebuild was needed.
    pub fn ensure_indexes(&mut self) -> bool {
        if self.indexes.verify(&self.timeline) {
            return false;
        }
        tracing::warn!(
            chronicle = %self.chronicle_id,
            "index inconsistency detected, rebuilding from timeline"
        );
        self.indexes = Indexes::rebuild(&self.timeline);
        true
    }

    // =========================================================================
    // Summary reads
    // =========================================================================

    pub fn get_character_summary(&self, id: &str) -> Result<&CharacterSummary> {
        self.characters
            .get(id)
            .ok_or_else(|| ChronicleError::not_found("character", id))
    }

    pub fn get_world_state(&self) -> &WorldState {
        &self.world
    }

    pub fn current_scene(&self) -> &CurrentScene {
        &self.current
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// A shareable copy of this chronicle.
    ///
    /// Without vault refs, every sealed prose field becomes a placeholder and
    /// the vault is emptied, so the export carries no ciphertext at all.
    pub fn export(&self, include_vault_refs: bool) -> Chronicle {
        let mut export = self.clone();
        if include_vault_refs {
            return export;
        }

        for phase in &mut export.timeline.phases {
            for event in &mut phase.events {
                if let EventDetail::Full(detail) = &mut event.detail {
                    for prose in [
                        &mut detail.action,
                        &mut detail.outcome,
                        &mut detail.consequence,
                        &mut detail.content,
                    ] {
                        if matches!(prose, Prose::Vaulted { .. }) {
                            *prose = Prose::Redacted {
                                placeholder: SEALED_PLACEHOLDER.to_string(),
                            };
                        }
                    }
                }
            }
        }
        export.vault.clear();
        export
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chronicle() {
        let chronicle = Chronicle::new("campus", Policy::default())
            .with_scene(CurrentScene::new("Dorm").with_npc("Sam"));
        assert_eq!(chronicle.version, FORMAT_VERSION);
        assert_eq!(chronicle.scenario_id, "campus");
        assert_eq!(chronicle.current.location, "Dorm");
        assert_eq!(chronicle.current.prompt, DEFAULT_PROMPT);
        assert_eq!(chronicle.event_count(), 0);
        assert!(chronicle.list_phases().is_empty());
    }

    #[test]
    fn test_unknown_character_not_found() {
        let chronicle = Chronicle::new("campus", Policy::default());
        assert!(matches!(
            chronicle.get_character_summary("Alex"),
            Err(ChronicleError::NotFound {
                kind: "character",
                ..
            })
        ));
    }

    #[test]
    fn test_top_level_field_names() {
        let chronicle = Chronicle::new("campus", Policy::default());
        let json = serde_json::to_value(&chronicle).unwrap();
        for field in [
            "chronicle_id",
            "session_id",
            "scenario_id",
            "created_at",
            "updated_at",
            "version",
            "timeline",
            "characters",
            "world",
            "current",
            "indexes",
            "policy",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert!(json["timeline"]["phases"].is_array());
        assert!(json["indexes"]["by_character"].is_object());
        assert!(json["indexes"]["by_tag"].is_object());
    }
}
