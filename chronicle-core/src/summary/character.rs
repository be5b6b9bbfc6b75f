//! Per-character summaries.

use crate::timeline::EventId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Lowest relationship score.
pub const SCORE_MIN: i32 = -100;
/// Highest relationship score.
pub const SCORE_MAX: i32 = 100;
/// Scores at or above this are friendly.
pub const FRIENDLY_THRESHOLD: i32 = 60;
/// Scores at or below this are hostile.
pub const HOSTILE_THRESHOLD: i32 = -60;

/// Default length of a character's recent-change log.
pub const DEFAULT_CHANGE_LOG_LIMIT: usize = 10;

/// Qualitative reading of a relationship score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Friendly,
    #[default]
    Neutral,
    Hostile,
}

impl RelationshipStatus {
    pub fn from_score(score: i32) -> Self {
        if score >= FRIENDLY_THRESHOLD {
            RelationshipStatus::Friendly
        } else if score <= HOSTILE_THRESHOLD {
            RelationshipStatus::Hostile
        } else {
            RelationshipStatus::Neutral
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationshipStatus::Friendly => "friendly",
            RelationshipStatus::Neutral => "neutral",
            RelationshipStatus::Hostile => "hostile",
        }
    }
}

/// How one character regards another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub status: RelationshipStatus,
    pub score: i32,
}

impl RelationshipRecord {
    /// Shift the score, clamping to bounds, and recompute the status.
    pub fn adjust(&mut self, delta: i32) {
        self.score = self.score.saturating_add(delta).clamp(SCORE_MIN, SCORE_MAX);
        self.status = RelationshipStatus::from_score(self.score);
    }
}

/// An entry in a character's recent-change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub event_id: EventId,
    pub phase_id: String,
    pub sequence: u64,
    pub note: String,
}

/// Current state of one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    pub status: String,
    /// Keyed by target character id.
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipRecord>,
    #[serde(default)]
    pub development_notes: Vec<String>,
    /// Oldest first; bounded by the tracker's change-log limit.
    #[serde(default)]
    pub recent_changes: VecDeque<ChangeRecord>,
    #[serde(default)]
    pub appearances: u32,
    #[serde(default)]
    pub first_seen: Option<EventId>,
    #[serde(default)]
    pub last_seen: Option<EventId>,
}

impl CharacterSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            status: "active".to_string(),
            relationships: BTreeMap::new(),
            development_notes: Vec::new(),
            recent_changes: VecDeque::new(),
            appearances: 0,
            first_seen: None,
            last_seen: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Record an appearance in an event.
    pub fn touch(&mut self, event_id: EventId) {
        self.appearances += 1;
        self.first_seen.get_or_insert(event_id);
        self.last_seen = Some(event_id);
    }

    /// Push into the recent-change log, evicting the oldest beyond `limit`.
    pub fn record_change(&mut self, change: ChangeRecord, limit: usize) {
        self.recent_changes.push_back(change);
        while self.recent_changes.len() > limit {
            self.recent_changes.pop_front();
        }
    }

    pub fn adjust_relationship(&mut self, target: &str, delta: i32) -> RelationshipRecord {
        let record = self.relationships.entry(target.to_string()).or_default();
        record.adjust(delta);
        *record
    }

    pub fn relationship(&self, target: &str) -> Option<&RelationshipRecord> {
        self.relationships.get(target)
    }
}

/// Explicit change to one character's regard for another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDelta {
    pub subject: String,
    pub target: String,
    pub delta: i32,
}

/// Explicit replacement of a character's current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub character: String,
    pub status: String,
}

/// A note about how a character has developed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevelopmentNote {
    pub character: String,
    pub note: String,
}
