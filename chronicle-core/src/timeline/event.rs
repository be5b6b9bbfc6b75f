//! Story events and their drafts.

use crate::policy::{Sensitivity, SEALED_PLACEHOLDER};
use crate::summary::{DevelopmentNote, EventDeltas, RelationshipDelta, StatusChange, WorldDelta};
use crate::vault::VaultRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new unique event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored prose field after policy routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prose {
    Inline { text: String },
    Vaulted { vault_ref: VaultRef },
    Redacted { placeholder: String },
}

impl Prose {
    pub fn inline(text: impl Into<String>) -> Self {
        Prose::Inline { text: text.into() }
    }

    /// The inline text, if this prose is stored in the clear.
    pub fn as_inline(&self) -> Option<&str> {
        match self {
            Prose::Inline { text } => Some(text),
            _ => None,
        }
    }

    pub fn vault_ref(&self) -> Option<VaultRef> {
        match self {
            Prose::Vaulted { vault_ref } => Some(*vault_ref),
            _ => None,
        }
    }

    /// Text safe to show without consulting the vault.
    pub fn display_text(&self) -> &str {
        match self {
            Prose::Inline { text } => text,
            Prose::Redacted { placeholder } => placeholder,
            Prose::Vaulted { .. } => SEALED_PLACEHOLDER,
        }
    }

    pub fn is_empty_inline(&self) -> bool {
        matches!(self, Prose::Inline { text } if text.trim().is_empty())
    }
}

/// The prose bodies of an event kept at full detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullDetail {
    pub action: Prose,
    pub outcome: Prose,
    pub consequence: Prose,
    /// The event's content reference: inline narrative or a vault handle.
    pub content: Prose,
}

impl FullDetail {
    pub fn fields(&self) -> [&Prose; 4] {
        [&self.action, &self.outcome, &self.consequence, &self.content]
    }

    pub fn vault_refs(&self) -> Vec<VaultRef> {
        self.fields().iter().filter_map(|p| p.vault_ref()).collect()
    }
}

/// Whether an event still carries its prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EventDetail {
    Full(FullDetail),
    /// Prose has been folded into the phase summary.
    Summarized { gist: String },
}

/// An appended story event.
///
/// Immutable once appended except for the single transition from
/// [`EventDetail::Full`] to [`EventDetail::Summarized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub phase_id: String,
    /// Position within the phase, starting at 1 with no gaps.
    pub sequence: u64,
    /// Position in the chronicle-wide append order.
    pub ordinal: u64,
    pub timestamp: DateTime<Utc>,
    /// Story time declared by the event's world delta, if any.
    #[serde(default)]
    pub story_time: Option<DateTime<Utc>>,
    pub location: String,
    pub participants: Vec<String>,
    pub tags: BTreeSet<String>,
    pub sensitivity: Sensitivity,
    pub detail: EventDetail,
}

impl Event {
    pub fn is_summarized(&self) -> bool {
        matches!(self.detail, EventDetail::Summarized { .. })
    }

    pub fn full(&self) -> Option<&FullDetail> {
        match &self.detail {
            EventDetail::Full(detail) => Some(detail),
            EventDetail::Summarized { .. } => None,
        }
    }

    /// The content reference, if the event is still at full detail.
    pub fn content(&self) -> Option<&Prose> {
        self.full().map(|d| &d.content)
    }

    pub fn involves(&self, character: &str) -> bool {
        self.participants.iter().any(|p| p == character)
    }

    pub fn vault_refs(&self) -> Vec<VaultRef> {
        self.full().map(FullDetail::vault_refs).unwrap_or_default()
    }

    /// One line describing what changed, safe to copy into summaries.
    pub fn headline(&self) -> String {
        match &self.detail {
            EventDetail::Full(detail) => {
                let text = [&detail.consequence, &detail.outcome, &detail.action]
                    .into_iter()
                    .find(|p| p.as_inline().is_some() && !p.is_empty_inline())
                    .map(Prose::display_text)
                    .unwrap_or_else(|| detail.action.display_text());
                format!("{}#{}: {}", self.phase_id, self.sequence, text)
            }
            EventDetail::Summarized { gist } => gist.clone(),
        }
    }

    /// Prose-free description kept after compression.
    pub fn gist(&self) -> String {
        let mut gist = format!("#{}", self.sequence);
        if !self.participants.is_empty() {
            gist.push(' ');
            gist.push_str(&self.participants.join(", "));
        }
        if !self.location.is_empty() {
            gist.push_str(&format!(" @ {}", self.location));
        }
        if !self.tags.is_empty() {
            let tags: Vec<_> = self.tags.iter().map(String::as_str).collect();
            gist.push_str(&format!(" [{}]", tags.join(", ")));
        }
        gist
    }

    /// The summarized form of this event and the vault entries it no longer needs.
    ///
    /// Returns `None` if the event is already summarized.
    pub fn summarized(&self) -> Option<(Event, Vec<VaultRef>)> {
        let detail = self.full()?;
        let released = detail.vault_refs();
        let event = Event {
            detail: EventDetail::Summarized { gist: self.gist() },
            ..self.clone()
        };
        Some((event, released))
    }
}

/// What the orchestrator submits for one turn.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub location: String,
    pub participants: Vec<String>,
    pub action: String,
    pub outcome: String,
    pub consequence: String,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub sensitivity: Sensitivity,
    pub deltas: EventDeltas,
}

impl EventDraft {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_participant(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.participants.contains(&id) {
            self.participants.push(id);
        }
        self
    }

    pub fn with_participants<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().fold(self, |d, id| d.with_participant(id))
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn with_consequence(mut self, consequence: impl Into<String>) -> Self {
        self.consequence = consequence.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn mature(mut self) -> Self {
        self.sensitivity = Sensitivity::Mature;
        self
    }

    pub fn with_world(mut self, delta: WorldDelta) -> Self {
        self.deltas.world = Some(delta);
        self
    }

    /// Shift `subject`'s score toward `target` by `delta`.
    pub fn with_relationship(
        mut self,
        subject: impl Into<String>,
        target: impl Into<String>,
        delta: i32,
    ) -> Self {
        self.deltas.relationships.push(RelationshipDelta {
            subject: subject.into(),
            target: target.into(),
            delta,
        });
        self
    }

    pub fn with_status(mut self, character: impl Into<String>, status: impl Into<String>) -> Self {
        self.deltas.statuses.push(StatusChange {
            character: character.into(),
            status: status.into(),
        });
        self
    }

    pub fn with_note(mut self, character: impl Into<String>, note: impl Into<String>) -> Self {
        self.deltas.notes.push(DevelopmentNote {
            character: character.into(),
            note: note.into(),
        });
        self
    }

    pub(crate) fn prose(&self) -> [&str; 4] {
        [&self.action, &self.outcome, &self.consequence, &self.content]
    }

    /// Check the draft for structurally invalid ids.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.participants.iter().any(|p| p.trim().is_empty()) {
            return Err("participant ids must not be empty".to_string());
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = self.participants.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(format!("participant {dup} is listed twice"));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err("tags must not be empty".to_string());
        }
        for delta in &self.deltas.relationships {
            if delta.subject.trim().is_empty() || delta.target.trim().is_empty() {
                return Err("relationship deltas need a subject and a target".to_string());
            }
            if delta.subject == delta.target {
                return Err(format!("{} cannot hold a relationship with itself", delta.subject));
            }
        }
        Ok(())
    }
}
