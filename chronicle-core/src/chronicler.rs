//! The write path.
//!
//! [`Chronicler`] owns the configuration, the vault key and the summarizer,
//! and performs every mutation of a [`Chronicle`]. Each operation validates
//! and prepares everything it needs first and only then mutates the document,
//! so a returned error always means the document is unchanged.

use crate::config::ChronicleConfig;
use crate::document::{Chronicle, CurrentScene};
use crate::error::{ChronicleError, Result};
use crate::persist::{ChronicleStore, SaveHandle};
use crate::policy::{MatureHandling, Policy, ProseKind, Sensitivity};
use crate::summary::{EventDeltas, SummaryTracker};
use crate::timeline::{
    CompressionReport, DigestSummarizer, Event, EventDetail, EventDraft, EventId, FullDetail,
    Prose, Summarizer,
};
use crate::vault::{self, VaultEntry, VaultError, VaultKey, VaultRef};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Applies policy, the vault, summaries, indexes and compression to a chronicle.
pub struct Chronicler {
    config: ChronicleConfig,
    key: Option<VaultKey>,
    summarizer: Box<dyn Summarizer>,
}

impl std::fmt::Debug for Chronicler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chronicler")
            .field("config", &self.config)
            .field("has_key", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

impl Chronicler {
    pub fn new(config: ChronicleConfig) -> Self {
        let summarizer = DigestSummarizer::new(config.summary_consequence_limit);
        Self {
            config,
            key: None,
            summarizer: Box::new(summarizer),
        }
    }

    /// Configuration and key from the environment.
    pub fn from_env() -> Result<Self> {
        let chronicler = Self::new(ChronicleConfig::from_env());
        Ok(match VaultKey::from_env()? {
            Some(key) => chronicler.with_key(key),
            None => chronicler,
        })
    }

    pub fn with_key(mut self, key: VaultKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_summarizer(mut self, summarizer: impl Summarizer + 'static) -> Self {
        self.summarizer = Box::new(summarizer);
        self
    }

    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Start a new chronicle under this chronicler's configuration.
    pub fn start(&self, scenario_id: impl Into<String>, policy: Policy) -> Chronicle {
        let chronicle = Chronicle::new(scenario_id, policy);
        tracing::info!(
            chronicle = %chronicle.chronicle_id,
            scenario = %chronicle.scenario_id,
            "started chronicle"
        );
        chronicle
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Append one event to `phase_id`, creating the phase if needed.
    ///
    /// Mature prose is routed by the document's policy before anything is
    /// stored, and so is the text of the event's summary updates. Summaries
    /// and indexes are updated, then the phase is compressed if it holds more
    /// than the configured number of full-detail events.
    /// Returns the event as stored after compression.
    pub fn append_event(
        &self,
        doc: &mut Chronicle,
        phase_id: &str,
        draft: EventDraft,
    ) -> Result<Event> {
        if phase_id.trim().is_empty() {
            return Err(ChronicleError::InvalidDraft(
                "phase id must not be empty".to_string(),
            ));
        }
        draft.validate().map_err(ChronicleError::InvalidDraft)?;
        SummaryTracker::new(
            &mut doc.characters,
            &mut doc.world,
            self.config.change_log_limit,
        )
        .validate(&draft.deltas)?;

        let sensitivity = self.screen(doc.policy, &draft);
        let mut sealed = Vec::new();
        let detail = self.route(doc.policy, sensitivity, &draft, &mut sealed)?;
        let deltas = self.route_deltas(doc.policy, sensitivity, &draft.deltas);

        let event = Event {
            id: EventId::new(),
            phase_id: phase_id.to_string(),
            sequence: doc.timeline.next_sequence(phase_id),
            ordinal: doc.timeline.next_ordinal(),
            timestamp: Utc::now(),
            story_time: draft.deltas.world.as_ref().and_then(|w| w.story_time),
            location: draft.location.clone(),
            participants: draft.participants.clone(),
            tags: draft.tags.clone(),
            sensitivity,
            detail: EventDetail::Full(detail),
        };

        let event = doc.timeline.append(event)?.clone();
        for entry in sealed {
            doc.vault.insert(entry);
        }
        SummaryTracker::new(
            &mut doc.characters,
            &mut doc.world,
            self.config.change_log_limit,
        )
        .apply(&event, &deltas);
        doc.indexes.index_event(&event);
        doc.current.last_event = Some(event.id);
        if let Some(world) = &deltas.world {
            if let Some(location) = &world.location {
                doc.current.location = location.clone();
            }
            if world.story_time.is_some() {
                doc.current.story_time = world.story_time;
            }
        }
        doc.touch();

        tracing::debug!(
            phase = phase_id,
            sequence = event.sequence,
            sensitivity = ?sensitivity,
            vaulted = event.vault_refs().len(),
            "appended event"
        );

        let report = self.compress_phase(doc, phase_id)?;
        if report.folded > 0 {
            return Ok(doc.get_by_id(event.id)?.clone());
        }
        Ok(event)
    }

    /// Escalate an unflagged draft the keyword screen trips, in SFW mode.
    fn screen(&self, policy: Policy, draft: &EventDraft) -> Sensitivity {
        if draft.sensitivity.is_mature() || !policy.sfw_mode {
            return draft.sensitivity;
        }
        let texts = draft.prose().into_iter().chain(draft.deltas.texts());
        if self.config.screen.flags_any(texts) {
            tracing::debug!("content screen escalated draft to mature");
            return Sensitivity::Mature;
        }
        draft.sensitivity
    }

    fn route(
        &self,
        policy: Policy,
        sensitivity: Sensitivity,
        draft: &EventDraft,
        sealed: &mut Vec<VaultEntry>,
    ) -> Result<FullDetail> {
        let handling = policy.effective_handling();
        let mut field = |text: &str, kind: ProseKind| -> Result<Prose, VaultError> {
            if !sensitivity.is_mature() || text.is_empty() {
                return Ok(Prose::inline(text));
            }
            Ok(match handling {
                MatureHandling::Inline => Prose::inline(text),
                MatureHandling::Redact => Prose::Redacted {
                    placeholder: kind.redaction_placeholder().to_string(),
                },
                MatureHandling::Vault => {
                    let entry = vault::seal(text, self.key.as_ref())?;
                    let vault_ref = entry.reference;
                    sealed.push(entry);
                    Prose::Vaulted { vault_ref }
                }
            })
        };

        Ok(FullDetail {
            action: field(&draft.action, ProseKind::Action)?,
            outcome: field(&draft.outcome, ProseKind::Outcome)?,
            consequence: field(&draft.consequence, ProseKind::Consequence)?,
            content: field(&draft.content, ProseKind::Narrative)?,
        })
    }

    /// Summary updates from a mature event keep their text only when prose is
    /// stored inline. Summaries hold no vault references, so a vaulting
    /// policy redacts them.
    fn route_deltas(
        &self,
        policy: Policy,
        sensitivity: Sensitivity,
        deltas: &EventDeltas,
    ) -> EventDeltas {
        if !sensitivity.is_mature() || policy.effective_handling() == MatureHandling::Inline {
            return deltas.clone();
        }
        deltas.redacted(ProseKind::Summary.redaction_placeholder())
    }

    // =========================================================================
    // Compression
    // =========================================================================

    /// Fold events beyond the newest `keep_full_detail` of a phase into its
    /// summary, dropping the vault entries they no longer reference.
    pub fn compress_phase(&self, doc: &mut Chronicle, phase_id: &str) -> Result<CompressionReport> {
        let report = doc.timeline.compress_phase(
            phase_id,
            self.config.keep_full_detail,
            self.summarizer.as_ref(),
        )?;
        if report.folded > 0 {
            for reference in &report.released {
                doc.vault.remove(*reference);
            }
            doc.touch();
            tracing::info!(
                phase = phase_id,
                folded = report.folded,
                released = report.released.len(),
                "folded events into phase summary"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Display form of an event under the document's policy.
    ///
    /// Vaulted prose is opened only when a key is present and the policy
    /// allows revealing it; otherwise its placeholder is shown.
    pub fn render_event(&self, doc: &Chronicle, event: &Event) -> Result<RenderedEvent> {
        let body = match &event.detail {
            EventDetail::Full(detail) => RenderedBody::Full {
                action: self.render_prose(doc, &detail.action)?,
                outcome: self.render_prose(doc, &detail.outcome)?,
                consequence: self.render_prose(doc, &detail.consequence)?,
                content: self.render_prose(doc, &detail.content)?,
            },
            EventDetail::Summarized { gist } => RenderedBody::Summary { gist: gist.clone() },
        };

        Ok(RenderedEvent {
            id: event.id,
            phase_id: event.phase_id.clone(),
            sequence: event.sequence,
            timestamp: event.timestamp,
            location: event.location.clone(),
            participants: event.participants.clone(),
            tags: event.tags.clone(),
            body,
        })
    }

    /// The newest `n` events of a phase, rendered, newest first.
    pub fn render_recent(
        &self,
        doc: &Chronicle,
        phase_id: &str,
        n: usize,
    ) -> Result<Vec<RenderedEvent>> {
        doc.get_recent(phase_id, n)?
            .into_iter()
            .map(|event| self.render_event(doc, event))
            .collect()
    }

    fn render_prose(&self, doc: &Chronicle, prose: &Prose) -> Result<String> {
        match prose {
            Prose::Vaulted { vault_ref } if doc.policy.may_reveal() && self.key.is_some() => {
                self.open_vaulted(doc, *vault_ref)
            }
            other => Ok(other.display_text().to_string()),
        }
    }

    /// Decrypt one vault entry with this chronicler's key.
    ///
    /// Ignores the rendering policy; callers decide whether the plaintext may
    /// be shown.
    pub fn open_vaulted(&self, doc: &Chronicle, reference: VaultRef) -> Result<String> {
        let entry = doc
            .vault
            .get(reference)
            .ok_or_else(|| ChronicleError::not_found("vault entry", reference.to_string()))?;
        Ok(vault::open(entry, self.key.as_ref())?)
    }

    // =========================================================================
    // Scene
    // =========================================================================

    /// Replace the current-scene snapshot.
    ///
    /// Emotional context and prompt are redacted when the screen flags them
    /// and the policy does not store mature prose inline.
    pub fn snapshot_current(&self, doc: &mut Chronicle, mut scene: CurrentScene) {
        if doc.policy.effective_handling() != MatureHandling::Inline {
            for text in [&mut scene.emotional_context, &mut scene.prompt] {
                if self.config.screen.flags(text) {
                    *text = ProseKind::Scene.redaction_placeholder().to_string();
                }
            }
        }
        if scene.last_event.is_none() {
            scene.last_event = doc.current.last_event;
        }
        doc.current = scene;
        doc.touch();
    }

    // =========================================================================
    // Keys and saving
    // =========================================================================

    /// Re-seal every vault entry under `new` and adopt it as this
    /// chronicler's key.
    ///
    /// Atomic: on any failure neither the document nor the key changes.
    pub fn rotate_vault_key(&mut self, doc: &mut Chronicle, new: VaultKey) -> Result<usize> {
        let rotated = doc.vault.rotate(self.key.as_ref(), Some(&new))?;
        self.key = Some(new);
        doc.touch();
        tracing::info!(entries = rotated, "rotated vault key");
        Ok(rotated)
    }

    /// Save the document and verify its indexes afterwards.
    pub async fn checkpoint(
        &self,
        doc: &mut Chronicle,
        store: &ChronicleStore,
    ) -> Result<SaveHandle> {
        let handle = store.save(doc).await?;
        if doc.ensure_indexes() {
            tracing::warn!(path = %handle.path().display(), "indexes rebuilt after checkpoint");
        }
        Ok(handle)
    }
}

impl Default for Chronicler {
    fn default() -> Self {
        Self::new(ChronicleConfig::default())
    }
}

/// An event as shown to a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub id: EventId,
    pub phase_id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub participants: Vec<String>,
    pub tags: BTreeSet<String>,
    pub body: RenderedBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedBody {
    Full {
        action: String,
        outcome: String,
        consequence: String,
        content: String,
    },
    Summary {
        gist: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SEALED_PLACEHOLDER;
    use crate::testing::{other_key, test_key};

    fn chronicler() -> Chronicler {
        Chronicler::default().with_key(test_key())
    }

    #[test]
    fn test_redact_discards_true_content() {
        let chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::default());
        let event = chronicler
            .append_event(
                &mut doc,
                "p",
                EventDraft::new("secret action").with_content("secret body").mature(),
            )
            .unwrap();

        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("secret"));
        assert!(doc.vault.is_empty());
        assert_eq!(
            event.content().unwrap().display_text(),
            ProseKind::Narrative.redaction_placeholder()
        );
    }

    #[test]
    fn test_vault_stores_only_reference() {
        let chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::vaulted());
        let event = chronicler
            .append_event(&mut doc, "p", EventDraft::new("act").with_content("X marks").mature())
            .unwrap();

        let reference = event.content().and_then(Prose::vault_ref).unwrap();
        assert_eq!(doc.vault.len(), 2);
        assert!(!serde_json::to_string(&doc).unwrap().contains("X marks"));
        assert_eq!(chronicler.open_vaulted(&doc, reference).unwrap(), "X marks");
    }

    #[test]
    fn test_inline_requires_age_verification() {
        let chronicler = chronicler();
        let policy = Policy::default().with_handling(MatureHandling::Inline);

        let mut unverified = chronicler.start("s", policy);
        let event = chronicler
            .append_event(&mut unverified, "p", EventDraft::new("bold move").mature())
            .unwrap();
        assert!(event.full().unwrap().action.as_inline().is_none());

        let mut verified = chronicler.start("s", policy.with_age_verified(true));
        let event = chronicler
            .append_event(&mut verified, "p", EventDraft::new("bold move").mature())
            .unwrap();
        assert_eq!(event.full().unwrap().action.as_inline(), Some("bold move"));
    }

    #[test]
    fn test_screen_escalates_in_sfw_mode_only() {
        let chronicler = chronicler();
        let draft = || EventDraft::new("There was blood on the floor");

        let mut sfw = chronicler.start("s", Policy::default());
        let event = chronicler.append_event(&mut sfw, "p", draft()).unwrap();
        assert_eq!(event.sensitivity, Sensitivity::Mature);

        let mut open = chronicler.start("s", Policy::default().with_sfw_mode(false));
        let event = chronicler.append_event(&mut open, "p", draft()).unwrap();
        assert_eq!(event.sensitivity, Sensitivity::General);
    }

    #[test]
    fn test_render_honors_policy() {
        let chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::vaulted());
        let event = chronicler
            .append_event(&mut doc, "p", EventDraft::new("act").with_content("hidden").mature())
            .unwrap();

        let RenderedBody::Full { content, .. } = chronicler.render_event(&doc, &event).unwrap().body
        else {
            panic!("expected full body");
        };
        assert_eq!(content, SEALED_PLACEHOLDER);

        doc.policy = doc.policy.with_sfw_mode(false).with_age_verified(true);
        let RenderedBody::Full { content, .. } = chronicler.render_event(&doc, &event).unwrap().body
        else {
            panic!("expected full body");
        };
        assert_eq!(content, "hidden");
    }

    #[test]
    fn test_compression_drops_released_vault_entries() {
        let chronicler = Chronicler::new(ChronicleConfig::new().with_keep_full_detail(2))
            .with_key(test_key());
        let mut doc = chronicler.start("s", Policy::vaulted());
        for i in 0..3 {
            chronicler
                .append_event(
                    &mut doc,
                    "p",
                    EventDraft::new(format!("a{i}")).with_content("sealed").mature(),
                )
                .unwrap();
        }

        // The oldest event released its two sealed fields.
        assert_eq!(doc.vault.len(), 4);
        let phase = doc.timeline.phase("p").unwrap();
        assert_eq!(phase.summarized_count(), 1);
        assert!(phase.events[0].vault_refs().is_empty());
    }

    #[test]
    fn test_rotate_vault_key() {
        let mut chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::vaulted());
        let event = chronicler
            .append_event(&mut doc, "p", EventDraft::new("act").with_content("kept").mature())
            .unwrap();
        let reference = event.content().and_then(Prose::vault_ref).unwrap();

        assert_eq!(chronicler.rotate_vault_key(&mut doc, other_key()).unwrap(), 2);
        assert_eq!(chronicler.open_vaulted(&doc, reference).unwrap(), "kept");

        let stale = Chronicler::default().with_key(test_key());
        let err = stale.open_vaulted(&doc, reference).unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_snapshot_redacts_flagged_scene() {
        let chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::default());
        chronicler.snapshot_current(
            &mut doc,
            CurrentScene::new("Bar")
                .with_emotional_context("Tense, alcohol everywhere")
                .with_choice("Leave"),
        );
        assert_eq!(doc.current.location, "Bar");
        assert_eq!(
            doc.current.emotional_context,
            ProseKind::Scene.redaction_placeholder()
        );
        assert_eq!(doc.current.open_choices, vec!["Leave"]);
    }

    #[test]
    fn test_summary_updates_follow_policy() {
        let chronicler = chronicler();
        let draft = || {
            EventDraft::new("act")
                .with_participant("Sam")
                .with_status("Sam", "shaken")
                .mature()
        };

        let mut vaulted = chronicler.start("s", Policy::vaulted());
        chronicler.append_event(&mut vaulted, "p", draft()).unwrap();
        assert_eq!(
            vaulted.characters["Sam"].status,
            ProseKind::Summary.redaction_placeholder()
        );

        let inline = Policy::default()
            .with_handling(MatureHandling::Inline)
            .with_age_verified(true);
        let mut open = chronicler.start("s", inline);
        chronicler.append_event(&mut open, "p", draft()).unwrap();
        assert_eq!(open.characters["Sam"].status, "shaken");
    }

    #[test]
    fn test_screen_reads_summary_updates() {
        let chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::default());
        let event = chronicler
            .append_event(
                &mut doc,
                "p",
                EventDraft::new("a quiet talk").with_note("Sam", "Witnessed a death"),
            )
            .unwrap();

        assert_eq!(event.sensitivity, Sensitivity::Mature);
        assert_eq!(
            doc.characters["Sam"].development_notes,
            vec![ProseKind::Summary.redaction_placeholder()]
        );
    }

    #[test]
    fn test_append_returns_stored_form() {
        let mut config = ChronicleConfig::new();
        config.keep_full_detail = 0;
        let chronicler = Chronicler::new(config).with_key(test_key());
        let mut doc = chronicler.start("s", Policy::vaulted());

        let event = chronicler
            .append_event(&mut doc, "p", EventDraft::new("act").with_content("x").mature())
            .unwrap();
        assert!(event.is_summarized());
        assert_eq!(doc.get_by_id(event.id).unwrap(), &event);
        assert!(doc.vault.is_empty());
    }

    #[test]
    fn test_empty_phase_id_rejected() {
        let chronicler = chronicler();
        let mut doc = chronicler.start("s", Policy::default());
        assert!(matches!(
            chronicler.append_event(&mut doc, " ", EventDraft::new("x")),
            Err(ChronicleError::InvalidDraft(_))
        ));
        assert_eq!(doc.event_count(), 0);
    }
}
