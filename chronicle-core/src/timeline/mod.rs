//! Timeline store: append-only events grouped into phases.
//!
//! ## Layout
//!
//! ```text
//! Timeline
//!  ├─ Phase "week1"   [#1 summarized] [#2 summarized] ... [#11 full] ... [#60 full]
//!  │                   └─ folded into summary + digest
//!  └─ Phase "week2"   [#1 full] ...
//! ```
//!
//! Sequence numbers are per phase and gapless; ordinals are chronicle-wide and
//! record append order across phases.

mod compression;
mod event;
mod phase;

pub use compression::{
    DigestLine, DigestSummarizer, PhaseDigest, Summarizer, DEFAULT_CONSEQUENCE_LIMIT,
};
pub use event::{Event, EventDetail, EventDraft, EventId, FullDetail, Prose};
pub use phase::{Compaction, Phase, PhaseOverview};

use crate::error::{ChronicleError, Result};
use crate::vault::VaultRef;
use serde::{Deserialize, Serialize};

/// Default number of newest events per phase kept at full detail.
pub const DEFAULT_KEEP_FULL_DETAIL: usize = 50;

/// Outcome of a compression pass over one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionReport {
    pub folded: usize,
    pub released: Vec<VaultRef>,
}

/// All phases of one chronicle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub phases: Vec<Phase>,
    /// Number of events ever appended; the next event's ordinal.
    #[serde(default)]
    pub appended: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, phase_id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == phase_id)
    }

    fn phase_index(&self, phase_id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == phase_id)
    }

    /// Sequence number the next event in `phase_id` will receive.
    pub fn next_sequence(&self, phase_id: &str) -> u64 {
        self.phase(phase_id).map_or(1, Phase::next_sequence)
    }

    pub fn next_ordinal(&self) -> u64 {
        self.appended
    }

    /// Append a fully built event to its phase, creating the phase if needed.
    ///
    /// The event's sequence and ordinal must be the ones this timeline handed
    /// out via [`next_sequence`](Self::next_sequence) and
    /// [`next_ordinal`](Self::next_ordinal).
    pub fn append(&mut self, event: Event) -> Result<&Event> {
        let expected = self.next_sequence(&event.phase_id);
        if event.sequence != expected || event.ordinal != self.appended {
            return Err(ChronicleError::InvalidDraft(format!(
                "event {} out of order: sequence {} (expected {expected}), ordinal {} (expected {})",
                event.id, event.sequence, event.ordinal, self.appended
            )));
        }

        let index = match self.phase_index(&event.phase_id) {
            Some(index) => index,
            None => {
                tracing::debug!(phase = %event.phase_id, "creating phase");
                self.phases.push(Phase::new(event.phase_id.clone()));
                self.phases.len() - 1
            }
        };

        self.appended += 1;
        let events = &mut self.phases[index].events;
        events.push(event);
        Ok(&events[events.len() - 1])
    }

    /// Fold full-detail events beyond the newest `keep` into the phase summary.
    pub fn compress_phase(
        &mut self,
        phase_id: &str,
        keep: usize,
        summarizer: &dyn Summarizer,
    ) -> Result<CompressionReport> {
        let index = self
            .phase_index(phase_id)
            .ok_or_else(|| ChronicleError::not_found("phase", phase_id))?;

        let Some(compaction) = self.phases[index].compacted(keep, summarizer) else {
            return Ok(CompressionReport::default());
        };

        tracing::debug!(
            phase = phase_id,
            folded = compaction.folded,
            released = compaction.released.len(),
            "compressed phase"
        );
        self.phases[index] = compaction.phase;
        Ok(CompressionReport {
            folded: compaction.folded,
            released: compaction.released,
        })
    }

    /// The newest `n` events of a phase, newest first.
    pub fn get_recent(&self, phase_id: &str, n: usize) -> Result<Vec<&Event>> {
        let phase = self
            .phase(phase_id)
            .ok_or_else(|| ChronicleError::not_found("phase", phase_id))?;
        Ok(phase.recent(n).collect())
    }

    pub fn get_by_id(&self, id: EventId) -> Result<&Event> {
        self.events()
            .find(|e| e.id == id)
            .ok_or_else(|| ChronicleError::not_found("event", id.to_string()))
    }

    pub fn list_phases(&self) -> Vec<PhaseOverview> {
        self.phases.iter().map(Phase::overview).collect()
    }

    /// All events, phase by phase.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.phases.iter().flat_map(|p| p.events.iter())
    }

    /// All events in append order across phases.
    pub fn events_in_append_order(&self) -> Vec<&Event> {
        let mut events: Vec<_> = self.events().collect();
        events.sort_by_key(|e| e.ordinal);
        events
    }

    pub fn event_count(&self) -> usize {
        self.phases.iter().map(|p| p.events.len()).sum()
    }

    /// Case-insensitive text search over inline prose, gists and phase
    /// summaries, newest first.
    pub fn search_text(&self, query: &str, limit: usize) -> Vec<EventId> {
        let needle = query.to_lowercase();
        if needle.trim().is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<&Event> = self
            .events()
            .filter(|event| match &event.detail {
                EventDetail::Full(detail) => detail
                    .fields()
                    .iter()
                    .filter_map(|p| p.as_inline())
                    .chain(std::iter::once(event.location.as_str()))
                    .any(|text| text.to_lowercase().contains(&needle)),
                EventDetail::Summarized { gist } => gist.to_lowercase().contains(&needle),
            })
            .collect();
        hits.sort_by(|a, b| b.ordinal.cmp(&a.ordinal));
        hits.into_iter().take(limit).map(|e| e.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Sensitivity;
    use chrono::Utc;

    fn push(timeline: &mut Timeline, phase: &str, consequence: &str) -> EventId {
        let event = Event {
            id: EventId::new(),
            phase_id: phase.to_string(),
            sequence: timeline.next_sequence(phase),
            ordinal: timeline.next_ordinal(),
            timestamp: Utc::now(),
            story_time: None,
            location: "Campus".to_string(),
            participants: vec!["Alex".to_string()],
            tags: ["daily".to_string()].into_iter().collect(),
            sensitivity: Sensitivity::General,
            detail: EventDetail::Full(FullDetail {
                action: Prose::inline("walks"),
                outcome: Prose::inline("arrives"),
                consequence: Prose::inline(consequence),
                content: Prose::inline("prose body"),
            }),
        };
        timeline.append(event).unwrap().id
    }

    #[test]
    fn test_sequences_gapless_per_phase() {
        let mut timeline = Timeline::new();
        for _ in 0..5 {
            push(&mut timeline, "a", "x");
        }
        push(&mut timeline, "b", "y");
        push(&mut timeline, "a", "z");

        let seqs: Vec<_> = timeline.phase("a").unwrap().events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(timeline.phase("b").unwrap().events[0].sequence, 1);
        assert_eq!(timeline.appended, 7);
    }

    #[test]
    fn test_out_of_order_append_rejected() {
        let mut timeline = Timeline::new();
        push(&mut timeline, "a", "x");
        let mut stale = timeline.phase("a").unwrap().events[0].clone();
        stale.id = EventId::new();
        assert!(matches!(
            timeline.append(stale),
            Err(ChronicleError::InvalidDraft(_))
        ));
        assert_eq!(timeline.event_count(), 1);
    }

    #[test]
    fn test_compress_keeps_newest() {
        let mut timeline = Timeline::new();
        for i in 0..60 {
            push(&mut timeline, "week1", &format!("consequence {i}"));
        }
        let report = timeline
            .compress_phase("week1", 50, &DigestSummarizer::default())
            .unwrap();
        assert_eq!(report.folded, 10);

        let phase = timeline.phase("week1").unwrap();
        assert_eq!(phase.full_detail_count(), 50);
        assert_eq!(phase.summarized_count(), 10);
        assert!(phase.events[..10].iter().all(Event::is_summarized));
        assert!(phase.events[10..].iter().all(|e| !e.is_summarized()));
        assert!(phase.summary.contains("Events #1-#10"));
    }

    #[test]
    fn test_compress_idempotent() {
        let mut timeline = Timeline::new();
        for i in 0..55 {
            push(&mut timeline, "week1", &format!("c{i}"));
        }
        let summarizer = DigestSummarizer::default();
        timeline.compress_phase("week1", 50, &summarizer).unwrap();
        let once = timeline.phase("week1").unwrap().clone();

        let report = timeline.compress_phase("week1", 50, &summarizer).unwrap();
        assert_eq!(report, CompressionReport::default());
        assert_eq!(timeline.phase("week1").unwrap(), &once);
    }

    #[test]
    fn test_compress_processes_only_new_eligible() {
        let mut timeline = Timeline::new();
        let summarizer = DigestSummarizer::default();
        for i in 0..52 {
            push(&mut timeline, "p", &format!("c{i}"));
        }
        timeline.compress_phase("p", 50, &summarizer).unwrap();
        for i in 52..55 {
            push(&mut timeline, "p", &format!("c{i}"));
        }
        let report = timeline.compress_phase("p", 50, &summarizer).unwrap();
        assert_eq!(report.folded, 3);

        let phase = timeline.phase("p").unwrap();
        assert_eq!(phase.digest.folded, 5);
        assert_eq!(phase.digest.last_sequence, Some(5));
    }

    #[test]
    fn test_compressed_event_readable_by_id() {
        let mut timeline = Timeline::new();
        let first = push(&mut timeline, "p", "c");
        push(&mut timeline, "p", "d");
        timeline
            .compress_phase("p", 1, &DigestSummarizer::default())
            .unwrap();

        let event = timeline.get_by_id(first).unwrap();
        assert!(event.is_summarized());
        assert_eq!(event.tags.len(), 1);
    }

    #[test]
    fn test_unknown_ids() {
        let mut timeline = Timeline::new();
        assert!(matches!(
            timeline.get_recent("nope", 3),
            Err(ChronicleError::NotFound { kind: "phase", .. })
        ));
        assert!(matches!(
            timeline.compress_phase("nope", 3, &DigestSummarizer::default()),
            Err(ChronicleError::NotFound { .. })
        ));
        assert!(matches!(
            timeline.get_by_id(EventId::new()),
            Err(ChronicleError::NotFound { kind: "event", .. })
        ));
    }

    #[test]
    fn test_search_text() {
        let mut timeline = Timeline::new();
        let a = push(&mut timeline, "p", "The bridge collapsed");
        push(&mut timeline, "p", "Nothing much");
        let c = push(&mut timeline, "q", "Another bridge burned");

        assert_eq!(timeline.search_text("BRIDGE", 10), vec![c, a]);
        assert_eq!(timeline.search_text("bridge", 1), vec![c]);
        assert!(timeline.search_text("  ", 10).is_empty());
    }
}
