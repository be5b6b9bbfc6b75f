//! Phases: named groups of events with independent compression state.

use super::compression::{PhaseDigest, Summarizer};
use super::event::Event;
use crate::vault::VaultRef;
use serde::{Deserialize, Serialize};

/// A named arc of the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub title: String,
    /// Events in sequence order; the oldest may be summarized.
    pub events: Vec<Event>,
    /// Rolling summary of folded-out history.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub digest: PhaseDigest,
}

/// Read-only overview returned by `list_phases`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOverview {
    pub id: String,
    pub title: String,
    pub full_detail: usize,
    pub summarized: usize,
    pub summary: String,
}

/// Result of compacting a phase.
#[derive(Debug)]
pub struct Compaction {
    pub phase: Phase,
    pub folded: usize,
    /// Vault entries whose events no longer reference them.
    pub released: Vec<VaultRef>,
}

impl Phase {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            events: Vec::new(),
            summary: String::new(),
            digest: PhaseDigest::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn next_sequence(&self) -> u64 {
        self.events.last().map_or(1, |e| e.sequence + 1)
    }

    pub fn full_detail_count(&self) -> usize {
        self.events.iter().filter(|e| !e.is_summarized()).count()
    }

    pub fn summarized_count(&self) -> usize {
        self.events.len() - self.full_detail_count()
    }

    /// The newest `n` events, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Event> {
        self.events.iter().rev().take(n)
    }

    pub fn overview(&self) -> PhaseOverview {
        PhaseOverview {
            id: self.id.clone(),
            title: self.title.clone(),
            full_detail: self.full_detail_count(),
            summarized: self.summarized_count(),
            summary: self.summary.clone(),
        }
    }

    /// Build the compacted form of this phase, keeping the newest `keep`
    /// full-detail events.
    ///
    /// Returns `None` when nothing is eligible, which makes repeated calls
    /// no-ops.
    pub fn compacted(&self, keep: usize, summarizer: &dyn Summarizer) -> Option<Compaction> {
        let full = self.full_detail_count();
        if full <= keep {
            return None;
        }
        let mut excess = full - keep;

        let mut events = Vec::with_capacity(self.events.len());
        let mut folded = Vec::with_capacity(excess);
        let mut released = Vec::new();

        for event in &self.events {
            if excess > 0 {
                if let Some((summarized, refs)) = event.summarized() {
                    folded.push(event.clone());
                    released.extend(refs);
                    events.push(summarized);
                    excess -= 1;
                    continue;
                }
            }
            events.push(event.clone());
        }

        let digest = summarizer.fold(&self.digest, &folded);
        let summary = summarizer.render(&digest);

        Some(Compaction {
            phase: Phase {
                id: self.id.clone(),
                title: self.title.clone(),
                events,
                summary,
                digest,
            },
            folded: folded.len(),
            released,
        })
    }
}
