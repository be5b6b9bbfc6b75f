//! Folding old events into a phase's rolling summary.
//!
//! What survives folding is decided by a [`Summarizer`]. The default
//! [`DigestSummarizer`] keeps a structured digest (participants, tags,
//! locations, story-time span, consequence lines) and renders it to text.

use super::event::{Event, EventDetail, Prose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default number of consequence lines kept in a digest.
pub const DEFAULT_CONSEQUENCE_LIMIT: usize = 24;

/// One consequence carried in a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestLine {
    pub sequence: u64,
    pub text: String,
    /// Pinned lines are evicted only after every unpinned line is gone.
    #[serde(default)]
    pub pinned: bool,
}

/// Structured record of everything folded out of a phase so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDigest {
    pub folded: usize,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub participants: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub locations: BTreeSet<String>,
    pub consequences: Vec<DigestLine>,
    /// Consequences that were sealed or redacted and cannot be quoted.
    pub withheld: usize,
    /// Pinned lines evicted to keep the digest within bounds.
    #[serde(default)]
    pub condensed: usize,
    pub story_time_from: Option<DateTime<Utc>>,
    pub story_time_to: Option<DateTime<Utc>>,
}

impl PhaseDigest {
    pub fn is_empty(&self) -> bool {
        self.folded == 0
    }
}

/// Policy for condensing folded events.
pub trait Summarizer: Send + Sync {
    /// Merge `folded` (oldest first) into `prior`.
    fn fold(&self, prior: &PhaseDigest, folded: &[Event]) -> PhaseDigest;

    /// Render a digest as the phase's summary text.
    fn render(&self, digest: &PhaseDigest) -> String;
}

/// The default summarizer.
#[derive(Debug, Clone)]
pub struct DigestSummarizer {
    consequence_limit: usize,
    pinned_tags: BTreeSet<String>,
}

impl Default for DigestSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_CONSEQUENCE_LIMIT)
    }
}

impl DigestSummarizer {
    pub fn new(consequence_limit: usize) -> Self {
        Self {
            consequence_limit,
            pinned_tags: ["plot", "critical"].into_iter().map(String::from).collect(),
        }
    }

    /// Events carrying any of these tags keep their consequence line forever.
    pub fn with_pinned_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pinned_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    fn is_pinned(&self, event: &Event) -> bool {
        event.tags.iter().any(|t| self.pinned_tags.contains(t))
    }
}

impl Summarizer for DigestSummarizer {
    fn fold(&self, prior: &PhaseDigest, folded: &[Event]) -> PhaseDigest {
        let mut digest = prior.clone();

        for event in folded {
            digest.folded += 1;
            digest.first_sequence = Some(
                digest
                    .first_sequence
                    .map_or(event.sequence, |s| s.min(event.sequence)),
            );
            digest.last_sequence = Some(
                digest
                    .last_sequence
                    .map_or(event.sequence, |s| s.max(event.sequence)),
            );
            digest.participants.extend(event.participants.iter().cloned());
            digest.tags.extend(event.tags.iter().cloned());
            if !event.location.is_empty() {
                digest.locations.insert(event.location.clone());
            }
            if let Some(t) = event.story_time {
                digest.story_time_from = Some(digest.story_time_from.map_or(t, |f| f.min(t)));
                digest.story_time_to = Some(digest.story_time_to.map_or(t, |f| f.max(t)));
            }

            if let EventDetail::Full(detail) = &event.detail {
                match &detail.consequence {
                    Prose::Inline { text } if text.trim().is_empty() => {}
                    Prose::Inline { text } => digest.consequences.push(DigestLine {
                        sequence: event.sequence,
                        text: text.clone(),
                        pinned: self.is_pinned(event),
                    }),
                    Prose::Vaulted { .. } | Prose::Redacted { .. } => digest.withheld += 1,
                }
            }
        }

        // Evict the oldest unpinned lines first, then the oldest pinned ones.
        while digest.consequences.len() > self.consequence_limit {
            match digest.consequences.iter().position(|l| !l.pinned) {
                Some(index) => {
                    digest.consequences.remove(index);
                }
                None => {
                    digest.consequences.remove(0);
                    digest.condensed += 1;
                }
            }
        }

        digest
    }

    fn render(&self, digest: &PhaseDigest) -> String {
        if digest.is_empty() {
            return String::new();
        }

        let mut summary = match (digest.first_sequence, digest.last_sequence) {
            (Some(first), Some(last)) => {
                format!("Events #{first}-#{last} ({} folded).", digest.folded)
            }
            _ => format!("{} events folded.", digest.folded),
        };

        if let (Some(from), Some(to)) = (digest.story_time_from, digest.story_time_to) {
            summary.push_str(&format!(
                " Story time {} to {}.",
                from.format("%Y-%m-%d %H:%M"),
                to.format("%Y-%m-%d %H:%M")
            ));
        }
        if !digest.participants.is_empty() {
            let names: Vec<_> = digest.participants.iter().map(String::as_str).collect();
            summary.push_str(&format!("\nParticipants: {}", names.join(", ")));
        }
        if !digest.locations.is_empty() {
            let places: Vec<_> = digest.locations.iter().map(String::as_str).collect();
            summary.push_str(&format!("\nLocations: {}", places.join(", ")));
        }
        if !digest.tags.is_empty() {
            let tags: Vec<_> = digest.tags.iter().map(String::as_str).collect();
            summary.push_str(&format!("\nTags: {}", tags.join(", ")));
        }
        if digest.condensed > 0 {
            summary.push_str(&format!(
                "\n({} earlier pinned consequences condensed)",
                digest.condensed
            ));
        }
        if !digest.consequences.is_empty() {
            summary.push_str("\nConsequences:");
            for line in &digest.consequences {
                summary.push_str(&format!("\n- #{} {}", line.sequence, line.text));
            }
        }
        if digest.withheld > 0 {
            summary.push_str(&format!(
                "\n({} mature consequences withheld)",
                digest.withheld
            ));
        }

        summary
    }
}
