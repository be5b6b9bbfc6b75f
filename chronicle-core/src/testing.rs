//! Testing utilities for chronicles.
//!
//! This module provides:
//! - Fixed vault keys for deterministic fixtures
//! - `TestHarness` pairing a chronicler with a document for scripted sessions
//! - Assertion helpers for verifying document invariants
//! - A legacy save for migration tests

use crate::chronicler::Chronicler;
use crate::config::ChronicleConfig;
use crate::document::Chronicle;
use crate::error::Result;
use crate::index::Indexes;
use crate::policy::Policy;
use crate::timeline::{Event, EventDraft, EventId};
use crate::vault::VaultKey;

/// The key most fixtures seal with.
pub fn test_key() -> VaultKey {
    VaultKey::from_bytes([7u8; 32])
}

/// A second, different key.
pub fn other_key() -> VaultKey {
    VaultKey::from_bytes([9u8; 32])
}

/// An ordinary turn between the given characters.
pub fn turn_draft(turn: usize, participants: &[&str]) -> EventDraft {
    EventDraft::new(format!("Turn {turn}: the group compares notes"))
        .at("Library")
        .with_participants(participants.iter().copied())
        .with_outcome(format!("Progress on the essay, part {turn}"))
        .with_consequence(format!("Deadline pressure eases ({turn})"))
        .with_tag("study")
}

/// A chronicle under a vaulting policy holding `events` turns in phase
/// `week1`; every third turn is mature and sealed field by field.
pub fn sample_chronicle(events: usize) -> Result<Chronicle> {
    let mut harness = TestHarness::new(Policy::vaulted());
    for turn in 1..=events {
        let mut draft = turn_draft(turn, &["Alex", "Sam"]);
        if turn % 3 == 0 {
            draft = draft.with_content(format!("private scene {turn}")).mature();
        }
        harness.append("week1", draft)?;
    }
    Ok(harness.chronicle)
}

/// A chronicler and a document driven together.
pub struct TestHarness {
    pub chronicler: Chronicler,
    pub chronicle: Chronicle,
}

impl TestHarness {
    /// Default configuration, sealing with [`test_key`].
    pub fn new(policy: Policy) -> Self {
        Self::with_config(ChronicleConfig::default(), policy)
    }

    pub fn with_config(config: ChronicleConfig, policy: Policy) -> Self {
        let chronicler = Chronicler::new(config).with_key(test_key());
        let chronicle = chronicler.start("test-scenario", policy);
        Self {
            chronicler,
            chronicle,
        }
    }

    /// A harness whose chronicler holds no vault key.
    pub fn keyless(policy: Policy) -> Self {
        let chronicler = Chronicler::default();
        let chronicle = chronicler.start("test-scenario", policy);
        Self {
            chronicler,
            chronicle,
        }
    }

    pub fn append(&mut self, phase_id: &str, draft: EventDraft) -> Result<Event> {
        self.chronicler
            .append_event(&mut self.chronicle, phase_id, draft)
    }

    /// Append `turns` ordinary turns and return their ids in append order.
    pub fn play_turns(
        &mut self,
        phase_id: &str,
        turns: usize,
        participants: &[&str],
    ) -> Result<Vec<EventId>> {
        (1..=turns)
            .map(|turn| {
                self.append(phase_id, turn_draft(turn, participants))
                    .map(|e| e.id)
            })
            .collect()
    }
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert the indexes equal a fresh rebuild from the timeline.
pub fn assert_indexes_consistent(chronicle: &Chronicle) {
    assert_eq!(
        chronicle.indexes,
        Indexes::rebuild(&chronicle.timeline),
        "indexes drifted from the timeline"
    );
}

/// Assert every phase numbers its events 1..=n.
pub fn assert_sequences_gapless(chronicle: &Chronicle) {
    for phase in &chronicle.timeline.phases {
        let sequences: Vec<u64> = phase.events.iter().map(|e| e.sequence).collect();
        let expected: Vec<u64> = (1..=phase.events.len() as u64).collect();
        assert_eq!(sequences, expected, "phase {} has gaps", phase.id);
    }
}

/// Assert every vault reference in the timeline resolves, and nothing else is
/// held in the vault.
pub fn assert_vault_references_resolve(chronicle: &Chronicle) {
    let mut referenced = 0;
    for event in chronicle.timeline.events() {
        for reference in event.vault_refs() {
            assert!(
                chronicle.vault.get(reference).is_some(),
                "dangling vault reference {reference}"
            );
            referenced += 1;
        }
    }
    assert_eq!(referenced, chronicle.vault.len(), "orphaned vault entries");
}

/// A save written by the legacy format (version "1.0.0").
pub const LEGACY_V1_DOCUMENT: &str = r#"{
  "chronicle_id": "5b0c6f0e-8d3a-4c55-9a52-1b7d2f3e4a10",
  "session_id": "9e2f41c7-3b6d-4f0a-8c1e-7a5d9b2c6e81",
  "scenario_id": "campus_life",
  "created_at": "2024-09-02T09:00:00.000001",
  "updated_at": "2024-09-02T10:30:00",
  "version": "1.0.0",
  "timeline": {
    "phases": [
      {
        "phase_id": "2f7c9d1e-6a4b-4e8f-b3c2-5d1a7e9f0b34",
        "title": "Week 1",
        "events": [
          {
            "event_id": "c1d2e3f4-a5b6-4c7d-8e9f-0a1b2c3d4e5f",
            "title": "Study group",
            "timestamp": "2024-09-02T09:15:00.250000",
            "time_advance": "1 hour",
            "location": "Library",
            "participants": ["Alex", "Sam"],
            "player_action": "Alex opens the notebook",
            "dm_outcome": "Sam leans in to read",
            "consequences": ["They agree to meet again", "Sam trusts Alex more"],
            "tags": ["study", "friendship"],
            "notes": null
          },
          {
            "event_id": "d2e3f4a5-b6c7-4d8e-9f0a-1b2c3d4e5f60",
            "title": "After hours",
            "timestamp": "2024-09-02T10:20:00",
            "location": "Dorm",
            "participants": ["Alex"],
            "player_action": "Alex heads back alone",
            "dm_outcome": "[Content redacted - mature themes present]",
            "consequences": [],
            "tags": ["night"],
            "notes": "Quiet walk home"
          }
        ]
      }
    ]
  },
  "characters": {
    "Alex": {
      "name": "Alex",
      "role": "protagonist",
      "current_status": "tired",
      "traits": ["curious"],
      "relationships": { "Sam": { "status": "close friends", "score": 75 } },
      "inventory": ["notebook"],
      "goals": ["pass the midterm"],
      "recent_changes": ["Joined a study group"]
    }
  },
  "world": {
    "setting": ["A small liberal arts college"],
    "rules_mechanics": [],
    "ongoing_plots": ["Midterm exams"],
    "global_changes": []
  },
  "current": {
    "location": "Dorm",
    "time": "2024-09-02T10:30:00",
    "emotional_context": "Relieved",
    "npcs_present": [],
    "open_choices": ["Sleep", "Keep studying"],
    "last_exchange_ref": "d2e3f4a5-b6c7-4d8e-9f0a-1b2c3d4e5f60",
    "prompt": "What do you do next?"
  },
  "indexes": {
    "by_character": { "Alex": ["c1d2e3f4-a5b6-4c7d-8e9f-0a1b2c3d4e5f"] },
    "by_tag": {}
  },
  "policy": { "sfw_mode": true, "mature_handling": "reference", "age_verified": false }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_plays_turns() {
        let mut harness = TestHarness::new(Policy::default());
        let ids = harness.play_turns("week1", 3, &["Alex"]).unwrap();
        assert_eq!(ids.len(), 3);
        assert_indexes_consistent(&harness.chronicle);
        assert_sequences_gapless(&harness.chronicle);
    }

    #[test]
    fn test_sample_chronicle_seals_every_third_turn() {
        let chronicle = sample_chronicle(6).unwrap();
        // Two mature turns, four prose fields each.
        assert_eq!(chronicle.vault.len(), 8);
        assert_vault_references_resolve(&chronicle);
    }
}
