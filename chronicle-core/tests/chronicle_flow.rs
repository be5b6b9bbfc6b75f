//! Scenario tests for the write and read paths of a chronicle.
//!
//! Run with: `cargo test -p chronicle-core --test chronicle_flow`

use chronicle_core::policy::{ProseKind, SEALED_PLACEHOLDER};
use chronicle_core::testing::{
    assert_indexes_consistent, assert_sequences_gapless, assert_vault_references_resolve,
    other_key, test_key, turn_draft, TestHarness,
};
use chronicle_core::{
    vault, ChronicleConfig, ChronicleError, Chronicler, EventDraft, MatureHandling, Policy,
    Prose, RelationshipStatus, VaultError, WorldDelta,
};
use chrono::{TimeZone, Utc};

// =============================================================================
// Compression
// =============================================================================

#[test]
fn test_sixty_events_keep_newest_fifty() {
    let mut harness = TestHarness::new(Policy::default());
    let ids = harness
        .play_turns("week1", 60, &["Alex"])
        .expect("append turns");

    let recent = harness
        .chronicle
        .get_recent("week1", 50)
        .expect("phase exists");
    assert_eq!(recent.len(), 50);
    assert!(recent.iter().all(|e| !e.is_summarized()));
    assert_eq!(recent[0].sequence, 60);
    assert_eq!(recent[49].sequence, 11);

    let phases = harness.chronicle.list_phases();
    assert_eq!(phases.len(), 1);
    assert_eq!(phases[0].full_detail, 50);
    assert_eq!(phases[0].summarized, 10);
    assert!(phases[0].summary.contains("#1-#10"));

    // Folded events stay readable in summary form.
    let first = harness.chronicle.get_by_id(ids[0]).expect("event kept");
    assert!(first.is_summarized());
    assert!(first.involves("Alex"));
    assert!(first.tags.contains("study"));

    // And stay indexed.
    let alex = harness.chronicle.query_by_character("Alex", 100);
    assert_eq!(alex.len(), 60);
    assert_eq!(alex[0], ids[59]);
    assert_indexes_consistent(&harness.chronicle);
    assert_sequences_gapless(&harness.chronicle);
}

#[test]
fn test_compress_twice_is_stable() {
    let mut harness = TestHarness::new(Policy::default());
    harness
        .play_turns("week1", 55, &["Alex"])
        .expect("append turns");
    let before = harness.chronicle.timeline.clone();

    let report = harness
        .chronicler
        .compress_phase(&mut harness.chronicle, "week1")
        .expect("compress");
    assert_eq!(report.folded, 0);
    assert_eq!(harness.chronicle.timeline, before);
}

#[test]
fn test_plot_heavy_phase_summary_stays_bounded() {
    let config = ChronicleConfig::new()
        .with_keep_full_detail(1)
        .with_summary_consequence_limit(3);
    let mut harness = TestHarness::with_config(config, Policy::default());
    for turn in 1..=200 {
        harness
            .append("week1", turn_draft(turn, &["Alex"]).with_tag("plot"))
            .expect("append");
    }

    let phase = harness.chronicle.timeline.phase("week1").expect("phase");
    assert_eq!(phase.digest.consequences.len(), 3);
    assert!(phase.summary.contains("196 earlier pinned consequences condensed"));
    assert!(phase.summary.len() < 1024);
}

#[test]
fn test_phases_compress_independently() {
    let config = ChronicleConfig::new().with_keep_full_detail(3);
    let mut harness = TestHarness::with_config(config, Policy::default());
    harness.play_turns("week1", 5, &["Alex"]).expect("week1");
    harness.play_turns("week2", 2, &["Sam"]).expect("week2");

    let phases = harness.chronicle.list_phases();
    assert_eq!((phases[0].full_detail, phases[0].summarized), (3, 2));
    assert_eq!((phases[1].full_detail, phases[1].summarized), (2, 0));
}

// =============================================================================
// Vault
// =============================================================================

#[test]
fn test_vaulted_content_opens_only_with_its_key() {
    let mut harness = TestHarness::new(Policy::vaulted());
    let event = harness
        .append(
            "week1",
            EventDraft::new("Alex closes the door")
                .with_participant("Alex")
                .with_content("X")
                .mature(),
        )
        .expect("append mature event");

    let reference = event
        .content()
        .and_then(Prose::vault_ref)
        .expect("content is vaulted");

    // Nothing in the saved form carries the plaintext.
    let json = serde_json::to_string(&harness.chronicle).expect("serialize");
    assert!(!json.contains("Alex closes the door"));

    let entry = harness.chronicle.vault.get(reference).expect("entry stored");
    assert_eq!(vault::open(entry, Some(&test_key())).expect("open"), "X");

    let err = vault::open(entry, Some(&other_key())).expect_err("wrong key");
    assert!(err.is_authentication_failure());
    assert_vault_references_resolve(&harness.chronicle);
}

#[test]
fn test_missing_key_leaves_document_unchanged() {
    let mut harness = TestHarness::keyless(Policy::vaulted());
    harness.play_turns("week1", 2, &["Alex"]).expect("plain turns");
    let before = harness.chronicle.clone();

    let err = harness
        .append(
            "week1",
            turn_draft(3, &["Alex", "Sam"])
                .with_content("sealed scene")
                .with_relationship("Alex", "Sam", 20)
                .mature(),
        )
        .expect_err("sealing needs a key");
    assert!(matches!(err, ChronicleError::Vault(VaultError::KeyMissing)));
    assert_eq!(harness.chronicle, before);
}

#[test]
fn test_rendering_reveals_only_when_allowed() {
    let policy = Policy::vaulted()
        .with_sfw_mode(false)
        .with_age_verified(true);
    let mut harness = TestHarness::new(policy);
    let event = harness
        .append("week1", EventDraft::new("act").with_content("revealed").mature())
        .expect("append");

    let rendered = harness
        .chronicler
        .render_recent(&harness.chronicle, "week1", 1)
        .expect("render");
    assert!(matches!(
        &rendered[0].body,
        chronicle_core::RenderedBody::Full { content, .. } if content == "revealed"
    ));

    let keyless = Chronicler::default();
    let rendered = keyless
        .render_event(&harness.chronicle, &event)
        .expect("render without key");
    assert!(matches!(
        &rendered.body,
        chronicle_core::RenderedBody::Full { content, .. } if content == SEALED_PLACEHOLDER
    ));
}

#[test]
fn test_export_strips_vault() {
    let mut harness = TestHarness::new(Policy::vaulted());
    harness
        .append("week1", EventDraft::new("act").with_content("hidden").mature())
        .expect("append");

    let export = harness.chronicle.export(false);
    assert!(export.vault.is_empty());
    let json = serde_json::to_string(&export).expect("serialize");
    assert!(!json.contains("\"vaulted\""));

    let full = harness.chronicle.export(true);
    assert_eq!(full, harness.chronicle);
}

#[test]
fn test_inline_policy_without_verification_redacts() {
    let policy = Policy::default().with_handling(MatureHandling::Inline);
    let mut harness = TestHarness::new(policy);
    let event = harness
        .append("week1", EventDraft::new("a bold move").mature())
        .expect("append");
    assert!(matches!(
        event.full().map(|d| &d.action),
        Some(Prose::Redacted { .. })
    ));
}

#[test]
fn test_mature_summary_updates_are_not_stored_in_plaintext() {
    let mut harness = TestHarness::new(Policy::default());
    harness
        .append(
            "week1",
            EventDraft::new("x")
                .with_participant("Alex")
                .with_status("Alex", "SECRETSTATUS")
                .with_note("Alex", "SECRETNOTE")
                .with_world(
                    WorldDelta::new()
                        .with_fact("SECRETFACT")
                        .open_thread("SECRETTHREAD"),
                )
                .mature(),
        )
        .expect("append mature event");

    let json = serde_json::to_string(&harness.chronicle).expect("serialize");
    for secret in ["SECRETSTATUS", "SECRETNOTE", "SECRETFACT", "SECRETTHREAD"] {
        assert!(!json.contains(secret), "{secret} stored in plaintext");
    }

    let alex = harness
        .chronicle
        .get_character_summary("Alex")
        .expect("Alex tracked");
    assert_eq!(alex.status, ProseKind::Summary.redaction_placeholder());
    assert_eq!(harness.chronicle.get_world_state().active_threads.len(), 1);
}

// =============================================================================
// Summaries and indexes
// =============================================================================

#[test]
fn test_character_query_returns_newest_matching() {
    let mut harness = TestHarness::new(Policy::default());
    let mut alex_events = Vec::new();
    for turn in 1..=10 {
        let who: &[&str] = if turn % 2 == 0 { &["Alex"] } else { &["Sam"] };
        let event = harness
            .append("week1", turn_draft(turn, who))
            .expect("append");
        if turn % 2 == 0 {
            alex_events.push(event.id);
        }
    }

    let ids = harness.chronicle.query_by_character("Alex", 3);
    alex_events.reverse();
    assert_eq!(ids, alex_events[..3]);

    let events = harness.chronicle.resolve(&ids).expect("resolve");
    assert!(events.iter().all(|e| e.involves("Alex")));
}

#[test]
fn test_summaries_follow_events() {
    let mut harness = TestHarness::new(Policy::default());
    harness
        .append(
            "week1",
            turn_draft(1, &["Alex", "Sam"]).with_relationship("Alex", "Sam", 40),
        )
        .expect("first");
    harness
        .append(
            "week1",
            turn_draft(2, &["Alex", "Sam"])
                .with_relationship("Alex", "Sam", 30)
                .with_status("Sam", "confident")
                .with_note("Alex", "Opens up about home"),
        )
        .expect("second");

    let alex = harness
        .chronicle
        .get_character_summary("Alex")
        .expect("Alex tracked");
    let record = alex.relationship("Sam").expect("relationship");
    assert_eq!(record.score, 70);
    assert_eq!(record.status, RelationshipStatus::Friendly);
    assert_eq!(alex.recent_changes.len(), 1);
    assert_eq!(alex.development_notes, vec!["Opens up about home"]);

    let sam = harness
        .chronicle
        .get_character_summary("Sam")
        .expect("Sam tracked");
    assert_eq!(sam.status, "confident");
    assert_eq!(sam.appearances, 2);
}

#[test]
fn test_world_time_cannot_move_backwards() {
    let mut harness = TestHarness::new(Policy::default());
    let ten = Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap();
    let nine = Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap();

    harness
        .append(
            "week1",
            turn_draft(1, &["Alex"]).with_world(
                WorldDelta::new()
                    .at_time(ten)
                    .move_to("Quad")
                    .open_thread("Missing library book"),
            ),
        )
        .expect("first");
    let before = harness.chronicle.clone();

    let err = harness
        .append(
            "week1",
            turn_draft(2, &["Alex"]).with_world(WorldDelta::new().at_time(nine)),
        )
        .expect_err("time regression");
    assert!(matches!(err, ChronicleError::TemporalOrdering { .. }));
    assert_eq!(harness.chronicle, before);

    let world = harness.chronicle.get_world_state();
    assert_eq!(world.current_time, Some(ten));
    assert_eq!(world.current_location.as_deref(), Some("Quad"));
    assert_eq!(harness.chronicle.current.location, "Quad");
}

#[test]
fn test_duplicate_participants_rejected() {
    let mut harness = TestHarness::new(Policy::default());
    let mut draft = turn_draft(1, &["Alex"]);
    draft.participants.push("Alex".to_string());

    let err = harness.append("week1", draft).expect_err("duplicate participant");
    assert!(matches!(err, ChronicleError::InvalidDraft(_)));
    assert_eq!(harness.chronicle.event_count(), 0);
    assert!(harness.chronicle.characters.is_empty());
}

#[test]
fn test_unknown_ids_are_not_found() {
    let harness = TestHarness::new(Policy::default());
    assert!(matches!(
        harness.chronicle.get_recent("nowhere", 5),
        Err(ChronicleError::NotFound { .. })
    ));
    assert!(matches!(
        harness.chronicle.get_character_summary("Nobody"),
        Err(ChronicleError::NotFound { .. })
    ));
    assert!(harness.chronicle.query_by_tag("none", 5).is_empty());
}
