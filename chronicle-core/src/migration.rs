//! Upgrades of older save formats to the current one.
//!
//! Migrations operate on raw JSON so that a document can be rewritten before
//! it has to match the current types. Each step upgrades by exactly one
//! version; [`migrate`] runs the chain from whatever version is on disk.
//!
//! Version 1 is the legacy layout: a `"1.0.0"` version string, naive local
//! timestamps, events with `event_id`/`player_action`/`dm_outcome`, and mature
//! content kept outside the document. That content cannot be recovered, so
//! redacted fields stay redacted.

use crate::persist::{PersistError, FORMAT_VERSION};
use crate::summary::{RelationshipStatus, SCORE_MAX, SCORE_MIN};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};

type Step = fn(Value) -> Result<Value, PersistError>;

/// Migration steps keyed by the version they upgrade from.
const STEPS: &[(u32, Step)] = &[(1, v1_to_v2)];

/// Placeholders the legacy format wrote in place of mature prose.
const LEGACY_PLACEHOLDERS: &[&str] = &[
    "[Content redacted - mature themes present]",
    "[Dialogue redacted - mature content]",
    "[Redacted content]",
];

/// The format version a raw document declares.
///
/// Accepts an integer or a semver-style string (`"1.0.0"`), whose major
/// component is the format version.
pub fn detect_version(value: &Value) -> Result<u32, PersistError> {
    let version = match value.get("version") {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.split('.').next().and_then(|major| major.parse().ok()),
        _ => None,
    };
    version.ok_or_else(|| PersistError::corrupt("missing or invalid format version"))
}

/// Upgrade `value` in place to the current format.
///
/// Returns the version the document had before migration.
pub fn migrate(value: &mut Value) -> Result<u32, PersistError> {
    let found = detect_version(value)?;
    if found > FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found,
            supported: FORMAT_VERSION,
        });
    }

    let mut version = found;
    while version < FORMAT_VERSION {
        let step = STEPS
            .iter()
            .find(|(from, _)| *from == version)
            .map(|(_, step)| *step)
            .ok_or(PersistError::UnsupportedVersion {
                found,
                supported: FORMAT_VERSION,
            })?;
        *value = step(std::mem::take(value))?;
        version += 1;
        tracing::debug!(version, "applied format migration");
    }
    Ok(found)
}

// ============================================================================
// Version 1 -> 2
// ============================================================================

fn v1_to_v2(doc: Value) -> Result<Value, PersistError> {
    if !doc.is_object() {
        return Err(PersistError::corrupt("document is not an object"));
    }

    let mut appended = 0u64;
    let mut phases = Vec::new();
    for phase in array("timeline.phases", doc.get("timeline").and_then(|t| t.get("phases")))? {
        let phase_id = string(phase, "phase_id")?;
        let mut events = Vec::new();
        for (i, event) in array("events", phase.get("events"))?.iter().enumerate() {
            events.push(v1_event(event, &phase_id, i as u64 + 1, appended)?);
            appended += 1;
        }
        phases.push(json!({
            "id": phase_id,
            "title": optional_string(phase, "title").unwrap_or_default(),
            "events": events,
        }));
    }

    let mut characters = Map::new();
    if let Some(Value::Object(legacy)) = doc.get("characters") {
        for (id, character) in legacy {
            characters.insert(id.clone(), v1_character(id, character));
        }
    }

    let world = doc.get("world").cloned().unwrap_or(Value::Null);
    let current = doc.get("current").cloned().unwrap_or(Value::Null);
    let mut setting_facts = strings(&world, "setting");
    setting_facts.extend(strings(&world, "rules_mechanics"));
    setting_facts.extend(strings(&world, "global_changes"));

    let location = optional_string(&current, "location").unwrap_or_default();
    let current_location = (!location.is_empty()).then(|| location.clone());
    let policy = doc.get("policy").cloned().unwrap_or_else(|| {
        json!({ "sfw_mode": true, "mature_handling": "redact", "age_verified": false })
    });
    let last_event = optional_string(&current, "last_exchange_ref")
        .filter(|r| uuid::Uuid::parse_str(r).is_ok());

    Ok(json!({
        "chronicle_id": string(&doc, "chronicle_id")?,
        "session_id": string(&doc, "session_id")?,
        "scenario_id": optional_string(&doc, "scenario_id").unwrap_or_default(),
        "created_at": timestamp(doc.get("created_at"))?,
        "updated_at": timestamp(doc.get("updated_at"))?,
        "version": 2,
        "timeline": { "phases": phases, "appended": appended },
        "characters": characters,
        "world": {
            "setting_facts": setting_facts,
            "active_threads": strings(&world, "ongoing_plots"),
            "resolved_threads": [],
            "current_location": current_location,
            "current_time": null,
        },
        "current": {
            "location": location,
            "story_time": null,
            "emotional_context": optional_string(&current, "emotional_context").unwrap_or_default(),
            "npcs_present": strings(&current, "npcs_present"),
            "open_choices": strings(&current, "open_choices"),
            "last_event": last_event,
            "prompt": optional_string(&current, "prompt")
                .unwrap_or_else(|| crate::document::DEFAULT_PROMPT.to_string()),
        },
        "indexes": { "by_character": {}, "by_tag": {} },
        "policy": policy,
        "vault": {},
    }))
}

fn v1_event(
    event: &Value,
    phase_id: &str,
    sequence: u64,
    ordinal: u64,
) -> Result<Value, PersistError> {
    let mut mature = false;
    let mut prose = |text: String| {
        if LEGACY_PLACEHOLDERS.contains(&text.as_str()) {
            mature = true;
            json!({ "kind": "redacted", "placeholder": text })
        } else {
            json!({ "kind": "inline", "text": text })
        }
    };

    let action = prose(optional_string(event, "player_action").unwrap_or_default());
    let outcome = prose(optional_string(event, "dm_outcome").unwrap_or_default());
    let consequence = prose(strings(event, "consequences").join("; "));
    let content = prose(
        optional_string(event, "notes")
            .or_else(|| optional_string(event, "title"))
            .unwrap_or_default(),
    );
    let mature = mature || optional_string(event, "mature_pointer").is_some();
    let sensitivity = if mature { "mature" } else { "general" };

    let mut tags = strings(event, "tags");
    tags.sort();
    tags.dedup();

    Ok(json!({
        "id": string(event, "event_id")?,
        "phase_id": phase_id,
        "sequence": sequence,
        "ordinal": ordinal,
        "timestamp": timestamp(event.get("timestamp"))?,
        "story_time": null,
        "location": optional_string(event, "location").unwrap_or_default(),
        "participants": strings(event, "participants"),
        "tags": tags,
        "sensitivity": sensitivity,
        "detail": {
            "state": "full",
            "action": action,
            "outcome": outcome,
            "consequence": consequence,
            "content": content,
        },
    }))
}

fn v1_character(id: &str, character: &Value) -> Value {
    let mut relationships = Map::new();
    if let Some(Value::Object(legacy)) = character.get("relationships") {
        for (target, record) in legacy {
            let score = record
                .get("score")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .clamp(SCORE_MIN as i64, SCORE_MAX as i64) as i32;
            // Legacy statuses were free text; recompute from the score.
            relationships.insert(
                target.clone(),
                json!({ "status": RelationshipStatus::from_score(score), "score": score }),
            );
        }
    }

    let notes: Vec<String> = strings(character, "traits")
        .into_iter()
        .map(|t| format!("Trait: {t}"))
        .chain(strings(character, "goals").into_iter().map(|g| format!("Goal: {g}")))
        .chain(strings(character, "inventory").into_iter().map(|i| format!("Carries: {i}")))
        .chain(strings(character, "recent_changes"))
        .collect();
    let status =
        optional_string(character, "current_status").unwrap_or_else(|| "active".to_string());

    json!({
        "id": id,
        "role": optional_string(character, "role").filter(|r| !r.is_empty()),
        "status": status,
        "relationships": relationships,
        "development_notes": notes,
        "recent_changes": [],
        "appearances": 0,
        "first_seen": null,
        "last_seen": null,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn string(value: &Value, field: &str) -> Result<String, PersistError> {
    optional_string(value, field)
        .ok_or_else(|| PersistError::corrupt(format!("missing string field `{field}`")))
}

fn optional_string(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

fn strings(value: &Value, field: &str) -> Vec<String> {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn array<'a>(path: &str, value: Option<&'a Value>) -> Result<&'a [Value], PersistError> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(PersistError::corrupt(format!("`{path}` is not an array"))),
    }
}

/// Normalize a legacy timestamp to RFC 3339 UTC.
///
/// Legacy saves wrote naive local times; they are taken as UTC.
fn timestamp(value: Option<&Value>) -> Result<String, PersistError> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| PersistError::corrupt("missing timestamp"))?;
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc())
        })
        .map_err(|e| PersistError::corrupt(format!("bad timestamp {raw:?}: {e}")))?;
    Ok(parsed.to_rfc3339())
}
