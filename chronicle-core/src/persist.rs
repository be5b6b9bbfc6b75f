//! Chronicle persistence.
//!
//! Documents are stored as pretty-printed JSON, one file per save. Writes go
//! to a temporary sibling that is synced and then renamed over the target, so
//! a crash never leaves a partially written save behind. Older formats are
//! upgraded on load by [`crate::migration`].

use crate::document::Chronicle;
use crate::migration;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Current save format version.
pub const FORMAT_VERSION: u32 = 2;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt chronicle document: {0}")]
    CorruptDocument(String),

    #[error("unsupported format version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl PersistError {
    pub(crate) fn corrupt(reason: impl std::fmt::Display) -> Self {
        Self::CorruptDocument(reason.to_string())
    }
}

/// Where a save landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveHandle {
    path: PathBuf,
}

impl SaveHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

impl From<PathBuf> for SaveHandle {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AsRef<Path> for SaveHandle {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Metadata readable without deserializing the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveMetadata {
    pub chronicle_id: Uuid,
    pub session_id: Uuid,
    pub scenario_id: String,
    /// Format version found on disk, before any migration.
    pub version: u32,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub location: String,
    pub phase_count: usize,
    pub event_count: usize,
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub metadata: SaveMetadata,
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize a document in the current format.
pub fn to_json(doc: &Chronicle) -> Result<String, PersistError> {
    if doc.version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: doc.version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Parse a document, upgrading older formats.
pub fn from_json(content: &str) -> Result<Chronicle, PersistError> {
    let mut value: Value = serde_json::from_str(content).map_err(PersistError::corrupt)?;
    let found = migration::migrate(&mut value)?;
    let mut doc: Chronicle = serde_json::from_value(value).map_err(PersistError::corrupt)?;
    check_structure(&doc)?;

    if found < FORMAT_VERSION {
        // Migrated documents carry no trustworthy indexes.
        doc.indexes = crate::index::Indexes::rebuild(&doc.timeline);
        tracing::info!(
            chronicle = %doc.chronicle_id,
            from = found,
            to = FORMAT_VERSION,
            "migrated chronicle"
        );
    } else {
        doc.ensure_indexes();
    }
    Ok(doc)
}

/// Reject documents whose timeline violates ordering invariants.
fn check_structure(doc: &Chronicle) -> Result<(), PersistError> {
    let mut ordinals = std::collections::BTreeSet::new();
    for phase in &doc.timeline.phases {
        for (i, event) in phase.events.iter().enumerate() {
            if event.phase_id != phase.id {
                return Err(PersistError::corrupt(format!(
                    "event {} filed under phase {} but claims {}",
                    event.id, phase.id, event.phase_id
                )));
            }
            if event.sequence != i as u64 + 1 {
                return Err(PersistError::corrupt(format!(
                    "phase {} has sequence {} at position {}",
                    phase.id,
                    event.sequence,
                    i + 1
                )));
            }
            if event.ordinal >= doc.timeline.appended || !ordinals.insert(event.ordinal) {
                return Err(PersistError::corrupt(format!(
                    "event {} has invalid ordinal {}",
                    event.id, event.ordinal
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

/// A directory of chronicle saves.
#[derive(Debug, Clone)]
pub struct ChronicleStore {
    dir: PathBuf,
}

impl ChronicleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable path overwritten by each autosave of a session.
    pub fn autosave_path(&self, doc: &Chronicle) -> PathBuf {
        self.dir
            .join(format!("chronicle_{}_autosave.json", session_prefix(doc)))
    }

    /// Timestamped path for a manual snapshot.
    pub fn snapshot_path(&self, doc: &Chronicle) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        self.dir
            .join(format!("chronicle_{}_{timestamp}.json", session_prefix(doc)))
    }

    /// Save to the session's autosave path.
    pub async fn save(&self, doc: &Chronicle) -> Result<SaveHandle, PersistError> {
        self.save_as(doc, self.autosave_path(doc)).await
    }

    /// Save to a new timestamped snapshot.
    pub async fn save_snapshot(&self, doc: &Chronicle) -> Result<SaveHandle, PersistError> {
        self.save_as(doc, self.snapshot_path(doc)).await
    }

    /// Atomically write `doc` to `path`.
    pub async fn save_as(
        &self,
        doc: &Chronicle,
        path: impl Into<PathBuf>,
    ) -> Result<SaveHandle, PersistError> {
        let path = path.into();
        let content = to_json(doc)?;
        write_atomic(&path, content.as_bytes()).await?;
        tracing::info!(
            path = %path.display(),
            version = FORMAT_VERSION,
            events = doc.event_count(),
            "saved chronicle"
        );
        Ok(SaveHandle::from(path))
    }

    /// Load a save, upgrading older formats.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Chronicle, PersistError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let doc = from_json(&content)?;
        tracing::info!(path = %path.display(), events = doc.event_count(), "loaded chronicle");
        Ok(doc)
    }

    /// Read a save's metadata without deserializing its events.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;
        let mut value: Value = serde_json::from_str(&content).map_err(PersistError::corrupt)?;
        let found = migration::migrate(&mut value)?;

        let phases = value["timeline"]["phases"].as_array();
        let phase_count = phases.map_or(0, Vec::len);
        let event_count = phases.map_or(0, |phases| {
            phases
                .iter()
                .map(|p| p["events"].as_array().map_or(0, Vec::len))
                .sum()
        });

        #[derive(Deserialize)]
        struct Partial {
            chronicle_id: Uuid,
            session_id: Uuid,
            scenario_id: String,
            updated_at: chrono::DateTime<chrono::Utc>,
            current: PartialScene,
        }

        #[derive(Deserialize)]
        struct PartialScene {
            #[serde(default)]
            location: String,
        }

        let partial: Partial = serde_json::from_value(value).map_err(PersistError::corrupt)?;
        Ok(SaveMetadata {
            chronicle_id: partial.chronicle_id,
            session_id: partial.session_id,
            scenario_id: partial.scenario_id,
            version: found,
            updated_at: partial.updated_at,
            location: partial.current.location,
            phase_count,
            event_count,
        })
    }

    /// All readable saves in the directory, most recently updated first.
    ///
    /// A missing directory has no saves. Unreadable files are skipped.
    pub async fn list_saves(&self) -> Result<Vec<SaveInfo>, PersistError> {
        let mut saves = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(saves),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match Self::peek_metadata(&path).await {
                    Ok(metadata) => saves.push(SaveInfo { path, metadata }),
                    Err(err) => {
                        tracing::debug!(path = %path.display(), error = %err, "skipping save")
                    }
                }
            }
        }

        saves.sort_by(|a, b| b.metadata.updated_at.cmp(&a.metadata.updated_at));
        Ok(saves)
    }
}

fn session_prefix(doc: &Chronicle) -> String {
    doc.session_id.simple().to_string().chars().take(8).collect()
}

/// Write `bytes` to a synced temporary sibling and rename it over `path`.
///
/// The temporary file is removed on any failure.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp_path = {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "chronicle.json".to_string());
        path.with_file_name(format!(".{filename}.tmp"))
    };

    let write_result: Result<(), std::io::Error> = async {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }

    Ok(())
}
