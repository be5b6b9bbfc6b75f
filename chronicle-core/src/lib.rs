//! Persistent narrative memory for session-based interactive fiction.
//!
//! This crate provides:
//! - An append-only timeline of events grouped into phases, with rolling
//!   compression of older events into phase summaries
//! - Per-character and world summaries kept current as events arrive
//! - Character and tag indexes rebuildable from the timeline
//! - A content policy that redacts, seals (AES-256-CTR + HMAC) or inlines
//!   mature prose
//! - Versioned, atomically written JSON saves with migration of older formats
//!
//! # Quick Start
//!
//! ```ignore
//! use chronicle_core::{ChronicleStore, Chronicler, EventDraft, Policy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chronicler = Chronicler::from_env()?;
//!     let mut chronicle = chronicler.start("campus_life", Policy::vaulted());
//!
//!     let draft = EventDraft::new("Alex asks Sam for the lecture notes")
//!         .at("Library")
//!         .with_participants(["Alex", "Sam"])
//!         .with_outcome("Sam hands them over")
//!         .with_relationship("Alex", "Sam", 10);
//!     chronicler.append_event(&mut chronicle, "week1", draft)?;
//!
//!     let store = ChronicleStore::new(&chronicler.config().save_dir);
//!     chronicler.checkpoint(&mut chronicle, &store).await?;
//!     Ok(())
//! }
//! ```

pub mod chronicler;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod migration;
pub mod persist;
pub mod policy;
pub mod summary;
pub mod testing;
pub mod timeline;
pub mod vault;

// Primary public API
pub use chronicler::{Chronicler, RenderedBody, RenderedEvent};
pub use config::ChronicleConfig;
pub use document::{Chronicle, CurrentScene};
pub use error::{ChronicleError, Result};
pub use index::Indexes;
pub use persist::{ChronicleStore, PersistError, SaveHandle, SaveInfo, SaveMetadata, FORMAT_VERSION};
pub use policy::{ContentScreen, MatureHandling, Policy, Sensitivity};
pub use summary::{CharacterSummary, RelationshipStatus, WorldDelta, WorldState};
pub use timeline::{Event, EventDetail, EventDraft, EventId, PhaseOverview, Prose, Summarizer};
pub use vault::{VaultError, VaultKey, VaultRef};
