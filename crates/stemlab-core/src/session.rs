//! Session state and per-entry persistence
//!
//! The session keeps one [`EntryState`] per loaded entry, keyed by an opaque
//! entry identifier. Loading an entry replaces the active control/tempo
//! state wholesale; every edit updates the active entry's record. The store
//! itself is a pure state container — pushing a state onto the live graph is
//! a separate, side-effecting step ([`apply_entry_state`]) so the state
//! transition stays testable on its own.
//!
//! Storage backends implement [`Persistence`]; the JSON file store tolerates
//! records with missing fields (per-field serde defaults).

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::control::EntryState;
use crate::engine::{CommandSender, EngineCommand};
use crate::types::Stem;

/// Errors from the persistence layer
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to read state file: {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file: {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed state file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Storage backend for per-entry state
pub trait Persistence {
    fn load(&self) -> Result<HashMap<String, EntryState>, PersistError>;
    fn save(&self, entries: &HashMap<String, EntryState>) -> Result<(), PersistError>;
}

/// JSON file store under the user's config directory
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user location
    pub fn default_location() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stemlab");
        Self { path: dir.join("entries.json") }
    }
}

impl Persistence for JsonFileStore {
    fn load(&self) -> Result<HashMap<String, EntryState>, PersistError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|source| PersistError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, entries: &HashMap<String, EntryState>) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, data).map_err(|source| PersistError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Per-entry state, keyed by entry identity
pub struct SessionStore {
    entries: HashMap<String, EntryState>,
    active: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            active: None,
        }
    }

    /// Restore the map from a persistence backend
    ///
    /// A missing or partially-populated file is not an error; whatever is
    /// readable comes back, the rest defaults.
    pub fn restore(persistence: &dyn Persistence) -> Self {
        let entries = match persistence.load() {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not restore entry state, starting fresh: {}", e);
                HashMap::new()
            }
        };
        Self {
            entries,
            active: None,
        }
    }

    /// Activate an entry, creating defaults on first load
    ///
    /// Returns the state that must now fully replace the live control/tempo
    /// state.
    pub fn activate(&mut self, entry_id: &str) -> EntryState {
        self.active = Some(entry_id.to_string());
        self.entries
            .entry(entry_id.to_string())
            .or_default()
            .clone()
    }

    /// The active entry id, if any
    pub fn active_entry(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Record an edit against the active entry
    pub fn update_active(&mut self, state: EntryState) {
        if let Some(id) = &self.active {
            self.entries.insert(id.clone(), state);
        }
    }

    /// State stored for an entry, if it was ever loaded
    pub fn get(&self, entry_id: &str) -> Option<&EntryState> {
        self.entries.get(entry_id)
    }

    /// Discard an entry's record entirely
    pub fn discard(&mut self, entry_id: &str) {
        self.entries.remove(entry_id);
        if self.active.as_deref() == Some(entry_id) {
            self.active = None;
        }
    }

    /// Persist the map through a backend
    pub fn persist(&self, persistence: &dyn Persistence) -> Result<(), PersistError> {
        persistence.save(&self.entries)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Push an entry's state onto the live graph
///
/// The side-effecting half of an entry switch: fire-and-forget commands that
/// the audio thread applies (smoothed) at the next block boundary.
pub fn apply_entry_state(state: &EntryState, sender: &mut CommandSender) {
    let state = state.clamped();
    for stem in Stem::ALL {
        sender.send(EngineCommand::SetStemControl {
            stem,
            control: state.controls[stem as usize],
        });
    }
    sender.send(EngineCommand::SetTempo(state.tempo));
}
