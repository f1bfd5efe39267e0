use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::BotError;
use crate::models::Position;
use crate::Result;

/// On-disk record of the tracked position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub in_position: bool,
    pub entry_price: f64,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            in_position: false,
            entry_price: 0.0,
        }
    }
}

impl PersistedState {
    /// Enforce `entry_price > 0 <=> in_position`.
    ///
    /// An "open" record without a usable entry price is unowned territory and
    /// collapses to the flat default rather than a guessed position.
    pub fn normalized(self) -> Self {
        if self.in_position {
            if self.entry_price.is_finite() && self.entry_price > 0.0 {
                self
            } else {
                Self::default()
            }
        } else {
            Self::default()
        }
    }
}

impl From<Position> for PersistedState {
    fn from(position: Position) -> Self {
        Self {
            in_position: position.is_open,
            entry_price: if position.is_open { position.entry_price } else { 0.0 },
        }
    }
}

impl From<PersistedState> for Position {
    fn from(state: PersistedState) -> Self {
        let state = state.normalized();
        if state.in_position {
            Position::open(state.entry_price)
        } else {
            Position::flat()
        }
    }
}

/// Durable storage for [`PersistedState`]
pub trait StateStore: Send + Sync {
    /// Never fails: unreadable or missing state yields the flat default
    fn load(&self) -> PersistedState;

    fn save(&self, state: &PersistedState) -> Result<()>;
}

/// JSON file written atomically (temp file, fsync, rename)
#[derive(Debug, Clone)]
pub struct JsonStateFile {
    path: PathBuf,
}

impl JsonStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonStateFile {
    fn load(&self) -> PersistedState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting flat", self.path.display());
                return PersistedState::default();
            }
            Err(e) => {
                tracing::warn!("Cannot read state file {}: {}, starting flat", self.path.display(), e);
                return PersistedState::default();
            }
        };

        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => {
                let normalized = state.normalized();
                if normalized != state {
                    tracing::warn!(
                        "State file {} held an inconsistent record {:?}, using {:?}",
                        self.path.display(),
                        state,
                        normalized
                    );
                }
                normalized
            }
            Err(e) => {
                tracing::warn!("Corrupt state file {}: {}, starting flat", self.path.display(), e);
                PersistedState::default()
            }
        }
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        let payload = serde_json::to_vec(state)
            .map_err(|e| BotError::Persistence(format!("serialize state: {}", e)))?;
        let tmp = self.temp_path();

        let write_tmp = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
            Ok(())
        };

        write_tmp()
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                BotError::Persistence(format!("write {}: {}", self.path.display(), e))
            })?;

        // The rename itself is only durable once the directory entry is flushed
        sync_parent_dir(&self.path).map_err(|e| {
            BotError::Persistence(format!("sync directory of {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("Persisted state {:?} to {}", state, self.path.display());
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    fs::File::open(parent_dir(path))?.sync_all()
}

// Directories cannot be opened as files here; the rename is the best we get
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
