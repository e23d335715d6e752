//! Single-slot persistence for the in-flight session.
//!
//! One session per device: saving always overwrites the slot, whatever
//! workout it previously held. `load` only hands back a slot whose workout id
//! matches the one being started; anything else is stale and ignored.

use crate::{Error, Result, SessionState};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Durable store for the one live session
pub trait SessionStore {
    /// Saved session for `workout_id`, if the slot holds one
    fn load(&self, workout_id: &str) -> Result<Option<SessionState>>;

    /// Overwrite the slot
    fn save(&mut self, state: &SessionState) -> Result<()>;

    /// Empty the slot
    fn clear(&mut self) -> Result<()>;
}

/// JSON file holding the session slot
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whatever the slot holds, regardless of workout id
    ///
    /// A missing or corrupted file reads as empty.
    pub fn peek(&self) -> Result<Option<SessionState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        match serde_json::from_str::<SessionState>(&contents) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse session slot {:?}: {}. Treating as empty.",
                    self.path,
                    e
                );
                Ok(None)
            }
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, workout_id: &str) -> Result<Option<SessionState>> {
        match self.peek()? {
            Some(state) if state.workout_id == workout_id => {
                tracing::debug!("Loaded session slot for {} from {:?}", workout_id, self.path);
                Ok(Some(state))
            }
            Some(state) => {
                tracing::debug!(
                    "Session slot holds {}, not {}; ignoring",
                    state.workout_id,
                    workout_id
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Atomically writes the slot by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    fn save(&mut self, state: &SessionState) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "session path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(state)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(
            "Saved session slot for {} ({} sets) to {:?}",
            state.workout_id,
            state.sets.len(),
            self.path
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Cleared session slot {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory slot, used by tests and callers that need no durability
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    pub slot: Option<SessionState>,
    /// Make every `save` fail, to exercise best-effort persistence
    pub fail_saves: bool,
    pub saves: usize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(state: SessionState) -> Self {
        Self {
            slot: Some(state),
            ..Self::default()
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, workout_id: &str) -> Result<Option<SessionState>> {
        Ok(self
            .slot
            .as_ref()
            .filter(|s| s.workout_id == workout_id)
            .cloned())
    }

    fn save(&mut self, state: &SessionState) -> Result<()> {
        if self.fail_saves {
            return Err(Error::Other("session store unavailable".into()));
        }
        self.slot = Some(state.clone());
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.slot = None;
        Ok(())
    }
}
