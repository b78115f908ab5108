use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::state::State;

/// The single fixed key the whole state blob lives under.
pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug)]
pub struct StateFile {
    pub data_dir: PathBuf,
    pub path: PathBuf,
}

impl StateFile {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = data_dir.join(STATE_FILE_NAME);
        info!(data_dir = %data_dir.display(), state = %path.display(), "opened state file");

        Ok(Self { data_dir, path })
    }

    /// Loads the persisted state. A missing blob, an unreadable blob, or
    /// a structurally invalid one all come back as the empty default;
    /// decode trouble is diagnostics, never a failure.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> State {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(file = %self.path.display(), error = %err, "no prior state");
                return State::default();
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "malformed state blob; starting empty");
                return State::default();
            }
        };

        if !value.is_object() {
            warn!(file = %self.path.display(), "state blob is not an object; starting empty");
            return State::default();
        }

        match serde_json::from_value::<State>(value) {
            Ok(state) => {
                debug!(
                    tasks = state.tasks.len(),
                    projects = state.projects.len(),
                    "loaded state"
                );
                state
            }
            Err(err) => {
                warn!(file = %self.path.display(), error = %err, "undecodable state blob; starting empty");
                State::default()
            }
        }
    }

    /// Serializes the full aggregate and replaces the blob in one write.
    #[tracing::instrument(skip(self, state))]
    pub fn save(&self, state: &State) -> anyhow::Result<()> {
        debug!(
            file = %self.path.display(),
            tasks = state.tasks.len(),
            projects = state.projects.len(),
            "saving state"
        );

        let serialized =
            serde_json::to_string(state).context("failed to serialize state")?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;

        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;

        Ok(())
    }
}
