use anyhow::{Context, Result};
use satlight_common::PersistedState;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::types::Satellite;

/// Durable home of the satellite table: a single JSON file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the next snapshot is written to before being renamed into place
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "satellite_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load `count` satellites from disk.
    ///
    /// Never fails: a missing file logs at info, an unreadable or malformed one
    /// logs a warning, and both fall back to a fresh table.
    pub async fn load(&self, count: usize) -> Vec<Satellite> {
        if !self.path.exists() {
            info!(
                "State file {:?} does not exist, starting with {} fresh satellites",
                self.path, count
            );
            return fresh(count);
        }

        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read state file {:?}: {}, starting fresh", self.path, e);
                return fresh(count);
            }
        };

        match decode(&content, count) {
            Ok(satellites) => {
                info!(
                    "Loaded state for {} satellites from {:?}",
                    satellites.len(),
                    self.path
                );
                satellites
            }
            Err(e) => {
                warn!("State file {:?} is corrupt: {:#}, starting fresh", self.path, e);
                fresh(count)
            }
        }
    }

    /// Write the table, replacing the previous file only once the new one is complete.
    pub async fn save(&self, satellites: &[Satellite]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .context(format!("Failed to create state directory: {:?}", parent))?;
            }
        }

        let content = encode(satellites)?;
        let temp_path = self.temp_path();

        fs::write(&temp_path, content)
            .await
            .context(format!("Failed to write temporary state file: {:?}", temp_path))?;
        fs::rename(&temp_path, &self.path)
            .await
            .context(format!("Failed to replace state file: {:?}", self.path))?;

        debug!("Saved state for {} satellites to {:?}", satellites.len(), self.path);
        Ok(())
    }
}

fn fresh(count: usize) -> Vec<Satellite> {
    vec![Satellite::default(); count]
}

fn encode(satellites: &[Satellite]) -> Result<String> {
    let state = PersistedState {
        satellite_states: satellites.iter().map(Satellite::to_persisted).collect(),
    };
    serde_json::to_string_pretty(&state).context("Failed to serialize satellite state")
}

/// Decode a state file, resizing it to `count` satellites.
fn decode(content: &str, count: usize) -> Result<Vec<Satellite>> {
    let state: PersistedState =
        serde_json::from_str(content).context("Failed to parse state file")?;

    let stored = state.satellite_states.len();
    if stored > count {
        warn!(
            "State file holds {} satellites but only {} are configured, dropping the rest",
            stored, count
        );
    }

    let mut satellites = state
        .satellite_states
        .iter()
        .take(count)
        .enumerate()
        .map(|(index, persisted)| {
            Satellite::from_persisted(persisted)
                .with_context(|| format!("Invalid entry for satellite {}", index))
        })
        .collect::<Result<Vec<_>>>()?;

    if satellites.len() < count {
        debug!(
            "State file holds {} satellites, padding to {}",
            satellites.len(),
            count
        );
        satellites.resize(count, Satellite::default());
    }

    Ok(satellites)
}
