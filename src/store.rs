//! Persisted user state: per-day completion sets and the last-selected kind
//! filter. One flat JSON document, rewritten after every mutation and loaded
//! once at startup.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    /// Day-key (`YYYY-MM-DD`) → completed entity ids, insertion order kept.
    #[serde(default)]
    completions: HashMap<String, Vec<String>>,
    #[serde(default)]
    kind_filter: Option<String>,
}

pub struct StateStore {
    path: Option<PathBuf>,
    state: PersistedState,
}

impl StateStore {
    /// Load from the platform data directory, starting empty when the file
    /// is missing or unreadable.
    pub fn load_default() -> Self {
        Self::load_from(default_path())
    }

    pub fn load_from(path: Option<PathBuf>) -> Self {
        let state = path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        Self { path, state }
    }

    pub fn completions(&self, day_key: &str) -> HashSet<String> {
        self.state
            .completions
            .get(day_key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Flip completion state for one entity on one day, persist, and return
    /// the updated set.
    pub fn toggle(&mut self, id: &str, day_key: &str) -> Result<HashSet<String>> {
        let ids = self
            .state
            .completions
            .entry(day_key.to_string())
            .or_default();
        if let Some(pos) = ids.iter().position(|existing| existing == id) {
            ids.remove(pos);
        } else {
            ids.push(id.to_string());
        }
        if ids.is_empty() {
            self.state.completions.remove(day_key);
        }
        self.persist()?;
        Ok(self.completions(day_key))
    }

    pub fn kind_filter(&self) -> Option<&str> {
        self.state.kind_filter.as_deref()
    }

    pub fn set_kind_filter(&mut self, value: &str) -> Result<()> {
        self.state.kind_filter = Some(value.to_string());
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("canvas-agenda").join("state.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(dir: &tempfile::TempDir) -> StateStore {
        StateStore::load_from(Some(dir.path().join("state.json")))
    }

    #[test]
    fn toggle_twice_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);

        let before = store.completions("2024-01-15");
        let once = store.toggle("a1", "2024-01-15").unwrap();
        assert!(once.contains("a1"));
        let twice = store.toggle("a1", "2024-01-15").unwrap();
        assert_eq!(before, twice);
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::load_from(Some(path.clone()));
        store.toggle("a1", "2024-01-15").unwrap();
        store.toggle("b2", "2024-01-16").unwrap();
        store.set_kind_filter("assignments").unwrap();

        let reloaded = StateStore::load_from(Some(path));
        assert!(reloaded.completions("2024-01-15").contains("a1"));
        assert!(reloaded.completions("2024-01-16").contains("b2"));
        assert_eq!(reloaded.kind_filter(), Some("assignments"));
    }

    #[test]
    fn days_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);
        store.toggle("a1", "2024-01-15").unwrap();
        assert!(store.completions("2024-01-16").is_empty());
    }
}
