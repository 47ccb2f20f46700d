use std::path::PathBuf;

use async_trait::async_trait;
use cortex_types::refcode::SequenceState;
use tokio::sync::RwLock;

use crate::RefCodeError;

#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn load(&self) -> Result<SequenceState, RefCodeError>;
    async fn save(&self, state: &SequenceState) -> Result<(), RefCodeError>;
}

/// Used by tests and by fully in-process deployments.
#[derive(Default)]
pub struct InMemorySequenceStore {
    state: RwLock<SequenceState>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(state: SequenceState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn load(&self) -> Result<SequenceState, RefCodeError> {
        Ok(*self.state.read().await)
    }

    async fn save(&self, state: &SequenceState) -> Result<(), RefCodeError> {
        *self.state.write().await = *state;
        Ok(())
    }
}

/// Implements §6.2: JSON file at a configured path, self-healing read
/// (missing or malformed content both fall back to the zero state), and a
/// last-write-wins save that creates the parent directory lazily. Grounded
/// on `tandem-core::storage::Storage::new`'s
/// `serde_json::from_str(..).unwrap_or_default()` idiom.
pub struct FileSequenceStore {
    path: PathBuf,
}

impl FileSequenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SequenceStore for FileSequenceStore {
    async fn load(&self) -> Result<SequenceState, RefCodeError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(path = %self.path.display(), %err, "corrupt sequence file, treating as zero state");
                SequenceState::default()
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SequenceState::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, state: &SequenceState) -> Result<(), RefCodeError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn missing_file_is_zero_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSequenceStore::new(dir.path().join("seq.json"));
        assert_eq!(store.load().await.unwrap(), SequenceState::default());
    }

    #[tokio::test]
    async fn corrupt_file_self_heals_to_zero_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.json");
        tokio::fs::write(&path, b"not json at all").await.unwrap();
        let store = FileSequenceStore::new(path);
        assert_eq!(store.load().await.unwrap(), SequenceState::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSequenceStore::new(dir.path().join("nested").join("seq.json"));
        let state = SequenceState {
            date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            sequence: 7,
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), state);
    }
}
