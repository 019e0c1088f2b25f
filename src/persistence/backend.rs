//! Storage backends for world state persistence.
//!
//! The default backend writes one JSON file per game under the save
//! directory using a write-temp-then-rename atomic swap. Backups are
//! timestamped copies under `backups/`, trimmed to a retention count after
//! every successful backup.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt save file for game {game_id}: {message}")]
    Corrupt { game_id: String, message: String },
}

/// Pluggable persistence backend.
pub trait StorageBackend: Send + Sync {
    /// Persist a serialized world state blob. The blob is the full
    /// `world_state` document; the backend owns the file envelope.
    fn save_world_state(&self, game_id: &str, world_state: &Value) -> Result<(), StorageError>;

    /// Load a previously saved world state, `None` when no save exists.
    fn load_world_state(&self, game_id: &str) -> Result<Option<Value>, StorageError>;

    /// Delete a save; returns false when there was nothing to delete.
    fn delete_world_state(&self, game_id: &str) -> Result<bool, StorageError>;

    /// All game ids with saved state.
    fn list_saved_states(&self) -> Result<Vec<String>, StorageError>;

    /// Create a timestamped backup; returns false when there is no save
    /// file to back up.
    fn backup_world_state(&self, game_id: &str) -> Result<bool, StorageError>;
}

// ─── JSON file backend ───────────────────────────────────────────────

pub struct JsonStorageBackend {
    storage_dir: PathBuf,
    backup_dir: PathBuf,
    keep_count: usize,
}

impl JsonStorageBackend {
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let backup_dir = storage_dir.join("backups");
        fs::create_dir_all(&storage_dir)?;
        fs::create_dir_all(&backup_dir)?;
        info!("JSON storage backend initialized at {}", storage_dir.display());
        Ok(Self {
            storage_dir,
            backup_dir,
            keep_count: config::BACKUP_KEEP_COUNT,
        })
    }

    pub fn with_keep_count(mut self, keep_count: usize) -> Self {
        self.keep_count = keep_count;
        self
    }

    fn save_path(&self, game_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{game_id}_world_state.json"))
    }

    fn backup_path(&self, game_id: &str, stamp: &str) -> PathBuf {
        self.backup_dir
            .join(format!("{game_id}_world_state_backup_{stamp}.json"))
    }

    /// Delete backups beyond the retention count, oldest first. Returns
    /// how many were removed.
    pub fn cleanup_old_backups(&self, game_id: &str) -> Result<usize, StorageError> {
        let prefix = format!("{game_id}_world_state_backup_");
        let mut backups: Vec<PathBuf> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();

        if backups.len() <= self.keep_count {
            return Ok(0);
        }

        // Timestamped names sort chronologically.
        backups.sort();
        let excess = backups.len() - self.keep_count;
        let mut deleted = 0;
        for path in backups.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to delete old backup {}: {e}", path.display());
            } else {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Cleaned up {deleted} old backups for game {game_id}");
        }
        Ok(deleted)
    }
}

impl StorageBackend for JsonStorageBackend {
    fn save_world_state(&self, game_id: &str, world_state: &Value) -> Result<(), StorageError> {
        let save_path = self.save_path(game_id);

        // Keep a copy of the previous save before replacing it.
        if save_path.exists() {
            self.backup_world_state(game_id)?;
        }

        let document = serde_json::json!({
            "metadata": {
                "game_id": game_id,
                "saved_at": Utc::now().to_rfc3339(),
                "version": "1.0",
            },
            "world_state": world_state,
        });

        let text = serde_json::to_string_pretty(&document).map_err(|e| StorageError::Corrupt {
            game_id: game_id.to_string(),
            message: e.to_string(),
        })?;

        // Write-temp-then-rename keeps the swap atomic.
        let temp_path = save_path.with_extension("tmp");
        fs::write(&temp_path, text)?;
        fs::rename(&temp_path, &save_path)?;

        info!("World state saved for game {game_id}");
        Ok(())
    }

    fn load_world_state(&self, game_id: &str) -> Result<Option<Value>, StorageError> {
        let save_path = self.save_path(game_id);
        if !save_path.exists() {
            info!("No save file found for game {game_id}");
            return Ok(None);
        }

        let text = fs::read_to_string(&save_path)?;
        let document: Value = serde_json::from_str(&text).map_err(|e| StorageError::Corrupt {
            game_id: game_id.to_string(),
            message: e.to_string(),
        })?;

        match document.get("world_state") {
            Some(world_state) => {
                info!("World state loaded for game {game_id}");
                Ok(Some(world_state.clone()))
            }
            None => Err(StorageError::Corrupt {
                game_id: game_id.to_string(),
                message: "missing world_state section".to_string(),
            }),
        }
    }

    fn delete_world_state(&self, game_id: &str) -> Result<bool, StorageError> {
        let save_path = self.save_path(game_id);
        if !save_path.exists() {
            warn!("No save file to delete for game {game_id}");
            return Ok(false);
        }
        fs::remove_file(&save_path)?;
        info!("World state deleted for game {game_id}");
        Ok(true)
    }

    fn list_saved_states(&self) -> Result<Vec<String>, StorageError> {
        let mut game_ids = Vec::new();
        for entry in fs::read_dir(&self.storage_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(game_id) = name.strip_suffix("_world_state.json") {
                    game_ids.push(game_id.to_string());
                }
            }
        }
        game_ids.sort();
        Ok(game_ids)
    }

    fn backup_world_state(&self, game_id: &str) -> Result<bool, StorageError> {
        let save_path = self.save_path(game_id);
        if !save_path.exists() {
            warn!("No save file to backup for game {game_id}");
            return Ok(false);
        }

        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let backup_path = self.backup_path(game_id, &stamp);
        fs::copy(&save_path, &backup_path)?;
        info!("Backup created for game {game_id} at {}", backup_path.display());

        self.cleanup_old_backups(game_id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, JsonStorageBackend) {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = JsonStorageBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    fn sample_state() -> Value {
        serde_json::json!({
            "locations": {},
            "containers": {},
            "player": { "p1": { "player_id": "p1",
                                 "current_location": "village_1",
                                 "inventory": {} } },
        })
    }

    #[test]
    fn save_writes_envelope_and_load_round_trips() {
        let (_dir, backend) = backend();
        backend.save_world_state("test", &sample_state()).unwrap();

        let loaded = backend.load_world_state("test").unwrap().unwrap();
        assert_eq!(loaded, sample_state());
    }

    #[test]
    fn save_file_layout_matches_the_schema() {
        let (dir, backend) = backend();
        backend.save_world_state("mygame", &sample_state()).unwrap();

        let path = dir.path().join("mygame_world_state.json");
        assert!(path.exists());
        let document: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            document["metadata"]["game_id"].as_str(),
            Some("mygame")
        );
        assert!(document["metadata"]["saved_at"].is_string());
        assert!(document["world_state"].is_object());
        // No temp file left behind.
        assert!(!dir.path().join("mygame_world_state.tmp").exists());
    }

    #[test]
    fn load_missing_game_returns_none() {
        let (_dir, backend) = backend();
        assert!(backend.load_world_state("ghost").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let (dir, backend) = backend();
        std::fs::write(dir.path().join("bad_world_state.json"), "{ nope").unwrap();
        assert!(matches!(
            backend.load_world_state("bad"),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn delete_reports_whether_anything_existed() {
        let (_dir, backend) = backend();
        assert!(!backend.delete_world_state("test").unwrap());
        backend.save_world_state("test", &sample_state()).unwrap();
        assert!(backend.delete_world_state("test").unwrap());
        assert!(backend.load_world_state("test").unwrap().is_none());
    }

    #[test]
    fn list_returns_sorted_game_ids() {
        let (_dir, backend) = backend();
        backend.save_world_state("beta", &sample_state()).unwrap();
        backend.save_world_state("alpha", &sample_state()).unwrap();
        assert_eq!(backend.list_saved_states().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn resave_creates_a_backup_of_the_previous_file() {
        let (dir, backend) = backend();
        backend.save_world_state("test", &sample_state()).unwrap();
        backend.save_world_state("test", &sample_state()).unwrap();

        let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().to_string_lossy().to_string();
        assert!(name.starts_with("test_world_state_backup_"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn backup_without_save_reports_false() {
        let (_dir, backend) = backend();
        assert!(!backend.backup_world_state("ghost").unwrap());
    }

    #[test]
    fn retention_trims_oldest_backups() {
        let (dir, backend) = backend();
        let backend = backend.with_keep_count(3);
        backend.save_world_state("test", &sample_state()).unwrap();

        // Fabricate timestamped backups around the retention limit.
        for i in 0..6 {
            let path = dir
                .path()
                .join("backups")
                .join(format!("test_world_state_backup_20250101_00000{i}.json"));
            std::fs::write(path, "{}").unwrap();
        }

        let deleted = backend.cleanup_old_backups("test").unwrap();
        assert_eq!(deleted, 3);

        let remaining: Vec<String> = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining.len(), 3);
        // The oldest fabricated stamps are gone.
        assert!(!remaining.iter().any(|n| n.contains("000000")));
    }
}
