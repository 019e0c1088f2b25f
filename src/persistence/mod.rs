//! World state persistence: sessions, dirty tracking, auto-save, backups.
//!
//! The manager coordinates a pluggable storage backend and the world state
//! serializer. Facade mutations mark per-section dirty flags through bus
//! handlers; the auto-save loop polls `should_auto_save` and performs
//! partial saves merged over the last cached snapshot. Backups run on
//! their own interval.

pub mod backend;
pub mod serializer;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::events::{EventBus, EventType};
use crate::persistence::backend::{StorageBackend, StorageError};
use crate::persistence::serializer::{
    SerializerError, ValidationError, WorldState, WorldStateSerializer,
};

// ─── Dirty tracking ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtySection {
    Locations,
    Containers,
    Player,
    Global,
}

#[derive(Debug, Default, Clone)]
pub struct DirtyFlags {
    pub locations: bool,
    pub containers: bool,
    pub player: bool,
    pub global: bool,
}

impl DirtyFlags {
    pub fn mark(&mut self, section: DirtySection) {
        match section {
            DirtySection::Locations => self.locations = true,
            DirtySection::Containers => self.containers = true,
            DirtySection::Player => self.player = true,
            DirtySection::Global => self.global = true,
        }
    }

    pub fn any(&self) -> bool {
        self.locations || self.containers || self.player || self.global
    }

    pub fn count(&self) -> usize {
        [self.locations, self.containers, self.player, self.global]
            .iter()
            .filter(|f| **f)
            .count()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─── Errors and info ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no active persistence session")]
    NoActiveSession,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Serializer(#[from] SerializerError),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SaveInfo {
    pub game_id: String,
    pub has_save: bool,
    pub last_saved: Option<String>,
    pub version: Option<String>,
    pub serializer: Option<String>,
}

// ─── Manager ─────────────────────────────────────────────────────────

pub struct WorldStatePersistence {
    backend: Box<dyn StorageBackend>,
    serializer: WorldStateSerializer,

    auto_save_enabled: bool,
    auto_save_interval: Duration,
    backup_interval: Duration,
    min_changes_threshold: usize,

    current_game_id: Option<String>,
    last_save_time: Option<Instant>,
    last_backup_time: Option<Instant>,
    dirty: Arc<Mutex<DirtyFlags>>,
    cached_state: Option<WorldState>,
}

impl WorldStatePersistence {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        info!("World state persistence manager initialized");
        Self {
            backend,
            serializer: WorldStateSerializer::new(),
            auto_save_enabled: true,
            auto_save_interval: Duration::from_secs(config::AUTO_SAVE_INTERVAL_SECS),
            backup_interval: Duration::from_secs(config::BACKUP_INTERVAL_SECS),
            min_changes_threshold: config::MIN_CHANGES_THRESHOLD,
            current_game_id: None,
            last_save_time: None,
            last_backup_time: None,
            dirty: Arc::new(Mutex::new(DirtyFlags::default())),
            cached_state: None,
        }
    }

    #[allow(dead_code)]
    pub fn configure_auto_save(
        &mut self,
        enabled: bool,
        interval: Duration,
        backup_interval: Duration,
        min_changes_threshold: usize,
    ) {
        self.auto_save_enabled = enabled;
        self.auto_save_interval = interval;
        self.backup_interval = backup_interval;
        self.min_changes_threshold = min_changes_threshold;
        info!(
            "Auto-save configured: enabled={enabled}, interval={}s, backup_interval={}s, threshold={min_changes_threshold}",
            interval.as_secs(),
            backup_interval.as_secs()
        );
    }

    // ─── Session lifecycle ───────────────────────────────────────

    pub fn start_session(&mut self, game_id: &str) {
        self.current_game_id = Some(game_id.to_string());
        self.dirty.lock().expect("dirty lock").reset();
        self.cached_state = None;
        info!("Started persistence session for game {game_id}");
    }

    #[allow(dead_code)]
    pub fn end_session(&mut self) {
        self.current_game_id = None;
        self.dirty.lock().expect("dirty lock").reset();
        info!("Persistence session ended");
    }

    #[allow(dead_code)]
    pub fn session_game_id(&self) -> Option<&str> {
        self.current_game_id.as_deref()
    }

    /// Shared handle for bus handlers that mark sections dirty.
    pub fn dirty_handle(&self) -> Arc<Mutex<DirtyFlags>> {
        Arc::clone(&self.dirty)
    }

    pub fn mark_dirty(&self, section: DirtySection) {
        self.dirty.lock().expect("dirty lock").mark(section);
        debug!("Marked {section:?} as dirty");
    }

    pub fn is_save_needed(&self) -> bool {
        self.dirty.lock().expect("dirty lock").any()
    }

    /// Subscribe dirty-flag handlers for every mutation event the facade
    /// and the container system emit.
    pub fn wire_bus(&self, bus: &mut EventBus) {
        let sections: &[(EventType, &[DirtySection])] = &[
            (EventType::ItemTaken, &[DirtySection::Player, DirtySection::Containers]),
            (EventType::ItemDropped, &[DirtySection::Player, DirtySection::Containers]),
            (EventType::ItemUsed, &[DirtySection::Player]),
            (EventType::ItemGiven, &[DirtySection::Player]),
            (EventType::EquipmentChange, &[DirtySection::Player]),
            (EventType::InventoryChange, &[DirtySection::Player]),
            (EventType::ContainerUnlocked, &[DirtySection::Containers]),
            (EventType::ContainerItemAdded, &[DirtySection::Containers]),
            (EventType::ContainerItemRemoved, &[DirtySection::Containers]),
            (EventType::LocationChange, &[DirtySection::Locations, DirtySection::Player]),
            (EventType::WorldStateChange, &[DirtySection::Global]),
        ];

        for (event_type, marked) in sections {
            let dirty = self.dirty_handle();
            let marked: Vec<DirtySection> = marked.to_vec();
            bus.subscribe(
                *event_type,
                Box::new(move |_| {
                    let mut flags = match dirty.lock() {
                        Ok(flags) => flags,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    for section in &marked {
                        flags.mark(*section);
                    }
                }),
            );
        }
    }

    // ─── Save / load ─────────────────────────────────────────────

    /// Save the world state. Partial saves validate only what is present
    /// and merge over the last cached snapshot; full saves require every
    /// section. Storage failures are retried once, then surfaced.
    pub fn save_world_state(
        &mut self,
        state: &WorldState,
        force: bool,
        partial: bool,
    ) -> Result<bool, PersistenceError> {
        let game_id = self
            .current_game_id
            .clone()
            .ok_or(PersistenceError::NoActiveSession)?;

        if !force && !self.is_save_needed() {
            debug!("No changes detected, skipping save");
            return Ok(false);
        }

        self.serializer.validate(state, partial)?;

        let final_state = if partial {
            match &self.cached_state {
                Some(cached) => {
                    let mut merged = cached.clone();
                    merged.merge(state);
                    debug!("Merged partial world state with cached snapshot");
                    merged
                }
                None => state.clone(),
            }
        } else {
            state.clone()
        };

        let blob = self.serializer.serialize(&final_state)?;

        if let Err(first) = self.backend.save_world_state(&game_id, &blob) {
            warn!("Save failed for game {game_id}, retrying once: {first}");
            self.backend.save_world_state(&game_id, &blob)?;
        }

        self.cached_state = Some(final_state);
        self.last_save_time = Some(Instant::now());
        self.dirty.lock().expect("dirty lock").reset();
        info!("World state saved for game {game_id}");
        Ok(true)
    }

    /// Load a game's world state; `None` when nothing is saved. Reads are
    /// retried once on storage errors, and the loaded state is validated
    /// in full mode and cached.
    pub fn load_world_state(
        &mut self,
        game_id: Option<&str>,
    ) -> Result<Option<WorldState>, PersistenceError> {
        let game_id = game_id
            .map(str::to_string)
            .or_else(|| self.current_game_id.clone())
            .ok_or(PersistenceError::NoActiveSession)?;

        let blob = match self.backend.load_world_state(&game_id) {
            Ok(blob) => blob,
            Err(first) => {
                warn!("Load failed for game {game_id}, retrying once: {first}");
                self.backend.load_world_state(&game_id)?
            }
        };

        let blob = match blob {
            Some(blob) => blob,
            None => return Ok(None),
        };

        let state = self.serializer.deserialize(&blob)?;
        self.serializer.validate(&state, false)?;

        self.cached_state = Some(state.clone());
        info!("World state loaded for game {game_id}");
        Ok(Some(state))
    }

    /// Refresh the cached snapshot used as the base for partial saves.
    #[allow(dead_code)]
    pub fn update_cached_state(&mut self, state: WorldState) {
        self.cached_state = Some(state);
    }

    #[allow(dead_code)]
    pub fn cached_state(&self) -> Option<&WorldState> {
        self.cached_state.as_ref()
    }

    // ─── Backups ─────────────────────────────────────────────────

    pub fn create_backup(&mut self) -> Result<bool, PersistenceError> {
        let game_id = self
            .current_game_id
            .clone()
            .ok_or(PersistenceError::NoActiveSession)?;
        let created = self.backend.backup_world_state(&game_id)?;
        if created {
            self.last_backup_time = Some(Instant::now());
            info!("Backup created for game {game_id}");
        }
        Ok(created)
    }

    // ─── Auto-save policy ────────────────────────────────────────

    /// Auto-save gate: enabled, active session, something dirty, and
    /// either no prior save, the interval elapsed, or the dirty count at
    /// threshold.
    pub fn should_auto_save(&self) -> (bool, String) {
        if !self.auto_save_enabled {
            return (false, "Auto-save disabled".to_string());
        }
        if self.current_game_id.is_none() {
            return (false, "No active session".to_string());
        }

        let flags = self.dirty.lock().expect("dirty lock").clone();
        if !flags.any() {
            return (false, "No changes detected".to_string());
        }

        match self.last_save_time {
            None => (true, "First save with changes detected".to_string()),
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= self.auto_save_interval {
                    (
                        true,
                        format!(
                            "Time interval reached ({:.1}s >= {}s)",
                            elapsed.as_secs_f64(),
                            self.auto_save_interval.as_secs()
                        ),
                    )
                } else if flags.count() >= self.min_changes_threshold {
                    (
                        true,
                        format!(
                            "Change threshold met ({} >= {})",
                            flags.count(),
                            self.min_changes_threshold
                        ),
                    )
                } else {
                    (false, "Conditions not met".to_string())
                }
            }
        }
    }

    /// Backup gate: active session and either the backup interval elapsed
    /// or a save exists with no backup yet.
    pub fn should_backup(&self) -> (bool, String) {
        if self.current_game_id.is_none() {
            return (false, "No active session".to_string());
        }

        match self.last_backup_time {
            Some(last) => {
                let elapsed = last.elapsed();
                if elapsed >= self.backup_interval {
                    (
                        true,
                        format!(
                            "Backup interval reached ({:.1}s >= {}s)",
                            elapsed.as_secs_f64(),
                            self.backup_interval.as_secs()
                        ),
                    )
                } else {
                    (false, "Backup interval not reached".to_string())
                }
            }
            None => {
                if self.last_save_time.is_some() {
                    (true, "First backup after initial save".to_string())
                } else {
                    (false, "Nothing saved yet".to_string())
                }
            }
        }
    }

    /// One auto-save evaluation: partial-save when the gate opens, then an
    /// independent backup check. Returns whether a save was performed.
    /// Idempotent on clean state.
    pub fn auto_save_check(&mut self, state: &WorldState) -> bool {
        let (should_save, save_reason) = self.should_auto_save();
        let mut saved = false;

        if should_save {
            info!("Triggering auto-save: {save_reason}");
            match self.save_world_state(state, false, true) {
                Ok(performed) => {
                    saved = performed;
                    if performed {
                        info!("Auto-save completed successfully");
                    }
                }
                Err(e) => error!("Auto-save failed: {e}"),
            }
        }

        let (should_backup, backup_reason) = self.should_backup();
        if should_backup {
            info!("Triggering backup: {backup_reason}");
            match self.create_backup() {
                Ok(true) => info!("Backup completed successfully"),
                Ok(false) => warn!("Backup skipped: nothing to back up"),
                Err(e) => error!("Backup failed: {e}"),
            }
        }

        saved
    }

    // ─── Save metadata queries ───────────────────────────────────

    pub fn save_info(&self, game_id: &str) -> Option<SaveInfo> {
        let blob = self.backend.load_world_state(game_id).ok()??;
        let metadata = blob.get("metadata");
        let field = |key: &str| {
            metadata
                .and_then(|m| m.get(key))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Some(SaveInfo {
            game_id: game_id.to_string(),
            has_save: true,
            last_saved: field("serialized_at"),
            version: field("version"),
            serializer: field("serializer"),
        })
    }

    pub fn list_saved_games(&self) -> Vec<SaveInfo> {
        match self.backend.list_saved_states() {
            Ok(game_ids) => game_ids
                .iter()
                .filter_map(|id| self.save_info(id))
                .collect(),
            Err(e) => {
                error!("Failed to list saved games: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Map;

    use super::backend::JsonStorageBackend;
    use super::serializer::{LocationState, PlayerState};
    use super::*;
    use crate::events::SourceSystem;

    fn manager() -> (tempfile::TempDir, WorldStatePersistence) {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = JsonStorageBackend::new(dir.path()).unwrap();
        let mut manager = WorldStatePersistence::new(Box::new(backend));
        manager.start_session("testgame");
        (dir, manager)
    }

    fn full_state() -> WorldState {
        let mut locations = BTreeMap::new();
        locations.insert(
            "village_1".to_string(),
            LocationState {
                location_id: "village_1".to_string(),
                name: "Eldermoor Village".to_string(),
                ..Default::default()
            },
        );
        let mut players = BTreeMap::new();
        players.insert(
            "player_1".to_string(),
            PlayerState {
                player_id: "player_1".to_string(),
                current_location: "village_1".to_string(),
                inventory: Some(serde_json::json!({ "slots": [] })),
                ..Default::default()
            },
        );
        WorldState {
            locations: Some(locations),
            containers: Some(BTreeMap::new()),
            player: Some(players),
            global_state: Map::new(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let (_dir, mut manager) = manager();
        let state = full_state();
        assert!(manager.save_world_state(&state, true, false).unwrap());

        let loaded = manager.load_world_state(Some("testgame")).unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_without_session_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = JsonStorageBackend::new(dir.path()).unwrap();
        let mut manager = WorldStatePersistence::new(Box::new(backend));
        assert!(matches!(
            manager.save_world_state(&full_state(), true, false),
            Err(PersistenceError::NoActiveSession)
        ));
    }

    #[test]
    fn unforced_save_skips_when_clean() {
        let (_dir, mut manager) = manager();
        assert!(!manager.save_world_state(&full_state(), false, false).unwrap());
    }

    #[test]
    fn partial_save_merges_with_cached_snapshot() {
        // Full save, mutate only the player location, partial-save just
        // the player section: reload sees the move and nothing else lost.
        let (_dir, mut manager) = manager();
        let state = full_state();
        manager.save_world_state(&state, true, false).unwrap();

        let mut players = BTreeMap::new();
        players.insert(
            "player_1".to_string(),
            PlayerState {
                player_id: "player_1".to_string(),
                current_location: "ruin_1".to_string(),
                inventory: Some(serde_json::json!({ "slots": [] })),
                ..Default::default()
            },
        );
        let delta = WorldState {
            player: Some(players),
            ..Default::default()
        };

        manager.save_world_state(&delta, true, true).unwrap();

        let loaded = manager.load_world_state(Some("testgame")).unwrap().unwrap();
        assert_eq!(
            loaded.player.as_ref().unwrap()["player_1"].current_location,
            "ruin_1"
        );
        // The locations section from the full save is still there.
        assert!(loaded
            .locations
            .as_ref()
            .unwrap()
            .contains_key("village_1"));
    }

    #[test]
    fn full_save_rejects_partial_state() {
        let (_dir, mut manager) = manager();
        let delta = WorldState {
            player: full_state().player,
            ..Default::default()
        };
        assert!(matches!(
            manager.save_world_state(&delta, true, false),
            Err(PersistenceError::Validation(_))
        ));
    }

    #[test]
    fn dirty_flags_gate_auto_save() {
        let (_dir, mut manager) = manager();
        let (should, reason) = manager.should_auto_save();
        assert!(!should, "{reason}");

        manager.mark_dirty(DirtySection::Player);
        let (should, _) = manager.should_auto_save();
        assert!(should);

        // A save resets the flags.
        manager
            .save_world_state(&full_state(), true, false)
            .unwrap();
        assert!(!manager.is_save_needed());
    }

    #[test]
    fn bus_events_mark_matching_sections() {
        let (_dir, manager) = manager();
        let mut bus = EventBus::new();
        manager.wire_bus(&mut bus);

        bus.emit(EventType::EquipmentChange, SourceSystem::Inventory, Map::new());
        {
            let flags = manager.dirty_handle();
            let flags = flags.lock().unwrap();
            assert!(flags.player);
            assert!(!flags.containers);
        }

        bus.emit(
            EventType::ContainerUnlocked,
            SourceSystem::Containers,
            Map::new(),
        );
        {
            let flags = manager.dirty_handle();
            let flags = flags.lock().unwrap();
            assert!(flags.containers);
        }

        bus.emit(EventType::LocationChange, SourceSystem::Engine, Map::new());
        {
            let flags = manager.dirty_handle();
            let flags = flags.lock().unwrap();
            assert!(flags.locations);
        }
    }

    #[test]
    fn auto_save_check_is_idempotent_on_clean_state() {
        let (_dir, mut manager) = manager();
        let state = full_state();
        manager.save_world_state(&state, true, false).unwrap();

        // Nothing dirty: no save happens, no error either.
        assert!(!manager.auto_save_check(&state));
        assert!(!manager.auto_save_check(&state));
    }

    #[test]
    fn auto_save_performs_partial_save_when_dirty() {
        let (_dir, mut manager) = manager();
        let state = full_state();
        manager.save_world_state(&state, true, false).unwrap();

        manager.mark_dirty(DirtySection::Player);
        assert!(manager.auto_save_check(&state));
        assert!(!manager.is_save_needed());
    }

    #[test]
    fn save_info_reads_backend_metadata() {
        let (_dir, mut manager) = manager();
        manager
            .save_world_state(&full_state(), true, false)
            .unwrap();

        let info = manager.save_info("testgame").unwrap();
        assert!(info.has_save);
        assert_eq!(info.serializer.as_deref(), Some("WorldStateSerializer"));
        assert_eq!(manager.list_saved_games().len(), 1);
    }
}
