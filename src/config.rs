#![allow(dead_code)]
/// All server tuning constants in one place.

pub const PORT: u16 = 8990;
pub const DEFAULT_GAME_ID: &str = "eldermoor";
pub const STARTING_LOCATION: &str = "village_1";

// Inventory defaults
pub const PLAYER_INVENTORY_SLOTS: usize = 30;
pub const PLAYER_INVENTORY_WEIGHT: f64 = 100.0;
pub const CONTAINER_INVENTORY_SLOTS: usize = 50;
pub const DEFAULT_MAX_STACK: u32 = 99;

// Parser confidence levels
pub const FAST_PATH_CONFIDENCE: f32 = 0.95;
pub const REGEX_CONFIDENCE: f32 = 0.8;
pub const VERB_NOUN_CONFIDENCE: f32 = 0.5;
pub const ENTITY_BOOST: f32 = 0.1;
pub const UNKNOWN_CONFIDENCE: f32 = 0.1;

// Commands below this confidence are handed to the tool router.
pub const ROUTER_THRESHOLD: f32 = 0.6;
pub const ROUTER_DEADLINE_MS: u64 = 5_000;

// Persistence
pub const SAVE_DIR: &str = "game_saves";
pub const AUTO_SAVE_INTERVAL_SECS: u64 = 300;
pub const BACKUP_INTERVAL_SECS: u64 = 3_600;
pub const AUTO_SAVE_CHECK_SECS: u64 = 60;
pub const BACKUP_KEEP_COUNT: usize = 10;
pub const MIN_CHANGES_THRESHOLD: usize = 1;
