//! Runtime player record.
//!
//! The live view of a player inside the engine; the persistence-facing
//! shape lives in `persistence::serializer::PlayerState` and is assembled
//! from this record plus the player's inventory and equipment.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

pub struct Player {
    pub player_id: String,
    pub current_location: String,
    pub discovered_locations: BTreeSet<String>,
    pub stats: Map<String, Value>,
    pub custom_data: Map<String, Value>,
}

impl Player {
    pub fn new(player_id: &str, location: &str) -> Self {
        let mut discovered = BTreeSet::new();
        discovered.insert(location.to_string());
        Self {
            player_id: player_id.to_string(),
            current_location: location.to_string(),
            discovered_locations: discovered,
            stats: Map::new(),
            custom_data: Map::new(),
        }
    }

    /// Move to a location, recording it as discovered.
    pub fn move_to(&mut self, location: &str) {
        self.current_location = location.to_string();
        self.discovered_locations.insert(location.to_string());
    }

    /// Numeric stat lookup with a default, e.g. search skill.
    pub fn stat_i64(&self, key: &str, default: i64) -> i64 {
        self.stats.get(key).and_then(Value::as_i64).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_discovers_the_starting_location() {
        let player = Player::new("player_1", "village_1");
        assert_eq!(player.current_location, "village_1");
        assert!(player.discovered_locations.contains("village_1"));
    }

    #[test]
    fn move_to_accumulates_discovered_locations() {
        let mut player = Player::new("player_1", "village_1");
        player.move_to("ruin_1");
        player.move_to("village_1");
        assert_eq!(player.current_location, "village_1");
        assert_eq!(player.discovered_locations.len(), 2);
    }

    #[test]
    fn stats_fall_back_to_defaults() {
        let mut player = Player::new("player_1", "village_1");
        assert_eq!(player.stat_i64("search_skill", 0), 0);
        player
            .stats
            .insert("search_skill".to_string(), Value::from(15));
        assert_eq!(player.stat_i64("search_skill", 0), 15);
    }
}
