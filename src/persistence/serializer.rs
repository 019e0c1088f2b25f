//! World state section types, serialization, and validation.
//!
//! The on-disk `world_state` document decomposes into `locations{}`,
//! `containers{}`, `player{}` and an opaque `global_state{}` for anything
//! unrecognized, plus serializer metadata. Player sections tolerate an
//! extra `{player_id: playerObj}` nesting layer; `discovered_locations`
//! travels as a sorted list but lives as a set.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

// ─── Section types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationState {
    pub location_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub containers: BTreeMap<String, Value>,
    #[serde(default)]
    pub visited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visited: Option<String>,
    #[serde(default)]
    pub custom_properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    pub container_id: String,
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub container_type: String,
    #[serde(default)]
    pub contents: Vec<Value>,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    #[serde(default)]
    pub custom_properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: String,
    #[serde(default)]
    pub current_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Value>,
    #[serde(default)]
    pub equipped_items: BTreeMap<String, Value>,
    #[serde(default)]
    pub stats: Map<String, Value>,
    #[serde(default)]
    pub discovered_locations: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_save: Option<String>,
    #[serde(default)]
    pub custom_data: Map<String, Value>,
    /// Catch-all so unrecognized player fields survive a round trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// In-memory world state. Sections are optional so the same type carries
/// both full snapshots and partial deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<BTreeMap<String, LocationState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<BTreeMap<String, ContainerState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<BTreeMap<String, PlayerState>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub global_state: Map<String, Value>,
}

impl WorldState {
    /// Section-level merge: sections present in `delta` replace this
    /// state's sections; absent sections are left alone. Global keys merge
    /// per key.
    pub fn merge(&mut self, delta: &WorldState) {
        if let Some(locations) = &delta.locations {
            self.locations = Some(locations.clone());
        }
        if let Some(containers) = &delta.containers {
            self.containers = Some(containers.clone());
        }
        if let Some(player) = &delta.player {
            self.player = Some(player.clone());
        }
        for (key, value) in &delta.global_state {
            self.global_state.insert(key.clone(), value.clone());
        }
    }
}

// ─── Validation ──────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing required section: {0}")]
    MissingSection(&'static str),
    #[error("required section '{0}' is empty")]
    EmptySection(&'static str),
    #[error("missing required player field: {0}")]
    MissingPlayerField(&'static str),
}

// ─── Serializer ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("world state serialization failed: {0}")]
    Encode(String),
    #[error("world state deserialization failed: {0}")]
    Decode(String),
}

#[derive(Default)]
pub struct WorldStateSerializer;

impl WorldStateSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Serialize to the on-disk `world_state` document, adding serializer
    /// metadata. Only sections present in the state are written.
    pub fn serialize(&self, state: &WorldState) -> Result<Value, SerializerError> {
        let mut document = Map::new();
        document.insert(
            "metadata".to_string(),
            serde_json::json!({
                "serialized_at": Utc::now().to_rfc3339(),
                "version": "1.0",
                "serializer": "WorldStateSerializer",
            }),
        );

        let body = serde_json::to_value(state).map_err(|e| SerializerError::Encode(e.to_string()))?;
        if let Value::Object(sections) = body {
            for (key, value) in sections {
                document.insert(key, value);
            }
        }

        info!("World state serialized");
        Ok(Value::Object(document))
    }

    /// Deserialize an on-disk document. A player section shaped as a bare
    /// player object (rather than `{player_id: playerObj}`) is re-nested;
    /// unrecognized top-level keys are preserved under `global_state`.
    pub fn deserialize(&self, data: &Value) -> Result<WorldState, SerializerError> {
        let object = data
            .as_object()
            .ok_or_else(|| SerializerError::Decode("expected an object".to_string()))?;

        let mut state = WorldState::default();

        for (key, value) in object {
            match key.as_str() {
                "metadata" => {}
                "locations" => {
                    state.locations = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|e| SerializerError::Decode(format!("locations: {e}")))?,
                    );
                }
                "containers" => {
                    state.containers = Some(
                        serde_json::from_value(value.clone())
                            .map_err(|e| SerializerError::Decode(format!("containers: {e}")))?,
                    );
                }
                "player" => {
                    state.player = Some(Self::deserialize_player_section(value)?);
                }
                "global_state" => {
                    if let Value::Object(global) = value {
                        for (k, v) in global {
                            state.global_state.insert(k.clone(), v.clone());
                        }
                    }
                }
                other => {
                    // Unknown top-level keys are not dropped.
                    warn!("Preserving unrecognized world state key under global_state: {other}");
                    state.global_state.insert(other.to_string(), value.clone());
                }
            }
        }

        info!("World state deserialized");
        Ok(state)
    }

    fn deserialize_player_section(
        value: &Value,
    ) -> Result<BTreeMap<String, PlayerState>, SerializerError> {
        let object = value
            .as_object()
            .ok_or_else(|| SerializerError::Decode("player section must be an object".to_string()))?;

        // A direct player object carries a string player_id at top level;
        // the canonical form maps player ids to player objects.
        let is_direct = object
            .get("player_id")
            .map(Value::is_string)
            .unwrap_or(false);

        if is_direct {
            let player: PlayerState = serde_json::from_value(value.clone())
                .map_err(|e| SerializerError::Decode(format!("player: {e}")))?;
            let mut section = BTreeMap::new();
            section.insert(player.player_id.clone(), player);
            return Ok(section);
        }

        serde_json::from_value(value.clone())
            .map_err(|e| SerializerError::Decode(format!("player: {e}")))
    }

    /// Validate a state. Partial mode only checks the shape of sections
    /// that are present; full mode requires locations, containers and
    /// player, with player records carrying id, location and inventory.
    pub fn validate(&self, state: &WorldState, partial: bool) -> Result<(), ValidationError> {
        if partial {
            return Ok(());
        }

        let locations = state
            .locations
            .as_ref()
            .ok_or(ValidationError::MissingSection("locations"))?;
        if locations.is_empty() {
            return Err(ValidationError::EmptySection("locations"));
        }

        // Containers must exist but may be empty.
        state
            .containers
            .as_ref()
            .ok_or(ValidationError::MissingSection("containers"))?;

        let players = state
            .player
            .as_ref()
            .ok_or(ValidationError::MissingSection("player"))?;
        if players.is_empty() {
            return Err(ValidationError::EmptySection("player"));
        }

        for player in players.values() {
            if player.player_id.is_empty() {
                return Err(ValidationError::MissingPlayerField("player_id"));
            }
            if player.current_location.is_empty() {
                return Err(ValidationError::MissingPlayerField("current_location"));
            }
            if player.inventory.is_none() {
                return Err(ValidationError::MissingPlayerField("inventory"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_state() -> WorldState {
        let mut locations = BTreeMap::new();
        locations.insert(
            "village_1".to_string(),
            LocationState {
                location_id: "village_1".to_string(),
                name: "Eldermoor Village".to_string(),
                visited: true,
                ..Default::default()
            },
        );

        let mut players = BTreeMap::new();
        let mut player = PlayerState {
            player_id: "player_1".to_string(),
            current_location: "village_1".to_string(),
            inventory: Some(serde_json::json!({ "slots": [] })),
            ..Default::default()
        };
        player.discovered_locations.insert("village_1".to_string());
        players.insert("player_1".to_string(), player);

        WorldState {
            locations: Some(locations),
            containers: Some(BTreeMap::new()),
            player: Some(players),
            global_state: Map::new(),
        }
    }

    #[test]
    fn serialize_adds_metadata_and_sections() {
        let serializer = WorldStateSerializer::new();
        let document = serializer.serialize(&full_state()).unwrap();

        assert_eq!(
            document["metadata"]["serializer"].as_str(),
            Some("WorldStateSerializer")
        );
        assert!(document["locations"]["village_1"].is_object());
        assert!(document["player"]["player_1"].is_object());
    }

    #[test]
    fn round_trip_preserves_state() {
        let serializer = WorldStateSerializer::new();
        let state = full_state();
        let document = serializer.serialize(&state).unwrap();
        let restored = serializer.deserialize(&document).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn discovered_locations_travel_as_sorted_list() {
        let serializer = WorldStateSerializer::new();
        let mut state = full_state();
        let player = state
            .player
            .as_mut()
            .unwrap()
            .get_mut("player_1")
            .unwrap();
        player.discovered_locations.insert("cave_9".to_string());
        player.discovered_locations.insert("alpha_1".to_string());

        let document = serializer.serialize(&state).unwrap();
        let list = document["player"]["player_1"]["discovered_locations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        let mut sorted = list.clone();
        sorted.sort();
        assert_eq!(list, sorted);

        let restored = serializer.deserialize(&document).unwrap();
        let back = &restored.player.unwrap()["player_1"].discovered_locations;
        assert!(back.contains("cave_9"));
        assert!(back.contains("alpha_1"));
    }

    #[test]
    fn nested_player_layer_is_accepted() {
        let serializer = WorldStateSerializer::new();
        // A bare player object instead of {player_id: playerObj}.
        let document = serde_json::json!({
            "locations": { "v": { "location_id": "v" } },
            "containers": {},
            "player": {
                "player_id": "hero",
                "current_location": "v",
                "inventory": { "slots": [] },
            },
        });

        let state = serializer.deserialize(&document).unwrap();
        let players = state.player.unwrap();
        assert!(players.contains_key("hero"));
        assert_eq!(players["hero"].current_location, "v");
    }

    #[test]
    fn unknown_top_level_keys_survive_under_global_state() {
        let serializer = WorldStateSerializer::new();
        let document = serde_json::json!({
            "locations": { "v": { "location_id": "v" } },
            "containers": {},
            "player": { "p": { "player_id": "p",
                                "current_location": "v",
                                "inventory": {} } },
            "weather_system": { "season": "autumn" },
        });

        let state = serializer.deserialize(&document).unwrap();
        assert_eq!(
            state.global_state["weather_system"]["season"].as_str(),
            Some("autumn")
        );

        // And back out again on the next serialize.
        let redocument = serializer.serialize(&state).unwrap();
        assert_eq!(
            redocument["global_state"]["weather_system"]["season"].as_str(),
            Some("autumn")
        );
    }

    #[test]
    fn unknown_player_fields_survive_round_trips() {
        let serializer = WorldStateSerializer::new();
        let document = serde_json::json!({
            "player": { "p": { "player_id": "p",
                                "current_location": "v",
                                "inventory": {},
                                "favorite_color": "teal" } },
        });
        let state = serializer.deserialize(&document).unwrap();
        let redocument = serializer.serialize(&state).unwrap();
        assert_eq!(
            redocument["player"]["p"]["favorite_color"].as_str(),
            Some("teal")
        );
    }

    #[test]
    fn full_validation_requires_all_sections() {
        let serializer = WorldStateSerializer::new();
        assert!(serializer.validate(&full_state(), false).is_ok());

        let mut missing = full_state();
        missing.containers = None;
        assert_eq!(
            serializer.validate(&missing, false),
            Err(ValidationError::MissingSection("containers"))
        );

        let mut empty = full_state();
        empty.locations = Some(BTreeMap::new());
        assert_eq!(
            serializer.validate(&empty, false),
            Err(ValidationError::EmptySection("locations"))
        );
    }

    #[test]
    fn full_validation_checks_player_fields() {
        let serializer = WorldStateSerializer::new();
        let mut state = full_state();
        state
            .player
            .as_mut()
            .unwrap()
            .get_mut("player_1")
            .unwrap()
            .inventory = None;
        assert_eq!(
            serializer.validate(&state, false),
            Err(ValidationError::MissingPlayerField("inventory"))
        );
    }

    #[test]
    fn partial_validation_accepts_single_sections() {
        let serializer = WorldStateSerializer::new();
        let partial = WorldState {
            player: full_state().player,
            ..Default::default()
        };
        assert!(serializer.validate(&partial, true).is_ok());
        // The same state fails full validation.
        assert!(serializer.validate(&partial, false).is_err());
    }

    #[test]
    fn merge_replaces_present_sections_only() {
        let mut base = full_state();
        let delta = WorldState {
            player: {
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
                players
            }
            .into(),
            ..Default::default()
        };

        base.merge(&delta);
        assert_eq!(
            base.player.as_ref().unwrap()["player_1"].current_location,
            "ruin_1"
        );
        // Locations untouched by the delta.
        assert!(base.locations.as_ref().unwrap().contains_key("village_1"));
    }

    #[test]
    fn containers_may_be_empty_but_must_exist() {
        let serializer = WorldStateSerializer::new();
        let state = full_state();
        assert!(state.containers.as_ref().unwrap().is_empty());
        assert!(serializer.validate(&state, false).is_ok());
    }
}
