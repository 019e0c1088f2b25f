//! Command envelope shared by the parser, the game facade, and the wire.
//!
//! Every command — whether it arrived as a structured `CommandIn` or was
//! parsed out of raw text — produces exactly one `CommandOut`. Failures are
//! values carried in the envelope, never errors crossing the boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Machine-readable failure reasons carried in `CommandOut.data["reason"]`.
/// Constants rather than an enum so downstream layers can match on strings.
#[allow(dead_code)]
pub mod reason {
    pub const NO_VALID_SLOTS: &str = "no_valid_slots";
    pub const INVENTORY_FULL: &str = "inventory_full";
    pub const INVENTORY_ADD_FAILED: &str = "inventory_add_failed";
    pub const INVENTORY_REMOVAL_FAILED: &str = "inventory_removal_failed";
    pub const MISSING_PARAMETERS: &str = "missing_parameters";
    pub const MISSING_ITEM_DATA: &str = "missing_item_data";
    pub const UNEQUIP_FAILED: &str = "unequip_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const NOT_OWNED: &str = "not_owned";
    pub const CAPACITY_EXCEEDED: &str = "capacity_exceeded";
    pub const SLOT_CONFLICT: &str = "slot_conflict";
    pub const LOCKED: &str = "locked";
    pub const HIDDEN: &str = "hidden";
    pub const VALIDATION: &str = "validation";
    pub const PERSISTENCE: &str = "persistence";
    pub const LLM_UNAVAILABLE: &str = "llm_unavailable";
}

/// Commands the inventory facade dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Take,
    Drop,
    Use,
    InventoryView,
    Give,
    Equip,
    Unequip,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Take => "TAKE",
            Self::Drop => "DROP",
            Self::Use => "USE",
            Self::InventoryView => "INVENTORY_VIEW",
            Self::Give => "GIVE",
            Self::Equip => "EQUIP",
            Self::Unequip => "UNEQUIP",
        }
    }
}

/// Parsed command details. All fields optional; `quantity` defaults to 1.
/// Both `item_name_or_id`/`item_name` and `slot`/`slot_name` are accepted
/// because different upstream layers use either spelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name_or_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl Default for CommandDetails {
    fn default() -> Self {
        Self {
            item_name_or_id: None,
            item_name: None,
            quantity: 1,
            slot: None,
            slot_name: None,
            container_id: None,
            target: None,
            receiver_id: None,
        }
    }
}

impl CommandDetails {
    pub fn item(name: impl Into<String>) -> Self {
        Self {
            item_name_or_id: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn item_qty(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_name_or_id: Some(name.into()),
            quantity,
            ..Self::default()
        }
    }

    /// First of `item_name_or_id`/`item_name` that is non-empty.
    pub fn item_ref(&self) -> Option<&str> {
        self.item_name_or_id
            .as_deref()
            .or(self.item_name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// First of `slot`/`slot_name` that is non-empty.
    pub fn slot_ref(&self) -> Option<&str> {
        self.slot
            .as_deref()
            .or(self.slot_name.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Structured command as accepted over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandIn {
    pub entity_id: String,
    pub command: CommandKind,
    #[serde(default)]
    pub details: CommandDetails,
}

/// Uniform result envelope for every command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOut {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl CommandOut {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn fail_reason(message: impl Into<String>, reason: &str) -> Self {
        Self::fail(message).with("reason", Value::String(reason.to_string()))
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn reason(&self) -> Option<&str> {
        self.data.get("reason").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_kind_round_trips_through_serde() {
        let json = serde_json::to_string(&CommandKind::InventoryView).unwrap();
        assert_eq!(json, "\"INVENTORY_VIEW\"");
        let back: CommandKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CommandKind::InventoryView);
    }

    #[test]
    fn details_default_quantity_is_one() {
        let details: CommandDetails = serde_json::from_str("{}").unwrap();
        assert_eq!(details.quantity, 1);
    }

    #[test]
    fn details_accept_both_item_spellings() {
        let a: CommandDetails =
            serde_json::from_str(r#"{"item_name_or_id": "iron sword"}"#).unwrap();
        let b: CommandDetails = serde_json::from_str(r#"{"item_name": "iron sword"}"#).unwrap();
        assert_eq!(a.item_ref(), Some("iron sword"));
        assert_eq!(b.item_ref(), Some("iron sword"));
    }

    #[test]
    fn command_in_parses_minimal_envelope() {
        let raw = r#"{"entity_id": "player_1", "command": "TAKE",
                      "details": {"item_name_or_id": "bread", "quantity": 2}}"#;
        let cmd: CommandIn = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.command, CommandKind::Take);
        assert_eq!(cmd.details.quantity, 2);
    }

    #[test]
    fn fail_reason_is_machine_readable() {
        let out = CommandOut::fail_reason("You cannot carry that.", reason::INVENTORY_FULL);
        assert!(!out.success);
        assert_eq!(out.reason(), Some("inventory_full"));
    }
}
