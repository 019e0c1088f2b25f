//! The game world and its command facade.
//!
//! `GameWorld` is the single entry point for player commands. Structured
//! commands dispatch through `handle_command`; raw text goes through
//! `process`, which runs the parser pipeline and falls back to the tool
//! router under a deadline. All state mutation happens here, one command
//! at a time, with compensating actions for any two-step move and events
//! emitted on the bus for the persistence layer.

pub mod player;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::events::{event_data, EventBus, EventType, SourceSystem};
use crate::msg::{reason, CommandDetails, CommandIn, CommandKind, CommandOut};
use crate::parser::router::{RouterError, ToolCall, ToolName, ToolRouter};
use crate::parser::vocabulary::VocabularyManager;
use crate::parser::{slot_for_keyword, Action, ParsedCommand, ParserEngine};
use crate::persistence::serializer::{ContainerState, LocationState, PlayerState, WorldState};
use crate::systems::catalog::{ItemCatalog, ItemType};
use crate::systems::containers::{ContainerData, LocationContainerSystem};
use crate::systems::equipment::{EquipmentManager, EquipmentSystem};
use crate::systems::inventory::{Inventory, InventoryRecord, InventorySlot};
use crate::systems::spells::SpellRegistry;

use self::player::Player;

// ─── Session plumbing ────────────────────────────────────────────────

/// Messages from connection tasks into the engine loop.
pub enum SessionMessage {
    Connected { conn_id: u64, tx: ConnTx },
    Line { conn_id: u64, text: String },
    Closed { conn_id: u64 },
}

/// A JSON-encoded `CommandOut` pushed back to one connection.
pub struct SessionReply {
    pub data: String,
}

pub type EngineTx = mpsc::UnboundedSender<SessionMessage>;
pub type ConnTx = mpsc::UnboundedSender<SessionReply>;

// ─── Game world ──────────────────────────────────────────────────────

pub struct GameWorld {
    catalog: ItemCatalog,
    inventories: HashMap<String, Inventory>,
    equipment: EquipmentSystem,
    containers: LocationContainerSystem,
    spells: SpellRegistry,
    players: HashMap<String, Player>,
    locations: BTreeMap<String, LocationState>,
    bus: EventBus,
    parser: ParserEngine,
    router: Box<dyn ToolRouter>,
}

impl GameWorld {
    pub fn new(catalog: ItemCatalog, router: Box<dyn ToolRouter>) -> Self {
        let mut vocabulary = VocabularyManager::new();
        vocabulary.register_catalog(&catalog);

        info!("Game world initialized with {} items", catalog.len());
        Self {
            catalog,
            inventories: HashMap::new(),
            equipment: EquipmentSystem::new(),
            containers: LocationContainerSystem::new(),
            spells: SpellRegistry::new(),
            players: HashMap::new(),
            locations: BTreeMap::new(),
            bus: EventBus::new(),
            parser: ParserEngine::new(vocabulary),
            router,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    // ─── Player and location bookkeeping ─────────────────────────

    fn location_type(location_id: &str) -> &str {
        location_id.split(['_', '-']).next().unwrap_or("generic")
    }

    fn ensure_location(&mut self, location_id: &str) {
        if self.locations.contains_key(location_id) {
            return;
        }
        let location_type = Self::location_type(location_id).to_string();
        self.containers
            .seed_location(location_id, &location_type, &self.catalog, &self.bus);

        let name = location_id.replace(['_', '-'], " ");
        self.locations.insert(
            location_id.to_string(),
            LocationState {
                location_id: location_id.to_string(),
                name,
                description: format!("A {location_type} in the world of Eldermoor."),
                visited: false,
                ..Default::default()
            },
        );
    }

    pub fn ensure_player(&mut self, player_id: &str) {
        if !self.players.contains_key(player_id) {
            self.ensure_location(config::STARTING_LOCATION);
            self.players.insert(
                player_id.to_string(),
                Player::new(player_id, config::STARTING_LOCATION),
            );
            info!("Created player {player_id} at {}", config::STARTING_LOCATION);
        }
        self.ensure_inventory(player_id);
    }

    fn ensure_inventory(&mut self, owner_id: &str) {
        if !self.inventories.contains_key(owner_id) {
            self.inventories.insert(
                owner_id.to_string(),
                Inventory::new(
                    owner_id,
                    Some(config::PLAYER_INVENTORY_SLOTS),
                    Some(config::PLAYER_INVENTORY_WEIGHT),
                ),
            );
        }
    }

    /// Track a player move, seeding the destination when it is new.
    pub fn update_player_location(&mut self, player_id: &str, location_id: &str) {
        self.ensure_player(player_id);
        self.ensure_location(location_id);
        let player = self.players.get_mut(player_id).expect("player ensured");
        if player.current_location != location_id {
            let from = player.current_location.clone();
            player.move_to(location_id);
            if let Some(location) = self.locations.get_mut(location_id) {
                location.visited = true;
                location.last_visited = Some(Utc::now().to_rfc3339());
            }
            debug!("Player {player_id} moved from {from} to {location_id}");
        }
    }

    pub fn player_location(&self, player_id: &str) -> Option<&str> {
        self.players
            .get(player_id)
            .map(|p| p.current_location.as_str())
    }

    /// Check a set of item requirements against a player's holdings.
    #[allow(dead_code)]
    pub fn player_has_items(&mut self, player_id: &str, required: &BTreeMap<String, u32>) -> bool {
        self.ensure_inventory(player_id);
        let inventory = &self.inventories[player_id];
        required.iter().all(|(item, qty)| inventory.has(item, *qty))
    }

    /// Remove a set of items from a player, all or nothing.
    #[allow(dead_code)]
    pub fn consume_player_items(
        &mut self,
        player_id: &str,
        items: &BTreeMap<String, u32>,
    ) -> bool {
        if !self.player_has_items(player_id, items) {
            return false;
        }
        let inventory = self.inventories.get_mut(player_id).expect("ensured");
        for (item, qty) in items {
            if !inventory.remove(item, *qty) {
                error!("Failed to consume {qty}x {item} from player {player_id}");
                return false;
            }
        }
        true
    }

    pub fn give_player_item(&mut self, player_id: &str, item_id: &str, quantity: u32) -> bool {
        self.ensure_inventory(player_id);
        let inventory = self.inventories.get_mut(player_id).expect("ensured");
        inventory.add(item_id, quantity, &self.catalog)
    }

    fn player_state_json(&self, player_id: &str) -> Value {
        self.build_player_state(player_id)
            .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
            .unwrap_or(Value::Null)
    }

    // ─── Facade dispatch ─────────────────────────────────────────

    pub fn handle(&mut self, command: &CommandIn) -> CommandOut {
        self.handle_command(&command.entity_id, command.command, &command.details)
    }

    /// Main entry point for structured commands.
    pub fn handle_command(
        &mut self,
        entity_id: &str,
        command: CommandKind,
        details: &CommandDetails,
    ) -> CommandOut {
        debug!(
            "Processing command {} for entity {entity_id}",
            command.as_str()
        );
        match command {
            CommandKind::Take => self.cmd_take(entity_id, details),
            CommandKind::Drop => self.cmd_drop(entity_id, details),
            CommandKind::Use => self.cmd_use(entity_id, details),
            CommandKind::InventoryView => self.cmd_inventory_view(entity_id),
            CommandKind::Give => self.cmd_give(entity_id, details),
            CommandKind::Equip => self.cmd_equip(entity_id, details),
            CommandKind::Unequip => self.cmd_unequip(entity_id, details),
        }
    }

    fn cmd_take(&mut self, entity_id: &str, details: &CommandDetails) -> CommandOut {
        let item_ref = match details.item_ref() {
            Some(item_ref) => item_ref.to_string(),
            None => return CommandOut::fail("You need to specify what you want to take."),
        };

        let location = match self.players.get(entity_id) {
            Some(player) => player.current_location.clone(),
            None => return CommandOut::fail("You need to be in a location to take items."),
        };

        let item = match self.catalog.resolve(&item_ref) {
            Some(item) => item.clone(),
            None => {
                return CommandOut::fail_reason(
                    format!("You don't see any '{item_ref}' here."),
                    reason::NOT_FOUND,
                )
            }
        };

        let quantity = details.quantity;
        let (removed, source) = match &details.container_id {
            Some(container_id) => (
                self.containers.remove_from_container(
                    container_id,
                    &item.item_id,
                    quantity,
                    &self.catalog,
                    &self.bus,
                ),
                container_id.clone(),
            ),
            None => (
                self.containers.take_from_location(
                    &location,
                    &item.item_id,
                    quantity,
                    &self.catalog,
                    &self.bus,
                ),
                "ground".to_string(),
            ),
        };

        if !removed {
            return CommandOut::fail_reason(
                format!("You don't see any '{item_ref}' available to take here."),
                reason::NOT_FOUND,
            );
        }

        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get_mut(entity_id).expect("ensured");
        if inventory.add(&item.item_id, quantity, &self.catalog) {
            let stats = serde_json::to_value(inventory.stats()).unwrap_or(Value::Null);
            self.bus.emit(
                EventType::ItemTaken,
                SourceSystem::Inventory,
                event_data(vec![
                    ("player_id", Value::from(entity_id)),
                    ("item_id", Value::from(item.item_id.clone())),
                    ("quantity", Value::from(quantity)),
                    ("source", Value::from(source.clone())),
                    ("location", Value::from(location.clone())),
                ]),
            );

            let source_text = if source == "ground" {
                "the ground"
            } else {
                "the container"
            };
            CommandOut::ok(format!(
                "You take {quantity}x {} from {source_text}.",
                item.name
            ))
            .with(
                "item_taken",
                serde_json::to_value(&item).unwrap_or(Value::Null),
            )
            .with("quantity", Value::from(quantity))
            .with("source", Value::from(source))
            .with("location", Value::from(location))
            .with("inventory_stats", stats)
        } else {
            // Inventory full: put the items back where they came from.
            match &details.container_id {
                Some(container_id) => {
                    self.containers.add_to_container(
                        container_id,
                        &item.item_id,
                        quantity,
                        &self.catalog,
                        &self.bus,
                    );
                }
                None => {
                    self.containers.drop_at_location(
                        &location,
                        &item.item_id,
                        quantity,
                        &self.catalog,
                        &self.bus,
                    );
                }
            }
            CommandOut::fail_reason(
                format!(
                    "You can't carry {quantity}x {}. Your inventory is full.",
                    item.name
                ),
                reason::INVENTORY_FULL,
            )
        }
    }

    fn cmd_drop(&mut self, entity_id: &str, details: &CommandDetails) -> CommandOut {
        let item_ref = match details.item_ref() {
            Some(item_ref) => item_ref.to_string(),
            None => return CommandOut::fail("You need to specify what you want to drop."),
        };

        let location = match self.players.get(entity_id) {
            Some(player) => player.current_location.clone(),
            None => return CommandOut::fail("You need to be in a location to drop items."),
        };

        let item = match self.catalog.resolve(&item_ref) {
            Some(item) => item.clone(),
            None => {
                return CommandOut::fail_reason(
                    format!("You don't have any '{item_ref}' to drop."),
                    reason::NOT_FOUND,
                )
            }
        };

        let quantity = details.quantity;
        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get_mut(entity_id).expect("ensured");

        if !inventory.has(&item.item_id, quantity) {
            let available = inventory.quantity(&item.item_id);
            return CommandOut::fail_reason(
                format!("You only have {available}x {}.", item.name),
                reason::NOT_OWNED,
            )
            .with("available_quantity", Value::from(available));
        }

        // Remove from the inventory first; restore on a failed placement.
        if !inventory.remove(&item.item_id, quantity) {
            return CommandOut::fail(format!("You can't drop {}.", item.name));
        }

        let (placed, target) = match &details.container_id {
            Some(container_id) => (
                self.containers.add_to_container(
                    container_id,
                    &item.item_id,
                    quantity,
                    &self.catalog,
                    &self.bus,
                ),
                container_id.clone(),
            ),
            None => (
                self.containers.drop_at_location(
                    &location,
                    &item.item_id,
                    quantity,
                    &self.catalog,
                    &self.bus,
                ),
                "ground".to_string(),
            ),
        };

        if placed {
            let inventory = self.inventories.get(entity_id).expect("ensured");
            let stats = serde_json::to_value(inventory.stats()).unwrap_or(Value::Null);
            self.bus.emit(
                EventType::ItemDropped,
                SourceSystem::Inventory,
                event_data(vec![
                    ("player_id", Value::from(entity_id)),
                    ("item_id", Value::from(item.item_id.clone())),
                    ("quantity", Value::from(quantity)),
                    ("target", Value::from(target.clone())),
                    ("location", Value::from(location.clone())),
                ]),
            );

            let target_text = if target == "ground" {
                "on the ground"
            } else {
                "into the container"
            };
            CommandOut::ok(format!("You drop {quantity}x {} {target_text}.", item.name))
                .with(
                    "item_dropped",
                    serde_json::to_value(&item).unwrap_or(Value::Null),
                )
                .with("quantity", Value::from(quantity))
                .with("target", Value::from(target))
                .with("location", Value::from(location))
                .with("inventory_stats", stats)
        } else {
            // Placement failed: the items go back into the inventory.
            let inventory = self.inventories.get_mut(entity_id).expect("ensured");
            inventory.add(&item.item_id, quantity, &self.catalog);
            CommandOut::fail(format!("You can't drop {} there.", item.name))
        }
    }

    fn cmd_use(&mut self, entity_id: &str, details: &CommandDetails) -> CommandOut {
        let item_ref = match details.item_ref() {
            Some(item_ref) => item_ref.to_string(),
            None => return CommandOut::fail("You need to specify what you want to use."),
        };

        let item = match self.catalog.resolve(&item_ref) {
            Some(item) => item.clone(),
            None => {
                return CommandOut::fail_reason(
                    format!("You don't have any '{item_ref}' to use."),
                    reason::NOT_FOUND,
                )
            }
        };

        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get_mut(entity_id).expect("ensured");
        if !inventory.has(&item.item_id, 1) {
            return CommandOut::fail_reason(
                format!("You don't have any {} to use.", item.name),
                reason::NOT_OWNED,
            );
        }

        let target = details
            .target
            .clone()
            .unwrap_or_else(|| "self".to_string());

        match item.item_type {
            ItemType::Consumable => {
                if !inventory.remove(&item.item_id, 1) {
                    return CommandOut::fail(format!("Failed to use {}.", item.name));
                }

                let effects = item
                    .properties
                    .get("effects")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();

                let mut message = format!("You use {}.", item.name);
                for (effect, value) in &effects {
                    match effect.as_str() {
                        "heal" => message.push_str(&format!(" You feel healed for {value} health.")),
                        "mana" => message.push_str(&format!(" You regain {value} mana.")),
                        "buff" => {
                            let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                            message.push_str(&format!(" You feel {text}."));
                        }
                        _ => {}
                    }
                }

                let stats = serde_json::to_value(
                    self.inventories.get(entity_id).expect("ensured").stats(),
                )
                .unwrap_or(Value::Null);

                self.bus.emit(
                    EventType::ItemUsed,
                    SourceSystem::Inventory,
                    event_data(vec![
                        ("player_id", Value::from(entity_id)),
                        ("item_id", Value::from(item.item_id.clone())),
                        ("quantity", Value::from(1)),
                        ("effects_applied", Value::Object(effects.clone())),
                        ("target", Value::from(target.clone())),
                    ]),
                );

                CommandOut::ok(message)
                    .with(
                        "item_used",
                        serde_json::to_value(&item).unwrap_or(Value::Null),
                    )
                    .with("effects_applied", Value::Object(effects))
                    .with("target", Value::from(target))
                    .with("inventory_stats", stats)
            }
            // "use sword" means equip it.
            ItemType::Weapon | ItemType::Armor | ItemType::Shield => {
                self.cmd_equip(entity_id, &CommandDetails::item(item.item_id.clone()))
            }
            ItemType::Tool => CommandOut::ok(format!("You use {} on {target}.", item.name))
                .with("action", Value::from("use_tool"))
                .with("target", Value::from(target)),
            _ => CommandOut::fail(format!("You can't use {}.", item.name)),
        }
    }

    fn cmd_inventory_view(&mut self, entity_id: &str) -> CommandOut {
        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get(entity_id).expect("ensured");

        let items: Vec<Value> = inventory
            .all_items()
            .iter()
            .filter_map(|slot| {
                self.catalog.get(&slot.item_id).map(|item| {
                    serde_json::json!({
                        "item_id": slot.item_id,
                        "name": item.name,
                        "description": item.description,
                        "quantity": slot.quantity,
                        "item_type": item.item_type.as_str(),
                        "rarity": item.rarity.as_str(),
                        "weight": item.weight,
                        "value": item.value,
                        "stackable": item.stackable,
                        "properties": item.properties,
                        "display_name": item.display_name(),
                    })
                })
            })
            .collect();

        CommandOut::ok("Inventory contents:")
            .with("inventory", Value::Array(items))
            .with(
                "stats",
                serde_json::to_value(inventory.stats()).unwrap_or(Value::Null),
            )
    }

    fn cmd_give(&mut self, entity_id: &str, details: &CommandDetails) -> CommandOut {
        let item_ref = match details.item_ref() {
            Some(item_ref) => item_ref.to_string(),
            None => return CommandOut::fail("No item specified to give."),
        };

        let item = match self.catalog.resolve(&item_ref) {
            Some(item) => item.clone(),
            None => {
                return CommandOut::fail_reason(
                    format!("Unknown item: {item_ref}"),
                    reason::NOT_FOUND,
                )
            }
        };

        let quantity = details.quantity;
        if self.give_player_item(entity_id, &item.item_id, quantity) {
            self.bus.emit(
                EventType::ItemGiven,
                SourceSystem::Inventory,
                event_data(vec![
                    ("player_id", Value::from(entity_id)),
                    ("item_id", Value::from(item.item_id.clone())),
                    ("quantity", Value::from(quantity)),
                    ("source", Value::from("admin_give")),
                ]),
            );
            CommandOut::ok(format!("Given {quantity}x {}.", item.name))
                .with(
                    "item_given",
                    serde_json::to_value(&item).unwrap_or(Value::Null),
                )
                .with("quantity", Value::from(quantity))
        } else {
            CommandOut::fail_reason(
                format!("Could not give {quantity}x {} (inventory full).", item.name),
                reason::INVENTORY_FULL,
            )
        }
    }

    fn cmd_equip(&mut self, entity_id: &str, details: &CommandDetails) -> CommandOut {
        let item_ref = match details.item_ref() {
            Some(item_ref) => item_ref.to_string(),
            None => return CommandOut::fail("Please specify an item to equip."),
        };

        let item = match self.catalog.resolve(&item_ref) {
            Some(item) => item.clone(),
            None => {
                return CommandOut::fail(format!(
                    "You don't have '{item_ref}' in your inventory."
                ))
            }
        };

        if !item.item_type.is_equippable() {
            return CommandOut::fail_reason(
                format!("You cannot equip {}.", item.name),
                reason::NO_VALID_SLOTS,
            );
        }

        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get_mut(entity_id).expect("ensured");
        let result = self.equipment.equip(
            entity_id,
            &item.item_id,
            inventory,
            &self.catalog,
            details.slot_ref(),
        );

        if result.success {
            let slot = result.data.get("slot").cloned().unwrap_or(Value::Null);
            self.bus.emit(
                EventType::EquipmentChange,
                SourceSystem::Inventory,
                event_data(vec![
                    ("player_id", Value::from(entity_id)),
                    ("action", Value::from("equip")),
                    ("item_id", Value::from(item.item_id.clone())),
                    ("item_name", Value::from(item.name.clone())),
                    ("slot", slot),
                    ("player_state", self.player_state_json(entity_id)),
                ]),
            );
        }
        result
    }

    fn cmd_unequip(&mut self, entity_id: &str, details: &CommandDetails) -> CommandOut {
        let item_ref = details.item_ref().map(str::to_string);
        let slot_ref = details.slot_ref().map(str::to_string);

        if item_ref.is_none() && slot_ref.is_none() {
            return CommandOut::fail_reason(
                "Please specify an item or equipment slot to unequip.",
                reason::MISSING_PARAMETERS,
            );
        }

        // Resolve an item name through the catalog before delegating.
        let item_id = match &item_ref {
            Some(item_ref) => match self.catalog.resolve(item_ref) {
                Some(item) => Some(item.item_id.clone()),
                None => {
                    return CommandOut::fail_reason(
                        format!("Unknown item: {item_ref}"),
                        reason::NOT_FOUND,
                    )
                }
            },
            None => None,
        };

        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get_mut(entity_id).expect("ensured");
        let result = self.equipment.unequip(
            entity_id,
            item_id.as_deref(),
            slot_ref.as_deref(),
            inventory,
            &self.catalog,
        );

        if result.success {
            let slot = result.data.get("slot").cloned().unwrap_or(Value::Null);
            let item_id_value = result.data.get("item_id").cloned().unwrap_or(Value::Null);
            self.bus.emit(
                EventType::EquipmentChange,
                SourceSystem::Inventory,
                event_data(vec![
                    ("player_id", Value::from(entity_id)),
                    ("action", Value::from("unequip")),
                    ("item_id", item_id_value),
                    ("slot", slot),
                    ("player_state", self.player_state_json(entity_id)),
                ]),
            );
        }
        result
    }

    /// Formatted view of a player's equipped items and folded bonuses.
    pub fn equipment_view(&mut self, entity_id: &str) -> CommandOut {
        let manager = match self.equipment.manager_ref(entity_id) {
            Some(manager) => manager,
            None => {
                return CommandOut::ok("You have no equipment equipped.")
                    .with("equipped_items", Value::Object(Map::new()))
            }
        };

        if manager.equipped_items().is_empty() {
            return CommandOut::ok("You have no equipment equipped.")
                .with("equipped_items", Value::Object(Map::new()));
        }

        let mut lines = vec!["=== EQUIPPED ITEMS ===".to_string()];
        for (slot, equipped) in manager.equipped_items() {
            let name = self
                .catalog
                .get(&equipped.item_id)
                .map(|i| i.name.clone())
                .unwrap_or_else(|| equipped.item_id.clone());
            lines.push(format!("{}: {name}", titlecase_words(&slot.words())));
        }

        let stats = manager.equipment_stats(&self.catalog);
        let bonuses: Vec<(&str, f64)> = [
            ("Armor", stats.armor),
            ("Damage", stats.damage),
            ("Strength", stats.strength),
            ("Dexterity", stats.dexterity),
            ("Intelligence", stats.intelligence),
            ("Constitution", stats.constitution),
        ]
        .into_iter()
        .filter(|(_, v)| *v != 0.0)
        .collect();

        if !bonuses.is_empty() || !stats.resistances.is_empty() {
            lines.push("=== EQUIPMENT BONUSES ===".to_string());
            for (name, value) in bonuses {
                let sign = if value > 0.0 { "+" } else { "" };
                lines.push(format!("{name}: {sign}{value}"));
            }
            for (res, value) in &stats.resistances {
                let sign = if *value > 0.0 { "+" } else { "" };
                lines.push(format!("{} Resistance: {sign}{value}", titlecase_words(res)));
            }
        }
        for effect in &stats.special_effects {
            lines.push(format!("  {effect}"));
        }

        CommandOut::ok(lines.join("\n"))
            .with(
                "equipped_items",
                serde_json::to_value(manager.to_record()).unwrap_or(Value::Null),
            )
            .with(
                "total_stats",
                serde_json::to_value(&stats).unwrap_or(Value::Null),
            )
    }

    // ─── World verbs ─────────────────────────────────────────────

    fn cmd_move(&mut self, entity_id: &str, target: Option<&str>) -> CommandOut {
        let target = match target {
            Some(target) if !target.is_empty() => target.to_lowercase(),
            _ => return CommandOut::fail("Where do you want to go?"),
        };

        self.ensure_player(entity_id);
        let from = self.players[entity_id].current_location.clone();

        // A registered location name wins; a direction canonicalizes;
        // anything else is treated as a destination id.
        let destination = self
            .parser
            .vocabulary
            .location_id(&target)
            .or_else(|| {
                self.parser
                    .vocabulary
                    .canonical_direction(&target)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| target.replace(' ', "_"));

        if destination == from {
            return CommandOut::ok(format!("You are already at {from}."));
        }

        self.update_player_location(entity_id, &destination);
        self.bus.emit(
            EventType::LocationChange,
            SourceSystem::Engine,
            event_data(vec![
                ("player_id", Value::from(entity_id)),
                ("from", Value::from(from.clone())),
                ("to", Value::from(destination.clone())),
            ]),
        );

        let name = self
            .locations
            .get(&destination)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| destination.clone());
        CommandOut::ok(format!("You travel to {name}."))
            .with("from", Value::from(from))
            .with("to", Value::from(destination))
    }

    fn cmd_look(&mut self, entity_id: &str, target: Option<&str>) -> CommandOut {
        self.ensure_player(entity_id);
        let location_id = self.players[entity_id].current_location.clone();
        let view = self.containers.items_at_location(&location_id, &self.catalog);

        if let Some(target) = target.filter(|t| !t.is_empty()) {
            // "look at equipment" shows the worn-gear sheet.
            if target == "equipment" || target == "gear" {
                return self.equipment_view(entity_id);
            }
            // A named item first, then a visible container.
            if let Some(item) = self.catalog.resolve(target) {
                return CommandOut::ok(format!("{}: {}", item.display_name(), item.description));
            }
            if let Some(container) = self.containers.find_visible_by_name(&location_id, target) {
                if container.is_locked {
                    return CommandOut::fail_reason(
                        format!("The {} is locked.", container.name),
                        reason::LOCKED,
                    );
                }
                let contents = view
                    .containers
                    .get(&container.container_id)
                    .map(|c| c.items.clone())
                    .unwrap_or_default();
                let listing = if contents.is_empty() {
                    format!("The {} is empty.", container.name)
                } else {
                    let names: Vec<String> = contents
                        .iter()
                        .map(|i| format!("{}x {}", i.quantity, i.name))
                        .collect();
                    format!("The {} contains: {}.", container.name, names.join(", "))
                };
                return CommandOut::ok(listing).with(
                    "container",
                    serde_json::to_value(contents).unwrap_or(Value::Null),
                );
            }
            return CommandOut::fail_reason(
                format!("You don't see any '{target}' here."),
                reason::NOT_FOUND,
            );
        }

        let location = self.locations.get(&location_id);
        let mut lines = vec![
            location
                .map(|l| l.name.clone())
                .unwrap_or_else(|| location_id.clone()),
            location.map(|l| l.description.clone()).unwrap_or_default(),
        ];

        if !view.ground_items.is_empty() {
            let names: Vec<String> = view
                .ground_items
                .iter()
                .map(|i| format!("{}x {}", i.quantity, i.name))
                .collect();
            lines.push(format!("On the ground: {}.", names.join(", ")));
        }

        let visible: Vec<String> = view
            .containers
            .values()
            .filter(|c| !c.is_hidden)
            .map(|c| {
                if c.is_locked {
                    format!("{} (locked)", c.name)
                } else {
                    c.name.clone()
                }
            })
            .collect();
        if !visible.is_empty() {
            lines.push(format!("You see: {}.", visible.join(", ")));
        }

        CommandOut::ok(lines.join("\n")).with(
            "location_view",
            serde_json::to_value(&view).unwrap_or(Value::Null),
        )
    }

    fn cmd_search(&mut self, entity_id: &str) -> CommandOut {
        self.ensure_player(entity_id);
        let location_id = self.players[entity_id].current_location.clone();
        let skill = self.players[entity_id].stat_i64("search_skill", 0) as i32;

        let result = self.containers.search_location(&location_id, skill);

        let message = if !result.discovered.is_empty() {
            let names: Vec<&str> = result.discovered.iter().map(|c| c.name.as_str()).collect();
            format!("You discover: {}!", names.join(", "))
        } else if !result.visible.is_empty() {
            "You search the area but find nothing new.".to_string()
        } else {
            "You search the area and find nothing of interest.".to_string()
        };

        CommandOut::ok(message)
            .with(
                "discovered",
                serde_json::to_value(&result.discovered).unwrap_or(Value::Null),
            )
            .with(
                "visible",
                serde_json::to_value(&result.visible).unwrap_or(Value::Null),
            )
            .with(
                "special_discoveries",
                serde_json::to_value(&result.special_discoveries).unwrap_or(Value::Null),
            )
    }

    fn cmd_unlock(
        &mut self,
        entity_id: &str,
        target: Option<&str>,
        with_item: Option<&str>,
    ) -> CommandOut {
        let target = match target {
            Some(target) if !target.is_empty() => target,
            _ => return CommandOut::fail("What do you want to unlock?"),
        };

        self.ensure_player(entity_id);
        let location_id = self.players[entity_id].current_location.clone();

        let container_id = match self.containers.find_visible_by_name(&location_id, target) {
            Some(container) => container.container_id.clone(),
            None => {
                return CommandOut::fail_reason(
                    format!("You don't see any '{target}' to unlock here."),
                    reason::NOT_FOUND,
                )
            }
        };

        let method = match with_item {
            Some(tool) if tool.contains("lockpick") || tool.contains("pick") => "lockpick",
            Some(tool) if tool.contains("key") => "key",
            _ => "auto",
        };

        self.ensure_inventory(entity_id);
        let inventory = self.inventories.get_mut(entity_id).expect("ensured");
        self.containers
            .unlock(&container_id, inventory, method, &self.catalog, &self.bus)
    }

    fn cmd_cast(&mut self, entity_id: &str, target: Option<&str>) -> CommandOut {
        let target = match target {
            Some(target) if !target.is_empty() => target.to_lowercase(),
            _ => return CommandOut::fail("What do you want to cast?"),
        };

        self.ensure_player(entity_id);
        let location = self.players[entity_id].current_location.clone();
        let template_id = target.replace(' ', "_");

        match self
            .spells
            .instantiate(&template_id, Some(entity_id), Some(&location), None)
        {
            Some(spell) => CommandOut::ok(format!(
                "You cast {} (power {:.1}).",
                self.spells
                    .template(&template_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| template_id.clone()),
                spell.power
            ))
            .with("spell", serde_json::to_value(&spell).unwrap_or(Value::Null)),
            None => CommandOut::fail_reason(
                format!("You don't know any spell called '{target}'."),
                reason::NOT_FOUND,
            ),
        }
    }

    fn cmd_help(&self) -> CommandOut {
        CommandOut::ok(
            "You can: look around, go <place>, take <item>, drop <item>, \
             use <item>, equip <item>, take off <item>, inventory, \
             search <area>, unlock <container>, talk to <person>, \
             attack <target>, cast <spell>.",
        )
    }

    // ─── Raw text entry ──────────────────────────────────────────

    /// Parse and execute one sentence. Low-confidence or unresolved parses
    /// fall back to the tool router under a deadline; a routed tool call
    /// is executed immediately, so the fallback yields both the command
    /// and its result.
    pub async fn process(&mut self, entity_id: &str, text: &str) -> CommandOut {
        self.ensure_player(entity_id);

        let parsed = self.parser.parse(text);
        debug!(
            "Parsed '{text}' -> {} (confidence {:.2})",
            parsed.action.as_str(),
            parsed.confidence
        );

        if parsed.action != Action::Unknown && parsed.confidence >= config::ROUTER_THRESHOLD {
            let mut out = self.execute_parsed(entity_id, &parsed);
            annotate(&mut out, &parsed, "parser", parsed.confidence);
            return out;
        }

        // Tool-routing fallback under a per-call deadline.
        let deadline = Duration::from_millis(config::ROUTER_DEADLINE_MS);
        let routed = tokio::time::timeout(deadline, self.router.route(text)).await;

        match routed {
            Ok(Ok(call)) => {
                let command = Self::command_for_tool(&call, text);
                let mut out = self.execute_parsed(entity_id, &command);
                let confidence = if out.success { 0.95 } else { 0.6 };
                annotate(&mut out, &command, "router", confidence);
                out
            }
            Ok(Err(e)) => self.unresolved(text, &parsed, Some(e)),
            Err(_) => self.unresolved(text, &parsed, Some(RouterError::Timeout)),
        }
    }

    fn command_for_tool(call: &ToolCall, raw_text: &str) -> ParsedCommand {
        let action = match call.tool {
            ToolName::Move => Action::Move,
            ToolName::Look => Action::Look,
            ToolName::Take => Action::Take,
            ToolName::Drop => Action::Drop,
            ToolName::Use => Action::Use,
            ToolName::Talk => Action::Talk,
            ToolName::Attack => Action::Attack,
            ToolName::CastMagic => Action::CastMagic,
            ToolName::Inventory => Action::Inventory,
            ToolName::Search => Action::Search,
            ToolName::Unlock => Action::Unlock,
            ToolName::Equip => Action::Equip,
            ToolName::Unequip => Action::Unequip,
        };
        let target = if call.argument.is_empty() {
            None
        } else {
            Some(call.argument.clone())
        };
        ParsedCommand {
            action,
            target,
            modifiers: HashMap::new(),
            entities: Vec::new(),
            confidence: config::ROUTER_THRESHOLD,
            raw_text: raw_text.to_string(),
        }
    }

    fn execute_parsed(&mut self, entity_id: &str, parsed: &ParsedCommand) -> CommandOut {
        let target = parsed.target.as_deref();
        match parsed.action {
            Action::Take => self.handle_command(
                entity_id,
                CommandKind::Take,
                &CommandDetails::item(target.unwrap_or_default()),
            ),
            Action::Drop => self.handle_command(
                entity_id,
                CommandKind::Drop,
                &CommandDetails::item(target.unwrap_or_default()),
            ),
            Action::Use => {
                let mut details = CommandDetails::item(target.unwrap_or_default());
                details.target = parsed.modifiers.get("on_target").cloned();
                self.handle_command(entity_id, CommandKind::Use, &details)
            }
            Action::Inventory => self.handle_command(
                entity_id,
                CommandKind::InventoryView,
                &CommandDetails::default(),
            ),
            Action::Equip => self.handle_command(
                entity_id,
                CommandKind::Equip,
                &CommandDetails::item(target.unwrap_or_default()),
            ),
            Action::Unequip => {
                // A body-part target ("ring", "helmet") resolves to a slot;
                // anything else unequips by item name.
                let mut details = CommandDetails::default();
                match target.and_then(slot_for_keyword) {
                    Some(slot) => details.slot_name = Some(slot.to_string()),
                    None => details.item_name = target.map(str::to_string),
                }
                self.handle_command(entity_id, CommandKind::Unequip, &details)
            }
            Action::Move => self.cmd_move(entity_id, target),
            Action::Look => self.cmd_look(entity_id, target),
            Action::Search => self.cmd_search(entity_id),
            Action::Unlock => self.cmd_unlock(
                entity_id,
                target,
                parsed.modifiers.get("with_item").map(String::as_str),
            ),
            Action::CastMagic => self.cmd_cast(entity_id, target),
            Action::Help => self.cmd_help(),
            // Narrative-layer verbs acknowledged but handled downstream.
            Action::Talk => {
                let who = target.unwrap_or("no one in particular");
                CommandOut::ok(format!("You talk to {who}."))
                    .with("action", Value::from("talk"))
                    .with("target", Value::from(target.unwrap_or_default()))
            }
            Action::Attack => {
                let what = target.unwrap_or("the empty air");
                CommandOut::ok(format!("You attack {what}."))
                    .with("action", Value::from("attack"))
                    .with("target", Value::from(target.unwrap_or_default()))
            }
            Action::Unknown => self.unresolved(&parsed.raw_text, parsed, None),
        }
    }

    /// Completely unresolved input: annotate and suggest rather than guess.
    fn unresolved(
        &self,
        text: &str,
        parsed: &ParsedCommand,
        router_error: Option<RouterError>,
    ) -> CommandOut {
        let suggestions = self.parser.suggestions(text);
        let mut out = if parsed.action == Action::Unknown {
            CommandOut::fail("I don't understand that.")
        } else {
            CommandOut::fail("I'm not sure what you mean.")
        };
        annotate(
            &mut out,
            parsed,
            "parser",
            if parsed.action == Action::Unknown {
                config::UNKNOWN_CONFIDENCE
            } else {
                parsed.confidence
            },
        );
        out = out.with(
            "suggestions",
            serde_json::to_value(suggestions).unwrap_or(Value::Null),
        );
        if let Some(e) = router_error {
            warn!("Tool router fallback failed for '{text}': {e}");
            if !matches!(e, RouterError::NoTool) {
                out = out.with("reason", Value::from(reason::LLM_UNAVAILABLE));
            }
        }
        out
    }

    // ─── Snapshot / restore ──────────────────────────────────────

    fn build_player_state(&self, player_id: &str) -> Option<PlayerState> {
        let player = self.players.get(player_id)?;
        let inventory = self
            .inventories
            .get(player_id)
            .map(|inv| serde_json::to_value(inv.to_record()).unwrap_or(Value::Null));
        let equipped = self
            .equipment
            .manager_ref(player_id)
            .map(|m| m.to_record())
            .unwrap_or_default();

        Some(PlayerState {
            player_id: player.player_id.clone(),
            current_location: player.current_location.clone(),
            inventory,
            equipped_items: equipped,
            stats: player.stats.clone(),
            discovered_locations: player.discovered_locations.clone(),
            last_save: Some(Utc::now().to_rfc3339()),
            custom_data: player.custom_data.clone(),
            extra: Map::new(),
        })
    }

    /// A complete world snapshot for persistence.
    pub fn snapshot(&self) -> WorldState {
        let mut containers = BTreeMap::new();
        for data in self.containers.all_containers() {
            let contents: Vec<Value> = self
                .containers
                .container_inventory(&data.container_id)
                .map(|inv| {
                    inv.all_items()
                        .iter()
                        .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                        .collect()
                })
                .unwrap_or_default();

            let mut custom = Map::new();
            custom.insert(
                "container_data".to_string(),
                serde_json::to_value(data).unwrap_or(Value::Null),
            );

            containers.insert(
                data.container_id.clone(),
                ContainerState {
                    container_id: data.container_id.clone(),
                    location_id: data.location_id.clone(),
                    container_type: data.container_type.as_str().to_string(),
                    contents,
                    is_open: !data.is_locked,
                    last_accessed: None,
                    custom_properties: custom,
                },
            );
        }

        let mut locations = self.locations.clone();
        for (location_id, location) in locations.iter_mut() {
            let view = self.containers.items_at_location(location_id, &self.catalog);
            location.items = view
                .ground_items
                .iter()
                .map(|i| serde_json::to_value(i).unwrap_or(Value::Null))
                .collect();
            location.containers = view
                .containers
                .iter()
                .map(|(id, c)| {
                    (
                        id.clone(),
                        serde_json::json!({ "name": c.name, "type": c.container_type }),
                    )
                })
                .collect();
        }

        let mut players = BTreeMap::new();
        for player_id in self.players.keys() {
            if let Some(state) = self.build_player_state(player_id) {
                players.insert(player_id.clone(), state);
            }
        }

        WorldState {
            locations: Some(locations),
            containers: Some(containers),
            player: Some(players),
            global_state: Map::new(),
        }
    }

    /// Rebuild the world from a loaded state.
    pub fn restore(&mut self, state: &WorldState) {
        if let Some(locations) = &state.locations {
            self.locations = locations.clone();
        }

        if let Some(containers) = &state.containers {
            self.containers = LocationContainerSystem::new();
            for container_state in containers.values() {
                let data: ContainerData = match container_state
                    .custom_properties
                    .get("container_data")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                {
                    Some(data) => data,
                    None => {
                        warn!(
                            "Skipping container {} with no restorable data",
                            container_state.container_id
                        );
                        continue;
                    }
                };
                let slots: Vec<InventorySlot> = container_state
                    .contents
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect();
                self.containers.restore_container(data, slots, &self.catalog);
            }
        }

        if let Some(players) = &state.player {
            for (player_id, player_state) in players {
                let mut player = Player::new(player_id, &player_state.current_location);
                player.discovered_locations = player_state.discovered_locations.clone();
                player.stats = player_state.stats.clone();
                player.custom_data = player_state.custom_data.clone();
                self.players.insert(player_id.clone(), player);

                if let Some(inventory_json) = &player_state.inventory {
                    if let Ok(record) =
                        serde_json::from_value::<InventoryRecord>(inventory_json.clone())
                    {
                        self.inventories.insert(
                            player_id.clone(),
                            Inventory::from_record(record, &self.catalog),
                        );
                    }
                }

                self.equipment.insert_manager(EquipmentManager::from_record(
                    player_id,
                    &player_state.equipped_items,
                ));
            }
        }

        info!("World state restored");
    }
}

fn annotate(out: &mut CommandOut, parsed: &ParsedCommand, source: &str, confidence: f32) {
    out.data.insert(
        "command".to_string(),
        serde_json::json!({
            "action": parsed.action.as_str(),
            "target": parsed.target,
            "confidence": confidence,
            "source": source,
        }),
    );
}

fn titlecase_words(words: &str) -> String {
    words
        .split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Server loop ─────────────────────────────────────────────────────

use crate::persistence::WorldStatePersistence;

pub struct GameServer {
    world: GameWorld,
    persistence: WorldStatePersistence,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    connections: HashMap<u64, ConnTx>,
    conn_players: HashMap<u64, String>,
}

impl GameServer {
    pub fn new(
        mut world: GameWorld,
        persistence: WorldStatePersistence,
        rx: mpsc::UnboundedReceiver<SessionMessage>,
    ) -> Self {
        persistence.wire_bus(world.bus_mut());
        Self {
            world,
            persistence,
            rx,
            connections: HashMap::new(),
            conn_players: HashMap::new(),
        }
    }

    /// Process one raw line from a connection: a JSON object is a
    /// structured `CommandIn`, anything else is natural language.
    async fn handle_line(&mut self, conn_id: u64, text: &str) -> String {
        let entity_id = self
            .conn_players
            .entry(conn_id)
            .or_insert_with(|| format!("player_{conn_id}"))
            .clone();
        self.world.ensure_player(&entity_id);

        let out = if text.trim_start().starts_with('{') {
            match serde_json::from_str::<CommandIn>(text) {
                Ok(command) => self.world.handle(&command),
                Err(e) => CommandOut::fail_reason(
                    format!("Invalid command envelope: {e}"),
                    reason::VALIDATION,
                ),
            }
        } else {
            self.world.process(&entity_id, text).await
        };

        serde_json::to_string(&out)
            .unwrap_or_else(|_| r#"{"success":false,"message":"internal error","data":{}}"#.into())
    }

    fn handle_disconnect(&mut self, conn_id: u64) {
        self.connections.remove(&conn_id);
        if let Some(player_id) = self.conn_players.remove(&conn_id) {
            info!("Session for {player_id} closed (conn {conn_id})");
        }
    }

    /// Run until ctrl-c or channel close. Commands are processed one at a
    /// time; the auto-save gate is polled on its own interval; shutdown
    /// performs a final full save.
    pub async fn run(mut self) {
        enum Wake {
            AutoSave,
            Shutdown,
            Session(Option<SessionMessage>),
        }

        let mut autosave =
            tokio::time::interval(Duration::from_secs(config::AUTO_SAVE_CHECK_SECS));
        autosave.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            let wake = tokio::select! {
                _ = autosave.tick() => Wake::AutoSave,
                _ = &mut shutdown => Wake::Shutdown,
                msg = self.rx.recv() => Wake::Session(msg),
            };

            match wake {
                Wake::AutoSave => {
                    if self.persistence.should_auto_save().0 {
                        self.world.bus().emit(
                            EventType::PeriodicSave,
                            SourceSystem::Persistence,
                            Map::new(),
                        );
                    }
                    let snapshot = self.world.snapshot();
                    self.persistence.auto_save_check(&snapshot);
                }
                Wake::Shutdown => {
                    info!("Shutdown signal received, saving world state...");
                    self.world.bus().emit(
                        EventType::SystemShutdown,
                        SourceSystem::Engine,
                        Map::new(),
                    );
                    let snapshot = self.world.snapshot();
                    if let Err(e) = self.persistence.save_world_state(&snapshot, true, false) {
                        error!("Final save failed: {e}");
                    } else {
                        info!("World state saved. Shutting down.");
                    }
                    break;
                }
                Wake::Session(Some(SessionMessage::Connected { conn_id, tx })) => {
                    self.connections.insert(conn_id, tx);
                    info!("Session registered for conn {conn_id}");
                }
                Wake::Session(Some(SessionMessage::Line { conn_id, text })) => {
                    let reply = self.handle_line(conn_id, &text).await;
                    if let Some(tx) = self.connections.get(&conn_id) {
                        let _ = tx.send(SessionReply { data: reply });
                    }
                }
                Wake::Session(Some(SessionMessage::Closed { conn_id })) => {
                    self.handle_disconnect(conn_id);
                }
                Wake::Session(None) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::router::KeywordRouter;
    use crate::systems::catalog::starter_catalog;
    use crate::systems::equipment::EquipmentSlot;

    fn world() -> GameWorld {
        let mut world = GameWorld::new(starter_catalog(), Box::new(KeywordRouter::new()));
        world.update_player_location("player_1", "village_1");
        world
    }

    fn give(world: &mut GameWorld, item: &str, qty: u32) {
        let out = world.handle_command(
            "player_1",
            CommandKind::Give,
            &CommandDetails::item_qty(item, qty),
        );
        assert!(out.success, "give failed: {}", out.message);
    }

    #[test]
    fn equip_conflict_scenario_with_two_handed_sword() {
        // Sword then shield equip cleanly into separate hands; a
        // two-handed sword then claims the main hand and force-returns
        // the shield to the inventory.
        let mut world = world();
        give(&mut world, "iron_sword", 1);
        give(&mut world, "wooden_shield", 1);

        let sword = world.handle_command(
            "player_1",
            CommandKind::Equip,
            &CommandDetails::item("iron sword"),
        );
        assert!(sword.success);
        assert_eq!(sword.message, "You equip Iron Sword on your main hand.");

        let shield = world.handle_command(
            "player_1",
            CommandKind::Equip,
            &CommandDetails::item("wooden shield"),
        );
        assert!(shield.success);
        let auto = shield.data["unequipped_items"].as_array().unwrap();
        assert!(auto.is_empty(), "no auto-unequip expected for the shield");

        give(&mut world, "two_handed_sword", 1);
        let greatsword = world.handle_command(
            "player_1",
            CommandKind::Equip,
            &CommandDetails::item("two-handed sword"),
        );
        assert!(greatsword.success);

        let unequipped = greatsword.data["unequipped_items"].as_array().unwrap();
        let names: Vec<&str> = unequipped
            .iter()
            .filter_map(|u| u["item_name"].as_str())
            .collect();
        assert!(names.contains(&"Wooden Shield"));

        let manager = world.equipment.manager_ref("player_1").unwrap();
        assert_eq!(
            manager.get_equipped(EquipmentSlot::MainHand).unwrap().item_id,
            "two_handed_sword"
        );
        assert!(!manager.is_slot_occupied(EquipmentSlot::OffHand));
        assert_eq!(world.inventories["player_1"].quantity("wooden_shield"), 1);
    }

    #[tokio::test]
    async fn take_off_ring_unequips_through_raw_text() {
        // "take off ring" must parse as unequip, target the ring slot,
        // and land the ring back in the inventory.
        let mut world = world();
        give(&mut world, "magic_ring", 1);
        let equip = world.handle_command(
            "player_1",
            CommandKind::Equip,
            &CommandDetails::item("magic ring"),
        );
        assert!(equip.success);
        assert!(world
            .equipment
            .manager_ref("player_1")
            .unwrap()
            .is_slot_occupied(EquipmentSlot::RingLeft));

        let out = world.process("player_1", "take off ring").await;
        assert!(out.success, "unequip failed: {}", out.message);
        assert_eq!(out.data["command"]["action"].as_str(), Some("unequip"));
        assert!(out.data["command"]["confidence"].as_f64().unwrap() >= 0.9);

        let manager = world.equipment.manager_ref("player_1").unwrap();
        assert!(!manager.is_slot_occupied(EquipmentSlot::RingLeft));
        assert!(!manager.is_slot_occupied(EquipmentSlot::RingRight));
        assert_eq!(world.inventories["player_1"].quantity("magic_ring"), 1);
    }

    #[test]
    fn ground_drop_take_round_trip_through_facade() {
        let mut world = world();
        give(&mut world, "health_potion_small", 5);

        let drop = world.handle_command(
            "player_1",
            CommandKind::Drop,
            &CommandDetails::item_qty("health potion", 3),
        );
        assert!(drop.success);
        assert_eq!(world.inventories["player_1"].quantity("health_potion_small"), 2);

        let take = world.handle_command(
            "player_1",
            CommandKind::Take,
            &CommandDetails::item_qty("health potion", 2),
        );
        assert!(take.success);
        assert_eq!(world.inventories["player_1"].quantity("health_potion_small"), 4);

        // One potion stays on the ground.
        let view = world
            .containers
            .items_at_location("village_1", &world.catalog);
        let ground = view
            .ground_items
            .iter()
            .find(|i| i.item_id == "health_potion_small")
            .unwrap();
        assert_eq!(ground.quantity, 1);
    }

    #[test]
    fn take_restores_source_when_inventory_cannot_hold() {
        let mut world = world();
        // Shrink the player's inventory to a single slot and fill it.
        world.inventories.insert(
            "player_1".to_string(),
            Inventory::new("player_1", Some(1), None),
        );
        give(&mut world, "iron_sword", 1);

        // Put bread on the ground, then fail to take it.
        let GameWorld {
            containers,
            catalog,
            bus,
            ..
        } = &mut world;
        containers.drop_at_location("village_1", "bread", 2, catalog, bus);

        let take = world.handle_command(
            "player_1",
            CommandKind::Take,
            &CommandDetails::item_qty("bread", 2),
        );
        assert!(!take.success);
        assert_eq!(take.reason(), Some("inventory_full"));

        // The bread is back on the ground.
        let view = world
            .containers
            .items_at_location("village_1", &world.catalog);
        let ground = view.ground_items.iter().find(|i| i.item_id == "bread").unwrap();
        assert_eq!(ground.quantity, 2);
    }

    #[test]
    fn use_consumable_reports_effects_and_consumes_one() {
        let mut world = world();
        give(&mut world, "health_potion_small", 2);

        let out = world.handle_command(
            "player_1",
            CommandKind::Use,
            &CommandDetails::item("health potion"),
        );
        assert!(out.success);
        assert!(out.message.contains("You feel healed for 25 health."));
        assert_eq!(world.inventories["player_1"].quantity("health_potion_small"), 1);
    }

    #[test]
    fn use_weapon_routes_to_equip() {
        let mut world = world();
        give(&mut world, "iron_sword", 1);

        let out = world.handle_command(
            "player_1",
            CommandKind::Use,
            &CommandDetails::item("iron sword"),
        );
        assert!(out.success);
        assert!(out.message.contains("You equip Iron Sword"));
        assert!(world
            .equipment
            .manager_ref("player_1")
            .unwrap()
            .is_slot_occupied(EquipmentSlot::MainHand));
    }

    #[test]
    fn inventory_view_renders_display_fields() {
        let mut world = world();
        give(&mut world, "magic_ring", 1);

        let out = world.handle_command(
            "player_1",
            CommandKind::InventoryView,
            &CommandDetails::default(),
        );
        assert!(out.success);
        let items = out.data["inventory"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["display_name"].as_str(), Some("Magic Ring (Rare)"));
        assert_eq!(items[0]["rarity"].as_str(), Some("RARE"));
    }

    #[tokio::test]
    async fn search_and_unlock_flow_through_raw_text() {
        let mut world = world();
        world.update_player_location("player_1", "ruin_1");
        give(&mut world, "lockpick", 1);

        // The ancient chest is hidden at difficulty 15.
        let blind = world.process("player_1", "search the room").await;
        assert!(blind.success);
        assert!(blind.data["discovered"].as_array().unwrap().is_empty());

        world
            .players
            .get_mut("player_1")
            .unwrap()
            .stats
            .insert("search_skill".to_string(), Value::from(20));

        let found = world.process("player_1", "search the room").await;
        assert!(found.success);
        assert_eq!(found.data["discovered"].as_array().unwrap().len(), 1);

        let unlock = world.process("player_1", "unlock chest").await;
        assert!(unlock.success, "unlock failed: {}", unlock.message);
        assert_eq!(unlock.data["method"].as_str(), Some("lockpick"));
    }

    #[tokio::test]
    async fn router_fallback_executes_equip_for_wear() {
        // "wear" matches no regex pattern; the router must resolve it to
        // the equip tool and the engine must execute it.
        let mut world = world();
        give(&mut world, "leather_armor", 1);

        let out = world.process("player_1", "wear the leather armor").await;
        assert!(out.success, "router equip failed: {}", out.message);
        assert_eq!(out.data["command"]["source"].as_str(), Some("router"));
        assert!(world
            .equipment
            .manager_ref("player_1")
            .unwrap()
            .is_slot_occupied(EquipmentSlot::Chest));
    }

    #[tokio::test]
    async fn gibberish_returns_suggestions_not_guesses() {
        let mut world = world();
        let out = world.process("player_1", "florble the wibble").await;
        assert!(!out.success);
        assert_eq!(out.data["command"]["action"].as_str(), Some("unknown"));
        assert!(out.data["command"]["confidence"].as_f64().unwrap() <= 0.11);
        assert!(!out.data["suggestions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn move_discovers_and_seeds_new_locations() {
        let mut world = world();
        let out = world.process("player_1", "go ruin_1").await;
        assert!(out.success);
        assert_eq!(world.player_location("player_1"), Some("ruin_1"));
        assert!(world
            .players["player_1"]
            .discovered_locations
            .contains("ruin_1"));
        // Ruins seed a hidden chest.
        assert!(world
            .containers
            .containers_in_location("ruin_1")
            .is_some());
    }

    #[test]
    fn snapshot_restore_round_trips_player_and_containers() {
        let mut world = world();
        give(&mut world, "iron_sword", 1);
        give(&mut world, "bread", 3);
        world.handle_command(
            "player_1",
            CommandKind::Equip,
            &CommandDetails::item("iron sword"),
        );
        world.handle_command(
            "player_1",
            CommandKind::Drop,
            &CommandDetails::item_qty("bread", 1),
        );

        let snapshot = world.snapshot();

        let mut restored = GameWorld::new(starter_catalog(), Box::new(KeywordRouter::new()));
        restored.restore(&snapshot);

        assert_eq!(restored.player_location("player_1"), Some("village_1"));
        assert_eq!(restored.inventories["player_1"].quantity("bread"), 2);
        assert!(restored
            .equipment
            .manager_ref("player_1")
            .unwrap()
            .is_slot_occupied(EquipmentSlot::MainHand));

        let view = restored
            .containers
            .items_at_location("village_1", &restored.catalog);
        assert!(view.ground_items.iter().any(|i| i.item_id == "bread"));
    }

    #[test]
    fn give_unknown_item_fails_with_not_found() {
        let mut world = world();
        let out = world.handle_command(
            "player_1",
            CommandKind::Give,
            &CommandDetails::item("philosophers_stone"),
        );
        assert!(!out.success);
        assert_eq!(out.reason(), Some("not_found"));
    }

    #[tokio::test]
    async fn cast_known_spell_instantiates_it() {
        let mut world = world();
        let out = world.process("player_1", "cast fireball").await;
        assert!(out.success);
        assert!(out.data["spell"]["power"].as_f64().unwrap() > 0.0);

        let miss = world.process("player_1", "cast spaghetti").await;
        assert!(!miss.success);
    }
}
