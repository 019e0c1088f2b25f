//! Equipment slots and per-entity equipped-item management.
//!
//! Equip resolves an admissible slot set from the item type, picks a target
//! slot (rings prefer the left hand when empty), clears conflicting slots
//! through the normal unequip path, and only then moves the item out of the
//! inventory. A two-handed weapon in the main hand conflicts with the off
//! hand in both directions.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::msg::{reason, CommandOut};
use crate::systems::catalog::{ItemCatalog, ItemDef, ItemType};
use crate::systems::inventory::Inventory;

// ─── Slots ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentSlot {
    MainHand,
    OffHand,
    Head,
    Chest,
    Legs,
    Feet,
    Hands,
    Neck,
    RingLeft,
    RingRight,
    Bracelet,
    Belt,
    Back,
    Ammo,
}

impl EquipmentSlot {
    #[allow(dead_code)]
    pub const ALL: [EquipmentSlot; 14] = [
        Self::MainHand,
        Self::OffHand,
        Self::Head,
        Self::Chest,
        Self::Legs,
        Self::Feet,
        Self::Hands,
        Self::Neck,
        Self::RingLeft,
        Self::RingRight,
        Self::Bracelet,
        Self::Belt,
        Self::Back,
        Self::Ammo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainHand => "main_hand",
            Self::OffHand => "off_hand",
            Self::Head => "head",
            Self::Chest => "chest",
            Self::Legs => "legs",
            Self::Feet => "feet",
            Self::Hands => "hands",
            Self::Neck => "neck",
            Self::RingLeft => "ring_left",
            Self::RingRight => "ring_right",
            Self::Bracelet => "bracelet",
            Self::Belt => "belt",
            Self::Back => "back",
            Self::Ammo => "ammo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "main_hand" => Some(Self::MainHand),
            "off_hand" => Some(Self::OffHand),
            "head" => Some(Self::Head),
            "chest" => Some(Self::Chest),
            "legs" => Some(Self::Legs),
            "feet" => Some(Self::Feet),
            "hands" => Some(Self::Hands),
            "neck" => Some(Self::Neck),
            "ring_left" => Some(Self::RingLeft),
            "ring_right" => Some(Self::RingRight),
            "bracelet" => Some(Self::Bracelet),
            "belt" => Some(Self::Belt),
            "back" => Some(Self::Back),
            "ammo" => Some(Self::Ammo),
            _ => None,
        }
    }

    /// "main_hand" -> "main hand", for player-facing messages.
    pub fn words(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

// ─── Equipped items ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquippedItem {
    pub item_id: String,
    pub slot: EquipmentSlot,
    pub equipped_at: DateTime<Utc>,
    #[serde(default)]
    pub instance_properties: Map<String, Value>,
}

impl EquippedItem {
    fn new(item_id: &str, slot: EquipmentSlot) -> Self {
        Self {
            item_id: item_id.to_string(),
            slot,
            equipped_at: Utc::now(),
            instance_properties: Map::new(),
        }
    }
}

/// Folded numeric bonuses across all equipped items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EquipmentStats {
    pub armor: f64,
    pub damage: f64,
    pub strength: f64,
    pub dexterity: f64,
    pub intelligence: f64,
    pub constitution: f64,
    pub resistances: BTreeMap<String, f64>,
    pub special_effects: Vec<String>,
}

// ─── Per-entity manager ──────────────────────────────────────────────

pub struct EquipmentManager {
    entity_id: String,
    equipped: BTreeMap<EquipmentSlot, EquippedItem>,
}

impl EquipmentManager {
    pub fn new(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            equipped: BTreeMap::new(),
        }
    }

    /// Slots an item type admits.
    pub fn admissible_slots(item: &ItemDef) -> Vec<EquipmentSlot> {
        let mut slots = Vec::new();
        match item.item_type {
            ItemType::Weapon => {
                slots.push(EquipmentSlot::MainHand);
                let weapon_type = item.prop_str("weapon_type").unwrap_or("").to_lowercase();
                if matches!(weapon_type.as_str(), "dagger" | "short_sword" | "light") {
                    slots.push(EquipmentSlot::OffHand);
                }
            }
            ItemType::Shield => slots.push(EquipmentSlot::OffHand),
            ItemType::Armor => {
                if let Some(Value::Array(names)) = item.properties.get("slots") {
                    for name in names {
                        match name.as_str().and_then(EquipmentSlot::from_str) {
                            Some(slot) => slots.push(slot),
                            None => warn!("Unknown armor slot: {name}"),
                        }
                    }
                }
                if slots.is_empty() {
                    let armor_type = item.prop_str("armor_type").unwrap_or("").to_lowercase();
                    match armor_type.as_str() {
                        "chest" | "body" | "torso" => slots.push(EquipmentSlot::Chest),
                        "head" | "helmet" => slots.push(EquipmentSlot::Head),
                        "legs" | "pants" | "greaves" => slots.push(EquipmentSlot::Legs),
                        "feet" | "boots" | "shoes" => slots.push(EquipmentSlot::Feet),
                        "hands" | "gloves" | "gauntlets" => slots.push(EquipmentSlot::Hands),
                        _ => {}
                    }
                }
            }
            ItemType::Accessory => {
                let accessory_type = item.prop_str("accessory_type").unwrap_or("").to_lowercase();
                match accessory_type.as_str() {
                    "ring" => {
                        slots.push(EquipmentSlot::RingLeft);
                        slots.push(EquipmentSlot::RingRight);
                    }
                    "necklace" => slots.push(EquipmentSlot::Neck),
                    "bracelet" => slots.push(EquipmentSlot::Bracelet),
                    "belt" => slots.push(EquipmentSlot::Belt),
                    "cloak" => slots.push(EquipmentSlot::Back),
                    _ => {}
                }
            }
            _ => {}
        }
        slots
    }

    /// Preferred slot wins when admissible; rings prefer the left hand
    /// when empty, else the right; otherwise the first admissible slot.
    fn choose_slot(
        &self,
        admissible: &[EquipmentSlot],
        preferred: Option<EquipmentSlot>,
    ) -> EquipmentSlot {
        if let Some(slot) = preferred {
            if admissible.contains(&slot) {
                return slot;
            }
        }

        let has_left = admissible.contains(&EquipmentSlot::RingLeft);
        let has_right = admissible.contains(&EquipmentSlot::RingRight);
        if has_left || has_right {
            if has_left && !self.is_slot_occupied(EquipmentSlot::RingLeft) {
                return EquipmentSlot::RingLeft;
            }
            if has_right {
                return EquipmentSlot::RingRight;
            }
        }

        admissible[0]
    }

    /// Slots that must be cleared before `item` lands in `target`. The
    /// two-handed check runs in both directions: equipping a two-handed
    /// weapon clears the off hand, and equipping into the off hand clears
    /// a two-handed weapon out of the main hand.
    fn conflicts(
        &self,
        target: EquipmentSlot,
        item: &ItemDef,
        catalog: &ItemCatalog,
    ) -> Vec<EquipmentSlot> {
        let mut conflicts = Vec::new();

        if target == EquipmentSlot::MainHand
            && item.item_type == ItemType::Weapon
            && item.is_two_handed()
        {
            conflicts.push(EquipmentSlot::OffHand);
        } else if target == EquipmentSlot::OffHand {
            if let Some(main) = self.equipped.get(&EquipmentSlot::MainHand) {
                if catalog
                    .get(&main.item_id)
                    .map(ItemDef::is_two_handed)
                    .unwrap_or(false)
                {
                    conflicts.push(EquipmentSlot::MainHand);
                }
            }
        }

        if self.equipped.contains_key(&target) {
            conflicts.push(target);
        }

        conflicts
    }

    pub fn equip(
        &mut self,
        item_id: &str,
        item: &ItemDef,
        inventory: &mut Inventory,
        catalog: &ItemCatalog,
        preferred_slot: Option<EquipmentSlot>,
    ) -> CommandOut {
        if !inventory.has(item_id, 1) {
            return CommandOut::fail(format!(
                "You don't have {} in your inventory.",
                item.name
            ));
        }

        let admissible = Self::admissible_slots(item);
        if admissible.is_empty() {
            return CommandOut::fail_reason(
                format!("{} cannot be equipped.", item.name),
                reason::NO_VALID_SLOTS,
            );
        }

        let target = self.choose_slot(&admissible, preferred_slot);

        let mut unequipped: Vec<Value> = Vec::new();
        for conflicted in self.conflicts(target, item, catalog) {
            if !self.equipped.contains_key(&conflicted) {
                continue;
            }
            let result = self.unequip_from_slot(conflicted, inventory, catalog);
            if result.success {
                unequipped.push(Value::Object(result.data));
            } else {
                return CommandOut::fail_reason(
                    format!("Cannot unequip {} to make room.", result.message),
                    reason::UNEQUIP_FAILED,
                );
            }
        }

        if !inventory.remove(item_id, 1) {
            return CommandOut::fail_reason(
                format!("Failed to remove {} from inventory.", item.name),
                reason::INVENTORY_REMOVAL_FAILED,
            );
        }

        let equipped_item = EquippedItem::new(item_id, target);
        let equipped_json = serde_json::to_value(&equipped_item).unwrap_or(Value::Null);
        self.equipped.insert(target, equipped_item);

        let mut message = format!("You equip {} on your {}.", item.name, target.words());
        if !unequipped.is_empty() {
            let names: Vec<&str> = unequipped
                .iter()
                .filter_map(|u| u.get("item_name").and_then(Value::as_str))
                .collect();
            message.push_str(&format!(" You unequip {} first.", names.join(", ")));
        }

        info!(
            "Entity {} equipped {item_id} in slot {}",
            self.entity_id,
            target.as_str()
        );

        CommandOut::ok(message)
            .with("equipped_item", equipped_json)
            .with("slot", Value::from(target.as_str()))
            .with("unequipped_items", Value::Array(unequipped))
    }

    /// Unequip by item id or slot; exactly one of the two must locate an
    /// equipped row.
    pub fn unequip(
        &mut self,
        item_id: Option<&str>,
        slot: Option<EquipmentSlot>,
        inventory: &mut Inventory,
        catalog: &ItemCatalog,
    ) -> CommandOut {
        let target_slot = if let Some(slot) = slot {
            if !self.equipped.contains_key(&slot) {
                return CommandOut::fail(format!(
                    "Nothing is equipped in your {}.",
                    slot.words()
                ));
            }
            slot
        } else if let Some(item_id) = item_id {
            match self
                .equipped
                .iter()
                .find(|(_, eq)| eq.item_id == item_id)
                .map(|(slot, _)| *slot)
            {
                Some(slot) => slot,
                None => {
                    let item_name = catalog
                        .get(item_id)
                        .map(|i| i.name.clone())
                        .unwrap_or_else(|| item_id.to_string());
                    return CommandOut::fail(format!("You don't have {item_name} equipped."));
                }
            }
        } else {
            return CommandOut::fail_reason(
                "Must specify either item or equipment slot to unequip.",
                reason::MISSING_PARAMETERS,
            );
        };

        self.unequip_from_slot(target_slot, inventory, catalog)
    }

    /// Ordered mutation: the space check runs first, the equipped row is
    /// deleted before the inventory add, and a failed add restores the row.
    fn unequip_from_slot(
        &mut self,
        slot: EquipmentSlot,
        inventory: &mut Inventory,
        catalog: &ItemCatalog,
    ) -> CommandOut {
        let equipped = match self.equipped.get(&slot) {
            Some(eq) => eq.clone(),
            None => return CommandOut::fail(format!("Nothing equipped in {}.", slot.words())),
        };

        let item = match catalog.get(&equipped.item_id) {
            Some(item) => item,
            None => {
                return CommandOut::fail_reason(
                    format!(
                        "Cannot find item data for equipped item {}.",
                        equipped.item_id
                    ),
                    reason::MISSING_ITEM_DATA,
                )
            }
        };

        if !inventory.can_add(&equipped.item_id, 1, item) {
            return CommandOut::fail_reason(
                format!("Not enough space in inventory to unequip {}.", item.name),
                reason::INVENTORY_FULL,
            );
        }

        self.equipped.remove(&slot);

        if inventory.add(&equipped.item_id, 1, catalog) {
            info!(
                "Entity {} unequipped {} from slot {}",
                self.entity_id,
                equipped.item_id,
                slot.as_str()
            );
            CommandOut::ok(format!("You unequip {}.", item.name))
                .with("item_id", Value::from(equipped.item_id.clone()))
                .with("item_name", Value::from(item.name.clone()))
                .with("slot", Value::from(slot.as_str()))
                .with("unequipped_at", Value::from(Utc::now().to_rfc3339()))
        } else {
            // Restore the equipped row so the failed add leaves no gap.
            self.equipped.insert(slot, equipped);
            CommandOut::fail_reason(
                format!("Failed to add {} to inventory.", item.name),
                reason::INVENTORY_ADD_FAILED,
            )
        }
    }

    pub fn equipped_items(&self) -> &BTreeMap<EquipmentSlot, EquippedItem> {
        &self.equipped
    }

    pub fn get_equipped(&self, slot: EquipmentSlot) -> Option<&EquippedItem> {
        self.equipped.get(&slot)
    }

    pub fn is_slot_occupied(&self, slot: EquipmentSlot) -> bool {
        self.equipped.contains_key(&slot)
    }

    /// Fold numeric stat properties across all equipped items. Accepts a
    /// bare number or a `{base, bonus}` object (both parts summed);
    /// resistances merge additively by key, special effects concatenate.
    pub fn equipment_stats(&self, catalog: &ItemCatalog) -> EquipmentStats {
        let mut stats = EquipmentStats::default();

        for equipped in self.equipped.values() {
            let item = match catalog.get(&equipped.item_id) {
                Some(item) => item,
                None => continue,
            };

            for (key, total) in [
                ("armor", &mut stats.armor),
                ("damage", &mut stats.damage),
                ("strength", &mut stats.strength),
                ("dexterity", &mut stats.dexterity),
                ("intelligence", &mut stats.intelligence),
                ("constitution", &mut stats.constitution),
            ] {
                match item.properties.get(key) {
                    Some(value) if value.is_number() => {
                        *total += value.as_f64().unwrap_or(0.0);
                    }
                    Some(Value::Object(parts)) => {
                        if let Some(base) = parts.get("base").and_then(Value::as_f64) {
                            *total += base;
                        }
                        if let Some(bonus) = parts.get("bonus").and_then(Value::as_f64) {
                            *total += bonus;
                        }
                    }
                    Some(other) if !other.is_null() => {
                        warn!(
                            "Invalid stat value for {key} in item {}: {other}",
                            item.item_id
                        );
                    }
                    _ => {}
                }
            }

            if let Some(Value::Object(resistances)) = item.properties.get("resistances") {
                for (res_type, value) in resistances {
                    if let Some(value) = value.as_f64() {
                        *stats.resistances.entry(res_type.clone()).or_default() += value;
                    }
                }
            }

            if let Some(Value::Array(effects)) = item.properties.get("special_effects") {
                for effect in effects {
                    if let Some(effect) = effect.as_str() {
                        stats.special_effects.push(effect.to_string());
                    }
                }
            }
        }

        stats
    }

    /// slot string -> equipped item, for the persistence layer.
    pub fn to_record(&self) -> BTreeMap<String, Value> {
        self.equipped
            .iter()
            .map(|(slot, eq)| {
                (
                    slot.as_str().to_string(),
                    serde_json::to_value(eq).unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    pub fn from_record(entity_id: &str, record: &BTreeMap<String, Value>) -> Self {
        let mut manager = Self::new(entity_id);
        for (slot_name, value) in record {
            let slot = match EquipmentSlot::from_str(slot_name) {
                Some(slot) => slot,
                None => {
                    warn!("Skipping unknown equipment slot in record: {slot_name}");
                    continue;
                }
            };
            match serde_json::from_value::<EquippedItem>(value.clone()) {
                Ok(equipped) => {
                    manager.equipped.insert(slot, equipped);
                }
                Err(e) => warn!("Skipping bad equipped item record in {slot_name}: {e}"),
            }
        }
        manager
    }
}

// ─── System-wide registry ────────────────────────────────────────────

/// Equipment managers for all entities, created on first access.
#[derive(Default)]
pub struct EquipmentSystem {
    managers: HashMap<String, EquipmentManager>,
}

impl EquipmentSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manager(&mut self, entity_id: &str) -> &mut EquipmentManager {
        self.managers
            .entry(entity_id.to_string())
            .or_insert_with(|| EquipmentManager::new(entity_id))
    }

    pub fn manager_ref(&self, entity_id: &str) -> Option<&EquipmentManager> {
        self.managers.get(entity_id)
    }

    pub fn equip(
        &mut self,
        entity_id: &str,
        item_id: &str,
        inventory: &mut Inventory,
        catalog: &ItemCatalog,
        preferred_slot: Option<&str>,
    ) -> CommandOut {
        let item = match catalog.get(item_id) {
            Some(item) => item.clone(),
            None => return CommandOut::fail(format!("Unknown item: {item_id}")),
        };

        let slot = match preferred_slot {
            Some(name) => match EquipmentSlot::from_str(name) {
                Some(slot) => Some(slot),
                None => return CommandOut::fail(format!("Invalid equipment slot: {name}")),
            },
            None => None,
        };

        self.manager(entity_id)
            .equip(item_id, &item, inventory, catalog, slot)
    }

    pub fn unequip(
        &mut self,
        entity_id: &str,
        item_id: Option<&str>,
        slot: Option<&str>,
        inventory: &mut Inventory,
        catalog: &ItemCatalog,
    ) -> CommandOut {
        let slot = match slot {
            Some(name) => match EquipmentSlot::from_str(name) {
                Some(slot) => Some(slot),
                None => return CommandOut::fail(format!("Invalid equipment slot: {name}")),
            },
            None => None,
        };

        match self.managers.get_mut(entity_id) {
            Some(manager) => manager.unequip(item_id, slot, inventory, catalog),
            None => CommandOut::fail("No equipment found."),
        }
    }

    pub fn insert_manager(&mut self, manager: EquipmentManager) {
        self.managers.insert(manager.entity_id.clone(), manager);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::catalog::starter_catalog;

    fn setup() -> (ItemCatalog, Inventory, EquipmentManager) {
        let catalog = starter_catalog();
        let inventory = Inventory::new("player_1", Some(30), Some(100.0));
        let manager = EquipmentManager::new("player_1");
        (catalog, inventory, manager)
    }

    #[test]
    fn equip_requires_item_in_inventory() {
        let (catalog, mut inv, mut eq) = setup();
        let sword = catalog.get("iron_sword").unwrap().clone();
        let result = eq.equip("iron_sword", &sword, &mut inv, &catalog, None);
        assert!(!result.success);
    }

    #[test]
    fn equip_places_weapon_in_main_hand() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("iron_sword", 1, &catalog);
        let sword = catalog.get("iron_sword").unwrap().clone();

        let result = eq.equip("iron_sword", &sword, &mut inv, &catalog, None);
        assert!(result.success);
        assert_eq!(result.message, "You equip Iron Sword on your main hand.");
        assert!(eq.is_slot_occupied(EquipmentSlot::MainHand));
        assert_eq!(inv.quantity("iron_sword"), 0);
    }

    #[test]
    fn unequippable_type_reports_no_valid_slots() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("bread", 1, &catalog);
        let bread = catalog.get("bread").unwrap().clone();
        let result = eq.equip("bread", &bread, &mut inv, &catalog, None);
        assert!(!result.success);
        assert_eq!(result.reason(), Some("no_valid_slots"));
    }

    #[test]
    fn rings_prefer_left_then_right() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("magic_ring", 2, &catalog);
        let ring = catalog.get("magic_ring").unwrap().clone();

        let first = eq.equip("magic_ring", &ring, &mut inv, &catalog, None);
        assert!(first.success);
        assert!(eq.is_slot_occupied(EquipmentSlot::RingLeft));

        let second = eq.equip("magic_ring", &ring, &mut inv, &catalog, None);
        assert!(second.success);
        assert!(eq.is_slot_occupied(EquipmentSlot::RingRight));
    }

    #[test]
    fn two_handed_weapon_auto_unequips_off_hand() {
        // Sword + shield equipped, then a two-handed sword arrives.
        let (catalog, mut inv, mut eq) = setup();
        inv.add("iron_sword", 1, &catalog);
        inv.add("wooden_shield", 1, &catalog);
        inv.add("two_handed_sword", 1, &catalog);

        let sword = catalog.get("iron_sword").unwrap().clone();
        let shield = catalog.get("wooden_shield").unwrap().clone();
        let greatsword = catalog.get("two_handed_sword").unwrap().clone();

        assert!(eq.equip("iron_sword", &sword, &mut inv, &catalog, None).success);
        assert!(eq
            .equip("wooden_shield", &shield, &mut inv, &catalog, None)
            .success);

        let result = eq.equip("two_handed_sword", &greatsword, &mut inv, &catalog, None);
        assert!(result.success);

        // Main hand holds the greatsword, off hand is empty, both the old
        // sword and the shield went back to the inventory.
        assert_eq!(
            eq.get_equipped(EquipmentSlot::MainHand).unwrap().item_id,
            "two_handed_sword"
        );
        assert!(!eq.is_slot_occupied(EquipmentSlot::OffHand));
        assert_eq!(inv.quantity("iron_sword"), 1);
        assert_eq!(inv.quantity("wooden_shield"), 1);

        let unequipped = result.data.get("unequipped_items").unwrap();
        let names: Vec<&str> = unequipped
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|u| u.get("item_name").and_then(Value::as_str))
            .collect();
        assert!(names.contains(&"Wooden Shield"));
    }

    #[test]
    fn off_hand_equip_clears_two_handed_main_hand() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("two_handed_sword", 1, &catalog);
        inv.add("wooden_shield", 1, &catalog);

        let greatsword = catalog.get("two_handed_sword").unwrap().clone();
        let shield = catalog.get("wooden_shield").unwrap().clone();

        assert!(eq
            .equip("two_handed_sword", &greatsword, &mut inv, &catalog, None)
            .success);

        let result = eq.equip("wooden_shield", &shield, &mut inv, &catalog, None);
        assert!(result.success);
        assert!(!eq.is_slot_occupied(EquipmentSlot::MainHand));
        assert_eq!(inv.quantity("two_handed_sword"), 1);
    }

    #[test]
    fn unequip_into_full_inventory_restores_the_row() {
        let catalog = starter_catalog();
        let mut inv = Inventory::new("player_1", Some(2), None);
        let mut eq = EquipmentManager::new("player_1");

        inv.add("iron_sword", 1, &catalog);
        let sword = catalog.get("iron_sword").unwrap().clone();
        assert!(eq.equip("iron_sword", &sword, &mut inv, &catalog, None).success);

        // Fill both slots so the sword has nowhere to go.
        inv.add("wooden_shield", 1, &catalog);
        inv.add("leather_armor", 1, &catalog);

        let result = eq.unequip(Some("iron_sword"), None, &mut inv, &catalog);
        assert!(!result.success);
        assert_eq!(result.reason(), Some("inventory_full"));
        assert!(eq.is_slot_occupied(EquipmentSlot::MainHand));
    }

    #[test]
    fn unequip_needs_item_or_slot() {
        let (catalog, mut inv, mut eq) = setup();
        let result = eq.unequip(None, None, &mut inv, &catalog);
        assert!(!result.success);
        assert_eq!(result.reason(), Some("missing_parameters"));
    }

    #[test]
    fn unequip_by_slot_returns_item_to_inventory() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("magic_ring", 1, &catalog);
        let ring = catalog.get("magic_ring").unwrap().clone();
        eq.equip("magic_ring", &ring, &mut inv, &catalog, None);

        let result = eq.unequip(None, Some(EquipmentSlot::RingLeft), &mut inv, &catalog);
        assert!(result.success);
        assert!(!eq.is_slot_occupied(EquipmentSlot::RingLeft));
        assert_eq!(inv.quantity("magic_ring"), 1);
    }

    #[test]
    fn preferred_slot_overrides_ring_preference() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("magic_ring", 1, &catalog);
        let ring = catalog.get("magic_ring").unwrap().clone();

        let result = eq.equip(
            "magic_ring",
            &ring,
            &mut inv,
            &catalog,
            Some(EquipmentSlot::RingRight),
        );
        assert!(result.success);
        assert!(eq.is_slot_occupied(EquipmentSlot::RingRight));
        assert!(!eq.is_slot_occupied(EquipmentSlot::RingLeft));
    }

    #[test]
    fn stats_fold_numbers_and_base_bonus_shapes() {
        let mut catalog = starter_catalog();
        let mut amulet = catalog.get("magic_ring").unwrap().clone();
        amulet.item_id = "test_amulet".to_string();
        amulet.name = "Test Amulet".to_string();
        amulet.properties.insert(
            "armor".to_string(),
            serde_json::json!({ "base": 2, "bonus": 1 }),
        );
        amulet
            .properties
            .insert("resistances".to_string(), serde_json::json!({ "fire": 5 }));
        amulet.properties.insert(
            "special_effects".to_string(),
            serde_json::json!(["night vision"]),
        );
        amulet
            .properties
            .insert("accessory_type".to_string(), Value::from("necklace"));
        catalog.register(amulet);

        let mut inv = Inventory::new("player_1", Some(30), None);
        let mut eq = EquipmentManager::new("player_1");
        inv.add("test_amulet", 1, &catalog);
        inv.add("iron_sword", 1, &catalog);

        let amulet = catalog.get("test_amulet").unwrap().clone();
        let sword = catalog.get("iron_sword").unwrap().clone();
        assert!(eq
            .equip("test_amulet", &amulet, &mut inv, &catalog, None)
            .success);
        assert!(eq.equip("iron_sword", &sword, &mut inv, &catalog, None).success);

        let stats = eq.equipment_stats(&catalog);
        assert!((stats.armor - 3.0).abs() < 1e-9);
        assert!((stats.damage - 6.0).abs() < 1e-9);
        assert!((stats.intelligence - 2.0).abs() < 1e-9);
        assert_eq!(stats.resistances.get("fire"), Some(&5.0));
        assert_eq!(stats.special_effects, vec!["night vision".to_string()]);
    }

    #[test]
    fn at_most_one_item_per_slot() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("iron_sword", 1, &catalog);
        inv.add("iron_dagger", 1, &catalog);

        let sword = catalog.get("iron_sword").unwrap().clone();
        let dagger = catalog.get("iron_dagger").unwrap().clone();

        eq.equip("iron_sword", &sword, &mut inv, &catalog, None);
        let result = eq.equip("iron_dagger", &dagger, &mut inv, &catalog, None);
        assert!(result.success);

        // The sword was swapped out; main hand holds exactly the dagger.
        assert_eq!(
            eq.get_equipped(EquipmentSlot::MainHand).unwrap().item_id,
            "iron_dagger"
        );
        assert_eq!(inv.quantity("iron_sword"), 1);
    }

    #[test]
    fn record_round_trip_preserves_equipped_items() {
        let (catalog, mut inv, mut eq) = setup();
        inv.add("iron_sword", 1, &catalog);
        let sword = catalog.get("iron_sword").unwrap().clone();
        eq.equip("iron_sword", &sword, &mut inv, &catalog, None);

        let record = eq.to_record();
        let restored = EquipmentManager::from_record("player_1", &record);
        assert_eq!(
            restored
                .get_equipped(EquipmentSlot::MainHand)
                .unwrap()
                .item_id,
            "iron_sword"
        );
    }
}
