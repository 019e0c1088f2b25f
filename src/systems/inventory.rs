//! Stack-packed inventories with slot and weight capacity limits.
//!
//! An inventory is an ordered list of non-empty slots plus a cached
//! `item_id -> slot positions` index. Adds fill existing stack rows first
//! (in index order) and append new rows for the remainder; removes drain
//! rows in index order and drop emptied rows eagerly.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::systems::catalog::{ItemCatalog, ItemDef};

// ─── Slots ───────────────────────────────────────────────────────────

/// One row in an inventory: an item id and a quantity, optionally carrying
/// per-instance properties that make it non-stackable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySlot {
    pub item_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub instance_properties: Map<String, Value>,
}

impl InventorySlot {
    pub fn new(item_id: &str, quantity: u32) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
            instance_properties: Map::new(),
        }
    }

    fn has_instance_properties(&self) -> bool {
        self.instance_properties.values().any(|v| !v.is_null())
    }

    /// Two slots may share a row iff they hold the same item and neither
    /// carries instance properties.
    pub fn can_stack_with(&self, other: &InventorySlot) -> bool {
        self.item_id == other.item_id
            && !self.has_instance_properties()
            && !other.has_instance_properties()
    }

    /// Merge as much of `other` into this slot as `max_stack` allows.
    /// Returns the overflow that would not fit (left in `other`).
    #[allow(dead_code)]
    pub fn merge_from(&mut self, other: &mut InventorySlot, max_stack: u32) -> u32 {
        if !self.can_stack_with(other) {
            return other.quantity;
        }
        let space = max_stack.saturating_sub(self.quantity);
        let moved = other.quantity.min(space);
        self.quantity += moved;
        other.quantity -= moved;
        other.quantity
    }

    /// Split off `amount` into a new slot. Splits of 0 or of the full
    /// quantity (or more) are invalid and return `None`.
    #[allow(dead_code)]
    pub fn split(&mut self, amount: u32) -> Option<InventorySlot> {
        if amount == 0 || amount >= self.quantity {
            return None;
        }
        self.quantity -= amount;
        Some(InventorySlot {
            item_id: self.item_id.clone(),
            quantity: amount,
            instance_properties: self.instance_properties.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}

// ─── Inventory ───────────────────────────────────────────────────────

/// Serializable inventory statistics.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryStats {
    pub owner_id: String,
    pub total_items: u32,
    pub unique_items: usize,
    pub used_slots: usize,
    pub capacity_slots: Option<usize>,
    pub available_slots: Option<usize>,
    pub current_weight: f64,
    pub capacity_weight: Option<f64>,
    pub available_weight: Option<f64>,
    pub is_full: bool,
    pub last_modified: DateTime<Utc>,
}

/// Snapshot record for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub owner_id: String,
    pub capacity_slots: Option<usize>,
    pub capacity_weight: Option<f64>,
    pub current_weight: f64,
    pub slots: Vec<InventorySlot>,
    pub last_modified: DateTime<Utc>,
}

pub struct Inventory {
    owner_id: String,
    pub capacity_slots: Option<usize>,
    pub capacity_weight: Option<f64>,
    current_weight: f64,
    slots: Vec<InventorySlot>,
    /// item_id -> slot positions, mirrors `slots` exactly after mutation
    slot_index: HashMap<String, Vec<usize>>,
    /// item_id -> unit weight learned at add time; weight is recomputed
    /// from the catalog whenever a record is restored
    unit_weights: HashMap<String, f64>,
    last_modified: DateTime<Utc>,
}

impl Inventory {
    pub fn new(
        owner_id: &str,
        capacity_slots: Option<usize>,
        capacity_weight: Option<f64>,
    ) -> Self {
        debug!("Created inventory for {owner_id}");
        Self {
            owner_id: owner_id.to_string(),
            capacity_slots,
            capacity_weight,
            current_weight: 0.0,
            slots: Vec::new(),
            slot_index: HashMap::new(),
            unit_weights: HashMap::new(),
            last_modified: Utc::now(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn rebuild_index(&mut self) {
        self.slot_index.clear();
        for (i, slot) in self.slots.iter().enumerate() {
            self.slot_index
                .entry(slot.item_id.clone())
                .or_default()
                .push(i);
        }
    }

    fn recompute_weight(&mut self) {
        self.current_weight = self
            .slots
            .iter()
            .map(|s| {
                self.unit_weights.get(&s.item_id).copied().unwrap_or(0.0) * s.quantity as f64
            })
            .sum();
    }

    /// Capacity pre-check: weight cap first, then the slot cap counted as
    /// the deficit after filling existing stack rows. A stackable overflow
    /// needs ceil(overflow / max_stack) new rows, a non-stackable add needs
    /// one row per unit.
    pub fn can_add(&self, item_id: &str, quantity: u32, item: &ItemDef) -> bool {
        if let Some(cap) = self.capacity_weight {
            if self.current_weight + item.weight * quantity as f64 > cap {
                return false;
            }
        }

        let max_stack = item.stack_limit();
        let existing = self
            .slot_index
            .get(item_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if item.stackable && !existing.is_empty() {
            let mut remaining = quantity;
            for &idx in existing {
                let space = max_stack.saturating_sub(self.slots[idx].quantity);
                remaining = remaining.saturating_sub(space);
                if remaining == 0 {
                    return true;
                }
            }
            if let Some(cap) = self.capacity_slots {
                let new_rows = remaining.div_ceil(max_stack) as usize;
                if self.slots.len() + new_rows > cap {
                    return false;
                }
            }
        } else if let Some(cap) = self.capacity_slots {
            let new_rows = if item.stackable {
                quantity.div_ceil(max_stack) as usize
            } else {
                quantity as usize
            };
            if self.slots.len() + new_rows > cap {
                return false;
            }
        }

        true
    }

    /// Add items. Returns false for a zero quantity, an unknown item, or
    /// a capacity violation; on success the slot list, index, weight and
    /// modification time are all updated.
    pub fn add(&mut self, item_id: &str, quantity: u32, catalog: &ItemCatalog) -> bool {
        if quantity == 0 {
            return false;
        }

        let item = match catalog.get(item_id) {
            Some(item) => item.clone(),
            None => {
                warn!("Unknown item id: {item_id}");
                return false;
            }
        };

        if !self.can_add(item_id, quantity, &item) {
            debug!(
                "Cannot add {quantity}x {item_id} to inventory {} (capacity exceeded)",
                self.owner_id
            );
            return false;
        }

        let max_stack = item.stack_limit();
        let mut remaining = quantity;

        // Fill existing stack rows first, in index order.
        if item.stackable {
            let indices = self.slot_index.get(item_id).cloned().unwrap_or_default();
            for idx in indices {
                if remaining == 0 {
                    break;
                }
                let slot = &mut self.slots[idx];
                let space = max_stack.saturating_sub(slot.quantity);
                let moved = remaining.min(space);
                slot.quantity += moved;
                remaining -= moved;
            }
        }

        // Append new rows for the remainder.
        while remaining > 0 {
            let chunk = if item.stackable {
                remaining.min(max_stack)
            } else {
                1
            };
            self.slots.push(InventorySlot::new(item_id, chunk));
            self.slot_index
                .entry(item_id.to_string())
                .or_default()
                .push(self.slots.len() - 1);
            remaining -= chunk;
        }

        self.unit_weights.insert(item_id.to_string(), item.weight);
        self.recompute_weight();
        self.last_modified = Utc::now();

        debug!("Added {quantity}x {item_id} to inventory {}", self.owner_id);
        true
    }

    /// Remove items, draining rows in index order and dropping emptied
    /// rows. Returns false for a zero quantity or insufficient stock.
    pub fn remove(&mut self, item_id: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return false;
        }
        if !self.has(item_id, quantity) {
            return false;
        }

        let mut remaining = quantity;
        let indices = self.slot_index.get(item_id).cloned().unwrap_or_default();
        for idx in indices {
            if remaining == 0 {
                break;
            }
            let slot = &mut self.slots[idx];
            let removed = slot.quantity.min(remaining);
            slot.quantity -= removed;
            remaining -= removed;
        }

        self.slots.retain(|s| !s.is_empty());
        self.rebuild_index();
        self.recompute_weight();
        self.last_modified = Utc::now();

        debug!(
            "Removed {quantity}x {item_id} from inventory {}",
            self.owner_id
        );
        true
    }

    pub fn has(&self, item_id: &str, quantity: u32) -> bool {
        self.quantity(item_id) >= quantity
    }

    pub fn quantity(&self, item_id: &str) -> u32 {
        self.slot_index
            .get(item_id)
            .map(|indices| indices.iter().map(|&i| self.slots[i].quantity).sum())
            .unwrap_or(0)
    }

    pub fn all_items(&self) -> &[InventorySlot] {
        &self.slots
    }

    /// item_id -> total quantity across rows.
    #[allow(dead_code)]
    pub fn summary(&self) -> BTreeMap<String, u32> {
        let mut summary = BTreeMap::new();
        for slot in &self.slots {
            *summary.entry(slot.item_id.clone()).or_default() += slot.quantity;
        }
        summary
    }

    pub fn available_slots(&self) -> Option<usize> {
        self.capacity_slots
            .map(|cap| cap.saturating_sub(self.slots.len()))
    }

    pub fn available_weight(&self) -> Option<f64> {
        self.capacity_weight
            .map(|cap| (cap - self.current_weight).max(0.0))
    }

    pub fn is_full(&self) -> bool {
        if let Some(cap) = self.capacity_slots {
            if self.slots.len() >= cap {
                return true;
            }
        }
        if let Some(cap) = self.capacity_weight {
            if self.current_weight >= cap {
                return true;
            }
        }
        false
    }

    pub fn current_weight(&self) -> f64 {
        self.current_weight
    }

    #[allow(dead_code)]
    pub fn clear(&mut self) {
        self.slots.clear();
        self.slot_index.clear();
        self.unit_weights.clear();
        self.current_weight = 0.0;
        self.last_modified = Utc::now();
        debug!("Cleared inventory {}", self.owner_id);
    }

    pub fn stats(&self) -> InventoryStats {
        InventoryStats {
            owner_id: self.owner_id.clone(),
            total_items: self.slots.iter().map(|s| s.quantity).sum(),
            unique_items: self.slot_index.len(),
            used_slots: self.slots.len(),
            capacity_slots: self.capacity_slots,
            available_slots: self.available_slots(),
            current_weight: self.current_weight,
            capacity_weight: self.capacity_weight,
            available_weight: self.available_weight(),
            is_full: self.is_full(),
            last_modified: self.last_modified,
        }
    }

    pub fn to_record(&self) -> InventoryRecord {
        InventoryRecord {
            owner_id: self.owner_id.clone(),
            capacity_slots: self.capacity_slots,
            capacity_weight: self.capacity_weight,
            current_weight: self.current_weight,
            slots: self.slots.clone(),
            last_modified: self.last_modified,
        }
    }

    /// Restore from a snapshot record. Weight is recomputed from the
    /// catalog rather than trusting the recorded value.
    pub fn from_record(record: InventoryRecord, catalog: &ItemCatalog) -> Self {
        let mut inventory = Self::new(
            &record.owner_id,
            record.capacity_slots,
            record.capacity_weight,
        );
        inventory.slots = record.slots.into_iter().filter(|s| !s.is_empty()).collect();
        inventory.rebuild_index();
        for slot in &inventory.slots {
            let weight = catalog.get(&slot.item_id).map(|i| i.weight).unwrap_or(0.0);
            inventory.unit_weights.insert(slot.item_id.clone(), weight);
        }
        inventory.recompute_weight();
        inventory.last_modified = record.last_modified;
        inventory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::catalog::starter_catalog;

    fn player_inventory() -> Inventory {
        Inventory::new("player_1", Some(30), Some(100.0))
    }

    #[test]
    fn add_zero_or_unknown_fails() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        assert!(!inv.add("bread", 0, &catalog));
        assert!(!inv.add("no_such_item", 1, &catalog));
    }

    #[test]
    fn quantity_equals_sum_over_rows() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        // Potion max stack is 10; 25 should pack into rows of 10/10/5.
        assert!(inv.add("health_potion_small", 25, &catalog));
        assert_eq!(inv.quantity("health_potion_small"), 25);
        assert_eq!(inv.all_items().len(), 3);
        let row_sum: u32 = inv
            .all_items()
            .iter()
            .filter(|s| s.item_id == "health_potion_small")
            .map(|s| s.quantity)
            .sum();
        assert_eq!(row_sum, 25);
    }

    #[test]
    fn add_fills_existing_rows_before_appending() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("health_potion_small", 7, &catalog);
        inv.add("health_potion_small", 5, &catalog);
        // 7 + 3 fills the first row, 2 spill into a second.
        let rows: Vec<u32> = inv.all_items().iter().map(|s| s.quantity).collect();
        assert_eq!(rows, vec![10, 2]);
    }

    #[test]
    fn non_stackable_items_take_one_row_each() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        assert!(inv.add("iron_sword", 3, &catalog));
        assert_eq!(inv.all_items().len(), 3);
        assert!(inv.all_items().iter().all(|s| s.quantity == 1));
    }

    #[test]
    fn weight_tracks_adds_and_removes() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("iron_sword", 2, &catalog);
        assert!((inv.current_weight() - 6.0).abs() < 1e-9);
        inv.remove("iron_sword", 1);
        assert!((inv.current_weight() - 3.0).abs() < 1e-9);
        inv.remove("iron_sword", 1);
        assert!(inv.current_weight().abs() < 1e-9);
    }

    #[test]
    fn weight_cap_rejects_overflow() {
        let catalog = starter_catalog();
        let mut inv = Inventory::new("small", None, Some(10.0));
        assert!(inv.add("iron_sword", 3, &catalog)); // 9.0
        assert!(!inv.add("iron_sword", 1, &catalog)); // would be 12.0
        assert!(inv.add("lockpick", 1, &catalog)); // 9.1
    }

    #[test]
    fn slot_cap_counts_stack_deficit_not_raw_quantity() {
        let catalog = starter_catalog();
        let mut inv = Inventory::new("tight", Some(2), None);
        // 10 fills one row exactly; 15 more needs rows of 10 and 5 -> over cap.
        assert!(inv.add("health_potion_small", 10, &catalog));
        assert!(!inv.add("health_potion_small", 15, &catalog));
        // 10 more is exactly one new row.
        assert!(inv.add("health_potion_small", 10, &catalog));
        assert!(inv.is_full());
    }

    #[test]
    fn add_then_remove_is_a_no_op_on_the_multiset() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("bread", 5, &catalog);
        let before = inv.summary();
        let weight_before = inv.current_weight();

        assert!(inv.add("health_potion_small", 12, &catalog));
        assert!(inv.remove("health_potion_small", 12));

        assert_eq!(inv.summary(), before);
        assert!((inv.current_weight() - weight_before).abs() < 1e-9);
    }

    #[test]
    fn remove_drains_rows_in_index_order() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("health_potion_small", 22, &catalog); // rows 10/10/2
        assert!(inv.remove("health_potion_small", 15)); // drains 10 + 5
        assert_eq!(inv.quantity("health_potion_small"), 7);
        let rows: Vec<u32> = inv.all_items().iter().map(|s| s.quantity).collect();
        assert_eq!(rows, vec![5, 2]);
    }

    #[test]
    fn remove_more_than_held_fails_without_mutation() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("bread", 3, &catalog);
        assert!(!inv.remove("bread", 4));
        assert_eq!(inv.quantity("bread"), 3);
    }

    #[test]
    fn split_rejects_zero_and_full_quantity() {
        let mut slot = InventorySlot::new("bread", 5);
        assert!(slot.split(0).is_none());
        assert!(slot.split(5).is_none());
        assert!(slot.split(6).is_none());
        let split = slot.split(2).unwrap();
        assert_eq!(split.quantity, 2);
        assert_eq!(slot.quantity, 3);
    }

    #[test]
    fn slots_with_instance_properties_do_not_stack() {
        let mut a = InventorySlot::new("iron_sword", 1);
        let mut b = InventorySlot::new("iron_sword", 1);
        b.instance_properties
            .insert("inscription".to_string(), Value::from("runed"));
        assert!(!a.can_stack_with(&b));
        assert_eq!(a.merge_from(&mut b, 99), 1);
    }

    #[test]
    fn record_round_trip_recomputes_weight_from_catalog() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("iron_sword", 1, &catalog);
        inv.add("health_potion_small", 4, &catalog);

        let mut record = inv.to_record();
        record.current_weight = 9999.0; // recorded weight must not be trusted
        let restored = Inventory::from_record(record, &catalog);

        assert_eq!(restored.quantity("iron_sword"), 1);
        assert_eq!(restored.quantity("health_potion_small"), 4);
        assert!((restored.current_weight() - (3.0 + 4.0 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn stats_report_capacity_and_usage() {
        let catalog = starter_catalog();
        let mut inv = player_inventory();
        inv.add("bread", 5, &catalog);
        let stats = inv.stats();
        assert_eq!(stats.total_items, 5);
        assert_eq!(stats.unique_items, 1);
        assert_eq!(stats.used_slots, 1);
        assert_eq!(stats.available_slots, Some(29));
        assert!(!stats.is_full);
    }
}
