//! Per-location ground and named containers.
//!
//! Each location owns at most one GROUND container, created lazily by the
//! first drop. Named containers carry lock, key and hidden-discovery state;
//! their default capacities and quirks come from a fixed per-type behavior
//! table. All container inventories follow the same stacking and capacity
//! contracts as entity inventories.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::events::{event_data, EventBus, EventType, SourceSystem};
use crate::msg::CommandOut;
use crate::systems::catalog::{ItemCatalog, ItemType};
use crate::systems::inventory::{Inventory, InventorySlot};

// ─── Container types and behaviors ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Ground,
    Chest,
    Barrel,
    Corpse,
    Shop,
    Npc,
    Bookshelf,
    WeaponRack,
    Altar,
    LootContainer,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ground => "ground",
            Self::Chest => "chest",
            Self::Barrel => "barrel",
            Self::Corpse => "corpse",
            Self::Shop => "shop",
            Self::Npc => "npc",
            Self::Bookshelf => "bookshelf",
            Self::WeaponRack => "weapon_rack",
            Self::Altar => "altar",
            Self::LootContainer => "loot_container",
        }
    }
}

/// Fixed per-type defaults and quirks.
#[allow(dead_code)]
pub struct ContainerBehavior {
    pub can_be_locked: bool,
    pub default_capacity_slots: usize,
    pub default_capacity_weight: f64,
    pub discovery_hint: &'static str,
    pub unlock_difficulty_modifier: i32,
    pub item_type_restriction: &'static [ItemType],
    pub special_search: Option<&'static str>,
    pub special_requirements: Option<&'static str>,
    pub always_hidden: bool,
}

const NO_RESTRICTION: &[ItemType] = &[];
const RACK_RESTRICTION: &[ItemType] = &[ItemType::Weapon, ItemType::Shield];

pub fn behaviors_for(container_type: ContainerType) -> ContainerBehavior {
    match container_type {
        ContainerType::Chest => ContainerBehavior {
            can_be_locked: true,
            default_capacity_slots: 20,
            default_capacity_weight: 200.0,
            discovery_hint: "a wooden chest",
            unlock_difficulty_modifier: 0,
            item_type_restriction: NO_RESTRICTION,
            special_search: None,
            special_requirements: None,
            always_hidden: false,
        },
        ContainerType::Barrel => ContainerBehavior {
            can_be_locked: false,
            default_capacity_slots: 15,
            default_capacity_weight: 150.0,
            discovery_hint: "a storage barrel",
            unlock_difficulty_modifier: -5,
            item_type_restriction: NO_RESTRICTION,
            special_search: None,
            special_requirements: None,
            always_hidden: false,
        },
        ContainerType::Bookshelf => ContainerBehavior {
            can_be_locked: true,
            default_capacity_slots: 30,
            default_capacity_weight: 50.0,
            discovery_hint: "a bookshelf with compartments",
            unlock_difficulty_modifier: 5,
            item_type_restriction: NO_RESTRICTION,
            special_search: Some("requires careful examination of books"),
            special_requirements: None,
            always_hidden: false,
        },
        ContainerType::WeaponRack => ContainerBehavior {
            can_be_locked: true,
            default_capacity_slots: 10,
            default_capacity_weight: 100.0,
            discovery_hint: "a weapon rack",
            unlock_difficulty_modifier: 0,
            item_type_restriction: RACK_RESTRICTION,
            special_search: None,
            special_requirements: None,
            always_hidden: false,
        },
        ContainerType::Altar => ContainerBehavior {
            can_be_locked: false,
            default_capacity_slots: 5,
            default_capacity_weight: 20.0,
            discovery_hint: "a sacred altar",
            unlock_difficulty_modifier: 10,
            item_type_restriction: NO_RESTRICTION,
            special_search: None,
            special_requirements: Some("requires reverent approach"),
            always_hidden: false,
        },
        ContainerType::LootContainer => ContainerBehavior {
            can_be_locked: true,
            default_capacity_slots: 12,
            default_capacity_weight: 100.0,
            discovery_hint: "a hidden container",
            unlock_difficulty_modifier: 3,
            item_type_restriction: NO_RESTRICTION,
            special_search: None,
            special_requirements: None,
            always_hidden: true,
        },
        _ => ContainerBehavior {
            can_be_locked: true,
            default_capacity_slots: 10,
            default_capacity_weight: 50.0,
            discovery_hint: "a container",
            unlock_difficulty_modifier: 0,
            item_type_restriction: NO_RESTRICTION,
            special_search: None,
            special_requirements: None,
            always_hidden: false,
        },
    }
}

// ─── Container data ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerData {
    pub container_id: String,
    pub container_type: ContainerType,
    pub location_id: String,
    pub name: String,
    pub description: String,
    pub capacity_slots: Option<usize>,
    pub capacity_weight: Option<f64>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub lock_difficulty: i32,
    #[serde(default)]
    pub key_required: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub discovery_difficulty: i32,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional overrides for `create_container`.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub capacity_slots: Option<usize>,
    pub capacity_weight: Option<f64>,
    pub is_locked: bool,
    pub lock_difficulty: i32,
    pub key_required: Option<String>,
    pub is_hidden: bool,
    pub discovery_difficulty: i32,
    pub owner_id: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancementLevel {
    Basic,
    Enhanced,
    Legendary,
}

// ─── Query results ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UnlockCheck {
    pub can_unlock: bool,
    pub methods: Vec<String>,
    pub required_items: Vec<String>,
    pub required_skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub container_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    /// Containers newly revealed by this search.
    pub discovered: Vec<ContainerSummary>,
    /// All containers visible after the search.
    pub visible: Vec<ContainerSummary>,
    pub special_discoveries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerView {
    pub name: String,
    pub container_type: String,
    pub description: String,
    pub items: Vec<ItemView>,
    pub is_locked: bool,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationItems {
    pub ground_items: Vec<ItemView>,
    pub containers: BTreeMap<String, ContainerView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSystemStatus {
    pub total_locations: usize,
    pub total_containers: usize,
    pub total_ground_locations: usize,
    pub total_items_on_ground: usize,
}

// ─── The system ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct LocationContainerSystem {
    /// location_id -> container_id -> data
    location_containers: HashMap<String, BTreeMap<String, ContainerData>>,
    /// container_id -> holdings
    container_inventories: HashMap<String, Inventory>,
    /// location_id -> item ids currently on the ground
    ground_items: HashMap<String, BTreeSet<String>>,
}

impl LocationContainerSystem {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Container management ────────────────────────────────────

    pub fn create_container(
        &mut self,
        location_id: &str,
        container_type: ContainerType,
        name: &str,
        description: &str,
        config: ContainerConfig,
    ) -> String {
        let container_id = format!(
            "container_{location_id}_{:08x}",
            rand::thread_rng().gen::<u32>()
        );

        let data = ContainerData {
            container_id: container_id.clone(),
            container_type,
            location_id: location_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            capacity_slots: config.capacity_slots,
            capacity_weight: config.capacity_weight,
            is_locked: config.is_locked,
            lock_difficulty: config.lock_difficulty,
            key_required: config.key_required,
            is_hidden: config.is_hidden,
            discovery_difficulty: config.discovery_difficulty,
            owner_id: config.owner_id,
            created_at: Utc::now(),
        };

        let inventory = Inventory::new(&container_id, data.capacity_slots, data.capacity_weight);

        self.location_containers
            .entry(location_id.to_string())
            .or_default()
            .insert(container_id.clone(), data);
        self.container_inventories
            .insert(container_id.clone(), inventory);

        info!(
            "Created {} container '{name}' in location {location_id}",
            container_type.as_str()
        );
        container_id
    }

    /// Create a container with type defaults applied, optionally upgraded
    /// by an enhancement tier: `enhanced` multiplies capacity x1.5 and has
    /// a 50% chance of a 5-15 lock; `legendary` multiplies x2, is always
    /// locked at 15-25, and has a 30% chance of needing a type master key.
    #[allow(dead_code)]
    pub fn create_enhanced_container(
        &mut self,
        location_id: &str,
        container_type: ContainerType,
        name: &str,
        description: &str,
        level: EnhancementLevel,
        mut config: ContainerConfig,
    ) -> String {
        let behaviors = behaviors_for(container_type);

        if config.capacity_slots.is_none() {
            config.capacity_slots = Some(behaviors.default_capacity_slots);
        }
        if config.capacity_weight.is_none() {
            config.capacity_weight = Some(behaviors.default_capacity_weight);
        }

        let mut rng = rand::thread_rng();
        match level {
            EnhancementLevel::Basic => {}
            EnhancementLevel::Enhanced => {
                config.capacity_slots =
                    config.capacity_slots.map(|c| (c as f64 * 1.5) as usize);
                config.capacity_weight = config.capacity_weight.map(|w| w * 1.5);
                if behaviors.can_be_locked && !config.is_locked && rng.gen_bool(0.5) {
                    config.is_locked = true;
                    config.lock_difficulty = rng.gen_range(5..=15);
                }
            }
            EnhancementLevel::Legendary => {
                config.capacity_slots = config.capacity_slots.map(|c| c * 2);
                config.capacity_weight = config.capacity_weight.map(|w| w * 2.0);
                if behaviors.can_be_locked {
                    config.is_locked = true;
                    config.lock_difficulty = rng.gen_range(15..=25);
                    if config.key_required.is_none() && rng.gen_bool(0.3) {
                        config.key_required =
                            Some(format!("{}_master_key", container_type.as_str()));
                    }
                }
            }
        }

        self.create_container(location_id, container_type, name, description, config)
    }

    pub fn get_container(&self, container_id: &str) -> Option<&ContainerData> {
        self.location_containers
            .values()
            .find_map(|containers| containers.get(container_id))
    }

    fn get_container_mut(&mut self, container_id: &str) -> Option<&mut ContainerData> {
        self.location_containers
            .values_mut()
            .find_map(|containers| containers.get_mut(container_id))
    }

    pub fn containers_in_location(
        &self,
        location_id: &str,
    ) -> Option<&BTreeMap<String, ContainerData>> {
        self.location_containers.get(location_id)
    }

    pub fn container_inventory(&self, container_id: &str) -> Option<&Inventory> {
        self.container_inventories.get(container_id)
    }

    /// Find a visible container at a location by (partial) name match.
    /// Hidden containers stay unfindable until discovered.
    pub fn find_visible_by_name(&self, location_id: &str, name: &str) -> Option<&ContainerData> {
        let name = name.to_lowercase();
        self.location_containers.get(location_id)?.values().find(|c| {
            !c.is_hidden
                && c.container_type != ContainerType::Ground
                && c.name.to_lowercase().contains(&name)
        })
    }

    // ─── Ground items ────────────────────────────────────────────

    fn ground_container_id(&self, location_id: &str) -> Option<String> {
        self.location_containers
            .get(location_id)?
            .values()
            .find(|c| c.container_type == ContainerType::Ground)
            .map(|c| c.container_id.clone())
    }

    fn get_or_create_ground_container(&mut self, location_id: &str) -> String {
        if let Some(id) = self.ground_container_id(location_id) {
            return id;
        }
        // Ground containers are unbounded.
        self.create_container(
            location_id,
            ContainerType::Ground,
            "Ground",
            "Items dropped on the ground",
            ContainerConfig::default(),
        )
    }

    /// Whether a location currently has a ground container holding items.
    #[allow(dead_code)]
    pub fn has_ground_items(&self, location_id: &str) -> bool {
        self.ground_items
            .get(location_id)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    pub fn drop_at_location(
        &mut self,
        location_id: &str,
        item_id: &str,
        quantity: u32,
        catalog: &ItemCatalog,
        bus: &EventBus,
    ) -> bool {
        let item = match catalog.get(item_id) {
            Some(item) => item.clone(),
            None => {
                warn!("Cannot drop unknown item: {item_id}");
                return false;
            }
        };

        let ground_id = self.get_or_create_ground_container(location_id);
        let ground = self
            .container_inventories
            .get_mut(&ground_id)
            .expect("ground inventory exists for ground container");

        if !ground.add(item_id, quantity, catalog) {
            return false;
        }

        self.ground_items
            .entry(location_id.to_string())
            .or_default()
            .insert(item_id.to_string());

        info!("Dropped {quantity}x {} at location {location_id}", item.name);
        bus.emit(
            EventType::ItemDropped,
            SourceSystem::Containers,
            event_data(vec![
                ("location_id", Value::from(location_id)),
                ("item_id", Value::from(item_id)),
                ("quantity", Value::from(quantity)),
                ("item_name", Value::from(item.name.clone())),
            ]),
        );
        true
    }

    pub fn take_from_location(
        &mut self,
        location_id: &str,
        item_id: &str,
        quantity: u32,
        catalog: &ItemCatalog,
        bus: &EventBus,
    ) -> bool {
        let ground_id = match self.ground_container_id(location_id) {
            Some(id) => id,
            None => return false,
        };
        let ground = match self.container_inventories.get_mut(&ground_id) {
            Some(inv) => inv,
            None => return false,
        };

        if !ground.has(item_id, quantity) {
            return false;
        }
        if !ground.remove(item_id, quantity) {
            return false;
        }

        // Clean the per-location index once the last stack is gone.
        if ground.quantity(item_id) == 0 {
            if let Some(items) = self.ground_items.get_mut(location_id) {
                items.remove(item_id);
                if items.is_empty() {
                    self.ground_items.remove(location_id);
                }
            }
        }

        let item_name = catalog
            .get(item_id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| item_id.to_string());
        info!("Took {quantity}x {item_name} from location {location_id}");
        bus.emit(
            EventType::ItemTaken,
            SourceSystem::Containers,
            event_data(vec![
                ("location_id", Value::from(location_id)),
                ("item_id", Value::from(item_id)),
                ("quantity", Value::from(quantity)),
                ("item_name", Value::from(item_name)),
            ]),
        );
        true
    }

    // ─── Named container items ───────────────────────────────────

    pub fn add_to_container(
        &mut self,
        container_id: &str,
        item_id: &str,
        quantity: u32,
        catalog: &ItemCatalog,
        bus: &EventBus,
    ) -> bool {
        let item = match catalog.get(item_id) {
            Some(item) => item.clone(),
            None => {
                warn!("Unknown item: {item_id}");
                return false;
            }
        };

        let (location_id, container_type, container_name) = match self.get_container(container_id)
        {
            Some(data) => (
                data.location_id.clone(),
                data.container_type,
                data.name.clone(),
            ),
            None => {
                warn!("Container not found: {container_id}");
                return false;
            }
        };

        // Type-restricted containers (weapon racks) reject anything else.
        let behaviors = behaviors_for(container_type);
        if !behaviors.item_type_restriction.is_empty()
            && !behaviors.item_type_restriction.contains(&item.item_type)
        {
            return false;
        }

        let inventory = match self.container_inventories.get_mut(container_id) {
            Some(inv) => inv,
            None => return false,
        };
        if !inventory.add(item_id, quantity, catalog) {
            return false;
        }

        info!("Added {quantity}x {} to {container_name}", item.name);
        bus.emit(
            EventType::ContainerItemAdded,
            SourceSystem::Containers,
            event_data(vec![
                ("location_id", Value::from(location_id)),
                ("container_id", Value::from(container_id)),
                ("item_id", Value::from(item_id)),
                ("quantity", Value::from(quantity)),
            ]),
        );
        true
    }

    pub fn remove_from_container(
        &mut self,
        container_id: &str,
        item_id: &str,
        quantity: u32,
        catalog: &ItemCatalog,
        bus: &EventBus,
    ) -> bool {
        let location_id = match self.get_container(container_id) {
            Some(data) => data.location_id.clone(),
            None => return false,
        };

        let inventory = match self.container_inventories.get_mut(container_id) {
            Some(inv) => inv,
            None => return false,
        };
        if !inventory.remove(item_id, quantity) {
            return false;
        }

        let item_name = catalog
            .get(item_id)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| item_id.to_string());
        info!("Removed {quantity}x {item_name} from container {container_id}");
        bus.emit(
            EventType::ContainerItemRemoved,
            SourceSystem::Containers,
            event_data(vec![
                ("location_id", Value::from(location_id)),
                ("container_id", Value::from(container_id)),
                ("item_id", Value::from(item_id)),
                ("quantity", Value::from(quantity)),
            ]),
        );
        true
    }

    // ─── Unlock protocol ─────────────────────────────────────────

    /// What would it take to open this container, given the inventory at
    /// hand. Rules in order: unlocked is trivially open; a required key in
    /// the inventory unlocks by key; a positive lock difficulty plus a
    /// lockpick unlocks by picking at that difficulty.
    pub fn can_unlock(&self, container_id: &str, inventory: &Inventory) -> UnlockCheck {
        let container = match self.get_container(container_id) {
            Some(data) => data,
            None => {
                return UnlockCheck {
                    can_unlock: false,
                    methods: Vec::new(),
                    required_items: Vec::new(),
                    required_skills: Vec::new(),
                    difficulty: None,
                }
            }
        };

        if !container.is_locked {
            return UnlockCheck {
                can_unlock: true,
                methods: vec!["not_locked".to_string()],
                required_items: Vec::new(),
                required_skills: Vec::new(),
                difficulty: None,
            };
        }

        let mut check = UnlockCheck {
            can_unlock: false,
            methods: Vec::new(),
            required_items: Vec::new(),
            required_skills: Vec::new(),
            difficulty: None,
        };

        if let Some(key) = &container.key_required {
            if inventory.has(key, 1) {
                check.can_unlock = true;
                check.methods.push("key".to_string());
                return check;
            }
            check.required_items.push(key.clone());
        }

        if container.lock_difficulty > 0 {
            if inventory.has("lockpick", 1) {
                check.can_unlock = true;
                check.methods.push("lockpick".to_string());
                check.difficulty = Some(container.lock_difficulty);
            } else {
                check.required_items.push("lockpick".to_string());
                check.required_skills.push(format!(
                    "lockpicking (difficulty {})",
                    container.lock_difficulty
                ));
            }
        }

        check
    }

    /// Attempt to unlock; `method` is "auto", "key" or "lockpick". A key is
    /// only consumed when its definition says `consumed_on_use`.
    pub fn unlock(
        &mut self,
        container_id: &str,
        inventory: &mut Inventory,
        method: &str,
        catalog: &ItemCatalog,
        bus: &EventBus,
    ) -> CommandOut {
        let (name, location_id, was_locked, key_required, lock_difficulty) =
            match self.get_container(container_id) {
                Some(data) => (
                    data.name.clone(),
                    data.location_id.clone(),
                    data.is_locked,
                    data.key_required.clone(),
                    data.lock_difficulty,
                ),
                None => return CommandOut::fail("Container not found."),
            };

        if !was_locked {
            return CommandOut::ok(format!("The {name} is already unlocked."));
        }

        let check = self.can_unlock(container_id, inventory);
        if !check.can_unlock {
            if check.required_items.is_empty() {
                return CommandOut::fail("You cannot unlock this container.");
            }
            return CommandOut::fail(format!(
                "You need {} to unlock this container.",
                check.required_items.join(", ")
            ))
            .with(
                "required_items",
                serde_json::to_value(&check.required_items).unwrap_or(Value::Null),
            )
            .with(
                "required_skills",
                serde_json::to_value(&check.required_skills).unwrap_or(Value::Null),
            );
        }

        let method = if method == "auto" {
            check.methods.first().cloned().unwrap_or_default()
        } else {
            method.to_string()
        };

        match method.as_str() {
            "key" => {
                let key_id = match key_required {
                    Some(key) if inventory.has(&key, 1) => key,
                    _ => return CommandOut::fail("Failed to unlock the container."),
                };

                if let Some(data) = self.get_container_mut(container_id) {
                    data.is_locked = false;
                }

                let key_item = catalog.get(&key_id);
                let key_name = key_item
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| key_id.clone());
                // Keys survive unlocking unless flagged consumed_on_use.
                if key_item.map(|i| i.prop_bool("consumed_on_use")).unwrap_or(false) {
                    inventory.remove(&key_id, 1);
                }

                bus.emit(
                    EventType::ContainerUnlocked,
                    SourceSystem::Containers,
                    event_data(vec![
                        ("container_id", Value::from(container_id)),
                        ("location_id", Value::from(location_id)),
                        ("method", Value::from("key")),
                        ("key_used", Value::from(key_id)),
                    ]),
                );

                CommandOut::ok(format!("You unlock the {name} with the {key_name}."))
                    .with("method", Value::from("key"))
                    .with("key_used", Value::from(key_name))
            }
            "lockpick" => {
                if !inventory.has("lockpick", 1) {
                    return CommandOut::fail("Failed to unlock the container.");
                }

                if let Some(data) = self.get_container_mut(container_id) {
                    data.is_locked = false;
                }

                bus.emit(
                    EventType::ContainerUnlocked,
                    SourceSystem::Containers,
                    event_data(vec![
                        ("container_id", Value::from(container_id)),
                        ("location_id", Value::from(location_id)),
                        ("method", Value::from("lockpick")),
                        ("difficulty", Value::from(lock_difficulty)),
                    ]),
                );

                CommandOut::ok(format!("You successfully pick the lock on the {name}."))
                    .with("method", Value::from("lockpick"))
                    .with("difficulty", Value::from(lock_difficulty))
            }
            _ => CommandOut::fail("Failed to unlock the container."),
        }
    }

    // ─── Search and discovery ────────────────────────────────────

    /// Reveal every hidden container at the location whose discovery
    /// difficulty the skill meets. Already-visible containers land in the
    /// visible set without being re-discovered.
    pub fn search_location(&mut self, location_id: &str, search_skill: i32) -> SearchResult {
        let mut result = SearchResult::default();

        let containers = match self.location_containers.get_mut(location_id) {
            Some(containers) => containers,
            None => return result,
        };

        for data in containers.values_mut() {
            if data.container_type == ContainerType::Ground {
                continue;
            }

            if data.is_hidden && search_skill >= data.discovery_difficulty {
                data.is_hidden = false;
                info!(
                    "Discovered hidden {}: {}",
                    data.container_type.as_str(),
                    data.name
                );
                result.discovered.push(ContainerSummary {
                    id: data.container_id.clone(),
                    name: data.name.clone(),
                    container_type: data.container_type.as_str().to_string(),
                    description: data.description.clone(),
                });
                if let Some(hint) = behaviors_for(data.container_type).special_search {
                    result.special_discoveries.push(hint.to_string());
                }
            }

            if !data.is_hidden {
                result.visible.push(ContainerSummary {
                    id: data.container_id.clone(),
                    name: data.name.clone(),
                    container_type: data.container_type.as_str().to_string(),
                    description: data.description.clone(),
                });
            }
        }

        result
    }

    /// Ground and visible-container contents at a location.
    pub fn items_at_location(&self, location_id: &str, catalog: &ItemCatalog) -> LocationItems {
        let mut view = LocationItems::default();

        let item_view = |slot: &InventorySlot| {
            let item = catalog.get(&slot.item_id);
            ItemView {
                item_id: slot.item_id.clone(),
                name: item
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| slot.item_id.clone()),
                quantity: slot.quantity,
                description: item.map(|i| i.description.clone()).unwrap_or_default(),
            }
        };

        if let Some(ground_id) = self.ground_container_id(location_id) {
            if let Some(ground) = self.container_inventories.get(&ground_id) {
                view.ground_items = ground.all_items().iter().map(item_view).collect();
            }
        }

        if let Some(containers) = self.location_containers.get(location_id) {
            for (container_id, data) in containers {
                if data.container_type == ContainerType::Ground {
                    continue;
                }
                let items = self
                    .container_inventories
                    .get(container_id)
                    .map(|inv| inv.all_items().iter().map(item_view).collect())
                    .unwrap_or_default();
                view.containers.insert(
                    container_id.clone(),
                    ContainerView {
                        name: data.name.clone(),
                        container_type: data.container_type.as_str().to_string(),
                        description: data.description.clone(),
                        items,
                        is_locked: data.is_locked,
                        is_hidden: data.is_hidden,
                    },
                );
            }
        }

        view
    }

    // ─── Location seeding ────────────────────────────────────────

    /// Seed a freshly created location with containers typical for its
    /// type tag. Quantities and contents are fixtures.
    pub fn seed_location(
        &mut self,
        location_id: &str,
        location_type: &str,
        catalog: &ItemCatalog,
        bus: &EventBus,
    ) {
        match location_type {
            "village" => {
                self.create_container(
                    location_id,
                    ContainerType::Barrel,
                    "Village Well",
                    "A stone well with a bucket. The community stores emergency supplies here.",
                    ContainerConfig {
                        capacity_slots: Some(20),
                        capacity_weight: Some(100.0),
                        ..Default::default()
                    },
                );
                let notice_board = self.create_container(
                    location_id,
                    ContainerType::Bookshelf,
                    "Village Notice Board",
                    "A wooden board where villagers post notices and requests.",
                    ContainerConfig {
                        capacity_slots: Some(10),
                        capacity_weight: Some(5.0),
                        ..Default::default()
                    },
                );
                self.add_to_container(&notice_board, "scroll", 2, catalog, bus);
            }
            "ruin" => {
                let chest = self.create_container(
                    location_id,
                    ContainerType::Chest,
                    "Ancient Chest",
                    "An old, ornate chest covered in dust and cobwebs.",
                    ContainerConfig {
                        capacity_slots: Some(15),
                        capacity_weight: Some(200.0),
                        is_hidden: true,
                        discovery_difficulty: 15,
                        is_locked: true,
                        lock_difficulty: 20,
                        ..Default::default()
                    },
                );
                self.add_to_container(&chest, "gold_coin", 50, catalog, bus);
                self.add_to_container(&chest, "health_potion_small", 2, catalog, bus);
            }
            "cave" => {
                self.create_container(
                    location_id,
                    ContainerType::LootContainer,
                    "Mineral Vein",
                    "A rich vein of ore visible in the cave wall.",
                    ContainerConfig {
                        capacity_slots: Some(5),
                        capacity_weight: Some(500.0),
                        ..Default::default()
                    },
                );
            }
            "shop" => {
                let shop = self.create_container(
                    location_id,
                    ContainerType::Shop,
                    "Shop Inventory",
                    "The merchant's wares displayed on shelves and counters.",
                    ContainerConfig {
                        capacity_slots: Some(50),
                        capacity_weight: Some(1000.0),
                        owner_id: Some("merchant".to_string()),
                        ..Default::default()
                    },
                );
                self.add_to_container(&shop, "health_potion_small", 10, catalog, bus);
                self.add_to_container(&shop, "bread", 20, catalog, bus);
                self.add_to_container(&shop, "iron_sword", 3, catalog, bus);
            }
            _ => {
                self.create_container(
                    location_id,
                    ContainerType::Barrel,
                    "Storage Area",
                    "A small area where travelers sometimes leave supplies.",
                    ContainerConfig {
                        capacity_slots: Some(10),
                        capacity_weight: Some(50.0),
                        ..Default::default()
                    },
                );
            }
        }

        info!("Initialized containers for {location_type} location: {location_id}");
    }

    // ─── Status and persistence hooks ────────────────────────────

    #[allow(dead_code)]
    pub fn status(&self) -> ContainerSystemStatus {
        ContainerSystemStatus {
            total_locations: self.location_containers.len(),
            total_containers: self
                .location_containers
                .values()
                .map(BTreeMap::len)
                .sum(),
            total_ground_locations: self.ground_items.len(),
            total_items_on_ground: self.ground_items.values().map(BTreeSet::len).sum(),
        }
    }

    pub fn all_containers(&self) -> impl Iterator<Item = &ContainerData> {
        self.location_containers.values().flat_map(|m| m.values())
    }

    /// Install a container restored from persistence, with its contents.
    pub fn restore_container(
        &mut self,
        data: ContainerData,
        slots: Vec<InventorySlot>,
        catalog: &ItemCatalog,
    ) {
        // Rebuild through the record path so instance properties and row
        // layout survive unchanged.
        let inventory = Inventory::from_record(
            crate::systems::inventory::InventoryRecord {
                owner_id: data.container_id.clone(),
                capacity_slots: data.capacity_slots,
                capacity_weight: data.capacity_weight,
                current_weight: 0.0,
                slots,
                last_modified: Utc::now(),
            },
            catalog,
        );

        if data.container_type == ContainerType::Ground {
            let present: BTreeSet<String> = inventory
                .all_items()
                .iter()
                .map(|s| s.item_id.clone())
                .collect();
            if !present.is_empty() {
                self.ground_items.insert(data.location_id.clone(), present);
            }
        }

        self.container_inventories
            .insert(data.container_id.clone(), inventory);
        self.location_containers
            .entry(data.location_id.clone())
            .or_default()
            .insert(data.container_id.clone(), data);
    }
}
