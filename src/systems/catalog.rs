//! Item catalog: immutable item definitions and their lookup indexes.
//!
//! Definitions load from JSON or YAML files (either a bare list of records
//! or `{"items": [...]}`). Registering an item also registers its lowercased
//! name and every synonym in the name index, and adds its id to each tag's
//! inverted index. The catalog is read-only after load.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config;

// ─── Item types and rarity ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    // Equipment
    Weapon,
    Armor,
    Shield,
    Accessory,
    // Consumables
    Consumable,
    Potion,
    Food,
    Scroll,
    // Materials
    MaterialCrafting,
    MaterialMagical,
    MaterialEconomic,
    // Special items
    QuestItem,
    Currency,
    Key,
    Tool,
    Container,
    // Generic
    Generic,
    Other,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weapon => "WEAPON",
            Self::Armor => "ARMOR",
            Self::Shield => "SHIELD",
            Self::Accessory => "ACCESSORY",
            Self::Consumable => "CONSUMABLE",
            Self::Potion => "POTION",
            Self::Food => "FOOD",
            Self::Scroll => "SCROLL",
            Self::MaterialCrafting => "MATERIAL_CRAFTING",
            Self::MaterialMagical => "MATERIAL_MAGICAL",
            Self::MaterialEconomic => "MATERIAL_ECONOMIC",
            Self::QuestItem => "QUEST_ITEM",
            Self::Currency => "CURRENCY",
            Self::Key => "KEY",
            Self::Tool => "TOOL",
            Self::Container => "CONTAINER",
            Self::Generic => "GENERIC",
            Self::Other => "OTHER",
        }
    }

    pub fn is_equippable(&self) -> bool {
        matches!(
            self,
            Self::Weapon | Self::Armor | Self::Shield | Self::Accessory
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "COMMON",
            Self::Uncommon => "UNCOMMON",
            Self::Rare => "RARE",
            Self::Epic => "EPIC",
            Self::Legendary => "LEGENDARY",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        }
    }
}

// ─── Item definition ─────────────────────────────────────────────────

/// Static definition of an item type, shared across all instances.
/// Equality and hashing go by `item_id` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    pub item_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default, alias = "max_stack_size")]
    pub max_stack: Option<u32>,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl PartialEq for ItemDef {
    fn eq(&self, other: &Self) -> bool {
        self.item_id == other.item_id
    }
}

impl Eq for ItemDef {}

impl Hash for ItemDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.item_id.hash(state);
    }
}

impl ItemDef {
    /// Enforce invariants after construction or load:
    /// `stackable=false => max_stack=1`, stackable default 99, non-negative
    /// weight/value, lowercased item type always present in tags.
    pub fn normalize(&mut self) {
        if self.stackable {
            if self.max_stack.is_none() {
                self.max_stack = Some(config::DEFAULT_MAX_STACK);
            }
        } else {
            self.max_stack = Some(1);
        }
        if self.weight < 0.0 {
            self.weight = 0.0;
        }
        if self.value < 0 {
            self.value = 0;
        }
        self.tags.insert(self.item_type.as_str().to_lowercase());
    }

    pub fn stack_limit(&self) -> u32 {
        self.max_stack.unwrap_or(1).max(1)
    }

    /// Display name with rarity suffix for anything above common.
    pub fn display_name(&self) -> String {
        if self.rarity == Rarity::Common {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.rarity.title())
        }
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn prop_bool(&self, key: &str) -> bool {
        self.properties
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_two_handed(&self) -> bool {
        self.prop_bool("two_handed")
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed item file {path}: {message}")]
    Malformed { path: String, message: String },
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Serializable catalog statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total_items: usize,
    pub items_by_type: BTreeMap<String, usize>,
    pub items_by_rarity: BTreeMap<String, usize>,
    pub total_tags: usize,
    pub loaded_files: usize,
}

#[derive(Default)]
pub struct ItemCatalog {
    items: HashMap<String, ItemDef>,
    /// lowercased name or synonym -> item_id
    by_name: HashMap<String, String>,
    /// tag -> item_ids
    by_tag: HashMap<String, BTreeSet<String>>,
    loaded_files: Vec<String>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load item definitions from JSON/YAML files. Missing files are skipped
    /// with a warning; an unreadable or unparsable file is an error; a bad
    /// record inside an otherwise valid file is skipped with a warning.
    /// Returns the number of items loaded.
    pub fn load_from_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, CatalogError> {
        let mut loaded = 0;

        for path in paths {
            let path = path.as_ref();
            let path_display = path.display().to_string();

            if !path.exists() {
                warn!("Item definition file not found: {path_display}");
                continue;
            }

            let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
                path: path_display.clone(),
                source,
            })?;

            let data: Value = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => {
                    serde_json::from_str(&text).map_err(|e| CatalogError::Malformed {
                        path: path_display.clone(),
                        message: e.to_string(),
                    })?
                }
                Some("yml") | Some("yaml") => {
                    serde_yaml::from_str(&text).map_err(|e| CatalogError::Malformed {
                        path: path_display.clone(),
                        message: e.to_string(),
                    })?
                }
                other => {
                    return Err(CatalogError::UnsupportedFormat(
                        other.unwrap_or("<none>").to_string(),
                    ))
                }
            };

            // Accept either a bare list or {"items": [...]}.
            let records = match &data {
                Value::Array(list) => list.clone(),
                Value::Object(map) => match map.get("items") {
                    Some(Value::Array(list)) => list.clone(),
                    _ => {
                        return Err(CatalogError::Malformed {
                            path: path_display,
                            message: "expected a list of items or an \"items\" key".to_string(),
                        })
                    }
                },
                _ => {
                    return Err(CatalogError::Malformed {
                        path: path_display,
                        message: "expected a list or object at top level".to_string(),
                    })
                }
            };

            for record in records {
                match serde_json::from_value::<ItemDef>(record) {
                    Ok(item) => {
                        self.register(item);
                        loaded += 1;
                    }
                    Err(e) => warn!("Skipping bad item record in {path_display}: {e}"),
                }
            }

            self.loaded_files.push(path_display.clone());
            info!("Loaded items from {path_display}");
        }

        info!(
            "Item catalog loaded {loaded} items from {} files",
            paths.len()
        );
        Ok(loaded)
    }

    /// Register one definition, overwriting (with a warning) any existing
    /// item with the same id.
    pub fn register(&mut self, mut item: ItemDef) {
        item.normalize();

        if self.items.contains_key(&item.item_id) {
            warn!("Overwriting existing item definition: {}", item.item_id);
        }

        self.by_name
            .insert(item.name.to_lowercase(), item.item_id.clone());
        for synonym in &item.synonyms {
            self.by_name
                .insert(synonym.to_lowercase(), item.item_id.clone());
        }
        for tag in &item.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(item.item_id.clone());
        }

        debug!("Registered item: {} ({})", item.item_id, item.name);
        self.items.insert(item.item_id.clone(), item);
    }

    pub fn get(&self, item_id: &str) -> Option<&ItemDef> {
        self.items.get(item_id)
    }

    /// Case-insensitive exact lookup over names and synonyms.
    pub fn find_by_name(&self, name: &str) -> Option<&ItemDef> {
        self.by_name
            .get(&name.to_lowercase())
            .and_then(|id| self.items.get(id))
    }

    /// Name lookup first, then id lookup. The resolution order every
    /// facade command uses for `item_name_or_id` fields.
    pub fn resolve(&self, name_or_id: &str) -> Option<&ItemDef> {
        self.find_by_name(name_or_id)
            .or_else(|| self.get(name_or_id))
    }

    #[allow(dead_code)]
    pub fn find_by_tag(&self, tag: &str) -> Vec<&ItemDef> {
        self.by_tag
            .get(tag)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id)).collect())
            .unwrap_or_default()
    }

    #[allow(dead_code)]
    pub fn find_by_type(&self, item_type: ItemType) -> Vec<&ItemDef> {
        self.items
            .values()
            .filter(|i| i.item_type == item_type)
            .collect()
    }

    /// Case-insensitive substring search over name, synonyms, description
    /// and tags.
    pub fn search(&self, query: &str) -> Vec<&ItemDef> {
        let query = query.to_lowercase();
        self.items
            .values()
            .filter(|item| {
                item.name.to_lowercase().contains(&query)
                    || item
                        .synonyms
                        .iter()
                        .any(|s| s.to_lowercase().contains(&query))
                    || item.description.to_lowercase().contains(&query)
                    || item.tags.iter().any(|t| t.contains(&query))
            })
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &ItemDef> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn stats(&self) -> CatalogStats {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_rarity: BTreeMap<String, usize> = BTreeMap::new();
        for item in self.items.values() {
            *by_type
                .entry(item.item_type.as_str().to_string())
                .or_default() += 1;
            *by_rarity
                .entry(item.rarity.as_str().to_string())
                .or_default() += 1;
        }
        CatalogStats {
            total_items: self.items.len(),
            items_by_type: by_type,
            items_by_rarity: by_rarity,
            total_tags: self.by_tag.len(),
            loaded_files: self.loaded_files.len(),
        }
    }
}

// ─── Starter catalog ─────────────────────────────────────────────────

fn props(pairs: Vec<(&str, Value)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.to_string(), value);
    }
    map
}

fn item(item_id: &str, name: &str, description: &str, item_type: ItemType) -> ItemDef {
    ItemDef {
        item_id: item_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        item_type,
        stackable: false,
        max_stack: None,
        weight: 0.0,
        value: 0,
        rarity: Rarity::Common,
        properties: Map::new(),
        synonyms: Vec::new(),
        tags: BTreeSet::new(),
    }
}

/// Built-in item set used by location seeding, the CLI bootstrap, and the
/// test suite.
pub fn starter_catalog() -> ItemCatalog {
    let mut catalog = ItemCatalog::new();

    let mut iron_sword = item(
        "iron_sword",
        "Iron Sword",
        "A dependable one-handed blade with a leather-wrapped grip.",
        ItemType::Weapon,
    );
    iron_sword.weight = 3.0;
    iron_sword.value = 50;
    iron_sword.synonyms = vec!["sword".to_string()];
    iron_sword.properties = props(vec![
        ("damage", Value::from(6)),
        ("weapon_type", Value::from("long_sword")),
    ]);
    catalog.register(iron_sword);

    let mut two_handed = item(
        "two_handed_sword",
        "Two-Handed Sword",
        "A massive greatsword that takes both hands to swing.",
        ItemType::Weapon,
    );
    two_handed.weight = 6.5;
    two_handed.value = 120;
    two_handed.rarity = Rarity::Uncommon;
    two_handed.synonyms = vec!["two-handed sword".to_string(), "greatsword".to_string()];
    two_handed.properties = props(vec![
        ("damage", Value::from(11)),
        ("weapon_type", Value::from("greatsword")),
        ("two_handed", Value::from(true)),
    ]);
    catalog.register(two_handed);

    let mut dagger = item(
        "iron_dagger",
        "Iron Dagger",
        "A short, light blade suited to the off hand.",
        ItemType::Weapon,
    );
    dagger.weight = 1.0;
    dagger.value = 20;
    dagger.synonyms = vec!["dagger".to_string()];
    dagger.properties = props(vec![
        ("damage", Value::from(3)),
        ("weapon_type", Value::from("dagger")),
    ]);
    catalog.register(dagger);

    let mut shield = item(
        "wooden_shield",
        "Wooden Shield",
        "A round shield of oak planks bound with iron.",
        ItemType::Shield,
    );
    shield.weight = 4.0;
    shield.value = 35;
    shield.synonyms = vec!["shield".to_string()];
    shield.properties = props(vec![("armor", Value::from(2))]);
    catalog.register(shield);

    let mut armor = item(
        "leather_armor",
        "Leather Armor",
        "Boiled leather cuirass, worn but serviceable.",
        ItemType::Armor,
    );
    armor.weight = 8.0;
    armor.value = 60;
    armor.properties = props(vec![
        ("armor", Value::from(3)),
        ("armor_type", Value::from("chest")),
    ]);
    catalog.register(armor);

    let mut ring = item(
        "magic_ring",
        "Magic Ring",
        "A slim silver band that hums faintly with enchantment.",
        ItemType::Accessory,
    );
    ring.weight = 0.1;
    ring.value = 200;
    ring.rarity = Rarity::Rare;
    ring.synonyms = vec!["ring".to_string()];
    ring.properties = props(vec![
        ("accessory_type", Value::from("ring")),
        ("intelligence", Value::from(2)),
    ]);
    catalog.register(ring);

    let mut potion = item(
        "health_potion_small",
        "Small Health Potion",
        "A stoppered vial of red liquid that knits small wounds.",
        ItemType::Consumable,
    );
    potion.stackable = true;
    potion.max_stack = Some(10);
    potion.weight = 0.5;
    potion.value = 15;
    potion.synonyms = vec!["health potion".to_string(), "potion".to_string()];
    potion.properties = props(vec![("effects", serde_json::json!({ "heal": 25 }))]);
    catalog.register(potion);

    let mut bread = item(
        "bread",
        "Bread",
        "A crusty loaf, still warm from the oven.",
        ItemType::Food,
    );
    bread.stackable = true;
    bread.max_stack = Some(20);
    bread.weight = 0.3;
    bread.value = 2;
    bread.synonyms = vec!["loaf".to_string()];
    catalog.register(bread);

    let mut key = item(
        "ancient_key",
        "Ancient Key",
        "A heavy bronze key green with age.",
        ItemType::Key,
    );
    key.weight = 0.2;
    key.value = 0;
    key.rarity = Rarity::Uncommon;
    catalog.register(key);

    let mut lockpick = item(
        "lockpick",
        "Lockpick",
        "A slender steel pick for working simple locks.",
        ItemType::Tool,
    );
    lockpick.stackable = true;
    lockpick.max_stack = Some(5);
    lockpick.weight = 0.1;
    lockpick.value = 10;
    lockpick.synonyms = vec!["picks".to_string()];
    catalog.register(lockpick);

    let mut coin = item(
        "gold_coin",
        "Gold Coin",
        "Standard minted coin of the realm.",
        ItemType::Currency,
    );
    coin.stackable = true;
    coin.max_stack = Some(999);
    coin.weight = 0.01;
    coin.value = 1;
    coin.synonyms = vec!["gold".to_string(), "coins".to_string()];
    catalog.register(coin);

    let mut scroll = item(
        "scroll",
        "Scroll",
        "A rolled parchment covered in careful script.",
        ItemType::Scroll,
    );
    scroll.stackable = true;
    scroll.max_stack = Some(10);
    scroll.weight = 0.1;
    scroll.value = 5;
    catalog.register(scroll);

    catalog
}
