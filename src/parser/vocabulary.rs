//! Known words and phrases for the text parser.
//!
//! Holds the canonical action/direction synonym tables plus registries of
//! item, character and location names discovered from the world. Every
//! registered phrase is lowercased; lookups are case-insensitive.

use std::collections::HashMap;

use tracing::debug;

use crate::systems::catalog::ItemCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLabel {
    Item,
    Npc,
    Location,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Npc => "npc",
            Self::Location => "location",
        }
    }
}

/// An entity phrase recognized inside a player sentence.
#[derive(Debug, Clone)]
pub struct TaggedEntity {
    pub text: String,
    pub label: EntityLabel,
    pub entity_id: String,
}

pub struct VocabularyManager {
    action_synonyms: Vec<(&'static str, &'static [&'static str])>,
    direction_synonyms: Vec<(&'static str, &'static [&'static str])>,
    /// entity id -> lowercased synonym phrases
    item_synonyms: HashMap<String, Vec<String>>,
    character_synonyms: HashMap<String, Vec<String>>,
    location_synonyms: HashMap<String, Vec<String>>,
}

impl Default for VocabularyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VocabularyManager {
    pub fn new() -> Self {
        Self {
            action_synonyms: vec![
                ("go", &["move", "walk", "run", "travel", "head", "journey"]),
                ("look", &["examine", "inspect", "observe", "view", "check", "see"]),
                ("take", &["get", "grab", "pick up", "collect", "acquire", "obtain"]),
                ("drop", &["put down", "leave", "discard", "throw away", "dispose"]),
                ("use", &["activate", "operate", "utilize", "apply", "employ"]),
                ("talk", &["speak", "chat", "converse", "discuss", "communicate"]),
                ("attack", &["fight", "hit", "strike", "assault", "battle", "combat"]),
                ("inventory", &["items", "belongings", "possessions", "gear", "equipment"]),
                ("help", &["guide", "instructions", "commands", "assistance", "tutorial"]),
            ],
            direction_synonyms: vec![
                ("north", &["n", "forward"]),
                ("south", &["s", "backward", "backwards", "back"]),
                ("east", &["e", "right"]),
                ("west", &["w", "left"]),
                ("up", &["u", "above", "climb up", "ascend"]),
                ("down", &["d", "below", "climb down", "descend"]),
                ("northeast", &["ne"]),
                ("northwest", &["nw"]),
                ("southeast", &["se"]),
                ("southwest", &["sw"]),
                ("in", &["inside", "enter", "into"]),
                ("out", &["outside", "exit", "leave"]),
            ],
            item_synonyms: HashMap::new(),
            character_synonyms: HashMap::new(),
            location_synonyms: HashMap::new(),
        }
    }

    // ─── Registration ────────────────────────────────────────────

    fn register(
        registry: &mut HashMap<String, Vec<String>>,
        id: &str,
        name: &str,
        synonyms: &[String],
    ) {
        let mut all: Vec<String> = synonyms.iter().map(|s| s.to_lowercase()).collect();
        let name = name.to_lowercase();
        if !all.contains(&name) {
            all.push(name);
        }
        registry.insert(id.to_string(), all);
    }

    pub fn register_item(&mut self, item_id: &str, name: &str, synonyms: &[String]) {
        Self::register(&mut self.item_synonyms, item_id, name, synonyms);
        debug!("Registered item vocabulary for {item_id}");
    }

    #[allow(dead_code)]
    pub fn register_character(&mut self, char_id: &str, name: &str, synonyms: &[String]) {
        Self::register(&mut self.character_synonyms, char_id, name, synonyms);
    }

    #[allow(dead_code)]
    pub fn register_location(&mut self, loc_id: &str, name: &str, synonyms: &[String]) {
        Self::register(&mut self.location_synonyms, loc_id, name, synonyms);
    }

    /// Register every catalog item under its name, a spaceless and an
    /// underscored variant of a multi-word name, its id, and its declared
    /// synonyms.
    pub fn register_catalog(&mut self, catalog: &ItemCatalog) {
        for item in catalog.all() {
            let mut synonyms: Vec<String> = vec![item.name.to_lowercase()];
            let words: Vec<&str> = item.name.split_whitespace().collect();
            if words.len() > 1 {
                let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
                synonyms.push(lowered.join(""));
                synonyms.push(lowered.join("_"));
            }
            synonyms.push(item.item_id.to_lowercase());
            synonyms.extend(item.synonyms.iter().map(|s| s.to_lowercase()));

            self.register_item(&item.item_id, &item.name, &synonyms);
        }
        debug!("Registered {} catalog items with vocabulary", catalog.len());
    }

    // ─── Canonicalization ────────────────────────────────────────

    pub fn canonical_action(&self, action: &str) -> Option<&'static str> {
        let action = action.to_lowercase();
        for (canonical, synonyms) in &self.action_synonyms {
            if *canonical == action || synonyms.contains(&action.as_str()) {
                return Some(canonical);
            }
        }
        None
    }

    pub fn canonical_direction(&self, direction: &str) -> Option<&'static str> {
        let direction = direction.to_lowercase();
        for (canonical, synonyms) in &self.direction_synonyms {
            if *canonical == direction || synonyms.contains(&direction.as_str()) {
                return Some(canonical);
            }
        }
        None
    }

    fn lookup(registry: &HashMap<String, Vec<String>>, text: &str) -> Option<String> {
        let text = text.to_lowercase();
        registry
            .iter()
            .find(|(_, synonyms)| synonyms.contains(&text))
            .map(|(id, _)| id.clone())
    }

    #[allow(dead_code)]
    pub fn item_id(&self, text: &str) -> Option<String> {
        Self::lookup(&self.item_synonyms, text)
    }

    #[allow(dead_code)]
    pub fn character_id(&self, text: &str) -> Option<String> {
        Self::lookup(&self.character_synonyms, text)
    }

    pub fn location_id(&self, text: &str) -> Option<String> {
        Self::lookup(&self.location_synonyms, text)
    }

    // ─── Entity tagging ──────────────────────────────────────────

    /// Scan a sentence for registered entity phrases (whole-word matches,
    /// longest phrases first so "health potion" wins over "potion").
    pub fn tag(&self, text: &str) -> Vec<TaggedEntity> {
        let padded = format!(" {} ", text.to_lowercase());
        let mut tagged = Vec::new();

        let mut scan = |registry: &HashMap<String, Vec<String>>, label: EntityLabel| {
            for (id, synonyms) in registry {
                let mut phrases: Vec<&String> = synonyms.iter().collect();
                phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
                for phrase in phrases {
                    if phrase.is_empty() {
                        continue;
                    }
                    if padded.contains(&format!(" {phrase} ")) {
                        tagged.push(TaggedEntity {
                            text: phrase.clone(),
                            label,
                            entity_id: id.clone(),
                        });
                        break;
                    }
                }
            }
        };

        scan(&self.item_synonyms, EntityLabel::Item);
        scan(&self.character_synonyms, EntityLabel::Npc);
        scan(&self.location_synonyms, EntityLabel::Location);
        tagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::catalog::starter_catalog;

    #[test]
    fn canonical_action_resolves_synonyms() {
        let vocab = VocabularyManager::new();
        assert_eq!(vocab.canonical_action("grab"), Some("take"));
        assert_eq!(vocab.canonical_action("EXAMINE"), Some("look"));
        assert_eq!(vocab.canonical_action("take"), Some("take"));
        assert_eq!(vocab.canonical_action("defenestrate"), None);
    }

    #[test]
    fn canonical_direction_resolves_shorthand() {
        let vocab = VocabularyManager::new();
        assert_eq!(vocab.canonical_direction("n"), Some("north"));
        assert_eq!(vocab.canonical_direction("inside"), Some("in"));
        assert_eq!(vocab.canonical_direction("sideways"), None);
    }

    #[test]
    fn catalog_registration_covers_name_variants() {
        let catalog = starter_catalog();
        let mut vocab = VocabularyManager::new();
        vocab.register_catalog(&catalog);

        assert_eq!(vocab.item_id("iron sword").as_deref(), Some("iron_sword"));
        assert_eq!(vocab.item_id("ironsword").as_deref(), Some("iron_sword"));
        assert_eq!(vocab.item_id("iron_sword").as_deref(), Some("iron_sword"));
        assert_eq!(vocab.item_id("sword").as_deref(), Some("iron_sword"));
        assert_eq!(vocab.item_id("ring").as_deref(), Some("magic_ring"));
    }

    #[test]
    fn tagging_finds_whole_word_phrases() {
        let catalog = starter_catalog();
        let mut vocab = VocabularyManager::new();
        vocab.register_catalog(&catalog);
        vocab.register_character("npc_selene", "Selene", &[]);

        let tags = vocab.tag("give the iron sword to selene");
        assert!(tags
            .iter()
            .any(|t| t.entity_id == "iron_sword" && t.label == EntityLabel::Item));
        assert!(tags
            .iter()
            .any(|t| t.entity_id == "npc_selene" && t.label == EntityLabel::Npc));

        // "swordfish" must not match "sword".
        let none = vocab.tag("look at the swordfish");
        assert!(!none.iter().any(|t| t.entity_id == "iron_sword"));
    }
}
