//! Command pipeline: raw text to a structured, confidence-scored command.
//!
//! Stages, in order: literal pre-scan fast paths for the "take off X"
//! family (rewritten to unequip before any generic parsing can call them
//! TAKE), entity tagging from the vocabulary, an ordered regex bank, and a
//! verb-noun fallback. Anything still unresolved — or resolved below the
//! router threshold — is handed to the tool router by the engine.

pub mod router;
pub mod vocabulary;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config;
use crate::parser::vocabulary::{TaggedEntity, VocabularyManager};

// ─── Actions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Move,
    Look,
    Take,
    Drop,
    Use,
    Talk,
    Attack,
    CastMagic,
    Inventory,
    Help,
    Search,
    Unlock,
    Equip,
    Unequip,
    Unknown,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Look => "look",
            Self::Take => "take",
            Self::Drop => "drop",
            Self::Use => "use",
            Self::Talk => "talk",
            Self::Attack => "attack",
            Self::CastMagic => "cast_magic",
            Self::Inventory => "inventory",
            Self::Help => "help",
            Self::Search => "search",
            Self::Unlock => "unlock",
            Self::Equip => "equip",
            Self::Unequip => "unequip",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub action: Action,
    pub target: Option<String>,
    pub modifiers: HashMap<String, String>,
    pub entities: Vec<TaggedEntity>,
    pub confidence: f32,
    pub raw_text: String,
}

impl ParsedCommand {
    fn new(action: Action, target: Option<String>, confidence: f32, raw_text: &str) -> Self {
        Self {
            action,
            target,
            modifiers: HashMap::new(),
            entities: Vec::new(),
            confidence,
            raw_text: raw_text.to_string(),
        }
    }
}

// ─── Regex bank ──────────────────────────────────────────────────────

/// Ordered labeled patterns; the first match wins. Capture group 1 feeds
/// the target, group 2 (where present) a modifier.
static PATTERNS: Lazy<Vec<(Action, Regex)>> = Lazy::new(|| {
    let rx = |s: &str| Regex::new(s).expect("command pattern compiles");
    vec![
        // Simple movement: go north, move west, travel to town
        (
            Action::Move,
            rx(r"^(?:go|move|walk|run|head|travel)(?:\s+to)?\s+([a-zA-Z_]+)$"),
        ),
        // Look: look, look around, look at X, examine X
        (
            Action::Look,
            rx(r"^(?:look|examine|inspect|observe)(?:\s+(?:at|around|in|inside))?\s*(.*)$"),
        ),
        // Take: take X, get X, pick up X
        (Action::Take, rx(r"^(?:take|get|grab|pick up)\s+(.+)$")),
        // Drop: drop X, put down X
        (
            Action::Drop,
            rx(r"^(?:drop|discard|put down|throw away)\s+(.+)$"),
        ),
        // Use: use X, use X on Y
        (
            Action::Use,
            rx(r"^(?:use|activate|operate)\s+(.+?)(?:\s+(?:on|with)\s+(.+))?$"),
        ),
        // Talk: talk to X, ask X about Y
        (
            Action::Talk,
            rx(r"^(?:talk|speak|chat|converse)(?:\s+(?:to|with))?\s+(.+?)(?:\s+about\s+(.+))?$"),
        ),
        // Attack: attack X, hit X with Y
        (
            Action::Attack,
            rx(r"^(?:attack|fight|hit|strike)\s+(.+?)(?:\s+with\s+(.+))?$"),
        ),
        // Inventory: inventory, i, items
        (
            Action::Inventory,
            rx(r"^(?:inventory|i|items|check inventory)$"),
        ),
        // Help: help, ?, commands
        (Action::Help, rx(r"^(?:help|\?|commands|what can i do)$")),
        // Search: search for X, find X
        (
            Action::Search,
            rx(r"^(?:search|look for|find|explore|investigate|check)\s+(.+)$"),
        ),
        // Unlock: unlock X, open X with key, pick lock on X
        (
            Action::Unlock,
            rx(r"^(?:unlock|open|pick(?:\s+lock)?)\s+(.+?)(?:\s+(?:with|using)\s+(.+))?$"),
        ),
        // Unequip: take off X, remove X, unequip X
        (
            Action::Unequip,
            rx(r"^(?:take off|remove|unequip)\s+(.+)$"),
        ),
    ]
});

/// Direct verb lookup used by the verb-noun fallback when the synonym
/// table has no canonical action for the first token.
static ACTION_WORDS: &[(&str, Action)] = &[
    ("go", Action::Move),
    ("move", Action::Move),
    ("walk", Action::Move),
    ("run", Action::Move),
    ("look", Action::Look),
    ("examine", Action::Look),
    ("inspect", Action::Look),
    ("observe", Action::Look),
    ("take", Action::Take),
    ("get", Action::Take),
    ("grab", Action::Take),
    ("drop", Action::Drop),
    ("discard", Action::Drop),
    ("use", Action::Use),
    ("activate", Action::Use),
    ("operate", Action::Use),
    ("talk", Action::Talk),
    ("speak", Action::Talk),
    ("ask", Action::Talk),
    ("tell", Action::Talk),
    ("attack", Action::Attack),
    ("fight", Action::Attack),
    ("hit", Action::Attack),
    ("cast", Action::CastMagic),
    ("inventory", Action::Inventory),
    ("help", Action::Help),
    ("search", Action::Search),
    ("unlock", Action::Unlock),
    ("unequip", Action::Unequip),
    ("equip", Action::Equip),
    ("wear", Action::Equip),
    ("wield", Action::Equip),
];

fn canonical_from_synonym(canonical: &str) -> Action {
    match canonical {
        "go" => Action::Move,
        "look" => Action::Look,
        "take" => Action::Take,
        "drop" => Action::Drop,
        "use" => Action::Use,
        "talk" => Action::Talk,
        "attack" => Action::Attack,
        "inventory" => Action::Inventory,
        "help" => Action::Help,
        _ => Action::Unknown,
    }
}

/// Body-part keywords resolved to equipment slots for unequip targets like
/// "take off helmet". Checked in order; first hit wins.
pub static SLOT_KEYWORDS: &[(&str, &str)] = &[
    ("main hand", "main_hand"),
    ("main_hand", "main_hand"),
    ("off hand", "off_hand"),
    ("off_hand", "off_hand"),
    ("left ring", "ring_left"),
    ("right ring", "ring_right"),
    ("helmet", "head"),
    ("hat", "head"),
    ("head", "head"),
    ("armor", "chest"),
    ("body", "chest"),
    ("chest", "chest"),
    ("pants", "legs"),
    ("greaves", "legs"),
    ("legs", "legs"),
    ("boots", "feet"),
    ("shoes", "feet"),
    ("feet", "feet"),
    ("gloves", "hands"),
    ("gauntlets", "hands"),
    ("hands", "hands"),
    ("weapon", "main_hand"),
    ("shield", "off_hand"),
    ("ring", "ring_left"),
    ("necklace", "neck"),
    ("neck", "neck"),
    ("belt", "belt"),
    ("cloak", "back"),
    ("cape", "back"),
];

/// Map an unequip target to an equipment slot when it names a body part
/// or a worn category rather than a specific item.
pub fn slot_for_keyword(target: &str) -> Option<&'static str> {
    let target = target.to_lowercase();
    SLOT_KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == target || target.contains(keyword))
        .map(|(_, slot)| *slot)
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct ParserEngine {
    pub vocabulary: VocabularyManager,
}

impl ParserEngine {
    pub fn new(vocabulary: VocabularyManager) -> Self {
        Self { vocabulary }
    }

    /// Parse one sentence. Never fails: unresolvable input comes back as
    /// `Action::Unknown` at minimum confidence.
    pub fn parse(&self, input: &str) -> ParsedCommand {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ParsedCommand::new(Action::Unknown, None, config::UNKNOWN_CONFIDENCE, input);
        }

        let text = trimmed.to_lowercase();

        // Fast path: the "take off X" family is unequip, full stop. This
        // runs before the regex bank so TAKE can never claim it.
        if let Some(item) = Self::unequip_fast_path(&text) {
            let mut command = ParsedCommand::new(
                Action::Unequip,
                Some(item),
                config::FAST_PATH_CONFIDENCE,
                input,
            );
            command.entities = self.vocabulary.tag(&text);
            return command;
        }

        let entities = self.vocabulary.tag(&text);

        // Regex bank, first match wins.
        for (action, pattern) in PATTERNS.iter() {
            if let Some(captures) = pattern.captures(&text) {
                let target = captures
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty());

                let mut modifiers = HashMap::new();
                if let Some(extra) = captures.get(2).map(|m| m.as_str().trim().to_string()) {
                    let key = match action {
                        Action::Use => "on_target",
                        Action::Talk => "about_topic",
                        Action::Attack | Action::Unlock => "with_item",
                        _ => "extra",
                    };
                    modifiers.insert(key.to_string(), extra);
                }

                let mut confidence = config::REGEX_CONFIDENCE;
                if !entities.is_empty() {
                    confidence = (confidence + config::ENTITY_BOOST).min(1.0);
                }

                let mut command = ParsedCommand::new(*action, target, confidence, input);
                command.modifiers = modifiers;
                command.entities = entities;
                return command;
            }
        }

        // Verb-noun fallback: canonicalize the first token, everything
        // else is the target.
        let mut words = text.split_whitespace();
        if let Some(first) = words.next() {
            let rest: Vec<&str> = words.collect();
            let target = if rest.is_empty() {
                None
            } else {
                Some(rest.join(" "))
            };

            let action = self
                .vocabulary
                .canonical_action(first)
                .map(canonical_from_synonym)
                .filter(|a| *a != Action::Unknown)
                .or_else(|| {
                    ACTION_WORDS
                        .iter()
                        .find(|(word, _)| *word == first)
                        .map(|(_, action)| *action)
                });

            if let Some(action) = action {
                let mut confidence = config::VERB_NOUN_CONFIDENCE;
                if !entities.is_empty() {
                    confidence = (confidence + config::ENTITY_BOOST).min(1.0);
                }
                let mut command = ParsedCommand::new(action, target, confidence, input);
                command.entities = entities;
                return command;
            }
        }

        let mut command =
            ParsedCommand::new(Action::Unknown, None, config::UNKNOWN_CONFIDENCE, input);
        command.entities = entities;
        command
    }

    /// Literal pre-scan for the unequip family. Returns the item text when
    /// the sentence is one of: "take off X", "take X off", "unequip X",
    /// "remove X".
    fn unequip_fast_path(text: &str) -> Option<String> {
        if let Some(rest) = text.strip_prefix("take off ") {
            return Some(rest.trim().to_string());
        }
        if let Some(rest) = text.strip_prefix("unequip ") {
            return Some(rest.trim().to_string());
        }
        if let Some(rest) = text.strip_prefix("remove ") {
            return Some(rest.trim().to_string());
        }
        if let Some(idx) = text.find(" take off ") {
            return Some(text[idx + " take off ".len()..].trim().to_string());
        }
        if text.starts_with("take ") && text.ends_with(" off") {
            let inner = &text["take ".len()..text.len() - " off".len()];
            return Some(inner.trim().trim_start_matches("the ").trim().to_string());
        }
        None
    }

    /// Command suggestions for input nothing could resolve, derived from
    /// partial verb matches.
    pub fn suggestions(&self, input: &str) -> Vec<String> {
        const TEMPLATES: &[(&str, &[&str])] = &[
            ("look", &["look around", "examine item", "look at target"]),
            ("go", &["go north", "go south", "go east", "go west"]),
            ("take", &["take item", "pick up item"]),
            ("drop", &["drop item"]),
            ("use", &["use object", "use key on door"]),
            ("talk", &["talk to person", "ask about topic"]),
            ("attack", &["attack enemy"]),
            ("inventory", &["inventory", "check items"]),
            ("equip", &["equip weapon", "take off ring"]),
            ("search", &["search for treasure", "look for hidden items"]),
            ("unlock", &["unlock chest", "open chest with key"]),
            ("help", &["help"]),
        ];

        let input = input.to_lowercase();
        let words: Vec<&str> = input.split_whitespace().collect();
        let mut suggestions = Vec::new();

        for (verb, templates) in TEMPLATES {
            let partial = words.iter().any(|w| {
                w.len() >= 2 && (verb.starts_with(w) || w.starts_with(verb))
            });
            if partial {
                suggestions.extend(templates.iter().map(|t| t.to_string()));
            }
        }

        if suggestions.is_empty() {
            suggestions = vec![
                "look around".to_string(),
                "inventory".to_string(),
                "help".to_string(),
            ];
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::catalog::starter_catalog;

    fn engine() -> ParserEngine {
        let mut vocabulary = VocabularyManager::new();
        vocabulary.register_catalog(&starter_catalog());
        ParserEngine::new(vocabulary)
    }

    #[test]
    fn take_off_is_unequip_not_take() {
        // The classic misclassification the fast path exists to prevent.
        let engine = engine();
        for input in ["take off ring", "take the ring off", "Take Off Ring"] {
            let command = engine.parse(input);
            assert_eq!(command.action, Action::Unequip, "misparsed: {input}");
            assert_eq!(command.target.as_deref(), Some("ring"));
            assert!((command.confidence - 0.95).abs() < 1e-6);
        }
    }

    #[test]
    fn remove_and_unequip_use_the_fast_path() {
        let engine = engine();
        let command = engine.parse("remove helmet");
        assert_eq!(command.action, Action::Unequip);
        assert_eq!(command.target.as_deref(), Some("helmet"));

        let command = engine.parse("unequip iron sword");
        assert_eq!(command.action, Action::Unequip);
        assert_eq!(command.target.as_deref(), Some("iron sword"));
    }

    #[test]
    fn regex_bank_matches_core_commands() {
        let engine = engine();

        let take = engine.parse("pick up bread");
        assert_eq!(take.action, Action::Take);
        assert_eq!(take.target.as_deref(), Some("bread"));

        let drop = engine.parse("drop wooden shield");
        assert_eq!(drop.action, Action::Drop);

        let look = engine.parse("look around");
        assert_eq!(look.action, Action::Look);
        assert_eq!(look.target, None);

        let inv = engine.parse("inventory");
        assert_eq!(inv.action, Action::Inventory);

        let go = engine.parse("go north");
        assert_eq!(go.action, Action::Move);
        assert_eq!(go.target.as_deref(), Some("north"));
    }

    #[test]
    fn capture_groups_feed_modifiers() {
        let engine = engine();

        let unlock = engine.parse("unlock chest with ancient key");
        assert_eq!(unlock.action, Action::Unlock);
        assert_eq!(unlock.target.as_deref(), Some("chest"));
        assert_eq!(
            unlock.modifiers.get("with_item").map(String::as_str),
            Some("ancient key")
        );

        let talk = engine.parse("talk to selene about the ruins");
        assert_eq!(talk.action, Action::Talk);
        assert_eq!(
            talk.modifiers.get("about_topic").map(String::as_str),
            Some("the ruins")
        );

        let attack = engine.parse("attack goblin with iron sword");
        assert_eq!(attack.action, Action::Attack);
        assert_eq!(
            attack.modifiers.get("with_item").map(String::as_str),
            Some("iron sword")
        );
    }

    #[test]
    fn known_entities_boost_confidence() {
        let engine = engine();
        // "bread" is registered in the catalog vocabulary.
        let known = engine.parse("take bread");
        assert!((known.confidence - 0.9).abs() < 1e-6);
        assert!(!known.entities.is_empty());

        let unknown = engine.parse("take sprocket");
        assert!((unknown.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn verb_noun_fallback_handles_synonym_verbs() {
        let engine = engine();
        // "acquire" is a take synonym but matches no regex alternation.
        let command = engine.parse("acquire sprocket");
        assert_eq!(command.action, Action::Take);
        assert_eq!(command.target.as_deref(), Some("sprocket"));
        assert!((command.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unresolvable_input_is_unknown_with_low_confidence() {
        let engine = engine();
        let command = engine.parse("xyzzy plugh");
        assert_eq!(command.action, Action::Unknown);
        assert!((command.confidence - 0.1).abs() < 1e-6);
    }

    #[test]
    fn suggestions_come_from_partial_verb_matches() {
        let engine = engine();
        let suggestions = engine.suggestions("lo arund");
        assert!(suggestions.iter().any(|s| s == "look around"));

        let fallback = engine.suggestions("zzz");
        assert!(fallback.contains(&"help".to_string()));
    }

    #[test]
    fn slot_keywords_resolve_body_parts() {
        assert_eq!(slot_for_keyword("ring"), Some("ring_left"));
        assert_eq!(slot_for_keyword("helmet"), Some("head"));
        assert_eq!(slot_for_keyword("shield"), Some("off_hand"));
        assert_eq!(slot_for_keyword("left ring"), Some("ring_left"));
        assert_eq!(slot_for_keyword("frying pan"), None);
    }

    #[test]
    fn empty_input_is_unknown() {
        let engine = engine();
        let command = engine.parse("   ");
        assert_eq!(command.action, Action::Unknown);
    }
}
