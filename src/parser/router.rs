//! Tool routing: the fallback that maps free text to one canonical action.
//!
//! The `ToolRouter` trait is the seam for an LLM chat-completion backend
//! configured with one tool per canonical action. The bundled
//! `KeywordRouter` is a deterministic offline implementation that scores
//! tools by keyword-pattern hits; remote backends implement the same trait
//! and must honor the routing rules below in their prompt.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Prompt rules every remote router must embed. The "take off" family is
/// the classic misroute: it reads like TAKE but always means UNEQUIP.
#[allow(dead_code)]
pub const ROUTING_RULES: &str = "\
Select exactly one tool for the player's command.\n\
- Commands like \"take off ring\", \"remove helmet\" or \"unequip sword\" \
ALWAYS route to the unequip tool, NEVER to take.\n\
- Pass the object of the command as the tool argument, stripped of \
articles.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    Move,
    Look,
    Take,
    Drop,
    Use,
    Talk,
    Attack,
    CastMagic,
    Inventory,
    Search,
    Unlock,
    Equip,
    Unequip,
}

impl ToolName {
    pub const ALL: [ToolName; 13] = [
        Self::Move,
        Self::Look,
        Self::Take,
        Self::Drop,
        Self::Use,
        Self::Talk,
        Self::Attack,
        Self::CastMagic,
        Self::Inventory,
        Self::Search,
        Self::Unlock,
        Self::Equip,
        Self::Unequip,
    ];

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
            Self::Search => "search",
            Self::Unlock => "unlock",
            Self::Equip => "equip",
            Self::Unequip => "unequip",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Move => "Move the player to a direction or named place.",
            Self::Look => "Look around or examine a specific target.",
            Self::Take => {
                "Take, get, grab, or pick up an item from the environment. \
                 Never for 'take off' commands; those are unequip."
            }
            Self::Drop => "Drop or put down an item from the inventory.",
            Self::Use => "Use, activate, or apply an item.",
            Self::Talk => "Talk to a character, optionally about a topic.",
            Self::Attack => "Attack or fight a target.",
            Self::CastMagic => "Cast a spell or perform magic.",
            Self::Inventory => "Show the player's inventory.",
            Self::Search => "Search the area for hidden items or containers.",
            Self::Unlock => "Unlock or open a locked container or door.",
            Self::Equip => "Equip, wear, or wield an item from the inventory.",
            Self::Unequip => {
                "Unequip, remove, take off, or doff an equipped item. \
                 Handles every 'take off' command."
            }
        }
    }
}

/// One tool of the routing schema, as presented to a remote endpoint.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
}

#[allow(dead_code)]
pub fn tool_schema() -> Vec<ToolSpec> {
    ToolName::ALL
        .iter()
        .map(|tool| ToolSpec {
            name: tool.as_str(),
            description: tool.description(),
        })
        .collect()
}

/// The routed outcome: a tool plus its single free-form argument.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: ToolName,
    pub argument: String,
}

#[allow(dead_code)]
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("tool router timed out")]
    Timeout,
    #[error("tool router unavailable: {0}")]
    Unavailable(String),
    #[error("malformed tool call: {0}")]
    Malformed(String),
    #[error("no suitable tool for input")]
    NoTool,
}

#[async_trait]
pub trait ToolRouter: Send + Sync {
    async fn route(&self, input: &str) -> Result<ToolCall, RouterError>;

    fn name(&self) -> &'static str {
        "router"
    }
}

// ─── Keyword router ──────────────────────────────────────────────────

/// Per-tool keyword patterns, scored by match count. First match order
/// breaks ties.
static TOOL_PATTERNS: Lazy<Vec<(ToolName, Vec<Regex>)>> = Lazy::new(|| {
    let rx = |s: &str| Regex::new(s).expect("tool pattern compiles");
    vec![
        (
            ToolName::Unequip,
            vec![
                rx(r"\b(unequip|doff)\b"),
                rx(r"\btake off\b"),
                rx(r"^remove\b"),
            ],
        ),
        (
            ToolName::Equip,
            vec![rx(r"\b(equip|wear|wield|don|put on)\b")],
        ),
        (
            ToolName::Move,
            vec![
                rx(r"\b(go|move|walk|travel|head|navigate|proceed)\b"),
                rx(r"\b(enter|exit|leave)\b"),
                rx(r"\b(north|south|east|west|up|down)\b"),
            ],
        ),
        (
            ToolName::Unlock,
            vec![
                rx(r"\b(unlock|pick)\b.*\b(lock|door|chest|container|box)\b"),
                rx(r"\bopen\b.*\b(lock|locked|chest|door)\b"),
                rx(r"\b(with|using)\b.*\b(key|lockpick)\b"),
            ],
        ),
        (
            ToolName::Search,
            vec![
                rx(r"\b(search|look for|find|explore|investigate)\b"),
                rx(r"\b(hidden|secret|compartments?)\b"),
            ],
        ),
        (
            ToolName::Take,
            vec![
                rx(r"\b(take|grab|get|collect|obtain)\b"),
                rx(r"\bpick up\b"),
            ],
        ),
        (
            ToolName::Drop,
            vec![rx(r"\b(drop|discard)\b"), rx(r"\bput down\b")],
        ),
        (
            ToolName::Look,
            vec![
                rx(r"\b(look|examine|inspect|observe|view|study)\b"),
                rx(r"\b(describe|appearance|details)\b"),
            ],
        ),
        (
            ToolName::Talk,
            vec![
                rx(r"\b(talk|speak|say|ask|tell|chat|discuss)\b"),
                rx(r"\b(conversation|dialogue|greet)\b"),
            ],
        ),
        (
            ToolName::Attack,
            vec![
                rx(r"\b(attack|fight|strike|hit|battle|assault)\b"),
                rx(r"\b(defend|counter|retaliate)\b"),
            ],
        ),
        (
            ToolName::CastMagic,
            vec![
                rx(r"\b(cast|spell|enchant|summon|ritual)\b"),
                rx(r"\b(fireball|heal|lightning|frost|arcane|magic)\b"),
            ],
        ),
        (
            ToolName::Inventory,
            vec![rx(r"\b(inventory|belongings|possessions|gear)\b")],
        ),
        (
            ToolName::Use,
            vec![rx(r"\b(use|activate|operate|apply|drink|eat|read)\b")],
        ),
    ]
});

/// Verb phrases stripped off the front of the input to recover the
/// argument once a tool is chosen.
static VERB_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:please\s+)?(?:take off|put on|put down|pick up|look for|looking for|i want to|i'd like to|can you|go to|talk to|speak with|speak to)\s+|^\w+\s+",
    )
    .expect("verb prefix pattern compiles")
});

static ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:the|a|an|my|some)\s+").expect("article pattern compiles"));

/// Deterministic offline router scoring keyword patterns per tool.
#[derive(Default)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn new() -> Self {
        Self
    }

    fn extract_argument(input: &str) -> String {
        let lowered = input.trim().to_lowercase();
        let stripped = VERB_PREFIX.replace(&lowered, "");
        let stripped = ARTICLE.replace(stripped.trim(), "");
        stripped.trim().to_string()
    }
}

#[async_trait]
impl ToolRouter for KeywordRouter {
    async fn route(&self, input: &str) -> Result<ToolCall, RouterError> {
        let lowered = input.trim().to_lowercase();
        if lowered.is_empty() {
            return Err(RouterError::NoTool);
        }

        // The take-off family short-circuits straight to unequip.
        if lowered.contains("take off")
            || lowered.starts_with("unequip ")
            || (lowered.starts_with("take ") && lowered.ends_with(" off"))
        {
            let argument = if let Some(idx) = lowered.find("take off") {
                lowered[idx + "take off".len()..].trim().to_string()
            } else if let Some(rest) = lowered.strip_prefix("unequip ") {
                rest.trim().to_string()
            } else {
                // "take X off"
                lowered["take ".len()..lowered.len() - " off".len()]
                    .trim()
                    .to_string()
            };
            let argument = ARTICLE.replace(&argument, "").trim().to_string();
            return Ok(ToolCall {
                tool: ToolName::Unequip,
                argument,
            });
        }

        let mut best: Option<(ToolName, usize)> = None;
        for (tool, patterns) in TOOL_PATTERNS.iter() {
            let score: usize = patterns.iter().map(|p| p.find_iter(&lowered).count()).sum();
            if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((*tool, score));
            }
        }

        match best {
            Some((tool, _)) => Ok(ToolCall {
                tool,
                argument: Self::extract_argument(input),
            }),
            None => Err(RouterError::NoTool),
        }
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(input: &str) -> Result<ToolCall, RouterError> {
        let router = KeywordRouter::new();
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(router.route(input))
    }

    #[test]
    fn schema_covers_all_canonical_tools() {
        let schema = tool_schema();
        assert_eq!(schema.len(), 13);
        assert!(schema.iter().any(|t| t.name == "cast_magic"));
        assert!(schema.iter().any(|t| t.name == "unequip"));
    }

    #[test]
    fn take_off_routes_to_unequip_never_take() {
        for input in ["take off ring", "take the ring off", "unequip ring"] {
            let call = route(input).unwrap();
            assert_eq!(call.tool, ToolName::Unequip, "misrouted: {input}");
            assert_eq!(call.argument, "ring");
        }
    }

    #[test]
    fn plain_take_still_routes_to_take() {
        let call = route("take the sword").unwrap();
        assert_eq!(call.tool, ToolName::Take);
        assert_eq!(call.argument, "sword");
    }

    #[test]
    fn wear_routes_to_equip() {
        let call = route("wear the leather armor").unwrap();
        assert_eq!(call.tool, ToolName::Equip);
        assert_eq!(call.argument, "leather armor");
    }

    #[test]
    fn unlock_phrases_route_to_unlock() {
        let call = route("open the locked chest").unwrap();
        assert_eq!(call.tool, ToolName::Unlock);
    }

    #[test]
    fn gibberish_yields_no_tool() {
        assert!(matches!(route("xyzzy plugh"), Err(RouterError::NoTool)));
        assert!(matches!(route(""), Err(RouterError::NoTool)));
    }

    #[test]
    fn cast_routes_to_magic() {
        let call = route("cast fireball at the goblin").unwrap();
        assert_eq!(call.tool, ToolName::CastMagic);
    }
}
