//! Spell templates and location-modulated spell instances.
//!
//! Templates are immutable. Instantiating a spell composes a modifications
//! map over the template: scalar multipliers for power, cost and casting
//! time, enum-index deltas for duration/range/area (clamped to the enum
//! bounds), and element additions drawn from the casting location's
//! magical affinities. The derivation from a location profile is
//! deterministic.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

// ─── Enumerations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellElement {
    Fire,
    Water,
    Earth,
    Air,
    Light,
    Shadow,
    Life,
    Death,
    Mind,
    Void,
    Time,
    Space,
}

impl SpellElement {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fire" => Some(Self::Fire),
            "water" => Some(Self::Water),
            "earth" => Some(Self::Earth),
            "air" => Some(Self::Air),
            "light" => Some(Self::Light),
            "shadow" => Some(Self::Shadow),
            "life" => Some(Self::Life),
            "death" => Some(Self::Death),
            "mind" => Some(Self::Mind),
            "void" => Some(Self::Void),
            "time" => Some(Self::Time),
            "space" => Some(Self::Space),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::Water => "water",
            Self::Earth => "earth",
            Self::Air => "air",
            Self::Light => "light",
            Self::Shadow => "shadow",
            Self::Life => "life",
            Self::Death => "death",
            Self::Mind => "mind",
            Self::Void => "void",
            Self::Time => "time",
            Self::Space => "space",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellPurpose {
    Attack,
    Defense,
    Healing,
    Utility,
    Divination,
    Enhancement,
    Transformation,
    Summoning,
    Binding,
    Illusion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellComplexity {
    Simple,
    Basic,
    Intermediate,
    Advanced,
    Complex,
    Masterwork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellDuration {
    Instant,
    Brief,
    Short,
    Medium,
    Long,
    Extended,
    Permanent,
}

impl SpellDuration {
    const LEVELS: [SpellDuration; 7] = [
        Self::Instant,
        Self::Brief,
        Self::Short,
        Self::Medium,
        Self::Long,
        Self::Extended,
        Self::Permanent,
    ];

    fn shifted(self, delta: i32) -> Self {
        shift_enum(&Self::LEVELS, self, delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellRange {
    SelfOnly,
    Touch,
    Short,
    Medium,
    Long,
    Extended,
    Sight,
    Unlimited,
}

impl SpellRange {
    const LEVELS: [SpellRange; 8] = [
        Self::SelfOnly,
        Self::Touch,
        Self::Short,
        Self::Medium,
        Self::Long,
        Self::Extended,
        Self::Sight,
        Self::Unlimited,
    ];

    fn shifted(self, delta: i32) -> Self {
        shift_enum(&Self::LEVELS, self, delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellArea {
    Single,
    Small,
    Medium,
    Large,
    Huge,
    Massive,
}

impl SpellArea {
    const LEVELS: [SpellArea; 6] = [
        Self::Single,
        Self::Small,
        Self::Medium,
        Self::Large,
        Self::Huge,
        Self::Massive,
    ];

    fn shifted(self, delta: i32) -> Self {
        shift_enum(&Self::LEVELS, self, delta)
    }
}

fn shift_enum<T: Copy + PartialEq>(levels: &[T], current: T, delta: i32) -> T {
    let idx = levels.iter().position(|l| *l == current).unwrap_or(0) as i32;
    let new_idx = (idx + delta).clamp(0, levels.len() as i32 - 1) as usize;
    levels[new_idx]
}

// ─── Templates and instances ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub elements: Vec<SpellElement>,
    pub purpose: SpellPurpose,
    pub complexity: SpellComplexity,
    pub base_power: f64,
    pub base_duration: SpellDuration,
    pub base_range: SpellRange,
    pub base_area: SpellArea,
    pub mana_cost: u32,
    pub focus_required: u32,
    pub casting_time: f64,
    pub components: Vec<String>,
    pub ritual_required: bool,
    pub tags: Vec<String>,
}

/// Modifications composed over a template when instantiating.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellModifications {
    pub power_mod: f64,
    pub duration_mod: i32,
    pub range_mod: i32,
    pub area_mod: i32,
    pub mana_cost_mod: f64,
    pub focus_required_mod: f64,
    pub casting_time_mod: f64,
    pub added_elements: Vec<SpellElement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Spell {
    pub id: String,
    pub template_id: String,
    pub caster_id: Option<String>,
    pub location_id: Option<String>,
    pub custom_name: Option<String>,
    pub modifications: SpellModifications,
    pub power: f64,
    pub duration: SpellDuration,
    pub range: SpellRange,
    pub area: SpellArea,
    pub mana_cost: u32,
    pub focus_required: u32,
    pub casting_time: f64,
    pub elements: Vec<SpellElement>,
}

impl Spell {
    fn derive(template: &SpellTemplate, spell_id: String, mods: SpellModifications) -> Self {
        let power = template.base_power * (1.0 + mods.power_mod);
        let mana_cost =
            ((template.mana_cost as f64 * (1.0 + mods.mana_cost_mod)) as u32).max(1);
        let focus_required =
            ((template.focus_required as f64 * (1.0 + mods.focus_required_mod)) as u32).max(1);
        let casting_time = (template.casting_time * (1.0 + mods.casting_time_mod)).max(0.1);

        let mut elements = template.elements.clone();
        for element in &mods.added_elements {
            if !elements.contains(element) {
                elements.push(*element);
            }
        }

        Self {
            id: spell_id,
            template_id: template.id.clone(),
            caster_id: None,
            location_id: None,
            custom_name: None,
            power,
            duration: template.base_duration.shifted(mods.duration_mod),
            range: template.base_range.shifted(mods.range_mod),
            area: template.base_area.shifted(mods.area_mod),
            mana_cost,
            focus_required,
            casting_time,
            elements,
            modifications: mods,
        }
    }

    #[allow(dead_code)]
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.template_id)
    }
}

// ─── Location magic profile ──────────────────────────────────────────

/// Magical character of a casting location, supplied by the world layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicProfile {
    /// 0.0 (mundane) to 1.0 (saturated).
    pub strength: f64,
    /// "very_stable" | "stable" | "fluctuating" | "unstable" | "chaotic"
    pub stability: String,
    /// element name -> affinity 0.0..=1.0
    pub affinities: BTreeMap<String, f64>,
}

impl MagicProfile {
    fn stability_multiplier(&self) -> f64 {
        match self.stability.as_str() {
            "very_stable" => 1.0,
            "stable" => 0.9,
            "fluctuating" => 0.7,
            "unstable" => 0.5,
            "chaotic" => 0.3,
            _ => 0.8,
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SpellRegistry {
    templates: HashMap<String, SpellTemplate>,
    spells: HashMap<String, Spell>,
    next_spell_seq: u64,
}

impl SpellRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.load_default_templates();
        registry
    }

    pub fn template(&self, template_id: &str) -> Option<&SpellTemplate> {
        self.templates.get(template_id)
    }

    #[allow(dead_code)]
    pub fn spell(&self, spell_id: &str) -> Option<&Spell> {
        self.spells.get(spell_id)
    }

    #[allow(dead_code)]
    pub fn add_template(&mut self, template: SpellTemplate) -> bool {
        if self.templates.contains_key(&template.id) {
            return false;
        }
        self.templates.insert(template.id.clone(), template);
        true
    }

    #[allow(dead_code)]
    pub fn templates_by_element(&self, element: SpellElement) -> Vec<&SpellTemplate> {
        self.templates
            .values()
            .filter(|t| t.elements.contains(&element))
            .collect()
    }

    #[allow(dead_code)]
    pub fn templates_by_purpose(&self, purpose: SpellPurpose) -> Vec<&SpellTemplate> {
        self.templates
            .values()
            .filter(|t| t.purpose == purpose)
            .collect()
    }

    /// Instantiate a template, composing location modifications when a
    /// magic profile is supplied.
    pub fn instantiate(
        &mut self,
        template_id: &str,
        caster_id: Option<&str>,
        location_id: Option<&str>,
        profile: Option<&MagicProfile>,
    ) -> Option<Spell> {
        let template = self.templates.get(template_id)?.clone();

        let mods = profile
            .map(|p| Self::location_modifications(&template, p))
            .unwrap_or_default();

        let spell_id = format!("spell_{template_id}_{}", self.next_spell_seq);
        self.next_spell_seq += 1;

        let mut spell = Spell::derive(&template, spell_id, mods);
        spell.caster_id = caster_id.map(str::to_string);
        spell.location_id = location_id.map(str::to_string);

        debug!(
            "Instantiated spell {} (power {:.1})",
            spell.id, spell.power
        );
        self.spells.insert(spell.id.clone(), spell.clone());
        Some(spell)
    }

    /// Derive modifications from a location profile. Deterministic: the
    /// same template and profile always yield the same modifications.
    pub fn location_modifications(
        template: &SpellTemplate,
        profile: &MagicProfile,
    ) -> SpellModifications {
        if profile.strength < 0.1 {
            return SpellModifications::default();
        }

        let base_modifier = profile.strength * 0.5;

        // Element affinity boost, slightly negative when nothing matches.
        let mut element_boost = 0.0;
        let mut element_match = false;
        for element in &template.elements {
            if let Some(affinity) = profile.affinities.get(element.as_str()) {
                element_match = true;
                element_boost += affinity * 0.3;
            }
        }
        if !element_match {
            element_boost = -0.1;
        }

        // Certain purposes thrive where the matching affinity runs strong.
        let affinity_above = |name: &str, threshold: f64| {
            profile
                .affinities
                .get(name)
                .map(|a| *a > threshold)
                .unwrap_or(false)
        };
        let purpose_mod = match template.purpose {
            SpellPurpose::Attack if affinity_above("fire", 0.5) => 0.2,
            SpellPurpose::Healing if affinity_above("life", 0.5) => 0.2,
            SpellPurpose::Defense if affinity_above("earth", 0.5) => 0.2,
            SpellPurpose::Divination if affinity_above("mind", 0.5) => 0.2,
            _ => 0.0,
        };

        let power_mod = ((base_modifier + element_boost + purpose_mod)
            * profile.stability_multiplier())
        .clamp(-0.5, 1.0);

        let mut mods = SpellModifications {
            power_mod,
            duration_mod: (power_mod * 2.0) as i32,
            range_mod: (power_mod * 1.5) as i32,
            area_mod: (power_mod * 1.5) as i32,
            ..Default::default()
        };

        // Cost moves with power, but less dramatically.
        if power_mod > 0.0 {
            mods.mana_cost_mod = power_mod * 0.7;
            mods.focus_required_mod = power_mod * 0.6;
        } else {
            mods.mana_cost_mod = power_mod * 0.5;
            mods.focus_required_mod = power_mod * 0.4;
        }

        // A strongly favorable site quickens casting; a hostile one drags.
        if power_mod > 0.3 {
            mods.casting_time_mod = -0.2;
        } else if power_mod < -0.2 {
            mods.casting_time_mod = 0.3;
        }

        // Saturated affinities bleed their element into the spell.
        for (name, affinity) in &profile.affinities {
            if *affinity > 0.7 {
                if let Some(element) = SpellElement::from_str(name) {
                    if !template.elements.contains(&element) {
                        mods.added_elements.push(element);
                    }
                }
            }
        }

        mods
    }

    fn load_default_templates(&mut self) {
        let templates = vec![
            SpellTemplate {
                id: "fireball".to_string(),
                name: "Fireball".to_string(),
                description:
                    "A ball of fire that explodes on impact, dealing damage in a small area."
                        .to_string(),
                elements: vec![SpellElement::Fire],
                purpose: SpellPurpose::Attack,
                complexity: SpellComplexity::Basic,
                base_power: 10.0,
                base_duration: SpellDuration::Instant,
                base_range: SpellRange::Medium,
                base_area: SpellArea::Small,
                mana_cost: 15,
                focus_required: 10,
                casting_time: 1.5,
                components: vec!["verbal".to_string(), "somatic".to_string()],
                ritual_required: false,
                tags: vec![
                    "fire".to_string(),
                    "explosion".to_string(),
                    "projectile".to_string(),
                ],
            },
            SpellTemplate {
                id: "ice_spike".to_string(),
                name: "Ice Spike".to_string(),
                description: "A sharp spike of ice that pierces a single target.".to_string(),
                elements: vec![SpellElement::Water],
                purpose: SpellPurpose::Attack,
                complexity: SpellComplexity::Basic,
                base_power: 12.0,
                base_duration: SpellDuration::Instant,
                base_range: SpellRange::Medium,
                base_area: SpellArea::Single,
                mana_cost: 12,
                focus_required: 8,
                casting_time: 1.0,
                components: vec!["somatic".to_string()],
                ritual_required: false,
                tags: vec![
                    "ice".to_string(),
                    "piercing".to_string(),
                    "projectile".to_string(),
                ],
            },
            SpellTemplate {
                id: "stone_skin".to_string(),
                name: "Stone Skin".to_string(),
                description:
                    "Hardens the caster's skin, providing protection against physical attacks."
                        .to_string(),
                elements: vec![SpellElement::Earth],
                purpose: SpellPurpose::Defense,
                complexity: SpellComplexity::Basic,
                base_power: 8.0,
                base_duration: SpellDuration::Medium,
                base_range: SpellRange::SelfOnly,
                base_area: SpellArea::Single,
                mana_cost: 20,
                focus_required: 15,
                casting_time: 2.0,
                components: vec!["verbal".to_string(), "somatic".to_string()],
                ritual_required: false,
                tags: vec![
                    "earth".to_string(),
                    "protection".to_string(),
                    "physical".to_string(),
                ],
            },
            SpellTemplate {
                id: "healing_touch".to_string(),
                name: "Healing Touch".to_string(),
                description: "A gentle touch that heals wounds and restores vitality."
                    .to_string(),
                elements: vec![SpellElement::Life],
                purpose: SpellPurpose::Healing,
                complexity: SpellComplexity::Basic,
                base_power: 15.0,
                base_duration: SpellDuration::Instant,
                base_range: SpellRange::Touch,
                base_area: SpellArea::Single,
                mana_cost: 25,
                focus_required: 20,
                casting_time: 3.0,
                components: vec!["somatic".to_string()],
                ritual_required: false,
                tags: vec![
                    "healing".to_string(),
                    "life".to_string(),
                    "restoration".to_string(),
                ],
            },
            SpellTemplate {
                id: "light".to_string(),
                name: "Light".to_string(),
                description: "Creates a hovering ball of light that illuminates the area."
                    .to_string(),
                elements: vec![SpellElement::Light],
                purpose: SpellPurpose::Utility,
                complexity: SpellComplexity::Simple,
                base_power: 5.0,
                base_duration: SpellDuration::Long,
                base_range: SpellRange::Touch,
                base_area: SpellArea::Medium,
                mana_cost: 5,
                focus_required: 3,
                casting_time: 0.5,
                components: vec!["verbal".to_string()],
                ritual_required: false,
                tags: vec!["light".to_string(), "illumination".to_string()],
            },
            SpellTemplate {
                id: "teleport".to_string(),
                name: "Teleport".to_string(),
                description:
                    "Instantly transports the caster to a known location within range."
                        .to_string(),
                elements: vec![SpellElement::Space],
                purpose: SpellPurpose::Utility,
                complexity: SpellComplexity::Advanced,
                base_power: 30.0,
                base_duration: SpellDuration::Instant,
                base_range: SpellRange::Long,
                base_area: SpellArea::Single,
                mana_cost: 50,
                focus_required: 40,
                casting_time: 5.0,
                components: vec![
                    "verbal".to_string(),
                    "somatic".to_string(),
                    "material".to_string(),
                ],
                ritual_required: false,
                tags: vec![
                    "teleportation".to_string(),
                    "movement".to_string(),
                    "space".to_string(),
                ],
            },
            SpellTemplate {
                id: "summon_elemental".to_string(),
                name: "Summon Elemental".to_string(),
                description:
                    "Summons an elemental being to serve the caster for a limited time."
                        .to_string(),
                elements: vec![
                    SpellElement::Fire,
                    SpellElement::Water,
                    SpellElement::Earth,
                    SpellElement::Air,
                ],
                purpose: SpellPurpose::Summoning,
                complexity: SpellComplexity::Complex,
                base_power: 25.0,
                base_duration: SpellDuration::Medium,
                base_range: SpellRange::Short,
                base_area: SpellArea::Small,
                mana_cost: 60,
                focus_required: 45,
                casting_time: 10.0,
                components: vec![
                    "verbal".to_string(),
                    "somatic".to_string(),
                    "material".to_string(),
                    "focus".to_string(),
                ],
                ritual_required: true,
                tags: vec![
                    "summoning".to_string(),
                    "elemental".to_string(),
                    "conjuration".to_string(),
                ],
            },
        ];

        for template in templates {
            self.templates.insert(template.id.clone(), template);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_shrine() -> MagicProfile {
        let mut affinities = BTreeMap::new();
        affinities.insert("fire".to_string(), 0.8);
        MagicProfile {
            strength: 0.8,
            stability: "stable".to_string(),
            affinities,
        }
    }

    #[test]
    fn default_templates_are_loaded() {
        let registry = SpellRegistry::new();
        assert!(registry.template("fireball").is_some());
        assert!(registry.template("summon_elemental").is_some());
        assert_eq!(registry.templates_by_purpose(SpellPurpose::Attack).len(), 2);
    }

    #[test]
    fn instantiate_without_profile_keeps_base_values() {
        let mut registry = SpellRegistry::new();
        let spell = registry
            .instantiate("fireball", Some("caster_1"), None, None)
            .unwrap();
        assert!((spell.power - 10.0).abs() < 1e-9);
        assert_eq!(spell.duration, SpellDuration::Instant);
        assert_eq!(spell.range, SpellRange::Medium);
        assert_eq!(spell.mana_cost, 15);
    }

    #[test]
    fn matching_affinity_boosts_power_and_cost() {
        let mut registry = SpellRegistry::new();
        let profile = fire_shrine();
        let spell = registry
            .instantiate("fireball", None, Some("shrine_1"), Some(&profile))
            .unwrap();
        assert!(spell.power > 10.0);
        assert!(spell.mana_cost > 15);
    }

    #[test]
    fn derivation_is_deterministic() {
        let registry = SpellRegistry::new();
        let template = registry.template("fireball").unwrap();
        let profile = fire_shrine();
        let a = SpellRegistry::location_modifications(template, &profile);
        let b = SpellRegistry::location_modifications(template, &profile);
        assert_eq!(a.power_mod, b.power_mod);
        assert_eq!(a.duration_mod, b.duration_mod);
        assert_eq!(a.added_elements, b.added_elements);
    }

    #[test]
    fn mundane_location_has_no_effect() {
        let registry = SpellRegistry::new();
        let template = registry.template("fireball").unwrap();
        let profile = MagicProfile {
            strength: 0.05,
            stability: "stable".to_string(),
            affinities: BTreeMap::new(),
        };
        let mods = SpellRegistry::location_modifications(template, &profile);
        assert_eq!(mods.power_mod, 0.0);
        assert!(mods.added_elements.is_empty());
    }

    #[test]
    fn enum_shifts_clamp_at_bounds() {
        assert_eq!(SpellDuration::Instant.shifted(-3), SpellDuration::Instant);
        assert_eq!(SpellDuration::Permanent.shifted(5), SpellDuration::Permanent);
        assert_eq!(SpellDuration::Short.shifted(1), SpellDuration::Medium);
        assert_eq!(SpellRange::Unlimited.shifted(1), SpellRange::Unlimited);
        assert_eq!(SpellArea::Single.shifted(-1), SpellArea::Single);
    }

    #[test]
    fn saturated_affinity_adds_its_element() {
        let registry = SpellRegistry::new();
        let template = registry.template("ice_spike").unwrap();
        let mut affinities = BTreeMap::new();
        affinities.insert("shadow".to_string(), 0.9);
        affinities.insert("water".to_string(), 0.4);
        let profile = MagicProfile {
            strength: 0.6,
            stability: "very_stable".to_string(),
            affinities,
        };
        let mods = SpellRegistry::location_modifications(template, &profile);
        assert!(mods.added_elements.contains(&SpellElement::Shadow));
        // Water is already a template element, never duplicated.
        assert!(!mods.added_elements.contains(&SpellElement::Water));
    }

    #[test]
    fn costs_never_drop_below_one() {
        let mut registry = SpellRegistry::new();
        let mut affinities = BTreeMap::new();
        affinities.insert("death".to_string(), 0.1);
        let profile = MagicProfile {
            strength: 1.0,
            stability: "chaotic".to_string(),
            affinities,
        };
        let spell = registry
            .instantiate("light", None, Some("wastes_1"), Some(&profile))
            .unwrap();
        assert!(spell.mana_cost >= 1);
        assert!(spell.focus_required >= 1);
        assert!(spell.casting_time >= 0.1);
    }

    #[test]
    fn duplicate_template_ids_are_rejected() {
        let mut registry = SpellRegistry::new();
        let template = registry.template("light").unwrap().clone();
        assert!(!registry.add_template(template));
    }
}
