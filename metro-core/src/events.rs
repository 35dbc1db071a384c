//! Random world events and the player's responses to them.
//!
//! Every event kind has a static [`EventSpec`]: trigger chance, duration,
//! cooldown, requirements, what happens immediately, and a list of choices.
//! Triggered events become [`EventInstance`]s kept in history until the
//! player resolves them with one of the choices.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::diplomacy::DiplomacySystem;
use crate::error::{SimError, SimResult};
use crate::infrastructure::BuildingType;
use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::tunnel::TunnelState;
use crate::types::{FactionId, ResourceKind};

pub const MAX_HISTORY: usize = 100;
/// Stations never drop below this population from event casualties
pub const CASUALTY_POPULATION_FLOOR: u32 = 10;

// ============================================================================
// Classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Environmental,
    Political,
    Economic,
    Military,
    Social,
    Anomalous,
}

impl EventCategory {
    pub fn all() -> impl Iterator<Item = EventCategory> {
        [
            EventCategory::Environmental,
            EventCategory::Political,
            EventCategory::Economic,
            EventCategory::Military,
            EventCategory::Social,
            EventCategory::Anomalous,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            EventCategory::Environmental => "environmental",
            EventCategory::Political => "political",
            EventCategory::Economic => "economic",
            EventCategory::Military => "military",
            EventCategory::Social => "social",
            EventCategory::Anomalous => "anomalous",
        }
    }

    pub fn default_modifier(self) -> f64 {
        match self {
            EventCategory::Anomalous => 0.5,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Minor,
    Moderate,
    Major,
    Catastrophic,
}

impl EventSeverity {
    pub fn name(self) -> &'static str {
        match self {
            EventSeverity::Minor => "minor",
            EventSeverity::Moderate => "moderate",
            EventSeverity::Major => "major",
            EventSeverity::Catastrophic => "catastrophic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Station,
    Tunnel,
    Line,
    Region,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TunnelCollapse,
    RadiationStorm,
    MutantInfestation,
    FactionUprising,
    DiplomaticCrisis,
    ResourceDiscovery,
    TradeCaravan,
    BanditRaid,
    PopulationBoom,
    AnomalousActivity,
    GreatLibraryDiscovery,
}

impl EventKind {
    pub fn all() -> impl Iterator<Item = EventKind> {
        [
            EventKind::TunnelCollapse,
            EventKind::RadiationStorm,
            EventKind::MutantInfestation,
            EventKind::FactionUprising,
            EventKind::DiplomaticCrisis,
            EventKind::ResourceDiscovery,
            EventKind::TradeCaravan,
            EventKind::BanditRaid,
            EventKind::PopulationBoom,
            EventKind::AnomalousActivity,
            EventKind::GreatLibraryDiscovery,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::TunnelCollapse => "tunnel_collapse",
            EventKind::RadiationStorm => "radiation_storm",
            EventKind::MutantInfestation => "mutant_infestation",
            EventKind::FactionUprising => "faction_uprising",
            EventKind::DiplomaticCrisis => "diplomatic_crisis",
            EventKind::ResourceDiscovery => "resource_discovery",
            EventKind::TradeCaravan => "trade_caravan",
            EventKind::BanditRaid => "bandit_raid",
            EventKind::PopulationBoom => "population_boom",
            EventKind::AnomalousActivity => "anomalous_activity",
            EventKind::GreatLibraryDiscovery => "great_library_discovery",
        }
    }

    pub fn from_name(name: &str) -> Option<EventKind> {
        EventKind::all().find(|k| k.name() == name)
    }

    pub fn spec(self) -> EventSpec {
        event_spec(self)
    }
}

// ============================================================================
// Static catalog
// ============================================================================

/// One thing an event or a choice does to the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Collapse the target tunnel for the event's duration
    BlockTunnel,
    Casualties { min: u32, max: u32 },
    SetTunnelState(TunnelState),
    /// Roll a reward per resource, claimed later by a choice
    ResourceBonus(&'static [(ResourceKind, i64, i64)]),
    ClearTunnel,
    ReduceDuration(u32),
    /// Ends the event's ongoing effects
    EndOngoing,
    ClaimRewards,
    ShareRewards,
    Grant(ResourceKind, i64),
    Morale(i64),
    PopulationGain { min: u32, max: u32 },
    LoseStation,
    Relationship(i32),
    Reputation(i32),
    Note(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChoiceSpec {
    pub id: &'static str,
    pub description: &'static str,
    pub costs: &'static [(ResourceKind, i64)],
    pub military_units: usize,
    pub allied_factions: usize,
    pub requires_library: bool,
    pub effects: &'static [Effect],
    /// Chance the effects land once costs are paid
    pub success_chance: f64,
}

const fn choice(
    id: &'static str,
    description: &'static str,
    costs: &'static [(ResourceKind, i64)],
    effects: &'static [Effect],
) -> ChoiceSpec {
    ChoiceSpec {
        id,
        description,
        costs,
        military_units: 0,
        allied_factions: 0,
        requires_library: false,
        effects,
        success_chance: 1.0,
    }
}

impl ChoiceSpec {
    const fn units(mut self, n: usize) -> Self {
        self.military_units = n;
        self
    }

    const fn allies(mut self, n: usize) -> Self {
        self.allied_factions = n;
        self
    }

    const fn library(mut self) -> Self {
        self.requires_library = true;
        self
    }

    const fn chance(mut self, p: f64) -> Self {
        self.success_chance = p;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventRequirements {
    pub min_turn: Option<u32>,
    pub min_morale: Option<u32>,
    pub max_morale: Option<u32>,
    /// Tunnel targets must currently be in one of these states (any if empty)
    pub tunnel_states: &'static [TunnelState],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSpec {
    pub title: &'static str,
    pub description: &'static str,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub scope: EventScope,
    pub probability: f64,
    pub duration: u32,
    pub cooldown: u32,
    pub historical: bool,
    pub requirements: EventRequirements,
    pub immediate: &'static [Effect],
    pub choices: &'static [ChoiceSpec],
    /// Medicine consumption multiplier while active
    pub medicine_multiplier: f64,
    /// Morale change per turn on player stations while active
    pub ongoing_morale: i64,
}

use ResourceKind::{CleanWater, Food, Medicine, MgrRounds, Scrap};

pub fn event_spec(kind: EventKind) -> EventSpec {
    let base = EventSpec {
        title: "",
        description: "",
        category: EventCategory::Environmental,
        severity: EventSeverity::Minor,
        scope: EventScope::Station,
        probability: 0.0,
        duration: 1,
        cooldown: 0,
        historical: false,
        requirements: EventRequirements {
            min_turn: None,
            min_morale: None,
            max_morale: None,
            tunnel_states: &[],
        },
        immediate: &[],
        choices: &[],
        medicine_multiplier: 1.0,
        ongoing_morale: 0,
    };
    match kind {
        EventKind::TunnelCollapse => EventSpec {
            title: "Tunnel Collapse",
            description: "A section of tunnel has collapsed, blocking passage between stations.",
            severity: EventSeverity::Moderate,
            scope: EventScope::Tunnel,
            probability: 0.05,
            duration: 3,
            cooldown: 10,
            immediate: &[Effect::BlockTunnel, Effect::Casualties { min: 5, max: 20 }],
            choices: const {
                &[
                    choice(
                        "clear_debris",
                        "Send work crews to clear the debris",
                        &[(Scrap, 30), (MgrRounds, 5)],
                        &[Effect::ClearTunnel, Effect::ReduceDuration(2)],
                    ),
                    choice(
                        "find_alternate",
                        "Find alternate routes and wait",
                        &[],
                        &[Effect::Note("trade_disruption")],
                    ),
                ]
            },
            ..base
        },
        EventKind::RadiationStorm => EventSpec {
            title: "Radiation Storm",
            description: "A massive radiation storm sweeps across the surface, affecting all Metro stations.",
            severity: EventSeverity::Major,
            scope: EventScope::Global,
            probability: 0.02,
            duration: 2,
            cooldown: 20,
            medicine_multiplier: 2.0,
            ongoing_morale: -10,
            choices: const {
                &[
                    choice(
                        "seal_stations",
                        "Seal all station entrances and distribute medicine",
                        &[(Medicine, 50), (Scrap, 20)],
                        &[Effect::EndOngoing, Effect::Morale(5)],
                    ),
                    choice(
                        "weather_storm",
                        "Endure the storm with minimal intervention",
                        &[],
                        &[Effect::Casualties { min: 10, max: 30 }],
                    ),
                ]
            },
            ..base
        },
        EventKind::MutantInfestation => EventSpec {
            title: "Mutant Infestation",
            description: "A pack of mutants has taken up residence in a tunnel section, making travel dangerous.",
            severity: EventSeverity::Moderate,
            scope: EventScope::Tunnel,
            probability: 0.08,
            duration: 5,
            cooldown: 8,
            requirements: EventRequirements {
                tunnel_states: &[TunnelState::Clear, TunnelState::Hazardous],
                ..base.requirements
            },
            immediate: &[Effect::SetTunnelState(TunnelState::Infested)],
            choices: const {
                &[
                    choice(
                        "military_sweep",
                        "Send military units to clear the mutants",
                        &[(MgrRounds, 15)],
                        &[Effect::ClearTunnel, Effect::Note("unit_casualties")],
                    )
                    .units(2),
                    choice(
                        "hire_stalkers",
                        "Hire Stalkers to deal with the problem",
                        &[(MgrRounds, 25), (Food, 20)],
                        &[Effect::ClearTunnel],
                    ),
                    choice(
                        "avoid_area",
                        "Mark the area as dangerous and find alternate routes",
                        &[],
                        &[Effect::SetTunnelState(TunnelState::Hazardous)],
                    ),
                ]
            },
            ..base
        },
        EventKind::FactionUprising => EventSpec {
            title: "Faction Uprising",
            description: "Dissidents within a station have risen up against the current leadership.",
            category: EventCategory::Political,
            severity: EventSeverity::Major,
            probability: 0.03,
            cooldown: 15,
            requirements: EventRequirements {
                max_morale: Some(40),
                ..base.requirements
            },
            choices: const {
                &[
                    choice(
                        "military_intervention",
                        "Send military forces to restore order",
                        &[(MgrRounds, 20)],
                        &[Effect::Morale(-15), Effect::Casualties { min: 20, max: 50 }],
                    )
                    .units(3),
                    choice(
                        "negotiate",
                        "Attempt to negotiate with the rebels",
                        &[(Food, 30), (MgrRounds, 10)],
                        &[Effect::Morale(10)],
                    )
                    .chance(0.7),
                    choice(
                        "grant_autonomy",
                        "Grant the station semi-autonomous status",
                        &[],
                        &[Effect::LoseStation, Effect::Relationship(20)],
                    ),
                ]
            },
            ..base
        },
        EventKind::DiplomaticCrisis => EventSpec {
            title: "Diplomatic Crisis",
            description: "A diplomatic incident has strained relationships with a neighboring faction.",
            category: EventCategory::Political,
            severity: EventSeverity::Moderate,
            scope: EventScope::Global,
            probability: 0.06,
            cooldown: 12,
            immediate: &[Effect::Relationship(-30)],
            choices: const {
                &[
                    choice(
                        "formal_apology",
                        "Issue a formal apology and offer reparations",
                        &[(MgrRounds, 30), (Food, 50)],
                        &[Effect::Relationship(20), Effect::Reputation(-5)],
                    ),
                    choice(
                        "stand_firm",
                        "Refuse to back down and prepare for consequences",
                        &[],
                        &[Effect::Relationship(-20), Effect::Note("military_readiness")],
                    ),
                    choice(
                        "seek_mediation",
                        "Seek mediation from a neutral faction",
                        &[(MgrRounds, 15)],
                        &[Effect::Relationship(10)],
                    )
                    .chance(0.8),
                ]
            },
            ..base
        },
        EventKind::ResourceDiscovery => EventSpec {
            title: "Resource Discovery",
            description: "Scavengers have discovered a cache of pre-war supplies in an abandoned section.",
            category: EventCategory::Economic,
            probability: 0.12,
            cooldown: 5,
            immediate: &[Effect::ResourceBonus(&[
                (Food, 20, 50),
                (Scrap, 30, 80),
                (Medicine, 10, 25),
                (MgrRounds, 5, 15),
            ])],
            choices: const {
                &[
                    choice(
                        "claim_all",
                        "Claim all resources for your faction",
                        &[],
                        &[Effect::ClaimRewards, Effect::Reputation(-10)],
                    ),
                    choice(
                        "share_discovery",
                        "Share the discovery with neighboring stations",
                        &[],
                        &[Effect::ShareRewards, Effect::Reputation(15), Effect::Relationship(10)],
                    ),
                    choice(
                        "trade_discovery",
                        "Trade the information for immediate benefits",
                        &[],
                        &[Effect::Grant(MgrRounds, 50), Effect::Reputation(5)],
                    ),
                ]
            },
            ..base
        },
        EventKind::TradeCaravan => EventSpec {
            title: "Merchant Caravan",
            description: "A well-equipped merchant caravan has arrived, offering rare goods for trade.",
            category: EventCategory::Economic,
            probability: 0.15,
            cooldown: 3,
            choices: const {
                &[
                    choice(
                        "buy_supplies",
                        "Purchase medical supplies and equipment",
                        &[(MgrRounds, 40)],
                        &[Effect::Grant(Medicine, 30)],
                    ),
                    choice(
                        "buy_weapons",
                        "Purchase weapons and ammunition",
                        &[(MgrRounds, 60)],
                        &[Effect::Grant(MgrRounds, 20), Effect::Note("military_equipment")],
                    ),
                    choice(
                        "sell_goods",
                        "Sell excess resources to the caravan",
                        &[(Food, 50), (Scrap, 30)],
                        &[Effect::Grant(MgrRounds, 80)],
                    ),
                    choice("decline_trade", "Politely decline to trade", &[], &[]),
                ]
            },
            ..base
        },
        EventKind::BanditRaid => EventSpec {
            title: "Bandit Raid",
            description: "A group of well-armed bandits is threatening a station, demanding tribute.",
            category: EventCategory::Military,
            severity: EventSeverity::Moderate,
            probability: 0.07,
            cooldown: 8,
            immediate: &[Effect::Morale(-5)],
            choices: const {
                &[
                    choice(
                        "fight_bandits",
                        "Fight off the bandits with your military forces",
                        &[],
                        &[Effect::Reputation(10), Effect::Note("unit_casualties")],
                    )
                    .units(2),
                    choice(
                        "pay_tribute",
                        "Pay the bandits to leave peacefully",
                        &[(MgrRounds, 30), (Food, 40)],
                        &[Effect::Reputation(-5)],
                    ),
                    choice(
                        "negotiate",
                        "Try to negotiate with the bandit leader",
                        &[(MgrRounds, 15)],
                        &[Effect::Note("bandit_deal")],
                    )
                    .chance(0.6),
                    choice(
                        "call_for_help",
                        "Call for military assistance from allies",
                        &[(MgrRounds, 20)],
                        &[Effect::Relationship(5)],
                    )
                    .allies(1),
                ]
            },
            ..base
        },
        EventKind::PopulationBoom => EventSpec {
            title: "Population Boom",
            description: "A group of refugees has arrived, seeking shelter and a new home.",
            category: EventCategory::Social,
            probability: 0.10,
            cooldown: 6,
            requirements: EventRequirements {
                min_morale: Some(60),
                ..base.requirements
            },
            choices: const {
                &[
                    choice(
                        "welcome_refugees",
                        "Welcome the refugees and integrate them into the community",
                        &[(Food, 30), (CleanWater, 20)],
                        &[Effect::PopulationGain { min: 20, max: 40 }, Effect::Morale(10)],
                    ),
                    choice(
                        "selective_acceptance",
                        "Accept only skilled workers and specialists",
                        &[(Food, 15), (MgrRounds, 10)],
                        &[Effect::PopulationGain { min: 10, max: 20 }],
                    ),
                    choice(
                        "turn_away",
                        "Turn the refugees away due to resource constraints",
                        &[],
                        &[Effect::Morale(-15), Effect::Reputation(-10)],
                    ),
                ]
            },
            ..base
        },
        EventKind::AnomalousActivity => EventSpec {
            title: "Anomalous Activity",
            description: "Strange phenomena have been reported in a tunnel section - reality seems unstable.",
            category: EventCategory::Anomalous,
            severity: EventSeverity::Major,
            scope: EventScope::Tunnel,
            probability: 0.01,
            duration: 10,
            cooldown: 30,
            immediate: &[Effect::SetTunnelState(TunnelState::Anomalous)],
            choices: const {
                &[
                    choice(
                        "scientific_study",
                        "Send scientists to study the anomaly",
                        &[(Medicine, 20), (MgrRounds, 30)],
                        &[Effect::Note("anomaly_research")],
                    )
                    .library(),
                    choice(
                        "seal_area",
                        "Seal off the affected area completely",
                        &[(Scrap, 50)],
                        &[Effect::SetTunnelState(TunnelState::Collapsed), Effect::EndOngoing],
                    ),
                    choice(
                        "exploit_anomaly",
                        "Try to exploit the anomaly for resources",
                        &[],
                        &[Effect::Grant(Scrap, 40), Effect::Grant(Medicine, 10)],
                    )
                    .chance(0.4),
                ]
            },
            ..base
        },
        EventKind::GreatLibraryDiscovery => EventSpec {
            title: "The Great Library Discovery",
            description: "Explorers have discovered the ruins of the State Library with intact pre-war archives.",
            category: EventCategory::Economic,
            severity: EventSeverity::Major,
            scope: EventScope::Global,
            probability: 0.005,
            historical: true,
            requirements: EventRequirements {
                min_turn: Some(20),
                ..base.requirements
            },
            choices: const {
                &[
                    choice(
                        "claim_library",
                        "Claim the library for your faction exclusively",
                        &[(MgrRounds, 100)],
                        &[Effect::Reputation(-30), Effect::Note("library_control")],
                    )
                    .units(5),
                    choice(
                        "share_knowledge",
                        "Share the discovery with all Metro factions",
                        &[],
                        &[Effect::Reputation(50), Effect::Relationship(30)],
                    ),
                    choice(
                        "form_consortium",
                        "Form a research consortium with allied factions",
                        &[],
                        &[Effect::Relationship(20), Effect::Note("research_consortium")],
                    )
                    .allies(2),
                ]
            },
            ..base
        },
    }
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum EventTarget {
    Station(String),
    Tunnel(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct EventInstance {
    pub id: String,
    pub kind: EventKind,
    pub turn_triggered: u32,
    pub remaining_turns: u32,
    pub target: Option<EventTarget>,
    /// Faction on the other side of relationship effects
    pub counterpart: Option<FactionId>,
    pub casualties: u32,
    pub rewards: ResourcePool,
    pub resolved: bool,
    pub chosen_option: Option<String>,
}

impl EventInstance {
    pub fn spec(&self) -> EventSpec {
        self.kind.spec()
    }

    pub fn is_active(&self) -> bool {
        self.remaining_turns > 0
    }

    pub fn target_station(&self) -> Option<&str> {
        match &self.target {
            Some(EventTarget::Station(name)) => Some(name),
            _ => None,
        }
    }

    pub fn target_tunnel(&self) -> Option<(&str, &str)> {
        match &self.target {
            Some(EventTarget::Tunnel(a, b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn info(&self) -> EventInfo {
        let spec = self.spec();
        EventInfo {
            id: self.id.clone(),
            kind: self.kind.name().to_string(),
            title: spec.title.to_string(),
            description: spec.description.to_string(),
            category: spec.category,
            severity: spec.severity,
            target: match &self.target {
                Some(EventTarget::Station(s)) => Some(s.clone()),
                Some(EventTarget::Tunnel(a, b)) => Some(format!("{}-{}", a, b)),
                None => None,
            },
            turn_triggered: self.turn_triggered,
            remaining_turns: self.remaining_turns,
            resolved: self.resolved,
            choices: spec
                .choices
                .iter()
                .map(|c| ChoiceInfo {
                    id: c.id.to_string(),
                    description: c.description.to_string(),
                    costs: ResourcePool::from_amounts(c.costs).unwrap_or_default(),
                    military_units: c.military_units as u32,
                    allied_factions: c.allied_factions as u32,
                    requires_library: c.requires_library,
                    success_chance: c.success_chance,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ChoiceInfo {
    pub id: String,
    pub description: String,
    pub costs: ResourcePool,
    pub military_units: u32,
    pub allied_factions: u32,
    pub requires_library: bool,
    pub success_chance: f64,
}

/// Presentation view of an event awaiting (or past) a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct EventInfo {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub target: Option<String>,
    pub turn_triggered: u32,
    pub remaining_turns: u32,
    pub resolved: bool,
    pub choices: Vec<ChoiceInfo>,
}

/// What the resolving faction brings to a choice
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub faction: FactionId,
    pub stations: &'a [String],
    pub military_units: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ChoiceOutcome {
    pub event_id: String,
    pub choice_id: String,
    pub succeeded: bool,
    pub effects: Vec<String>,
    pub resources_gained: ResourcePool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct EventStatistics {
    pub total_events: usize,
    pub active_events: usize,
    pub by_category: BTreeMap<EventCategory, u32>,
    pub by_severity: BTreeMap<EventSeverity, u32>,
    pub historical_triggered: usize,
    pub reputation: i32,
}

// ============================================================================
// EventSystem
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSystem {
    pub history: Vec<EventInstance>,
    pub cooldowns: BTreeMap<EventKind, u32>,
    pub historical_triggered: Vec<EventKind>,
    pub category_modifiers: BTreeMap<EventCategory, f64>,
    pub reputation: i32,
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSystem {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            cooldowns: BTreeMap::new(),
            historical_triggered: Vec::new(),
            category_modifiers: EventCategory::all().map(|c| (c, c.default_modifier())).collect(),
            reputation: 0,
        }
    }

    pub fn set_category_modifier(&mut self, category: EventCategory, modifier: f64) {
        self.category_modifiers.insert(category, modifier.max(0.0));
    }

    pub fn category_modifier(&self, category: EventCategory) -> f64 {
        self.category_modifiers.get(&category).copied().unwrap_or(1.0)
    }

    pub fn active(&self) -> impl Iterator<Item = &EventInstance> {
        self.history.iter().filter(|e| e.is_active())
    }

    /// Unresolved events that still offer a choice
    pub fn pending(&self) -> impl Iterator<Item = &EventInstance> {
        self.history
            .iter()
            .filter(|e| !e.resolved && !e.spec().choices.is_empty())
    }

    pub fn recent(&self, limit: usize) -> &[EventInstance] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn is_on_cooldown(&self, kind: EventKind) -> bool {
        self.cooldowns.contains_key(&kind)
    }

    /// Combined multiplier on a resource's consumption from active events
    pub fn consumption_multiplier(&self, kind: ResourceKind) -> f64 {
        if kind != ResourceKind::Medicine {
            return 1.0;
        }
        self.active().map(|e| e.spec().medicine_multiplier).fold(1.0, f64::max)
    }

    /// Cooldowns, ongoing effects, then random triggers. Returns the ids of
    /// the events triggered this turn.
    pub fn process_turn<R: Rng>(
        &mut self,
        turn: u32,
        map: &mut MetroMap,
        diplomacy: &mut DiplomacySystem,
        ctx: &EventContext,
        rng: &mut R,
    ) -> Vec<String> {
        self.update_cooldowns();
        self.process_ongoing(turn, map, ctx);

        let mut triggered = Vec::new();
        for kind in EventKind::all() {
            let spec = kind.spec();
            if self.is_on_cooldown(kind) {
                continue;
            }
            if spec.historical && self.historical_triggered.contains(&kind) {
                continue;
            }
            if spec.requirements.min_turn.is_some_and(|min| turn < min) {
                continue;
            }
            let candidates = Self::candidate_targets(&spec, map, ctx);
            if candidates.as_ref().is_some_and(|c| c.is_empty()) {
                continue;
            }

            let chance = spec.probability * self.category_modifier(spec.category);
            let roll: f64 = rng.random();
            if roll >= chance {
                continue;
            }

            let target = candidates.and_then(|c| {
                let idx = rng.random_range(0..c.len());
                c.into_iter().nth(idx)
            });
            let id = self.trigger(kind, target, turn, map, diplomacy, ctx, rng);
            if spec.cooldown > 0 {
                self.cooldowns.insert(kind, spec.cooldown);
            }
            if spec.historical {
                self.historical_triggered.push(kind);
            }
            triggered.push(id);
        }

        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
        triggered
    }

    fn update_cooldowns(&mut self) {
        for remaining in self.cooldowns.values_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        self.cooldowns.retain(|_, remaining| *remaining > 0);
    }

    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    fn process_ongoing(&mut self, turn: u32, map: &mut MetroMap, ctx: &EventContext) {
        for event in self.history.iter_mut().filter(|e| e.remaining_turns > 0) {
            let spec = event.kind.spec();
            if spec.ongoing_morale != 0 {
                for name in ctx.stations {
                    if let Some(station) = map.station_mut(name) {
                        station.adjust_morale(spec.ongoing_morale);
                    }
                }
            }
            event.remaining_turns -= 1;
            if event.remaining_turns == 0 {
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "event",
                    turn = turn,
                    event = event.id.as_str(),
                    kind = event.kind.name(),
                    change = "expired",
                );
            }
        }
    }

    /// `None` when the scope needs no target; `Some(empty)` when no target qualifies
    fn candidate_targets(spec: &EventSpec, map: &MetroMap, ctx: &EventContext) -> Option<Vec<EventTarget>> {
        match spec.scope {
            EventScope::Station => Some(
                ctx.stations
                    .iter()
                    .filter_map(|name| map.station(name))
                    .filter(|s| {
                        let req = &spec.requirements;
                        req.min_morale.is_none_or(|min| s.morale >= min)
                            && req.max_morale.is_none_or(|max| s.morale <= max)
                    })
                    .map(|s| EventTarget::Station(s.name.clone()))
                    .collect(),
            ),
            EventScope::Tunnel => Some(
                map.tunnels()
                    .iter()
                    .filter(|t| {
                        spec.requirements.tunnel_states.is_empty()
                            || spec.requirements.tunnel_states.contains(&t.state)
                    })
                    .map(|t| EventTarget::Tunnel(t.station_a.clone(), t.station_b.clone()))
                    .collect(),
            ),
            EventScope::Line | EventScope::Region | EventScope::Global => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn trigger<R: Rng>(
        &mut self,
        kind: EventKind,
        target: Option<EventTarget>,
        turn: u32,
        map: &mut MetroMap,
        diplomacy: &mut DiplomacySystem,
        ctx: &EventContext,
        rng: &mut R,
    ) -> String {
        let spec = kind.spec();
        let counterpart = if spec.immediate.iter().any(|e| matches!(e, Effect::Relationship(_))) {
            let others: Vec<FactionId> = FactionId::major().filter(|f| *f != ctx.faction).collect();
            if others.is_empty() {
                None
            } else {
                Some(others[rng.random_range(0..others.len())])
            }
        } else {
            None
        };

        let mut event = EventInstance {
            id: format!("{}_{}", kind.name(), turn),
            kind,
            turn_triggered: turn,
            remaining_turns: if spec.duration > 1 { spec.duration } else { 0 },
            target,
            counterpart,
            casualties: 0,
            rewards: ResourcePool::new(),
            resolved: false,
            chosen_option: None,
        };

        for effect in spec.immediate {
            match *effect {
                Effect::BlockTunnel => {
                    if let Some(tunnel) = event
                        .target_tunnel()
                        .and_then(|(a, b)| map.tunnel_between_mut(a, b))
                    {
                        tunnel.apply_temporary_blockage(spec.duration);
                    }
                }
                Effect::SetTunnelState(state) => {
                    if let Some(tunnel) = event
                        .target_tunnel()
                        .and_then(|(a, b)| map.tunnel_between_mut(a, b))
                    {
                        tunnel.update_state(state);
                    }
                }
                Effect::Casualties { min, max } => {
                    let lost = rng.random_range(min..=max);
                    let stations = event_stations(&event, map, ctx);
                    event.casualties += apply_casualties(map, &stations, lost);
                }
                Effect::ResourceBonus(ranges) => {
                    for &(resource, min, max) in ranges {
                        let amount = rng.random_range(min..=max);
                        event.rewards = std::mem::take(&mut event.rewards).with(resource, amount);
                    }
                }
                Effect::Morale(change) => {
                    for name in event_stations(&event, map, ctx) {
                        if let Some(station) = map.station_mut(&name) {
                            station.adjust_morale(change);
                        }
                    }
                }
                Effect::Relationship(change) => {
                    if let Some(other) = event.counterpart {
                        diplomacy.adjust(ctx.faction, other, change, turn);
                    }
                }
                _ => {}
            }
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "event",
            turn = turn,
            event = event.id.as_str(),
            kind = kind.name(),
            category = spec.category.name(),
            severity = spec.severity.name(),
            casualties = event.casualties,
            change = "triggered",
        );

        let id = event.id.clone();
        self.history.push(event);
        id
    }

    /// Resolve a pending event with one of its choices. Costs are consumed
    /// all-or-nothing before any effect applies.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_choice<R: Rng>(
        &mut self,
        event_id: &str,
        choice_id: &str,
        map: &mut MetroMap,
        diplomacy: &mut DiplomacySystem,
        resources: &mut ResourcePool,
        ctx: &EventContext,
        turn: u32,
        rng: &mut R,
    ) -> SimResult<ChoiceOutcome> {
        let idx = self
            .history
            .iter()
            .position(|e| !e.resolved && (e.id == event_id || e.kind.name() == event_id))
            .ok_or_else(|| SimError::not_found(format!("no unresolved event '{}'", event_id)))?;
        let spec = self.history[idx].spec();
        let choice = spec
            .choices
            .iter()
            .find(|c| c.id == choice_id)
            .ok_or_else(|| SimError::invalid(format!("event '{}' has no choice '{}'", event_id, choice_id)))?;

        if ctx.military_units < choice.military_units {
            return Err(SimError::invalid(format!(
                "choice '{}' needs {} military units, have {}",
                choice.id, choice.military_units, ctx.military_units
            )));
        }
        let allies = diplomacy.allies_of(ctx.faction).len();
        if allies < choice.allied_factions {
            return Err(SimError::invalid(format!(
                "choice '{}' needs {} allied factions, have {}",
                choice.id, choice.allied_factions, allies
            )));
        }
        if choice.requires_library
            && !ctx
                .stations
                .iter()
                .filter_map(|s| map.station(s))
                .any(|s| s.has_infrastructure(BuildingType::Library))
        {
            return Err(SimError::invalid(format!("choice '{}' needs a library", choice.id)));
        }
        if let Some(short) = resources.first_shortfall(choice.costs) {
            return Err(SimError::Insufficient(short));
        }
        resources.consume_multiple(choice.costs)?;

        let mut outcome = ChoiceOutcome {
            event_id: self.history[idx].id.clone(),
            choice_id: choice.id.to_string(),
            succeeded: true,
            ..Default::default()
        };
        if choice.success_chance < 1.0 {
            let roll: f64 = rng.random();
            outcome.succeeded = roll < choice.success_chance;
        }

        if outcome.succeeded {
            let stations = event_stations(&self.history[idx], map, ctx);
            for effect in choice.effects {
                self.apply_choice_effect(idx, *effect, &stations, map, diplomacy, resources, ctx, turn, rng, &mut outcome);
            }
        }

        let event = &mut self.history[idx];
        event.resolved = true;
        event.chosen_option = Some(choice.id.to_string());

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "event",
            turn = turn,
            event = event.id.as_str(),
            kind = event.kind.name(),
            choice = choice.id,
            succeeded = outcome.succeeded,
            change = "resolved",
        );

        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_choice_effect<R: Rng>(
        &mut self,
        idx: usize,
        effect: Effect,
        stations: &[String],
        map: &mut MetroMap,
        diplomacy: &mut DiplomacySystem,
        resources: &mut ResourcePool,
        ctx: &EventContext,
        turn: u32,
        rng: &mut R,
        outcome: &mut ChoiceOutcome,
    ) {
        let event = &mut self.history[idx];
        match effect {
            Effect::ClearTunnel => {
                let Some((a, b)) = event.target_tunnel() else {
                    return;
                };
                if let Some(tunnel) = map.tunnel_between_mut(a, b) {
                    tunnel.update_state(TunnelState::Clear);
                    tunnel.last_cleared_turn = turn;
                    outcome.effects.push(format!("tunnel {}-{} cleared", a, b));
                }
            }
            Effect::SetTunnelState(state) => {
                let Some((a, b)) = event.target_tunnel() else {
                    return;
                };
                if let Some(tunnel) = map.tunnel_between_mut(a, b) {
                    tunnel.update_state(state);
                    outcome.effects.push(format!("tunnel {}-{} now {:?}", a, b, state));
                }
            }
            Effect::ReduceDuration(turns) => {
                event.remaining_turns = event.remaining_turns.saturating_sub(turns);
                outcome.effects.push(format!("duration reduced by {}", turns));
            }
            Effect::EndOngoing => {
                event.remaining_turns = 0;
                outcome.effects.push("ongoing effects ended".to_string());
            }
            Effect::ClaimRewards | Effect::ShareRewards => {
                let share = if matches!(effect, Effect::ClaimRewards) { 1 } else { 2 };
                let gained: Vec<(ResourceKind, i64)> = event
                    .rewards
                    .amounts()
                    .filter(|(_, amount)| *amount > 0)
                    .map(|(kind, amount)| (kind, amount / share))
                    .collect();
                if resources.add_multiple(&gained).is_ok() && outcome.resources_gained.add_multiple(&gained).is_ok() {
                    outcome.effects.push("discovery claimed".to_string());
                }
            }
            Effect::Grant(kind, amount) => {
                if resources.add(kind, amount).is_ok() && outcome.resources_gained.add(kind, amount).is_ok() {
                    outcome.effects.push(format!("gained {} {}", amount, kind.name()));
                }
            }
            Effect::Morale(change) => {
                for name in stations {
                    if let Some(station) = map.station_mut(name) {
                        station.adjust_morale(change);
                    }
                }
                outcome.effects.push(format!("morale {:+}", change));
            }
            Effect::Casualties { min, max } => {
                let lost = rng.random_range(min..=max);
                let total = apply_casualties(map, stations, lost);
                event.casualties += total;
                outcome.effects.push(format!("{} casualties", total));
            }
            Effect::PopulationGain { min, max } => {
                let gained = rng.random_range(min..=max);
                for name in stations {
                    if let Some(station) = map.station_mut(name) {
                        station.adjust_population(gained as i64, 0);
                    }
                }
                outcome.effects.push(format!("population +{}", gained));
            }
            Effect::LoseStation => {
                for name in stations {
                    if let Some(station) = map.station_mut(name) {
                        station.change_faction_control(FactionId::Independent, true);
                        outcome.effects.push(format!("{} became independent", name));
                    }
                }
            }
            Effect::Relationship(change) => {
                let targets: Vec<FactionId> = match event.counterpart {
                    Some(other) => vec![other],
                    None => FactionId::major().filter(|f| *f != ctx.faction).collect(),
                };
                for other in targets {
                    diplomacy.adjust(ctx.faction, other, change, turn);
                }
                outcome.effects.push(format!("relations {:+}", change));
            }
            Effect::Reputation(change) => {
                self.reputation += change;
                outcome.effects.push(format!("reputation {:+}", change));
            }
            Effect::Note(note) => outcome.effects.push(note.to_string()),
            Effect::BlockTunnel | Effect::ResourceBonus(_) => {}
        }
    }

    pub fn statistics(&self) -> EventStatistics {
        let mut by_category = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for event in &self.history {
            let spec = event.spec();
            *by_category.entry(spec.category).or_insert(0) += 1;
            *by_severity.entry(spec.severity).or_insert(0) += 1;
        }
        EventStatistics {
            total_events: self.history.len(),
            active_events: self.active().count(),
            by_category,
            by_severity,
            historical_triggered: self.historical_triggered.len(),
            reputation: self.reputation,
        }
    }
}

/// Stations an event's station-level effects land on: the target station,
/// the near end of a target tunnel, or every station of the faction.
fn event_stations(event: &EventInstance, map: &MetroMap, ctx: &EventContext) -> Vec<String> {
    match &event.target {
        Some(EventTarget::Station(name)) => vec![name.clone()],
        Some(EventTarget::Tunnel(a, _)) => {
            if map.contains(a) {
                vec![a.clone()]
            } else {
                Vec::new()
            }
        }
        None => ctx.stations.to_vec(),
    }
}

fn apply_casualties(map: &mut MetroMap, stations: &[String], lost: u32) -> u32 {
    let mut total = 0;
    for name in stations {
        if let Some(station) = map.station_mut(name) {
            let before = station.population;
            station.adjust_population(-(lost as i64), CASUALTY_POPULATION_FLOOR.min(before));
            total += before - station.population;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::Station;
    use crate::tunnel::Tunnel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_map() -> MetroMap {
        MetroMap::from_parts(
            vec![
                Station::new("A", (0.0, 0.0), "red")
                    .with_faction(FactionId::Rangers)
                    .with_population(100)
                    .with_morale(30),
                Station::new("B", (1.0, 0.0), "red").with_faction(FactionId::Hanza),
            ],
            vec![Tunnel::new("A", "B")],
        )
        .unwrap()
    }

    fn ctx(stations: &[String]) -> EventContext<'_> {
        EventContext {
            faction: FactionId::Rangers,
            stations,
            military_units: 0,
        }
    }

    fn push(system: &mut EventSystem, kind: EventKind, target: Option<EventTarget>) -> String {
        let id = format!("{}_1", kind.name());
        system.history.push(EventInstance {
            id: id.clone(),
            kind,
            turn_triggered: 1,
            remaining_turns: kind.spec().duration,
            target,
            counterpart: None,
            casualties: 0,
            rewards: ResourcePool::new(),
            resolved: false,
            chosen_option: None,
        });
        id
    }

    #[test]
    fn test_catalog_is_complete() {
        assert_eq!(EventKind::all().count(), 11);
        for kind in EventKind::all() {
            let spec = kind.spec();
            assert!(!spec.title.is_empty());
            assert!(spec.probability > 0.0 && spec.probability < 1.0);
            assert!(!spec.choices.is_empty());
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        let collapse = EventKind::TunnelCollapse.spec();
        assert_eq!((collapse.duration, collapse.cooldown), (3, 10));
        assert_eq!(collapse.choices[0].costs, &[(Scrap, 30), (MgrRounds, 5)]);
        assert!(EventKind::GreatLibraryDiscovery.spec().historical);
    }

    #[test]
    fn test_anomalous_modifier_defaults_to_half() {
        let system = EventSystem::new();
        assert_eq!(system.category_modifier(EventCategory::Anomalous), 0.5);
        assert_eq!(system.category_modifier(EventCategory::Economic), 1.0);
    }

    #[test]
    fn test_cooldowns_block_retrigger() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        for category in EventCategory::all() {
            system.set_category_modifier(category, 1000.0);
        }
        let mut rng = StdRng::seed_from_u64(42);

        let first = system.process_turn(1, &mut map, &mut diplomacy, &ctx(&stations), &mut rng);
        assert!(first.contains(&"trade_caravan_1".to_string()));
        assert_eq!(system.cooldowns.get(&EventKind::TradeCaravan), Some(&3));

        let second = system.process_turn(2, &mut map, &mut diplomacy, &ctx(&stations), &mut rng);
        assert!(!second.iter().any(|id| id.starts_with("trade_caravan")));
        // Library event waits for turn 20
        assert!(!first.iter().any(|id| id.starts_with("great_library")));
    }

    #[test]
    fn test_station_requirements_filter_targets() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        for category in EventCategory::all() {
            system.set_category_modifier(category, 1000.0);
        }
        let mut rng = StdRng::seed_from_u64(42);
        let triggered = system.process_turn(1, &mut map, &mut diplomacy, &ctx(&stations), &mut rng);
        // Morale 30 allows an uprising but not a population boom
        assert!(triggered.iter().any(|id| id.starts_with("faction_uprising")));
        assert!(!triggered.iter().any(|id| id.starts_with("population_boom")));
    }

    #[test]
    fn test_no_events_without_chance() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        for category in EventCategory::all() {
            system.set_category_modifier(category, 0.0);
        }
        let mut rng = StdRng::seed_from_u64(42);
        for turn in 1..30 {
            assert!(system.process_turn(turn, &mut map, &mut diplomacy, &ctx(&stations), &mut rng).is_empty());
        }
    }

    #[test]
    fn test_clear_debris_resolves_collapse() {
        let mut map = small_map();
        map.tunnel_between_mut("A", "B").unwrap().apply_temporary_blockage(3);
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(
            &mut system,
            EventKind::TunnelCollapse,
            Some(EventTarget::Tunnel("A".into(), "B".into())),
        );
        let mut resources = ResourcePool::new().with(Scrap, 40).with(MgrRounds, 10);
        let mut rng = StdRng::seed_from_u64(42);

        let outcome = system
            .resolve_choice(&id, "clear_debris", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng)
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(map.tunnel_between("A", "B").unwrap().state, TunnelState::Clear);
        assert_eq!(map.tunnel_between("A", "B").unwrap().last_cleared_turn, 2);
        assert!(outcome.effects.contains(&"tunnel A-B cleared".to_string()), "{:?}", outcome.effects);
        assert_eq!(resources.scrap, 10);
        assert_eq!(resources.mgr_rounds, 5);
        assert_eq!(system.history[0].remaining_turns, 1);
        assert!(system.history[0].resolved);

        let again = system.resolve_choice(&id, "clear_debris", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng);
        assert!(matches!(again, Err(SimError::NotFound(_))));
    }

    #[test]
    fn test_avoiding_infestation_downgrades_tunnel() {
        let mut map = small_map();
        map.tunnel_between_mut("A", "B").unwrap().update_state(TunnelState::Infested);
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(
            &mut system,
            EventKind::MutantInfestation,
            Some(EventTarget::Tunnel("A".into(), "B".into())),
        );
        let mut resources = ResourcePool::new();
        let mut rng = StdRng::seed_from_u64(42);

        let outcome = system
            .resolve_choice(&id, "avoid_area", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 3, &mut rng)
            .unwrap();
        assert_eq!(map.tunnel_between("A", "B").unwrap().state, TunnelState::Hazardous);
        assert_eq!(outcome.effects, vec!["tunnel A-B now Hazardous".to_string()]);
    }

    #[test]
    fn test_choice_costs_are_atomic() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(&mut system, EventKind::TradeCaravan, Some(EventTarget::Station("A".into())));
        let mut resources = ResourcePool::new().with(Food, 100).with(Scrap, 10);
        let before = resources.clone();
        let mut rng = StdRng::seed_from_u64(42);

        let err = system
            .resolve_choice(&id, "sell_goods", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng)
            .unwrap_err();
        assert!(err.is_insufficient());
        assert_eq!(resources, before);
        assert!(!system.history[0].resolved);

        let bad = system.resolve_choice(&id, "steal_goods", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng);
        assert!(matches!(bad, Err(SimError::Invalid(_))));
    }

    #[test]
    fn test_unit_requirement_checked() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(&mut system, EventKind::BanditRaid, Some(EventTarget::Station("A".into())));
        let mut resources = ResourcePool::new();
        let mut rng = StdRng::seed_from_u64(42);
        assert!(
            system
                .resolve_choice(&id, "fight_bandits", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng)
                .is_err()
        );
        let armed = EventContext {
            military_units: 2,
            ..ctx(&stations)
        };
        let outcome = system
            .resolve_choice(&id, "fight_bandits", &mut map, &mut diplomacy, &mut resources, &armed, 2, &mut rng)
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(system.reputation, 10);
    }

    #[test]
    fn test_discovery_rewards_claimed_or_shared() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(&mut system, EventKind::ResourceDiscovery, Some(EventTarget::Station("A".into())));
        system.history[0].rewards = ResourcePool::new().with(Food, 40).with(Scrap, 60);
        let hanza_before = diplomacy.relationship_value(FactionId::Rangers, FactionId::Hanza);
        let mut resources = ResourcePool::new();
        let mut rng = StdRng::seed_from_u64(42);

        let outcome = system
            .resolve_choice(&id, "share_discovery", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng)
            .unwrap();
        assert_eq!(resources.food, 20);
        assert_eq!(resources.scrap, 30);
        assert_eq!(outcome.resources_gained.food, 20);
        assert_eq!(system.reputation, 15);
        assert!(diplomacy.relationship_value(FactionId::Rangers, FactionId::Hanza) > hanza_before);
    }

    #[test]
    fn test_radiation_storm_doubles_medicine_until_sealed() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(&mut system, EventKind::RadiationStorm, None);
        assert_eq!(system.consumption_multiplier(ResourceKind::Medicine), 2.0);
        assert_eq!(system.consumption_multiplier(ResourceKind::Food), 1.0);

        let mut resources = ResourcePool::new().with(Medicine, 50).with(Scrap, 20);
        let mut rng = StdRng::seed_from_u64(42);
        system
            .resolve_choice(&id, "seal_stations", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng)
            .unwrap();
        assert_eq!(system.consumption_multiplier(ResourceKind::Medicine), 1.0);
        assert_eq!(map.station("A").unwrap().morale, 35);
        assert!(resources.is_empty());
    }

    #[test]
    fn test_grant_autonomy_releases_station() {
        let mut map = small_map();
        let mut diplomacy = DiplomacySystem::new();
        let stations = vec!["A".to_string()];
        let mut system = EventSystem::new();
        let id = push(&mut system, EventKind::FactionUprising, Some(EventTarget::Station("A".into())));
        let mut resources = ResourcePool::new();
        let mut rng = StdRng::seed_from_u64(42);
        system
            .resolve_choice(&id, "grant_autonomy", &mut map, &mut diplomacy, &mut resources, &ctx(&stations), 2, &mut rng)
            .unwrap();
        assert_eq!(map.station("A").unwrap().controlling_faction, FactionId::Independent);
    }
}
