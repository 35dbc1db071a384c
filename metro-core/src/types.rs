use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use tsify_next::Tsify;

// ============================================================================
// IDs - Using slotmap for generational indices
// ============================================================================

new_key_type! {
    pub struct UnitId;
}

/// Trait for converting SlotMap keys to u64 for WASM boundary
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for UnitId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

// ============================================================================
// Resources - The five commodities every pool tracks
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Food,
    CleanWater,
    Scrap,
    Medicine,
    /// Military-grade rounds: ammunition and currency at once
    MgrRounds,
}

impl ResourceKind {
    /// Returns an iterator over all resource kinds
    pub fn all() -> impl Iterator<Item = ResourceKind> {
        [
            ResourceKind::Food,
            ResourceKind::CleanWater,
            ResourceKind::Scrap,
            ResourceKind::Medicine,
            ResourceKind::MgrRounds,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Food => "food",
            ResourceKind::CleanWater => "clean_water",
            ResourceKind::Scrap => "scrap",
            ResourceKind::Medicine => "medicine",
            ResourceKind::MgrRounds => "mgr_rounds",
        }
    }

    pub fn from_name(name: &str) -> Option<ResourceKind> {
        ResourceKind::all().find(|k| k.name() == name)
    }

    /// Barter value of one unit, used for pool valuation and trade pricing
    pub fn unit_value(self) -> i64 {
        match self {
            ResourceKind::Food => 2,
            ResourceKind::CleanWater => 3,
            ResourceKind::Scrap => 1,
            ResourceKind::Medicine => 5,
            ResourceKind::MgrRounds => 1,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Factions - The closed set of powers in the Metro
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum FactionId {
    Rangers,
    Polis,
    FourthReich,
    RedLine,
    Hanza,
    InvisibleWatchers,
    Independent,
}

impl FactionId {
    pub fn all() -> impl Iterator<Item = FactionId> {
        [
            FactionId::Rangers,
            FactionId::Polis,
            FactionId::FourthReich,
            FactionId::RedLine,
            FactionId::Hanza,
            FactionId::InvisibleWatchers,
            FactionId::Independent,
        ]
        .into_iter()
    }

    /// The five factions that run a full government with bonuses and mechanics
    pub fn major() -> impl Iterator<Item = FactionId> {
        [
            FactionId::RedLine,
            FactionId::FourthReich,
            FactionId::Hanza,
            FactionId::Polis,
            FactionId::Rangers,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            FactionId::Rangers => "Rangers",
            FactionId::Polis => "Polis",
            FactionId::FourthReich => "Fourth Reich",
            FactionId::RedLine => "Red Line",
            FactionId::Hanza => "Hanza",
            FactionId::InvisibleWatchers => "Invisible Watchers",
            FactionId::Independent => "Independent",
        }
    }

    pub fn from_name(name: &str) -> Option<FactionId> {
        FactionId::all().find(|f| f.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Traveler Type - Who is moving through a tunnel
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum TravelerType {
    Scout,
    Military,
    Caravan,
    Civilian,
    Stalker,
    Ranger,
}

impl TravelerType {
    /// Base tunnel traversal cost before state and hazard scaling
    pub fn base_cost(self) -> u32 {
        match self {
            TravelerType::Scout | TravelerType::Stalker | TravelerType::Ranger => 1,
            TravelerType::Military | TravelerType::Civilian => 2,
            TravelerType::Caravan => 3,
        }
    }

    /// Only these can cross anomalous tunnels
    pub fn is_privileged(self) -> bool {
        matches!(
            self,
            TravelerType::Scout | TravelerType::Stalker | TravelerType::Ranger
        )
    }
}

// ============================================================================
// Action Kind - Player intents accepted from the host
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Scout,
    Trade,
    Attack,
    Diplomacy,
    Fortify,
    Recruit,
    RecruitUnit,
    Develop,
    Construct,
    Upgrade,
    Repair,
    ResolveEvent,
}

impl ActionKind {
    pub fn all() -> impl Iterator<Item = ActionKind> {
        [
            ActionKind::Scout,
            ActionKind::Trade,
            ActionKind::Attack,
            ActionKind::Diplomacy,
            ActionKind::Fortify,
            ActionKind::Recruit,
            ActionKind::RecruitUnit,
            ActionKind::Develop,
            ActionKind::Construct,
            ActionKind::Upgrade,
            ActionKind::Repair,
            ActionKind::ResolveEvent,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Scout => "scout",
            ActionKind::Trade => "trade",
            ActionKind::Attack => "attack",
            ActionKind::Diplomacy => "diplomacy",
            ActionKind::Fortify => "fortify",
            ActionKind::Recruit => "recruit",
            ActionKind::RecruitUnit => "recruit_unit",
            ActionKind::Develop => "develop",
            ActionKind::Construct => "construct",
            ActionKind::Upgrade => "upgrade",
            ActionKind::Repair => "repair",
            ActionKind::ResolveEvent => "resolve_event",
        }
    }

    pub fn from_name(name: &str) -> Option<ActionKind> {
        let lowered = name.to_ascii_lowercase();
        ActionKind::all().find(|a| a.name() == lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for kind in ResourceKind::all() {
            assert_eq!(ResourceKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(FactionId::from_name("fourth reich"), Some(FactionId::FourthReich));
        assert_eq!(ActionKind::from_name("RECRUIT_UNIT"), Some(ActionKind::RecruitUnit));
        assert_eq!(ActionKind::from_name("teleport"), None);
    }

    #[test]
    fn test_privileged_travelers() {
        let privileged: Vec<_> = [
            TravelerType::Scout,
            TravelerType::Military,
            TravelerType::Caravan,
            TravelerType::Civilian,
            TravelerType::Stalker,
            TravelerType::Ranger,
        ]
        .into_iter()
        .filter(|t| t.is_privileged())
        .collect();
        assert_eq!(
            privileged,
            vec![TravelerType::Scout, TravelerType::Stalker, TravelerType::Ranger]
        );
    }
}
