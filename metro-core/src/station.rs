// Station type - a node in the metro graph

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::infrastructure::{BuildingType, Infrastructure};
use crate::resources::ResourcePool;
use crate::types::{FactionId, ResourceKind};

pub const DEFAULT_POPULATION: u32 = 100;
pub const DEFAULT_MORALE: u32 = 50;
pub const DEFAULT_DEFENSIVE_VALUE: i64 = 10;

/// Population floor when evicting residents after a hostile takeover
pub const CAPTURE_POPULATION_FLOOR: u32 = 50;

/// Population never declines below this through hardship
pub const DECLINE_POPULATION_FLOOR: u32 = 10;

// ============================================================================
// Station Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    Operational,
    Damaged,
    Ruined,
    Infested,
    Anomalous,
}

impl StationStatus {
    pub fn production_multiplier(self) -> f64 {
        match self {
            StationStatus::Damaged => 0.7,
            StationStatus::Ruined => 0.3,
            _ => 1.0,
        }
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, StationStatus::Damaged | StationStatus::Ruined)
    }
}

// ============================================================================
// Timed effects
// ============================================================================

/// Changes an event applies to a station
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct StationEffects {
    pub population_change: i64,
    pub morale_change: i64,
    pub status_change: Option<StationStatus>,
}

impl StationEffects {
    pub fn morale(change: i64) -> Self {
        Self {
            morale_change: change,
            ..Self::default()
        }
    }

    pub fn population(change: i64) -> Self {
        Self {
            population_change: change,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ActiveEffect {
    pub label: String,
    pub effects: StationEffects,
    pub remaining_turns: u32,
}

// ============================================================================
// Station
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub position: (f64, f64),
    pub metro_line: String,
    pub controlling_faction: FactionId,
    pub population: u32,
    pub morale: u32,
    pub status: StationStatus,
    pub defensive_value: i64,
    pub resources: ResourcePool,
    pub infrastructure: BTreeMap<BuildingType, Infrastructure>,
    pub active_effects: Vec<ActiveEffect>,
    pub special_traits: Vec<String>,
    pub production_modifiers: BTreeMap<ResourceKind, f64>,
}

impl Station {
    pub fn new(name: impl Into<String>, position: (f64, f64), metro_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position,
            metro_line: metro_line.into(),
            controlling_faction: FactionId::Independent,
            population: DEFAULT_POPULATION,
            morale: DEFAULT_MORALE,
            status: StationStatus::Operational,
            defensive_value: DEFAULT_DEFENSIVE_VALUE,
            resources: ResourcePool::new(),
            infrastructure: BTreeMap::new(),
            active_effects: Vec::new(),
            special_traits: Vec::new(),
            production_modifiers: ResourceKind::all().map(|k| (k, 1.0)).collect(),
        }
    }

    pub fn with_faction(mut self, faction: FactionId) -> Self {
        self.controlling_faction = faction;
        self
    }

    pub fn with_population(mut self, population: u32) -> Self {
        self.population = population;
        self
    }

    pub fn with_morale(mut self, morale: u32) -> Self {
        self.morale = morale.min(100);
        self
    }

    pub fn with_traits(mut self, traits: &[&str]) -> Self {
        self.special_traits = traits.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_resources(mut self, resources: ResourcePool) -> Self {
        self.resources = resources;
        self
    }

    pub fn production_modifier(&self, kind: ResourceKind) -> f64 {
        self.production_modifiers.get(&kind).copied().unwrap_or(1.0)
    }

    pub fn set_production_modifier(&mut self, kind: ResourceKind, modifier: f64) {
        self.production_modifiers.insert(kind, modifier.max(0.0));
    }

    pub fn is_operational(&self) -> bool {
        self.status == StationStatus::Operational
    }

    pub fn has_infrastructure(&self, building: BuildingType) -> bool {
        self.infrastructure.contains_key(&building)
    }

    /// Installations allowed at the current population
    pub fn infrastructure_capacity(&self) -> usize {
        3usize.max(self.population as usize / 50)
    }

    pub fn morale_multiplier(&self) -> f64 {
        0.5 + (self.morale as f64 / 100.0) * 0.5
    }

    /// Per-turn output: base food from population plus installations, scaled by
    /// production modifier, morale and status in that order.
    pub fn get_resource_production(&self) -> ResourcePool {
        // the modifier truncates per source, before the sources are summed
        let modified = |kind: ResourceKind, amount: i64| (amount as f64 * self.production_modifier(kind)) as i64;
        let mut output: BTreeMap<ResourceKind, i64> = BTreeMap::new();
        let base_food = (self.population as i64 / 20).max(1);
        output.insert(ResourceKind::Food, modified(ResourceKind::Food, base_food));

        for infra in self.infrastructure.values() {
            if let Some((kind, amount)) = infra.resource_output() {
                *output.entry(kind).or_insert(0) += modified(kind, amount);
            }
        }

        let morale = self.morale_multiplier();
        let status = self.status.production_multiplier();
        let mut production = ResourcePool::new();
        for (kind, amount) in output {
            let with_morale = (amount as f64 * morale) as i64;
            let final_amount = (with_morale as f64 * status) as i64;
            production = production.with(kind, final_amount);
        }
        production
    }

    pub fn add_infrastructure(&mut self, building: BuildingType, level: u32) -> SimResult<()> {
        if self.has_infrastructure(building) {
            return Err(SimError::illegal(format!(
                "{} already has a {}",
                self.name,
                building.name()
            )));
        }
        let capacity = self.infrastructure_capacity();
        if self.infrastructure.len() >= capacity {
            return Err(SimError::illegal(format!(
                "{} is at infrastructure capacity ({}/{})",
                self.name,
                self.infrastructure.len(),
                capacity
            )));
        }
        self.install_infrastructure(building, level);
        Ok(())
    }

    /// Place a finished building without the capacity check. An existing
    /// building of the same type is left untouched.
    pub fn install_infrastructure(&mut self, building: BuildingType, level: u32) -> bool {
        if self.has_infrastructure(building) {
            return false;
        }
        self.infrastructure
            .insert(building, Infrastructure::new(building, level));
        self.defensive_value += building.installed_defense();
        true
    }

    /// Sum of maintenance over operational installations
    pub fn total_maintenance(&self) -> Vec<(ResourceKind, i64)> {
        let mut totals: BTreeMap<ResourceKind, i64> = BTreeMap::new();
        for infra in self.infrastructure.values().filter(|i| i.is_operational()) {
            for (kind, amount) in infra.maintenance_cost() {
                *totals.entry(kind).or_insert(0) += amount;
            }
        }
        totals.into_iter().collect()
    }

    /// Hand the station to another faction. Returns the number of residents who fled.
    pub fn change_faction_control(&mut self, new_faction: FactionId, peaceful: bool) -> u32 {
        self.controlling_faction = new_faction;
        if peaceful {
            self.morale = self.morale.saturating_sub(5);
            return 0;
        }
        self.morale = self.morale.saturating_sub(20);
        if self.population > CAPTURE_POPULATION_FLOOR {
            let evicted = self.population / 10;
            let remaining = (self.population - evicted).max(CAPTURE_POPULATION_FLOOR);
            let fled = self.population - remaining;
            self.population = remaining;
            return fled;
        }
        0
    }

    pub fn adjust_morale(&mut self, change: i64) {
        self.morale = (self.morale as i64 + change).clamp(0, 100) as u32;
    }

    pub fn adjust_population(&mut self, change: i64, floor: u32) {
        self.population = (self.population as i64 + change).max(floor as i64) as u32;
    }

    /// Apply an event now; durations above one keep a timed record.
    pub fn apply_event(&mut self, label: &str, effects: StationEffects, duration: u32) {
        if effects.population_change != 0 {
            self.adjust_population(effects.population_change, 0);
        }
        if effects.morale_change != 0 {
            self.adjust_morale(effects.morale_change);
        }
        if let Some(status) = effects.status_change {
            self.status = status;
        }
        if duration > 1 {
            self.active_effects.push(ActiveEffect {
                label: label.to_string(),
                effects,
                remaining_turns: duration - 1,
            });
        }
    }

    /// Expire timed effects, recover morale, grow or shrink population.
    /// Returns the population delta.
    pub fn process_turn(&mut self) -> i64 {
        for effect in &mut self.active_effects {
            effect.remaining_turns = effect.remaining_turns.saturating_sub(1);
        }
        self.active_effects.retain(|e| e.remaining_turns > 0);

        if self.morale < 50 && self.is_operational() {
            self.morale += 1;
        }

        let before = self.population as i64;
        if self.morale > 70 && self.is_operational() {
            let growth = ((self.population as f64 * 0.02) as u32).max(1);
            self.population += growth;
        } else if self.morale < 30 || self.status.is_degraded() {
            let decline = ((self.population as f64 * 0.01) as i64).max(1);
            self.adjust_population(-decline, DECLINE_POPULATION_FLOOR);
        }
        self.population as i64 - before
    }

    pub fn info(&self) -> StationInfo {
        StationInfo {
            name: self.name.clone(),
            position: self.position,
            metro_line: self.metro_line.clone(),
            faction: self.controlling_faction,
            population: self.population,
            morale: self.morale,
            status: self.status,
            defensive_value: self.defensive_value,
            resources: self.resources.clone(),
            production: self.get_resource_production(),
            infrastructure: self.infrastructure.values().cloned().collect(),
            special_traits: self.special_traits.clone(),
        }
    }
}

/// Read-only view of a station for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct StationInfo {
    pub name: String,
    pub position: (f64, f64),
    pub metro_line: String,
    pub faction: FactionId,
    pub population: u32,
    pub morale: u32,
    pub status: StationStatus,
    pub defensive_value: i64,
    pub resources: ResourcePool,
    pub production: ResourcePool,
    pub infrastructure: Vec<Infrastructure>,
    pub special_traits: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_station_food_production() {
        let station = Station::new("Test", (0.0, 0.0), "Line")
            .with_population(40)
            .with_morale(100);
        let production = station.get_resource_production();
        assert_eq!(production.food, 2, "max(1, 40/20) at full morale");
        assert_eq!(production.scrap, 0);
    }

    #[test]
    fn test_production_includes_infrastructure_and_status() {
        let mut station = Station::new("Test", (0.0, 0.0), "Line")
            .with_population(200)
            .with_morale(100);
        station
            .add_infrastructure(BuildingType::ScrapWorkshop, 1)
            .unwrap();
        assert_eq!(station.get_resource_production().scrap, 12);

        station.status = StationStatus::Ruined;
        let ruined = station.get_resource_production();
        // 12 × 0.3 = 3.6 -> 3; food 10 × 0.3 = 3
        assert_eq!(ruined.scrap, 3);
        assert_eq!(ruined.food, 3);
    }

    #[test]
    fn test_production_modifier_truncates_per_source() {
        let mut station = Station::new("Test", (0.0, 0.0), "Line")
            .with_population(100)
            .with_morale(100);
        station
            .add_infrastructure(BuildingType::MushroomFarm, 1)
            .unwrap();
        station.set_production_modifier(ResourceKind::Food, 0.9);
        // 5 × 0.9 -> 4 plus 15 × 0.9 -> 13, not 20 × 0.9 -> 18
        assert_eq!(station.get_resource_production().food, 17);
    }

    #[test]
    fn test_morale_multiplier_halves_at_zero() {
        let station = Station::new("Test", (0.0, 0.0), "Line")
            .with_population(400)
            .with_morale(0);
        assert_eq!(station.get_resource_production().food, 10);
    }

    #[test]
    fn test_add_infrastructure_rules() {
        let mut station = Station::new("Test", (0.0, 0.0), "Line").with_population(60);
        station.add_infrastructure(BuildingType::Barracks, 1).unwrap();
        assert_eq!(station.defensive_value, DEFAULT_DEFENSIVE_VALUE + 15);

        assert!(station.add_infrastructure(BuildingType::Barracks, 1).is_err());

        station
            .add_infrastructure(BuildingType::MushroomFarm, 1)
            .unwrap();
        station.add_infrastructure(BuildingType::MedBay, 1).unwrap();
        let err = station.add_infrastructure(BuildingType::Market, 1);
        assert!(matches!(err, Err(SimError::IllegalTransition(_))));
        assert_eq!(station.infrastructure.len(), 3);
    }

    #[test]
    fn test_hostile_capture_evicts_population() {
        let mut station = Station::new("Test", (0.0, 0.0), "Line")
            .with_population(200)
            .with_morale(60);
        let fled = station.change_faction_control(FactionId::RedLine, false);
        assert_eq!(fled, 20);
        assert_eq!(station.population, 180);
        assert_eq!(station.morale, 40);
        assert_eq!(station.controlling_faction, FactionId::RedLine);

        let mut small = Station::new("Small", (0.0, 0.0), "Line").with_population(52);
        small.change_faction_control(FactionId::Hanza, false);
        assert_eq!(small.population, 50, "floored at 50");

        let mut peaceful = Station::new("P", (0.0, 0.0), "Line").with_morale(3);
        peaceful.change_faction_control(FactionId::Polis, true);
        assert_eq!(peaceful.morale, 0);
    }

    #[test]
    fn test_process_turn_growth_and_decline() {
        let mut thriving = Station::new("T", (0.0, 0.0), "Line")
            .with_population(100)
            .with_morale(80);
        assert_eq!(thriving.process_turn(), 2);

        let mut miserable = Station::new("M", (0.0, 0.0), "Line")
            .with_population(100)
            .with_morale(10);
        assert_eq!(miserable.process_turn(), -1);
        assert_eq!(miserable.morale, 11, "morale recovers while operational");

        let mut tiny = Station::new("Tiny", (0.0, 0.0), "Line")
            .with_population(10)
            .with_morale(10);
        tiny.process_turn();
        assert_eq!(tiny.population, 10);
    }

    #[test]
    fn test_active_effects_expire() {
        let mut station = Station::new("T", (0.0, 0.0), "Line");
        station.apply_event("raid", StationEffects::morale(-10), 3);
        assert_eq!(station.morale, 40);
        assert_eq!(station.active_effects[0].remaining_turns, 2);

        station.process_turn();
        assert_eq!(station.active_effects.len(), 1);
        station.process_turn();
        assert!(station.active_effects.is_empty());

        station.apply_event("blip", StationEffects::population(5), 1);
        assert!(station.active_effects.is_empty());
    }
}
