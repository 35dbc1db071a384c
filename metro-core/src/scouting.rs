//! Fog of war and progressive intelligence on stations.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::infrastructure::BuildingType;
use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::station::Station;
use crate::tunnel::TunnelState;
use crate::types::{FactionId, ResourceKind, TravelerType};

/// Clean water spent to scout an adjacent station
pub const BASE_SCOUT_COST: i64 = 10;
/// Extra water per hop for distant targets
pub const SCOUT_COST_PER_HOP: i64 = 5;
pub const BASE_SCOUT_SUCCESS: f64 = 0.8;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum IntelLevel {
    Unknown,
    Basic,
    Detailed,
    Complete,
}

impl IntelLevel {
    fn decayed(self) -> IntelLevel {
        match self {
            IntelLevel::Complete => IntelLevel::Detailed,
            IntelLevel::Detailed => IntelLevel::Basic,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct StationIntel {
    pub station_name: String,
    pub level: IntelLevel,
    pub last_updated: u32,
    pub faction: Option<FactionId>,
    pub population: Option<u32>,
    pub morale: Option<u32>,
    pub defensive_value: Option<i64>,
    pub resources: Option<ResourcePool>,
    pub infrastructure: Option<Vec<BuildingType>>,
    pub military_units: Option<u32>,
    pub special_traits: Option<Vec<String>>,
}

impl StationIntel {
    /// Observe a station at the given level. Detailed reports carry noise.
    pub fn gather<R: Rng>(station: &Station, level: IntelLevel, turn: u32, rng: &mut R) -> Self {
        let mut intel = Self {
            station_name: station.name.clone(),
            level,
            last_updated: turn,
            faction: Some(station.controlling_faction),
            population: None,
            morale: None,
            defensive_value: None,
            resources: None,
            infrastructure: None,
            military_units: None,
            special_traits: None,
        };

        if level >= IntelLevel::Detailed {
            intel.defensive_value = Some(station.defensive_value);
            if level == IntelLevel::Detailed {
                let factor = 0.9 + rng.random::<f64>() * 0.2;
                intel.population = Some((station.population as f64 * factor) as u32);
                let jitter = rng.random_range(-10i64..=10);
                intel.morale = Some((station.morale as i64 + jitter).clamp(0, 100) as u32);
            } else {
                intel.population = Some(station.population);
                intel.morale = Some(station.morale);
            }
        }

        if level == IntelLevel::Complete {
            intel.resources = Some(station.resources.clone());
            intel.infrastructure = Some(station.infrastructure.keys().copied().collect());
            intel.special_traits = Some(station.special_traits.clone());
            intel.military_units = Some(station.infrastructure.len() as u32 * 2);
        }
        intel
    }

    pub fn report(&self) -> String {
        let faction = self
            .faction
            .map(|f| f.name())
            .unwrap_or("Unknown");
        match self.level {
            IntelLevel::Basic => format!("Scouted {}: controlled by {}", self.station_name, faction),
            IntelLevel::Detailed => format!(
                "Scouted {}: {} faction, ~{} population, {}% morale, defense {}",
                self.station_name,
                faction,
                self.population.unwrap_or(0),
                self.morale.unwrap_or(0),
                self.defensive_value.unwrap_or(0)
            ),
            IntelLevel::Complete => format!(
                "Complete intel on {}: {}, {} people, {} buildings, {} MGR",
                self.station_name,
                faction,
                self.population.unwrap_or(0),
                self.infrastructure.as_ref().map_or(0, |b| b.len()),
                self.resources.as_ref().map_or(0, |r| r.mgr_rounds)
            ),
            IntelLevel::Unknown => format!("Scouted {}: nothing useful", self.station_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
pub struct ScoutReport {
    pub success: bool,
    pub target: String,
    pub water_spent: i64,
    pub success_chance: f64,
    pub intel: Option<StationIntel>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct IntelSummary {
    pub discovered_stations: usize,
    pub basic: usize,
    pub detailed: usize,
    pub complete: usize,
}

// ============================================================================
// ScoutingSystem
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoutingSystem {
    pub intel: BTreeMap<String, StationIntel>,
    pub discovered: BTreeSet<String>,
    pub scout_range: u32,
    pub decay_turns: u32,
}

impl ScoutingSystem {
    pub fn new(scout_range: u32, decay_turns: u32) -> Self {
        Self {
            intel: BTreeMap::new(),
            discovered: BTreeSet::new(),
            scout_range,
            decay_turns,
        }
    }

    /// Complete knowledge of own stations, basic knowledge of their neighbours
    pub fn initialize_knowledge<R: Rng>(&mut self, map: &MetroMap, faction: FactionId, rng: &mut R) {
        for name in map.stations_by_faction(faction) {
            if let Some(station) = map.station(&name) {
                self.intel.insert(
                    name.clone(),
                    StationIntel::gather(station, IntelLevel::Complete, 0, rng),
                );
                self.discovered.insert(name.clone());
            }
            self.reveal_neighbors(map, &name, 0, rng);
        }
    }

    fn reveal_neighbors<R: Rng>(&mut self, map: &MetroMap, name: &str, turn: u32, rng: &mut R) {
        for neighbor in map.neighbors(name) {
            self.discovered.insert(neighbor.clone());
            if !self.intel.contains_key(neighbor) {
                if let Some(station) = map.station(neighbor) {
                    self.intel.insert(
                        neighbor.clone(),
                        StationIntel::gather(station, IntelLevel::Basic, turn, rng),
                    );
                }
            }
        }
    }

    pub fn can_scout(&self, map: &MetroMap, origin: &str, target: &str) -> bool {
        map.are_adjacent(origin, target)
            || map
                .find_all_paths_within_range(origin, self.scout_range, TravelerType::Scout)
                .contains_key(target)
    }

    pub fn scout_cost(&self, map: &MetroMap, origin: &str, target: &str) -> i64 {
        if map.are_adjacent(origin, target) {
            return BASE_SCOUT_COST;
        }
        match map.find_path(origin, target, TravelerType::Scout, false) {
            Some(path) => BASE_SCOUT_COST + (path.len() as i64 - 1) * SCOUT_COST_PER_HOP,
            None => BASE_SCOUT_COST * 2,
        }
    }

    pub fn success_chance(&self, map: &MetroMap, origin: &str, target: &str) -> f64 {
        let mut chance = BASE_SCOUT_SUCCESS;
        if let Some(path) = map.find_path(origin, target, TravelerType::Scout, false) {
            for pair in path.windows(2) {
                match map.tunnel_between(&pair[0], &pair[1]).map(|t| t.state) {
                    Some(TunnelState::Hazardous) => chance -= 0.1,
                    Some(TunnelState::Infested) => chance -= 0.2,
                    Some(TunnelState::Anomalous) => chance -= 0.3,
                    Some(TunnelState::Collapsed) => chance = 0.0,
                    _ => {}
                }
            }
        }
        if let Some(station) = map.station(target) {
            if matches!(
                station.controlling_faction,
                FactionId::FourthReich | FactionId::RedLine
            ) {
                chance -= 0.1;
            }
            if station.defensive_value > 20 {
                chance -= 0.1;
            }
        }
        chance.clamp(0.1, 0.95)
    }

    fn next_level(current: Option<IntelLevel>, chance: f64) -> IntelLevel {
        match current {
            None | Some(IntelLevel::Unknown) => IntelLevel::Basic,
            Some(IntelLevel::Basic) if chance > 0.8 => IntelLevel::Detailed,
            Some(IntelLevel::Detailed) if chance > 0.9 => IntelLevel::Complete,
            Some(level) => level,
        }
    }

    /// Send a scout. Water is spent whether or not the scout returns.
    pub fn execute_scout<R: Rng>(
        &mut self,
        map: &MetroMap,
        origin: &str,
        target: &str,
        turn: u32,
        resources: &mut ResourcePool,
        rng: &mut R,
    ) -> SimResult<ScoutReport> {
        map.require_station(origin)?;
        let station = map.require_station(target)?;
        if !self.can_scout(map, origin, target) {
            return Err(SimError::invalid(format!(
                "cannot scout {} from {}: too far",
                target, origin
            )));
        }

        let cost = self.scout_cost(map, origin, target);
        resources.subtract(ResourceKind::CleanWater, cost)?;
        self.discovered.insert(target.to_string());

        let chance = self.success_chance(map, origin, target);
        let roll: f64 = rng.random();
        if roll > chance {
            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "scouting",
                turn = turn,
                origin = origin,
                station = target,
                success = false,
                chance = chance,
            );
            return Ok(ScoutReport {
                success: false,
                target: target.to_string(),
                water_spent: cost,
                success_chance: chance,
                intel: None,
                message: format!("Scouting mission to {} failed: scout did not return", target),
            });
        }

        let level = Self::next_level(self.intel.get(target).map(|i| i.level), chance);
        let intel = StationIntel::gather(station, level, turn, rng);
        self.intel.insert(target.to_string(), intel.clone());

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "scouting",
            turn = turn,
            origin = origin,
            station = target,
            success = true,
            chance = chance,
            level = ?level,
        );
        Ok(ScoutReport {
            success: true,
            target: target.to_string(),
            water_spent: cost,
            success_chance: chance,
            message: intel.report(),
            intel: Some(intel),
        })
    }

    pub fn intel_on(&self, station: &str) -> Option<&StationIntel> {
        self.intel.get(station)
    }

    pub fn is_discovered(&self, station: &str) -> bool {
        self.discovered.contains(station)
    }

    pub fn visible_stations(&self) -> Vec<String> {
        self.discovered.iter().cloned().collect()
    }

    /// Stations in range that still have something to learn
    pub fn scouting_targets(&self, map: &MetroMap, origin: &str) -> Vec<String> {
        map.find_all_paths_within_range(origin, self.scout_range, TravelerType::Scout)
            .into_keys()
            .filter(|name| name != origin)
            .filter(|name| {
                self.intel
                    .get(name)
                    .is_none_or(|i| i.level != IntelLevel::Complete)
            })
            .collect()
    }

    /// Stale records lose one level, never dropping below basic
    pub fn decay_intel(&mut self, turn: u32) {
        for intel in self.intel.values_mut() {
            if turn.saturating_sub(intel.last_updated) > self.decay_turns {
                intel.level = intel.level.decayed();
                intel.last_updated = turn;
            }
        }
    }

    pub fn process_turn<R: Rng>(&mut self, turn: u32, map: &MetroMap, faction: FactionId, rng: &mut R) {
        self.decay_intel(turn);
        for name in map.stations_by_faction(faction) {
            self.reveal_neighbors(map, &name, turn, rng);
        }
    }

    pub fn summary(&self) -> IntelSummary {
        let count = |level| self.intel.values().filter(|i| i.level == level).count();
        IntelSummary {
            discovered_stations: self.discovered.len(),
            basic: count(IntelLevel::Basic),
            detailed: count(IntelLevel::Detailed),
            complete: count(IntelLevel::Complete),
        }
    }
}
