use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::station::Station;
use crate::types::ResourceKind;

// === CONSTANTS ===

/// Per-resident consumption each turn
const CONSUMPTION_PER_POP: &[(ResourceKind, f64)] = &[
    (ResourceKind::Food, 0.5),
    (ResourceKind::CleanWater, 0.3),
    (ResourceKind::Medicine, 0.1),
];

const MAX_SHORTAGE_MORALE_PENALTY: i64 = 20;
/// Starvation never pushes a station below this population
const STARVATION_POPULATION_FLOOR: u32 = 10;
const SEASON_LENGTH: u32 = 3;

// === SEASONS ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    /// Twelve-turn year, three turns per season, starting in winter
    pub fn from_turn(turn: u32) -> Self {
        match (turn % 12) / SEASON_LENGTH {
            0 => Season::Winter,
            1 => Season::Spring,
            2 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn modifier(self, kind: ResourceKind) -> f64 {
        use ResourceKind::*;
        match (self, kind) {
            (Season::Spring, Food) => 1.1,
            (Season::Summer, Food) => 1.2,
            (Season::Summer, CleanWater) => 0.9,
            (Season::Summer, Scrap) => 1.1,
            (Season::Autumn, Scrap) => 1.2,
            (Season::Autumn, Medicine) => 1.1,
            (Season::Winter, Food) => 0.8,
            (Season::Winter, CleanWater) => 1.1,
            (Season::Winter, Scrap) => 0.9,
            (Season::Winter, Medicine) => 0.9,
            _ => 1.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

// === REPORTS ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ProductionReport {
    pub station: String,
    pub production: ResourcePool,
    pub consumption: ResourcePool,
    /// Building upkeep, charged separately by the construction step
    pub maintenance: ResourcePool,
    pub net: BTreeMap<ResourceKind, i64>,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Shortage {
    pub kind: ResourceKind,
    pub missing: i64,
    pub morale_penalty: i64,
    pub population_lost: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ProductionOutcome {
    pub reports: Vec<ProductionReport>,
    pub net: BTreeMap<ResourceKind, i64>,
    pub shortages: Vec<Shortage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ProductionSummary {
    pub season: Season,
    pub station_count: usize,
    pub production: ResourcePool,
    pub consumption: ResourcePool,
    pub net: BTreeMap<ResourceKind, i64>,
    pub average_efficiency: f64,
}

// === SYSTEM ===

/// Turns station output and population upkeep into a faction pool change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductionSystem {
    pub global_modifiers: BTreeMap<ResourceKind, f64>,
}

impl ProductionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global_modifier(&mut self, kind: ResourceKind, modifier: f64) {
        self.global_modifiers.insert(kind, modifier.max(0.0));
    }

    fn global_modifier(&self, kind: ResourceKind) -> f64 {
        self.global_modifiers.get(&kind).copied().unwrap_or(1.0)
    }

    /// Output, upkeep and net for one station. `consumption_multiplier` scales
    /// population upkeep per resource (e.g. during a radiation storm).
    pub fn station_report(
        &self,
        station: &Station,
        turn: u32,
        consumption_multiplier: impl Fn(ResourceKind) -> f64,
    ) -> ProductionReport {
        let season = Season::from_turn(turn);
        let mut production = ResourcePool::new();
        for (kind, amount) in station.get_resource_production().amounts() {
            let modifier = season.modifier(kind) * self.global_modifier(kind);
            production = production.with(kind, (amount as f64 * modifier) as i64);
        }

        let mut consumption = ResourcePool::new();
        for &(kind, per_pop) in CONSUMPTION_PER_POP {
            let amount = (per_pop * station.population as f64 * consumption_multiplier(kind)) as i64;
            consumption = consumption.with(kind, amount);
        }

        let mut maintenance = ResourcePool::new();
        for (kind, amount) in station.total_maintenance() {
            maintenance = maintenance.with(kind, amount);
        }

        let net = ResourceKind::all()
            .map(|kind| (kind, production.get(kind) - consumption.get(kind)))
            .filter(|(_, amount)| *amount != 0)
            .collect();

        ProductionReport {
            station: station.name.clone(),
            efficiency: efficiency_rating(station, season, self),
            production,
            consumption,
            maintenance,
            net,
        }
    }

    /// Produce, consume and settle the faction pool. Surpluses are credited;
    /// deficits draw the pool down to zero and whatever is still missing
    /// hurts the stations.
    pub fn process_faction(
        &self,
        map: &mut MetroMap,
        stations: &[String],
        resources: &mut ResourcePool,
        turn: u32,
        consumption_multiplier: impl Fn(ResourceKind) -> f64,
    ) -> ProductionOutcome {
        let mut outcome = ProductionOutcome::default();
        for name in stations {
            let Some(station) = map.station(name) else {
                continue;
            };
            let report = self.station_report(station, turn, &consumption_multiplier);
            for (&kind, &amount) in &report.net {
                *outcome.net.entry(kind).or_insert(0) += amount;
            }
            outcome.reports.push(report);
        }

        for (&kind, &amount) in &outcome.net {
            if amount > 0 {
                resources.add_capped(kind, amount, i64::MAX);
            } else if amount < 0 {
                let needed = -amount;
                let drawn = resources.drain_up_to(kind, needed);
                if drawn < needed {
                    outcome
                        .shortages
                        .push(apply_shortage(map, stations, kind, needed - drawn, turn));
                }
            }
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "production",
            turn = turn,
            stations = outcome.reports.len(),
            food = outcome.net.get(&ResourceKind::Food).copied().unwrap_or(0),
            clean_water = outcome.net.get(&ResourceKind::CleanWater).copied().unwrap_or(0),
            scrap = outcome.net.get(&ResourceKind::Scrap).copied().unwrap_or(0),
            medicine = outcome.net.get(&ResourceKind::Medicine).copied().unwrap_or(0),
            shortages = outcome.shortages.len(),
        );

        outcome
    }

    pub fn summary(&self, map: &MetroMap, stations: &[String], turn: u32) -> ProductionSummary {
        let mut production = ResourcePool::new();
        let mut consumption = ResourcePool::new();
        let mut net: BTreeMap<ResourceKind, i64> = BTreeMap::new();
        let mut efficiency = 0.0;
        let mut count = 0;
        for station in stations.iter().filter_map(|s| map.station(s)) {
            let report = self.station_report(station, turn, |_| 1.0);
            let _ = production.add_multiple(&report.production.amounts().collect::<Vec<_>>());
            let _ = consumption.add_multiple(&report.consumption.amounts().collect::<Vec<_>>());
            for (kind, amount) in report.net {
                *net.entry(kind).or_insert(0) += amount;
            }
            efficiency += report.efficiency;
            count += 1;
        }
        ProductionSummary {
            season: Season::from_turn(turn),
            station_count: count,
            production,
            consumption,
            net,
            average_efficiency: if count > 0 {
                round2(efficiency / count as f64)
            } else {
                0.0
            },
        }
    }

    /// Projected pool levels for the next `turns_ahead` turns, starting with
    /// the current amounts. Levels never go below zero.
    pub fn forecast(
        &self,
        map: &MetroMap,
        stations: &[String],
        resources: &ResourcePool,
        turn: u32,
        turns_ahead: u32,
    ) -> BTreeMap<ResourceKind, Vec<i64>> {
        let mut forecast: BTreeMap<ResourceKind, Vec<i64>> =
            resources.amounts().map(|(kind, amount)| (kind, vec![amount])).collect();
        for offset in 1..=turns_ahead {
            let net = self.summary(map, stations, turn + offset).net;
            for (kind, levels) in forecast.iter_mut() {
                let previous = levels.last().copied().unwrap_or(0);
                let change = net.get(kind).copied().unwrap_or(0);
                levels.push((previous + change).max(0));
            }
        }
        forecast
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn efficiency_rating(station: &Station, season: Season, system: &ProductionSystem) -> f64 {
    let kinds = [
        ResourceKind::Food,
        ResourceKind::CleanWater,
        ResourceKind::Scrap,
        ResourceKind::Medicine,
    ];
    let average = kinds
        .iter()
        .map(|&k| station.morale_multiplier() * season.modifier(k) * system.global_modifier(k))
        .sum::<f64>()
        / kinds.len() as f64;
    let infrastructure_bonus = station.infrastructure.len() as f64 * 0.05;
    let population_factor = (station.population as f64 / 200.0).min(1.2);
    round2(average * (1.0 + infrastructure_bonus) * population_factor)
}

/// Spread an unmet deficit over the stations: morale drops by twice the
/// per-station share (at most 20), and a food deficit also starves residents.
#[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
fn apply_shortage(
    map: &mut MetroMap,
    stations: &[String],
    kind: ResourceKind,
    missing: i64,
    turn: u32,
) -> Shortage {
    let share = missing as f64 / stations.len().max(1) as f64;
    let morale_penalty = ((share * 2.0) as i64).min(MAX_SHORTAGE_MORALE_PENALTY);
    let mut population_lost = 0;
    for name in stations {
        let Some(station) = map.station_mut(name) else {
            continue;
        };
        station.adjust_morale(-morale_penalty);
        if kind == ResourceKind::Food {
            let loss = (station.population / 10).min(share as u32);
            let before = station.population;
            station.adjust_population(-(loss as i64), STARVATION_POPULATION_FLOOR.min(before));
            population_lost += before - station.population;
        }
    }

    #[cfg(feature = "instrument")]
    tracing::warn!(
        target: "production",
        turn = turn,
        resource = kind.name(),
        missing = missing,
        morale_penalty = morale_penalty,
        population_lost = population_lost,
        "resource shortage",
    );

    Shortage {
        kind,
        missing,
        morale_penalty,
        population_lost,
    }
}
