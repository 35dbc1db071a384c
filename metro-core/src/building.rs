// Construction queue, upgrades and repairs of station buildings

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::infrastructure::{BuildingType, Infrastructure, SpecialEffect};
use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::station::Station;
use crate::types::ResourceKind;

/// Share of damage removed by a default repair order
pub const DEFAULT_REPAIR_AMOUNT: u32 = 50;

/// Damage dealt to buildings whose upkeep goes unpaid
pub const NEGLECT_DAMAGE: u32 = 10;

// ============================================================================
// Construction specs
// ============================================================================

/// What it takes to raise a building from nothing
#[derive(Debug, Clone, Copy)]
pub struct ConstructionSpec {
    pub cost: &'static [(ResourceKind, i64)],
    pub turns: u32,
    pub population_required: u32,
    pub prerequisites: &'static [BuildingType],
}

pub fn construction_spec(building: BuildingType) -> ConstructionSpec {
    use ResourceKind::*;
    match building {
        BuildingType::MushroomFarm => ConstructionSpec {
            cost: &[(Scrap, 15), (CleanWater, 5)],
            turns: 2,
            population_required: 30,
            prerequisites: &[],
        },
        BuildingType::WaterFilter => ConstructionSpec {
            cost: &[(Scrap, 25), (MgrRounds, 2)],
            turns: 3,
            population_required: 40,
            prerequisites: &[],
        },
        BuildingType::ScrapWorkshop => ConstructionSpec {
            cost: &[(Scrap, 20), (Food, 10)],
            turns: 2,
            population_required: 35,
            prerequisites: &[],
        },
        BuildingType::MedBay => ConstructionSpec {
            cost: &[(Scrap, 35), (CleanWater, 15), (MgrRounds, 3)],
            turns: 4,
            population_required: 60,
            prerequisites: &[BuildingType::WaterFilter],
        },
        BuildingType::Barracks => ConstructionSpec {
            cost: &[(Scrap, 50), (Food, 20), (MgrRounds, 8)],
            turns: 5,
            population_required: 80,
            prerequisites: &[],
        },
        BuildingType::Fortifications => ConstructionSpec {
            cost: &[(Scrap, 75), (MgrRounds, 12)],
            turns: 6,
            population_required: 70,
            prerequisites: &[],
        },
        BuildingType::Market => ConstructionSpec {
            cost: &[(Scrap, 40), (Food, 25), (MgrRounds, 15)],
            turns: 4,
            population_required: 100,
            prerequisites: &[BuildingType::ScrapWorkshop],
        },
        BuildingType::Library => ConstructionSpec {
            cost: &[(Scrap, 60), (CleanWater, 30), (MgrRounds, 20)],
            turns: 7,
            population_required: 120,
            prerequisites: &[BuildingType::MedBay],
        },
    }
}

/// Buildings a station may hold through construction
pub fn building_capacity(station: &Station) -> usize {
    3 + station.population as usize / 50
}

/// `max(1, int(cost × amount/100 × 0.5))` per resource
pub fn repair_cost(building: BuildingType, repair_amount: u32) -> Vec<(ResourceKind, i64)> {
    let multiplier = repair_amount as f64 / 100.0 * 0.5;
    construction_spec(building)
        .cost
        .iter()
        .map(|&(kind, amount)| (kind, ((amount as f64 * multiplier) as i64).max(1)))
        .collect()
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct BuildingProject {
    pub station: String,
    pub building_type: BuildingType,
    pub construction_time: u32,
    pub remaining_time: u32,
    pub start_turn: u32,
}

impl BuildingProject {
    /// Tick one turn of work. True once finished.
    pub fn advance(&mut self) -> bool {
        self.remaining_time = self.remaining_time.saturating_sub(1);
        self.remaining_time == 0
    }

    pub fn progress(&self) -> f64 {
        if self.construction_time == 0 {
            return 1.0;
        }
        1.0 - self.remaining_time as f64 / self.construction_time as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct BuildingOption {
    pub building_type: BuildingType,
    pub available: bool,
    pub reason: Option<String>,
    pub cost: Vec<(ResourceKind, i64)>,
    pub turns: u32,
    pub population_required: u32,
    pub output: Option<(ResourceKind, i64)>,
}

/// Production multipliers and flat bonuses a station's buildings provide
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct SpecializationBonus {
    pub production: Vec<(ResourceKind, f64)>,
    pub effects: Vec<(SpecialEffect, i64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpkeepReport {
    pub paid: Vec<(ResourceKind, i64)>,
    pub unpaid: Vec<ResourceKind>,
    /// (station, building) pairs damaged by neglect
    pub damaged: Vec<(String, BuildingType)>,
}

// ============================================================================
// BuildingSystem
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingSystem {
    pub projects: Vec<BuildingProject>,
}

impl BuildingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_construct(
        &self,
        map: &MetroMap,
        station_name: &str,
        building: BuildingType,
        resources: &ResourcePool,
    ) -> SimResult<()> {
        let station = map.require_station(station_name)?;
        if station.has_infrastructure(building) {
            return Err(SimError::illegal(format!(
                "{} already exists at {}",
                building.name(),
                station_name
            )));
        }
        let capacity = building_capacity(station);
        if station.infrastructure.len() >= capacity {
            return Err(SimError::illegal(format!(
                "{} at capacity ({}/{} buildings)",
                station_name,
                station.infrastructure.len(),
                capacity
            )));
        }
        let spec = construction_spec(building);
        if station.population < spec.population_required {
            return Err(SimError::illegal(format!(
                "insufficient population (need {}, have {})",
                spec.population_required, station.population
            )));
        }
        if let Some(short) = resources.first_shortfall(spec.cost) {
            return Err(SimError::Insufficient(short));
        }
        if let Some(missing) = spec
            .prerequisites
            .iter()
            .find(|p| !station.has_infrastructure(**p))
        {
            return Err(SimError::illegal(format!(
                "requires {} to be built first",
                missing.name()
            )));
        }
        Ok(())
    }

    /// Pay for and queue a project. Returns the turns until completion.
    pub fn start_construction(
        &mut self,
        map: &MetroMap,
        station_name: &str,
        building: BuildingType,
        resources: &mut ResourcePool,
        turn: u32,
    ) -> SimResult<u32> {
        self.can_construct(map, station_name, building, resources)?;
        if self
            .projects
            .iter()
            .any(|p| p.station == station_name && p.building_type == building)
        {
            return Err(SimError::illegal(format!(
                "{} already under construction at {}",
                building.name(),
                station_name
            )));
        }
        let spec = construction_spec(building);
        resources.consume_multiple(spec.cost)?;
        self.projects.push(BuildingProject {
            station: station_name.to_string(),
            building_type: building,
            construction_time: spec.turns,
            remaining_time: spec.turns,
            start_turn: turn,
        });

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "construction",
            turn = turn,
            station = station_name,
            building = building.name(),
            eta = spec.turns,
            change = "started",
        );
        Ok(spec.turns)
    }

    pub fn can_upgrade(
        &self,
        map: &MetroMap,
        station_name: &str,
        building: BuildingType,
        resources: &ResourcePool,
    ) -> SimResult<()> {
        let infra = Self::existing(map.require_station(station_name)?, building)?;
        if infra.upgrade_cost().is_empty() {
            return Err(SimError::illegal(format!(
                "{} already at maximum level",
                building.name()
            )));
        }
        if !infra.is_operational() {
            return Err(SimError::illegal(format!(
                "{} is too damaged to upgrade",
                building.name()
            )));
        }
        if let Some(short) = resources.first_shortfall(&infra.upgrade_cost()) {
            return Err(SimError::Insufficient(short));
        }
        Ok(())
    }

    /// Returns the new efficiency level
    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    pub fn upgrade_building(
        &mut self,
        map: &mut MetroMap,
        station_name: &str,
        building: BuildingType,
        resources: &mut ResourcePool,
        turn: u32,
    ) -> SimResult<u32> {
        self.can_upgrade(map, station_name, building, resources)?;
        let station = map.require_station_mut(station_name)?;
        let infra = station
            .infrastructure
            .get_mut(&building)
            .ok_or_else(|| SimError::not_found(building.name()))?;
        resources.consume_multiple(&infra.upgrade_cost())?;
        let level = infra.upgrade()?;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "construction",
            turn = turn,
            station = station_name,
            building = building.name(),
            level = level,
            change = "upgraded",
        );
        Ok(level)
    }

    /// Returns the remaining damage
    pub fn repair_building(
        &mut self,
        map: &mut MetroMap,
        station_name: &str,
        building: BuildingType,
        resources: &mut ResourcePool,
        repair_amount: u32,
    ) -> SimResult<u32> {
        let station = map.require_station_mut(station_name)?;
        let infra = station
            .infrastructure
            .get_mut(&building)
            .ok_or_else(|| SimError::not_found(format!("{} at {}", building.name(), station_name)))?;
        if infra.damage_level == 0 {
            return Err(SimError::illegal(format!("{} is not damaged", building.name())));
        }
        resources.consume_multiple(&repair_cost(building, repair_amount))?;
        infra.repair(repair_amount);
        Ok(infra.damage_level)
    }

    fn existing(station: &Station, building: BuildingType) -> SimResult<&Infrastructure> {
        station.infrastructure.get(&building).ok_or_else(|| {
            SimError::not_found(format!("{} at {}", building.name(), station.name))
        })
    }

    /// Advance every project; finished buildings are installed at level 1.
    /// Returns the completed (station, building) pairs.
    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    pub fn process_turn(&mut self, map: &mut MetroMap, turn: u32) -> Vec<(String, BuildingType)> {
        let mut completed = Vec::new();
        self.projects.retain_mut(|project| {
            if !project.advance() {
                return true;
            }
            if let Some(station) = map.station_mut(&project.station) {
                station.install_infrastructure(project.building_type, 1);
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "construction",
                    turn = turn,
                    station = project.station.as_str(),
                    building = project.building_type.name(),
                    change = "completed",
                );
                completed.push((project.station.clone(), project.building_type));
            }
            false
        });
        completed
    }

    pub fn available_buildings(
        &self,
        map: &MetroMap,
        station_name: &str,
        resources: &ResourcePool,
    ) -> Vec<BuildingOption> {
        BuildingType::all()
            .map(|building| {
                let spec = construction_spec(building);
                let check = self.can_construct(map, station_name, building, resources);
                BuildingOption {
                    building_type: building,
                    available: check.is_ok(),
                    reason: check.err().map(|e| e.to_string()),
                    cost: spec.cost.to_vec(),
                    turns: spec.turns,
                    population_required: spec.population_required,
                    output: building.base_output(),
                }
            })
            .collect()
    }

    /// Production boosts from producing buildings plus every operational
    /// building's special effects
    pub fn specialization_bonus(station: &Station) -> SpecializationBonus {
        let mut production: BTreeMap<ResourceKind, f64> =
            ResourceKind::all().map(|k| (k, 1.0)).collect();
        let mut effects: Vec<(SpecialEffect, i64)> = Vec::new();
        for infra in station.infrastructure.values().filter(|i| i.is_operational()) {
            let per_level = match infra.building_type {
                BuildingType::MushroomFarm => Some((ResourceKind::Food, 0.2)),
                BuildingType::WaterFilter => Some((ResourceKind::CleanWater, 0.25)),
                BuildingType::ScrapWorkshop => Some((ResourceKind::Scrap, 0.3)),
                BuildingType::MedBay => Some((ResourceKind::Medicine, 0.4)),
                _ => None,
            };
            if let Some((kind, step)) = per_level {
                *production.entry(kind).or_insert(1.0) += step * infra.efficiency_level as f64;
            }
            for (effect, value) in infra.special_effects() {
                match effects.iter_mut().find(|(e, _)| *e == effect) {
                    Some((_, total)) => *total += value,
                    None => effects.push((effect, value)),
                }
            }
        }
        SpecializationBonus {
            production: production.into_iter().collect(),
            effects,
        }
    }

    pub fn maintenance_summary(map: &MetroMap, stations: &[String]) -> Vec<(ResourceKind, i64)> {
        let mut totals: BTreeMap<ResourceKind, i64> = BTreeMap::new();
        for station in stations.iter().filter_map(|n| map.station(n)) {
            for (kind, amount) in station.total_maintenance() {
                *totals.entry(kind).or_insert(0) += amount;
            }
        }
        totals.into_iter().filter(|(_, a)| *a > 0).collect()
    }

    /// Pay building upkeep per resource. Every building that needs an unpaid
    /// resource takes neglect damage.
    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    pub fn process_maintenance(
        map: &mut MetroMap,
        stations: &[String],
        resources: &mut ResourcePool,
        turn: u32,
    ) -> UpkeepReport {
        let mut report = UpkeepReport::default();
        for (kind, amount) in Self::maintenance_summary(map, stations) {
            if resources.subtract(kind, amount).is_ok() {
                report.paid.push((kind, amount));
                continue;
            }
            report.unpaid.push(kind);
            #[cfg(feature = "instrument")]
            tracing::warn!(
                target: "construction",
                turn = turn,
                resource = kind.name(),
                needed = amount,
                "building upkeep shortfall"
            );
            for name in stations {
                let Some(station) = map.station_mut(name) else {
                    continue;
                };
                for infra in station.infrastructure.values_mut() {
                    if infra.needs_resource(kind) {
                        infra.apply_damage(NEGLECT_DAMAGE);
                        report.damaged.push((name.clone(), infra.building_type));
                    }
                }
            }
        }
        report
    }
}
