// Military units and the roster that tracks them across factions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::infrastructure::BuildingType;
use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::station::Station;
use crate::types::{FactionId, KeyToU64, ResourceKind, UnitId};

/// Morale lost by every active unit when upkeep cannot be paid
pub const MAINTENANCE_MORALE_PENALTY: i64 = 15;

/// Units at or below this morale desert
pub const DESERTION_MORALE: u32 = 10;

pub const MAX_EQUIPMENT_LEVEL: u32 = 5;

// ============================================================================
// Unit Type
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Militia,
    Conscripts,
    Stormtroopers,
    Rangers,
    Scouts,
    Spies,
    Stalkers,
    Caravans,
    Engineers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    LocalKnowledge,
    Disciplined,
    Assault,
    HeavyWeapons,
    EliteTraining,
    TunnelWarfare,
    Leadership,
    Stealth,
    Reconnaissance,
    FastMovement,
    Infiltration,
    Sabotage,
    Intelligence,
    AnomalyResistance,
    Scavenging,
    Survival,
    CargoTransport,
    TradeBonus,
    Construction,
    Repair,
    Fortification,
}

/// Static statistics for a unit type
#[derive(Debug, Clone, Copy)]
pub struct UnitStats {
    pub combat_strength: u32,
    pub movement_range: u32,
    pub recruitment_cost: &'static [(ResourceKind, i64)],
    pub population_cost: u32,
    pub maintenance_cost: &'static [(ResourceKind, i64)],
    pub abilities: &'static [Ability],
}

/// Get the base statistics for a unit type
pub fn unit_stats(unit_type: UnitType) -> UnitStats {
    use Ability::*;
    use ResourceKind::*;
    match unit_type {
        UnitType::Militia => UnitStats {
            combat_strength: 10,
            movement_range: 2,
            recruitment_cost: &[(Food, 5), (Scrap, 3)],
            population_cost: 2,
            maintenance_cost: &[(Food, 1)],
            abilities: &[LocalKnowledge],
        },
        UnitType::Conscripts => UnitStats {
            combat_strength: 15,
            movement_range: 2,
            recruitment_cost: &[(Food, 8), (Scrap, 5), (Medicine, 2)],
            population_cost: 3,
            maintenance_cost: &[(Food, 2)],
            abilities: &[Disciplined],
        },
        UnitType::Stormtroopers => UnitStats {
            combat_strength: 35,
            movement_range: 3,
            recruitment_cost: &[(Food, 20), (Scrap, 15), (Medicine, 8), (MgrRounds, 5)],
            population_cost: 5,
            maintenance_cost: &[(Food, 3), (Scrap, 2)],
            abilities: &[Assault, HeavyWeapons],
        },
        UnitType::Rangers => UnitStats {
            combat_strength: 40,
            movement_range: 4,
            recruitment_cost: &[(Food, 25), (Scrap, 20), (Medicine, 10), (MgrRounds, 8)],
            population_cost: 4,
            maintenance_cost: &[(Food, 3), (Medicine, 1)],
            abilities: &[EliteTraining, TunnelWarfare, Leadership],
        },
        UnitType::Scouts => UnitStats {
            combat_strength: 8,
            movement_range: 5,
            recruitment_cost: &[(Food, 10), (Scrap, 8)],
            population_cost: 1,
            maintenance_cost: &[(Food, 1)],
            abilities: &[Stealth, Reconnaissance, FastMovement],
        },
        UnitType::Spies => UnitStats {
            combat_strength: 5,
            movement_range: 3,
            recruitment_cost: &[(Food, 15), (Medicine, 5), (MgrRounds, 3)],
            population_cost: 1,
            maintenance_cost: &[(Food, 2)],
            abilities: &[Infiltration, Sabotage, Intelligence],
        },
        UnitType::Stalkers => UnitStats {
            combat_strength: 25,
            movement_range: 4,
            recruitment_cost: &[(Food, 18), (Scrap, 12), (Medicine, 6)],
            population_cost: 2,
            maintenance_cost: &[(Food, 2), (Scrap, 1)],
            abilities: &[AnomalyResistance, Scavenging, Survival],
        },
        UnitType::Caravans => UnitStats {
            combat_strength: 3,
            movement_range: 3,
            recruitment_cost: &[(Scrap, 20), (Food, 5)],
            population_cost: 3,
            maintenance_cost: &[(Scrap, 1)],
            abilities: &[CargoTransport, TradeBonus],
        },
        UnitType::Engineers => UnitStats {
            combat_strength: 8,
            movement_range: 2,
            recruitment_cost: &[(Scrap, 25), (Medicine, 8), (MgrRounds, 2)],
            population_cost: 4,
            maintenance_cost: &[(Scrap, 2)],
            abilities: &[Construction, Repair, Fortification],
        },
    }
}

impl UnitType {
    pub fn all() -> impl Iterator<Item = UnitType> {
        [
            UnitType::Militia,
            UnitType::Conscripts,
            UnitType::Stormtroopers,
            UnitType::Rangers,
            UnitType::Scouts,
            UnitType::Spies,
            UnitType::Stalkers,
            UnitType::Caravans,
            UnitType::Engineers,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            UnitType::Militia => "militia",
            UnitType::Conscripts => "conscripts",
            UnitType::Stormtroopers => "stormtroopers",
            UnitType::Rangers => "rangers",
            UnitType::Scouts => "scouts",
            UnitType::Spies => "spies",
            UnitType::Stalkers => "stalkers",
            UnitType::Caravans => "caravans",
            UnitType::Engineers => "engineers",
        }
    }

    pub fn from_name(name: &str) -> Option<UnitType> {
        let lowered = name.to_ascii_lowercase();
        UnitType::all().find(|u| u.name() == lowered)
    }

    /// Elite units can only be raised at a station with barracks
    pub fn is_elite(self) -> bool {
        matches!(self, UnitType::Stormtroopers | UnitType::Rangers)
    }

    pub fn stats(self) -> UnitStats {
        unit_stats(self)
    }
}

// ============================================================================
// Military Unit
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilitaryUnit {
    pub unit_type: UnitType,
    pub faction: FactionId,
    pub station: String,
    pub equipment_level: u32,
    pub experience: u32,
    pub health: u32,
    pub morale: u32,
    pub is_active: bool,
}

impl MilitaryUnit {
    pub fn new(unit_type: UnitType, faction: FactionId, station: impl Into<String>) -> Self {
        Self {
            unit_type,
            faction,
            station: station.into(),
            equipment_level: 1,
            experience: 0,
            health: 100,
            morale: 100,
            is_active: true,
        }
    }

    pub fn with_equipment(mut self, level: u32) -> Self {
        self.equipment_level = level.clamp(1, MAX_EQUIPMENT_LEVEL);
        self
    }

    pub fn with_experience(mut self, experience: u32) -> Self {
        self.experience = experience.min(100);
        self
    }

    /// `base × equipment × experience × health × morale` factors, truncated
    pub fn combat_strength(&self) -> u32 {
        let base = self.unit_type.stats().combat_strength as f64;
        let equipment = 1.0 + (self.equipment_level as f64 - 1.0) * 0.2;
        let experience = 1.0 + (self.experience as f64 / 100.0) * 0.5;
        let health = self.health as f64 / 100.0;
        let morale = 0.5 + (self.morale as f64 / 100.0) * 0.5;
        (base * equipment * experience * health * morale) as u32
    }

    pub fn has_ability(&self, ability: Ability) -> bool {
        self.unit_type.stats().abilities.contains(&ability)
    }

    /// Apply damage. Returns true if the unit was destroyed.
    pub fn take_damage(&mut self, damage: u32) -> bool {
        self.health = self.health.saturating_sub(damage);
        if self.health == 0 {
            self.is_active = false;
            return true;
        }
        false
    }

    pub fn gain_experience(&mut self, amount: u32) {
        self.experience = (self.experience + amount).min(100);
    }

    pub fn modify_morale(&mut self, change: i64) {
        self.morale = (self.morale as i64 + change).clamp(0, 100) as u32;
    }

    /// Whether the unit can reach a station within its movement range
    pub fn can_move_to(&self, target: &str, map: &MetroMap) -> bool {
        if !self.is_active {
            return false;
        }
        map.find_path_default(&self.station, target)
            .is_some_and(|p| p.len() - 1 <= self.unit_type.stats().movement_range as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct UnitInfo {
    pub id: u64,
    pub unit_type: UnitType,
    pub faction: FactionId,
    pub station: String,
    pub combat_strength: u32,
    pub health: u32,
    pub morale: u32,
    pub experience: u32,
    pub equipment_level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub paid: Vec<(ResourceKind, i64)>,
    pub unpaid: Vec<ResourceKind>,
    pub deserted: usize,
    pub removed: usize,
}

// ============================================================================
// Military Roster
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MilitaryRoster {
    pub units: SlotMap<UnitId, MilitaryUnit>,
}

impl MilitaryRoster {
    pub fn new() -> Self {
        Self {
            units: SlotMap::with_key(),
        }
    }

    /// Check population, resources and barracks for a recruitment
    pub fn can_recruit(
        &self,
        unit_type: UnitType,
        station: &Station,
        resources: &ResourcePool,
    ) -> SimResult<()> {
        let stats = unit_type.stats();
        if station.population < stats.population_cost {
            return Err(SimError::illegal(format!(
                "not enough population at {} (need {}, have {})",
                station.name, stats.population_cost, station.population
            )));
        }
        if let Some(short) = resources.first_shortfall(stats.recruitment_cost) {
            return Err(SimError::Insufficient(short));
        }
        if unit_type.is_elite() && !station.has_infrastructure(BuildingType::Barracks) {
            return Err(SimError::illegal(format!(
                "{} require barracks at {}",
                unit_type.name(),
                station.name
            )));
        }
        Ok(())
    }

    /// Pay the recruitment cost and station a new unit
    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    pub fn recruit(
        &mut self,
        unit_type: UnitType,
        faction: FactionId,
        station: &Station,
        resources: &mut ResourcePool,
        turn: u32,
    ) -> SimResult<UnitId> {
        self.can_recruit(unit_type, station, resources)?;
        resources.consume_multiple(unit_type.stats().recruitment_cost)?;
        let id = self
            .units
            .insert(MilitaryUnit::new(unit_type, faction, station.name.clone()));

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "military",
            turn = turn,
            faction = faction.name(),
            station = station.name.as_str(),
            unit_type = unit_type.name(),
            change = "recruited",
        );
        Ok(id)
    }

    pub fn get(&self, id: UnitId) -> Option<&MilitaryUnit> {
        self.units.get(id)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut MilitaryUnit> {
        self.units.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units_at(&self, station: &str) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|(_, u)| u.is_active && u.station == station)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn units_of(&self, faction: FactionId) -> impl Iterator<Item = (UnitId, &MilitaryUnit)> {
        self.units
            .iter()
            .filter(move |(_, u)| u.is_active && u.faction == faction)
    }

    pub fn strength_at(&self, station: &str) -> u32 {
        self.units
            .values()
            .filter(|u| u.is_active && u.station == station)
            .map(|u| u.combat_strength())
            .sum()
    }

    pub fn faction_strength(&self, faction: FactionId) -> u32 {
        self.units_of(faction).map(|(_, u)| u.combat_strength()).sum()
    }

    /// Move a unit if the target is within its movement range
    pub fn move_unit(&mut self, id: UnitId, target: &str, map: &MetroMap) -> SimResult<()> {
        let unit = self
            .units
            .get_mut(id)
            .ok_or_else(|| SimError::not_found(format!("unit {}", id.to_u64())))?;
        map.require_station(target)?;
        if !unit.can_move_to(target, map) {
            return Err(SimError::illegal(format!(
                "{} cannot reach {} this turn",
                unit.unit_type.name(),
                target
            )));
        }
        unit.station = target.to_string();
        Ok(())
    }

    pub fn maintenance_cost(&self, faction: FactionId) -> Vec<(ResourceKind, i64)> {
        let mut totals: BTreeMap<ResourceKind, i64> = BTreeMap::new();
        for (_, unit) in self.units_of(faction) {
            for &(kind, amount) in unit.unit_type.stats().maintenance_cost {
                *totals.entry(kind).or_insert(0) += amount;
            }
        }
        totals.into_iter().collect()
    }

    /// Pay upkeep per resource. Each unpaid resource costs every active unit
    /// morale; units that fall to the desertion line leave the roster.
    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    pub fn process_maintenance(
        &mut self,
        faction: FactionId,
        resources: &mut ResourcePool,
        turn: u32,
    ) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        for (kind, amount) in self.maintenance_cost(faction) {
            if resources.subtract(kind, amount).is_ok() {
                report.paid.push((kind, amount));
                continue;
            }
            report.unpaid.push(kind);
            #[cfg(feature = "instrument")]
            tracing::warn!(
                target: "military",
                turn = turn,
                faction = faction.name(),
                resource = kind.name(),
                needed = amount,
                "upkeep shortfall"
            );
            for unit in self
                .units
                .values_mut()
                .filter(|u| u.is_active && u.faction == faction)
            {
                unit.modify_morale(-MAINTENANCE_MORALE_PENALTY);
                if unit.morale <= DESERTION_MORALE {
                    unit.is_active = false;
                    report.deserted += 1;
                }
            }
        }
        report.removed = self.remove_destroyed();
        report
    }

    /// Drop every inactive unit. Returns how many were removed.
    pub fn remove_destroyed(&mut self) -> usize {
        let before = self.units.len();
        self.units.retain(|_, u| u.is_active);
        before - self.units.len()
    }

    /// Units left behind at a station their faction no longer holds scatter.
    /// Returns how many were removed.
    pub fn disband_stranded(&mut self, map: &MetroMap) -> usize {
        let before = self.units.len();
        self.units.retain(|_, u| {
            map.station(&u.station)
                .is_some_and(|s| s.controlling_faction == u.faction)
        });
        before - self.units.len()
    }

    pub fn summary(&self, faction: FactionId) -> BTreeMap<UnitType, usize> {
        let mut counts = BTreeMap::new();
        for (_, unit) in self.units_of(faction) {
            *counts.entry(unit.unit_type).or_insert(0) += 1;
        }
        counts
    }

    pub fn unit_info(&self) -> Vec<UnitInfo> {
        self.units
            .iter()
            .filter(|(_, u)| u.is_active)
            .map(|(id, u)| UnitInfo {
                id: id.to_u64(),
                unit_type: u.unit_type,
                faction: u.faction,
                station: u.station.clone(),
                combat_strength: u.combat_strength(),
                health: u.health,
                morale: u.morale,
                experience: u.experience,
                equipment_level: u.equipment_level,
            })
            .collect()
    }
}

impl PartialEq for MilitaryRoster {
    fn eq(&self, other: &Self) -> bool {
        self.units.len() == other.units.len()
            && self
                .units
                .iter()
                .all(|(id, u)| other.units.get(id) == Some(u))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> Station {
        Station::new("Depot", (0.0, 0.0), "Red").with_population(100)
    }

    fn stocked() -> ResourcePool {
        ResourcePool::from_amounts(&[
            (ResourceKind::Food, 100),
            (ResourceKind::Scrap, 100),
            (ResourceKind::Medicine, 50),
            (ResourceKind::MgrRounds, 50),
        ])
        .unwrap()
    }

    #[test]
    fn test_fresh_militia_strength() {
        let unit = MilitaryUnit::new(UnitType::Militia, FactionId::Rangers, "Depot");
        assert_eq!(unit.combat_strength(), 10);

        let veteran = MilitaryUnit::new(UnitType::Rangers, FactionId::Rangers, "Depot")
            .with_equipment(3)
            .with_experience(100);
        // 40 × 1.4 × 1.5
        assert_eq!(veteran.combat_strength(), 84);
    }

    #[test]
    fn test_recruit_pays_cost() {
        let mut roster = MilitaryRoster::new();
        let mut resources = stocked();
        let id = roster
            .recruit(UnitType::Militia, FactionId::Rangers, &station(), &mut resources, 1)
            .unwrap();
        assert_eq!(resources.food, 95);
        assert_eq!(resources.scrap, 97);
        assert_eq!(roster.get(id).map(|u| u.station.as_str()), Some("Depot"));
        assert_eq!(roster.units_at("Depot"), vec![id]);
    }

    #[test]
    fn test_elite_units_need_barracks() {
        let mut roster = MilitaryRoster::new();
        let mut resources = stocked();
        let mut depot = station();
        let err = roster
            .recruit(UnitType::Stormtroopers, FactionId::FourthReich, &depot, &mut resources, 1)
            .unwrap_err();
        assert!(matches!(err, SimError::IllegalTransition(_)));
        assert_eq!(resources, stocked());

        depot.add_infrastructure(BuildingType::Barracks, 1).unwrap();
        assert!(
            roster
                .recruit(UnitType::Stormtroopers, FactionId::FourthReich, &depot, &mut resources, 1)
                .is_ok()
        );
    }

    #[test]
    fn test_recruit_shortfall_is_reported() {
        let roster = MilitaryRoster::new();
        let poor = ResourcePool::new().with(ResourceKind::Food, 5);
        let err = roster
            .can_recruit(UnitType::Militia, &station(), &poor)
            .unwrap_err();
        assert_eq!(err.shortfall().map(|s| s.kind), Some(ResourceKind::Scrap));
    }

    #[test]
    fn test_unpaid_upkeep_causes_desertion() {
        let mut roster = MilitaryRoster::new();
        let mut resources = stocked();
        for _ in 0..3 {
            roster
                .recruit(UnitType::Militia, FactionId::Rangers, &station(), &mut resources, 1)
                .unwrap();
        }
        assert_eq!(roster.maintenance_cost(FactionId::Rangers), vec![(ResourceKind::Food, 3)]);

        let mut empty = ResourcePool::new();
        for turn in 0..5 {
            let report = roster.process_maintenance(FactionId::Rangers, &mut empty, turn);
            assert_eq!(report.unpaid, vec![ResourceKind::Food]);
        }
        // 100 - 5 × 15 = 25
        assert_eq!(roster.len(), 3);
        let report = roster.process_maintenance(FactionId::Rangers, &mut empty, 5);
        assert_eq!(report.deserted, 3);
        assert_eq!(report.removed, 3);
        assert!(roster.is_empty());
    }

    #[test]
    fn test_units_destroyed_by_damage_are_removed() {
        let mut roster = MilitaryRoster::new();
        let id = roster
            .units
            .insert(MilitaryUnit::new(UnitType::Scouts, FactionId::Polis, "Polis"));
        assert!(roster.get_mut(id).unwrap().take_damage(150));
        assert_eq!(roster.remove_destroyed(), 1);
        assert!(roster.get(id).is_none());
    }

    #[test]
    fn test_units_at_lost_stations_disband() {
        let mut map = crate::map_data::create_metro_map().unwrap();
        let mut roster = MilitaryRoster::new();
        let kept = roster
            .units
            .insert(MilitaryUnit::new(UnitType::Militia, FactionId::Rangers, "VDNKh"));
        let stranded = roster
            .units
            .insert(MilitaryUnit::new(UnitType::Militia, FactionId::Rangers, "Park Pobedy"));
        map.station_mut("Park Pobedy")
            .unwrap()
            .change_faction_control(FactionId::RedLine, false);
        assert_eq!(roster.disband_stranded(&map), 1);
        assert!(roster.get(kept).is_some());
        assert!(roster.get(stranded).is_none());
    }
}
