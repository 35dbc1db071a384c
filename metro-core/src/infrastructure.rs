// Infrastructure installed at a station

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::types::ResourceKind;

/// Highest efficiency level a building can reach
pub const MAX_EFFICIENCY_LEVEL: u32 = 3;

// ============================================================================
// Building Type
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    MushroomFarm,
    WaterFilter,
    ScrapWorkshop,
    MedBay,
    Barracks,
    Fortifications,
    Market,
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEffect {
    DefensiveBonus,
    UnitCapacity,
    SiegeResistance,
    TradeBonus,
    MgrGeneration,
    ResearchBonus,
    MoraleBonus,
}

impl BuildingType {
    pub fn all() -> impl Iterator<Item = BuildingType> {
        [
            BuildingType::MushroomFarm,
            BuildingType::WaterFilter,
            BuildingType::ScrapWorkshop,
            BuildingType::MedBay,
            BuildingType::Barracks,
            BuildingType::Fortifications,
            BuildingType::Market,
            BuildingType::Library,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildingType::MushroomFarm => "mushroom_farm",
            BuildingType::WaterFilter => "water_filter",
            BuildingType::ScrapWorkshop => "scrap_workshop",
            BuildingType::MedBay => "med_bay",
            BuildingType::Barracks => "barracks",
            BuildingType::Fortifications => "fortifications",
            BuildingType::Market => "market",
            BuildingType::Library => "library",
        }
    }

    pub fn from_name(name: &str) -> Option<BuildingType> {
        let lowered = name.to_ascii_lowercase();
        BuildingType::all().find(|b| b.name() == lowered)
    }

    /// Resource produced per turn at level 1, undamaged
    pub fn base_output(self) -> Option<(ResourceKind, i64)> {
        match self {
            BuildingType::MushroomFarm => Some((ResourceKind::Food, 15)),
            BuildingType::WaterFilter => Some((ResourceKind::CleanWater, 10)),
            BuildingType::ScrapWorkshop => Some((ResourceKind::Scrap, 12)),
            BuildingType::MedBay => Some((ResourceKind::Medicine, 8)),
            _ => None,
        }
    }

    pub fn base_upgrade_cost(self) -> &'static [(ResourceKind, i64)] {
        use ResourceKind::*;
        match self {
            BuildingType::MushroomFarm => &[(Scrap, 20), (CleanWater, 10)],
            BuildingType::WaterFilter => &[(Scrap, 25), (Medicine, 5)],
            BuildingType::ScrapWorkshop => &[(Scrap, 15), (MgrRounds, 2)],
            BuildingType::MedBay => &[(Scrap, 30), (CleanWater, 15)],
            BuildingType::Barracks => &[(Scrap, 40), (MgrRounds, 5)],
            BuildingType::Fortifications => &[(Scrap, 50), (MgrRounds, 3)],
            BuildingType::Market => &[(Scrap, 35), (MgrRounds, 8)],
            BuildingType::Library => &[(Scrap, 45), (MgrRounds, 10)],
        }
    }

    pub fn base_maintenance(self) -> &'static [(ResourceKind, i64)] {
        use ResourceKind::*;
        match self {
            BuildingType::MushroomFarm => &[(CleanWater, 2)],
            BuildingType::WaterFilter => &[(Scrap, 1)],
            BuildingType::ScrapWorkshop => &[],
            BuildingType::MedBay => &[(CleanWater, 3)],
            BuildingType::Barracks => &[(Food, 5)],
            BuildingType::Fortifications => &[],
            BuildingType::Market => &[(Food, 3)],
            BuildingType::Library => &[(CleanWater, 5)],
        }
    }

    pub fn base_special_effects(self) -> &'static [(SpecialEffect, i64)] {
        use SpecialEffect::*;
        match self {
            BuildingType::Barracks => &[(DefensiveBonus, 15), (UnitCapacity, 20)],
            BuildingType::Fortifications => &[(DefensiveBonus, 25), (SiegeResistance, 30)],
            BuildingType::Market => &[(TradeBonus, 20), (MgrGeneration, 2)],
            BuildingType::Library => &[(ResearchBonus, 25), (MoraleBonus, 10)],
            _ => &[],
        }
    }

    /// Flat defence added to a station when installed
    pub fn installed_defense(self) -> i64 {
        match self {
            BuildingType::Barracks => 15,
            BuildingType::Fortifications => 25,
            _ => 0,
        }
    }
}

// ============================================================================
// Infrastructure - A building instance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Infrastructure {
    pub building_type: BuildingType,
    pub efficiency_level: u32,
    /// 0 = pristine, 100 = destroyed
    pub damage_level: u32,
}

impl Infrastructure {
    pub fn new(building_type: BuildingType, efficiency_level: u32) -> Self {
        Self {
            building_type,
            efficiency_level: efficiency_level.clamp(1, MAX_EFFICIENCY_LEVEL),
            damage_level: 0,
        }
    }

    fn level_multiplier(&self) -> f64 {
        self.efficiency_level as f64 * 0.5 + 0.5
    }

    fn damage_multiplier(&self) -> f64 {
        (1.0 - self.damage_level as f64 / 100.0).max(0.1)
    }

    pub fn is_operational(&self) -> bool {
        self.damage_level < 100
    }

    pub fn resource_output(&self) -> Option<(ResourceKind, i64)> {
        if !self.is_operational() {
            return None;
        }
        let (kind, base) = self.building_type.base_output()?;
        let amount = (base as f64 * self.level_multiplier() * self.damage_multiplier()) as i64;
        Some((kind, amount))
    }

    /// Cost to reach the next level; empty at max level
    pub fn upgrade_cost(&self) -> Vec<(ResourceKind, i64)> {
        if self.efficiency_level >= MAX_EFFICIENCY_LEVEL {
            return Vec::new();
        }
        self.building_type
            .base_upgrade_cost()
            .iter()
            .map(|&(kind, amount)| (kind, amount * self.efficiency_level as i64))
            .collect()
    }

    pub fn maintenance_cost(&self) -> Vec<(ResourceKind, i64)> {
        let multiplier = self.level_multiplier();
        self.building_type
            .base_maintenance()
            .iter()
            .map(|&(kind, amount)| (kind, (amount as f64 * multiplier) as i64))
            .collect()
    }

    pub fn special_effects(&self) -> Vec<(SpecialEffect, i64)> {
        let multiplier = self.level_multiplier();
        self.building_type
            .base_special_effects()
            .iter()
            .map(|&(effect, amount)| (effect, (amount as f64 * multiplier) as i64))
            .collect()
    }

    pub fn needs_resource(&self, kind: ResourceKind) -> bool {
        self.building_type
            .base_maintenance()
            .iter()
            .any(|(k, _)| *k == kind)
    }

    pub fn upgrade(&mut self) -> SimResult<u32> {
        if self.efficiency_level >= MAX_EFFICIENCY_LEVEL {
            return Err(SimError::illegal(format!(
                "{} already at maximum level",
                self.building_type.name()
            )));
        }
        self.efficiency_level += 1;
        Ok(self.efficiency_level)
    }

    pub fn apply_damage(&mut self, amount: u32) {
        self.damage_level = (self.damage_level + amount).min(100);
    }

    pub fn repair(&mut self, amount: u32) {
        self.damage_level = self.damage_level.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_scales_with_level_and_damage() {
        let mut farm = Infrastructure::new(BuildingType::MushroomFarm, 1);
        assert_eq!(farm.resource_output(), Some((ResourceKind::Food, 15)));

        farm.upgrade().unwrap();
        // 15 × 1.5
        assert_eq!(farm.resource_output(), Some((ResourceKind::Food, 22)));

        farm.apply_damage(50);
        // 15 × 1.5 × 0.5
        assert_eq!(farm.resource_output(), Some((ResourceKind::Food, 11)));

        farm.apply_damage(80);
        assert_eq!(farm.damage_level, 100);
        assert!(!farm.is_operational());
        assert_eq!(farm.resource_output(), None);
    }

    #[test]
    fn test_upgrade_cost_and_max_level() {
        let mut filter = Infrastructure::new(BuildingType::WaterFilter, 2);
        assert_eq!(
            filter.upgrade_cost(),
            vec![(ResourceKind::Scrap, 50), (ResourceKind::Medicine, 10)]
        );
        filter.upgrade().unwrap();
        assert!(filter.upgrade_cost().is_empty());
        assert!(matches!(
            filter.upgrade(),
            Err(SimError::IllegalTransition(_))
        ));
    }

    #[test]
    fn test_maintenance_and_effects_scale() {
        let library = Infrastructure::new(BuildingType::Library, 3);
        assert_eq!(library.maintenance_cost(), vec![(ResourceKind::CleanWater, 10)]);
        assert_eq!(
            library.special_effects(),
            vec![
                (SpecialEffect::ResearchBonus, 50),
                (SpecialEffect::MoraleBonus, 20)
            ]
        );
        assert!(Infrastructure::new(BuildingType::ScrapWorkshop, 1)
            .maintenance_cost()
            .is_empty());
    }

    #[test]
    fn test_repair_clamps_to_zero() {
        let mut barracks = Infrastructure::new(BuildingType::Barracks, 1);
        barracks.apply_damage(30);
        barracks.repair(50);
        assert_eq!(barracks.damage_level, 0);
    }
}
