//! Major factions: ideology, static bonuses, and per-faction mechanics.
//!
//! Each faction carries a closed set of [`Mechanic`] variants picked by its
//! identity at construction. Mechanics share one interface (`can_activate` /
//! `apply_effect`) and keep their own small piece of state.
//!
//! A faction owns no stockpile of its own. Mechanics, bonus production and
//! stability all work against the pool of whoever runs the faction's
//! economy: the player's pool or the faction's AI pool.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::metro_map::MetroMap;
use crate::resources::ResourcePool;
use crate::types::{FactionId, ResourceKind};

/// Resources below this count as a critical shortage for stability
pub const CRITICAL_SHORTAGE_LEVEL: i64 = 10;

// ============================================================================
// Government / Ideology
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum GovernmentType {
    Communist,
    Fascist,
    Oligarchy,
    Republic,
    Theocracy,
    Anarchist,
    Military,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Ideology {
    Stalinist,
    Nazi,
    Capitalist,
    Democratic,
    Orthodox,
    Libertarian,
    Militarist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct FactionBonus {
    pub name: String,
    pub resource_modifiers: Vec<(ResourceKind, f64)>,
    pub combat_modifier: f64,
    pub diplomacy_modifier: f64,
    pub trade_modifier: f64,
    pub population_modifier: f64,
}

impl FactionBonus {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resource_modifiers: Vec::new(),
            combat_modifier: 0.0,
            diplomacy_modifier: 0.0,
            trade_modifier: 0.0,
            population_modifier: 0.0,
        }
    }
}

// ============================================================================
// Mechanics
// ============================================================================

/// What a mechanic sees of the world when it runs
#[derive(Debug, Clone, Default)]
pub struct MechanicContext {
    pub controlled_stations: Vec<String>,
    /// Average morale across controlled stations
    pub total_morale: u32,
    /// This turn's output of the controlled stations
    pub production: ResourcePool,
    pub active_trades: Vec<TradeTouch>,
}

/// A trade in flight, as seen by a toll collector
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTouch {
    pub caravan_id: String,
    pub origin: String,
    pub destination: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MechanicEffect {
    MoraleBoost { amount: u32, stations_affected: usize },
    PurityDoctrine { military_bonus: u32, growth_penalty: u32 },
    TollsCollected { mgr: i64, trades_affected: usize },
    CouncilEfficiency { efficiency_bonus: u32, decisions_processed: usize },
    Refused(String),
}

/// One mechanic firing for one faction during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionEffect {
    pub faction: FactionId,
    pub mechanic: String,
    pub effect: MechanicEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commissariat {
    pub deployed: u32,
    pub max_deployments: u32,
    pub food_cost: i64,
    pub morale_boost: u32,
}

impl Default for Commissariat {
    fn default() -> Self {
        Self {
            deployed: 0,
            max_deployments: 5,
            food_cost: 10,
            morale_boost: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurityDoctrine {
    pub purity: f64,
}

impl PurityDoctrine {
    pub fn increase(&mut self, amount: f64) {
        self.purity = (self.purity + amount).min(1.0);
    }

    pub fn decrease(&mut self, amount: f64) {
        self.purity = (self.purity - amount).max(0.0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollSystem {
    pub rate: f64,
    pub total_collected: i64,
    /// Caravans still in flight that have already paid
    #[serde(default)]
    pub tolled: BTreeSet<String>,
}

impl TollSystem {
    pub fn toll_for(&self, value: i64) -> i64 {
        (value as f64 * self.rate) as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilDemocracy {
    pub approval: f64,
    pub pending_decisions: Vec<String>,
}

impl CouncilDemocracy {
    pub fn add_decision(&mut self, decision: impl Into<String>) {
        self.pending_decisions.push(decision.into());
    }

    pub fn vote(&mut self, approve: bool) {
        self.approval = if approve {
            (self.approval + 0.05).min(1.0)
        } else {
            (self.approval - 0.1).max(0.0)
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mechanic {
    Commissariat(Commissariat),
    PurityDoctrine(PurityDoctrine),
    TollSystem(TollSystem),
    CouncilDemocracy(CouncilDemocracy),
}

impl Mechanic {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanic::Commissariat(_) => "Commissariat",
            Mechanic::PurityDoctrine(_) => "Purity Doctrine",
            Mechanic::TollSystem(_) => "Toll System",
            Mechanic::CouncilDemocracy(_) => "Council Democracy",
        }
    }

    pub fn can_activate(&self, resources: &ResourcePool, _ctx: &MechanicContext) -> bool {
        match self {
            Mechanic::Commissariat(c) => {
                c.deployed < c.max_deployments
                    && resources.has_sufficient(ResourceKind::Food, c.food_cost)
            }
            _ => true,
        }
    }

    pub fn apply_effect(&mut self, resources: &mut ResourcePool, ctx: &MechanicContext) -> MechanicEffect {
        match self {
            Mechanic::Commissariat(c) => {
                if c.deployed >= c.max_deployments {
                    return MechanicEffect::Refused("maximum commissars already deployed".into());
                }
                if resources.subtract(ResourceKind::Food, c.food_cost).is_err() {
                    return MechanicEffect::Refused("insufficient food for commissar deployment".into());
                }
                c.deployed += 1;
                MechanicEffect::MoraleBoost {
                    amount: c.morale_boost,
                    stations_affected: ctx.controlled_stations.len().min(c.deployed as usize),
                }
            }
            Mechanic::PurityDoctrine(p) => MechanicEffect::PurityDoctrine {
                military_bonus: (p.purity * 30.0) as u32,
                growth_penalty: (p.purity * 20.0) as u32,
            },
            Mechanic::TollSystem(t) => {
                // forget caravans that have arrived or been lost
                t.tolled
                    .retain(|id| ctx.active_trades.iter().any(|trade| &trade.caravan_id == id));

                let mut collected = 0;
                let mut trades_affected = 0;
                for trade in &ctx.active_trades {
                    if t.tolled.contains(&trade.caravan_id) {
                        continue;
                    }
                    let touches = ctx.controlled_stations.contains(&trade.origin)
                        || ctx.controlled_stations.contains(&trade.destination);
                    let toll = t.toll_for(trade.value);
                    if touches && toll > 0 {
                        // toll is always non-negative
                        let _ = resources.add(ResourceKind::MgrRounds, toll);
                        t.tolled.insert(trade.caravan_id.clone());
                        collected += toll;
                        trades_affected += 1;
                    }
                }
                t.total_collected += collected;
                MechanicEffect::TollsCollected {
                    mgr: collected,
                    trades_affected,
                }
            }
            Mechanic::CouncilDemocracy(c) => {
                let decisions_processed = c.pending_decisions.len();
                c.pending_decisions.clear();
                MechanicEffect::CouncilEfficiency {
                    efficiency_bonus: (c.approval * 25.0) as u32,
                    decisions_processed,
                }
            }
        }
    }
}

// ============================================================================
// Faction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub id: FactionId,
    pub government: GovernmentType,
    pub ideology: Ideology,
    pub total_population: u64,
    pub controlled_stations: Vec<String>,
    pub stability: f64,
    pub militarism: f64,
    pub expansionism: f64,
    pub isolationism: f64,
    pub bonuses: Vec<FactionBonus>,
    pub mechanics: Vec<Mechanic>,
    pub recent_military_losses: u32,
}

impl Faction {
    pub fn new(id: FactionId, government: GovernmentType, ideology: Ideology) -> Self {
        let mut faction = Self {
            id,
            government,
            ideology,
            total_population: 0,
            controlled_stations: Vec::new(),
            stability: 0.7,
            militarism: 0.5,
            expansionism: 0.5,
            isolationism: 0.3,
            bonuses: Vec::new(),
            mechanics: Vec::new(),
            recent_military_losses: 0,
        };
        faction.init_features();
        faction
    }

    /// One of the five majors with its canonical government and ideology
    pub fn major(id: FactionId) -> Option<Self> {
        let (government, ideology) = match id {
            FactionId::RedLine => (GovernmentType::Communist, Ideology::Stalinist),
            FactionId::FourthReich => (GovernmentType::Fascist, Ideology::Nazi),
            FactionId::Hanza => (GovernmentType::Oligarchy, Ideology::Capitalist),
            FactionId::Polis => (GovernmentType::Republic, Ideology::Democratic),
            FactionId::Rangers => (GovernmentType::Military, Ideology::Militarist),
            FactionId::InvisibleWatchers | FactionId::Independent => return None,
        };
        Some(Self::new(id, government, ideology))
    }

    fn init_features(&mut self) {
        use ResourceKind::*;
        match self.id {
            FactionId::RedLine => {
                let mut bonus = FactionBonus::new("Revolutionary Fervor");
                bonus.resource_modifiers = vec![(Food, -0.1)];
                bonus.combat_modifier = 0.15;
                bonus.population_modifier = 0.1;
                self.bonuses.push(bonus);
                self.mechanics.push(Mechanic::Commissariat(Commissariat::default()));
                self.militarism = 0.8;
                self.expansionism = 0.7;
            }
            FactionId::FourthReich => {
                let mut bonus = FactionBonus::new("Military Discipline");
                bonus.resource_modifiers = vec![(Scrap, 0.2)];
                bonus.combat_modifier = 0.25;
                bonus.population_modifier = -0.15;
                self.bonuses.push(bonus);
                self.mechanics
                    .push(Mechanic::PurityDoctrine(PurityDoctrine { purity: 0.5 }));
                self.militarism = 0.9;
                self.expansionism = 0.8;
                self.isolationism = 0.6;
            }
            FactionId::Hanza => {
                let mut bonus = FactionBonus::new("Trade Network");
                bonus.resource_modifiers = vec![(MgrRounds, 0.3)];
                bonus.trade_modifier = 0.25;
                bonus.diplomacy_modifier = 0.1;
                self.bonuses.push(bonus);
                self.mechanics.push(Mechanic::TollSystem(TollSystem {
                    rate: 0.15,
                    total_collected: 0,
                    tolled: BTreeSet::new(),
                }));
                self.militarism = 0.3;
                self.expansionism = 0.4;
            }
            FactionId::Polis => {
                let mut bonus = FactionBonus::new("Democratic Efficiency");
                bonus.resource_modifiers = vec![(Medicine, 0.2), (CleanWater, 0.15)];
                bonus.diplomacy_modifier = 0.2;
                bonus.population_modifier = 0.05;
                self.bonuses.push(bonus);
                self.mechanics.push(Mechanic::CouncilDemocracy(CouncilDemocracy {
                    approval: 0.7,
                    pending_decisions: Vec::new(),
                }));
                self.militarism = 0.2;
                self.expansionism = 0.3;
                self.isolationism = 0.1;
            }
            FactionId::Rangers => {
                let mut bonus = FactionBonus::new("Elite Training");
                bonus.resource_modifiers = vec![(Medicine, 0.1), (Food, 0.1)];
                bonus.combat_modifier = 0.1;
                bonus.diplomacy_modifier = 0.15;
                self.bonuses.push(bonus);
                self.militarism = 0.6;
                self.expansionism = 0.2;
                self.isolationism = 0.2;
            }
            FactionId::InvisibleWatchers | FactionId::Independent => {}
        }
    }

    /// Summed per-resource modifier across bonuses
    pub fn resource_modifier(&self, kind: ResourceKind) -> f64 {
        self.bonuses
            .iter()
            .flat_map(|b| b.resource_modifiers.iter())
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| m)
            .sum()
    }

    pub fn combat_modifier(&self) -> f64 {
        let bonus: f64 = self.bonuses.iter().map(|b| b.combat_modifier).sum();
        bonus + (self.stability - 0.5) * 0.2
    }

    pub fn diplomacy_modifier(&self) -> f64 {
        let bonus: f64 = self.bonuses.iter().map(|b| b.diplomacy_modifier).sum();
        bonus + (self.stability - 0.5) * 0.1
    }

    pub fn trade_modifier(&self) -> f64 {
        self.bonuses.iter().map(|b| b.trade_modifier).sum()
    }

    pub fn population_modifier(&self) -> f64 {
        self.bonuses.iter().map(|b| b.population_modifier).sum()
    }

    pub fn mechanic(&self, name: &str) -> Option<&Mechanic> {
        self.mechanics.iter().find(|m| m.name() == name)
    }

    pub fn mechanic_mut(&mut self, name: &str) -> Option<&mut Mechanic> {
        self.mechanics.iter_mut().find(|m| m.name() == name)
    }

    /// Bonus production, mechanics, then stability, all against `resources`
    #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
    pub fn process_turn(
        &mut self,
        turn: u32,
        resources: &mut ResourcePool,
        ctx: &MechanicContext,
    ) -> Vec<(&'static str, MechanicEffect)> {
        self.apply_resource_bonuses(resources, &ctx.production);

        let mut effects = Vec::new();
        for mechanic in &mut self.mechanics {
            if mechanic.can_activate(resources, ctx) {
                let effect = mechanic.apply_effect(resources, ctx);
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "faction",
                    turn = turn,
                    faction = self.id.name(),
                    mechanic = mechanic.name(),
                    effect = ?effect,
                );
                effects.push((mechanic.name(), effect));
            }
        }

        self.update_stability(resources, ctx);
        #[cfg(feature = "instrument")]
        tracing::debug!(target: "faction", turn = turn, faction = self.id.name(), stability = self.stability);
        effects
    }

    /// Positive resource modifiers add a share of this turn's station output
    fn apply_resource_bonuses(&self, resources: &mut ResourcePool, production: &ResourcePool) {
        let modifiers = self
            .bonuses
            .iter()
            .flat_map(|b| b.resource_modifiers.iter().copied())
            .filter(|(_, m)| *m > 0.0);
        for (kind, modifier) in modifiers {
            let bonus = (production.get(kind) as f64 * modifier) as i64;
            if bonus > 0 {
                // positive by construction
                let _ = resources.add(kind, bonus);
            }
        }
    }

    fn update_stability(&mut self, resources: &ResourcePool, ctx: &MechanicContext) {
        let mut change = 0.0;
        if ctx.total_morale > 70 {
            change += 0.02;
        } else if ctx.total_morale < 30 {
            change -= 0.03;
        }
        for kind in [
            ResourceKind::Food,
            ResourceKind::CleanWater,
            ResourceKind::Medicine,
        ] {
            if resources.get(kind) < CRITICAL_SHORTAGE_LEVEL {
                change -= 0.01;
            }
        }
        change -= self.recent_military_losses as f64 * 0.005;
        self.stability = (self.stability + change).clamp(0.0, 1.0);
    }
}

// ============================================================================
// FactionManager
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionManager {
    factions: BTreeMap<FactionId, Faction>,
}

impl Default for FactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FactionManager {
    pub fn new() -> Self {
        let factions = FactionId::major()
            .filter_map(Faction::major)
            .map(|f| (f.id, f))
            .collect();
        Self { factions }
    }

    pub fn get(&self, id: FactionId) -> Option<&Faction> {
        self.factions.get(&id)
    }

    pub fn get_mut(&mut self, id: FactionId) -> Option<&mut Faction> {
        self.factions.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Faction> {
        self.factions.values()
    }

    pub fn len(&self) -> usize {
        self.factions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factions.is_empty()
    }

    /// Refresh territory from the map, run every faction against its
    /// economy in `pools`, then apply commissar morale boosts to the boosted
    /// faction's stations. A faction with no pool only has its territory
    /// refreshed.
    pub fn process_all(
        &mut self,
        turn: u32,
        map: &mut MetroMap,
        active_trades: &[TradeTouch],
        pools: &mut BTreeMap<FactionId, &mut ResourcePool>,
    ) -> Vec<FactionEffect> {
        let mut fired = Vec::new();
        for faction in self.factions.values_mut() {
            let stations = map.stations_by_faction(faction.id);
            let morale_sum: u64 = stations
                .iter()
                .filter_map(|name| map.station(name))
                .map(|s| s.morale as u64)
                .sum();
            faction.total_population = stations
                .iter()
                .filter_map(|name| map.station(name))
                .map(|s| s.population as u64)
                .sum();
            let total_morale = if stations.is_empty() {
                50
            } else {
                (morale_sum / stations.len() as u64) as u32
            };
            faction.controlled_stations = stations.clone();

            let Some(resources) = pools.get_mut(&faction.id) else {
                faction.recent_military_losses = 0;
                continue;
            };
            let mut production = ResourcePool::new();
            for station in stations.iter().filter_map(|name| map.station(name)) {
                for (kind, amount) in station.get_resource_production().amounts() {
                    // station output is never negative
                    let _ = production.add(kind, amount);
                }
            }

            let ctx = MechanicContext {
                controlled_stations: stations,
                total_morale,
                production,
                active_trades: active_trades.to_vec(),
            };
            for (mechanic, effect) in faction.process_turn(turn, resources, &ctx) {
                if let MechanicEffect::MoraleBoost {
                    amount,
                    stations_affected,
                } = effect
                {
                    for name in ctx.controlled_stations.iter().take(stations_affected) {
                        if let Some(station) = map.station_mut(name) {
                            station.adjust_morale(amount as i64);
                        }
                    }
                }
                fired.push(FactionEffect {
                    faction: faction.id,
                    mechanic: mechanic.to_string(),
                    effect,
                });
            }
            faction.recent_military_losses = 0;
        }
        fired
    }

    pub fn record_losses(&mut self, id: FactionId, losses: u32) {
        if let Some(faction) = self.factions.get_mut(&id) {
            faction.recent_military_losses += losses;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::Station;
    use crate::tunnel::Tunnel;

    fn stocked() -> ResourcePool {
        ResourcePool::new()
            .with(ResourceKind::Food, 200)
            .with(ResourceKind::CleanWater, 50)
            .with(ResourceKind::Medicine, 50)
    }

    fn touch(id: &str, origin: &str, destination: &str) -> TradeTouch {
        TradeTouch {
            caravan_id: id.into(),
            origin: origin.into(),
            destination: destination.into(),
            value: 100,
        }
    }

    #[test]
    fn test_manager_builds_five_majors() {
        let manager = FactionManager::new();
        assert_eq!(manager.len(), 5);
        assert!(manager.get(FactionId::Independent).is_none());
        let reich = manager.get(FactionId::FourthReich).unwrap();
        assert_eq!(reich.government, GovernmentType::Fascist);
        assert_eq!(reich.isolationism, 0.6);
    }

    #[test]
    fn test_modifiers_include_stability() {
        let mut rangers = Faction::major(FactionId::Rangers).unwrap();
        rangers.stability = 0.5;
        assert!((rangers.combat_modifier() - 0.1).abs() < 1e-9);
        rangers.stability = 1.0;
        assert!((rangers.combat_modifier() - 0.2).abs() < 1e-9);
        assert!((rangers.diplomacy_modifier() - 0.2).abs() < 1e-9);
        assert_eq!(rangers.trade_modifier(), 0.0);
    }

    #[test]
    fn test_commissariat_bounded_by_food_and_max() {
        let mut red = Faction::major(FactionId::RedLine).unwrap();
        let mut pool = stocked();
        let ctx = MechanicContext {
            controlled_stations: vec!["A".into(), "B".into()],
            total_morale: 60,
            ..Default::default()
        };
        let first = red.process_turn(1, &mut pool, &ctx);
        assert_eq!(
            first,
            vec![(
                "Commissariat",
                MechanicEffect::MoraleBoost {
                    amount: 15,
                    stations_affected: 1
                }
            )]
        );
        assert_eq!(pool.food, 190);

        for turn in 2..10 {
            red.process_turn(turn, &mut pool, &ctx);
        }
        match red.mechanic("Commissariat") {
            Some(Mechanic::Commissariat(c)) => assert_eq!(c.deployed, 5),
            other => panic!("missing commissariat: {:?}", other),
        }
        assert_eq!(pool.food, 150);
        assert_eq!(red.stability, 0.7);
    }

    #[test]
    fn test_commissariat_waits_for_food() {
        let mut red = Faction::major(FactionId::RedLine).unwrap();
        let mut pool = ResourcePool::new().with(ResourceKind::Food, 9);
        assert!(red.process_turn(1, &mut pool, &MechanicContext::default()).is_empty());
        assert_eq!(pool.food, 9);
    }

    #[test]
    fn test_toll_charged_once_per_caravan() {
        let mut hanza = Faction::major(FactionId::Hanza).unwrap();
        let mut pool = stocked();
        let mut ctx = MechanicContext {
            controlled_stations: vec!["Kurskaya".into()],
            total_morale: 50,
            active_trades: vec![
                touch("c1", "VDNKh", "Kurskaya"),
                touch("c2", "VDNKh", "Polis"),
            ],
            ..Default::default()
        };
        let effects = hanza.process_turn(1, &mut pool, &ctx);
        assert_eq!(
            effects[0].1,
            MechanicEffect::TollsCollected {
                mgr: 15,
                trades_affected: 1
            }
        );
        assert_eq!(pool.mgr_rounds, 15);

        // same caravan still travelling
        let effects = hanza.process_turn(2, &mut pool, &ctx);
        assert_eq!(
            effects[0].1,
            MechanicEffect::TollsCollected {
                mgr: 0,
                trades_affected: 0
            }
        );
        assert_eq!(pool.mgr_rounds, 15);

        ctx.active_trades = vec![touch("c3", "Kurskaya", "Polis")];
        hanza.process_turn(3, &mut pool, &ctx);
        assert_eq!(pool.mgr_rounds, 30);
        match hanza.mechanic("Toll System") {
            Some(Mechanic::TollSystem(t)) => {
                assert_eq!(t.total_collected, 30);
                assert_eq!(t.tolled, BTreeSet::from(["c3".to_string()]));
            }
            other => panic!("missing toll system: {:?}", other),
        }
    }

    #[test]
    fn test_purity_and_council_state() {
        let mut purity = PurityDoctrine { purity: 0.95 };
        purity.increase(0.1);
        assert_eq!(purity.purity, 1.0);

        let mut council = CouncilDemocracy {
            approval: 0.05,
            pending_decisions: vec!["ration water".into()],
        };
        council.vote(false);
        assert_eq!(council.approval, 0.0);
        let mut mechanic = Mechanic::CouncilDemocracy(council);
        let effect = mechanic.apply_effect(&mut ResourcePool::new(), &MechanicContext::default());
        assert_eq!(
            effect,
            MechanicEffect::CouncilEfficiency {
                efficiency_bonus: 0,
                decisions_processed: 1
            }
        );
    }

    #[test]
    fn test_stability_drops_with_shortages_and_losses() {
        let mut polis = Faction::major(FactionId::Polis).unwrap();
        polis.recent_military_losses = 4;
        let ctx = MechanicContext {
            total_morale: 20,
            ..Default::default()
        };
        polis.process_turn(1, &mut ResourcePool::new(), &ctx);
        // 0.7 - 0.03 - 3 × 0.01 - 0.02
        assert!((polis.stability - 0.62).abs() < 1e-9, "{}", polis.stability);
    }

    #[test]
    fn test_bonus_is_share_of_station_output() {
        let mut reich = Faction::major(FactionId::FourthReich).unwrap();
        let mut pool = stocked().with(ResourceKind::Scrap, 100);
        let ctx = MechanicContext {
            production: ResourcePool::new().with(ResourceKind::Scrap, 50),
            ..Default::default()
        };
        reich.process_turn(1, &mut pool, &ctx);
        assert_eq!(pool.scrap, 110);

        // no output, no bonus; the stock itself never compounds
        reich.process_turn(2, &mut pool, &MechanicContext::default());
        assert_eq!(pool.scrap, 110);

        // negative modifiers are not charged against the pool
        let mut red = Faction::major(FactionId::RedLine).unwrap();
        red.mechanics.clear();
        let mut red_pool = stocked();
        let ctx = MechanicContext {
            production: ResourcePool::new().with(ResourceKind::Food, 50),
            ..Default::default()
        };
        red.process_turn(1, &mut red_pool, &ctx);
        assert_eq!(red_pool.food, 200);
    }

    #[test]
    fn test_process_all_runs_only_funded_factions() {
        let mut map = MetroMap::from_parts(
            vec![
                Station::new("A", (0.0, 0.0), "red")
                    .with_faction(FactionId::RedLine)
                    .with_morale(50),
                Station::new("B", (1.0, 0.0), "red")
                    .with_faction(FactionId::Polis)
                    .with_morale(50),
            ],
            vec![Tunnel::new("A", "B")],
        )
        .unwrap();
        let mut manager = FactionManager::new();
        let mut red_pool = stocked();
        let mut pools: BTreeMap<FactionId, &mut ResourcePool> = BTreeMap::new();
        pools.insert(FactionId::RedLine, &mut red_pool);

        let fired = manager.process_all(1, &mut map, &[], &mut pools);
        drop(pools);

        assert_eq!(
            fired,
            vec![FactionEffect {
                faction: FactionId::RedLine,
                mechanic: "Commissariat".into(),
                effect: MechanicEffect::MoraleBoost {
                    amount: 15,
                    stations_affected: 1
                },
            }]
        );
        assert_eq!(red_pool.food, 190);
        assert_eq!(map.station("A").unwrap().morale, 65);
        let red = manager.get(FactionId::RedLine).unwrap();
        assert_eq!(red.controlled_stations, vec!["A".to_string()]);
        assert_eq!(red.stability, 0.7);

        // Polis has territory but no economy attached: untouched
        let polis = manager.get(FactionId::Polis).unwrap();
        assert_eq!(polis.controlled_stations, vec!["B".to_string()]);
        assert_eq!(polis.stability, 0.7);
    }
}
