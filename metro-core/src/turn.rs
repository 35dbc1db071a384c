//! The fixed per-turn pipeline.
//!
//! Every subsystem runs once per `advance_turn`, in the order below, drawing
//! from a single random stream derived from the seed and the turn number.
//! Replaying a saved game from the same turn therefore reproduces the turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ai::{AiActionRecord, AiWorld};
use crate::building::{BuildingSystem, UpkeepReport};
use crate::events::EventContext;
use crate::faction::FactionEffect;
use crate::infrastructure::BuildingType;
use crate::military::MaintenanceReport;
use crate::production::ProductionOutcome;
use crate::resources::ResourcePool;
use crate::state::{GamePhase, GameState};
use crate::trade::CaravanEvent;
use crate::types::FactionId;
use crate::victory::VictoryResult;

/// Everything that happened during one turn advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    pub turn: u32,
    pub production: ProductionOutcome,
    pub population_change: i64,
    pub tunnels_changed: usize,
    pub faction_effects: Vec<FactionEffect>,
    pub caravan_events: Vec<CaravanEvent>,
    pub military: MaintenanceReport,
    pub completed_buildings: Vec<(String, BuildingType)>,
    pub upkeep: UpkeepReport,
    pub triggered_events: Vec<String>,
    pub ai_actions: Vec<AiActionRecord>,
    pub stations_lost: Vec<String>,
    pub victory: Vec<VictoryResult>,
    pub game_ended: bool,
}

impl GameState {
    /// Advance one turn: production, stations, tunnels, factions,
    /// statistics, scouting, trade, diplomacy, military upkeep, construction,
    /// building upkeep, events, AI and finally victory.
    pub fn advance_turn(&mut self) -> TurnReport {
        self.turn += 1;
        self.phase = GamePhase::Resolution;
        self.actions_this_turn = 0;
        let turn = self.turn;
        let mut rng = self.turn_rng();

        // 1. Production and consumption
        let events = &self.events;
        let production = self.production.process_faction(
            &mut self.map,
            &self.player.controlled_stations,
            &mut self.player.resources,
            turn,
            |kind| events.consumption_multiplier(kind),
        );

        // 2. Player stations
        let mut population_change = 0;
        for name in &self.player.controlled_stations {
            if let Some(station) = self.map.station_mut(name) {
                population_change += station.process_turn();
            }
        }

        // 3. Tunnels
        let tunnels_changed = self.map.process_tunnels(turn, &mut rng);

        // 4. Faction mechanics, each against the pool that runs its economy
        let active_trades = self.trade.active_trades();
        let mut pools: BTreeMap<FactionId, &mut ResourcePool> = self
            .ai
            .factions
            .iter_mut()
            .map(|(id, ai)| (*id, &mut ai.resources))
            .collect();
        pools.insert(self.player.faction, &mut self.player.resources);
        let faction_effects = self
            .factions
            .process_all(turn, &mut self.map, &active_trades, &mut pools);

        // 5. Statistics
        self.update_statistics();

        // 6. Scouting
        self.scouting
            .process_turn(turn, &self.map, self.player.faction, &mut rng);

        // 7. Caravans, markets and offers
        let caravan_events =
            self.trade
                .process_turn(&self.map, turn, &mut self.player.resources, &mut rng);

        self.statistics.trades_completed += caravan_events
            .iter()
            .filter(|e| matches!(e, CaravanEvent::Completed { .. }))
            .count() as u32;

        // 8. Diplomacy drift and proposal expiry
        self.diplomacy.process_turn(turn);

        // 9. Military upkeep
        let military =
            self.roster
                .process_maintenance(self.player.faction, &mut self.player.resources, turn);

        // 10. Construction queue
        let completed_buildings = self.buildings.process_turn(&mut self.map, turn);

        // 11. Building upkeep
        let upkeep = BuildingSystem::process_maintenance(
            &mut self.map,
            &self.player.controlled_stations,
            &mut self.player.resources,
            turn,
        );

        // 12. Events
        let military_units = self.roster.units_of(self.player.faction).count();
        let ctx = EventContext {
            faction: self.player.faction,
            stations: &self.player.controlled_stations,
            military_units,
        };
        let triggered_events =
            self.events
                .process_turn(turn, &mut self.map, &mut self.diplomacy, &ctx, &mut rng);

        // 13. AI factions
        let mut world = AiWorld {
            map: &mut self.map,
            roster: &mut self.roster,
            diplomacy: &mut self.diplomacy,
            combat: &mut self.combat,
            factions: &mut self.factions,
        };
        let ai_actions = self.ai.process_turn(turn, &mut world, &mut rng);
        self.roster.remove_destroyed();
        self.roster.disband_stranded(&self.map);

        // Events and AI attacks may have moved stations
        let stations_lost = self.refresh_controlled_stations();
        self.update_statistics();

        // 14. Victory
        let total_production: i64 = production
            .reports
            .iter()
            .map(|r| r.production.amounts().map(|(_, amount)| amount).sum::<i64>())
            .sum();
        let positive_net = production.net.values().filter(|v| **v > 0).count();
        let metrics = self.victory_metrics(total_production, positive_net);
        let victory = self.victory.check(turn, &metrics);
        let game_ended = self.victory.is_game_ended();

        self.phase = GamePhase::Planning;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "turn",
            turn = turn,
            stations = self.player.controlled_stations.len(),
            population = self.statistics.total_population,
            food = self.player.resources.food,
            clean_water = self.player.resources.clean_water,
            scrap = self.player.resources.scrap,
            medicine = self.player.resources.medicine,
            mgr_rounds = self.player.resources.mgr_rounds,
            events = triggered_events.len(),
            ai_actions = ai_actions.len(),
            game_ended = game_ended,
        );
        #[cfg(feature = "instrument")]
        for name in &stations_lost {
            tracing::warn!(
                target: "turn",
                turn = turn,
                station = name.as_str(),
                "player lost control of station"
            );
        }

        TurnReport {
            turn,
            production,
            population_change,
            tunnels_changed,
            faction_effects,
            caravan_events,
            military,
            completed_buildings,
            upkeep,
            triggered_events,
            ai_actions,
            stations_lost,
            victory,
            game_ended,
        }
    }
}
