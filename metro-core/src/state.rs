use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::ai::AiSystem;
use crate::building::BuildingSystem;
use crate::combat::CombatSystem;
use crate::config::SimConfig;
use crate::diplomacy::DiplomacySystem;
use crate::error::SimResult;
use crate::events::EventSystem;
use crate::faction::FactionManager;
use crate::infrastructure::BuildingType;
use crate::map_data::create_metro_map;
use crate::metro_map::MetroMap;
use crate::military::MilitaryRoster;
use crate::production::ProductionSystem;
use crate::resources::ResourcePool;
use crate::scouting::ScoutingSystem;
use crate::trade::TradeSystem;
use crate::types::FactionId;
use crate::victory::{VictoryMetrics, VictorySystem};

// ============================================================================
// Phase / Statistics / Player
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Planning,
    Action,
    Resolution,
}

/// Running totals for the player, read by victory checks and snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct GameStatistics {
    pub stations_controlled: usize,
    pub total_population: u64,
    pub battles_won: u32,
    pub battles_lost: u32,
    pub trades_completed: u32,
    pub diplomatic_agreements: u32,
    pub units_recruited: u32,
    pub total_military_strength: i64,
    pub events_resolved: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub faction: FactionId,
    pub controlled_stations: Vec<String>,
    pub resources: ResourcePool,
}

// ============================================================================
// Game State - The complete simulation state
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub turn: u32,
    pub phase: GamePhase,
    pub config: SimConfig,
    pub statistics: GameStatistics,
    pub player: PlayerState,
    pub map: MetroMap,
    pub factions: FactionManager,
    pub scouting: ScoutingSystem,
    pub diplomacy: DiplomacySystem,
    pub trade: TradeSystem,
    pub roster: MilitaryRoster,
    pub combat: CombatSystem,
    pub buildings: BuildingSystem,
    pub production: ProductionSystem,
    pub events: EventSystem,
    pub ai: AiSystem,
    pub victory: VictorySystem,
    /// Player actions taken since the last turn advance; each draws from its
    /// own random stream
    pub actions_this_turn: u64,
}

impl GameState {
    /// Default fifteen-station map with the given tunables
    pub fn new(config: SimConfig) -> SimResult<Self> {
        let map = create_metro_map()?;
        Ok(Self::with_map(map, config))
    }

    pub fn with_map(map: MetroMap, config: SimConfig) -> Self {
        let faction = config.player_faction;
        let controlled_stations = map.stations_by_faction(faction);

        let mut scouting = ScoutingSystem::new(config.scout_range, config.intel_decay_turns);
        let mut setup_rng = stream_rng(config.seed, 0, 0);
        scouting.initialize_knowledge(&map, faction, &mut setup_rng);

        let mut events = EventSystem::new();
        for (&category, &modifier) in &config.event_category_modifiers {
            events.set_category_modifier(category, modifier);
        }

        let ai = AiSystem::new(&map, faction)
            .with_tuning(config.ai_action_probability, config.ai_max_actions_per_turn);

        let mut state = Self {
            turn: 1,
            phase: GamePhase::Planning,
            statistics: GameStatistics::default(),
            player: PlayerState {
                faction,
                controlled_stations,
                resources: config.starting_resources(),
            },
            factions: FactionManager::new(),
            scouting,
            diplomacy: DiplomacySystem::new(),
            trade: TradeSystem::new(
                config.caravan_travel_time,
                config.trade_cost_mgr,
                config.trade_delivery_food,
            ),
            roster: MilitaryRoster::new(),
            combat: CombatSystem::new(),
            buildings: BuildingSystem::new(),
            production: ProductionSystem::new(),
            events,
            ai,
            victory: VictorySystem::with_history_len(config.victory_history_len),
            actions_this_turn: 0,
            map,
            config,
        };
        state.update_statistics();

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "turn",
            turn = state.turn,
            player = state.player.faction.name(),
            stations = state.player.controlled_stations.len(),
            seed = state.config.seed,
            "game initialized"
        );
        state
    }

    // === Random streams ===

    /// Stream for the turn-advance pipeline of `turn`
    pub(crate) fn turn_rng(&self) -> StdRng {
        stream_rng(self.config.seed, self.turn, 0)
    }

    /// Fresh stream for the next player action of the current turn
    pub(crate) fn next_action_rng(&mut self) -> StdRng {
        self.actions_this_turn += 1;
        stream_rng(self.config.seed, self.turn, self.actions_this_turn)
    }

    // === Queries ===

    pub fn is_game_ended(&self) -> bool {
        self.victory.is_game_ended()
    }

    pub fn controls(&self, station: &str) -> bool {
        self.map
            .station(station)
            .is_some_and(|s| s.controlling_faction == self.player.faction)
    }

    pub fn visible_stations(&self) -> Vec<String> {
        self.scouting.visible_stations()
    }

    /// Re-derive the player's territory from station ownership
    pub fn refresh_controlled_stations(&mut self) -> Vec<String> {
        let current = self.map.stations_by_faction(self.player.faction);
        let lost: Vec<String> = self
            .player
            .controlled_stations
            .iter()
            .filter(|s| !current.contains(s))
            .cloned()
            .collect();
        self.player.controlled_stations = current;
        lost
    }

    pub fn update_statistics(&mut self) {
        self.statistics.stations_controlled = self.player.controlled_stations.len();
        self.statistics.total_population = self
            .player
            .controlled_stations
            .iter()
            .filter_map(|s| self.map.station(s))
            .map(|s| s.population as u64)
            .sum();
        self.statistics.total_military_strength =
            self.roster.faction_strength(self.player.faction) as i64;
    }

    pub fn libraries_built(&self) -> u32 {
        self.player
            .controlled_stations
            .iter()
            .filter_map(|s| self.map.station(s))
            .filter(|s| s.has_infrastructure(BuildingType::Library))
            .count() as u32
    }

    /// Inputs for a victory check; production figures come from this turn's
    /// production step
    pub fn victory_metrics(&self, total_production: i64, positive_net_resources: usize) -> VictoryMetrics {
        VictoryMetrics {
            controlled_stations: self.player.controlled_stations.len(),
            total_population: self.statistics.total_population,
            diplomatic_agreements: self.statistics.diplomatic_agreements,
            military_strength: self.statistics.total_military_strength,
            battles_won: self.statistics.battles_won,
            trades_completed: self.statistics.trades_completed,
            mgr_reserves: self.player.resources.mgr_rounds,
            total_production,
            positive_net_resources,
            libraries_built: self.libraries_built(),
        }
    }
}

/// Deterministic sub-stream of the configured seed. Salt 0 is the turn
/// pipeline; player actions use 1, 2, ...
pub(crate) fn stream_rng(seed: u64, turn: u32, salt: u64) -> StdRng {
    let mixed = seed
        ^ (turn as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ salt.wrapping_mul(0xD1B5_4A32_D192_ED03);
    StdRng::seed_from_u64(mixed)
}
