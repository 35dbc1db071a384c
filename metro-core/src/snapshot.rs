// ============================================================================
// Serializable State Snapshot for the presentation layer
// ============================================================================

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::events::EventInfo;
use crate::resources::ResourcePool;
use crate::state::{GamePhase, GameState, GameStatistics};
use crate::station::StationInfo;
use crate::trade::{Caravan, CaravanStatus, TradeRoute};
use crate::tunnel::TunnelState;
use crate::types::FactionId;
use crate::victory::VictoryInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct TunnelSnapshot {
    pub station_a: String,
    pub station_b: String,
    pub state: TunnelState,
    pub danger_level: u32,
    pub blocked_turns_remaining: u32,
}

/// Read-only copy of everything a renderer needs between turn advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct StateSnapshot {
    pub turn: u32,
    pub phase: GamePhase,
    pub player_faction: FactionId,
    pub controlled_stations: Vec<String>,
    pub player_resources: ResourcePool,
    pub stations: Vec<StationInfo>,
    pub tunnels: Vec<TunnelSnapshot>,
    pub visible_stations: Vec<String>,
    pub caravans: Vec<Caravan>,
    pub routes: Vec<TradeRoute>,
    pub victory: VictoryInfo,
    pub pending_events: Vec<EventInfo>,
    pub statistics: GameStatistics,
}

impl GameState {
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            turn: self.turn,
            phase: self.phase,
            player_faction: self.player.faction,
            controlled_stations: self.player.controlled_stations.clone(),
            player_resources: self.player.resources.clone(),
            stations: self.map.stations().map(|s| s.info()).collect(),
            tunnels: self
                .map
                .tunnels()
                .iter()
                .map(|t| TunnelSnapshot {
                    station_a: t.station_a.clone(),
                    station_b: t.station_b.clone(),
                    state: t.state,
                    danger_level: t.danger_level(),
                    blocked_turns_remaining: t.blocked_turns_remaining,
                })
                .collect(),
            visible_stations: self.visible_stations(),
            caravans: self
                .trade
                .caravans
                .values()
                .filter(|c| c.status == CaravanStatus::Traveling)
                .cloned()
                .collect(),
            routes: self.trade.routes.values().cloned().collect(),
            victory: self.victory.info(),
            pending_events: self.events.pending().map(|e| e.info()).collect(),
            statistics: self.statistics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::actions::Action;
    use crate::types::ActionKind;
    use crate::config::SimConfig;
    use crate::state::GameState;

    #[test]
    fn test_snapshot_reflects_state() {
        let mut state = GameState::new(SimConfig::default()).unwrap();
        state
            .execute_action(&Action::new(ActionKind::Trade, "VDNKh").targeting("Polis"))
            .unwrap();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.turn, 1);
        assert_eq!(snapshot.stations.len(), 15);
        assert_eq!(snapshot.tunnels.len(), 18);
        assert_eq!(snapshot.caravans.len(), 1);
        assert_eq!(snapshot.controlled_stations.len(), 2);
        assert_eq!(snapshot.victory.conditions.len(), 5);
        assert!(!snapshot.victory.game_ended);
        assert!(snapshot.visible_stations.contains(&"Park Pobedy".to_string()));
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = GameState::new(SimConfig::default()).unwrap();
        let json = serde_json::to_string(&state.snapshot()).unwrap();
        assert!(json.contains("\"controlled_stations\""));
    }
}
