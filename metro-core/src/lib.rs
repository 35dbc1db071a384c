use wasm_bindgen::prelude::*;

pub mod actions;
pub mod ai;
pub mod building;
pub mod combat;
pub mod config;
pub mod diplomacy;
pub mod error;
pub mod events;
pub mod faction;
pub mod infrastructure;
pub mod map_data;
pub mod metro_map;
pub mod military;
pub mod persistence;
pub mod production;
pub mod resources;
pub mod scouting;
pub mod snapshot;
pub mod state;
pub mod station;
pub mod trade;
pub mod tunnel;
pub mod turn;
pub mod types;
pub mod victory;

pub use actions::{Action, ActionDetail, ActionOutcome, ActionReport};
pub use config::{ConfigError, SimConfig};
pub use error::{ResourceError, Shortfall, SimError, SimResult};
pub use map_data::create_metro_map;
pub use metro_map::MetroMap;
pub use persistence::{IntegrityIssue, LoadError, SaveDocument};
pub use resources::ResourcePool;
pub use snapshot::StateSnapshot;
pub use state::{GamePhase, GameState, GameStatistics};
pub use station::Station;
pub use tunnel::{Tunnel, TunnelState};
pub use turn::TurnReport;
pub use types::{ActionKind, FactionId, ResourceKind, TravelerType};
pub use victory::{VictoryInfo, VictoryKind, VictoryStatus};

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - Simulation
// ============================================================================

#[wasm_bindgen]
pub struct Simulation {
    state: GameState,
}

#[wasm_bindgen]
impl Simulation {
    /// Default map, default configuration
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<Simulation, JsError> {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();
        Self::from_config(SimConfig::default())
    }

    #[wasm_bindgen]
    pub fn with_seed(seed: u64) -> Result<Simulation, JsError> {
        console_error_panic_hook::set_once();
        Self::from_config(SimConfig::default().with_seed(seed))
    }

    /// Tunables as a JSON object; unnamed fields keep their defaults
    #[wasm_bindgen]
    pub fn with_config(json: &str) -> Result<Simulation, JsError> {
        console_error_panic_hook::set_once();
        Self::from_config(SimConfig::from_json_str(json)?)
    }

    /// Run the full turn pipeline once
    #[wasm_bindgen]
    pub fn advance_turn(&mut self) {
        self.state.advance_turn();
    }

    #[wasm_bindgen]
    pub fn get_turn(&self) -> u32 {
        self.state.turn
    }

    #[wasm_bindgen]
    pub fn is_game_ended(&self) -> bool {
        self.state.is_game_ended()
    }

    /// Rejected or unknown actions come back with `success: false` and the
    /// reason in `message`.
    #[wasm_bindgen]
    pub fn execute_action(&mut self, name: &str, origin: &str, target: Option<String>) -> ActionReport {
        match Action::parse(name, origin, target.as_deref()) {
            Ok(action) => ActionReport::from_result(Some(action.kind), self.state.execute_action(&action)),
            Err(err) => ActionReport::from_result(None, Err(err)),
        }
    }

    #[wasm_bindgen]
    pub fn resolve_event_choice(&mut self, event_id: &str, choice_id: &str) -> ActionReport {
        ActionReport::from_result(
            Some(ActionKind::ResolveEvent),
            self.state.resolve_event_choice(event_id, choice_id),
        )
    }

    /// Get a snapshot of the current state for rendering
    #[wasm_bindgen]
    pub fn get_state_snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    #[wasm_bindgen]
    pub fn get_visible_stations(&self) -> js_sys::Array {
        self.state
            .visible_stations()
            .into_iter()
            .map(JsValue::from)
            .collect()
    }

    #[wasm_bindgen]
    pub fn get_victory_info(&self) -> VictoryInfo {
        self.state.victory.info()
    }

    /// Per-turn victory progress for the last `turns` turns, oldest first
    #[wasm_bindgen]
    pub fn get_progress_history(&self, turns: usize) -> Result<JsValue, JsError> {
        let history = self.state.victory.progress_history(turns);
        Ok(serde_wasm_bindgen::to_value(history)?)
    }

    #[wasm_bindgen]
    pub fn save(&self) -> Result<String, JsError> {
        Ok(self.state.save()?)
    }

    /// Replace the running game. A rejected save leaves the game untouched.
    #[wasm_bindgen]
    pub fn load(&mut self, json: &str) -> Result<(), JsError> {
        Ok(self.state.load(json)?)
    }
}

impl Simulation {
    fn from_config(config: SimConfig) -> Result<Simulation, JsError> {
        config.validate()?;
        Ok(Self {
            state: GameState::new(config)?,
        })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }
}
