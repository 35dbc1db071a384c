// Tunnel type - an undirected edge between two stations

use rand::Rng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::types::TravelerType;

/// Idle turns before an infested tunnel may clear on its own
pub const NATURAL_CLEAR_IDLE_TURNS: u32 = 10;

/// Per-turn chance that an idle infested tunnel clears
pub const NATURAL_CLEAR_CHANCE: f64 = 0.1;

// ============================================================================
// Tunnel State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    Clear,
    Hazardous,
    Infested,
    Anomalous,
    Collapsed,
}

impl TunnelState {
    pub fn all() -> impl Iterator<Item = TunnelState> {
        [
            TunnelState::Clear,
            TunnelState::Hazardous,
            TunnelState::Infested,
            TunnelState::Anomalous,
            TunnelState::Collapsed,
        ]
        .into_iter()
    }

    /// Travel cost multiplier; `None` means impassable
    pub fn cost_multiplier(self) -> Option<f64> {
        match self {
            TunnelState::Clear => Some(1.0),
            TunnelState::Hazardous => Some(1.5),
            TunnelState::Infested => Some(2.0),
            TunnelState::Anomalous => Some(3.0),
            TunnelState::Collapsed => None,
        }
    }

    pub fn base_danger(self) -> u32 {
        match self {
            TunnelState::Clear => 0,
            TunnelState::Hazardous => 30,
            TunnelState::Infested => 60,
            TunnelState::Anomalous => 80,
            TunnelState::Collapsed => 100,
        }
    }
}

// ============================================================================
// Tunnel
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunnel {
    pub station_a: String,
    pub station_b: String,
    pub state: TunnelState,
    pub hazard_level: u32,
    pub metro_line: String,
    pub blocked_turns_remaining: u32,
    pub last_cleared_turn: u32,
}

impl Tunnel {
    pub fn new(station_a: impl Into<String>, station_b: impl Into<String>) -> Self {
        Self {
            station_a: station_a.into(),
            station_b: station_b.into(),
            state: TunnelState::Clear,
            hazard_level: 0,
            metro_line: String::new(),
            blocked_turns_remaining: 0,
            last_cleared_turn: 0,
        }
    }

    pub fn with_state(mut self, state: TunnelState) -> Self {
        self.state = state;
        self
    }

    pub fn with_hazard(mut self, hazard_level: u32) -> Self {
        self.hazard_level = hazard_level.min(100);
        self
    }

    pub fn with_line(mut self, metro_line: impl Into<String>) -> Self {
        self.metro_line = metro_line.into();
        self
    }

    /// True if this tunnel joins the two stations, in either order
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.station_a == a && self.station_b == b) || (self.station_a == b && self.station_b == a)
    }

    pub fn touches(&self, station: &str) -> bool {
        self.station_a == station || self.station_b == station
    }

    pub fn other_end(&self, station: &str) -> Option<&str> {
        if self.station_a == station {
            Some(&self.station_b)
        } else if self.station_b == station {
            Some(&self.station_a)
        } else {
            None
        }
    }

    pub fn is_passable(&self, traveler: TravelerType) -> bool {
        match self.state {
            TunnelState::Collapsed => false,
            TunnelState::Anomalous => traveler.is_privileged(),
            TunnelState::Infested => traveler != TravelerType::Civilian,
            TunnelState::Clear | TunnelState::Hazardous => true,
        }
    }

    /// `max(1, floor(base × state multiplier × (1 + hazard/100)))`, or `None` if impassable
    pub fn travel_cost(&self, traveler: TravelerType) -> Option<u32> {
        if !self.is_passable(traveler) {
            return None;
        }
        let multiplier = self.state.cost_multiplier()?;
        let hazard = 1.0 + self.hazard_level as f64 / 100.0;
        let cost = (traveler.base_cost() as f64 * multiplier * hazard).floor() as u32;
        Some(cost.max(1))
    }

    pub fn danger_level(&self) -> u32 {
        (self.state.base_danger() + self.hazard_level).min(100)
    }

    pub fn update_state(&mut self, new_state: TunnelState) {
        self.state = new_state;
        if new_state == TunnelState::Clear {
            self.blocked_turns_remaining = 0;
        }
    }

    pub fn set_hazard_level(&mut self, hazard_level: u32) {
        self.hazard_level = hazard_level.min(100);
    }

    /// Force a collapse that lifts after `turns` turns
    pub fn apply_temporary_blockage(&mut self, turns: u32) {
        if turns > 0 {
            self.blocked_turns_remaining = turns;
            self.state = TunnelState::Collapsed;
        }
    }

    /// Advance blockage countdown and natural clearing. Returns true if the state changed.
    pub fn process_turn<R: Rng>(&mut self, turn: u32, rng: &mut R) -> bool {
        if self.blocked_turns_remaining > 0 {
            self.blocked_turns_remaining -= 1;
            if self.blocked_turns_remaining == 0 {
                self.update_state(TunnelState::Clear);
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "tunnel",
                    turn = turn,
                    station_a = self.station_a.as_str(),
                    station_b = self.station_b.as_str(),
                    change = "blockage_lifted",
                );
                return true;
            }
        }

        if self.state == TunnelState::Infested
            && turn.saturating_sub(self.last_cleared_turn) > NATURAL_CLEAR_IDLE_TURNS
        {
            let roll: f64 = rng.random();
            if roll < NATURAL_CLEAR_CHANCE {
                self.update_state(TunnelState::Clear);
                self.last_cleared_turn = turn;
                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "tunnel",
                    turn = turn,
                    station_a = self.station_a.as_str(),
                    station_b = self.station_b.as_str(),
                    change = "infestation_cleared",
                );
                return true;
            }
        }
        false
    }

    /// Military sweep: infested or hazardous tunnels become clear
    pub fn clear_threats(&mut self, turn: u32) -> SimResult<()> {
        match self.state {
            TunnelState::Infested | TunnelState::Hazardous => {
                self.update_state(TunnelState::Clear);
                self.last_cleared_turn = turn;
                Ok(())
            }
            other => Err(SimError::illegal(format!(
                "tunnel {}-{} is {:?}, nothing to clear",
                self.station_a, self.station_b, other
            ))),
        }
    }
}
