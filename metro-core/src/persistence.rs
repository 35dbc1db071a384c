//! Save and load of the whole simulation as one JSON document.
//!
//! A load never partially applies: the document is parsed into a fresh
//! `GameState`, its derived indexes are rebuilt, and the invariants are
//! checked. Only a clean state replaces the live one.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::ResourcePool;
use crate::state::GameState;
use crate::types::{FactionId, ResourceKind};

pub const SAVE_VERSION: u32 = 1;

/// Top-level save file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveDocument {
    pub version: u32,
    pub state: GameState,
}

/// One broken invariant found in a loaded state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IntegrityIssue {
    #[error("{owner} holds {amount} {kind}")]
    NegativeResource {
        owner: String,
        kind: ResourceKind,
        amount: i64,
    },
    #[error("player controls unknown station {0}")]
    UnknownStation(String),
    #[error("player lists {station} but it belongs to {owner:?}")]
    StationNotOwned { station: String, owner: FactionId },
    #[error("{faction:?} unit stationed at {station}, which it does not control")]
    UnitAtUncontrolledStation { faction: FactionId, station: String },
    #[error("game marked ended without a victory type")]
    EndedWithoutVictory,
    #[error("tunnel {station_a} - {station_b} references a missing station")]
    TunnelEndpointMissing { station_a: String, station_b: String },
    #[error("caravan {caravan} path references missing station {station}")]
    CaravanEndpointMissing { caravan: String, station: String },
    #[error("construction at missing station {0}")]
    ProjectAtMissingStation(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to parse save: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported save version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("save failed {} integrity checks", .0.len())]
    Integrity(Vec<IntegrityIssue>),
}

fn negative_amounts(owner: &str, pool: &ResourcePool, issues: &mut Vec<IntegrityIssue>) {
    issues.extend(
        pool.amounts()
            .filter(|(_, amount)| *amount < 0)
            .map(|(kind, amount)| IntegrityIssue::NegativeResource {
                owner: owner.to_string(),
                kind,
                amount,
            }),
    );
}

impl GameState {
    pub fn to_save_document(&self) -> SaveDocument {
        SaveDocument {
            version: SAVE_VERSION,
            state: self.clone(),
        }
    }

    pub fn save(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(&self.to_save_document())?;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "persistence",
            turn = self.turn,
            bytes = json.len(),
            "game saved"
        );
        Ok(json)
    }

    /// Parse and validate a save without touching any live state
    pub fn from_save(json: &str) -> Result<GameState, LoadError> {
        let document: SaveDocument = serde_json::from_str(json)?;
        if document.version != SAVE_VERSION {
            return Err(LoadError::UnsupportedVersion {
                found: document.version,
                expected: SAVE_VERSION,
            });
        }
        let mut state = document.state;
        state.map.rebuild_index();

        let issues = state.validate_integrity();
        if !issues.is_empty() {
            #[cfg(feature = "instrument")]
            for issue in &issues {
                tracing::warn!(target: "persistence", issue = %issue, "integrity check failed");
            }
            return Err(LoadError::Integrity(issues));
        }
        Ok(state)
    }

    /// Replace this state with the saved one. On any error the current state
    /// is left exactly as it was.
    pub fn load(&mut self, json: &str) -> Result<(), LoadError> {
        let loaded = Self::from_save(json)?;
        *self = loaded;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "persistence",
            turn = self.turn,
            player = self.player.faction.name(),
            "game loaded"
        );
        Ok(())
    }

    /// Every invariant a consistent state must hold. Reports, never repairs.
    pub fn validate_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        negative_amounts("player", &self.player.resources, &mut issues);
        for station in self.map.stations() {
            negative_amounts(&station.name, &station.resources, &mut issues);
        }
        for (faction, ai) in &self.ai.factions {
            negative_amounts(faction.name(), &ai.resources, &mut issues);
        }

        for name in &self.player.controlled_stations {
            match self.map.station(name) {
                None => issues.push(IntegrityIssue::UnknownStation(name.clone())),
                Some(station) if station.controlling_faction != self.player.faction => {
                    issues.push(IntegrityIssue::StationNotOwned {
                        station: name.clone(),
                        owner: station.controlling_faction,
                    })
                }
                Some(_) => {}
            }
        }

        for unit in self.roster.units.values() {
            let held = self
                .map
                .station(&unit.station)
                .is_some_and(|s| s.controlling_faction == unit.faction);
            if !held {
                issues.push(IntegrityIssue::UnitAtUncontrolledStation {
                    faction: unit.faction,
                    station: unit.station.clone(),
                });
            }
        }

        if self.victory.game_ended && self.victory.victory_achieved.is_none() {
            issues.push(IntegrityIssue::EndedWithoutVictory);
        }

        for tunnel in self.map.tunnels() {
            if !self.map.contains(&tunnel.station_a) || !self.map.contains(&tunnel.station_b) {
                issues.push(IntegrityIssue::TunnelEndpointMissing {
                    station_a: tunnel.station_a.clone(),
                    station_b: tunnel.station_b.clone(),
                });
            }
        }

        for caravan in self.trade.caravans.values() {
            let endpoints = [&caravan.origin, &caravan.destination];
            for station in endpoints.into_iter().chain(caravan.path.iter()) {
                if !self.map.contains(station) {
                    issues.push(IntegrityIssue::CaravanEndpointMissing {
                        caravan: caravan.id.clone(),
                        station: station.clone(),
                    });
                }
            }
        }

        for project in &self.buildings.projects {
            if !self.map.contains(&project.station) {
                issues.push(IntegrityIssue::ProjectAtMissingStation(project.station.clone()));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::types::ActionKind;
    use crate::config::SimConfig;
    use serde_json::Value;

    fn played(turns: usize) -> GameState {
        let mut state = GameState::new(SimConfig::default()).unwrap();
        state
            .execute_action(&Action::new(ActionKind::Trade, "VDNKh").targeting("Polis"))
            .unwrap();
        for _ in 0..turns {
            state.advance_turn();
        }
        state
    }

    fn corrupt(state: &GameState, edit: impl FnOnce(&mut Value)) -> String {
        let mut value = serde_json::to_value(state.to_save_document()).unwrap();
        edit(&mut value);
        serde_json::to_string(&value).unwrap()
    }

    #[test]
    fn test_round_trip_restores_everything() {
        let state = played(4);
        let json = state.save().unwrap();

        let mut fresh = GameState::new(SimConfig::default().with_seed(1)).unwrap();
        fresh.load(&json).unwrap();
        assert_eq!(fresh.turn, state.turn);
        assert_eq!(fresh.snapshot(), state.snapshot());
        assert_eq!(fresh.map, state.map);
        assert_eq!(fresh.roster, state.roster);
        assert_eq!(fresh.save().unwrap(), json);
        // the adjacency index is rebuilt
        assert!(
            fresh
                .map
                .find_path("VDNKh", "Polis", crate::types::TravelerType::Caravan, false)
                .is_some()
        );
    }

    #[test]
    fn test_replays_from_one_save_match() {
        let json = played(3).save().unwrap();
        let mut a = GameState::from_save(&json).unwrap();
        let mut b = GameState::from_save(&json).unwrap();
        for _ in 0..5 {
            assert_eq!(a.advance_turn(), b.advance_turn());
        }
        assert_eq!(a.save().unwrap(), b.save().unwrap());
    }

    #[test]
    fn test_negative_resources_reject_load() {
        let mut state = played(1);
        let before = state.save().unwrap();
        let json = corrupt(&state, |v| v["state"]["player"]["resources"]["food"] = (-5).into());

        let err = state.load(&json).unwrap_err();
        let LoadError::Integrity(issues) = err else {
            panic!("expected integrity failure, got {:?}", err);
        };
        assert_eq!(
            issues,
            vec![IntegrityIssue::NegativeResource {
                owner: "player".into(),
                kind: ResourceKind::Food,
                amount: -5,
            }]
        );
        // nothing was applied
        assert_eq!(state.save().unwrap(), before);
    }

    #[test]
    fn test_player_station_ownership_is_checked() {
        let state = played(0);
        let json = corrupt(&state, |v| {
            v["state"]["player"]["controlled_stations"]
                .as_array_mut()
                .unwrap()
                .push("Polis".into());
        });
        let Err(LoadError::Integrity(issues)) = GameState::from_save(&json) else {
            panic!("load should fail");
        };
        assert!(matches!(
            &issues[..],
            [IntegrityIssue::StationNotOwned { station, owner: FactionId::Polis }] if station == "Polis"
        ));
    }

    #[test]
    fn test_ended_game_needs_victory_type() {
        let state = played(0);
        let json = corrupt(&state, |v| v["state"]["victory"]["game_ended"] = true.into());
        let Err(LoadError::Integrity(issues)) = GameState::from_save(&json) else {
            panic!("load should fail");
        };
        assert_eq!(issues, vec![IntegrityIssue::EndedWithoutVictory]);
    }

    #[test]
    fn test_version_and_syntax_errors() {
        let state = played(0);
        let json = corrupt(&state, |v| v["version"] = 2.into());
        assert!(matches!(
            GameState::from_save(&json),
            Err(LoadError::UnsupportedVersion { found: 2, expected: 1 })
        ));
        assert!(matches!(
            GameState::from_save("{\"version\": 1"),
            Err(LoadError::Parse(_))
        ));
    }
}
