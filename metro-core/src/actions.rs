//! Player actions: parsing at the host boundary and dispatch into the
//! subsystems.
//!
//! Each action either succeeds, fails a legitimate roll (`success: false`),
//! or is rejected with a `SimError` before anything is paid.

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::building::DEFAULT_REPAIR_AMOUNT;
use crate::combat::{AttackType, BattleReport};
use crate::diplomacy::{DiplomaticAction, DiplomaticOutcome};
use crate::error::{SimError, SimResult};
use crate::events::{ChoiceOutcome, EventContext};
use crate::infrastructure::BuildingType;
use crate::military::UnitType;
use crate::scouting::ScoutReport;
use crate::state::{GamePhase, GameState};
use crate::trade::CaravanEvent;
use crate::types::{ActionKind, ResourceKind};

pub const FORTIFY_COST: &[(ResourceKind, i64)] =
    &[(ResourceKind::Scrap, 30), (ResourceKind::MgrRounds, 5)];
pub const FORTIFY_DEFENSE: i64 = 10;
pub const DEVELOP_COST: &[(ResourceKind, i64)] = &[(ResourceKind::Scrap, 20)];
pub const DIPLOMACY_MGR_COST: i64 = 10;

// ============================================================================
// Action / Outcome
// ============================================================================

/// A player command. `target` carries the target station, a unit or building
/// type name, or a choice id, depending on the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    /// Origin station, or the event id for `ResolveEvent`
    pub origin: String,
    pub target: Option<String>,
}

impl Action {
    pub fn new(kind: ActionKind, origin: impl Into<String>) -> Self {
        Self {
            kind,
            origin: origin.into(),
            target: None,
        }
    }

    pub fn targeting(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Parse a host request such as `("recruit_unit", "VDNKh", Some("stalkers"))`
    pub fn parse(name: &str, origin: &str, target: Option<&str>) -> SimResult<Self> {
        let kind = ActionKind::from_name(name)
            .ok_or_else(|| SimError::invalid(format!("unknown action: {}", name)))?;
        Ok(Self {
            kind,
            origin: origin.to_string(),
            target: target.filter(|t| !t.is_empty()).map(str::to_string),
        })
    }

    fn requires_owned_origin(&self) -> bool {
        !matches!(
            self.kind,
            ActionKind::Scout
                | ActionKind::Trade
                | ActionKind::Attack
                | ActionKind::Diplomacy
                | ActionKind::ResolveEvent
        )
    }

    fn require_target(&self) -> SimResult<&str> {
        self.target
            .as_deref()
            .ok_or_else(|| SimError::invalid(format!("{} requires a target", self.kind.name())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ActionDetail {
    None,
    Scout(ScoutReport),
    Trade(CaravanEvent),
    Battle(BattleReport),
    Diplomacy(DiplomaticOutcome),
    Defense { station: String, defensive_value: i64 },
    Recruited { unit_type: UnitType, station: String },
    Building { station: String, building: BuildingType },
    Construction { station: String, building: BuildingType, turns: u32 },
    Upgraded { station: String, building: BuildingType, level: u32 },
    Repaired { station: String, building: BuildingType, damage_level: u32 },
    Event(ChoiceOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ActionKind,
    pub success: bool,
    pub message: String,
    pub detail: ActionDetail,
}

impl ActionOutcome {
    fn done(action: ActionKind, message: String, detail: ActionDetail) -> Self {
        Self {
            action,
            success: true,
            message,
            detail,
        }
    }

    pub fn report(&self) -> ActionReport {
        ActionReport {
            action: Some(self.action),
            success: self.success,
            message: self.message.clone(),
            effects: self.detail.clone(),
        }
    }
}

/// Flat outcome for the host: rejections become `success: false` with the
/// error text. `action` is empty when the request named no known action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct ActionReport {
    pub action: Option<ActionKind>,
    pub success: bool,
    pub message: String,
    pub effects: ActionDetail,
}

impl ActionReport {
    pub fn from_result(action: Option<ActionKind>, result: SimResult<ActionOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome.report(),
            Err(err) => Self {
                action,
                success: false,
                message: err.to_string(),
                effects: ActionDetail::None,
            },
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

impl GameState {
    pub fn execute_action(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        if action.kind != ActionKind::ResolveEvent {
            self.map.require_station(&action.origin)?;
        }
        if action.requires_owned_origin() && !self.controls(&action.origin) {
            return Err(SimError::illegal(format!(
                "{} can only be done at your own stations",
                action.kind.name()
            )));
        }

        self.phase = GamePhase::Action;
        let result = match action.kind {
            ActionKind::Scout => self.scout(action),
            ActionKind::Trade => self.trade(action),
            ActionKind::Attack => self.attack(action),
            ActionKind::Diplomacy => self.diplomacy_action(action),
            ActionKind::Fortify => self.fortify(&action.origin),
            ActionKind::Recruit => self.recruit(&action.origin, UnitType::Militia),
            ActionKind::RecruitUnit => {
                let name = action.require_target()?;
                let unit_type = UnitType::from_name(name)
                    .ok_or_else(|| SimError::invalid(format!("unknown unit type: {}", name)))?;
                self.recruit(&action.origin, unit_type)
            }
            ActionKind::Develop => self.develop(&action.origin),
            ActionKind::Construct => self.construct(action),
            ActionKind::Upgrade => self.upgrade(action),
            ActionKind::Repair => self.repair(action),
            ActionKind::ResolveEvent => {
                let choice = action.require_target()?;
                self.resolve_event_choice(&action.origin, choice)
            }
        };
        self.phase = GamePhase::Planning;

        #[cfg(feature = "instrument")]
        match &result {
            Ok(outcome) => tracing::info!(
                target: "turn",
                turn = self.turn,
                action = action.kind.name(),
                origin = action.origin.as_str(),
                success = outcome.success,
            ),
            Err(err) => tracing::warn!(
                target: "turn",
                turn = self.turn,
                action = action.kind.name(),
                origin = action.origin.as_str(),
                error = %err,
                "action rejected"
            ),
        }
        result
    }

    fn scout(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let Some(target) = action.target.as_deref() else {
            let targets = self.scouting.scouting_targets(&self.map, &action.origin);
            return Err(SimError::invalid(if targets.is_empty() {
                "no valid scouting targets".to_string()
            } else {
                format!("select a target to scout: {}", targets.join(", "))
            }));
        };
        let mut rng = self.next_action_rng();
        let report = self.scouting.execute_scout(
            &self.map,
            &action.origin,
            target,
            self.turn,
            &mut self.player.resources,
            &mut rng,
        )?;
        Ok(ActionOutcome {
            action: ActionKind::Scout,
            success: report.success,
            message: report.message.clone(),
            detail: ActionDetail::Scout(report),
        })
    }

    fn trade(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let target = action.require_target()?;
        let event = self.trade.execute_trade(
            &self.map,
            &action.origin,
            target,
            &mut self.player.resources,
            self.turn,
        )?;
        Ok(ActionOutcome::done(
            ActionKind::Trade,
            format!("caravan dispatched from {} to {}", action.origin, target),
            ActionDetail::Trade(event),
        ))
    }

    fn attack(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let target = action.require_target()?;
        let faction = self.player.faction;
        let modifier = self
            .factions
            .get(faction)
            .map_or(0.0, |f| f.combat_modifier());
        let mut rng = self.next_action_rng();
        let report = self.combat.execute_attack(
            &mut self.map,
            &mut self.roster,
            &self.diplomacy,
            &action.origin,
            target,
            faction,
            modifier,
            &mut self.player.resources,
            AttackType::Assault,
            self.turn,
            &mut rng,
        )?;

        self.factions.record_losses(faction, report.attacker_casualties);
        self.factions
            .record_losses(report.defender, report.defender_casualties);
        if report.territory_changed {
            self.statistics.battles_won += 1;
        } else if !report.result.is_success() {
            self.statistics.battles_lost += 1;
        }
        self.roster.remove_destroyed();
        self.refresh_controlled_stations();
        self.update_statistics();

        Ok(ActionOutcome {
            action: ActionKind::Attack,
            success: report.result.is_success(),
            message: report.description.clone(),
            detail: ActionDetail::Battle(report),
        })
    }

    /// Improve relations with the faction holding the target station
    fn diplomacy_action(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let target = action.require_target()?;
        let other = self.map.require_station(target)?.controlling_faction;
        if let Some(short) = self
            .player
            .resources
            .first_shortfall(&[(ResourceKind::MgrRounds, DIPLOMACY_MGR_COST)])
        {
            return Err(SimError::Insufficient(short));
        }
        let mut rng = self.next_action_rng();
        let outcome = self.diplomacy.execute_action(
            self.player.faction,
            other,
            DiplomaticAction::ImproveRelations,
            self.turn,
            DIPLOMACY_MGR_COST,
            &mut rng,
        )?;
        if outcome.success {
            self.player
                .resources
                .subtract(ResourceKind::MgrRounds, DIPLOMACY_MGR_COST)?;
            self.statistics.diplomatic_agreements += 1;
        }
        Ok(ActionOutcome {
            action: ActionKind::Diplomacy,
            success: outcome.success,
            message: outcome.message.clone(),
            detail: ActionDetail::Diplomacy(outcome),
        })
    }

    fn fortify(&mut self, origin: &str) -> SimResult<ActionOutcome> {
        if let Some(short) = self.player.resources.first_shortfall(FORTIFY_COST) {
            return Err(SimError::Insufficient(short));
        }
        self.player.resources.consume_multiple(FORTIFY_COST)?;
        let station = self.map.require_station_mut(origin)?;
        station.defensive_value += FORTIFY_DEFENSE;
        let defensive_value = station.defensive_value;
        Ok(ActionOutcome::done(
            ActionKind::Fortify,
            format!("fortified {}: defence now {}", origin, defensive_value),
            ActionDetail::Defense {
                station: origin.to_string(),
                defensive_value,
            },
        ))
    }

    fn recruit(&mut self, origin: &str, unit_type: UnitType) -> SimResult<ActionOutcome> {
        let station = self.map.require_station(origin)?;
        self.roster.recruit(
            unit_type,
            self.player.faction,
            station,
            &mut self.player.resources,
            self.turn,
        )?;
        self.statistics.units_recruited += 1;
        self.update_statistics();
        Ok(ActionOutcome::done(
            ActionKind::Recruit,
            format!("recruited {} at {}", unit_type.name(), origin),
            ActionDetail::Recruited {
                unit_type,
                station: origin.to_string(),
            },
        ))
    }

    /// Quick development: a mushroom farm for 20 scrap, no construction time
    fn develop(&mut self, origin: &str) -> SimResult<ActionOutcome> {
        let building = BuildingType::MushroomFarm;
        if self.map.require_station(origin)?.has_infrastructure(building) {
            return Err(SimError::illegal(format!("{} already has a mushroom farm", origin)));
        }
        if let Some(short) = self.player.resources.first_shortfall(DEVELOP_COST) {
            return Err(SimError::Insufficient(short));
        }
        self.map
            .require_station_mut(origin)?
            .add_infrastructure(building, 1)?;
        self.player.resources.consume_multiple(DEVELOP_COST)?;
        Ok(ActionOutcome::done(
            ActionKind::Develop,
            format!("built a mushroom farm at {}", origin),
            ActionDetail::Building {
                station: origin.to_string(),
                building,
            },
        ))
    }

    fn construct(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let building = parse_building(action.require_target()?)?;
        let turns = self.buildings.start_construction(
            &self.map,
            &action.origin,
            building,
            &mut self.player.resources,
            self.turn,
        )?;
        Ok(ActionOutcome::done(
            ActionKind::Construct,
            format!(
                "started {} at {} ({} turns)",
                building.name(),
                action.origin,
                turns
            ),
            ActionDetail::Construction {
                station: action.origin.clone(),
                building,
                turns,
            },
        ))
    }

    fn upgrade(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let building = parse_building(action.require_target()?)?;
        let level = self.buildings.upgrade_building(
            &mut self.map,
            &action.origin,
            building,
            &mut self.player.resources,
            self.turn,
        )?;
        Ok(ActionOutcome::done(
            ActionKind::Upgrade,
            format!("{} at {} upgraded to level {}", building.name(), action.origin, level),
            ActionDetail::Upgraded {
                station: action.origin.clone(),
                building,
                level,
            },
        ))
    }

    fn repair(&mut self, action: &Action) -> SimResult<ActionOutcome> {
        let building = parse_building(action.require_target()?)?;
        let damage_level = self.buildings.repair_building(
            &mut self.map,
            &action.origin,
            building,
            &mut self.player.resources,
            DEFAULT_REPAIR_AMOUNT,
        )?;
        Ok(ActionOutcome::done(
            ActionKind::Repair,
            format!("repaired {} at {}", building.name(), action.origin),
            ActionDetail::Repaired {
                station: action.origin.clone(),
                building,
                damage_level,
            },
        ))
    }

    /// Answer a pending event. `event_id` is the instance id or the event
    /// kind's name.
    pub fn resolve_event_choice(&mut self, event_id: &str, choice_id: &str) -> SimResult<ActionOutcome> {
        let mut rng = self.next_action_rng();
        let military_units = self.roster.units_of(self.player.faction).count();
        let ctx = EventContext {
            faction: self.player.faction,
            stations: &self.player.controlled_stations,
            military_units,
        };
        let outcome = self.events.resolve_choice(
            event_id,
            choice_id,
            &mut self.map,
            &mut self.diplomacy,
            &mut self.player.resources,
            &ctx,
            self.turn,
            &mut rng,
        )?;
        self.statistics.events_resolved += 1;
        self.refresh_controlled_stations();
        self.update_statistics();
        Ok(ActionOutcome {
            action: ActionKind::ResolveEvent,
            success: outcome.succeeded,
            message: outcome.effects.join("; "),
            detail: ActionDetail::Event(outcome),
        })
    }
}

fn parse_building(name: &str) -> SimResult<BuildingType> {
    BuildingType::from_name(&name.to_ascii_lowercase())
        .ok_or_else(|| SimError::invalid(format!("unknown building type: {}", name)))
}
