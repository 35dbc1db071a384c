//! Simulation tunables, loadable from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::EventCategory;
use crate::resources::ResourcePool;
use crate::types::{FactionId, ResourceKind};

pub const DEFAULT_SEED: u64 = 2033;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every field has a default, so a partial JSON document only overrides what
/// it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub player_faction: FactionId,
    pub player_starting_resources: BTreeMap<ResourceKind, i64>,

    pub ai_action_probability: f64,
    pub ai_max_actions_per_turn: usize,

    pub caravan_travel_time: u32,
    pub trade_cost_mgr: i64,
    pub trade_delivery_food: i64,

    pub scout_range: u32,
    pub intel_decay_turns: u32,

    pub event_category_modifiers: BTreeMap<EventCategory, f64>,

    pub victory_history_len: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            player_faction: FactionId::Rangers,
            player_starting_resources: [
                (ResourceKind::Food, 100),
                (ResourceKind::CleanWater, 50),
                (ResourceKind::Scrap, 75),
                (ResourceKind::Medicine, 25),
                (ResourceKind::MgrRounds, 50),
            ]
            .into_iter()
            .collect(),
            ai_action_probability: 0.7,
            ai_max_actions_per_turn: 2,
            caravan_travel_time: 2,
            trade_cost_mgr: 20,
            trade_delivery_food: 10,
            scout_range: 3,
            intel_decay_turns: 5,
            event_category_modifiers: EventCategory::all()
                .map(|c| (c, c.default_modifier()))
                .collect(),
            victory_history_len: crate::victory::DEFAULT_HISTORY_LEN,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.ai_action_probability) {
            return Err(ConfigError::Invalid(format!(
                "ai_action_probability {} outside [0, 1]",
                self.ai_action_probability
            )));
        }
        if self.caravan_travel_time == 0 {
            return Err(ConfigError::Invalid(
                "caravan_travel_time must be at least 1".into(),
            ));
        }
        if self.player_faction == FactionId::Independent {
            return Err(ConfigError::Invalid(
                "player faction must be a major faction".into(),
            ));
        }
        if let Some((kind, amount)) = self
            .player_starting_resources
            .iter()
            .find(|(_, amount)| **amount < 0)
        {
            return Err(ConfigError::Invalid(format!(
                "negative starting {}: {}",
                kind, amount
            )));
        }
        if let Some((category, modifier)) = self
            .event_category_modifiers
            .iter()
            .find(|(_, m)| !m.is_finite() || **m < 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "event modifier for {} is {}",
                category.name(),
                modifier
            )));
        }
        Ok(())
    }

    pub fn starting_resources(&self) -> ResourcePool {
        self.player_starting_resources
            .iter()
            .fold(ResourcePool::new(), |pool, (&kind, &amount)| {
                pool.with(kind, amount)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed, 2033);
        assert_eq!(config.starting_resources().get(ResourceKind::Scrap), 75);
        assert_eq!(
            config.event_category_modifiers[&EventCategory::Anomalous],
            0.5
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            SimConfig::from_json_str(r#"{"seed": 7, "player_faction": "Hanza"}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.player_faction, FactionId::Hanza);
        assert_eq!(config.ai_max_actions_per_turn, 2);
        assert_eq!(config.caravan_travel_time, 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SimConfig::from_json_str(r#"{"ai_action_probability": 1.5}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{"caravan_travel_time": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{"event_category_modifiers": {"social": -1.0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
