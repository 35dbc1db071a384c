//! Five victory paths, recomputed from aggregate statistics every turn.
//!
//! Progress is never accumulated: each check derives it afresh from the
//! metrics it is handed. The first path to reach 1.0 ends the game and the
//! outcome is frozen from then on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

pub const DEFAULT_HISTORY_LEN: usize = 20;

const BASE_SCORE: i64 = 1000;
const MAX_TURN_BONUS: i64 = 200;

// ============================================================================
// Kinds / Status
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum VictoryKind {
    Political,
    Military,
    Economic,
    Survival,
    Technological,
}

impl VictoryKind {
    pub fn all() -> impl Iterator<Item = VictoryKind> {
        [
            VictoryKind::Political,
            VictoryKind::Military,
            VictoryKind::Economic,
            VictoryKind::Survival,
            VictoryKind::Technological,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            VictoryKind::Political => "political",
            VictoryKind::Military => "military",
            VictoryKind::Economic => "economic",
            VictoryKind::Survival => "survival",
            VictoryKind::Technological => "technological",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            VictoryKind::Political => "Metro Unification",
            VictoryKind::Military => "Metro Conquest",
            VictoryKind::Economic => "Economic Dominance",
            VictoryKind::Survival => "Metro Survival",
            VictoryKind::Technological => "Technological Renaissance",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            VictoryKind::Political => {
                "Unite the major factions under a single banner through diplomacy and alliance"
            }
            VictoryKind::Military => {
                "Conquer and hold the majority of Metro stations through military might"
            }
            VictoryKind::Economic => {
                "Control the Metro's economy through trade networks and resource monopolies"
            }
            VictoryKind::Survival => {
                "Survive the harsh Metro environment and outlast every major threat"
            }
            VictoryKind::Technological => {
                "Lead the Metro into a new age by preserving and sharing knowledge"
            }
        }
    }

    /// (in progress, near completion) thresholds
    pub fn thresholds(self) -> (f64, f64) {
        match self {
            VictoryKind::Political => (0.25, 0.75),
            VictoryKind::Military => (0.30, 0.85),
            VictoryKind::Economic => (0.20, 0.70),
            VictoryKind::Survival => (0.25, 0.75),
            VictoryKind::Technological => (0.15, 0.65),
        }
    }

    pub fn score_bonus(self) -> i64 {
        match self {
            VictoryKind::Political => 150,
            VictoryKind::Military => 100,
            VictoryKind::Economic => 125,
            VictoryKind::Survival => 200,
            VictoryKind::Technological => 175,
        }
    }

    /// Weighted sum of this path's sub-metrics. Each sub-metric is clamped to
    /// [0, 1] before weighting and the weights sum to 1.
    pub fn progress(self, turn: u32, m: &VictoryMetrics) -> f64 {
        let stations = m.controlled_stations as f64;
        let agreements = m.diplomatic_agreements as f64;
        let weighted: &[(f64, f64)] = match self {
            VictoryKind::Political => &[
                (0.30, ratio(agreements, 4.0)),
                (0.25, ratio(stations, 12.0)),
                (0.25, ratio(agreements, 8.0)),
                (0.20, ratio((agreements * 10.0).min(75.0), 75.0)),
            ],
            VictoryKind::Military => &[
                (0.35, ratio(stations, 11.0)),
                (0.25, ratio(m.military_strength as f64, 500.0)),
                (0.25, ratio(m.battles_won as f64, 15.0)),
                (0.15, ratio((m.controlled_stations / 2) as f64, 6.0)),
            ],
            VictoryKind::Economic => &[
                (0.30, ratio(m.mgr_reserves as f64, 1000.0)),
                (0.25, ratio(m.trades_completed as f64, 10.0)),
                (0.25, ratio(m.total_production as f64, 200.0)),
                (0.20, ratio(stations * 5.0, 80.0)),
            ],
            VictoryKind::Survival => &[
                (0.40, ratio(turn as f64, 100.0)),
                (0.25, ratio(m.total_population as f64, 1000.0)),
                (0.20, ratio(m.positive_net_resources as f64 * 20.0, 80.0)),
                (0.15, ratio(stations * 3.0, 50.0)),
            ],
            VictoryKind::Technological => {
                let libraries = (m.libraries_built as f64).min(4.0);
                &[
                    (0.30, ratio(libraries, 4.0)),
                    (0.25, ratio(libraries * 2.0, 8.0)),
                    (0.20, ratio(agreements * 10.0, 100.0)),
                    (0.15, ratio(agreements, 6.0)),
                    (0.10, ratio((m.controlled_stations / 5) as f64, 3.0)),
                ]
            }
        };
        let sum: f64 = weighted.iter().map(|(w, v)| w * v).sum();
        // rounded so that a full set of sub-metrics lands on exactly 1.0
        ((sum * 1e6).round() / 1e6).min(1.0)
    }
}

fn ratio(value: f64, target: f64) -> f64 {
    (value / target).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum VictoryStatus {
    NotStarted,
    InProgress,
    NearCompletion,
    Achieved,
}

impl VictoryStatus {
    pub fn from_progress(kind: VictoryKind, progress: f64) -> Self {
        let (early, late) = kind.thresholds();
        if progress >= 1.0 {
            VictoryStatus::Achieved
        } else if progress >= late {
            VictoryStatus::NearCompletion
        } else if progress >= early {
            VictoryStatus::InProgress
        } else {
            VictoryStatus::NotStarted
        }
    }
}

// ============================================================================
// Inputs / Outputs
// ============================================================================

/// Aggregate statistics a victory check reads. Assembled by the game state
/// from its own counters and the current map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct VictoryMetrics {
    pub controlled_stations: usize,
    pub total_population: u64,
    pub diplomatic_agreements: u32,
    pub military_strength: i64,
    pub battles_won: u32,
    pub trades_completed: u32,
    pub mgr_reserves: i64,
    /// Sum of gross production across the player's stations this turn
    pub total_production: i64,
    /// Resource kinds whose net production is above zero
    pub positive_net_resources: usize,
    pub libraries_built: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct VictoryCondition {
    pub kind: VictoryKind,
    pub current_progress: f64,
    pub status: VictoryStatus,
    pub turn_achieved: Option<u32>,
}

impl VictoryCondition {
    pub fn new(kind: VictoryKind) -> Self {
        Self {
            kind,
            current_progress: 0.0,
            status: VictoryStatus::NotStarted,
            turn_achieved: None,
        }
    }

    pub fn percentage(&self) -> f64 {
        (self.current_progress * 100.0).min(100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct VictoryResult {
    pub kind: VictoryKind,
    pub achieved: bool,
    pub progress: f64,
    pub status: VictoryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ProgressEntry {
    pub turn: u32,
    pub progress: BTreeMap<VictoryKind, f64>,
    pub statuses: BTreeMap<VictoryKind, VictoryStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ConditionInfo {
    pub kind: VictoryKind,
    pub title: String,
    pub description: String,
    pub percentage: f64,
    pub status: VictoryStatus,
    pub turn_achieved: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct VictoryInfo {
    pub game_ended: bool,
    pub victory_achieved: Option<VictoryKind>,
    pub victory_turn: Option<u32>,
    pub victory_score: i64,
    pub conditions: Vec<ConditionInfo>,
}

// ============================================================================
// System
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VictorySystem {
    pub conditions: BTreeMap<VictoryKind, VictoryCondition>,
    pub game_ended: bool,
    pub victory_achieved: Option<VictoryKind>,
    pub victory_turn: Option<u32>,
    pub victory_score: i64,
    pub history: Vec<ProgressEntry>,
    pub history_len: usize,
}

impl Default for VictorySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl VictorySystem {
    pub fn new() -> Self {
        Self::with_history_len(DEFAULT_HISTORY_LEN)
    }

    pub fn with_history_len(history_len: usize) -> Self {
        Self {
            conditions: VictoryKind::all()
                .map(|k| (k, VictoryCondition::new(k)))
                .collect(),
            game_ended: false,
            victory_achieved: None,
            victory_turn: None,
            victory_score: 0,
            history: Vec::new(),
            history_len,
        }
    }

    pub fn condition(&self, kind: VictoryKind) -> Option<&VictoryCondition> {
        self.conditions.get(&kind)
    }

    pub fn is_game_ended(&self) -> bool {
        self.game_ended
    }

    /// Recompute every path. Paths are checked in declaration order, so when
    /// two complete on the same turn the earlier one wins.
    pub fn check(&mut self, turn: u32, metrics: &VictoryMetrics) -> Vec<VictoryResult> {
        let mut results = Vec::with_capacity(self.conditions.len());

        for (&kind, condition) in self.conditions.iter_mut() {
            let progress = kind.progress(turn, metrics);
            let status = VictoryStatus::from_progress(kind, progress);
            condition.current_progress = progress;
            condition.status = status;

            let achieved = status == VictoryStatus::Achieved;
            if achieved && !self.game_ended {
                condition.turn_achieved = Some(turn);
                self.game_ended = true;
                self.victory_achieved = Some(kind);
                self.victory_turn = Some(turn);
                self.victory_score = score(kind, turn, metrics);

                #[cfg(feature = "instrument")]
                tracing::info!(
                    target: "victory",
                    turn = turn,
                    kind = kind.name(),
                    score = self.victory_score,
                    stations = metrics.controlled_stations,
                );
            }

            results.push(VictoryResult {
                kind,
                achieved,
                progress,
                status,
            });
        }

        self.record(turn, &results);
        results
    }

    fn record(&mut self, turn: u32, results: &[VictoryResult]) {
        self.history.push(ProgressEntry {
            turn,
            progress: results.iter().map(|r| (r.kind, r.progress)).collect(),
            statuses: results.iter().map(|r| (r.kind, r.status)).collect(),
        });
        if self.history.len() > self.history_len {
            let excess = self.history.len() - self.history_len;
            self.history.drain(..excess);
        }

        #[cfg(feature = "instrument")]
        if let Some((kind, progress)) = self.closest_victory() {
            tracing::debug!(
                target: "victory",
                turn = turn,
                closest = kind.name(),
                progress = progress,
            );
        }
    }

    /// Path with the highest non-zero progress. None once the game has ended.
    pub fn closest_victory(&self) -> Option<(VictoryKind, f64)> {
        if self.game_ended {
            return None;
        }
        self.conditions
            .values()
            .filter(|c| c.current_progress > 0.0)
            .fold(None, |best: Option<(VictoryKind, f64)>, c| match best {
                Some((_, p)) if p >= c.current_progress => best,
                _ => Some((c.kind, c.current_progress)),
            })
    }

    /// The last `turns` history entries, oldest first.
    pub fn progress_history(&self, turns: usize) -> &[ProgressEntry] {
        let start = self.history.len().saturating_sub(turns);
        &self.history[start..]
    }

    pub fn info(&self) -> VictoryInfo {
        VictoryInfo {
            game_ended: self.game_ended,
            victory_achieved: self.victory_achieved,
            victory_turn: self.victory_turn,
            victory_score: self.victory_score,
            conditions: self
                .conditions
                .values()
                .map(|c| ConditionInfo {
                    kind: c.kind,
                    title: c.kind.title().to_string(),
                    description: c.kind.description().to_string(),
                    percentage: c.percentage(),
                    status: c.status,
                    turn_achieved: c.turn_achieved,
                })
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::with_history_len(self.history_len);
    }
}

/// Final score for a victory of `kind` on `turn`.
pub fn score(kind: VictoryKind, turn: u32, m: &VictoryMetrics) -> i64 {
    let turn_bonus = (MAX_TURN_BONUS - 2 * turn as i64).max(0);
    let performance = m.controlled_stations as i64 * 10
        + (m.total_population / 10) as i64
        + m.battles_won as i64 * 15
        + m.trades_completed as i64 * 5
        + m.diplomatic_agreements as i64 * 20;
    (BASE_SCORE + turn_bonus + kind.score_bonus() + performance).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_weights_sum_to_one() {
        let maxed = VictoryMetrics {
            controlled_stations: 15,
            total_population: 5000,
            diplomatic_agreements: 20,
            military_strength: 1000,
            battles_won: 30,
            trades_completed: 20,
            mgr_reserves: 2000,
            total_production: 400,
            positive_net_resources: 5,
            libraries_built: 6,
        };
        for kind in VictoryKind::all() {
            assert!(approx(kind.progress(200, &maxed), 1.0), "{:?}", kind);
        }
    }

    #[test]
    fn test_political_progress() {
        let metrics = VictoryMetrics {
            controlled_stations: 6,
            diplomatic_agreements: 2,
            ..Default::default()
        };
        // 0.3*0.5 + 0.25*0.5 + 0.25*0.25 + 0.2*(20/75)
        let expected = 0.15 + 0.125 + 0.0625 + 0.2 * (20.0 / 75.0);
        assert!(approx(
            VictoryKind::Political.progress(1, &metrics),
            expected
        ));
    }

    #[test]
    fn test_status_thresholds_are_per_kind() {
        assert_eq!(
            VictoryStatus::from_progress(VictoryKind::Military, 0.8),
            VictoryStatus::InProgress
        );
        assert_eq!(
            VictoryStatus::from_progress(VictoryKind::Political, 0.8),
            VictoryStatus::NearCompletion
        );
        assert_eq!(
            VictoryStatus::from_progress(VictoryKind::Technological, 0.16),
            VictoryStatus::InProgress
        );
        assert_eq!(
            VictoryStatus::from_progress(VictoryKind::Military, 0.29),
            VictoryStatus::NotStarted
        );
        assert_eq!(
            VictoryStatus::from_progress(VictoryKind::Economic, 1.0),
            VictoryStatus::Achieved
        );
    }

    #[test]
    fn test_first_victory_is_final() {
        let mut system = VictorySystem::new();
        let winning = VictoryMetrics {
            controlled_stations: 12,
            diplomatic_agreements: 8,
            ..Default::default()
        };
        let results = system.check(10, &winning);
        assert!(results.iter().any(|r| r.kind == VictoryKind::Political && r.achieved));
        assert!(system.is_game_ended());
        assert_eq!(system.victory_achieved, Some(VictoryKind::Political));
        assert_eq!(system.victory_turn, Some(10));
        let score_at_win = system.victory_score;

        // A later, different completion must not replace the outcome
        let also_survival = VictoryMetrics {
            total_population: 2000,
            positive_net_resources: 4,
            controlled_stations: 17,
            diplomatic_agreements: 8,
            ..Default::default()
        };
        system.check(120, &also_survival);
        assert_eq!(system.victory_achieved, Some(VictoryKind::Political));
        assert_eq!(system.victory_turn, Some(10));
        assert_eq!(system.victory_score, score_at_win);
        assert_eq!(
            system.condition(VictoryKind::Survival).unwrap().turn_achieved,
            None
        );
        assert_eq!(system.closest_victory(), None);
    }

    #[test]
    fn test_score_formula() {
        let metrics = VictoryMetrics {
            controlled_stations: 12,
            total_population: 1234,
            battles_won: 2,
            trades_completed: 3,
            diplomatic_agreements: 8,
            ..Default::default()
        };
        // 1000 + (200 - 20) + 150 + 120 + 123 + 30 + 15 + 160
        assert_eq!(score(VictoryKind::Political, 10, &metrics), 1778);
        // late victories get no turn bonus
        assert_eq!(
            score(VictoryKind::Survival, 150, &VictoryMetrics::default()),
            1200
        );
    }

    #[test]
    fn test_history_is_capped() {
        let mut system = VictorySystem::with_history_len(5);
        for turn in 1..=12 {
            system.check(turn, &VictoryMetrics::default());
        }
        assert_eq!(system.history.len(), 5);
        assert_eq!(system.history[0].turn, 8);
        assert_eq!(system.progress_history(2).len(), 2);
        assert_eq!(system.progress_history(50).len(), 5);
    }

    #[test]
    fn test_closest_victory() {
        let mut system = VictorySystem::new();
        assert_eq!(system.closest_victory(), None);
        system.check(
            50,
            &VictoryMetrics {
                controlled_stations: 1,
                ..Default::default()
            },
        );
        let (kind, progress) = system.closest_victory().unwrap();
        // survival gets 0.4 * 0.5 from turns alone
        assert_eq!(kind, VictoryKind::Survival);
        assert!(progress > 0.2);
    }

    #[test]
    fn test_reset_clears_outcome() {
        let mut system = VictorySystem::with_history_len(7);
        system.check(
            5,
            &VictoryMetrics {
                controlled_stations: 12,
                diplomatic_agreements: 8,
                ..Default::default()
            },
        );
        system.reset();
        assert!(!system.is_game_ended());
        assert!(system.history.is_empty());
        assert_eq!(system.history_len, 7);
        assert_eq!(system.victory_score, 0);
    }
}
