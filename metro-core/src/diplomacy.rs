//! Pairwise faction relationships, agreements and diplomatic actions.
//!
//! A relationship's status is always derived from its value; nothing sets it
//! directly.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{SimError, SimResult};
use crate::types::FactionId;

/// Untouched relationships start drifting after this many turns
pub const DRIFT_IDLE_TURNS: u32 = 5;
pub const FAILED_ACTION_PENALTY: i32 = -5;

// ============================================================================
// Status / Action
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Allied,
    Friendly,
    Neutral,
    Unfriendly,
    Hostile,
    AtWar,
}

impl RelationshipStatus {
    pub fn from_value(value: i32) -> Self {
        match value {
            v if v >= 80 => RelationshipStatus::Allied,
            v if v >= 40 => RelationshipStatus::Friendly,
            v if v >= -20 => RelationshipStatus::Neutral,
            v if v >= -60 => RelationshipStatus::Unfriendly,
            v if v >= -80 => RelationshipStatus::Hostile,
            _ => RelationshipStatus::AtWar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum DiplomaticAction {
    ImproveRelations,
    DeclareWar,
    OfferPeace,
    FormAlliance,
    BreakAlliance,
    TradeAgreement,
    NonAggressionPact,
    DemandTribute,
    OfferTribute,
}

impl DiplomaticAction {
    pub fn all() -> impl Iterator<Item = DiplomaticAction> {
        [
            DiplomaticAction::ImproveRelations,
            DiplomaticAction::DeclareWar,
            DiplomaticAction::OfferPeace,
            DiplomaticAction::FormAlliance,
            DiplomaticAction::BreakAlliance,
            DiplomaticAction::TradeAgreement,
            DiplomaticAction::NonAggressionPact,
            DiplomaticAction::DemandTribute,
            DiplomaticAction::OfferTribute,
        ]
        .into_iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            DiplomaticAction::ImproveRelations => "improve_relations",
            DiplomaticAction::DeclareWar => "declare_war",
            DiplomaticAction::OfferPeace => "offer_peace",
            DiplomaticAction::FormAlliance => "form_alliance",
            DiplomaticAction::BreakAlliance => "break_alliance",
            DiplomaticAction::TradeAgreement => "trade_agreement",
            DiplomaticAction::NonAggressionPact => "non_aggression_pact",
            DiplomaticAction::DemandTribute => "demand_tribute",
            DiplomaticAction::OfferTribute => "offer_tribute",
        }
    }

    pub fn from_name(name: &str) -> Option<DiplomaticAction> {
        let lowered = name.to_ascii_lowercase();
        DiplomaticAction::all().find(|a| a.name() == lowered)
    }

    /// Multiplier on the relationship-derived base chance
    pub fn weight(self) -> f64 {
        match self {
            DiplomaticAction::ImproveRelations => 0.8,
            DiplomaticAction::OfferPeace => 0.6,
            DiplomaticAction::TradeAgreement | DiplomaticAction::NonAggressionPact => 0.7,
            DiplomaticAction::FormAlliance => 0.4,
            DiplomaticAction::DemandTribute => 0.2,
            DiplomaticAction::DeclareWar => 1.0,
            DiplomaticAction::BreakAlliance | DiplomaticAction::OfferTribute => 0.5,
        }
    }
}

// ============================================================================
// Ideology table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Pragmatic,
    Intellectual,
    Fascist,
    Communist,
    Capitalist,
    Secretive,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdeologyProfile {
    pub alignment: Alignment,
    pub openness: i32,
    pub aggression: i32,
}

pub fn ideology_of(faction: FactionId) -> IdeologyProfile {
    let (alignment, openness, aggression) = match faction {
        FactionId::Rangers => (Alignment::Pragmatic, 70, 30),
        FactionId::Polis => (Alignment::Intellectual, 90, 20),
        FactionId::FourthReich => (Alignment::Fascist, 20, 90),
        FactionId::RedLine => (Alignment::Communist, 40, 70),
        FactionId::Hanza => (Alignment::Capitalist, 80, 40),
        FactionId::InvisibleWatchers => (Alignment::Secretive, 10, 60),
        FactionId::Independent => (Alignment::Neutral, 60, 30),
    };
    IdeologyProfile {
        alignment,
        openness,
        aggression,
    }
}

/// Symmetric ideological compatibility adjustment
fn compatibility(a: Alignment, b: Alignment) -> i32 {
    use Alignment::*;
    let lookup = |x, y| match (x, y) {
        (Fascist, Communist) => -30,
        (Fascist, Capitalist) => 10,
        (Communist, Capitalist) => -20,
        (Intellectual, Fascist) => -25,
        (Intellectual, Communist) => -10,
        (Pragmatic, Secretive) => -15,
        (Neutral, Fascist) => -10,
        _ => 0,
    };
    match lookup(a, b) {
        0 => lookup(b, a),
        v => v,
    }
}

fn initial_value(a: FactionId, b: FactionId) -> i32 {
    use FactionId::*;
    const TABLE: &[(FactionId, FactionId, i32)] = &[
        (Rangers, Polis, 60),
        (Polis, Hanza, 50),
        (Rangers, FourthReich, -80),
        (Rangers, RedLine, -70),
        (FourthReich, RedLine, -90),
        (Polis, InvisibleWatchers, -60),
        (Rangers, Hanza, 10),
        (Rangers, Independent, 20),
        (Polis, Independent, 30),
        (Hanza, Independent, 40),
        (FourthReich, Independent, -30),
        (RedLine, Independent, 0),
        (InvisibleWatchers, Independent, -10),
        (Hanza, FourthReich, 20),
        (Hanza, RedLine, 10),
        (FourthReich, InvisibleWatchers, 0),
        (RedLine, InvisibleWatchers, 0),
        (Hanza, InvisibleWatchers, -20),
    ];
    TABLE
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map_or(0, |(_, _, v)| *v)
}

// ============================================================================
// Relationship
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct DiplomaticRelationship {
    pub faction_a: FactionId,
    pub faction_b: FactionId,
    relationship_value: i32,
    pub trade_agreement: bool,
    pub non_aggression_pact: bool,
    pub military_alliance: bool,
    pub ideological_modifier: i32,
    pub last_interaction_turn: u32,
    pub relationship_trend: i32,
}

impl DiplomaticRelationship {
    pub fn new(a: FactionId, b: FactionId, value: i32) -> Self {
        let (faction_a, faction_b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            faction_a,
            faction_b,
            relationship_value: value.clamp(-100, 100),
            trade_agreement: false,
            non_aggression_pact: false,
            military_alliance: false,
            ideological_modifier: 0,
            last_interaction_turn: 0,
            relationship_trend: 0,
        }
    }

    pub fn value(&self) -> i32 {
        self.relationship_value
    }

    pub fn status(&self) -> RelationshipStatus {
        RelationshipStatus::from_value(self.relationship_value)
    }

    pub fn involves(&self, faction: FactionId) -> bool {
        self.faction_a == faction || self.faction_b == faction
    }

    pub fn other(&self, faction: FactionId) -> Option<FactionId> {
        if self.faction_a == faction {
            Some(self.faction_b)
        } else if self.faction_b == faction {
            Some(self.faction_a)
        } else {
            None
        }
    }

    /// Clamp into [-100, 100]; returns the applied delta
    pub fn modify(&mut self, change: i32) -> i32 {
        let old = self.relationship_value;
        self.relationship_value = (old + change).clamp(-100, 100);
        self.relationship_trend = self.relationship_value - old;
        self.relationship_trend
    }

    pub fn agreement_count(&self) -> u32 {
        [
            self.trade_agreement,
            self.non_aggression_pact,
            self.military_alliance,
        ]
        .iter()
        .filter(|f| **f)
        .count() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplomaticProposal {
    pub proposer: FactionId,
    pub target: FactionId,
    pub action: DiplomaticAction,
    pub mgr_cost: i64,
    pub expires_turn: u32,
}

impl DiplomaticProposal {
    pub fn is_expired(&self, turn: u32) -> bool {
        turn > self.expires_turn
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct DiplomaticOption {
    pub action: DiplomaticAction,
    pub mgr_cost: i64,
    pub success_chance: f64,
    pub warning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct DiplomaticOutcome {
    pub success: bool,
    pub action: DiplomaticAction,
    pub relationship_change: i32,
    pub new_value: i32,
    pub status: RelationshipStatus,
    /// Tribute paid to the actor on a successful demand
    pub tribute_mgr: i64,
    pub message: String,
}

// ============================================================================
// DiplomacySystem
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplomacySystem {
    relationships: Vec<DiplomaticRelationship>,
    pub proposals: Vec<DiplomaticProposal>,
}

impl Default for DiplomacySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl DiplomacySystem {
    /// Every pair of factions, seeded from lore plus ideology
    pub fn new() -> Self {
        let all: Vec<FactionId> = FactionId::all().collect();
        let mut relationships = Vec::new();
        for (i, &a) in all.iter().enumerate() {
            for &b in &all[i + 1..] {
                let modifier =
                    compatibility(ideology_of(a).alignment, ideology_of(b).alignment);
                let mut rel = DiplomaticRelationship::new(a, b, initial_value(a, b) + modifier);
                rel.ideological_modifier = modifier;
                relationships.push(rel);
            }
        }
        Self {
            relationships,
            proposals: Vec::new(),
        }
    }

    pub fn from_parts(
        relationships: Vec<DiplomaticRelationship>,
        proposals: Vec<DiplomaticProposal>,
    ) -> Self {
        Self {
            relationships,
            proposals,
        }
    }

    pub fn relationships(&self) -> &[DiplomaticRelationship] {
        &self.relationships
    }

    pub fn relationship(&self, a: FactionId, b: FactionId) -> Option<&DiplomaticRelationship> {
        if a == b {
            return None;
        }
        self.relationships
            .iter()
            .find(|r| r.involves(a) && r.involves(b))
    }

    fn relationship_mut(&mut self, a: FactionId, b: FactionId) -> Option<&mut DiplomaticRelationship> {
        if a == b {
            return None;
        }
        self.relationships
            .iter_mut()
            .find(|r| r.involves(a) && r.involves(b))
    }

    pub fn relationship_value(&self, a: FactionId, b: FactionId) -> i32 {
        self.relationship(a, b).map_or(0, |r| r.value())
    }

    pub fn status(&self, a: FactionId, b: FactionId) -> Option<RelationshipStatus> {
        self.relationship(a, b).map(|r| r.status())
    }

    /// Shift a relationship outside of an action, e.g. after a battle
    pub fn adjust(&mut self, a: FactionId, b: FactionId, change: i32, turn: u32) -> Option<i32> {
        let rel = self.relationship_mut(a, b)?;
        rel.modify(change);
        rel.last_interaction_turn = turn;
        Some(rel.value())
    }

    pub fn validate_action(&self, actor: FactionId, target: FactionId, action: DiplomaticAction) -> SimResult<()> {
        if actor == target {
            return Err(SimError::invalid("cannot perform diplomacy with yourself"));
        }
        let rel = self
            .relationship(actor, target)
            .ok_or_else(|| SimError::not_found(format!("relationship {}-{}", actor, target)))?;
        let status = rel.status();
        let refuse = |reason: &str| Err(SimError::illegal(reason.to_string()));
        match action {
            DiplomaticAction::DeclareWar if status == RelationshipStatus::AtWar => refuse("already at war"),
            DiplomaticAction::DeclareWar if rel.military_alliance => {
                refuse("cannot declare war on a military ally")
            }
            DiplomaticAction::FormAlliance if rel.military_alliance => {
                refuse("military alliance already exists")
            }
            DiplomaticAction::FormAlliance
                if matches!(status, RelationshipStatus::Hostile | RelationshipStatus::AtWar) =>
            {
                refuse("cannot form an alliance with a hostile faction")
            }
            DiplomaticAction::OfferPeace if status != RelationshipStatus::AtWar => {
                refuse("not currently at war")
            }
            DiplomaticAction::TradeAgreement if rel.trade_agreement => {
                refuse("trade agreement already exists")
            }
            DiplomaticAction::TradeAgreement if status == RelationshipStatus::AtWar => {
                refuse("cannot trade with a faction at war")
            }
            DiplomaticAction::NonAggressionPact if rel.non_aggression_pact => {
                refuse("non-aggression pact already exists")
            }
            DiplomaticAction::BreakAlliance if !rel.military_alliance => {
                refuse("no alliance to break")
            }
            _ => Ok(()),
        }
    }

    pub fn success_chance(&self, actor: FactionId, target: FactionId, action: DiplomaticAction, mgr_cost: i64) -> f64 {
        let Some(rel) = self.relationship(actor, target) else {
            return 0.0;
        };
        let base = 0.5 + rel.value() as f64 / 200.0;
        let mgr_bonus = (mgr_cost as f64 / 100.0).min(0.3);
        let openness = (ideology_of(target).openness - 50) as f64 / 200.0;
        (base * action.weight() + mgr_bonus + openness).clamp(0.1, 0.95)
    }

    /// Validate, roll, then apply the action's delta or the failure penalty.
    /// The caller pays `mgr_cost`.
    pub fn execute_action<R: Rng>(
        &mut self,
        actor: FactionId,
        target: FactionId,
        action: DiplomaticAction,
        turn: u32,
        mgr_cost: i64,
        rng: &mut R,
    ) -> SimResult<DiplomaticOutcome> {
        self.validate_action(actor, target, action)?;
        let chance = self.success_chance(actor, target, action, mgr_cost);
        let roll: f64 = rng.random();
        let rel = self
            .relationship_mut(actor, target)
            .ok_or_else(|| SimError::not_found(format!("relationship {}-{}", actor, target)))?;

        let success = roll <= chance;
        let mut tribute_mgr = 0;
        let (change, message) = if success {
            match action {
                DiplomaticAction::ImproveRelations => {
                    let delta = 10 + (mgr_cost / 5) as i32;
                    (rel.modify(delta), format!("Relations improved with {}", target))
                }
                DiplomaticAction::DeclareWar => {
                    rel.military_alliance = false;
                    rel.trade_agreement = false;
                    rel.non_aggression_pact = false;
                    (rel.modify(-50), format!("War declared against {}", target))
                }
                DiplomaticAction::OfferPeace => {
                    (rel.modify(30), format!("Peace treaty signed with {}", target))
                }
                DiplomaticAction::FormAlliance => {
                    rel.military_alliance = true;
                    (rel.modify(20), format!("Military alliance formed with {}", target))
                }
                DiplomaticAction::BreakAlliance => {
                    rel.military_alliance = false;
                    (rel.modify(-20), format!("Alliance with {} dissolved", target))
                }
                DiplomaticAction::TradeAgreement => {
                    rel.trade_agreement = true;
                    (rel.modify(15), format!("Trade agreement signed with {}", target))
                }
                DiplomaticAction::NonAggressionPact => {
                    rel.non_aggression_pact = true;
                    (rel.modify(10), format!("Non-aggression pact signed with {}", target))
                }
                DiplomaticAction::DemandTribute => {
                    tribute_mgr = 10;
                    (rel.modify(-15), format!("Tribute demanded from {}", target))
                }
                DiplomaticAction::OfferTribute => {
                    (rel.modify(15), format!("Tribute offered to {}", target))
                }
            }
        } else {
            (
                rel.modify(FAILED_ACTION_PENALTY),
                format!("{} rejected the proposal", target),
            )
        };
        rel.last_interaction_turn = turn;

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "diplomacy",
            turn = turn,
            actor = actor.name(),
            faction = target.name(),
            action = action.name(),
            success = success,
            chance = chance,
            change = change,
            value = rel.value(),
        );

        Ok(DiplomaticOutcome {
            success,
            action,
            relationship_change: change,
            new_value: rel.value(),
            status: rel.status(),
            tribute_mgr,
            message,
        })
    }

    /// Legal actions toward a faction, with their customary mgr cost
    pub fn diplomatic_options(&self, actor: FactionId, target: FactionId) -> Vec<DiplomaticOption> {
        let Some(rel) = self.relationship(actor, target) else {
            return Vec::new();
        };
        let option = |action: DiplomaticAction, mgr_cost: i64| DiplomaticOption {
            action,
            mgr_cost,
            success_chance: self.success_chance(actor, target, action, mgr_cost),
            warning: false,
        };

        let mut options = vec![option(DiplomaticAction::ImproveRelations, 10)];
        match rel.status() {
            RelationshipStatus::AtWar => options.push(option(DiplomaticAction::OfferPeace, 25)),
            RelationshipStatus::Friendly | RelationshipStatus::Allied => {
                if !rel.trade_agreement {
                    options.push(option(DiplomaticAction::TradeAgreement, 15));
                }
                if !rel.military_alliance && rel.status() == RelationshipStatus::Allied {
                    options.push(option(DiplomaticAction::FormAlliance, 30));
                }
            }
            RelationshipStatus::Neutral if !rel.non_aggression_pact => {
                options.push(option(DiplomaticAction::NonAggressionPact, 12));
            }
            _ => {}
        }
        if rel.status() != RelationshipStatus::AtWar && !rel.military_alliance {
            options.push(DiplomaticOption {
                action: DiplomaticAction::DeclareWar,
                mgr_cost: 0,
                success_chance: 1.0,
                warning: true,
            });
        }
        options
    }

    pub fn allies_of(&self, faction: FactionId) -> Vec<FactionId> {
        self.relationships
            .iter()
            .filter(|r| r.status() == RelationshipStatus::Allied || r.military_alliance)
            .filter_map(|r| r.other(faction))
            .collect()
    }

    pub fn relationships_of(&self, faction: FactionId) -> Vec<(FactionId, &DiplomaticRelationship)> {
        self.relationships
            .iter()
            .filter_map(|r| r.other(faction).map(|o| (o, r)))
            .collect()
    }

    pub fn agreement_count(&self, faction: FactionId) -> u32 {
        self.relationships
            .iter()
            .filter(|r| r.involves(faction))
            .map(|r| r.agreement_count())
            .sum()
    }

    pub fn propose(&mut self, proposal: DiplomaticProposal) -> SimResult<()> {
        self.validate_action(proposal.proposer, proposal.target, proposal.action)?;
        self.proposals.push(proposal);
        Ok(())
    }

    /// Drift idle relationships toward zero and drop expired proposals
    pub fn process_turn(&mut self, turn: u32) {
        for rel in &mut self.relationships {
            if turn.saturating_sub(rel.last_interaction_turn) > DRIFT_IDLE_TURNS {
                match rel.value() {
                    v if v > 0 => {
                        rel.modify(-1);
                    }
                    v if v < 0 => {
                        rel.modify(1);
                    }
                    _ => {}
                }
            }
        }
        self.proposals.retain(|p| !p.is_expired(turn));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_initial_values_include_ideology() {
        let diplomacy = DiplomacySystem::new();
        assert_eq!(diplomacy.relationships().len(), 21);
        assert_eq!(diplomacy.relationship_value(FactionId::Rangers, FactionId::Polis), 60);
        // -90 lore, -30 fascist/communist, clamped
        assert_eq!(
            diplomacy.relationship_value(FactionId::FourthReich, FactionId::RedLine),
            -100
        );
        assert_eq!(diplomacy.relationship_value(FactionId::Hanza, FactionId::FourthReich), 30);
        // unlisted pair starts at zero before ideology
        assert_eq!(
            diplomacy.relationship_value(FactionId::Polis, FactionId::FourthReich),
            -25
        );
        assert_eq!(
            diplomacy.status(FactionId::Rangers, FactionId::FourthReich),
            Some(RelationshipStatus::Hostile)
        );
    }

    #[test]
    fn test_status_buckets() {
        let cases = [
            (100, RelationshipStatus::Allied),
            (80, RelationshipStatus::Allied),
            (79, RelationshipStatus::Friendly),
            (40, RelationshipStatus::Friendly),
            (-20, RelationshipStatus::Neutral),
            (-21, RelationshipStatus::Unfriendly),
            (-60, RelationshipStatus::Unfriendly),
            (-80, RelationshipStatus::Hostile),
            (-81, RelationshipStatus::AtWar),
        ];
        for (value, expected) in cases {
            assert_eq!(RelationshipStatus::from_value(value), expected, "value {}", value);
        }
    }

    #[test]
    fn test_validation() {
        let diplomacy = DiplomacySystem::new();
        assert!(
            diplomacy
                .validate_action(FactionId::Rangers, FactionId::Rangers, DiplomaticAction::ImproveRelations)
                .unwrap_err()
                .is_validation()
        );
        assert!(matches!(
            diplomacy.validate_action(FactionId::Rangers, FactionId::Polis, DiplomaticAction::OfferPeace),
            Err(SimError::IllegalTransition(_))
        ));
        assert!(matches!(
            diplomacy.validate_action(FactionId::Rangers, FactionId::FourthReich, DiplomaticAction::FormAlliance),
            Err(SimError::IllegalTransition(_))
        ));
        assert!(
            diplomacy
                .validate_action(FactionId::FourthReich, FactionId::RedLine, DiplomaticAction::OfferPeace)
                .is_ok()
        );
    }

    #[test]
    fn test_success_chance_formula() {
        let diplomacy = DiplomacySystem::new();
        // (0.5 + 60/200) × 0.8 + 0.1 + (90 - 50)/200 = 0.64 + 0.1 + 0.2
        let chance = diplomacy.success_chance(
            FactionId::Rangers,
            FactionId::Polis,
            DiplomaticAction::ImproveRelations,
            10,
        );
        assert!((chance - 0.94).abs() < 1e-9, "{}", chance);
        let floor = diplomacy.success_chance(
            FactionId::Polis,
            FactionId::InvisibleWatchers,
            DiplomaticAction::DemandTribute,
            0,
        );
        assert_eq!(floor, 0.1);
    }

    #[test]
    fn test_declare_war_clears_agreements() {
        let mut diplomacy = DiplomacySystem::new();
        let mut rng = StdRng::seed_from_u64(42);
        diplomacy
            .relationship_mut(FactionId::Rangers, FactionId::Hanza)
            .unwrap()
            .trade_agreement = true;
        let outcome = diplomacy
            .execute_action(
                FactionId::Rangers,
                FactionId::Hanza,
                DiplomaticAction::DeclareWar,
                3,
                0,
                &mut rng,
            )
            .unwrap();
        let rel = diplomacy.relationship(FactionId::Rangers, FactionId::Hanza).unwrap();
        if outcome.success {
            assert_eq!(rel.value(), -40);
            assert!(!rel.trade_agreement);
        } else {
            assert_eq!(rel.value(), 5);
        }
        assert_eq!(rel.last_interaction_turn, 3);
        assert_eq!(rel.relationship_trend, outcome.relationship_change);
    }

    #[test]
    fn test_drift_toward_zero() {
        let mut diplomacy = DiplomacySystem::new();
        diplomacy.process_turn(5);
        assert_eq!(diplomacy.relationship_value(FactionId::Rangers, FactionId::Polis), 60);
        diplomacy.process_turn(6);
        assert_eq!(diplomacy.relationship_value(FactionId::Rangers, FactionId::Polis), 59);
        assert_eq!(
            diplomacy.relationship_value(FactionId::FourthReich, FactionId::RedLine),
            -99
        );
        assert_eq!(diplomacy.relationship_value(FactionId::RedLine, FactionId::InvisibleWatchers), 0);
    }

    #[test]
    fn test_options_by_status() {
        let diplomacy = DiplomacySystem::new();
        let at_war: Vec<_> = diplomacy
            .diplomatic_options(FactionId::FourthReich, FactionId::RedLine)
            .into_iter()
            .map(|o| o.action)
            .collect();
        assert_eq!(
            at_war,
            vec![DiplomaticAction::ImproveRelations, DiplomaticAction::OfferPeace]
        );
        let friendly: Vec<_> = diplomacy
            .diplomatic_options(FactionId::Rangers, FactionId::Polis)
            .into_iter()
            .map(|o| o.action)
            .collect();
        assert!(friendly.contains(&DiplomaticAction::TradeAgreement));
        assert!(friendly.contains(&DiplomaticAction::DeclareWar));
    }

    #[test]
    fn test_proposals_expire() {
        let mut diplomacy = DiplomacySystem::new();
        diplomacy
            .propose(DiplomaticProposal {
                proposer: FactionId::Rangers,
                target: FactionId::Polis,
                action: DiplomaticAction::TradeAgreement,
                mgr_cost: 15,
                expires_turn: 4,
            })
            .unwrap();
        diplomacy.process_turn(4);
        assert_eq!(diplomacy.proposals.len(), 1);
        diplomacy.process_turn(5);
        assert!(diplomacy.proposals.is_empty());
    }
}
