//! Fixed-schema resource ledger.
//!
//! A pool never holds a negative quantity. Multi-resource operations check
//! every requirement before touching any field, so a failed call leaves the
//! pool exactly as it was.

use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::error::{ResourceError, Shortfall};
use crate::types::ResourceKind;

/// Thresholds below which a resource counts as critical
pub const DEFAULT_CRITICAL_THRESHOLDS: [(ResourceKind, i64); 5] = [
    (ResourceKind::Food, 20),
    (ResourceKind::CleanWater, 10),
    (ResourceKind::Scrap, 15),
    (ResourceKind::Medicine, 5),
    (ResourceKind::MgrRounds, 10),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ResourcePool {
    pub food: i64,
    pub clean_water: i64,
    pub scrap: i64,
    pub medicine: i64,
    pub mgr_rounds: i64,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from (kind, amount) pairs. Negative entries are rejected.
    pub fn from_amounts(amounts: &[(ResourceKind, i64)]) -> Result<Self, ResourceError> {
        let mut pool = Self::new();
        for &(kind, amount) in amounts {
            pool.set(kind, amount)?;
        }
        Ok(pool)
    }

    pub fn with(mut self, kind: ResourceKind, amount: i64) -> Self {
        *self.slot_mut(kind) = amount.max(0);
        self
    }

    fn slot_mut(&mut self, kind: ResourceKind) -> &mut i64 {
        match kind {
            ResourceKind::Food => &mut self.food,
            ResourceKind::CleanWater => &mut self.clean_water,
            ResourceKind::Scrap => &mut self.scrap,
            ResourceKind::Medicine => &mut self.medicine,
            ResourceKind::MgrRounds => &mut self.mgr_rounds,
        }
    }

    pub fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Food => self.food,
            ResourceKind::CleanWater => self.clean_water,
            ResourceKind::Scrap => self.scrap,
            ResourceKind::Medicine => self.medicine,
            ResourceKind::MgrRounds => self.mgr_rounds,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, amount: i64) -> Result<(), ResourceError> {
        if amount < 0 {
            return Err(ResourceError::Negative { kind, amount });
        }
        *self.slot_mut(kind) = amount;
        Ok(())
    }

    /// Apply a signed delta. Fails without mutation if the result would go negative.
    pub fn add(&mut self, kind: ResourceKind, delta: i64) -> Result<i64, ResourceError> {
        let current = self.get(kind);
        let next = current + delta;
        if next < 0 {
            #[cfg(feature = "instrument")]
            tracing::debug!(
                target: "resources",
                resource = kind.name(),
                delta = delta,
                available = current,
                "rejected over-subtraction"
            );
            return Err(ResourceError::Insufficient(Shortfall {
                kind,
                needed: -delta,
                available: current,
            }));
        }
        *self.slot_mut(kind) = next;
        Ok(next)
    }

    /// Remove a non-negative amount.
    pub fn subtract(&mut self, kind: ResourceKind, amount: i64) -> Result<i64, ResourceError> {
        if amount < 0 {
            return Err(ResourceError::Negative { kind, amount });
        }
        self.add(kind, -amount)
    }

    pub fn has_sufficient(&self, kind: ResourceKind, amount: i64) -> bool {
        self.get(kind) >= amount
    }

    pub fn has_sufficient_multiple(&self, requirements: &[(ResourceKind, i64)]) -> bool {
        self.first_shortfall(requirements).is_none()
    }

    /// First requirement this pool cannot cover, summing repeated kinds
    pub fn first_shortfall(&self, requirements: &[(ResourceKind, i64)]) -> Option<Shortfall> {
        ResourceKind::all().find_map(|kind| {
            let needed: i64 = requirements
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, amount)| *amount)
                .sum();
            let available = self.get(kind);
            (needed > available).then_some(Shortfall {
                kind,
                needed,
                available,
            })
        })
    }

    /// Check every requirement, then apply every subtraction. All or nothing.
    pub fn consume_multiple(
        &mut self,
        requirements: &[(ResourceKind, i64)],
    ) -> Result<(), ResourceError> {
        if let Some(&(kind, amount)) = requirements.iter().find(|(_, a)| *a < 0) {
            return Err(ResourceError::Negative { kind, amount });
        }
        if let Some(shortfall) = self.first_shortfall(requirements) {
            return Err(ResourceError::Insufficient(shortfall));
        }
        for &(kind, amount) in requirements {
            *self.slot_mut(kind) -= amount;
        }
        Ok(())
    }

    /// Credit every entry. Amounts must be non-negative.
    pub fn add_multiple(&mut self, amounts: &[(ResourceKind, i64)]) -> Result<(), ResourceError> {
        if let Some(&(kind, amount)) = amounts.iter().find(|(_, a)| *a < 0) {
            return Err(ResourceError::Negative { kind, amount });
        }
        for &(kind, amount) in amounts {
            *self.slot_mut(kind) += amount;
        }
        Ok(())
    }

    /// Move an amount to another pool, rolling back the debit if the credit fails.
    pub fn transfer_to(
        &mut self,
        other: &mut ResourcePool,
        kind: ResourceKind,
        amount: i64,
    ) -> Result<(), ResourceError> {
        self.subtract(kind, amount)?;
        if let Err(err) = other.add(kind, amount) {
            *self.slot_mut(kind) += amount;
            return Err(err);
        }
        Ok(())
    }

    /// Take up to `amount`, returning what was actually removed
    pub fn drain_up_to(&mut self, kind: ResourceKind, amount: i64) -> i64 {
        let taken = amount.clamp(0, self.get(kind));
        *self.slot_mut(kind) -= taken;
        taken
    }

    /// Raise a quantity, clipping at `cap`
    pub fn add_capped(&mut self, kind: ResourceKind, amount: i64, cap: i64) {
        let slot = self.slot_mut(kind);
        *slot = (*slot + amount.max(0)).min(cap.max(*slot));
    }

    pub fn amounts(&self) -> impl Iterator<Item = (ResourceKind, i64)> + '_ {
        ResourceKind::all().map(move |kind| (kind, self.get(kind)))
    }

    pub fn total_value(&self) -> i64 {
        self.amounts()
            .map(|(kind, amount)| amount * kind.unit_value())
            .sum()
    }

    /// Resources below their threshold
    pub fn critical_resources(&self, thresholds: &[(ResourceKind, i64)]) -> Vec<ResourceKind> {
        thresholds
            .iter()
            .filter(|(kind, threshold)| self.get(*kind) < *threshold)
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn default_critical_resources(&self) -> Vec<ResourceKind> {
        self.critical_resources(&DEFAULT_CRITICAL_THRESHOLDS)
    }

    pub fn is_empty(&self) -> bool {
        self.amounts().all(|(_, amount)| amount == 0)
    }

    pub fn has_negative(&self) -> bool {
        self.amounts().any(|(_, amount)| amount < 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_scenario() {
        let mut pool = ResourcePool::new().with(ResourceKind::Food, 50);

        assert!(pool.subtract(ResourceKind::Food, 60).is_err());
        assert_eq!(pool.food, 50, "failed subtract must not mutate");

        assert_eq!(pool.subtract(ResourceKind::Food, 30), Ok(20));
        assert_eq!(pool.food, 20);
    }

    #[test]
    fn test_set_and_subtract_reject_negative_input() {
        let mut pool = ResourcePool::new();
        assert_eq!(
            pool.set(ResourceKind::Scrap, -1),
            Err(ResourceError::Negative {
                kind: ResourceKind::Scrap,
                amount: -1
            })
        );
        assert!(pool.subtract(ResourceKind::Scrap, -5).is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_add_negative_delta_fails_without_mutation() {
        let mut pool = ResourcePool::new().with(ResourceKind::Medicine, 4);
        let err = pool.add(ResourceKind::Medicine, -5).unwrap_err();
        match err {
            ResourceError::Insufficient(s) => {
                assert_eq!(s.needed, 5);
                assert_eq!(s.available, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(pool.medicine, 4);
        assert_eq!(pool.add(ResourceKind::Medicine, -4), Ok(0));
    }

    #[test]
    fn test_consume_multiple_is_atomic() {
        let mut pool = ResourcePool::new()
            .with(ResourceKind::Scrap, 40)
            .with(ResourceKind::MgrRounds, 3);
        let before = pool.clone();

        let result = pool.consume_multiple(&[
            (ResourceKind::Scrap, 30),
            (ResourceKind::MgrRounds, 5),
        ]);
        assert!(result.is_err());
        assert_eq!(pool, before, "nothing applied on failure");

        pool.consume_multiple(&[(ResourceKind::Scrap, 30), (ResourceKind::MgrRounds, 3)])
            .unwrap();
        assert_eq!(pool.scrap, 10);
        assert_eq!(pool.mgr_rounds, 0);
    }

    #[test]
    fn test_consume_multiple_sums_repeated_kinds() {
        let mut pool = ResourcePool::new().with(ResourceKind::Food, 15);
        let result = pool.consume_multiple(&[(ResourceKind::Food, 10), (ResourceKind::Food, 10)]);
        assert!(result.is_err(), "two draws of 10 exceed 15");
        assert_eq!(pool.food, 15);
    }

    #[test]
    fn test_transfer_moves_amount() {
        let mut a = ResourcePool::new().with(ResourceKind::CleanWater, 12);
        let mut b = ResourcePool::new();

        a.transfer_to(&mut b, ResourceKind::CleanWater, 7).unwrap();
        assert_eq!((a.clean_water, b.clean_water), (5, 7));

        assert!(a.transfer_to(&mut b, ResourceKind::CleanWater, 6).is_err());
        assert_eq!((a.clean_water, b.clean_water), (5, 7));
    }

    #[test]
    fn test_valuation_and_critical() {
        let pool = ResourcePool::new()
            .with(ResourceKind::Food, 10)
            .with(ResourceKind::CleanWater, 10)
            .with(ResourceKind::Scrap, 10)
            .with(ResourceKind::Medicine, 10)
            .with(ResourceKind::MgrRounds, 10);
        assert_eq!(pool.total_value(), 20 + 30 + 10 + 50 + 10);
        assert_eq!(
            pool.default_critical_resources(),
            vec![ResourceKind::Food, ResourceKind::Scrap]
        );
    }

    #[test]
    fn test_add_capped_respects_cap() {
        let mut pool = ResourcePool::new().with(ResourceKind::Scrap, 390);
        pool.add_capped(ResourceKind::Scrap, 30, 400);
        assert_eq!(pool.scrap, 400);
    }
}
