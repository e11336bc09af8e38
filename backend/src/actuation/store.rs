//! Pending plan store
//!
//! Holds at most one unconsumed plan per intersection. Owned by the
//! orchestrator and lent by `&mut` to the controller adapter (which fills it)
//! and the actuator (which empties it).
//!
//! Entry lifetime: created when a plan is published, destroyed when the plan
//! is applied at a cycle boundary or when the simulator reports that the
//! intersection no longer exists.

use crate::models::plan::GreenTimePlan;
use std::collections::BTreeMap;

/// Last-writer-wins mapping from intersection id to its pending plan
///
/// # Example
/// ```
/// use perimeter_control_core_rs::{GreenTimePlan, PendingPlanStore};
///
/// let mut store = PendingPlanStore::new();
/// store.publish("J1", GreenTimePlan::new(30.0, vec![10.0]));
/// let replaced = store.publish("J1", GreenTimePlan::new(35.0, vec![12.0]));
///
/// assert!(replaced.is_some());
/// assert_eq!(store.len(), 1);
/// assert_eq!(store.get("J1").unwrap().primary, 35.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PendingPlanStore {
    plans: BTreeMap<String, GreenTimePlan>,
}

impl PendingPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a plan, returning the unconsumed plan it overwrote
    pub fn publish(
        &mut self,
        intersection_id: impl Into<String>,
        plan: GreenTimePlan,
    ) -> Option<GreenTimePlan> {
        self.plans.insert(intersection_id.into(), plan)
    }

    pub fn get(&self, intersection_id: &str) -> Option<&GreenTimePlan> {
        self.plans.get(intersection_id)
    }

    pub fn contains(&self, intersection_id: &str) -> bool {
        self.plans.contains_key(intersection_id)
    }

    pub fn remove(&mut self, intersection_id: &str) -> Option<GreenTimePlan> {
        self.plans.remove(intersection_id)
    }

    /// Snapshot of pending intersection ids, in id order
    pub fn intersection_ids(&self) -> Vec<String> {
        self.plans.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GreenTimePlan)> {
        self.plans.iter()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
