//! Plan hand-off channel between the controller and the pipeline
//!
//! A single-slot-per-key mailbox: publishing a plan for an intersection
//! overwrites any plan for that intersection that has not been drained yet.
//! Nothing is ever queued behind an older plan.
//!
//! The channel is a cheap cloneable handle over shared state, so the
//! controller side may live on another thread. Every operation holds the
//! lock for its full duration, which makes `take` and `drain` atomic
//! read-and-clear operations.

use crate::models::plan::GreenTimePlan;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ChannelState {
    active: bool,
    slots: BTreeMap<String, GreenTimePlan>,
}

/// Overwrite-per-key plan mailbox
///
/// # Example
/// ```
/// use perimeter_control_core_rs::{GreenTimePlan, PlanChannel};
///
/// let channel = PlanChannel::new();
/// let publisher = channel.clone();
///
/// publisher.publish("J1", GreenTimePlan::new(30.0, vec![]));
/// publisher.publish("J1", GreenTimePlan::new(40.0, vec![]));
/// publisher.set_active(true);
///
/// let drained = channel.drain();
/// assert_eq!(drained.len(), 1);
/// assert_eq!(drained["J1"].primary, 40.0);
/// assert!(channel.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlanChannel {
    inner: Arc<Mutex<ChannelState>>,
}

impl PlanChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a plan, returning the unconsumed plan it replaced
    pub fn publish(
        &self,
        intersection_id: impl Into<String>,
        plan: GreenTimePlan,
    ) -> Option<GreenTimePlan> {
        self.inner.lock().slots.insert(intersection_id.into(), plan)
    }

    /// Publish several plans under one lock
    pub fn publish_all<I>(&self, plans: I)
    where
        I: IntoIterator<Item = (String, GreenTimePlan)>,
    {
        let mut state = self.inner.lock();
        for (id, plan) in plans {
            state.slots.insert(id, plan);
        }
    }

    /// Mark whether the controller considers its published plans valid
    pub fn set_active(&self, active: bool) {
        self.inner.lock().active = active;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Atomically read and clear one intersection's slot
    pub fn take(&self, intersection_id: &str) -> Option<GreenTimePlan> {
        self.inner.lock().slots.remove(intersection_id)
    }

    /// Atomically read and clear every slot
    pub fn drain(&self) -> BTreeMap<String, GreenTimePlan> {
        std::mem::take(&mut self.inner.lock().slots)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }
}
