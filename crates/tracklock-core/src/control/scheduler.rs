//! Engagement scheduler
//!
//! Owns the active engagements and the requirement map. An actuator set is
//! held by at most one engagement; scheduling a conflicting engagement
//! interrupts the current holder first.

use std::collections::HashMap;

use super::engagement::{ActuatorSet, Engagement};
use crate::{Error, Result};

/// Handle returned by [`Scheduler::schedule`]
pub type EngagementId = u64;

struct Scheduled {
    id: EngagementId,
    engagement: Box<dyn Engagement>,
}

/// Cooperative scheduler ticking every active engagement once per tick
#[derive(Default)]
pub struct Scheduler {
    active: Vec<Scheduled>,
    owners: HashMap<ActuatorSet, EngagementId>,
    next_id: EngagementId,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an engagement, interrupting whatever holds its actuators
    pub fn schedule<E: Engagement + 'static>(&mut self, engagement: E) -> EngagementId {
        self.schedule_boxed(Box::new(engagement))
    }

    pub fn schedule_boxed(&mut self, mut engagement: Box<dyn Engagement>) -> EngagementId {
        let mut conflicts: Vec<EngagementId> = engagement
            .requirements()
            .iter()
            .filter_map(|set| self.owners.get(set).copied())
            .collect();
        conflicts.sort_unstable();
        conflicts.dedup();
        for holder in conflicts {
            tracing::info!("{} interrupts engagement {}", engagement.name(), holder);
            self.end(holder, true);
        }

        let id = self.next_id;
        self.next_id += 1;
        for &set in engagement.requirements() {
            self.owners.insert(set, id);
        }

        engagement.on_start();
        tracing::info!("scheduled {} as engagement {}", engagement.name(), id);
        self.active.push(Scheduled { id, engagement });
        id
    }

    /// Tick every active engagement once
    ///
    /// An engagement whose tick fails is ended as interrupted; the others
    /// still run. Finished engagements are ended normally. Returns the first
    /// tick error, if any.
    pub fn run_tick(&mut self, dt: f64) -> Result<()> {
        let mut first_error = None;
        let mut failed = Vec::new();
        let mut finished = Vec::new();

        for entry in &mut self.active {
            match entry.engagement.execute(dt) {
                Ok(()) => {
                    if entry.engagement.is_finished() {
                        finished.push(entry.id);
                    }
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}", entry.engagement.name(), e);
                    failed.push(entry.id);
                    first_error.get_or_insert(e);
                }
            }
        }

        for id in failed {
            self.end(id, true);
        }
        for id in finished {
            self.end(id, false);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Interrupt one engagement
    pub fn cancel(&mut self, id: EngagementId) -> Result<()> {
        if self.end(id, true) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("no active engagement {id}")))
        }
    }

    /// Interrupt every engagement
    pub fn cancel_all(&mut self) {
        let ids: Vec<EngagementId> = self.active.iter().map(|entry| entry.id).collect();
        for id in ids {
            self.end(id, true);
        }
    }

    fn end(&mut self, id: EngagementId, interrupted: bool) -> bool {
        let Some(index) = self.active.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let mut entry = self.active.remove(index);
        self.owners.retain(|_, owner| *owner != id);
        entry.engagement.on_end(interrupted);
        tracing::info!(
            "{} ended{}",
            entry.engagement.name(),
            if interrupted { " (interrupted)" } else { "" }
        );
        true
    }

    pub fn is_scheduled(&self, id: EngagementId) -> bool {
        self.active.iter().any(|entry| entry.id == id)
    }

    /// Engagement currently holding an actuator set
    pub fn owner(&self, set: ActuatorSet) -> Option<EngagementId> {
        self.owners.get(&set).copied()
    }

    /// Status string of an active engagement
    pub fn status(&self, id: EngagementId) -> Option<&'static str> {
        self.active
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.engagement.status())
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
