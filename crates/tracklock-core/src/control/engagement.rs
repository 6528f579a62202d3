//! Closed-loop engagement lifecycle
//!
//! An engagement is one activation-to-termination run of a control loop.
//! The [`super::Scheduler`] drives the hooks:
//!
//! 1. `on_start()` - once, after the engagement has been granted its actuators
//! 2. `execute(dt)` - every tick while active
//! 3. `is_finished()` - polled after every successful tick
//! 4. `on_end(interrupted)` - once, on normal end, interruption, or a failed tick

use serde::{Deserialize, Serialize};

use crate::Result;

/// Actuator groups an engagement can claim
///
/// At most one engagement commands a given set at any tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActuatorSet {
    Drivetrain,
    /// Flywheel and hood
    Shooter,
    /// Conveyor and indexer
    Indexer,
    Intake,
}

/// A control loop the scheduler can run
pub trait Engagement: Send {
    /// Name for logging
    fn name(&self) -> &str;

    /// Actuator sets this engagement commands
    fn requirements(&self) -> &[ActuatorSet];

    /// Called once when the engagement becomes active
    fn on_start(&mut self);

    /// Called every tick while active
    fn execute(&mut self, dt: f64) -> Result<()>;

    /// Whether the engagement has completed
    fn is_finished(&self) -> bool {
        false
    }

    /// Called once when the engagement stops for any reason
    fn on_end(&mut self, interrupted: bool);

    /// Current operating phase, for logging
    fn status(&self) -> &'static str;
}
