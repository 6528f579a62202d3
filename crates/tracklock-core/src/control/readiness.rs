//! Firing readiness gate
//!
//! Three independent predicates guard the irreversible fire action: hood
//! position, flywheel speed, and a loaded payload. The hood and flywheel
//! checks also issue the correcting command when they fail; the mechanism
//! catches up over the following ticks and the gate is simply re-evaluated.

use serde::{Deserialize, Serialize};

use crate::hardware::{Indexer, PayloadIdentity, Shooter};
use crate::{Error, Result};

/// Cubic flywheel speed model, one polynomial per hood position
///
/// Coefficients are ordered `[c3, c2, c1, c0]` for
/// `c3 r^3 + c2 r^2 + c1 r + c0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedModel {
    pub hood_up: [f64; 4],
    pub hood_down: [f64; 4],
}

impl Default for SpeedModel {
    fn default() -> Self {
        Self {
            hood_up: [0.0, 0.0, 0.0, 0.0],
            hood_down: [0.000257791, -0.0448, 9.24, 1191.15],
        }
    }
}

impl SpeedModel {
    /// Flywheel speed (RPM) for a range and hood position
    pub fn speed(&self, range: f64, hood_up: bool) -> f64 {
        let [c3, c2, c1, c0] = if hood_up { self.hood_up } else { self.hood_down };
        c3.mul_add(range, c2).mul_add(range, c1).mul_add(range, c0)
    }
}

/// Readiness gate configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Range below which the hood should be up
    pub hood_threshold: f64,
    /// Half-width of the band around the threshold where the hood is left alone
    pub hood_overlap: f64,
    /// Largest |current - desired| flywheel speed counted as spooled (RPM)
    pub flywheel_tolerance: f64,
    /// Flywheel speed held while searching (RPM)
    pub idle_speed: f64,
    pub speed_model: SpeedModel,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            hood_threshold: 5.0,
            hood_overlap: 1.0,
            flywheel_tolerance: 3.0,
            idle_speed: 1400.0,
            speed_model: SpeedModel::default(),
        }
    }
}

impl ReadinessConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.hood_threshold.is_finite() || !(self.hood_overlap >= 0.0) {
            return Err(Error::Config("hood band must be finite with a non-negative overlap".into()));
        }
        if !(self.flywheel_tolerance >= 0.0) || !self.idle_speed.is_finite() {
            return Err(Error::Config("flywheel tolerance and idle speed are invalid".into()));
        }
        let model = self.speed_model.hood_up.iter().chain(&self.speed_model.hood_down);
        if model.clone().any(|c| !c.is_finite()) {
            return Err(Error::Config("speed model coefficients must be finite".into()));
        }
        Ok(())
    }
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub hood: bool,
    pub flywheel: bool,
    pub payload: bool,
}

impl Readiness {
    /// All mechanism predicates hold
    pub fn all(&self) -> bool {
        self.hood && self.flywheel && self.payload
    }

    /// Composite firing predicate
    pub fn can_fire(&self, aligned: bool) -> bool {
        aligned && self.all()
    }
}

/// Hood, flywheel and payload predicates
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    config: ReadinessConfig,
}

impl ReadinessGate {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    /// Hood position wanted at a range, given where it is now
    ///
    /// Inside the overlap band the current position is kept, so range noise
    /// near the threshold does not toggle the hood back and forth.
    pub fn desired_hood(&self, range: f64, hood_up: bool) -> bool {
        if range < self.config.hood_threshold - self.config.hood_overlap {
            true
        } else if range > self.config.hood_threshold + self.config.hood_overlap {
            false
        } else {
            hood_up
        }
    }

    /// Check the hood, commanding a toggle if it is wrong
    pub fn check_hood(&self, shooter: &dyn Shooter, range: f64, hood_up: bool) -> bool {
        let desired = self.desired_hood(range, hood_up);
        if desired != hood_up {
            tracing::debug!("hood toggling to {}", if desired { "up" } else { "down" });
            shooter.set_hood_up(desired);
            false
        } else {
            true
        }
    }

    /// Check the flywheel, commanding the model speed if it is off
    pub fn check_flywheel(&self, shooter: &dyn Shooter, range: f64, hood_up: bool) -> bool {
        let desired = self.config.speed_model.speed(range, hood_up);
        let current = shooter.current_speed();
        if (current - desired).abs() <= self.config.flywheel_tolerance {
            true
        } else {
            shooter.set_target_speed(desired);
            false
        }
    }

    /// A payload is indexed and its identity was recorded
    pub fn payload_ready(&self, indexer: &dyn Indexer) -> bool {
        indexer.has_payload() && indexer.payload_identity() != PayloadIdentity::None
    }

    /// Evaluate all three predicates for this tick
    ///
    /// The hood position is sampled once so both mechanism checks see the
    /// same value.
    pub fn evaluate(&self, shooter: &dyn Shooter, indexer: &dyn Indexer, range: f64) -> Readiness {
        let hood_up = shooter.hood_up();
        Readiness {
            hood: self.check_hood(shooter, range, hood_up),
            flywheel: self.check_flywheel(shooter, range, hood_up),
            payload: self.payload_ready(indexer),
        }
    }

    /// Flywheel speed held while searching
    pub fn idle_speed(&self) -> f64 {
        self.config.idle_speed
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }
}
