//! Dual-axis approach controller
//!
//! Two independent loops share one differential drivetrain: the heading loop
//! steers (added to one side, subtracted from the other) and the range loop
//! advances (applied equally to both sides). The range loop only engages once
//! the heading is inside the ok-to-advance band.
//!
//! Sign conventions: a positive horizontal offset means the target is to the
//! right, and positive power drives forward. Steering toward the target is
//! `left = advance + steer`, `right = advance - steer`.

use serde::{Deserialize, Serialize};

use super::pid::{Pid, PidConfig};
use crate::hardware::Drivetrain;
use crate::vision::TargetObservation;
use crate::{Error, Result};

/// How the range loop picks its setpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RangeSetpoint {
    /// Latch the live range, clamped to [min, max], the first time the range
    /// loop engages; hold it until the engagement restarts
    Latched { min: f64, max: f64 },
    /// Always drive to this range
    Fixed(f64),
}

/// What to command when nothing is in view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SearchBehavior {
    /// Rotate in place with this (left, right) power pair
    Sweep { left: f64, right: f64 },
    /// Hold still
    Stop,
}

/// Approach controller configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ApproachConfig {
    /// Heading loop, measured in degrees of horizontal offset
    pub heading: PidConfig,
    /// Range loop, measured in range estimate units
    pub range: PidConfig,
    pub range_setpoint: RangeSetpoint,
    /// Heading error band inside which the range loop may run
    pub ok_to_advance_deg: f64,
    /// Heading setpoint used when deliberately aiming off target
    pub miss_offset_deg: f64,
    /// Largest |power| commanded to either drive side
    pub max_drive_power: f64,
    pub search: SearchBehavior,
}

impl Default for ApproachConfig {
    fn default() -> Self {
        Self {
            heading: PidConfig::p(0.1)
                .with_output_bound(1.0)
                .with_tolerance(3.0, 1.0),
            range: PidConfig::p(0.2)
                .with_output_bound(1.0)
                .with_tolerance(1.0, 1.0),
            range_setpoint: RangeSetpoint::Latched {
                min: 20.0,
                max: 160.0,
            },
            ok_to_advance_deg: 5.0,
            miss_offset_deg: 45.0,
            max_drive_power: 1.0,
            search: SearchBehavior::Sweep {
                left: 0.5,
                right: -0.5,
            },
        }
    }
}

impl ApproachConfig {
    /// Set the drive power bound, also bounding both loop outputs
    pub fn with_max_drive_power(mut self, power: f64) -> Self {
        self.max_drive_power = power;
        self.heading = self.heading.with_output_bound(power);
        self.range = self.range.with_output_bound(power);
        self
    }

    /// Set the behaviour with nothing in view
    pub fn with_search(mut self, search: SearchBehavior) -> Self {
        self.search = search;
        self
    }

    /// Set the range setpoint policy
    pub fn with_range_setpoint(mut self, setpoint: RangeSetpoint) -> Self {
        self.range_setpoint = setpoint;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.heading.validate("heading")?;
        self.range.validate("range")?;
        if !(self.max_drive_power > 0.0 && self.max_drive_power <= 1.0) {
            return Err(Error::Config(format!(
                "max drive power {} outside (0, 1]",
                self.max_drive_power
            )));
        }
        if !(self.ok_to_advance_deg >= 0.0) || !self.miss_offset_deg.is_finite() {
            return Err(Error::Config("heading bands must be non-negative and finite".into()));
        }
        match self.range_setpoint {
            RangeSetpoint::Latched { min, max } if !(min.is_finite() && max.is_finite() && min <= max) => {
                Err(Error::Config(format!("range band [{min}, {max}] is invalid")))
            }
            RangeSetpoint::Fixed(range) if !range.is_finite() => {
                Err(Error::Config("fixed range setpoint must be finite".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Drive command issued for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveCommand {
    pub left: f64,
    pub right: f64,
}

/// Heading and range loops for one engagement
#[derive(Debug, Clone)]
pub struct ApproachController {
    config: ApproachConfig,
    heading: Pid,
    range: Pid,
    latched_range: Option<f64>,
    last_command: DriveCommand,
}

impl ApproachController {
    pub fn new(config: ApproachConfig) -> Self {
        let mut range = Pid::new(config.range);
        if let RangeSetpoint::Fixed(setpoint) = config.range_setpoint {
            range.set_setpoint(setpoint);
        }
        Self {
            heading: Pid::new(config.heading),
            range,
            latched_range: None,
            last_command: DriveCommand::default(),
            config,
        }
    }

    /// Start a new engagement: clear both loops and the latched range
    pub fn begin(&mut self) {
        self.heading.rearm();
        self.range.rearm();
        self.latched_range = None;
        self.last_command = DriveCommand::default();
    }

    /// Run one tick
    ///
    /// With no observation both integrators are cleared and the search
    /// behaviour is commanded. Returns `true` when both loops are at their
    /// setpoints.
    pub fn step(
        &mut self,
        drivetrain: &dyn Drivetrain,
        observation: Option<&TargetObservation>,
        accurate: bool,
        dt: f64,
    ) -> bool {
        let Some(observation) = observation else {
            self.search(drivetrain);
            return false;
        };

        let heading_setpoint = if accurate {
            0.0
        } else {
            self.config.miss_offset_deg
        };
        self.heading.set_setpoint(heading_setpoint);

        let offset = observation.horizontal_offset_deg;
        let steer = -self.heading.calculate(offset, dt);

        let mut advance = 0.0;
        if (offset - heading_setpoint).abs() <= self.config.ok_to_advance_deg {
            self.latch_range(observation.range_estimate);
            advance = -self.range.calculate(observation.range_estimate, dt);
        } else {
            // The range loop only holds state for consecutive in-band ticks
            self.range.reset();
        }

        let bound = self.config.max_drive_power;
        let command = DriveCommand {
            left: clamp_power(advance + steer, bound),
            right: clamp_power(advance - steer, bound),
        };
        drivetrain.set_powers(command.left, command.right);
        self.last_command = command;

        tracing::trace!(
            "approach: offset={:.2} range={:.1} left={:.3} right={:.3}",
            offset,
            observation.range_estimate,
            command.left,
            command.right
        );

        self.at_setpoint()
    }

    fn latch_range(&mut self, range: f64) {
        if let RangeSetpoint::Latched { min, max } = self.config.range_setpoint {
            if self.latched_range.is_none() {
                let setpoint = range.clamp(min, max);
                self.range.set_setpoint(setpoint);
                self.latched_range = Some(setpoint);
                tracing::debug!("range setpoint latched at {:.1}", setpoint);
            }
        }
    }

    /// Clear both integrators and run the search behaviour
    pub fn search(&mut self, drivetrain: &dyn Drivetrain) {
        self.heading.reset();
        self.range.reset();

        let command = match self.config.search {
            SearchBehavior::Sweep { left, right } => {
                let bound = self.config.max_drive_power;
                let command = DriveCommand {
                    left: clamp_power(left, bound),
                    right: clamp_power(right, bound),
                };
                drivetrain.set_powers(command.left, command.right);
                command
            }
            SearchBehavior::Stop => {
                drivetrain.stop();
                DriveCommand::default()
            }
        };
        self.last_command = command;
    }

    /// Both loops inside their tolerance bands
    pub fn at_setpoint(&self) -> bool {
        self.heading.at_setpoint() && self.range.at_setpoint()
    }

    /// Range loop inside its tolerance band
    pub fn range_at_setpoint(&self) -> bool {
        self.range.at_setpoint()
    }

    /// Range setpoint latched in this engagement, if any
    pub fn latched_range(&self) -> Option<f64> {
        self.latched_range
    }

    /// Drive command from the latest tick
    pub fn last_command(&self) -> DriveCommand {
        self.last_command
    }

    /// Reset and release both loops
    ///
    /// Returns `true` if this call released anything.
    pub fn release(&mut self) -> bool {
        let heading = self.heading.release();
        let range = self.range.release();
        heading || range
    }

    /// Whether both loops are released
    pub fn is_released(&self) -> bool {
        self.heading.is_released() && self.range.is_released()
    }

    pub fn heading(&self) -> &Pid {
        &self.heading
    }

    pub fn range(&self) -> &Pid {
        &self.range
    }

    pub fn config(&self) -> &ApproachConfig {
        &self.config
    }
}

fn clamp_power(power: f64, bound: f64) -> f64 {
    if power.is_nan() {
        0.0
    } else {
        power.clamp(-bound, bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MockDrivetrain;
    use crate::vision::Identity;
    use approx::assert_relative_eq;

    const DT: f64 = 0.02;

    fn observation(offset: f64, range: f64) -> TargetObservation {
        TargetObservation {
            identity: Identity::Friend,
            range_estimate: range,
            horizontal_offset_deg: offset,
        }
    }

    #[test]
    fn test_search_sweep_without_target() {
        let drive = MockDrivetrain::new();
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();

        assert!(!approach.step(&drive, None, true, DT));
        assert_eq!(drive.powers(), (0.5, -0.5));
    }

    #[test]
    fn test_search_stop_variant() {
        let drive = MockDrivetrain::new();
        drive.set_powers(0.3, 0.3);
        let config = ApproachConfig::default().with_search(SearchBehavior::Stop);
        let mut approach = ApproachController::new(config);
        approach.begin();

        approach.step(&drive, None, true, DT);
        assert!(drive.is_stopped());
    }

    #[test]
    fn test_steers_toward_target_without_advancing() {
        let drive = MockDrivetrain::new();
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();

        // Target 10 degrees right: outside the ok-to-advance band
        let aligned = approach.step(&drive, Some(&observation(10.0, 200.0)), true, DT);
        assert!(!aligned);
        assert!(approach.latched_range().is_none());

        let (left, right) = drive.powers();
        assert!(left > 0.0 && right < 0.0, "should turn right: {left} {right}");
        assert_relative_eq!(left, -right);
    }

    #[test]
    fn test_range_latched_once_per_engagement() {
        let drive = MockDrivetrain::new();
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();

        approach.step(&drive, Some(&observation(1.0, 120.0)), true, DT);
        assert_eq!(approach.latched_range(), Some(120.0));

        for range in [80.0, 150.0, 300.0] {
            approach.step(&drive, Some(&observation(0.0, range)), true, DT);
            assert_eq!(approach.latched_range(), Some(120.0));
            assert_relative_eq!(approach.range().setpoint(), 120.0);
        }

        // Losing the target keeps the latch
        approach.step(&drive, None, true, DT);
        assert_eq!(approach.latched_range(), Some(120.0));

        approach.begin();
        assert!(approach.latched_range().is_none());
        approach.step(&drive, Some(&observation(0.0, 90.0)), true, DT);
        assert_eq!(approach.latched_range(), Some(90.0));
    }

    #[test]
    fn test_latched_range_clamped_to_operating_band() {
        let drive = MockDrivetrain::new();
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();

        approach.step(&drive, Some(&observation(0.0, 400.0)), true, DT);
        assert_eq!(approach.latched_range(), Some(160.0));

        // Too far: both sides drive forward at the bound
        let (left, right) = drive.powers();
        assert_relative_eq!(left, 1.0);
        assert_relative_eq!(right, 1.0);
    }

    #[test]
    fn test_aligned_and_in_range() {
        let drive = MockDrivetrain::new();
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();

        assert!(approach.step(&drive, Some(&observation(0.5, 100.0)), true, DT));
        assert!(approach.step(&drive, Some(&observation(0.5, 100.0)), true, DT));
    }

    #[test]
    fn test_intentional_miss_offsets_heading() {
        let drive = MockDrivetrain::new();
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();

        // Pointing straight at the target while wanting a 45 degree miss
        assert!(!approach.step(&drive, Some(&observation(0.0, 100.0)), false, DT));
        assert_relative_eq!(approach.heading().setpoint(), 45.0);
        assert!(approach.latched_range().is_none());

        // Offset by the miss angle: advances, and settles once the heading
        // error stops moving
        approach.step(&drive, Some(&observation(45.0, 100.0)), false, DT);
        assert_eq!(approach.latched_range(), Some(100.0));
        assert!(approach.step(&drive, Some(&observation(45.0, 100.0)), false, DT));
    }

    #[test]
    fn test_range_loop_cleared_outside_advance_band() {
        let drive = MockDrivetrain::new();
        // Heading tolerance wider than the ok-to-advance band
        let mut config = ApproachConfig::default();
        config.heading = config.heading.with_tolerance(20.0, f64::INFINITY);
        let mut approach = ApproachController::new(config);
        approach.begin();

        approach.step(&drive, Some(&observation(0.0, 100.0)), true, DT);
        assert!(approach.range_at_setpoint());

        // Drifted out of the band: the earlier range reading no longer counts
        let aligned = approach.step(&drive, Some(&observation(10.0, 100.0)), true, DT);
        assert!(!approach.range_at_setpoint());
        assert!(!aligned);
        assert_eq!(approach.latched_range(), Some(100.0));

        // Back in the band: the first reading carries no rate of change
        approach.step(&drive, Some(&observation(0.0, 100.5)), true, DT);
        assert_relative_eq!(approach.range().state().velocity_error, 0.0);
        assert!(approach.range_at_setpoint());
    }

    #[test]
    fn test_powers_within_bound() {
        let drive = MockDrivetrain::new();
        let config = ApproachConfig::default().with_max_drive_power(0.4);
        let mut approach = ApproachController::new(config);
        approach.begin();

        for (offset, range) in [(0.0, 1e9), (179.0, 1.0), (-179.0, 1e-9), (2.0, f64::MAX)] {
            approach.step(&drive, Some(&observation(offset, range)), true, DT);
            let (left, right) = drive.powers();
            assert!(left.abs() <= 0.4 && right.abs() <= 0.4, "{left} {right}");
        }
    }

    #[test]
    fn test_release_twice() {
        let mut approach = ApproachController::new(ApproachConfig::default());
        approach.begin();
        assert!(approach.release());
        assert!(!approach.release());
        assert!(approach.is_released());

        approach.begin();
        assert!(!approach.is_released());
    }
}
