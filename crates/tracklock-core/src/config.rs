//! Tuning constants
//!
//! Every engagement is built from one of these configs. They carry the
//! robot's calibrated defaults and derive serde so a host can load them from
//! wherever it keeps tuning data.

use serde::{Deserialize, Serialize};

use crate::control::{ApproachConfig, PidConfig, RangeSetpoint, ReadinessConfig, SearchBehavior};
use crate::vision::{IdentityFilter, MountGeometry};
use crate::{Error, Result};

/// Shooter targeting configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShooterConfig {
    pub approach: ApproachConfig,
    pub readiness: ReadinessConfig,
    /// Targeting camera geometry
    pub mount: MountGeometry,
    /// Which detections count as the goal
    pub target_filter: IdentityFilter,
}

impl Default for ShooterConfig {
    fn default() -> Self {
        Self {
            approach: ApproachConfig::default(),
            readiness: ReadinessConfig::default(),
            mount: MountGeometry::default(),
            target_filter: IdentityFilter::Friend,
        }
    }
}

impl ShooterConfig {
    /// Set the camera geometry
    pub fn with_mount(mut self, mount: MountGeometry) -> Self {
        self.mount = mount;
        self
    }

    /// Set the readiness gate
    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }

    /// Check every constant before an engagement is built
    pub fn validate(&self) -> Result<()> {
        self.approach.validate()?;
        self.readiness.validate()?;
        validate_mount(&self.mount)
    }
}

/// Approach-and-collect configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollectConfig {
    pub approach: ApproachConfig,
    /// Object camera geometry
    pub mount: MountGeometry,
    /// Which detections count as collectable
    pub object_filter: IdentityFilter,
    /// Last seen range below which the roller switches to capture speed
    pub capture_range: f64,
    /// Roller rotations since losing sight before capture speed applies
    pub capture_roller_travel: f64,
    /// Roller speed while pulling an object into the feed path (RPM)
    pub capture_roller_speed: f64,
    /// Roller speed otherwise (RPM)
    pub full_roller_speed: f64,
    /// Seconds without a detection before the engagement gives up
    pub absence_timeout_secs: f64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            approach: ApproachConfig {
                heading: PidConfig::p(0.005).with_tolerance(1.0, 1.0),
                range: PidConfig::p(0.02).with_tolerance(1.0, 1.0),
                range_setpoint: RangeSetpoint::Fixed(0.0),
                ok_to_advance_deg: f64::INFINITY,
                miss_offset_deg: 0.0,
                max_drive_power: 0.5,
                search: SearchBehavior::Stop,
            }
            .with_max_drive_power(0.5),
            mount: MountGeometry {
                mount_height: 30.0,
                mount_angle_deg: -20.0,
                target_height: 4.75,
                calibration_offset: 19.0,
                invert_vertical_offset: true,
            },
            object_filter: IdentityFilter::Any,
            capture_range: 50.0,
            capture_roller_travel: 20.0,
            capture_roller_speed: 1500.0,
            full_roller_speed: 5600.0,
            absence_timeout_secs: 2.0,
        }
    }
}

impl CollectConfig {
    /// Set the camera geometry
    pub fn with_mount(mut self, mount: MountGeometry) -> Self {
        self.mount = mount;
        self
    }

    /// Set the detection-absence timeout
    pub fn with_absence_timeout(mut self, secs: f64) -> Self {
        self.absence_timeout_secs = secs;
        self
    }

    /// Check every constant before an engagement is built
    pub fn validate(&self) -> Result<()> {
        self.approach.validate()?;
        validate_mount(&self.mount)?;
        if !(self.absence_timeout_secs > 0.0) {
            return Err(Error::Config(format!(
                "absence timeout {} must be positive",
                self.absence_timeout_secs
            )));
        }
        let finite = [
            self.capture_range,
            self.capture_roller_travel,
            self.capture_roller_speed,
            self.full_roller_speed,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(Error::Config("capture constants must be finite".into()));
        }
        Ok(())
    }
}

fn validate_mount(mount: &MountGeometry) -> Result<()> {
    if mount.is_finite() {
        Ok(())
    } else {
        Err(Error::Config("mount geometry must be finite".into()))
    }
}
