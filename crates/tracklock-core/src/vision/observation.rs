//! Target observation model
//!
//! Turns one frame of raw detections into at most one selected target: each
//! detection is classified against the robot's affiliation, filtered, given a
//! range estimate from the mount geometry, and the nearest survivor wins.

use serde::{Deserialize, Serialize};

/// Team affiliation of the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affiliation {
    Red,
    Blue,
}

impl Affiliation {
    /// Identity code the vision pipeline reports for objects of this affiliation
    pub fn code(self) -> f64 {
        match self {
            Self::Red => 0.0,
            Self::Blue => 1.0,
        }
    }

    /// The other affiliation
    pub fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }
}

/// Identity of a detection relative to the robot's affiliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    Friend,
    Foe,
    Unknown,
}

impl Identity {
    /// Classify a raw identity code against the robot's affiliation
    pub fn classify(code: f64, affiliation: Affiliation) -> Self {
        if code == affiliation.code() {
            Self::Friend
        } else if code == affiliation.opponent().code() {
            Self::Foe
        } else {
            Self::Unknown
        }
    }
}

/// Which identities a model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdentityFilter {
    /// Only detections matching the robot's affiliation
    #[default]
    Friend,
    /// Only detections of the opposing affiliation
    Foe,
    /// Every detection, known or not
    Any,
}

impl IdentityFilter {
    pub fn accepts(self, identity: Identity) -> bool {
        match self {
            Self::Friend => identity == Identity::Friend,
            Self::Foe => identity == Identity::Foe,
            Self::Any => true,
        }
    }
}

/// One raw detection from a vision frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Raw color/class code
    pub identity_code: f64,
    /// Angle from boresight to target, degrees, positive right
    pub horizontal_offset_deg: f64,
    /// Angle from boresight to target, degrees, positive up
    pub vertical_offset_deg: f64,
}

impl Detection {
    pub fn new(identity_code: f64, horizontal_offset_deg: f64, vertical_offset_deg: f64) -> Self {
        Self {
            identity_code,
            horizontal_offset_deg,
            vertical_offset_deg,
        }
    }

    fn is_finite(&self) -> bool {
        self.identity_code.is_finite()
            && self.horizontal_offset_deg.is_finite()
            && self.vertical_offset_deg.is_finite()
    }
}

/// Camera mount geometry used by the range projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MountGeometry {
    /// Lens height above the floor
    pub mount_height: f64,
    /// Upward tilt of the camera, degrees
    pub mount_angle_deg: f64,
    /// Height of the tracked feature above the floor
    pub target_height: f64,
    /// Added to every estimate
    pub calibration_offset: f64,
    /// Negate the reported vertical offset (camera mounted upside down)
    pub invert_vertical_offset: bool,
}

impl Default for MountGeometry {
    fn default() -> Self {
        Self {
            mount_height: 24.0,
            mount_angle_deg: 30.0,
            target_height: 104.0,
            calibration_offset: 0.0,
            invert_vertical_offset: false,
        }
    }
}

impl MountGeometry {
    /// Set the calibration offset
    pub fn with_calibration_offset(mut self, offset: f64) -> Self {
        self.calibration_offset = offset;
        self
    }

    /// Set whether the vertical offset is negated
    pub fn with_inverted_vertical_offset(mut self, invert: bool) -> Self {
        self.invert_vertical_offset = invert;
        self
    }

    /// Project a vertical offset to a floor distance
    ///
    /// Returns `None` when the projection is degenerate (target at or above
    /// the horizon) or yields a non-positive distance.
    pub fn range_estimate(&self, vertical_offset_deg: f64) -> Option<f64> {
        let vertical = if self.invert_vertical_offset {
            -vertical_offset_deg
        } else {
            vertical_offset_deg
        };
        let angle = (self.mount_angle_deg + vertical).to_radians();
        let range =
            (self.target_height - self.mount_height) / angle.tan() + self.calibration_offset;
        (range.is_finite() && range > 0.0).then_some(range)
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.mount_height.is_finite()
            && self.mount_angle_deg.is_finite()
            && self.target_height.is_finite()
            && self.calibration_offset.is_finite()
    }
}

/// The target selected for this tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetObservation {
    pub identity: Identity,
    pub range_estimate: f64,
    pub horizontal_offset_deg: f64,
}

/// Selects at most one target per frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationModel {
    pub geometry: MountGeometry,
    pub filter: IdentityFilter,
}

impl ObservationModel {
    pub fn new(geometry: MountGeometry, filter: IdentityFilter) -> Self {
        Self { geometry, filter }
    }

    /// Pick the nearest accepted detection
    ///
    /// Malformed detections are dropped one at a time; the rest of the frame
    /// is still considered. `None` means nothing in the frame qualified.
    pub fn select(
        &self,
        detections: &[Detection],
        affiliation: Affiliation,
    ) -> Option<TargetObservation> {
        let mut nearest: Option<TargetObservation> = None;

        for detection in detections {
            if !detection.is_finite() {
                tracing::warn!("discarding non-finite detection: {:?}", detection);
                continue;
            }

            let identity = Identity::classify(detection.identity_code, affiliation);
            if !self.filter.accepts(identity) {
                continue;
            }

            let Some(range) = self.geometry.range_estimate(detection.vertical_offset_deg) else {
                tracing::debug!(
                    "discarding detection with no valid range: {:?}",
                    detection
                );
                continue;
            };

            if nearest.map_or(true, |best| range < best.range_estimate) {
                nearest = Some(TargetObservation {
                    identity,
                    range_estimate: range,
                    horizontal_offset_deg: detection.horizontal_offset_deg,
                });
            }
        }

        nearest
    }
}
