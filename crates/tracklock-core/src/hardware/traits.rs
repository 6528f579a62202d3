//! Collaborator traits
//!
//! The control loops only see actuators and sensors through these traits so
//! the same engagement runs against real hardware or [`crate::sim`] mocks.
//! All methods take `&self`: implementations own their interior mutability,
//! and every read is a non-blocking snapshot.

use serde::{Deserialize, Serialize};

use crate::vision::Affiliation;
use crate::Result;

/// Differential drivetrain
pub trait Drivetrain: Send + Sync {
    /// Set left side power, clamped to [-1, 1]
    fn set_left_power(&self, power: f64);

    /// Set right side power, clamped to [-1, 1]
    fn set_right_power(&self, power: f64);

    /// Stop both sides
    fn stop(&self);

    /// Set both sides in one call
    fn set_powers(&self, left: f64, right: f64) {
        self.set_left_power(left);
        self.set_right_power(right);
    }
}

/// Flywheel and hood assembly
pub trait Shooter: Send + Sync {
    /// Command the flywheel closed-loop target speed (RPM)
    fn set_target_speed(&self, rpm: f64);

    /// Measured flywheel speed (RPM)
    fn current_speed(&self) -> f64;

    /// Command the hood position
    fn set_hood_up(&self, up: bool);

    /// Last reported hood position
    fn hood_up(&self) -> bool;

    /// Spin the flywheel down
    fn stop(&self);
}

/// Identity of the payload held by the indexer, relative to our affiliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PayloadIdentity {
    #[default]
    None,
    Friend,
    Foe,
}

/// Conveyor and indexer feeding the flywheel
pub trait Indexer: Send + Sync {
    /// Identity recorded for the payload at the firing position
    fn payload_identity(&self) -> PayloadIdentity;

    /// Whether a payload sits at the firing position
    fn has_payload(&self) -> bool;

    /// Whether any payload remains anywhere in the feed path
    fn payload_in_feed_path(&self) -> bool;

    /// Identity reported by the sensor at the feed path entry (belt slot)
    fn entry_identity(&self) -> PayloadIdentity;

    /// Push one payload into the flywheel
    fn advance_one_payload(&self) -> Result<()>;

    /// Both the firing position and the belt slot hold a payload
    fn is_full(&self) -> bool {
        self.payload_identity() != PayloadIdentity::None
            && self.entry_identity() != PayloadIdentity::None
    }
}

/// Intake roller
pub trait Intake: Send + Sync {
    /// Command the roller speed (RPM)
    fn set_roller_speed(&self, rpm: f64);

    /// Roller travel since the last zero, in rotations
    fn roller_position(&self) -> f64;

    /// Zero the roller travel counter
    fn zero_roller_position(&self);

    /// Stop the roller
    fn stop(&self);
}

/// Source of the robot's team affiliation
pub trait AffiliationProvider: Send + Sync {
    fn affiliation(&self) -> Affiliation;
}

impl AffiliationProvider for Affiliation {
    fn affiliation(&self) -> Affiliation {
        *self
    }
}
