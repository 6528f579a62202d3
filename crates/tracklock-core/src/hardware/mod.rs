//! Hardware abstraction
//!
//! Collaborator traits for the actuators and sensors the control loops
//! drive, plus the two-speed drivetrain wrapper.

mod drivetrain;
mod traits;

pub use drivetrain::{DriveMotors, Gear, GearedDrivetrain, GearingConfig};
pub use traits::{AffiliationProvider, Drivetrain, Indexer, Intake, PayloadIdentity, Shooter};
