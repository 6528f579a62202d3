//! In-memory collaborators
//!
//! Stand-ins for the actuators, sensors and vision pipeline, so engagements
//! can be driven tick by tick in tests and benches.

mod mock;
mod scripted;

pub use mock::{MockDrivetrain, MockIndexer, MockIntake, MockShooter, MockVision};
pub use scripted::{EngagementLog, ScriptedEngagement};
