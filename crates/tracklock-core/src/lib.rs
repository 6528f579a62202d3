//! tracklock-core: closed-loop targeting and collection control
//!
//! Fuses an intermittent vision sensor with two PID loops (range and heading)
//! to drive a differential robot onto a target, gates the firing sequence
//! behind hood, flywheel and payload readiness, and runs a sibling loop that
//! drives onto loose objects and collects them.
//!
//! # Modules
//!
//! - [`vision`] - Detection filtering and range estimation
//! - [`control`] - PID, approach controller, readiness gate, engagements, scheduler
//! - [`hardware`] - Collaborator traits and the geared drivetrain
//! - [`config`] - Tuning constants
//! - [`sim`] - In-memory collaborators for tests and benches
//!
//! # Data flow
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────┐
//! │ VisionSource │───►│ ObservationModel │───►│   Approach   │──► drivetrain
//! └──────────────┘    └──────────────────┘    │  Controller  │
//!                              │              └──────────────┘
//!                              ▼                     │
//!                     ┌──────────────────┐           ▼
//!                     │  ReadinessGate   │───► OperatingState ──► flywheel, hood, indexer
//!                     └──────────────────┘
//! ```
//!
//! Every engagement is ticked by a [`control::Scheduler`], which hands each
//! actuator set to at most one engagement at a time.

#![warn(unused_must_use)]

pub mod config;
pub mod control;
pub mod hardware;
pub mod sim;
pub mod vision;

pub use config::{CollectConfig, ShooterConfig};
pub use control::{
    ActuatorSet, ApproachController, CollectEngagement, Engagement, OperatingState, Pid,
    PidConfig, ReadinessGate, Scheduler, ShooterEngagement, TickLoop,
};
pub use hardware::{AffiliationProvider, Drivetrain, Indexer, Intake, PayloadIdentity, Shooter};
pub use vision::{Affiliation, Detection, Identity, ObservationModel, TargetObservation, VisionSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for tracklock-core
///
/// Losing sight of a target is not an error; engagements fall back to their
/// search behaviour instead. Errors cover broken configuration, missing
/// collaborators and hardware faults.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// Invalid tuning constant.
    /// Handle by: fixing the config before constructing the engagement.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An engagement was built without a collaborator it needs.
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// An actuator rejected a command (jam, bus fault, ...).
    /// Handle by: letting the scheduler end the engagement, then inspecting the mechanism.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// The vision driver failed to produce a frame.
    #[error("Vision error: {0}")]
    Vision(String),

    /// Operation attempted in an invalid state (e.g., cancelling an unknown engagement).
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias for tracklock-core operations
pub type Result<T> = std::result::Result<T, Error>;
