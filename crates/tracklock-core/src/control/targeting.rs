//! Targeting state machine
//!
//! Each tick the shooter engagement selects a target, runs the readiness gate
//! and the approach controller, and reports the first unmet condition as its
//! operating state. Firing is only issued when every predicate holds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::approach::ApproachController;
use super::engagement::{ActuatorSet, Engagement};
use super::readiness::{Readiness, ReadinessGate};
use crate::config::ShooterConfig;
use crate::hardware::{AffiliationProvider, Drivetrain, Indexer, PayloadIdentity, Shooter};
use crate::vision::{self, Affiliation, ObservationModel, TargetObservation, VisionSource};
use crate::{Error, Result};

/// Operating state of a targeting engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingState {
    NoTarget,
    Approaching,
    SettingHood,
    Spooling,
    AwaitingPayload,
    Firing,
    /// Not running
    Idle,
}

/// Predicate snapshot for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gates {
    pub has_target: bool,
    pub aligned: bool,
    pub hood: bool,
    pub flywheel: bool,
    pub payload: bool,
}

impl Gates {
    fn with_readiness(aligned: bool, readiness: Readiness) -> Self {
        Self {
            has_target: true,
            aligned,
            hood: readiness.hood,
            flywheel: readiness.flywheel,
            payload: readiness.payload,
        }
    }
}

impl OperatingState {
    /// State for a predicate snapshot: the first failing predicate, in
    /// priority order, names the state
    pub fn from_gates(gates: Gates) -> Self {
        if !gates.has_target {
            Self::NoTarget
        } else if !gates.aligned {
            Self::Approaching
        } else if !gates.hood {
            Self::SettingHood
        } else if !gates.flywheel {
            Self::Spooling
        } else if !gates.payload {
            Self::AwaitingPayload
        } else {
            Self::Firing
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoTarget => "no_target",
            Self::Approaching => "approaching",
            Self::SettingHood => "setting_hood",
            Self::Spooling => "spooling",
            Self::AwaitingPayload => "awaiting_payload",
            Self::Firing => "firing",
            Self::Idle => "idle",
        }
    }
}

const SHOOTER_REQUIREMENTS: [ActuatorSet; 3] = [
    ActuatorSet::Drivetrain,
    ActuatorSet::Shooter,
    ActuatorSet::Indexer,
];

/// Find, approach, align to and fire at a target
pub struct ShooterEngagement {
    model: ObservationModel,
    approach: ApproachController,
    gate: ReadinessGate,
    drivetrain: Arc<dyn Drivetrain>,
    shooter: Arc<dyn Shooter>,
    indexer: Arc<dyn Indexer>,
    vision: Arc<dyn VisionSource>,
    affiliation_source: Arc<dyn AffiliationProvider>,
    affiliation: Affiliation,
    state: OperatingState,
    last_observation: Option<TargetObservation>,
    last_range: Option<f64>,
    shots: u64,
    active: bool,
}

impl ShooterEngagement {
    pub fn builder(config: ShooterConfig) -> ShooterEngagementBuilder {
        ShooterEngagementBuilder {
            config,
            drivetrain: None,
            shooter: None,
            indexer: None,
            vision: None,
            affiliation: None,
        }
    }

    /// Operating state from the latest tick
    pub fn state(&self) -> OperatingState {
        self.state
    }

    /// Target selected on the latest tick
    pub fn observation(&self) -> Option<&TargetObservation> {
        self.last_observation.as_ref()
    }

    /// Range of the most recent target seen in this engagement
    pub fn last_range(&self) -> Option<f64> {
        self.last_range
    }

    /// Fire actions issued in this engagement
    pub fn shots(&self) -> u64 {
        self.shots
    }

    /// Affiliation cached at the start of the engagement
    pub fn affiliation(&self) -> Affiliation {
        self.affiliation
    }

    pub fn approach(&self) -> &ApproachController {
        &self.approach
    }

    fn set_state(&mut self, state: OperatingState) {
        if state != self.state {
            tracing::debug!("shooter: {} -> {}", self.state.as_str(), state.as_str());
            self.state = state;
        }
    }

    fn track(&mut self, observation: TargetObservation, dt: f64) -> Result<OperatingState> {
        let range = observation.range_estimate;
        self.last_range = Some(range);

        let readiness = self
            .gate
            .evaluate(self.shooter.as_ref(), self.indexer.as_ref(), range);
        let accurate = self.indexer.payload_identity() != PayloadIdentity::Foe;
        let aligned = self
            .approach
            .step(self.drivetrain.as_ref(), Some(&observation), accurate, dt);

        let state = OperatingState::from_gates(Gates::with_readiness(aligned, readiness));
        if state == OperatingState::Firing {
            self.set_state(state);
            self.indexer.advance_one_payload()?;
            self.shots += 1;
            tracing::info!("shooter: fired at range {:.1} (shot {})", range, self.shots);
        }
        Ok(state)
    }
}

impl Engagement for ShooterEngagement {
    fn name(&self) -> &str {
        "shooter"
    }

    fn requirements(&self) -> &[ActuatorSet] {
        &SHOOTER_REQUIREMENTS
    }

    fn on_start(&mut self) {
        self.affiliation = self.affiliation_source.affiliation();
        self.approach.begin();
        self.last_observation = None;
        self.last_range = None;
        self.shots = 0;
        self.state = OperatingState::Idle;
        self.active = true;
        tracing::info!("shooter: engaged as {:?}", self.affiliation);
    }

    fn execute(&mut self, dt: f64) -> Result<()> {
        let frame = vision::read_frame(self.vision.as_ref());
        let observation = self.model.select(&frame, self.affiliation);
        self.last_observation = observation;

        let state = match observation {
            Some(observation) => self.track(observation, dt)?,
            None => {
                self.shooter.set_target_speed(self.gate.idle_speed());
                self.approach.search(self.drivetrain.as_ref());
                OperatingState::NoTarget
            }
        };
        self.set_state(state);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        !self.indexer.payload_in_feed_path()
    }

    fn on_end(&mut self, interrupted: bool) {
        self.drivetrain.stop();
        self.shooter.stop();
        let released = self.approach.release();
        self.set_state(OperatingState::Idle);
        self.active = false;
        if released {
            tracing::info!(
                "shooter: ended{} after {} shots",
                if interrupted { " (interrupted)" } else { "" },
                self.shots
            );
        }
    }

    fn status(&self) -> &'static str {
        self.state.as_str()
    }
}

impl Drop for ShooterEngagement {
    fn drop(&mut self) {
        if self.active {
            self.on_end(true);
        }
    }
}

/// Builder that refuses to produce an engagement with missing collaborators
pub struct ShooterEngagementBuilder {
    config: ShooterConfig,
    drivetrain: Option<Arc<dyn Drivetrain>>,
    shooter: Option<Arc<dyn Shooter>>,
    indexer: Option<Arc<dyn Indexer>>,
    vision: Option<Arc<dyn VisionSource>>,
    affiliation: Option<Arc<dyn AffiliationProvider>>,
}

impl ShooterEngagementBuilder {
    pub fn drivetrain(mut self, drivetrain: Arc<dyn Drivetrain>) -> Self {
        self.drivetrain = Some(drivetrain);
        self
    }

    pub fn shooter(mut self, shooter: Arc<dyn Shooter>) -> Self {
        self.shooter = Some(shooter);
        self
    }

    pub fn indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn vision(mut self, vision: Arc<dyn VisionSource>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn affiliation(mut self, affiliation: Arc<dyn AffiliationProvider>) -> Self {
        self.affiliation = Some(affiliation);
        self
    }

    pub fn build(self) -> Result<ShooterEngagement> {
        self.config.validate()?;
        let affiliation_source = self
            .affiliation
            .ok_or(Error::MissingCollaborator("affiliation"))?;
        let affiliation = affiliation_source.affiliation();

        Ok(ShooterEngagement {
            model: ObservationModel::new(self.config.mount, self.config.target_filter),
            approach: ApproachController::new(self.config.approach),
            gate: ReadinessGate::new(self.config.readiness),
            drivetrain: self
                .drivetrain
                .ok_or(Error::MissingCollaborator("drivetrain"))?,
            shooter: self.shooter.ok_or(Error::MissingCollaborator("shooter"))?,
            indexer: self.indexer.ok_or(Error::MissingCollaborator("indexer"))?,
            vision: self.vision.ok_or(Error::MissingCollaborator("vision"))?,
            affiliation_source,
            affiliation,
            state: OperatingState::Idle,
            last_observation: None,
            last_range: None,
            shots: 0,
            active: false,
        })
    }
}
