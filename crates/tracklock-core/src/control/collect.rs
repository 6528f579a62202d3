//! Approach-and-collect loop
//!
//! Drives onto the nearest loose object with the same approach controller the
//! shooter uses, runs the intake roller, and ends when the range loop settles,
//! when the feed path entry sensor reports a newly captured payload, when the
//! indexer has no room left, or when nothing has been seen for the absence
//! timeout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::approach::ApproachController;
use super::engagement::{ActuatorSet, Engagement};
use crate::config::CollectConfig;
use crate::hardware::{AffiliationProvider, Drivetrain, Indexer, Intake, PayloadIdentity};
use crate::vision::{self, Affiliation, ObservationModel, VisionSource};
use crate::{Error, Result};

/// Operating phase of a collect engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectState {
    /// Nothing in view
    NoObject,
    /// Driving onto a visible object
    Approaching,
    /// Object out of view under the intake, roller slowed to pull it in
    Capturing,
    Idle,
}

impl CollectState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoObject => "no_object",
            Self::Approaching => "approaching",
            Self::Capturing => "capturing",
            Self::Idle => "idle",
        }
    }
}

/// Rising-edge detector on the feed path entry sensor
///
/// Fires when the reading changes to a present payload. A payload already
/// sitting at the entry when the edge is primed never fires on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadEdge {
    last: PayloadIdentity,
}

impl PayloadEdge {
    pub fn new(initial: PayloadIdentity) -> Self {
        Self { last: initial }
    }

    /// Feed this tick's reading; `true` on a new capture
    pub fn update(&mut self, now: PayloadIdentity) -> bool {
        let captured = now != self.last && now != PayloadIdentity::None;
        self.last = now;
        captured
    }

    pub fn last(&self) -> PayloadIdentity {
        self.last
    }
}

const COLLECT_REQUIREMENTS: [ActuatorSet; 2] = [ActuatorSet::Drivetrain, ActuatorSet::Intake];

/// Drive onto and collect loose objects
pub struct CollectEngagement {
    config: CollectConfig,
    model: ObservationModel,
    approach: ApproachController,
    drivetrain: Arc<dyn Drivetrain>,
    intake: Arc<dyn Intake>,
    indexer: Arc<dyn Indexer>,
    vision: Arc<dyn VisionSource>,
    affiliation_source: Arc<dyn AffiliationProvider>,
    affiliation: Affiliation,
    edge: PayloadEdge,
    state: CollectState,
    last_range: Option<f64>,
    absence_secs: f64,
    captured: bool,
    active: bool,
}

impl CollectEngagement {
    pub fn builder(config: CollectConfig) -> CollectEngagementBuilder {
        CollectEngagementBuilder {
            config,
            drivetrain: None,
            intake: None,
            indexer: None,
            vision: None,
            affiliation: None,
        }
    }

    pub fn state(&self) -> CollectState {
        self.state
    }

    /// Range of the object when it was last in view
    pub fn last_range(&self) -> Option<f64> {
        self.last_range
    }

    /// Seconds since an object was last in view
    pub fn absence_secs(&self) -> f64 {
        self.absence_secs
    }

    /// A new payload reached the feed path in this engagement
    pub fn captured(&self) -> bool {
        self.captured
    }

    pub fn approach(&self) -> &ApproachController {
        &self.approach
    }

    fn set_state(&mut self, state: CollectState) {
        if state != self.state {
            tracing::debug!("collect: {} -> {}", self.state.as_str(), state.as_str());
            self.state = state;
        }
    }

    fn roller_for_lost_object(&self) -> (f64, CollectState) {
        let close = self
            .last_range
            .map_or(false, |range| range < self.config.capture_range);
        if close && self.intake.roller_position() > self.config.capture_roller_travel {
            (self.config.capture_roller_speed, CollectState::Capturing)
        } else {
            (self.config.full_roller_speed, CollectState::NoObject)
        }
    }
}

impl Engagement for CollectEngagement {
    fn name(&self) -> &str {
        "collect"
    }

    fn requirements(&self) -> &[ActuatorSet] {
        &COLLECT_REQUIREMENTS
    }

    fn on_start(&mut self) {
        self.affiliation = self.affiliation_source.affiliation();
        self.approach.begin();
        self.edge = PayloadEdge::new(self.indexer.entry_identity());
        self.state = CollectState::Idle;
        self.last_range = None;
        self.absence_secs = 0.0;
        self.captured = false;
        self.active = true;
        tracing::info!("collect: engaged");
    }

    fn execute(&mut self, dt: f64) -> Result<()> {
        let frame = vision::read_frame(self.vision.as_ref());
        let observation = self.model.select(&frame, self.affiliation);

        let state = match observation {
            Some(observation) => {
                self.absence_secs = 0.0;
                self.last_range = Some(observation.range_estimate);
                self.approach
                    .step(self.drivetrain.as_ref(), Some(&observation), true, dt);
                self.intake.zero_roller_position();
                self.intake.set_roller_speed(self.config.full_roller_speed);
                CollectState::Approaching
            }
            None => {
                self.absence_secs += dt;
                self.approach.search(self.drivetrain.as_ref());
                let (speed, state) = self.roller_for_lost_object();
                self.intake.set_roller_speed(speed);
                state
            }
        };
        self.set_state(state);

        if self.edge.update(self.indexer.entry_identity()) {
            tracing::info!("collect: captured {:?}", self.edge.last());
            self.captured = true;
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.approach.range_at_setpoint()
            || self.captured
            || self.indexer.is_full()
            || self.absence_secs >= self.config.absence_timeout_secs
    }

    fn on_end(&mut self, interrupted: bool) {
        self.drivetrain.stop();
        self.intake.stop();
        let released = self.approach.release();
        self.set_state(CollectState::Idle);
        self.active = false;
        if released {
            tracing::info!(
                "collect: ended{} (captured: {})",
                if interrupted { " (interrupted)" } else { "" },
                self.captured
            );
        }
    }

    fn status(&self) -> &'static str {
        self.state.as_str()
    }
}

impl Drop for CollectEngagement {
    fn drop(&mut self) {
        if self.active {
            self.on_end(true);
        }
    }
}

pub struct CollectEngagementBuilder {
    config: CollectConfig,
    drivetrain: Option<Arc<dyn Drivetrain>>,
    intake: Option<Arc<dyn Intake>>,
    indexer: Option<Arc<dyn Indexer>>,
    vision: Option<Arc<dyn VisionSource>>,
    affiliation: Option<Arc<dyn AffiliationProvider>>,
}

impl CollectEngagementBuilder {
    pub fn drivetrain(mut self, drivetrain: Arc<dyn Drivetrain>) -> Self {
        self.drivetrain = Some(drivetrain);
        self
    }

    pub fn intake(mut self, intake: Arc<dyn Intake>) -> Self {
        self.intake = Some(intake);
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

    pub fn build(self) -> Result<CollectEngagement> {
        self.config.validate()?;
        let affiliation_source = self
            .affiliation
            .ok_or(Error::MissingCollaborator("affiliation"))?;
        let affiliation = affiliation_source.affiliation();

        Ok(CollectEngagement {
            model: ObservationModel::new(self.config.mount, self.config.object_filter),
            approach: ApproachController::new(self.config.approach),
            drivetrain: self
                .drivetrain
                .ok_or(Error::MissingCollaborator("drivetrain"))?,
            intake: self.intake.ok_or(Error::MissingCollaborator("intake"))?,
            indexer: self.indexer.ok_or(Error::MissingCollaborator("indexer"))?,
            vision: self.vision.ok_or(Error::MissingCollaborator("vision"))?,
            affiliation_source,
            affiliation,
            edge: PayloadEdge::new(PayloadIdentity::None),
            state: CollectState::Idle,
            last_range: None,
            absence_secs: 0.0,
            captured: false,
            active: false,
            config: self.config,
        })
    }
}
