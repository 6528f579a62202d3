//! Mock collaborators for testing without hardware
//!
//! Each mock records the commands it receives and reports whatever the test
//! sets. Commands never feed back into readings: a test that wants the hood
//! to move, or the flywheel to reach speed, sets the reported value itself.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::hardware::{Drivetrain, Indexer, Intake, PayloadIdentity, Shooter};
use crate::vision::{Detection, VisionSource};
use crate::{Error, Result};

const DRIVE_HISTORY_LEN: usize = 256;

#[derive(Debug)]
struct DriveState {
    left: f64,
    right: f64,
    stopped: bool,
    history: VecDeque<(f64, f64)>,
}

/// Drivetrain that records power commands
#[derive(Debug)]
pub struct MockDrivetrain {
    state: Mutex<DriveState>,
}

impl MockDrivetrain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DriveState {
                left: 0.0,
                right: 0.0,
                stopped: true,
                history: VecDeque::new(),
            }),
        }
    }

    /// Latest (left, right) powers
    pub fn powers(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.left, state.right)
    }

    /// Whether `stop` was the latest command
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Recent (left, right) pairs commanded through `set_powers`, oldest first
    pub fn history(&self) -> Vec<(f64, f64)> {
        self.state.lock().history.iter().copied().collect()
    }
}

impl Default for MockDrivetrain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drivetrain for MockDrivetrain {
    fn set_left_power(&self, power: f64) {
        let mut state = self.state.lock();
        state.left = power.clamp(-1.0, 1.0);
        state.stopped = false;
    }

    fn set_right_power(&self, power: f64) {
        let mut state = self.state.lock();
        state.right = power.clamp(-1.0, 1.0);
        state.stopped = false;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.left = 0.0;
        state.right = 0.0;
        state.stopped = true;
    }

    fn set_powers(&self, left: f64, right: f64) {
        let mut state = self.state.lock();
        state.left = left.clamp(-1.0, 1.0);
        state.right = right.clamp(-1.0, 1.0);
        state.stopped = false;
        let command = (state.left, state.right);
        if state.history.len() == DRIVE_HISTORY_LEN {
            state.history.pop_front();
        }
        state.history.push_back(command);
    }
}

#[derive(Debug, Default)]
struct ShooterState {
    target_speed: f64,
    measured_speed: f64,
    hood_reported: bool,
    hood_commands: Vec<bool>,
    stopped: bool,
}

/// Flywheel and hood with settable readings
#[derive(Debug, Default)]
pub struct MockShooter {
    state: Mutex<ShooterState>,
}

impl MockShooter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hood position the mock reports
    pub fn set_hood_reported(&self, up: bool) {
        self.state.lock().hood_reported = up;
    }

    /// Set the flywheel speed the mock reports
    pub fn set_measured_speed(&self, rpm: f64) {
        self.state.lock().measured_speed = rpm;
    }

    /// Latest commanded flywheel speed
    pub fn target_speed(&self) -> f64 {
        self.state.lock().target_speed
    }

    /// Every hood command received
    pub fn hood_commands(&self) -> Vec<bool> {
        self.state.lock().hood_commands.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl Shooter for MockShooter {
    fn set_target_speed(&self, rpm: f64) {
        let mut state = self.state.lock();
        state.target_speed = rpm;
        state.stopped = false;
    }

    fn current_speed(&self) -> f64 {
        self.state.lock().measured_speed
    }

    fn set_hood_up(&self, up: bool) {
        self.state.lock().hood_commands.push(up);
    }

    fn hood_up(&self) -> bool {
        self.state.lock().hood_reported
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.target_speed = 0.0;
        state.stopped = true;
    }
}

#[derive(Debug, Default)]
struct IndexerState {
    has_payload: bool,
    identity: PayloadIdentity,
    feed_path: bool,
    entry: PayloadIdentity,
    jammed: bool,
    advances: u64,
}

/// Indexer with settable sensors
///
/// `advance_one_payload` empties the firing position; the feed path flag is
/// left to the test.
#[derive(Debug, Default)]
pub struct MockIndexer {
    state: Mutex<IndexerState>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the firing position sensor; a loaded indexer also has a payload in
    /// its feed path
    pub fn set_loaded(&self, has_payload: bool, identity: PayloadIdentity) {
        let mut state = self.state.lock();
        state.has_payload = has_payload;
        state.identity = identity;
        if has_payload {
            state.feed_path = true;
        }
    }

    pub fn set_feed_path(&self, occupied: bool) {
        self.state.lock().feed_path = occupied;
    }

    pub fn set_entry_identity(&self, identity: PayloadIdentity) {
        self.state.lock().entry = identity;
    }

    /// Make `advance_one_payload` fail
    pub fn set_jammed(&self, jammed: bool) {
        self.state.lock().jammed = jammed;
    }

    /// Successful advances so far
    pub fn advances(&self) -> u64 {
        self.state.lock().advances
    }
}

impl Indexer for MockIndexer {
    fn payload_identity(&self) -> PayloadIdentity {
        self.state.lock().identity
    }

    fn has_payload(&self) -> bool {
        self.state.lock().has_payload
    }

    fn payload_in_feed_path(&self) -> bool {
        self.state.lock().feed_path
    }

    fn entry_identity(&self) -> PayloadIdentity {
        self.state.lock().entry
    }

    fn advance_one_payload(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.jammed {
            return Err(Error::Hardware("indexer jammed".into()));
        }
        state.has_payload = false;
        state.identity = PayloadIdentity::None;
        state.advances += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IntakeState {
    roller_speed: f64,
    roller_position: f64,
    stopped: bool,
}

/// Intake roller with a settable travel counter
#[derive(Debug, Default)]
pub struct MockIntake {
    state: Mutex<IntakeState>,
}

impl MockIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_roller_position(&self, rotations: f64) {
        self.state.lock().roller_position = rotations;
    }

    /// Latest commanded roller speed
    pub fn roller_speed(&self) -> f64 {
        self.state.lock().roller_speed
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }
}

impl Intake for MockIntake {
    fn set_roller_speed(&self, rpm: f64) {
        let mut state = self.state.lock();
        state.roller_speed = rpm;
        state.stopped = false;
    }

    fn roller_position(&self) -> f64 {
        self.state.lock().roller_position
    }

    fn zero_roller_position(&self) {
        self.state.lock().roller_position = 0.0;
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.roller_speed = 0.0;
        state.stopped = true;
    }
}

#[derive(Debug, Default)]
struct VisionState {
    frame: Vec<Detection>,
    failing: bool,
}

/// Vision source replaying a fixed frame until told otherwise
#[derive(Debug, Default)]
pub struct MockVision {
    state: Mutex<VisionState>,
}

impl MockVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frame(&self, detections: Vec<Detection>) {
        self.state.lock().frame = detections;
    }

    /// Make every read fail with a driver error
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl VisionSource for MockVision {
    fn detections(&self) -> Result<Vec<Detection>> {
        let state = self.state.lock();
        if state.failing {
            return Err(Error::Vision("camera disconnected".into()));
        }
        Ok(state.frame.clone())
    }

    fn has_target(&self) -> bool {
        !self.state.lock().frame.is_empty()
    }
}
