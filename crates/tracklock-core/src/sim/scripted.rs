//! Scripted engagement for exercising the scheduler

use std::sync::Arc;

use parking_lot::Mutex;

use crate::control::{ActuatorSet, Engagement};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct LogInner {
    starts: u64,
    ticks: u64,
    ends: Vec<bool>,
    dts: Vec<f64>,
}

/// Shared record of the lifecycle calls a [`ScriptedEngagement`] received
#[derive(Debug, Clone, Default)]
pub struct EngagementLog {
    inner: Arc<Mutex<LogInner>>,
}

impl EngagementLog {
    pub fn starts(&self) -> u64 {
        self.inner.lock().starts
    }

    /// `execute` calls, failed ones included
    pub fn ticks(&self) -> u64 {
        self.inner.lock().ticks
    }

    /// `interrupted` flag of each `on_end` call
    pub fn ends(&self) -> Vec<bool> {
        self.inner.lock().ends.clone()
    }

    /// `dt` passed to each `execute` call
    pub fn dts(&self) -> Vec<f64> {
        self.inner.lock().dts.clone()
    }
}

/// Engagement that finishes or fails on a chosen tick
#[derive(Debug)]
pub struct ScriptedEngagement {
    name: String,
    requirements: Vec<ActuatorSet>,
    finish_after: Option<u64>,
    fail_on: Option<u64>,
    running: bool,
    ticks: u64,
    log: EngagementLog,
}

impl ScriptedEngagement {
    pub fn new(name: impl Into<String>, requirements: &[ActuatorSet]) -> Self {
        Self {
            name: name.into(),
            requirements: requirements.to_vec(),
            finish_after: None,
            fail_on: None,
            running: false,
            ticks: 0,
            log: EngagementLog::default(),
        }
    }

    /// Report finished once this many ticks have run
    pub fn finish_after(mut self, ticks: u64) -> Self {
        self.finish_after = Some(ticks);
        self
    }

    /// Fail the given tick (1-based)
    pub fn fail_on(mut self, tick: u64) -> Self {
        self.fail_on = Some(tick);
        self
    }

    pub fn log(&self) -> EngagementLog {
        self.log.clone()
    }
}

impl Engagement for ScriptedEngagement {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ActuatorSet] {
        &self.requirements
    }

    fn on_start(&mut self) {
        self.running = true;
        self.ticks = 0;
        self.log.inner.lock().starts += 1;
    }

    fn execute(&mut self, dt: f64) -> Result<()> {
        self.ticks += 1;
        {
            let mut log = self.log.inner.lock();
            log.ticks += 1;
            log.dts.push(dt);
        }
        if self.fail_on == Some(self.ticks) {
            return Err(Error::Hardware(format!("{} scripted failure", self.name)));
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finish_after.map_or(false, |n| self.ticks >= n)
    }

    fn on_end(&mut self, interrupted: bool) {
        self.running = false;
        self.log.inner.lock().ends.push(interrupted);
    }

    fn status(&self) -> &'static str {
        if self.running {
            "running"
        } else {
            "idle"
        }
    }
}
