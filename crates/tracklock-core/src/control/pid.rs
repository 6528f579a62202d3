//! PID controller
//!
//! A PID controller that owns its setpoint and a tolerance band, with
//! integral windup protection, derivative filtering and output clamping.
//! Vision-driven loops read noisy measurements at a low rate, so the
//! `at_setpoint` predicate checks both the error and its rate of change.

use serde::{Deserialize, Serialize};

/// Derivative term filtering configuration
///
/// The derivative of a vision measurement jumps every time the detector
/// re-centres its bounding box. Filtering smooths it at the cost of lag.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DerivativeFilter {
    /// Raw derivative passes through
    #[default]
    Disabled,

    /// Low-pass filter with explicit alpha (0-1)
    /// alpha = 1.0 means no filtering, alpha = 0.0 means maximum filtering
    LowPass {
        /// Smoothing factor (0-1). Higher = less smoothing.
        alpha: f64,
    },

    /// Low-pass filter computed from cutoff frequency
    CutoffFrequency {
        /// Cutoff frequency in Hz
        cutoff_hz: f64,
        /// Sample rate in Hz (control tick rate)
        sample_rate_hz: f64,
    },
}

impl DerivativeFilter {
    /// Moderate filtering (alpha = 0.5)
    pub const MODERATE: Self = Self::LowPass { alpha: 0.5 };

    /// Get the alpha value for this filter configuration
    pub fn alpha(&self) -> f64 {
        match self {
            Self::Disabled => 1.0,
            Self::LowPass { alpha } => alpha.clamp(0.0, 1.0),
            Self::CutoffFrequency {
                cutoff_hz,
                sample_rate_hz,
            } => {
                // alpha = dt / (RC + dt) where RC = 1 / (2 * pi * cutoff)
                let dt = 1.0 / sample_rate_hz;
                let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
                (dt / (rc + dt)).clamp(0.0, 1.0)
            }
        }
    }
}

/// PID controller configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Output minimum limit
    pub output_min: f64,
    /// Output maximum limit
    pub output_max: f64,
    /// Integral windup limit (f64::INFINITY for no limit)
    pub integral_limit: f64,
    /// Derivative term filtering
    pub derivative_filter: DerivativeFilter,
    /// Largest |error| still counted as at the setpoint
    pub position_tolerance: f64,
    /// Largest |d error / dt| still counted as at the setpoint
    pub velocity_tolerance: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
            integral_limit: f64::INFINITY,
            derivative_filter: DerivativeFilter::Disabled,
            position_tolerance: 0.05,
            velocity_tolerance: f64::INFINITY,
        }
    }
}

impl PidConfig {
    /// Create a new PID config with given gains
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            ..Default::default()
        }
    }

    /// Create a P-only controller config
    pub fn p(kp: f64) -> Self {
        Self::new(kp, 0.0, 0.0)
    }

    /// Set output limits
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// Set symmetric output limits
    pub fn with_output_bound(self, bound: f64) -> Self {
        self.with_limits(-bound, bound)
    }

    /// Set integral windup limit
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    /// Set derivative filter
    pub fn with_derivative_filter(mut self, filter: DerivativeFilter) -> Self {
        self.derivative_filter = filter;
        self
    }

    /// Set the tolerance band used by [`Pid::at_setpoint`]
    pub fn with_tolerance(mut self, position: f64, velocity: f64) -> Self {
        self.position_tolerance = position;
        self.velocity_tolerance = velocity;
        self
    }

    pub(crate) fn validate(&self, name: &str) -> crate::Result<()> {
        let gains_finite = self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite();
        if !gains_finite {
            return Err(crate::Error::Config(format!("{name}: gains must be finite")));
        }
        if self.output_min.is_nan() || self.output_max.is_nan() || self.output_min > self.output_max {
            return Err(crate::Error::Config(format!(
                "{name}: output limits [{}, {}] are inverted",
                self.output_min, self.output_max
            )));
        }
        if !(self.position_tolerance >= 0.0 && self.velocity_tolerance >= 0.0) {
            return Err(crate::Error::Config(format!(
                "{name}: tolerances must be non-negative"
            )));
        }
        if !(self.integral_limit >= 0.0) {
            return Err(crate::Error::Config(format!(
                "{name}: integral limit must be non-negative"
            )));
        }
        Ok(())
    }
}

/// PID controller internal state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PidState {
    /// Accumulated integral term
    pub integral: f64,
    /// Error from the latest update
    pub position_error: f64,
    /// Rate of change of the error at the latest update
    pub velocity_error: f64,
    /// Filtered derivative value
    pub derivative_filtered: f64,
    /// Whether an update has run since the last reset
    pub has_measurement: bool,
}

/// PID controller
///
/// # Example
/// ```
/// use tracklock_core::control::{Pid, PidConfig};
///
/// let config = PidConfig::p(0.1)
///     .with_output_bound(1.0)
///     .with_tolerance(3.0, 1.0);
///
/// let mut pid = Pid::new(config);
/// pid.set_setpoint(0.0);
///
/// // Heading offset of 12 degrees, 50 Hz tick
/// let output = pid.calculate(12.0, 0.02);
/// assert!(output < 0.0);
/// assert!(!pid.at_setpoint());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    config: PidConfig,
    /// Cached alpha from config.derivative_filter
    derivative_alpha: f64,
    setpoint: f64,
    state: PidState,
    released: bool,
}

impl Pid {
    /// Create a new PID controller with the given configuration
    pub fn new(config: PidConfig) -> Self {
        Self {
            derivative_alpha: config.derivative_filter.alpha(),
            config,
            setpoint: 0.0,
            state: PidState::default(),
            released: false,
        }
    }

    /// Set the setpoint
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Current setpoint
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Compute the output for a measurement against the stored setpoint
    #[inline]
    pub fn calculate(&mut self, measurement: f64, dt: f64) -> f64 {
        let error = self.setpoint - measurement;
        self.update_error(error, dt)
    }

    /// Update the controller with a pre-computed error
    ///
    /// The output always lies within the configured limits, whatever the
    /// magnitude of the error; a NaN error is treated as zero.
    pub fn update_error(&mut self, error: f64, dt: f64) -> f64 {
        debug_assert!(dt > 0.0);

        if self.released {
            tracing::warn!("PID update after release; output held at zero");
            return self.bounded(0.0);
        }

        let error = saturate(error);

        let p_term = self.config.kp * error;

        self.state.integral = saturate(error.mul_add(dt, self.state.integral))
            .clamp(-self.config.integral_limit, self.config.integral_limit);
        let i_term = self.config.ki * self.state.integral;

        let velocity = if self.state.has_measurement {
            saturate((error - self.state.position_error) / dt)
        } else {
            0.0
        };
        self.state.derivative_filtered = saturate(self.derivative_alpha.mul_add(
            velocity - self.state.derivative_filtered,
            self.state.derivative_filtered,
        ));
        let d_term = self.config.kd * self.state.derivative_filtered;

        let output = self.bounded(p_term + i_term + d_term);

        self.state.position_error = error;
        self.state.velocity_error = velocity;
        self.state.has_measurement = true;

        output
    }

    fn bounded(&self, output: f64) -> f64 {
        let output = if output.is_nan() { 0.0 } else { output };
        output.clamp(self.config.output_min, self.config.output_max)
    }

    /// Whether the last update was inside the tolerance band
    ///
    /// False until an update has run since the last reset.
    pub fn at_setpoint(&self) -> bool {
        self.state.has_measurement
            && self.state.position_error.abs() <= self.config.position_tolerance
            && self.state.velocity_error.abs() <= self.config.velocity_tolerance
    }

    /// Reset the controller state
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    /// Reset and mark the controller released
    ///
    /// Returns `true` only for the call that performed the release, so a
    /// second release is a harmless no-op.
    pub fn release(&mut self) -> bool {
        self.reset();
        !std::mem::replace(&mut self.released, true)
    }

    /// Make a released controller usable again
    pub fn rearm(&mut self) {
        self.reset();
        self.released = false;
    }

    /// Whether the controller has been released
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Get the current state
    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Update the configuration
    pub fn set_config(&mut self, config: PidConfig) {
        self.derivative_alpha = config.derivative_filter.alpha();
        self.config = config;
    }
}

/// Map NaN to zero and infinities to the largest finite value
fn saturate(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(f64::MIN, f64::MAX)
    }
}
