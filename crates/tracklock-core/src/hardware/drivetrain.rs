//! Two-speed drivetrain with shift-consistent distance
//!
//! Both motor groups and the gear state sit behind one lock. A shift folds
//! the distance travelled in the old gear into per-side accumulators before
//! zeroing the encoders, so a distance read never mixes an encoder count from
//! one gear with the ratio of the other.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Drivetrain;

/// Raw motor groups and shifter of a two-speed drivetrain
pub trait DriveMotors: Send + Sync {
    /// Left group open-loop power
    fn set_left(&self, power: f64);

    /// Right group open-loop power
    fn set_right(&self, power: f64);

    /// Stop both groups
    fn stop(&self);

    /// Left encoder position, motor rotations
    fn left_rotations(&self) -> f64;

    /// Right encoder position, motor rotations
    fn right_rotations(&self) -> f64;

    /// Zero both encoders
    fn zero_encoders(&self);

    /// Drive the shifter
    fn set_high_gear(&self, high: bool);
}

/// Gear selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gear {
    Low,
    High,
}

/// Drivetrain gearing constants
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GearingConfig {
    /// Motor rotations per wheel rotation in high gear
    pub high_ratio: f64,
    /// Motor rotations per wheel rotation in low gear
    pub low_ratio: f64,
    /// Wheel radius in meters
    pub wheel_radius: f64,
}

impl Default for GearingConfig {
    fn default() -> Self {
        Self {
            high_ratio: 9.1,
            low_ratio: 19.65,
            wheel_radius: 0.0762,
        }
    }
}

impl GearingConfig {
    pub fn ratio(&self, gear: Gear) -> f64 {
        match gear {
            Gear::High => self.high_ratio,
            Gear::Low => self.low_ratio,
        }
    }

    pub fn wheel_circumference(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.wheel_radius
    }

    fn rotations_to_meters(&self, rotations: f64, gear: Gear) -> f64 {
        rotations / self.ratio(gear) * self.wheel_circumference()
    }
}

#[derive(Debug)]
struct GearState {
    gear: Gear,
    left_accum: f64,
    right_accum: f64,
}

/// Drivetrain wrapper that keeps distance continuous across shifts
pub struct GearedDrivetrain<M: DriveMotors> {
    motors: M,
    config: GearingConfig,
    state: Mutex<GearState>,
}

impl<M: DriveMotors> GearedDrivetrain<M> {
    /// Wrap motor groups, starting in low gear
    pub fn new(motors: M, config: GearingConfig) -> Self {
        motors.set_high_gear(false);
        motors.zero_encoders();
        Self {
            motors,
            config,
            state: Mutex::new(GearState {
                gear: Gear::Low,
                left_accum: 0.0,
                right_accum: 0.0,
            }),
        }
    }

    /// Current gear
    pub fn gear(&self) -> Gear {
        self.state.lock().gear
    }

    /// Shift gears, preserving travelled distance
    pub fn shift(&self, gear: Gear) {
        let mut state = self.state.lock();
        if state.gear == gear {
            return;
        }

        state.left_accum += self
            .config
            .rotations_to_meters(self.motors.left_rotations(), state.gear);
        state.right_accum += self
            .config
            .rotations_to_meters(self.motors.right_rotations(), state.gear);
        self.motors.zero_encoders();
        self.motors.set_high_gear(gear == Gear::High);
        state.gear = gear;

        tracing::debug!("drivetrain shifted to {:?}", gear);
    }

    /// Left side distance since the last zero, meters
    pub fn left_distance(&self) -> f64 {
        let state = self.state.lock();
        self.config
            .rotations_to_meters(self.motors.left_rotations(), state.gear)
            + state.left_accum
    }

    /// Right side distance since the last zero, meters
    pub fn right_distance(&self) -> f64 {
        let state = self.state.lock();
        self.config
            .rotations_to_meters(self.motors.right_rotations(), state.gear)
            + state.right_accum
    }

    /// Clear accumulated distance and encoders
    pub fn zero_distance(&self) {
        let mut state = self.state.lock();
        state.left_accum = 0.0;
        state.right_accum = 0.0;
        self.motors.zero_encoders();
    }

    /// Borrow the motor groups
    pub fn motors(&self) -> &M {
        &self.motors
    }
}

impl<M: DriveMotors> Drivetrain for GearedDrivetrain<M> {
    fn set_left_power(&self, power: f64) {
        let _state = self.state.lock();
        self.motors.set_left(clamp_power(power));
    }

    fn set_right_power(&self, power: f64) {
        let _state = self.state.lock();
        self.motors.set_right(clamp_power(power));
    }

    fn stop(&self) {
        let _state = self.state.lock();
        self.motors.stop();
    }

    fn set_powers(&self, left: f64, right: f64) {
        let _state = self.state.lock();
        self.motors.set_left(clamp_power(left));
        self.motors.set_right(clamp_power(right));
    }
}

fn clamp_power(power: f64) -> f64 {
    if power.is_nan() {
        0.0
    } else {
        power.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct TestMotors {
        inner: Mutex<TestMotorState>,
    }

    #[derive(Default)]
    struct TestMotorState {
        left_power: f64,
        right_power: f64,
        left_rotations: f64,
        right_rotations: f64,
        high_gear: bool,
    }

    impl TestMotors {
        fn turn(&self, left: f64, right: f64) {
            let mut inner = self.inner.lock();
            inner.left_rotations += left;
            inner.right_rotations += right;
        }
    }

    impl DriveMotors for TestMotors {
        fn set_left(&self, power: f64) {
            self.inner.lock().left_power = power;
        }
        fn set_right(&self, power: f64) {
            self.inner.lock().right_power = power;
        }
        fn stop(&self) {
            let mut inner = self.inner.lock();
            inner.left_power = 0.0;
            inner.right_power = 0.0;
        }
        fn left_rotations(&self) -> f64 {
            self.inner.lock().left_rotations
        }
        fn right_rotations(&self) -> f64 {
            self.inner.lock().right_rotations
        }
        fn zero_encoders(&self) {
            let mut inner = self.inner.lock();
            inner.left_rotations = 0.0;
            inner.right_rotations = 0.0;
        }
        fn set_high_gear(&self, high: bool) {
            self.inner.lock().high_gear = high;
        }
    }

    #[test]
    fn test_power_clamped() {
        let drive = GearedDrivetrain::new(TestMotors::default(), GearingConfig::default());
        drive.set_powers(3.0, -7.5);
        let inner = drive.motors().inner.lock();
        assert_relative_eq!(inner.left_power, 1.0);
        assert_relative_eq!(inner.right_power, -1.0);
    }

    #[test]
    fn test_distance_continuous_across_shift() {
        let config = GearingConfig::default();
        let drive = GearedDrivetrain::new(TestMotors::default(), config);

        // One wheel rotation in low gear
        drive.motors().turn(config.low_ratio, config.low_ratio);
        let before = drive.left_distance();
        assert_relative_eq!(before, config.wheel_circumference(), epsilon = 1e-12);

        drive.shift(Gear::High);
        assert_eq!(drive.gear(), Gear::High);
        assert!(drive.motors().inner.lock().high_gear);
        assert_relative_eq!(drive.left_distance(), before, epsilon = 1e-12);

        // One more wheel rotation in high gear
        drive.motors().turn(config.high_ratio, 0.0);
        assert_relative_eq!(
            drive.left_distance(),
            2.0 * config.wheel_circumference(),
            epsilon = 1e-12
        );
        assert_relative_eq!(drive.right_distance(), before, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_reads_consistent_while_shifting() {
        use std::sync::Arc;
        use std::thread;

        let config = GearingConfig::default();
        let drive = Arc::new(GearedDrivetrain::new(TestMotors::default(), config));
        drive.motors().turn(config.low_ratio, config.low_ratio);
        let expected = config.wheel_circumference();

        let shifter = {
            let drive = Arc::clone(&drive);
            thread::spawn(move || {
                for _ in 0..1000 {
                    drive.shift(Gear::High);
                    drive.shift(Gear::Low);
                }
            })
        };

        for _ in 0..1000 {
            assert_relative_eq!(drive.left_distance(), expected, epsilon = 1e-9);
            assert_relative_eq!(drive.right_distance(), expected, epsilon = 1e-9);
        }
        shifter.join().unwrap();
        assert_relative_eq!(drive.left_distance(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_shift_to_same_gear_is_noop() {
        let drive = GearedDrivetrain::new(TestMotors::default(), GearingConfig::default());
        drive.motors().turn(5.0, 5.0);
        drive.shift(Gear::Low);
        assert_relative_eq!(drive.motors().left_rotations(), 5.0);
    }

    #[test]
    fn test_zero_distance() {
        let drive = GearedDrivetrain::new(TestMotors::default(), GearingConfig::default());
        drive.motors().turn(20.0, 20.0);
        drive.shift(Gear::High);
        drive.motors().turn(3.0, 3.0);
        drive.zero_distance();
        assert_relative_eq!(drive.left_distance(), 0.0);
        assert_relative_eq!(drive.right_distance(), 0.0);
    }
}
