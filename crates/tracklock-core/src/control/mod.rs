//! Control loops and their scheduling

mod approach;
mod collect;
mod control_loop;
mod engagement;
mod pid;
mod readiness;
mod scheduler;
mod targeting;

pub use approach::{ApproachConfig, ApproachController, DriveCommand, RangeSetpoint, SearchBehavior};
pub use collect::{CollectEngagement, CollectEngagementBuilder, CollectState, PayloadEdge};
pub use control_loop::{TickLoop, TickLoopConfig, TickStats};
pub use engagement::{ActuatorSet, Engagement};
pub use pid::{DerivativeFilter, Pid, PidConfig, PidState};
pub use readiness::{Readiness, ReadinessConfig, ReadinessGate, SpeedModel};
pub use scheduler::{EngagementId, Scheduler};
pub use targeting::{Gates, OperatingState, ShooterEngagement, ShooterEngagementBuilder};
