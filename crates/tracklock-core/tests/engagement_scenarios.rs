//! End-to-end engagement scenarios driven through the scheduler

use std::sync::Arc;
use std::time::Duration;

use tracklock_core::control::{
    ActuatorSet, CollectEngagement, ReadinessConfig, Scheduler, SpeedModel, TickLoop,
    TickLoopConfig,
};
use tracklock_core::hardware::PayloadIdentity;
use tracklock_core::sim::{MockDrivetrain, MockIndexer, MockIntake, MockShooter, MockVision};
use tracklock_core::vision::{Detection, MountGeometry};
use tracklock_core::{Affiliation, CollectConfig, Error, ShooterConfig, ShooterEngagement};

const DT: f64 = 0.02;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Robot {
    drive: Arc<MockDrivetrain>,
    shooter: Arc<MockShooter>,
    indexer: Arc<MockIndexer>,
    intake: Arc<MockIntake>,
    goal_camera: Arc<MockVision>,
    object_camera: Arc<MockVision>,
}

impl Robot {
    fn new() -> Self {
        Self {
            drive: Arc::new(MockDrivetrain::new()),
            shooter: Arc::new(MockShooter::new()),
            indexer: Arc::new(MockIndexer::new()),
            intake: Arc::new(MockIntake::new()),
            goal_camera: Arc::new(MockVision::new()),
            object_camera: Arc::new(MockVision::new()),
        }
    }

    // Range 100 at a vertical offset of 10 degrees; hood wanted up below 120
    fn shooter(&self) -> ShooterEngagement {
        let config = ShooterConfig::default()
            .with_mount(MountGeometry {
                mount_height: 0.0,
                mount_angle_deg: 35.0,
                target_height: 100.0,
                calibration_offset: 0.0,
                invert_vertical_offset: false,
            })
            .with_readiness(ReadinessConfig {
                hood_threshold: 120.0,
                hood_overlap: 5.0,
                speed_model: SpeedModel {
                    hood_up: [0.0, 0.0, 0.0, 3000.0],
                    ..Default::default()
                },
                ..Default::default()
            });

        ShooterEngagement::builder(config)
            .drivetrain(self.drive.clone())
            .shooter(self.shooter.clone())
            .indexer(self.indexer.clone())
            .vision(self.goal_camera.clone())
            .affiliation(Arc::new(Affiliation::Red))
            .build()
            .unwrap()
    }

    fn collect(&self, config: CollectConfig) -> CollectEngagement {
        CollectEngagement::builder(config)
            .drivetrain(self.drive.clone())
            .intake(self.intake.clone())
            .indexer(self.indexer.clone())
            .vision(self.object_camera.clone())
            .affiliation(Arc::new(Affiliation::Red))
            .build()
            .unwrap()
    }
}

#[test]
fn shooter_walks_every_gate_then_fires() {
    init_tracing();
    let robot = Robot::new();
    robot.indexer.set_feed_path(true);

    let mut scheduler = Scheduler::new();
    let id = scheduler.schedule(robot.shooter());

    // Target off to the right: turn first
    robot.goal_camera.set_frame(vec![Detection::new(0.0, 10.0, 10.0)]);
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("approaching"));
    let (left, right) = robot.drive.powers();
    assert!(left > 0.0 && right < 0.0);

    // Centered, but the heading error is still changing
    robot.goal_camera.set_frame(vec![Detection::new(0.0, 0.0, 10.0)]);
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("approaching"));

    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("setting_hood"));
    assert_eq!(robot.shooter.hood_commands().last(), Some(&true));

    robot.shooter.set_hood_reported(true);
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("spooling"));
    assert_eq!(robot.shooter.target_speed(), 3000.0);

    robot.shooter.set_measured_speed(3001.0);
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("awaiting_payload"));
    assert_eq!(robot.indexer.advances(), 0);

    robot.indexer.set_loaded(true, PayloadIdentity::Friend);
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("firing"));
    assert_eq!(robot.indexer.advances(), 1);

    // Fired payload left the indexer empty
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("awaiting_payload"));
    assert_eq!(robot.indexer.advances(), 1);

    robot.indexer.set_feed_path(false);
    scheduler.run_tick(DT).unwrap();
    assert!(!scheduler.is_scheduled(id));
    assert!(robot.drive.is_stopped());
    assert!(robot.shooter.is_stopped());
}

#[test]
fn shooter_searches_while_target_absent() {
    init_tracing();
    let robot = Robot::new();
    robot.indexer.set_feed_path(true);

    let mut scheduler = Scheduler::new();
    let id = scheduler.schedule(robot.shooter());

    for _ in 0..3 {
        scheduler.run_tick(DT).unwrap();
        assert_eq!(scheduler.status(id), Some("no_target"));
        assert_eq!(robot.drive.powers(), (0.5, -0.5));
    }
    assert_eq!(robot.drive.history(), vec![(0.5, -0.5); 3]);
}

#[test]
fn vision_failure_is_treated_as_no_target() {
    init_tracing();
    let robot = Robot::new();
    robot.indexer.set_feed_path(true);
    robot.goal_camera.set_frame(vec![Detection::new(0.0, 0.0, 10.0)]);
    robot.goal_camera.set_failing(true);

    let mut scheduler = Scheduler::new();
    let id = scheduler.schedule(robot.shooter());
    scheduler.run_tick(DT).unwrap();
    assert_eq!(scheduler.status(id), Some("no_target"));
}

#[test]
fn shooter_preempts_collect() {
    init_tracing();
    let robot = Robot::new();
    robot.indexer.set_feed_path(true);
    robot.object_camera.set_frame(vec![Detection::new(0.0, 0.0, 0.0)]);

    let mut scheduler = Scheduler::new();
    let collect = scheduler.schedule(robot.collect(CollectConfig::default()));
    scheduler.run_tick(DT).unwrap();
    assert!(robot.intake.roller_speed() > 0.0);

    let shooter = scheduler.schedule(robot.shooter());
    assert!(!scheduler.is_scheduled(collect));
    assert!(robot.intake.is_stopped());
    assert_eq!(scheduler.owner(ActuatorSet::Drivetrain), Some(shooter));
    assert_eq!(scheduler.owner(ActuatorSet::Intake), None);
}

#[test]
fn jammed_indexer_ends_shooter_and_releases() {
    init_tracing();
    let robot = Robot::new();
    robot.goal_camera.set_frame(vec![Detection::new(0.0, 0.0, 10.0)]);
    robot.shooter.set_hood_reported(true);
    robot.shooter.set_measured_speed(3000.0);
    robot.indexer.set_loaded(true, PayloadIdentity::Friend);
    robot.indexer.set_jammed(true);

    let mut scheduler = Scheduler::new();
    let id = scheduler.schedule(robot.shooter());

    let result = scheduler.run_tick(DT);
    assert!(matches!(result, Err(Error::Hardware(_))));
    assert!(!scheduler.is_scheduled(id));
    assert!(scheduler.is_empty());
    assert!(robot.drive.is_stopped());
    assert!(robot.shooter.is_stopped());
}

#[test]
fn dropped_scheduler_stops_actuators() {
    init_tracing();
    let robot = Robot::new();
    robot.object_camera.set_frame(vec![Detection::new(0.0, 0.0, 0.0)]);
    {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(robot.collect(CollectConfig::default()));
        scheduler.run_tick(DT).unwrap();
        assert!(!robot.drive.is_stopped());
    }
    assert!(robot.drive.is_stopped());
    assert!(robot.intake.is_stopped());
}

#[test]
fn tick_loop_runs_collect_to_absence_timeout() {
    init_tracing();
    let robot = Robot::new();
    let mut scheduler = Scheduler::new();
    scheduler.schedule(robot.collect(CollectConfig::default().with_absence_timeout(0.05)));

    let config = TickLoopConfig::new(200.0).with_name("collect");
    let stats = TickLoop::run_for(config, &mut scheduler, Duration::from_secs(2)).unwrap();

    assert!(scheduler.is_empty());
    assert!(stats.ticks > 0);
    assert!(robot.intake.is_stopped());
}
