//! The simulated robot: commanded motion, animation and per-attempt counters.
//!
//! Commands never move the robot directly. Each one appends a target pose to a
//! motion queue, computed from the previously *commanded* pose, and
//! [`Robot::update`] walks the realised pose through that queue over time. A
//! script issuing `forward(5); right(90); forward(5)` therefore draws an L no
//! matter how quickly the commands arrive.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bevy_math::Vec2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{RobotConfig, SimConfig};
use crate::error::RobotError;
use crate::geometry::{
    GridFrame, Obstacle, Rect, WorldBounds, heading_vector, normalize_heading, shortest_turn,
};
use crate::level::Level;
use crate::sensor::{SensorModel, SensorReadings, SensorSide};

/// Front readings below this many grid units make `avoid_obstacle` turn away.
const AVOID_THRESHOLD: f32 = 1.0;
const AVOID_TURN_DEGREES: f32 = 45.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    /// Degrees in `[0, 360)`.
    pub heading: f32,
}

impl Pose {
    pub fn new(position: Vec2, heading: f32) -> Self {
        Self {
            position,
            heading: normalize_heading(heading),
        }
    }
}

/// A collectible placed in world units.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_item_kind")]
    pub kind: String,
}

fn default_item_kind() -> String {
    "coin".to_string()
}

impl Item {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            kind: default_item_kind(),
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// The level-specific world a robot moves through. Replaced wholesale when a
/// level is loaded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Environment {
    pub obstacles: Vec<Obstacle>,
    pub items: Vec<Item>,
    pub target_area: Option<Rect>,
}

/// Cardinal directions accepted by `face_direction`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn parse(name: &str) -> Result<Self, RobotError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "north" => Ok(Direction::North),
            "south" => Ok(Direction::South),
            "east" => Ok(Direction::East),
            "west" => Ok(Direction::West),
            _ => Err(RobotError::InvalidDirection(name.to_string())),
        }
    }

    pub fn heading(self) -> f32 {
        match self {
            Direction::North => 270.0,
            Direction::South => 90.0,
            Direction::East => 0.0,
            Direction::West => 180.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

/// Read-only view of the robot handed to objectives, callbacks and UIs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Telemetry {
    pub position: Vec2,
    pub grid_position: Vec2,
    pub heading: f32,
    pub animating: bool,
    pub commands_executed: u32,
    pub sensor_calls: u32,
    pub items_collected: u32,
    pub items_remaining: usize,
    pub score: u32,
    pub at_target: bool,
}

impl Telemetry {
    pub fn status_line(&self) -> String {
        format!(
            "Position ({:.1}, {:.1}) heading {:.0}° | commands {} | sensor calls {} | items {} | score {}",
            self.grid_position.x,
            self.grid_position.y,
            self.heading,
            self.commands_executed,
            self.sensor_calls,
            self.items_collected,
            self.score,
        )
    }
}

/// The command surface exposed to student programs.
pub trait RobotCommands {
    fn forward(&mut self, units: f32) -> String;
    fn backward(&mut self, units: f32) -> String;
    fn left(&mut self, degrees: f32) -> String;
    fn right(&mut self, degrees: f32) -> String;
    fn move_to(&mut self, grid_x: f32, grid_y: f32) -> String;
    fn face_direction(&mut self, direction: &str) -> Result<String, RobotError>;
    fn sensor(&mut self) -> SensorReadings;
    fn front_sensor(&mut self) -> f32;
    fn left_sensor(&mut self) -> f32;
    fn right_sensor(&mut self) -> f32;
    fn collect(&mut self) -> String;
    fn undo(&mut self) -> String;
    fn reset(&mut self) -> String;
    fn avoid_obstacle(&mut self) -> String;
    /// Realised position in grid units.
    fn get_position(&self) -> Vec2;
    fn at_target(&self) -> bool;
    fn telemetry(&self) -> Telemetry;

    fn status(&self) -> String {
        self.telemetry().status_line()
    }
}

/// The robot as seen by the session and a script binding at the same time.
pub type SharedRobot = Rc<RefCell<dyn RobotCommands>>;

pub type SettleCallback = Box<dyn FnMut(&Telemetry)>;

pub struct Robot {
    pose: Pose,
    spawn: Pose,
    waypoints: VecDeque<Pose>,
    history: VecDeque<Pose>,
    motion: RobotConfig,
    frame: GridFrame,
    bounds: WorldBounds,
    sensors: SensorModel,
    environment: Environment,
    commands_executed: u32,
    sensor_calls: u32,
    items_collected: u32,
    score: u32,
    on_settle: Option<SettleCallback>,
}

impl Robot {
    /// A robot at grid (0, 0) facing east in an empty world.
    pub fn new(config: &SimConfig) -> Self {
        let frame = config.world.grid_frame();
        let bounds = WorldBounds::new(&config.world, &config.robot);
        let spawn = Pose::new(bounds.clamp(frame.to_world(Vec2::ZERO)), 0.0);
        Self {
            pose: spawn,
            spawn,
            waypoints: VecDeque::new(),
            history: VecDeque::from([spawn]),
            motion: config.robot.clone(),
            frame,
            bounds,
            sensors: SensorModel {
                config: config.sensor.clone(),
                bounds,
                frame,
            },
            environment: Environment::default(),
            commands_executed: 0,
            sensor_calls: 0,
            items_collected: 0,
            score: 0,
            on_settle: None,
        }
    }

    /// Registers a hook that runs once each time the motion queue drains.
    pub fn set_on_settle(&mut self, callback: SettleCallback) {
        self.on_settle = Some(callback);
    }

    pub fn clear_on_settle(&mut self) {
        self.on_settle = None;
    }

    /// Moves to the level's start pose in the level's environment with every
    /// counter zeroed.
    pub fn reset_for_level(&mut self, level: &Level) {
        let spawn_grid = Vec2::from(level.start);
        let spawn = Pose::new(
            self.bounds.clamp(self.frame.to_world(spawn_grid)),
            level.start_heading,
        );
        self.load(spawn, level.environment());
    }

    /// Same as [`Robot::reset_for_level`] for callers without a [`Level`].
    pub fn load(&mut self, spawn: Pose, environment: Environment) {
        self.spawn = spawn;
        self.environment = environment;
        self.teleport(spawn);
        self.history = VecDeque::from([spawn]);
        self.commands_executed = 0;
        self.sensor_calls = 0;
        self.items_collected = 0;
        self.score = 0;
        debug!(?spawn, "robot loaded");
    }

    /// Advances the animation by `dt` seconds. Returns `true` on the tick the
    /// robot comes to rest.
    pub fn update(&mut self, dt: f32) -> bool {
        let Some(target) = self.waypoints.front().copied() else {
            return false;
        };
        let epsilon = self.motion.settle_epsilon;

        let offset = target.position - self.pose.position;
        let distance = offset.length();
        let step = self.motion.speed * dt;
        if distance <= epsilon.max(step) {
            self.pose.position = target.position;
        } else {
            self.pose.position += offset / distance * step;
        }

        let turn = shortest_turn(self.pose.heading, target.heading);
        let rotation = self.motion.turn_speed * dt;
        if turn.abs() <= epsilon.max(rotation) {
            self.pose.heading = target.heading;
        } else {
            self.pose.heading = normalize_heading(self.pose.heading + turn.signum() * rotation);
        }

        if self.pose != target {
            return false;
        }
        self.waypoints.pop_front();
        if !self.waypoints.is_empty() {
            return false;
        }

        let telemetry = self.telemetry();
        if let Some(callback) = self.on_settle.as_mut() {
            callback(&telemetry);
        }
        true
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Where the robot will rest once every queued motion has played out.
    pub fn commanded_pose(&self) -> Pose {
        self.waypoints.back().copied().unwrap_or(self.pose)
    }

    pub fn spawn(&self) -> Pose {
        self.spawn
    }

    pub fn is_animating(&self) -> bool {
        !self.waypoints.is_empty()
    }

    pub fn pending_motions(&self) -> usize {
        self.waypoints.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &Pose> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn frame(&self) -> GridFrame {
        self.frame
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    fn teleport(&mut self, pose: Pose) {
        self.waypoints.clear();
        self.pose = pose;
    }

    fn push_history(&mut self, pose: Pose) {
        self.history.push_back(pose);
        while self.history.len() > self.motion.max_history.max(1) {
            self.history.pop_front();
        }
    }

    fn enqueue(&mut self, target: Pose) {
        let from = self.commanded_pose();
        self.push_history(from);
        self.waypoints.push_back(target);
        self.commands_executed += 1;
    }

    fn drive(&mut self, units: f32) -> Result<(), RobotError> {
        let from = self.commanded_pose();
        let displacement = heading_vector(from.heading) * units * self.frame.unit_size;
        let target = from.position + displacement;
        if !target.is_finite() {
            return Err(RobotError::NonFinite {
                what: "distance",
                value: units,
            });
        }
        self.enqueue(Pose {
            position: self.bounds.clamp(target),
            heading: from.heading,
        });
        Ok(())
    }

    fn turn(&mut self, degrees: f32) -> Result<(), RobotError> {
        if !degrees.is_finite() {
            return Err(RobotError::NonFinite {
                what: "angle",
                value: degrees,
            });
        }
        let from = self.commanded_pose();
        self.enqueue(Pose::new(from.position, from.heading + degrees));
        Ok(())
    }

    fn read_sensor(&mut self, side: SensorSide) -> f32 {
        self.sensor_calls += 1;
        let distance = self
            .sensors
            .distance(&self.pose, side, &self.environment.obstacles);
        debug!(?side, distance, "sensor read");
        distance
    }
}

impl RobotCommands for Robot {
    fn forward(&mut self, units: f32) -> String {
        debug!(units, "forward");
        match self.drive(units) {
            Ok(()) => format!("Moving forward {units} units"),
            Err(err) => err.to_string(),
        }
    }

    fn backward(&mut self, units: f32) -> String {
        debug!(units, "backward");
        match self.drive(-units) {
            Ok(()) => format!("Moving backward {units} units"),
            Err(err) => err.to_string(),
        }
    }

    fn left(&mut self, degrees: f32) -> String {
        debug!(degrees, "left");
        match self.turn(-degrees) {
            Ok(()) => format!("Turning left {degrees} degrees"),
            Err(err) => err.to_string(),
        }
    }

    fn right(&mut self, degrees: f32) -> String {
        debug!(degrees, "right");
        match self.turn(degrees) {
            Ok(()) => format!("Turning right {degrees} degrees"),
            Err(err) => err.to_string(),
        }
    }

    fn move_to(&mut self, grid_x: f32, grid_y: f32) -> String {
        debug!(grid_x, grid_y, "move_to");
        let target = self.frame.to_world(Vec2::new(grid_x, grid_y));
        if !target.is_finite() {
            let value = if grid_x.is_finite() { grid_y } else { grid_x };
            return RobotError::NonFinite {
                what: "coordinate",
                value,
            }
            .to_string();
        }
        let from = self.commanded_pose();
        self.enqueue(Pose {
            position: self.bounds.clamp(target),
            heading: from.heading,
        });
        format!("Moving to ({grid_x}, {grid_y})")
    }

    fn face_direction(&mut self, direction: &str) -> Result<String, RobotError> {
        let direction = Direction::parse(direction)?;
        debug!(?direction, "face_direction");
        let from = self.commanded_pose();
        self.enqueue(Pose::new(from.position, direction.heading()));
        Ok(format!("Facing {}", direction.name()))
    }

    fn sensor(&mut self) -> SensorReadings {
        self.sensor_calls += 1;
        let obstacles = &self.environment.obstacles;
        let grid = self.frame.to_grid(self.pose.position);
        let readings = SensorReadings {
            front: self.sensors.distance(&self.pose, SensorSide::Front, obstacles),
            left: self.sensors.distance(&self.pose, SensorSide::Left, obstacles),
            right: self.sensors.distance(&self.pose, SensorSide::Right, obstacles),
            position: grid.to_array(),
            heading: self.pose.heading,
        };
        debug!(?readings, "sensor sweep");
        readings
    }

    fn front_sensor(&mut self) -> f32 {
        self.read_sensor(SensorSide::Front)
    }

    fn left_sensor(&mut self) -> f32 {
        self.read_sensor(SensorSide::Left)
    }

    fn right_sensor(&mut self) -> f32 {
        self.read_sensor(SensorSide::Right)
    }

    fn collect(&mut self) -> String {
        let here = self.pose.position;
        let radius = self.motion.collection_radius;
        let before = self.environment.items.len();
        self.environment
            .items
            .retain(|item| item.position().distance(here) >= radius);
        let collected = (before - self.environment.items.len()) as u32;
        if collected == 0 {
            return "No items nearby".to_string();
        }
        self.items_collected += collected;
        self.score += collected * self.motion.item_score;
        debug!(collected, total = self.items_collected, "collect");
        format!(
            "Collected {collected} item(s), {} in total",
            self.items_collected
        )
    }

    fn undo(&mut self) -> String {
        // The spawn entry at the bottom is never popped.
        let previous = if self.history.len() > 1 {
            self.history.pop_back()
        } else {
            None
        };
        match previous {
            Some(previous) => {
                debug!(?previous, "undo");
                self.teleport(previous);
                "Undid last move".to_string()
            }
            None => "Nothing to undo".to_string(),
        }
    }

    fn reset(&mut self) -> String {
        self.teleport(self.spawn);
        self.history = VecDeque::from([self.spawn]);
        self.commands_executed = 0;
        "Robot reset to start position".to_string()
    }

    fn avoid_obstacle(&mut self) -> String {
        let front = self.front_sensor();
        if front >= AVOID_THRESHOLD {
            return format!("Path ahead is clear ({front:.1})");
        }
        let left = self.left_sensor();
        let right = self.right_sensor();
        if left > right {
            self.left(AVOID_TURN_DEGREES);
            format!("Obstacle ahead ({front:.1}), turning left")
        } else {
            self.right(AVOID_TURN_DEGREES);
            format!("Obstacle ahead ({front:.1}), turning right")
        }
    }

    fn get_position(&self) -> Vec2 {
        self.frame.to_grid(self.pose.position)
    }

    fn at_target(&self) -> bool {
        self.environment
            .target_area
            .is_some_and(|area| area.contains(self.pose.position))
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry {
            position: self.pose.position,
            grid_position: self.get_position(),
            heading: self.pose.heading,
            animating: self.is_animating(),
            commands_executed: self.commands_executed,
            sensor_calls: self.sensor_calls,
            items_collected: self.items_collected,
            items_remaining: self.environment.items.len(),
            score: self.score,
            at_target: self.at_target(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn robot() -> Robot {
        Robot::new(&SimConfig::default())
    }

    fn settle(robot: &mut Robot) -> usize {
        let mut settled = 0;
        for _ in 0..10_000 {
            if robot.update(DT) {
                settled += 1;
            }
            if !robot.is_animating() {
                break;
            }
        }
        settled
    }

    fn assert_grid(robot: &Robot, x: f32, y: f32) {
        let grid = robot.get_position();
        assert!(
            (grid.x - x).abs() < 1e-3 && (grid.y - y).abs() < 1e-3,
            "expected ({x}, {y}), got {grid}"
        );
    }

    #[test]
    fn commands_chain_from_commanded_pose() {
        let mut robot = robot();
        robot.forward(5.0);
        robot.right(90.0);
        robot.forward(5.0);
        // Nothing moves until the simulation ticks.
        assert_grid(&robot, 0.0, 0.0);
        assert_eq!(robot.pending_motions(), 3);

        assert_eq!(settle(&mut robot), 1);
        assert_grid(&robot, 5.0, 5.0);
        assert_eq!(robot.pose().heading, 90.0);
        assert_eq!(robot.telemetry().commands_executed, 3);
    }

    #[test]
    fn turns_wrap_heading() {
        let mut robot = robot();
        robot.left(90.0);
        assert_eq!(robot.commanded_pose().heading, 270.0);
        robot.right(450.0);
        assert_eq!(robot.commanded_pose().heading, 0.0);
        settle(&mut robot);
        assert_eq!(robot.pose().heading, 0.0);
    }

    #[test]
    fn animation_takes_the_short_way_round() {
        let mut robot = robot();
        robot.left(30.0);
        robot.update(DT);
        let heading = robot.pose().heading;
        assert!(heading > 300.0 && heading < 360.0, "{heading}");
    }

    #[test]
    fn motion_is_clamped_to_bounds() {
        let mut robot = robot();
        robot.backward(10.0);
        robot.move_to(100.0, 100.0);
        settle(&mut robot);
        assert_eq!(robot.pose().position, Vec2::new(580.0, 680.0));
        for pose in robot.history() {
            assert!(pose.position.x >= 20.0 && pose.position.y >= 20.0);
        }
    }

    #[test]
    fn face_direction_accepts_any_case() {
        let mut robot = robot();
        assert_eq!(robot.face_direction("North").unwrap(), "Facing north");
        assert_eq!(robot.commanded_pose().heading, 270.0);
        robot.face_direction("WEST").unwrap();
        assert_eq!(robot.commanded_pose().heading, 180.0);
    }

    #[test]
    fn invalid_direction_leaves_robot_untouched() {
        let mut robot = robot();
        let err = robot.face_direction("up").unwrap_err();
        assert_eq!(err, RobotError::InvalidDirection("up".to_string()));
        assert!(err.to_string().starts_with("Invalid direction"));
        assert_eq!(robot.telemetry().commands_executed, 0);
        assert_eq!(robot.history_len(), 1);
        assert!(!robot.is_animating());
    }

    #[test]
    fn undo_restores_pose_before_last_command() {
        let mut robot = robot();
        robot.forward(2.0);
        settle(&mut robot);
        robot.right(90.0);
        robot.forward(3.0);
        // Mid-animation undo cancels the pending motion.
        robot.update(DT);
        assert_eq!(robot.undo(), "Undid last move");
        assert!(!robot.is_animating());
        assert_grid(&robot, 2.0, 0.0);
        assert_eq!(robot.pose().heading, 90.0);
    }

    #[test]
    fn undo_on_fresh_robot_is_a_no_op() {
        let mut robot = robot();
        assert_eq!(robot.undo(), "Nothing to undo");
        robot.forward(1.0);
        assert_eq!(robot.undo(), "Undid last move");
        assert_eq!(robot.undo(), "Nothing to undo");
        assert_grid(&robot, 0.0, 0.0);
    }

    #[test]
    fn repeated_undo_walks_back_through_every_pose() {
        let mut robot = robot();
        let mut poses = vec![robot.pose()];
        let commands: [fn(&mut Robot) -> String; 5] = [
            |r| r.forward(2.0),
            |r| r.right(90.0),
            |r| r.forward(1.5),
            |r| r.left(45.0),
            |r| r.move_to(3.0, 4.0),
        ];
        for command in commands {
            command(&mut robot);
            settle(&mut robot);
            poses.push(robot.pose());
        }

        for k in 1..poses.len() {
            assert_eq!(robot.undo(), "Undid last move");
            assert_eq!(robot.pose(), poses[poses.len() - 1 - k], "after {k} undos");
        }
        assert_eq!(robot.undo(), "Nothing to undo");
        assert_eq!(robot.pose(), robot.spawn());
    }

    #[test]
    fn non_finite_arguments_leave_robot_untouched() {
        let mut robot = robot();
        assert!(robot.left(f32::NAN).starts_with("angle must be a finite number"));
        assert!(robot.right(f32::INFINITY).starts_with("angle must be a finite number"));
        assert!(robot.forward(f32::INFINITY).starts_with("distance must be a finite number"));
        assert!(robot.backward(f32::NAN).starts_with("distance must be a finite number"));
        // Finite but large enough to overflow once scaled to world units.
        assert!(robot.forward(1e38).starts_with("distance must be a finite number"));
        assert!(robot.move_to(f32::NAN, 1.0).starts_with("coordinate must be a finite number"));

        assert_eq!(robot.telemetry().commands_executed, 0);
        assert_eq!(robot.history_len(), 1);
        assert!(!robot.is_animating());

        // Later commands still chain from a sane pose.
        robot.forward(1.0);
        assert_eq!(settle(&mut robot), 1);
        assert_grid(&robot, 1.0, 0.0);
        assert_eq!(robot.pose().heading, 0.0);
    }

    #[test]
    fn history_is_capped() {
        let mut robot = robot();
        for _ in 0..80 {
            robot.right(90.0);
        }
        assert_eq!(robot.history_len(), 50);
    }

    #[test]
    fn collect_only_takes_items_in_radius() {
        let mut robot = robot();
        let spawn = robot.spawn();
        robot.load(
            spawn,
            Environment {
                items: vec![
                    Item::new(spawn.position.x + 30.0, spawn.position.y),
                    Item::new(spawn.position.x + 40.0, spawn.position.y),
                ],
                ..Environment::default()
            },
        );
        assert_eq!(robot.collect(), "Collected 1 item(s), 1 in total");
        assert_eq!(robot.collect(), "No items nearby");
        let telemetry = robot.telemetry();
        assert_eq!(telemetry.items_collected, 1);
        assert_eq!(telemetry.items_remaining, 1);
        assert_eq!(telemetry.score, 10);
    }

    #[test]
    fn sensor_calls_are_counted() {
        let mut robot = robot();
        robot.front_sensor();
        let readings = robot.sensor();
        assert_eq!(readings.position, [0.0, 0.0]);
        assert_eq!(robot.telemetry().sensor_calls, 2);
        assert_eq!(robot.telemetry().commands_executed, 0);
    }

    #[test]
    fn settle_callback_fires_once_per_rest() {
        let mut robot = robot();
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        robot.set_on_settle(Box::new(move |_| counter.set(counter.get() + 1)));

        robot.forward(1.0);
        robot.left(90.0);
        settle(&mut robot);
        for _ in 0..10 {
            robot.update(DT);
        }
        assert_eq!(fired.get(), 1);

        robot.forward(1.0);
        settle(&mut robot);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn reset_returns_to_spawn() {
        let mut robot = robot();
        robot.forward(3.0);
        robot.front_sensor();
        settle(&mut robot);
        robot.reset();
        assert_eq!(robot.pose(), robot.spawn());
        assert_eq!(robot.history_len(), 1);
        assert_eq!(robot.telemetry().commands_executed, 0);
        assert_eq!(robot.telemetry().sensor_calls, 1);
    }

    #[test]
    fn avoid_obstacle_turns_toward_open_side() {
        let mut robot = robot();
        let spawn = robot.spawn();
        robot.load(
            Pose::new(Vec2::new(300.0, 100.0), 0.0),
            Environment {
                obstacles: vec![Rect::new(320.0, 0.0, 40.0, 300.0)],
                ..Environment::default()
            },
        );
        assert_ne!(robot.spawn(), spawn);
        let status = robot.avoid_obstacle();
        assert!(status.contains("turning right"), "{status}");
        assert_eq!(robot.commanded_pose().heading, 45.0);
        assert_eq!(robot.telemetry().sensor_calls, 3);
    }
}
