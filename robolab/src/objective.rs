use bevy_math::Vec2;
use serde::{Deserialize, Serialize};

use crate::robot::Telemetry;

/// Win condition variants. Level packs select one with `type = "..."`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Grid position within `tolerance` (Euclidean) of `target`.
    ReachTarget {
        target: [f32; 2],
        #[serde(default = "default_tolerance")]
        tolerance: f32,
    },
    CollectItems {
        #[serde(default = "default_one")]
        count: u32,
    },
    UseSensors {
        #[serde(default = "default_one")]
        sensor_calls: u32,
    },
    /// At most `max_commands` motion commands this attempt.
    #[serde(alias = "efficiency_bonus")]
    EfficientPath {
        #[serde(default = "default_max_commands")]
        max_commands: u32,
    },
    /// Obstacles never block motion, so this always holds.
    AvoidObstacles,
    #[serde(alias = "time_challenge")]
    TimeLimit { seconds: f32 },
}

fn default_tolerance() -> f32 {
    1.0
}

fn default_one() -> u32 {
    1
}

fn default_max_commands() -> u32 {
    10
}

impl ObjectiveKind {
    /// Pure check against a telemetry snapshot and elapsed level time.
    pub fn is_met(&self, telemetry: &Telemetry, elapsed_secs: f32) -> bool {
        match self {
            ObjectiveKind::ReachTarget { target, tolerance } => {
                telemetry.grid_position.distance(Vec2::from(*target)) <= *tolerance
            }
            ObjectiveKind::CollectItems { count } => telemetry.items_collected >= *count,
            ObjectiveKind::UseSensors { sensor_calls } => telemetry.sensor_calls >= *sensor_calls,
            ObjectiveKind::EfficientPath { max_commands } => {
                telemetry.commands_executed <= *max_commands
            }
            ObjectiveKind::AvoidObstacles => true,
            ObjectiveKind::TimeLimit { seconds } => elapsed_secs <= *seconds,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            ObjectiveKind::ReachTarget { target, .. } => {
                format!("Reach position ({}, {})", target[0], target[1])
            }
            ObjectiveKind::CollectItems { count } => format!("Collect {count} item(s)"),
            ObjectiveKind::UseSensors { sensor_calls } => {
                format!("Use sensors at least {sensor_calls} time(s)")
            }
            ObjectiveKind::EfficientPath { max_commands } => {
                format!("Use at most {max_commands} commands")
            }
            ObjectiveKind::AvoidObstacles => "Avoid obstacles".to_string(),
            ObjectiveKind::TimeLimit { seconds } => format!("Finish within {seconds} seconds"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Objective {
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: ObjectiveKind,
    /// Last evaluated result, kept for display only.
    #[serde(skip)]
    pub completed: bool,
}

impl Objective {
    pub fn new(description: impl Into<String>, kind: ObjectiveKind) -> Self {
        Self {
            description: description.into(),
            kind,
            completed: false,
        }
    }

    pub fn is_met(&self, telemetry: &Telemetry, elapsed_secs: f32) -> bool {
        self.kind.is_met(telemetry, elapsed_secs)
    }

    /// The authored description, or a generated one when the pack left it out.
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            self.kind.summary()
        } else {
            self.description.clone()
        }
    }
}
