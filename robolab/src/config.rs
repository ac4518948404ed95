use std::path::Path;

use bevy_math::Vec2;
use serde::{Deserialize, Serialize};

use crate::LoadError;
use crate::geometry::GridFrame;

/// Simulation tunables. Every field has a default, so an empty TOML document
/// yields the stock sandbox.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SimConfig {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WorldConfig {
    #[serde(default = "default_world_width")]
    pub width: f32,
    #[serde(default = "default_world_height")]
    pub height: f32,
    /// World units per grid unit.
    #[serde(default = "default_unit_size")]
    pub unit_size: f32,
    /// World position of grid cell (0, 0).
    #[serde(default = "default_grid_origin")]
    pub grid_origin: [f32; 2],
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_world_width(),
            height: default_world_height(),
            unit_size: default_unit_size(),
            grid_origin: default_grid_origin(),
        }
    }
}

impl WorldConfig {
    pub fn grid_origin_vec2(&self) -> Vec2 {
        let [x, y] = self.grid_origin;
        Vec2::new(x, y)
    }

    pub fn grid_frame(&self) -> GridFrame {
        GridFrame {
            origin: self.grid_origin_vec2(),
            unit_size: self.unit_size,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RobotConfig {
    /// Half-extent kept clear of the world edge.
    #[serde(default = "default_robot_size")]
    pub size: f32,
    /// World units per second.
    #[serde(default = "default_robot_speed")]
    pub speed: f32,
    /// Degrees per second.
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f32,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_collection_radius")]
    pub collection_radius: f32,
    #[serde(default = "default_item_score")]
    pub item_score: u32,
    /// Distance (world units) and angle (degrees) under which a motion snaps to its target.
    #[serde(default = "default_settle_epsilon")]
    pub settle_epsilon: f32,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            size: default_robot_size(),
            speed: default_robot_speed(),
            turn_speed: default_turn_speed(),
            max_history: default_max_history(),
            collection_radius: default_collection_radius(),
            item_score: default_item_score(),
            settle_epsilon: default_settle_epsilon(),
        }
    }
}

/// Ray-march parameters, all in world units.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_range")]
    pub range: f32,
    #[serde(default = "default_sensor_step")]
    pub step: f32,
    #[serde(default = "default_sensor_first_sample")]
    pub first_sample: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            range: default_sensor_range(),
            step: default_sensor_step(),
            first_sample: default_sensor_first_sample(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,
    #[serde(default = "default_console_history")]
    pub max_history: usize,
    #[serde(default = "default_visible_lines")]
    pub visible_lines: usize,
    #[serde(default = "default_scroll_step")]
    pub scroll_step: usize,
    /// Script operation budget per submission, 0 disables the limit.
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_output_lines: default_max_output_lines(),
            max_history: default_console_history(),
            visible_lines: default_visible_lines(),
            scroll_step: default_scroll_step(),
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionMode {
    /// Completing level N unlocks level N + 1.
    #[default]
    Sequential,
    /// Every level is playable from the start.
    Free,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ProgressionConfig {
    #[serde(default)]
    pub mode: ProgressionMode,
}

fn default_world_width() -> f32 {
    600.0
}

fn default_world_height() -> f32 {
    700.0
}

fn default_unit_size() -> f32 {
    50.0
}

fn default_grid_origin() -> [f32; 2] {
    [100.0, 100.0]
}

fn default_robot_size() -> f32 {
    20.0
}

fn default_robot_speed() -> f32 {
    200.0
}

fn default_turn_speed() -> f32 {
    180.0
}

fn default_max_history() -> usize {
    50
}

fn default_collection_radius() -> f32 {
    40.0
}

fn default_item_score() -> u32 {
    10
}

fn default_settle_epsilon() -> f32 {
    1.0
}

fn default_sensor_range() -> f32 {
    200.0
}

fn default_sensor_step() -> f32 {
    5.0
}

fn default_sensor_first_sample() -> f32 {
    1.0
}

fn default_max_output_lines() -> usize {
    500
}

fn default_console_history() -> usize {
    100
}

fn default_visible_lines() -> usize {
    25
}

fn default_scroll_step() -> usize {
    3
}

fn default_max_operations() -> u64 {
    1_000_000
}

fn default_max_call_levels() -> usize {
    64
}

impl SimConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|err| err.with_path(path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        let config: Self = toml::from_str(text).map_err(LoadError::parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save this configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        let text = toml::to_string_pretty(self)
            .map_err(|err| LoadError::Serialize(err.to_string()))?;
        std::fs::write(path, text).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), LoadError> {
        let world = &self.world;
        if world.width <= 0.0 || world.height <= 0.0 || world.unit_size <= 0.0 {
            return Err(LoadError::Invalid(
                "world width, height and unit_size must be positive".to_string(),
            ));
        }
        if self.robot.size * 2.0 >= world.width.min(world.height) {
            return Err(LoadError::Invalid(format!(
                "robot size {} does not fit a {}x{} world",
                self.robot.size, world.width, world.height
            )));
        }
        if self.robot.speed <= 0.0 || self.robot.turn_speed <= 0.0 {
            return Err(LoadError::Invalid(
                "robot speed and turn_speed must be positive".to_string(),
            ));
        }
        if self.sensor.step <= 0.0 {
            return Err(LoadError::Invalid("sensor step must be positive".to_string()));
        }
        Ok(())
    }
}
