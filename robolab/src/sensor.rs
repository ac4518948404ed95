//! Distance sensors.
//!
//! Each sensor marches a ray outward from the robot centre in fixed world-unit
//! steps and stops at the first sample that leaves the world or lands inside
//! an obstacle:
//!
//! ```text
//! robot ●──·────·────·────·────▇ obstacle
//!       1    6    11   16   21
//! ```
//!
//! Because sampling is discrete, the reported distance over-estimates the true
//! gap by less than one step, and obstacles thinner than a step can be missed.

use bevy_math::Vec2;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SensorConfig;
use crate::geometry::{GridFrame, Obstacle, WorldBounds, heading_vector, normalize_heading};
use crate::robot::Pose;

/// Mounting direction of a sensor relative to the robot heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSide {
    Front,
    Left,
    Right,
}

impl SensorSide {
    pub fn offset_degrees(self) -> f32 {
        match self {
            SensorSide::Front => 0.0,
            SensorSide::Left => -90.0,
            SensorSide::Right => 90.0,
        }
    }
}

/// One sample along a marched ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaySample {
    pub distance: f32,
    pub point: Vec2,
}

/// Iterator over the sample points of a sensor ray, nearest first.
pub struct RayMarch {
    origin: Vec2,
    direction: Vec2,
    first_sample: f32,
    step: f32,
    max_range: f32,
    index: u32,
}

impl RayMarch {
    pub fn new(origin: Vec2, heading: f32, config: &SensorConfig) -> Self {
        Self {
            origin,
            direction: heading_vector(heading),
            first_sample: config.first_sample,
            step: config.step,
            max_range: config.range,
            index: 0,
        }
    }
}

impl Iterator for RayMarch {
    type Item = RaySample;

    fn next(&mut self) -> Option<Self::Item> {
        // Computed from the index so long rays do not accumulate drift.
        let distance = self.first_sample + self.index as f32 * self.step;
        if distance >= self.max_range {
            return None;
        }
        self.index += 1;
        Some(RaySample {
            distance,
            point: self.origin + self.direction * distance,
        })
    }
}

/// Everything needed to turn a pose into sensor readings.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorModel {
    pub config: SensorConfig,
    pub bounds: WorldBounds,
    pub frame: GridFrame,
}

impl SensorModel {
    /// Distance in grid units to the nearest blocking sample, or the maximum
    /// range when nothing is hit.
    pub fn distance(&self, pose: &Pose, side: SensorSide, obstacles: &[Obstacle]) -> f32 {
        let heading = normalize_heading(pose.heading + side.offset_degrees());
        let hit = RayMarch::new(pose.position, heading, &self.config).find(|sample| {
            !self.bounds.contains(sample.point)
                || obstacles.iter().any(|obstacle| obstacle.contains(sample.point))
        });
        let world_distance = hit.map_or(self.config.range, |sample| sample.distance);
        trace!(?side, heading, world_distance, "sensor ray");
        self.frame.length_to_grid(world_distance)
    }

    /// Maximum reading in grid units.
    pub fn max_range(&self) -> f32 {
        self.frame.length_to_grid(self.config.range)
    }
}

/// A full sensor sweep as returned by `sensor()`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub front: f32,
    pub left: f32,
    pub right: f32,
    /// Grid position at the time of the sweep.
    pub position: [f32; 2],
    pub heading: f32,
}
