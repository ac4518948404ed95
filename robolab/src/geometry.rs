//! World-space primitives shared by the robot, its sensors and the levels.
//!
//! Coordinates are screen-style: x grows east, y grows south. Headings are
//! degrees with 0 = east and 90 = south, so a right turn adds to the heading.

use bevy_math::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::{RobotConfig, WorldConfig};

/// Axis-aligned rectangle in world units, anchored at its top-left corner.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Obstacles never move and never block motion, only sensor rays.
pub type Obstacle = Rect;

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    /// Edges count as inside.
    pub fn contains(&self, point: Vec2) -> bool {
        let (min, max) = (self.min(), self.max());
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }

    #[cfg(test)]
    fn corners(&self) -> [Vec2; 4] {
        let (min, max) = (self.min(), self.max());
        [min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)]
    }
}

/// Mapping between grid cells and world positions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridFrame {
    pub origin: Vec2,
    pub unit_size: f32,
}

impl GridFrame {
    pub fn to_world(&self, grid: Vec2) -> Vec2 {
        self.origin + grid * self.unit_size
    }

    pub fn to_grid(&self, world: Vec2) -> Vec2 {
        (world - self.origin) / self.unit_size
    }

    /// Converts a world-space length into grid units.
    pub fn length_to_grid(&self, world_length: f32) -> f32 {
        world_length / self.unit_size
    }
}

/// The playable area. Robot positions are clamped to an inset rectangle so
/// the body stays fully on screen; sensor rays use the full extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl WorldBounds {
    pub fn new(world: &WorldConfig, robot: &RobotConfig) -> Self {
        Self {
            width: world.width,
            height: world.height,
            margin: robot.size,
        }
    }

    pub fn clamp(&self, point: Vec2) -> Vec2 {
        let min = Vec2::splat(self.margin);
        let max = Vec2::new(self.width - self.margin, self.height - self.margin);
        point.clamp(min, max)
    }

    /// True while a sensor sample is strictly inside the world.
    pub fn contains(&self, point: Vec2) -> bool {
        point.x > 0.0 && point.x < self.width && point.y > 0.0 && point.y < self.height
    }
}

/// Wraps any angle into `[0, 360)`.
pub fn normalize_heading(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed rotation from `from` to `to` along the shorter arc, in `(-180, 180]`.
pub fn shortest_turn(from: f32, to: f32) -> f32 {
    let delta = normalize_heading(to - from);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// Unit vector pointing along `heading` degrees.
pub fn heading_vector(heading: f32) -> Vec2 {
    Vec2::from_angle(heading.to_radians())
}

/// Exact distance along a ray to the boundary of `rect`, if the ray hits it.
/// Reference answer for the sampled sensor.
#[cfg(test)]
pub(crate) fn ray_rect_distance(origin: Vec2, direction: Vec2, rect: &Rect) -> Option<f32> {
    if rect.contains(origin) {
        return Some(0.0);
    }
    let corners = rect.corners();
    (0..corners.len())
        .filter_map(|i| {
            ray_segment_intersection_distance(
                origin,
                direction,
                corners[i],
                corners[(i + 1) % corners.len()],
            )
        })
        .min_by(f32::total_cmp)
}

#[cfg(test)]
fn ray_segment_intersection_distance(
    ray_origin: Vec2,
    ray_direction: Vec2,
    segment_start: Vec2,
    segment_end: Vec2,
) -> Option<f32> {
    let to_start = segment_start - ray_origin;
    let segment = segment_end - segment_start;
    let denom = ray_direction.perp_dot(segment);

    if denom.abs() < 1e-6 {
        return None;
    }

    let t = to_start.perp_dot(segment) / denom;
    let u = to_start.perp_dot(ray_direction) / denom;

    if t >= 0.0 && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_wrap_into_range() {
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(360.0), 0.0);
        assert_eq!(normalize_heading(725.0), 5.0);
        assert_eq!(normalize_heading(-1e-9), 0.0);
    }

    #[test]
    fn shortest_turn_crosses_zero() {
        assert_eq!(shortest_turn(350.0, 10.0), 20.0);
        assert_eq!(shortest_turn(10.0, 350.0), -20.0);
        assert_eq!(shortest_turn(0.0, 180.0), 180.0);
        assert_eq!(shortest_turn(90.0, 90.0), 0.0);
    }

    #[test]
    fn heading_zero_points_east_and_ninety_south() {
        let east = heading_vector(0.0);
        let south = heading_vector(90.0);
        assert!((east - Vec2::X).length() < 1e-6);
        assert!((south - Vec2::Y).length() < 1e-6);
    }

    #[test]
    fn grid_frame_round_trips_cells() {
        let frame = GridFrame {
            origin: Vec2::new(100.0, 100.0),
            unit_size: 50.0,
        };
        assert_eq!(frame.to_world(Vec2::new(5.0, 5.0)), Vec2::new(350.0, 350.0));
        assert_eq!(frame.to_grid(Vec2::new(200.0, 150.0)), Vec2::new(2.0, 1.0));
    }

    #[test]
    fn clamp_keeps_robot_inside_margin() {
        let bounds = WorldBounds {
            width: 600.0,
            height: 700.0,
            margin: 20.0,
        };
        assert_eq!(bounds.clamp(Vec2::new(-50.0, 900.0)), Vec2::new(20.0, 680.0));
        assert!(!bounds.contains(Vec2::new(0.0, 10.0)));
        assert!(bounds.contains(Vec2::new(1.0, 10.0)));
    }

    #[test]
    fn rect_edges_are_inclusive() {
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(rect.contains(Vec2::new(10.0, 30.0)));
        assert!(!rect.contains(Vec2::new(9.9, 20.0)));
    }

    #[test]
    fn ray_hits_nearest_rect_face() {
        let rect = Rect::new(200.0, 80.0, 40.0, 40.0);
        let distance = ray_rect_distance(Vec2::new(100.0, 100.0), Vec2::X, &rect).unwrap();
        assert!((distance - 100.0).abs() < 1e-4);
        assert_eq!(ray_rect_distance(Vec2::new(100.0, 100.0), -Vec2::X, &rect), None);
    }
}
