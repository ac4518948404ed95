use serde::{Deserialize, Serialize};

use crate::geometry::{Obstacle, Rect};
use crate::objective::Objective;
use crate::robot::{Environment, Item, Telemetry};

/// Score every completion starts from.
const BASE_SCORE: i64 = 100;
const TIME_BONUS_SECONDS: i64 = 50;
const COMMAND_BONUS: i64 = 20;
const SENSOR_BONUS_PER_CALL: i64 = 2;
const SENSOR_BONUS_CAP: i64 = 10;

/// One puzzle: a world layout plus the objectives that finish it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Level {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 1 (easiest) to 6.
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    /// Spawn cell in grid units.
    #[serde(default)]
    pub start: [f32; 2],
    #[serde(default)]
    pub start_heading: f32,
    /// Shown to the player, not enforced. Use a `time_limit` objective to enforce one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<f32>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_area: Option<Rect>,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
}

fn default_difficulty() -> u8 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectiveStatus {
    pub description: String,
    pub completed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectiveProgress {
    pub total: usize,
    pub completed: usize,
    pub objectives: Vec<ObjectiveStatus>,
}

impl Level {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            difficulty: default_difficulty(),
            start: [0.0, 0.0],
            start_heading: 0.0,
            time_limit: None,
            hints: Vec::new(),
            target_area: None,
            obstacles: Vec::new(),
            items: Vec::new(),
            objectives: Vec::new(),
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objectives.push(objective);
        self
    }

    /// Fresh copy of the level's world for a new attempt.
    pub fn environment(&self) -> Environment {
        Environment {
            obstacles: self.obstacles.clone(),
            items: self.items.clone(),
            target_area: self.target_area,
        }
    }

    /// True when every objective holds, so a level without objectives is
    /// complete as soon as it is checked.
    pub fn is_completed(&self, telemetry: &Telemetry, elapsed_secs: f32) -> bool {
        self.objectives
            .iter()
            .all(|objective| objective.is_met(telemetry, elapsed_secs))
    }

    pub fn progress(&self, telemetry: &Telemetry, elapsed_secs: f32) -> ObjectiveProgress {
        let objectives: Vec<ObjectiveStatus> = self
            .objectives
            .iter()
            .map(|objective| ObjectiveStatus {
                description: objective.label(),
                completed: objective.is_met(telemetry, elapsed_secs),
            })
            .collect();
        ObjectiveProgress {
            total: objectives.len(),
            completed: objectives.iter().filter(|status| status.completed).count(),
            objectives,
        }
    }

    /// Stores the current evaluation in each objective's `completed` flag.
    pub fn refresh_display_cache(&mut self, telemetry: &Telemetry, elapsed_secs: f32) {
        for objective in &mut self.objectives {
            objective.completed = objective.is_met(telemetry, elapsed_secs);
        }
    }

    pub fn clear_display_cache(&mut self) {
        for objective in &mut self.objectives {
            objective.completed = false;
        }
    }

    /// Completion score. The difficulty multiplier is `1 + 0.2 * (difficulty - 1)`,
    /// applied in integer arithmetic and truncated.
    pub fn score(&self, time_taken_secs: f32, telemetry: &Telemetry) -> u32 {
        let time_bonus = (TIME_BONUS_SECONDS - time_taken_secs.max(0.0).floor() as i64).max(0);
        let command_bonus = (COMMAND_BONUS - i64::from(telemetry.commands_executed)).max(0);
        let sensor_bonus =
            (i64::from(telemetry.sensor_calls) * SENSOR_BONUS_PER_CALL).min(SENSOR_BONUS_CAP);
        let total = BASE_SCORE + time_bonus + command_bonus + sensor_bonus;
        let multiplier_fifths = 4 + i64::from(self.difficulty.max(1));
        (total * multiplier_fifths / 5) as u32
    }

    pub fn opening_hints(&self, count: usize) -> &[String] {
        &self.hints[..self.hints.len().min(count)]
    }
}

#[cfg(test)]
mod tests {
    use bevy_math::Vec2;

    use super::*;
    use crate::objective::ObjectiveKind;

    fn telemetry(grid: Vec2, commands: u32, sensors: u32) -> Telemetry {
        Telemetry {
            position: Vec2::ZERO,
            grid_position: grid,
            heading: 0.0,
            animating: false,
            commands_executed: commands,
            sensor_calls: sensors,
            items_collected: 0,
            items_remaining: 0,
            score: 0,
            at_target: false,
        }
    }

    fn reach_level() -> Level {
        Level::new(1, "First Steps")
            .with_objective(Objective::new(
                "Reach (5, 5)",
                ObjectiveKind::ReachTarget {
                    target: [5.0, 5.0],
                    tolerance: 1.0,
                },
            ))
            .with_objective(Objective::new(
                "Be quick",
                ObjectiveKind::EfficientPath { max_commands: 5 },
            ))
    }

    #[test]
    fn completed_only_when_all_objectives_hold() {
        let level = reach_level();
        assert!(level.is_completed(&telemetry(Vec2::new(5.0, 5.0), 3, 0), 0.0));
        assert!(!level.is_completed(&telemetry(Vec2::new(5.0, 5.0), 6, 0), 0.0));
        assert!(!level.is_completed(&telemetry(Vec2::new(0.0, 0.0), 3, 0), 0.0));
    }

    #[test]
    fn level_without_objectives_is_complete() {
        let level = Level::new(9, "Sandbox");
        assert!(level.is_completed(&telemetry(Vec2::ZERO, 0, 0), 0.0));
        assert_eq!(level.progress(&telemetry(Vec2::ZERO, 0, 0), 0.0).total, 0);
    }

    #[test]
    fn progress_counts_met_objectives() {
        let mut level = reach_level();
        let snapshot = telemetry(Vec2::new(5.0, 5.0), 6, 0);
        let progress = level.progress(&snapshot, 0.0);
        assert_eq!(progress.total, 2);
        assert_eq!(progress.completed, 1);
        assert!(progress.objectives[0].completed);

        level.refresh_display_cache(&snapshot, 0.0);
        assert!(level.objectives[0].completed);
        assert!(!level.objectives[1].completed);
        level.clear_display_cache();
        assert!(!level.objectives[0].completed);
    }

    #[test]
    fn score_formula() {
        let mut level = reach_level();
        // 100 + (50 - 10) + (20 - 3) + min(10, 4 * 2)
        assert_eq!(level.score(10.7, &telemetry(Vec2::ZERO, 3, 4)), 165);
        level.difficulty = 3;
        // 165 * 1.4
        assert_eq!(level.score(10.7, &telemetry(Vec2::ZERO, 3, 4)), 231);
        level.difficulty = 1;
        // Bonuses bottom out at zero and the sensor bonus caps at ten.
        assert_eq!(level.score(120.0, &telemetry(Vec2::ZERO, 40, 30)), 110);
    }

    #[test]
    fn difficulty_multiplier_truncates() {
        let mut level = reach_level();
        level.difficulty = 2;
        // 101 * 1.2 = 121.2
        assert_eq!(level.score(50.0, &telemetry(Vec2::ZERO, 20, 0)), 100 * 6 / 5);
        assert_eq!(level.score(49.0, &telemetry(Vec2::ZERO, 20, 0)), 121);
    }

    #[test]
    fn opening_hints_are_bounded() {
        let mut level = reach_level();
        assert!(level.opening_hints(2).is_empty());
        level.hints = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(level.opening_hints(2), ["a".to_string(), "b".to_string()]);
    }
}
