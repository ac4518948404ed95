use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::config::ProgressionMode;
use crate::level::Level;

/// Best results for one level across attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LevelRecord {
    pub completed: bool,
    pub best_score: u32,
    pub best_time: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    pub total_levels: usize,
    pub completed_levels: usize,
    pub unlocked_levels: usize,
    pub completion_percentage: f32,
}

/// Level catalogue plus unlock state and per-level records.
#[derive(Clone, Debug)]
pub struct LevelManager {
    levels: BTreeMap<u32, Level>,
    unlocked: BTreeSet<u32>,
    records: BTreeMap<u32, LevelRecord>,
    mode: ProgressionMode,
}

impl LevelManager {
    pub fn new(levels: impl IntoIterator<Item = Level>, mode: ProgressionMode) -> Self {
        let levels: BTreeMap<u32, Level> =
            levels.into_iter().map(|level| (level.id, level)).collect();
        let mut manager = Self {
            levels,
            unlocked: BTreeSet::new(),
            records: BTreeMap::new(),
            mode,
        };
        manager.reset_progress();
        manager
    }

    pub fn mode(&self) -> ProgressionMode {
        self.mode
    }

    pub fn get_level(&self, id: u32) -> Option<&Level> {
        self.levels.get(&id)
    }

    pub(crate) fn get_level_mut(&mut self, id: u32) -> Option<&mut Level> {
        self.levels.get_mut(&id)
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    pub fn is_unlocked(&self, id: u32) -> bool {
        self.unlocked.contains(&id)
    }

    /// Unlocks an existing level. Returns `true` if it was newly unlocked.
    pub fn unlock(&mut self, id: u32) -> bool {
        if !self.levels.contains_key(&id) {
            return false;
        }
        let newly = self.unlocked.insert(id);
        if newly {
            info!(level = id, "level unlocked");
        }
        newly
    }

    pub fn record(&self, id: u32) -> LevelRecord {
        self.records.get(&id).copied().unwrap_or_default()
    }

    /// Records a completion and unlocks the following level. Returns the id
    /// of a level this call newly unlocked.
    pub fn complete(&mut self, id: u32, score: u32, time_taken: f32) -> Option<u32> {
        if !self.levels.contains_key(&id) {
            return None;
        }
        let record = self.records.entry(id).or_default();
        record.completed = true;
        record.best_score = record.best_score.max(score);
        if record.best_time.is_none_or(|best| time_taken < best) {
            record.best_time = Some(time_taken);
        }
        info!(level = id, score, time_taken, "level completed");

        // The highest possible id has no successor.
        id.checked_add(1).filter(|next| self.unlock(*next))
    }

    pub fn get_progress(&self) -> Progress {
        let total_levels = self.levels.len();
        let completed_levels = self
            .levels
            .keys()
            .filter(|id| self.record(**id).completed)
            .count();
        let unlocked_levels = self.get_available_levels().len();
        let completion_percentage = if total_levels == 0 {
            0.0
        } else {
            completed_levels as f32 / total_levels as f32 * 100.0
        };
        Progress {
            total_levels,
            completed_levels,
            unlocked_levels,
            completion_percentage,
        }
    }

    /// Unlocked level ids in ascending order.
    pub fn get_available_levels(&self) -> Vec<u32> {
        self.unlocked
            .iter()
            .copied()
            .filter(|id| self.levels.contains_key(id))
            .collect()
    }

    /// The next existing level after `current`, locked or not.
    pub fn next_level(&self, current: u32) -> Option<u32> {
        self.levels
            .range(current.saturating_add(1)..)
            .next()
            .map(|(id, _)| *id)
    }

    /// Forgets every record and relocks everything except level 1.
    pub fn reset_progress(&mut self) {
        self.records.clear();
        self.unlocked.clear();
        self.unlocked.insert(1);
        if self.mode == ProgressionMode::Free {
            self.unlocked.extend(self.levels.keys().copied());
        }
        for level in self.levels.values_mut() {
            level.clear_display_cache();
        }
    }

    pub fn summary(&self) -> String {
        let progress = self.get_progress();
        let mut lines = vec![format!(
            "Progress: {}/{} levels completed ({:.0}%)",
            progress.completed_levels, progress.total_levels, progress.completion_percentage
        )];
        for level in self.levels.values() {
            let record = self.record(level.id);
            let state = if record.completed {
                "done"
            } else if self.is_unlocked(level.id) {
                "open"
            } else {
                "locked"
            };
            let mut line = format!(
                "  {:>2}. {:<24} [{}] difficulty {}",
                level.id, level.name, state, level.difficulty
            );
            if record.completed {
                line.push_str(&format!(" best score {}", record.best_score));
                if let Some(time) = record.best_time {
                    line.push_str(&format!(" best time {time:.1}s"));
                }
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}
