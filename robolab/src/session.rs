use std::cell::{Ref, RefCell};
use std::rc::Rc;

use tracing::{info, warn};

use crate::LoadError;
use crate::clock::{Clock, SystemClock};
use crate::config::SimConfig;
use crate::console::{Console, ExecutionResult, RhaiEvaluator, ScriptEvaluator, SessionRequest};
use crate::error::SessionError;
use crate::level::{Level, ObjectiveProgress};
use crate::level_format::LevelPack;
use crate::level_manager::LevelManager;
use crate::robot::{Robot, RobotCommands, SettleCallback, Telemetry};

/// Hints printed when an easy level starts.
const OPENING_HINTS: usize = 2;
const HINT_MAX_DIFFICULTY: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    LevelSelect,
    Playing,
    LevelComplete,
}

/// Summary of a finished attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelCompletion {
    pub level_id: u32,
    pub level_name: String,
    pub score: u32,
    pub best_score: u32,
    pub time_taken: f32,
    pub commands_executed: u32,
    pub sensor_calls: u32,
    pub items_collected: u32,
    pub next_unlocked: Option<u32>,
}

/// Owns one robot, the level catalogue and the console. Robot animation is
/// stepped by `tick`; attempts are timed against a wall clock.
pub struct SimulationSession<E: ScriptEvaluator = RhaiEvaluator> {
    robot: Rc<RefCell<Robot>>,
    levels: LevelManager,
    console: Console<E>,
    state: GameState,
    current_level: Option<u32>,
    clock: Box<dyn Clock>,
    level_started: f64,
    completion: Option<LevelCompletion>,
}

impl SimulationSession<RhaiEvaluator> {
    pub fn new(config: SimConfig, pack: LevelPack) -> Self {
        let robot = Rc::new(RefCell::new(Robot::new(&config)));
        let evaluator = RhaiEvaluator::new(robot.clone(), &config.console);
        Self::with_evaluator(&config, pack.levels, robot, evaluator)
    }

    pub fn with_builtin_levels(config: SimConfig) -> Result<Self, LoadError> {
        Ok(Self::new(config, LevelPack::builtin()?))
    }
}

impl<E: ScriptEvaluator> SimulationSession<E> {
    /// Builds a session around an evaluator that is already bound to `robot`.
    pub fn with_evaluator(
        config: &SimConfig,
        levels: impl IntoIterator<Item = Level>,
        robot: Rc<RefCell<Robot>>,
        evaluator: E,
    ) -> Self {
        Self {
            robot,
            levels: LevelManager::new(levels, config.progression.mode),
            console: Console::new(evaluator, config.console.clone()),
            state: GameState::LevelSelect,
            current_level: None,
            clock: Box::new(SystemClock::new()),
            level_started: 0.0,
            completion: None,
        }
    }

    /// Replaces the clock attempts are timed with.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self.level_started = self.clock.now();
        self
    }

    pub fn start_level(&mut self, id: u32) -> Result<(), SessionError> {
        let Some(level) = self.levels.get_level(id) else {
            warn!(level = id, "unknown level");
            return Err(SessionError::UnknownLevel(id));
        };
        if !self.levels.is_unlocked(id) {
            warn!(level = id, "level is locked");
            return Err(SessionError::LevelLocked(id));
        }

        self.robot.borrow_mut().reset_for_level(level);
        let intro = level_intro(level);
        info!(level = id, name = %level.name, "level started");

        if let Some(level) = self.levels.get_level_mut(id) {
            level.clear_display_cache();
        }
        self.current_level = Some(id);
        self.level_started = self.clock.now();
        self.completion = None;
        self.state = GameState::Playing;
        self.console.print(&intro);
        Ok(())
    }

    pub fn restart_level(&mut self) -> Result<(), SessionError> {
        let id = self.current_level.ok_or(SessionError::NoActiveLevel)?;
        self.start_level(id)
    }

    pub fn return_to_level_select(&mut self) {
        self.state = GameState::LevelSelect;
        self.current_level = None;
        self.completion = None;
    }

    /// Advances the robot animation. Returns the completion on the tick the
    /// level is finished.
    pub fn tick(&mut self, dt: f32) -> Option<LevelCompletion> {
        let settled = self.robot.borrow_mut().update(dt);
        if settled && self.state == GameState::Playing && self.evaluate_objectives() {
            return self.completion.clone();
        }
        None
    }

    /// Evaluates the active level now. Returns `true` only for the check that
    /// completes it.
    pub fn check_objectives(&mut self) -> bool {
        self.state == GameState::Playing && self.evaluate_objectives()
    }

    /// Runs a console submission, then handles whatever session work the
    /// script queued.
    pub fn execute(&mut self, source: &str) -> ExecutionResult {
        let result = self.console.execute(source);
        for request in &result.requests {
            self.handle_request(*request);
        }
        // Commands that do not move the robot can still finish a level.
        if self.state == GameState::Playing && !self.robot.borrow().is_animating() {
            self.evaluate_objectives();
        }
        result
    }

    /// Registers a hook that fires each time the robot comes to rest.
    pub fn on_robot_settled(&mut self, callback: SettleCallback) {
        self.robot.borrow_mut().set_on_settle(callback);
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn current_level(&self) -> Option<&Level> {
        self.current_level.and_then(|id| self.levels.get_level(id))
    }

    /// Wall-clock seconds spent on the current attempt. Frozen at the
    /// completion time once the level is finished.
    pub fn level_time(&self) -> f32 {
        match self.state {
            GameState::Playing => (self.clock.now() - self.level_started).max(0.0) as f32,
            GameState::LevelComplete => self
                .completion
                .as_ref()
                .map_or(0.0, |completion| completion.time_taken),
            GameState::LevelSelect => 0.0,
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        self.robot.borrow().telemetry()
    }

    pub fn robot(&self) -> Ref<'_, Robot> {
        self.robot.borrow()
    }

    pub fn is_robot_animating(&self) -> bool {
        self.robot.borrow().is_animating()
    }

    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut LevelManager {
        &mut self.levels
    }

    pub fn console(&self) -> &Console<E> {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console<E> {
        &mut self.console
    }

    pub fn last_completion(&self) -> Option<&LevelCompletion> {
        self.completion.as_ref()
    }

    pub fn objective_progress(&self) -> Option<ObjectiveProgress> {
        let level = self.current_level()?;
        Some(level.progress(&self.telemetry(), self.level_time()))
    }

    fn evaluate_objectives(&mut self) -> bool {
        let Some(id) = self.current_level else {
            return false;
        };
        let telemetry = self.telemetry();
        let elapsed = self.level_time();
        let Some(level) = self.levels.get_level_mut(id) else {
            return false;
        };
        level.refresh_display_cache(&telemetry, elapsed);
        if !level.is_completed(&telemetry, elapsed) {
            return false;
        }
        let level_name = level.name.clone();
        let score = level.score(elapsed, &telemetry);

        let next_unlocked = self.levels.complete(id, score, elapsed);
        let completion = LevelCompletion {
            level_id: id,
            level_name,
            score,
            best_score: self.levels.record(id).best_score,
            time_taken: elapsed,
            commands_executed: telemetry.commands_executed,
            sensor_calls: telemetry.sensor_calls,
            items_collected: telemetry.items_collected,
            next_unlocked,
        };
        self.console.print(&completion_report(&completion));
        self.completion = Some(completion);
        self.state = GameState::LevelComplete;
        true
    }

    fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::StartLevel(id) => {
                if let Err(err) = self.start_level(id) {
                    self.console.print(&err.to_string());
                }
            }
            SessionRequest::RestartLevel => {
                if let Err(err) = self.restart_level() {
                    self.console.print(&err.to_string());
                }
            }
            SessionRequest::CheckObjectives => {
                if self.state == GameState::LevelComplete {
                    self.console.print("Level already complete");
                } else if !self.check_objectives() {
                    let report = self
                        .objective_progress()
                        .map(|progress| progress_report(&progress))
                        .unwrap_or_else(|| SessionError::NoActiveLevel.to_string());
                    self.console.print(&report);
                }
            }
            SessionRequest::ShowLevels => {
                let summary = self.levels.summary();
                self.console.print(&summary);
            }
            SessionRequest::ShowProgress => {
                let mut report = self.levels.summary();
                if let Some(progress) = self.objective_progress() {
                    report.push('\n');
                    report.push_str(&progress_report(&progress));
                }
                self.console.print(&report);
            }
            SessionRequest::ReturnToLevelSelect => self.return_to_level_select(),
        }
    }
}

fn level_intro(level: &Level) -> String {
    let mut lines = vec![
        format!("=== Level {}: {} ===", level.id, level.name),
        level.description.clone(),
        "Objectives:".to_string(),
    ];
    lines.extend(level.objectives.iter().map(|o| format!("  - {}", o.label())));
    if let Some(limit) = level.time_limit {
        lines.push(format!("Time limit: {limit} seconds"));
    }
    if level.difficulty <= HINT_MAX_DIFFICULTY {
        lines.extend(
            level
                .opening_hints(OPENING_HINTS)
                .iter()
                .map(|hint| format!("Hint: {hint}")),
        );
    }
    lines.join("\n")
}

fn progress_report(progress: &ObjectiveProgress) -> String {
    let mut lines = vec![format!(
        "Objectives: {}/{} complete",
        progress.completed, progress.total
    )];
    lines.extend(progress.objectives.iter().map(|status| {
        let mark = if status.completed { "x" } else { " " };
        format!("  [{mark}] {}", status.description)
    }));
    lines.join("\n")
}

fn completion_report(completion: &LevelCompletion) -> String {
    let mut lines = vec![
        format!(
            "*** Level {} complete: {} ***",
            completion.level_id, completion.level_name
        ),
        format!(
            "Score {} (best {}) in {:.1}s with {} commands",
            completion.score,
            completion.best_score,
            completion.time_taken,
            completion.commands_executed
        ),
    ];
    if let Some(next) = completion.next_unlocked {
        lines.push(format!("Level {next} unlocked! Type start_level({next}) to continue"));
    }
    lines.join("\n")
}
