//! The command console: a REPL front end over a pluggable script evaluator.
//!
//! The console owns the text buffers (output, command history, scroll
//! position) and never touches the simulation directly. Evaluators bind the
//! robot through [`crate::robot::RobotCommands`] and report anything that
//! needs the session, such as starting a level, as [`SessionRequest`]s.

mod rhai_engine;

use std::collections::VecDeque;

use tracing::debug;

pub use rhai_engine::{RhaiEvaluator, ScriptRobot};

use crate::config::ConsoleConfig;
use crate::error::ScriptError;

/// Work a script asked the session to do once it has finished running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRequest {
    StartLevel(u32),
    RestartLevel,
    CheckObjectives,
    ShowLevels,
    ShowProgress,
    ReturnToLevelSelect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleRequest {
    /// Empty the output buffer after this submission is echoed.
    Clear,
    Session(SessionRequest),
}

/// What an evaluator produced for one submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Captured `print` output and command status lines, in order.
    pub printed: Vec<String>,
    /// Display form of the final value, `None` for unit.
    pub outcome: Result<Option<String>, ScriptError>,
    pub requests: Vec<ConsoleRequest>,
}

/// An embeddable interpreter that can run student programs against a bound robot.
pub trait ScriptEvaluator {
    fn evaluate(&mut self, source: &str) -> Evaluation;

    /// Forget variables and functions from earlier submissions.
    fn reset(&mut self);
}

/// Result of [`Console::execute`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionResult {
    pub echoed_input: String,
    pub stdout_lines: Vec<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub requests: Vec<SessionRequest>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Console<E> {
    evaluator: E,
    config: ConsoleConfig,
    output: VecDeque<String>,
    history: VecDeque<String>,
    /// Index into `history` while recalling, `None` while typing a new line.
    history_cursor: Option<usize>,
    /// Lines scrolled up from the newest output.
    scroll_offset: usize,
}

impl<E: ScriptEvaluator> Console<E> {
    pub fn new(evaluator: E, config: ConsoleConfig) -> Self {
        Self {
            evaluator,
            config,
            output: VecDeque::new(),
            history: VecDeque::new(),
            history_cursor: None,
            scroll_offset: 0,
        }
    }

    /// Runs one submission. Script failures come back in
    /// [`ExecutionResult::error`], they never escape as `Err`.
    pub fn execute(&mut self, source: &str) -> ExecutionResult {
        self.history_cursor = None;
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return ExecutionResult::default();
        }

        let echoed_input = echo(trimmed);
        self.print(&echoed_input);

        let evaluation = self.evaluator.evaluate(trimmed);
        let stdout_lines: Vec<String> = evaluation
            .printed
            .iter()
            .flat_map(|text| text.lines())
            .map(str::to_string)
            .collect();
        for line in &stdout_lines {
            self.push_output(line);
        }

        let (result, error) = match evaluation.outcome {
            Ok(value) => (value, None),
            Err(err) => (None, Some(format!("ERROR: {err}"))),
        };
        if let Some(value) = &result {
            self.print(value);
        }
        if let Some(message) = &error {
            debug!(%message, "script failed");
            self.print(message);
        } else {
            self.push_history(trimmed);
        }

        let mut requests = Vec::new();
        for request in evaluation.requests {
            match request {
                ConsoleRequest::Clear => self.clear(),
                ConsoleRequest::Session(request) => requests.push(request),
            }
        }

        ExecutionResult {
            echoed_input,
            stdout_lines,
            result,
            error,
            requests,
        }
    }

    /// Appends host-generated text, one buffer line per text line.
    pub fn print(&mut self, text: &str) {
        for line in text.lines() {
            self.push_output(line);
        }
    }

    pub fn clear(&mut self) {
        self.output.clear();
        self.scroll_offset = 0;
    }

    pub fn output(&self) -> impl Iterator<Item = &str> {
        self.output.iter().map(String::as_str)
    }

    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Steps back through earlier submissions, stopping at the oldest.
    pub fn history_previous(&mut self) -> Option<&str> {
        if self.history.is_empty() {
            return None;
        }
        let index = match self.history_cursor {
            Some(index) => index.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.history_cursor = Some(index);
        self.history.get(index).map(String::as_str)
    }

    /// Steps forward again. Returns `None` once past the newest entry, which
    /// means the input line should be blank.
    pub fn history_next(&mut self) -> Option<&str> {
        let next = self.history_cursor? + 1;
        if next >= self.history.len() {
            self.history_cursor = None;
            return None;
        }
        self.history_cursor = Some(next);
        self.history.get(next).map(String::as_str)
    }

    /// Scrolls by `lines`; positive values move toward older output.
    pub fn scroll(&mut self, lines: isize) {
        let offset = self.scroll_offset as isize + lines;
        self.scroll_offset = offset.clamp(0, self.max_scroll() as isize) as usize;
    }

    pub fn scroll_up(&mut self) {
        self.scroll(self.config.scroll_step as isize);
    }

    pub fn scroll_down(&mut self) {
        self.scroll(-(self.config.scroll_step as isize));
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = self.max_scroll();
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// The window of output a fixed-height view should show right now.
    pub fn visible_lines(&self) -> Vec<&str> {
        let end = self.output.len() - self.scroll_offset;
        let start = end.saturating_sub(self.config.visible_lines);
        self.output
            .range(start..end)
            .map(String::as_str)
            .collect()
    }

    /// Drops script state such as variables and user functions. Buffers stay.
    pub fn reset_scripts(&mut self) {
        self.evaluator.reset();
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut E {
        &mut self.evaluator
    }

    fn max_scroll(&self) -> usize {
        self.output.len().saturating_sub(self.config.visible_lines)
    }

    fn push_output(&mut self, line: &str) {
        self.output.push_back(line.to_string());
        while self.output.len() > self.config.max_output_lines.max(1) {
            self.output.pop_front();
        }
        self.scroll_offset = 0;
    }

    fn push_history(&mut self, source: &str) {
        self.history.push_back(source.to_string());
        while self.history.len() > self.config.max_history.max(1) {
            self.history.pop_front();
        }
    }
}

fn echo(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!(">>> {line}")
            } else {
                format!("... {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays canned evaluations so the console contract can be tested
    /// without a real interpreter.
    #[derive(Default)]
    struct CannedEvaluator {
        queue: VecDeque<Evaluation>,
        seen: Vec<String>,
    }

    impl CannedEvaluator {
        fn push(&mut self, printed: &[&str], outcome: Result<Option<String>, ScriptError>) {
            self.queue.push_back(Evaluation {
                printed: printed.iter().map(|s| s.to_string()).collect(),
                outcome,
                requests: Vec::new(),
            });
        }
    }

    impl ScriptEvaluator for CannedEvaluator {
        fn evaluate(&mut self, source: &str) -> Evaluation {
            self.seen.push(source.to_string());
            self.queue.pop_front().unwrap_or(Evaluation {
                printed: Vec::new(),
                outcome: Ok(None),
                requests: Vec::new(),
            })
        }

        fn reset(&mut self) {
            self.queue.clear();
        }
    }

    fn console(config: ConsoleConfig) -> Console<CannedEvaluator> {
        Console::new(CannedEvaluator::default(), config)
    }

    #[test]
    fn echoes_prints_and_result() {
        let mut console = console(ConsoleConfig::default());
        console
            .evaluator_mut()
            .push(&["hello\nworld"], Ok(Some("42".to_string())));
        let result = console.execute("  print(\"hello\"); 42  ");
        assert_eq!(result.echoed_input, ">>> print(\"hello\"); 42");
        assert_eq!(result.stdout_lines, vec!["hello", "world"]);
        assert_eq!(result.result.as_deref(), Some("42"));
        assert!(result.is_success());
        let lines: Vec<&str> = console.output().collect();
        assert_eq!(lines, vec![">>> print(\"hello\"); 42", "hello", "world", "42"]);
    }

    #[test]
    fn errors_are_formatted_and_not_recorded() {
        let mut console = console(ConsoleConfig::default());
        console.evaluator_mut().push(
            &["partial"],
            Err(ScriptError::Runtime("Variable not found: x".to_string())),
        );
        let result = console.execute("x + 1");
        assert_eq!(result.error.as_deref(), Some("ERROR: Variable not found: x"));
        assert_eq!(result.stdout_lines, vec!["partial"]);
        assert_eq!(console.history().count(), 0);
        assert_eq!(console.output().last(), Some("ERROR: Variable not found: x"));
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut console = console(ConsoleConfig::default());
        let result = console.execute("   \n ");
        assert_eq!(result, ExecutionResult::default());
        assert!(console.evaluator().seen.is_empty());
        assert_eq!(console.output_len(), 0);
    }

    #[test]
    fn reset_scripts_keeps_buffers() {
        let mut console = console(ConsoleConfig::default());
        console.evaluator_mut().push(&[], Ok(Some("1".to_string())));
        console.print("kept");
        console.reset_scripts();
        assert!(console.evaluator().queue.is_empty());
        assert_eq!(console.output().collect::<Vec<_>>(), vec!["kept"]);
    }

    #[test]
    fn multi_line_echo_uses_continuation_prompt() {
        let mut console = console(ConsoleConfig::default());
        let result = console.execute("let a = 1;\na");
        assert_eq!(result.echoed_input, ">>> let a = 1;\n... a");
        assert_eq!(console.output_len(), 2);
    }

    #[test]
    fn output_buffer_evicts_oldest() {
        let mut console = console(ConsoleConfig {
            max_output_lines: 3,
            ..ConsoleConfig::default()
        });
        for i in 0..4 {
            console.print(&format!("line {i}"));
        }
        let lines: Vec<&str> = console.output().collect();
        assert_eq!(lines, vec!["line 1", "line 2", "line 3"]);
    }

    #[test]
    fn clear_request_empties_buffer_after_submission() {
        let mut console = console(ConsoleConfig::default());
        console.print("old output");
        console.evaluator_mut().queue.push_back(Evaluation {
            printed: vec!["bye".to_string()],
            outcome: Ok(None),
            requests: vec![
                ConsoleRequest::Clear,
                ConsoleRequest::Session(SessionRequest::ShowLevels),
            ],
        });
        let result = console.execute("clear(); levels()");
        assert_eq!(console.output_len(), 0);
        assert_eq!(result.requests, vec![SessionRequest::ShowLevels]);
        assert_eq!(console.history().collect::<Vec<_>>(), vec!["clear(); levels()"]);
    }

    #[test]
    fn history_recall_walks_both_ways() {
        let mut console = console(ConsoleConfig::default());
        for source in ["a", "b", "c"] {
            console.execute(source);
        }
        assert_eq!(console.history_previous(), Some("c"));
        assert_eq!(console.history_previous(), Some("b"));
        assert_eq!(console.history_previous(), Some("a"));
        assert_eq!(console.history_previous(), Some("a"));
        assert_eq!(console.history_next(), Some("b"));
        assert_eq!(console.history_next(), Some("c"));
        assert_eq!(console.history_next(), None);
        assert_eq!(console.history_next(), None);
    }

    #[test]
    fn history_is_bounded() {
        let mut console = console(ConsoleConfig {
            max_history: 2,
            ..ConsoleConfig::default()
        });
        for source in ["a", "b", "c"] {
            console.execute(source);
        }
        assert_eq!(console.history().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn scrolling_is_clamped_to_buffer() {
        let mut console = console(ConsoleConfig {
            visible_lines: 4,
            scroll_step: 3,
            ..ConsoleConfig::default()
        });
        for i in 0..10 {
            console.print(&format!("{i}"));
        }
        assert_eq!(console.visible_lines(), vec!["6", "7", "8", "9"]);

        console.scroll_up();
        assert_eq!(console.visible_lines(), vec!["3", "4", "5", "6"]);
        console.scroll_up();
        console.scroll_up();
        assert_eq!(console.scroll_offset(), 6);
        assert_eq!(console.visible_lines(), vec!["0", "1", "2", "3"]);

        console.scroll_down();
        assert_eq!(console.scroll_offset(), 3);
        console.scroll(-100);
        assert_eq!(console.scroll_offset(), 0);

        console.scroll_to_top();
        console.print("10");
        assert_eq!(console.scroll_offset(), 0);
    }
}
