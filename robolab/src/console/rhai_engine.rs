use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{AST, Array, Dynamic, Engine, EvalAltResult, FLOAT, INT, Map, Scope};

use super::{ConsoleRequest, Evaluation, ScriptEvaluator, SessionRequest};
use crate::config::ConsoleConfig;
use crate::error::ScriptError;
use crate::robot::{RobotCommands, SharedRobot};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

const HELP: &[&str] = &[
    "Robot commands:",
    "  robot.forward(n)   robot.backward(n)     move n grid units (default 1)",
    "  robot.left(deg)    robot.right(deg)      turn in place (default 90)",
    "  robot.move_to(x, y)                      drive straight to a grid cell",
    "  robot.face_direction(\"north\")           north, south, east or west",
    "  robot.sensor()                           map with front, left, right, position, heading",
    "  robot.front_sensor()  robot.left_sensor()  robot.right_sensor()",
    "  robot.collect()    robot.undo()    robot.reset()    robot.avoid_obstacle()",
    "  robot.get_position()  robot.status()  robot.at_target()",
    "Session:",
    "  start_level(n)  restart_level()  check_objectives()  levels()  progress()  menu()",
    "Utilities:",
    "  print(x)  help()  clear()  time()  radians(deg)  degrees(rad)  sin cos sqrt abs PI()",
];

/// Buffers the engine callbacks write into during one evaluation.
#[derive(Default)]
struct ScriptShared {
    printed: Vec<String>,
    requests: Vec<ConsoleRequest>,
}

type SharedState = Rc<RefCell<ScriptShared>>;

/// Script-side handle bound to the identifier `robot`.
#[derive(Clone)]
pub struct ScriptRobot {
    robot: SharedRobot,
    shared: SharedState,
}

impl ScriptRobot {
    fn say(&self, line: String) {
        self.shared.borrow_mut().printed.push(line);
    }

    fn forward(&mut self, units: f32) {
        let status = self.robot.borrow_mut().forward(units);
        self.say(status);
    }

    fn backward(&mut self, units: f32) {
        let status = self.robot.borrow_mut().backward(units);
        self.say(status);
    }

    fn left(&mut self, degrees: f32) {
        let status = self.robot.borrow_mut().left(degrees);
        self.say(status);
    }

    fn right(&mut self, degrees: f32) {
        let status = self.robot.borrow_mut().right(degrees);
        self.say(status);
    }

    fn move_to(&mut self, x: f32, y: f32) {
        let status = self.robot.borrow_mut().move_to(x, y);
        self.say(status);
    }

    fn face_direction(&mut self, direction: &str) {
        let status = self.robot.borrow_mut().face_direction(direction);
        // An unknown direction is reported, not raised.
        self.say(status.unwrap_or_else(|err| err.to_string()));
    }

    fn sensor(&mut self) -> Map {
        let readings = self.robot.borrow_mut().sensor();
        let heading = script_float(readings.heading);
        let mut map = Map::new();
        map.insert("front".into(), Dynamic::from_float(script_float(readings.front)));
        map.insert("left".into(), Dynamic::from_float(script_float(readings.left)));
        map.insert("right".into(), Dynamic::from_float(script_float(readings.right)));
        map.insert(
            "position".into(),
            Dynamic::from_array(pair(readings.position[0], readings.position[1])),
        );
        map.insert("heading".into(), Dynamic::from_float(heading));
        map.insert("angle".into(), Dynamic::from_float(heading));
        map
    }

    fn front_sensor(&mut self) -> FLOAT {
        script_float(self.robot.borrow_mut().front_sensor())
    }

    fn left_sensor(&mut self) -> FLOAT {
        script_float(self.robot.borrow_mut().left_sensor())
    }

    fn right_sensor(&mut self) -> FLOAT {
        script_float(self.robot.borrow_mut().right_sensor())
    }

    fn collect(&mut self) {
        let status = self.robot.borrow_mut().collect();
        self.say(status);
    }

    fn undo(&mut self) {
        let status = self.robot.borrow_mut().undo();
        self.say(status);
    }

    fn reset(&mut self) {
        let status = self.robot.borrow_mut().reset();
        self.say(status);
    }

    fn avoid_obstacle(&mut self) {
        let status = self.robot.borrow_mut().avoid_obstacle();
        self.say(status);
    }

    fn get_position(&mut self) -> Array {
        let position = self.robot.borrow().get_position();
        pair(position.x, position.y)
    }

    fn status(&mut self) -> String {
        self.robot.borrow().status()
    }

    fn at_target(&mut self) -> bool {
        self.robot.borrow().at_target()
    }
}

/// Sensor and pose values are rounded to a thousandth before scripts see them.
fn script_float(value: f32) -> FLOAT {
    (FLOAT::from(value) * 1000.0).round() / 1000.0
}

fn pair(x: f32, y: f32) -> Array {
    vec![
        Dynamic::from_float(script_float(x)),
        Dynamic::from_float(script_float(y)),
    ]
}

/// Script numbers narrowed to the robot's `f32`. NaN and values that do not
/// fit are rejected here, before they reach the motion queue.
fn number(value: &Dynamic, what: &str) -> ScriptResult<f32> {
    if let Ok(float) = value.as_float() {
        let narrowed = float as f32;
        if !narrowed.is_finite() {
            return Err(format!("{what} must be a finite number, got {float}").into());
        }
        return Ok(narrowed);
    }
    if let Ok(int) = value.as_int() {
        return Ok(int as f32);
    }
    Err(format!("{what} must be a number, got {}", value.type_name()).into())
}

fn script_error(err: Box<EvalAltResult>) -> ScriptError {
    match err.as_ref() {
        EvalAltResult::ErrorTooManyOperations(..) | EvalAltResult::ErrorStackOverflow(..) => {
            ScriptError::LimitExceeded(err.to_string())
        }
        _ => ScriptError::Runtime(err.to_string()),
    }
}

/// Rhai-backed evaluator. Variables and `fn` definitions persist across
/// submissions until [`ScriptEvaluator::reset`].
pub struct RhaiEvaluator {
    engine: Engine,
    scope: Scope<'static>,
    /// Functions defined by earlier submissions.
    library: AST,
    shared: SharedState,
}

impl RhaiEvaluator {
    pub fn new(robot: SharedRobot, config: &ConsoleConfig) -> Self {
        let shared = SharedState::default();
        let mut engine = Engine::new();

        // No file imports and no dynamic eval.
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.set_max_call_levels(config.max_call_levels);
        if config.max_operations > 0 {
            engine.set_max_operations(config.max_operations);
        }

        let printer = shared.clone();
        engine.on_print(move |text| printer.borrow_mut().printed.push(text.to_string()));
        let debugger = shared.clone();
        engine.on_debug(move |text, _source, _pos| {
            debugger.borrow_mut().printed.push(format!("[debug] {text}"));
        });

        // `robot` resolves everywhere, including inside user functions.
        let handle = ScriptRobot {
            robot,
            shared: shared.clone(),
        };
        #[allow(deprecated)]
        engine.on_var(move |name, _index, _context| {
            Ok((name == "robot").then(|| Dynamic::from(handle.clone())))
        });

        register_robot_api(&mut engine);
        register_utilities(&mut engine, &shared);

        Self {
            engine,
            scope: Scope::new(),
            library: AST::empty(),
            shared,
        }
    }

    fn run(&mut self, source: &str) -> Result<Option<String>, ScriptError> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|err| ScriptError::Parse(err.to_string()))?;
        let program = self.library.merge(&ast);
        self.library = self.library.merge(&ast.clone_functions_only());

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &program)
            .map_err(script_error)?;
        Ok((!value.is_unit()).then(|| value.to_string()))
    }
}

impl ScriptEvaluator for RhaiEvaluator {
    fn evaluate(&mut self, source: &str) -> Evaluation {
        let outcome = self.run(source);
        let mut shared = self.shared.borrow_mut();
        Evaluation {
            printed: std::mem::take(&mut shared.printed),
            outcome,
            requests: std::mem::take(&mut shared.requests),
        }
    }

    fn reset(&mut self) {
        self.scope = Scope::new();
        self.library = AST::empty();
    }
}

fn register_robot_api(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptRobot>("Robot");

    engine.register_fn("forward", |robot: &mut ScriptRobot| robot.forward(1.0));
    engine.register_fn(
        "forward",
        |robot: &mut ScriptRobot, units: Dynamic| -> ScriptResult<()> {
            robot.forward(number(&units, "distance")?);
            Ok(())
        },
    );
    engine.register_fn("backward", |robot: &mut ScriptRobot| robot.backward(1.0));
    engine.register_fn(
        "backward",
        |robot: &mut ScriptRobot, units: Dynamic| -> ScriptResult<()> {
            robot.backward(number(&units, "distance")?);
            Ok(())
        },
    );
    engine.register_fn("left", |robot: &mut ScriptRobot| robot.left(90.0));
    engine.register_fn(
        "left",
        |robot: &mut ScriptRobot, degrees: Dynamic| -> ScriptResult<()> {
            robot.left(number(&degrees, "angle")?);
            Ok(())
        },
    );
    engine.register_fn("right", |robot: &mut ScriptRobot| robot.right(90.0));
    engine.register_fn(
        "right",
        |robot: &mut ScriptRobot, degrees: Dynamic| -> ScriptResult<()> {
            robot.right(number(&degrees, "angle")?);
            Ok(())
        },
    );
    engine.register_fn(
        "move_to",
        |robot: &mut ScriptRobot, x: Dynamic, y: Dynamic| -> ScriptResult<()> {
            robot.move_to(number(&x, "x")?, number(&y, "y")?);
            Ok(())
        },
    );
    engine.register_fn(
        "face_direction",
        |robot: &mut ScriptRobot, direction: &str| robot.face_direction(direction),
    );

    engine.register_fn("sensor", ScriptRobot::sensor);
    engine.register_fn("front_sensor", ScriptRobot::front_sensor);
    engine.register_fn("left_sensor", ScriptRobot::left_sensor);
    engine.register_fn("right_sensor", ScriptRobot::right_sensor);
    engine.register_fn("collect", ScriptRobot::collect);
    engine.register_fn("undo", ScriptRobot::undo);
    engine.register_fn("reset", ScriptRobot::reset);
    engine.register_fn("avoid_obstacle", ScriptRobot::avoid_obstacle);
    engine.register_fn("get_position", ScriptRobot::get_position);
    engine.register_fn("status", ScriptRobot::status);
    engine.register_fn("at_target", ScriptRobot::at_target);

    engine.register_get("x", |robot: &mut ScriptRobot| {
        script_float(robot.robot.borrow().get_position().x)
    });
    engine.register_get("y", |robot: &mut ScriptRobot| {
        script_float(robot.robot.borrow().get_position().y)
    });
    engine.register_get("heading", |robot: &mut ScriptRobot| {
        script_float(robot.robot.borrow().telemetry().heading)
    });
    engine.register_get("commands_executed", |robot: &mut ScriptRobot| {
        INT::from(robot.robot.borrow().telemetry().commands_executed)
    });
    engine.register_get("sensor_calls", |robot: &mut ScriptRobot| {
        INT::from(robot.robot.borrow().telemetry().sensor_calls)
    });
    engine.register_get("items_collected", |robot: &mut ScriptRobot| {
        INT::from(robot.robot.borrow().telemetry().items_collected)
    });
}

fn register_utilities(engine: &mut Engine, shared: &SharedState) {
    engine.register_fn("time", || {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default()
    });
    engine.register_fn("radians", |degrees: FLOAT| degrees.to_radians());
    engine.register_fn("radians", |degrees: INT| (degrees as FLOAT).to_radians());
    engine.register_fn("degrees", |radians: FLOAT| radians.to_degrees());
    engine.register_fn("degrees", |radians: INT| (radians as FLOAT).to_degrees());

    let state = shared.clone();
    engine.register_fn("help", move || {
        let mut state = state.borrow_mut();
        state.printed.extend(HELP.iter().map(|line| line.to_string()));
    });
    let state = shared.clone();
    engine.register_fn("clear", move || {
        state.borrow_mut().requests.push(ConsoleRequest::Clear);
    });

    let state = shared.clone();
    engine.register_fn("start_level", move |id: INT| -> ScriptResult<()> {
        let id = u32::try_from(id).map_err(|_| format!("invalid level number {id}"))?;
        state
            .borrow_mut()
            .requests
            .push(ConsoleRequest::Session(SessionRequest::StartLevel(id)));
        Ok(())
    });
    for (name, request) in [
        ("restart_level", SessionRequest::RestartLevel),
        ("check_objectives", SessionRequest::CheckObjectives),
        ("levels", SessionRequest::ShowLevels),
        ("progress", SessionRequest::ShowProgress),
        ("menu", SessionRequest::ReturnToLevelSelect),
    ] {
        let state = shared.clone();
        engine.register_fn(name, move || {
            state
                .borrow_mut()
                .requests
                .push(ConsoleRequest::Session(request));
        });
    }
}
