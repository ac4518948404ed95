//! Educational robot-programming sandbox.
//!
//! Students drive a simulated robot across a grid world by typing short
//! scripts into a console. The crate covers everything below the renderer:
//! robot kinematics and animation, ray-marched distance sensors, levels with
//! objectives, scoring and unlocking, and the scripted command console.

pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod geometry;
pub mod level;
pub mod level_format;
pub mod level_manager;
pub mod objective;
pub mod robot;
pub mod sensor;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ProgressionMode, SimConfig};
pub use console::{Console, ExecutionResult, RhaiEvaluator, ScriptEvaluator, SessionRequest};
pub use error::{LoadError, RobotError, ScriptError, SessionError};
pub use level::Level;
pub use level_format::LevelPack;
pub use level_manager::LevelManager;
pub use objective::{Objective, ObjectiveKind};
pub use robot::{Robot, RobotCommands, Telemetry};
pub use session::{GameState, LevelCompletion, SimulationSession};
