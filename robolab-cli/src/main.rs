use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use robolab::{LevelPack, ManualClock, ProgressionMode, SimConfig, SimulationSession};
use tracing::{debug, info};

/// Fixed simulation step used by every subcommand.
const TICK: f32 = 1.0 / 60.0;
const REPL_SETTLE_SECONDS: f32 = 600.0;

#[derive(Debug, Parser)]
#[command(author, version, about = "Drive a simulated robot with scripts")]
struct Cli {
    /// Simulation settings (TOML). Falls back to `ROBOLAB_CONFIG`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Level pack (TOML). Falls back to `ROBOLAB_LEVELS`, then the built-in pack.
    #[arg(long, global = true)]
    levels: Option<PathBuf>,

    /// Unlock every level regardless of progress.
    #[arg(long, global = true)]
    free: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the levels in the pack.
    Levels,
    /// Run a script file against a level and report whether it was completed.
    Run {
        #[arg(long, default_value_t = 1)]
        level: u32,
        script: PathBuf,
        /// Upper bound on simulated time spent waiting for the robot.
        #[arg(long, default_value_t = 120.0)]
        max_seconds: f32,
    },
    /// Interactive console, one submission per line.
    Repl {
        #[arg(long, default_value_t = 1)]
        level: u32,
    },
}

fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robolab=info,robolab_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut session = build_session(&cli)?;

    match cli.command {
        Commands::Levels => {
            for level in session.levels().levels() {
                let lock = if session.levels().is_unlocked(level.id) {
                    ""
                } else {
                    " (locked)"
                };
                println!(
                    "{:>2}  {:<20} difficulty {}{lock}",
                    level.id, level.name, level.difficulty
                );
                println!("    {}", level.description);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            level,
            script,
            max_seconds,
        } => {
            let source = std::fs::read_to_string(&script)
                .wrap_err_with(|| format!("failed to read {}", script.display()))?;
            // Nobody is typing, so the attempt lasts as long as the animation.
            let clock = ManualClock::new();
            session = session.with_clock(clock.clone());
            session.start_level(level)?;
            session.execute(&source);
            let simulated = run_until_settled(&mut session, max_seconds, Some(&clock));
            session.check_objectives();
            flush_console(&mut session);
            info!(level, simulated, "script finished");

            println!("{}", session.telemetry().status_line());
            if session.last_completion().is_some() {
                Ok(ExitCode::SUCCESS)
            } else {
                if session.is_robot_animating() {
                    println!("Robot was still moving after {max_seconds} seconds");
                }
                println!("Level {level} not completed");
                Ok(ExitCode::from(2))
            }
        }
        Commands::Repl { level } => {
            session.start_level(level)?;
            repl(&mut session)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_session(cli: &Cli) -> color_eyre::Result<SimulationSession> {
    let mut config = match setting_path(cli.config.as_deref(), "ROBOLAB_CONFIG") {
        Some(path) => SimConfig::load(&path)?,
        None => SimConfig::default(),
    };
    if cli.free {
        config.progression.mode = ProgressionMode::Free;
    }

    let pack = match setting_path(cli.levels.as_deref(), "ROBOLAB_LEVELS") {
        Some(path) => LevelPack::load(&path)?,
        None => LevelPack::builtin()?,
    };
    if pack.levels.is_empty() {
        return Err(eyre!("the level pack has no levels"));
    }
    debug!(levels = pack.levels.len(), mode = ?config.progression.mode, "session ready");
    Ok(SimulationSession::new(config, pack))
}

fn setting_path(flag: Option<&Path>, var: &str) -> Option<PathBuf> {
    flag.map(Path::to_path_buf).or_else(|| {
        std::env::var(var)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    })
}

/// Ticks until the robot is at rest or `max_seconds` of simulated time pass.
/// Returns the simulated time spent. A manual `clock` is moved in step.
fn run_until_settled(
    session: &mut SimulationSession,
    max_seconds: f32,
    clock: Option<&ManualClock>,
) -> f32 {
    let mut elapsed = 0.0;
    while session.is_robot_animating() && elapsed < max_seconds {
        if let Some(clock) = clock {
            clock.advance(f64::from(TICK));
        }
        session.tick(TICK);
        elapsed += TICK;
    }
    elapsed
}

/// Prints and drains the console buffer; the terminal is the scrollback here.
fn flush_console(session: &mut SimulationSession) {
    for line in session.console().output() {
        println!("{line}");
    }
    session.console_mut().clear();
}

fn repl(session: &mut SimulationSession) -> color_eyre::Result<()> {
    flush_console(session);
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        print!(">>> ");
        std::io::stdout().flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            source => {
                session.execute(source);
                run_until_settled(session, REPL_SETTLE_SECONDS, None);
                flush_console(session);
            }
        }
    }
    Ok(())
}
