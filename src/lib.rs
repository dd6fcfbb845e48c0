pub mod combat;
pub mod config;
pub mod entities;
pub mod movement;
pub mod telemetry;
pub mod world;

use std::io::{BufRead, Write};
use std::sync::mpsc;

use tracing::{error, info, warn};

pub use world::errors::{KickReason, WorldError};
pub use world::instance::{InstanceSettings, WorldInstance};
pub use world::runner::{run_world, RunSummary, ServerControl, WorldCommand, WorldEvent};

/// Boots one world instance and drives it from stdin: each line is a YAML
/// [`WorldCommand`], each produced [`WorldEvent`] is printed as a YAML
/// document on stdout.
pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    telemetry::logging::init(&config.world)?;
    match config.config_path.as_deref() {
        Some(path) => info!(target: "world", config = %path.display(), "configuration loaded"),
        None => info!(target: "world", "running on default configuration"),
    }

    let mut spells = combat::spells::SpellBook::with_builtin()?;
    if let Some(path) = config.world.spell_file.as_deref() {
        let added = spells.load_yaml_file(path)?;
        info!(target: "world", file = %path.display(), added, "extra spells loaded");
    }
    for problem in spells.validate() {
        warn!(target: "world", %problem, "spell entry looks wrong");
    }

    let pathfinder = world::pathfinding::CachedPathfinder::new(
        world::pathfinding::DirectPathfinder::default(),
        config.world.path_cache_capacity,
    );
    let instance = WorldInstance::new(config.world.instance_settings(), spells, Box::new(pathfinder));

    let (command_tx, command_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel::<WorldEvent>();

    // Left detached: a blocked stdin read must not hold up shutdown.
    std::thread::Builder::new()
        .name("world-input".to_string())
        .spawn(move || read_commands(command_tx))
        .map_err(|err| format!("input thread spawn failed: {}", err))?;
    let printer = std::thread::Builder::new()
        .name("world-output".to_string())
        .spawn(move || print_events(event_rx))
        .map_err(|err| format!("output thread spawn failed: {}", err))?;

    let control = ServerControl::new();
    let summary = run_world(instance, config.world.tick_interval(), command_rx, event_tx, &control);
    if printer.join().is_err() {
        error!(target: "world", "output thread panicked");
    }
    info!(
        target: "world",
        ticks = summary.ticks,
        commands = summary.commands,
        kicks = summary.kicks,
        "world stopped"
    );
    Ok(())
}

fn read_commands(commands: mpsc::Sender<WorldCommand>) {
    let stdin = std::io::stdin();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(target: "world", %err, "stdin read failed");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_yaml::from_str::<WorldCommand>(trimmed) {
            Ok(command) => {
                if commands.send(command).is_err() {
                    break;
                }
            }
            Err(err) => warn!(target: "world", line = index + 1, %err, "unreadable command"),
        }
    }
}

fn print_events(events: mpsc::Receiver<WorldEvent>) {
    let stdout = std::io::stdout();
    for event in events {
        match serde_yaml::to_string(&event) {
            Ok(text) => {
                let mut out = stdout.lock();
                if write!(out, "---\n{}", text).and_then(|_| out.flush()).is_err() {
                    break;
                }
            }
            Err(err) => warn!(target: "world", %err, "event serialization failed"),
        }
    }
}
