use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use world_server::combat::spells::SpellBook;
use world_server::world::pathfinding::DirectPathfinder;
use world_server::world::runner::execute;
use world_server::world::time::GameClock;
use world_server::{InstanceSettings, WorldCommand, WorldError, WorldInstance};

fn default_tick_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
struct ReplayFile {
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
    commands: Vec<WorldCommand>,
}

fn main() -> Result<(), String> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| "usage: movement_replay <replay.yaml>".to_string())?;
    let source = std::fs::read_to_string(&path)
        .map_err(|err| format!("read {} failed: {}", path.display(), err))?;
    let replay: ReplayFile = serde_yaml::from_str(&source)
        .map_err(|err| format!("parse {} failed: {}", path.display(), err))?;

    let mut world = WorldInstance::new(
        InstanceSettings::default(),
        SpellBook::with_builtin()?,
        Box::new(DirectPathfinder::default()),
    );
    let mut clock = GameClock::new(Duration::from_millis(replay.tick_ms.max(1)));
    let mut kicked = 0usize;

    for (index, command) in replay.commands.into_iter().enumerate() {
        let label = format!("{:?}", command);
        let verdict = match execute(&mut world, command) {
            Ok(Some(unit)) => format!("spawned {:?}", unit),
            Ok(None) => "ok".to_string(),
            Err(WorldError::Kicked(reason)) => {
                kicked += 1;
                format!("kicked: {}", reason)
            }
            Err(err) => format!("failed: {}", err),
        };
        println!("[{:>3}] t={}ms {}", index + 1, world.now().millis(), verdict);
        println!("      {}", label);
        world.update(clock.step());
    }

    for (unit, reason) in world.take_kicks() {
        println!("kick {:?}: {}", unit, reason);
    }
    println!(
        "replay: units={}, messages={}, kicked={}",
        world.unit_count(),
        world.take_messages().len(),
        kicked
    );
    Ok(())
}
