//! Update loop that owns one world instance.
//!
//! Decoded packets and admin requests arrive as [`WorldCommand`]s on a
//! channel; everything the instance produces leaves as [`WorldEvent`]s.
//! Commands are handled between ticks on the loop thread, so instance state
//! is never shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::combat::spells::SpellId;
use crate::entities::unit::UnitId;
use crate::movement::flags::MovementInfo;
use crate::movement::opcodes::OpCode;
use crate::movement::pending::KnockBackInfo;
use crate::world::errors::WorldError;
use crate::world::instance::WorldInstance;
use crate::world::messages::Outgoing;
use crate::world::movement_handler::MovementAck;
use crate::world::position::{Position, Vector3};
use crate::world::time::GameClock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorldCommand {
    SpawnCharacter {
        name: String,
        position: Position,
        level: u8,
    },
    SpawnCreature {
        entry: u32,
        position: Position,
        level: u8,
    },
    Despawn {
        unit: UnitId,
    },
    Movement {
        unit: UnitId,
        opcode: OpCode,
        info: MovementInfo,
    },
    Ack {
        unit: UnitId,
        opcode: OpCode,
        ack: MovementAck,
    },
    SplineDone {
        unit: UnitId,
        info: MovementInfo,
    },
    TimeSkipped {
        unit: UnitId,
        skipped_ms: i64,
    },
    CastSpell {
        caster: UnitId,
        target: UnitId,
        spell: SpellId,
    },
    ApplyAura {
        #[serde(default)]
        caster: Option<UnitId>,
        target: UnitId,
        spell: SpellId,
    },
    Teleport {
        unit: UnitId,
        map_id: u32,
        position: Position,
    },
    KnockBack {
        unit: UnitId,
        knock_back: KnockBackInfo,
    },
    MoveTo {
        unit: UnitId,
        target: Vector3,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEvent {
    Spawned { unit: UnitId },
    Message(Outgoing),
    Kicked { unit: UnitId, reason: String },
    Reached { unit: UnitId },
    CommandFailed { error: String },
}

/// Stop flag shared with whoever may end the loop from outside.
#[derive(Debug, Default)]
pub struct ServerControl {
    shutdown: AtomicBool,
}

impl ServerControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub commands: u64,
    pub kicks: u64,
}

/// Runs ticks of `tick_interval` until the command channel closes or a
/// shutdown is requested. Game time advances by one interval per tick.
pub fn run_world(
    mut instance: WorldInstance,
    tick_interval: Duration,
    commands: Receiver<WorldCommand>,
    events: Sender<WorldEvent>,
    control: &ServerControl,
) -> RunSummary {
    let mut clock = GameClock::new(tick_interval);
    let mut summary = RunSummary::default();
    info!(target: "world", tick_ms = clock.tick_length().as_millis() as u64, "world loop started");

    let mut closed = false;
    while !closed && !control.is_shutdown() {
        let deadline = Instant::now() + clock.tick_length();
        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match commands.recv_timeout(timeout) {
                Ok(WorldCommand::Shutdown) => {
                    control.request_shutdown();
                    break;
                }
                Ok(command) => {
                    summary.commands += 1;
                    dispatch(&mut instance, command, &events);
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        let fired = instance.update(clock.step());
        summary.ticks += 1;
        summary.kicks += flush(&mut instance, &events);
        if fired > 0 {
            debug!(target: "world", now = instance.now().millis(), fired, "timers fired");
        }
    }

    info!(target: "world", ticks = summary.ticks, commands = summary.commands, kicks = summary.kicks, "world loop stopped");
    summary
}

/// Applies one command to the instance. Returns the id of a spawned unit.
pub fn execute(instance: &mut WorldInstance, command: WorldCommand) -> Result<Option<UnitId>, WorldError> {
    match command {
        WorldCommand::SpawnCharacter { name, position, level } => {
            instance.spawn_character(name, position, level).map(Some)
        }
        WorldCommand::SpawnCreature { entry, position, level } => {
            instance.spawn_creature(entry, position, level).map(Some)
        }
        WorldCommand::Despawn { unit } => instance.despawn(unit).map(|_| None),
        WorldCommand::Movement { unit, opcode, info } => {
            instance.handle_movement_packet(unit, opcode, info).map(|_| None)
        }
        WorldCommand::Ack { unit, opcode, ack } => instance.handle_ack_packet(unit, opcode, ack).map(|_| None),
        WorldCommand::SplineDone { unit, info } => instance.handle_move_spline_done(unit, info).map(|_| None),
        WorldCommand::TimeSkipped { unit, skipped_ms } => {
            instance.handle_time_skipped(unit, skipped_ms).map(|_| None)
        }
        WorldCommand::CastSpell { caster, target, spell } => {
            instance.cast_spell(caster, target, spell).map(|_| None)
        }
        WorldCommand::ApplyAura { caster, target, spell } => {
            instance.apply_aura(caster, target, spell).map(|_| None)
        }
        WorldCommand::Teleport { unit, map_id, position } => {
            instance.teleport(unit, map_id, position).map(|_| None)
        }
        WorldCommand::KnockBack { unit, knock_back } => instance.knock_back(unit, knock_back).map(|_| None),
        WorldCommand::MoveTo { unit, target } => instance.move_to(unit, target).map(|_| None),
        WorldCommand::Shutdown => Ok(None),
    }
}

fn dispatch(instance: &mut WorldInstance, command: WorldCommand, events: &Sender<WorldEvent>) {
    match execute(instance, command) {
        Ok(Some(unit)) => send(events, WorldEvent::Spawned { unit }),
        Ok(None) | Err(WorldError::Kicked(_)) => {}
        Err(err) => {
            warn!(target: "world", %err, "command failed");
            send(
                events,
                WorldEvent::CommandFailed {
                    error: err.to_string(),
                },
            );
        }
    }
}

/// Forwards kicks, queued messages and finished paths. Returns the number
/// of kicks.
fn flush(instance: &mut WorldInstance, events: &Sender<WorldEvent>) -> u64 {
    let kicks = instance.take_kicks();
    let count = kicks.len() as u64;
    for (unit, reason) in kicks {
        send(
            events,
            WorldEvent::Kicked {
                unit,
                reason: reason.to_string(),
            },
        );
    }
    for message in instance.take_messages() {
        send(events, WorldEvent::Message(message));
    }
    for unit in instance.take_reached() {
        send(events, WorldEvent::Reached { unit });
    }
    count
}

fn send(events: &Sender<WorldEvent>, event: WorldEvent) {
    // Nobody listening is not an error for the loop.
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::spells::SpellBook;
    use crate::movement::flags::MoveFlags;
    use crate::movement::opcodes;
    use crate::world::instance::InstanceSettings;
    use crate::world::pathfinding::DirectPathfinder;
    use std::sync::mpsc;

    fn instance() -> WorldInstance {
        WorldInstance::new(
            InstanceSettings::default(),
            SpellBook::with_builtin().expect("spells"),
            Box::new(DirectPathfinder::default()),
        )
    }

    #[test]
    fn loop_ends_when_commands_close() {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let origin = Position::new(0.0, 0.0, 0.0, 0.0);
        command_tx
            .send(WorldCommand::SpawnCharacter {
                name: "A".to_string(),
                position: origin,
                level: 1,
            })
            .expect("send");
        command_tx
            .send(WorldCommand::Movement {
                unit: UnitId(1),
                opcode: opcodes::MSG_MOVE_START_FORWARD,
                info: MovementInfo {
                    move_flags: MoveFlags::FORWARD,
                    ..MovementInfo::at(Position::new(50.0, 0.0, 0.0, 0.0), 10)
                },
            })
            .expect("send");
        command_tx
            .send(WorldCommand::Despawn { unit: UnitId(9) })
            .expect("send");
        drop(command_tx);

        let control = ServerControl::new();
        let summary = run_world(instance(), Duration::from_millis(1), command_rx, event_tx, &control);
        assert_eq!(summary.commands, 3);
        assert_eq!(summary.kicks, 1);

        let events: Vec<WorldEvent> = event_rx.iter().collect();
        assert_eq!(events[0], WorldEvent::Spawned { unit: UnitId(1) });
        assert!(events.iter().any(|event| matches!(
            event,
            WorldEvent::CommandFailed { error } if error.contains("unknown unit")
        )));
        assert!(events
            .iter()
            .any(|event| matches!(event, WorldEvent::Kicked { unit, .. } if *unit == UnitId(1))));
    }

    #[test]
    fn shutdown_command_stops_the_loop() {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, _event_rx) = mpsc::channel();
        command_tx.send(WorldCommand::Shutdown).expect("send");
        let control = ServerControl::new();
        let summary = run_world(instance(), Duration::from_millis(1), command_rx, event_tx, &control);
        assert!(control.is_shutdown());
        assert_eq!(summary.commands, 0);
        assert_eq!(summary.ticks, 1);
        drop(command_tx);
    }

    #[test]
    fn commands_parse_from_yaml() {
        let line = "{command: cast_spell, caster: 1, target: 2, spell: 172}";
        let command: WorldCommand = serde_yaml::from_str(line).expect("command");
        assert_eq!(
            command,
            WorldCommand::CastSpell {
                caster: UnitId(1),
                target: UnitId(2),
                spell: SpellId(172),
            }
        );
    }
}
