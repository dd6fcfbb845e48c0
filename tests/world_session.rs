use world_server::combat::spells::{builtin, SpellBook};
use world_server::entities::unit::UnitId;
use world_server::movement::flags::{MoveFlags, MovementInfo, MovementType};
use world_server::movement::opcodes;
use world_server::movement::pending::MovementChange;
use world_server::world::grid::GridSettings;
use world_server::world::messages::{Outgoing, ServerMessage};
use world_server::world::movement_handler::MovementAck;
use world_server::world::pathfinding::{CachedPathfinder, DirectPathfinder};
use world_server::world::position::{Position, Vector3};
use world_server::world::time::GameTick;
use world_server::{InstanceSettings, KickReason, WorldError, WorldInstance};

fn world() -> WorldInstance {
    let settings = InstanceSettings {
        grid: GridSettings {
            tile_size: 10.0,
            map_size: 200.0,
            sight_radius: 1,
        },
        ..InstanceSettings::default()
    };
    WorldInstance::new(
        settings,
        SpellBook::with_builtin().expect("spells"),
        Box::new(CachedPathfinder::new(DirectPathfinder::default(), 16)),
    )
}

fn at(x: f32) -> Position {
    Position::new(x, -95.0, 0.0, 0.0)
}

fn still(time: u32, x: f32) -> MovementInfo {
    MovementInfo::at(at(x), time)
}

fn speed_ack(unit: UnitId, counter: u32, speed: f32) -> MovementAck {
    MovementAck {
        mover_guid: unit.guid(),
        counter,
        info: still(100, -95.0),
        speed: Some(speed),
    }
}

fn spawned_for(messages: &[Outgoing], recipient: UnitId) -> Vec<UnitId> {
    messages
        .iter()
        .filter(|out| out.recipient == recipient)
        .filter_map(|out| match &out.message {
            ServerMessage::SpawnObjects(objects) => Some(objects.iter().map(|o| o.id).collect::<Vec<_>>()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[test]
fn acks_must_follow_send_order() {
    let mut world = world();
    let player = world.spawn_character("Acker", at(-95.0), 10).expect("player");
    let changes = [
        MovementChange::Speed {
            movement_type: MovementType::Run,
            speed: 8.0,
        },
        MovementChange::Speed {
            movement_type: MovementType::Walk,
            speed: 3.0,
        },
        MovementChange::Speed {
            movement_type: MovementType::Swim,
            speed: 5.0,
        },
    ];
    let counters: Vec<Option<u32>> = changes
        .into_iter()
        .map(|change| world.push_movement_change(player, change).expect("push"))
        .collect();
    assert_eq!(counters, vec![Some(1), Some(2), Some(3)]);

    world
        .handle_ack_packet(player, opcodes::CMSG_FORCE_RUN_SPEED_CHANGE_ACK, speed_ack(player, 1, 8.0))
        .expect("first ack");
    assert_eq!(world.unit(player).expect("unit").speed(MovementType::Run), 8.0);

    let result = world.handle_ack_packet(
        player,
        opcodes::CMSG_FORCE_SWIM_SPEED_CHANGE_ACK,
        speed_ack(player, 3, 5.0),
    );
    assert_eq!(
        result,
        Err(WorldError::Kicked(KickReason::AckCounterMismatch {
            expected: 2,
            received: 3
        }))
    );
    assert!(world.unit(player).is_none());
    assert_eq!(
        world.take_kicks(),
        vec![(
            player,
            KickReason::AckCounterMismatch {
                expected: 2,
                received: 3
            }
        )]
    );
}

#[test]
fn unroot_ack_does_not_answer_a_root() {
    let mut world = world();
    let player = world.spawn_character("Rooted", at(-95.0), 10).expect("player");
    world
        .push_movement_change(player, MovementChange::Root { apply: true })
        .expect("root");
    let ack = MovementAck {
        mover_guid: player.guid(),
        counter: 1,
        info: MovementInfo {
            move_flags: MoveFlags::ROOT,
            ..still(100, -95.0)
        },
        speed: None,
    };
    assert_eq!(
        world.handle_ack_packet(player, opcodes::CMSG_FORCE_MOVE_UNROOT_ACK, ack),
        Err(WorldError::Kicked(KickReason::AckTypeMismatch {
            opcode: opcodes::CMSG_FORCE_MOVE_UNROOT_ACK
        }))
    );
}

#[test]
fn walking_into_sight_introduces_both_sides() {
    let mut world = world();
    let walker = world.spawn_character("Walker", at(-95.0), 10).expect("walker");
    let watcher = world.spawn_character("Watcher", at(-65.0), 10).expect("watcher");
    let messages = world.take_messages();
    assert!(spawned_for(&messages, walker).is_empty());
    assert!(spawned_for(&messages, watcher).is_empty());

    let steps = [
        (opcodes::MSG_MOVE_START_FORWARD, 100, -95.0),
        (opcodes::MSG_MOVE_HEARTBEAT, 600, -91.5),
        (opcodes::MSG_MOVE_HEARTBEAT, 1_100, -88.0),
        (opcodes::MSG_MOVE_HEARTBEAT, 1_600, -84.5),
        (opcodes::MSG_MOVE_HEARTBEAT, 2_100, -81.0),
    ];
    for (opcode, time, x) in steps {
        let info = MovementInfo {
            move_flags: MoveFlags::FORWARD,
            ..still(time, x)
        };
        world.handle_movement_packet(walker, opcode, info).expect("step");
    }
    let messages = world.take_messages();
    assert!(spawned_for(&messages, watcher).is_empty());

    let info = MovementInfo {
        move_flags: MoveFlags::FORWARD,
        ..still(2_600, -78.0)
    };
    world
        .handle_movement_packet(walker, opcodes::MSG_MOVE_HEARTBEAT, info)
        .expect("step into sight");
    let messages = world.take_messages();
    assert_eq!(spawned_for(&messages, walker), vec![watcher]);
    assert_eq!(spawned_for(&messages, watcher), vec![walker]);
}

#[test]
fn creature_path_reaches_target_and_becomes_visible() {
    let mut world = world();
    let creature = world.spawn_creature(7, at(-95.0), 5).expect("creature");
    let watcher = world.spawn_character("Watcher", at(-65.0), 10).expect("watcher");
    world.take_messages();

    assert_eq!(world.move_to(creature, Vector3::new(-75.0, -95.0, 0.0)), Ok(true));
    let mut seen = false;
    let mut reached = Vec::new();
    for step in 1..=8u64 {
        world.update(GameTick::from_millis(step * 500));
        seen |= spawned_for(&world.take_messages(), watcher).contains(&creature);
        reached.extend(world.take_reached());
    }
    assert!(seen);
    assert_eq!(reached, vec![creature]);
    let position = world.unit(creature).expect("creature").position();
    assert!((position.x + 75.0).abs() < 1e-3);
    assert_eq!(world.pending_timers(), 0);
}

#[test]
fn periodic_damage_is_logged_to_watchers() {
    let mut world = world();
    let caster = world.spawn_character("Warlock", at(-95.0), 20).expect("caster");
    let target = world.spawn_creature(3, at(-93.0), 20).expect("target");
    world.take_messages();

    world.cast_spell(caster, target, builtin::CORRUPTION).expect("cast");
    let full = world.unit(target).expect("target").stats.health;
    let mut logged = Vec::new();
    for second in 1..=12u64 {
        world.update(GameTick::from_millis(second * 1_000));
        for out in world.take_messages() {
            if let ServerMessage::PeriodicAuraLog { amount, .. } = out.message {
                if out.recipient == caster {
                    logged.push(amount);
                }
            }
        }
    }
    assert_eq!(logged, vec![8, 8, 8, 8]);
    assert_eq!(full - world.unit(target).expect("target").stats.health, 32);
    assert!(world.unit(target).expect("target").auras.is_empty());
}
