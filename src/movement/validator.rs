//! Stateful movement packet validation.
//!
//! The validator compares the last server-accepted [`MovementInfo`] with the
//! one a client just claimed and decides whether the transition is possible
//! for a legitimate client. It never mutates either snapshot; the packet
//! handler owns the decision of what to do with a `false`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::movement::flags::{MoveFlags, MovementInfo};
use crate::movement::opcodes::{self, OpCode};
use crate::movement::permissions::check_flag_transition;

/// Downward acceleration in units per second squared.
pub const GRAVITY: f32 = 19.75;
/// Highest fall speed the client simulates.
pub const TERMINAL_VELOCITY: f32 = 60.148_003;
/// Vertical velocity of a standing jump (negative is upwards).
pub const JUMP_VELOCITY: f32 = -7.955_547;
pub const JUMP_VELOCITY_EPSILON: f32 = 0.01;
/// Horizontal speed a unit may gain by pressing a direction while airborne.
pub const MAX_AIRBORNE_XY_SPEED_GAIN: f32 = 2.5;
/// Additive distance tolerance for the speed check.
pub const SPEED_DISTANCE_TOLERANCE: f32 = 0.138;
pub const FLOAT_EPSILON: f32 = 0.001;
/// Extra descent in units accepted on top of the kinematic bound.
pub const FALL_DISTANCE_TOLERANCE: f32 = 0.5;

/// Timing tolerances used by [`validate_movement_info_with`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    /// Longest client-time gap between two packets of a moving unit.
    pub latency_tolerance_ms: u32,
    /// A fall reset is refused once the fall lasted longer than this.
    pub fall_reset_max_ms: u32,
    /// Fall time after which a drop below the jump origin must be flagged as far.
    pub far_fall_threshold_ms: u32,
    /// Longest fall time a packet may report when the fall just started.
    pub fresh_fall_max_ms: u32,
    pub fall_time_tolerance_ms: u32,
    pub transport_time_tolerance_ms: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            latency_tolerance_ms: 500,
            fall_reset_max_ms: 500,
            far_fall_threshold_ms: 500,
            fresh_fall_max_ms: 500,
            fall_time_tolerance_ms: 2,
            transport_time_tolerance_ms: 50,
        }
    }
}

impl ValidationLimits {
    /// Clients send a heartbeat every 500ms while moving, so the default
    /// leaves no slack beyond the heartbeat cadence itself.
    pub fn max_moving_packet_gap_ms(&self) -> u32 {
        self.latency_tolerance_ms
    }
}

/// Distance fallen after `fall_time_ms` of airtime, negative while still
/// rising. Velocity grows with gravity until it reaches terminal velocity.
pub fn fall_distance(jump_velocity: f32, fall_time_ms: u32) -> f32 {
    let t = fall_time_ms as f32 / 1000.0;
    let to_terminal = ((TERMINAL_VELOCITY - jump_velocity) / GRAVITY).max(0.0);
    if t <= to_terminal {
        jump_velocity * t + 0.5 * GRAVITY * t * t
    } else {
        jump_velocity * to_terminal
            + 0.5 * GRAVITY * to_terminal * to_terminal
            + TERMINAL_VELOCITY * (t - to_terminal)
    }
}

/// Height gained by a jump started with `jump_velocity`.
pub fn jump_height(jump_velocity: f32) -> f32 {
    let v = jump_velocity.min(0.0);
    v * v / (2.0 * GRAVITY)
}

pub fn validate_movement_info(
    opcode: OpCode,
    client: &MovementInfo,
    server: &MovementInfo,
    allowed_move_speed: f32,
) -> bool {
    validate_movement_info_with(
        &ValidationLimits::default(),
        opcode,
        client,
        server,
        allowed_move_speed,
    )
}

pub fn validate_movement_info_with(
    limits: &ValidationLimits,
    opcode: OpCode,
    client: &MovementInfo,
    server: &MovementInfo,
    allowed_move_speed: f32,
) -> bool {
    let op = opcodes::name(opcode);
    let client_flags = client.move_flags;
    let server_flags = server.move_flags;

    if let Err(violation) = check_flag_transition(opcode, server_flags, client_flags) {
        warn!(target: "movement", opcode = op, ?violation, ?server_flags, ?client_flags, "movement flag permission violated");
        return false;
    }

    if client.time < server.time {
        warn!(target: "movement", opcode = op, client_time = client.time, server_time = server.time, "movement time went backwards");
        return false;
    }
    let elapsed_ms = client.time - server.time;

    if server_flags.is_moving()
        && opcode != opcodes::CMSG_MOVE_SPLINE_DONE
        && elapsed_ms > limits.max_moving_packet_gap_ms()
    {
        warn!(target: "movement", opcode = op, elapsed_ms, limit = limits.max_moving_packet_gap_ms(), "moving unit skipped too much time between packets");
        return false;
    }

    let was_falling = server_flags.is_falling();
    let is_falling = client_flags.is_falling();

    if opcode == opcodes::CMSG_MOVE_FALL_RESET {
        if !was_falling {
            warn!(target: "movement", opcode = op, "fall reset while not falling");
            return false;
        }
        if client.fall_time != 0 || client.jump_velocity != 0.0 {
            warn!(target: "movement", opcode = op, fall_time = client.fall_time, jump_velocity = client.jump_velocity, "fall reset must carry zero fall time and velocity");
            return false;
        }
        if server.fall_time > limits.fall_reset_max_ms {
            warn!(target: "movement", opcode = op, server_fall_time = server.fall_time, "fall reset used on a deep fall");
            return false;
        }
    }
    if opcode == opcodes::MSG_MOVE_JUMP {
        if was_falling {
            warn!(target: "movement", opcode = op, "jump while already falling");
            return false;
        }
        if client.fall_time != 0 {
            warn!(target: "movement", opcode = op, fall_time = client.fall_time, "jump with non-zero fall time");
            return false;
        }
    }
    if (opcode == opcodes::CMSG_MOVE_FALL_RESET || opcode == opcodes::MSG_MOVE_JUMP) && !is_falling {
        warn!(target: "movement", opcode = op, "jump or fall reset without falling flag");
        return false;
    }

    if server_flags.contains(MoveFlags::PENDING_ROOT)
        && !client_flags.contains(MoveFlags::PENDING_ROOT)
        && !client_flags.contains(MoveFlags::ROOT)
        && opcode != opcodes::CMSG_FORCE_MOVE_UNROOT_ACK
    {
        warn!(target: "movement", opcode = op, "pending root dropped without becoming rooted");
        return false;
    }
    if !server_flags.contains(MoveFlags::ROOT)
        && client_flags.contains(MoveFlags::ROOT)
        && !matches!(
            opcode,
            opcodes::CMSG_FORCE_MOVE_ROOT_ACK
                | opcodes::MSG_MOVE_FALL_LAND
                | opcodes::CMSG_MOVE_SET_FLY
                | opcodes::MSG_MOVE_START_SWIM
        )
    {
        warn!(target: "movement", opcode = op, "root applied by an opcode that cannot root");
        return false;
    }

    if opcode == opcodes::CMSG_MOVE_SET_FLY && !server_flags.contains(MoveFlags::CAN_FLY) {
        warn!(target: "movement", opcode = op, "set fly without fly capability");
        return false;
    }

    if was_falling && is_falling {
        if elapsed_ms > 0 && opcode != opcodes::CMSG_MOVE_FALL_RESET {
            // A ceiling may stop the rise, so only the descent is bounded.
            let from = server.fall_time.min(client.fall_time);
            let max_drop = (fall_distance(server.jump_velocity, client.fall_time)
                - fall_distance(server.jump_velocity, from))
            .max(0.0);
            let drop = server.position.z - client.position.z;
            if drop > max_drop + FALL_DISTANCE_TOLERANCE {
                warn!(target: "movement", opcode = op, drop, max_drop, "falling faster than gravity allows");
                return false;
            }
        }
        if server_flags.contains(MoveFlags::FALLING_FAR)
            && !client_flags.contains(MoveFlags::FALLING_FAR)
            && opcode != opcodes::CMSG_MOVE_FALL_RESET
        {
            warn!(target: "movement", opcode = op, "far fall flag removed without landing");
            return false;
        }
        if server_flags.contains(MoveFlags::FALLING_FAR)
            && client_flags.contains(MoveFlags::FALLING_FAR)
            && elapsed_ms > 0
            && client.position.z >= server.position.z
        {
            warn!(target: "movement", opcode = op, client_z = client.position.z, server_z = server.position.z, "far fall without descending");
            return false;
        }
    }

    if is_falling
        && !client_flags.contains(MoveFlags::FALLING_FAR)
        && client.fall_time >= limits.far_fall_threshold_ms
        && client.jump_start_z - client.position.z > jump_height(client.jump_velocity)
    {
        warn!(target: "movement", opcode = op, fall_time = client.fall_time, drop = client.jump_start_z - client.position.z, "deep fall not flagged as far fall");
        return false;
    }

    if was_falling && opcode != opcodes::CMSG_MOVE_FALL_RESET && opcode != opcodes::CMSG_MOVE_KNOCK_BACK_ACK {
        if !is_falling
            && !matches!(
                opcode,
                opcodes::MSG_MOVE_FALL_LAND | opcodes::CMSG_MOVE_SET_FLY | opcodes::MSG_MOVE_START_SWIM
            )
        {
            warn!(target: "movement", opcode = op, "left falling state without landing");
            return false;
        }
        let expected = u64::from(server.fall_time) + u64::from(elapsed_ms);
        let reported = u64::from(client.fall_time);
        if reported.abs_diff(expected) > u64::from(limits.fall_time_tolerance_ms) {
            warn!(target: "movement", opcode = op, reported, expected, "fall time does not accumulate with elapsed time");
            return false;
        }
    }

    if is_falling {
        if client.jump_xy_speed < 0.0 {
            warn!(target: "movement", opcode = op, jump_xy_speed = client.jump_xy_speed, "negative horizontal jump speed");
            return false;
        }
        if client.jump_velocity > 0.0 {
            warn!(target: "movement", opcode = op, jump_velocity = client.jump_velocity, "downward jump velocity");
            return false;
        }
        if opcode != opcodes::CMSG_MOVE_KNOCK_BACK_ACK
            && client.jump_velocity < JUMP_VELOCITY - JUMP_VELOCITY_EPSILON
        {
            warn!(target: "movement", opcode = op, jump_velocity = client.jump_velocity, "jump velocity above a standing jump");
            return false;
        }
        let refreshed =
            opcode == opcodes::CMSG_MOVE_FALL_RESET || opcode == opcodes::CMSG_MOVE_KNOCK_BACK_ACK;
        if was_falling && !refreshed {
            if server.jump_xy_speed.abs() <= FLOAT_EPSILON {
                if client.jump_xy_speed > MAX_AIRBORNE_XY_SPEED_GAIN + FLOAT_EPSILON {
                    warn!(target: "movement", opcode = op, jump_xy_speed = client.jump_xy_speed, "airborne speed gain too large");
                    return false;
                }
            } else if (client.jump_xy_speed - server.jump_xy_speed).abs() > FLOAT_EPSILON {
                warn!(target: "movement", opcode = op, client_speed = client.jump_xy_speed, server_speed = server.jump_xy_speed, "horizontal jump speed changed mid-air");
                return false;
            }
            if (client.jump_velocity - server.jump_velocity).abs() > FLOAT_EPSILON {
                warn!(target: "movement", opcode = op, client_velocity = client.jump_velocity, server_velocity = server.jump_velocity, "jump velocity changed mid-air");
                return false;
            }
        } else if !was_falling {
            if client.fall_time > elapsed_ms || client.fall_time > limits.fresh_fall_max_ms {
                warn!(target: "movement", opcode = op, fall_time = client.fall_time, elapsed_ms, "fresh fall reports too much airtime");
                return false;
            }
            if client.jump_xy_speed > allowed_move_speed + FLOAT_EPSILON {
                warn!(target: "movement", opcode = op, jump_xy_speed = client.jump_xy_speed, allowed_move_speed, "jumped faster than the unit may move");
                return false;
            }
        }
    }

    if server_flags.contains(MoveFlags::ON_TRANSPORT)
        && client_flags.contains(MoveFlags::ON_TRANSPORT)
        && opcode != opcodes::CMSG_MOVE_CHNG_TRANSPORT
    {
        if client.transport_guid != server.transport_guid {
            warn!(target: "movement", opcode = op, client_transport = client.transport_guid, server_transport = server.transport_guid, "transport changed without transport opcode");
            return false;
        }
        let transport_elapsed = i64::from(client.transport_time) - i64::from(server.transport_time);
        let drift = (transport_elapsed - i64::from(elapsed_ms)).unsigned_abs();
        if drift > u64::from(limits.transport_time_tolerance_ms) {
            warn!(target: "movement", opcode = op, transport_elapsed, elapsed_ms, "transport time drifted from movement time");
            return false;
        }
    }

    if opcode == opcodes::CMSG_FORCE_MOVE_ROOT_ACK {
        let required = if is_falling {
            MoveFlags::PENDING_ROOT
        } else {
            MoveFlags::ROOT
        };
        if !client_flags.contains(required) {
            warn!(target: "movement", opcode = op, ?required, ?client_flags, "root ack without root state");
            return false;
        }
    }

    true
}

/// Horizontal distance check: the unit may not travel farther than
/// `expected_speed` allows in the elapsed client time.
pub fn validate_movement_speed(expected_speed: f32, client: &MovementInfo, server: &MovementInfo) -> bool {
    let elapsed_s = client.time.saturating_sub(server.time) as f32 / 1000.0;
    let max_distance = expected_speed.max(0.0) * elapsed_s + SPEED_DISTANCE_TOLERANCE;
    let travelled_sq = server.location().distance_2d_sq(client.location());
    if travelled_sq > max_distance * max_distance {
        warn!(
            target: "movement",
            travelled = travelled_sq.sqrt(),
            max_distance,
            expected_speed,
            "moved farther than speed allows"
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::position::Position;

    fn at_rest(time: u32) -> MovementInfo {
        MovementInfo::at(Position::new(0.0, 0.0, 100.0, 0.0), time)
    }

    fn falling(time: u32, z: f32, fall_time: u32) -> MovementInfo {
        let mut info = MovementInfo::at(Position::new(0.0, 0.0, z, 0.0), time);
        info.move_flags = MoveFlags::FALLING;
        info.fall_time = fall_time;
        info.jump_start_z = 120.0;
        info
    }

    fn jump_packet(time: u32) -> MovementInfo {
        let mut info = at_rest(time);
        info.move_flags = MoveFlags::FALLING;
        info.jump_velocity = -7.96;
        info.jump_start_z = 100.0;
        info
    }

    #[test]
    fn jump_from_rest_is_accepted() {
        let server = at_rest(1_000);
        let client = jump_packet(1_100);
        assert!(validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
    }

    #[test]
    fn jump_while_falling_is_rejected() {
        let mut server = at_rest(1_000);
        server.move_flags = MoveFlags::FALLING;
        let client = jump_packet(1_100);
        assert!(!validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
    }

    #[test]
    fn jump_must_set_falling() {
        let server = at_rest(1_000);
        let client = at_rest(1_100);
        assert!(!validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
    }

    #[test]
    fn time_must_not_go_backwards() {
        for (server_time, client_time) in [(1_000, 999), (5, 0), (u32::MAX, 1)] {
            let server = at_rest(server_time);
            let client = at_rest(client_time);
            for opcode in [opcodes::NONE, opcodes::MSG_MOVE_HEARTBEAT, opcodes::MSG_MOVE_SET_FACING] {
                assert!(!validate_movement_info(opcode, &client, &server, 7.0));
            }
        }
    }

    #[test]
    fn moving_unit_may_not_skip_time() {
        let mut server = at_rest(1_000);
        server.move_flags = MoveFlags::FORWARD;
        let mut client = server;
        client.time = 1_500;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.time = 1_501;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.time = 1_900;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.move_flags = MoveFlags::empty();
        assert!(validate_movement_info(opcodes::CMSG_MOVE_SPLINE_DONE, &client, &server, 7.0));

        let relaxed = ValidationLimits {
            latency_tolerance_ms: 1_000,
            ..ValidationLimits::default()
        };
        client.move_flags = MoveFlags::FORWARD;
        assert!(validate_movement_info_with(&relaxed, opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn fall_speed_is_bounded_by_gravity() {
        let server = {
            let mut info = falling(10_000, 100.0, 1_000);
            info.move_flags |= MoveFlags::FALLING_FAR;
            info
        };
        let mut client = server;
        client.time = 11_000;
        client.fall_time = 2_000;
        // The second second of free fall covers 29.625 u.
        client.position.z = 100.0 - 29.0;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.position.z = 100.0 - 30.5;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.position.z = 100.0 - 39.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn rising_jump_may_be_stopped_by_a_ceiling() {
        let mut server = falling(10_000, 100.0, 0);
        server.jump_velocity = JUMP_VELOCITY;
        server.jump_start_z = 100.0;
        let mut client = server;
        client.time = 10_100;
        client.fall_time = 100;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.position.z = 100.0 - 0.6;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn fall_distance_follows_capped_velocity() {
        assert!((fall_distance(0.0, 1_000) - 9.875).abs() < 1e-3);
        assert!((fall_distance(0.0, 2_000) - fall_distance(0.0, 1_000) - 29.625).abs() < 1e-3);
        assert!(fall_distance(JUMP_VELOCITY, 100) < 0.0);
        let terminal_second = fall_distance(0.0, 11_000) - fall_distance(0.0, 10_000);
        assert!((terminal_second - TERMINAL_VELOCITY).abs() < 1e-2);
    }

    #[test]
    fn fall_time_must_accumulate() {
        let server = falling(10_000, 119.0, 200);
        let mut client = server;
        client.time = 10_100;
        client.fall_time = 300;
        client.position.z = 118.5;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.fall_time = 250;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn landing_requires_land_opcode() {
        let server = falling(10_000, 119.0, 200);
        let mut client = server;
        client.time = 10_100;
        client.fall_time = 300;
        client.move_flags = MoveFlags::empty();
        assert!(validate_movement_info(opcodes::MSG_MOVE_FALL_LAND, &client, &server, 7.0));
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn fall_reset_rules() {
        let server = falling(10_000, 119.0, 300);
        let mut client = server;
        client.time = 10_050;
        client.fall_time = 0;
        client.jump_velocity = 0.0;
        assert!(validate_movement_info(opcodes::CMSG_MOVE_FALL_RESET, &client, &server, 7.0));

        client.fall_time = 20;
        assert!(!validate_movement_info(opcodes::CMSG_MOVE_FALL_RESET, &client, &server, 7.0));

        let deep = falling(10_000, 119.0, 900);
        let mut reset = deep;
        reset.time = 10_050;
        reset.fall_time = 0;
        assert!(!validate_movement_info(opcodes::CMSG_MOVE_FALL_RESET, &reset, &deep, 7.0));

        let grounded = at_rest(10_000);
        let mut reset = falling(10_050, 100.0, 0);
        reset.jump_start_z = 100.0;
        assert!(!validate_movement_info(opcodes::CMSG_MOVE_FALL_RESET, &reset, &grounded, 7.0));
    }

    #[test]
    fn deep_fall_must_be_flagged_far() {
        let server = falling(10_000, 110.0, 500);
        let mut client = server;
        client.time = 10_100;
        client.fall_time = 600;
        client.position.z = 109.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.move_flags |= MoveFlags::FALLING_FAR;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn far_fall_must_descend_and_cannot_be_dropped() {
        let mut server = falling(10_000, 100.0, 1_000);
        server.move_flags |= MoveFlags::FALLING_FAR;
        let mut client = server;
        client.time = 10_100;
        client.fall_time = 1_100;
        client.position.z = 100.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.position.z = 98.5;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.move_flags.remove(MoveFlags::FALLING_FAR);
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn airborne_speed_rules() {
        let mut server = falling(10_000, 119.0, 100);
        server.jump_xy_speed = 0.0;
        let mut client = server;
        client.time = 10_100;
        client.fall_time = 200;
        client.position.z = 118.9;
        client.jump_xy_speed = 2.5;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.jump_xy_speed = 3.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));

        server.jump_xy_speed = 7.0;
        client.jump_xy_speed = 7.0;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        client.jump_xy_speed = 7.5;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));

        client.jump_xy_speed = 7.0;
        client.jump_velocity = -3.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
    }

    #[test]
    fn fresh_fall_parameters() {
        let server = at_rest(1_000);
        let mut client = jump_packet(1_100);
        client.jump_xy_speed = 7.0;
        assert!(validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
        client.jump_xy_speed = 9.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
        client.jump_xy_speed = -1.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
        client.jump_xy_speed = 0.0;
        client.jump_velocity = -9.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));
        client.jump_velocity = 1.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_JUMP, &client, &server, 7.0));

        // Walking off a ledge: more airtime than elapsed time is impossible.
        let mut ledge = falling(1_100, 100.0, 150);
        ledge.jump_start_z = 100.0;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &ledge, &at_rest(1_000), 7.0));
        ledge.fall_time = 90;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &ledge, &at_rest(1_000), 7.0));
    }

    #[test]
    fn root_transitions() {
        let server = at_rest(1_000);
        let mut client = at_rest(1_050);
        client.move_flags = MoveFlags::ROOT;
        assert!(validate_movement_info(opcodes::CMSG_FORCE_MOVE_ROOT_ACK, &client, &server, 7.0));
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));

        client.move_flags = MoveFlags::empty();
        assert!(!validate_movement_info(opcodes::CMSG_FORCE_MOVE_ROOT_ACK, &client, &server, 7.0));

        let mut airborne = falling(1_000, 100.0, 100);
        airborne.jump_start_z = 100.0;
        let mut ack = airborne;
        ack.time = 1_050;
        ack.fall_time = 150;
        ack.move_flags |= MoveFlags::PENDING_ROOT;
        assert!(validate_movement_info(opcodes::CMSG_FORCE_MOVE_ROOT_ACK, &ack, &airborne, 7.0));

        let mut pending = airborne;
        pending.move_flags |= MoveFlags::PENDING_ROOT;
        let mut dropped = ack;
        dropped.move_flags.remove(MoveFlags::PENDING_ROOT);
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &dropped, &pending, 7.0));
        assert!(validate_movement_info(opcodes::CMSG_FORCE_MOVE_UNROOT_ACK, &dropped, &pending, 7.0));
    }

    #[test]
    fn set_fly_requires_capability() {
        let server = at_rest(1_000);
        let mut client = at_rest(1_050);
        client.move_flags = MoveFlags::FLYING | MoveFlags::CAN_FLY;
        assert!(!validate_movement_info(opcodes::CMSG_MOVE_SET_FLY, &client, &server, 7.0));
        let mut capable = server;
        capable.move_flags = MoveFlags::CAN_FLY;
        assert!(validate_movement_info(opcodes::CMSG_MOVE_SET_FLY, &client, &capable, 7.0));
    }

    #[test]
    fn transport_binding() {
        let mut server = at_rest(1_000);
        server.move_flags = MoveFlags::ON_TRANSPORT;
        server.transport_guid = 0xF120_0000_0000_0001;
        server.transport_time = 50_000;
        let mut client = server;
        client.time = 1_200;
        client.transport_time = 50_200;
        assert!(validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));

        client.transport_time = 51_000;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));

        client.transport_time = 50_200;
        client.transport_guid = 0xF120_0000_0000_0002;
        assert!(!validate_movement_info(opcodes::MSG_MOVE_HEARTBEAT, &client, &server, 7.0));
        assert!(validate_movement_info(opcodes::CMSG_MOVE_CHNG_TRANSPORT, &client, &server, 7.0));
    }

    #[test]
    fn speed_check_catches_teleport_hacks() {
        let server = at_rest(1_000);
        let mut client = at_rest(2_000);
        client.position.x = 7.0;
        assert!(validate_movement_speed(7.0, &client, &server));
        client.position.x = 7.1;
        assert!(validate_movement_speed(7.0, &client, &server));
        client.position.x = 7.2;
        assert!(!validate_movement_speed(7.0, &client, &server));
        client.position.x = 0.0;
        client.position.z = 500.0;
        assert!(validate_movement_speed(7.0, &client, &server));
    }
}
