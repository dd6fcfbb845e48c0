//! Client movement packets, acknowledgments and server-forced changes.
//!
//! Validators in [`crate::movement`] only answer yes or no. This module
//! turns a `false` into a kick: the reason is recorded, the character is
//! removed from the instance and the error is returned to the caller.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::combat::spells::AuraInterruptFlags;
use crate::entities::unit::{Unit, UnitId, UnitKind};
use crate::movement::flags::{movement_type_for, MoveFlags, MovementInfo, MovementType};
use crate::movement::opcodes::{self, OpCode};
use crate::movement::pending::{
    change_type_for_ack, validate_knock_back_ack, validate_move_flags_on_apply, validate_speed_ack,
    KnockBackInfo, MovementChange, MovementChangeType, PendingMovementChange, TeleportInfo,
};
use crate::movement::validator::{validate_movement_info_with, validate_movement_speed, FLOAT_EPSILON};
use crate::world::errors::{KickReason, WorldError};
use crate::world::instance::WorldInstance;
use crate::world::messages::ServerMessage;
use crate::world::position::{nearly_equal, Position};

const TELEPORT_POSITION_TOLERANCE: f32 = 0.01;

/// Decoded acknowledgment of a forced movement change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementAck {
    pub mover_guid: u64,
    pub counter: u32,
    pub info: MovementInfo,
    /// Echoed speed, present on speed change acks only.
    #[serde(default)]
    pub speed: Option<f32>,
}

impl WorldInstance {
    fn character(&self, id: UnitId) -> Result<&Unit, WorldError> {
        let unit = self.units.get(&id).ok_or(WorldError::UnknownUnit(id))?;
        if !unit.is_character() {
            return Err(WorldError::NotACharacter(id));
        }
        Ok(unit)
    }

    /// Ends the session of `id` and takes the character out of the world.
    fn reject(&mut self, id: UnitId, reason: KickReason) -> WorldError {
        let error = self.kick(id, reason);
        if let Err(err) = self.despawn(id) {
            warn!(target: "movement", unit = ?id, %err, "removing kicked unit failed");
        }
        error
    }

    /// Forces a movement state change on a unit. Characters get it queued
    /// until the client acknowledges it and the counter to expect is
    /// returned; server-driven units take it immediately.
    pub fn push_movement_change(&mut self, id: UnitId, change: MovementChange) -> Result<Option<u32>, WorldError> {
        let now = self.now;
        let unit = self.units.get_mut(&id).ok_or(WorldError::UnknownUnit(id))?;
        if unit.is_character() {
            let counter = unit.pending.push(change, now);
            debug!(target: "ack", unit = ?id, counter, ?change, "queued forced movement change");
            self.outbox.send(
                id,
                ServerMessage::ForceMovementChange {
                    mover: id,
                    counter,
                    change,
                },
            );
            return Ok(Some(counter));
        }

        apply_forced_change(unit, &change);
        match change {
            MovementChange::Speed { movement_type, speed } => {
                self.broadcast_around(
                    id,
                    ServerMessage::SpeedUpdate {
                        mover: id,
                        movement_type,
                        speed,
                    },
                    true,
                );
                return Ok(None);
            }
            MovementChange::Root { apply: true } => self.stop_movement(id)?,
            MovementChange::Teleport(teleport) => {
                self.stop_movement(id)?;
                self.relocate(id, teleport.position)?;
            }
            _ => {}
        }
        if let Some(info) = self.units.get(&id).map(|unit| unit.movement) {
            self.broadcast_around(
                id,
                ServerMessage::MovementUpdate {
                    mover: id,
                    opcode: opcodes::NONE,
                    info,
                },
                true,
            );
        }
        Ok(None)
    }

    /// Moves a unit to `position`, through an acknowledged teleport for
    /// characters.
    pub fn teleport(&mut self, id: UnitId, map_id: u32, position: Position) -> Result<Option<u32>, WorldError> {
        if self.grid.tile_position(position.location()).is_none() {
            return Err(WorldError::OutOfBounds);
        }
        self.push_movement_change(id, MovementChange::Teleport(TeleportInfo { map_id, position }))
    }

    pub fn knock_back(&mut self, id: UnitId, knock_back: KnockBackInfo) -> Result<Option<u32>, WorldError> {
        self.character(id)?;
        self.push_movement_change(id, MovementChange::KnockBack(knock_back))
    }

    /// Validates and applies a plain movement packet from the client that
    /// controls `id`.
    pub fn handle_movement_packet(
        &mut self,
        id: UnitId,
        opcode: OpCode,
        info: MovementInfo,
    ) -> Result<(), WorldError> {
        let now = self.now;
        let timeout = self.settings.pending_change_timeout_ms;
        let limits = self.settings.limits;
        let unit = self.character(id)?;

        if !opcodes::is_movement_opcode(opcode) {
            return Err(self.reject(id, KickReason::InvalidMovement { opcode }));
        }
        if !info.position.is_finite() || self.grid.tile_position(info.location()).is_none() {
            let reason = KickReason::Malformed(format!("{} carries an invalid position", opcodes::name(opcode)));
            return Err(self.reject(id, reason));
        }
        if unit.pending.has_timed_out(now, timeout) {
            return Err(self.reject(id, KickReason::PendingChangeTimeout));
        }
        if unit.pending.has_pending_of(MovementChangeType::Teleport) {
            trace!(target: "movement", unit = ?id, opcode = opcodes::name(opcode), "dropping movement while a teleport is pending");
            return Ok(());
        }

        let server = unit.movement;
        let mut allowed = unit.allowed_speed(movement_type_for(info.move_flags));
        if !validate_movement_info_with(&limits, opcode, &info, &server, allowed) {
            return Err(self.reject(id, KickReason::InvalidMovement { opcode }));
        }
        if server.is_falling() {
            allowed = allowed.max(server.jump_xy_speed);
        }
        if !validate_movement_speed(allowed, &info, &server) {
            return Err(self.reject(id, KickReason::SpeedHack));
        }

        self.accept_movement(id, opcode, info, server)
    }

    fn accept_movement(
        &mut self,
        id: UnitId,
        opcode: OpCode,
        info: MovementInfo,
        previous: MovementInfo,
    ) -> Result<(), WorldError> {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.movement = info;
        }
        self.relocate(id, info.position)?;
        trace!(target: "movement", unit = ?id, opcode = opcodes::name(opcode), flags = ?info.move_flags, "movement accepted");
        self.broadcast_around(
            id,
            ServerMessage::MovementUpdate {
                mover: id,
                opcode,
                info,
            },
            false,
        );

        let moved = info.move_flags.is_moving() || previous.location() != info.location();
        let turned = info.move_flags.is_turning()
            || !nearly_equal(previous.position.o, info.position.o, FLOAT_EPSILON);
        let mut interrupts = AuraInterruptFlags::empty();
        if moved {
            interrupts |= AuraInterruptFlags::MOVE;
        }
        if turned {
            interrupts |= AuraInterruptFlags::TURNING;
        }
        if !interrupts.is_empty() {
            self.interrupt_auras(id, interrupts);
        }
        Ok(())
    }

    /// Completes the oldest pending change of `id`. Acks must arrive in
    /// push order and echo exactly what was sent.
    pub fn handle_ack_packet(&mut self, id: UnitId, opcode: OpCode, ack: MovementAck) -> Result<(), WorldError> {
        let now = self.now;
        let timeout = self.settings.pending_change_timeout_ms;
        let limits = self.settings.limits;
        let unit = self.character(id)?;

        if ack.mover_guid != id.guid() {
            let reason = KickReason::MoverMismatch {
                expected: id.guid(),
                received: ack.mover_guid,
            };
            return Err(self.reject(id, reason));
        }
        let Some(change_type) = change_type_for_ack(opcode) else {
            return Err(self.reject(id, KickReason::UnexpectedAck { opcode }));
        };
        if !ack.info.position.is_finite() || self.grid.tile_position(ack.info.location()).is_none() {
            let reason = KickReason::Malformed(format!("{} carries an invalid position", opcodes::name(opcode)));
            return Err(self.reject(id, reason));
        }
        if unit.pending.has_timed_out(now, timeout) {
            return Err(self.reject(id, KickReason::PendingChangeTimeout));
        }

        let popped = self
            .units
            .get_mut(&id)
            .ok_or(WorldError::UnknownUnit(id))?
            .pending
            .pop_acknowledged(ack.counter);
        let pending = match popped {
            Ok(pending) => pending,
            Err(err) => return Err(self.reject(id, KickReason::from_ack_error(opcode, err))),
        };
        if pending.change_type() != change_type || pending.change.ack_opcode() != opcode {
            debug!(target: "ack", unit = ?id, expected = ?pending.change_type(), received = ?change_type, "ack does not answer the oldest change");
            return Err(self.reject(id, KickReason::AckTypeMismatch { opcode }));
        }
        if !ack_payload_matches(&pending, change_type, &ack) {
            return Err(self.reject(id, KickReason::AckPayloadMismatch { opcode }));
        }

        let unit = self.character(id)?;
        let server = unit.movement;
        if !matches!(pending.change, MovementChange::Teleport(_)) {
            let mut allowed = unit.allowed_speed(movement_type_for(ack.info.move_flags));
            match pending.change {
                MovementChange::Speed { speed, .. } => allowed = allowed.max(speed),
                MovementChange::KnockBack(knock_back) => allowed = allowed.max(knock_back.speed_xy),
                _ => {}
            }
            if !validate_movement_info_with(&limits, opcode, &ack.info, &server, allowed) {
                return Err(self.reject(id, KickReason::InvalidMovement { opcode }));
            }
            if server.is_falling() {
                allowed = allowed.max(server.jump_xy_speed);
            }
            if !validate_movement_speed(allowed, &ack.info, &server) {
                return Err(self.reject(id, KickReason::SpeedHack));
            }
        }

        debug!(target: "ack", unit = ?id, counter = pending.counter, change = ?pending.change, "forced change acknowledged");
        self.apply_acknowledged(id, opcode, &pending, ack.info)
    }

    fn apply_acknowledged(
        &mut self,
        id: UnitId,
        opcode: OpCode,
        pending: &PendingMovementChange,
        info: MovementInfo,
    ) -> Result<(), WorldError> {
        let unit = self.units.get_mut(&id).ok_or(WorldError::UnknownUnit(id))?;
        let previous = unit.movement;
        match pending.change {
            MovementChange::Speed { movement_type, speed } => {
                unit.movement = info;
                unit.set_speed(movement_type, speed);
                self.relocate(id, info.position)?;
                self.broadcast_around(
                    id,
                    ServerMessage::SpeedUpdate {
                        mover: id,
                        movement_type,
                        speed,
                    },
                    false,
                );
                Ok(())
            }
            MovementChange::Teleport(teleport) => {
                if let UnitKind::Character(data) = &mut unit.kind {
                    data.map_id = teleport.map_id;
                }
                let mut info = info;
                info.position = teleport.position;
                info.reset_fall();
                self.accept_movement(id, opcode, info, previous)
            }
            _ => self.accept_movement(id, opcode, info, previous),
        }
    }

    /// The client finished a server-driven spline.
    pub fn handle_move_spline_done(&mut self, id: UnitId, info: MovementInfo) -> Result<(), WorldError> {
        self.handle_movement_packet(id, opcodes::CMSG_MOVE_SPLINE_DONE, info)
    }

    /// The client reports a stall of `skipped_ms`. The server clock of the
    /// unit is moved forward so the next packet is measured from there.
    pub fn handle_time_skipped(&mut self, id: UnitId, skipped_ms: i64) -> Result<(), WorldError> {
        self.character(id)?;
        if skipped_ms < 0 {
            return Err(self.reject(id, KickReason::NegativeTimeSkip(skipped_ms)));
        }
        if let Some(unit) = self.units.get_mut(&id) {
            let skipped = u32::try_from(skipped_ms).unwrap_or(u32::MAX);
            unit.movement.time = unit.movement.time.saturating_add(skipped);
            trace!(target: "movement", unit = ?id, skipped_ms, "client time skipped");
        }
        Ok(())
    }
}

fn ack_payload_matches(pending: &PendingMovementChange, change_type: MovementChangeType, ack: &MovementAck) -> bool {
    match pending.change {
        MovementChange::Speed { .. } => ack
            .speed
            .and_then(|speed| validate_speed_ack(pending, speed))
            .is_some(),
        MovementChange::Teleport(teleport) => {
            let expected = teleport.position;
            let received = ack.info.position;
            nearly_equal(expected.x, received.x, TELEPORT_POSITION_TOLERANCE)
                && nearly_equal(expected.y, received.y, TELEPORT_POSITION_TOLERANCE)
                && nearly_equal(expected.z, received.z, TELEPORT_POSITION_TOLERANCE)
        }
        MovementChange::KnockBack(knock_back) => validate_knock_back_ack(&ack.info, &knock_back),
        _ => match pending.change.apply() {
            Some(apply) => {
                validate_move_flags_on_apply(apply, ack.info.move_flags, change_type.possibly_applied_flags())
            }
            None => false,
        },
    }
}

/// State change for units without a client to acknowledge it.
fn apply_forced_change(unit: &mut Unit, change: &MovementChange) {
    let flags = &mut unit.movement.move_flags;
    match *change {
        MovementChange::Root { apply } => {
            flags.set(MoveFlags::ROOT, apply);
            if apply {
                flags.remove(MoveFlags::MOVING);
            }
        }
        MovementChange::Speed { movement_type, speed } => unit.set_speed(movement_type, speed),
        MovementChange::Teleport(teleport) => {
            unit.movement.position = teleport.position;
            unit.movement.reset_fall();
        }
        MovementChange::Hover { apply } => flags.set(MoveFlags::HOVER, apply),
        MovementChange::WaterWalk { apply } => flags.set(MoveFlags::WATER_WALKING, apply),
        MovementChange::FeatherFall { apply } => flags.set(MoveFlags::SAFE_FALL, apply),
        MovementChange::CanFly { apply } => {
            flags.set(MoveFlags::CAN_FLY, apply);
            if !apply {
                flags.remove(MoveFlags::FLYING);
            }
        }
        MovementChange::KnockBack(_) => {}
    }
}
