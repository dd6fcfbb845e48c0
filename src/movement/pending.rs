//! Server-forced movement changes waiting for a client acknowledgment.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::movement::flags::{MoveFlags, MovementInfo, MovementType};
use crate::movement::opcodes::{self, OpCode};
use crate::movement::validator::FLOAT_EPSILON;
use crate::world::position::{nearly_equal, Position};
use crate::world::time::GameTick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementChangeType {
    Root,
    SpeedChangeWalk,
    SpeedChangeRun,
    SpeedChangeRunBack,
    SpeedChangeSwim,
    SpeedChangeSwimBack,
    SpeedChangeTurnRate,
    SpeedChangeFlightSpeed,
    SpeedChangeFlightBackSpeed,
    Teleport,
    Hover,
    WaterWalk,
    FeatherFall,
    KnockBack,
    CanFly,
}

impl MovementChangeType {
    pub fn for_speed(movement_type: MovementType) -> Self {
        match movement_type {
            MovementType::Walk => Self::SpeedChangeWalk,
            MovementType::Run => Self::SpeedChangeRun,
            MovementType::Backwards => Self::SpeedChangeRunBack,
            MovementType::Swim => Self::SpeedChangeSwim,
            MovementType::SwimBackwards => Self::SpeedChangeSwimBack,
            MovementType::Turn => Self::SpeedChangeTurnRate,
            MovementType::Flight => Self::SpeedChangeFlightSpeed,
            MovementType::FlightBackwards => Self::SpeedChangeFlightBackSpeed,
        }
    }

    /// Speed slot affected by a speed change, `None` for every other change.
    pub fn movement_type(self) -> Option<MovementType> {
        match self {
            Self::SpeedChangeWalk => Some(MovementType::Walk),
            Self::SpeedChangeRun => Some(MovementType::Run),
            Self::SpeedChangeRunBack => Some(MovementType::Backwards),
            Self::SpeedChangeSwim => Some(MovementType::Swim),
            Self::SpeedChangeSwimBack => Some(MovementType::SwimBackwards),
            Self::SpeedChangeTurnRate => Some(MovementType::Turn),
            Self::SpeedChangeFlightSpeed => Some(MovementType::Flight),
            Self::SpeedChangeFlightBackSpeed => Some(MovementType::FlightBackwards),
            _ => None,
        }
    }

    /// Flags a client may report after acknowledging this change.
    pub fn possibly_applied_flags(self) -> MoveFlags {
        match self {
            Self::Root => MoveFlags::ROOT | MoveFlags::PENDING_ROOT,
            Self::Hover => MoveFlags::HOVER,
            Self::WaterWalk => MoveFlags::WATER_WALKING,
            Self::FeatherFall => MoveFlags::SAFE_FALL,
            Self::CanFly => MoveFlags::CAN_FLY,
            _ => MoveFlags::empty(),
        }
    }
}

/// Maps an acknowledgment opcode to the change type it confirms.
pub fn change_type_for_ack(opcode: OpCode) -> Option<MovementChangeType> {
    let change_type = match opcode {
        opcodes::CMSG_FORCE_MOVE_ROOT_ACK | opcodes::CMSG_FORCE_MOVE_UNROOT_ACK => {
            MovementChangeType::Root
        }
        opcodes::CMSG_FORCE_WALK_SPEED_CHANGE_ACK => MovementChangeType::SpeedChangeWalk,
        opcodes::CMSG_FORCE_RUN_SPEED_CHANGE_ACK => MovementChangeType::SpeedChangeRun,
        opcodes::CMSG_FORCE_RUN_BACK_SPEED_CHANGE_ACK => MovementChangeType::SpeedChangeRunBack,
        opcodes::CMSG_FORCE_SWIM_SPEED_CHANGE_ACK => MovementChangeType::SpeedChangeSwim,
        opcodes::CMSG_FORCE_SWIM_BACK_SPEED_CHANGE_ACK => MovementChangeType::SpeedChangeSwimBack,
        opcodes::CMSG_FORCE_TURN_RATE_CHANGE_ACK => MovementChangeType::SpeedChangeTurnRate,
        opcodes::CMSG_FORCE_FLIGHT_SPEED_CHANGE_ACK => MovementChangeType::SpeedChangeFlightSpeed,
        opcodes::CMSG_FORCE_FLIGHT_BACK_SPEED_CHANGE_ACK => {
            MovementChangeType::SpeedChangeFlightBackSpeed
        }
        opcodes::MSG_MOVE_TELEPORT_ACK => MovementChangeType::Teleport,
        opcodes::CMSG_MOVE_HOVER_ACK => MovementChangeType::Hover,
        opcodes::CMSG_MOVE_WATER_WALK_ACK => MovementChangeType::WaterWalk,
        opcodes::CMSG_MOVE_FEATHER_FALL_ACK => MovementChangeType::FeatherFall,
        opcodes::CMSG_MOVE_KNOCK_BACK_ACK => MovementChangeType::KnockBack,
        opcodes::CMSG_MOVE_SET_CAN_FLY_ACK => MovementChangeType::CanFly,
        _ => return None,
    };
    Some(change_type)
}

pub fn is_ack_opcode(opcode: OpCode) -> bool {
    change_type_for_ack(opcode).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeleportInfo {
    pub map_id: u32,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnockBackInfo {
    pub speed_xy: f32,
    pub speed_z: f32,
    pub vcos: f32,
    pub vsin: f32,
}

/// Payload of a forced change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MovementChange {
    Root { apply: bool },
    Speed { movement_type: MovementType, speed: f32 },
    Teleport(TeleportInfo),
    Hover { apply: bool },
    WaterWalk { apply: bool },
    FeatherFall { apply: bool },
    KnockBack(KnockBackInfo),
    CanFly { apply: bool },
}

impl MovementChange {
    pub fn change_type(&self) -> MovementChangeType {
        match self {
            MovementChange::Root { .. } => MovementChangeType::Root,
            MovementChange::Speed { movement_type, .. } => {
                MovementChangeType::for_speed(*movement_type)
            }
            MovementChange::Teleport(_) => MovementChangeType::Teleport,
            MovementChange::Hover { .. } => MovementChangeType::Hover,
            MovementChange::WaterWalk { .. } => MovementChangeType::WaterWalk,
            MovementChange::FeatherFall { .. } => MovementChangeType::FeatherFall,
            MovementChange::KnockBack(_) => MovementChangeType::KnockBack,
            MovementChange::CanFly { .. } => MovementChangeType::CanFly,
        }
    }

    /// `apply` flag for toggle changes, `None` for payload changes.
    pub fn apply(&self) -> Option<bool> {
        match self {
            MovementChange::Root { apply }
            | MovementChange::Hover { apply }
            | MovementChange::WaterWalk { apply }
            | MovementChange::FeatherFall { apply }
            | MovementChange::CanFly { apply } => Some(*apply),
            _ => None,
        }
    }

    /// Opcode the client must answer this change with.
    pub fn ack_opcode(&self) -> OpCode {
        match self {
            MovementChange::Root { apply: true } => opcodes::CMSG_FORCE_MOVE_ROOT_ACK,
            MovementChange::Root { apply: false } => opcodes::CMSG_FORCE_MOVE_UNROOT_ACK,
            MovementChange::Speed { movement_type, .. } => match movement_type {
                MovementType::Walk => opcodes::CMSG_FORCE_WALK_SPEED_CHANGE_ACK,
                MovementType::Run => opcodes::CMSG_FORCE_RUN_SPEED_CHANGE_ACK,
                MovementType::Backwards => opcodes::CMSG_FORCE_RUN_BACK_SPEED_CHANGE_ACK,
                MovementType::Swim => opcodes::CMSG_FORCE_SWIM_SPEED_CHANGE_ACK,
                MovementType::SwimBackwards => opcodes::CMSG_FORCE_SWIM_BACK_SPEED_CHANGE_ACK,
                MovementType::Turn => opcodes::CMSG_FORCE_TURN_RATE_CHANGE_ACK,
                MovementType::Flight => opcodes::CMSG_FORCE_FLIGHT_SPEED_CHANGE_ACK,
                MovementType::FlightBackwards => opcodes::CMSG_FORCE_FLIGHT_BACK_SPEED_CHANGE_ACK,
            },
            MovementChange::Teleport(_) => opcodes::MSG_MOVE_TELEPORT_ACK,
            MovementChange::Hover { .. } => opcodes::CMSG_MOVE_HOVER_ACK,
            MovementChange::WaterWalk { .. } => opcodes::CMSG_MOVE_WATER_WALK_ACK,
            MovementChange::FeatherFall { .. } => opcodes::CMSG_MOVE_FEATHER_FALL_ACK,
            MovementChange::KnockBack(_) => opcodes::CMSG_MOVE_KNOCK_BACK_ACK,
            MovementChange::CanFly { .. } => opcodes::CMSG_MOVE_SET_CAN_FLY_ACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingMovementChange {
    pub counter: u32,
    pub timestamp: GameTick,
    pub change: MovementChange,
}

impl PendingMovementChange {
    pub fn change_type(&self) -> MovementChangeType {
        self.change.change_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PendingAckError {
    #[error("no movement change is waiting for an acknowledgment")]
    NothingPending,
    #[error("ack counter {received} does not match pending change {expected}")]
    CounterMismatch { expected: u32, received: u32 },
}

/// FIFO of forced changes for one unit. Counters are unique per unit and
/// strictly increasing.
#[derive(Debug, Clone, Default)]
pub struct PendingMovementChanges {
    queue: VecDeque<PendingMovementChange>,
    next_counter: u32,
}

impl PendingMovementChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change and returns the counter the client has to echo.
    pub fn push(&mut self, change: MovementChange, now: GameTick) -> u32 {
        self.next_counter = self.next_counter.wrapping_add(1);
        let counter = self.next_counter;
        self.queue.push_back(PendingMovementChange {
            counter,
            timestamp: now,
            change,
        });
        counter
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// True when the oldest change waited longer than `timeout_ms`.
    pub fn has_timed_out(&self, now: GameTick, timeout_ms: u64) -> bool {
        self.queue
            .front()
            .map(|change| now.saturating_since(change.timestamp) > timeout_ms)
            .unwrap_or(false)
    }

    pub fn has_pending_of(&self, change_type: MovementChangeType) -> bool {
        self.queue
            .iter()
            .any(|change| change.change_type() == change_type)
    }

    pub fn front(&self) -> Option<&PendingMovementChange> {
        self.queue.front()
    }

    pub fn pop(&mut self) -> Option<PendingMovementChange> {
        self.queue.pop_front()
    }

    /// Pops the oldest change and checks it carries `received_counter`.
    /// The change is consumed either way; a mismatch ends the session.
    pub fn pop_acknowledged(
        &mut self,
        received_counter: u32,
    ) -> Result<PendingMovementChange, PendingAckError> {
        let change = self.pop().ok_or(PendingAckError::NothingPending)?;
        if change.counter != received_counter {
            return Err(PendingAckError::CounterMismatch {
                expected: change.counter,
                received: received_counter,
            });
        }
        Ok(change)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingMovementChange> {
        self.queue.iter()
    }
}

/// Checks a speed ack echoes the speed that was sent. Returns the affected
/// speed slot on success.
pub fn validate_speed_ack(
    change: &PendingMovementChange,
    received_speed: f32,
) -> Option<MovementType> {
    let MovementChange::Speed {
        movement_type,
        speed,
    } = change.change
    else {
        return None;
    };
    if !received_speed.is_finite() || !nearly_equal(speed, received_speed, FLOAT_EPSILON) {
        return None;
    }
    Some(movement_type)
}

/// After applying a toggle change at least one of `possibly_applied` must be
/// set; after removing it none may remain.
pub fn validate_move_flags_on_apply(
    apply: bool,
    flags: MoveFlags,
    possibly_applied: MoveFlags,
) -> bool {
    if apply {
        flags.intersects(possibly_applied)
    } else {
        !flags.intersects(possibly_applied)
    }
}

/// Checks a knockback ack reports the launch parameters that were sent.
pub fn validate_knock_back_ack(info: &MovementInfo, knock_back: &KnockBackInfo) -> bool {
    info.is_falling()
        && nearly_equal(info.jump_xy_speed, knock_back.speed_xy, FLOAT_EPSILON)
        && nearly_equal(info.jump_velocity, -knock_back.speed_z, FLOAT_EPSILON)
        && nearly_equal(info.jump_cos_angle, knock_back.vcos, FLOAT_EPSILON)
        && nearly_equal(info.jump_sin_angle, knock_back.vsin, FLOAT_EPSILON)
}
