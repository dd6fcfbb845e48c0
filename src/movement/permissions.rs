use crate::movement::flags::MoveFlags;
use crate::movement::opcodes::{self, OpCode};

/// Static rule for one movement flag bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveFlagPermission {
    pub flag: MoveFlags,
    /// Flags that must not be set together with `flag`.
    pub exclusive: MoveFlags,
    /// At least one of these must be set together with `flag` (empty = no requirement).
    pub inclusive: MoveFlags,
    /// Only opcode allowed to switch `flag` on (`opcodes::NONE` = any).
    pub enabled_by: OpCode,
    /// Only opcode allowed to switch `flag` off (`opcodes::NONE` = any).
    pub disabled_by: OpCode,
}

const fn rule(
    flag: MoveFlags,
    exclusive: MoveFlags,
    inclusive: MoveFlags,
    enabled_by: OpCode,
    disabled_by: OpCode,
) -> MoveFlagPermission {
    MoveFlagPermission {
        flag,
        exclusive,
        inclusive,
        enabled_by,
        disabled_by,
    }
}

const NO_FLAGS: MoveFlags = MoveFlags::empty();

pub static MOVE_FLAG_PERMISSIONS: [MoveFlagPermission; 21] = [
    rule(MoveFlags::FORWARD, MoveFlags::BACKWARD, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::BACKWARD, MoveFlags::FORWARD, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::STRAFE_LEFT, MoveFlags::STRAFE_RIGHT, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::STRAFE_RIGHT, MoveFlags::STRAFE_LEFT, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::TURN_LEFT, MoveFlags::TURN_RIGHT, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::TURN_RIGHT, MoveFlags::TURN_LEFT, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::PITCH_UP, MoveFlags::PITCH_DOWN, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::PITCH_DOWN, MoveFlags::PITCH_UP, NO_FLAGS, opcodes::NONE, opcodes::NONE),
    rule(
        MoveFlags::WALK_MODE,
        NO_FLAGS,
        NO_FLAGS,
        opcodes::MSG_MOVE_SET_WALK_MODE,
        opcodes::MSG_MOVE_SET_RUN_MODE,
    ),
    rule(
        MoveFlags::ROOT,
        MoveFlags::DIRECTIONAL
            .union(MoveFlags::FALLING)
            .union(MoveFlags::PENDING_ROOT)
            .union(MoveFlags::ASCENDING)
            .union(MoveFlags::DESCENDING),
        NO_FLAGS,
        opcodes::NONE,
        opcodes::NONE,
    ),
    rule(
        MoveFlags::FALLING,
        MoveFlags::SWIMMING.union(MoveFlags::FLYING),
        NO_FLAGS,
        opcodes::NONE,
        opcodes::NONE,
    ),
    rule(MoveFlags::FALLING_FAR, NO_FLAGS, MoveFlags::FALLING, opcodes::NONE, opcodes::NONE),
    rule(MoveFlags::PENDING_ROOT, MoveFlags::ROOT, MoveFlags::FALLING, opcodes::NONE, opcodes::NONE),
    rule(
        MoveFlags::SWIMMING,
        MoveFlags::FALLING.union(MoveFlags::FALLING_FAR),
        NO_FLAGS,
        opcodes::MSG_MOVE_START_SWIM,
        opcodes::MSG_MOVE_STOP_SWIM,
    ),
    rule(
        MoveFlags::ASCENDING,
        MoveFlags::DESCENDING,
        MoveFlags::SWIMMING.union(MoveFlags::FLYING),
        opcodes::MSG_MOVE_START_ASCEND,
        opcodes::NONE,
    ),
    rule(
        MoveFlags::DESCENDING,
        MoveFlags::ASCENDING,
        MoveFlags::SWIMMING.union(MoveFlags::FLYING),
        opcodes::MSG_MOVE_START_DESCEND,
        opcodes::NONE,
    ),
    rule(
        MoveFlags::CAN_FLY,
        NO_FLAGS,
        NO_FLAGS,
        opcodes::CMSG_MOVE_SET_CAN_FLY_ACK,
        opcodes::CMSG_MOVE_SET_CAN_FLY_ACK,
    ),
    rule(
        MoveFlags::FLYING,
        MoveFlags::FALLING,
        MoveFlags::CAN_FLY,
        opcodes::CMSG_MOVE_SET_FLY,
        opcodes::NONE,
    ),
    rule(
        MoveFlags::WATER_WALKING,
        NO_FLAGS,
        NO_FLAGS,
        opcodes::CMSG_MOVE_WATER_WALK_ACK,
        opcodes::CMSG_MOVE_WATER_WALK_ACK,
    ),
    rule(
        MoveFlags::SAFE_FALL,
        NO_FLAGS,
        NO_FLAGS,
        opcodes::CMSG_MOVE_FEATHER_FALL_ACK,
        opcodes::CMSG_MOVE_FEATHER_FALL_ACK,
    ),
    rule(
        MoveFlags::HOVER,
        NO_FLAGS,
        NO_FLAGS,
        opcodes::CMSG_MOVE_HOVER_ACK,
        opcodes::CMSG_MOVE_HOVER_ACK,
    ),
];

pub fn permission_for(flag: MoveFlags) -> Option<&'static MoveFlagPermission> {
    MOVE_FLAG_PERMISSIONS.iter().find(|entry| entry.flag == flag)
}

/// Why a flag combination or transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagViolation {
    EnabledByWrongOpcode { flag: MoveFlags, required: OpCode },
    DisabledByWrongOpcode { flag: MoveFlags, required: OpCode },
    Exclusive { flag: MoveFlags, conflicting: MoveFlags },
    MissingInclusive { flag: MoveFlags, required: MoveFlags },
}

/// Runs the permission table against a flag transition. `opcode == NONE`
/// skips the transition checks but still enforces flag combinations.
pub fn check_flag_transition(
    opcode: OpCode,
    previous: MoveFlags,
    next: MoveFlags,
) -> Result<(), FlagViolation> {
    for entry in MOVE_FLAG_PERMISSIONS.iter() {
        let was_set = previous.contains(entry.flag);
        let is_set = next.contains(entry.flag);

        if opcode != opcodes::NONE {
            if !was_set
                && is_set
                && entry.enabled_by != opcodes::NONE
                && entry.enabled_by != opcode
            {
                return Err(FlagViolation::EnabledByWrongOpcode {
                    flag: entry.flag,
                    required: entry.enabled_by,
                });
            }
            if was_set
                && !is_set
                && entry.disabled_by != opcodes::NONE
                && entry.disabled_by != opcode
            {
                return Err(FlagViolation::DisabledByWrongOpcode {
                    flag: entry.flag,
                    required: entry.disabled_by,
                });
            }
        }

        if is_set {
            let conflicting = next & entry.exclusive;
            if !conflicting.is_empty() {
                return Err(FlagViolation::Exclusive {
                    flag: entry.flag,
                    conflicting,
                });
            }
            if !entry.inclusive.is_empty() && !next.intersects(entry.inclusive) {
                return Err(FlagViolation::MissingInclusive {
                    flag: entry.flag,
                    required: entry.inclusive,
                });
            }
        }
    }
    Ok(())
}
