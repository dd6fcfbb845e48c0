use thiserror::Error;

use crate::combat::spells::SpellId;
use crate::entities::unit::UnitId;
use crate::movement::opcodes::OpCode;
use crate::movement::pending::PendingAckError;

/// Why a client session gets disconnected. Every validation failure ends
/// the session; nothing is repaired silently.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KickReason {
    #[error("malformed movement packet: {0}")]
    Malformed(String),
    #[error("invalid movement for opcode {opcode:#06x}")]
    InvalidMovement { opcode: OpCode },
    #[error("unexpected acknowledgment {opcode:#06x}")]
    UnexpectedAck { opcode: OpCode },
    #[error("ack counter {received} does not match pending change {expected}")]
    AckCounterMismatch { expected: u32, received: u32 },
    #[error("ack {opcode:#06x} does not match the pending change")]
    AckTypeMismatch { opcode: OpCode },
    #[error("ack {opcode:#06x} carries a payload that was never sent")]
    AckPayloadMismatch { opcode: OpCode },
    #[error("forced movement change was not acknowledged in time")]
    PendingChangeTimeout,
    #[error("packet moves unit {received:#x} but the session controls {expected:#x}")]
    MoverMismatch { expected: u64, received: u64 },
    #[error("moved faster than allowed")]
    SpeedHack,
    #[error("negative time skip of {0}ms")]
    NegativeTimeSkip(i64),
}

impl KickReason {
    pub fn from_ack_error(opcode: OpCode, error: PendingAckError) -> Self {
        match error {
            PendingAckError::NothingPending => KickReason::UnexpectedAck { opcode },
            PendingAckError::CounterMismatch { expected, received } => {
                KickReason::AckCounterMismatch { expected, received }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("unknown unit {0:?}")]
    UnknownUnit(UnitId),
    #[error("unknown spell {0:?}")]
    UnknownSpell(SpellId),
    #[error("position is outside the map")]
    OutOfBounds,
    #[error("no path to the requested destination")]
    NoPath,
    #[error("unit {0:?} is not controlled by a client")]
    NotACharacter(UnitId),
    #[error("session kicked: {0}")]
    Kicked(#[from] KickReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_errors_map_to_kicks() {
        let opcode = 0x00E9;
        assert_eq!(
            KickReason::from_ack_error(opcode, PendingAckError::NothingPending),
            KickReason::UnexpectedAck { opcode }
        );
        assert_eq!(
            KickReason::from_ack_error(
                opcode,
                PendingAckError::CounterMismatch {
                    expected: 2,
                    received: 3
                }
            ),
            KickReason::AckCounterMismatch {
                expected: 2,
                received: 3
            }
        );
    }

    #[test]
    fn kicks_render_readably() {
        let error = WorldError::from(KickReason::InvalidMovement { opcode: 0xBB });
        assert_eq!(error.to_string(), "session kicked: invalid movement for opcode 0x00bb");
    }
}
