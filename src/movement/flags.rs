use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::world::position::{Position, Vector3};

bitflags! {
    /// Kinematic mode bits carried by every movement packet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct MoveFlags: u32 {
        const FORWARD = 0x0000_0001;
        const BACKWARD = 0x0000_0002;
        const STRAFE_LEFT = 0x0000_0004;
        const STRAFE_RIGHT = 0x0000_0008;
        const TURN_LEFT = 0x0000_0010;
        const TURN_RIGHT = 0x0000_0020;
        const PITCH_UP = 0x0000_0040;
        const PITCH_DOWN = 0x0000_0080;
        const WALK_MODE = 0x0000_0100;
        const ON_TRANSPORT = 0x0000_0200;
        const LEVITATING = 0x0000_0400;
        const ROOT = 0x0000_0800;
        const FALLING = 0x0000_1000;
        const FALLING_FAR = 0x0000_2000;
        const PENDING_STOP = 0x0000_4000;
        const PENDING_STRAFE_STOP = 0x0000_8000;
        const PENDING_FORWARD = 0x0001_0000;
        const PENDING_BACKWARD = 0x0002_0000;
        const PENDING_STRAFE_LEFT = 0x0004_0000;
        const PENDING_STRAFE_RIGHT = 0x0008_0000;
        const PENDING_ROOT = 0x0010_0000;
        const SWIMMING = 0x0020_0000;
        const ASCENDING = 0x0040_0000;
        const DESCENDING = 0x0080_0000;
        const CAN_FLY = 0x0100_0000;
        const FLYING = 0x0200_0000;
        const SPLINE_ELEVATION = 0x0400_0000;
        const SPLINE_ENABLED = 0x0800_0000;
        const WATER_WALKING = 0x1000_0000;
        const SAFE_FALL = 0x2000_0000;
        const HOVER = 0x4000_0000;

        const MOVING = Self::FORWARD.bits()
            | Self::BACKWARD.bits()
            | Self::STRAFE_LEFT.bits()
            | Self::STRAFE_RIGHT.bits()
            | Self::PITCH_UP.bits()
            | Self::PITCH_DOWN.bits()
            | Self::FALLING.bits()
            | Self::FALLING_FAR.bits()
            | Self::ASCENDING.bits()
            | Self::DESCENDING.bits()
            | Self::SPLINE_ELEVATION.bits();
        const TURNING = Self::TURN_LEFT.bits() | Self::TURN_RIGHT.bits();
        const DIRECTIONAL = Self::FORWARD.bits()
            | Self::BACKWARD.bits()
            | Self::STRAFE_LEFT.bits()
            | Self::STRAFE_RIGHT.bits();
    }
}

impl MoveFlags {
    pub fn is_falling(self) -> bool {
        self.contains(MoveFlags::FALLING)
    }

    pub fn is_moving(self) -> bool {
        self.intersects(MoveFlags::MOVING)
    }

    pub fn is_turning(self) -> bool {
        self.intersects(MoveFlags::TURNING)
    }
}

/// Snapshot of a unit's kinematic state as reported by (or sent to) a client.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementInfo {
    pub move_flags: MoveFlags,
    /// Client tick in milliseconds; never decreases for a unit.
    pub time: u32,
    pub position: Position,
    pub transport_guid: u64,
    pub transport_position: Position,
    pub transport_time: u32,
    pub pitch: f32,
    /// Milliseconds spent airborne; only meaningful while falling.
    pub fall_time: u32,
    pub jump_velocity: f32,
    pub jump_sin_angle: f32,
    pub jump_cos_angle: f32,
    pub jump_xy_speed: f32,
    pub jump_start_z: f32,
    pub spline_elevation: f32,
}

impl MovementInfo {
    pub fn at(position: Position, time: u32) -> Self {
        Self {
            position,
            time,
            ..Self::default()
        }
    }

    pub fn location(&self) -> Vector3 {
        self.position.location()
    }

    pub fn has(&self, flags: MoveFlags) -> bool {
        self.move_flags.contains(flags)
    }

    pub fn is_falling(&self) -> bool {
        self.move_flags.is_falling()
    }

    /// Clears the airborne state, as done on landing or teleport.
    pub fn reset_fall(&mut self) {
        self.move_flags
            .remove(MoveFlags::FALLING | MoveFlags::FALLING_FAR | MoveFlags::PENDING_ROOT);
        self.fall_time = 0;
        self.jump_velocity = 0.0;
        self.jump_xy_speed = 0.0;
        self.jump_sin_angle = 0.0;
        self.jump_cos_angle = 0.0;
    }
}

/// Which speed slot a speed change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    Walk,
    Run,
    Backwards,
    Swim,
    SwimBackwards,
    Turn,
    Flight,
    FlightBackwards,
}

impl MovementType {
    pub const COUNT: usize = 8;

    pub const ALL: [MovementType; MovementType::COUNT] = [
        MovementType::Walk,
        MovementType::Run,
        MovementType::Backwards,
        MovementType::Swim,
        MovementType::SwimBackwards,
        MovementType::Turn,
        MovementType::Flight,
        MovementType::FlightBackwards,
    ];

    pub fn index(self) -> usize {
        match self {
            MovementType::Walk => 0,
            MovementType::Run => 1,
            MovementType::Backwards => 2,
            MovementType::Swim => 3,
            MovementType::SwimBackwards => 4,
            MovementType::Turn => 5,
            MovementType::Flight => 6,
            MovementType::FlightBackwards => 7,
        }
    }

    /// Base speed in units per second (radians per second for `Turn`).
    pub fn base_speed(self) -> f32 {
        match self {
            MovementType::Walk => 2.5,
            MovementType::Run => 7.0,
            MovementType::Backwards => 4.5,
            MovementType::Swim => 4.722222,
            MovementType::SwimBackwards => 2.5,
            MovementType::Turn => std::f32::consts::PI,
            MovementType::Flight => 7.0,
            MovementType::FlightBackwards => 4.5,
        }
    }
}

/// Picks the speed slot that governs a packet's horizontal travel.
pub fn movement_type_for(flags: MoveFlags) -> MovementType {
    let backwards = flags.contains(MoveFlags::BACKWARD);
    if flags.contains(MoveFlags::FLYING) {
        if backwards {
            MovementType::FlightBackwards
        } else {
            MovementType::Flight
        }
    } else if flags.contains(MoveFlags::SWIMMING) {
        if backwards {
            MovementType::SwimBackwards
        } else {
            MovementType::Swim
        }
    } else if flags.contains(MoveFlags::WALK_MODE) {
        if backwards {
            MovementType::Backwards
        } else {
            MovementType::Walk
        }
    } else if backwards {
        MovementType::Backwards
    } else {
        MovementType::Run
    }
}
