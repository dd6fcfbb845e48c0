//! Client movement opcodes relevant to validation. Values follow the 2.4.3
//! client; `NONE` (0) means "no opcode constraint".

pub type OpCode = u16;

pub const NONE: OpCode = 0x0000;

pub const MSG_MOVE_START_FORWARD: OpCode = 0x00B5;
pub const MSG_MOVE_START_BACKWARD: OpCode = 0x00B6;
pub const MSG_MOVE_STOP: OpCode = 0x00B7;
pub const MSG_MOVE_START_STRAFE_LEFT: OpCode = 0x00B8;
pub const MSG_MOVE_START_STRAFE_RIGHT: OpCode = 0x00B9;
pub const MSG_MOVE_STOP_STRAFE: OpCode = 0x00BA;
pub const MSG_MOVE_JUMP: OpCode = 0x00BB;
pub const MSG_MOVE_START_TURN_LEFT: OpCode = 0x00BC;
pub const MSG_MOVE_START_TURN_RIGHT: OpCode = 0x00BD;
pub const MSG_MOVE_STOP_TURN: OpCode = 0x00BE;
pub const MSG_MOVE_START_PITCH_UP: OpCode = 0x00BF;
pub const MSG_MOVE_START_PITCH_DOWN: OpCode = 0x00C0;
pub const MSG_MOVE_STOP_PITCH: OpCode = 0x00C1;
pub const MSG_MOVE_SET_RUN_MODE: OpCode = 0x00C2;
pub const MSG_MOVE_SET_WALK_MODE: OpCode = 0x00C3;
pub const MSG_MOVE_TELEPORT_ACK: OpCode = 0x00C7;
pub const MSG_MOVE_FALL_LAND: OpCode = 0x00C9;
pub const MSG_MOVE_START_SWIM: OpCode = 0x00CA;
pub const MSG_MOVE_STOP_SWIM: OpCode = 0x00CB;
pub const MSG_MOVE_SET_FACING: OpCode = 0x00DA;
pub const MSG_MOVE_SET_PITCH: OpCode = 0x00DB;
pub const CMSG_FORCE_RUN_SPEED_CHANGE_ACK: OpCode = 0x00E3;
pub const CMSG_FORCE_RUN_BACK_SPEED_CHANGE_ACK: OpCode = 0x00E5;
pub const CMSG_FORCE_SWIM_SPEED_CHANGE_ACK: OpCode = 0x00E7;
pub const CMSG_FORCE_MOVE_ROOT_ACK: OpCode = 0x00E9;
pub const CMSG_FORCE_MOVE_UNROOT_ACK: OpCode = 0x00EB;
pub const MSG_MOVE_HEARTBEAT: OpCode = 0x00EE;
pub const CMSG_MOVE_KNOCK_BACK_ACK: OpCode = 0x00F0;
pub const CMSG_MOVE_HOVER_ACK: OpCode = 0x00F6;
pub const CMSG_MOVE_SPLINE_DONE: OpCode = 0x02C9;
pub const CMSG_MOVE_FALL_RESET: OpCode = 0x02CA;
pub const CMSG_MOVE_FEATHER_FALL_ACK: OpCode = 0x02CF;
pub const CMSG_MOVE_WATER_WALK_ACK: OpCode = 0x02D0;
pub const CMSG_FORCE_WALK_SPEED_CHANGE_ACK: OpCode = 0x02DB;
pub const CMSG_FORCE_SWIM_BACK_SPEED_CHANGE_ACK: OpCode = 0x02DD;
pub const CMSG_FORCE_TURN_RATE_CHANGE_ACK: OpCode = 0x02DF;
pub const CMSG_MOVE_SET_CAN_FLY_ACK: OpCode = 0x0345;
pub const CMSG_MOVE_SET_FLY: OpCode = 0x0346;
pub const MSG_MOVE_START_ASCEND: OpCode = 0x0359;
pub const MSG_MOVE_STOP_ASCEND: OpCode = 0x035A;
pub const CMSG_FORCE_FLIGHT_SPEED_CHANGE_ACK: OpCode = 0x0382;
pub const CMSG_FORCE_FLIGHT_BACK_SPEED_CHANGE_ACK: OpCode = 0x0384;
pub const CMSG_MOVE_CHNG_TRANSPORT: OpCode = 0x038D;
pub const MSG_MOVE_START_DESCEND: OpCode = 0x03A7;

/// Plain movement opcodes a client may send at any time.
pub const MOVEMENT_OPCODES: &[OpCode] = &[
    MSG_MOVE_START_FORWARD,
    MSG_MOVE_START_BACKWARD,
    MSG_MOVE_STOP,
    MSG_MOVE_START_STRAFE_LEFT,
    MSG_MOVE_START_STRAFE_RIGHT,
    MSG_MOVE_STOP_STRAFE,
    MSG_MOVE_JUMP,
    MSG_MOVE_START_TURN_LEFT,
    MSG_MOVE_START_TURN_RIGHT,
    MSG_MOVE_STOP_TURN,
    MSG_MOVE_START_PITCH_UP,
    MSG_MOVE_START_PITCH_DOWN,
    MSG_MOVE_STOP_PITCH,
    MSG_MOVE_SET_RUN_MODE,
    MSG_MOVE_SET_WALK_MODE,
    MSG_MOVE_FALL_LAND,
    MSG_MOVE_START_SWIM,
    MSG_MOVE_STOP_SWIM,
    MSG_MOVE_SET_FACING,
    MSG_MOVE_SET_PITCH,
    MSG_MOVE_HEARTBEAT,
    CMSG_MOVE_FALL_RESET,
    CMSG_MOVE_SET_FLY,
    MSG_MOVE_START_ASCEND,
    MSG_MOVE_STOP_ASCEND,
    CMSG_MOVE_CHNG_TRANSPORT,
    MSG_MOVE_START_DESCEND,
    CMSG_MOVE_SPLINE_DONE,
];

pub fn is_movement_opcode(opcode: OpCode) -> bool {
    MOVEMENT_OPCODES.contains(&opcode)
}

pub fn name(opcode: OpCode) -> &'static str {
    match opcode {
        NONE => "NONE",
        MSG_MOVE_START_FORWARD => "MSG_MOVE_START_FORWARD",
        MSG_MOVE_START_BACKWARD => "MSG_MOVE_START_BACKWARD",
        MSG_MOVE_STOP => "MSG_MOVE_STOP",
        MSG_MOVE_START_STRAFE_LEFT => "MSG_MOVE_START_STRAFE_LEFT",
        MSG_MOVE_START_STRAFE_RIGHT => "MSG_MOVE_START_STRAFE_RIGHT",
        MSG_MOVE_STOP_STRAFE => "MSG_MOVE_STOP_STRAFE",
        MSG_MOVE_JUMP => "MSG_MOVE_JUMP",
        MSG_MOVE_START_TURN_LEFT => "MSG_MOVE_START_TURN_LEFT",
        MSG_MOVE_START_TURN_RIGHT => "MSG_MOVE_START_TURN_RIGHT",
        MSG_MOVE_STOP_TURN => "MSG_MOVE_STOP_TURN",
        MSG_MOVE_START_PITCH_UP => "MSG_MOVE_START_PITCH_UP",
        MSG_MOVE_START_PITCH_DOWN => "MSG_MOVE_START_PITCH_DOWN",
        MSG_MOVE_STOP_PITCH => "MSG_MOVE_STOP_PITCH",
        MSG_MOVE_SET_RUN_MODE => "MSG_MOVE_SET_RUN_MODE",
        MSG_MOVE_SET_WALK_MODE => "MSG_MOVE_SET_WALK_MODE",
        MSG_MOVE_TELEPORT_ACK => "MSG_MOVE_TELEPORT_ACK",
        MSG_MOVE_FALL_LAND => "MSG_MOVE_FALL_LAND",
        MSG_MOVE_START_SWIM => "MSG_MOVE_START_SWIM",
        MSG_MOVE_STOP_SWIM => "MSG_MOVE_STOP_SWIM",
        MSG_MOVE_SET_FACING => "MSG_MOVE_SET_FACING",
        MSG_MOVE_SET_PITCH => "MSG_MOVE_SET_PITCH",
        CMSG_FORCE_RUN_SPEED_CHANGE_ACK => "CMSG_FORCE_RUN_SPEED_CHANGE_ACK",
        CMSG_FORCE_RUN_BACK_SPEED_CHANGE_ACK => "CMSG_FORCE_RUN_BACK_SPEED_CHANGE_ACK",
        CMSG_FORCE_SWIM_SPEED_CHANGE_ACK => "CMSG_FORCE_SWIM_SPEED_CHANGE_ACK",
        CMSG_FORCE_MOVE_ROOT_ACK => "CMSG_FORCE_MOVE_ROOT_ACK",
        CMSG_FORCE_MOVE_UNROOT_ACK => "CMSG_FORCE_MOVE_UNROOT_ACK",
        MSG_MOVE_HEARTBEAT => "MSG_MOVE_HEARTBEAT",
        CMSG_MOVE_KNOCK_BACK_ACK => "CMSG_MOVE_KNOCK_BACK_ACK",
        CMSG_MOVE_HOVER_ACK => "CMSG_MOVE_HOVER_ACK",
        CMSG_MOVE_SPLINE_DONE => "CMSG_MOVE_SPLINE_DONE",
        CMSG_MOVE_FALL_RESET => "CMSG_MOVE_FALL_RESET",
        CMSG_MOVE_FEATHER_FALL_ACK => "CMSG_MOVE_FEATHER_FALL_ACK",
        CMSG_MOVE_WATER_WALK_ACK => "CMSG_MOVE_WATER_WALK_ACK",
        CMSG_FORCE_WALK_SPEED_CHANGE_ACK => "CMSG_FORCE_WALK_SPEED_CHANGE_ACK",
        CMSG_FORCE_SWIM_BACK_SPEED_CHANGE_ACK => "CMSG_FORCE_SWIM_BACK_SPEED_CHANGE_ACK",
        CMSG_FORCE_TURN_RATE_CHANGE_ACK => "CMSG_FORCE_TURN_RATE_CHANGE_ACK",
        CMSG_MOVE_SET_CAN_FLY_ACK => "CMSG_MOVE_SET_CAN_FLY_ACK",
        CMSG_MOVE_SET_FLY => "CMSG_MOVE_SET_FLY",
        MSG_MOVE_START_ASCEND => "MSG_MOVE_START_ASCEND",
        MSG_MOVE_STOP_ASCEND => "MSG_MOVE_STOP_ASCEND",
        CMSG_FORCE_FLIGHT_SPEED_CHANGE_ACK => "CMSG_FORCE_FLIGHT_SPEED_CHANGE_ACK",
        CMSG_FORCE_FLIGHT_BACK_SPEED_CHANGE_ACK => "CMSG_FORCE_FLIGHT_BACK_SPEED_CHANGE_ACK",
        CMSG_MOVE_CHNG_TRANSPORT => "CMSG_MOVE_CHNG_TRANSPORT",
        MSG_MOVE_START_DESCEND => "MSG_MOVE_START_DESCEND",
        _ => "UNKNOWN",
    }
}
