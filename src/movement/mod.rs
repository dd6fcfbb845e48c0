pub mod flags;
pub mod opcodes;
pub mod pending;
pub mod permissions;
pub mod validator;
