pub mod aura_engine;
pub mod errors;
pub mod grid;
pub mod instance;
pub mod messages;
pub mod movement_handler;
pub mod mover;
pub mod pathfinding;
pub mod position;
pub mod runner;
pub mod time;
pub mod timer;
