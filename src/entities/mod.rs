pub mod stats;
pub mod unit;
