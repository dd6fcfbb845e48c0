pub mod auras;
pub mod damage;
pub mod spells;
