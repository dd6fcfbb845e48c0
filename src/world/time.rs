use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::time::Duration;

/// Server game time in milliseconds since the world instance started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GameTick(pub u64);

impl GameTick {
    pub const ZERO: GameTick = GameTick(0);

    pub fn from_millis(ms: u64) -> Self {
        GameTick(ms)
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn saturating_since(self, earlier: GameTick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn after_millis(self, ms: u64) -> GameTick {
        GameTick(self.0.saturating_add(ms))
    }
}

impl Add<u64> for GameTick {
    type Output = GameTick;

    fn add(self, rhs: u64) -> GameTick {
        self.after_millis(rhs)
    }
}

impl Sub for GameTick {
    type Output = u64;

    fn sub(self, rhs: GameTick) -> u64 {
        self.saturating_since(rhs)
    }
}

#[derive(Debug, Clone)]
pub struct GameClock {
    tick_length: Duration,
    now: GameTick,
}

impl GameClock {
    pub fn new(tick_length: Duration) -> Self {
        let tick_length = if tick_length.is_zero() {
            Duration::from_millis(1)
        } else {
            tick_length
        };
        Self {
            tick_length,
            now: GameTick::ZERO,
        }
    }

    pub fn tick_length(&self) -> Duration {
        self.tick_length
    }

    pub fn now(&self) -> GameTick {
        self.now
    }

    /// Advances by one update-loop tick.
    pub fn step(&mut self) -> GameTick {
        let ms = self.tick_length.as_millis().min(u128::from(u64::MAX)) as u64;
        self.advance_millis(ms)
    }

    pub fn advance_millis(&mut self, ms: u64) -> GameTick {
        self.now = self.now.after_millis(ms);
        self.now
    }

    pub fn advance_duration(&mut self, duration: Duration) -> GameTick {
        let ms = duration.as_millis().min(u128::from(u64::MAX)) as u64;
        self.advance_millis(ms)
    }

    /// Jumps to `tick`; never moves backwards.
    pub fn advance_to(&mut self, tick: GameTick) -> GameTick {
        if tick > self.now {
            self.now = tick;
        }
        self.now
    }
}
