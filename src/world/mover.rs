//! Server-driven unit movement along a timed path.

use tracing::{debug, trace};

use crate::entities::unit::UnitId;
use crate::movement::flags::{MoveFlags, MovementType};
use crate::world::errors::WorldError;
use crate::world::instance::{WorldInstance, WorldTimer};
use crate::world::messages::ServerMessage;
use crate::world::position::{Position, Vector3};
use crate::world::time::GameTick;
use crate::world::timer::CountdownId;

/// Path a unit is following and the countdowns that drive it.
#[derive(Debug, Clone, Default)]
pub struct UnitMover {
    path: Vec<Vector3>,
    /// Offset in ms at which each path point is reached.
    arrivals: Vec<u64>,
    started_at: GameTick,
    update_countdown: Option<CountdownId>,
    reached_countdown: Option<CountdownId>,
}

impl UnitMover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_moving(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn target(&self) -> Option<Vector3> {
        self.path.last().copied()
    }

    pub fn path(&self) -> &[Vector3] {
        &self.path
    }

    pub fn duration_ms(&self) -> u64 {
        self.arrivals.last().copied().unwrap_or(0)
    }

    pub fn arrives_at(&self) -> Option<GameTick> {
        self.is_moving()
            .then(|| self.started_at.after_millis(self.duration_ms()))
    }

    pub fn countdowns(&self) -> Vec<CountdownId> {
        self.update_countdown
            .into_iter()
            .chain(self.reached_countdown)
            .collect()
    }

    /// Starts following `path` at `speed` units per second and returns the
    /// travel time.
    pub fn start(&mut self, path: Vec<Vector3>, speed: f32, now: GameTick) -> u64 {
        let speed = if speed > 0.0 { speed } else { f32::EPSILON };
        let mut arrivals = Vec::with_capacity(path.len());
        let mut elapsed = 0.0f64;
        let mut previous: Option<Vector3> = None;
        for point in &path {
            if let Some(previous) = previous {
                elapsed += f64::from(previous.distance(*point) / speed) * 1000.0;
            }
            arrivals.push(elapsed.ceil() as u64);
            previous = Some(*point);
        }
        self.path = path;
        self.arrivals = arrivals;
        self.started_at = now;
        self.duration_ms()
    }

    /// Interpolated location at `now`; the end point once the path is done.
    pub fn position_at(&self, now: GameTick) -> Option<Vector3> {
        let first = *self.path.first()?;
        let elapsed = now.saturating_since(self.started_at);
        if elapsed >= self.duration_ms() {
            return self.path.last().copied();
        }
        for (index, window) in self.arrivals.windows(2).enumerate() {
            let (from, to) = (window[0], window[1]);
            if elapsed < to {
                let span = (to - from).max(1) as f32;
                let t = (elapsed.saturating_sub(from)) as f32 / span;
                return Some(self.path[index].lerp(self.path[index + 1], t));
            }
        }
        Some(first)
    }

    /// Facing along the segment travelled at `now`.
    pub fn orientation_at(&self, now: GameTick) -> Option<f32> {
        let elapsed = now.saturating_since(self.started_at);
        let index = self
            .arrivals
            .iter()
            .skip(1)
            .position(|arrival| elapsed < *arrival)
            .unwrap_or(self.path.len().saturating_sub(2));
        let from = self.path.get(index)?;
        let to = self.path.get(index + 1)?;
        Some(from.angle_to(*to))
    }

    fn finish(&mut self) {
        self.path.clear();
        self.arrivals.clear();
    }
}

impl WorldInstance {
    /// Sends a unit along a computed path to `target`. Returns `false` when
    /// the unit cannot move right now.
    pub fn move_to(&mut self, id: UnitId, target: Vector3) -> Result<bool, WorldError> {
        let unit = self.units.get(&id).ok_or(WorldError::UnknownUnit(id))?;
        if !unit.is_alive() || unit.is_rooted() {
            return Ok(false);
        }
        if self.grid.tile_position(target).is_none() {
            return Err(WorldError::OutOfBounds);
        }
        let start = unit.location();
        let speed = unit.speed(MovementType::Run);
        let path = self.pathfinder.calculate_path(start, target)?;
        if path.len() < 2 {
            return Err(WorldError::NoPath);
        }
        self.cancel_mover_timers(id);

        let now = self.now;
        let interval = self.settings.mover_update_interval_ms.max(1);
        let unit = self.units.get_mut(&id).ok_or(WorldError::UnknownUnit(id))?;
        let duration = unit.mover.start(path.clone(), speed, now);
        if let Some(orientation) = unit.mover.orientation_at(now) {
            unit.movement.position.o = orientation;
        }
        unit.movement.move_flags.insert(MoveFlags::FORWARD);

        let update = *unit
            .mover
            .update_countdown
            .get_or_insert_with(|| self.timers.create(WorldTimer::MoverUpdate { unit: id }));
        let reached = *unit
            .mover
            .reached_countdown
            .get_or_insert_with(|| self.timers.create(WorldTimer::MoverReached { unit: id }));
        self.timers.set_end(reached, now.after_millis(duration));
        if duration > interval {
            self.timers.set_end(update, now.after_millis(interval));
        }

        debug!(target: "mover", unit = ?id, points = path.len(), duration, "unit started moving");
        self.broadcast_around(
            id,
            ServerMessage::MonsterMove {
                mover: id,
                start,
                points: path[1..].to_vec(),
                duration_ms: duration,
                time: now,
            },
            true,
        );
        Ok(true)
    }

    /// Halts a moving unit where it currently is. Timers are cancelled before
    /// the unit is relocated so no stale update can move it afterwards.
    pub fn stop_movement(&mut self, id: UnitId) -> Result<(), WorldError> {
        let unit = self.units.get(&id).ok_or(WorldError::UnknownUnit(id))?;
        if !unit.mover.is_moving() {
            return Ok(());
        }
        self.cancel_mover_timers(id);

        let now = self.now;
        let unit = self.units.get_mut(&id).ok_or(WorldError::UnknownUnit(id))?;
        let location = unit.mover.position_at(now).unwrap_or_else(|| unit.location());
        let orientation = unit.mover.orientation_at(now).unwrap_or(unit.movement.position.o);
        unit.mover.finish();
        unit.movement.move_flags.remove(MoveFlags::FORWARD);
        let position = Position::from_location(location, orientation);
        self.relocate(id, position)?;

        debug!(target: "mover", unit = ?id, ?location, "unit stopped");
        self.broadcast_around(
            id,
            ServerMessage::MonsterMove {
                mover: id,
                start: location,
                points: Vec::new(),
                duration_ms: 0,
                time: now,
            },
            true,
        );
        Ok(())
    }

    fn cancel_mover_timers(&mut self, id: UnitId) {
        if let Some(unit) = self.units.get(&id) {
            for countdown in unit.mover.countdowns() {
                self.timers.cancel(countdown);
            }
        }
    }

    pub(crate) fn on_mover_update(&mut self, id: UnitId) {
        let now = self.now;
        let interval = self.settings.mover_update_interval_ms.max(1);
        let Some(unit) = self.units.get(&id) else {
            return;
        };
        let Some(location) = unit.mover.position_at(now) else {
            return;
        };
        let orientation = unit.mover.orientation_at(now).unwrap_or(unit.movement.position.o);
        let rearm = unit
            .mover
            .arrives_at()
            .filter(|arrival| now.after_millis(interval) < *arrival)
            .and(unit.mover.update_countdown);

        trace!(target: "mover", unit = ?id, ?location, "interpolated mover position");
        if let Err(err) = self.relocate(id, Position::from_location(location, orientation)) {
            warn_relocation(id, &err);
            return;
        }
        if let Some(countdown) = rearm {
            self.timers.set_end(countdown, now.after_millis(interval));
        }
    }

    pub(crate) fn on_mover_reached(&mut self, id: UnitId) {
        let now = self.now;
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        let Some(target) = unit.mover.target() else {
            return;
        };
        let orientation = unit.mover.orientation_at(now).unwrap_or(unit.movement.position.o);
        unit.mover.finish();
        unit.movement.move_flags.remove(MoveFlags::FORWARD);
        if let Some(update) = unit.mover.update_countdown {
            self.timers.cancel(update);
        }
        if let Err(err) = self.relocate(id, Position::from_location(target, orientation)) {
            warn_relocation(id, &err);
            return;
        }
        debug!(target: "mover", unit = ?id, ?target, "unit reached its target");
        self.reached.push(id);
    }
}

fn warn_relocation(id: UnitId, err: &WorldError) {
    tracing::warn!(target: "mover", unit = ?id, %err, "mover relocation failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(length: f32) -> Vec<Vector3> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(length / 2.0, 0.0, 0.0),
            Vector3::new(length, 0.0, 0.0),
        ]
    }

    #[test]
    fn travel_time_follows_speed() {
        let mut mover = UnitMover::new();
        assert_eq!(mover.start(straight(14.0), 7.0, GameTick(100)), 2_000);
        assert!(mover.is_moving());
        assert_eq!(mover.arrives_at(), Some(GameTick(2_100)));
    }

    #[test]
    fn position_is_interpolated_along_segments() {
        let mut mover = UnitMover::new();
        mover.start(straight(14.0), 7.0, GameTick::ZERO);
        assert_eq!(mover.position_at(GameTick(0)), Some(Vector3::new(0.0, 0.0, 0.0)));
        let half = mover.position_at(GameTick(1_000)).expect("moving");
        assert!((half.x - 7.0).abs() < 1e-3);
        let late = mover.position_at(GameTick(1_500)).expect("moving");
        assert!((late.x - 10.5).abs() < 1e-3);
        assert_eq!(mover.position_at(GameTick(9_000)), Some(Vector3::new(14.0, 0.0, 0.0)));
    }

    #[test]
    fn idle_mover_has_no_position() {
        let mover = UnitMover::new();
        assert!(!mover.is_moving());
        assert_eq!(mover.position_at(GameTick(10)), None);
        assert_eq!(mover.duration_ms(), 0);
    }
}
