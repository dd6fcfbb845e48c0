//! One running map: unit arena, visibility grid, timers and outgoing traffic.
//!
//! All state is owned by [`WorldInstance`] and mutated from a single thread.
//! Units refer to each other through [`UnitId`] handles that are resolved
//! against the arena on every use, so a despawned caster or target simply
//! stops resolving.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::combat::auras::AuraSlotId;
use crate::combat::spells::SpellBook;
use crate::entities::unit::{Unit, UnitId};
use crate::movement::validator::ValidationLimits;
use crate::world::errors::{KickReason, WorldError};
use crate::world::grid::{GridSettings, VisibilityDelta, VisibilityGrid};
use crate::world::messages::{ObjectSnapshot, Outbox, Outgoing, ServerMessage};
use crate::world::pathfinding::Pathfinder;
use crate::world::position::Position;
use crate::world::time::GameTick;
use crate::world::timer::TimerQueue;

/// Tunables of a world instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceSettings {
    pub grid: GridSettings,
    pub limits: ValidationLimits,
    /// A forced change older than this kicks the client.
    pub pending_change_timeout_ms: u64,
    /// Interval at which a moving unit's position is re-derived from its path.
    pub mover_update_interval_ms: u64,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            grid: GridSettings::default(),
            limits: ValidationLimits::default(),
            pending_change_timeout_ms: 5_000,
            mover_update_interval_ms: 500,
        }
    }
}

/// Events carried by the instance timer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldTimer {
    AuraTick {
        owner: UnitId,
        aura: AuraSlotId,
        effect: u8,
    },
    AuraExpire {
        owner: UnitId,
        aura: AuraSlotId,
    },
    MoverUpdate {
        unit: UnitId,
    },
    MoverReached {
        unit: UnitId,
    },
}

pub struct WorldInstance {
    pub(crate) settings: InstanceSettings,
    pub(crate) now: GameTick,
    pub(crate) units: HashMap<UnitId, Unit>,
    pub(crate) grid: VisibilityGrid,
    pub(crate) timers: TimerQueue<WorldTimer>,
    pub(crate) spells: SpellBook,
    pub(crate) pathfinder: Box<dyn Pathfinder>,
    pub(crate) outbox: Outbox,
    pub(crate) reached: Vec<UnitId>,
    /// Set while an aura is re-applied in place; movement state is synced
    /// once afterwards instead of per modifier.
    pub(crate) hold_movement_changes: bool,
    kicks: Vec<(UnitId, KickReason)>,
    kicked: HashSet<UnitId>,
    next_unit_id: u64,
}

impl WorldInstance {
    pub fn new(settings: InstanceSettings, spells: SpellBook, pathfinder: Box<dyn Pathfinder>) -> Self {
        Self {
            settings,
            now: GameTick::ZERO,
            units: HashMap::new(),
            grid: VisibilityGrid::new(settings.grid),
            timers: TimerQueue::new(),
            spells,
            pathfinder,
            outbox: Outbox::new(),
            reached: Vec::new(),
            hold_movement_changes: false,
            kicks: Vec::new(),
            kicked: HashSet::new(),
            next_unit_id: 1,
        }
    }

    pub fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    pub fn now(&self) -> GameTick {
        self.now
    }

    pub fn grid(&self) -> &VisibilityGrid {
        &self.grid
    }

    pub fn spells(&self) -> &SpellBook {
        &self.spells
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn spawn_character(
        &mut self,
        name: impl Into<String>,
        position: Position,
        level: u8,
    ) -> Result<UnitId, WorldError> {
        let id = self.allocate_id();
        self.insert_unit(Unit::new_character(id, name, position, level))
    }

    pub fn spawn_creature(&mut self, entry: u32, position: Position, level: u8) -> Result<UnitId, WorldError> {
        let id = self.allocate_id();
        self.insert_unit(Unit::new_creature(id, entry, position, level))
    }

    fn allocate_id(&mut self) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        id
    }

    fn insert_unit(&mut self, mut unit: Unit) -> Result<UnitId, WorldError> {
        if !unit.position().is_finite() {
            return Err(WorldError::OutOfBounds);
        }
        let tile = self
            .grid
            .tile_position(unit.location())
            .ok_or(WorldError::OutOfBounds)?;
        let id = unit.id;
        let is_watcher = unit.is_character();
        if !self.grid.add_object(id, tile, is_watcher) {
            return Err(WorldError::OutOfBounds);
        }
        unit.tile = Some(tile);
        let snapshot = snapshot(&unit);
        info!(target: "visibility", unit = ?id, name = %unit.name(), ?tile, "unit spawned");
        self.units.insert(id, unit);

        let watchers = self.grid.watchers_in_sight(tile, Some(id));
        self.outbox
            .broadcast(watchers, &ServerMessage::SpawnObjects(vec![snapshot]));
        if is_watcher {
            let visible = self.snapshots(self.grid.objects_in_sight(tile, Some(id)));
            if !visible.is_empty() {
                self.outbox.send(id, ServerMessage::SpawnObjects(visible));
            }
        }
        Ok(id)
    }

    /// Removes a unit with everything it owns. Auras it cast elsewhere that
    /// cannot outlive their caster are removed too.
    pub fn despawn(&mut self, id: UnitId) -> Result<(), WorldError> {
        let unit = self.units.remove(&id).ok_or(WorldError::UnknownUnit(id))?;
        for countdown in unit.mover.countdowns() {
            self.timers.remove(countdown);
        }
        for slot in unit.auras.iter() {
            for countdown in slot.countdowns() {
                self.timers.remove(countdown);
            }
        }
        if let Some(tile) = unit.tile {
            self.grid.remove_object(id, tile);
            let watchers = self.grid.watchers_in_sight(tile, Some(id));
            self.outbox
                .broadcast(watchers, &ServerMessage::DestroyObjects(vec![id]));
        }
        info!(target: "visibility", unit = ?id, "unit despawned");
        self.remove_auras_of_caster(id);
        Ok(())
    }

    /// Moves a unit and sends spawn and destroy messages for everything that
    /// entered or left its sight.
    pub(crate) fn relocate(&mut self, id: UnitId, position: Position) -> Result<(), WorldError> {
        let target = self
            .grid
            .tile_position(position.location())
            .ok_or(WorldError::OutOfBounds)?;
        let unit = self.units.get_mut(&id).ok_or(WorldError::UnknownUnit(id))?;
        unit.movement.position = position;
        let is_watcher = unit.is_character();
        let current = unit.tile;
        unit.tile = Some(target);

        let delta = match current {
            Some(current) if current == target => return Ok(()),
            Some(current) => self
                .grid
                .move_object(id, current, target, is_watcher)
                .ok_or(WorldError::OutOfBounds)?,
            None => {
                self.grid.add_object(id, target, is_watcher);
                return Ok(());
            }
        };
        debug!(target: "visibility", unit = ?id, ?target, new_watchers = delta.new_watchers.len(), lost_watchers = delta.lost_watchers.len(), "unit changed tile");
        self.apply_visibility_delta(id, delta);
        Ok(())
    }

    fn apply_visibility_delta(&mut self, id: UnitId, delta: VisibilityDelta) {
        if let Some(unit) = self.units.get(&id) {
            let spawn = ServerMessage::SpawnObjects(vec![snapshot(unit)]);
            self.outbox.broadcast(delta.new_watchers, &spawn);
        }
        self.outbox
            .broadcast(delta.lost_watchers, &ServerMessage::DestroyObjects(vec![id]));
        if !delta.spawned.is_empty() {
            let spawned = self.snapshots(delta.spawned);
            self.outbox.send(id, ServerMessage::SpawnObjects(spawned));
        }
        if !delta.despawned.is_empty() {
            self.outbox
                .send(id, ServerMessage::DestroyObjects(delta.despawned));
        }
    }

    fn snapshots(&self, ids: Vec<UnitId>) -> Vec<ObjectSnapshot> {
        ids.into_iter()
            .filter_map(|id| self.units.get(&id))
            .map(snapshot)
            .collect()
    }

    /// Sends `message` to every watcher in sight of `id`.
    pub(crate) fn broadcast_around(&mut self, id: UnitId, message: ServerMessage, include_self: bool) {
        let Some(tile) = self.units.get(&id).and_then(|unit| unit.tile) else {
            return;
        };
        let except = if include_self { None } else { Some(id) };
        let watchers = self.grid.watchers_in_sight(tile, except);
        self.outbox.broadcast(watchers, &message);
    }

    /// Records a kick and returns the error for the caller to propagate.
    pub(crate) fn kick(&mut self, id: UnitId, reason: KickReason) -> WorldError {
        warn!(target: "movement", unit = ?id, %reason, "kicking session");
        if self.kicked.insert(id) {
            self.kicks.push((id, reason.clone()));
        }
        WorldError::Kicked(reason)
    }

    pub fn is_kicked(&self, id: UnitId) -> bool {
        self.kicked.contains(&id)
    }

    /// Hands the recorded kicks to the session layer and forgets them.
    pub fn take_kicks(&mut self) -> Vec<(UnitId, KickReason)> {
        let kicks = std::mem::take(&mut self.kicks);
        for (id, _) in &kicks {
            self.kicked.remove(id);
        }
        kicks
    }

    pub fn take_messages(&mut self) -> Vec<Outgoing> {
        self.outbox.drain()
    }

    pub fn messages(&self) -> &Outbox {
        &self.outbox
    }

    /// Units whose server-driven path ended since the last call.
    pub fn take_reached(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.reached)
    }

    /// Advances game time and fires every timer that came due. Returns the
    /// number of fired timers.
    pub fn update(&mut self, now: GameTick) -> usize {
        if now > self.now {
            self.now = now;
        }
        let mut fired = 0;
        while let Some((_, event)) = self.timers.pop_due(self.now) {
            fired += 1;
            match event {
                WorldTimer::AuraTick { owner, aura, effect } => self.on_aura_tick(owner, aura, effect),
                WorldTimer::AuraExpire { owner, aura } => self.on_aura_expired(owner, aura),
                WorldTimer::MoverUpdate { unit } => self.on_mover_update(unit),
                WorldTimer::MoverReached { unit } => self.on_mover_reached(unit),
            }
        }
        fired
    }
}

pub(crate) fn snapshot(unit: &Unit) -> ObjectSnapshot {
    ObjectSnapshot {
        id: unit.id,
        kind: unit.object_kind(),
        level: unit.level,
        health: unit.stats.health,
        max_health: unit.stats.max_health(),
        movement: unit.movement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::pathfinding::DirectPathfinder;

    fn instance() -> WorldInstance {
        let settings = InstanceSettings {
            grid: GridSettings {
                tile_size: 10.0,
                map_size: 200.0,
                sight_radius: 1,
            },
            ..InstanceSettings::default()
        };
        WorldInstance::new(
            settings,
            SpellBook::with_builtin().expect("spells"),
            Box::new(DirectPathfinder::default()),
        )
    }

    fn at(x: f32, y: f32) -> Position {
        Position::new(x, y, 0.0, 0.0)
    }

    fn spawned_for(messages: &[Outgoing], recipient: UnitId) -> Vec<UnitId> {
        messages
            .iter()
            .filter(|out| out.recipient == recipient)
            .filter_map(|out| match &out.message {
                ServerMessage::SpawnObjects(objects) => Some(objects.iter().map(|o| o.id)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn spawning_introduces_units_to_each_other() {
        let mut world = instance();
        let creature = world.spawn_creature(1, at(1.0, 1.0), 5).expect("creature");
        let player = world.spawn_character("A", at(2.0, 2.0), 5).expect("player");
        let messages = world.take_messages();
        assert_eq!(spawned_for(&messages, player), vec![creature]);
        assert!(spawned_for(&messages, creature).is_empty());

        let other = world.spawn_character("B", at(3.0, 3.0), 5).expect("other");
        let messages = world.take_messages();
        assert_eq!(spawned_for(&messages, player), vec![other]);
        let mut seen = spawned_for(&messages, other);
        seen.sort();
        assert_eq!(seen, vec![creature, player]);
    }

    #[test]
    fn out_of_bounds_spawns_fail() {
        let mut world = instance();
        assert_eq!(
            world.spawn_character("A", at(500.0, 0.0), 1),
            Err(WorldError::OutOfBounds)
        );
        assert_eq!(world.unit_count(), 0);
    }

    #[test]
    fn relocation_sends_deltas_only() {
        let mut world = instance();
        let player = world.spawn_character("A", at(-95.0, -95.0), 1).expect("player");
        let far = world.spawn_creature(1, at(-5.0, -95.0), 1).expect("far");
        let near = world.spawn_creature(2, at(-85.0, -95.0), 1).expect("near");
        world.take_messages();

        world.relocate(player, at(-15.0, -95.0)).expect("relocate");
        let messages = world.take_messages();
        assert_eq!(spawned_for(&messages, player), vec![far]);
        let destroyed: Vec<UnitId> = messages
            .iter()
            .filter(|out| out.recipient == player)
            .filter_map(|out| match &out.message {
                ServerMessage::DestroyObjects(ids) => Some(ids.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(destroyed, vec![near]);
    }

    #[test]
    fn despawn_notifies_watchers() {
        let mut world = instance();
        let player = world.spawn_character("A", at(0.0, 0.0), 1).expect("player");
        let creature = world.spawn_creature(1, at(1.0, 0.0), 1).expect("creature");
        world.take_messages();
        world.despawn(creature).expect("despawn");
        let messages = world.take_messages();
        assert_eq!(
            messages,
            vec![Outgoing {
                recipient: player,
                message: ServerMessage::DestroyObjects(vec![creature]),
            }]
        );
        assert_eq!(world.despawn(creature), Err(WorldError::UnknownUnit(creature)));
    }

    #[test]
    fn kicks_are_recorded_once() {
        let mut world = instance();
        let player = world.spawn_character("A", at(0.0, 0.0), 1).expect("player");
        world.kick(player, KickReason::SpeedHack);
        world.kick(player, KickReason::PendingChangeTimeout);
        assert!(world.is_kicked(player));
        assert_eq!(world.take_kicks(), vec![(player, KickReason::SpeedHack)]);
        assert!(world.take_kicks().is_empty());
        assert!(!world.is_kicked(player));
        assert!(world.kicked.is_empty());
    }
}
