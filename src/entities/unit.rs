use serde::{Deserialize, Serialize};

use crate::combat::auras::AuraContainer;
use crate::entities::stats::UnitStats;
use crate::movement::flags::{MoveFlags, MovementInfo, MovementType};
use crate::movement::pending::{MovementChange, PendingMovementChanges};
use crate::world::grid::TileIndex;
use crate::world::mover::UnitMover;
use crate::world::position::{Position, Vector3};

/// Handle of a unit inside a world instance. Holding one keeps nothing
/// alive; look the unit up again before every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u64);

impl UnitId {
    pub fn guid(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterData {
    pub name: String,
    pub map_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureData {
    pub entry: u32,
    pub home: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitKind {
    Character(CharacterData),
    Creature(CreatureData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Character,
    Creature,
}

/// State toggled by counted auras: the first aura turns it on, the last
/// one removed turns it off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementAura {
    Root,
    Hover,
    WaterWalk,
    FeatherFall,
    Fly,
}

impl MovementAura {
    pub const ALL: [MovementAura; 5] = [
        MovementAura::Root,
        MovementAura::Hover,
        MovementAura::WaterWalk,
        MovementAura::FeatherFall,
        MovementAura::Fly,
    ];

    fn index(self) -> usize {
        match self {
            MovementAura::Root => 0,
            MovementAura::Hover => 1,
            MovementAura::WaterWalk => 2,
            MovementAura::FeatherFall => 3,
            MovementAura::Fly => 4,
        }
    }

    /// Forced change that tells a client about the new state.
    pub fn change(self, apply: bool) -> MovementChange {
        match self {
            MovementAura::Root => MovementChange::Root { apply },
            MovementAura::Hover => MovementChange::Hover { apply },
            MovementAura::WaterWalk => MovementChange::WaterWalk { apply },
            MovementAura::FeatherFall => MovementChange::FeatherFall { apply },
            MovementAura::Fly => MovementChange::CanFly { apply },
        }
    }

    /// Flags a server-driven unit carries while the state is on.
    pub fn flags(self) -> MoveFlags {
        match self {
            MovementAura::Root => MoveFlags::ROOT,
            MovementAura::Hover => MoveFlags::HOVER,
            MovementAura::WaterWalk => MoveFlags::WATER_WALKING,
            MovementAura::FeatherFall => MoveFlags::SAFE_FALL,
            MovementAura::Fly => MoveFlags::CAN_FLY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub level: u8,
    pub stats: UnitStats,
    /// Last movement state the server accepted.
    pub movement: MovementInfo,
    pub pending: PendingMovementChanges,
    pub auras: AuraContainer,
    pub mover: UnitMover,
    pub tile: Option<TileIndex>,
    speeds: [f32; MovementType::COUNT],
    speed_percent: [i32; MovementType::COUNT],
    movement_auras: [u32; 5],
}

impl Unit {
    pub fn new_character(id: UnitId, name: impl Into<String>, position: Position, level: u8) -> Self {
        Self::new(
            id,
            UnitKind::Character(CharacterData {
                name: name.into(),
                map_id: 0,
            }),
            position,
            level,
        )
    }

    pub fn new_creature(id: UnitId, entry: u32, position: Position, level: u8) -> Self {
        Self::new(
            id,
            UnitKind::Creature(CreatureData {
                entry,
                home: position,
            }),
            position,
            level,
        )
    }

    fn new(id: UnitId, kind: UnitKind, position: Position, level: u8) -> Self {
        let mut speeds = [0.0; MovementType::COUNT];
        for movement_type in MovementType::ALL {
            speeds[movement_type.index()] = movement_type.base_speed();
        }
        Self {
            id,
            kind,
            level,
            stats: UnitStats::for_level(level),
            movement: MovementInfo::at(position, 0),
            pending: PendingMovementChanges::new(),
            auras: AuraContainer::new(),
            mover: UnitMover::new(),
            tile: None,
            speeds,
            speed_percent: [0; MovementType::COUNT],
            movement_auras: [0; 5],
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self.kind, UnitKind::Character(_))
    }

    pub fn is_creature(&self) -> bool {
        matches!(self.kind, UnitKind::Creature(_))
    }

    pub fn object_kind(&self) -> ObjectKind {
        match self.kind {
            UnitKind::Character(_) => ObjectKind::Character,
            UnitKind::Creature(_) => ObjectKind::Creature,
        }
    }

    pub fn name(&self) -> String {
        match &self.kind {
            UnitKind::Character(data) => data.name.clone(),
            UnitKind::Creature(data) => format!("creature#{}", data.entry),
        }
    }

    pub fn position(&self) -> Position {
        self.movement.position
    }

    pub fn location(&self) -> Vector3 {
        self.movement.location()
    }

    pub fn is_alive(&self) -> bool {
        self.stats.is_alive()
    }

    /// Speed currently in effect (acknowledged by the client for characters).
    pub fn speed(&self, movement_type: MovementType) -> f32 {
        self.speeds[movement_type.index()]
    }

    pub fn set_speed(&mut self, movement_type: MovementType, speed: f32) {
        self.speeds[movement_type.index()] = speed.max(0.0);
    }

    /// Speed the unit should have with its current modifiers.
    pub fn target_speed(&self, movement_type: MovementType) -> f32 {
        let percent = self.speed_percent[movement_type.index()].max(-100);
        movement_type.base_speed() * (100 + percent) as f32 / 100.0
    }

    pub fn add_speed_percent(&mut self, movement_type: MovementType, percent: i32, apply: bool) {
        let delta = if apply { percent } else { -percent };
        let slot = &mut self.speed_percent[movement_type.index()];
        *slot = slot.saturating_add(delta);
    }

    /// Fastest speed the unit may legitimately use right now. While speed
    /// changes are waiting for an ack the client may already use any of them.
    pub fn allowed_speed(&self, movement_type: MovementType) -> f32 {
        self.pending
            .iter()
            .filter_map(|pending| match pending.change {
                MovementChange::Speed {
                    movement_type: pending_type,
                    speed,
                } if pending_type == movement_type => Some(speed),
                _ => None,
            })
            .fold(self.speed(movement_type), f32::max)
    }

    /// Speed the client will end up with once every pending change is acked.
    pub fn intended_speed(&self, movement_type: MovementType) -> f32 {
        self.pending
            .iter()
            .filter_map(|pending| match pending.change {
                MovementChange::Speed {
                    movement_type: pending_type,
                    speed,
                } if pending_type == movement_type => Some(speed),
                _ => None,
            })
            .last()
            .unwrap_or_else(|| self.speed(movement_type))
    }

    /// Updates the aura counter. Returns `true` when the state flipped.
    pub fn toggle_movement_aura(&mut self, aura: MovementAura, apply: bool) -> bool {
        let counter = &mut self.movement_auras[aura.index()];
        if apply {
            *counter += 1;
            *counter == 1
        } else if *counter == 0 {
            false
        } else {
            *counter -= 1;
            *counter == 0
        }
    }

    pub fn has_movement_aura(&self, aura: MovementAura) -> bool {
        self.movement_auras[aura.index()] > 0
    }

    pub fn is_rooted(&self) -> bool {
        self.has_movement_aura(MovementAura::Root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::time::GameTick;

    fn character() -> Unit {
        Unit::new_character(UnitId(1), "Tester", Position::new(0.0, 0.0, 0.0, 0.0), 10)
    }

    #[test]
    fn new_units_use_base_speeds() {
        let unit = character();
        assert_eq!(unit.speed(MovementType::Run), 7.0);
        assert_eq!(unit.target_speed(MovementType::Run), 7.0);
        assert!(unit.is_character());
        assert_eq!(unit.name(), "Tester");
    }

    #[test]
    fn speed_modifiers_are_reversible() {
        let mut unit = character();
        unit.add_speed_percent(MovementType::Run, 50, true);
        unit.add_speed_percent(MovementType::Run, -50, true);
        assert_eq!(unit.target_speed(MovementType::Run), 7.0);
        unit.add_speed_percent(MovementType::Run, -50, false);
        assert!((unit.target_speed(MovementType::Run) - 10.5).abs() < 1e-4);
    }

    #[test]
    fn allowed_speed_includes_pending_changes() {
        let mut unit = character();
        unit.pending.push(
            MovementChange::Speed {
                movement_type: MovementType::Run,
                speed: 14.0,
            },
            GameTick::ZERO,
        );
        assert_eq!(unit.speed(MovementType::Run), 7.0);
        assert_eq!(unit.allowed_speed(MovementType::Run), 14.0);
        assert_eq!(unit.allowed_speed(MovementType::Walk), 2.5);
    }

    #[test]
    fn movement_auras_flip_on_first_and_last() {
        let mut unit = character();
        assert!(unit.toggle_movement_aura(MovementAura::Root, true));
        assert!(!unit.toggle_movement_aura(MovementAura::Root, true));
        assert!(!unit.toggle_movement_aura(MovementAura::Root, false));
        assert!(unit.is_rooted());
        assert!(unit.toggle_movement_aura(MovementAura::Root, false));
        assert!(!unit.toggle_movement_aura(MovementAura::Root, false));
        assert!(!unit.is_rooted());
    }
}
