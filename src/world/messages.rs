use serde::{Deserialize, Serialize};

use crate::combat::spells::{AuraType, SpellId};
use crate::entities::unit::{ObjectKind, UnitId};
use crate::movement::flags::{MovementInfo, MovementType};
use crate::movement::opcodes::OpCode;
use crate::movement::pending::MovementChange;
use crate::world::position::Vector3;
use crate::world::time::GameTick;

/// What a client needs to create a unit it just started seeing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: UnitId,
    pub kind: ObjectKind,
    pub level: u8,
    pub health: u32,
    pub max_health: u32,
    pub movement: MovementInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    SpawnObjects(Vec<ObjectSnapshot>),
    DestroyObjects(Vec<UnitId>),
    /// Relayed client movement.
    MovementUpdate {
        mover: UnitId,
        opcode: OpCode,
        info: MovementInfo,
    },
    /// Server-driven spline. An empty `points` list stops the unit.
    MonsterMove {
        mover: UnitId,
        start: Vector3,
        points: Vec<Vector3>,
        duration_ms: u64,
        time: GameTick,
    },
    /// Sent to the controlling client only.
    ForceMovementChange {
        mover: UnitId,
        counter: u32,
        change: MovementChange,
    },
    SpeedUpdate {
        mover: UnitId,
        movement_type: MovementType,
        speed: f32,
    },
    AuraUpdate {
        owner: UnitId,
        slot: u8,
        /// `None` clears the slot.
        spell: Option<SpellId>,
        stack_count: u8,
        duration_ms: Option<u64>,
    },
    PeriodicAuraLog {
        owner: UnitId,
        caster: Option<UnitId>,
        spell: SpellId,
        aura: AuraType,
        amount: u32,
        absorbed: u32,
        resisted: u32,
    },
    SpellDamage {
        target: UnitId,
        caster: Option<UnitId>,
        spell: SpellId,
        amount: u32,
        absorbed: u32,
        resisted: u32,
    },
    SpellHeal {
        target: UnitId,
        caster: Option<UnitId>,
        spell: SpellId,
        amount: u32,
    },
    UnitDied {
        unit: UnitId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    pub recipient: UnitId,
    pub message: ServerMessage,
}

/// Messages produced during an update, drained by the session layer.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, recipient: UnitId, message: ServerMessage) {
        self.queue.push(Outgoing { recipient, message });
    }

    pub fn broadcast<I>(&mut self, recipients: I, message: &ServerMessage)
    where
        I: IntoIterator<Item = UnitId>,
    {
        for recipient in recipients {
            self.send(recipient, message.clone());
        }
    }

    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outgoing> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
