//! Aura slots attached to a unit.
//!
//! An [`AuraSpellSlot`] is one application of a spell on a target and owns
//! up to three [`AuraEffect`]s. The slot moves through a small lifecycle:
//! created, applied (modifiers active, timers armed), misapplied (modifiers
//! reverted) and expired. Misapplying twice is a no-op so removal paths that
//! race (dispel during expiration, caster despawn during a tick) stay safe.
//!
//! Side effects that need the rest of the world (timers, stats, movement
//! changes, packets) are driven by the world instance; this module only
//! keeps the bookkeeping.

use serde::{Deserialize, Serialize};

use crate::combat::damage::SpellSchool;
use crate::combat::spells::{
    AuraInterruptFlags, AuraType, DispelType, SpellAttributes, SpellEffectEntry, SpellEffectKind,
    SpellEntry, SpellId,
};
use crate::entities::unit::UnitId;
use crate::world::time::GameTick;
use crate::world::timer::CountdownId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuraSlotId(pub u64);

/// Visible slot value of an aura the client is not told about.
pub const UNASSIGNED_SLOT: u8 = 0xFF;
pub const POSITIVE_SLOT_COUNT: usize = 40;
pub const NEGATIVE_SLOT_COUNT: usize = 16;
const VISIBLE_SLOT_COUNT: usize = POSITIVE_SLOT_COUNT + NEGATIVE_SLOT_COUNT;

#[derive(Debug, Clone, PartialEq)]
pub struct AuraEffect {
    pub index: u8,
    pub entry: SpellEffectEntry,
    points_per_stack: i32,
    /// Current strength including stacks. Absorb effects count down.
    pub base_points: i32,
    pub tick_count: u32,
    /// Ticks until the aura runs out; `u32::MAX` for unlimited auras.
    pub total_ticks: u32,
    pub tick_countdown: Option<CountdownId>,
}

impl AuraEffect {
    pub fn new(index: u8, entry: SpellEffectEntry, points: i32, duration_ms: Option<u64>) -> Self {
        let total_ticks = if entry.aura.is_periodic() && entry.amplitude_ms > 0 {
            match duration_ms {
                Some(duration) => (duration / u64::from(entry.amplitude_ms)).min(u64::from(u32::MAX)) as u32,
                None => u32::MAX,
            }
        } else {
            0
        };
        Self {
            index,
            entry,
            points_per_stack: points,
            base_points: points,
            tick_count: 0,
            total_ticks,
            tick_countdown: None,
        }
    }

    pub fn aura_type(&self) -> AuraType {
        self.entry.aura
    }

    pub fn is_periodic(&self) -> bool {
        self.entry.aura.is_periodic() && self.entry.amplitude_ms > 0
    }

    pub fn amplitude_ms(&self) -> u64 {
        u64::from(self.entry.amplitude_ms)
    }

    pub fn has_ticks_left(&self) -> bool {
        self.tick_count < self.total_ticks
    }

    fn set_stack(&mut self, stack: u8) {
        self.base_points = self.points_per_stack.saturating_mul(i32::from(stack));
    }
}

#[derive(Debug, Clone)]
pub struct AuraSpellSlot {
    id: AuraSlotId,
    owner: UnitId,
    caster: Option<UnitId>,
    /// Level the effects were calculated with.
    caster_level: u8,
    spell: SpellEntry,
    effects: Vec<AuraEffect>,
    stack_count: u8,
    proc_charges: u8,
    applied_at: GameTick,
    slot: u8,
    applied: bool,
    expired: bool,
    pub expire_countdown: Option<CountdownId>,
}

impl AuraSpellSlot {
    /// Builds a slot for `spell` on `owner`. A missing caster uses the
    /// owner's level for effect points.
    pub fn new(
        id: AuraSlotId,
        owner: UnitId,
        owner_level: u8,
        caster: Option<(UnitId, u8)>,
        spell: &SpellEntry,
        now: GameTick,
    ) -> Self {
        let caster_level = caster.map(|(_, level)| level).unwrap_or(owner_level);
        let effects = spell
            .effects
            .iter()
            .enumerate()
            .filter(|(_, effect)| {
                effect.kind == SpellEffectKind::ApplyAura && effect.aura != AuraType::None
            })
            .map(|(index, effect)| {
                let points = effect.calculate_points(spell.base_level, caster_level);
                AuraEffect::new(index as u8, *effect, points, spell.duration_ms)
            })
            .collect();
        Self {
            id,
            owner,
            caster: caster.map(|(id, _)| id),
            caster_level,
            spell: spell.clone(),
            effects,
            stack_count: 1,
            proc_charges: spell.proc_charges,
            applied_at: now,
            slot: UNASSIGNED_SLOT,
            applied: false,
            expired: false,
            expire_countdown: None,
        }
    }

    pub fn id(&self) -> AuraSlotId {
        self.id
    }

    pub fn owner(&self) -> UnitId {
        self.owner
    }

    pub fn caster(&self) -> Option<UnitId> {
        self.caster
    }

    pub fn caster_level(&self) -> u8 {
        self.caster_level
    }

    pub fn spell(&self) -> &SpellEntry {
        &self.spell
    }

    pub fn spell_id(&self) -> SpellId {
        self.spell.id
    }

    pub fn school(&self) -> SpellSchool {
        self.spell.school
    }

    pub fn is_positive(&self) -> bool {
        self.spell.is_positive()
    }

    pub fn is_passive(&self) -> bool {
        self.spell.has_attribute(SpellAttributes::PASSIVE)
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn stack_count(&self) -> u8 {
        self.stack_count
    }

    pub fn proc_charges(&self) -> u8 {
        self.proc_charges
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn effects(&self) -> &[AuraEffect] {
        &self.effects
    }

    pub fn effect(&self, index: u8) -> Option<&AuraEffect> {
        self.effects.iter().find(|effect| effect.index == index)
    }

    pub fn effect_mut(&mut self, index: u8) -> Option<&mut AuraEffect> {
        self.effects.iter_mut().find(|effect| effect.index == index)
    }

    pub fn effects_mut(&mut self) -> impl Iterator<Item = &mut AuraEffect> {
        self.effects.iter_mut()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.spell.duration_ms
    }

    pub fn applied_at(&self) -> GameTick {
        self.applied_at
    }

    pub fn ends_at(&self) -> Option<GameTick> {
        self.spell.duration_ms.map(|ms| self.applied_at.after_millis(ms))
    }

    pub fn remaining_ms(&self, now: GameTick) -> Option<u64> {
        self.ends_at().map(|end| end.saturating_since(now))
    }

    pub fn has_interrupt(&self, flags: AuraInterruptFlags) -> bool {
        self.spell.interrupt_flags.intersects(flags)
    }

    /// True when an effect of this aura stops working without its caster.
    pub fn requires_caster(&self) -> bool {
        self.effects
            .iter()
            .any(|effect| effect.aura_type().requires_caster())
    }

    /// Marks the slot applied. Returns `false` if it already was.
    pub fn begin_apply(&mut self) -> bool {
        if self.applied {
            return false;
        }
        self.applied = true;
        true
    }

    /// Marks the slot misapplied. Returns `false` if it was not applied,
    /// so a second misapply changes nothing.
    pub fn begin_misapply(&mut self) -> bool {
        if !self.applied {
            return false;
        }
        self.applied = false;
        true
    }

    /// Returns `false` if the slot had already expired.
    pub fn mark_expired(&mut self) -> bool {
        if self.expired {
            return false;
        }
        self.expired = true;
        true
    }

    /// Adds a stack up to the spell's maximum. Returns `false` at the cap.
    pub fn add_stack(&mut self) -> bool {
        if self.stack_count >= self.spell.max_stack {
            return false;
        }
        self.stack_count += 1;
        let stack = self.stack_count;
        for effect in &mut self.effects {
            effect.set_stack(stack);
        }
        true
    }

    /// Restarts duration and periodic counters, taking over `caster`.
    pub fn refresh(&mut self, caster: Option<UnitId>, now: GameTick) {
        self.caster = caster;
        self.applied_at = now;
        self.expired = false;
        self.proc_charges = self.spell.proc_charges;
        for effect in &mut self.effects {
            effect.tick_count = 0;
        }
    }

    /// Consumes a proc charge. Returns `true` when the last one was used.
    pub fn drop_charge(&mut self) -> bool {
        if self.proc_charges == 0 {
            return false;
        }
        self.proc_charges -= 1;
        self.proc_charges == 0
    }

    /// Every countdown this slot may have armed.
    pub fn countdowns(&self) -> Vec<CountdownId> {
        self.expire_countdown
            .into_iter()
            .chain(self.effects.iter().filter_map(|effect| effect.tick_countdown))
            .collect()
    }
}

/// Whether a new application of `spell` by `caster` replaces `existing`
/// instead of living next to it.
pub fn should_overwrite_aura(existing: &AuraSpellSlot, spell: &SpellEntry, caster: Option<UnitId>) -> bool {
    if existing.spell_id() != spell.id {
        return false;
    }
    if spell.dispel == DispelType::Curse {
        return true;
    }
    if existing.caster() == caster {
        return true;
    }
    !spell.has_attribute(SpellAttributes::STACK_PER_CASTER)
}

/// Result of feeding damage through absorb effects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsorbOutcome {
    pub absorbed: u32,
    /// Slots whose absorb pool ran dry.
    pub depleted: Vec<AuraSlotId>,
}

#[derive(Debug, Clone)]
pub struct AuraContainer {
    slots: Vec<AuraSpellSlot>,
    next_id: u64,
    visible: [Option<AuraSlotId>; VISIBLE_SLOT_COUNT],
}

impl Default for AuraContainer {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 1,
            visible: [None; VISIBLE_SLOT_COUNT],
        }
    }
}

impl AuraContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_slot_id(&mut self) -> AuraSlotId {
        let id = AuraSlotId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Stores a slot and hands it a visible slot when one is free.
    pub fn insert(&mut self, mut slot: AuraSpellSlot) -> AuraSlotId {
        let id = slot.id;
        if !slot.is_passive() {
            slot.slot = self.assign_visible_slot(id, slot.is_positive());
        }
        self.slots.push(slot);
        id
    }

    fn assign_visible_slot(&mut self, id: AuraSlotId, positive: bool) -> u8 {
        let range = if positive {
            0..POSITIVE_SLOT_COUNT
        } else {
            POSITIVE_SLOT_COUNT..VISIBLE_SLOT_COUNT
        };
        for index in range {
            if self.visible[index].is_none() {
                self.visible[index] = Some(id);
                return index as u8;
            }
        }
        UNASSIGNED_SLOT
    }

    pub fn remove(&mut self, id: AuraSlotId) -> Option<AuraSpellSlot> {
        let position = self.slots.iter().position(|slot| slot.id == id)?;
        let slot = self.slots.remove(position);
        if let Some(visible) = self.visible.get_mut(usize::from(slot.slot)) {
            if *visible == Some(id) {
                *visible = None;
            }
        }
        Some(slot)
    }

    pub fn get(&self, id: AuraSlotId) -> Option<&AuraSpellSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    pub fn get_mut(&mut self, id: AuraSlotId) -> Option<&mut AuraSpellSlot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuraSpellSlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> Vec<AuraSlotId> {
        self.slots.iter().map(|slot| slot.id).collect()
    }

    pub fn has_spell(&self, spell: SpellId) -> bool {
        self.slots.iter().any(|slot| slot.spell_id() == spell)
    }

    pub fn find_overwritable(&self, spell: &SpellEntry, caster: Option<UnitId>) -> Option<AuraSlotId> {
        self.slots
            .iter()
            .find(|slot| should_overwrite_aura(slot, spell, caster))
            .map(|slot| slot.id)
    }

    pub fn ids_with_interrupt(&self, flags: AuraInterruptFlags) -> Vec<AuraSlotId> {
        self.slots
            .iter()
            .filter(|slot| slot.has_interrupt(flags))
            .map(|slot| slot.id)
            .collect()
    }

    pub fn ids_cast_by(&self, caster: UnitId) -> Vec<AuraSlotId> {
        self.slots
            .iter()
            .filter(|slot| slot.caster == Some(caster))
            .map(|slot| slot.id)
            .collect()
    }

    pub fn ids_of_spell(&self, spell: SpellId) -> Vec<AuraSlotId> {
        self.slots
            .iter()
            .filter(|slot| slot.spell_id() == spell)
            .map(|slot| slot.id)
            .collect()
    }

    /// Dispellable slots of `dispel`, oldest first.
    pub fn ids_dispellable(&self, dispel: DispelType, positive: bool) -> Vec<AuraSlotId> {
        self.slots
            .iter()
            .filter(|slot| {
                slot.spell.dispel == dispel
                    && dispel != DispelType::None
                    && slot.is_positive() == positive
                    && !slot.spell.has_attribute(SpellAttributes::CANNOT_BE_DISPELLED)
            })
            .map(|slot| slot.id)
            .collect()
    }

    /// Soaks `amount` of `school` damage with applied absorb effects, oldest
    /// aura first.
    pub fn absorb(&mut self, school: SpellSchool, amount: u32) -> AbsorbOutcome {
        let mut outcome = AbsorbOutcome::default();
        let mut remaining = amount;
        for slot in self.slots.iter_mut().filter(|slot| slot.applied) {
            if remaining == 0 {
                break;
            }
            let mut depleted = false;
            for effect in slot.effects.iter_mut() {
                if effect.aura_type() != AuraType::SchoolAbsorb
                    || (effect.entry.misc_value as u32) & school.mask() == 0
                    || effect.base_points <= 0
                {
                    continue;
                }
                let soaked = remaining.min(effect.base_points as u32);
                effect.base_points -= soaked as i32;
                remaining -= soaked;
                outcome.absorbed += soaked;
                if effect.base_points == 0 {
                    depleted = true;
                }
                if remaining == 0 {
                    break;
                }
            }
            if depleted {
                outcome.depleted.push(slot.id);
            }
        }
        outcome
    }
}
