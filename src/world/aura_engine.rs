//! Spell casting and the aura lifecycle on top of the world instance.

use tracing::{debug, trace, warn};

use crate::combat::auras::{AuraSlotId, AuraSpellSlot, UNASSIGNED_SLOT};
use crate::combat::damage::{mitigate, SpellSchool};
use crate::combat::spells::{AuraInterruptFlags, AuraType, DispelType, SpellEffectKind, SpellId};
use crate::entities::stats::{ModifierKind, Stat, UnitMod};
use crate::entities::unit::{MovementAura, UnitId};
use crate::movement::flags::MovementType;
use crate::movement::pending::MovementChange;
use crate::world::errors::WorldError;
use crate::world::instance::{WorldInstance, WorldTimer};
use crate::world::messages::ServerMessage;

/// Damage after mitigation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageOutcome {
    pub dealt: u32,
    pub absorbed: u32,
    pub resisted: u32,
    pub killed: bool,
}

#[derive(Debug, Clone, Copy)]
struct PeriodicTick {
    owner: UnitId,
    aura: AuraSlotId,
    caster: Option<UnitId>,
    owner_level: u8,
    spell: SpellId,
    school: SpellSchool,
    aura_type: AuraType,
    points: i32,
    multiple_value: f32,
    trigger_spell: Option<SpellId>,
}

#[derive(Debug, Clone, Copy)]
struct EffectModifier {
    aura_type: AuraType,
    misc_value: i32,
    points: i32,
}

const SLOWED_TYPES: [MovementType; 7] = [
    MovementType::Walk,
    MovementType::Run,
    MovementType::Backwards,
    MovementType::Swim,
    MovementType::SwimBackwards,
    MovementType::Flight,
    MovementType::FlightBackwards,
];

impl WorldInstance {
    /// Runs every effect of `spell_id` from `caster` on `target`.
    pub fn cast_spell(&mut self, caster: UnitId, target: UnitId, spell_id: SpellId) -> Result<(), WorldError> {
        let spell = self
            .spells
            .get(spell_id)
            .cloned()
            .ok_or(WorldError::UnknownSpell(spell_id))?;
        let caster_level = self
            .units
            .get(&caster)
            .map(|unit| unit.level)
            .ok_or(WorldError::UnknownUnit(caster))?;
        if !self.units.contains_key(&target) {
            return Err(WorldError::UnknownUnit(target));
        }
        debug!(target: "aura", ?caster, ?target, spell = %spell.name, "casting spell");

        for effect in &spell.effects {
            let points = effect
                .calculate_points(spell.base_level, caster_level)
                .max(0) as u32;
            match effect.kind {
                SpellEffectKind::SchoolDamage => {
                    let outcome = self.damage_unit(Some(caster), target, spell.school, points, caster_level);
                    self.broadcast_around(
                        target,
                        ServerMessage::SpellDamage {
                            target,
                            caster: Some(caster),
                            spell: spell_id,
                            amount: outcome.dealt,
                            absorbed: outcome.absorbed,
                            resisted: outcome.resisted,
                        },
                        true,
                    );
                }
                SpellEffectKind::Heal => {
                    let healed = self
                        .units
                        .get_mut(&target)
                        .map(|unit| unit.stats.apply_heal(points))
                        .unwrap_or(0);
                    self.broadcast_around(
                        target,
                        ServerMessage::SpellHeal {
                            target,
                            caster: Some(caster),
                            spell: spell_id,
                            amount: healed,
                        },
                        true,
                    );
                }
                SpellEffectKind::Energize => {
                    if let Some(unit) = self.units.get_mut(&target) {
                        unit.stats.energize(points);
                    }
                }
                SpellEffectKind::ApplyAura => {}
            }
        }

        let target_alive = self.units.get(&target).map(|unit| unit.is_alive()).unwrap_or(false);
        if spell.has_aura_effects() && target_alive {
            self.apply_aura(Some(caster), target, spell_id)?;
        }
        Ok(())
    }

    /// Puts the aura part of `spell_id` on `target`, replacing, refreshing or
    /// stacking an existing application as the stacking rules say. A caster
    /// that no longer exists is treated as no caster.
    pub fn apply_aura(
        &mut self,
        caster: Option<UnitId>,
        target: UnitId,
        spell_id: SpellId,
    ) -> Result<AuraSlotId, WorldError> {
        let spell = self
            .spells
            .get(spell_id)
            .cloned()
            .ok_or(WorldError::UnknownSpell(spell_id))?;
        let caster = caster.and_then(|id| self.units.get(&id).map(|unit| (id, unit.level)));
        let caster_id = caster.map(|(id, _)| id);
        let now = self.now;

        let unit = self.units.get_mut(&target).ok_or(WorldError::UnknownUnit(target))?;
        let mut held_auras = None;
        let aura = match unit.auras.find_overwritable(&spell, caster_id) {
            Some(existing) => {
                held_auras = Some(MovementAura::ALL.map(|aura| unit.has_movement_aura(aura)));
                self.hold_movement_changes = true;
                self.misapply_aura_effects(target, existing);
                if let Some(slot) = self
                    .units
                    .get_mut(&target)
                    .and_then(|unit| unit.auras.get_mut(existing))
                {
                    if spell.max_stack > 1 {
                        slot.add_stack();
                    }
                    slot.refresh(caster_id, now);
                    debug!(target: "aura", owner = ?target, spell = %spell.name, stacks = slot.stack_count(), "aura refreshed");
                }
                existing
            }
            None => {
                let id = unit.auras.next_slot_id();
                let slot = AuraSpellSlot::new(id, target, unit.level, caster, &spell, now);
                unit.auras.insert(slot);
                debug!(target: "aura", owner = ?target, caster = ?caster_id, spell = %spell.name, "aura added");
                id
            }
        };
        self.apply_aura_effects(target, aura);
        if let Some(before) = held_auras {
            self.hold_movement_changes = false;
            self.sync_movement_state(target, before);
        }
        self.send_aura_update(target, aura);
        Ok(aura)
    }

    /// Pushes the movement changes that a re-application left behind: a
    /// counted state that ended up different and speeds that moved.
    fn sync_movement_state(&mut self, owner: UnitId, before: [bool; 5]) {
        let Some(unit) = self.units.get(&owner) else {
            return;
        };
        let mut changes = Vec::new();
        for (aura, was_active) in MovementAura::ALL.into_iter().zip(before) {
            let active = unit.has_movement_aura(aura);
            if active != was_active {
                changes.push(aura.change(active));
            }
        }
        for movement_type in MovementType::ALL {
            let speed = unit.target_speed(movement_type);
            if (speed - unit.intended_speed(movement_type)).abs() > f32::EPSILON {
                changes.push(MovementChange::Speed { movement_type, speed });
            }
        }
        for change in changes {
            if let Err(err) = self.push_movement_change(owner, change) {
                warn!(target: "aura", ?owner, %err, "movement state change failed");
            }
        }
    }

    fn send_aura_update(&mut self, owner: UnitId, aura: AuraSlotId) {
        let now = self.now;
        let Some(slot) = self.units.get(&owner).and_then(|unit| unit.auras.get(aura)) else {
            return;
        };
        if slot.slot() == UNASSIGNED_SLOT {
            return;
        }
        let message = ServerMessage::AuraUpdate {
            owner,
            slot: slot.slot(),
            spell: Some(slot.spell_id()),
            stack_count: slot.stack_count(),
            duration_ms: slot.remaining_ms(now),
        };
        self.broadcast_around(owner, message, true);
    }

    /// Activates modifiers and arms timers. A slot that is already applied
    /// is left alone.
    fn apply_aura_effects(&mut self, owner: UnitId, aura: AuraSlotId) {
        let now = self.now;
        let Some(unit) = self.units.get_mut(&owner) else {
            return;
        };
        let Some(slot) = unit.auras.get_mut(aura) else {
            return;
        };
        if !slot.begin_apply() {
            warn!(target: "aura", ?owner, ?aura, "aura applied twice");
            return;
        }
        if let Some(duration) = slot.duration_ms() {
            let countdown = *slot
                .expire_countdown
                .get_or_insert_with(|| self.timers.create(WorldTimer::AuraExpire { owner, aura }));
            self.timers.set_end(countdown, now.after_millis(duration));
        }
        let mut modifiers = Vec::new();
        for effect in slot.effects_mut() {
            if effect.is_periodic() {
                let index = effect.index;
                let countdown = *effect.tick_countdown.get_or_insert_with(|| {
                    self.timers.create(WorldTimer::AuraTick {
                        owner,
                        aura,
                        effect: index,
                    })
                });
                self.timers
                    .set_end(countdown, now.after_millis(effect.amplitude_ms()));
            }
            modifiers.push(EffectModifier {
                aura_type: effect.aura_type(),
                misc_value: effect.entry.misc_value,
                points: effect.base_points,
            });
        }
        for modifier in modifiers {
            self.set_effect_modifier(owner, modifier, true);
        }
    }

    /// Reverts modifiers and disarms timers. Misapplying a slot that is not
    /// applied does nothing, so every removal path may call this.
    fn misapply_aura_effects(&mut self, owner: UnitId, aura: AuraSlotId) {
        let Some(slot) = self
            .units
            .get_mut(&owner)
            .and_then(|unit| unit.auras.get_mut(aura))
        else {
            return;
        };
        if !slot.begin_misapply() {
            trace!(target: "aura", ?owner, ?aura, "aura already misapplied");
            return;
        }
        for countdown in slot.countdowns() {
            self.timers.cancel(countdown);
        }
        let modifiers: Vec<EffectModifier> = slot
            .effects()
            .iter()
            .map(|effect| EffectModifier {
                aura_type: effect.aura_type(),
                misc_value: effect.entry.misc_value,
                points: effect.base_points,
            })
            .collect();
        for modifier in modifiers {
            self.set_effect_modifier(owner, modifier, false);
        }
    }

    fn set_effect_modifier(&mut self, owner: UnitId, modifier: EffectModifier, apply: bool) {
        let Some(unit) = self.units.get_mut(&owner) else {
            return;
        };
        let points = modifier.points;
        match modifier.aura_type {
            AuraType::ModStat => {
                if modifier.misc_value < 0 {
                    for index in 0..Stat::COUNT as i32 {
                        if let Some(stat) = Stat::from_index(index) {
                            unit.stats
                                .apply_modifier(UnitMod::Stat(stat), ModifierKind::Flat, points, apply);
                        }
                    }
                } else if let Some(stat) = Stat::from_index(modifier.misc_value) {
                    unit.stats
                        .apply_modifier(UnitMod::Stat(stat), ModifierKind::Flat, points, apply);
                }
            }
            AuraType::ModResistance => {
                for school in SpellSchool::ALL {
                    if (modifier.misc_value as u32) & school.mask() != 0 {
                        unit.stats.apply_modifier(
                            UnitMod::Resistance(school),
                            ModifierKind::Flat,
                            points,
                            apply,
                        );
                    }
                }
            }
            AuraType::ModIncreaseHealth => {
                unit.stats
                    .apply_modifier(UnitMod::Health, ModifierKind::Flat, points, apply);
            }
            AuraType::ModArmor => {
                unit.stats
                    .apply_modifier(UnitMod::Armor, ModifierKind::Flat, points, apply);
            }
            AuraType::ModIncreaseSpeed => self.modify_speeds(owner, &[MovementType::Run], points, apply),
            AuraType::ModDecreaseSpeed => self.modify_speeds(owner, &SLOWED_TYPES, points, apply),
            AuraType::ModIncreaseSwimSpeed => self.modify_speeds(owner, &[MovementType::Swim], points, apply),
            AuraType::ModIncreaseFlightSpeed => {
                self.modify_speeds(owner, &[MovementType::Flight], points, apply)
            }
            AuraType::ModRoot => self.toggle_movement_aura(owner, MovementAura::Root, apply),
            AuraType::Hover => self.toggle_movement_aura(owner, MovementAura::Hover, apply),
            AuraType::WaterWalk => self.toggle_movement_aura(owner, MovementAura::WaterWalk, apply),
            AuraType::FeatherFall => self.toggle_movement_aura(owner, MovementAura::FeatherFall, apply),
            AuraType::Fly => self.toggle_movement_aura(owner, MovementAura::Fly, apply),
            AuraType::None
            | AuraType::PeriodicDamage
            | AuraType::PeriodicHeal
            | AuraType::PeriodicEnergize
            | AuraType::PeriodicLeech
            | AuraType::PeriodicTriggerSpell
            | AuraType::SchoolAbsorb => {}
        }
    }

    fn modify_speeds(&mut self, owner: UnitId, types: &[MovementType], percent: i32, apply: bool) {
        let mut changes = Vec::new();
        if let Some(unit) = self.units.get_mut(&owner) {
            for movement_type in types {
                unit.add_speed_percent(*movement_type, percent, apply);
                let speed = unit.target_speed(*movement_type);
                if !self.hold_movement_changes
                    && (speed - unit.intended_speed(*movement_type)).abs() > f32::EPSILON
                {
                    changes.push(MovementChange::Speed {
                        movement_type: *movement_type,
                        speed,
                    });
                }
            }
        }
        for change in changes {
            if let Err(err) = self.push_movement_change(owner, change) {
                warn!(target: "aura", ?owner, %err, "speed change failed");
            }
        }
    }

    fn toggle_movement_aura(&mut self, owner: UnitId, aura: MovementAura, apply: bool) {
        let flipped = self
            .units
            .get_mut(&owner)
            .map(|unit| unit.toggle_movement_aura(aura, apply))
            .unwrap_or(false);
        if !flipped || self.hold_movement_changes {
            return;
        }
        if let Err(err) = self.push_movement_change(owner, aura.change(apply)) {
            warn!(target: "aura", ?owner, ?aura, %err, "movement state change failed");
        }
    }

    /// Removes an aura slot. Removing an unknown slot is not an error.
    pub fn remove_aura(&mut self, owner: UnitId, aura: AuraSlotId) -> Result<(), WorldError> {
        if !self.units.contains_key(&owner) {
            return Err(WorldError::UnknownUnit(owner));
        }
        self.misapply_aura_effects(owner, aura);
        let Some(slot) = self
            .units
            .get_mut(&owner)
            .and_then(|unit| unit.auras.remove(aura))
        else {
            return Ok(());
        };
        for countdown in slot.countdowns() {
            self.timers.remove(countdown);
        }
        debug!(target: "aura", ?owner, spell = %slot.spell().name, "aura removed");
        if slot.slot() != UNASSIGNED_SLOT {
            self.broadcast_around(
                owner,
                ServerMessage::AuraUpdate {
                    owner,
                    slot: slot.slot(),
                    spell: None,
                    stack_count: 0,
                    duration_ms: None,
                },
                true,
            );
        }
        Ok(())
    }

    /// Removes every aura of `spell` on `owner`. Returns how many were removed.
    pub fn remove_auras_by_spell(&mut self, owner: UnitId, spell: SpellId) -> Result<usize, WorldError> {
        let ids = self
            .units
            .get(&owner)
            .map(|unit| unit.auras.ids_of_spell(spell))
            .ok_or(WorldError::UnknownUnit(owner))?;
        for id in &ids {
            self.remove_aura(owner, *id)?;
        }
        Ok(ids.len())
    }

    /// Player-initiated removal; harmful auras cannot be cancelled.
    pub fn cancel_aura(&mut self, owner: UnitId, spell: SpellId) -> Result<bool, WorldError> {
        let positive = self
            .spells
            .get(spell)
            .map(|entry| entry.is_positive())
            .ok_or(WorldError::UnknownSpell(spell))?;
        if !positive {
            return Ok(false);
        }
        Ok(self.remove_auras_by_spell(owner, spell)? > 0)
    }

    /// Removes up to `count` auras of `dispel` type, oldest first.
    pub fn dispel(
        &mut self,
        owner: UnitId,
        dispel: DispelType,
        positive: bool,
        count: usize,
    ) -> Result<usize, WorldError> {
        let ids = self
            .units
            .get(&owner)
            .map(|unit| unit.auras.ids_dispellable(dispel, positive))
            .ok_or(WorldError::UnknownUnit(owner))?;
        let removed: Vec<AuraSlotId> = ids.into_iter().take(count).collect();
        for id in &removed {
            self.remove_aura(owner, *id)?;
        }
        debug!(target: "aura", ?owner, ?dispel, removed = removed.len(), "dispelled auras");
        Ok(removed.len())
    }

    /// Drops auras that need their caster once the caster is gone.
    pub(crate) fn remove_auras_of_caster(&mut self, caster: UnitId) {
        let doomed: Vec<(UnitId, AuraSlotId)> = self
            .units
            .values()
            .flat_map(|unit| {
                unit.auras
                    .iter()
                    .filter(|slot| slot.caster() == Some(caster) && slot.requires_caster())
                    .map(move |slot| (unit.id, slot.id()))
            })
            .collect();
        for (owner, aura) in doomed {
            let _ = self.remove_aura(owner, aura);
        }
    }

    pub(crate) fn interrupt_auras(&mut self, owner: UnitId, flags: AuraInterruptFlags) {
        let ids = match self.units.get(&owner) {
            Some(unit) => unit.auras.ids_with_interrupt(flags),
            None => return,
        };
        for id in ids {
            trace!(target: "aura", ?owner, ?flags, "aura interrupted");
            let _ = self.remove_aura(owner, id);
        }
    }

    /// Deals `amount` of `school` damage after armor or resistance and
    /// absorbs.
    pub fn damage_unit(
        &mut self,
        attacker: Option<UnitId>,
        target: UnitId,
        school: SpellSchool,
        amount: u32,
        attacker_level: u8,
    ) -> DamageOutcome {
        let Some(unit) = self.units.get_mut(&target) else {
            return DamageOutcome::default();
        };
        if !unit.is_alive() {
            return DamageOutcome::default();
        }
        let (after_mitigation, resisted) = mitigate(
            amount,
            school,
            unit.stats.armor(),
            unit.stats.resistance(school),
            attacker_level,
        );
        let absorb = unit.auras.absorb(school, after_mitigation);
        let dealt = unit.stats.apply_damage(after_mitigation - absorb.absorbed);
        let killed = !unit.is_alive();
        trace!(target: "aura", ?attacker, ?target, dealt, absorbed = absorb.absorbed, resisted, "damage dealt");

        for depleted in absorb.depleted {
            let _ = self.remove_aura(target, depleted);
        }
        if dealt > 0 {
            self.interrupt_auras(target, AuraInterruptFlags::DAMAGE);
        }
        if killed {
            self.handle_death(target);
        }
        DamageOutcome {
            dealt,
            absorbed: absorb.absorbed,
            resisted,
            killed,
        }
    }

    fn handle_death(&mut self, id: UnitId) {
        if let Err(err) = self.stop_movement(id) {
            warn!(target: "aura", unit = ?id, %err, "stopping a dead unit failed");
        }
        let auras: Vec<AuraSlotId> = self
            .units
            .get(&id)
            .map(|unit| {
                unit.auras
                    .iter()
                    .filter(|slot| !slot.is_passive())
                    .map(|slot| slot.id())
                    .collect()
            })
            .unwrap_or_default();
        for aura in auras {
            let _ = self.remove_aura(id, aura);
        }
        debug!(target: "aura", unit = ?id, "unit died");
        self.broadcast_around(id, ServerMessage::UnitDied { unit: id }, true);
    }

    pub(crate) fn on_aura_tick(&mut self, owner: UnitId, aura: AuraSlotId, effect_index: u8) {
        let Some(unit) = self.units.get_mut(&owner) else {
            return;
        };
        let owner_level = unit.level;
        let Some(slot) = unit.auras.get_mut(aura) else {
            return;
        };
        if !slot.is_applied() {
            return;
        }
        let expired = slot.is_expired();
        let applied_at = slot.applied_at();
        let caster = slot.caster();
        let spell = slot.spell_id();
        let school = slot.school();
        let Some(effect) = slot.effect_mut(effect_index) else {
            return;
        };
        effect.tick_count += 1;
        if !expired && effect.has_ticks_left() {
            if let Some(countdown) = effect.tick_countdown {
                // Ticks stay on the schedule of the application. A catch-up
                // tick may already be due and must still fire before expiry.
                let next = u64::from(effect.tick_count + 1).saturating_mul(effect.amplitude_ms());
                self.timers.set_end(countdown, applied_at.after_millis(next));
            }
        }
        let tick = PeriodicTick {
            owner,
            aura,
            caster,
            owner_level,
            spell,
            school,
            aura_type: effect.aura_type(),
            points: effect.base_points,
            multiple_value: effect.entry.multiple_value,
            trigger_spell: effect.entry.trigger_spell,
        };
        self.perform_periodic(tick);
    }

    fn perform_periodic(&mut self, tick: PeriodicTick) {
        let live_caster = tick
            .caster
            .and_then(|id| self.units.get(&id))
            .filter(|unit| unit.is_alive())
            .map(|unit| (unit.id, unit.level));
        let caster_level = live_caster.map(|(_, level)| level).unwrap_or(tick.owner_level);
        let amount = tick.points.max(0) as u32;
        let mut log = (0, 0, 0);

        match tick.aura_type {
            AuraType::PeriodicDamage => {
                let outcome = self.damage_unit(tick.caster, tick.owner, tick.school, amount, caster_level);
                log = (outcome.dealt, outcome.absorbed, outcome.resisted);
            }
            AuraType::PeriodicHeal => {
                if let Some(unit) = self.units.get_mut(&tick.owner) {
                    log.0 = unit.stats.apply_heal(amount);
                }
            }
            AuraType::PeriodicEnergize => {
                if let Some(unit) = self.units.get_mut(&tick.owner) {
                    log.0 = unit.stats.energize(amount);
                }
            }
            AuraType::PeriodicLeech => {
                let Some((caster, _)) = live_caster else {
                    debug!(target: "aura", owner = ?tick.owner, "leech lost its caster");
                    let _ = self.remove_aura(tick.owner, tick.aura);
                    return;
                };
                let outcome = self.damage_unit(Some(caster), tick.owner, tick.school, amount, caster_level);
                let heal = (outcome.dealt as f32 * tick.multiple_value).max(0.0) as u32;
                if let Some(unit) = self.units.get_mut(&caster) {
                    unit.stats.apply_heal(heal);
                }
                log = (outcome.dealt, outcome.absorbed, outcome.resisted);
            }
            AuraType::PeriodicTriggerSpell => {
                if let Some(trigger) = tick.trigger_spell {
                    let source = live_caster.map(|(id, _)| id).unwrap_or(tick.owner);
                    if let Err(err) = self.cast_spell(source, tick.owner, trigger) {
                        warn!(target: "aura", owner = ?tick.owner, ?trigger, %err, "triggered spell failed");
                    }
                }
            }
            _ => return,
        }

        trace!(target: "aura", owner = ?tick.owner, spell = ?tick.spell, amount = log.0, "periodic tick");
        self.broadcast_around(
            tick.owner,
            ServerMessage::PeriodicAuraLog {
                owner: tick.owner,
                caster: tick.caster,
                spell: tick.spell,
                aura: tick.aura_type,
                amount: log.0,
                absorbed: log.1,
                resisted: log.2,
            },
            true,
        );
    }

    /// Expiration runs one last tick for periodic effects that still had
    /// ticks left, then removes the slot.
    pub(crate) fn on_aura_expired(&mut self, owner: UnitId, aura: AuraSlotId) {
        let Some(slot) = self
            .units
            .get_mut(&owner)
            .and_then(|unit| unit.auras.get_mut(aura))
        else {
            return;
        };
        if !slot.mark_expired() {
            return;
        }
        let final_ticks: Vec<u8> = slot
            .effects()
            .iter()
            .filter(|effect| effect.is_periodic() && effect.has_ticks_left())
            .map(|effect| effect.index)
            .collect();
        for effect in final_ticks {
            self.on_aura_tick(owner, aura, effect);
        }
        if self.units.contains_key(&owner) {
            let _ = self.remove_aura(owner, aura);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::spells::{builtin, SpellBook};
    use crate::world::grid::GridSettings;
    use crate::world::instance::InstanceSettings;
    use crate::world::pathfinding::DirectPathfinder;
    use crate::world::position::Position;
    use crate::world::time::GameTick;

    fn world() -> WorldInstance {
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

    fn pair(world: &mut WorldInstance) -> (UnitId, UnitId) {
        let caster = world
            .spawn_creature(1, Position::new(0.0, 0.0, 0.0, 0.0), 20)
            .expect("caster");
        let target = world
            .spawn_creature(2, Position::new(2.0, 0.0, 0.0, 0.0), 20)
            .expect("target");
        (caster, target)
    }

    fn health(world: &WorldInstance, id: UnitId) -> u32 {
        world.unit(id).expect("unit").stats.health
    }

    #[test]
    fn corruption_ticks_until_expired() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.cast_spell(caster, target, builtin::CORRUPTION).expect("cast");
        let full = health(&world, target);
        for second in 1..=12u64 {
            world.update(GameTick(second * 1_000));
        }
        assert_eq!(full - health(&world, target), 4 * 8);
        assert!(world.unit(target).expect("unit").auras.is_empty());
        assert_eq!(world.pending_timers(), 0);
    }

    #[test]
    fn expiry_forces_the_last_tick() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.cast_spell(caster, target, builtin::CORRUPTION).expect("cast");
        let full = health(&world, target);
        world.update(GameTick(12_000));
        assert_eq!(full - health(&world, target), 4 * 8);
    }

    #[test]
    fn one_long_update_catches_up_on_missed_ticks() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.cast_spell(caster, target, builtin::CORRUPTION).expect("cast");
        let full = health(&world, target);

        world.update(GameTick(7_000));
        assert_eq!(full - health(&world, target), 2 * 8);
        assert_eq!(world.unit(target).expect("unit").auras.len(), 1);

        world.update(GameTick(30_000));
        assert_eq!(full - health(&world, target), 4 * 8);
        assert!(world.unit(target).expect("unit").auras.is_empty());
        assert_eq!(world.pending_timers(), 0);
    }

    #[test]
    fn misapply_twice_equals_once() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        let armor = world.unit(target).expect("unit").stats.armor();
        let aura = world
            .apply_aura(Some(caster), target, builtin::SUNDER_ARMOR)
            .expect("aura");
        assert_eq!(world.unit(target).expect("unit").stats.armor(), armor - 90);
        world.misapply_aura_effects(target, aura);
        let after_one = world.unit(target).expect("unit").stats.clone();
        world.misapply_aura_effects(target, aura);
        assert_eq!(world.unit(target).expect("unit").stats, after_one);
        assert_eq!(after_one.armor(), armor);
    }

    #[test]
    fn stacking_reapplies_scaled_modifiers() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        let armor = world.unit(target).expect("unit").stats.armor();
        for _ in 0..3 {
            world
                .apply_aura(Some(caster), target, builtin::SUNDER_ARMOR)
                .expect("aura");
        }
        let unit = world.unit(target).expect("unit");
        assert_eq!(unit.auras.len(), 1);
        assert_eq!(unit.stats.armor(), armor - 270);
    }

    #[test]
    fn per_caster_auras_coexist() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        let second = world
            .spawn_creature(3, Position::new(1.0, 1.0, 0.0, 0.0), 20)
            .expect("second");
        world.apply_aura(Some(caster), target, builtin::CORRUPTION).expect("first");
        world.apply_aura(Some(second), target, builtin::CORRUPTION).expect("second");
        world.apply_aura(Some(second), target, builtin::CORRUPTION).expect("refresh");
        assert_eq!(world.unit(target).expect("unit").auras.len(), 2);

        world.apply_aura(Some(caster), target, builtin::CURSE_OF_AGONY).expect("curse");
        world.apply_aura(Some(second), target, builtin::CURSE_OF_AGONY).expect("curse");
        assert_eq!(world.unit(target).expect("unit").auras.len(), 3);
    }

    #[test]
    fn casterless_aura_still_ticks() {
        let mut world = world();
        let (_, target) = pair(&mut world);
        let full = health(&world, target);
        world.apply_aura(None, target, builtin::CORRUPTION).expect("aura");
        world.update(GameTick(3_000));
        assert_eq!(full - health(&world, target), 8);
    }

    #[test]
    fn leech_stops_when_caster_despawns() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.apply_aura(Some(caster), target, builtin::DRAIN_LIFE).expect("aura");
        world.update(GameTick(1_000));
        world.despawn(caster).expect("despawn");
        assert!(world.unit(target).expect("unit").auras.is_empty());
        assert_eq!(world.pending_timers(), 0);
    }

    #[test]
    fn leech_heals_its_caster() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.unit_mut(caster).expect("caster").stats.health = 10;
        world.apply_aura(Some(caster), target, builtin::DRAIN_LIFE).expect("aura");
        world.update(GameTick(1_000));
        assert_eq!(health(&world, caster), 20);
    }

    #[test]
    fn damage_breaks_fragile_auras() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.apply_aura(Some(caster), target, builtin::FROST_NOVA).expect("aura");
        assert!(world.unit(target).expect("unit").is_rooted());
        world.damage_unit(Some(caster), target, SpellSchool::Holy, 5, 20);
        let unit = world.unit(target).expect("unit");
        assert!(unit.auras.is_empty());
        assert!(!unit.is_rooted());
    }

    #[test]
    fn shield_absorbs_then_breaks() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.apply_aura(Some(caster), target, builtin::POWER_WORD_SHIELD).expect("aura");
        let full = health(&world, target);
        let outcome = world.damage_unit(Some(caster), target, SpellSchool::Holy, 50, 20);
        assert_eq!(outcome.absorbed, 44);
        assert_eq!(outcome.dealt, 6);
        assert_eq!(health(&world, target), full - 6);
        assert!(world.unit(target).expect("unit").auras.is_empty());
    }

    #[test]
    fn dispel_and_cancel_respect_polarity() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.apply_aura(Some(caster), target, builtin::RENEW).expect("renew");
        world.apply_aura(Some(caster), target, builtin::CORRUPTION).expect("corruption");
        assert_eq!(world.cancel_aura(target, builtin::CORRUPTION), Ok(false));
        assert_eq!(world.dispel(target, DispelType::Magic, false, 5), Ok(1));
        assert_eq!(world.cancel_aura(target, builtin::RENEW), Ok(true));
        assert!(world.unit(target).expect("unit").auras.is_empty());
    }

    #[test]
    fn trigger_aura_casts_its_spell() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        let full = health(&world, target);
        world.apply_aura(Some(caster), target, builtin::HELLFIRE).expect("aura");
        world.update(GameTick(2_000));
        assert!(health(&world, target) < full);
    }

    #[test]
    fn speed_auras_update_creatures_directly() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.apply_aura(Some(caster), target, builtin::SPRINT).expect("aura");
        assert_eq!(world.unit(target).expect("unit").speed(MovementType::Run), 10.5);
        world.remove_auras_by_spell(target, builtin::SPRINT).expect("remove");
        assert_eq!(world.unit(target).expect("unit").speed(MovementType::Run), 7.0);
    }

    fn queued_changes(world: &WorldInstance, id: UnitId) -> Vec<MovementChange> {
        world
            .unit(id)
            .expect("unit")
            .pending
            .iter()
            .map(|pending| pending.change)
            .collect()
    }

    #[test]
    fn refreshing_movement_auras_queues_no_extra_changes() {
        let mut world = world();
        let player = world
            .spawn_character("Held", Position::new(0.0, 0.0, 0.0, 0.0), 10)
            .expect("player");
        world.apply_aura(None, player, builtin::FROST_NOVA).expect("root");
        world.apply_aura(None, player, builtin::FROST_NOVA).expect("refresh");
        world.apply_aura(None, player, builtin::SPRINT).expect("sprint");
        world.apply_aura(None, player, builtin::SPRINT).expect("refresh");
        assert_eq!(
            queued_changes(&world, player),
            vec![
                MovementChange::Root { apply: true },
                MovementChange::Speed {
                    movement_type: MovementType::Run,
                    speed: 10.5
                },
            ]
        );
        assert_eq!(world.unit(player).expect("unit").auras.len(), 2);
        assert!(world.unit(player).expect("unit").is_rooted());
    }

    #[test]
    fn refreshing_a_creature_aura_keeps_its_speed() {
        let mut world = world();
        let (caster, target) = pair(&mut world);
        world.apply_aura(Some(caster), target, builtin::SPRINT).expect("aura");
        world.apply_aura(Some(caster), target, builtin::SPRINT).expect("refresh");
        assert_eq!(world.unit(target).expect("unit").speed(MovementType::Run), 10.5);
        world.remove_auras_by_spell(target, builtin::SPRINT).expect("remove");
        assert_eq!(world.unit(target).expect("unit").speed(MovementType::Run), 7.0);
    }
}
