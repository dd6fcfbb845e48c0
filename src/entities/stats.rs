use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::combat::damage::SpellSchool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    Strength,
    Agility,
    Stamina,
    Intellect,
    Spirit,
}

impl Stat {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        match self {
            Stat::Strength => 0,
            Stat::Agility => 1,
            Stat::Stamina => 2,
            Stat::Intellect => 3,
            Stat::Spirit => 4,
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Stat::Strength),
            1 => Some(Stat::Agility),
            2 => Some(Stat::Stamina),
            3 => Some(Stat::Intellect),
            4 => Some(Stat::Spirit),
            _ => None,
        }
    }
}

/// Value that auras and items modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitMod {
    Stat(Stat),
    Health,
    Power,
    Armor,
    Resistance(SpellSchool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Added to the base value.
    Flat,
    /// Percent applied after flat modifiers. Multiple percents add up.
    Percent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ModifierTotals {
    flat: i32,
    percent: i32,
}

impl ModifierTotals {
    fn apply(&self, base: i32) -> i32 {
        let value = i64::from(base) + i64::from(self.flat);
        let scaled = value * (100 + i64::from(self.percent)).max(0) / 100;
        scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

/// Health for each point of stamina above the first twenty.
const HEALTH_PER_STAMINA: i32 = 10;
const STAMINA_BASE_HEALTH_THRESHOLD: i32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub health: u32,
    pub power: u32,
    base_health: u32,
    base_power: u32,
    base_armor: u32,
    base_stats: [i32; Stat::COUNT],
    base_resistances: [i32; SpellSchool::COUNT],
    #[serde(skip)]
    modifiers: HashMap<UnitMod, ModifierTotals>,
}

impl UnitStats {
    pub fn for_level(level: u8) -> Self {
        let level = u32::from(level.max(1));
        let base_health = 40 + level * 25;
        let base_power = 60 + level * 20;
        let mut stats = Self {
            health: 0,
            power: 0,
            base_health,
            base_power,
            base_armor: level * 20,
            base_stats: [20 + level as i32; Stat::COUNT],
            base_resistances: [0; SpellSchool::COUNT],
            modifiers: HashMap::new(),
        };
        stats.health = stats.max_health();
        stats.power = stats.max_power();
        stats
    }

    pub fn set_base_resistance(&mut self, school: SpellSchool, value: i32) {
        self.base_resistances[school.index()] = value;
    }

    pub fn set_base_armor(&mut self, armor: u32) {
        self.base_armor = armor;
    }

    /// Adds or removes a modifier and clamps current health and power to
    /// the new maxima.
    pub fn apply_modifier(&mut self, target: UnitMod, kind: ModifierKind, amount: i32, apply: bool) {
        let amount = if apply { amount } else { -amount };
        let totals = self.modifiers.entry(target).or_default();
        match kind {
            ModifierKind::Flat => totals.flat = totals.flat.saturating_add(amount),
            ModifierKind::Percent => totals.percent = totals.percent.saturating_add(amount),
        }
        if *totals == ModifierTotals::default() {
            self.modifiers.remove(&target);
        }
        self.health = self.health.min(self.max_health());
        self.power = self.power.min(self.max_power());
    }

    fn totals(&self, target: UnitMod) -> ModifierTotals {
        self.modifiers.get(&target).copied().unwrap_or_default()
    }

    pub fn stat(&self, stat: Stat) -> i32 {
        self.totals(UnitMod::Stat(stat))
            .apply(self.base_stats[stat.index()])
            .max(0)
    }

    pub fn max_health(&self) -> u32 {
        let stamina_bonus =
            (self.stat(Stat::Stamina) - STAMINA_BASE_HEALTH_THRESHOLD).max(0) * HEALTH_PER_STAMINA;
        let base = (self.base_health as i32).saturating_add(stamina_bonus);
        self.totals(UnitMod::Health).apply(base).max(1) as u32
    }

    pub fn max_power(&self) -> u32 {
        self.totals(UnitMod::Power).apply(self.base_power as i32).max(0) as u32
    }

    pub fn armor(&self) -> u32 {
        self.totals(UnitMod::Armor).apply(self.base_armor as i32).max(0) as u32
    }

    pub fn resistance(&self, school: SpellSchool) -> i32 {
        self.totals(UnitMod::Resistance(school))
            .apply(self.base_resistances[school.index()])
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.health);
        self.health -= applied;
        applied
    }

    pub fn apply_heal(&mut self, amount: u32) -> u32 {
        if !self.is_alive() {
            return 0;
        }
        let before = self.health;
        self.health = before.saturating_add(amount).min(self.max_health());
        self.health.saturating_sub(before)
    }

    pub fn energize(&mut self, amount: u32) -> u32 {
        let before = self.power;
        self.power = before.saturating_add(amount).min(self.max_power());
        self.power.saturating_sub(before)
    }
}

impl Default for UnitStats {
    fn default() -> Self {
        Self::for_level(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_stack_and_revert() {
        let mut stats = UnitStats::for_level(10);
        let armor = stats.armor();
        stats.apply_modifier(UnitMod::Armor, ModifierKind::Flat, 100, true);
        stats.apply_modifier(UnitMod::Armor, ModifierKind::Percent, 50, true);
        assert_eq!(stats.armor(), (armor + 100) * 3 / 2);
        stats.apply_modifier(UnitMod::Armor, ModifierKind::Percent, 50, false);
        stats.apply_modifier(UnitMod::Armor, ModifierKind::Flat, 100, false);
        assert_eq!(stats.armor(), armor);
        assert!(stats.modifiers.is_empty());
    }

    #[test]
    fn stamina_raises_max_health() {
        let mut stats = UnitStats::for_level(1);
        let before = stats.max_health();
        stats.apply_modifier(UnitMod::Stat(Stat::Stamina), ModifierKind::Flat, 5, true);
        assert_eq!(stats.max_health(), before + 50);
    }

    #[test]
    fn lowering_max_health_clamps_current() {
        let mut stats = UnitStats::for_level(1);
        stats.apply_modifier(UnitMod::Health, ModifierKind::Percent, -50, true);
        assert_eq!(stats.health, stats.max_health());
    }

    #[test]
    fn dead_units_are_not_healed() {
        let mut stats = UnitStats::for_level(1);
        let max = stats.max_health();
        assert_eq!(stats.apply_damage(max + 10), max);
        assert!(!stats.is_alive());
        assert_eq!(stats.apply_heal(10), 0);
    }
}
