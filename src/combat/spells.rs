//! Static spell data: effects, aura types, stacking attributes.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::combat::damage::SpellSchool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpellId(pub u32);

/// Most effects a spell (and therefore an aura slot) can carry.
pub const MAX_SPELL_EFFECTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpellEffectKind {
    SchoolDamage,
    Heal,
    Energize,
    ApplyAura,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuraType {
    None,
    PeriodicDamage,
    PeriodicHeal,
    PeriodicEnergize,
    PeriodicLeech,
    PeriodicTriggerSpell,
    /// `misc_value` is the stat index, or -1 for all stats.
    ModStat,
    /// `misc_value` is a school mask.
    ModResistance,
    ModIncreaseHealth,
    ModArmor,
    ModIncreaseSpeed,
    ModDecreaseSpeed,
    ModIncreaseSwimSpeed,
    ModIncreaseFlightSpeed,
    ModRoot,
    Hover,
    WaterWalk,
    FeatherFall,
    Fly,
    /// `misc_value` is a school mask.
    SchoolAbsorb,
}

impl AuraType {
    pub fn is_periodic(self) -> bool {
        matches!(
            self,
            AuraType::PeriodicDamage
                | AuraType::PeriodicHeal
                | AuraType::PeriodicEnergize
                | AuraType::PeriodicLeech
                | AuraType::PeriodicTriggerSpell
        )
    }

    /// Effects that stop working once the caster is gone.
    pub fn requires_caster(self) -> bool {
        matches!(self, AuraType::PeriodicLeech)
    }

    pub fn affects_movement(self) -> bool {
        matches!(
            self,
            AuraType::ModIncreaseSpeed
                | AuraType::ModDecreaseSpeed
                | AuraType::ModIncreaseSwimSpeed
                | AuraType::ModIncreaseFlightSpeed
                | AuraType::ModRoot
                | AuraType::Hover
                | AuraType::WaterWalk
                | AuraType::FeatherFall
                | AuraType::Fly
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DispelType {
    #[default]
    None,
    Magic,
    Curse,
    Disease,
    Poison,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SpellAttributes: u32 {
        /// Every caster keeps an own copy of the aura on a target.
        const STACK_PER_CASTER = 0x1;
        const PASSIVE = 0x2;
        /// Harmful aura; shown in the negative slot range.
        const NEGATIVE = 0x4;
        const CANNOT_BE_DISPELLED = 0x8;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AuraInterruptFlags: u32 {
        const DAMAGE = 0x2;
        const MOVE = 0x8;
        const TURNING = 0x10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellEffectEntry {
    pub kind: SpellEffectKind,
    pub aura: AuraType,
    pub base_points: i32,
    /// Added per caster level above the spell's base level.
    pub points_per_level: f32,
    pub misc_value: i32,
    /// Tick interval of periodic auras.
    pub amplitude_ms: u32,
    /// Leech heal factor or similar per-effect multiplier.
    pub multiple_value: f32,
    pub trigger_spell: Option<SpellId>,
}

impl Default for SpellEffectEntry {
    fn default() -> Self {
        Self {
            kind: SpellEffectKind::ApplyAura,
            aura: AuraType::None,
            base_points: 0,
            points_per_level: 0.0,
            misc_value: 0,
            amplitude_ms: 0,
            multiple_value: 1.0,
            trigger_spell: None,
        }
    }
}

impl SpellEffectEntry {
    /// Points of this effect cast at `caster_level`.
    pub fn calculate_points(&self, base_level: u8, caster_level: u8) -> i32 {
        let levels = f32::from(caster_level.saturating_sub(base_level));
        self.base_points + (self.points_per_level * levels).round() as i32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellEntry {
    pub id: SpellId,
    pub name: String,
    #[serde(default = "default_school")]
    pub school: SpellSchool,
    #[serde(default)]
    pub base_level: u8,
    /// `None` lasts until removed.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default = "default_max_stack")]
    pub max_stack: u8,
    #[serde(default)]
    pub proc_charges: u8,
    #[serde(default)]
    pub dispel: DispelType,
    #[serde(default)]
    pub attributes: SpellAttributes,
    #[serde(default)]
    pub interrupt_flags: AuraInterruptFlags,
    pub effects: Vec<SpellEffectEntry>,
}

fn default_school() -> SpellSchool {
    SpellSchool::Physical
}

fn default_max_stack() -> u8 {
    1
}

impl SpellEntry {
    pub fn has_attribute(&self, attribute: SpellAttributes) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn is_positive(&self) -> bool {
        !self.has_attribute(SpellAttributes::NEGATIVE)
    }

    pub fn has_aura_effects(&self) -> bool {
        self.effects
            .iter()
            .any(|effect| effect.kind == SpellEffectKind::ApplyAura && effect.aura != AuraType::None)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SpellBook {
    spells: HashMap<SpellId, SpellEntry>,
}

#[derive(Debug, Deserialize)]
struct SpellFile {
    spells: Vec<SpellEntry>,
}

impl SpellBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spell: SpellEntry) -> Result<(), String> {
        if self.spells.contains_key(&spell.id) {
            return Err(format!("spell {:?} already exists", spell.id));
        }
        if spell.effects.len() > MAX_SPELL_EFFECTS {
            return Err(format!(
                "spell {:?} has {} effects, at most {MAX_SPELL_EFFECTS} allowed",
                spell.id,
                spell.effects.len()
            ));
        }
        if spell.max_stack == 0 {
            return Err(format!("spell {:?} has a max stack of zero", spell.id));
        }
        for effect in &spell.effects {
            if effect.aura.is_periodic() && effect.amplitude_ms == 0 {
                return Err(format!(
                    "spell {:?} has a periodic effect without amplitude",
                    spell.id
                ));
            }
        }
        self.spells.insert(spell.id, spell);
        Ok(())
    }

    pub fn get(&self, id: SpellId) -> Option<&SpellEntry> {
        self.spells.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpellEntry> {
        self.spells.values()
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    pub fn load_yaml_str(&mut self, source: &str) -> Result<usize, String> {
        let file: SpellFile =
            serde_yaml::from_str(source).map_err(|err| format!("invalid spell file: {err}"))?;
        let count = file.spells.len();
        for spell in file.spells {
            self.insert(spell)?;
        }
        Ok(count)
    }

    pub fn load_yaml_file(&mut self, path: &Path) -> Result<usize, String> {
        let source = fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        let count = self.load_yaml_str(&source)?;
        debug!(target: "aura", path = %path.display(), count, "loaded spell file");
        Ok(count)
    }

    /// Spell book holding the built-in spells.
    pub fn with_builtin() -> Result<Self, String> {
        let mut book = Self::new();
        for spell in builtin_spells() {
            book.insert(spell)?;
        }
        Ok(book)
    }

    /// Checks cross references between spells.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for spell in self.spells.values() {
            for effect in &spell.effects {
                if let Some(trigger) = effect.trigger_spell {
                    if !self.spells.contains_key(&trigger) {
                        errors.push(format!(
                            "spell {:?} triggers unknown spell {:?}",
                            spell.id, trigger
                        ));
                    }
                }
                if effect.aura == AuraType::PeriodicTriggerSpell && effect.trigger_spell.is_none() {
                    errors.push(format!("spell {:?} trigger aura has no spell", spell.id));
                }
            }
        }
        errors.sort();
        errors
    }
}

pub mod builtin {
    use super::SpellId;

    pub const FIREBALL: SpellId = SpellId(133);
    pub const CORRUPTION: SpellId = SpellId(172);
    pub const RENEW: SpellId = SpellId(139);
    pub const CURSE_OF_AGONY: SpellId = SpellId(980);
    pub const DRAIN_LIFE: SpellId = SpellId(689);
    pub const FROST_NOVA: SpellId = SpellId(122);
    pub const SPRINT: SpellId = SpellId(2983);
    pub const CRIPPLING_POISON: SpellId = SpellId(3409);
    pub const POWER_WORD_FORTITUDE: SpellId = SpellId(1243);
    pub const POWER_WORD_SHIELD: SpellId = SpellId(17);
    pub const SUNDER_ARMOR: SpellId = SpellId(7386);
    pub const LEVITATE: SpellId = SpellId(1706);
    pub const SLOW_FALL: SpellId = SpellId(130);
    pub const WATER_WALKING: SpellId = SpellId(546);
    pub const FLIGHT_FORM: SpellId = SpellId(33943);
    pub const INNERVATE: SpellId = SpellId(29166);
    pub const HELLFIRE: SpellId = SpellId(1949);
    pub const HELLFIRE_EFFECT: SpellId = SpellId(5857);
}

fn aura(aura: AuraType, base_points: i32, misc_value: i32, amplitude_ms: u32) -> SpellEffectEntry {
    SpellEffectEntry {
        kind: SpellEffectKind::ApplyAura,
        aura,
        base_points,
        misc_value,
        amplitude_ms,
        ..SpellEffectEntry::default()
    }
}

fn instant(kind: SpellEffectKind, base_points: i32) -> SpellEffectEntry {
    SpellEffectEntry {
        kind,
        aura: AuraType::None,
        base_points,
        ..SpellEffectEntry::default()
    }
}

fn spell(id: SpellId, name: &str, school: SpellSchool, effects: Vec<SpellEffectEntry>) -> SpellEntry {
    SpellEntry {
        id,
        name: name.to_string(),
        school,
        base_level: 1,
        duration_ms: None,
        max_stack: 1,
        proc_charges: 0,
        dispel: DispelType::None,
        attributes: SpellAttributes::empty(),
        interrupt_flags: AuraInterruptFlags::empty(),
        effects,
    }
}

pub fn builtin_spells() -> Vec<SpellEntry> {
    use builtin::*;
    use SpellSchool::*;

    let harmful = SpellAttributes::NEGATIVE;
    vec![
        SpellEntry {
            attributes: harmful,
            ..spell(FIREBALL, "Fireball", Fire, vec![
                instant(SpellEffectKind::SchoolDamage, 30),
                aura(AuraType::PeriodicDamage, 3, 0, 2_000),
            ])
        }
        .with_duration(8_000)
        .with_dispel(DispelType::Magic),
        SpellEntry {
            attributes: harmful | SpellAttributes::STACK_PER_CASTER,
            ..spell(CORRUPTION, "Corruption", Shadow, vec![aura(
                AuraType::PeriodicDamage,
                8,
                0,
                3_000,
            )])
        }
        .with_duration(12_000)
        .with_dispel(DispelType::Magic),
        spell(RENEW, "Renew", Holy, vec![aura(AuraType::PeriodicHeal, 9, 0, 3_000)])
            .with_duration(15_000)
            .with_dispel(DispelType::Magic),
        SpellEntry {
            attributes: harmful | SpellAttributes::STACK_PER_CASTER,
            ..spell(CURSE_OF_AGONY, "Curse of Agony", Shadow, vec![aura(
                AuraType::PeriodicDamage,
                7,
                0,
                2_000,
            )])
        }
        .with_duration(24_000)
        .with_dispel(DispelType::Curse),
        SpellEntry {
            attributes: harmful | SpellAttributes::STACK_PER_CASTER,
            ..spell(DRAIN_LIFE, "Drain Life", Shadow, vec![SpellEffectEntry {
                multiple_value: 1.0,
                ..aura(AuraType::PeriodicLeech, 10, 0, 1_000)
            }])
        }
        .with_duration(5_000),
        SpellEntry {
            attributes: harmful,
            interrupt_flags: AuraInterruptFlags::DAMAGE,
            ..spell(FROST_NOVA, "Frost Nova", Frost, vec![
                instant(SpellEffectKind::SchoolDamage, 20),
                aura(AuraType::ModRoot, 0, 0, 0),
            ])
        }
        .with_duration(8_000)
        .with_dispel(DispelType::Magic),
        spell(SPRINT, "Sprint", Physical, vec![aura(AuraType::ModIncreaseSpeed, 50, 0, 0)])
            .with_duration(15_000),
        SpellEntry {
            attributes: harmful,
            ..spell(CRIPPLING_POISON, "Crippling Poison", Nature, vec![aura(
                AuraType::ModDecreaseSpeed,
                -50,
                0,
                0,
            )])
        }
        .with_duration(12_000)
        .with_dispel(DispelType::Poison),
        spell(POWER_WORD_FORTITUDE, "Power Word: Fortitude", Holy, vec![aura(
            AuraType::ModStat,
            3,
            2,
            0,
        )])
        .with_duration(1_800_000)
        .with_dispel(DispelType::Magic),
        spell(POWER_WORD_SHIELD, "Power Word: Shield", Holy, vec![aura(
            AuraType::SchoolAbsorb,
            44,
            crate::combat::damage::SCHOOL_MASK_ALL as i32,
            0,
        )])
        .with_duration(30_000)
        .with_dispel(DispelType::Magic),
        SpellEntry {
            attributes: harmful,
            max_stack: 5,
            ..spell(SUNDER_ARMOR, "Sunder Armor", Physical, vec![aura(AuraType::ModArmor, -90, 0, 0)])
        }
        .with_duration(30_000),
        SpellEntry {
            interrupt_flags: AuraInterruptFlags::DAMAGE,
            ..spell(LEVITATE, "Levitate", Holy, vec![aura(AuraType::Hover, 0, 0, 0)])
        }
        .with_duration(120_000)
        .with_dispel(DispelType::Magic),
        spell(SLOW_FALL, "Slow Fall", Arcane, vec![aura(AuraType::FeatherFall, 0, 0, 0)])
            .with_duration(30_000)
            .with_dispel(DispelType::Magic),
        spell(WATER_WALKING, "Water Walking", Nature, vec![aura(AuraType::WaterWalk, 0, 0, 0)])
            .with_duration(600_000)
            .with_dispel(DispelType::Magic),
        spell(FLIGHT_FORM, "Flight Form", Nature, vec![
            aura(AuraType::Fly, 0, 0, 0),
            aura(AuraType::ModIncreaseFlightSpeed, 50, 0, 0),
        ]),
        spell(INNERVATE, "Innervate", Nature, vec![aura(AuraType::PeriodicEnergize, 40, 0, 2_000)])
            .with_duration(20_000)
            .with_dispel(DispelType::Magic),
        spell(HELLFIRE, "Hellfire", Fire, vec![SpellEffectEntry {
            trigger_spell: Some(HELLFIRE_EFFECT),
            ..aura(AuraType::PeriodicTriggerSpell, 0, 0, 1_000)
        }])
        .with_duration(15_000),
        SpellEntry {
            attributes: harmful,
            ..spell(HELLFIRE_EFFECT, "Hellfire Effect", Fire, vec![instant(
                SpellEffectKind::SchoolDamage,
                15,
            )])
        },
    ]
}

impl SpellEntry {
    fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    fn with_dispel(mut self, dispel: DispelType) -> Self {
        self.dispel = dispel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_spells_are_consistent() {
        let book = SpellBook::with_builtin().expect("builtin spells");
        assert!(book.validate().is_empty(), "{:?}", book.validate());
        let agony = book.get(builtin::CURSE_OF_AGONY).expect("agony");
        assert_eq!(agony.dispel, DispelType::Curse);
        assert!(!agony.is_positive());
    }

    #[test]
    fn rejects_duplicate_and_oversized_spells() {
        let mut book = SpellBook::with_builtin().expect("builtin spells");
        let renew = book.get(builtin::RENEW).cloned().expect("renew");
        assert!(book.insert(renew).is_err());

        let mut big = spell(SpellId(1), "Big", SpellSchool::Fire, Vec::new());
        big.effects = vec![aura(AuraType::ModArmor, 1, 0, 0); MAX_SPELL_EFFECTS + 1];
        assert!(book.insert(big).is_err());
    }

    #[test]
    fn loads_spells_from_yaml() {
        let source = r#"
spells:
  - id: 90001
    name: Test Dot
    school: Shadow
    duration_ms: 6000
    dispel: Curse
    attributes: STACK_PER_CASTER | NEGATIVE
    effects:
      - kind: ApplyAura
        aura: PeriodicDamage
        base_points: 12
        amplitude_ms: 2000
"#;
        let mut book = SpellBook::new();
        assert_eq!(book.load_yaml_str(source), Ok(1));
        let dot = book.get(SpellId(90001)).expect("loaded");
        assert!(dot.has_attribute(SpellAttributes::STACK_PER_CASTER));
        assert!(dot.has_attribute(SpellAttributes::NEGATIVE));
        assert_eq!(dot.effects[0].multiple_value, 1.0);
        assert_eq!(dot.max_stack, 1);
    }

    #[test]
    fn periodic_effect_needs_amplitude() {
        let mut book = SpellBook::new();
        let broken = spell(SpellId(5), "Broken", SpellSchool::Fire, vec![aura(
            AuraType::PeriodicDamage,
            5,
            0,
            0,
        )]);
        assert!(book.insert(broken).is_err());
    }

    #[test]
    fn points_scale_with_level() {
        let effect = SpellEffectEntry {
            points_per_level: 0.5,
            ..aura(AuraType::PeriodicDamage, 10, 0, 1_000)
        };
        assert_eq!(effect.calculate_points(1, 1), 10);
        assert_eq!(effect.calculate_points(1, 11), 15);
        assert_eq!(effect.calculate_points(20, 10), 10);
    }
}
