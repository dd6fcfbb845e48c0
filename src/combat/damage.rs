use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpellSchool {
    Physical,
    Holy,
    Fire,
    Nature,
    Frost,
    Shadow,
    Arcane,
}

impl SpellSchool {
    pub const COUNT: usize = 7;

    pub const ALL: [SpellSchool; SpellSchool::COUNT] = [
        SpellSchool::Physical,
        SpellSchool::Holy,
        SpellSchool::Fire,
        SpellSchool::Nature,
        SpellSchool::Frost,
        SpellSchool::Shadow,
        SpellSchool::Arcane,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Physical => 0,
            Self::Holy => 1,
            Self::Fire => 2,
            Self::Nature => 3,
            Self::Frost => 4,
            Self::Shadow => 5,
            Self::Arcane => 6,
        }
    }

    pub fn mask(self) -> u32 {
        1 << self.index()
    }

    /// Lowest school contained in `mask`.
    pub fn from_mask(mask: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|school| mask & school.mask() != 0)
    }
}

/// All schools.
pub const SCHOOL_MASK_ALL: u32 = 0x7F;
/// Every school except physical.
pub const SCHOOL_MASK_MAGIC: u32 = 0x7E;

/// Share of physical damage removed by armor against an attacker of
/// `attacker_level`, capped at 75%.
pub fn armor_reduction(armor: u32, attacker_level: u8) -> f32 {
    if armor == 0 {
        return 0.0;
    }
    let armor = armor as f32;
    let reduction = armor / (armor + 400.0 + 85.0 * f32::from(attacker_level.max(1)));
    reduction.clamp(0.0, 0.75)
}

/// Average share of spell damage resisted, capped at 75%.
pub fn resistance_reduction(resistance: i32, caster_level: u8) -> f32 {
    if resistance <= 0 {
        return 0.0;
    }
    let level = f32::from(caster_level.max(1));
    ((resistance as f32 / (level * 5.0)) * 0.75).clamp(0.0, 0.75)
}

/// Damage left after armor or resistance, and the part that was mitigated.
pub fn mitigate(
    amount: u32,
    school: SpellSchool,
    armor: u32,
    resistance: i32,
    attacker_level: u8,
) -> (u32, u32) {
    let reduction = match school {
        SpellSchool::Physical => armor_reduction(armor, attacker_level),
        SpellSchool::Holy => 0.0,
        _ => resistance_reduction(resistance, attacker_level),
    };
    let mitigated = (amount as f32 * reduction).round() as u32;
    let mitigated = mitigated.min(amount);
    (amount - mitigated, mitigated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_masks_roundtrip() {
        for school in SpellSchool::ALL {
            assert_eq!(SpellSchool::from_mask(school.mask()), Some(school));
        }
        assert_eq!(SpellSchool::from_mask(0), None);
        assert_eq!(SpellSchool::from_mask(SCHOOL_MASK_MAGIC), Some(SpellSchool::Holy));
    }

    #[test]
    fn armor_reduction_is_capped() {
        assert_eq!(armor_reduction(0, 60), 0.0);
        assert!((armor_reduction(5_500, 60) - 0.5).abs() < 1e-4);
        assert_eq!(armor_reduction(u32::MAX, 1), 0.75);
    }

    #[test]
    fn holy_ignores_resistance() {
        let (dealt, mitigated) = mitigate(100, SpellSchool::Holy, 5_000, 300, 60);
        assert_eq!((dealt, mitigated), (100, 0));
        let (dealt, mitigated) = mitigate(100, SpellSchool::Fire, 0, 150, 60);
        assert_eq!((dealt, mitigated), (62, 38));
    }
}
