//! Classes, races, ability scores, and progression math.
//!
//! The six class specs are a static table; a deployment tunes numbers by
//! editing this table or shadowing it with content, but the multiclass
//! rules and the XP curve are engine behavior.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::item::{ArmorType, WeaponType};

pub const MAX_PRIMARY_LEVEL: u32 = 50;
pub const MAX_SECONDARY_LEVEL: u32 = 25;
pub const MIN_LEVEL_FOR_MULTICLASS: u32 = 10;

/// Flat per-level gains used when a character has no class table entry.
pub const HP_PER_LEVEL: i32 = 10;
pub const MANA_PER_LEVEL: i32 = 5;

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub const ALL: [Ability; 6] = [
        Ability::Strength,
        Ability::Dexterity,
        Ability::Constitution,
        Ability::Intelligence,
        Ability::Wisdom,
        Ability::Charisma,
    ];

    pub fn short(self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }
}

/// A character's six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::uniform(10)
    }
}

impl AbilityScores {
    pub fn uniform(score: i32) -> Self {
        Self {
            strength: score,
            dexterity: score,
            constitution: score,
            intelligence: score,
            wisdom: score,
            charisma: score,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, score: i32) {
        match ability {
            Ability::Strength => self.strength = score,
            Ability::Dexterity => self.dexterity = score,
            Ability::Constitution => self.constitution = score,
            Ability::Intelligence => self.intelligence = score,
            Ability::Wisdom => self.wisdom = score,
            Ability::Charisma => self.charisma = score,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        score_modifier(self.get(ability))
    }

    /// Apply racial bonuses on top of rolled scores.
    pub fn with_bonuses(mut self, bonuses: &BTreeMap<Ability, i32>) -> Self {
        for (&ability, &bonus) in bonuses {
            self.set(ability, self.get(ability) + bonus);
        }
        self
    }
}

/// Standard score-to-modifier curve: 10 is +0, every 2 points is +/-1.
pub fn score_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// The six playable classes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ClassName {
    Warrior,
    Ranger,
    Paladin,
    Rogue,
    Cleric,
    Mage,
}

impl ClassName {
    pub const ALL: [ClassName; 6] = [
        ClassName::Warrior,
        ClassName::Ranger,
        ClassName::Paladin,
        ClassName::Rogue,
        ClassName::Cleric,
        ClassName::Mage,
    ];

    /// Class from the registration menu index (1-based).
    pub fn from_menu_index(index: usize) -> Option<Self> {
        (1..=Self::ALL.len()).contains(&index).then(|| Self::ALL[index - 1])
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClassName::Warrior => "Warrior",
            ClassName::Ranger => "Ranger",
            ClassName::Paladin => "Paladin",
            ClassName::Rogue => "Rogue",
            ClassName::Cleric => "Cleric",
            ClassName::Mage => "Mage",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ClassName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "warrior" => Ok(ClassName::Warrior),
            "ranger" => Ok(ClassName::Ranger),
            "paladin" => Ok(ClassName::Paladin),
            "rogue" => Ok(ClassName::Rogue),
            "cleric" => Ok(ClassName::Cleric),
            "mage" => Ok(ClassName::Mage),
            _ => Err(()),
        }
    }
}

/// Static description of one class.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub name: ClassName,
    pub hit_die: i32,
    pub primary_stat: Ability,
    pub casting_stat: Option<Ability>,
    pub armor_proficiencies: &'static [ArmorType],
    pub weapon_proficiencies: &'static [WeaponType],
    pub starting_health: i32,
    pub starting_mana: i32,
    pub mana_per_level: i32,
    pub multiclass_requirements: &'static [(Ability, i32)],
}

pub fn class_spec(class: ClassName) -> &'static ClassSpec {
    use ArmorType::{Heavy, Light, Medium, Shield};
    use WeaponType::{Finesse, Martial, Ranged, Simple};

    static WARRIOR: ClassSpec = ClassSpec {
        name: ClassName::Warrior,
        hit_die: 10,
        primary_stat: Ability::Strength,
        casting_stat: None,
        armor_proficiencies: &[Light, Medium, Heavy, Shield],
        weapon_proficiencies: &[Simple, Martial, Finesse],
        starting_health: 120,
        starting_mana: 50,
        mana_per_level: 0,
        multiclass_requirements: &[(Ability::Strength, 13)],
    };
    static RANGER: ClassSpec = ClassSpec {
        name: ClassName::Ranger,
        hit_die: 10,
        primary_stat: Ability::Dexterity,
        casting_stat: Some(Ability::Wisdom),
        armor_proficiencies: &[Light, Medium],
        weapon_proficiencies: &[Simple, Martial, Ranged, Finesse],
        starting_health: 110,
        starting_mana: 80,
        mana_per_level: 4,
        multiclass_requirements: &[(Ability::Dexterity, 13), (Ability::Wisdom, 13)],
    };
    static PALADIN: ClassSpec = ClassSpec {
        name: ClassName::Paladin,
        hit_die: 10,
        primary_stat: Ability::Strength,
        casting_stat: Some(Ability::Charisma),
        armor_proficiencies: &[Light, Medium, Heavy, Shield],
        weapon_proficiencies: &[Simple, Martial],
        starting_health: 115,
        starting_mana: 70,
        mana_per_level: 4,
        multiclass_requirements: &[(Ability::Strength, 13), (Ability::Charisma, 13)],
    };
    static ROGUE: ClassSpec = ClassSpec {
        name: ClassName::Rogue,
        hit_die: 8,
        primary_stat: Ability::Dexterity,
        casting_stat: Some(Ability::Intelligence),
        armor_proficiencies: &[Light],
        weapon_proficiencies: &[Simple, Finesse, Ranged],
        starting_health: 105,
        starting_mana: 70,
        mana_per_level: 3,
        multiclass_requirements: &[(Ability::Dexterity, 13)],
    };
    static CLERIC: ClassSpec = ClassSpec {
        name: ClassName::Cleric,
        hit_die: 8,
        primary_stat: Ability::Wisdom,
        casting_stat: Some(Ability::Wisdom),
        armor_proficiencies: &[Light, Medium, Shield],
        weapon_proficiencies: &[Simple],
        starting_health: 100,
        starting_mana: 100,
        mana_per_level: 6,
        multiclass_requirements: &[(Ability::Wisdom, 13)],
    };
    static MAGE: ClassSpec = ClassSpec {
        name: ClassName::Mage,
        hit_die: 6,
        primary_stat: Ability::Intelligence,
        casting_stat: Some(Ability::Intelligence),
        armor_proficiencies: &[],
        weapon_proficiencies: &[Simple],
        starting_health: 90,
        starting_mana: 120,
        mana_per_level: 8,
        multiclass_requirements: &[(Ability::Intelligence, 13)],
    };

    match class {
        ClassName::Warrior => &WARRIOR,
        ClassName::Ranger => &RANGER,
        ClassName::Paladin => &PALADIN,
        ClassName::Rogue => &ROGUE,
        ClassName::Cleric => &CLERIC,
        ClassName::Mage => &MAGE,
    }
}

/// Total experience required to reach `level`.
pub fn xp_for(level: u32) -> u64 {
    (100.0 * f64::from(level).powf(1.5)).floor() as u64
}

/// Why a class could not be trained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("You must reach level {MIN_LEVEL_FOR_MULTICLASS} in your primary class before learning a second one.")]
    PrimaryTooLow,
    #[error("You need {stat} {required} to train as a {class}.")]
    StatTooLow {
        class: ClassName,
        stat: &'static str,
        required: i32,
    },
    #[error("Your {0} training has reached its limit.")]
    AtCap(ClassName),
}

/// Levels held in each class, with a designated primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLevels {
    levels: BTreeMap<ClassName, u32>,
    primary: Option<ClassName>,
}

impl Default for ClassLevels {
    fn default() -> Self {
        Self {
            levels: BTreeMap::new(),
            primary: None,
        }
    }
}

impl ClassLevels {
    pub fn new(primary: ClassName) -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(primary, 1);
        Self {
            levels,
            primary: Some(primary),
        }
    }

    pub fn primary(&self) -> Option<ClassName> {
        self.primary
    }

    pub fn level_in(&self, class: ClassName) -> u32 {
        self.levels.get(&class).copied().unwrap_or(0)
    }

    /// Character level: the sum across all trained classes.
    pub fn total_level(&self) -> u32 {
        self.levels.values().sum()
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassName, u32)> + '_ {
        self.levels.iter().map(|(&c, &l)| (c, l))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn cap_for(&self, class: ClassName) -> u32 {
        if self.primary == Some(class) {
            MAX_PRIMARY_LEVEL
        } else {
            MAX_SECONDARY_LEVEL
        }
    }

    /// Check the prerequisites for picking up a class not yet held.
    pub fn can_add_class(&self, class: ClassName, scores: &AbilityScores) -> Result<(), ProgressError> {
        if self.levels.contains_key(&class) {
            return Ok(());
        }
        if let Some(primary) = self.primary {
            if self.level_in(primary) < MIN_LEVEL_FOR_MULTICLASS {
                return Err(ProgressError::PrimaryTooLow);
            }
        }
        for &(stat, floor) in class_spec(class).multiclass_requirements {
            if scores.get(stat) < floor {
                return Err(ProgressError::StatTooLow {
                    class,
                    stat: stat.short(),
                    required: floor,
                });
            }
        }
        Ok(())
    }

    /// Raise a class by one level, enforcing caps and multiclass rules.
    pub fn raise(&mut self, class: ClassName, scores: &AbilityScores) -> Result<u32, ProgressError> {
        self.can_add_class(class, scores)?;
        if self.primary.is_none() {
            self.primary = Some(class);
        }
        let current = self.level_in(class);
        if current >= self.cap_for(class) {
            return Err(ProgressError::AtCap(class));
        }
        let next = current + 1;
        self.levels.insert(class, next);
        Ok(next)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }
}

/// A playable race: a name and a set of ability bonuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Race {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bonuses: BTreeMap<Ability, i32>,
}

/// Built-in races used when no race content file is provided.
pub fn default_races() -> Vec<Race> {
    let race = |name: &str, bonuses: &[(Ability, i32)]| Race {
        name: name.to_string(),
        description: String::new(),
        bonuses: bonuses.iter().copied().collect(),
    };
    vec![
        race("human", &[(Ability::Charisma, 1), (Ability::Constitution, 1)]),
        race("elf", &[(Ability::Dexterity, 2), (Ability::Intelligence, 1)]),
        race("dwarf", &[(Ability::Constitution, 2), (Ability::Strength, 1)]),
        race("halfling", &[(Ability::Dexterity, 1), (Ability::Wisdom, 1)]),
    ]
}
