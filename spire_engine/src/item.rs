//! Items: weapons, armor, consumables, keys, and plain clutter.
//!
//! Items are value objects identified by their content id. A given instance
//! lives in exactly one container at a time (room floor, inventory,
//! equipment slot, key ring, quest inventory, or stall); the containers own
//! the instances, so transfers are plain moves between collections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use variantly::Variantly;

use crate::dice::DiceExpr;

/// Where an item may be worn or wielded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Variantly,
)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Weapon,
    OffHand,
    Body,
    Held,
    Ring,
}

impl Slot {
    pub const ALL: [Slot; 5] = [Slot::Weapon, Slot::OffHand, Slot::Body, Slot::Held, Slot::Ring];

    pub fn label(self) -> &'static str {
        match self {
            Slot::Weapon => "weapon",
            Slot::OffHand => "off-hand",
            Slot::Body => "body",
            Slot::Held => "held",
            Slot::Ring => "ring",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|slot| slot.label() == label)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ArmorType {
    #[default]
    None,
    Light,
    Medium,
    Heavy,
    Shield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    Simple,
    Martial,
    Finesse,
    Ranged,
}

/// One item definition or instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub slot: Option<Slot>,
    #[serde(default)]
    pub damage_dice: Option<DiceExpr>,
    #[serde(default)]
    pub armor: i32,
    #[serde(default)]
    pub heal_amount: Option<i32>,
    #[serde(default)]
    pub mana_amount: Option<i32>,
    #[serde(default)]
    pub consumable: bool,
    #[serde(default)]
    pub two_handed: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub quest_bound: bool,
    #[serde(default)]
    pub ranged: bool,
    #[serde(default)]
    pub finesse: bool,
    #[serde(default)]
    pub light_source: bool,
    #[serde(default)]
    pub armor_type: ArmorType,
    #[serde(default)]
    pub weapon_type: Option<WeaponType>,
    /// Shop/stall price in gold.
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Item {
    /// A minimal item with just an id and display name.
    pub fn simple(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            weight: 1,
            slot: None,
            damage_dice: None,
            armor: 0,
            heal_amount: None,
            mana_amount: None,
            consumable: false,
            two_handed: false,
            unique: false,
            quest_bound: false,
            ranged: false,
            finesse: false,
            light_source: false,
            armor_type: ArmorType::None,
            weapon_type: None,
            value: 0,
            tags: BTreeSet::new(),
        }
    }

    /// A pile of coins dropped on a room floor. Picking it up credits the
    /// wallet instead of the pack; the `gold` tag is the marker.
    pub fn gold_pile(amount: i64) -> Self {
        let mut item = Self::simple("gold_coins", &format!("{amount} gold coins"));
        item.value = amount;
        item.weight = 0;
        item.tags.insert("gold".to_string());
        item
    }

    pub fn is_gold(&self) -> bool {
        self.tags.contains("gold")
    }

    pub fn is_weapon(&self) -> bool {
        self.slot == Some(Slot::Weapon) || self.damage_dice.is_some()
    }

    pub fn is_edible(&self) -> bool {
        self.consumable && (self.heal_amount.is_some() || self.mana_amount.is_some())
    }

    /// Case-insensitive match against a player-typed query: exact id or
    /// name, then name prefix, then substring.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return false;
        }
        let name = self.name.to_lowercase();
        self.id.to_lowercase() == q || name == q || name.starts_with(&q) || name.contains(&q)
    }
}

/// Locate the best-matching item in a container for a typed query.
///
/// Exact id/name matches win over prefix matches, which win over substring
/// matches; within a tier the first (oldest) item is chosen.
pub fn find_item(items: &[Item], query: &str) -> Option<usize> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }
    let mut prefix = None;
    let mut substring = None;
    for (idx, item) in items.iter().enumerate() {
        let name = item.name.to_lowercase();
        if item.id.to_lowercase() == q || name == q {
            return Some(idx);
        }
        if prefix.is_none() && name.starts_with(&q) {
            prefix = Some(idx);
        }
        if substring.is_none() && name.contains(&q) {
            substring = Some(idx);
        }
    }
    prefix.or(substring)
}
