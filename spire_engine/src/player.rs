//! The player: identity shell, guarded state, and self-directed mutations.
//!
//! Identity and the outbound message channel live on the shell and are
//! lock-free; every mutable gameplay field sits in [`PlayerState`] behind a
//! single mutex, so cross-entity operations only ever juggle one lock per
//! player and the §lock-order discipline stays simple.

use crossbeam_channel::Sender;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;
use variantly::Variantly;

use crate::chat::AntiSpamTracker;
use crate::class::{
    AbilityScores, ClassLevels, ClassName, HP_PER_LEVEL, MANA_PER_LEVEL, class_spec, xp_for,
};
use crate::item::{ArmorType, Item, Slot, find_item};
use crate::portal::PortalAtlas;
use crate::quest::QuestLog;
use crate::statistics::Statistics;
use crate::status::{BuffKind, StatusTimers};

/// A message queued for the session's writer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutMessage {
    Line(String),
    /// Ask the writer to close the connection after draining.
    Close,
}

/// The player's posture; regeneration rates key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Variantly)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Standing,
    Sitting,
    Resting,
    Sleeping,
    Fighting,
}

impl Pose {
    pub fn label(self) -> &'static str {
        match self {
            Pose::Standing => "standing",
            Pose::Sitting => "sitting",
            Pose::Resting => "resting",
            Pose::Sleeping => "sleeping",
            Pose::Fighting => "fighting",
        }
    }

    /// HP/MP recovered per out-of-combat regen tick in this pose.
    pub fn regen_rate(self) -> i32 {
        match self {
            Pose::Fighting => 0,
            Pose::Standing => 1,
            Pose::Sitting => 2,
            Pose::Resting => 3,
            Pose::Sleeping => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StallEntry {
    pub item: Item,
    pub price: i64,
}

/// A player's market stall, anchored to the room it was opened in.
#[derive(Debug, Clone, PartialEq)]
pub struct Stall {
    pub room: String,
    pub entries: Vec<StallEntry>,
}

/// Why an equip or remove attempt was refused. The display strings are part
/// of the user-visible contract and are matched by tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EquipError {
    #[error("You aren't carrying '{0}'.")]
    NotCarrying(String),
    #[error("You can't equip the {0}.")]
    NotEquippable(String),
    #[error("You can't wield a two-handed weapon while using your off-hand.")]
    TwoHandedVsOffHand,
    #[error("You can't wield a two-handed weapon while holding something.")]
    TwoHandedVsHeld,
    #[error("You can't use your off-hand while wielding a two-handed weapon.")]
    OffHandVsTwoHanded,
    #[error("You can't hold that while wielding a two-handed weapon.")]
    HeldVsTwoHanded,
    #[error("You're already using your {0} slot. Remove it first.")]
    SlotOccupied(&'static str),
    #[error("You aren't trained to wear {0}.")]
    NotProficientArmor(String),
    #[error("You aren't trained to wield {0}.")]
    NotProficientWeapon(String),
    #[error("You have nothing equipped there.")]
    NothingThere,
}

/// Every mutable gameplay field, guarded by the player's mutex.
#[derive(Debug)]
pub struct PlayerState {
    pub current_room: String,
    pub home_tower: String,

    pub inventory: Vec<Item>,
    pub equipment: HashMap<Slot, Item>,
    pub key_ring: Vec<Item>,
    pub quest_items: Vec<Item>,
    pub stall: Option<Stall>,
    pub gold: i64,

    pub health: i32,
    pub max_health: i32,
    pub mana: i32,
    pub max_mana: i32,

    pub level: u32,
    pub experience: u64,
    pub classes: ClassLevels,
    pub active_class: Option<ClassName>,
    pub race: String,
    pub abilities: AbilityScores,

    pub in_combat: bool,
    pub combat_target: Option<Uuid>,
    pub pose: Pose,
    pub status: StatusTimers,

    pub learned_spells: BTreeSet<String>,
    pub known_recipes: BTreeSet<String>,
    pub crafting_skills: BTreeMap<String, u32>,
    pub portals: PortalAtlas,
    pub visited_gates: BTreeSet<String>,
    pub lore_talks: BTreeSet<String>,
    pub titles: Vec<String>,
    pub active_title: Option<String>,

    pub ignore_list: BTreeSet<String>,
    pub spam: AntiSpamTracker,
    pub statistics: Statistics,
    pub quest_log: QuestLog,

    pub is_admin: bool,
    pub last_activity: Instant,
    pub login_time: Instant,
}

impl PlayerState {
    /// A level-1 character of the given class, racial bonuses applied.
    pub fn new_character(
        class: ClassName,
        race: &str,
        scores: AbilityScores,
        home_tower: &str,
        start_room: &str,
    ) -> Self {
        let spec = class_spec(class);
        let mut state = Self::basic(start_room);
        state.home_tower = home_tower.to_string();
        state.abilities = scores;
        state.classes = ClassLevels::new(class);
        state.active_class = Some(class);
        state.race = race.to_string();
        state.max_health = spec.starting_health;
        state.health = spec.starting_health;
        state.max_mana = spec.starting_mana;
        state.mana = spec.starting_mana;
        state.portals = PortalAtlas::starting(home_tower);
        state
    }

    /// A bare, classless state: 100/100 pools, level 1. Used as the base of
    /// character creation and as a plain fixture.
    pub fn basic(start_room: &str) -> Self {
        let now = Instant::now();
        Self {
            current_room: start_room.to_string(),
            home_tower: String::new(),
            inventory: Vec::new(),
            equipment: HashMap::new(),
            key_ring: Vec::new(),
            quest_items: Vec::new(),
            stall: None,
            gold: 0,
            health: 100,
            max_health: 100,
            mana: 100,
            max_mana: 100,
            level: 1,
            experience: 0,
            classes: ClassLevels::default(),
            active_class: None,
            race: String::new(),
            abilities: AbilityScores::default(),
            in_combat: false,
            combat_target: None,
            pose: Pose::Standing,
            status: StatusTimers::new(),
            learned_spells: BTreeSet::new(),
            known_recipes: BTreeSet::new(),
            crafting_skills: BTreeMap::new(),
            portals: PortalAtlas::new(),
            visited_gates: BTreeSet::new(),
            lore_talks: BTreeSet::new(),
            titles: Vec::new(),
            active_title: None,
            ignore_list: BTreeSet::new(),
            spam: AntiSpamTracker::default(),
            statistics: Statistics::default(),
            quest_log: QuestLog::default(),
            is_admin: false,
            last_activity: now,
            login_time: now,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Add experience; may trigger several level-ups. Returns levels gained.
    ///
    /// A classed character levels with its active class's hit die and mana
    /// table; a classless one falls back to flat +10 HP / +5 MP gains. Both
    /// pools refill on any level-up.
    pub fn gain_experience(&mut self, amount: u64) -> u32 {
        self.experience += amount;
        let mut gained = 0;
        while xp_for(self.level + 1) <= self.experience {
            self.level += 1;
            gained += 1;
            let (hp_gain, mana_gain) = self.level_gains();
            self.max_health += hp_gain;
            self.max_mana += mana_gain;
        }
        if gained > 0 {
            self.health = self.max_health;
            self.mana = self.max_mana;
        }
        gained
    }

    fn level_gains(&mut self) -> (i32, i32) {
        let Some(class) = self.active_class.filter(|_| !self.classes.is_empty()) else {
            return (HP_PER_LEVEL, MANA_PER_LEVEL);
        };
        let spec = class_spec(class);
        // Keep the class table in step with XP levels; cap errors just stop
        // the class counter, not the character.
        let scores = self.abilities;
        let _ = self.classes.raise(class, &scores);
        if class == ClassName::Warrior && self.classes.level_in(ClassName::Warrior) == 20 {
            // One-time veteran's constitution bonus.
            self.max_health += self.max_health / 10;
        }
        let hp = (spec.hit_die / 2 + 1 + self.abilities.modifier(crate::class::Ability::Constitution)).max(1);
        let mana = spec
            .casting_stat
            .map_or(spec.mana_per_level, |stat| {
                spec.mana_per_level + self.abilities.modifier(stat)
            })
            .max(0);
        (hp, mana)
    }

    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.health;
        self.health = (self.health + amount.max(0)).min(self.max_health);
        self.health - before
    }

    pub fn restore_mana(&mut self, amount: i32) -> i32 {
        let before = self.mana;
        self.mana = (self.mana + amount.max(0)).min(self.max_mana);
        self.mana - before
    }

    pub fn take_damage(&mut self, amount: i32) {
        self.health = (self.health - amount.max(0)).max(0);
    }

    // ---- derived combat numbers ----

    pub fn equipped_weapon(&self) -> Option<&Item> {
        self.equipment.get(&Slot::Weapon)
    }

    /// Armor class: 10 + equipment + class bonuses + timed buffs.
    pub fn armor_class(&mut self, now: Instant) -> i32 {
        let equipment_armor: i32 = self.equipment.values().map(|item| item.armor).sum();
        let mut ac = 10 + equipment_armor;
        let warrior = self.classes.level_in(ClassName::Warrior);
        if warrior >= 10
            && self
                .equipment
                .get(&Slot::Body)
                .is_some_and(|armor| armor.armor_type == ArmorType::Heavy)
        {
            ac += 1;
        }
        if self.classes.level_in(ClassName::Cleric) >= 10 {
            ac += 1;
        }
        if self.classes.level_in(ClassName::Mage) >= 15 {
            ac += 2;
        }
        ac + self.status.buff_total(BuffKind::Armor, now)
    }

    /// Passive armor from gear alone (used for physical damage reduction).
    pub fn armor_value(&self) -> i32 {
        self.equipment.values().map(|item| item.armor).sum()
    }

    pub fn carry_weight(&self) -> u32 {
        self.inventory.iter().map(|item| item.weight).sum()
    }

    pub fn carry_capacity(&self) -> u32 {
        (self.abilities.strength.max(1) as u32) * 10
    }

    // ---- equipment ----

    fn is_proficient_armor(&self, armor_type: ArmorType) -> bool {
        if armor_type == ArmorType::None || self.classes.is_empty() {
            return true;
        }
        self.classes
            .classes()
            .any(|(class, _)| class_spec(class).armor_proficiencies.contains(&armor_type))
    }

    fn is_proficient_weapon(&self, item: &Item) -> bool {
        let Some(weapon_type) = item.weapon_type else {
            return true;
        };
        if self.classes.is_empty() {
            return true;
        }
        self.classes
            .classes()
            .any(|(class, _)| class_spec(class).weapon_proficiencies.contains(&weapon_type))
    }

    /// Equip the named inventory item into its slot, enforcing proficiency
    /// and the two-handed conflict rules in their documented check order.
    pub fn equip(&mut self, query: &str) -> Result<String, EquipError> {
        let idx = find_item(&self.inventory, query)
            .ok_or_else(|| EquipError::NotCarrying(query.to_string()))?;
        let slot = self.inventory[idx]
            .slot
            .ok_or_else(|| EquipError::NotEquippable(self.inventory[idx].name.clone()))?;
        let item = &self.inventory[idx];

        match slot {
            Slot::Weapon if item.two_handed => {
                // Check order matters: off-hand conflict reports first.
                if self.equipment.contains_key(&Slot::OffHand) {
                    return Err(EquipError::TwoHandedVsOffHand);
                }
                if self.equipment.contains_key(&Slot::Held) {
                    return Err(EquipError::TwoHandedVsHeld);
                }
            }
            Slot::OffHand => {
                if self.equipment.get(&Slot::Weapon).is_some_and(|w| w.two_handed) {
                    return Err(EquipError::OffHandVsTwoHanded);
                }
            }
            Slot::Held => {
                if self.equipment.get(&Slot::Weapon).is_some_and(|w| w.two_handed) {
                    return Err(EquipError::HeldVsTwoHanded);
                }
            }
            _ => {}
        }
        if self.equipment.contains_key(&slot) {
            return Err(EquipError::SlotOccupied(slot.label()));
        }
        if item.armor_type != ArmorType::None && !self.is_proficient_armor(item.armor_type) {
            return Err(EquipError::NotProficientArmor(item.name.clone()));
        }
        if slot == Slot::Weapon && !self.is_proficient_weapon(item) {
            return Err(EquipError::NotProficientWeapon(item.name.clone()));
        }

        let item = self.inventory.remove(idx);
        let name = item.name.clone();
        self.equipment.insert(slot, item);
        Ok(format!("You equip the {name}."))
    }

    /// Unequip by item name or slot label, returning it to the inventory.
    pub fn unequip(&mut self, query: &str) -> Result<String, EquipError> {
        let q = query.trim().to_lowercase();
        let slot = Slot::ALL
            .iter()
            .copied()
            .find(|slot| {
                slot.label() == q
                    || self
                        .equipment
                        .get(slot)
                        .is_some_and(|item| item.matches(&q))
            })
            .ok_or(EquipError::NothingThere)?;
        let item = self.equipment.remove(&slot).ok_or(EquipError::NothingThere)?;
        let name = item.name.clone();
        self.inventory.push(item);
        Ok(format!("You remove the {name}."))
    }

    /// Eat or drink a consumable from the inventory.
    pub fn consume(&mut self, query: &str) -> Result<String, String> {
        let idx = find_item(&self.inventory, query)
            .ok_or_else(|| format!("You aren't carrying '{query}'."))?;
        if !self.inventory[idx].consumable {
            return Err(format!("You can't consume the {}.", self.inventory[idx].name));
        }
        let item = self.inventory.remove(idx);
        let mut parts = Vec::new();
        if let Some(heal) = item.heal_amount {
            let healed = self.heal(heal);
            parts.push(format!("{healed} health"));
        }
        if let Some(mana) = item.mana_amount {
            let restored = self.restore_mana(mana);
            parts.push(format!("{restored} mana"));
        }
        if parts.is_empty() {
            Ok(format!("You consume the {}. Nothing much happens.", item.name))
        } else {
            Ok(format!("You consume the {} and recover {}.", item.name, parts.join(" and ")))
        }
    }

    /// Whether a light source is in hand or pack (for dark rooms).
    pub fn has_light(&self) -> bool {
        self.equipment.values().chain(self.inventory.iter()).any(|item| item.light_source)
    }

    /// Ids of unique items the player owns anywhere, used to hide their
    /// floor copies from room descriptions.
    pub fn owned_unique_ids(&self) -> BTreeSet<String> {
        self.inventory
            .iter()
            .chain(self.equipment.values())
            .chain(self.key_ring.iter())
            .chain(self.quest_items.iter())
            .filter(|item| item.unique)
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn has_key(&self, key_id: &str) -> bool {
        self.key_ring.iter().any(|item| item.id == key_id)
            || self.inventory.iter().any(|item| item.id == key_id)
    }

    /// Close the stall (if any), returning its items to the inventory.
    pub fn close_stall(&mut self) -> bool {
        if let Some(stall) = self.stall.take() {
            self.inventory.extend(stall.entries.into_iter().map(|entry| entry.item));
            true
        } else {
            false
        }
    }
}

/// A connected player: identity and channel on the shell, gameplay state
/// behind the mutex.
pub struct Player {
    pub name: String,
    pub account_id: Uuid,
    pub character_id: Uuid,
    outbox: Sender<OutMessage>,
    disconnected: AtomicBool,
    state: Mutex<PlayerState>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Player {
    pub fn new(
        name: &str,
        account_id: Uuid,
        character_id: Uuid,
        outbox: Sender<OutMessage>,
        state: PlayerState,
    ) -> Self {
        Self {
            name: name.to_string(),
            account_id,
            character_id,
            outbox,
            disconnected: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    /// A player with a dangling outbox; sends are dropped. For tests and
    /// tools that never attach a session.
    pub fn detached(name: &str, state: PlayerState) -> Self {
        let (tx, _rx) = crossbeam_channel::unbounded();
        Self::new(name, Uuid::new_v4(), Uuid::new_v4(), tx, state)
    }

    pub fn state(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock()
    }

    /// Queue a line for the session writer. Never blocks; a dead session
    /// just drops the message.
    pub fn send(&self, line: impl Into<String>) {
        let _ = self.outbox.send(OutMessage::Line(line.into()));
    }

    /// Ask the session to close after flushing pending output.
    pub fn request_close(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        let _ = self.outbox.send(OutMessage::Close);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn current_room(&self) -> String {
        self.state().current_room.clone()
    }

    /// Display name with the active title, e.g. `Alice, Ratsbane`.
    pub fn styled_name(&self) -> String {
        match self.state().active_title.as_deref() {
            Some(title) => format!("{}, {}", self.name, title),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::WeaponType;

    fn weapon(id: &str, two_handed: bool) -> Item {
        let mut item = Item::simple(id, id);
        item.slot = Some(Slot::Weapon);
        item.damage_dice = Some("1d8".parse().unwrap());
        item.two_handed = two_handed;
        item
    }

    fn shield() -> Item {
        let mut item = Item::simple("shield", "wooden shield");
        item.slot = Some(Slot::OffHand);
        item.armor = 2;
        item.armor_type = ArmorType::Shield;
        item
    }

    #[test]
    fn single_level_up_from_three_hundred_xp() {
        let mut state = PlayerState::basic("start");
        assert_eq!(state.gain_experience(300), 1);
        assert_eq!(state.level, 2);
        assert_eq!(state.max_health, 110);
        assert_eq!(state.max_mana, 105);
        assert_eq!(state.health, 110);
        assert_eq!(state.mana, 105);
    }

    #[test]
    fn big_xp_gain_levels_several_times() {
        let mut state = PlayerState::basic("start");
        assert_eq!(state.gain_experience(1200), 4);
        assert_eq!(state.level, 5);
        assert_eq!(state.max_health, 140);
        assert_eq!(state.max_mana, 120);
    }

    #[test]
    fn classed_level_up_uses_hit_die_and_con() {
        let mut scores = AbilityScores::uniform(10);
        scores.constitution = 14; // +2
        let mut state = PlayerState::new_character(ClassName::Warrior, "human", scores, "human", "start");
        let base_hp = state.max_health;
        state.gain_experience(300);
        // (10/2)+1+2 = 8
        assert_eq!(state.max_health, base_hp + 8);
        assert_eq!(state.classes.level_in(ClassName::Warrior), 2);
    }

    #[test]
    fn mage_mana_gain_uses_int_modifier() {
        let mut scores = AbilityScores::uniform(10);
        scores.intelligence = 16; // +3
        let mut state = PlayerState::new_character(ClassName::Mage, "elf", scores, "elf", "start");
        let base_mana = state.max_mana;
        state.gain_experience(300);
        assert_eq!(state.max_mana, base_mana + 8 + 3);
    }

    #[test]
    fn two_handed_conflicts_report_in_order() {
        let mut state = PlayerState::basic("start");
        state.inventory.push(weapon("greatsword", true));
        state.inventory.push(shield());
        state.inventory.push({
            let mut torch = Item::simple("torch", "torch");
            torch.slot = Some(Slot::Held);
            torch
        });

        state.equip("shield").unwrap();
        state.equip("torch").unwrap();
        // Off-hand is reported before held.
        assert_eq!(state.equip("greatsword"), Err(EquipError::TwoHandedVsOffHand));
        state.unequip("off-hand").unwrap();
        assert_eq!(state.equip("greatsword"), Err(EquipError::TwoHandedVsHeld));
        state.unequip("held").unwrap();
        assert!(state.equip("greatsword").is_ok());

        // And the inverse checks once the two-hander is wielded.
        assert_eq!(state.equip("shield"), Err(EquipError::OffHandVsTwoHanded));
        assert_eq!(state.equip("torch"), Err(EquipError::HeldVsTwoHanded));
    }

    #[test]
    fn occupied_slot_is_refused() {
        let mut state = PlayerState::basic("start");
        state.inventory.push(weapon("sword_a", false));
        state.inventory.push(weapon("sword_b", false));
        state.equip("sword_a").unwrap();
        assert_eq!(state.equip("sword_b"), Err(EquipError::SlotOccupied("weapon")));
    }

    #[test]
    fn proficiency_gates_heavy_armor() {
        let mut state = PlayerState::new_character(
            ClassName::Mage,
            "human",
            AbilityScores::uniform(10),
            "human",
            "start",
        );
        let mut plate = Item::simple("plate", "plate harness");
        plate.slot = Some(Slot::Body);
        plate.armor = 6;
        plate.armor_type = ArmorType::Heavy;
        state.inventory.push(plate);
        assert_eq!(
            state.equip("plate"),
            Err(EquipError::NotProficientArmor("plate harness".into()))
        );
    }

    #[test]
    fn proficiency_gates_martial_weapons() {
        let mut state = PlayerState::new_character(
            ClassName::Mage,
            "human",
            AbilityScores::uniform(10),
            "human",
            "start",
        );
        let mut axe = weapon("battle axe", false);
        axe.weapon_type = Some(WeaponType::Martial);
        state.inventory.push(axe);
        assert_eq!(
            state.equip("battle axe"),
            Err(EquipError::NotProficientWeapon("battle axe".into()))
        );
    }

    #[test]
    fn consume_heals_and_removes() {
        let mut state = PlayerState::basic("start");
        state.health = 50;
        let mut bread = Item::simple("bread", "loaf of bread");
        bread.consumable = true;
        bread.heal_amount = Some(20);
        state.inventory.push(bread);
        let reply = state.consume("bread").unwrap();
        assert!(reply.contains("20 health"), "{reply}");
        assert_eq!(state.health, 70);
        assert!(state.inventory.is_empty());
        assert!(state.consume("bread").is_err());
    }

    #[test]
    fn healing_clamps_at_max() {
        let mut state = PlayerState::basic("start");
        state.health = 95;
        assert_eq!(state.heal(20), 5);
        assert_eq!(state.health, 100);
    }

    #[test]
    fn damage_clamps_at_zero() {
        let mut state = PlayerState::basic("start");
        state.take_damage(250);
        assert_eq!(state.health, 0);
        assert!(state.is_dead());
    }

    #[test]
    fn armor_class_counts_gear_and_class_bonuses() {
        let now = Instant::now();
        let mut state = PlayerState::basic("start");
        assert_eq!(state.armor_class(now), 10);
        let mut jerkin = Item::simple("jerkin", "leather jerkin");
        jerkin.slot = Some(Slot::Body);
        jerkin.armor = 2;
        state.equipment.insert(Slot::Body, jerkin);
        assert_eq!(state.armor_class(now), 12);
        state.status.add_buff(BuffKind::Armor, 3, now, std::time::Duration::from_secs(60));
        assert_eq!(state.armor_class(now), 15);
    }

    #[test]
    fn stall_close_returns_items() {
        let mut state = PlayerState::basic("start");
        state.stall = Some(Stall {
            room: "market".into(),
            entries: vec![StallEntry {
                item: Item::simple("gem", "rough gem"),
                price: 50,
            }],
        });
        assert!(state.close_stall());
        assert_eq!(state.inventory.len(), 1);
        assert!(!state.close_stall());
    }

    #[test]
    fn unique_ownership_is_tracked_across_bags() {
        let mut state = PlayerState::basic("start");
        let mut crown = Item::simple("crown", "tarnished crown");
        crown.unique = true;
        state.quest_items.push(crown);
        assert!(state.owned_unique_ids().contains("crown"));
    }

    #[test]
    fn detached_player_send_does_not_panic() {
        let player = Player::detached("alice", PlayerState::basic("start"));
        player.send("hello");
        assert_eq!(player.styled_name(), "alice");
        player.state().titles.push("Ratsbane".into());
        player.state().active_title = Some("Ratsbane".into());
        assert_eq!(player.styled_name(), "alice, Ratsbane");
    }
}
