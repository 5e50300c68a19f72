//! Server settings and content loading.
//!
//! Settings and content are YAML. A malformed file is fatal at startup —
//! the server refuses to run on bad content — while individually suspect
//! NPC fields are auto-corrected and warned about during world build. A
//! missing settings file just means defaults.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::chat::{AntiSpamConfig, ChatFilterConfig};
use crate::class::{Race, default_races};
use crate::item::Item;
use crate::npc::{LootEntry, NpcDef};
use crate::quest::QuestDef;
use crate::room::RoomDef;
use crate::spell::SpellDef;

/// A crafting recipe: consume the inputs, produce the output, bump a skill.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecipeDef {
    pub id: String,
    pub name: String,
    pub inputs: Vec<String>,
    pub output: String,
    pub skill: String,
    #[serde(default)]
    pub required_skill: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub data_dir: String,
    pub save_dir: String,
    pub motd: String,
    pub starting_room: String,
    pub home_tower: String,
    pub starting_hour: u8,
    pub starting_gold: i64,
    pub combat_round_secs: u64,
    pub regen_secs: u64,
    pub game_hour_secs: u64,
    pub respawn_sweep_secs: u64,
    pub checkpoint_secs: u64,
    pub idle_timeout_secs: u64,
    pub pilgrim_mode: bool,
    /// Account usernames granted the admin verbs.
    pub admins: Vec<String>,
    pub chat_filter: ChatFilterConfig,
    pub antispam: AntiSpamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".to_string(),
            data_dir: "data".to_string(),
            save_dir: "save".to_string(),
            motd: "Welcome to the Spire.".to_string(),
            starting_room: "human_tower_0".to_string(),
            home_tower: "human".to_string(),
            starting_hour: 8,
            starting_gold: 25,
            combat_round_secs: 3,
            regen_secs: 10,
            game_hour_secs: 120,
            respawn_sweep_secs: 1,
            checkpoint_secs: 60,
            idle_timeout_secs: 1800,
            pilgrim_mode: false,
            admins: Vec::new(),
            chat_filter: ChatFilterConfig::default(),
            antispam: AntiSpamConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load settings from a YAML file; a missing file yields defaults, a
    /// malformed one is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no settings file at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
    }
}

/// Everything the world is built from.
#[derive(Debug, Clone, Default)]
pub struct WorldContent {
    pub rooms: Vec<RoomDef>,
    pub items: Vec<Item>,
    pub npcs: Vec<NpcDef>,
    pub spells: Vec<SpellDef>,
    pub quests: Vec<QuestDef>,
    pub races: Vec<Race>,
    pub recipes: Vec<RecipeDef>,
    pub help: HashMap<String, String>,
}

fn load_list<T: serde::de::DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

impl WorldContent {
    /// Load content from a directory of YAML files. Missing files are fine
    /// (empty lists); malformed ones abort startup. If no rooms are defined
    /// at all, the built-in demo world is used instead.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut content = Self {
            rooms: load_list(dir, "rooms.yaml")?,
            items: load_list(dir, "items.yaml")?,
            npcs: load_list(dir, "npcs.yaml")?,
            spells: load_list(dir, "spells.yaml")?,
            quests: load_list(dir, "quests.yaml")?,
            races: load_list(dir, "races.yaml")?,
            recipes: load_list(dir, "recipes.yaml")?,
            help: {
                let path = dir.join("help.yaml");
                if path.exists() {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_yaml::from_str(&text)
                        .with_context(|| format!("parsing {}", path.display()))?
                } else {
                    HashMap::new()
                }
            },
        };
        if content.races.is_empty() {
            content.races = default_races();
        }
        if content.rooms.is_empty() {
            warn!("no rooms defined under {}; using the built-in demo world", dir.display());
            return Ok(Self::builtin_demo());
        }
        Ok(content)
    }

    /// A small self-contained world: three rooms, a shopkeeper, a rat, two
    /// spells, and one quest. Enough to run the server (and the tests)
    /// without any content directory.
    pub fn builtin_demo() -> Self {
        let rooms_yaml = r#"
- id: human_tower_0
  name: Tower Gate Hall
  description: >-
    A broad hall of worn flagstones at the foot of the human tower. A
    shimmering portal ring is set into the floor.
  tower: human
  floor: 0
  portal: true
  exits:
    up: { to: human_tower_1 }
    north: { to: tower_cellar, locked: true, required_key: cellar_key }
  items: [bread]
- id: human_tower_1
  name: Gallery of Echoes
  description: >-
    A long gallery one flight above the gate hall. Every footstep returns
    twice. A second portal ring glows faintly here.
  tower: human
  floor: 1
  portal: true
  exits:
    down: { to: human_tower_0 }
- id: tower_cellar
  name: Root Cellar
  description: Dust, broken crates, and the smell of old grain.
  dark: true
  tags: [cellar]
  exits:
    south: { to: human_tower_0 }
  items: [rusty_sword]
"#;
        let items_yaml = r#"
- id: bread
  name: loaf of bread
  consumable: true
  heal_amount: 10
  value: 2
- id: healing_draught
  name: healing draught
  consumable: true
  heal_amount: 25
  value: 12
- id: rusty_sword
  name: rusty sword
  slot: weapon
  damage_dice: 1d6
  weapon_type: simple
  value: 8
- id: cellar_key
  name: cellar key
  value: 1
- id: brass_lantern
  name: brass lantern
  slot: held
  light_source: true
  value: 15
- id: rat_tail
  name: rat tail
  value: 1
- id: travel_ration
  name: travel ration
  consumable: true
  heal_amount: 15
  value: 5
"#;
        let npcs_yaml = r#"
- name: tower rat
  description: A rat the size of a terrier, all teeth and mange.
  health: 20
  damage: 1d3
  mob_type: beast
  level: 1
  spawn_room: tower_cellar
  aggressive: true
  flee_threshold: 0.25
  respawn_median: 60
  respawn_variation: 10
  gold: 1d6
  loot:
    - { item_id: rat_tail, chance_pct: 50 }
- name: Gruk the Provisioner
  description: A squat trader who has seen every kind of adventurer fail.
  health: 200
  attackable: false
  spawn_room: human_tower_0
  lore: true
  trainer: Warrior
  shop_inventory: [bread, healing_draught, brass_lantern]
  dialogue:
    - "Gruk says, 'Buy a lantern. The cellar eats the unprepared.'"
    - "Gruk says, 'Rats again. Always rats.'"
  quest_giver: [rat_cull]
"#;
        let spells_yaml = r#"
- id: firebolt
  name: Firebolt
  mana_cost: 10
  cooldown_secs: 6
  target: enemy
  classes: { Mage: 1 }
  effects:
    - { kind: damage, dice: 2d6 }
- id: mend
  name: Mend
  mana_cost: 8
  target: ally
  classes: { Cleric: 1, Paladin: 3 }
  effects:
    - { kind: heal, dice: 2d8+2 }
"#;
        let quests_yaml = r#"
- id: rat_cull
  name: Rat Cull
  description: Gruk wants the cellar rats thinned and proof of the deed.
  giver: Gruk the Provisioner
  objectives:
    - { kind: kill, npc: tower rat, required: 3 }
    - { kind: collect, item: rat_tail, required: 1 }
  reward_xp: 150
  reward_gold: 25
"#;
        let recipes_yaml = r#"
- id: travel_ration
  name: travel ration
  inputs: [bread, bread]
  output: travel_ration
  skill: cooking
"#;

        Self {
            rooms: serde_yaml::from_str(rooms_yaml).expect("builtin rooms"),
            items: serde_yaml::from_str(items_yaml).expect("builtin items"),
            npcs: serde_yaml::from_str(npcs_yaml).expect("builtin npcs"),
            spells: serde_yaml::from_str(spells_yaml).expect("builtin spells"),
            quests: serde_yaml::from_str(quests_yaml).expect("builtin quests"),
            races: default_races(),
            recipes: serde_yaml::from_str(recipes_yaml).expect("builtin recipes"),
            help: HashMap::from([
                (
                    "combat".to_string(),
                    "Attack with 'attack <name>'. Flee with 'flee'. Rounds resolve every few seconds.".to_string(),
                ),
                (
                    "portal".to_string(),
                    "Stand in a portal room and use 'portal' to list floors, 'portal <n>' to travel.".to_string(),
                ),
            ]),
        }
    }
}

/// Validation shared by loaders: loot entries must point at real items.
pub fn validate_loot<'a>(npcs: &'a [NpcDef], items: &HashMap<String, Item>) -> Vec<&'a LootEntry> {
    npcs.iter()
        .flat_map(|npc| npc.loot.iter())
        .filter(|entry| !items.contains_key(&entry.item_id))
        .collect()
}
