//! NPCs: definitions, live instances, threat, flee, death, and respawn.

use log::warn;
use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use rand::prelude::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::class::ClassName;
use crate::dice::{DiceExpr, chance, percent_chance};
use crate::status::StatusTimers;

/// Chance per combat round that a wounded, non-rooted NPC breaks off.
pub const FLEE_CHANCE: f32 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobType {
    Beast,
    #[default]
    Humanoid,
    Undead,
    Demon,
    Construct,
    Giant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootEntry {
    pub item_id: String,
    /// Drop chance in percent; bosses ignore this and drop everything.
    pub chance_pct: u32,
}

/// An NPC definition as authored in the content files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub health: i32,
    #[serde(default = "default_damage")]
    pub damage: DiceExpr,
    #[serde(default)]
    pub armor: i32,
    #[serde(default)]
    pub aggressive: bool,
    #[serde(default = "default_true")]
    pub attackable: bool,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub mob_type: MobType,
    #[serde(default)]
    pub boss: bool,
    #[serde(default)]
    pub boss_floor: Option<u32>,
    pub spawn_room: String,
    #[serde(default)]
    pub loot: Vec<LootEntry>,
    #[serde(default)]
    pub gold: Option<DiceExpr>,
    #[serde(default)]
    pub shop_inventory: Vec<String>,
    #[serde(default)]
    pub dialogue: Vec<String>,
    /// Median seconds until respawn; zero means the NPC never respawns.
    #[serde(default)]
    pub respawn_median: u64,
    #[serde(default)]
    pub respawn_variation: u64,
    /// HP fraction at or below which a non-boss tries to flee; zero disables.
    #[serde(default)]
    pub flee_threshold: f32,
    #[serde(default)]
    pub trainer: Option<ClassName>,
    #[serde(default)]
    pub quest_giver: Vec<String>,
    /// Lore NPCs are tracked in the player's talked-to set.
    #[serde(default)]
    pub lore: bool,
}

fn default_damage() -> DiceExpr {
    DiceExpr::new(1, 4, 0)
}
fn default_true() -> bool {
    true
}
fn default_level() -> u32 {
    1
}

impl NpcDef {
    /// Repair definitions that are inconsistent but salvageable.
    pub fn sanitize(&mut self) {
        if self.aggressive && !self.attackable {
            warn!("npc '{}': aggressive but not attackable; forcing attackable", self.name);
            self.attackable = true;
        }
        if self.flee_threshold < 0.0 || self.flee_threshold > 1.0 {
            warn!(
                "npc '{}': flee_threshold {} out of range; clamping",
                self.name, self.flee_threshold
            );
            self.flee_threshold = self.flee_threshold.clamp(0.0, 1.0);
        }
        if self.health <= 0 {
            warn!("npc '{}': non-positive health {}; forcing 1", self.name, self.health);
            self.health = 1;
        }
    }
}

/// Mutable half of an NPC, guarded by the instance mutex.
#[derive(Debug)]
pub struct NpcState {
    pub health: i32,
    pub max_health: i32,
    pub current_room: Option<String>,
    pub in_combat: bool,
    /// Engaged players in engagement order; the order breaks threat ties.
    pub targets: Vec<String>,
    pub threat: HashMap<String, i64>,
    pub status: StatusTimers,
    pub death_time: Option<Instant>,
    pub respawn_at: Option<Instant>,
}

impl NpcState {
    fn new(health: i32, room: &str) -> Self {
        Self {
            health,
            max_health: health,
            current_room: Some(room.to_string()),
            in_combat: false,
            targets: Vec::new(),
            threat: HashMap::new(),
            status: StatusTimers::new(),
            death_time: None,
            respawn_at: None,
        }
    }

    pub fn engage(&mut self, player: &str) {
        self.in_combat = true;
        if !self.targets.iter().any(|t| t == player) {
            self.targets.push(player.to_string());
            self.threat.entry(player.to_string()).or_insert(0);
        }
    }

    pub fn add_threat(&mut self, player: &str, amount: i64) {
        *self.threat.entry(player.to_string()).or_insert(0) += amount;
    }

    pub fn drop_target(&mut self, player: &str) {
        self.targets.retain(|t| t != player);
        self.threat.remove(player);
        if self.targets.is_empty() {
            self.in_combat = false;
        }
    }

    pub fn disengage(&mut self) {
        self.in_combat = false;
        self.targets.clear();
        self.threat.clear();
    }

    /// Pick the engaged player with the most threat among those present.
    ///
    /// Ties (including the all-zero case right after engagement) go to
    /// whoever engaged first. If every threat entry is missing, any present
    /// target is picked at random.
    pub fn highest_threat_target(&self, present: &[String]) -> Option<String> {
        let candidates: Vec<&String> = self
            .targets
            .iter()
            .filter(|t| present.iter().any(|p| p.eq_ignore_ascii_case(t)))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        if self.threat.is_empty() {
            let mut rng = rand::rng();
            return candidates.choose(&mut rng).map(|s| (*s).clone());
        }
        let mut best: Option<(&String, i64)> = None;
        for candidate in candidates {
            let threat = self.threat.get(candidate).copied().unwrap_or(0);
            match best {
                Some((_, top)) if threat <= top => {}
                _ => best = Some((candidate, threat)),
            }
        }
        best.map(|(name, _)| name.clone())
    }
}

/// A live NPC instance: immutable definition fields on the shell, combat
/// and lifecycle state behind the mutex.
#[derive(Debug)]
pub struct Npc {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub level: u32,
    pub damage: DiceExpr,
    pub armor: i32,
    pub aggressive: bool,
    pub attackable: bool,
    pub mob_type: MobType,
    pub boss: bool,
    pub boss_floor: Option<u32>,
    pub original_room: String,
    pub loot: Vec<LootEntry>,
    pub gold: Option<DiceExpr>,
    pub shop_inventory: Vec<String>,
    pub dialogue: Vec<String>,
    pub respawn_median: u64,
    pub respawn_variation: u64,
    pub flee_threshold: f32,
    pub trainer: Option<ClassName>,
    pub quest_giver: Vec<String>,
    pub lore: bool,
    state: Mutex<NpcState>,
}

impl Npc {
    pub fn from_def(def: &NpcDef) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: def.name.clone(),
            description: def.description.clone(),
            level: def.level,
            damage: def.damage.clone(),
            armor: def.armor,
            aggressive: def.aggressive,
            attackable: def.attackable,
            mob_type: def.mob_type,
            boss: def.boss,
            boss_floor: def.boss_floor,
            original_room: def.spawn_room.clone(),
            loot: def.loot.clone(),
            gold: def.gold.clone(),
            shop_inventory: def.shop_inventory.clone(),
            dialogue: def.dialogue.clone(),
            respawn_median: def.respawn_median,
            respawn_variation: def.respawn_variation,
            flee_threshold: def.flee_threshold,
            trainer: def.trainer,
            quest_giver: def.quest_giver.clone(),
            lore: def.lore,
            state: Mutex::new(NpcState::new(def.health, &def.spawn_room)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, NpcState> {
        self.state.lock()
    }

    pub fn is_alive(&self) -> bool {
        self.state().health > 0
    }

    pub fn current_room(&self) -> Option<String> {
        self.state().current_room.clone()
    }

    pub fn in_combat(&self) -> bool {
        self.state().in_combat
    }

    /// Case-insensitive match against a typed target name.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return false;
        }
        let name = self.name.to_lowercase();
        name == q || name.starts_with(&q) || name.split_whitespace().any(|word| word == q)
    }

    /// Whether the NPC wants out of the fight this round.
    pub fn wants_to_flee(&self, state: &NpcState) -> bool {
        if self.boss || self.flee_threshold <= 0.0 || state.max_health <= 0 {
            return false;
        }
        let fraction = state.health as f32 / state.max_health as f32;
        state.health > 0 && fraction <= self.flee_threshold
    }

    /// Roll the once-per-round flee attempt.
    pub fn rolls_flee(&self) -> bool {
        chance(FLEE_CHANCE)
    }

    /// Mark the NPC dead (or fled) and compute its respawn instant:
    /// `now + median ± uniform(variation)`, never less than one second.
    /// A zero median means it never returns.
    pub fn schedule_respawn(state: &mut NpcState, now: Instant, median: u64, variation: u64) {
        state.health = 0;
        state.current_room = None;
        state.disengage();
        state.status.reset();
        state.death_time = Some(now);
        state.respawn_at = if median == 0 {
            None
        } else {
            let jitter = if variation == 0 {
                0
            } else {
                rand::rng().random_range(-(variation as i64)..=variation as i64)
            };
            let secs = (median as i64 + jitter).max(1) as u64;
            Some(now + Duration::from_secs(secs))
        };
    }

    pub fn respawn_due(&self, now: Instant) -> bool {
        let state = self.state();
        state.health == 0 && state.respawn_at.is_some_and(|at| at <= now)
    }

    /// Put the NPC back at its spawn point at full strength.
    pub fn revive(&self) {
        let mut state = self.state();
        state.health = state.max_health;
        state.current_room = Some(self.original_room.clone());
        state.disengage();
        state.status.reset();
        state.death_time = None;
        state.respawn_at = None;
    }

    /// Item ids dropped on death. Bosses drop every entry; everything else
    /// rolls each entry independently against its chance.
    pub fn roll_loot(&self) -> Vec<String> {
        self.loot
            .iter()
            .filter(|entry| self.boss || percent_chance(entry.chance_pct))
            .map(|entry| entry.item_id.clone())
            .collect()
    }

    pub fn roll_gold(&self) -> i64 {
        self.gold.as_ref().map_or(0, |dice| i64::from(dice.roll().max(0)))
    }

    pub fn random_dialogue(&self) -> Option<String> {
        let mut rng = rand::rng();
        self.dialogue.choose(&mut rng).cloned()
    }
}
