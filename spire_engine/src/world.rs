//! The shared world: registries, movement, and the room renderer.
//!
//! Lock discipline, outermost first:
//! 1. the world rwlock guarding the NPC and online-player registries
//!    (usually taken as a reader);
//! 2. room mutexes, by ascending room id when two are needed;
//! 3. entity mutexes — player before NPC, players by ascending name.
//!
//! Room topology and the content catalogs are immutable once `World::new`
//! returns, so most operations only touch one registry lock briefly and
//! then work with per-entity locks.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::chat::ChatFilter;
use crate::class::Race;
use crate::clock::GameClock;
use crate::combat::CombatMetrics;
use crate::config::{RecipeDef, ServerConfig, WorldContent};
use crate::item::Item;
use crate::npc::Npc;
use crate::player::{Player, Pose};
use crate::quest::{QuestDef, note_visit};
use crate::room::{Room, expand_direction, opposite_direction};
use crate::spell::SpellDef;

/// Why a move failed; display strings are shown to the player as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("You can't go that way.")]
    NoExit,
    #[error("The way {0} is locked.")]
    Locked(String),
    #[error("You are rooted in place and cannot move!")]
    Rooted,
    #[error("You're fast asleep. Wake up first.")]
    Asleep,
    #[error("You can't just walk away from a fight. Try 'flee'.")]
    InCombat,
    #[error("You are in no condition to move.")]
    Dead,
    #[error("The way ahead dissolves into nothing.")]
    MissingRoom(String),
}

/// Everything a successful move produced; the caller publishes the
/// broadcasts after this returns (no locks are held by then).
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport {
    pub from: String,
    pub to: String,
    /// Side notes for the mover (standing up, stall closing, discoveries).
    pub notes: Vec<String>,
    pub leave_broadcast: String,
    pub arrive_broadcast: String,
    pub description: String,
}

pub struct World {
    pub rooms: HashMap<String, Arc<Room>>,
    npcs: RwLock<HashMap<Uuid, Arc<Npc>>>,
    players: RwLock<HashMap<String, Arc<Player>>>,

    pub items: HashMap<String, Item>,
    pub spells: HashMap<String, SpellDef>,
    pub quests: HashMap<String, QuestDef>,
    pub races: HashMap<String, Race>,
    pub recipes: HashMap<String, RecipeDef>,
    pub help_topics: HashMap<String, String>,

    pub clock: GameClock,
    pub chat_filter: ChatFilter,
    pub config: ServerConfig,
    pub metrics: CombatMetrics,
    pilgrim_mode: AtomicBool,
    shutting_down: AtomicBool,
}

impl World {
    /// Build the world from validated content. Config errors here are fatal:
    /// the server refuses to start on a dangling exit or spawn room.
    pub fn new(config: ServerConfig, mut content: WorldContent) -> Result<World> {
        let items: HashMap<String, Item> =
            content.items.into_iter().map(|item| (item.id.clone(), item)).collect();

        let mut rooms = HashMap::new();
        for def in &content.rooms {
            let mut floor_items = Vec::new();
            for item_id in &def.items {
                match items.get(item_id) {
                    Some(item) => floor_items.push(item.clone()),
                    None => warn!("room '{}': unknown floor item '{item_id}' skipped", def.id),
                }
            }
            rooms.insert(def.id.clone(), Arc::new(Room::from_def(def, floor_items)));
        }
        for def in &content.rooms {
            for (direction, exit) in &def.exits {
                if !rooms.contains_key(&exit.to) {
                    bail!(
                        "room '{}': exit '{direction}' leads to unknown room '{}'",
                        def.id,
                        exit.to
                    );
                }
            }
        }
        if !rooms.contains_key(&config.starting_room) {
            bail!("starting room '{}' is not defined", config.starting_room);
        }

        let mut npcs = HashMap::new();
        for def in &mut content.npcs {
            def.sanitize();
            if !rooms.contains_key(&def.spawn_room) {
                bail!("npc '{}': spawn room '{}' is not defined", def.name, def.spawn_room);
            }
            for entry in &def.loot {
                if !items.contains_key(&entry.item_id) {
                    warn!("npc '{}': loot item '{}' is not defined", def.name, entry.item_id);
                }
            }
            let npc = Arc::new(Npc::from_def(def));
            npcs.insert(npc.id, npc);
        }

        let spells: HashMap<String, SpellDef> =
            content.spells.into_iter().map(|s| (s.id.clone(), s)).collect();
        let quests: HashMap<String, QuestDef> =
            content.quests.into_iter().map(|q| (q.id.clone(), q)).collect();
        let races: HashMap<String, Race> =
            content.races.into_iter().map(|r| (r.name.clone(), r)).collect();
        let recipes: HashMap<String, RecipeDef> =
            content.recipes.into_iter().map(|r| (r.id.clone(), r)).collect();

        info!(
            "world built: {} rooms, {} npcs, {} item kinds, {} spells, {} quests",
            rooms.len(),
            npcs.len(),
            items.len(),
            spells.len(),
            quests.len()
        );

        let pilgrim = config.pilgrim_mode;
        Ok(World {
            rooms,
            npcs: RwLock::new(npcs),
            players: RwLock::new(HashMap::new()),
            items,
            spells,
            quests,
            races,
            recipes,
            help_topics: content.help,
            clock: GameClock::new(config.starting_hour),
            chat_filter: ChatFilter::new(&config.chat_filter),
            config,
            metrics: CombatMetrics::default(),
            pilgrim_mode: AtomicBool::new(pilgrim),
            shutting_down: AtomicBool::new(false),
        })
    }

    // ---- flags ----

    pub fn pilgrim_mode(&self) -> bool {
        self.pilgrim_mode.load(Ordering::SeqCst)
    }

    pub fn set_pilgrim_mode(&self, on: bool) {
        self.pilgrim_mode.store(on, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    // ---- player registry ----

    /// Register an online player. If a player with the same name was already
    /// online (duplicate login), it is displaced and returned so the caller
    /// can kick its session.
    pub fn register_player(&self, player: Arc<Player>) -> Option<Arc<Player>> {
        let mut players = self.players.write();
        players.insert(player.name.to_lowercase(), player)
    }

    /// Remove a specific player from the world. A displaced duplicate-login
    /// session calling this after a newer session took its name must not
    /// disturb the newer player, so the registry entry and room occupancy
    /// are only touched when they still belong to this exact player.
    pub fn unregister_player(&self, player: &Arc<Player>) -> bool {
        let key = player.name.to_lowercase();
        let mut players = self.players.write();
        let owns_name = players.get(&key).is_some_and(|current| Arc::ptr_eq(current, player));
        if !owns_name {
            return false;
        }
        players.remove(&key);
        drop(players);
        let room_id = player.current_room();
        if let Some(room) = self.rooms.get(&room_id) {
            room.remove_occupant(&player.name);
        }
        true
    }

    pub fn find_player(&self, name: &str) -> Option<Arc<Player>> {
        self.players.read().get(&name.trim().to_lowercase()).cloned()
    }

    pub fn online_players(&self) -> Vec<Arc<Player>> {
        self.players.read().values().cloned().collect()
    }

    pub fn online_count(&self) -> usize {
        self.players.read().len()
    }

    pub fn players_in_room(&self, room_id: &str) -> Vec<Arc<Player>> {
        self.players
            .read()
            .values()
            .filter(|p| p.state().current_room == room_id)
            .cloned()
            .collect()
    }

    /// Put a freshly loaded player into their room (login path).
    pub fn place_player(&self, player: &Arc<Player>) -> Result<()> {
        let room_id = {
            let mut state = player.state();
            if !self.rooms.contains_key(&state.current_room) {
                warn!(
                    "player '{}' was in unknown room '{}'; moving to start",
                    player.name, state.current_room
                );
                state.current_room = self.config.starting_room.clone();
            }
            state.current_room.clone()
        };
        let room = self
            .rooms
            .get(&room_id)
            .with_context(|| format!("room '{room_id}' missing"))?;
        room.add_occupant(&player.name);
        Ok(())
    }

    // ---- npc registry ----

    pub fn add_npc(&self, npc: Arc<Npc>) {
        self.npcs.write().insert(npc.id, npc);
    }

    pub fn npc_by_id(&self, id: Uuid) -> Option<Arc<Npc>> {
        self.npcs.read().get(&id).cloned()
    }

    pub fn all_npcs(&self) -> Vec<Arc<Npc>> {
        self.npcs.read().values().cloned().collect()
    }

    pub fn npcs_in_room(&self, room_id: &str) -> Vec<Arc<Npc>> {
        self.npcs
            .read()
            .values()
            .filter(|npc| npc.current_room().as_deref() == Some(room_id))
            .cloned()
            .collect()
    }

    pub fn find_npc_in_room(&self, room_id: &str, query: &str) -> Option<Arc<Npc>> {
        self.npcs_in_room(room_id).into_iter().find(|npc| npc.matches(query))
    }

    pub fn npcs_in_combat(&self) -> Vec<Arc<Npc>> {
        self.npcs.read().values().filter(|npc| npc.in_combat()).cloned().collect()
    }

    // ---- movement ----

    /// Move a player through an exit, updating room occupancy and the
    /// player's own room atomically under the ordered locks. Returns the
    /// report whose broadcasts the caller publishes after locks are gone.
    pub fn move_player(&self, player: &Arc<Player>, direction_raw: &str) -> Result<MoveReport, MoveError> {
        let direction = expand_direction(direction_raw.trim().to_lowercase().as_str()).to_string();
        let now = Instant::now();

        loop {
            let current_id = {
                let mut state = player.state();
                if state.is_dead() {
                    return Err(MoveError::Dead);
                }
                if state.pose == Pose::Sleeping {
                    return Err(MoveError::Asleep);
                }
                if state.in_combat {
                    return Err(MoveError::InCombat);
                }
                if state.status.is_rooted(now) {
                    return Err(MoveError::Rooted);
                }
                state.current_room.clone()
            };

            let room = self
                .rooms
                .get(&current_id)
                .ok_or_else(|| MoveError::MissingRoom(current_id.clone()))?;
            let exit = room.exits.get(&direction).ok_or(MoveError::NoExit)?;
            if exit.locked {
                let has_key = exit
                    .required_key
                    .as_deref()
                    .is_some_and(|key| player.state().has_key(key));
                if !has_key {
                    return Err(MoveError::Locked(direction.clone()));
                }
            }
            let dest = self
                .rooms
                .get(&exit.to)
                .ok_or_else(|| MoveError::MissingRoom(exit.to.clone()))?;

            let mut notes = Vec::new();
            let moved = Room::transfer_occupant(room, dest, &player.name, || {
                let mut state = player.state();
                if state.current_room != current_id {
                    // A tick or another command moved us between the peek
                    // and the room locks; retry from the top.
                    return false;
                }
                if matches!(state.pose, Pose::Sitting | Pose::Resting) {
                    state.pose = Pose::Standing;
                    notes.push("You stand up.".to_string());
                }
                if state.stall.as_ref().is_some_and(|stall| stall.room == current_id) && state.close_stall() {
                    notes.push("You pack up your stall.".to_string());
                }
                state.current_room = dest.id.clone();
                state.touch();
                state.statistics.rooms_visited += 1;

                if let Some(tower) = dest.tower.clone() {
                    if dest.portal {
                        let floor = dest.floor.unwrap_or(0);
                        if state.portals.discover(&tower, floor) {
                            notes.push(format!(
                                "You attune to the {tower} tower portal on floor {floor}."
                            ));
                        }
                    } else {
                        state.portals.visit_tower(&tower);
                    }
                }
                if dest.tags.contains("labyrinth_gate") {
                    state.visited_gates.insert(dest.id.clone());
                }
                let quest_notes = note_visit(&mut state.quest_log, &self.quests, &dest.id);
                notes.extend(quest_notes);
                true
            });
            if !moved {
                continue;
            }

            let arrive_broadcast = match opposite_direction(&direction) {
                Some(from_dir) => format!("{} arrives from the {from_dir}.", player.name),
                None => format!("{} arrives.", player.name),
            };
            return Ok(MoveReport {
                from: current_id,
                to: dest.id.clone(),
                notes,
                leave_broadcast: format!("{} leaves to the {direction}.", player.name),
                arrive_broadcast,
                description: self.describe_room(dest, player),
            });
        }
    }

    /// Instantly relocate a player (portals, admin teleport, summons).
    /// Same occupancy discipline as walking, no exit required.
    pub fn teleport_player(&self, player: &Arc<Player>, dest_id: &str) -> Result<MoveReport, MoveError> {
        loop {
            let current_id = player.current_room();
            let from = self
                .rooms
                .get(&current_id)
                .ok_or_else(|| MoveError::MissingRoom(current_id.clone()))?;
            let to = self
                .rooms
                .get(dest_id)
                .ok_or_else(|| MoveError::MissingRoom(dest_id.to_string()))?;

            let mut notes = Vec::new();
            let moved = Room::transfer_occupant(from, to, &player.name, || {
                let mut state = player.state();
                if state.current_room != current_id {
                    return false;
                }
                if state.stall.as_ref().is_some_and(|stall| stall.room == current_id) && state.close_stall() {
                    notes.push("You pack up your stall.".to_string());
                }
                state.current_room = to.id.clone();
                state.touch();
                if let Some(tower) = to.tower.clone() {
                    if to.portal {
                        state.portals.discover(&tower, to.floor.unwrap_or(0));
                    } else {
                        state.portals.visit_tower(&tower);
                    }
                }
                let quest_notes = note_visit(&mut state.quest_log, &self.quests, &to.id);
                notes.extend(quest_notes);
                true
            });
            if !moved {
                continue;
            }
            return Ok(MoveReport {
                from: current_id,
                to: to.id.clone(),
                notes,
                leave_broadcast: format!("{} vanishes in a swirl of light.", player.name),
                arrive_broadcast: format!("{} appears in a swirl of light.", player.name),
                description: self.describe_room(to, player),
            });
        }
    }

    // ---- rendering ----

    /// Render a room for one observer: name, description, exits, floor
    /// items (minus unique items the observer already owns), NPCs, and
    /// other players. Dark rooms need a light source.
    pub fn describe_room(&self, room: &Room, observer: &Arc<Player>) -> String {
        if room.dark && !observer.state().has_light() {
            return format!("{}\nIt is pitch black here. You cannot see a thing.", room.name);
        }

        let mut lines = vec![room.name.clone()];
        if !room.description.is_empty() {
            lines.push(textwrap::fill(&room.description, 78));
        }

        let mut exits: Vec<&str> = room.exits.keys().map(String::as_str).collect();
        exits.sort_unstable();
        if exits.is_empty() {
            lines.push("There are no obvious exits.".to_string());
        } else {
            lines.push(format!("Exits: {}.", exits.join(", ")));
        }

        let owned_uniques = observer.state().owned_unique_ids();
        let item_names: Vec<String> = room
            .peek_items()
            .into_iter()
            .filter(|item| !owned_uniques.contains(&item.id))
            .map(|item| item.name)
            .collect();
        if !item_names.is_empty() {
            lines.push(format!("You see: {}.", item_names.join(", ")));
        }

        for npc in self.npcs_in_room(&room.id) {
            if npc.aggressive {
                lines.push(format!("{} is here, watching you hungrily.", npc.name));
            } else {
                lines.push(format!("{} is here.", npc.name));
            }
        }

        let others: Vec<String> = room
            .occupants()
            .into_iter()
            .filter(|name| !name.eq_ignore_ascii_case(&observer.name))
            .collect();
        if !others.is_empty() {
            lines.push(format!("Also here: {}.", others.join(", ")));
        }

        lines.join("\n")
    }

    // ---- invariants ----

    /// Cross-check the occupancy and lifecycle invariants; returns one line
    /// per violation. Clean worlds return an empty list. Used by tests and
    /// the admin `audit` verb.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for player in self.online_players() {
            let room_id = player.current_room();
            match self.rooms.get(&room_id) {
                None => problems.push(format!("player '{}' is in unknown room '{room_id}'", player.name)),
                Some(room) if !room.has_occupant(&player.name) => problems.push(format!(
                    "player '{}' not in occupant set of '{room_id}'",
                    player.name
                )),
                Some(_) => {}
            }
            let containing: Vec<&String> = self
                .rooms
                .values()
                .filter(|room| room.has_occupant(&player.name))
                .map(|room| &room.id)
                .collect();
            if containing.len() != 1 {
                problems.push(format!(
                    "player '{}' appears in {} occupant sets: {containing:?}",
                    player.name,
                    containing.len()
                ));
            }
        }

        for npc in self.all_npcs() {
            let state = npc.state();
            if state.health > 0 {
                if state.current_room.is_none() {
                    problems.push(format!("living npc '{}' has no room", npc.name));
                }
                if state.death_time.is_some() || state.respawn_at.is_some() {
                    problems.push(format!("living npc '{}' carries death timers", npc.name));
                }
            } else if npc.respawn_median == 0 {
                if state.respawn_at.is_some() {
                    problems.push(format!("npc '{}' has a respawn despite median 0", npc.name));
                }
            } else {
                match (state.death_time, state.respawn_at) {
                    (Some(died), Some(respawn)) if respawn >= died + std::time::Duration::from_secs(1) => {}
                    _ => problems.push(format!("dead npc '{}' has a bad respawn window", npc.name)),
                }
            }
        }

        problems
    }
}
