//! The persistence façade: character snapshots and the store trait.
//!
//! The engine never talks to a schema. A `CharacterSnapshot` is a flat,
//! serializable projection — comma-joined id lists, JSON blobs for the
//! quest log, class levels, and statistics — and a `CharacterStore` moves
//! snapshots in and out of wherever they live (files here; SQL would fit
//! behind the same trait). Saves are best-effort: callers log failures and
//! play on.

use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::class::ClassLevels;
use crate::item::{Item, Slot};
use crate::player::{Player, PlayerState};
use crate::portal::PortalAtlas;
use crate::quest::QuestLog;
use crate::statistics::Statistics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub characters: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    pub id: Uuid,
    pub name: String,
    pub level: u32,
    pub class: String,
}

/// Flat persisted form of one character; every §persisted field, nothing
/// runtime-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub character_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub level: u32,
    pub experience: u64,
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
    pub current_room: String,
    pub home_tower: String,
    pub gold: i64,
    pub max_health: i32,
    pub max_mana: i32,
    /// Item id lists; equipment entries are `slot:item_id`.
    pub inventory: Vec<String>,
    pub equipment: Vec<String>,
    pub key_ring: Vec<String>,
    pub quest_items: Vec<String>,
    pub class_levels_json: String,
    pub active_class: Option<String>,
    pub race: String,
    pub learned_spells_csv: String,
    pub known_recipes_csv: String,
    /// `"skill:level,skill:level"`.
    pub crafting_skills: String,
    pub quest_log_json: String,
    pub statistics_json: String,
    /// Legacy `"0,1,5"` or multi-tower `"human:0,1,5;elf:0,3"`.
    pub portals: String,
    pub visited_gates_csv: String,
    pub lore_talks_csv: String,
    pub titles_csv: String,
    pub active_title: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage i/o: {0}")]
    Io(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("account name already taken")]
    AccountExists,
    #[error("character name already taken")]
    NameTaken,
}

/// The repository the engine saves into and loads from.
pub trait CharacterStore: Send + Sync {
    fn find_account(&self, username: &str) -> Result<Option<AccountRecord>, StoreError>;
    fn create_account(&self, username: &str, password_hash: &str) -> Result<AccountRecord, StoreError>;
    fn characters_for(&self, account_id: Uuid) -> Result<Vec<CharacterSummary>, StoreError>;
    fn character_name_taken(&self, name: &str) -> Result<bool, StoreError>;
    /// Register a brand-new character under an account and persist it.
    fn attach_character(&self, account_id: Uuid, snapshot: &CharacterSnapshot) -> Result<(), StoreError>;
    fn load(&self, character_id: Uuid) -> Result<Option<CharacterSnapshot>, StoreError>;
    fn save(&self, snapshot: &CharacterSnapshot) -> Result<(), StoreError>;
}

/// SHA-256 hex digest; what goes in `AccountRecord::password_hash`.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn join_csv<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(",")
}

fn split_csv(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
}

impl Player {
    /// Project the live state into its persisted form.
    pub fn snapshot(&self) -> CharacterSnapshot {
        let state = self.state();
        let home = state.home_tower.clone();
        CharacterSnapshot {
            character_id: self.character_id,
            account_id: self.account_id,
            name: self.name.clone(),
            level: state.level,
            experience: state.experience,
            strength: state.abilities.strength,
            dexterity: state.abilities.dexterity,
            constitution: state.abilities.constitution,
            intelligence: state.abilities.intelligence,
            wisdom: state.abilities.wisdom,
            charisma: state.abilities.charisma,
            current_room: state.current_room.clone(),
            home_tower: home.clone(),
            gold: state.gold,
            max_health: state.max_health,
            max_mana: state.max_mana,
            inventory: state.inventory.iter().map(|item| item.id.clone()).collect(),
            equipment: state
                .equipment
                .iter()
                .map(|(slot, item)| format!("{}:{}", slot.label(), item.id))
                .collect(),
            key_ring: state.key_ring.iter().map(|item| item.id.clone()).collect(),
            quest_items: state.quest_items.iter().map(|item| item.id.clone()).collect(),
            class_levels_json: state.classes.to_json(),
            active_class: state.active_class.map(|class| class.to_string()),
            race: state.race.clone(),
            learned_spells_csv: join_csv(state.learned_spells.iter().map(String::as_str)),
            known_recipes_csv: join_csv(state.known_recipes.iter().map(String::as_str)),
            crafting_skills: state
                .crafting_skills
                .iter()
                .map(|(skill, level)| format!("{skill}:{level}"))
                .collect::<Vec<_>>()
                .join(","),
            quest_log_json: state.quest_log.to_json(),
            statistics_json: state.statistics.to_json(),
            portals: state.portals.serialize(&home),
            visited_gates_csv: join_csv(state.visited_gates.iter().map(String::as_str)),
            lore_talks_csv: join_csv(state.lore_talks.iter().map(String::as_str)),
            titles_csv: join_csv(state.titles.iter().map(String::as_str)),
            active_title: state.active_title.clone(),
            is_admin: state.is_admin,
        }
    }
}

/// Rebuild live state from a snapshot, resolving item ids through the
/// catalog. Unknown ids are dropped with a warning rather than wedging the
/// login.
pub fn restore_state(snapshot: &CharacterSnapshot, items: &HashMap<String, Item>) -> PlayerState {
    let lookup = |id: &str| -> Option<Item> {
        let found = items.get(id).cloned();
        if found.is_none() {
            warn!("character '{}': unknown item '{id}' dropped on load", snapshot.name);
        }
        found
    };

    let mut state = PlayerState::basic(&snapshot.current_room);
    state.home_tower = snapshot.home_tower.clone();
    state.level = snapshot.level;
    state.experience = snapshot.experience;
    state.abilities.strength = snapshot.strength;
    state.abilities.dexterity = snapshot.dexterity;
    state.abilities.constitution = snapshot.constitution;
    state.abilities.intelligence = snapshot.intelligence;
    state.abilities.wisdom = snapshot.wisdom;
    state.abilities.charisma = snapshot.charisma;
    state.gold = snapshot.gold;
    state.max_health = snapshot.max_health;
    state.max_mana = snapshot.max_mana;
    state.health = snapshot.max_health;
    state.mana = snapshot.max_mana;

    state.inventory = snapshot.inventory.iter().filter_map(|id| lookup(id)).collect();
    state.key_ring = snapshot.key_ring.iter().filter_map(|id| lookup(id)).collect();
    state.quest_items = snapshot.quest_items.iter().filter_map(|id| lookup(id)).collect();
    for entry in &snapshot.equipment {
        let Some((slot_label, item_id)) = entry.split_once(':') else {
            warn!("character '{}': bad equipment entry '{entry}'", snapshot.name);
            continue;
        };
        match (Slot::from_label(slot_label), lookup(item_id)) {
            (Some(slot), Some(item)) => {
                state.equipment.insert(slot, item);
            }
            _ => warn!("character '{}': unrestorable equipment '{entry}'", snapshot.name),
        }
    }

    state.classes = ClassLevels::from_json(&snapshot.class_levels_json).unwrap_or_else(|err| {
        warn!("character '{}': bad class levels ({err}); resetting", snapshot.name);
        ClassLevels::default()
    });
    state.active_class = snapshot.active_class.as_deref().and_then(|name| name.parse().ok());
    state.race = snapshot.race.clone();
    state.learned_spells = split_csv(&snapshot.learned_spells_csv).collect();
    state.known_recipes = split_csv(&snapshot.known_recipes_csv).collect();
    state.crafting_skills = snapshot
        .crafting_skills
        .split(',')
        .filter_map(|part| {
            let (skill, level) = part.trim().split_once(':')?;
            Some((skill.to_string(), level.parse().ok()?))
        })
        .collect::<BTreeMap<String, u32>>();
    state.quest_log = QuestLog::from_json(&snapshot.quest_log_json).unwrap_or_else(|err| {
        warn!("character '{}': bad quest log ({err}); resetting", snapshot.name);
        QuestLog::default()
    });
    state.statistics = Statistics::from_json(&snapshot.statistics_json).unwrap_or_else(|err| {
        warn!("character '{}': bad statistics ({err}); resetting", snapshot.name);
        Statistics::default()
    });
    state.portals = PortalAtlas::parse(&snapshot.portals, &snapshot.home_tower);
    state.visited_gates = split_csv(&snapshot.visited_gates_csv).collect();
    state.lore_talks = split_csv(&snapshot.lore_talks_csv).collect();
    state.titles = split_csv(&snapshot.titles_csv).collect();
    state.active_title = snapshot.active_title.clone();
    state.is_admin = snapshot.is_admin;
    state
}

fn summary_of(snapshot: &CharacterSnapshot) -> CharacterSummary {
    CharacterSummary {
        id: snapshot.character_id,
        name: snapshot.name.clone(),
        level: snapshot.level,
        class: snapshot.active_class.clone().unwrap_or_else(|| "adventurer".to_string()),
    }
}

/// In-memory store for tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<String, AccountRecord>>,
    characters: Mutex<HashMap<Uuid, CharacterSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CharacterStore for MemoryStore {
    fn attach_character(&self, account_id: Uuid, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .values_mut()
            .find(|acct| acct.id == account_id)
            .ok_or_else(|| StoreError::Corrupt("unknown account".into()))?;
        account.characters.push(snapshot.character_id);
        drop(accounts);
        self.save(snapshot)
    }

    fn find_account(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.accounts.lock().get(&username.to_lowercase()).cloned())
    }

    fn create_account(&self, username: &str, password_hash: &str) -> Result<AccountRecord, StoreError> {
        let key = username.to_lowercase();
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&key) {
            return Err(StoreError::AccountExists);
        }
        let record = AccountRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            characters: Vec::new(),
        };
        accounts.insert(key, record.clone());
        Ok(record)
    }

    fn characters_for(&self, account_id: Uuid) -> Result<Vec<CharacterSummary>, StoreError> {
        let characters = self.characters.lock();
        Ok(characters
            .values()
            .filter(|snap| snap.account_id == account_id)
            .map(summary_of)
            .collect())
    }

    fn character_name_taken(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .characters
            .lock()
            .values()
            .any(|snap| snap.name.eq_ignore_ascii_case(name)))
    }

    fn load(&self, character_id: Uuid) -> Result<Option<CharacterSnapshot>, StoreError> {
        Ok(self.characters.lock().get(&character_id).cloned())
    }

    fn save(&self, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
        self.characters.lock().insert(snapshot.character_id, snapshot.clone());
        Ok(())
    }
}

/// JSON files on disk: `accounts.json` plus one file per character.
pub struct FileStore {
    root: PathBuf,
    accounts: Mutex<HashMap<String, AccountRecord>>,
}

impl FileStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root.join("characters")).map_err(|e| StoreError::Io(e.to_string()))?;
        let accounts_path = root.join("accounts.json");
        let accounts = if accounts_path.exists() {
            let text = fs::read_to_string(&accounts_path).map_err(|e| StoreError::Io(e.to_string()))?;
            serde_json::from_str(&text).map_err(|e| StoreError::Corrupt(e.to_string()))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            root: root.to_path_buf(),
            accounts: Mutex::new(accounts),
        })
    }

    fn persist_accounts(&self, accounts: &HashMap<String, AccountRecord>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(accounts).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        write_atomic(&self.root.join("accounts.json"), &text)
    }

    fn character_path(&self, id: Uuid) -> PathBuf {
        self.root.join("characters").join(format!("{id}.json"))
    }
}

/// Write via a sibling temp file and rename, so a crash mid-save never
/// leaves a truncated record.
fn write_atomic(path: &Path, text: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text).map_err(|e| StoreError::Io(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::Io(e.to_string()))
}

impl CharacterStore for FileStore {
    fn attach_character(&self, account_id: Uuid, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
        {
            let mut accounts = self.accounts.lock();
            let account = accounts
                .values_mut()
                .find(|acct| acct.id == account_id)
                .ok_or_else(|| StoreError::Corrupt("unknown account".into()))?;
            account.characters.push(snapshot.character_id);
            self.persist_accounts(&accounts)?;
        }
        self.save(snapshot)
    }

    fn find_account(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self.accounts.lock().get(&username.to_lowercase()).cloned())
    }

    fn create_account(&self, username: &str, password_hash: &str) -> Result<AccountRecord, StoreError> {
        let key = username.to_lowercase();
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&key) {
            return Err(StoreError::AccountExists);
        }
        let record = AccountRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            characters: Vec::new(),
        };
        accounts.insert(key, record.clone());
        self.persist_accounts(&accounts)?;
        Ok(record)
    }

    fn characters_for(&self, account_id: Uuid) -> Result<Vec<CharacterSummary>, StoreError> {
        let ids: Vec<Uuid> = {
            let accounts = self.accounts.lock();
            accounts
                .values()
                .find(|acct| acct.id == account_id)
                .map(|acct| acct.characters.clone())
                .unwrap_or_default()
        };
        let mut summaries = Vec::new();
        for id in ids {
            if let Some(snapshot) = self.load(id)? {
                summaries.push(summary_of(&snapshot));
            }
        }
        Ok(summaries)
    }

    fn character_name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let dir = self.root.join("characters");
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let Ok(text) = fs::read_to_string(entry.path()) else {
                continue;
            };
            if let Ok(snapshot) = serde_json::from_str::<CharacterSnapshot>(&text) {
                if snapshot.name.eq_ignore_ascii_case(name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn load(&self, character_id: Uuid) -> Result<Option<CharacterSnapshot>, StoreError> {
        let path = self.character_path(character_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
    }

    fn save(&self, snapshot: &CharacterSnapshot) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(snapshot).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        write_atomic(&self.character_path(snapshot.character_id), &text)
    }
}

/// Snapshot one player into a store, logging instead of propagating; used
/// by checkpoints, disconnects, and `saveall`.
pub fn save_player(store: &Arc<dyn CharacterStore>, player: &Player) {
    let snapshot = player.snapshot();
    if let Err(err) = store.save(&snapshot) {
        warn!("saving character '{}' failed: {err}", player.name);
    }
}
