//! Quest definitions and the per-player quest log.
//!
//! The log tracks a counter vector per active quest; counters clamp at their
//! objective requirement and completion means every counter is full.
//! Progress hooks are called from combat (kills), inventory (collection),
//! and movement (visits).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a single quest objective asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectiveKind {
    Kill { npc: String },
    Collect { item: String },
    Visit { room: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveDef {
    #[serde(flatten)]
    pub kind: ObjectiveKind,
    pub required: u32,
    #[serde(default)]
    pub description: String,
}

impl ObjectiveDef {
    /// The authored description, or a serviceable one built from the kind.
    pub fn description_or_kind(&self) -> String {
        if !self.description.is_empty() {
            return self.description.clone();
        }
        match &self.kind {
            ObjectiveKind::Kill { npc } => format!("Defeat {npc}"),
            ObjectiveKind::Collect { item } => format!("Collect {item}"),
            ObjectiveKind::Visit { room } => format!("Reach {room}"),
        }
    }
}

/// A quest as authored in the content files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// NPC that hands the quest out and takes the turn-in.
    #[serde(default)]
    pub giver: Option<String>,
    #[serde(default)]
    pub required_level: u32,
    #[serde(default)]
    pub repeatable: bool,
    pub objectives: Vec<ObjectiveDef>,
    #[serde(default)]
    pub reward_xp: u64,
    #[serde(default)]
    pub reward_gold: i64,
    #[serde(default)]
    pub reward_items: Vec<String>,
}

/// Progress against one objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectiveProgress {
    pub current: u32,
    pub required: u32,
}

impl ObjectiveProgress {
    pub fn is_met(&self) -> bool {
        self.current >= self.required
    }
}

/// A player's active and completed quests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestLog {
    #[serde(default)]
    active: BTreeMap<String, Vec<ObjectiveProgress>>,
    #[serde(default)]
    completed: BTreeSet<String>,
}

impl QuestLog {
    /// Begin tracking a quest. Fails if it is already active or was
    /// completed and is not repeatable (the caller checks repeatability).
    pub fn accept(&mut self, quest_id: &str, required: &[u32]) -> bool {
        if self.active.contains_key(quest_id) || self.completed.contains(quest_id) {
            return false;
        }
        let progress = required
            .iter()
            .map(|&required| ObjectiveProgress { current: 0, required })
            .collect();
        self.active.insert(quest_id.to_string(), progress);
        true
    }

    pub fn abandon(&mut self, quest_id: &str) -> bool {
        self.active.remove(quest_id).is_some()
    }

    pub fn is_active(&self, quest_id: &str) -> bool {
        self.active.contains_key(quest_id)
    }

    pub fn is_completed(&self, quest_id: &str) -> bool {
        self.completed.contains(quest_id)
    }

    pub fn progress(&self, quest_id: &str) -> Option<&[ObjectiveProgress]> {
        self.active.get(quest_id).map(Vec::as_slice)
    }

    pub fn active_ids(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    /// Bump one objective counter, clamped at its requirement.
    /// Returns true if the counter actually moved.
    pub fn record(&mut self, quest_id: &str, objective_idx: usize, amount: u32) -> bool {
        let Some(progress) = self.active.get_mut(quest_id) else {
            return false;
        };
        let Some(entry) = progress.get_mut(objective_idx) else {
            return false;
        };
        if entry.is_met() {
            return false;
        }
        entry.current = (entry.current + amount).min(entry.required);
        true
    }

    /// True when every objective counter is full.
    pub fn is_complete(&self, quest_id: &str) -> bool {
        self.active
            .get(quest_id)
            .is_some_and(|progress| progress.iter().all(ObjectiveProgress::is_met))
    }

    /// Turn a finished quest in. Non-repeatable quests move to the
    /// completed set; repeatable quests simply leave the log.
    pub fn complete(&mut self, quest_id: &str, repeatable: bool) -> bool {
        if !self.is_complete(quest_id) {
            return false;
        }
        self.active.remove(quest_id);
        if !repeatable {
            self.completed.insert(quest_id.to_string());
        }
        true
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

/// Advance kill objectives after an NPC dies. Returns progress messages.
pub fn note_kill(log: &mut QuestLog, quests: &HashMap<String, QuestDef>, npc_name: &str) -> Vec<String> {
    note_event(log, quests, |kind| {
        matches!(kind, ObjectiveKind::Kill { npc } if npc.eq_ignore_ascii_case(npc_name))
    })
}

/// Advance collection objectives after an item enters the inventory.
pub fn note_collect(log: &mut QuestLog, quests: &HashMap<String, QuestDef>, item_id: &str) -> Vec<String> {
    note_event(log, quests, |kind| {
        matches!(kind, ObjectiveKind::Collect { item } if item == item_id)
    })
}

/// Advance visit objectives after the player enters a room.
pub fn note_visit(log: &mut QuestLog, quests: &HashMap<String, QuestDef>, room_id: &str) -> Vec<String> {
    note_event(log, quests, |kind| {
        matches!(kind, ObjectiveKind::Visit { room } if room == room_id)
    })
}

fn note_event(
    log: &mut QuestLog,
    quests: &HashMap<String, QuestDef>,
    matches: impl Fn(&ObjectiveKind) -> bool,
) -> Vec<String> {
    let active: Vec<String> = log.active_ids().map(ToString::to_string).collect();
    let mut messages = Vec::new();
    for quest_id in active {
        let Some(def) = quests.get(&quest_id) else {
            continue;
        };
        for (idx, objective) in def.objectives.iter().enumerate() {
            if matches(&objective.kind) && log.record(&quest_id, idx, 1) {
                let progress = log.progress(&quest_id).and_then(|p| p.get(idx).copied());
                if let Some(progress) = progress {
                    messages.push(format!(
                        "[Quest] {}: {}/{}",
                        def.name, progress.current, progress.required
                    ));
                }
                if log.is_complete(&quest_id) {
                    messages.push(format!(
                        "[Quest] {} is ready to turn in{}.",
                        def.name,
                        def.giver
                            .as_deref()
                            .map(|g| format!(" to {g}"))
                            .unwrap_or_default()
                    ));
                }
            }
        }
    }
    messages
}
