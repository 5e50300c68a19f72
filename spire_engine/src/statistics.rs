//! Per-character lifetime counters.
//!
//! Persisted as a JSON blob inside the character snapshot; every field is
//! defaulted so older snapshots keep loading as counters are added.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub kills: u64,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default)]
    pub damage_dealt: u64,
    #[serde(default)]
    pub damage_taken: u64,
    #[serde(default)]
    pub healing_done: u64,
    #[serde(default)]
    pub spells_cast: u64,
    #[serde(default)]
    pub quests_completed: u64,
    #[serde(default)]
    pub gold_earned: u64,
    #[serde(default)]
    pub items_crafted: u64,
    #[serde(default)]
    pub rooms_visited: u64,
    /// Flee attempts an NPC would have made but for being rooted.
    #[serde(default)]
    pub flees_suppressed: u64,
    /// Deaths during the current tower run; reset when a run starts, checked
    /// for the deathless-clear title when the floor boss falls.
    #[serde(default)]
    pub deaths_during_run: u64,
}

impl Statistics {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_counters() {
        let stats = Statistics {
            kills: 12,
            deaths: 3,
            damage_dealt: 4821,
            damage_taken: 977,
            healing_done: 320,
            spells_cast: 45,
            quests_completed: 7,
            gold_earned: 1500,
            items_crafted: 2,
            rooms_visited: 88,
            flees_suppressed: 1,
            deaths_during_run: 0,
        };
        let json = stats.to_json();
        let back = Statistics::from_json(&json).unwrap();
        assert_eq!(back, stats);
        // A second serialization of the reloaded value is byte-identical.
        assert_eq!(back.to_json(), json);
    }

    #[test]
    fn empty_json_loads_defaults() {
        assert_eq!(Statistics::from_json("").unwrap(), Statistics::default());
        assert_eq!(Statistics::from_json("{}").unwrap(), Statistics::default());
    }

    #[test]
    fn unknown_fields_default_to_zero() {
        let partial: Statistics = serde_json::from_str(r#"{"kills": 4}"#).unwrap();
        assert_eq!(partial.kills, 4);
        assert_eq!(partial.deaths, 0);
    }
}
