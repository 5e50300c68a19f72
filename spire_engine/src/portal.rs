//! Per-player portal discovery across towers.
//!
//! Every tower floor with a portal room must be discovered on foot before it
//! becomes a travel destination. Floor 0 of any tower the player has ever
//! entered counts as discovered. The persisted form is either the legacy
//! single-tower string (`"0,1,5"`) or the multi-tower form
//! (`"human:0,1,5;elf:0,3"`); the legacy form is still emitted while only
//! one tower has been visited so older snapshots stay interchangeable.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalAtlas {
    towers: BTreeMap<String, BTreeSet<u32>>,
}

impl PortalAtlas {
    pub fn new() -> Self {
        Self::default()
    }

    /// An atlas for a fresh character: home tower entered, ground floor known.
    pub fn starting(home_tower: &str) -> Self {
        let mut atlas = Self::default();
        atlas.visit_tower(home_tower);
        atlas
    }

    /// Mark a tower as entered; its ground floor is always discovered.
    pub fn visit_tower(&mut self, tower: &str) {
        self.towers.entry(tower.to_string()).or_default().insert(0);
    }

    /// Mark a floor discovered. Returns true if it was new.
    pub fn discover(&mut self, tower: &str, floor: u32) -> bool {
        let floors = self.towers.entry(tower.to_string()).or_default();
        floors.insert(0);
        floors.insert(floor)
    }

    pub fn is_discovered(&self, tower: &str, floor: u32) -> bool {
        self.towers.get(tower).is_some_and(|floors| floors.contains(&floor))
    }

    /// Sorted discovered floors for one tower.
    pub fn discovered(&self, tower: &str) -> Vec<u32> {
        self.towers
            .get(tower)
            .map(|floors| floors.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn towers_visited(&self) -> usize {
        self.towers.len()
    }

    /// Persisted string form. The home tower leads in the multi-tower form.
    pub fn serialize(&self, home_tower: &str) -> String {
        let floors_string = |floors: &BTreeSet<u32>| {
            floors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        if self.towers.len() >= 2 {
            let mut parts = Vec::with_capacity(self.towers.len());
            if let Some(floors) = self.towers.get(home_tower) {
                parts.push(format!("{home_tower}:{}", floors_string(floors)));
            }
            for (tower, floors) in &self.towers {
                if tower != home_tower {
                    parts.push(format!("{tower}:{}", floors_string(floors)));
                }
            }
            parts.join(";")
        } else {
            self.towers
                .get(home_tower)
                .or_else(|| self.towers.values().next())
                .map(floors_string)
                .unwrap_or_else(|| "0".to_string())
        }
    }

    /// Parse either persisted form. Unparseable floor tokens are skipped.
    pub fn parse(serialized: &str, home_tower: &str) -> Self {
        let mut atlas = Self::default();
        let text = serialized.trim();
        if text.is_empty() {
            atlas.visit_tower(home_tower);
            return atlas;
        }
        if text.contains(':') {
            for part in text.split(';') {
                let Some((tower, floors)) = part.split_once(':') else {
                    continue;
                };
                let tower = tower.trim();
                if tower.is_empty() {
                    continue;
                }
                atlas.visit_tower(tower);
                for token in floors.split(',') {
                    if let Ok(floor) = token.trim().parse::<u32>() {
                        atlas.discover(tower, floor);
                    }
                }
            }
            // A malformed multi-tower string must still leave a usable atlas.
            if atlas.towers.is_empty() {
                atlas.visit_tower(home_tower);
            }
        } else {
            atlas.visit_tower(home_tower);
            for token in text.split(',') {
                if let Ok(floor) = token.trim().parse::<u32>() {
                    atlas.discover(home_tower, floor);
                }
            }
        }
        atlas
    }
}
