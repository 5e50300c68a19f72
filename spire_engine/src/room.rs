//! Rooms: exit topology, occupancy, and floor items.
//!
//! Exit topology is immutable once the world loads. Occupant names and floor
//! items are the mutable halves and live behind the room's mutex; every
//! mutation goes through a method so the lock is never exposed.

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::item::{Item, find_item};

/// Canonical direction names for the usual single-letter shorthand.
const DIRECTION_ALIASES: &[(&str, &str)] = &[
    ("n", "north"),
    ("s", "south"),
    ("e", "east"),
    ("w", "west"),
    ("ne", "northeast"),
    ("nw", "northwest"),
    ("se", "southeast"),
    ("sw", "southwest"),
    ("u", "up"),
    ("d", "down"),
];

/// Expand a shorthand direction (`"n"` → `"north"`); other input passes
/// through unchanged, since exits may have arbitrary names.
pub fn expand_direction(input: &str) -> &str {
    DIRECTION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == input)
        .map_or(input, |(_, full)| *full)
}

/// The direction somebody arrives from, as seen from the destination room.
pub fn opposite_direction(direction: &str) -> Option<&'static str> {
    let opposite = match direction {
        "north" => "south",
        "south" => "north",
        "east" => "west",
        "west" => "east",
        "northeast" => "southwest",
        "southwest" => "northeast",
        "northwest" => "southeast",
        "southeast" => "northwest",
        "up" => "down",
        "down" => "up",
        "in" => "out",
        "out" => "in",
        _ => return None,
    };
    Some(opposite)
}

/// One way out of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    pub to: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub required_key: Option<String>,
}

impl Exit {
    pub fn new(to: &str) -> Self {
        Self {
            to: to.to_string(),
            locked: false,
            required_key: None,
        }
    }
}

/// A room definition as authored in the content files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dark: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub tower: Option<String>,
    #[serde(default)]
    pub floor: Option<u32>,
    /// Whether the `portal` command works from this room.
    #[serde(default)]
    pub portal: bool,
    #[serde(default)]
    pub exits: HashMap<String, Exit>,
    /// Item ids placed on the floor at world load.
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Default)]
struct RoomState {
    occupants: BTreeSet<String>,
    items: Vec<Item>,
}

/// A visitable location in the tower world.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub description: String,
    pub dark: bool,
    pub tags: BTreeSet<String>,
    pub tower: Option<String>,
    pub floor: Option<u32>,
    pub portal: bool,
    pub exits: HashMap<String, Exit>,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            dark: false,
            tags: BTreeSet::new(),
            tower: None,
            floor: None,
            portal: false,
            exits: HashMap::new(),
            state: Mutex::new(RoomState::default()),
        }
    }

    /// Build the runtime room from its definition; floor items are resolved
    /// by the caller (the loader owns the item catalog).
    pub fn from_def(def: &RoomDef, floor_items: Vec<Item>) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            dark: def.dark,
            tags: def.tags.clone(),
            tower: def.tower.clone(),
            floor: def.floor,
            portal: def.portal,
            exits: def.exits.clone(),
            state: Mutex::new(RoomState {
                occupants: BTreeSet::new(),
                items: floor_items,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock()
    }

    // ---- occupancy ----

    pub fn add_occupant(&self, name: &str) -> bool {
        self.state().occupants.insert(name.to_string())
    }

    pub fn remove_occupant(&self, name: &str) -> bool {
        self.state().occupants.remove(name)
    }

    pub fn has_occupant(&self, name: &str) -> bool {
        self.state().occupants.contains(name)
    }

    pub fn occupants(&self) -> Vec<String> {
        self.state().occupants.iter().cloned().collect()
    }

    /// Move an occupant between two rooms while holding both room locks in
    /// ascending id order, so cross-room occupancy is never observably split.
    ///
    /// `update` runs with both room locks held and is where the caller
    /// takes the player's entity lock (room before player, per the lock
    /// order), re-validates that the player is still in `from`, and updates
    /// the player's own room field. The occupant sets only change if
    /// `update` returns true; the return value is passed through.
    pub fn transfer_occupant(from: &Room, to: &Room, name: &str, update: impl FnOnce() -> bool) -> bool {
        if std::ptr::eq(from, to) {
            return update();
        }
        let (first, second) = if from.id <= to.id { (from, to) } else { (to, from) };
        let mut first_guard = first.state();
        let mut second_guard = second.state();
        let (from_state, to_state) = if std::ptr::eq(first, from) {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };
        if !update() {
            return false;
        }
        from_state.occupants.remove(name);
        to_state.occupants.insert(name.to_string());
        true
    }

    // ---- floor items ----

    pub fn place_item(&self, item: Item) {
        self.state().items.push(item);
    }

    pub fn place_items(&self, items: impl IntoIterator<Item = Item>) {
        self.state().items.extend(items);
    }

    /// Remove the best match for `query` from the floor.
    pub fn take_item(&self, query: &str) -> Option<Item> {
        let mut state = self.state();
        let idx = find_item(&state.items, query)?;
        Some(state.items.remove(idx))
    }

    pub fn peek_items(&self) -> Vec<Item> {
        self.state().items.clone()
    }

    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_room(id: &str) -> Room {
        let mut room = Room::new(id, "Test Room", "A bare stone chamber.");
        room.exits.insert("north".into(), Exit::new("other"));
        room
    }

    #[test]
    fn direction_shorthand_expands() {
        assert_eq!(expand_direction("n"), "north");
        assert_eq!(expand_direction("sw"), "southwest");
        assert_eq!(expand_direction("portal_5"), "portal_5");
    }

    #[test]
    fn opposites_pair_up() {
        assert_eq!(opposite_direction("north"), Some("south"));
        assert_eq!(opposite_direction("up"), Some("down"));
        assert_eq!(opposite_direction("portal_5"), None);
    }

    #[test]
    fn occupancy_set_semantics() {
        let room = test_room("a");
        assert!(room.add_occupant("alice"));
        assert!(!room.add_occupant("alice"));
        assert!(room.has_occupant("alice"));
        assert_eq!(room.occupants(), vec!["alice".to_string()]);
        assert!(room.remove_occupant("alice"));
        assert!(!room.remove_occupant("alice"));
    }

    #[test]
    fn transfer_moves_between_rooms() {
        let a = test_room("a");
        let b = test_room("b");
        a.add_occupant("alice");
        assert!(Room::transfer_occupant(&a, &b, "alice", || true));
        assert!(!a.has_occupant("alice"));
        assert!(b.has_occupant("alice"));
    }

    #[test]
    fn vetoed_transfer_changes_nothing() {
        let a = test_room("a");
        let b = test_room("b");
        a.add_occupant("alice");
        assert!(!Room::transfer_occupant(&a, &b, "alice", || false));
        assert!(a.has_occupant("alice"));
        assert!(!b.has_occupant("alice"));
    }

    #[test]
    fn transfer_to_same_room_is_noop() {
        let a = test_room("a");
        a.add_occupant("alice");
        assert!(Room::transfer_occupant(&a, &a, "alice", || true));
        assert!(a.has_occupant("alice"));
    }

    #[test]
    fn floor_items_take_by_name() {
        let room = test_room("a");
        room.place_item(Item::simple("bread", "loaf of bread"));
        room.place_item(Item::simple("sword", "rusty sword"));
        assert_eq!(room.item_count(), 2);
        let taken = room.take_item("loaf").unwrap();
        assert_eq!(taken.id, "bread");
        assert!(room.take_item("loaf").is_none());
        assert_eq!(room.item_count(), 1);
    }

    #[test]
    fn room_def_yaml_parses() {
        let yaml = r"
id: human_tower_0
name: Tower Entrance
description: A broad hall of worn flagstones.
tower: human
floor: 0
portal: true
exits:
  up:
    to: human_tower_1
  north:
    to: storeroom
    locked: true
    required_key: iron_key
items: [rusty_sword]
";
        let def: RoomDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.exits.len(), 2);
        assert!(def.exits["north"].locked);
        assert_eq!(def.exits["north"].required_key.as_deref(), Some("iron_key"));
        assert_eq!(def.floor, Some(0));
        assert!(def.portal);
    }
}
