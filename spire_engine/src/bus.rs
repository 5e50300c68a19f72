//! The broadcast bus: tell, room, and global delivery.
//!
//! Delivery never blocks: a message is resolved to players under the world
//! read lock and pushed onto each recipient's outbound channel, which the
//! session's writer thread drains. Holding no entity lock across socket
//! writes falls out of that shape for free. Chat-originated sends honor
//! the recipient's ignore list; system messages do not.

use std::sync::Arc;

use crate::player::Player;
use crate::world::World;

impl World {
    /// Deliver a line to one named player. Returns false if they are not
    /// online.
    pub fn tell(&self, name: &str, message: &str) -> bool {
        match self.find_player(name) {
            Some(player) => {
                player.send(message);
                true
            }
            None => false,
        }
    }

    /// Deliver a line to everyone in a room, optionally excluding a sender.
    pub fn broadcast_room(&self, room_id: &str, message: &str, except: Option<&str>) {
        for player in self.players_in_room(room_id) {
            if except.is_some_and(|skip| player.name.eq_ignore_ascii_case(skip)) {
                continue;
            }
            player.send(message);
        }
    }

    /// Deliver a line to every online player.
    pub fn broadcast_global(&self, message: &str) {
        for player in self.online_players() {
            player.send(message);
        }
    }

    fn ignores(recipient: &Arc<Player>, sender: &str) -> bool {
        recipient.state().ignore_list.contains(&sender.to_lowercase())
    }

    /// Room-scoped chat from one player, filtered by ignore lists.
    pub fn chat_room(&self, room_id: &str, sender: &str, message: &str) {
        for player in self.players_in_room(room_id) {
            if player.name.eq_ignore_ascii_case(sender) || Self::ignores(&player, sender) {
                continue;
            }
            player.send(message);
        }
    }

    /// Global chat (shout), filtered by ignore lists.
    pub fn chat_global(&self, sender: &str, message: &str) {
        for player in self.online_players() {
            if player.name.eq_ignore_ascii_case(sender) || Self::ignores(&player, sender) {
                continue;
            }
            player.send(message);
        }
    }

    /// Private chat. `Ok(recipient_name)` on delivery; `Err` distinguishes
    /// offline targets from ignores (the sender sees the same hint either
    /// way, so snooping for ignore status is not possible).
    pub fn chat_tell(&self, sender: &str, target: &str, message: &str) -> Result<String, ()> {
        let Some(recipient) = self.find_player(target) else {
            return Err(());
        };
        if Self::ignores(&recipient, sender) {
            return Err(());
        }
        recipient.send(message);
        Ok(recipient.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, WorldContent};
    use crate::player::{OutMessage, PlayerState};
    use crossbeam_channel::Receiver;
    use uuid::Uuid;

    fn world() -> World {
        World::new(ServerConfig::default(), WorldContent::builtin_demo()).unwrap()
    }

    fn join(world: &World, name: &str) -> (Arc<Player>, Receiver<OutMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let state = PlayerState::basic(&world.config.starting_room);
        let player = Arc::new(Player::new(name, Uuid::new_v4(), Uuid::new_v4(), tx, state));
        world.register_player(Arc::clone(&player));
        world.place_player(&player).unwrap();
        (player, rx)
    }

    fn drain(rx: &Receiver<OutMessage>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|msg| match msg {
                OutMessage::Line(line) => Some(line),
                OutMessage::Close => None,
            })
            .collect()
    }

    #[test]
    fn tell_reaches_one_player() {
        let world = world();
        let (_alice, alice_rx) = join(&world, "Alice");
        let (_bob, bob_rx) = join(&world, "Bob");
        assert!(world.tell("alice", "hello"));
        assert_eq!(drain(&alice_rx), vec!["hello".to_string()]);
        assert!(drain(&bob_rx).is_empty());
        assert!(!world.tell("carol", "hello"));
    }

    #[test]
    fn room_broadcast_skips_excluded_sender() {
        let world = world();
        let (_alice, alice_rx) = join(&world, "Alice");
        let (_bob, bob_rx) = join(&world, "Bob");
        let room = world.config.starting_room.clone();
        world.broadcast_room(&room, "a door slams", Some("Alice"));
        assert!(drain(&alice_rx).is_empty());
        assert_eq!(drain(&bob_rx), vec!["a door slams".to_string()]);
    }

    #[test]
    fn room_broadcast_only_hits_that_room() {
        let world = world();
        let (alice, alice_rx) = join(&world, "Alice");
        let (_bob, bob_rx) = join(&world, "Bob");
        world.move_player(&alice, "up").unwrap();
        drain(&alice_rx);
        world.broadcast_room(&alice.current_room(), "wind howls", None);
        assert_eq!(drain(&alice_rx), vec!["wind howls".to_string()]);
        assert!(drain(&bob_rx).is_empty());
    }

    #[test]
    fn global_broadcast_reaches_everyone() {
        let world = world();
        let (_alice, alice_rx) = join(&world, "Alice");
        let (_bob, bob_rx) = join(&world, "Bob");
        world.broadcast_global("the server yawns");
        assert_eq!(drain(&alice_rx).len(), 1);
        assert_eq!(drain(&bob_rx).len(), 1);
    }

    #[test]
    fn chat_respects_ignore_lists() {
        let world = world();
        let (_alice, alice_rx) = join(&world, "Alice");
        let (bob, bob_rx) = join(&world, "Bob");
        bob.state().ignore_list.insert("alice".into());

        let room = world.config.starting_room.clone();
        world.chat_room(&room, "Alice", "Alice says, 'hi'");
        assert!(drain(&bob_rx).is_empty());

        world.chat_global("Alice", "Alice shouts, 'HI'");
        assert!(drain(&bob_rx).is_empty());

        assert_eq!(world.chat_tell("Alice", "bob", "psst"), Err(()));
        // System messages are not filtered.
        assert!(world.tell("bob", "the tower rumbles"));
        assert_eq!(drain(&bob_rx), vec!["the tower rumbles".to_string()]);
        assert!(drain(&alice_rx).is_empty());
    }
}
