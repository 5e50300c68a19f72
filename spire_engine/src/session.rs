//! One connected client: authenticate, pick or create a character, then
//! read–dispatch–reply until the line drops.
//!
//! The session thread owns the read side. A dedicated writer thread drains
//! the player's outbound channel, so broadcasts from other sessions and
//! ticks interleave with replies without anyone blocking on this socket,
//! and nothing ever writes while holding an entity lock.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::class::{AbilityScores, ClassName, default_races};
use crate::command::{CommandContext, dispatch};
use crate::net::{Client, LineEvent};
use crate::persist::{CharacterSnapshot, CharacterStore, hash_password, restore_state, save_player};
use crate::player::{OutMessage, Player, PlayerState};
use crate::world::World;

/// Consecutive read timeouts tolerated during login before giving up.
const LOGIN_PATIENCE: u32 = 10;

pub struct Session {
    world: Arc<World>,
    store: Arc<dyn CharacterStore>,
    client: Arc<dyn Client>,
}

fn valid_name(name: &str) -> bool {
    (3..=16).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric())
}

impl Session {
    pub fn new(world: Arc<World>, store: Arc<dyn CharacterStore>, client: Arc<dyn Client>) -> Self {
        Self { world, store, client }
    }

    /// Drive the whole session; errors just end it.
    pub fn run(self) {
        let peer = self.client.remote_addr();
        if let Err(err) = self.serve() {
            info!("session from {peer} ended: {err:#}");
        }
    }

    // ---- raw line helpers (pre-player; nothing else writes yet) ----

    fn send(&self, text: &str) -> Result<()> {
        for line in text.split('\n') {
            self.client.write_line(line)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<String> {
        let mut idles = 0;
        loop {
            match self.client.read_line()? {
                LineEvent::Line(line) => return Ok(line.trim().to_string()),
                LineEvent::Idle => {
                    idles += 1;
                    if idles > LOGIN_PATIENCE {
                        let _ = self.send("Too slow; come back when you're ready.");
                        bail!("login timed out");
                    }
                }
                LineEvent::Disconnected => bail!("client disconnected during login"),
            }
        }
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        self.send(prompt)?;
        self.read()
    }

    // ---- auth ----

    fn serve(&self) -> Result<()> {
        self.send(&self.world.config.motd)?;
        let (account_name, snapshot) = loop {
            let choice = self.ask("[L]ogin or [R]egister?")?;
            match choice.to_lowercase().chars().next() {
                Some('l') => {
                    if let Some(result) = self.login()? {
                        break result;
                    }
                }
                Some('r') => break self.register()?,
                _ => self.send("Please answer L or R.")?,
            }
        };
        self.play(&account_name, snapshot)
    }

    fn login(&self) -> Result<Option<(String, CharacterSnapshot)>> {
        let username = self.ask("Account name:")?;
        let Some(account) = self.store.find_account(&username).context("account lookup")? else {
            self.send("No such account.")?;
            return Ok(None);
        };
        let password = self.ask("Password:")?;
        if hash_password(&password) != account.password_hash {
            self.send("Wrong password.")?;
            return Ok(None);
        }
        let characters = self.store.characters_for(account.id).context("listing characters")?;
        let snapshot = if characters.is_empty() {
            self.send("This account has no characters yet.")?;
            self.create_character(&account.username, account.id)?
        } else {
            let mut menu = String::new();
            for (i, summary) in characters.iter().enumerate() {
                menu.push_str(&format!(
                    "  {}. {} (level {} {})\n",
                    i + 1,
                    summary.name,
                    summary.level,
                    summary.class
                ));
            }
            menu.push_str(&format!("Choose a character [1-{}]:", characters.len()));
            loop {
                let pick = self.ask(&menu)?;
                let Ok(index) = pick.parse::<usize>() else {
                    continue;
                };
                let Some(summary) = characters.get(index.saturating_sub(1)) else {
                    continue;
                };
                match self.store.load(summary.id).context("loading character")? {
                    Some(snapshot) => break snapshot,
                    None => {
                        warn!("character {} listed but unloadable", summary.id);
                        self.send("That character cannot be woken. Pick another.")?;
                    }
                }
            }
        };
        Ok(Some((account.username, snapshot)))
    }

    fn register(&self) -> Result<(String, CharacterSnapshot)> {
        let username = loop {
            let name = self.ask("Choose an account name:")?;
            if !valid_name(&name) {
                self.send("Account names are 3-16 letters or digits.")?;
                continue;
            }
            if self.store.find_account(&name).context("account lookup")?.is_some() {
                self.send("That account name is taken.")?;
                continue;
            }
            break name;
        };
        let password = loop {
            let password = self.ask("Choose a password:")?;
            if password.len() < 4 {
                self.send("Passwords need at least 4 characters.")?;
                continue;
            }
            let confirm = self.ask("Confirm password:")?;
            if password != confirm {
                self.send("Passwords do not match.")?;
                continue;
            }
            break password;
        };
        let account = self
            .store
            .create_account(&username, &hash_password(&password))
            .context("creating account")?;
        let snapshot = self.create_character(&username, account.id)?;
        Ok((username, snapshot))
    }

    fn create_character(&self, username: &str, account_id: Uuid) -> Result<CharacterSnapshot> {
        let name = loop {
            let name = self.ask("Name your character:")?;
            if !valid_name(&name) {
                self.send("Character names are 3-16 letters or digits.")?;
                continue;
            }
            if self.store.character_name_taken(&name).context("name check")? {
                self.send("Someone already walks the spire under that name.")?;
                continue;
            }
            break name;
        };

        let class = loop {
            let mut menu = String::new();
            for (i, class) in ClassName::ALL.iter().enumerate() {
                menu.push_str(&format!("  {}. {class}\n", i + 1));
            }
            menu.push_str("Choose a class [1-6]:");
            let pick = self.ask(&menu)?;
            let Some(class) = pick.parse::<usize>().ok().and_then(ClassName::from_menu_index) else {
                self.send("Pick a number from the list.")?;
                continue;
            };
            let confirm = self.ask(&format!("Create {name} the {class}? [Y/N]"))?;
            if confirm.to_lowercase().starts_with('y') {
                break class;
            }
        };

        let scores = self.read_ability_scores()?;
        let config = &self.world.config;
        let races = if self.world.races.is_empty() {
            default_races()
        } else {
            self.world.races.values().cloned().collect()
        };
        let race = races
            .iter()
            .find(|r| r.name == "human")
            .or_else(|| races.first())
            .cloned()
            .context("no races defined")?;

        let mut state = PlayerState::new_character(
            class,
            &race.name,
            scores.with_bonuses(&race.bonuses),
            &config.home_tower,
            &config.starting_room,
        );
        state.gold = config.starting_gold;
        state.is_admin = config.admins.iter().any(|admin| admin.eq_ignore_ascii_case(username));

        let player = Player::new(&name, account_id, Uuid::new_v4(), crossbeam_channel::unbounded().0, state);
        let snapshot = player.snapshot();
        self.store
            .attach_character(account_id, &snapshot)
            .context("saving new character")?;
        info!("created character '{name}' ({}) for account '{username}'", snapshot.character_id);
        Ok(snapshot)
    }

    fn read_ability_scores(&self) -> Result<AbilityScores> {
        'outer: loop {
            self.send("Enter six ability scores in order STR DEX CON INT WIS CHA (3-18):")?;
            let mut values = Vec::with_capacity(6);
            while values.len() < 6 {
                let line = self.read()?;
                for token in line.split_whitespace() {
                    match token.parse::<i32>() {
                        Ok(score) if (3..=18).contains(&score) => values.push(score),
                        _ => {
                            self.send(&format!("'{token}' is not a score between 3 and 18."))?;
                            continue 'outer;
                        }
                    }
                }
            }
            return Ok(AbilityScores {
                strength: values[0],
                dexterity: values[1],
                constitution: values[2],
                intelligence: values[3],
                wisdom: values[4],
                charisma: values[5],
            });
        }
    }

    // ---- play ----

    fn status_prompt(&self, player: &Arc<Player>) -> String {
        let (health, max_health, mana, max_mana, room_id) = {
            let state = player.state();
            (state.health, state.max_health, state.mana, state.max_mana, state.current_room.clone())
        };
        let room_name = self
            .world
            .rooms
            .get(&room_id)
            .map_or("the void", |room| room.name.as_str());
        format!("[HP: {health}/{max_health} | MP: {mana}/{max_mana} | {room_name}]")
    }

    fn spawn_writer(&self, rx: crossbeam_channel::Receiver<OutMessage>) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        std::thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                match message {
                    OutMessage::Line(text) => {
                        for line in text.split('\n') {
                            if client.write_line(line).is_err() {
                                return;
                            }
                        }
                    }
                    OutMessage::Close => break,
                }
            }
            client.close();
        })
    }

    fn play(&self, account_name: &str, snapshot: CharacterSnapshot) -> Result<()> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut state = restore_state(&snapshot, &self.world.items);
        state.is_admin |= self
            .world
            .config
            .admins
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(account_name));
        let player = Arc::new(Player::new(
            &snapshot.name,
            snapshot.account_id,
            snapshot.character_id,
            tx,
            state,
        ));

        if let Some(displaced) = self.world.register_player(Arc::clone(&player)) {
            displaced.send("Your body stirs elsewhere; this session ends.");
            displaced.request_close();
            info!("duplicate login for '{}'; displaced the older session", player.name);
        }
        self.world.place_player(&player).context("placing player")?;

        let writer = self.spawn_writer(rx);
        info!("'{}' logged in from {}", player.name, self.client.remote_addr());
        self.world
            .broadcast_room(&player.current_room(), &format!("{} appears.", player.name), Some(&player.name));

        let room = self
            .world
            .rooms
            .get(&player.current_room())
            .context("player placed in missing room")?;
        player.send(format!(
            "Welcome, {}.\n{}\n{}",
            player.name,
            self.world.describe_room(room, &player),
            self.status_prompt(&player)
        ));

        let reason = self.command_loop(&player);

        // Teardown: stall home, state saved, registry clean, writer joined.
        player.state().close_stall();
        save_player(&self.store, &player);
        if self.world.unregister_player(&player) {
            self.world
                .broadcast_global(&format!("{} has left the spire.", player.name));
        }
        player.request_close();
        let _ = writer.join();
        self.client.close();
        info!("'{}' logged out ({reason})", player.name);
        Ok(())
    }

    fn command_loop(&self, player: &Arc<Player>) -> &'static str {
        let ctx = CommandContext {
            world: &self.world,
            store: &self.store,
        };
        let idle_timeout = Duration::from_secs(self.world.config.idle_timeout_secs);

        loop {
            if player.is_disconnected() {
                return "kicked or displaced";
            }
            if self.world.is_shutting_down() {
                player.send("The world is closing down around you.");
                return "server shutdown";
            }

            let event = match self.client.read_line() {
                Ok(event) => event,
                Err(err) => {
                    warn!("read error for '{}': {err}", player.name);
                    return "read error";
                }
            };
            match event {
                LineEvent::Disconnected => return "connection dropped",
                LineEvent::Idle => {
                    let last = player.state().last_activity;
                    if Instant::now().duration_since(last) > idle_timeout {
                        player.send("You have been idle too long; the spire ushers you out.");
                        return "idle timeout";
                    }
                }
                LineEvent::Line(line) => {
                    let outcome = dispatch(&ctx, player, &line);
                    let prompt = self.status_prompt(player);
                    if outcome.reply.is_empty() {
                        player.send(prompt);
                    } else {
                        player.send(format!("{}\n{prompt}", outcome.reply));
                    }
                    if outcome.quit {
                        return "quit";
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, WorldContent};
    use crate::net::ScriptedClient;
    use crate::persist::MemoryStore;

    fn world() -> Arc<World> {
        Arc::new(World::new(ServerConfig::default(), WorldContent::builtin_demo()).unwrap())
    }

    fn run_script(world: &Arc<World>, store: &Arc<dyn CharacterStore>, lines: &[&str]) -> Arc<ScriptedClient> {
        let client = Arc::new(ScriptedClient::new(lines));
        let session = Session::new(
            Arc::clone(world),
            Arc::clone(store),
            Arc::clone(&client) as Arc<dyn Client>,
        );
        session.run();
        client
    }

    #[test]
    fn register_play_quit_end_to_end() {
        let world = world();
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        let client = run_script(
            &world,
            &store,
            &[
                "r",
                "alice99",
                "hunter22",
                "hunter22",
                "Alice",
                "1",
                "y",
                "15 12 14 10 10 8",
                "look",
                "quit",
            ],
        );
        let written = client.written().join("\n");
        assert!(written.contains("[L]ogin or [R]egister?"), "{written}");
        assert!(written.contains("Tower Gate Hall"), "{written}");
        assert!(written.contains("[HP: "), "{written}");
        assert!(written.contains("Farewell"), "{written}");
        assert!(client.was_closed());
        // The character persisted on the way out.
        let account = store.find_account("alice99").unwrap().unwrap();
        let characters = store.characters_for(account.id).unwrap();
        assert_eq!(characters.len(), 1);
        assert_eq!(characters[0].name, "Alice");
        // And the world is empty again.
        assert_eq!(world.online_count(), 0);
        assert!(world.audit().is_empty());
    }

    #[test]
    fn login_resumes_existing_character() {
        let world = world();
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        run_script(
            &world,
            &store,
            &[
                "r", "bob42", "sesame1", "sesame1", "Bob", "2", "y", "12 15 12 10 14 8", "quit",
            ],
        );
        let client = run_script(&world, &store, &["l", "bob42", "sesame1", "1", "score", "quit"]);
        let written = client.written().join("\n");
        assert!(written.contains("Bob (level 1 Ranger)"), "{written}");
        assert!(written.contains("Welcome, Bob."), "{written}");
        assert!(written.contains("Ranger* 1"), "{written}");
    }

    #[test]
    fn wrong_password_reprompts_auth() {
        let world = world();
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        run_script(
            &world,
            &store,
            &["r", "carol7", "topsecret", "topsecret", "Carol", "3", "y", "10 10 10 14 12 15", "quit"],
        );
        let client = run_script(
            &world,
            &store,
            &["l", "carol7", "wrongpw", "l", "carol7", "topsecret", "1", "quit"],
        );
        let written = client.written().join("\n");
        assert!(written.contains("Wrong password."), "{written}");
        assert!(written.contains("Welcome, Carol."), "{written}");
    }

    #[test]
    fn abrupt_disconnect_still_saves() {
        let world = world();
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        // Script ends without 'quit': the client just vanishes.
        run_script(
            &world,
            &store,
            &["r", "dave1", "passpass", "passpass", "Dave", "1", "y", "15 12 14 10 10 8", "north"],
        );
        let account = store.find_account("dave1").unwrap().unwrap();
        let characters = store.characters_for(account.id).unwrap();
        assert_eq!(characters.len(), 1);
        assert_eq!(world.online_count(), 0);
    }

    #[test]
    fn name_validation_rejects_junk() {
        assert!(valid_name("Alice"));
        assert!(valid_name("bob42"));
        assert!(!valid_name("ab"));
        assert!(!valid_name("way too long a name"));
        assert!(!valid_name("semi;colon"));
    }
}
