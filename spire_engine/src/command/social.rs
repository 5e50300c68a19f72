//! Chat, presence, and talking to NPCs.

use std::sync::Arc;
use std::time::Instant;

use super::{CommandContext, CommandOutcome};
use crate::chat::SpamVerdict;
use crate::player::Player;

/// Run the shared chat gauntlet: anti-spam window, then the profanity
/// filter. Returns the deliverable text, or the reply that ends the
/// attempt.
fn vet_chat(ctx: &CommandContext<'_>, player: &Arc<Player>, words: &str) -> Result<String, String> {
    {
        let mut state = player.state();
        let verdict = state.spam.note(&ctx.world.config.antispam, Instant::now());
        if let SpamVerdict::Muted { remaining } = verdict {
            return Err(format!(
                "You are sending messages too quickly. Muted for {}s.",
                remaining.as_secs().max(1)
            ));
        }
    }
    let outcome = ctx.world.chat_filter.apply(words);
    if outcome.blocked {
        return Err("That kind of language doesn't travel here.".to_string());
    }
    Ok(outcome.filtered)
}

pub fn say(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Say what?");
    }
    let words = match vet_chat(ctx, player, args) {
        Ok(words) => words,
        Err(reply) => return CommandOutcome::reply(reply),
    };
    let room_id = player.current_room();
    ctx.world
        .chat_room(&room_id, &player.name, &format!("{} says, '{words}'", player.name));
    CommandOutcome::reply(format!("You say, '{words}'"))
}

pub fn shout(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Shout what?");
    }
    let words = match vet_chat(ctx, player, args) {
        Ok(words) => words,
        Err(reply) => return CommandOutcome::reply(reply),
    };
    ctx.world
        .chat_global(&player.name, &format!("{} shouts, '{words}'", player.name));
    CommandOutcome::reply(format!("You shout, '{words}'"))
}

pub fn tell(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let Some((target, words)) = args.split_once(char::is_whitespace) else {
        return CommandOutcome::reply("Tell whom what?");
    };
    let words = words.trim();
    if words.is_empty() {
        return CommandOutcome::reply("Tell whom what?");
    }
    if target.eq_ignore_ascii_case(&player.name) {
        return CommandOutcome::reply("You mutter to yourself.");
    }
    let words = match vet_chat(ctx, player, words) {
        Ok(words) => words,
        Err(reply) => return CommandOutcome::reply(reply),
    };
    match ctx
        .world
        .chat_tell(&player.name, target, &format!("{} tells you, '{words}'", player.name))
    {
        Ok(name) => CommandOutcome::reply(format!("You tell {name}, '{words}'")),
        Err(()) => CommandOutcome::reply("No one by that name is listening."),
    }
}

pub fn emote(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Emote what?");
    }
    let room_id = player.current_room();
    let line = format!("{} {args}", player.name);
    ctx.world.chat_room(&room_id, &player.name, &line);
    CommandOutcome::reply(line)
}

pub fn who(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let mut entries: Vec<String> = ctx
        .world
        .online_players()
        .iter()
        .map(|p| {
            let state = p.state();
            let class = state
                .active_class
                .map_or_else(|| "adventurer".to_string(), |c| c.to_string());
            let title = state
                .active_title
                .as_deref()
                .map(|t| format!(", {t}"))
                .unwrap_or_default();
            format!("  {}{title} [level {} {class}]", p.name, state.level)
        })
        .collect();
    entries.sort();
    let mut lines = vec![format!("{} adventurer(s) in the spire:", entries.len())];
    lines.extend(entries);
    CommandOutcome::reply(lines.join("\n"))
}

pub fn ignore(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let mut state = player.state();
    if args.is_empty() {
        if state.ignore_list.is_empty() {
            return CommandOutcome::reply("You are ignoring no one.");
        }
        let names: Vec<String> = state.ignore_list.iter().cloned().collect();
        return CommandOutcome::reply(format!("Ignoring: {}.", names.join(", ")));
    }
    let target = args.trim().to_lowercase();
    if target == player.name.to_lowercase() {
        return CommandOutcome::reply("Ignoring yourself would solve nothing.");
    }
    if state.ignore_list.remove(&target) {
        CommandOutcome::reply(format!("You hear {args} once more."))
    } else {
        state.ignore_list.insert(target);
        CommandOutcome::reply(format!("You will no longer hear {args}."))
    }
    // Ignoring does not require the target to be online; grudges persist.
}

pub fn talk(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let room_id = player.current_room();
    let npc = if args.is_empty() {
        ctx.world.npcs_in_room(&room_id).into_iter().find(|npc| !npc.dialogue.is_empty())
    } else {
        ctx.world.find_npc_in_room(&room_id, args)
    };
    let Some(npc) = npc else {
        return CommandOutcome::reply("There is no one here to talk to.");
    };

    let mut lines = Vec::new();
    match npc.random_dialogue() {
        Some(line) => lines.push(line),
        None => lines.push(format!("{} has nothing to say.", npc.name)),
    }
    if npc.trainer.is_some() {
        lines.push(format!("({} offers training; see 'train'.)", npc.name));
    }
    if !npc.quest_giver.is_empty() {
        lines.push(format!("({} has work for you; see 'quest'.)", npc.name));
    }
    if npc.lore {
        player.state().lore_talks.insert(npc.name.clone());
    }
    CommandOutcome::reply(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatFilterConfig, FilterMode};
    use crate::config::{ServerConfig, WorldContent};
    use crate::persist::{CharacterStore, MemoryStore};
    use crate::player::{OutMessage, PlayerState};
    use crate::world::World;
    use crossbeam_channel::Receiver;
    use uuid::Uuid;

    fn setup_with_filter() -> (Arc<World>, Arc<dyn CharacterStore>) {
        let config = ServerConfig {
            chat_filter: ChatFilterConfig {
                enabled: true,
                mode: FilterMode::Replace,
                banned: vec!["badword".into()],
            },
            ..ServerConfig::default()
        };
        let world = Arc::new(World::new(config, WorldContent::builtin_demo()).unwrap());
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        (world, store)
    }

    fn join(world: &Arc<World>, name: &str) -> (Arc<Player>, Receiver<OutMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let player = Arc::new(Player::new(
            name,
            Uuid::new_v4(),
            Uuid::new_v4(),
            tx,
            PlayerState::basic(&world.config.starting_room),
        ));
        world.register_player(Arc::clone(&player));
        world.place_player(&player).unwrap();
        (player, rx)
    }

    fn lines(rx: &Receiver<OutMessage>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|m| match m {
                OutMessage::Line(line) => Some(line),
                OutMessage::Close => None,
            })
            .collect()
    }

    #[test]
    fn say_filters_and_reaches_the_room() {
        let (world, store) = setup_with_filter();
        let ctx = CommandContext { world: &world, store: &store };
        let (alice, _alice_rx) = join(&world, "Alice");
        let (_bob, bob_rx) = join(&world, "Bob");

        let outcome = say(&ctx, &alice, "say", "a badword here");
        assert_eq!(outcome.reply, "You say, 'a ******* here'");
        assert_eq!(lines(&bob_rx), vec!["Alice says, 'a ******* here'".to_string()]);
    }

    #[test]
    fn spam_burst_gets_muted() {
        let (world, store) = setup_with_filter();
        let ctx = CommandContext { world: &world, store: &store };
        let (alice, _rx) = join(&world, "Alice");
        let mut muted = false;
        for _ in 0..10 {
            let outcome = say(&ctx, &alice, "say", "hello");
            if outcome.reply.contains("Muted") {
                muted = true;
                break;
            }
        }
        assert!(muted, "burst of 10 says was never muted");
    }

    #[test]
    fn tell_round_trip_and_offline_target() {
        let (world, store) = setup_with_filter();
        let ctx = CommandContext { world: &world, store: &store };
        let (alice, _arx) = join(&world, "Alice");
        let (_bob, brx) = join(&world, "Bob");

        let outcome = tell(&ctx, &alice, "tell", "bob hi there");
        assert_eq!(outcome.reply, "You tell Bob, 'hi there'");
        assert_eq!(lines(&brx), vec!["Alice tells you, 'hi there'".to_string()]);

        let outcome = tell(&ctx, &alice, "tell", "carol hi");
        assert_eq!(outcome.reply, "No one by that name is listening.");
    }

    #[test]
    fn who_lists_titles_and_levels() {
        let (world, store) = setup_with_filter();
        let ctx = CommandContext { world: &world, store: &store };
        let (alice, _rx) = join(&world, "Alice");
        alice.state().active_title = Some("Ratsbane".into());
        let outcome = who(&ctx, &alice, "who", "");
        assert!(outcome.reply.contains("1 adventurer"));
        assert!(outcome.reply.contains("Alice, Ratsbane"));
    }

    #[test]
    fn ignore_toggles() {
        let (world, store) = setup_with_filter();
        let ctx = CommandContext { world: &world, store: &store };
        let (alice, _rx) = join(&world, "Alice");
        assert!(ignore(&ctx, &alice, "ignore", "bob").reply.contains("no longer hear"));
        assert!(alice.state().ignore_list.contains("bob"));
        assert!(ignore(&ctx, &alice, "ignore", "bob").reply.contains("once more"));
        assert!(!alice.state().ignore_list.contains("bob"));
        assert!(ignore(&ctx, &alice, "ignore", "").reply.contains("no one"));
    }

    #[test]
    fn talk_tracks_lore_npcs() {
        let (world, store) = setup_with_filter();
        let ctx = CommandContext { world: &world, store: &store };
        let (alice, _rx) = join(&world, "Alice");
        let outcome = talk(&ctx, &alice, "talk", "gruk");
        assert!(outcome.reply.contains("Gruk"), "{}", outcome.reply);
        assert!(alice.state().lore_talks.contains("Gruk the Provisioner"));
    }
}
