//! Help, the clock, the character sheet, saving, and quitting.

use std::sync::Arc;

use super::{CommandContext, CommandOutcome, REGISTRY};
use crate::class::xp_for;
use crate::persist::save_player;
use crate::player::Player;

pub fn help(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if !args.is_empty() {
        let topic = args.trim().to_lowercase();
        if let Some((_, text)) = ctx
            .world
            .help_topics
            .iter()
            .find(|(name, _)| name.to_lowercase() == topic)
        {
            return CommandOutcome::reply(text.clone());
        }
        if let Some(spec) = REGISTRY
            .iter()
            .find(|spec| spec.verbs.contains(&topic.as_str()))
        {
            return CommandOutcome::reply(format!("{}\n  {}", spec.usage, spec.summary));
        }
        return CommandOutcome::reply(format!("No help on '{args}'."));
    }

    let is_admin = player.state().is_admin;
    let mut lines = vec!["Commands (try 'help <command>' for details):".to_string()];
    for spec in REGISTRY.iter() {
        if spec.admin && !is_admin {
            continue;
        }
        lines.push(format!("  {:<12} {}", spec.verbs[0], spec.summary));
    }
    if !ctx.world.help_topics.is_empty() {
        let mut topics: Vec<&str> = ctx.world.help_topics.keys().map(String::as_str).collect();
        topics.sort_unstable();
        lines.push(format!("Topics: {}.", topics.join(", ")));
    }
    CommandOutcome::reply(lines.join("\n"))
}

pub fn time(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    CommandOutcome::reply(format!(
        "{} ({}).",
        ctx.world.clock.descriptive_time(),
        ctx.world.clock.time_string()
    ))
}

pub fn score(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let state = player.state();
    let class_line = if state.classes.is_empty() {
        "classless wanderer".to_string()
    } else {
        state
            .classes
            .classes()
            .map(|(class, level)| {
                let marker = if state.active_class == Some(class) { "*" } else { "" };
                format!("{class}{marker} {level}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut lines = vec![
        format!("{}, level {} {}", player.styled_name(), state.level, state.race),
        format!("  Classes: {class_line}"),
        format!("  HP {}/{}  MP {}/{}", state.health, state.max_health, state.mana, state.max_mana),
        format!(
            "  XP {} (next level at {})",
            state.experience,
            xp_for(state.level + 1)
        ),
        format!("  Gold {}", state.gold),
        format!(
            "  STR {} DEX {} CON {} INT {} WIS {} CHA {}",
            state.abilities.strength,
            state.abilities.dexterity,
            state.abilities.constitution,
            state.abilities.intelligence,
            state.abilities.wisdom,
            state.abilities.charisma
        ),
        format!(
            "  Kills {}  Deaths {}  Quests {}",
            state.statistics.kills, state.statistics.deaths, state.statistics.quests_completed
        ),
    ];
    if !state.titles.is_empty() {
        lines.push(format!("  Titles: {}", state.titles.join(", ")));
    }
    CommandOutcome::reply(lines.join("\n"))
}

pub fn save(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    match ctx.store.save(&player.snapshot()) {
        Ok(()) => CommandOutcome::reply("Saved."),
        Err(err) => {
            log::warn!("manual save for '{}' failed: {err}", player.name);
            CommandOutcome::reply("The scribes are busy; your deeds will be recorded later.")
        }
    }
}

pub fn quit(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    // The session loop handles persistence and teardown; closing the stall
    // here keeps its items out of the snapshot's void.
    player.state().close_stall();
    save_player(ctx.store, player);
    CommandOutcome::quit("Farewell. The spire will remember you.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, WorldContent};
    use crate::persist::{CharacterStore, MemoryStore};
    use crate::player::PlayerState;
    use crate::world::World;

    fn setup() -> (Arc<World>, Arc<dyn CharacterStore>, Arc<Player>) {
        let world = Arc::new(World::new(ServerConfig::default(), WorldContent::builtin_demo()).unwrap());
        let store: Arc<dyn CharacterStore> = Arc::new(MemoryStore::new());
        let player = Arc::new(Player::detached("Alice", PlayerState::basic(&world.config.starting_room)));
        world.register_player(Arc::clone(&player));
        world.place_player(&player).unwrap();
        (world, store, player)
    }

    #[test]
    fn help_lists_commands_and_topics() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        let outcome = help(&ctx, &player, "help", "");
        assert!(outcome.reply.contains("look"));
        assert!(outcome.reply.contains("Topics:"));
        // Admin verbs hidden from players.
        assert!(!outcome.reply.contains("shutdown"));
    }

    #[test]
    fn help_on_topic_and_verb() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        let outcome = help(&ctx, &player, "help", "portal");
        assert!(outcome.reply.contains("portal"), "{}", outcome.reply);
        let outcome = help(&ctx, &player, "help", "nonsense");
        assert_eq!(outcome.reply, "No help on 'nonsense'.");
    }

    #[test]
    fn time_reports_descriptive_hour() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        let outcome = time(&ctx, &player, "time", "");
        assert!(outcome.reply.contains("08:00"), "{}", outcome.reply);
    }

    #[test]
    fn score_shows_vitals_and_xp_target() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        let outcome = score(&ctx, &player, "score", "");
        assert!(outcome.reply.contains("HP 100/100"));
        assert!(outcome.reply.contains("next level at 282"));
    }

    #[test]
    fn save_writes_a_snapshot() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        assert_eq!(save(&ctx, &player, "save", "").reply, "Saved.");
        assert!(store.load(player.character_id).unwrap().is_some());
    }
}
