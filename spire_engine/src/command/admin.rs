//! Admin verbs. All of these are gated on `is_admin` by the dispatcher.

use std::sync::Arc;

use super::{CommandContext, CommandOutcome};
use crate::persist::save_player;
use crate::player::Player;

pub fn teleport(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Teleport where? (room id)");
    }
    match ctx.world.teleport_player(player, args.trim()) {
        Ok(report) => {
            ctx.world
                .broadcast_room(&report.from, &report.leave_broadcast, Some(&player.name));
            ctx.world
                .broadcast_room(&report.to, &report.arrive_broadcast, Some(&player.name));
            CommandOutcome::reply(report.description)
        }
        Err(err) => CommandOutcome::reply(err.to_string()),
    }
}

pub fn summon(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let Some(target) = ctx.world.find_player(args) else {
        return CommandOutcome::reply(format!("No player named '{args}' is online."));
    };
    if Arc::ptr_eq(&target, player) {
        return CommandOutcome::reply("You are already here.");
    }
    let here = player.current_room();
    match ctx.world.teleport_player(&target, &here) {
        Ok(report) => {
            ctx.world
                .broadcast_room(&report.from, &report.leave_broadcast, Some(&target.name));
            target.send(format!("A greater power pulls you across the spire.\n{}", report.description));
            CommandOutcome::reply(format!("You summon {}.", target.name))
        }
        Err(err) => CommandOutcome::reply(err.to_string()),
    }
}

pub fn setstat(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let parts: Vec<&str> = args.split_whitespace().collect();
    let [target, stat, value] = parts.as_slice() else {
        return CommandOutcome::reply("Usage: setstat <player> <stat> <value>");
    };
    let Some(target) = ctx.world.find_player(target) else {
        return CommandOutcome::reply(format!("No player named '{target}' is online."));
    };
    let Ok(value) = value.parse::<i64>() else {
        return CommandOutcome::reply("The value must be a number.");
    };
    let mut state = target.state();
    let v32 = value as i32;
    match stat.to_lowercase().as_str() {
        "gold" => state.gold = value,
        "health" | "hp" => state.health = v32.clamp(0, state.max_health),
        "mana" | "mp" => state.mana = v32.clamp(0, state.max_mana),
        "level" => state.level = value.max(1) as u32,
        "experience" | "xp" => state.experience = value.max(0) as u64,
        "str" => state.abilities.strength = v32,
        "dex" => state.abilities.dexterity = v32,
        "con" => state.abilities.constitution = v32,
        "int" => state.abilities.intelligence = v32,
        "wis" => state.abilities.wisdom = v32,
        "cha" => state.abilities.charisma = v32,
        other => return CommandOutcome::reply(format!("Unknown stat '{other}'.")),
    }
    CommandOutcome::reply(format!("{}'s {stat} set to {value}.", target.name))
}

pub fn saveall(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let players = ctx.world.online_players();
    for player in &players {
        save_player(ctx.store, player);
    }
    CommandOutcome::reply(format!("Checkpointed {} character(s).", players.len()))
}

pub fn kick(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let Some(target) = ctx.world.find_player(args) else {
        return CommandOutcome::reply(format!("No player named '{args}' is online."));
    };
    if Arc::ptr_eq(&target, player) {
        return CommandOutcome::reply("Use 'quit' on yourself.");
    }
    target.send("You have been disconnected by an administrator.");
    target.request_close();
    CommandOutcome::reply(format!("{} has been kicked.", target.name))
}

pub fn pilgrim(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let on = match args.trim().to_lowercase().as_str() {
        "on" => true,
        "off" => false,
        _ => return CommandOutcome::reply("Usage: pilgrim on|off"),
    };
    ctx.world.set_pilgrim_mode(on);
    if on {
        ctx.world
            .broadcast_global("A hush falls over the spire: combat is suspended.");
    } else {
        ctx.world.broadcast_global("The truce ends. Steel is legal again.");
    }
    CommandOutcome::reply(format!("Pilgrim mode is now {}.", if on { "on" } else { "off" }))
}

pub fn audit(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let problems = ctx.world.audit();
    if problems.is_empty() {
        CommandOutcome::reply("World invariants hold.")
    } else {
        CommandOutcome::reply(format!("World invariants VIOLATED:\n{}", problems.join("\n")))
    }
}

pub fn shutdown(ctx: &CommandContext<'_>, _player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    ctx.world
        .broadcast_global("The server is shutting down. Your progress is being saved.");
    for player in ctx.world.online_players() {
        save_player(ctx.store, &player);
    }
    ctx.world.begin_shutdown();
    CommandOutcome::reply("Shutdown begun.")
}
