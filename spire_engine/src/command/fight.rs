//! Attacking and spellcasting.

use std::sync::Arc;

use super::{CommandContext, CommandOutcome};
use crate::combat::initiate_attack;
use crate::player::Player;
use crate::spell;

pub fn attack(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Attack what?");
    }
    match initiate_attack(ctx.world, player, args) {
        Ok(reply) => CommandOutcome::reply(reply),
        Err(err) => CommandOutcome::reply(err.to_string()),
    }
}

pub fn cast(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Cast what?");
    }
    // "cast firebolt rat" or "cast firebolt on rat".
    let (spell_name, target) = match args.split_once(char::is_whitespace) {
        Some((spell_name, rest)) => {
            let rest = rest.trim();
            let target = rest.strip_prefix("on ").map_or(rest, str::trim);
            (spell_name, target)
        }
        None => (args, ""),
    };

    match spell::cast(ctx.world, player, spell_name, target) {
        Ok(outcome) => {
            let room_id = player.current_room();
            for line in &outcome.broadcasts {
                ctx.world.broadcast_room(&room_id, line, Some(&player.name));
            }
            CommandOutcome::reply(outcome.lines.join("\n"))
        }
        Err(err) => CommandOutcome::reply(err.to_string()),
    }
}
