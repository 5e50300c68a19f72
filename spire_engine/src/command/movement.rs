//! Movement, posture, fleeing, and portal travel.

use rand::seq::SliceRandom;
use std::sync::Arc;

use super::{CommandContext, CommandOutcome};
use crate::player::{Player, Pose};
use crate::world::MoveReport;

/// Publish a successful move's broadcasts and build the mover's reply.
fn deliver_move(ctx: &CommandContext<'_>, player: &Arc<Player>, report: &MoveReport) -> String {
    ctx.world
        .broadcast_room(&report.from, &report.leave_broadcast, Some(&player.name));
    ctx.world
        .broadcast_room(&report.to, &report.arrive_broadcast, Some(&player.name));
    let mut reply = report.notes.join("\n");
    if !reply.is_empty() {
        reply.push('\n');
    }
    reply.push_str(&report.description);
    reply
}

fn move_to(ctx: &CommandContext<'_>, player: &Arc<Player>, direction: &str) -> CommandOutcome {
    match ctx.world.move_player(player, direction) {
        Ok(report) => CommandOutcome::reply(deliver_move(ctx, player, &report)),
        Err(err) => CommandOutcome::reply(err.to_string()),
    }
}

pub fn dir(ctx: &CommandContext<'_>, player: &Arc<Player>, verb: &str, _args: &str) -> CommandOutcome {
    move_to(ctx, player, verb)
}

pub fn go(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Go where?");
    }
    move_to(ctx, player, args)
}

/// Break combat and bolt through a random exit.
pub fn flee(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let room_id = {
        let mut state = player.state();
        if !state.in_combat {
            return CommandOutcome::reply("You aren't fighting anyone.");
        }
        state.in_combat = false;
        state.combat_target = None;
        state.pose = Pose::Standing;
        state.current_room.clone()
    };
    // Pursuers lose interest the moment you bolt.
    for npc in ctx.world.npcs_in_room(&room_id) {
        npc.state().drop_target(&player.name);
    }

    let mut directions: Vec<String> = ctx
        .world
        .rooms
        .get(&room_id)
        .map(|room| room.exits.keys().cloned().collect())
        .unwrap_or_default();
    directions.shuffle(&mut rand::rng());

    for direction in directions {
        if let Ok(report) = ctx.world.move_player(player, &direction) {
            ctx.world
                .broadcast_room(&report.from, &format!("{} flees!", player.name), Some(&player.name));
            ctx.world
                .broadcast_room(&report.to, &report.arrive_broadcast, Some(&player.name));
            let mut reply = format!("You flee {direction}!\n");
            reply.push_str(&report.description);
            return CommandOutcome::reply(reply);
        }
    }
    CommandOutcome::reply("There's nowhere to run!")
}

fn set_pose(player: &Arc<Player>, pose: Pose, reply: &str) -> CommandOutcome {
    let mut state = player.state();
    if state.in_combat {
        return CommandOutcome::reply("Not while you're fighting!");
    }
    if state.pose == pose {
        return CommandOutcome::reply(format!("You are already {}.", pose.label()));
    }
    state.pose = pose;
    CommandOutcome::reply(reply)
}

pub fn sit(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    set_pose(player, Pose::Sitting, "You sit down.")
}

pub fn rest(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    set_pose(player, Pose::Resting, "You settle down to rest.")
}

pub fn sleep(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    set_pose(player, Pose::Sleeping, "You curl up and fall asleep.")
}

pub fn stand(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let mut state = player.state();
    match state.pose {
        Pose::Standing | Pose::Fighting => CommandOutcome::reply("You are already on your feet."),
        Pose::Sleeping => {
            state.pose = Pose::Standing;
            CommandOutcome::reply("You wake and stand up.")
        }
        _ => {
            state.pose = Pose::Standing;
            CommandOutcome::reply("You stand up.")
        }
    }
}

/// List attuned floors of this tower, or travel to one.
pub fn portal(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let room_id = player.current_room();
    let Some(room) = ctx.world.rooms.get(&room_id) else {
        return CommandOutcome::reply("The world frays at the edges here.");
    };
    if !room.portal {
        return CommandOutcome::reply("There is no portal here.");
    }
    let Some(tower) = room.tower.clone() else {
        return CommandOutcome::reply("This portal hums but leads nowhere.");
    };

    let discovered = player.state().portals.discovered(&tower);
    if args.is_empty() {
        let floors: Vec<String> = discovered.iter().map(ToString::to_string).collect();
        return CommandOutcome::reply(format!(
            "Attuned floors of the {tower} tower: {}. Use 'portal <floor>'.",
            floors.join(", ")
        ));
    }

    let Ok(floor) = args.trim().parse::<u32>() else {
        return CommandOutcome::reply("Portals answer to floor numbers. Try 'portal 0'.");
    };
    if !discovered.contains(&floor) {
        return CommandOutcome::reply("You haven't attuned to that floor's portal yet.");
    }
    if room.floor == Some(floor) {
        return CommandOutcome::reply("You are already standing there.");
    }
    let dest = ctx
        .world
        .rooms
        .values()
        .find(|r| r.portal && r.tower.as_deref() == Some(tower.as_str()) && r.floor == Some(floor));
    let Some(dest) = dest else {
        return CommandOutcome::reply("That portal ring is dark and dead.");
    };

    match ctx.world.teleport_player(player, &dest.id) {
        Ok(report) => {
            ctx.world.broadcast_room(
                &report.from,
                &format!("{} steps into the portal and is gone.", player.name),
                Some(&player.name),
            );
            ctx.world.broadcast_room(
                &report.to,
                &format!("{} steps out of the portal.", player.name),
                Some(&player.name),
            );
            let mut reply = format!("The world folds, and you step out on floor {floor}.\n");
            reply.push_str(&report.description);
            CommandOutcome::reply(reply)
        }
        Err(err) => CommandOutcome::reply(err.to_string()),
    }
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
    fn portal_lists_then_travels() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        // Attune to floor 1 by walking there once, then come back.
        world.move_player(&player, "up").unwrap();
        world.move_player(&player, "down").unwrap();

        let listing = portal(&ctx, &player, "portal", "");
        assert!(listing.reply.contains("0, 1"), "{}", listing.reply);

        let outcome = portal(&ctx, &player, "portal", "1");
        assert!(outcome.reply.contains("floor 1"), "{}", outcome.reply);
        assert_eq!(player.current_room(), "human_tower_1");
    }

    #[test]
    fn portal_refuses_unattuned_floors() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        let outcome = portal(&ctx, &player, "portal", "1");
        assert!(outcome.reply.contains("haven't attuned"), "{}", outcome.reply);
        assert_eq!(player.current_room(), world.config.starting_room);
    }

    #[test]
    fn portal_needs_a_portal_room() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        player.state().key_ring.push(world.items["cellar_key"].clone());
        world.move_player(&player, "north").unwrap();
        let outcome = portal(&ctx, &player, "portal", "");
        assert_eq!(outcome.reply, "There is no portal here.");
    }

    #[test]
    fn flee_breaks_combat_and_moves() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        player.state().in_combat = true;
        player.state().pose = Pose::Fighting;
        let outcome = flee(&ctx, &player, "flee", "");
        assert!(outcome.reply.starts_with("You flee"), "{}", outcome.reply);
        assert!(!player.state().in_combat);
        assert_ne!(player.current_room(), world.config.starting_room);
    }

    #[test]
    fn pose_round_trip() {
        let (world, store, player) = setup();
        let ctx = CommandContext { world: &world, store: &store };
        assert_eq!(sit(&ctx, &player, "sit", "").reply, "You sit down.");
        assert_eq!(player.state().pose, Pose::Sitting);
        assert_eq!(stand(&ctx, &player, "stand", "").reply, "You stand up.");
        assert_eq!(sleep(&ctx, &player, "sleep", "").reply, "You curl up and fall asleep.");
        assert_eq!(stand(&ctx, &player, "stand", "").reply, "You wake and stand up.");
    }
}
