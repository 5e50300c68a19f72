//! Looking, carrying, equipping, and consuming.

use std::sync::Arc;

use super::{CommandContext, CommandOutcome};
use crate::item::Slot;
use crate::player::Player;
use crate::quest::note_collect;

pub fn look(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    let room_id = player.current_room();
    let Some(room) = ctx.world.rooms.get(&room_id) else {
        return CommandOutcome::reply("The world frays at the edges here.");
    };
    if args.is_empty() {
        return CommandOutcome::reply(ctx.world.describe_room(room, player));
    }

    // Inventory and equipment first, then the floor, then the neighbors.
    {
        let state = player.state();
        if let Some(item) = state
            .inventory
            .iter()
            .chain(state.equipment.values())
            .chain(state.key_ring.iter())
            .find(|item| item.matches(args))
        {
            let text = if item.description.is_empty() {
                format!("{}: nothing remarkable.", item.name)
            } else {
                format!("{}: {}", item.name, item.description)
            };
            return CommandOutcome::reply(text);
        }
    }
    if let Some(item) = room.peek_items().into_iter().find(|item| item.matches(args)) {
        let text = if item.description.is_empty() {
            format!("{}: nothing remarkable.", item.name)
        } else {
            format!("{}: {}", item.name, item.description)
        };
        return CommandOutcome::reply(text);
    }
    if let Some(npc) = ctx.world.find_npc_in_room(&room_id, args) {
        let mut text = npc.description.clone();
        if text.is_empty() {
            text = format!("{} looks entirely unremarkable.", npc.name);
        }
        return CommandOutcome::reply(text);
    }
    if let Some(other) = ctx
        .world
        .players_in_room(&room_id)
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(args))
    {
        return CommandOutcome::reply(format!("{} is here, looking capable.", other.styled_name()));
    }
    CommandOutcome::reply(format!("You see no '{args}' here."))
}

pub fn inventory(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, _args: &str) -> CommandOutcome {
    let state = player.state();
    let mut lines = vec![format!(
        "You carry {} gold ({}/{} weight).",
        state.gold,
        state.carry_weight(),
        state.carry_capacity()
    )];
    if state.inventory.is_empty() {
        lines.push("Your pack is empty.".to_string());
    } else {
        for item in &state.inventory {
            lines.push(format!("  {}", item.name));
        }
    }
    let mut equipped: Vec<(Slot, String)> = state
        .equipment
        .iter()
        .map(|(&slot, item)| (slot, item.name.clone()))
        .collect();
    if !equipped.is_empty() {
        equipped.sort_by_key(|(slot, _)| *slot);
        lines.push("Equipped:".to_string());
        for (slot, name) in equipped {
            lines.push(format!("  [{}] {}", slot.label(), name));
        }
    }
    if !state.key_ring.is_empty() {
        lines.push(format!(
            "Keys: {}.",
            state
                .key_ring
                .iter()
                .map(|k| k.name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if !state.quest_items.is_empty() {
        lines.push(format!(
            "Quest items: {}.",
            state
                .quest_items
                .iter()
                .map(|k| k.name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    CommandOutcome::reply(lines.join("\n"))
}

pub fn get(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Get what?");
    }
    let room_id = player.current_room();
    let Some(room) = ctx.world.rooms.get(&room_id) else {
        return CommandOutcome::reply("The world frays at the edges here.");
    };
    let Some(item) = room.take_item(args) else {
        return CommandOutcome::reply(format!("You don't see '{args}' here."));
    };
    let name = item.name.clone();

    let reply = {
        let mut state = player.state();
        if item.is_gold() {
            state.gold += item.value;
            state.statistics.gold_earned += item.value.max(0) as u64;
            format!("You pocket {name}.")
        } else if item.quest_bound {
            let id = item.id.clone();
            state.quest_items.push(item);
            let mut lines = vec![format!("You take the {name} (quest item).")];
            lines.extend(note_collect(&mut state.quest_log, &ctx.world.quests, &id));
            lines.join("\n")
        } else {
            if state.carry_weight() + item.weight > state.carry_capacity() {
                std::mem::drop(state);
                room.place_item(item);
                return CommandOutcome::reply(format!("The {name} is too heavy to carry right now."));
            }
            let id = item.id.clone();
            state.inventory.push(item);
            let mut lines = vec![format!("You take the {name}.")];
            lines.extend(note_collect(&mut state.quest_log, &ctx.world.quests, &id));
            lines.join("\n")
        }
    };
    ctx.world
        .broadcast_room(&room_id, &format!("{} picks up {name}.", player.name), Some(&player.name));
    CommandOutcome::reply(reply)
}

pub fn drop_item(ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Drop what?");
    }
    let room_id = player.current_room();
    let Some(room) = ctx.world.rooms.get(&room_id) else {
        return CommandOutcome::reply("The world frays at the edges here.");
    };
    let item = {
        let mut state = player.state();
        let Some(idx) = crate::item::find_item(&state.inventory, args) else {
            return CommandOutcome::reply(format!("You aren't carrying '{args}'."));
        };
        if state.inventory[idx].quest_bound {
            return CommandOutcome::reply("Quest items stay with you until the quest is done.");
        }
        state.inventory.remove(idx)
    };
    let name = item.name.clone();
    room.place_item(item);
    ctx.world
        .broadcast_room(&room_id, &format!("{} drops {name}.", player.name), Some(&player.name));
    CommandOutcome::reply(format!("You drop the {name}."))
}

pub fn equip(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Equip what?");
    }
    let result = player.state().equip(args);
    CommandOutcome::reply(result.unwrap_or_else(|err| err.to_string()))
}

pub fn remove(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Remove what?");
    }
    let result = player.state().unequip(args);
    CommandOutcome::reply(result.unwrap_or_else(|err| err.to_string()))
}

pub fn consume(_ctx: &CommandContext<'_>, player: &Arc<Player>, _verb: &str, args: &str) -> CommandOutcome {
    if args.is_empty() {
        return CommandOutcome::reply("Consume what?");
    }
    let result = player.state().consume(args);
    CommandOutcome::reply(result.unwrap_or_else(|err| err))
}
