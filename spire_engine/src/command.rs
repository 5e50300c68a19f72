//! Command dispatch: one input line to one handler.
//!
//! A line splits into a case-insensitive verb and the raw remainder. Verbs
//! resolve through a registry of aliases; handlers receive the world, the
//! player, the verb actually typed (movement verbs are their own argument),
//! and the remainder. Admin verbs are invisible to non-admins.

pub mod admin;
pub mod fight;
pub mod items;
pub mod movement;
pub mod progression;
pub mod social;
pub mod system;

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

use crate::persist::CharacterStore;
use crate::player::Player;
use crate::world::World;

/// Shared capabilities handlers work against.
pub struct CommandContext<'a> {
    pub world: &'a Arc<World>,
    pub store: &'a Arc<dyn CharacterStore>,
}

/// A handler's reply, plus whether the session should end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub reply: String,
    pub quit: bool,
}

impl CommandOutcome {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            quit: false,
        }
    }

    pub fn quit(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            quit: true,
        }
    }
}

pub type Handler = fn(&CommandContext<'_>, &Arc<Player>, &str, &str) -> CommandOutcome;

pub struct CommandSpec {
    pub verbs: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
    pub admin: bool,
    pub handler: Handler,
}

macro_rules! cmd {
    (admin $verbs:expr, $usage:expr, $summary:expr, $handler:expr) => {
        CommandSpec {
            verbs: $verbs,
            usage: $usage,
            summary: $summary,
            admin: true,
            handler: $handler,
        }
    };
    ($verbs:expr, $usage:expr, $summary:expr, $handler:expr) => {
        CommandSpec {
            verbs: $verbs,
            usage: $usage,
            summary: $summary,
            admin: false,
            handler: $handler,
        }
    };
}

lazy_static! {
    pub static ref REGISTRY: Vec<CommandSpec> = vec![
        // movement
        cmd!(&["north", "n"], "north", "Walk north.", movement::dir),
        cmd!(&["south", "s"], "south", "Walk south.", movement::dir),
        cmd!(&["east", "e"], "east", "Walk east.", movement::dir),
        cmd!(&["west", "w"], "west", "Walk west.", movement::dir),
        cmd!(&["northeast", "ne"], "northeast", "Walk northeast.", movement::dir),
        cmd!(&["northwest", "nw"], "northwest", "Walk northwest.", movement::dir),
        cmd!(&["southeast", "se"], "southeast", "Walk southeast.", movement::dir),
        cmd!(&["southwest", "sw"], "southwest", "Walk southwest.", movement::dir),
        cmd!(&["up", "u"], "up", "Climb up.", movement::dir),
        cmd!(&["down", "d"], "down", "Climb down.", movement::dir),
        cmd!(&["go", "walk"], "go <direction>", "Walk through a named exit.", movement::go),
        cmd!(&["flee"], "flee", "Break off combat and run.", movement::flee),
        cmd!(&["sit"], "sit", "Sit down.", movement::sit),
        cmd!(&["rest"], "rest", "Rest to recover faster.", movement::rest),
        cmd!(&["sleep"], "sleep", "Sleep to recover fastest.", movement::sleep),
        cmd!(&["stand", "wake"], "stand", "Stand up / wake up.", movement::stand),
        cmd!(&["portal"], "portal [floor]", "Travel between attuned portals.", movement::portal),
        // items & looking
        cmd!(&["look", "l"], "look [thing]", "Look around, or at something.", items::look),
        cmd!(&["inventory", "inv", "i"], "inventory", "List what you carry.", items::inventory),
        cmd!(&["get", "take"], "get <item>", "Pick something up.", items::get),
        cmd!(&["drop"], "drop <item>", "Put something down.", items::drop_item),
        cmd!(&["equip", "wear", "wield"], "equip <item>", "Equip a carried item.", items::equip),
        cmd!(&["remove", "unequip"], "remove <item|slot>", "Unequip an item.", items::remove),
        cmd!(&["eat", "drink", "use", "quaff"], "eat <item>", "Consume a consumable.", items::consume),
        // combat & magic
        cmd!(&["attack", "kill", "k"], "attack <target>", "Attack a creature.", fight::attack),
        cmd!(&["cast", "c"], "cast <spell> [target]", "Cast a spell.", fight::cast),
        // social
        cmd!(&["say", "'"], "say <words>", "Speak to the room.", social::say),
        cmd!(&["shout", "yell"], "shout <words>", "Shout across the world.", social::shout),
        cmd!(&["tell", "whisper", "t"], "tell <player> <words>", "Speak privately.", social::tell),
        cmd!(&["emote", "me"], "emote <action>", "Perform an action.", social::emote),
        cmd!(&["who"], "who", "List who is online.", social::who),
        cmd!(&["ignore"], "ignore [player]", "Ignore a player's chat, or list ignores.", social::ignore),
        cmd!(&["talk", "greet"], "talk <npc>", "Talk to someone.", social::talk),
        // progression & trade
        cmd!(&["learn"], "learn [spell]", "Learn spells from a trainer.", progression::learn),
        cmd!(&["train"], "train [class]", "Train classes, or switch your active class.", progression::train),
        cmd!(&["quest", "quests", "journal"], "quest [accept|abandon|turnin|log] [name]", "Manage your quest log.", progression::quest),
        cmd!(&["craft"], "craft [recipe]", "Craft from known recipes.", progression::craft),
        cmd!(&["shop"], "shop", "Browse a shopkeeper's wares.", progression::shop),
        cmd!(&["buy"], "buy <item>", "Buy from a shopkeeper.", progression::buy),
        cmd!(&["sell"], "sell <item>", "Sell to a shopkeeper.", progression::sell),
        cmd!(&["stall"], "stall open|add|close|list|buy ...", "Run a market stall.", progression::stall),
        cmd!(&["title", "titles"], "title [set <title>|clear]", "Show or set your title.", progression::title),
        // system
        cmd!(&["help", "?"], "help [topic]", "Show help.", system::help),
        cmd!(&["time"], "time", "What hour is it?", system::time),
        cmd!(&["score", "stats", "st"], "score", "Your character sheet.", system::score),
        cmd!(&["save"], "save", "Save your character now.", system::save),
        cmd!(&["quit", "logout", "exit"], "quit", "Leave the world.", system::quit),
        // admin
        cmd!(admin &["teleport", "tp"], "teleport <room>", "Jump to a room.", admin::teleport),
        cmd!(admin &["summon"], "summon <player>", "Pull a player to you.", admin::summon),
        cmd!(admin &["setstat"], "setstat <player> <stat> <value>", "Rewrite a stat.", admin::setstat),
        cmd!(admin &["saveall"], "saveall", "Checkpoint every character.", admin::saveall),
        cmd!(admin &["kick"], "kick <player>", "Disconnect a player.", admin::kick),
        cmd!(admin &["pilgrim"], "pilgrim on|off", "Toggle pilgrim mode.", admin::pilgrim),
        cmd!(admin &["audit"], "audit", "Check world invariants.", admin::audit),
        cmd!(admin &["shutdown"], "shutdown", "Stop the server.", admin::shutdown),
    ];
    static ref INDEX: HashMap<&'static str, usize> = {
        let mut index = HashMap::new();
        for (i, spec) in REGISTRY.iter().enumerate() {
            for verb in spec.verbs {
                let clobbered = index.insert(*verb, i);
                debug_assert!(clobbered.is_none(), "duplicate verb alias '{verb}'");
            }
        }
        index
    };
}

/// Parse one input line and run its handler.
pub fn dispatch(ctx: &CommandContext<'_>, player: &Arc<Player>, line: &str) -> CommandOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return CommandOutcome::reply("");
    }
    let (verb_raw, args) = match trimmed.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed, ""),
    };
    let verb = verb_raw.to_lowercase();

    let spec = INDEX.get(verb.as_str()).map(|&i| &REGISTRY[i]);
    match spec {
        Some(spec) if !spec.admin || player.state().is_admin => {
            player.state().touch();
            (spec.handler)(ctx, player, spec.verbs[0], args)
        }
        // Admin verbs stay invisible to everyone else.
        _ => CommandOutcome::reply(format!("Unknown command '{verb}'. Try 'help'.")),
    }
}
