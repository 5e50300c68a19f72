//! The combat engine: attack resolution, class bonuses, threat, death,
//! loot, and the fixed-period combat round.
//!
//! Lock shape: a strike snapshots the attacker under the player lock,
//! releases it, then applies damage under the defender's lock. Player and
//! NPC locks are never held together except player-before-NPC, per the
//! world lock order. All broadcasts go out after locks are released.

use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;

use crate::class::{Ability, ClassName};
use crate::dice::{DiceExpr, chance, d20, roll};
use crate::item::Item;
use crate::npc::{MobType, Npc};
use crate::player::{Player, Pose};
use crate::quest::note_kill;
use crate::world::World;

/// Rough worth of a kill; tuned by content in a real deployment.
pub fn xp_value(level: u32, max_health: i32) -> u64 {
    u64::from(level) * 25 + max_health.max(0) as u64 / 5
}

/// World-level combat counters (admin `audit` surfaces them).
#[derive(Debug, Default)]
pub struct CombatMetrics {
    pub npc_kills: AtomicU64,
    pub player_deaths: AtomicU64,
    pub flees: AtomicU64,
    /// Flee rolls that succeeded but were suppressed by a root.
    pub flees_suppressed: AtomicU64,
}

impl CombatMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why an attack could not begin. Display strings go to the player as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("There is no '{0}' here.")]
    NoSuchTarget(String),
    #[error("{0} cannot be attacked.")]
    NotAttackable(String),
    #[error("Combat is disabled while pilgrim mode is active.")]
    PilgrimMode,
    #[error("You are in no condition to fight.")]
    Dead,
}

/// Everything one strike produced. The caller delivers `lines` to the
/// attacker and `broadcasts` to the room (excluding the attacker).
#[derive(Debug, Default)]
pub struct StrikeReport {
    pub lines: Vec<String>,
    pub broadcasts: Vec<String>,
    pub killed: bool,
}

/// Attacker-side numbers snapshotted under the player lock.
struct AttackerProfile {
    name: String,
    stunned: bool,
    attack_mod: i32,
    flat_bonus: i32,
    beast_multiplier: bool,
    weapon_dice: DiceExpr,
    sneak_dice: u32,
    multishot: bool,
}

fn weapon_attack_mod(state: &crate::player::PlayerState, weapon: Option<&Item>) -> i32 {
    let str_mod = state.abilities.modifier(Ability::Strength);
    let dex_mod = state.abilities.modifier(Ability::Dexterity);
    match weapon {
        Some(w) if w.finesse => str_mod.max(dex_mod),
        Some(w) if w.ranged => dex_mod,
        _ => str_mod,
    }
}

fn flat_damage_bonus(state: &mut crate::player::PlayerState, weapon: Option<&Item>, target: MobType, now: Instant) -> i32 {
    let mut bonus = 0;
    let ranged = weapon.is_some_and(|w| w.ranged);
    let warrior = state.classes.level_in(ClassName::Warrior);
    if warrior > 0 && !ranged {
        bonus += (warrior / 3) as i32;
    }
    let ranger = state.classes.level_in(ClassName::Ranger);
    if ranger > 0 && ranged {
        bonus += 2 + (ranger / 3) as i32;
    }
    let paladin = state.classes.level_in(ClassName::Paladin);
    if paladin > 0 && matches!(target, MobType::Undead | MobType::Demon) {
        bonus += 2;
    }
    bonus + state.status.buff_total(crate::status::BuffKind::Damage, now)
}

fn snapshot_attacker(player: &Arc<Player>, npc: &Npc, first_hit: bool, now: Instant) -> AttackerProfile {
    let mut state = player.state();
    let weapon = state.equipped_weapon().cloned();
    let attack_mod = weapon_attack_mod(&state, weapon.as_ref());
    let flat_bonus = flat_damage_bonus(&mut state, weapon.as_ref(), npc.mob_type, now);
    let ranger = state.classes.level_in(ClassName::Ranger);
    let rogue = state.classes.level_in(ClassName::Rogue);
    let stealthy = rogue > 0 && state.status.take_stealth(now);
    let ranged = weapon.as_ref().is_some_and(|w| w.ranged);
    AttackerProfile {
        name: player.name.clone(),
        stunned: state.status.is_stunned(now),
        attack_mod,
        flat_bonus,
        beast_multiplier: ranger > 0 && npc.mob_type == MobType::Beast && ranged,
        weapon_dice: weapon
            .as_ref()
            .and_then(|w| w.damage_dice.clone())
            .unwrap_or_else(|| DiceExpr::new(1, 2, 0)),
        sneak_dice: if rogue > 0 && (first_hit || stealthy) {
            1 + rogue / 5
        } else {
            0
        },
        multishot: ranger >= 20 && ranged,
    }
}

/// Begin combat: validate the target, engage both sides, and land the
/// attacker's opening strike. Broadcasts are published before returning.
pub fn initiate_attack(world: &World, player: &Arc<Player>, target: &str) -> Result<String, CombatError> {
    if world.pilgrim_mode() {
        return Err(CombatError::PilgrimMode);
    }
    if player.state().is_dead() {
        return Err(CombatError::Dead);
    }
    let room_id = player.current_room();
    let npc = world
        .find_npc_in_room(&room_id, target)
        .filter(|npc| npc.is_alive())
        .ok_or_else(|| CombatError::NoSuchTarget(target.to_string()))?;
    if !npc.attackable {
        return Err(CombatError::NotAttackable(npc.name.clone()));
    }

    let first_hit = {
        let mut npc_state = npc.state();
        let fresh = !npc_state.in_combat;
        npc_state.engage(&player.name);
        fresh
    };
    {
        let mut state = player.state();
        state.in_combat = true;
        state.combat_target = Some(npc.id);
        state.pose = Pose::Fighting;
        state.touch();
    }

    world.broadcast_room(
        &room_id,
        &format!("{} attacks {}!", player.name, npc.name),
        Some(&player.name),
    );
    let report = player_strike(world, player, &npc, first_hit);
    for line in &report.broadcasts {
        world.broadcast_room(&room_id, line, Some(&player.name));
    }
    Ok(report.lines.join("\n"))
}

/// One player-side swing (plus a possible ranger multishot follow-up).
pub fn player_strike(world: &World, player: &Arc<Player>, npc: &Arc<Npc>, first_hit: bool) -> StrikeReport {
    eprintln!("DBG player_strike enter");
    let now = Instant::now();
    let mut report = StrikeReport::default();
    let profile = snapshot_attacker(player, npc, first_hit, now);

    if profile.stunned {
        report.lines.push("You are stunned and cannot act!".to_string());
        return report;
    }

    let mut swings = 1;
    if profile.multishot && chance(0.20) {
        swings = 2;
    }
    for swing in 0..swings {
        if report.killed {
            break;
        }
        if swing > 0 {
            report.lines.push("You loose a second shot!".to_string());
        }
        swing_once(world, player, npc, &profile, swing == 0, &mut report);
    }
    report
}

fn swing_once(
    world: &World,
    player: &Arc<Player>,
    npc: &Arc<Npc>,
    profile: &AttackerProfile,
    allow_sneak: bool,
    report: &mut StrikeReport,
) {
    eprintln!("DBG swing_once enter");
    let now = Instant::now();
    let attack_roll = d20();

    let mut damage = profile.weapon_dice.roll() + profile.attack_mod + profile.flat_bonus;
    let mut sneak = 0;
    if allow_sneak && profile.sneak_dice > 0 {
        sneak = roll(profile.sneak_dice, 6);
        damage += sneak;
    }
    if profile.beast_multiplier {
        damage += damage / 4;
    }
    // Physical damage is blunted by armor but always leaves a mark.
    damage = (damage - npc.armor).max(1);

    enum Outcome {
        Miss,
        Hit { killed: bool },
        AlreadyDead,
    }
    let outcome = {
        let mut npc_state = npc.state();
        if npc_state.health <= 0 {
            Outcome::AlreadyDead
        } else {
            // Debuff spells lower the effective AC through status buffs.
            let armor_class =
                10 + npc.armor + npc_state.status.buff_total(crate::status::BuffKind::Armor, now);
            if attack_roll + profile.attack_mod < armor_class {
                Outcome::Miss
            } else {
                npc_state.health = (npc_state.health - damage).max(0);
                npc_state.engage(&profile.name);
                npc_state.add_threat(&profile.name, i64::from(damage));
                Outcome::Hit {
                    killed: npc_state.health == 0,
                }
            }
        }
    };

    let killed = match outcome {
        Outcome::AlreadyDead => {
            report.lines.push(format!("{} is already dead.", npc.name));
            return;
        }
        Outcome::Miss => {
            report.lines.push(format!("You swing at {} and miss.", npc.name));
            report.broadcasts.push(format!("{} misses {}.", profile.name, npc.name));
            return;
        }
        Outcome::Hit { killed } => killed,
    };

    if sneak > 0 {
        report.lines.push(format!(
            "Sneak attack! You hit {} for {damage} damage.",
            npc.name
        ));
    } else {
        report.lines.push(format!("You hit {} for {damage} damage.", npc.name));
    }
    report.broadcasts.push(format!("{} hits {}.", profile.name, npc.name));
    player.state().statistics.damage_dealt += damage.max(0) as u64;

    if killed {
        eprintln!("DBG before on_npc_death");
        report.killed = true;
        let (lines, broadcasts) = on_npc_death(world, npc, player);
        eprintln!("DBG after on_npc_death");
        report.lines.extend(lines);
        report.broadcasts.extend(broadcasts);
    }
}

/// Resolve an NPC kill: respawn scheduling, loot and gold on the floor,
/// XP to the killer (last-hitter), quest progress, and titles.
pub(crate) fn on_npc_death(world: &World, npc: &Arc<Npc>, killer: &Arc<Player>) -> (Vec<String>, Vec<String>) {
    eprintln!("DBG on_npc_death enter");
    let now = Instant::now();
    let mut lines = Vec::new();
    let mut broadcasts = vec![format!("{} dies!", npc.name)];
    CombatMetrics::bump(&world.metrics.npc_kills);

    let room_id = npc.current_room();
    eprintln!("DBG got room_id");
    let max_health = npc.state().max_health;
    eprintln!("DBG got max_health");
    {
        let mut state = npc.state();
        eprintln!("DBG before schedule_respawn");
        Npc::schedule_respawn(&mut state, now, npc.respawn_median, npc.respawn_variation);
        eprintln!("DBG after schedule_respawn");
    }

    // Loot and gold land on the floor where the NPC stood.
    eprintln!("DBG before room lookup");
    if let Some(room) = room_id.as_deref().and_then(|id| world.rooms.get(id)) {
        eprintln!("DBG room found");
        let mut dropped = Vec::new();
        for item_id in npc.roll_loot() {
            match world.items.get(&item_id) {
                Some(item) => dropped.push(item.clone()),
                None => warn!("npc '{}': loot item '{item_id}' missing from catalog", npc.name),
            }
        }
        let gold = npc.roll_gold();
        if gold > 0 {
            dropped.push(Item::gold_pile(gold));
        }
        if !dropped.is_empty() {
            let names: Vec<String> = dropped.iter().map(|item| item.name.clone()).collect();
            lines.push(format!("{} drops: {}.", npc.name, names.join(", ")));
            eprintln!("DBG before place_items");
            room.place_items(dropped);
            eprintln!("DBG after place_items");
        }
    }

    eprintln!("DBG before killer.state");
    let xp = xp_value(npc.level, max_health);
    {
        let mut state = killer.state();
        eprintln!("DBG killer.state locked");
        state.statistics.kills += 1;
        state.in_combat = false;
        state.combat_target = None;
        if state.pose == Pose::Fighting {
            state.pose = Pose::Standing;
        }
        let levels = state.gain_experience(xp);
        lines.push(format!("You gain {xp} experience."));
        if levels > 0 {
            lines.push(format!("You are now level {}!", state.level));
            broadcasts.push(format!("{} has reached level {}!", killer.name, state.level));
        }
        eprintln!("DBG before note_kill");
        lines.extend(note_kill(&mut state.quest_log, &world.quests, &npc.name));
        eprintln!("DBG after note_kill");

        if npc.boss {
            let slayer = format!("Slayer of {}", npc.name);
            if !state.titles.contains(&slayer) {
                state.titles.push(slayer.clone());
                lines.push(format!("Title earned: {slayer}."));
            }
            if state.statistics.deaths_during_run == 0 {
                let deathless = "the Deathless".to_string();
                if !state.titles.contains(&deathless) {
                    state.titles.push(deathless.clone());
                    lines.push(format!("Title earned: {deathless}."));
                }
            }
            state.statistics.deaths_during_run = 0;
        }
    }

    (lines, broadcasts)
}

/// One NPC-side swing against a player.
pub fn npc_strike(world: &World, npc: &Arc<Npc>, player: &Arc<Player>) {
    let now = Instant::now();
    let stunned = npc.state().status.is_stunned(now);
    if stunned {
        return;
    }

    let attack_roll = d20();
    let (hit, evaded, damage, died, room_id) = {
        let mut state = player.state();
        let room_id = state.current_room.clone();
        if state.is_dead() {
            return;
        }
        // Rogue evasion happens before armor is even consulted.
        if state.classes.level_in(ClassName::Rogue) >= 15 && chance(0.10) {
            (false, true, 0, false, room_id)
        } else if attack_roll < state.armor_class(now) {
            (false, false, 0, false, room_id)
        } else {
            let mut damage = (npc.damage.roll() - state.armor_value()).max(1);
            if state.classes.level_in(ClassName::Cleric) >= 20 && state.health * 4 < state.max_health {
                damage -= damage / 4;
            }
            state.take_damage(damage);
            state.statistics.damage_taken += damage.max(0) as u64;
            let died = state.is_dead();
            (true, false, damage, died, room_id)
        }
    };

    if evaded {
        player.send(format!("You evade {}'s attack!", npc.name));
    } else if !hit {
        player.send(format!("{} misses you.", npc.name));
    } else {
        player.send(format!("{} hits you for {damage} damage!", npc.name));
        npc.state().add_threat(&player.name, i64::from(damage));
        world.broadcast_room(
            &room_id,
            &format!("{} hits {}.", npc.name, player.name),
            Some(&player.name),
        );
        if died {
            on_player_death(world, player);
        }
    }
}

/// A player has hit zero HP: broadcast, restore, and send them home.
pub fn on_player_death(world: &World, player: &Arc<Player>) {
    CombatMetrics::bump(&world.metrics.player_deaths);
    let from_id = player.current_room();

    // Every NPC lets go of the dead.
    for npc in world.all_npcs() {
        npc.state().drop_target(&player.name);
    }

    let home_id = world
        .rooms
        .values()
        .find(|room| {
            room.floor == Some(0) && room.tower.as_deref() == Some(player.state().home_tower.as_str())
        })
        .map_or_else(|| world.config.starting_room.clone(), |room| room.id.clone());

    let moved = match (world.rooms.get(&from_id), world.rooms.get(&home_id)) {
        (Some(from), Some(to)) => crate::room::Room::transfer_occupant(from, to, &player.name, || {
            let mut state = player.state();
            state.in_combat = false;
            state.combat_target = None;
            state.pose = Pose::Standing;
            state.status.reset();
            state.health = state.max_health;
            state.mana = state.max_mana;
            state.statistics.deaths += 1;
            state.statistics.deaths_during_run += 1;
            state.current_room = to.id.clone();
            true
        }),
        _ => false,
    };
    if !moved {
        warn!("player '{}' died in unknown room '{from_id}'", player.name);
    }

    world.broadcast_room(&from_id, &format!("{} has been slain!", player.name), Some(&player.name));
    player.send("You have been slain! The tower's mercy returns you to the gate, whole but humbler.");
    world.broadcast_room(
        &home_id,
        &format!("{} appears in a flash of returning light.", player.name),
        Some(&player.name),
    );
}

/// The fixed-period combat round the tick scheduler drives.
pub fn run_combat_round(world: &World) {
    if !world.pilgrim_mode() {
        aggro_sweep(world);
    }
    for npc in world.npcs_in_combat() {
        npc_round(world, &npc);
    }
    for player in world.online_players() {
        player_round(world, &player);
    }
}

/// Aggressive NPCs pick fights with whoever is standing in their room.
fn aggro_sweep(world: &World) {
    for npc in world.all_npcs() {
        if !npc.aggressive || !npc.attackable || npc.in_combat() || !npc.is_alive() {
            continue;
        }
        let Some(room_id) = npc.current_room() else {
            continue;
        };
        let Some(victim) = world.players_in_room(&room_id).into_iter().find(|p| !p.state().is_dead())
        else {
            continue;
        };
        npc.state().engage(&victim.name);
        victim.send(format!("{} turns on you with bared teeth!", npc.name));
        world.broadcast_room(
            &room_id,
            &format!("{} turns on {}!", npc.name, victim.name),
            Some(&victim.name),
        );
    }
}

fn npc_round(world: &World, npc: &Arc<Npc>) {
    let now = Instant::now();

    // Dead NPCs are handled synchronously at death; this is a safety.
    if !npc.is_alive() {
        return;
    }

    let Some(room_id) = npc.current_room() else {
        return;
    };

    // Flee evaluation comes before the swing.
    let (wants_flee, rooted) = {
        let mut state = npc.state();
        (npc.wants_to_flee(&state), state.status.is_rooted(now))
    };
    if wants_flee && npc.rolls_flee() {
        if rooted {
            CombatMetrics::bump(&world.metrics.flees_suppressed);
            debug!("npc '{}' flee suppressed by root", npc.name);
        } else {
            CombatMetrics::bump(&world.metrics.flees);
            let mut state = npc.state();
            Npc::schedule_respawn(&mut state, now, npc.respawn_median, npc.respawn_variation);
            drop(state);
            world.broadcast_room(&room_id, &format!("{} breaks off and flees!", npc.name), None);
            return;
        }
    }

    // Swing at the highest-threat player present.
    let present: Vec<String> = world
        .players_in_room(&room_id)
        .iter()
        .map(|p| p.name.clone())
        .collect();
    let target = npc.state().highest_threat_target(&present);
    match target.and_then(|name| world.find_player(&name)) {
        Some(player) => npc_strike(world, npc, &player),
        None => {
            // Nobody left to fight; stand down.
            npc.state().disengage();
        }
    }

    // Out-of-turn effects last.
    let poison = npc.state().status.tick_poison();
    if poison > 0 {
        let died = {
            let mut state = npc.state();
            state.health = (state.health - poison).max(0);
            state.health == 0
        };
        if died {
            let mut state = npc.state();
            Npc::schedule_respawn(&mut state, now, npc.respawn_median, npc.respawn_variation);
            drop(state);
            world.broadcast_room(&room_id, &format!("{} succumbs to poison!", npc.name), None);
        }
    }
}

fn player_round(world: &World, player: &Arc<Player>) {
    // Poison ticks whether or not a fight is on.
    let (poison, died) = {
        let mut state = player.state();
        let poison = state.status.tick_poison();
        if poison > 0 {
            state.take_damage(poison);
        }
        (poison, state.is_dead())
    };
    if poison > 0 {
        player.send(format!("Poison burns through you for {poison}!"));
        if died {
            on_player_death(world, player);
            return;
        }
    }

    let target = {
        let state = player.state();
        if !state.in_combat {
            return;
        }
        state.combat_target
    };

    // Strike back if the target is still a live NPC in the same room.
    let npc = target
        .and_then(|id| world.npc_by_id(id))
        .filter(|npc| npc.is_alive() && npc.current_room() == Some(player.current_room()));
    match npc {
        Some(npc) => {
            let report = player_strike(world, player, &npc, false);
            for line in report.lines {
                player.send(line);
            }
            let room_id = player.current_room();
            for line in report.broadcasts {
                world.broadcast_room(&room_id, &line, Some(&player.name));
            }
        }
        None => {
            let mut state = player.state();
            state.in_combat = false;
            state.combat_target = None;
            if state.pose == Pose::Fighting {
                state.pose = Pose::Standing;
            }
            drop(state);
            player.send("The fight is over.");
        }
    }

    // Veteran warriors shrug off wounds mid-fight.
    let mut state = player.state();
    if state.in_combat && state.classes.level_in(ClassName::Warrior) >= 15 {
        state.heal(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::AbilityScores;
    use crate::config::{ServerConfig, WorldContent};
    use crate::player::PlayerState;

    fn world() -> World {
        World::new(ServerConfig::default(), WorldContent::builtin_demo()).unwrap()
    }

    /// A player strong enough that every d20 roll hits AC 10.
    fn bruiser(world: &World, name: &str) -> Arc<Player> {
        let mut state = PlayerState::basic(&world.config.starting_room);
        state.abilities = AbilityScores::uniform(28); // +9 everywhere
        let player = Arc::new(Player::detached(name, state));
        world.register_player(Arc::clone(&player));
        world.place_player(&player).unwrap();
        player
    }

    fn cellar_rat(world: &World) -> Arc<Npc> {
        world
            .all_npcs()
            .into_iter()
            .find(|npc| npc.name == "tower rat")
            .unwrap()
    }

    /// Walk the bruiser into the cellar where the rat lives.
    fn into_cellar(world: &World, player: &Arc<Player>) {
        let key = world.items["cellar_key"].clone();
        player.state().key_ring.push(key);
        world.move_player(player, "north").unwrap();
    }

    #[test]
    fn pilgrim_mode_blocks_attacks() {
        let world = world();
        let player = bruiser(&world, "Alice");
        world.set_pilgrim_mode(true);
        assert_eq!(
            initiate_attack(&world, &player, "rat"),
            Err(CombatError::PilgrimMode)
        );
    }

    #[test]
    fn missing_target_is_reported() {
        let world = world();
        let player = bruiser(&world, "Alice");
        assert_eq!(
            initiate_attack(&world, &player, "dragon"),
            Err(CombatError::NoSuchTarget("dragon".into()))
        );
    }

    #[test]
    fn shopkeepers_cannot_be_attacked() {
        let world = world();
        let player = bruiser(&world, "Alice");
        assert_eq!(
            initiate_attack(&world, &player, "Gruk"),
            Err(CombatError::NotAttackable("Gruk the Provisioner".into()))
        );
    }

    #[test]
    fn attack_engages_both_sides() {
        let world = world();
        let player = bruiser(&world, "Alice");
        into_cellar(&world, &player);
        let rat = cellar_rat(&world);

        let reply = initiate_attack(&world, &player, "rat").unwrap();
        assert!(!reply.is_empty());
        let state = player.state();
        // Either the rat died to the opening strike or both sides are engaged.
        if rat.is_alive() {
            assert!(state.in_combat);
            assert_eq!(state.combat_target, Some(rat.id));
            assert_eq!(state.pose, Pose::Fighting);
            assert!(rat.state().threat.contains_key("Alice"));
        } else {
            assert!(!state.in_combat);
        }
    }

    #[test]
    fn killing_blow_awards_xp_loot_and_quest_progress() {
        let world = world();
        let player = bruiser(&world, "Alice");
        player.state().quest_log.accept("rat_cull", &[3, 1]);
        into_cellar(&world, &player);
        let rat = cellar_rat(&world);
        rat.state().health = 1;

        let report = {
            rat.state().engage("Alice");
            player_strike(&world, &player, &rat, false)
        };
        assert!(report.killed);
        assert!(!rat.is_alive());

        let state = player.state();
        assert!(state.experience > 0);
        assert_eq!(state.statistics.kills, 1);
        assert!(!state.in_combat);
        let progress = state.quest_log.progress("rat_cull").unwrap();
        assert_eq!(progress[0].current, 1);

        // Respawn got scheduled inside the 60±10s window.
        let rat_state = rat.state();
        assert!(rat_state.death_time.is_some());
        assert!(rat_state.respawn_at.is_some());
        assert_eq!(rat_state.current_room, None);
        drop(rat_state);
        assert!(world.audit().is_empty());
    }

    #[test]
    fn dead_npc_drops_configured_loot() {
        let world = world();
        let player = bruiser(&world, "Alice");
        into_cellar(&world, &player);
        let rat = cellar_rat(&world);
        // A one-hit-point rat with a guaranteed drop and no respawn.
        let mut sure_rat: crate::npc::NpcDef = serde_yaml::from_str(
            r"
name: gutter rat
health: 1
damage: 1d2
mob_type: beast
aggressive: true
spawn_room: tower_cellar
loot:
  - { item_id: rat_tail, chance_pct: 100 }
",
        )
        .unwrap();
        sure_rat.spawn_room = rat.original_room.clone();
        sure_rat.sanitize();
        let gutter = Arc::new(Npc::from_def(&sure_rat));
        world.add_npc(Arc::clone(&gutter));

        gutter.state().engage("Alice");
        let report = player_strike(&world, &player, &gutter, false);
        assert!(report.killed);

        let cellar = world.rooms[&gutter.original_room].clone();
        let floor: Vec<String> = cellar.peek_items().into_iter().map(|i| i.id).collect();
        assert!(floor.contains(&"rat_tail".to_string()), "floor: {floor:?}");
        // Median 0: never respawns.
        assert_eq!(gutter.state().respawn_at, None);
    }

    #[test]
    fn player_death_returns_home_restored() {
        let world = world();
        let player = bruiser(&world, "Alice");
        player.state().home_tower = "human".into();
        into_cellar(&world, &player);
        player.state().health = 1;
        player.state().in_combat = true;
        player.state().take_damage(10);
        assert!(player.state().is_dead());

        on_player_death(&world, &player);

        let state = player.state();
        assert_eq!(state.current_room, "human_tower_0");
        assert_eq!(state.health, state.max_health);
        assert!(!state.in_combat);
        assert_eq!(state.statistics.deaths, 1);
        assert_eq!(state.statistics.deaths_during_run, 1);
        drop(state);
        assert!(world.rooms["human_tower_0"].has_occupant("Alice"));
        assert!(!world.rooms["tower_cellar"].has_occupant("Alice"));
        assert!(world.audit().is_empty());
    }

    #[test]
    fn combat_round_disengages_npc_with_no_targets() {
        let world = world();
        let rat = cellar_rat(&world);
        rat.state().engage("Ghost");
        run_combat_round(&world);
        assert!(!rat.in_combat());
    }

    #[test]
    fn attack_modifier_picks_the_right_stat() {
        let mut state = PlayerState::basic("start");
        state.abilities.strength = 18; // +4
        state.abilities.dexterity = 12; // +1
        assert_eq!(weapon_attack_mod(&state, None), 4);

        let mut bow = Item::simple("bow", "short bow");
        bow.ranged = true;
        assert_eq!(weapon_attack_mod(&state, Some(&bow)), 1);

        let mut dagger = Item::simple("dagger", "stiletto");
        dagger.finesse = true;
        assert_eq!(weapon_attack_mod(&state, Some(&dagger)), 4);
        state.abilities.dexterity = 20; // +5, now better than STR
        assert_eq!(weapon_attack_mod(&state, Some(&dagger)), 5);
    }

    #[test]
    fn class_damage_bonuses_stack_correctly() {
        let now = Instant::now();
        let scores = AbilityScores::uniform(16);
        let mut state = PlayerState::new_character(ClassName::Warrior, "human", scores, "human", "s");
        for _ in 0..30 {
            let _ = state.classes.raise(ClassName::Warrior, &scores);
        }
        // Warrior 31: +10 melee.
        assert_eq!(flat_damage_bonus(&mut state, None, MobType::Humanoid, now), 10);
        // Ranged weapons get no warrior bonus.
        let mut bow = Item::simple("bow", "short bow");
        bow.ranged = true;
        assert_eq!(flat_damage_bonus(&mut state, Some(&bow), MobType::Humanoid, now), 0);

        let mut paladin = PlayerState::new_character(ClassName::Paladin, "human", scores, "human", "s");
        assert_eq!(flat_damage_bonus(&mut paladin, None, MobType::Undead, now), 2);
        assert_eq!(flat_damage_bonus(&mut paladin, None, MobType::Beast, now), 0);
    }

    #[test]
    fn xp_value_scales_with_level_and_bulk() {
        assert_eq!(xp_value(1, 20), 29);
        assert!(xp_value(10, 500) > xp_value(1, 20));
    }
}
