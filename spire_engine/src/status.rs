//! Timed per-entity state: stun, root, spell cooldowns, buffs, and poison.
//!
//! Everything is stored as an absolute monotonic expiry. Queries lazily
//! clear entries that are no longer in the future, so repeated queries with
//! no intervening action always agree. Callers pass `now` explicitly, which
//! keeps the arithmetic testable without sleeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuffKind {
    Armor,
    Damage,
    Stealth,
}

#[derive(Debug, Clone)]
pub struct ActiveBuff {
    pub kind: BuffKind,
    pub amount: i32,
    pub until: Instant,
}

/// A damage-over-time stack applied by a spell; ticked once per combat round.
#[derive(Debug, Clone)]
pub struct PoisonStack {
    pub per_round: i32,
    pub rounds_left: u32,
    pub source: String,
}

#[derive(Debug, Default)]
pub struct StatusTimers {
    stun_until: Option<Instant>,
    root_until: Option<Instant>,
    cooldowns: HashMap<String, Instant>,
    buffs: Vec<ActiveBuff>,
    poison: Vec<PoisonStack>,
}

impl StatusTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stun_for(&mut self, now: Instant, duration: Duration) {
        let until = now + duration;
        // A shorter re-stun never truncates an existing one.
        if self.stun_until.is_none_or(|cur| until > cur) {
            self.stun_until = Some(until);
        }
    }

    pub fn root_for(&mut self, now: Instant, duration: Duration) {
        let until = now + duration;
        if self.root_until.is_none_or(|cur| until > cur) {
            self.root_until = Some(until);
        }
    }

    pub fn is_stunned(&mut self, now: Instant) -> bool {
        if self.stun_until.is_some_and(|until| until <= now) {
            self.stun_until = None;
        }
        self.stun_until.is_some()
    }

    pub fn is_rooted(&mut self, now: Instant) -> bool {
        if self.root_until.is_some_and(|until| until <= now) {
            self.root_until = None;
        }
        self.root_until.is_some()
    }

    pub fn set_cooldown(&mut self, spell_id: &str, now: Instant, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        self.cooldowns.insert(spell_id.to_string(), now + duration);
    }

    /// Remaining cooldown for a spell, clearing the entry once expired.
    pub fn cooldown_remaining(&mut self, spell_id: &str, now: Instant) -> Option<Duration> {
        match self.cooldowns.get(spell_id) {
            Some(&expiry) if expiry > now => Some(expiry - now),
            Some(_) => {
                self.cooldowns.remove(spell_id);
                None
            }
            None => None,
        }
    }

    pub fn add_buff(&mut self, kind: BuffKind, amount: i32, now: Instant, duration: Duration) {
        self.buffs.push(ActiveBuff {
            kind,
            amount,
            until: now + duration,
        });
    }

    /// Sum of active buff amounts of one kind, pruning expired entries.
    pub fn buff_total(&mut self, kind: BuffKind, now: Instant) -> i32 {
        self.buffs.retain(|buff| buff.until > now);
        self.buffs
            .iter()
            .filter(|buff| buff.kind == kind)
            .map(|buff| buff.amount)
            .sum()
    }

    /// Consume an active stealth buff, if any. Stealth lasts until used.
    pub fn take_stealth(&mut self, now: Instant) -> bool {
        self.buffs.retain(|buff| buff.until > now);
        if let Some(idx) = self.buffs.iter().position(|buff| buff.kind == BuffKind::Stealth) {
            self.buffs.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn add_poison(&mut self, source: &str, per_round: i32, rounds: u32) {
        if per_round <= 0 || rounds == 0 {
            return;
        }
        self.poison.push(PoisonStack {
            per_round,
            rounds_left: rounds,
            source: source.to_string(),
        });
    }

    pub fn is_poisoned(&self) -> bool {
        !self.poison.is_empty()
    }

    /// Advance every poison stack one combat round; returns damage dealt.
    pub fn tick_poison(&mut self) -> i32 {
        let mut total = 0;
        for stack in &mut self.poison {
            total += stack.per_round;
            stack.rounds_left -= 1;
        }
        self.poison.retain(|stack| stack.rounds_left > 0);
        total
    }

    /// Remove hostile effects (stun, root, poison); cure spells call this.
    pub fn cleanse(&mut self) -> bool {
        let had_any = self.stun_until.is_some() || self.root_until.is_some() || !self.poison.is_empty();
        self.stun_until = None;
        self.root_until = None;
        self.poison.clear();
        had_any
    }

    /// Drop all timed state; used when an entity respawns.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn stun_expires_on_time() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        assert!(!timers.is_stunned(start));
        timers.stun_for(start, secs(5));
        assert!(timers.is_stunned(start + secs(4)));
        assert!(!timers.is_stunned(start + secs(5)));
        assert!(!timers.is_stunned(start + secs(6)));
    }

    #[test]
    fn shorter_restun_does_not_truncate() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        timers.stun_for(start, secs(10));
        timers.stun_for(start, secs(2));
        assert!(timers.is_stunned(start + secs(5)));
    }

    #[test]
    fn cooldown_queries_are_idempotent() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        timers.set_cooldown("fireball", start, secs(30));

        let first = timers.cooldown_remaining("fireball", start + secs(10));
        let second = timers.cooldown_remaining("fireball", start + secs(10));
        assert_eq!(first, second);
        assert_eq!(first, Some(secs(20)));

        // After expiry both queries agree on None; the first lazily clears.
        assert_eq!(timers.cooldown_remaining("fireball", start + secs(30)), None);
        assert_eq!(timers.cooldown_remaining("fireball", start + secs(30)), None);
    }

    #[test]
    fn zero_cooldown_is_never_stored() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        timers.set_cooldown("jab", start, secs(0));
        assert_eq!(timers.cooldown_remaining("jab", start), None);
    }

    #[test]
    fn buffs_expire_and_sum_by_kind() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        timers.add_buff(BuffKind::Armor, 2, start, secs(10));
        timers.add_buff(BuffKind::Armor, 3, start, secs(60));
        timers.add_buff(BuffKind::Damage, 4, start, secs(60));
        assert_eq!(timers.buff_total(BuffKind::Armor, start + secs(5)), 5);
        assert_eq!(timers.buff_total(BuffKind::Armor, start + secs(30)), 3);
        assert_eq!(timers.buff_total(BuffKind::Damage, start + secs(30)), 4);
    }

    #[test]
    fn stealth_is_consumed_once() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        timers.add_buff(BuffKind::Stealth, 1, start, secs(60));
        assert!(timers.take_stealth(start));
        assert!(!timers.take_stealth(start));
    }

    #[test]
    fn poison_ticks_down_and_clears() {
        let mut timers = StatusTimers::new();
        timers.add_poison("venom", 3, 2);
        timers.add_poison("acid", 2, 1);
        assert!(timers.is_poisoned());
        assert_eq!(timers.tick_poison(), 5);
        assert_eq!(timers.tick_poison(), 3);
        assert_eq!(timers.tick_poison(), 0);
        assert!(!timers.is_poisoned());
    }

    #[test]
    fn cleanse_strips_hostile_effects_only() {
        let start = Instant::now();
        let mut timers = StatusTimers::new();
        timers.stun_for(start, secs(30));
        timers.root_for(start, secs(30));
        timers.add_poison("venom", 1, 5);
        timers.add_buff(BuffKind::Armor, 2, start, secs(30));
        assert!(timers.cleanse());
        assert!(!timers.is_stunned(start));
        assert!(!timers.is_rooted(start));
        assert!(!timers.is_poisoned());
        // Friendly buffs survive.
        assert_eq!(timers.buff_total(BuffKind::Armor, start), 2);
        assert!(!timers.cleanse());
    }
}
