//! Chat hygiene: the profanity filter and the per-player anti-spam tracker.

use log::warn;
use regex::Regex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// What to do with a message that contains a banned word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterMode {
    /// Mask each banned word with asterisks and deliver the rest.
    #[default]
    Replace,
    /// Refuse to deliver the message at all.
    Block,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default)]
    pub banned: Vec<String>,
}

/// Result of running one message through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub filtered: String,
    pub violated: bool,
    pub blocked: bool,
    pub matched: Vec<String>,
}

/// Whole-word, case-insensitive banned-word matcher.
#[derive(Debug)]
pub struct ChatFilter {
    enabled: bool,
    mode: FilterMode,
    matcher: Option<Regex>,
}

impl ChatFilter {
    pub fn new(config: &ChatFilterConfig) -> Self {
        let matcher = if config.enabled && !config.banned.is_empty() {
            let alternation = config
                .banned
                .iter()
                .map(|word| regex::escape(word.trim()))
                .filter(|word| !word.is_empty())
                .collect::<Vec<_>>()
                .join("|");
            match Regex::new(&format!(r"(?i)\b({alternation})\b")) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!("chat filter disabled: bad banned-word pattern: {err}");
                    None
                }
            }
        } else {
            None
        };
        Self {
            enabled: config.enabled,
            mode: config.mode,
            matcher,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: FilterMode::Replace,
            matcher: None,
        }
    }

    /// Run one chat message through the filter.
    pub fn apply(&self, input: &str) -> FilterOutcome {
        let Some(matcher) = self.matcher.as_ref().filter(|_| self.enabled) else {
            return FilterOutcome {
                filtered: input.to_string(),
                violated: false,
                blocked: false,
                matched: Vec::new(),
            };
        };

        let matched: Vec<String> = matcher
            .find_iter(input)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if matched.is_empty() {
            return FilterOutcome {
                filtered: input.to_string(),
                violated: false,
                blocked: false,
                matched,
            };
        }

        match self.mode {
            FilterMode::Block => FilterOutcome {
                filtered: input.to_string(),
                violated: true,
                blocked: true,
                matched,
            },
            FilterMode::Replace => {
                let filtered = matcher
                    .replace_all(input, |caps: &regex::Captures<'_>| "*".repeat(caps[0].len()))
                    .into_owned();
                FilterOutcome {
                    filtered,
                    violated: true,
                    blocked: false,
                    matched,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AntiSpamConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_mute_secs")]
    pub mute_secs: u64,
}

fn default_max_messages() -> u32 {
    5
}
fn default_window_secs() -> u64 {
    10
}
fn default_mute_secs() -> u64 {
    30
}

impl Default for AntiSpamConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            window_secs: default_window_secs(),
            mute_secs: default_mute_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    Ok,
    Muted { remaining: Duration },
}

/// Sliding window of recent chat instants for one player.
#[derive(Debug, Default)]
pub struct AntiSpamTracker {
    recent: VecDeque<Instant>,
    muted_until: Option<Instant>,
}

impl AntiSpamTracker {
    /// Record one chat attempt at `now` and report whether it may go through.
    pub fn note(&mut self, config: &AntiSpamConfig, now: Instant) -> SpamVerdict {
        if let Some(until) = self.muted_until {
            if now < until {
                return SpamVerdict::Muted { remaining: until - now };
            }
            self.muted_until = None;
            self.recent.clear();
        }

        let window = Duration::from_secs(config.window_secs);
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) > window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        self.recent.push_back(now);
        if self.recent.len() as u32 > config.max_messages {
            let mute = Duration::from_secs(config.mute_secs);
            self.muted_until = Some(now + mute);
            return SpamVerdict::Muted { remaining: mute };
        }
        SpamVerdict::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replace_filter(banned: &[&str]) -> ChatFilter {
        ChatFilter::new(&ChatFilterConfig {
            enabled: true,
            mode: FilterMode::Replace,
            banned: banned.iter().map(ToString::to_string).collect(),
        })
    }

    #[test]
    fn replace_mode_masks_banned_word() {
        let filter = replace_filter(&["badword"]);
        let outcome = filter.apply("this is a badword test");
        assert_eq!(outcome.filtered, "this is a ******* test");
        assert!(outcome.violated);
        assert!(!outcome.blocked);
        assert_eq!(outcome.matched, vec!["badword".to_string()]);
    }

    #[test]
    fn partial_word_does_not_trip_filter() {
        let filter = replace_filter(&["badword"]);
        let outcome = filter.apply("look at the badger");
        assert!(!outcome.violated);
        assert_eq!(outcome.filtered, "look at the badger");
        assert!(outcome.matched.is_empty());
    }

    #[test]
    fn matching_ignores_case() {
        let filter = replace_filter(&["badword"]);
        let outcome = filter.apply("BadWord!");
        assert!(outcome.violated);
        assert_eq!(outcome.filtered, "*******!");
    }

    #[test]
    fn block_mode_refuses_delivery() {
        let filter = ChatFilter::new(&ChatFilterConfig {
            enabled: true,
            mode: FilterMode::Block,
            banned: vec!["badword".into()],
        });
        let outcome = filter.apply("a badword here");
        assert!(outcome.violated);
        assert!(outcome.blocked);
    }

    #[test]
    fn disabled_filter_passes_everything() {
        let filter = ChatFilter::disabled();
        let outcome = filter.apply("badword");
        assert!(!outcome.violated);
        assert_eq!(outcome.filtered, "badword");
    }

    #[test]
    fn multiple_matches_all_reported() {
        let filter = replace_filter(&["badword", "worse"]);
        let outcome = filter.apply("badword and worse");
        assert_eq!(outcome.matched, vec!["badword".to_string(), "worse".to_string()]);
        assert_eq!(outcome.filtered, "******* and *****");
    }

    #[test]
    fn antispam_allows_slow_chat() {
        let config = AntiSpamConfig::default();
        let mut tracker = AntiSpamTracker::default();
        let start = Instant::now();
        for i in 0..10 {
            let at = start + Duration::from_secs(i * 30);
            assert_eq!(tracker.note(&config, at), SpamVerdict::Ok);
        }
    }

    #[test]
    fn antispam_mutes_bursts_and_recovers() {
        let config = AntiSpamConfig {
            max_messages: 3,
            window_secs: 10,
            mute_secs: 30,
        };
        let mut tracker = AntiSpamTracker::default();
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(tracker.note(&config, start), SpamVerdict::Ok);
        }
        assert!(matches!(
            tracker.note(&config, start),
            SpamVerdict::Muted { .. }
        ));
        // Still muted shortly after.
        assert!(matches!(
            tracker.note(&config, start + Duration::from_secs(10)),
            SpamVerdict::Muted { .. }
        ));
        // Mute expires.
        assert_eq!(
            tracker.note(&config, start + Duration::from_secs(31)),
            SpamVerdict::Ok
        );
    }
}
