//! Dice rolls and the `"2d6+1"` expression grammar.
//!
//! Weapon damage, NPC gold drops, and spell amounts are all authored as dice
//! strings in the content files; they parse into [`DiceExpr`] once at load
//! time and roll cheaply afterward.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Roll `count` dice with the given number of sides and sum them.
///
/// Zero `count` or zero `sides` contribute nothing.
pub fn roll(count: u32, sides: u32) -> i32 {
    if count == 0 || sides == 0 {
        return 0;
    }
    let mut rng = rand::rng();
    (0..count).map(|_| rng.random_range(1..=sides as i32)).sum()
}

/// Roll a single twenty-sided die.
pub fn d20() -> i32 {
    roll(1, 20)
}

/// Roll a single percentile die (1..=100).
pub fn d100() -> i32 {
    roll(1, 100)
}

/// True with probability `pct` percent.
pub fn percent_chance(pct: u32) -> bool {
    pct > 0 && d100() <= pct.min(100) as i32
}

/// True with probability `p` (clamped to `[0, 1]`).
pub fn chance(p: f32) -> bool {
    p > 0.0 && rand::rng().random::<f32>() < p
}

/// Failure to parse a dice expression from content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("empty dice expression")]
    Empty,
    #[error("malformed dice expression '{0}'")]
    Malformed(String),
}

/// A dice expression such as `2d6+1`, `d8`, `3d4-2`, or a flat `5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceExpr {
    count: u32,
    sides: u32,
    bonus: i32,
}

impl DiceExpr {
    pub fn new(count: u32, sides: u32, bonus: i32) -> Self {
        Self { count, sides, bonus }
    }

    /// A constant expression that always rolls `value`.
    pub fn flat(value: i32) -> Self {
        Self {
            count: 0,
            sides: 0,
            bonus: value,
        }
    }

    /// Roll the expression.
    pub fn roll(&self) -> i32 {
        roll(self.count, self.sides) + self.bonus
    }

    /// Smallest possible result.
    pub fn min(&self) -> i32 {
        self.count as i32 * i32::from(self.sides > 0) + self.bonus
    }

    /// Largest possible result.
    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32 + self.bonus
    }
}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 || self.sides == 0 {
            return write!(f, "{}", self.bonus);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.bonus {
            0 => Ok(()),
            b if b > 0 => write!(f, "+{b}"),
            b => write!(f, "{b}"),
        }
    }
}

impl FromStr for DiceExpr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Err(DiceError::Empty);
        }
        let lower = text.to_lowercase();
        let malformed = || DiceError::Malformed(s.to_string());

        let Some(d_pos) = lower.find('d') else {
            // No 'd': a flat constant like "5".
            let value = lower.parse::<i32>().map_err(|_| malformed())?;
            return Ok(DiceExpr::flat(value));
        };

        let count = if d_pos == 0 {
            1
        } else {
            lower[..d_pos].parse::<u32>().map_err(|_| malformed())?
        };

        let rest = &lower[d_pos + 1..];
        let (sides_str, bonus) = if let Some(pos) = rest.find(['+', '-']) {
            let sign = if rest.as_bytes()[pos] == b'+' { 1 } else { -1 };
            let bonus = rest[pos + 1..].parse::<i32>().map_err(|_| malformed())?;
            (&rest[..pos], sign * bonus)
        } else {
            (rest, 0)
        };
        let sides = sides_str.parse::<u32>().map_err(|_| malformed())?;
        if count == 0 || sides == 0 {
            return Err(malformed());
        }
        Ok(DiceExpr { count, sides, bonus })
    }
}

impl TryFrom<String> for DiceExpr {
    type Error = DiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DiceExpr> for String {
    fn from(value: DiceExpr) -> Self {
        value.to_string()
    }
}
