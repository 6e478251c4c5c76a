//! Dice formula parsing: `[N]dS[+M|-M]`

use std::fmt;
use std::str::FromStr;

use nom::{
    character::complete::{digit1, one_of},
    combinator::{all_consuming, map_res, opt},
    sequence::{pair, preceded},
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest dice count accepted in one formula
pub const MAX_DICE: u32 = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiceError {
    #[error("malformed dice formula '{0}'")]
    Malformed(String),
}

/// A parsed dice formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceFormula {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// Parse a formula such as `d20`, `2d6+3` or `1d8 - 1`
    ///
    /// Whitespace anywhere is ignored; the count defaults to 1.
    pub fn parse(input: &str) -> Result<Self, DiceError> {
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        let malformed = || DiceError::Malformed(input.to_string());

        let (_, (count, sides, modifier)) =
            dice_formula(&compact).map_err(|_| malformed())?;

        let count = count.unwrap_or(1);
        if count == 0 || count > MAX_DICE || sides == 0 {
            return Err(malformed());
        }

        Ok(Self {
            count,
            sides,
            modifier: modifier.unwrap_or(0),
        })
    }

    /// Smallest achievable total
    pub fn min_total(&self) -> i64 {
        self.count as i64 + self.modifier as i64
    }

    /// Largest achievable total
    pub fn max_total(&self) -> i64 {
        self.count as i64 * self.sides as i64 + self.modifier as i64
    }

    /// Expected total of a single evaluation
    pub fn mean(&self) -> f64 {
        self.count as f64 * (self.sides as f64 + 1.0) / 2.0 + self.modifier as f64
    }
}

impl FromStr for DiceFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{}", m),
            m => write!(f, "{}", m),
        }
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |digits: &str| digits.parse::<u32>()).parse(input)
}

fn signed_modifier(input: &str) -> IResult<&str, i32> {
    map_res(pair(one_of("+-"), digit1), |(sign, digits): (char, &str)| {
        digits
            .parse::<i32>()
            .map(|value| if sign == '-' { -value } else { value })
    })
    .parse(input)
}

fn dice_formula(input: &str) -> IResult<&str, (Option<u32>, u32, Option<i32>)> {
    all_consuming((
        opt(number),
        preceded(one_of("dD"), number),
        opt(signed_modifier),
    ))
    .parse(input)
}
