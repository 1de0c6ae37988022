use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValuationError;
use crate::ValuationResult;

/// A calendar quarter, the period key used for quarterly cash flows and rate averaging.
///
/// Orders chronologically. Serialises as `"2015Q1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quarter {
    year: i32,
    quarter: u8,
}

impl Quarter {
    pub fn new(year: i32, quarter: u8) -> ValuationResult<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(ValuationError::InvalidInput {
                field: "quarter".into(),
                reason: format!("must be between 1 and 4, got {quarter}"),
            });
        }
        Ok(Self { year, quarter })
    }

    /// The quarter containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    pub fn next(self) -> Self {
        if self.quarter == 4 {
            Self {
                year: self.year + 1,
                quarter: 1,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter + 1,
            }
        }
    }

    /// Consecutive quarters starting at `self`.
    pub fn iter_from(self) -> impl Iterator<Item = Quarter> {
        std::iter::successors(Some(self), |q| Some(q.next()))
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Quarter {
    type Err = ValuationError;

    /// Accepts `2015Q1`, `2015-Q1` and `2015q1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ValuationError::InvalidInput {
            field: "period".into(),
            reason: format!("'{s}' is not a quarter label like 2015Q1"),
        };
        let upper = s.trim().to_ascii_uppercase();
        let (year, quarter) = upper.split_once('Q').ok_or_else(malformed)?;
        let year: i32 = year
            .trim_end_matches('-')
            .parse()
            .map_err(|_| malformed())?;
        let quarter: u8 = quarter.parse().map_err(|_| malformed())?;
        Quarter::new(year, quarter)
    }
}

impl TryFrom<String> for Quarter {
    type Error = ValuationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quarter> for String {
    fn from(q: Quarter) -> Self {
        q.to_string()
    }
}
