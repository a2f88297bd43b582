use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Dense, 1-based identifier assigned to a candidate at import time.
///
/// Identifiers are never reused or renumbered, so a range of identifiers is a
/// stable, content-independent slice of the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub u64);

impl CandidateId {
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateIdError {
    #[error("'{0}' is not a valid candidate identifier")]
    NotAnInteger(String),
    #[error("candidate identifiers start at 1")]
    Zero,
}

impl FromStr for CandidateId {
    type Err = CandidateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: u64 = trimmed
            .parse()
            .map_err(|_| CandidateIdError::NotAnInteger(trimmed.to_string()))?;
        if value == 0 {
            return Err(CandidateIdError::Zero);
        }
        Ok(Self(value))
    }
}
