use super::ids::CandidateId;
use serde::{Deserialize, Serialize};

/// Score stored for a candidate whose evaluation failed and no penalty value
/// was configured. It is strictly larger than any real score, so the record
/// is kept but filtered out of training exports and hit counts.
pub const EXCLUDED_SCORE: f64 = f64::MAX;

#[inline]
pub fn is_excluded(score: f64) -> bool {
    score >= EXCLUDED_SCORE
}

/// One member of the screening population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Canonical structure string (e.g. SMILES). Opaque to this crate.
    pub representation: String,
    /// External label from the source library.
    pub label: String,
}

/// A row of a screen's result table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub id: CandidateId,
    pub score: f64,
    pub iteration: u32,
}

impl ScoredCandidate {
    pub fn is_excluded(&self) -> bool {
        is_excluded(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_larger_than_any_finite_score() {
        assert!(is_excluded(EXCLUDED_SCORE));
        assert!(!is_excluded(1.0e300));
        assert!(!is_excluded(-12.5));
    }
}
