//! Expected-vs-written document count verification

use std::fmt;

/// Outcome of comparing the counted documents against the written ones.
///
/// A mismatch is informational: the index may be written to while it is exported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Match,
    /// `expected - actual`; positive means fewer documents were written than counted
    Mismatch(i64),
}

impl Verification {
    pub fn is_match(self) -> bool {
        matches!(self, Self::Match)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => f.write_str("match"),
            Self::Mismatch(delta) if *delta > 0 => write!(f, "{delta} documents missing"),
            Self::Mismatch(delta) => write!(f, "{} extra documents", delta.unsigned_abs()),
        }
    }
}

/// Compare expected and actual document counts.
pub fn verify(expected: u64, actual: u64) -> Verification {
    if expected == actual {
        Verification::Match
    } else {
        let delta = i128::from(expected) - i128::from(actual);
        Verification::Mismatch(delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}
