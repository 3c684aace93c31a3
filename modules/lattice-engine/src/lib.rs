//! Pure candidate scoring for member recommendations.
//!
//! No I/O and no errors: `score` is a total function over the loaded
//! corpus. Everything it needs arrives as arguments, including the clock.

pub mod engine;

pub use engine::{score, ScoredCandidate, ScoringConfig, MIN_SCORE};
