//! Rating Calculator
//!
//! ELO-style skill rating. The caller supplies the player's own rating and
//! the opposing side's aggregate; the calculator is stateless apart from
//! its global parameters.
//!
//! ```text
//! expected = 1 / (1 + 10^((opponent - rating) / (base / 2)))
//! new      = max(minimum, round(old + K * (actual - expected)))
//! ```

use serde::{Serialize, Deserialize};

use crate::config::GlobalSettings;

/// Games below which a player counts as provisional.
pub const PROVISIONAL_GAMES: u32 = 10;

/// Games above which a high-rated player counts as veteran.
pub const VETERAN_GAMES: u32 = 80;

/// Largest K-factor as a fraction of the base rating.
const K_MAX: f64 = 0.03;

/// Smallest K-factor as a fraction of the base rating.
const K_MIN: f64 = 0.01;

/// K-factor policy. Both curves are non-increasing in games played and in
/// rating, and bounded by `[0.01, 0.03] * base`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KFactorCurve {
    /// Piecewise table over rating brackets.
    #[default]
    Bracket,
    /// Inverse in games played and rating, clamped.
    Continuous,
}

/// Match outcome from one player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Member of the winner set.
    Win,
    /// Empty winner set.
    Draw,
    /// Not a member of a non-empty winner set.
    Loss,
}

impl Outcome {
    /// Actual score fed to the rating formula.
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        }
    }
}

/// Rating parameters read from global config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingCalculator {
    base: f64,
    minimum: u32,
    curve: KFactorCurve,
}

impl RatingCalculator {
    /// Create a calculator.
    pub fn new(base: u32, minimum: u32, curve: KFactorCurve) -> Self {
        Self {
            base: f64::from(base),
            minimum,
            curve,
        }
    }

    /// Parameters from the `global` config section.
    pub fn from_global(global: &GlobalSettings) -> Self {
        Self::new(global.starting_mmr, global.minimum_mmr, global.k_factor_curve)
    }

    /// Base (starting) rating.
    pub fn base(&self) -> u32 {
        self.base as u32
    }

    /// Rating floor.
    pub fn minimum(&self) -> u32 {
        self.minimum
    }

    /// Active K-factor policy.
    pub fn curve(&self) -> KFactorCurve {
        self.curve
    }

    /// Volatility constant for a player.
    pub fn k_factor(&self, rating: u32, games_played: u32) -> f64 {
        let b = self.base;
        let r = f64::from(rating);
        match self.curve {
            KFactorCurve::Bracket => {
                if games_played < PROVISIONAL_GAMES {
                    K_MAX * b
                } else if games_played > VETERAN_GAMES && r > 1.75 * b {
                    K_MIN * b
                } else if r > 2.5 * b {
                    K_MIN * b
                } else if r > 2.0 * b {
                    0.016 * b
                } else if r > 1.5 * b {
                    0.0225 * b
                } else {
                    K_MAX * b
                }
            }
            KFactorCurve::Continuous => {
                let tenure = (f64::from(PROVISIONAL_GAMES) / f64::from(games_played + 1)).min(1.0);
                let standing = b / r.max(1.0);
                (K_MAX * b * tenure * standing).clamp(K_MIN * b, K_MAX * b)
            }
        }
    }

    /// Probability-like expected score against `opponent`.
    pub fn expected_score(&self, rating: f64, opponent: f64) -> f64 {
        let scale = if self.base > 0.0 { self.base / 2.0 } else { 1.0 };
        1.0 / (1.0 + 10f64.powf((opponent - rating) / scale))
    }

    /// Apply one result, floored at the minimum rating.
    pub fn new_rating(&self, old: u32, actual: f64, expected: f64, k: f64) -> u32 {
        let next = (f64::from(old) + k * (actual - expected)).round();
        if next <= f64::from(self.minimum) {
            self.minimum
        } else {
            next.min(f64::from(u32::MAX)) as u32
        }
    }

    /// Full update for one player.
    pub fn rate(&self, rating: u32, games_played: u32, opponent: f64, outcome: Outcome) -> u32 {
        let expected = self.expected_score(f64::from(rating), opponent);
        let k = self.k_factor(rating, games_played);
        self.new_rating(rating, outcome.score(), expected, k)
    }
}

impl Default for RatingCalculator {
    fn default() -> Self {
        Self::from_global(&GlobalSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn calc(curve: KFactorCurve) -> RatingCalculator {
        RatingCalculator::new(1500, 100, curve)
    }

    #[test]
    fn test_expected_score_symmetry() {
        let c = calc(KFactorCurve::Bracket);
        assert!((c.expected_score(1500.0, 1500.0) - 0.5).abs() < 1e-9);
        let a = c.expected_score(1600.0, 1400.0);
        let b = c.expected_score(1400.0, 1600.0);
        assert!((a + b - 1.0).abs() < 1e-9);
        assert!(a > 0.5);
    }

    #[test]
    fn test_even_match() {
        let c = calc(KFactorCurve::Bracket);
        // Provisional: K = 45, expected 0.5
        assert_eq!(c.rate(1500, 0, 1500.0, Outcome::Win), 1523);
        assert_eq!(c.rate(1500, 0, 1500.0, Outcome::Loss), 1478);
        assert_eq!(c.rate(1500, 0, 1500.0, Outcome::Draw), 1500);
    }

    #[test]
    fn test_floor() {
        let c = calc(KFactorCurve::Bracket);
        assert_eq!(c.new_rating(110, 0.0, 1.0, 45.0), 100);
        assert_eq!(c.new_rating(0, 0.0, 1.0, 45.0), 100);
    }

    #[test]
    fn test_bracket_table() {
        let c = calc(KFactorCurve::Bracket);
        assert_eq!(c.k_factor(1500, 5), 45.0);
        assert_eq!(c.k_factor(1500, 50), 45.0);
        assert_eq!(c.k_factor(2400, 50), 0.0225 * 1500.0);
        assert_eq!(c.k_factor(3100, 50), 0.016 * 1500.0);
        assert_eq!(c.k_factor(4000, 50), 15.0);
        assert_eq!(c.k_factor(2700, 100), 15.0);
    }

    #[test]
    fn test_continuous_bounds() {
        let c = calc(KFactorCurve::Continuous);
        assert_eq!(c.k_factor(500, 0), 45.0);
        assert_eq!(c.k_factor(1500, 5), 45.0);
        assert_eq!(c.k_factor(1500, 1000), 15.0);
        let mid = c.k_factor(1500, 14);
        assert!(mid > 15.0 && mid < 45.0);
    }

    proptest! {
        #[test]
        fn prop_rating_never_below_floor(
            old in 0u32..10_000,
            actual in prop::sample::select(vec![0.0, 0.5, 1.0]),
            expected in 0.0f64..=1.0,
            k in 0.0f64..500.0,
        ) {
            let c = calc(KFactorCurve::Bracket);
            prop_assert!(c.new_rating(old, actual, expected, k) >= 100);
        }

        #[test]
        fn prop_k_factor_monotonic(
            rating in 0u32..6000,
            games in 0u32..200,
            continuous in any::<bool>(),
        ) {
            let curve = if continuous { KFactorCurve::Continuous } else { KFactorCurve::Bracket };
            let c = calc(curve);
            let k = c.k_factor(rating, games);
            prop_assert!(c.k_factor(rating, games + 1) <= k);
            prop_assert!(c.k_factor(rating + 100, games) <= k);
            prop_assert!((15.0..=45.0).contains(&k));
        }
    }
}
