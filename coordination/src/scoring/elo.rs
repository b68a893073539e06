//! Elo ratings for pairwise tournaments.

use serde::{Deserialize, Serialize};

/// Rating every entrant starts a tournament with.
pub const INITIAL_RATING: f64 = 1000.0;
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Probability that a player rated `a` beats a player rated `b`.
pub fn expected_score(a: f64, b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((b - a) / 400.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloUpdate {
    pub new_winner: f64,
    pub new_loser: f64,
}

/// Ratings after `winner` beats `loser`. The sum of ratings is preserved.
pub fn update_elo(winner: f64, loser: f64, k: f64) -> EloUpdate {
    let expected_win = expected_score(winner, loser);
    let expected_lose = expected_score(loser, winner);
    EloUpdate {
        new_winner: winner + k * (1.0 - expected_win),
        new_loser: loser + k * (0.0 - expected_lose),
    }
}

/// Every unordered pair `(i, j)` with `i < j`, row-major.
pub fn generate_pairs(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Which side of a pairing a judge preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn flipped(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Majority side of a pair's votes. Ties favour A. `None` without votes.
pub fn majority(votes: &[Side]) -> Option<Side> {
    if votes.is_empty() {
        return None;
    }
    let a = votes.iter().filter(|v| **v == Side::A).count();
    let b = votes.len() - a;
    Some(if a >= b { Side::A } else { Side::B })
}

/// Ratings for one tournament's entrants, indexed by entry order.
#[derive(Debug, Clone)]
pub struct Tournament {
    ratings: Vec<f64>,
    k_factor: f64,
    matches: usize,
}

impl Tournament {
    pub fn new(entrants: usize, initial: f64, k_factor: f64) -> Self {
        Self {
            ratings: vec![initial; entrants],
            k_factor,
            matches: 0,
        }
    }

    pub fn with_defaults(entrants: usize) -> Self {
        Self::new(entrants, INITIAL_RATING, DEFAULT_K_FACTOR)
    }

    /// Apply one decided match. Out-of-range or self matches are ignored.
    pub fn record(&mut self, winner: usize, loser: usize) {
        if winner == loser || winner >= self.ratings.len() || loser >= self.ratings.len() {
            return;
        }
        let update = update_elo(self.ratings[winner], self.ratings[loser], self.k_factor);
        self.ratings[winner] = update.new_winner;
        self.ratings[loser] = update.new_loser;
        self.matches += 1;
    }

    pub fn rating(&self, entrant: usize) -> Option<f64> {
        self.ratings.get(entrant).copied()
    }

    pub fn ratings(&self) -> &[f64] {
        &self.ratings
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    /// Entrant indices by rating, highest first; equal ratings keep entry order.
    pub fn standings(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.ratings.len()).collect();
        order.sort_by(|&x, &y| {
            self.ratings[y]
                .partial_cmp(&self.ratings[x])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.cmp(&y))
        });
        order
    }

    pub fn leader(&self) -> Option<usize> {
        self.standings().first().copied()
    }
}
