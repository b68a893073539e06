//! Tournament scoring: Elo updates, pair schedules and standings.

pub mod elo;

pub use elo::{
    expected_score, generate_pairs, majority, update_elo, EloUpdate, Side, Tournament,
    DEFAULT_K_FACTOR, INITIAL_RATING,
};
