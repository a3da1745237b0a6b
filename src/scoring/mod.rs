pub mod cache;
pub mod indicators;
pub mod scorer;

pub use cache::ScoreCache;
pub use scorer::{score_from_candles, CoinScore, Scorer, MIN_CANDLES};
