pub mod candle_buffer;
pub mod ticker_cache;

pub use candle_buffer::{run_kline_stream, Candle, CandleBuffer, CandleKey};
pub use ticker_cache::TickerCache;
