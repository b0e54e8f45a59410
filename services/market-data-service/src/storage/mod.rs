//! Storage backends for ticks and candles

pub mod timescale;

pub use timescale::TimescaleStore;
