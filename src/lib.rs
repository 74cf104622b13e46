//! p2prate Library
//!
//! Robust USDT/VES rate sampling from the Binance P2P marketplace

pub mod config;
pub mod error;
pub mod p2p;
pub mod pipeline;
pub mod report;
pub mod telemetry;
pub mod types;
