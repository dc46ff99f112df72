//! B5Bot Library
//!
//! Real-time B5 Factor analytics and paper-execution engine for
//! NSE/BSE/MCX instruments.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod firstclose;
pub mod levels;
pub mod market_time;
pub mod paper;
pub mod persistence;
pub mod risk;
pub mod snapshot;
pub mod types;
