//! Core types: errors, configuration, clocks.

pub mod clock;
pub mod config;
pub mod errors;
