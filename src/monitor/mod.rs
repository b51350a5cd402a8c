//! Reading filters: per-channel hysteresis and the multi-channel poll pipeline.

pub mod hysteresis;
pub mod pipeline;
