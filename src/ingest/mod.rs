//! Ingestion engine: storage writer, idle heartbeat, startup clock guard and
//! the session tying them to one sensor's poll loop.

pub mod guard;
pub mod heartbeat;
pub mod session;
pub mod writer;
