//! Dispatch Engine (§4.5): turns a forecast, a device fleet, and a system
//! configuration into an hour-by-hour power schedule. Pure, synchronous,
//! single-threaded per request (§5) — no I/O, no shared state.

pub mod engine;

pub use engine::{run, DispatchResult, EngineError};
