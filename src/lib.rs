//! SuryaDrishti — solar-microgrid dispatch optimization engine.
//!
//! Split into a library and a thin `main.rs` binary so `tests/` can drive
//! the dispatch pipeline directly against the in-memory repository, the way
//! `jdhoffa-vpp-sim` splits its simulation engine from its CLI entry point.

pub mod alerts;
pub mod api;
pub mod config;
pub mod controller;
pub mod device_policy;
pub mod dispatch;
pub mod domain;
pub mod forecast_adapter;
pub mod forecast_validator;
pub mod metrics;
pub mod repo;
pub mod solar;
pub mod telemetry;
