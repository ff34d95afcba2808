//! Core library for the course marketplace access & approval engine.

pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;
