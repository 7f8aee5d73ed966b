//! Deterministic simulation logic: no I/O, no clocks, randomness passed in.

pub mod cadence;
pub mod drift;
pub mod persona;
pub mod plan;
pub mod schedule;
pub mod seed;
pub mod sentiment;
pub mod state;
pub mod summary;
pub mod text;
pub mod types;
pub mod validator;
