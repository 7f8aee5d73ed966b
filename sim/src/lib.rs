//! Elyx member-journey simulator.
//!
//! Drives a two-agent chat (the Elyx care team and the member Rohan) through
//! simulated weeks while a guardrail engine enforces cadence rules, tracks
//! member KPIs and sentiment, and condenses the chat into Timeline JSON.
//!
//! - **[`core`]**: Pure, deterministic logic (guardrails, state, drift,
//!   summaries). No I/O; randomness is passed in.
//! - **[`io`]**: Side-effecting operations (files, HTTP, prompts, schemas).
//!
//! [`simulate`] coordinates core logic with I/O to implement `sim run`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod simulate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
