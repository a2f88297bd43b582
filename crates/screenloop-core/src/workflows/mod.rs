//! # Workflows Module
//!
//! User-facing entry points. Each action checks the screen's state, runs the
//! engine operation and persists the resulting state, so a screen can be
//! driven one step at a time and resumed after an interruption.
//!
//! - **Actions** ([`actions`]) - One function per named action plus simulated evaluation
//! - **Automatic Mode** ([`auto`]) - Loops the actions and launches external jobs up to `stop-after`

pub mod actions;
pub mod auto;
