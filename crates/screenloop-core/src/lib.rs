//! # screenloop Core Library
//!
//! An orchestrator for active-learning compound screening. From a large
//! candidate population it repeatedly selects a batch for expensive
//! evaluation, merges the results, exports training data for a surrogate
//! model, calibrates a score cutoff and ranks the remaining population with
//! the surrogate to pick the next batch.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Stateless data models, file formats and the
//!   `redb`-backed table store.
//!
//! - **[`engine`]: The Logic Core.** Selection, sharding, result merging,
//!   calibration and prediction handling, all driven through a
//!   `ScreenContext` and guarded by the iteration state machine.
//!
//! - **[`workflows`]: The Public API.** Named actions that check preconditions
//!   and persist state transitions, plus an automatic mode that loops them.
//!
//! The evaluator, trainer and predictor are external programs; this crate only
//! writes their inputs, launches them and reads their outputs.

pub mod core;
pub mod engine;
pub mod workflows;
