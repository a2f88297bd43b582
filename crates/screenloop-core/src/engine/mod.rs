//! # Engine Module
//!
//! The stateful layer of the screening loop. Every operation works on a
//! [`context::ScreenContext`] holding the store, the resolved configuration
//! and the screen's persisted [`state::ScreenRecord`].
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Resolved screen settings and their validation
//! - **State Tracking** ([`state`]) - Iteration states and the action table
//! - **Batch Selection** ([`selection`], [`partition`]) - Choosing and sharding evaluation batches
//! - **Result Merging** ([`merge`]) - Evaluator outputs into best-per-candidate scores
//! - **Model Loop** ([`training`], [`calibrate`], [`predict`]) - Training export, cutoff calibration and surrogate scoring
//! - **Reporting** ([`report`], [`simulate`]) - Status, exports, recall analysis and simulated evaluation
//! - **External Jobs** ([`jobs`]) - Rendering and launching evaluator, trainer and predictor processes
//! - **Progress Monitoring** ([`progress`]) - Callbacks for front ends
//! - **Error Handling** ([`error`]) - Engine-specific error types

pub mod calibrate;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod layout;
pub mod merge;
pub mod partition;
pub mod predict;
pub mod progress;
pub mod report;
pub mod selection;
pub mod simulate;
pub mod state;
pub mod training;
pub(crate) mod utils;
