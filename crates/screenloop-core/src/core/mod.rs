//! # Core Module
//!
//! Stateless building blocks of the screening loop.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Candidates, identifiers and scored result rows
//! - **File I/O** ([`io`]) - Work lists, delimited score tables, job templates and reference scores
//! - **Persistence** ([`store`]) - The `redb`-backed population, result, prediction and screen tables
//!
//! Nothing in this module knows about iterations or actions; sequencing lives in
//! [`crate::engine`] and [`crate::workflows`].

pub mod io;
pub mod models;
pub mod store;
