//! File formats exchanged with external evaluators and predictors.
//!
//! Everything here is stateless: batch work lists, delimited score tables,
//! job descriptor templates and reference score files.

pub mod reference;
pub mod table;
pub mod template;
