//! Plain data types shared by the store and the engine.

pub mod candidate;
pub mod ids;
