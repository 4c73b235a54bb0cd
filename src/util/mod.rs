//! Utilities shared across modules

pub mod constants;

pub use constants::*;
