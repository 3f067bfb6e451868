//! Core types shared across the engine

pub mod error;
pub mod types;

pub use self::error::*;
pub use self::types::*;
