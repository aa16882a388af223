pub mod artifacts;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod payload;
pub mod regressor;
pub mod round_index;
pub mod service;
pub mod simulation;
pub mod split;
pub mod store;
pub mod strength;
pub mod strength_map;
pub mod trainer;

pub use error::{EngineError, Result};
