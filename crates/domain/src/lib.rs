//! Turnwright Domain - core types for the turn-resolution engine.
//!
//! Pure domain layer: no I/O, no async, no RNG (die rolls take an
//! injected roller). Everything the engine persists or transitions is
//! defined here.

pub mod entities;
pub mod error;
pub mod game_systems;
pub mod ids;
pub mod value_objects;

pub use entities::*;
pub use error::DomainError;
pub use ids::*;
pub use value_objects::*;
