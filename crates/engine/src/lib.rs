//! Turnwright Engine library.
//!
//! Server-side turn resolution for multiplayer tabletop sessions.
//!
//! ## Structure
//!
//! - `use_cases/` - turn lifecycle, roll handling, resolution pipeline
//! - `infrastructure/` - ports and adapters (in-memory stores, Ollama,
//!   clock/random)
//! - `api/` - HTTP entry points
//! - `app` - application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// Test fixtures for integration testing.
#[cfg(test)]
pub mod test_fixtures;

/// End-to-end turn-flow tests against the in-memory stores.
#[cfg(test)]
mod e2e_tests;

pub use app::App;
