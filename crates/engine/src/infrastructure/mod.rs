//! Infrastructure: ports and their concrete adapters.

pub mod clock;
pub mod memory;
pub mod ollama;
pub mod ports;
