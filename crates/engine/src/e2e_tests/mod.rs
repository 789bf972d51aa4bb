//! End-to-end turn-flow tests.
//!
//! These run the full use-case stack against the in-memory stores with
//! scripted narrator and dice ports, so they need no external services.
