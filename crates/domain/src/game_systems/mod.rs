//! Game-system rules content (pure lookup functions).

pub mod dnd5e;
