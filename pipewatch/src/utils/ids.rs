//! Identifier generation.

use uuid::Uuid;

/// Generates a time-ordered run identifier (UUID v7).
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::now_v7().to_string()
}

/// Generates a random identifier (UUID v4) for artifacts and records.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
