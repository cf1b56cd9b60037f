//! Relational metadata repositories.
//!
//! Each repository holds an injected pool handle; lookups by id, name or
//! key return `Ok(None)` when the row is absent so callers can tell
//! "missing" from "database failure".

pub mod bucket_repository;
pub mod object_repository;

/// Return true if the error is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
