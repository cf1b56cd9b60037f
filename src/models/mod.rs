//! Core data models for the object store.
//!
//! Buckets and objects map to database rows via `sqlx::FromRow`; the actor
//! is the identity handed over by the authentication layer.

pub mod actor;
pub mod bucket;
pub mod object;
