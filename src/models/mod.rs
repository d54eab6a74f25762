//! Core data models for the snapshot store.
//!
//! A `Snapshot` row maps to the `snapshots` table via `sqlx::FromRow` and
//! serializes as the JSON metadata body returned by the HTTP layer.

pub mod snapshot;
