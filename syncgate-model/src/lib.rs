//! Application data model for syncgate.
//!
//! Defines the per-application schema every gateway decision depends on:
//! - [`ApplicationSchema`]: model name to definition, loaded once per application
//! - [`ModelDefinition`]: the storage namespace and parent relations of one model
//! - [`BelongsTo`]: a parent relation (`comment` belongs to `event`, ...)
//!
//! These types are deserialized from whatever the schema source returns and
//! are treated as immutable once loaded.

mod schema;

pub use schema::{ApplicationSchema, BelongsTo, ModelDefinition};
