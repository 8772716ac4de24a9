//! Shared building blocks: data model, listener registry, storage key layout, address helpers.

pub mod address;
pub mod events;
pub mod keys;
pub mod types;
