//! # reshard-core
//!
//! Core types, traits, and abstractions shared by the reshard crates.
//!
//! This crate provides the version model, error taxonomy, metadata models,
//! and low-level binary input primitives that the rest of the workspace
//! depends on.

pub mod dataio;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod version;

// Re-export commonly used types at crate root
pub use dataio::DataInput;
pub use error::{Error, Result};
pub use models::{
    GlobalMetadata, IndexMetadata, RawDocument, ShardFileInfo, ShardMetadata,
};
pub use version::{Flavor, Version};
