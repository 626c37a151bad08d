//! Relationships Module - Relation metadata and per-model declarations

pub mod metadata;
pub mod registry;

pub use metadata::*;
pub use registry::*;
