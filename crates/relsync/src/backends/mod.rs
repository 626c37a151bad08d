//! Repository Backends
//!
//! The `Repository` trait is the storage boundary of the sync engine.
//! `InMemoryRepository` is a complete implementation backed by in-process
//! maps, used by the test suites and as a reference for real backends.

pub mod core;
pub mod memory;

pub use self::core::*;
pub use memory::InMemoryRepository;
