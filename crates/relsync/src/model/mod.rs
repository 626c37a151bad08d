//! Model System - Entities handled by the sync engine
//!
//! - `primary_key`: Identifier type assigned by repositories
//! - `record`: Dynamic record with attribute dirty tracking

pub mod primary_key;
pub mod record;

pub use primary_key::EntityId;
pub use record::{Attributes, Record};
