//! Request and response models for the TeamDB API.
//!
//! The document itself stays an untyped `serde_json::Value`; see the schema module.

mod teamdb;
mod token;

pub use teamdb::*;
pub use token::*;
