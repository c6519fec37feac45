//! REST API module.
//!
//! Handlers return `Result<Json<T>, AppError>`; failures become the shared error envelope.

mod teamdb;
mod token;

pub use teamdb::*;
pub use token::*;
