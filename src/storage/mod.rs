//! Storage module for the trip database.

pub mod database;
pub mod schema;

pub use database::{Database, DatabaseError};
