//! SQLite persistence for trade records, PnL snapshots and confidence
//! scores, using Diesel.

pub mod connection;
pub mod model;
pub mod schema;
mod store;

pub use connection::{open, DbPool};
pub use store::SqliteStore;
