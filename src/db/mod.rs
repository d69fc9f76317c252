//! Business-action collaborators behind the VER and DBSIZE commands.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial module structure

pub mod connection;
pub mod store;

pub use store::{SqliteStore, StoreBackend, StoreError};
