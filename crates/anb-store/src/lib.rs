//! Persistence port for video records.
//!
//! The worker reads and writes a single video through [`VideoStore`]. Two
//! adapters ship here: [`MemoryVideoStore`] for tests and local runs, and
//! [`PgVideoStore`] for the `videos` table.

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryVideoStore;
pub use postgres::PgVideoStore;
pub use store::VideoStore;
