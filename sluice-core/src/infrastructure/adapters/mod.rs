// sluice-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;
pub mod duckdb_store;
pub mod json;

pub use self::duckdb::{DuckDbExtractor, DuckDbLoader};
pub use duckdb_store::DuckDbStore;
pub use json::JsonLoader;
