//! SQLite storage layer.
//!
//! `SqliteStore` implements every repository trait over split read/write
//! connection pools in WAL mode. Each file holds one repository impl.

pub mod agent;
pub mod approval;
pub mod kpi;
pub mod memory;
pub mod pool;
pub mod run;
pub mod store;
pub mod user;

pub use pool::DatabasePool;
pub use store::SqliteStore;
