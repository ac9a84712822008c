pub mod freshness;
pub mod memory;
pub mod sqlite;

pub use freshness::{Freshness, FreshnessPolicy};
pub use memory::MemoryStatementStore;
pub use sqlite::SqliteStatementStore;
