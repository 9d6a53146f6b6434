pub mod store;

pub use store::{SqliteGraphStore, SqliteTx};
