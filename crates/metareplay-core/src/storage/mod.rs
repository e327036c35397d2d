pub mod models;
pub mod mutation;
pub mod queries;
pub mod sqlite;

pub use mutation::{Dialect, FieldUpdate, MutationOp};
pub use sqlite::Database;
