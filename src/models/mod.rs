pub mod intent;
pub mod query;
pub mod query_log;
pub mod schema;
