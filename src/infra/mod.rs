pub mod db_internal;
pub mod executor;
pub mod llm;
pub mod query_log;
pub mod utils;
