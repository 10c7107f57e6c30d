pub mod database;
pub mod sqlite_rule_store;

pub use database::Database;
pub use sqlite_rule_store::SqliteRuleStore;
