pub mod broker_client;
pub mod persistence;
