pub mod auth;
pub mod debounce;
pub mod error;
pub mod models;
pub mod protocol_log;
pub mod router;
pub mod settings;
