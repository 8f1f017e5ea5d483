pub mod auth;
pub mod notifications;
pub mod records;
pub mod server;
