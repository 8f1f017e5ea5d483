pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod policy;
pub mod resources;
pub mod router;
pub mod server;
pub mod state;
pub mod types;
