// handlers/protected/mod.rs - Handlers behind the session middleware
//
// Every handler here receives the resolved `Identity` as a request extension
// and performs its data access through the record gateway.

pub mod admin; // Role permission management
pub mod auth; // Session introspection and logout
pub mod notifications; // Read-state shortcuts for notifications
pub mod records; // Generic collection CRUD
