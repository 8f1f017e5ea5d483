pub mod auth;
pub mod response;

pub use auth::{resolve_session, session_middleware};
pub use response::{timeout_envelope, ApiResponse, ApiResult};
