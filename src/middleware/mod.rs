pub mod auth;
pub mod response;

pub use auth::{extract_bearer_token, identity_from_headers, identity_middleware};
pub use response::{ApiResponse, ApiResult};
