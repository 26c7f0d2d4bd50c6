pub mod api_key;
pub mod response;

pub use api_key::{api_key_middleware, ApiCredentials, API_KEY_HEADER, API_SECRET_HEADER};
pub use response::{ApiResponse, ApiResult};
