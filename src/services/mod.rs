pub mod gateway;
pub mod project_service;

pub use gateway::{DataGateway, DataOutcome, DataRequest};
pub use project_service::{GeneratedKey, ProjectService, ProjectWithSecret};
