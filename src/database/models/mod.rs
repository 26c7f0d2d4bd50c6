pub mod project;
pub mod schema;

pub use project::ProjectRow;
pub use schema::SchemaRow;
