// handlers/admin/mod.rs - project, collection and schema management
//
// Unauthenticated like the rest of the admin plane; deploy it behind a
// trusted network boundary.
pub mod collections;
pub mod projects;
pub mod schema;

pub use collections::{collection_create, collection_delete, collection_list};
pub use projects::{project_create, project_delete, project_get, project_list, project_update};
pub use schema::{schema_get, schema_put};
