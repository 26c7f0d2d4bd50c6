// handlers/mod.rs - request handlers grouped by plane
//
// Public (no auth) → Admin (project and schema management) → Data (X-API-Key)
pub mod admin;
pub mod data;
pub mod public;
