// handlers/public/mod.rs - endpoints that need no credentials
pub mod generate_key;
pub mod health;

pub use generate_key::generate_key;
pub use health::{health, root};
