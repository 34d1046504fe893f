pub mod access;
mod models;

pub use access::{Access, Role, evaluate};
pub use models::*;
