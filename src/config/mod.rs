mod server;

pub use server::{EmailConfig, ExecutionConfig, ServerConfig};
