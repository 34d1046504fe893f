//! # Codepad
//!
//! A collaborative code editor server, usable both as a standalone binary and as a library.
//!
//! Documents live in SQLite and are pushed to open editors over a live feed.
//! Every change is re-checked against the document's owner and collaborator set,
//! so revoking a collaborator or deleting a document ends their sessions.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! codepad = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codepad::server::{AppState, create_router};
//! use codepad::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/codepad.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), "http://localhost:8080"));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `codepad` binary. Disable with `default-features = false`.

pub mod auth;
pub mod collab;
pub mod config;
pub mod error;
pub mod exec;
pub mod export;
pub mod notify;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;
