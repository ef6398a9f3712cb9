//! Client-side entity synchronization for a traffic and parking ticket app.
//!
//! Per-domain stores with pure reducers, a lifecycle tracker for every
//! asynchronous operation, pagination and filtering, and a coordinator that
//! keeps related entities consistent without refetching.

mod actor;
pub use actor::{SyncEngine, SyncEngineBuilder, SyncHandle};
pub mod api;
pub mod collection;
mod commands;
pub use commands::FetchOutcome;
mod config;
pub mod coordinator;
pub mod domain;
mod error;
pub mod filter;
mod http;
pub mod lifecycle;
pub mod pagination;
pub mod store;
mod token;

pub use config::{HttpConfig, SyncConfig};
pub use error::{ApiError, CommandError, EngineError, ValidationError};
pub use http::HttpTransport;
pub use store::{SyncEvent, SyncState};
pub use token::{FileTokenStore, MemoryTokenStore, TOKEN_KEY, TokenStore};
