//! Kanban Rust Client
//!
//! A Rust client library for the Kanban task board API, with JWT session
//! management and transparent one-shot access token refresh.

pub mod api;
pub mod config;
pub mod error;
pub mod session_client;
pub mod token_store;
pub mod types;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session_client::{SessionClient, SessionEvent};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{AuthTokens, Board, NewTask, Note, RegisterRequest, Task, TaskOwner, TaskStatus, User};
