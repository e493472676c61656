//! # Quillr
//!
//! A small blogging backend: Google sign-in, signed session cookies, and
//! articles with view/like counters and a trending ranking. Usable both as a
//! standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quillr::auth::TokenCodec;
//! use quillr::oauth::{GoogleConfig, GoogleProvider};
//! use quillr::server::{AppState, create_router};
//! use quillr::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/quillr.db").unwrap();
//! store.initialize().unwrap();
//!
//! let provider = GoogleProvider::new(GoogleConfig {
//!     client_id: "...".into(),
//!     client_secret: "...".into(),
//!     base_url: "https://api.example.com".into(),
//! })
//! .unwrap();
//!
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     TokenCodec::new(b"a-long-random-signing-secret").unwrap(),
//!     Arc::new(provider),
//!     "https://app.example.com",
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `quillr` binary. Disable with `default-features = false`.

pub mod articles;
pub mod auth;
pub mod config;
pub mod error;
pub mod oauth;
pub mod server;
pub mod store;
pub mod types;
