//! # IndexChat Gateway
//!
//! HTTP front end: `POST /api/chat` answers a question with citations,
//! `POST /api/search` exposes raw retrieval for inspecting the index.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
