//! # IndexChat Core
//!
//! Shared vocabulary for every IndexChat crate: configuration, the error
//! taxonomy, chunk/search/conversation types, and the provider traits that the
//! retriever and the answer loop depend on.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::IndexChatConfig;
pub use error::{IndexChatError, Result};
pub use types::Modality;
