//! # IndexChat Knowledge
//!
//! Multi-modal retrieval over the chunk store written by the ingestion pipeline.
//!
//! ## Design
//! - **One embedding space per modality**: text, image and audio chunks live in
//!   the same `documents` table but are only ever compared within their own
//!   modality and dimension.
//! - **sqlite-vss when available**: each modality has an optional `vss_*`
//!   virtual table. If the extension is not loaded, the table is missing, the
//!   query errors or it comes back empty, search falls back to exact cosine
//!   over every stored vector of that modality.
//! - **Read-only, per call**: the store is opened read-only for one search and
//!   closed right after, so concurrent requests never coordinate.
//!
//! ## How it works
//! ```text
//! "What happened to revenue in Q3?"
//!   ↓ text / CLIP / CLAP query embeddings (concurrent, image+audio optional)
//! ModalityIndex(text)  ModalityIndex(image)  ModalityIndex(audio)
//!   ↓ vss_search … or exact cosine fallback
//! text hits ++ image hits ++ audio hits   (no cross-space re-ranking)
//! ```

pub mod codec;
pub mod index;
pub mod retriever;
pub mod similarity;
pub mod store;

pub use index::{ModalityIndex, SearchOutcome};
pub use retriever::FanOutRetriever;
pub use store::ChunkStore;
