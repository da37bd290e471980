//! Dream journal engine with entity extraction and a co-occurrence graph.
//!
//! This crate provides:
//! - Entity name normalization
//! - Entity extraction through a language model, with a deterministic fallback
//! - A weighted co-occurrence graph rebuilt from the full dream history
//! - JSON file persistence behind swappable store traits
//!
//! # Quick Start
//!
//! ```ignore
//! use dreamscape_core::{Dreamscape, DreamscapeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DreamscapeConfig::from_env();
//!     let dreamscape = Dreamscape::open(&config).await?;
//!
//!     let submission = dreamscape.submit("I met Sarah Connor near the Eiffel Tower.").await?;
//!     println!("{:?}", submission.entry.entities);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod extract;
pub mod graph;
pub mod normalize;
pub mod persist;
pub mod pipeline;
pub mod testing;

// Primary public API
pub use config::{DreamscapeConfig, ExtractionConfig};
pub use extract::{CompletionService, EntityExtractor, Extraction, ExtractionError, Strategy};
pub use graph::{build, CooccurrenceBuilder, Graph, Link, Node};
pub use normalize::{normalize, normalize_values};
pub use persist::{
    DreamEntry, DreamHistory, DreamStore, GraphStore, JsonDreamStore, JsonGraphStore, PersistError,
};
pub use pipeline::{Dreamscape, DreamscapeError, Submission};
pub use testing::{MemoryDreamStore, MemoryGraphStore, MockCompletion};
