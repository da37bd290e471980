//! Dreamscape - the submission pipeline.
//!
//! Ties extraction, the dream history and the graph snapshot together:
//!
//! ```text
//! text ─► EntityExtractor ─► DreamStore::append ─► build(history) ─► GraphStore::save
//! ```
//!
//! Store updates go through a single async mutex, so concurrent submissions
//! on one instance never drop each other's entries.

use crate::config::DreamscapeConfig;
use crate::extract::{EntityExtractor, Strategy};
use crate::graph::{build, Graph};
use crate::persist::{DreamEntry, DreamStore, GraphStore, JsonDreamStore, JsonGraphStore, PersistError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from pipeline operations.
#[derive(Debug, Error)]
pub enum DreamscapeError {
    #[error("Dream text is required")]
    EmptyDream,

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// The outcome of a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    /// The entry as it was stored.
    pub entry: DreamEntry,

    /// The graph as it was stored.
    pub graph: Graph,

    /// Strategy that produced the entities.
    pub strategy: Option<Strategy>,
}

/// The dream ingestion pipeline.
pub struct Dreamscape {
    extractor: EntityExtractor,
    dreams: Box<dyn DreamStore>,
    graphs: Box<dyn GraphStore>,
    write_lock: Mutex<()>,
}

impl Dreamscape {
    /// Create a pipeline from its parts.
    pub fn new(
        extractor: EntityExtractor,
        dreams: Box<dyn DreamStore>,
        graphs: Box<dyn GraphStore>,
    ) -> Self {
        Self {
            extractor,
            dreams,
            graphs,
            write_lock: Mutex::new(()),
        }
    }

    /// Open a pipeline backed by the JSON files in `config.data_dir`.
    ///
    /// Both files are created with their empty documents if missing, and
    /// reset if they do not parse.
    pub async fn open(config: &DreamscapeConfig) -> Result<Self, DreamscapeError> {
        let dreams = JsonDreamStore::new(config.dreams_path());
        let graphs = JsonGraphStore::new(config.graph_path());

        dreams.ensure_initialized().await?;
        graphs.ensure_initialized().await?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            primary = config.extraction.api_key.is_some(),
            "dreamscape opened"
        );

        Ok(Self::new(
            EntityExtractor::from_config(&config.extraction),
            Box::new(dreams),
            Box::new(graphs),
        ))
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    /// Submit a dream.
    ///
    /// Blank text is rejected before any work happens. Extraction never
    /// fails; store failures fail the submission.
    pub async fn submit(&self, text: &str) -> Result<Submission, DreamscapeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DreamscapeError::EmptyDream);
        }

        let extraction = self.extractor.extract_tagged(text).await;
        tracing::debug!(
            strategy = extraction.used.map(|s| s.name()),
            count = extraction.entities.len(),
            "entities extracted"
        );

        let entry = DreamEntry::new(text, extraction.entities);

        let _guard = self.write_lock.lock().await;
        self.dreams.append(entry.clone()).await?;
        let graph = self.rebuild_locked().await?;

        tracing::info!(
            entities = entry.entities.len(),
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "dream recorded"
        );

        Ok(Submission {
            entry,
            graph,
            strategy: extraction.used,
        })
    }

    /// The stored graph.
    pub async fn graph(&self) -> Result<Graph, DreamscapeError> {
        Ok(self.graphs.load().await?)
    }

    /// All stored entries in submission order.
    pub async fn entries(&self) -> Result<Vec<DreamEntry>, DreamscapeError> {
        Ok(self.dreams.load().await?)
    }

    /// Recompute the graph from the stored history and store it.
    pub async fn rebuild(&self) -> Result<Graph, DreamscapeError> {
        let _guard = self.write_lock.lock().await;
        self.rebuild_locked().await
    }

    async fn rebuild_locked(&self) -> Result<Graph, DreamscapeError> {
        let history = self.dreams.load().await?;
        let graph = build(history.iter().map(|entry| &entry.entities));
        self.graphs.save(&graph).await?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDreamStore, MemoryGraphStore, MockCompletion};
    use std::sync::Arc;

    fn memory_pipeline(extractor: EntityExtractor) -> Dreamscape {
        Dreamscape::new(
            extractor,
            Box::new(MemoryDreamStore::new()),
            Box::new(MemoryGraphStore::new()),
        )
    }

    #[tokio::test]
    async fn test_blank_submission_rejected() {
        let mock = Arc::new(MockCompletion::always("Paris", 1));
        let pipeline = memory_pipeline(EntityExtractor::with_service(mock.clone()));

        assert!(matches!(
            pipeline.submit("   \n").await,
            Err(DreamscapeError::EmptyDream)
        ));
        assert_eq!(mock.calls(), 0);
        assert!(pipeline.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submission_is_trimmed_and_stored() {
        let pipeline = memory_pipeline(EntityExtractor::fallback_only());

        let submission = pipeline
            .submit("  I met Sarah Connor near the Eiffel Tower.  ")
            .await
            .unwrap();

        assert_eq!(submission.entry.text, "I met Sarah Connor near the Eiffel Tower.");
        assert_eq!(submission.entry.entities, vec!["Sarah Connor", "Eiffel Tower"]);
        assert_eq!(submission.strategy, Some(Strategy::Fallback));
        assert_eq!(submission.graph.link_weight("Sarah Connor", "Eiffel Tower"), Some(1));

        let stored = pipeline.graph().await.unwrap();
        assert!(stored.is_equivalent(&submission.graph));
    }

    #[tokio::test]
    async fn test_graph_accumulates_across_submissions() {
        let mock = Arc::new(MockCompletion::new(vec![
            Ok("A, B".into()),
            Ok("A, B".into()),
            Ok("A, C".into()),
        ]));
        let pipeline = memory_pipeline(EntityExtractor::with_service(mock));

        for text in ["one", "two", "three"] {
            pipeline.submit(text).await.unwrap();
        }

        let graph = pipeline.graph().await.unwrap();
        assert_eq!(graph.link_weight("A", "B"), Some(2));
        assert_eq!(graph.link_weight("A", "C"), Some(1));
        assert_eq!(graph.link_weight("B", "C"), None);
        assert_eq!(pipeline.entries().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_history_write_failure_is_surfaced() {
        let graphs = Arc::new(MemoryGraphStore::new());
        let pipeline = Dreamscape::new(
            EntityExtractor::fallback_only(),
            Box::new(MemoryDreamStore::failing()),
            Box::new(graphs.clone()),
        );

        let result = pipeline.submit("Walking with Lucy").await;
        assert!(matches!(result, Err(DreamscapeError::Persist(_))));
        assert_eq!(graphs.saves(), 0);
    }

    #[tokio::test]
    async fn test_graph_write_failure_is_surfaced() {
        let pipeline = Dreamscape::new(
            EntityExtractor::fallback_only(),
            Box::new(MemoryDreamStore::new()),
            Box::new(MemoryGraphStore::failing()),
        );

        let result = pipeline.submit("Walking with Lucy").await;
        assert!(matches!(result, Err(DreamscapeError::Persist(_))));
    }

    #[tokio::test]
    async fn test_rebuild_from_existing_history() {
        let history = vec![
            DreamEntry::new("a", vec!["X".into(), "Y".into()]),
            DreamEntry::new("b", vec!["Y".into(), "X".into()]),
        ];
        let pipeline = Dreamscape::new(
            EntityExtractor::fallback_only(),
            Box::new(MemoryDreamStore::with_entries(history)),
            Box::new(MemoryGraphStore::new()),
        );

        assert!(pipeline.graph().await.unwrap().is_empty());
        let graph = pipeline.rebuild().await.unwrap();
        assert_eq!(graph.link_weight("X", "Y"), Some(2));
        assert!(pipeline.graph().await.unwrap().is_equivalent(&graph));
    }

    #[test]
    fn test_submission_serialization() {
        let submission = Submission {
            entry: DreamEntry::new("Owls", vec!["Owls".into()]),
            graph: build([["Owls"]]),
            strategy: Some(Strategy::Primary),
        };
        let json = serde_json::to_value(&submission).unwrap();
        assert_eq!(json["strategy"], "primary");
        assert_eq!(json["entry"]["dream"], "Owls");
        assert_eq!(json["graph"]["nodes"][0]["id"], "Owls");

        let untagged = Submission {
            strategy: None,
            ..submission
        };
        assert!(serde_json::to_value(&untagged).unwrap()["strategy"].is_null());
    }
}
