//! Test doubles for the pipeline's external collaborators.
//!
//! - `MockCompletion` returns scripted completions without any network call
//! - `MemoryDreamStore` / `MemoryGraphStore` keep everything in memory and
//!   can be told to fail on write

use crate::extract::{CompletionService, ExtractionError};
use crate::graph::Graph;
use crate::persist::{DreamEntry, DreamStore, GraphStore, PersistError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

/// A completion service that replays scripted results in order.
///
/// `Err(message)` entries are returned as service failures. Once the script
/// runs out every call fails.
pub struct MockCompletion {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockCompletion {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A service that answers every prompt with the same text.
    pub fn always(text: impl Into<String>, times: usize) -> Self {
        let text = text.into();
        Self::new((0..times).map(|_| Ok(text.clone())).collect())
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue another scripted result.
    pub fn queue(&self, response: Result<String, String>) {
        lock(&self.responses).push_back(response);
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError> {
        lock(&self.prompts).push(prompt.to_string());
        let next = lock(&self.responses).pop_front();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ExtractionError::Other(message)),
            None => Err(ExtractionError::Other(
                "no more scripted completions".to_string(),
            )),
        }
    }
}

/// In-memory dream history.
#[derive(Default)]
pub struct MemoryDreamStore {
    entries: Mutex<Vec<DreamEntry>>,
    fail_writes: bool,
}

impl MemoryDreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing history.
    pub fn with_entries(entries: Vec<DreamEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_writes: false,
        }
    }

    /// Make every append fail.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<DreamEntry> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl DreamStore for MemoryDreamStore {
    async fn load(&self) -> Result<Vec<DreamEntry>, PersistError> {
        Ok(self.entries())
    }

    async fn append(&self, entry: DreamEntry) -> Result<(), PersistError> {
        if self.fail_writes {
            return Err(write_failure());
        }
        lock(&self.entries).push(entry);
        Ok(())
    }
}

/// In-memory graph snapshot.
#[derive(Default)]
pub struct MemoryGraphStore {
    graph: Mutex<Option<Graph>>,
    saves: Mutex<usize>,
    fail_writes: bool,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save fail.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// The last saved graph, if any.
    pub fn graph(&self) -> Option<Graph> {
        lock(&self.graph).clone()
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        *lock(&self.saves)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn load(&self) -> Result<Graph, PersistError> {
        Ok(self.graph().unwrap_or_default())
    }

    async fn save(&self, graph: &Graph) -> Result<(), PersistError> {
        if self.fail_writes {
            return Err(write_failure());
        }
        *lock(&self.graph) = Some(graph.clone());
        *lock(&self.saves) += 1;
        Ok(())
    }
}

fn write_failure() -> PersistError {
    PersistError::Io(io::Error::new(io::ErrorKind::Other, "simulated write failure"))
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
