//! Co-occurrence graph.
//!
//! Nodes are entities; an undirected link joins two entities that appear in
//! the same dream entry, weighted by the number of entries they share.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
}

/// A weighted undirected link between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
    /// Number of entries in which both endpoints appear.
    pub value: u64,
}

/// A co-occurrence graph in nodes/links form.
///
/// Node and link order carries no meaning; use [`Graph::is_equivalent`] to
/// compare graphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Graph {
    /// The graph with no nodes and no links.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Set of node ids.
    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Weight of the link between `a` and `b`, in either orientation.
    pub fn link_weight(&self, a: &str, b: &str) -> Option<u64> {
        self.links
            .iter()
            .find(|l| {
                (l.source == a && l.target == b) || (l.source == b && l.target == a)
            })
            .map(|l| l.value)
    }

    /// Structural equality: same node set, same weight for every unordered pair.
    pub fn is_equivalent(&self, other: &Graph) -> bool {
        self.node_ids() == other.node_ids() && self.weights() == other.weights()
    }

    fn weights(&self) -> HashMap<(&str, &str), u64> {
        self.links
            .iter()
            .map(|l| (pair_key(&l.source, &l.target), l.value))
            .collect()
    }
}

fn pair_key<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Accumulates entries into a co-occurrence graph.
///
/// Adding an entry costs O(k²) in its entity count, so the builder can be
/// fed one entry at a time as well as a whole history.
#[derive(Debug, Clone, Default)]
pub struct CooccurrenceBuilder {
    nodes: Vec<String>,
    node_set: HashSet<String>,
    links: Vec<Link>,
    link_index: HashMap<(String, String), usize>,
}

impl CooccurrenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry's entities.
    ///
    /// Blank names are ignored and repeated names count once, so an entity
    /// never links to itself.
    pub fn add_entry<S: AsRef<str>>(&mut self, entities: &[S]) {
        let mut seen = HashSet::new();
        let cleaned: Vec<&str> = entities
            .iter()
            .map(|e| e.as_ref())
            .filter(|e| !e.trim().is_empty())
            .filter(|e| seen.insert(*e))
            .collect();

        for entity in &cleaned {
            if self.node_set.insert((*entity).to_string()) {
                self.nodes.push((*entity).to_string());
            }
        }

        for (i, a) in cleaned.iter().enumerate() {
            for b in &cleaned[i + 1..] {
                self.bump(a, b);
            }
        }
    }

    fn bump(&mut self, a: &str, b: &str) {
        let (lo, hi) = pair_key(a, b);
        let key = (lo.to_string(), hi.to_string());
        match self.link_index.get(&key) {
            Some(&idx) => self.links[idx].value += 1,
            None => {
                self.link_index.insert(key, self.links.len());
                self.links.push(Link {
                    source: a.to_string(),
                    target: b.to_string(),
                    value: 1,
                });
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Snapshot the graph built so far.
    pub fn graph(&self) -> Graph {
        self.clone().finish()
    }

    /// Consume the builder and return the graph.
    pub fn finish(self) -> Graph {
        Graph {
            nodes: self.nodes.into_iter().map(|id| Node { id }).collect(),
            links: self.links,
        }
    }
}

/// Build the co-occurrence graph for a whole history of entity lists.
pub fn build<I, E, S>(history: I) -> Graph
where
    I: IntoIterator<Item = E>,
    E: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut builder = CooccurrenceBuilder::new();
    for entry in history {
        builder.add_entry(entry.as_ref());
    }
    builder.finish()
}
