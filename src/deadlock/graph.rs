//! Node records and the serializable snapshot of the allocation graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessNode {
    pub id: String,
    pub holding: BTreeSet<String>,
    pub waiting: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceNode {
    pub id: String,
    pub holder: Option<String>,
    pub wait_queue: VecDeque<String>,
}

impl ProcessNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl ResourceNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// A vertex of the bipartite graph; used to report cycle paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphNode {
    Process(String),
    Resource(String),
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(id) => write!(f, "process:{}", id),
            Self::Resource(id) => write!(f, "resource:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessView {
    pub id: String,
    pub holding: Vec<String>,
    pub waiting: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub id: String,
    pub holder: Option<String>,
    pub wait_queue: Vec<String>,
}

/// `deadlockDetector` in the stats schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSnapshot {
    pub processes: Vec<ProcessView>,
    pub resources: Vec<ResourceView>,
    pub deadlock_detected: bool,
}

impl From<&ProcessNode> for ProcessView {
    fn from(node: &ProcessNode) -> Self {
        Self {
            id: node.id.clone(),
            holding: node.holding.iter().cloned().collect(),
            waiting: node.waiting.iter().cloned().collect(),
        }
    }
}

impl From<&ResourceNode> for ResourceView {
    fn from(node: &ResourceNode) -> Self {
        Self {
            id: node.id.clone(),
            holder: node.holder.clone(),
            wait_queue: node.wait_queue.iter().cloned().collect(),
        }
    }
}
