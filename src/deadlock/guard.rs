//! Allocation, release and cycle detection.

use crate::deadlock::graph::{
    AllocationSnapshot, GraphNode, ProcessNode, ProcessView, ResourceNode, ResourceView,
};
use crate::error::{CoordinationError, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The requester now holds the resource.
    Granted,
    /// The requester is queued behind the current holder.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The caller was not the holder; nothing changed.
    NotHeld,
    /// Released with nobody waiting.
    Freed,
    /// Released and granted to the oldest waiter.
    HandedOff(String),
}

/// DFS frame: a node, its outgoing edges and how many have been followed.
struct Frame {
    node: GraphNode,
    successors: Vec<GraphNode>,
    next: usize,
}

/// Deadlock detector over processes and resources.
///
/// Edges run from a waiting process to the resource it awaits, and from a
/// held resource to its holder. A request that closes a cycle is denied
/// and its wait retracted; grants already made are never revoked.
#[derive(Debug, Default)]
pub struct CycleGuard {
    processes: BTreeMap<String, ProcessNode>,
    resources: BTreeMap<String, ResourceNode>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_resource(&mut self, process_id: &str, resource_id: &str) -> Result<RequestOutcome> {
        let process = self
            .processes
            .entry(process_id.to_string())
            .or_insert_with(|| ProcessNode::new(process_id));
        let resource = self
            .resources
            .entry(resource_id.to_string())
            .or_insert_with(|| ResourceNode::new(resource_id));

        let holder = resource.holder.clone();
        match holder.as_deref() {
            None => {
                resource.holder = Some(process_id.to_string());
                process.holding.insert(resource_id.to_string());
                return Ok(RequestOutcome::Granted);
            }
            Some(holder) if holder == process_id => return Ok(RequestOutcome::Granted),
            Some(_) if process.waiting.contains(resource_id) => return Ok(RequestOutcome::Pending),
            Some(_) => {
                resource.wait_queue.push_back(process_id.to_string());
                process.waiting.insert(resource_id.to_string());
            }
        }

        // Any cycle created by the new edge passes through the requester.
        let mut visited = HashSet::new();
        if let Some(cycle) = self.cycle_from(GraphNode::Process(process_id.to_string()), &mut visited) {
            self.cancel_wait(process_id, resource_id);
            let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            warn!(
                process = process_id,
                resource = resource_id,
                cycle = %path.join(" -> "),
                "Refusing request that would deadlock"
            );
            return Err(CoordinationError::AdmissionRefused {
                process: process_id.to_string(),
                resource: resource_id.to_string(),
            });
        }

        debug!(process = process_id, resource = resource_id, "Request queued");
        Ok(RequestOutcome::Pending)
    }

    /// Release `resource_id` if `process_id` holds it, granting it straight
    /// to the next waiter in line.
    pub fn release_resource(&mut self, process_id: &str, resource_id: &str) -> ReleaseOutcome {
        let Some(resource) = self.resources.get_mut(resource_id) else {
            return ReleaseOutcome::NotHeld;
        };
        if resource.holder.as_deref() != Some(process_id) {
            debug!(process = process_id, resource = resource_id, holder = ?resource.holder, "Release by non-holder ignored");
            return ReleaseOutcome::NotHeld;
        }

        resource.holder = None;
        if let Some(process) = self.processes.get_mut(process_id) {
            process.holding.remove(resource_id);
        }

        let Some(next) = resource.wait_queue.pop_front() else {
            return ReleaseOutcome::Freed;
        };
        resource.holder = Some(next.clone());
        let waiter = self
            .processes
            .entry(next.clone())
            .or_insert_with(|| ProcessNode::new(next.as_str()));
        waiter.waiting.remove(resource_id);
        waiter.holding.insert(resource_id.to_string());
        ReleaseOutcome::HandedOff(next)
    }

    /// Withdraw a queued request. Returns `false` if there was none.
    pub fn cancel_wait(&mut self, process_id: &str, resource_id: &str) -> bool {
        let was_waiting = self
            .processes
            .get_mut(process_id)
            .map(|p| p.waiting.remove(resource_id))
            .unwrap_or(false);
        if let Some(resource) = self.resources.get_mut(resource_id) {
            resource.wait_queue.retain(|p| p != process_id);
        }
        was_waiting
    }

    /// Drop every hold and wait of `process_id`.
    pub fn release_all(&mut self, process_id: &str) -> Vec<ReleaseOutcome> {
        let Some(process) = self.processes.get(process_id) else {
            return Vec::new();
        };
        let holding: Vec<String> = process.holding.iter().cloned().collect();
        let waiting: Vec<String> = process.waiting.iter().cloned().collect();

        for resource_id in &waiting {
            self.cancel_wait(process_id, resource_id);
        }
        holding
            .iter()
            .map(|resource_id| self.release_resource(process_id, resource_id))
            .collect()
    }

    pub fn holder_of(&self, resource_id: &str) -> Option<&str> {
        self.resources.get(resource_id)?.holder.as_deref()
    }

    pub fn process(&self, process_id: &str) -> Option<&ProcessNode> {
        self.processes.get(process_id)
    }

    pub fn resource(&self, resource_id: &str) -> Option<&ResourceNode> {
        self.resources.get(resource_id)
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// First cycle found by a DFS over every node, as a node path.
    pub fn find_cycle(&self) -> Option<Vec<GraphNode>> {
        let mut visited = HashSet::new();
        let roots = self
            .processes
            .keys()
            .map(|id| GraphNode::Process(id.clone()))
            .chain(self.resources.keys().map(|id| GraphNode::Resource(id.clone())));
        for root in roots {
            if let Some(cycle) = self.cycle_from(root, &mut visited) {
                return Some(cycle);
            }
        }
        None
    }

    pub fn get_state(&self) -> AllocationSnapshot {
        AllocationSnapshot {
            processes: self.processes.values().map(ProcessView::from).collect(),
            resources: self.resources.values().map(ResourceView::from).collect(),
            deadlock_detected: self.has_cycle(),
        }
    }

    fn successors(&self, node: &GraphNode) -> Vec<GraphNode> {
        match node {
            GraphNode::Process(id) => self
                .processes
                .get(id)
                .map(|p| p.waiting.iter().cloned().map(GraphNode::Resource).collect())
                .unwrap_or_default(),
            GraphNode::Resource(id) => self
                .resources
                .get(id)
                .and_then(|r| r.holder.clone())
                .map(GraphNode::Process)
                .into_iter()
                .collect(),
        }
    }

    /// Iterative DFS from `root`. Nodes on the current path form the
    /// recursion stack; reaching one of them again is a back-edge.
    fn cycle_from(&self, root: GraphNode, visited: &mut HashSet<GraphNode>) -> Option<Vec<GraphNode>> {
        if !visited.insert(root.clone()) {
            return None;
        }
        let mut on_stack: HashSet<GraphNode> = HashSet::new();
        on_stack.insert(root.clone());
        let mut frames = vec![Frame {
            successors: self.successors(&root),
            node: root,
            next: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            if frame.next == frame.successors.len() {
                if let Some(done) = frames.pop() {
                    on_stack.remove(&done.node);
                }
                continue;
            }
            let next = frame.successors[frame.next].clone();
            frame.next += 1;

            if on_stack.contains(&next) {
                let start = frames.iter().position(|f| f.node == next).unwrap_or(0);
                return Some(frames[start..].iter().map(|f| f.node.clone()).collect());
            }
            if visited.insert(next.clone()) {
                on_stack.insert(next.clone());
                frames.push(Frame {
                    successors: self.successors(&next),
                    node: next,
                    next: 0,
                });
            }
        }
        None
    }
}
