//! Task routing: picking which idle worker receives a dequeued task.
//!
//! The kernel only asks a [`TaskRouter`] for a decision and checks that the
//! chosen worker is one of the candidates it offered. Smarter planners plug
//! in behind the same trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{Task, Worker};

/// Requirement key naming the capability a task needs.
pub const CAPABILITY_KEY: &str = "capability";

/// Requirement key listing several capabilities, all of which are needed.
pub const CAPABILITIES_KEY: &str = "capabilities";

/// Chooses a worker for a task.
#[async_trait]
pub trait TaskRouter: Send + Sync {
    /// Return the id of one of `candidates`, or `None` to leave the task queued.
    ///
    /// `candidates` are idle workers, sorted by id.
    async fn route(&self, task: &Task, candidates: &[Worker]) -> Option<String>;
}

/// Routes to the first idle worker advertising every required capability.
///
/// Requirements are read from `requirements.capability` (a string) and
/// `requirements.capabilities` (an array of strings). A task with neither
/// goes to the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityRouter;

impl CapabilityRouter {
    /// Capability names a task asks for.
    pub fn required_capabilities(task: &Task) -> Vec<&str> {
        let mut names = Vec::new();
        if let Some(name) = task.requirements.get(CAPABILITY_KEY).and_then(Value::as_str) {
            names.push(name);
        }
        if let Some(list) = task.requirements.get(CAPABILITIES_KEY).and_then(Value::as_array) {
            names.extend(list.iter().filter_map(Value::as_str));
        }
        names
    }
}

#[async_trait]
impl TaskRouter for CapabilityRouter {
    async fn route(&self, task: &Task, candidates: &[Worker]) -> Option<String> {
        let required = Self::required_capabilities(task);
        candidates
            .iter()
            .find(|worker| required.iter().all(|name| worker.has_capability(name)))
            .map(|worker| worker.id.clone())
    }
}
