//! Task registry and dependency planning.
//!
//! Tasks form a directed acyclic graph: each node names the tasks that must
//! settle before it runs. [`TaskRegistry::plan`] flattens the prerequisite
//! closure of a target into *stages*. Every task in a stage only depends on
//! tasks from earlier stages, so a stage may run concurrently.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

pub const SASS: &str = "sass";
pub const HTML: &str = "html";
pub const WATCH: &str = "watch";
pub const SERVE: &str = "serve";
pub const DEFAULT: &str = "default";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed task name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskName(pub String);

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl TaskName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One registered task and its ordered prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub name: TaskName,
    pub prerequisites: Vec<TaskName>,
}

/// Ordered prerequisite stages for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub target: TaskName,
    pub stages: Vec<Vec<TaskName>>,
}

impl Plan {
    /// Stage index of a task, if the task is part of this plan.
    pub fn stage_of(&self, name: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.iter().any(|task| task.as_str() == name))
    }

    /// Every task in execution order (stage by stage).
    pub fn tasks(&self) -> impl Iterator<Item = &TaskName> {
        self.stages.iter().flatten()
    }
}

/// Name → task mapping, populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskName, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock task set: `sass`, `html`, `watch`, `serve`, `default`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let stock: [(&str, &[&str]); 5] = [
            (SASS, &[]),
            (HTML, &[]),
            (WATCH, &[]),
            (SERVE, &[SASS, HTML, WATCH]),
            (DEFAULT, &[SASS, WATCH]),
        ];
        for (name, prerequisites) in stock {
            registry
                .register(name, prerequisites.iter().copied())
                .expect("builtin task names are distinct");
        }
        registry
    }

    /// Register a task. Prerequisites may be registered later, but must
    /// exist by the time a plan that reaches them is built.
    pub fn register<N, I, P>(&mut self, name: N, prerequisites: I) -> Result<(), GraphError>
    where
        N: Into<TaskName>,
        I: IntoIterator<Item = P>,
        P: Into<TaskName>,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(GraphError::Duplicate(name));
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(TaskNode {
            name,
            prerequisites: prerequisites.into_iter().map(Into::into).collect(),
        });
        Ok(())
    }

    pub fn get(&self, name: &TaskName) -> Option<&TaskNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &TaskName) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &TaskName> {
        self.nodes.iter().map(|node| &node.name)
    }

    /// Build the staged execution plan for `target`.
    ///
    /// A task's stage is the length of its longest prerequisite chain. Within
    /// a stage tasks keep registration order. Fails on unknown names and on
    /// cycles (the error carries the cycle path).
    pub fn plan(&self, target: &TaskName) -> Result<Plan, GraphError> {
        let mut depth = HashMap::<TaskName, usize>::new();
        let mut stack = Vec::<TaskName>::new();
        let top = self.visit(target, None, &mut depth, &mut stack)?;

        let mut stages: Vec<Vec<TaskName>> = vec![Vec::new(); top + 1];
        for node in &self.nodes {
            if let Some(&d) = depth.get(&node.name) {
                stages[d].push(node.name.clone());
            }
        }

        Ok(Plan {
            target: target.clone(),
            stages,
        })
    }

    fn visit(
        &self,
        name: &TaskName,
        required_by: Option<&TaskName>,
        depth: &mut HashMap<TaskName, usize>,
        stack: &mut Vec<TaskName>,
    ) -> Result<usize, GraphError> {
        if let Some(&d) = depth.get(name) {
            return Ok(d);
        }
        if let Some(pos) = stack.iter().position(|seen| seen == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.clone());
            return Err(GraphError::Cycle(cycle));
        }

        let node = self.get(name).ok_or_else(|| match required_by {
            Some(parent) => GraphError::MissingPrerequisite {
                name: name.clone(),
                required_by: parent.clone(),
            },
            None => GraphError::UnknownTask(name.clone()),
        })?;

        stack.push(name.clone());
        let mut d = 0;
        for prerequisite in &node.prerequisites {
            d = d.max(self.visit(prerequisite, Some(name), depth, stack)? + 1);
        }
        stack.pop();

        depth.insert(name.clone(), d);
        Ok(d)
    }
}
