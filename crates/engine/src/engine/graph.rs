//! Workflow definition: nodes, edges and their ordering.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use weft_steps::{EdgeRef, GraphMetadata, JsonMap};

use crate::error::{AppError, AppResult};

/// One step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,

    /// Step kind, resolved through the registry.
    #[serde(alias = "type")]
    pub kind: String,

    /// Sub-kind, e.g. `if` for a flow step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub parameters: JsonMap,
}

/// A directed edge. `branch` labels the path a flow step can select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl EdgeDefinition {
    /// Path name a route selects this edge by.
    pub fn path_name(&self) -> &str {
        self.branch.as_deref().unwrap_or(&self.target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub nodes: Vec<NodeDefinition>,

    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,

    /// Workflow-level data visible to every step.
    #[serde(default)]
    pub static_data: JsonMap,

    /// Credential references keyed by provider.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl WorkflowDefinition {
    pub fn from_json(value: serde_json::Value) -> AppResult<Self> {
        let definition: Self = serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("Invalid workflow definition: {}", e)))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let definition: Self = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn to_json(&self) -> AppResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Reject duplicate node ids, edges to unknown nodes and cycles.
    pub fn validate(&self) -> AppResult<()> {
        if self.nodes.is_empty() {
            return Err(AppError::Validation(format!(
                "Workflow '{}' has no nodes",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(AppError::Validation("Node id must not be empty".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "Duplicate node id '{}'",
                    node.id
                )));
            }
        }

        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !seen.contains(end.as_str()) {
                    return Err(AppError::Validation(format!(
                        "Edge {} -> {} references unknown node '{}'",
                        edge.source, edge.target, end
                    )));
                }
            }
        }

        let order = self.topological_order();
        if order.len() != self.nodes.len() {
            let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
            let stuck: Vec<&str> = self
                .nodes
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| !ordered.contains(id))
                .collect();
            return Err(AppError::Validation(format!(
                "Workflow contains a cycle through: {}",
                stuck.join(", ")
            )));
        }

        Ok(())
    }

    /// Stable topological order: among ready nodes, declaration order wins.
    pub fn execution_order(&self) -> Vec<String> {
        self.topological_order()
    }

    fn topological_order(&self) -> Vec<String> {
        let position: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            if let (Some(&s), Some(&t)) = (
                position.get(edge.source.as_str()),
                position.get(edge.target.as_str()),
            ) {
                children[s].push(t);
                in_degree[t] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].id.clone());
            for &child in &children[next] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        order
    }

    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a EdgeDefinition> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Graph view handed to step executors.
    pub fn graph_metadata(&self) -> GraphMetadata {
        GraphMetadata {
            nodes: self.execution_order(),
            edges: self
                .edges
                .iter()
                .map(|e| EdgeRef {
                    source: e.source.clone(),
                    target: e.target.clone(),
                    branch: e.branch.clone(),
                })
                .collect(),
        }
    }
}
