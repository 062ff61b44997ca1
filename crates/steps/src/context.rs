//! Execution context handed to a step executor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON object type used for parameters, outputs and metadata.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// An edge of the workflow graph as seen by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Graph metadata the engine attaches to every context.
///
/// Flow-control steps use it to discover their outgoing paths; the suspension
/// protocol uses it to describe where an execution stopped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Node ids in execution order.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// All edges of the workflow.
    #[serde(default)]
    pub edges: Vec<EdgeRef>,
}

impl GraphMetadata {
    /// Outgoing edges of a step, in declaration order.
    pub fn outgoing<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a EdgeRef> + 'a {
        self.edges.iter().filter(move |e| e.source == step_id)
    }

    /// Path names leaving a step: the branch label, or the target id for unlabeled edges.
    pub fn output_paths(&self, step_id: &str) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for edge in self.outgoing(step_id) {
            let name = edge.branch.clone().unwrap_or_else(|| edge.target.clone());
            if !paths.contains(&name) {
                paths.push(name);
            }
        }
        paths
    }
}

/// Execution context passed to step executors.
///
/// Built fresh by the engine for every step invocation and never mutated by the
/// executor. Everything a step needs flows through here; executors hold no
/// shared global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Workflow definition id.
    pub workflow_id: String,

    /// Execution id (one run of the workflow).
    pub execution_id: String,

    /// Step (node) id within the workflow.
    pub step_id: String,

    /// Step kind the executor was resolved from.
    #[serde(default)]
    pub kind: String,

    /// Step sub-kind (e.g. `if` for a flow step).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// Resolved step parameters.
    #[serde(default)]
    pub parameters: JsonMap,

    /// Output of the upstream step(s).
    #[serde(default)]
    pub input_data: serde_json::Value,

    /// Outputs of every active parent step, keyed by parent id.
    #[serde(default)]
    pub upstream: JsonMap,

    /// Workflow-level static data.
    #[serde(default)]
    pub static_data: JsonMap,

    /// Credential references keyed by provider.
    #[serde(default)]
    pub credentials: HashMap<String, String>,

    /// Graph metadata from the engine.
    #[serde(default)]
    pub graph: GraphMetadata,
}

impl ExecutionContext {
    /// Create a new execution context.
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        step_id: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            step_id: step_id.into(),
            input_data: serde_json::Value::Null,
            ..Default::default()
        }
    }

    /// Set the step kind and optional sub-kind.
    pub fn with_kind(mut self, kind: impl Into<String>, subtype: Option<&str>) -> Self {
        self.kind = kind.into();
        self.subtype = subtype.map(|s| s.to_string());
        self
    }

    /// Set the step parameters from a JSON object. Non-objects are ignored.
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = parameters {
            self.parameters = map;
        }
        self
    }

    /// Set the input data.
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input_data = input;
        self
    }

    /// Set the upstream outputs.
    pub fn with_upstream(mut self, upstream: JsonMap) -> Self {
        self.upstream = upstream;
        self
    }

    /// Set workflow-level static data.
    pub fn with_static_data(mut self, static_data: JsonMap) -> Self {
        self.static_data = static_data;
        self
    }

    /// Set the credential references.
    pub fn with_credentials(mut self, credentials: HashMap<String, String>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the graph metadata.
    pub fn with_graph(mut self, graph: GraphMetadata) -> Self {
        self.graph = graph;
        self
    }

    /// Get a raw parameter.
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name).filter(|v| !v.is_null())
    }

    /// Get a string parameter. Empty strings count as missing.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Get an unsigned integer parameter. Numeric strings are accepted.
    pub fn param_u64(&self, name: &str) -> Option<u64> {
        match self.param(name)? {
            serde_json::Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a floating point parameter. Numeric strings are accepted.
    pub fn param_f64(&self, name: &str) -> Option<f64> {
        match self.param(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get a boolean parameter.
    pub fn param_bool(&self, name: &str) -> Option<bool> {
        match self.param(name)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get a string parameter or a default.
    pub fn param_str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.param_str(name).unwrap_or(default)
    }

    /// Credential reference for a provider.
    pub fn credential_ref(&self, provider: &str) -> Option<&str> {
        self.credentials.get(provider).map(|s| s.as_str())
    }

    /// The static-data user id, if the workflow carries one.
    pub fn user_id(&self) -> Option<&str> {
        self.static_data.get("user_id").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_new() {
        let ctx = ExecutionContext::new("wf-1", "exec-1", "step-1");
        assert_eq!(ctx.workflow_id, "wf-1");
        assert_eq!(ctx.execution_id, "exec-1");
        assert_eq!(ctx.step_id, "step-1");
        assert!(ctx.input_data.is_null());
    }

    #[test]
    fn test_context_parameters() {
        let ctx = ExecutionContext::new("wf", "ex", "s").with_parameters(json!({
            "name": "  approve  ",
            "count": 5,
            "count_str": "7",
            "ratio": 0.5,
            "flag": "yes",
            "empty": "",
            "nothing": null
        }));

        assert_eq!(ctx.param_str("name"), Some("approve"));
        assert_eq!(ctx.param_u64("count"), Some(5));
        assert_eq!(ctx.param_u64("count_str"), Some(7));
        assert_eq!(ctx.param_f64("ratio"), Some(0.5));
        assert_eq!(ctx.param_bool("flag"), Some(true));
        assert_eq!(ctx.param_str("empty"), None);
        assert!(ctx.param("nothing").is_none());
        assert_eq!(ctx.param_str_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_graph_output_paths() {
        let graph = GraphMetadata {
            nodes: vec!["a".into(), "b".into(), "c".into()],
            edges: vec![
                EdgeRef { source: "a".into(), target: "b".into(), branch: Some("true".into()) },
                EdgeRef { source: "a".into(), target: "c".into(), branch: None },
                EdgeRef { source: "b".into(), target: "c".into(), branch: None },
            ],
        };

        assert_eq!(graph.output_paths("a"), vec!["true".to_string(), "c".to_string()]);
        assert_eq!(graph.outgoing("c").count(), 0);
    }

    #[test]
    fn test_context_credentials() {
        let mut creds = HashMap::new();
        creds.insert("slack".to_string(), "cred-42".to_string());
        let mut static_data = JsonMap::new();
        static_data.insert("user_id".into(), json!("user-9"));

        let ctx = ExecutionContext::new("wf", "ex", "s")
            .with_credentials(creds)
            .with_static_data(static_data);

        assert_eq!(ctx.credential_ref("slack"), Some("cred-42"));
        assert_eq!(ctx.credential_ref("github"), None);
        assert_eq!(ctx.user_id(), Some("user-9"));
    }
}
