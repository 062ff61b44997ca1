use serde_json::{json, Value};

use crate::context::{ExecutionContext, JsonMap};
use crate::error::StepError;
use crate::expression::{lookup_path, value_to_key};
use crate::result::{ExecutionResult, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Duplicate,
    FieldBased,
    ArraySplit,
}

impl Strategy {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "duplicate" => Some(Strategy::Duplicate),
            "field_based" => Some(Strategy::FieldBased),
            "array_split" => Some(Strategy::ArraySplit),
            _ => None,
        }
    }
}

pub(super) fn validate(ctx: &ExecutionContext) -> Result<(), StepError> {
    let name = ctx.param_str_or("strategy", "duplicate");
    let strategy = Strategy::parse(name)
        .ok_or_else(|| StepError::Validation(format!("unknown split strategy '{}'", name)))?;

    if let Some(paths) = ctx.param("paths") {
        match paths {
            Value::Array(items) if items.iter().all(Value::is_string) => {
                let mut seen = std::collections::HashSet::new();
                if let Some(dup) = items.iter().filter_map(Value::as_str).find(|p| !seen.insert(*p)) {
                    return Err(StepError::Validation(format!(
                        "duplicate split path '{}'",
                        dup
                    )));
                }
            }
            _ => {
                return Err(StepError::Validation(
                    "'paths' must be a list of path names".into(),
                ))
            }
        }
    }

    if strategy == Strategy::FieldBased && ctx.param_str("field").is_none() {
        return Err(StepError::Validation(
            "field_based split requires 'field'".into(),
        ));
    }
    Ok(())
}

/// Output paths: the `paths` parameter, or the step's outgoing edges.
fn output_paths(ctx: &ExecutionContext) -> Vec<String> {
    match ctx.param("paths") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => ctx.graph.output_paths(&ctx.step_id),
    }
}

/// Shape the input per output path; the route activates exactly the paths that got data.
pub(super) fn execute(ctx: &ExecutionContext) -> Result<ExecutionResult, StepError> {
    let strategy = Strategy::parse(ctx.param_str_or("strategy", "duplicate"))
        .unwrap_or(Strategy::Duplicate);
    let paths = output_paths(ctx);
    if paths.is_empty() {
        return Err(StepError::Execution("split step has no output paths".into()));
    }

    let mut outputs = JsonMap::new();
    match strategy {
        Strategy::Duplicate => {
            for path in &paths {
                outputs.insert(path.clone(), ctx.input_data.clone());
            }
        }
        Strategy::FieldBased => {
            let field = ctx.param_str("field").unwrap_or_default();
            let key = lookup_path(&ctx.input_data, field).map(|v| value_to_key(&v));
            let target = key
                .filter(|k| paths.contains(k))
                .or_else(|| ctx.param_str("default_path").map(str::to_string));
            match target {
                Some(path) => {
                    outputs.insert(path, ctx.input_data.clone());
                }
                None => {
                    tracing::debug!(
                        execution_id = %ctx.execution_id,
                        step_id = %ctx.step_id,
                        field = %field,
                        "No split path matched the discriminator"
                    );
                }
            }
        }
        Strategy::ArraySplit => {
            let items = match ctx.param_str("items_path") {
                Some(path) => lookup_path(&ctx.input_data, path),
                None => Some(ctx.input_data.clone()),
            };
            let items = match items {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![other],
            };
            for (path, chunk) in paths.iter().zip(chunk_evenly(items, paths.len())) {
                outputs.insert(path.clone(), Value::Array(chunk));
            }
        }
    }

    let produced: Vec<String> = outputs.keys().cloned().collect();
    let route = if produced.is_empty() {
        Route::Halt
    } else {
        Route::Paths(produced.clone())
    };

    Ok(ExecutionResult::success(json!({
        "outputs": outputs,
        "paths": produced,
    }))
    .with_route(route))
}

/// Split `items` into `parts` chunks of `len / parts`; the last chunk takes the remainder.
fn chunk_evenly(items: Vec<Value>, parts: usize) -> Vec<Vec<Value>> {
    if parts == 0 {
        return Vec::new();
    }
    let size = items.len() / parts;
    let mut chunks = Vec::with_capacity(parts);
    let mut rest = items;
    for _ in 0..parts - 1 {
        let tail = rest.split_off(size.min(rest.len()));
        chunks.push(rest);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}
