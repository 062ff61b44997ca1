//! Workflow orchestration engine.
//!
//! Runs the steps of one execution strictly one at a time, in topological
//! order:
//! - resolves each step's executor through the registry
//! - runs it through the lifecycle wrapper
//! - records the outcome in the checkpoint and follows its route
//! - hands Paused results to the suspension protocol and stops
//!
//! A resume (user response or `continue` timeout) completes the paused step
//! with the resume data and drives the remaining steps.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use weft_steps::{
    ExecutionContext, ExecutionResult, JsonMap, StepError, StepRegistry, StepRunner,
};

use super::checkpoint::{Checkpoint, StepRecord};
use super::graph::WorkflowDefinition;
use crate::db::models::{WorkflowExecution, WorkflowStatus};
use crate::error::{AppError, AppResult};
use crate::hil::SuspensionService;
use crate::monitor::ExecutionResumer;
use crate::status::WorkflowStatusManager;
use crate::store::PauseStore;

/// Input a step receives from its active parents.
enum StepInput {
    Root,
    Inactive,
    Parents(JsonMap),
}

pub struct WorkflowEngine {
    registry: Arc<StepRegistry>,
    runner: StepRunner,
    suspension: Arc<SuspensionService>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<StepRegistry>, suspension: Arc<SuspensionService>) -> Self {
        let runner = StepRunner::new(suspension.status().observer().clone());
        Self {
            registry,
            runner,
            suspension,
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn status(&self) -> &Arc<WorkflowStatusManager> {
        self.suspension.status()
    }

    fn store(&self) -> &Arc<dyn PauseStore> {
        self.status().store()
    }

    pub async fn get_execution(&self, execution_id: &str) -> AppResult<WorkflowExecution> {
        self.store()
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("execution {}", execution_id)))
    }

    /// Start a new execution and run it until it finishes or pauses.
    pub async fn start(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
    ) -> AppResult<WorkflowExecution> {
        definition.validate()?;

        let execution = WorkflowExecution::new(&definition.id, definition.to_json()?, input);
        self.store().create_execution(&execution).await?;

        info!(
            execution_id = %execution.id,
            workflow_id = %definition.id,
            steps = definition.nodes.len(),
            "Execution started"
        );

        let outcome = self
            .drive(&execution.id, definition, Checkpoint::default(), &execution.input)
            .await;
        self.settle(&execution.id, outcome).await
    }

    /// Resume a paused execution with `resume_data` and continue it.
    pub async fn resume(
        &self,
        execution_id: &str,
        resume_reason: &str,
        resume_data: Option<Value>,
    ) -> AppResult<WorkflowExecution> {
        let record = self
            .status()
            .resume_workflow_execution(execution_id, resume_reason, resume_data)
            .await?;

        let outcome = self
            .continue_from(
                execution_id,
                &record.paused_step_id,
                record.resume_data.unwrap_or(Value::Null),
            )
            .await;
        self.settle(execution_id, outcome).await
    }

    /// Cancel a paused execution. Returns false if it was not paused.
    pub async fn cancel(&self, execution_id: &str, reason: Option<&str>) -> AppResult<bool> {
        self.status().cancel_paused_execution(execution_id, reason).await
    }

    /// External response handler: resolve a pending interaction and resume
    /// its execution with the response.
    pub async fn respond(
        &self,
        interaction_id: &str,
        response: Value,
        responder: Option<&str>,
    ) -> AppResult<WorkflowExecution> {
        let interaction = self.suspension.pending_interaction(interaction_id).await?;
        let reason = match responder {
            Some(who) => format!("response from {}", who),
            None => format!("response to interaction {}", interaction_id),
        };
        self.resume(&interaction.execution_id, &reason, Some(response))
            .await
    }

    async fn continue_from(
        &self,
        execution_id: &str,
        paused_step_id: &str,
        output: Value,
    ) -> AppResult<WorkflowExecution> {
        let execution = self.get_execution(execution_id).await?;
        if execution.status != WorkflowStatus::Running {
            return Err(AppError::Conflict(format!(
                "execution {} is {}, not running",
                execution_id, execution.status
            )));
        }

        let definition: WorkflowDefinition = serde_json::from_value(execution.definition.clone())?;
        let mut checkpoint = Checkpoint::from_value(&execution.checkpoint)?;
        checkpoint.complete_paused(paused_step_id, output)?;

        debug!(
            execution_id = %execution_id,
            step_id = %paused_step_id,
            "Continuing execution from paused step"
        );

        self.drive(execution_id, &definition, checkpoint, &execution.input)
            .await
    }

    /// Run every step not yet in the checkpoint.
    async fn drive(
        &self,
        execution_id: &str,
        definition: &WorkflowDefinition,
        mut checkpoint: Checkpoint,
        input: &Value,
    ) -> AppResult<WorkflowExecution> {
        let graph = definition.graph_metadata();

        for step_id in definition.execution_order() {
            if checkpoint.contains(&step_id) {
                continue;
            }
            let Some(node) = definition.node(&step_id) else {
                continue;
            };

            let (step_input, upstream) = match self.step_input(definition, &checkpoint, &step_id) {
                StepInput::Inactive => {
                    debug!(execution_id = %execution_id, step_id = %step_id, "Step skipped, no active parent");
                    checkpoint.record(&step_id, StepRecord::skipped());
                    continue;
                }
                StepInput::Root => (input.clone(), JsonMap::new()),
                StepInput::Parents(upstream) => {
                    let step_input = if upstream.len() == 1 {
                        upstream.values().next().cloned().unwrap_or(Value::Null)
                    } else {
                        Value::Object(upstream.clone())
                    };
                    (step_input, upstream)
                }
            };

            let executor = match self.registry.create_executor(&node.kind) {
                Ok(executor) => executor,
                Err(err) => {
                    let message = err.to_string();
                    checkpoint.record(&step_id, StepRecord::failed(&message));
                    self.store()
                        .update_execution(
                            execution_id,
                            WorkflowStatus::Error,
                            &checkpoint.to_value()?,
                            Some(&message),
                        )
                        .await?;
                    warn!(
                        execution_id = %execution_id,
                        step_id = %step_id,
                        step_kind = %node.kind,
                        "No executor for step kind, execution failed"
                    );
                    return Err(match err {
                        StepError::UnknownStepKind(kind) => AppError::UnknownStepKind(kind),
                        other => other.into(),
                    });
                }
            };

            let ctx = ExecutionContext::new(&definition.id, execution_id, &step_id)
                .with_kind(&node.kind, node.subtype.as_deref())
                .with_parameters(Value::Object(node.parameters.clone()))
                .with_input(step_input)
                .with_upstream(upstream)
                .with_static_data(definition.static_data.clone())
                .with_credentials(definition.credentials.clone())
                .with_graph(graph.clone());

            let result = self.runner.run(executor.as_ref(), &ctx).await;

            if result.is_paused() {
                return self.pause_at(execution_id, &step_id, result, checkpoint).await;
            }

            checkpoint.record(&step_id, StepRecord::from_result(&result));
            self.store()
                .update_execution(
                    execution_id,
                    WorkflowStatus::Running,
                    &checkpoint.to_value()?,
                    None,
                )
                .await?;
        }

        self.finish(execution_id, checkpoint).await
    }

    fn step_input(
        &self,
        definition: &WorkflowDefinition,
        checkpoint: &Checkpoint,
        step_id: &str,
    ) -> StepInput {
        let mut has_parents = false;
        let mut upstream = JsonMap::new();

        for edge in definition.incoming(step_id) {
            has_parents = true;
            if checkpoint.edge_active(edge) && !upstream.contains_key(&edge.source) {
                let output = checkpoint
                    .get(&edge.source)
                    .map(|r| r.output.clone())
                    .unwrap_or(Value::Null);
                let output = if is_split(definition, &edge.source) {
                    split_output_for(output, edge.path_name())
                } else {
                    output
                };
                upstream.insert(edge.source.clone(), output);
            }
        }

        if !has_parents {
            StepInput::Root
        } else if upstream.is_empty() {
            StepInput::Inactive
        } else {
            StepInput::Parents(upstream)
        }
    }

    async fn pause_at(
        &self,
        execution_id: &str,
        step_id: &str,
        result: ExecutionResult,
        mut checkpoint: Checkpoint,
    ) -> AppResult<WorkflowExecution> {
        let Some(request) = result.pause.clone() else {
            return Err(AppError::Internal(format!(
                "step '{}' paused without a pause request",
                step_id
            )));
        };

        checkpoint.record(step_id, StepRecord::from_result(&result));
        checkpoint.paused_step = Some(step_id.to_string());

        if let Err(err) = self
            .suspension
            .suspend(execution_id, step_id, &request, &checkpoint.to_value()?)
            .await
        {
            let message = format!("Step '{}' could not be suspended: {}", step_id, err);
            checkpoint.paused_step = None;
            checkpoint.record(step_id, StepRecord::failed(&message));
            self.fail_running(execution_id, &checkpoint.to_value()?, &message)
                .await;
            return Err(err);
        }

        self.get_execution(execution_id).await
    }

    /// Mark the execution failed when `outcome` is an error and it was left running.
    async fn settle(
        &self,
        execution_id: &str,
        outcome: AppResult<WorkflowExecution>,
    ) -> AppResult<WorkflowExecution> {
        if let Err(ref err) = outcome {
            if let Ok(execution) = self.get_execution(execution_id).await {
                let message = format!("Execution stopped: {}", err);
                self.fail_running(execution_id, &execution.checkpoint, &message)
                    .await;
            }
        }
        outcome
    }

    /// Move a running execution to Error. Executions in any other state are left alone.
    async fn fail_running(&self, execution_id: &str, checkpoint: &Value, message: &str) {
        match self.store().get_execution(execution_id).await {
            Ok(Some(execution)) if execution.status == WorkflowStatus::Running => {}
            _ => return,
        }

        match self
            .store()
            .update_execution(execution_id, WorkflowStatus::Error, checkpoint, Some(message))
            .await
        {
            Ok(_) => warn!(
                execution_id = %execution_id,
                error = %message,
                "Execution failed outside a step"
            ),
            Err(e) => error!(
                execution_id = %execution_id,
                error = %e,
                "Failed to mark execution as errored"
            ),
        }
    }

    async fn finish(
        &self,
        execution_id: &str,
        checkpoint: Checkpoint,
    ) -> AppResult<WorkflowExecution> {
        let (status, error) = match checkpoint.first_error() {
            Some((step_id, message)) => (
                WorkflowStatus::Error,
                Some(format!("Step '{}' failed: {}", step_id, message)),
            ),
            None => (WorkflowStatus::Success, None),
        };

        let execution = self
            .store()
            .update_execution(
                execution_id,
                status,
                &checkpoint.to_value()?,
                error.as_deref(),
            )
            .await?;

        info!(
            execution_id = %execution_id,
            status = %status,
            steps = checkpoint.steps.len(),
            "Execution finished"
        );

        Ok(execution)
    }
}

#[async_trait]
impl ExecutionResumer for WorkflowEngine {
    async fn continue_execution(
        &self,
        execution_id: &str,
        paused_step_id: &str,
        output: Value,
    ) -> AppResult<()> {
        let outcome = self.continue_from(execution_id, paused_step_id, output).await;
        self.settle(execution_id, outcome).await.map(|_| ())
    }
}

fn is_split(definition: &WorkflowDefinition, step_id: &str) -> bool {
    definition
        .node(step_id)
        .map(|n| n.kind == "flow" && n.subtype.as_deref() == Some("split"))
        .unwrap_or(false)
}

/// A split child receives only the data shaped for its own path.
fn split_output_for(output: Value, path: &str) -> Value {
    match output {
        Value::Object(mut map) if map.get("outputs").is_some_and(Value::is_object) => {
            match map.remove("outputs") {
                Some(Value::Object(mut outputs)) => outputs.remove(path).unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        other => other,
    }
}
