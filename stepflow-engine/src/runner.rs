//! The workflow engine: a single-threaded step state machine per run.
//!
//! Steps execute strictly sequentially. Control flow (goto, end, retry)
//! is decided only after a step's outcome is known, so there is nothing
//! to parallelize inside one run; concurrency lives across runs, which
//! share only the credential provider.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use stepflow_core::types::{
    FailureAction, FailureActionType, Step, SuccessAction, SuccessActionType, Workflow,
    WorkflowDocument,
};
use uuid::Uuid;

use crate::auth::CredentialProvider;
use crate::cancel::CancelToken;
use crate::context::{CapturedResponse, ExecutionContext};
use crate::criteria::{evaluate_criterion, evaluate_success};
use crate::events::{Event, EventSink, NoOpEventSink};
use crate::http::HttpClient;
use crate::operation::OperationResolver;
use crate::request::{build_request, BuildError};
use crate::resolve::resolve_value;

/// Faults that prevent a run from starting. Everything after start is
/// reported inside [`ExecutionResult`], never returned as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(String),
    #[error("missing required input '{name}'")]
    MissingInput { name: String },
    #[error("input '{name}' does not match its declared type")]
    InputTypeMismatch { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("success criteria not met at step '{step_id}'")]
    Criteria { step_id: String },
    #[error("could not build request for step '{step_id}': {detail}")]
    Build { step_id: String, detail: String },
    #[error("transport failure at step '{step_id}': {detail}")]
    Transport { step_id: String, detail: String },
    #[error("authentication failed at step '{step_id}': {detail}")]
    Auth { step_id: String, detail: String },
    #[error("step '{step_id}' goes to unknown step '{target}'")]
    ControlFlow { step_id: String, target: String },
    #[error("run cancelled")]
    Cancelled,
    #[error("overall run deadline exceeded")]
    TimedOut,
    #[error("sub-workflow '{workflow_id}' failed at step '{step_id}': {detail}")]
    SubWorkflow {
        step_id: String,
        workflow_id: String,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failure,
}

/// One attempt of one step, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTrace {
    pub step_id: String,
    pub attempt: u32,
    pub outcome: StepOutcome,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub failure: Option<FailureReason>,
    pub outputs: BTreeMap<String, JsonValue>,
    pub step_trace: Vec<StepTrace>,
}

#[derive(Clone)]
pub struct RunOptions {
    /// Wall-clock budget for the whole run, checked at every state
    /// transition boundary. `None` means unbounded.
    pub overall_timeout: Option<Duration>,
    /// Per-HTTP-call timeout.
    pub http_timeout: Duration,
    /// Delay before a retry when the failure action names none.
    pub default_retry_interval: Duration,
    /// Freshness margin for cached OAuth2 tokens.
    pub clock_skew: Duration,
    pub cancel: Option<CancelToken>,
    /// Pre-recorded `$workflows.<id>.outputs` values, for callers that
    /// have already run this workflow's `dependsOn` entries.
    pub seeded_workflow_outputs: BTreeMap<String, JsonValue>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            overall_timeout: None,
            http_timeout: Duration::from_secs(30),
            default_retry_interval: Duration::from_secs(1),
            clock_skew: Duration::from_secs(30),
            cancel: None,
            seeded_workflow_outputs: BTreeMap::new(),
        }
    }
}

pub struct WorkflowEngine {
    document: WorkflowDocument,
    operations: Arc<dyn OperationResolver>,
    http: Arc<dyn HttpClient>,
    credentials: Arc<CredentialProvider>,
    events: Arc<dyn EventSink>,
}

/// What one attempt of one step produced.
enum AttemptResult {
    /// Criteria passed; the captured response is still in scope for
    /// output extraction and action criteria.
    Success { response: CapturedResponse },
    /// A sub-workflow completed successfully with these outputs.
    SubSuccess {
        workflow_id: String,
        outputs: JsonValue,
    },
    /// Criteria false, build failure, transport failure, or a failed
    /// sub-workflow. `response` is present only when a response arrived.
    Failure {
        response: Option<CapturedResponse>,
        reason: FailureReason,
    },
    Cancelled,
}

/// Where the state machine goes after a step resolves.
enum Transition {
    Advance,
    Goto(usize),
    Terminal(RunStatus, Option<FailureReason>),
}

impl WorkflowEngine {
    pub fn new(
        document: WorkflowDocument,
        operations: Arc<dyn OperationResolver>,
        http: Arc<dyn HttpClient>,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        Self {
            document,
            operations,
            http,
            credentials,
            events: Arc::new(NoOpEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn document(&self) -> &WorkflowDocument {
        &self.document
    }

    /// Run a workflow to a terminal state. Document-modeled failures come
    /// back as `status: Failed` with a reason, never as `Err`.
    pub async fn execute(
        &self,
        workflow_id: &str,
        inputs: JsonValue,
        options: RunOptions,
    ) -> Result<ExecutionResult, StartError> {
        self.execute_boxed(workflow_id, inputs, options).await
    }

    /// Boxed form of [`execute`]. Sub-workflow steps recurse through this
    /// indirection; boxing the whole body (rather than the recursive call
    /// site alone) is what lets the compiler prove the future `Send`.
    ///
    /// [`execute`]: WorkflowEngine::execute
    fn execute_boxed<'a>(
        &'a self,
        workflow_id: &'a str,
        inputs: JsonValue,
        options: RunOptions,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult, StartError>> + Send + 'a>> {
        Box::pin(async move {
            let workflow = self
                .document
                .workflow(workflow_id)
                .ok_or_else(|| StartError::UnknownWorkflow(workflow_id.to_string()))?;

            validate_inputs(workflow, &inputs)?;

            let run_id = Uuid::new_v4();
            let mut ctx = ExecutionContext::new(inputs, &self.document.source_descriptions);
            for (id, outputs) in &options.seeded_workflow_outputs {
                ctx.record_workflow_outputs(id, outputs.clone());
            }

            self.events
                .emit(Event::RunStarted {
                    run_id,
                    workflow_id: workflow_id.to_string(),
                })
                .await;

            let deadline = options.overall_timeout.map(|d| Instant::now() + d);
            let mut trace = Vec::new();
            let (status, failure) = self
                .run(workflow, &mut ctx, &options, run_id, deadline, &mut trace)
                .await;

            let outputs = resolve_outputs(workflow, &ctx);

            self.events
                .emit(Event::RunFinished { run_id, status })
                .await;

            Ok(ExecutionResult {
                run_id,
                status,
                failure,
                outputs,
                step_trace: trace,
            })
        })
    }

    async fn run(
        &self,
        workflow: &Workflow,
        ctx: &mut ExecutionContext,
        options: &RunOptions,
        run_id: Uuid,
        deadline: Option<Instant>,
        trace: &mut Vec<StepTrace>,
    ) -> (RunStatus, Option<FailureReason>) {
        let mut index = 0usize;

        loop {
            if let Some(reason) = boundary_fault(options, deadline) {
                return (RunStatus::Failed, Some(reason));
            }
            let Some(step) = workflow.steps.get(index) else {
                return (RunStatus::Succeeded, None);
            };

            self.events
                .emit(Event::StepStarted {
                    run_id,
                    step_id: step.step_id.clone(),
                })
                .await;

            match self
                .run_step(workflow, step, ctx, options, run_id, deadline, trace)
                .await
            {
                Transition::Advance => index += 1,
                Transition::Goto(target) => index = target,
                Transition::Terminal(status, failure) => return (status, failure),
            }
        }
    }

    /// Drive one step through its attempts until it resolves to a
    /// transition.
    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        workflow: &Workflow,
        step: &Step,
        ctx: &mut ExecutionContext,
        options: &RunOptions,
        run_id: Uuid,
        deadline: Option<Instant>,
        trace: &mut Vec<StepTrace>,
    ) -> Transition {
        let mut attempt: u32 = 1;

        loop {
            if let Some(reason) = boundary_fault(options, deadline) {
                return Transition::Terminal(RunStatus::Failed, Some(reason));
            }

            self.events
                .emit(Event::AttemptStarted {
                    run_id,
                    step_id: step.step_id.clone(),
                    attempt,
                })
                .await;

            let result = self.attempt(step, ctx, options, deadline).await;
            let succeeded = matches!(
                result,
                AttemptResult::Success { .. } | AttemptResult::SubSuccess { .. }
            );

            self.events
                .emit(Event::AttemptFinished {
                    run_id,
                    step_id: step.step_id.clone(),
                    attempt,
                    succeeded,
                })
                .await;

            if !matches!(result, AttemptResult::Cancelled) {
                trace.push(StepTrace {
                    step_id: step.step_id.clone(),
                    attempt,
                    outcome: if succeeded {
                        StepOutcome::Success
                    } else {
                        StepOutcome::Failure
                    },
                });
            }

            match result {
                AttemptResult::Cancelled => {
                    return Transition::Terminal(RunStatus::Failed, Some(FailureReason::Cancelled));
                }
                AttemptResult::Success { response } => {
                    let outputs = extract_outputs(step, ctx, &response);
                    ctx.record_step(&step.step_id, response.clone(), outputs);
                    self.events
                        .emit(Event::StepSucceeded {
                            run_id,
                            step_id: step.step_id.clone(),
                        })
                        .await;
                    return self.success_transition(workflow, step, ctx, Some(&response));
                }
                AttemptResult::SubSuccess {
                    workflow_id,
                    outputs,
                } => {
                    ctx.record_workflow_outputs(&workflow_id, outputs.clone());
                    // A sub-workflow has no HTTP response; record an
                    // empty snapshot so `$steps.<id>.outputs` resolves.
                    let response = CapturedResponse {
                        status: 200,
                        headers: BTreeMap::new(),
                        body: Vec::new(),
                        body_json: None,
                    };
                    ctx.record_step(&step.step_id, response, outputs);
                    self.events
                        .emit(Event::StepSucceeded {
                            run_id,
                            step_id: step.step_id.clone(),
                        })
                        .await;
                    return self.success_transition(workflow, step, ctx, None);
                }
                AttemptResult::Failure { response, reason } => {
                    match self
                        .failure_transition(
                            workflow,
                            step,
                            ctx,
                            options,
                            run_id,
                            response.as_ref(),
                            reason,
                            attempt,
                        )
                        .await
                    {
                        FailureOutcome::Retry => {
                            attempt += 1;
                        }
                        FailureOutcome::Transition(t) => {
                            self.events
                                .emit(Event::StepFailed {
                                    run_id,
                                    step_id: step.step_id.clone(),
                                    reason: match &t {
                                        Transition::Terminal(_, Some(r)) => r.to_string(),
                                        _ => "handled by onFailure".to_string(),
                                    },
                                })
                                .await;
                            return t;
                        }
                    }
                }
            }
        }
    }

    fn success_transition(
        &self,
        workflow: &Workflow,
        step: &Step,
        ctx: &ExecutionContext,
        response: Option<&CapturedResponse>,
    ) -> Transition {
        let selected = step
            .on_success
            .iter()
            .find(|a| action_criteria_hold(&a.criteria, response, ctx));

        match selected {
            None => Transition::Advance,
            Some(SuccessAction {
                action: SuccessActionType::End,
                ..
            }) => Transition::Terminal(RunStatus::Succeeded, None),
            Some(SuccessAction {
                action: SuccessActionType::Goto,
                step_id: target,
                ..
            }) => goto_transition(workflow, step, target.as_deref()),
        }
    }

    /// Pick and apply the first applicable `onFailure` action. A retry
    /// action whose attempts are exhausted is skipped in favor of later
    /// applicable actions; with none left the run fails.
    #[allow(clippy::too_many_arguments)]
    async fn failure_transition(
        &self,
        workflow: &Workflow,
        step: &Step,
        ctx: &ExecutionContext,
        options: &RunOptions,
        run_id: Uuid,
        response: Option<&CapturedResponse>,
        reason: FailureReason,
        attempt: u32,
    ) -> FailureOutcome {
        for action in &step.on_failure {
            if !action_criteria_hold(&action.criteria, response, ctx) {
                continue;
            }
            match action.action {
                FailureActionType::End => {
                    return FailureOutcome::Transition(Transition::Terminal(
                        RunStatus::Failed,
                        Some(reason),
                    ));
                }
                FailureActionType::Goto => {
                    return FailureOutcome::Transition(goto_transition(
                        workflow,
                        step,
                        action.step_id.as_deref(),
                    ));
                }
                FailureActionType::Retry => {
                    if retries_exhausted(action, attempt) {
                        continue;
                    }
                    let delay = action
                        .retry_after_seconds
                        .map(Duration::from_secs_f64)
                        .unwrap_or(options.default_retry_interval);
                    self.events
                        .emit(Event::RetryScheduled {
                            run_id,
                            step_id: step.step_id.clone(),
                            delay_ms: delay.as_millis() as u64,
                        })
                        .await;
                    if !cancellable_sleep(delay, options).await {
                        return FailureOutcome::Transition(Transition::Terminal(
                            RunStatus::Failed,
                            Some(FailureReason::Cancelled),
                        ));
                    }
                    return FailureOutcome::Retry;
                }
            }
        }

        FailureOutcome::Transition(Transition::Terminal(RunStatus::Failed, Some(reason)))
    }

    /// One attempt: build, send, evaluate. Sub-workflow steps recurse
    /// instead of sending a request.
    async fn attempt(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
        options: &RunOptions,
        deadline: Option<Instant>,
    ) -> AttemptResult {
        if let Some(workflow_id) = &step.workflow_id {
            return self
                .attempt_sub_workflow(step, workflow_id, ctx, options, deadline)
                .await;
        }

        // Building the request may block on a token acquisition, so it is
        // a suspension point cancellation must be able to interrupt.
        let build = build_request(
            step,
            &self.document,
            self.operations.as_ref(),
            self.credentials.as_ref(),
            ctx,
            options.clock_skew,
        );
        let built = match options.cancel.clone() {
            Some(mut token) => {
                tokio::select! {
                    r = build => Some(r),
                    _ = token.cancelled() => None,
                }
            }
            None => Some(build.await),
        };

        let request = match built {
            None => return AttemptResult::Cancelled,
            Some(Ok(req)) => req,
            Some(Err(BuildError::Auth(e))) => {
                return AttemptResult::Failure {
                    response: None,
                    reason: FailureReason::Auth {
                        step_id: step.step_id.clone(),
                        detail: e.to_string(),
                    },
                }
            }
            Some(Err(e)) => {
                return AttemptResult::Failure {
                    response: None,
                    reason: FailureReason::Build {
                        step_id: step.step_id.clone(),
                        detail: e.to_string(),
                    },
                }
            }
        };

        let send = self.http.send(request, options.http_timeout);
        let sent = match options.cancel.clone() {
            Some(mut token) => {
                tokio::select! {
                    r = send => Some(r),
                    _ = token.cancelled() => None,
                }
            }
            None => Some(send.await),
        };

        let response = match sent {
            None => return AttemptResult::Cancelled,
            Some(Err(e)) => {
                // Transport errors count as a failed criteria evaluation,
                // so onFailure actions (including retry) still apply.
                return AttemptResult::Failure {
                    response: None,
                    reason: FailureReason::Transport {
                        step_id: step.step_id.clone(),
                        detail: e.to_string(),
                    },
                };
            }
            Some(Ok(r)) => r,
        };

        let captured = CapturedResponse {
            status: response.status,
            body_json: serde_json::from_slice(&response.body).ok(),
            headers: response.headers,
            body: response.body,
        };

        if evaluate_success(&step.success_criteria, &captured, ctx) {
            AttemptResult::Success { response: captured }
        } else {
            AttemptResult::Failure {
                response: Some(captured),
                reason: FailureReason::Criteria {
                    step_id: step.step_id.clone(),
                },
            }
        }
    }

    async fn attempt_sub_workflow(
        &self,
        step: &Step,
        workflow_id: &str,
        ctx: &ExecutionContext,
        options: &RunOptions,
        deadline: Option<Instant>,
    ) -> AttemptResult {
        // Location-less parameters become the sub-workflow's inputs.
        let mut inputs = serde_json::Map::new();
        for param in step.parameters.iter().filter(|p| p.location.is_none()) {
            match resolve_value(&param.value, ctx, None) {
                Ok(v) => {
                    inputs.insert(param.name.clone(), v);
                }
                Err(e) => {
                    return AttemptResult::Failure {
                        response: None,
                        reason: FailureReason::Build {
                            step_id: step.step_id.clone(),
                            detail: e.to_string(),
                        },
                    }
                }
            }
        }

        // The child inherits the parent's remaining wall-clock budget, not
        // a fresh one; an already-spent budget fails the child at its
        // first boundary check.
        let child_options = RunOptions {
            seeded_workflow_outputs: BTreeMap::new(),
            overall_timeout: deadline.map(|d| d.saturating_duration_since(Instant::now())),
            ..options.clone()
        };

        match self
            .execute_boxed(workflow_id, JsonValue::Object(inputs), child_options)
            .await
        {
            Err(e) => AttemptResult::Failure {
                response: None,
                reason: FailureReason::SubWorkflow {
                    step_id: step.step_id.clone(),
                    workflow_id: workflow_id.to_string(),
                    detail: e.to_string(),
                },
            },
            Ok(result) => match result.status {
                RunStatus::Succeeded => AttemptResult::SubSuccess {
                    workflow_id: workflow_id.to_string(),
                    outputs: JsonValue::Object(result.outputs.into_iter().collect()),
                },
                RunStatus::Failed => AttemptResult::Failure {
                    response: None,
                    reason: FailureReason::SubWorkflow {
                        step_id: step.step_id.clone(),
                        workflow_id: workflow_id.to_string(),
                        detail: result
                            .failure
                            .map(|f| f.to_string())
                            .unwrap_or_else(|| "failed".to_string()),
                    },
                },
            },
        }
    }
}

enum FailureOutcome {
    Retry,
    Transition(Transition),
}

fn validate_inputs(workflow: &Workflow, inputs: &JsonValue) -> Result<(), StartError> {
    for declared in &workflow.inputs {
        match inputs.get(&declared.name) {
            None => {
                if declared.required {
                    return Err(StartError::MissingInput {
                        name: declared.name.clone(),
                    });
                }
            }
            Some(value) => {
                if !declared.kind.matches(value) {
                    return Err(StartError::InputTypeMismatch {
                        name: declared.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Extract the step's declared outputs. An expression that does not
/// resolve leaves its binding out rather than defaulting it.
fn extract_outputs(step: &Step, ctx: &ExecutionContext, response: &CapturedResponse) -> JsonValue {
    let mut out = serde_json::Map::new();
    for (name, expr) in &step.outputs {
        let template = JsonValue::String(expr.clone());
        if let Ok(value) = resolve_value(&template, ctx, Some(response)) {
            out.insert(name.clone(), value);
        }
    }
    JsonValue::Object(out)
}

/// Resolve workflow-level outputs against the final context. Applies to
/// failed runs too; unresolvable bindings are omitted.
fn resolve_outputs(workflow: &Workflow, ctx: &ExecutionContext) -> BTreeMap<String, JsonValue> {
    let mut out = BTreeMap::new();
    for (name, expr) in &workflow.outputs {
        let template = JsonValue::String(expr.clone());
        if let Ok(value) = resolve_value(&template, ctx, None) {
            out.insert(name.clone(), value);
        }
    }
    out
}

/// Empty criteria hold unconditionally. Non-empty criteria with no
/// response in scope cannot hold, which routes build and transport
/// failures to unconditional actions only.
fn action_criteria_hold(
    criteria: &[stepflow_core::types::Criterion],
    response: Option<&CapturedResponse>,
    ctx: &ExecutionContext,
) -> bool {
    if criteria.is_empty() {
        return true;
    }
    let Some(resp) = response else {
        return false;
    };
    criteria.iter().all(|c| evaluate_criterion(c, resp, ctx))
}

/// `retry_limit` counts total attempts, the first included; a step with
/// `retryLimit: 3` executes at most three times. An absent limit leaves
/// retries unbounded.
fn retries_exhausted(action: &FailureAction, attempt: u32) -> bool {
    match action.retry_limit {
        Some(limit) => attempt >= limit,
        None => false,
    }
}

fn goto_transition(workflow: &Workflow, step: &Step, target: Option<&str>) -> Transition {
    let Some(target) = target else {
        return Transition::Terminal(
            RunStatus::Failed,
            Some(FailureReason::ControlFlow {
                step_id: step.step_id.clone(),
                target: "<unset>".to_string(),
            }),
        );
    };
    match workflow.step_index(target) {
        Some(index) => Transition::Goto(index),
        // A dangling goto is a document defect; fail the run immediately
        // with no retry.
        None => Transition::Terminal(
            RunStatus::Failed,
            Some(FailureReason::ControlFlow {
                step_id: step.step_id.clone(),
                target: target.to_string(),
            }),
        ),
    }
}

fn boundary_fault(options: &RunOptions, deadline: Option<Instant>) -> Option<FailureReason> {
    if options
        .cancel
        .as_ref()
        .is_some_and(|token| token.is_cancelled())
    {
        return Some(FailureReason::Cancelled);
    }
    if deadline.is_some_and(|d| Instant::now() >= d) {
        return Some(FailureReason::TimedOut);
    }
    None
}

/// Sleep that a cancel signal can interrupt. Returns false when the run
/// was cancelled mid-sleep.
async fn cancellable_sleep(delay: Duration, options: &RunOptions) -> bool {
    match options.cancel.clone() {
        None => {
            tokio::time::sleep(delay).await;
            true
        }
        Some(mut token) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = token.cancelled() => false,
            }
        }
    }
}
